//! Message passing between workers
//!
//! A [`World`] runs one scoped OS thread per rank. Ranks share no mutable
//! state; they exchange owned values through a [`Communicator`], whose
//! collectives must be entered by every rank in the same order.

use crate::error::{EnsembleError, Result};
use std::sync::mpsc::{channel, Receiver, Sender};
use tracing::{debug, error};

/// Message tagged with its sender and the collective it belongs to
#[derive(Debug)]
struct Envelope<T> {
    source: usize,
    seq: u64,
    payload: T,
}

/// Endpoint of one rank
pub struct Communicator<T> {
    rank: usize,
    /// Senders indexed by rank; `None` at the own rank so the inbox closes once every peer exits
    peers: Vec<Option<Sender<Envelope<T>>>>,
    inbox: Receiver<Envelope<T>>,
    /// Messages that arrived ahead of the collective waiting for them
    pending: Vec<Envelope<T>>,
    seq: u64,
}

impl<T: Send> Communicator<T> {
    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn size(&self) -> usize {
        self.peers.len()
    }

    fn check_root(&self, root: usize) -> Result<()> {
        if root >= self.size() {
            return Err(EnsembleError::ConfigError(format!(
                "root rank {} outside world of {} workers",
                root,
                self.size()
            )));
        }
        Ok(())
    }

    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }

    fn send(&self, dest: usize, seq: u64, payload: T) -> Result<()> {
        let peer = self.peers[dest].as_ref().ok_or_else(|| EnsembleError::WorkerError {
            rank: dest,
            reason: "worker cannot message itself".to_string(),
        })?;
        peer.send(Envelope {
            source: self.rank,
            seq,
            payload,
        })
        .map_err(|_| EnsembleError::WorkerError {
            rank: dest,
            reason: format!("worker {} is no longer receiving", dest),
        })
    }

    fn recv(&mut self, source: usize, seq: u64) -> Result<T> {
        if let Some(pos) = self
            .pending
            .iter()
            .position(|e| e.source == source && e.seq == seq)
        {
            return Ok(self.pending.swap_remove(pos).payload);
        }

        loop {
            let envelope = self.inbox.recv().map_err(|_| EnsembleError::WorkerError {
                rank: source,
                reason: format!("worker {} disconnected before sending", source),
            })?;
            if envelope.source == source && envelope.seq == seq {
                return Ok(envelope.payload);
            }
            self.pending.push(envelope);
        }
    }

    /// Every rank receives the root's value
    pub fn broadcast(&mut self, root: usize, value: Option<T>) -> Result<T>
    where
        T: Clone,
    {
        self.check_root(root)?;
        let seq = self.next_seq();

        if self.rank != root {
            return self.recv(root, seq);
        }

        let value = value.ok_or_else(|| {
            EnsembleError::ConfigError("broadcast root supplied no value".to_string())
        })?;
        for dest in (0..self.size()).filter(|&d| d != root) {
            self.send(dest, seq, value.clone())?;
        }
        Ok(value)
    }

    /// Rank `r` receives `items[r]` from the root
    pub fn scatter(&mut self, root: usize, items: Option<Vec<T>>) -> Result<T> {
        self.check_root(root)?;
        let seq = self.next_seq();

        if self.rank != root {
            return self.recv(root, seq);
        }

        let items = items.ok_or_else(|| {
            EnsembleError::ConfigError("scatter root supplied no items".to_string())
        })?;
        if items.len() != self.size() {
            return Err(EnsembleError::ShapeError {
                expected: format!("{} scatter items", self.size()),
                actual: format!("{} scatter items", items.len()),
            });
        }

        let mut own = None;
        for (dest, item) in items.into_iter().enumerate() {
            if dest == root {
                own = Some(item);
            } else {
                self.send(dest, seq, item)?;
            }
        }
        own.ok_or_else(|| EnsembleError::ConfigError("scatter lost the root's item".to_string()))
    }

    /// The root receives every rank's value in rank order; other ranks get `None`
    pub fn gather(&mut self, root: usize, value: T) -> Result<Option<Vec<T>>> {
        self.check_root(root)?;
        let seq = self.next_seq();

        if self.rank != root {
            self.send(root, seq, value)?;
            return Ok(None);
        }

        let mut own = Some(value);
        let mut gathered = Vec::with_capacity(self.size());
        for source in 0..self.size() {
            if source == root {
                if let Some(v) = own.take() {
                    gathered.push(v);
                }
            } else {
                gathered.push(self.recv(source, seq)?);
            }
        }
        Ok(Some(gathered))
    }
}

/// Fixed-size group of workers
pub struct World {
    size: usize,
}

impl World {
    pub fn new(size: usize) -> Result<Self> {
        if size == 0 {
            return Err(EnsembleError::ConfigError(
                "a world needs at least one worker".to_string(),
            ));
        }
        Ok(Self { size })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Run `worker` once per rank on scoped threads and collect the results in rank order
    pub fn run<T, R, F>(&self, worker: F) -> Result<Vec<R>>
    where
        T: Send,
        R: Send,
        F: Fn(Communicator<T>) -> R + Sync,
    {
        let (senders, receivers): (Vec<_>, Vec<_>) = (0..self.size).map(|_| channel()).unzip();

        let communicators: Vec<Communicator<T>> = receivers
            .into_iter()
            .enumerate()
            .map(|(rank, inbox)| Communicator {
                rank,
                peers: senders
                    .iter()
                    .enumerate()
                    .map(|(dest, tx)| (dest != rank).then(|| tx.clone()))
                    .collect(),
                inbox,
                pending: Vec::new(),
                seq: 0,
            })
            .collect();
        drop(senders);

        let worker = &worker;
        std::thread::scope(|scope| {
            let handles: Vec<_> = communicators
                .into_iter()
                .map(|comm| {
                    let rank = comm.rank;
                    let handle = std::thread::Builder::new()
                        .name(format!("worker-{}", rank))
                        .spawn_scoped(scope, move || {
                            debug!(rank, "Worker started");
                            worker(comm)
                        });
                    (rank, handle)
                })
                .collect();

            handles
                .into_iter()
                .map(|(rank, handle)| {
                    let handle = handle.map_err(|e| EnsembleError::WorkerError {
                        rank,
                        reason: format!("failed to spawn: {}", e),
                    })?;
                    handle.join().map_err(|_| {
                        error!(rank, "Worker panicked");
                        EnsembleError::WorkerError {
                            rank,
                            reason: "worker panicked".to_string(),
                        }
                    })
                })
                .collect()
        })
    }
}
