//! Worker orchestration
//!
//! Each worker owns one model for the length of a run. The root broadcasts
//! the dataset shape, scatters contiguous row blocks and gathers timings.

mod comm;
mod trainer;

pub use comm::{Communicator, World};
pub use trainer::{ModelTiming, TrainingOrchestrator, TrainingSummary, WorkerOutcome};
