//! Feed-forward neural network (multi-layer perceptron)
//!
//! Fully-connected sigmoid layers trained by per-sample backpropagation.
//! Each neuron of a layer is independent of its siblings, so layers at least
//! `parallel_threshold` wide are processed in parallel; layers themselves
//! always run in order.

use super::config::NetworkConfig;
use super::models::{check_sample, check_training_data, Model};
use crate::data::FeatureMatrix;
use crate::error::{EnsembleError, Result};
use crate::utils::binary::{read_f32_vec, read_len, write_f32, write_len};
use ndarray::{Array1, Array2, ArrayView1, Zip};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::time::Instant;
use tracing::info;

/// Floor applied to the target probability in the cross-entropy loss
const LOSS_EPSILON: f32 = 1e-7;

#[inline]
fn sigmoid(z: f32) -> f32 {
    1.0 / (1.0 + (-z).exp())
}

#[inline]
fn neuron_output(weights: ArrayView1<f32>, bias: f32, inputs: &Array1<f32>) -> f32 {
    sigmoid(bias + weights.dot(inputs))
}

/// One-hot target; labels outside `[0, size)` encode to all zeros
fn one_hot(label: i32, size: usize) -> Array1<f32> {
    let mut target = Array1::zeros(size);
    if let Some(slot) = usize::try_from(label).ok().and_then(|l| target.get_mut(l)) {
        *slot = 1.0;
    }
    target
}

/// Per-sample transient buffers, one vector per layer including the input
struct Workspace {
    activations: Vec<Array1<f32>>,
    deltas: Vec<Array1<f32>>,
}

impl Workspace {
    fn new(layer_sizes: &[usize]) -> Self {
        Self {
            activations: layer_sizes.iter().map(|&n| Array1::zeros(n)).collect(),
            deltas: layer_sizes.iter().map(|&n| Array1::zeros(n)).collect(),
        }
    }

    fn output(&self) -> &Array1<f32> {
        // layer_sizes always holds at least the input and output layers
        &self.activations[self.activations.len() - 1]
    }
}

/// Multi-layer perceptron classifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedForwardNetwork {
    config: NetworkConfig,
    /// `[input, hidden.., output]`; empty until trained or loaded
    layer_sizes: Vec<usize>,
    /// `weights[l]` is `[neurons of layer l+1][neurons of layer l]`
    weights: Vec<Array2<f32>>,
    biases: Vec<Array1<f32>>,
}

impl Default for FeedForwardNetwork {
    fn default() -> Self {
        Self::new(NetworkConfig::default())
    }
}

impl FeedForwardNetwork {
    pub fn new(config: NetworkConfig) -> Self {
        Self {
            config,
            layer_sizes: Vec::new(),
            weights: Vec::new(),
            biases: Vec::new(),
        }
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    pub fn layer_sizes(&self) -> &[usize] {
        &self.layer_sizes
    }

    pub fn weights(&self) -> &[Array2<f32>] {
        &self.weights
    }

    pub fn biases(&self) -> &[Array1<f32>] {
        &self.biases
    }

    fn input_size(&self) -> usize {
        self.layer_sizes.first().copied().unwrap_or(0)
    }

    /// Uniform(-0.5, 0.5) / sqrt(fan_in) weights and zero biases
    fn initialize(&mut self, n_features: usize, rng: &mut Xoshiro256PlusPlus) {
        let mut sizes = Vec::with_capacity(self.config.hidden_layers.len() + 2);
        sizes.push(n_features);
        sizes.extend_from_slice(&self.config.hidden_layers);
        sizes.push(self.config.output_size);

        self.weights = sizes
            .windows(2)
            .map(|pair| {
                let (fan_in, fan_out) = (pair[0], pair[1]);
                let scale = 1.0 / (fan_in as f32).sqrt();
                Array2::from_shape_fn((fan_out, fan_in), |_| rng.gen_range(-0.5f32..0.5) * scale)
            })
            .collect();
        self.biases = sizes[1..].iter().map(|&n| Array1::zeros(n)).collect();
        self.layer_sizes = sizes;
    }

    fn is_parallel(&self, width: usize) -> bool {
        width >= self.config.parallel_threshold
    }

    fn forward(&self, sample: ArrayView1<f32>, ws: &mut Workspace) {
        ws.activations[0].assign(&sample);

        for (l, (w, b)) in self.weights.iter().zip(&self.biases).enumerate() {
            let (done, rest) = ws.activations.split_at_mut(l + 1);
            let inputs = &done[l];
            let outputs = &mut rest[0];

            let zip = Zip::from(outputs).and(w.rows()).and(b);
            if self.is_parallel(w.nrows()) {
                zip.par_for_each(|a, row, &bias| *a = neuron_output(row, bias, inputs));
            } else {
                zip.for_each(|a, row, &bias| *a = neuron_output(row, bias, inputs));
            }
        }
    }

    fn backward(&self, target: &Array1<f32>, ws: &mut Workspace) {
        let last = self.layer_sizes.len() - 1;

        Zip::from(&mut ws.deltas[last])
            .and(&ws.activations[last])
            .and(target)
            .for_each(|d, &a, &t| *d = (a - t) * a * (1.0 - a));

        for l in (1..last).rev() {
            let (lower, upper) = ws.deltas.split_at_mut(l + 1);
            let downstream = &upper[0];
            let w = &self.weights[l];

            let zip = Zip::from(&mut lower[l]).and(w.columns()).and(&ws.activations[l]);
            let hidden_delta = |d: &mut f32, column: ArrayView1<f32>, a: f32| {
                *d = column.dot(downstream) * a * (1.0 - a);
            };
            if self.is_parallel(w.ncols()) {
                zip.par_for_each(|d, column, &a| hidden_delta(d, column, a));
            } else {
                zip.for_each(|d, column, &a| hidden_delta(d, column, a));
            }
        }
    }

    fn update(&mut self, ws: &Workspace) {
        let lr = self.config.learning_rate;
        let threshold = self.config.parallel_threshold;

        for (l, (w, b)) in self.weights.iter_mut().zip(self.biases.iter_mut()).enumerate() {
            let upstream = &ws.activations[l];
            let parallel = w.nrows() >= threshold;
            let zip = Zip::from(w.rows_mut()).and(b).and(&ws.deltas[l + 1]);
            if parallel {
                zip.par_for_each(|mut row, bias, &d| {
                    row.scaled_add(-lr * d, upstream);
                    *bias -= lr * d;
                });
            } else {
                zip.for_each(|mut row, bias, &d| {
                    row.scaled_add(-lr * d, upstream);
                    *bias -= lr * d;
                });
            }
        }
    }

    /// Train with per-sample updates; returns the mean loss of every epoch
    pub fn fit(&mut self, data: &FeatureMatrix) -> Result<Vec<f32>> {
        check_training_data(data)?;
        self.config.validate()?;

        let mut rng = match self.config.random_state {
            Some(seed) => Xoshiro256PlusPlus::seed_from_u64(seed),
            None => Xoshiro256PlusPlus::from_entropy(),
        };
        self.initialize(data.n_features(), &mut rng);

        let start = Instant::now();
        let n_samples = data.n_samples();
        let epochs = self.config.epochs;
        let output_size = self.config.output_size;
        let targets: Vec<Array1<f32>> = data.labels().iter().map(|&l| one_hot(l, output_size)).collect();

        info!(
            layers = ?self.layer_sizes,
            epochs,
            learning_rate = self.config.learning_rate,
            n_samples,
            "Training MLP"
        );

        let mut ws = Workspace::new(&self.layer_sizes);
        let mut order: Vec<usize> = (0..n_samples).collect();
        let mut history = Vec::with_capacity(epochs);

        for epoch in 0..epochs {
            order.shuffle(&mut rng);
            let mut total_loss = 0.0f64;

            for &i in &order {
                self.forward(data.row(i), &mut ws);

                let label = data.label(i);
                if let Some(&p) = usize::try_from(label).ok().and_then(|l| ws.output().get(l)) {
                    total_loss -= (p.max(LOSS_EPSILON) as f64).ln();
                }

                self.backward(&targets[i], &mut ws);
                self.update(&ws);
            }

            let mean_loss = (total_loss / n_samples as f64) as f32;
            history.push(mean_loss);

            let n = epoch + 1;
            if n == 1 || n % 10 == 0 || n == epochs {
                info!(epoch = n, loss = mean_loss, "MLP epoch");
            }
        }

        info!(
            elapsed_ms = start.elapsed().as_millis() as u64,
            final_loss = history.last().copied().unwrap_or(0.0),
            "MLP trained"
        );
        Ok(history)
    }

    /// Output-layer activations for one sample
    pub fn predict_scores(&self, sample: &[f32]) -> Result<Vec<f32>> {
        check_sample(self, sample)?;
        let mut ws = Workspace::new(&self.layer_sizes);
        self.forward(ArrayView1::from(sample), &mut ws);
        Ok(ws.output().to_vec())
    }

    fn write_to<W: Write>(&self, w: &mut W) -> Result<()> {
        let n = self.layer_sizes.len();
        write_len(w, self.layer_sizes[0])?;
        write_len(w, n - 2)?;
        for &size in &self.layer_sizes[1..n - 1] {
            write_len(w, size)?;
        }
        write_len(w, self.layer_sizes[n - 1])?;

        for (weights, biases) in self.weights.iter().zip(&self.biases) {
            // standard layout iterates neuron-major, input-minor
            for &v in weights.iter() {
                write_f32(w, v)?;
            }
            for &v in biases.iter() {
                write_f32(w, v)?;
            }
        }
        Ok(())
    }

    fn read_from<R: Read>(&mut self, r: &mut R) -> Result<()> {
        let input_size = read_len(r)?;
        let n_hidden = read_len(r)?;
        let mut sizes = vec![input_size];
        for _ in 0..n_hidden {
            sizes.push(read_len(r)?);
        }
        sizes.push(read_len(r)?);

        if sizes.iter().any(|&s| s == 0) {
            return Err(EnsembleError::SerializationError(format!(
                "network file declares an empty layer: {:?}",
                sizes
            )));
        }

        let mut weights = Vec::with_capacity(sizes.len() - 1);
        let mut biases = Vec::with_capacity(sizes.len() - 1);
        for pair in sizes.windows(2) {
            let (fan_in, fan_out) = (pair[0], pair[1]);
            weights.push(Array2::from_shape_vec((fan_out, fan_in), read_f32_vec(r, fan_in * fan_out)?)?);
            biases.push(Array1::from_vec(read_f32_vec(r, fan_out)?));
        }

        self.config.hidden_layers = sizes[1..sizes.len() - 1].to_vec();
        self.config.output_size = sizes[sizes.len() - 1];
        self.layer_sizes = sizes;
        self.weights = weights;
        self.biases = biases;
        Ok(())
    }
}

impl Model for FeedForwardNetwork {
    fn name(&self) -> &'static str {
        "MLP"
    }

    fn n_features(&self) -> usize {
        self.input_size()
    }

    fn is_fitted(&self) -> bool {
        !self.weights.is_empty()
    }

    fn train(&mut self, data: &FeatureMatrix) -> Result<()> {
        self.fit(data).map(|_| ())
    }

    /// Index of the largest output unit; the first one wins ties
    fn predict(&self, sample: &[f32]) -> Result<i32> {
        let scores = self.predict_scores(sample)?;
        let mut best = 0;
        for (i, &score) in scores.iter().enumerate() {
            if score > scores[best] {
                best = i;
            }
        }
        Ok(best as i32)
    }

    fn save(&self, path: &Path) -> Result<()> {
        if !self.is_fitted() {
            return Err(EnsembleError::ModelNotFitted);
        }
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut writer = BufWriter::new(File::create(path)?);
        self.write_to(&mut writer)?;
        writer.flush()?;
        info!(path = %path.display(), layers = ?self.layer_sizes, "MLP saved");
        Ok(())
    }

    fn load(&mut self, path: &Path) -> Result<()> {
        let mut reader = BufReader::new(File::open(path)?);
        self.read_from(&mut reader)
    }

    fn clone_box(&self) -> Box<dyn Model> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn toy() -> FeatureMatrix {
        FeatureMatrix::new(
            array![[0.0, 0.2], [0.2, 0.9], [0.9, 0.1], [1.0, 0.8]],
            array![0, 0, 1, 1],
        )
        .unwrap()
    }

    fn seeded(config: NetworkConfig) -> FeedForwardNetwork {
        FeedForwardNetwork::new(config.with_random_state(7))
    }

    #[test]
    fn test_one_hot() {
        assert_eq!(one_hot(1, 2), array![0.0, 1.0]);
        assert_eq!(one_hot(3, 2), array![0.0, 0.0]);
        assert_eq!(one_hot(-1, 2), array![0.0, 0.0]);
    }

    #[test]
    fn test_initialization_shapes_and_bounds() {
        let mut net = FeedForwardNetwork::default();
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(0);
        net.initialize(5, &mut rng);

        assert_eq!(net.layer_sizes(), &[5, 16, 8, 2]);
        assert_eq!(net.weights()[0].dim(), (16, 5));
        assert_eq!(net.weights()[2].dim(), (2, 8));
        let bound = 0.5 / (5.0f32).sqrt();
        assert!(net.weights()[0].iter().all(|w| w.abs() <= bound));
        assert!(net.biases().iter().all(|b| b.iter().all(|&v| v == 0.0)));
    }

    #[test]
    fn test_loss_decreases_on_separable_data() {
        let mut net = seeded(NetworkConfig::new().with_epochs(300).with_learning_rate(0.5));
        let history = net.fit(&toy()).unwrap();
        assert_eq!(history.len(), 300);
        assert!(history[299] < history[0]);
    }

    #[test]
    fn test_parallel_and_sequential_paths_agree() {
        let data = toy();
        let mut sequential = seeded(NetworkConfig::new().with_epochs(20));
        let mut parallel = seeded(NetworkConfig::new().with_epochs(20).with_parallel_threshold(1));
        let a = sequential.fit(&data).unwrap();
        let b = parallel.fit(&data).unwrap();
        assert_eq!(a, b);
        assert_eq!(sequential.weights(), parallel.weights());
    }

    #[test]
    fn test_predict_is_argmax() {
        let mut net = seeded(NetworkConfig::new().with_epochs(5));
        net.fit(&toy()).unwrap();
        let scores = net.predict_scores(&[1.0, 0.8]).unwrap();
        let expected = if scores[1] > scores[0] { 1 } else { 0 };
        assert_eq!(net.predict(&[1.0, 0.8]).unwrap(), expected);
    }

    #[test]
    fn test_predict_rejects_wrong_length() {
        let mut net = seeded(NetworkConfig::new().with_epochs(1));
        net.fit(&toy()).unwrap();
        assert!(matches!(
            net.predict(&[1.0, 2.0, 3.0]),
            Err(EnsembleError::FeatureMismatch { expected: 2, actual: 3 })
        ));
    }

    #[test]
    fn test_binary_layout_header() {
        let mut net = seeded(NetworkConfig::new().with_hidden_layers(vec![3]).with_epochs(1));
        net.fit(&toy()).unwrap();
        let mut buf = Vec::new();
        net.write_to(&mut buf).unwrap();

        let header: Vec<i32> = buf[..16]
            .chunks(4)
            .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        assert_eq!(header, vec![2, 1, 3, 2]);
        // (2*3 + 3) + (3*2 + 2) floats after the header
        assert_eq!(buf.len(), 16 + 4 * 17);
    }

    #[test]
    fn test_truncated_file_fails() {
        let mut net = FeedForwardNetwork::default();
        let mut buf = Vec::new();
        for v in [2i32, 0, 2] {
            buf.extend_from_slice(&v.to_le_bytes());
        }
        buf.extend_from_slice(&1.0f32.to_le_bytes());
        assert!(matches!(
            net.read_from(&mut buf.as_slice()),
            Err(EnsembleError::SerializationError(_))
        ));
    }

    #[test]
    fn test_huge_layer_count_fails_at_end_of_file() {
        let mut net = FeedForwardNetwork::default();
        let mut buf = Vec::new();
        for v in [5i32, i32::MAX, 16] {
            buf.extend_from_slice(&v.to_le_bytes());
        }
        assert!(matches!(
            net.read_from(&mut buf.as_slice()),
            Err(EnsembleError::SerializationError(_))
        ));
        assert!(!Model::is_fitted(&net));
    }
}
