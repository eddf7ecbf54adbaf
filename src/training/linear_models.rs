//! Logistic regression trained by full-batch gradient descent

use super::config::LinearConfig;
use super::models::{check_sample, check_training_data, Model};
use crate::data::FeatureMatrix;
use crate::error::{EnsembleError, Result};
use crate::utils::binary::{read_f32, read_f32_vec, read_len, write_f32, write_len};
use crate::utils::reduce_with;
use ndarray::{Array1, ArrayView1};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::time::Instant;
use tracing::info;

/// Probability clamp used by the cross-entropy loss
const PROB_EPSILON: f64 = 1e-7;

/// Per-sample gradient terms summed over a share of the rows
#[derive(Debug, Clone)]
struct GradientSums {
    weights: Vec<f64>,
    bias: f64,
    loss: f64,
}

impl GradientSums {
    fn zeros(n_features: usize) -> Self {
        Self {
            weights: vec![0.0; n_features],
            bias: 0.0,
            loss: 0.0,
        }
    }

    fn merge(&mut self, other: GradientSums) {
        for (a, b) in self.weights.iter_mut().zip(other.weights) {
            *a += b;
        }
        self.bias += other.bias;
        self.loss += other.loss;
    }
}

/// Binary logistic regression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticRegression {
    config: LinearConfig,
    weights: Array1<f32>,
    bias: f32,
    is_fitted: bool,
}

impl Default for LogisticRegression {
    fn default() -> Self {
        Self::new(LinearConfig::default())
    }
}

impl LogisticRegression {
    pub fn new(config: LinearConfig) -> Self {
        Self {
            config,
            weights: Array1::zeros(0),
            bias: 0.0,
            is_fitted: false,
        }
    }

    pub fn config(&self) -> &LinearConfig {
        &self.config
    }

    pub fn weights(&self) -> &Array1<f32> {
        &self.weights
    }

    pub fn bias(&self) -> f32 {
        self.bias
    }

    fn sigmoid(z: f32) -> f32 {
        1.0 / (1.0 + (-z).exp())
    }

    fn linear(&self, x: ArrayView1<f32>) -> f32 {
        self.bias + self.weights.dot(&x)
    }

    /// Run `max_iterations` gradient steps; returns the loss of every iteration
    pub fn fit(&mut self, data: &FeatureMatrix) -> Result<Vec<f32>> {
        check_training_data(data)?;
        self.config.validate()?;

        let n_samples = data.n_samples();
        let n_features = data.n_features();
        let iterations = self.config.max_iterations;
        let lr = self.config.learning_rate;

        let mut rng = match self.config.random_state {
            Some(seed) => Xoshiro256PlusPlus::seed_from_u64(seed),
            None => Xoshiro256PlusPlus::from_entropy(),
        };
        self.weights = Array1::from_shape_fn(n_features, |_| rng.gen_range(-0.1f32..0.1));
        self.bias = 0.0;
        self.is_fitted = true;

        info!(n_samples, n_features, iterations, learning_rate = lr, "Training logistic regression");

        let start = Instant::now();
        let mut history = Vec::with_capacity(iterations);

        for iteration in 0..iterations {
            let sums = self.gradient_sums(data);
            let n = n_samples as f64;

            for (w, g) in self.weights.iter_mut().zip(&sums.weights) {
                *w -= lr * (g / n) as f32;
            }
            self.bias -= lr * (sums.bias / n) as f32;

            let loss = (sums.loss / n) as f32;
            history.push(loss);

            let step = iteration + 1;
            if step == 1 || step % 10 == 0 || step == iterations {
                info!(iteration = step, loss, "Logistic regression iteration");
            }
        }

        info!(
            elapsed_ms = start.elapsed().as_millis() as u64,
            final_loss = history.last().copied().unwrap_or(0.0),
            "Logistic regression trained"
        );
        Ok(history)
    }

    /// Sums of `error`, `error * x_j` and the loss at the current parameters
    fn gradient_sums(&self, data: &FeatureMatrix) -> GradientSums {
        let n_features = data.n_features();
        reduce_with(
            (0..data.n_samples()).into_par_iter(),
            GradientSums::zeros(n_features),
            || GradientSums::zeros(n_features),
            |mut partial, i| {
                let x = data.row(i);
                let y = data.label(i) as f64;
                let p = Self::sigmoid(self.linear(x)) as f64;
                let error = p - y;

                for (g, &xj) in partial.weights.iter_mut().zip(x.iter()) {
                    *g += error * xj as f64;
                }
                partial.bias += error;

                let p = p.clamp(PROB_EPSILON, 1.0 - PROB_EPSILON);
                partial.loss -= y * p.ln() + (1.0 - y) * (1.0 - p).ln();
                partial
            },
            GradientSums::merge,
        )
    }

    /// Probability of the positive class for one sample
    pub fn predict_proba(&self, sample: &[f32]) -> Result<f32> {
        check_sample(self, sample)?;
        Ok(Self::sigmoid(self.linear(ArrayView1::from(sample))))
    }

    pub fn predict_proba_batch(&self, data: &FeatureMatrix) -> Result<Vec<f32>> {
        if !self.is_fitted {
            return Err(EnsembleError::ModelNotFitted);
        }
        if data.n_features() != self.weights.len() {
            return Err(EnsembleError::FeatureMismatch {
                expected: self.weights.len(),
                actual: data.n_features(),
            });
        }
        Ok((0..data.n_samples())
            .into_par_iter()
            .map(|i| Self::sigmoid(self.linear(data.row(i))))
            .collect())
    }

    fn write_to<W: Write>(&self, w: &mut W) -> Result<()> {
        write_len(w, self.weights.len())?;
        write_f32(w, self.bias)?;
        for &v in self.weights.iter() {
            write_f32(w, v)?;
        }
        Ok(())
    }

    fn read_from<R: Read>(&mut self, r: &mut R) -> Result<()> {
        let n_features = read_len(r)?;
        if n_features == 0 {
            return Err(EnsembleError::SerializationError(
                "logistic regression file declares zero features".to_string(),
            ));
        }
        let bias = read_f32(r)?;
        let weights = read_f32_vec(r, n_features)?;
        self.bias = bias;
        self.weights = Array1::from_vec(weights);
        self.is_fitted = true;
        Ok(())
    }
}

impl Model for LogisticRegression {
    fn name(&self) -> &'static str {
        "Logistic Regression"
    }

    fn n_features(&self) -> usize {
        self.weights.len()
    }

    fn is_fitted(&self) -> bool {
        self.is_fitted
    }

    fn train(&mut self, data: &FeatureMatrix) -> Result<()> {
        self.fit(data).map(|_| ())
    }

    fn predict(&self, sample: &[f32]) -> Result<i32> {
        Ok(i32::from(self.predict_proba(sample)? >= 0.5))
    }

    fn predict_batch(&self, data: &FeatureMatrix) -> Result<Vec<i32>> {
        Ok(self
            .predict_proba_batch(data)?
            .into_iter()
            .map(|p| i32::from(p >= 0.5))
            .collect())
    }

    fn save(&self, path: &Path) -> Result<()> {
        if !self.is_fitted {
            return Err(EnsembleError::ModelNotFitted);
        }
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut writer = BufWriter::new(File::create(path)?);
        self.write_to(&mut writer)?;
        writer.flush()?;
        info!(path = %path.display(), n_features = self.weights.len(), "Logistic regression saved");
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

    fn seeded() -> LogisticRegression {
        LogisticRegression::new(
            LinearConfig::new()
                .with_learning_rate(1.0)
                .with_max_iterations(500)
                .with_random_state(3),
        )
    }

    #[test]
    fn test_loss_decreases_and_separates() {
        let data = toy();
        let mut model = seeded();
        let history = model.fit(&data).unwrap();
        assert_eq!(history.len(), 500);
        assert!(history[499] < history[0]);
        assert!(history.windows(2).all(|w| w[1] <= w[0] + 1e-6));

        assert_eq!(model.predict_batch(&data).unwrap(), vec![0, 0, 1, 1]);
    }

    #[test]
    fn test_initial_weights_within_bounds() {
        let mut model = LogisticRegression::new(
            LinearConfig::new().with_max_iterations(0).with_random_state(1),
        );
        model.fit(&toy()).unwrap();
        assert_eq!(model.bias(), 0.0);
        assert!(model.weights().iter().all(|w| w.abs() <= 0.1));
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let mut model = LogisticRegression::default();
        model.weights = array![0.0, 0.0];
        model.is_fitted = true;
        assert_eq!(model.predict_proba(&[3.0, -1.0]).unwrap(), 0.5);
        assert_eq!(model.predict(&[3.0, -1.0]).unwrap(), 1);
    }

    #[test]
    fn test_binary_layout() {
        let mut model = LogisticRegression::default();
        model.weights = array![1.0, -2.0];
        model.bias = 0.5;
        model.is_fitted = true;

        let mut buf = Vec::new();
        model.write_to(&mut buf).unwrap();
        assert_eq!(buf.len(), 4 + 4 + 8);
        assert_eq!(&buf[..4], &2i32.to_le_bytes());
        assert_eq!(&buf[4..8], &0.5f32.to_le_bytes());

        let mut loaded = LogisticRegression::default();
        loaded.read_from(&mut buf.as_slice()).unwrap();
        assert_eq!(loaded.weights(), model.weights());
        assert_eq!(loaded.bias(), 0.5);
    }

    #[test]
    fn test_unfitted_predict_errors() {
        let model = LogisticRegression::default();
        assert!(matches!(model.predict(&[0.0]), Err(EnsembleError::ModelNotFitted)));
    }
}
