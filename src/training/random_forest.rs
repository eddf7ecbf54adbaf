//! Random Forest implementation

use super::config::ForestConfig;
use super::decision_tree::{majority_label, DecisionTree};
use super::models::{check_sample, check_training_data, Model};
use crate::data::FeatureMatrix;
use crate::error::{EnsembleError, Result};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info};

/// Bootstrap-aggregated ensemble of decision trees
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    trees: Vec<DecisionTree>,
    config: ForestConfig,
    n_features: usize,
}

impl Default for RandomForest {
    fn default() -> Self {
        Self::new(ForestConfig::default())
    }
}

/// `{prefix}{suffix}` without treating the prefix as a directory
fn with_suffix(prefix: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(prefix.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

/// File holding tree `index` under `prefix`
pub fn tree_path(prefix: &Path, index: usize) -> PathBuf {
    with_suffix(prefix, &format!("_tree_{}.bin", index))
}

/// Metadata file under `prefix`
pub fn meta_path(prefix: &Path) -> PathBuf {
    with_suffix(prefix, "_meta.txt")
}

/// Contents of the forest metadata file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForestMeta {
    pub n_trees: usize,
    pub max_depth: usize,
    pub min_samples_leaf: usize,
    pub n_features: usize,
}

impl ForestMeta {
    fn parse(text: &str) -> Result<Self> {
        let fields: Vec<usize> = text
            .split_whitespace()
            .map(|field| {
                field.parse::<usize>().map_err(|_| {
                    EnsembleError::SerializationError(format!("invalid forest metadata field: {}", field))
                })
            })
            .collect::<Result<_>>()?;

        match fields.as_slice() {
            [n_trees, max_depth, min_samples_leaf, n_features] => Ok(Self {
                n_trees: *n_trees,
                max_depth: *max_depth,
                min_samples_leaf: *min_samples_leaf,
                n_features: *n_features,
            }),
            _ => Err(EnsembleError::SerializationError(format!(
                "forest metadata needs 4 fields, found {}",
                fields.len()
            ))),
        }
    }

    fn read(prefix: &Path) -> Result<Self> {
        Self::parse(&fs::read_to_string(meta_path(prefix))?)
    }
}

impl RandomForest {
    pub fn new(config: ForestConfig) -> Self {
        Self {
            trees: Vec::new(),
            config,
            n_features: 0,
        }
    }

    pub fn config(&self) -> &ForestConfig {
        &self.config
    }

    /// Train `n_trees` trees in parallel, each on its own bootstrap resample
    pub fn fit(&mut self, data: &FeatureMatrix) -> Result<()> {
        check_training_data(data)?;
        self.config.validate()?;

        let start = Instant::now();
        let n_samples = data.n_samples();
        let base_seed = self.config.random_state.unwrap_or_else(rand::random);
        let (max_depth, min_samples_leaf) = (self.config.max_depth, self.config.min_samples_leaf);

        info!(
            n_trees = self.config.n_trees,
            max_depth,
            min_samples_leaf,
            n_samples,
            n_features = data.n_features(),
            "Training random forest"
        );

        let trees: Vec<DecisionTree> = (0..self.config.n_trees)
            .into_par_iter()
            .map(|tree_idx| -> Result<DecisionTree> {
                let mut rng = ChaCha8Rng::seed_from_u64(base_seed.wrapping_add(tree_idx as u64));
                let sample_indices: Vec<usize> =
                    (0..n_samples).map(|_| rng.gen_range(0..n_samples)).collect();

                let mut tree = DecisionTree::new(max_depth, min_samples_leaf);
                tree.fit_indices(data, &sample_indices, &mut rng)?;
                debug!(tree_idx, depth = tree.depth(), leaves = tree.n_leaves(), "Tree built");
                Ok(tree)
            })
            .collect::<Result<_>>()?;

        self.trees = trees;
        self.n_features = data.n_features();

        info!(
            n_trees = self.trees.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Random forest trained"
        );
        Ok(())
    }

    /// Per-tree predictions in tree order
    pub fn tree_votes(&self, sample: &[f32]) -> Result<Vec<i32>> {
        check_sample(self, sample)?;
        Ok(self.trees.iter().map(|t| t.predict_unchecked(sample)).collect())
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn trees(&self) -> &[DecisionTree] {
        &self.trees
    }

    /// Deepest tree in the forest
    pub fn depth(&self) -> usize {
        self.trees.iter().map(DecisionTree::depth).max().unwrap_or(0)
    }

    pub fn n_leaves(&self) -> usize {
        self.trees.iter().map(DecisionTree::n_leaves).sum()
    }

    /// Write each tree to `{prefix}_tree_{i}.bin` and the metadata to `{prefix}_meta.txt`
    pub fn save_to_prefix(&self, prefix: &Path) -> Result<()> {
        if self.trees.is_empty() {
            return Err(EnsembleError::ModelNotFitted);
        }
        if let Some(parent) = prefix.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        for (i, tree) in self.trees.iter().enumerate() {
            let mut writer = BufWriter::new(File::create(tree_path(prefix, i))?);
            tree.write_to(&mut writer)?;
            writer.flush()?;
        }

        fs::write(
            meta_path(prefix),
            format!(
                "{} {} {} {}\n",
                self.trees.len(),
                self.config.max_depth,
                self.config.min_samples_leaf,
                self.n_features
            ),
        )?;

        info!(prefix = %prefix.display(), n_trees = self.trees.len(), "Random forest saved");
        Ok(())
    }

    /// Restore a forest, adopting the persisted hyperparameters
    pub fn load_from_prefix(&mut self, prefix: &Path) -> Result<()> {
        let meta = ForestMeta::read(prefix)?;
        if meta.n_trees == 0 || meta.n_features == 0 {
            return Err(EnsembleError::SerializationError(format!(
                "forest metadata describes an empty model: {:?}",
                meta
            )));
        }

        let trees = (0..meta.n_trees)
            .map(|i| -> Result<DecisionTree> {
                let mut reader = BufReader::new(File::open(tree_path(prefix, i))?);
                let mut tree = DecisionTree::new(meta.max_depth, meta.min_samples_leaf);
                tree.read_from(&mut reader, meta.n_features)?;
                Ok(tree)
            })
            .collect::<Result<Vec<_>>>()?;

        self.trees = trees;
        self.n_features = meta.n_features;
        self.config.n_trees = meta.n_trees;
        self.config.max_depth = meta.max_depth;
        self.config.min_samples_leaf = meta.min_samples_leaf;
        debug!(prefix = %prefix.display(), n_trees = meta.n_trees, "Random forest loaded");
        Ok(())
    }

    /// Restore a forest whose metadata must match this forest's configuration
    pub fn load_expecting(&mut self, prefix: &Path, n_features: usize) -> Result<()> {
        let meta = ForestMeta::read(prefix)?;
        let expected = ForestMeta {
            n_trees: self.config.n_trees,
            max_depth: self.config.max_depth,
            min_samples_leaf: self.config.min_samples_leaf,
            n_features,
        };
        if meta.n_features != n_features {
            return Err(EnsembleError::FeatureMismatch {
                expected: n_features,
                actual: meta.n_features,
            });
        }
        if meta != expected {
            return Err(EnsembleError::ConfigError(format!(
                "forest metadata {:?} does not match configuration {:?}",
                meta, expected
            )));
        }
        self.load_from_prefix(prefix)
    }
}

impl Model for RandomForest {
    fn name(&self) -> &'static str {
        "Random Forest"
    }

    fn n_features(&self) -> usize {
        self.n_features
    }

    fn is_fitted(&self) -> bool {
        !self.trees.is_empty()
    }

    fn train(&mut self, data: &FeatureMatrix) -> Result<()> {
        self.fit(data)
    }

    /// Majority vote across trees; ties go to the vote seen first in tree order
    fn predict(&self, sample: &[f32]) -> Result<i32> {
        Ok(majority_label(self.tree_votes(sample)?))
    }

    fn save(&self, path: &Path) -> Result<()> {
        self.save_to_prefix(path)
    }

    fn load(&mut self, path: &Path) -> Result<()> {
        self.load_from_prefix(path)
    }

    fn clone_box(&self) -> Box<dyn Model> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn blobs(n: usize) -> FeatureMatrix {
        let features = Array2::from_shape_fn((n, 4), |(i, j)| {
            let base = if i % 2 == 0 { -1.0 } else { 1.0 };
            base + ((i * 7 + j * 3) % 10) as f32 * 0.05
        });
        let labels = (0..n).map(|i| (i % 2) as i32).collect();
        FeatureMatrix::new(features, labels).unwrap()
    }

    fn small_config() -> ForestConfig {
        ForestConfig::new().with_n_trees(7).with_max_depth(4).with_random_state(42)
    }

    #[test]
    fn test_fit_and_predict() {
        let data = blobs(40);
        let mut forest = RandomForest::new(small_config());
        forest.fit(&data).unwrap();
        assert_eq!(forest.n_trees(), 7);
        assert!(forest.depth() <= 4);

        let correct = (0..data.n_samples())
            .filter(|&i| forest.predict(&data.row(i).to_vec()).unwrap() == data.label(i))
            .count();
        assert!(correct as f64 / data.n_samples() as f64 > 0.9);
    }

    #[test]
    fn test_seeded_training_is_deterministic() {
        let data = blobs(30);
        let mut a = RandomForest::new(small_config());
        let mut b = RandomForest::new(small_config());
        a.fit(&data).unwrap();
        b.fit(&data).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_predict_is_majority_of_tree_votes() {
        let data = blobs(30);
        let mut forest = RandomForest::new(small_config());
        forest.fit(&data).unwrap();
        for i in 0..data.n_samples() {
            let sample = data.row(i).to_vec();
            let votes = forest.tree_votes(&sample).unwrap();
            let ones = votes.iter().filter(|&&v| v == 1).count();
            let expected = if ones * 2 > votes.len() { 1 } else { 0 };
            assert_eq!(forest.predict(&sample).unwrap(), expected);
        }
    }

    #[test]
    fn test_unfitted_predict_errors() {
        let forest = RandomForest::default();
        assert!(matches!(forest.predict(&[0.0; 4]), Err(EnsembleError::ModelNotFitted)));
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("random_forest_model.bin");
        let data = blobs(30);
        let mut forest = RandomForest::new(small_config());
        forest.fit(&data).unwrap();
        forest.save_to_prefix(&prefix).unwrap();

        assert!(tree_path(&prefix, 0).exists());
        let meta = fs::read_to_string(meta_path(&prefix)).unwrap();
        assert_eq!(meta.trim(), "7 4 2 4");

        let mut loaded = RandomForest::default();
        loaded.load_from_prefix(&prefix).unwrap();
        assert_eq!(loaded.n_trees(), 7);
        assert_eq!(loaded.config().max_depth, 4);
        for i in 0..data.n_samples() {
            let sample = data.row(i).to_vec();
            assert_eq!(loaded.predict(&sample).unwrap(), forest.predict(&sample).unwrap());
        }
    }

    #[test]
    fn test_load_expecting_rejects_other_feature_count() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("rf");
        let mut forest = RandomForest::new(small_config());
        forest.fit(&blobs(20)).unwrap();
        forest.save_to_prefix(&prefix).unwrap();

        let mut other = RandomForest::new(small_config());
        assert!(matches!(
            other.load_expecting(&prefix, 5),
            Err(EnsembleError::FeatureMismatch { expected: 5, actual: 4 })
        ));
        assert!(other.load_expecting(&prefix, 4).is_ok());
    }

    #[test]
    fn test_missing_tree_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("rf");
        fs::write(meta_path(&prefix), "2 3 2 4").unwrap();
        let mut forest = RandomForest::default();
        assert!(matches!(forest.load_from_prefix(&prefix), Err(EnsembleError::IoError(_))));
    }

    #[test]
    fn test_malformed_metadata() {
        assert!(ForestMeta::parse("1 2 3").is_err());
        assert!(ForestMeta::parse("1 2 x 4").is_err());
        assert_eq!(ForestMeta::parse("3 10 2 5\n").unwrap().n_features, 5);
    }
}
