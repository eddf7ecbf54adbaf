//! Binary classification tree with Gini splits

use crate::data::FeatureMatrix;
use crate::error::{EnsembleError, Result};
use crate::utils::binary::{read_f32, read_i32, read_len, read_u8, write_f32, write_i32, write_len, write_u8};
use crate::utils::reduce_with;
use rand::seq::index;
use rand::Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::io::{Read, Write};

const LEAF_FLAG: u8 = 1;
const SPLIT_FLAG: u8 = 0;

/// Nesting limit when reading a serialized tree
const MAX_SERIALIZED_DEPTH: usize = 4096;

/// Decision tree node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TreeNode {
    /// Leaf node with predicted class
    Leaf { class: i32 },
    /// Internal node; samples with `x[feature] <= threshold` go left
    Split {
        feature: usize,
        threshold: f32,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
    },
}

impl TreeNode {
    fn predict(&self, sample: &[f32]) -> i32 {
        let mut node = self;
        loop {
            match node {
                TreeNode::Leaf { class } => return *class,
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if sample[*feature] <= *threshold { left } else { right };
                }
            }
        }
    }

    fn depth(&self) -> usize {
        match self {
            TreeNode::Leaf { .. } => 0,
            TreeNode::Split { left, right, .. } => 1 + left.depth().max(right.depth()),
        }
    }

    fn n_leaves(&self) -> usize {
        match self {
            TreeNode::Leaf { .. } => 1,
            TreeNode::Split { left, right, .. } => left.n_leaves() + right.n_leaves(),
        }
    }

    /// Pre-order: leaf flag, then class or (feature, threshold, left, right)
    fn write_to<W: Write>(&self, w: &mut W) -> Result<()> {
        match self {
            TreeNode::Leaf { class } => {
                write_u8(w, LEAF_FLAG)?;
                write_i32(w, *class)
            }
            TreeNode::Split {
                feature,
                threshold,
                left,
                right,
            } => {
                write_u8(w, SPLIT_FLAG)?;
                write_len(w, *feature)?;
                write_f32(w, *threshold)?;
                left.write_to(w)?;
                right.write_to(w)
            }
        }
    }

    fn read_from<R: Read>(r: &mut R, depth: usize) -> Result<Self> {
        if depth > MAX_SERIALIZED_DEPTH {
            return Err(EnsembleError::SerializationError(format!(
                "tree nesting exceeds {} levels",
                MAX_SERIALIZED_DEPTH
            )));
        }
        match read_u8(r)? {
            LEAF_FLAG => Ok(TreeNode::Leaf { class: read_i32(r)? }),
            SPLIT_FLAG => {
                let feature = read_len(r)?;
                let threshold = read_f32(r)?;
                let left = Box::new(Self::read_from(r, depth + 1)?);
                let right = Box::new(Self::read_from(r, depth + 1)?);
                Ok(TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                })
            }
            flag => Err(EnsembleError::SerializationError(format!(
                "invalid node flag {}",
                flag
            ))),
        }
    }

    fn max_feature(&self) -> Option<usize> {
        match self {
            TreeNode::Leaf { .. } => None,
            TreeNode::Split {
                feature, left, right, ..
            } => Some(
                [Some(*feature), left.max_feature(), right.max_feature()]
                    .into_iter()
                    .flatten()
                    .max()
                    .unwrap_or(*feature),
            ),
        }
    }
}

/// Gini impurity `1 - sum(p_c^2)` of a label set
pub fn gini_impurity(labels: &[i32]) -> f64 {
    let mut counts = ClassCounts::default();
    for &label in labels {
        counts.add(label);
    }
    counts.gini()
}

/// Class counts of a binary label set
#[derive(Debug, Clone, Copy, Default)]
struct ClassCounts {
    zeros: usize,
    ones: usize,
}

impl ClassCounts {
    fn add(&mut self, label: i32) {
        if label == 1 {
            self.ones += 1;
        } else {
            self.zeros += 1;
        }
    }

    fn total(&self) -> usize {
        self.zeros + self.ones
    }

    fn gini(&self) -> f64 {
        let n = self.total();
        if n == 0 {
            return 0.0;
        }
        let p0 = self.zeros as f64 / n as f64;
        let p1 = self.ones as f64 / n as f64;
        1.0 - (p0 * p0 + p1 * p1)
    }

    fn minus(&self, other: &ClassCounts) -> ClassCounts {
        ClassCounts {
            zeros: self.zeros - other.zeros,
            ones: self.ones - other.ones,
        }
    }
}

/// Most frequent label; ties go to the label encountered first
pub fn majority_label<I: IntoIterator<Item = i32>>(labels: I) -> i32 {
    let mut tally: Vec<(i32, usize)> = Vec::with_capacity(2);
    for label in labels {
        match tally.iter_mut().find(|(l, _)| *l == label) {
            Some((_, count)) => *count += 1,
            None => tally.push((label, 1)),
        }
    }
    let mut best: Option<(i32, usize)> = None;
    for (label, count) in tally {
        if best.map_or(true, |(_, c)| count > c) {
            best = Some((label, count));
        }
    }
    best.map_or(0, |(label, _)| label)
}

/// Best split found so far
#[derive(Debug, Clone, Copy)]
struct SplitCandidate {
    impurity: f64,
    /// Position of the feature in the drawn candidate list
    position: usize,
    feature: usize,
    threshold: f32,
}

impl SplitCandidate {
    /// Total order: lower impurity, then earlier candidate, then smaller threshold
    fn cmp_rank(&self, other: &SplitCandidate) -> Ordering {
        self.impurity
            .total_cmp(&other.impurity)
            .then(self.position.cmp(&other.position))
            .then(self.threshold.total_cmp(&other.threshold))
    }
}

fn keep_better(current: Option<SplitCandidate>, candidate: Option<SplitCandidate>) -> Option<SplitCandidate> {
    match (current, candidate) {
        (Some(a), Some(b)) => Some(if b.cmp_rank(&a) == Ordering::Less { b } else { a }),
        (a, b) => a.or(b),
    }
}

/// Decision tree classifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    root: Option<TreeNode>,
    pub max_depth: usize,
    pub min_samples_leaf: usize,
    /// Candidate features per split (None = `max(1, floor(sqrt(D)))`)
    pub max_features: Option<usize>,
    n_features: usize,
}

impl Default for DecisionTree {
    fn default() -> Self {
        Self::new(10, 2)
    }
}

impl DecisionTree {
    pub fn new(max_depth: usize, min_samples_leaf: usize) -> Self {
        Self {
            root: None,
            max_depth,
            min_samples_leaf,
            max_features: None,
            n_features: 0,
        }
    }

    pub fn with_max_features(mut self, n: usize) -> Self {
        self.max_features = Some(n);
        self
    }

    /// Candidate feature count per split for `n_features` columns
    pub fn mtry(n_features: usize) -> usize {
        ((n_features as f64).sqrt().floor() as usize).max(1)
    }

    fn n_candidates(&self, n_features: usize) -> usize {
        self.max_features
            .unwrap_or_else(|| Self::mtry(n_features))
            .clamp(1, n_features.max(1))
    }

    /// Grow the tree from the given (possibly repeated) row indices
    pub fn fit_indices<R: Rng>(&mut self, data: &FeatureMatrix, indices: &[usize], rng: &mut R) -> Result<()> {
        if data.n_features() == 0 {
            return Err(EnsembleError::TrainingError("no features to split on".to_string()));
        }
        if let Some(&bad) = indices.iter().find(|&&i| i >= data.n_samples()) {
            return Err(EnsembleError::ShapeError {
                expected: format!("row index < {}", data.n_samples()),
                actual: bad.to_string(),
            });
        }
        self.n_features = data.n_features();
        self.root = Some(self.build_node(data, indices, 0, rng));
        Ok(())
    }

    /// Grow the tree from all rows
    pub fn fit<R: Rng>(&mut self, data: &FeatureMatrix, rng: &mut R) -> Result<()> {
        let indices: Vec<usize> = (0..data.n_samples()).collect();
        self.fit_indices(data, &indices, rng)
    }

    fn build_node<R: Rng>(&self, data: &FeatureMatrix, indices: &[usize], depth: usize, rng: &mut R) -> TreeNode {
        let leaf = || TreeNode::Leaf {
            class: majority_label(indices.iter().map(|&i| data.label(i))),
        };

        if depth >= self.max_depth || indices.len() <= self.min_samples_leaf {
            return leaf();
        }

        let mut parent = ClassCounts::default();
        for &i in indices {
            parent.add(data.label(i));
        }
        let parent_gini = parent.gini();

        let n_features = data.n_features();
        let candidates = index::sample(rng, n_features, self.n_candidates(n_features)).into_vec();

        let best = match self.find_best_split(data, indices, &candidates, parent) {
            Some(best) if best.impurity < parent_gini => best,
            _ => return leaf(),
        };

        let (left_idx, right_idx): (Vec<usize>, Vec<usize>) = indices
            .iter()
            .partition(|&&i| data.value(i, best.feature) <= best.threshold);

        if left_idx.is_empty() || right_idx.is_empty() {
            return leaf();
        }

        TreeNode::Split {
            feature: best.feature,
            threshold: best.threshold,
            left: Box::new(self.build_node(data, &left_idx, depth + 1, rng)),
            right: Box::new(self.build_node(data, &right_idx, depth + 1, rng)),
        }
    }

    /// Parallel over candidate features; each task sweeps its thresholds in sorted order
    fn find_best_split(
        &self,
        data: &FeatureMatrix,
        indices: &[usize],
        candidates: &[usize],
        parent: ClassCounts,
    ) -> Option<SplitCandidate> {
        reduce_with(
            candidates.par_iter().enumerate(),
            None,
            || None,
            |best, (position, &feature)| {
                keep_better(best, self.best_threshold(data, indices, position, feature, parent))
            },
            |acc, partial| *acc = keep_better(*acc, partial),
        )
    }

    fn best_threshold(
        &self,
        data: &FeatureMatrix,
        indices: &[usize],
        position: usize,
        feature: usize,
        parent: ClassCounts,
    ) -> Option<SplitCandidate> {
        let values: Vec<(f32, i32)> = indices
            .iter()
            .map(|&i| (data.value(i, feature), data.label(i)))
            .collect();
        self.sweep_thresholds(values, position, feature, parent)
    }

    /// Sorted sweep over `(value, label)` pairs; each distinct value is tried as a threshold
    fn sweep_thresholds(
        &self,
        mut values: Vec<(f32, i32)>,
        position: usize,
        feature: usize,
        parent: ClassCounts,
    ) -> Option<SplitCandidate> {
        values.sort_by(|a, b| a.0.total_cmp(&b.0));

        let n = values.len() as f64;
        let mut left = ClassCounts::default();
        let mut best: Option<SplitCandidate> = None;

        let mut i = 0;
        while i < values.len() {
            let threshold = values[i].0;
            // every sample equal to the threshold goes left; the first always advances
            loop {
                left.add(values[i].1);
                i += 1;
                if i >= values.len() || values[i].0.total_cmp(&threshold) != Ordering::Equal {
                    break;
                }
            }
            let right = parent.minus(&left);
            let (n_left, n_right) = (left.total(), right.total());
            if n_left == 0 || n_right == 0 || n_left < self.min_samples_leaf || n_right < self.min_samples_leaf {
                continue;
            }
            let impurity = (n_left as f64 * left.gini() + n_right as f64 * right.gini()) / n;
            if best.map_or(true, |b| impurity < b.impurity) {
                best = Some(SplitCandidate {
                    impurity,
                    position,
                    feature,
                    threshold,
                });
            }
        }
        best
    }

    pub fn is_fitted(&self) -> bool {
        self.root.is_some()
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn root(&self) -> Option<&TreeNode> {
        self.root.as_ref()
    }

    /// Predict a sample whose length has already been checked
    pub(crate) fn predict_unchecked(&self, sample: &[f32]) -> i32 {
        self.root.as_ref().map_or(0, |root| root.predict(sample))
    }

    pub fn predict(&self, sample: &[f32]) -> Result<i32> {
        if self.root.is_none() {
            return Err(EnsembleError::ModelNotFitted);
        }
        if sample.len() != self.n_features {
            return Err(EnsembleError::FeatureMismatch {
                expected: self.n_features,
                actual: sample.len(),
            });
        }
        Ok(self.predict_unchecked(sample))
    }

    /// Number of split levels below the root
    pub fn depth(&self) -> usize {
        self.root.as_ref().map_or(0, TreeNode::depth)
    }

    pub fn n_leaves(&self) -> usize {
        self.root.as_ref().map_or(0, TreeNode::n_leaves)
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<()> {
        match &self.root {
            Some(root) => root.write_to(w),
            None => Err(EnsembleError::ModelNotFitted),
        }
    }

    /// Read a pre-order node stream for a model over `n_features` columns
    pub fn read_from<R: Read>(&mut self, r: &mut R, n_features: usize) -> Result<()> {
        let root = TreeNode::read_from(r, 0)?;
        if let Some(feature) = root.max_feature().filter(|&f| f >= n_features) {
            return Err(EnsembleError::SerializationError(format!(
                "split on feature {} but model has {} features",
                feature, n_features
            )));
        }
        self.root = Some(root);
        self.n_features = n_features;
        Ok(())
    }
}
