//! CART decision trees stored as node arenas.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::error::RfError;
use crate::node::{Node, NodeIndex};
use crate::split::{SplitContext, SplitCriterion, best_split};

/// Configuration for a single CART decision tree.
///
/// # Defaults
///
/// | Parameter           | Default               |
/// |---------------------|-----------------------|
/// | `criterion`         | `Gini`                |
/// | `max_depth`         | `None` (unlimited)    |
/// | `min_samples_split` | 2                     |
/// | `min_samples_leaf`  | 1                     |
/// | `max_features`      | `None` (all features) |
/// | `seed`              | 42                    |
#[derive(Debug, Clone)]
pub struct DecisionTreeConfig {
    pub(crate) criterion: SplitCriterion,
    pub(crate) max_depth: Option<usize>,
    pub(crate) min_samples_split: usize,
    pub(crate) min_samples_leaf: usize,
    pub(crate) max_features: Option<usize>,
    pub(crate) seed: u64,
}

impl DecisionTreeConfig {
    /// Create a config with the defaults listed above.
    #[must_use]
    pub fn new() -> Self {
        Self {
            criterion: SplitCriterion::Gini,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
            seed: 42,
        }
    }

    /// Set the split quality criterion.
    #[must_use]
    pub fn with_criterion(mut self, criterion: SplitCriterion) -> Self {
        self.criterion = criterion;
        self
    }

    /// Limit the depth of the tree; the root sits at depth 0.
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: Option<usize>) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Set the minimum number of samples required to attempt a split.
    #[must_use]
    pub fn with_min_samples_split(mut self, min_samples_split: usize) -> Self {
        self.min_samples_split = min_samples_split;
        self
    }

    /// Set the minimum number of samples each child must keep.
    #[must_use]
    pub fn with_min_samples_leaf(mut self, min_samples_leaf: usize) -> Self {
        self.min_samples_leaf = min_samples_leaf;
        self
    }

    /// Set how many features are drawn at each split. `None` draws all.
    #[must_use]
    pub fn with_max_features(mut self, max_features: Option<usize>) -> Self {
        self.max_features = max_features;
        self
    }

    /// Set the random seed for feature sampling.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Grow a tree on row-major `features[sample][feature]` with zero-based `labels`.
    ///
    /// # Errors
    ///
    /// | Variant | When |
    /// |---|---|
    /// | [`RfError::EmptyDataset`] | `features` is empty |
    /// | [`RfError::ZeroFeatures`] | rows have no columns |
    /// | [`RfError::LabelCountMismatch`] | `labels.len() != features.len()` |
    /// | [`RfError::LabelOutOfRange`] | a label exceeds [`MAX_CLASS_LABEL`] |
    /// | [`RfError::FeatureCountMismatch`] | rows have inconsistent lengths |
    /// | [`RfError::NonFiniteValue`] | a value is NaN or infinite |
    /// | [`RfError::InvalidMaxDepth`] | `max_depth` is `Some(0)` |
    /// | [`RfError::InvalidMinSamplesSplit`] | `min_samples_split < 2` |
    /// | [`RfError::InvalidMinSamplesLeaf`] | `min_samples_leaf < 1` |
    /// | [`RfError::InvalidMaxFeatures`] | `max_features` outside `[1, n_features]` |
    #[instrument(skip_all, fields(n_samples = features.len()))]
    pub fn fit(&self, features: &[Vec<f64>], labels: &[usize]) -> Result<DecisionTree, RfError> {
        let n_features = validate_training_data(features, labels)?;

        if self.max_depth == Some(0) {
            return Err(RfError::InvalidMaxDepth { max_depth: 0 });
        }
        if self.min_samples_split < 2 {
            return Err(RfError::InvalidMinSamplesSplit {
                min_samples_split: self.min_samples_split,
            });
        }
        if self.min_samples_leaf < 1 {
            return Err(RfError::InvalidMinSamplesLeaf {
                min_samples_leaf: self.min_samples_leaf,
            });
        }
        let max_features = self.max_features.unwrap_or(n_features);
        if max_features == 0 || max_features > n_features {
            return Err(RfError::InvalidMaxFeatures {
                max_features,
                n_features,
            });
        }

        let n_classes = labels.iter().max().map_or(1, |&m| m + 1);
        let columns: Vec<Vec<f64>> = (0..n_features)
            .map(|f| features.iter().map(|row| row[f]).collect())
            .collect();

        let mut builder = TreeBuilder {
            columns: &columns,
            labels,
            ctx: SplitContext {
                n_classes,
                criterion: self.criterion,
                max_features,
                min_samples_leaf: self.min_samples_leaf,
            },
            max_depth: self.max_depth,
            min_samples_split: self.min_samples_split,
            rng: ChaCha8Rng::seed_from_u64(self.seed),
            arena: Vec::new(),
        };
        let all: Vec<usize> = (0..features.len()).collect();
        builder.grow(&all, 0);

        debug!(n_nodes = builder.arena.len(), n_classes, "decision tree built");

        Ok(DecisionTree {
            nodes: builder.arena,
            n_features,
            n_classes,
        })
    }
}

impl Default for DecisionTreeConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Largest class label a tree accepts; leaf distributions are sized by it.
pub const MAX_CLASS_LABEL: usize = u16::MAX as usize;

/// Check shape, label range and finiteness of a training set; returns the feature count.
pub(crate) fn validate_training_data(
    features: &[Vec<f64>],
    labels: &[usize],
) -> Result<usize, RfError> {
    let first = features.first().ok_or(RfError::EmptyDataset)?;
    let n_features = first.len();
    if n_features == 0 {
        return Err(RfError::ZeroFeatures);
    }
    if labels.len() != features.len() {
        return Err(RfError::LabelCountMismatch {
            n_samples: features.len(),
            n_labels: labels.len(),
        });
    }
    if let Some((sample_index, &label)) = labels
        .iter()
        .enumerate()
        .find(|&(_, &l)| l > MAX_CLASS_LABEL)
    {
        return Err(RfError::LabelOutOfRange {
            label,
            sample_index,
            max: MAX_CLASS_LABEL,
        });
    }
    for (sample_index, row) in features.iter().enumerate() {
        if row.len() != n_features {
            return Err(RfError::FeatureCountMismatch {
                expected: n_features,
                got: row.len(),
                sample_index,
            });
        }
        if let Some(feature_index) = row.iter().position(|v| !v.is_finite()) {
            return Err(RfError::NonFiniteValue {
                sample_index,
                feature_index,
            });
        }
    }
    Ok(n_features)
}

/// Recursive grower; owns the arena while a tree is under construction.
struct TreeBuilder<'a> {
    columns: &'a [Vec<f64>],
    labels: &'a [usize],
    ctx: SplitContext,
    max_depth: Option<usize>,
    min_samples_split: usize,
    rng: ChaCha8Rng,
    arena: Vec<Node>,
}

impl TreeBuilder<'_> {
    fn grow(&mut self, samples: &[usize], depth: usize) -> NodeIndex {
        let n_samples = samples.len();
        let mut counts = vec![0usize; self.ctx.n_classes];
        for &s in samples {
            counts[self.labels[s]] += 1;
        }
        let impurity = self.ctx.criterion.impurity(&counts, n_samples);

        let stop = impurity.is_pure()
            || n_samples < self.min_samples_split
            || self.max_depth.is_some_and(|d| depth >= d);
        let split = if stop {
            None
        } else {
            best_split(self.columns, self.labels, samples, &self.ctx, &mut self.rng)
        };

        let Some(split) = split else {
            let total = n_samples.max(1) as f64;
            let prediction = counts
                .iter()
                .enumerate()
                .max_by_key(|&(_, c)| *c)
                .map_or(0, |(class, _)| class);
            return self.push(Node::Leaf {
                prediction,
                distribution: counts.iter().map(|&c| c as f64 / total).collect(),
                impurity,
                n_samples,
            });
        };

        // Reserve the parent slot so children land after it in the arena.
        let slot = self.push(Node::Leaf {
            prediction: 0,
            distribution: Vec::new(),
            impurity,
            n_samples,
        });
        let left = self.grow(&split.left, depth + 1);
        let right = self.grow(&split.right, depth + 1);
        self.arena[slot.index()] = Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
            impurity,
            n_samples,
            impurity_decrease: split.impurity_decrease,
        };
        slot
    }

    fn push(&mut self, node: Node) -> NodeIndex {
        self.arena.push(node);
        NodeIndex::new(self.arena.len() - 1)
    }
}

/// A fitted CART decision tree. The root is always `nodes[0]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    pub(crate) nodes: Vec<Node>,
    pub(crate) n_features: usize,
    pub(crate) n_classes: usize,
}

impl DecisionTree {
    /// Predict the class label for a single sample.
    ///
    /// # Errors
    ///
    /// Returns [`RfError::PredictionFeatureMismatch`] when `sample.len() != n_features`.
    pub fn predict(&self, sample: &[f64]) -> Result<usize, RfError> {
        match self.leaf_for(sample)? {
            Node::Leaf { prediction, .. } => Ok(*prediction),
            Node::Split { .. } => unreachable!("leaf_for always stops at a leaf"),
        }
    }

    /// Return the leaf class distribution (length `n_classes`) for a single sample.
    ///
    /// # Errors
    ///
    /// Returns [`RfError::PredictionFeatureMismatch`] when `sample.len() != n_features`.
    pub fn predict_proba(&self, sample: &[f64]) -> Result<&[f64], RfError> {
        match self.leaf_for(sample)? {
            Node::Leaf { distribution, .. } => Ok(distribution),
            Node::Split { .. } => unreachable!("leaf_for always stops at a leaf"),
        }
    }

    /// Mean decrease in impurity per feature, normalized to sum to 1.0.
    ///
    /// All zeros when the tree is a single leaf.
    #[must_use]
    pub fn feature_importances(&self) -> Vec<f64> {
        let mut totals = vec![0.0f64; self.n_features];
        for node in &self.nodes {
            if let Node::Split {
                feature,
                impurity_decrease,
                ..
            } = node
            {
                totals[feature.index()] += impurity_decrease;
            }
        }
        let sum: f64 = totals.iter().sum();
        if sum > 0.0 {
            totals.iter_mut().for_each(|v| *v /= sum);
        }
        totals
    }

    /// Pad leaf distributions when the tree saw fewer classes than the forest.
    pub(crate) fn widen_classes(&mut self, n_classes: usize) {
        if n_classes <= self.n_classes {
            return;
        }
        for node in &mut self.nodes {
            if let Node::Leaf { distribution, .. } = node {
                distribution.resize(n_classes, 0.0);
            }
        }
        self.n_classes = n_classes;
    }

    /// Return the total number of nodes.
    #[must_use]
    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Return the number of leaf nodes.
    #[must_use]
    pub fn n_leaves(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_leaf()).count()
    }

    /// Return the depth of the deepest leaf (a lone root leaf has depth 0).
    #[must_use]
    pub fn depth(&self) -> usize {
        let mut deepest = 0;
        let mut stack = vec![(0usize, 0usize)];
        while let Some((idx, d)) = stack.pop() {
            match &self.nodes[idx] {
                Node::Leaf { .. } => deepest = deepest.max(d),
                Node::Split { left, right, .. } => {
                    stack.push((left.index(), d + 1));
                    stack.push((right.index(), d + 1));
                }
            }
        }
        deepest
    }

    fn leaf_for(&self, sample: &[f64]) -> Result<&Node, RfError> {
        if sample.len() != self.n_features {
            return Err(RfError::PredictionFeatureMismatch {
                expected: self.n_features,
                got: sample.len(),
            });
        }
        let mut node = &self.nodes[0];
        while let Node::Split {
            feature,
            threshold,
            left,
            right,
            ..
        } = node
        {
            let next = if sample[feature.index()] <= *threshold {
                left
            } else {
                right
            };
            node = &self.nodes[next.index()];
        }
        Ok(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_groups() -> (Vec<Vec<f64>>, Vec<usize>) {
        let features = vec![
            vec![1.0, 0.0],
            vec![2.0, 0.0],
            vec![3.0, 0.0],
            vec![10.0, 0.0],
            vec![11.0, 0.0],
            vec![12.0, 0.0],
        ];
        (features, vec![0, 0, 0, 1, 1, 1])
    }

    #[test]
    fn empty_dataset_error() {
        let err = DecisionTreeConfig::new().fit(&[], &[]).unwrap_err();
        assert!(matches!(err, RfError::EmptyDataset));
    }

    #[test]
    fn label_count_mismatch_error() {
        let (features, _) = two_groups();
        let err = DecisionTreeConfig::new().fit(&features, &[0, 1]).unwrap_err();
        assert!(matches!(
            err,
            RfError::LabelCountMismatch { n_samples: 6, n_labels: 2 }
        ));
    }

    #[test]
    fn oversized_label_rejected() {
        let (features, mut labels) = two_groups();
        labels[4] = 1_000_000_000;
        let err = DecisionTreeConfig::new().fit(&features, &labels).unwrap_err();
        assert!(matches!(
            err,
            RfError::LabelOutOfRange { sample_index: 4, max: MAX_CLASS_LABEL, .. }
        ));
    }

    #[test]
    fn pure_labels_give_single_leaf() {
        let features = vec![vec![1.0], vec![2.0], vec![3.0]];
        let tree = DecisionTreeConfig::new().fit(&features, &[1, 1, 1]).unwrap();
        assert_eq!(tree.n_nodes(), 1);
        assert_eq!(tree.depth(), 0);
        assert_eq!(tree.predict(&[9.0]).unwrap(), 1);
    }

    #[test]
    fn separable_groups_predicted() {
        let (features, labels) = two_groups();
        let tree = DecisionTreeConfig::new().fit(&features, &labels).unwrap();
        assert_eq!(tree.predict(&[2.5, 0.0]).unwrap(), 0);
        assert_eq!(tree.predict(&[10.5, 0.0]).unwrap(), 1);
        assert_eq!(tree.n_leaves(), 2);
    }

    #[test]
    fn xor_needs_two_levels() {
        let features = vec![
            vec![0.0, 0.0],
            vec![0.0, 1.0],
            vec![1.0, 0.0],
            vec![1.0, 1.0],
        ];
        let tree = DecisionTreeConfig::new().fit(&features, &[0, 1, 1, 0]).unwrap();
        assert!(tree.depth() >= 2);
    }

    #[test]
    fn max_depth_caps_growth() {
        let features = vec![
            vec![0.0, 0.0],
            vec![0.0, 1.0],
            vec![1.0, 0.0],
            vec![1.0, 1.0],
        ];
        let tree = DecisionTreeConfig::new()
            .with_max_depth(Some(1))
            .fit(&features, &[0, 1, 1, 0])
            .unwrap();
        assert!(tree.depth() <= 1);
    }

    #[test]
    fn proba_and_importances_normalized() {
        let (features, labels) = two_groups();
        let tree = DecisionTreeConfig::new().fit(&features, &labels).unwrap();
        let proba: f64 = tree.predict_proba(&[5.0, 0.0]).unwrap().iter().sum();
        assert!((proba - 1.0).abs() < 1e-12);
        let importances = tree.feature_importances();
        assert!((importances[0] - 1.0).abs() < 1e-12);
        assert!(importances[1].abs() < 1e-12);
    }

    #[test]
    fn prediction_feature_mismatch() {
        let (features, labels) = two_groups();
        let tree = DecisionTreeConfig::new().fit(&features, &labels).unwrap();
        let err = tree.predict(&[1.0]).unwrap_err();
        assert!(matches!(
            err,
            RfError::PredictionFeatureMismatch { expected: 2, got: 1 }
        ));
    }

    #[test]
    fn non_finite_value_error() {
        let features = vec![vec![1.0, f64::NAN], vec![3.0, 4.0]];
        let err = DecisionTreeConfig::new().fit(&features, &[0, 1]).unwrap_err();
        assert!(matches!(
            err,
            RfError::NonFiniteValue { sample_index: 0, feature_index: 1 }
        ));
    }

    #[test]
    fn invalid_config_rejected() {
        let (features, labels) = two_groups();
        let err = DecisionTreeConfig::new()
            .with_min_samples_split(1)
            .fit(&features, &labels)
            .unwrap_err();
        assert!(matches!(err, RfError::InvalidMinSamplesSplit { .. }));
        let err = DecisionTreeConfig::new()
            .with_max_features(Some(3))
            .fit(&features, &labels)
            .unwrap_err();
        assert!(matches!(err, RfError::InvalidMaxFeatures { .. }));
    }
}
