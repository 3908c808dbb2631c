//! Arena node types shared by the tree builder and the predictor.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Zero-based position of a feature column in a sample row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FeatureIndex(usize);

impl FeatureIndex {
    pub(crate) fn new(index: usize) -> Self {
        Self(index)
    }

    /// Return the zero-based feature column index.
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for FeatureIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Position of a node inside a tree's `Vec<Node>` arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeIndex(usize);

impl NodeIndex {
    pub(crate) fn new(index: usize) -> Self {
        Self(index)
    }

    /// Return the zero-based arena index.
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Node impurity under whichever [`SplitCriterion`](crate::SplitCriterion) grew the tree.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Impurity(f64);

impl Impurity {
    pub(crate) fn new(value: f64) -> Self {
        Self(value)
    }

    /// Return the raw impurity value.
    #[must_use]
    pub fn value(self) -> f64 {
        self.0
    }

    /// `true` when every sample at the node carries the same label.
    #[must_use]
    pub fn is_pure(self) -> bool {
        self.0 <= 0.0
    }
}

impl fmt::Display for Impurity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}", self.0)
    }
}

/// A decision tree node.
///
/// Children are addressed by [`NodeIndex`] into the owning tree's arena, so a
/// whole tree serializes as a flat vector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Node {
    /// Interior node: samples with `row[feature] <= threshold` go left.
    Split {
        /// Feature tested at this node.
        feature: FeatureIndex,
        /// Split threshold (midpoint between two adjacent training values).
        threshold: f64,
        /// Left child.
        left: NodeIndex,
        /// Right child.
        right: NodeIndex,
        /// Impurity before splitting.
        impurity: Impurity,
        /// Training samples that reached this node.
        n_samples: usize,
        /// Weighted impurity decrease contributed by this split.
        impurity_decrease: f64,
    },
    /// Terminal node.
    Leaf {
        /// Majority class.
        prediction: usize,
        /// Class frequencies of the training samples in this leaf, summing to 1.
        distribution: Vec<f64>,
        /// Impurity of the leaf.
        impurity: Impurity,
        /// Training samples in this leaf.
        n_samples: usize,
    },
}

impl Node {
    /// Return the node impurity (before splitting for interior nodes).
    #[must_use]
    pub fn impurity(&self) -> Impurity {
        match self {
            Node::Split { impurity, .. } | Node::Leaf { impurity, .. } => *impurity,
        }
    }

    /// Return the number of training samples that reached this node.
    #[must_use]
    pub fn n_samples(&self) -> usize {
        match self {
            Node::Split { n_samples, .. } | Node::Leaf { n_samples, .. } => *n_samples,
        }
    }

    /// Return `true` if this node is a leaf.
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        matches!(self, Node::Leaf { .. })
    }
}
