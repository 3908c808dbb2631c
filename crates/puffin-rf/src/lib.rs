//! Random Forest puff classification: train, persist, predict, bucket.
//!
//! Provides a hand-rolled Random Forest classifier with CART decision trees,
//! Gini/Entropy split criteria, parallel training via rayon, out-of-bag
//! evaluation, impurity-based feature importance, and bincode persistence.
//! [`RandomForest::classify_tracks`] turns puff probabilities into
//! puff / non-puff / maybe buckets.

mod bucket;
mod config;
mod confusion;
mod error;
mod forest;
mod importance;
mod node;
mod oob;
mod predict;
mod result;
mod serialize;
mod split;
mod tree;

pub use bucket::{Bucket, BucketCounts, BucketThresholds, PUFF_CLASS, TrackClassification};
pub use config::{MaxFeatures, OobMode, RandomForestConfig};
pub use confusion::{ClassMetrics, ConfusionMatrix};
pub use error::RfError;
pub use forest::RandomForest;
pub use importance::RankedFeature;
pub use node::{FeatureIndex, Impurity, Node, NodeIndex};
pub use oob::OobScore;
pub use predict::ClassDistribution;
pub use result::RandomForestResult;
pub use split::SplitCriterion;
pub use tree::{DecisionTree, DecisionTreeConfig, MAX_CLASS_LABEL};
