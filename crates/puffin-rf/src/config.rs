//! Configuration builder for Random Forest training.

use crate::error::RfError;
use crate::result::RandomForestResult;
use crate::split::SplitCriterion;

/// Strategy for determining the number of features to consider at each split.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MaxFeatures {
    /// Square root of total features (rounded up).
    Sqrt,
    /// Log base 2 of total features (rounded up, at least 1).
    Log2,
    /// A fraction of total features, in (0.0, 1.0].
    Fraction(f64),
    /// A fixed count.
    Fixed(usize),
    /// All features.
    All,
}

impl MaxFeatures {
    /// Resolve to a concrete count for a dataset with `n_features` columns.
    ///
    /// # Errors
    ///
    /// Returns [`RfError::InvalidMaxFeatures`] when the result is outside `[1, n_features]`.
    pub fn resolve(self, n_features: usize) -> Result<usize, RfError> {
        let n = n_features as f64;
        let resolved = match self {
            MaxFeatures::Sqrt => n.sqrt().ceil() as usize,
            MaxFeatures::Log2 => n.log2().ceil().max(1.0) as usize,
            MaxFeatures::Fraction(f) => (n * f).ceil() as usize,
            MaxFeatures::Fixed(count) => count,
            MaxFeatures::All => n_features,
        };
        if resolved == 0 || resolved > n_features {
            return Err(RfError::InvalidMaxFeatures {
                max_features: resolved,
                n_features,
            });
        }
        Ok(resolved)
    }
}

/// Whether to compute out-of-bag evaluation during training.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OobMode {
    /// Compute OOB accuracy and confusion matrix.
    Enabled,
    /// Skip OOB evaluation.
    Disabled,
}

/// Configuration for Random Forest training.
///
/// Construct via [`RandomForestConfig::new`], then chain `with_*` methods.
///
/// # Defaults
///
/// | Parameter            | Default     |
/// |----------------------|-------------|
/// | `max_features`       | `Sqrt`      |
/// | `max_depth`          | `None`      |
/// | `min_samples_split`  | 2           |
/// | `min_samples_leaf`   | 1           |
/// | `criterion`          | `Gini`      |
/// | `seed`               | 42          |
/// | `oob_mode`           | `Disabled`  |
/// | `bootstrap_fraction` | 1.0         |
#[derive(Debug, Clone)]
pub struct RandomForestConfig {
    pub(crate) n_trees: usize,
    pub(crate) max_features: MaxFeatures,
    pub(crate) max_depth: Option<usize>,
    pub(crate) min_samples_split: usize,
    pub(crate) min_samples_leaf: usize,
    pub(crate) criterion: SplitCriterion,
    pub(crate) seed: u64,
    pub(crate) oob_mode: OobMode,
    pub(crate) bootstrap_fraction: f64,
}

impl RandomForestConfig {
    /// Create a new config with the given number of trees.
    ///
    /// # Errors
    ///
    /// Returns [`RfError::InvalidTreeCount`] if `n_trees` is zero.
    pub fn new(n_trees: usize) -> Result<Self, RfError> {
        if n_trees == 0 {
            return Err(RfError::InvalidTreeCount { n_trees });
        }
        Ok(Self {
            n_trees,
            max_features: MaxFeatures::Sqrt,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            criterion: SplitCriterion::Gini,
            seed: 42,
            oob_mode: OobMode::Disabled,
            bootstrap_fraction: 1.0,
        })
    }

    /// Set the max features strategy.
    #[must_use]
    pub fn with_max_features(mut self, max_features: MaxFeatures) -> Self {
        self.max_features = max_features;
        self
    }

    /// Set the maximum tree depth. `None` means unlimited.
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

    /// Set the minimum number of samples required in each leaf after a split.
    #[must_use]
    pub fn with_min_samples_leaf(mut self, min_samples_leaf: usize) -> Self {
        self.min_samples_leaf = min_samples_leaf;
        self
    }

    /// Set the split quality criterion.
    #[must_use]
    pub fn with_criterion(mut self, criterion: SplitCriterion) -> Self {
        self.criterion = criterion;
        self
    }

    /// Set the random seed for reproducibility.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set the OOB evaluation mode.
    #[must_use]
    pub fn with_oob_mode(mut self, oob_mode: OobMode) -> Self {
        self.oob_mode = oob_mode;
        self
    }

    /// Set the bootstrap fraction (proportion of samples drawn per tree).
    #[must_use]
    pub fn with_bootstrap_fraction(mut self, bootstrap_fraction: f64) -> Self {
        self.bootstrap_fraction = bootstrap_fraction;
        self
    }

    /// Return the number of trees.
    #[must_use]
    pub fn n_trees(&self) -> usize {
        self.n_trees
    }

    /// Return the random seed.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Return the OOB evaluation mode.
    #[must_use]
    pub fn oob_mode(&self) -> OobMode {
        self.oob_mode
    }

    /// Train a Random Forest.
    ///
    /// `features[sample][feature]` is row-major, `labels[sample]` zero-based,
    /// `feature_names` one per feature column.
    ///
    /// # Errors
    ///
    /// | Variant                               | When                                              |
    /// |---------------------------------------|---------------------------------------------------|
    /// | [`RfError::EmptyDataset`]             | `features` is empty                               |
    /// | [`RfError::ZeroFeatures`]             | rows have zero feature columns                    |
    /// | [`RfError::LabelCountMismatch`]       | `labels` and `features` differ in length          |
    /// | [`RfError::FeatureCountMismatch`]     | rows have inconsistent lengths                    |
    /// | [`RfError::NonFiniteValue`]           | any value is NaN or infinite                      |
    /// | [`RfError::InvalidMaxFeatures`]       | resolved max_features is outside [1, n_features]  |
    /// | [`RfError::InvalidBootstrapFraction`] | bootstrap_fraction is not in (0.0, 1.0]           |
    /// | [`RfError::OobEvaluationFailed`]      | OOB enabled but no sample has any OOB tree        |
    pub fn fit(
        &self,
        features: &[Vec<f64>],
        labels: &[usize],
        feature_names: &[String],
    ) -> Result<RandomForestResult, RfError> {
        crate::forest::train(self, features, labels, feature_names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_trees_rejected() {
        assert!(matches!(
            RandomForestConfig::new(0),
            Err(RfError::InvalidTreeCount { n_trees: 0 })
        ));
    }

    #[test]
    fn max_features_resolution() {
        assert_eq!(MaxFeatures::Sqrt.resolve(10).unwrap(), 4);
        assert_eq!(MaxFeatures::Log2.resolve(1).unwrap(), 1);
        assert_eq!(MaxFeatures::Fraction(0.5).resolve(3).unwrap(), 2);
        assert_eq!(MaxFeatures::All.resolve(7).unwrap(), 7);
        assert!(matches!(
            MaxFeatures::Fixed(5).resolve(2),
            Err(RfError::InvalidMaxFeatures { max_features: 5, n_features: 2 })
        ));
    }

    #[test]
    fn builder_overrides_defaults() {
        let config = RandomForestConfig::new(25)
            .unwrap()
            .with_seed(7)
            .with_oob_mode(OobMode::Enabled);
        assert_eq!(config.n_trees(), 25);
        assert_eq!(config.seed(), 7);
        assert_eq!(config.oob_mode(), OobMode::Enabled);
        assert_eq!(config.max_features, MaxFeatures::Sqrt);
    }
}
