//! Prediction methods for the Random Forest ensemble.

use rayon::iter::{IntoParallelIterator, ParallelIterator};

use crate::error::RfError;
use crate::forest::RandomForest;

/// Class probability distribution from a prediction.
#[derive(Debug, Clone)]
pub struct ClassDistribution {
    probs: Vec<f64>,
}

impl ClassDistribution {
    pub(crate) fn new(probs: Vec<f64>) -> Self {
        Self { probs }
    }

    /// Return the predicted class (argmax of probabilities, lowest index on ties).
    #[must_use]
    pub fn predicted_class(&self) -> usize {
        self.probs
            .iter()
            .enumerate()
            .fold((0, f64::NEG_INFINITY), |best, (class, &p)| {
                if p > best.1 { (class, p) } else { best }
            })
            .0
    }

    /// Probability assigned to `class`, 0.0 for classes the forest never saw.
    #[must_use]
    pub fn probability(&self, class: usize) -> f64 {
        self.probs.get(class).copied().unwrap_or(0.0)
    }

    /// Return the probability distribution as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[f64] {
        &self.probs
    }
}

impl RandomForest {
    /// Predict the class label for a single sample.
    ///
    /// # Errors
    ///
    /// Returns [`RfError::PredictionFeatureMismatch`] when `sample.len() != n_features`.
    pub fn predict(&self, sample: &[f64]) -> Result<usize, RfError> {
        Ok(self.predict_proba(sample)?.predicted_class())
    }

    /// Average the leaf distributions of every tree for a single sample.
    ///
    /// # Errors
    ///
    /// Returns [`RfError::PredictionFeatureMismatch`] when `sample.len() != n_features`.
    pub fn predict_proba(&self, sample: &[f64]) -> Result<ClassDistribution, RfError> {
        if sample.len() != self.n_features {
            return Err(RfError::PredictionFeatureMismatch {
                expected: self.n_features,
                got: sample.len(),
            });
        }

        let mut avg = vec![0.0f64; self.n_classes];
        for tree in &self.trees {
            for (slot, p) in avg.iter_mut().zip(tree.predict_proba(sample)?) {
                *slot += p;
            }
        }
        let n = self.trees.len() as f64;
        avg.iter_mut().for_each(|v| *v /= n);

        Ok(ClassDistribution::new(avg))
    }

    /// Predict class labels for a batch of samples in parallel.
    ///
    /// # Errors
    ///
    /// Returns [`RfError::PredictionFeatureMismatch`] if any sample has the wrong feature count.
    pub fn predict_batch(&self, features: &[Vec<f64>]) -> Result<Vec<usize>, RfError> {
        features
            .into_par_iter()
            .map(|sample| self.predict(sample))
            .collect()
    }

    /// Return probability distributions for a batch of samples in parallel.
    ///
    /// # Errors
    ///
    /// Returns [`RfError::PredictionFeatureMismatch`] if any sample has the wrong feature count.
    pub fn predict_proba_batch(
        &self,
        features: &[Vec<f64>],
    ) -> Result<Vec<ClassDistribution>, RfError> {
        features
            .into_par_iter()
            .map(|sample| self.predict_proba(sample))
            .collect()
    }

    /// Return the number of features this forest was trained on.
    #[must_use]
    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// Return the number of classes.
    #[must_use]
    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    /// Return the number of trees in the ensemble.
    #[must_use]
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Return the feature names.
    #[must_use]
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }
}
