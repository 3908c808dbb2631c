//! Confusion matrix and per-class classification metrics.

use std::fmt;

use crate::error::RfError;

/// A confusion matrix: `matrix[true_class][predicted_class]` counts samples.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfusionMatrix {
    matrix: Vec<Vec<usize>>,
}

/// Per-class precision, recall, and F1 score.
#[derive(Debug, Clone)]
pub struct ClassMetrics {
    /// The class index.
    pub class: usize,
    /// TP / (TP + FP), 0.0 when the class was never predicted.
    pub precision: f64,
    /// TP / (TP + FN), 0.0 when the class has no true samples.
    pub recall: f64,
    /// Harmonic mean of precision and recall, 0.0 when both are zero.
    pub f1: f64,
    /// Number of true samples in this class.
    pub support: usize,
}

impl ConfusionMatrix {
    /// Build a confusion matrix from paired true and predicted labels.
    ///
    /// Labels at or above `n_classes` widen the matrix to fit them.
    ///
    /// # Errors
    ///
    /// Returns [`RfError::EmptyDataset`] when no labels are given and
    /// [`RfError::LabelCountMismatch`] when the two slices differ in length.
    pub fn from_labels(
        true_labels: &[usize],
        predicted: &[usize],
        n_classes: usize,
    ) -> Result<Self, RfError> {
        if true_labels.is_empty() {
            return Err(RfError::EmptyDataset);
        }
        if true_labels.len() != predicted.len() {
            return Err(RfError::LabelCountMismatch {
                n_samples: predicted.len(),
                n_labels: true_labels.len(),
            });
        }
        let n = true_labels
            .iter()
            .chain(predicted)
            .map(|&c| c + 1)
            .fold(n_classes, usize::max);
        let mut matrix = vec![vec![0usize; n]; n];
        for (&t, &p) in true_labels.iter().zip(predicted) {
            matrix[t][p] += 1;
        }
        Ok(Self { matrix })
    }

    /// Proportion of samples on the diagonal.
    #[must_use]
    pub fn accuracy(&self) -> f64 {
        let correct: usize = (0..self.n_classes()).map(|i| self.matrix[i][i]).sum();
        let total = self.total();
        if total == 0 {
            0.0
        } else {
            correct as f64 / total as f64
        }
    }

    /// Per-class precision, recall, F1, and support.
    #[must_use]
    pub fn class_metrics(&self) -> Vec<ClassMetrics> {
        let n = self.n_classes();
        (0..n)
            .map(|c| {
                let tp = self.matrix[c][c];
                let predicted: usize = (0..n).map(|t| self.matrix[t][c]).sum();
                let support: usize = self.matrix[c].iter().sum();
                let ratio = |num: usize, den: usize| if den == 0 { 0.0 } else { num as f64 / den as f64 };
                let precision = ratio(tp, predicted);
                let recall = ratio(tp, support);
                let f1 = if precision + recall == 0.0 {
                    0.0
                } else {
                    2.0 * precision * recall / (precision + recall)
                };
                ClassMetrics {
                    class: c,
                    precision,
                    recall,
                    f1,
                    support,
                }
            })
            .collect()
    }

    /// Return the underlying matrix rows.
    #[must_use]
    pub fn as_rows(&self) -> &[Vec<usize>] {
        &self.matrix
    }

    /// Return the number of classes.
    #[must_use]
    pub fn n_classes(&self) -> usize {
        self.matrix.len()
    }

    /// Total number of samples counted.
    #[must_use]
    pub fn total(&self) -> usize {
        self.matrix.iter().flatten().sum()
    }
}

impl fmt::Display for ConfusionMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:>8}", "")?;
        for j in 0..self.n_classes() {
            write!(f, " pred_{j:>3}")?;
        }
        writeln!(f)?;
        for (i, row) in self.matrix.iter().enumerate() {
            write!(f, "true_{i:>3}")?;
            for val in row {
                write!(f, " {val:>8}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
