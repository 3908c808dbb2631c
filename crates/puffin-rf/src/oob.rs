//! Out-of-bag (OOB) evaluation for Random Forest.

use crate::confusion::ConfusionMatrix;
use crate::error::RfError;
use crate::tree::DecisionTree;

/// Out-of-bag evaluation result.
#[derive(Debug, Clone)]
pub struct OobScore {
    /// Fraction of OOB-evaluated samples whose majority vote matched the label.
    pub accuracy: f64,
    /// OOB confusion matrix.
    pub confusion_matrix: ConfusionMatrix,
    /// Number of samples that had at least one OOB tree.
    pub n_oob_samples: usize,
}

impl OobScore {
    /// OOB misclassification rate, `1 - accuracy`.
    #[must_use]
    pub fn error(&self) -> f64 {
        1.0 - self.accuracy
    }
}

/// Majority-vote each sample using only the trees that never saw it.
///
/// Samples that were in-bag for every tree are skipped.
pub(crate) fn compute_oob(
    trees: &[DecisionTree],
    features: &[Vec<f64>],
    labels: &[usize],
    n_classes: usize,
    oob_indices_per_tree: &[Vec<usize>],
) -> Result<OobScore, RfError> {
    let mut votes: Vec<Vec<usize>> = vec![vec![0; n_classes]; features.len()];

    for (tree, oob) in trees.iter().zip(oob_indices_per_tree) {
        for &sample in oob {
            votes[sample][tree.predict(&features[sample])?] += 1;
        }
    }

    let (truth, predicted): (Vec<usize>, Vec<usize>) = votes
        .iter()
        .enumerate()
        .filter(|(_, v)| v.iter().any(|&c| c > 0))
        .map(|(sample, v)| {
            let winner = v
                .iter()
                .enumerate()
                .max_by_key(|&(_, c)| *c)
                .map_or(0, |(class, _)| class);
            (labels[sample], winner)
        })
        .unzip();

    if truth.is_empty() {
        return Err(RfError::OobEvaluationFailed {
            reason: "no sample has any OOB tree".to_string(),
        });
    }

    let confusion_matrix = ConfusionMatrix::from_labels(&truth, &predicted, n_classes)?;
    Ok(OobScore {
        accuracy: confusion_matrix.accuracy(),
        n_oob_samples: truth.len(),
        confusion_matrix,
    })
}
