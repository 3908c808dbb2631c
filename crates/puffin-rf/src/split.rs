//! Split criteria and exhaustive threshold search.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::node::{FeatureIndex, Impurity};

/// Criterion for measuring the quality of a split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SplitCriterion {
    /// Gini impurity: 1 - Σ(p_i²)
    Gini,
    /// Information entropy: -Σ(p_i · ln(p_i))
    Entropy,
}

impl SplitCriterion {
    /// Compute the impurity of a node from its class counts.
    ///
    /// An empty node is treated as pure.
    #[must_use]
    pub fn impurity(&self, class_counts: &[usize], n_samples: usize) -> Impurity {
        if n_samples == 0 {
            return Impurity::new(0.0);
        }
        let n = n_samples as f64;
        let proportions = class_counts.iter().filter(|&&c| c > 0).map(|&c| c as f64 / n);
        let value = match self {
            SplitCriterion::Gini => 1.0 - proportions.map(|p| p * p).sum::<f64>(),
            SplitCriterion::Entropy => -proportions.map(|p| p * p.ln()).sum::<f64>(),
        };
        Impurity::new(value.max(0.0))
    }
}

/// Per-tree parameters that stay fixed while searching splits.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SplitContext {
    pub(crate) n_classes: usize,
    pub(crate) criterion: SplitCriterion,
    pub(crate) max_features: usize,
    pub(crate) min_samples_leaf: usize,
}

/// Chosen split for a node, with the samples already partitioned.
#[derive(Debug, Clone)]
pub(crate) struct SplitResult {
    pub(crate) feature: FeatureIndex,
    pub(crate) threshold: f64,
    /// `n·I(parent) - n_l·I(left) - n_r·I(right)`, the unnormalized MDI contribution.
    pub(crate) impurity_decrease: f64,
    pub(crate) left: Vec<usize>,
    pub(crate) right: Vec<usize>,
}

/// Search `max_features` randomly drawn columns for the threshold with the
/// largest weighted impurity decrease.
///
/// `columns[feature][sample]` is column-major; `samples` indexes into the
/// inner vectors. Returns `None` when every drawn column is constant over
/// `samples` or every candidate would leave a child below `min_samples_leaf`.
pub(crate) fn best_split(
    columns: &[Vec<f64>],
    labels: &[usize],
    samples: &[usize],
    ctx: &SplitContext,
    rng: &mut impl Rng,
) -> Option<SplitResult> {
    let n_features = columns.len();
    let n = samples.len();
    if n < 2 || n_features == 0 {
        return None;
    }

    let mut parent_counts = vec![0usize; ctx.n_classes];
    for &s in samples {
        parent_counts[labels[s]] += 1;
    }
    let parent = ctx.criterion.impurity(&parent_counts, n).value() * n as f64;

    // Partial Fisher-Yates over the feature order.
    let draws = ctx.max_features.min(n_features);
    let mut order: Vec<usize> = (0..n_features).collect();
    for i in 0..draws {
        let j = rng.gen_range(i..n_features);
        order.swap(i, j);
    }

    let mut best: Option<(usize, f64, f64)> = None;
    let mut sorted: Vec<(f64, usize)> = Vec::with_capacity(n);

    for &feature in &order[..draws] {
        let column = &columns[feature];
        sorted.clear();
        sorted.extend(samples.iter().map(|&s| (column[s], labels[s])));
        sorted.sort_unstable_by(|a, b| a.0.total_cmp(&b.0));

        let mut left_counts = vec![0usize; ctx.n_classes];
        let mut right_counts = parent_counts.clone();

        for i in 0..n - 1 {
            let (value, label) = sorted[i];
            left_counts[label] += 1;
            right_counts[label] -= 1;

            let next = sorted[i + 1].0;
            if value == next {
                continue;
            }
            let n_left = i + 1;
            let n_right = n - n_left;
            if n_left < ctx.min_samples_leaf || n_right < ctx.min_samples_leaf {
                continue;
            }

            let decrease = parent
                - n_left as f64 * ctx.criterion.impurity(&left_counts, n_left).value()
                - n_right as f64 * ctx.criterion.impurity(&right_counts, n_right).value();

            if best.is_none_or(|(_, _, d)| decrease > d) {
                best = Some((feature, (value + next) / 2.0, decrease));
            }
        }
    }

    let (feature, threshold, impurity_decrease) = best?;
    let column = &columns[feature];
    let (left, right): (Vec<usize>, Vec<usize>) =
        samples.iter().copied().partition(|&s| column[s] <= threshold);

    Some(SplitResult {
        feature: FeatureIndex::new(feature),
        threshold,
        impurity_decrease,
        left,
        right,
    })
}
