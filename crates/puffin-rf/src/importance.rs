//! Feature importance aggregation across trees.

/// A ranked feature with name, importance score, spread, and rank.
#[derive(Debug, Clone)]
pub struct RankedFeature {
    /// Feature name.
    pub name: String,
    /// Normalized importance score (sums to 1.0 across all features).
    pub importance: f64,
    /// Standard deviation of the per-tree importances for this feature.
    pub std: f64,
    /// 1-based rank (1 = most important).
    pub rank: usize,
}

/// Average per-tree importances, normalize, and rank descending.
///
/// Ties keep column order. Returns an empty list when there are no trees.
pub(crate) fn rank_importances(per_tree: &[Vec<f64>], names: &[String]) -> Vec<RankedFeature> {
    if per_tree.is_empty() || names.is_empty() {
        return Vec::new();
    }
    let n_trees = per_tree.len() as f64;

    let mean: Vec<f64> = (0..names.len())
        .map(|f| per_tree.iter().map(|t| t.get(f).copied().unwrap_or(0.0)).sum::<f64>() / n_trees)
        .collect();
    let std: Vec<f64> = (0..names.len())
        .map(|f| {
            let var = per_tree
                .iter()
                .map(|t| (t.get(f).copied().unwrap_or(0.0) - mean[f]).powi(2))
                .sum::<f64>()
                / n_trees;
            var.sqrt()
        })
        .collect();

    let total: f64 = mean.iter().sum();
    let scale = if total > 0.0 { 1.0 / total } else { 1.0 };

    let mut ranked: Vec<RankedFeature> = names
        .iter()
        .enumerate()
        .map(|(f, name)| RankedFeature {
            name: name.clone(),
            importance: mean[f] * scale,
            std: std[f],
            rank: 0,
        })
        .collect();
    ranked.sort_by(|a, b| b.importance.total_cmp(&a.importance));
    for (i, feature) in ranked.iter_mut().enumerate() {
        feature.rank = i + 1;
    }
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranks_by_mean_and_reports_spread() {
        let per_tree = vec![vec![0.8, 0.2], vec![0.4, 0.6]];
        let names = vec!["amplitude".to_string(), "duration".to_string()];
        let ranked = rank_importances(&per_tree, &names);

        assert_eq!(ranked[0].name, "amplitude");
        assert_eq!(ranked[0].rank, 1);
        assert!((ranked[0].importance - 0.6).abs() < 1e-12);
        assert!((ranked[0].std - 0.2).abs() < 1e-12);
        assert_eq!(ranked[1].rank, 2);
    }

    #[test]
    fn no_trees_no_ranking() {
        assert!(rank_importances(&[], &["x".to_string()]).is_empty());
    }
}
