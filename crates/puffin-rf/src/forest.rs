//! Random Forest training with parallel tree construction.

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::iter::{IntoParallelIterator, ParallelIterator};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::config::{OobMode, RandomForestConfig};
use crate::error::RfError;
use crate::importance::RankedFeature;
use crate::oob::compute_oob;
use crate::result::RandomForestResult;
use crate::tree::{DecisionTree, DecisionTreeConfig, validate_training_data};

/// A fitted Random Forest ensemble.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForest {
    pub(crate) trees: Vec<DecisionTree>,
    pub(crate) n_features: usize,
    pub(crate) n_classes: usize,
    pub(crate) feature_names: Vec<String>,
}

impl RandomForest {
    /// Rank features by mean decrease in impurity across all trees.
    ///
    /// Available for loaded classifiers as well as freshly trained ones, since
    /// the split statistics live in the trees themselves.
    #[must_use]
    pub fn feature_importances(&self) -> Vec<RankedFeature> {
        let per_tree: Vec<Vec<f64>> = self.trees.iter().map(DecisionTree::feature_importances).collect();
        crate::importance::rank_importances(&per_tree, &self.feature_names)
    }
}

/// Draw `draw_count` indices with replacement; return them and the never-drawn rest.
fn bootstrap_sample(
    n_samples: usize,
    draw_count: usize,
    rng: &mut impl Rng,
) -> (Vec<usize>, Vec<usize>) {
    let mut in_bag = vec![false; n_samples];
    let drawn: Vec<usize> = (0..draw_count)
        .map(|_| {
            let idx = rng.gen_range(0..n_samples);
            in_bag[idx] = true;
            idx
        })
        .collect();
    let out_of_bag = (0..n_samples).filter(|&i| !in_bag[i]).collect();
    (drawn, out_of_bag)
}

#[instrument(skip_all, fields(n_trees = config.n_trees, n_samples = features.len()))]
pub(crate) fn train(
    config: &RandomForestConfig,
    features: &[Vec<f64>],
    labels: &[usize],
    feature_names: &[String],
) -> Result<RandomForestResult, RfError> {
    let n_features = validate_training_data(features, labels)?;
    let n_samples = features.len();
    let max_features = config.max_features.resolve(n_features)?;

    if config.bootstrap_fraction <= 0.0 || config.bootstrap_fraction > 1.0 {
        return Err(RfError::InvalidBootstrapFraction {
            fraction: config.bootstrap_fraction,
        });
    }

    let n_classes = labels.iter().max().map_or(1, |&m| m + 1);
    let draw_count = ((n_samples as f64) * config.bootstrap_fraction).ceil() as usize;

    info!(
        n_trees = config.n_trees,
        n_samples,
        n_features,
        n_classes,
        max_features,
        draw_count,
        "training random forest"
    );

    let mut master = ChaCha8Rng::seed_from_u64(config.seed);
    let tree_seeds: Vec<u64> = (0..config.n_trees).map(|_| master.r#gen()).collect();

    let template = DecisionTreeConfig::new()
        .with_criterion(config.criterion)
        .with_max_depth(config.max_depth)
        .with_min_samples_split(config.min_samples_split)
        .with_min_samples_leaf(config.min_samples_leaf)
        .with_max_features(Some(max_features));

    let fitted: Vec<(DecisionTree, Vec<usize>)> = tree_seeds
        .into_par_iter()
        .map(|seed| {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let (drawn, out_of_bag) = bootstrap_sample(n_samples, draw_count, &mut rng);
            let boot_features: Vec<Vec<f64>> = drawn.iter().map(|&i| features[i].clone()).collect();
            // Bootstrap labels may miss the top class; pad the tree's class count afterwards.
            let boot_labels: Vec<usize> = drawn.iter().map(|&i| labels[i]).collect();
            let mut tree = template
                .clone()
                .with_seed(rng.r#gen())
                .fit(&boot_features, &boot_labels)?;
            tree.widen_classes(n_classes);
            Ok((tree, out_of_bag))
        })
        .collect::<Result<_, RfError>>()?;

    let (trees, oob_indices_per_tree): (Vec<DecisionTree>, Vec<Vec<usize>>) =
        fitted.into_iter().unzip();
    debug!(n_trees_trained = trees.len(), "tree training complete");

    let oob_score = match config.oob_mode {
        OobMode::Enabled => Some(compute_oob(&trees, features, labels, n_classes, &oob_indices_per_tree)?),
        OobMode::Disabled => None,
    };

    let forest = RandomForest {
        trees,
        n_features,
        n_classes,
        feature_names: feature_names.to_vec(),
    };
    info!(
        oob_accuracy = oob_score.as_ref().map(|s| s.accuracy),
        "random forest training complete"
    );

    Ok(RandomForestResult::new(forest, oob_score))
}

#[cfg(test)]
mod tests {
    use crate::config::{MaxFeatures, OobMode, RandomForestConfig};

    /// Two well separated track populations plus one uninformative feature.
    fn puff_like_tracks() -> (Vec<Vec<f64>>, Vec<usize>, Vec<String>) {
        let mut features = Vec::new();
        let mut labels = Vec::new();
        for i in 0..30 {
            let jitter = (i % 5) as f64 * 0.02;
            features.push(vec![0.2 + jitter, 5.0 + jitter, (i % 3) as f64]);
            labels.push(0);
            features.push(vec![1.5 + jitter, 1.0 + jitter, (i % 3) as f64]);
            labels.push(1);
        }
        let names = vec!["amplitude".into(), "duration".into(), "noise".into()];
        (features, labels, names)
    }

    #[test]
    fn separable_tracks_fit_training_data() {
        let (features, labels, names) = puff_like_tracks();
        let result = RandomForestConfig::new(30)
            .unwrap()
            .with_max_features(MaxFeatures::All)
            .fit(&features, &labels, &names)
            .unwrap();
        let predictions = result.forest().predict_batch(&features).unwrap();
        assert_eq!(predictions, labels);
    }

    #[test]
    fn oob_score_computed_when_enabled() {
        let (features, labels, names) = puff_like_tracks();
        let result = RandomForestConfig::new(40)
            .unwrap()
            .with_oob_mode(OobMode::Enabled)
            .fit(&features, &labels, &names)
            .unwrap();
        let oob = result.oob_score().expect("OOB enabled");
        assert!(oob.accuracy > 0.9, "oob accuracy = {}", oob.accuracy);
        assert!(oob.n_oob_samples > 0);
    }

    #[test]
    fn importances_rank_noise_last() {
        let (features, labels, names) = puff_like_tracks();
        let result = RandomForestConfig::new(40)
            .unwrap()
            .fit(&features, &labels, &names)
            .unwrap();
        let total: f64 = result.importances().iter().map(|f| f.importance).sum();
        assert!((total - 1.0).abs() < 1e-10);
        assert_eq!(result.importances().last().unwrap().name, "noise");
    }

    #[test]
    fn result_parts_match_forest() {
        let (features, labels, names) = puff_like_tracks();
        let result = RandomForestConfig::new(10)
            .unwrap()
            .with_oob_mode(OobMode::Disabled)
            .fit(&features, &labels, &names)
            .unwrap();
        assert!(result.oob_score().is_none());
        let ranked: Vec<String> = result.importances().iter().map(|f| f.name.clone()).collect();
        let (forest, oob) = result.into_parts();
        assert!(oob.is_none());
        let from_forest: Vec<String> = forest.feature_importances().into_iter().map(|f| f.name).collect();
        assert_eq!(ranked, from_forest);
    }

    #[test]
    fn same_seed_same_forest() {
        let (features, labels, names) = puff_like_tracks();
        let fit = |seed| {
            RandomForestConfig::new(10)
                .unwrap()
                .with_seed(seed)
                .fit(&features, &labels, &names)
                .unwrap()
        };
        let a = fit(99);
        let b = fit(99);
        let pa = a.forest().predict_proba_batch(&features).unwrap();
        let pb = b.forest().predict_proba_batch(&features).unwrap();
        for (x, y) in pa.iter().zip(&pb) {
            assert_eq!(x.as_slice(), y.as_slice());
        }
    }

    #[test]
    fn single_class_training_still_fits() {
        let features = vec![vec![1.0], vec![2.0], vec![3.0]];
        let result = RandomForestConfig::new(5)
            .unwrap()
            .fit(&features, &[0, 0, 0], &["x".into()])
            .unwrap();
        assert_eq!(result.forest().n_classes(), 1);
        assert_eq!(result.forest().predict(&[2.0]).unwrap(), 0);
    }

    #[test]
    fn bad_bootstrap_fraction_rejected() {
        let (features, labels, names) = puff_like_tracks();
        let err = RandomForestConfig::new(5)
            .unwrap()
            .with_bootstrap_fraction(0.0)
            .fit(&features, &labels, &names)
            .unwrap_err();
        assert!(matches!(err, crate::RfError::InvalidBootstrapFraction { .. }));
    }

    #[test]
    fn empty_dataset_error() {
        let err = RandomForestConfig::new(3).unwrap().fit(&[], &[], &[]).unwrap_err();
        assert!(matches!(err, crate::RfError::EmptyDataset));
    }
}
