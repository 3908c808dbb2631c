//! End-to-end classification checks for puffin-rf.
//!
//! A deterministic synthetic track population stands in for labelled
//! training data: puffs are bright and short-lived, non-puffs dim and long.

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tempfile::TempDir;

use puffin_rf::{Bucket, BucketThresholds, OobMode, RandomForest, RandomForestConfig};

/// 200 tracks, 6 features, labels alternating non-puff / puff.
///
/// Features 0-1 (`amplitude`, `lifetime`) carry the class; 2-5 are noise.
fn make_tracks(seed: u64) -> (Vec<Vec<f64>>, Vec<usize>, Vec<String>) {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let n_tracks = 200;
    let mut features = Vec::with_capacity(n_tracks);
    let mut labels = Vec::with_capacity(n_tracks);
    for i in 0..n_tracks {
        let puff = i % 2;
        labels.push(puff);
        let amplitude = if puff == 1 { 4.0 } else { 1.0 } + rng.r#gen::<f64>();
        let lifetime = if puff == 1 { 2.0 } else { 8.0 } + rng.r#gen::<f64>();
        let mut row = vec![amplitude, lifetime];
        row.extend((0..4).map(|_| rng.r#gen::<f64>()));
        features.push(row);
    }
    let mut names = vec!["amplitude".to_string(), "lifetime".to_string()];
    names.extend((0..4).map(|j| format!("noise[{j}]")));
    (features, labels, names)
}

#[test]
fn oob_error_is_low_on_separable_tracks() {
    let (features, labels, names) = make_tracks(42);
    let result = RandomForestConfig::new(100)
        .unwrap()
        .with_oob_mode(OobMode::Enabled)
        .fit(&features, &labels, &names)
        .unwrap();

    let oob = result.oob_score().expect("OOB enabled");
    assert!(oob.error() < 0.05, "oob error {}", oob.error());
}

#[test]
fn informative_features_rank_first() {
    let (features, labels, names) = make_tracks(42);
    let result = RandomForestConfig::new(100)
        .unwrap()
        .fit(&features, &labels, &names)
        .unwrap();

    let top2: Vec<&str> = result
        .importances()
        .iter()
        .take(2)
        .map(|f| f.name.as_str())
        .collect();
    assert!(top2.contains(&"amplitude"), "top-2: {top2:?}");
    assert!(top2.contains(&"lifetime"), "top-2: {top2:?}");

    let total: f64 = result.importances().iter().map(|f| f.importance).sum();
    assert!((total - 1.0).abs() < 1e-9);
}

#[test]
fn unseen_tracks_land_in_expected_buckets() {
    let (features, labels, names) = make_tracks(42);
    let forest = RandomForestConfig::new(100)
        .unwrap()
        .fit(&features, &labels, &names)
        .unwrap()
        .into_forest();

    let (test_features, test_labels, _) = make_tracks(7);
    let classification = forest
        .classify_tracks(&test_features, &BucketThresholds::default())
        .unwrap();

    let counts = classification.counts();
    assert_eq!(counts.total, test_features.len());
    assert_eq!(counts.puffs + counts.nonpuffs + counts.maybe, counts.total);

    for i in classification.indices(Bucket::Puff) {
        assert_eq!(test_labels[i], 1, "track {i} bucketed as puff");
    }
    for i in classification.indices(Bucket::NonPuff) {
        assert_eq!(test_labels[i], 0, "track {i} bucketed as non-puff");
    }
    assert!(counts.maybe <= 10, "{} ambiguous tracks", counts.maybe);
}

#[test]
fn same_seed_gives_identical_buckets() {
    let (features, labels, names) = make_tracks(42);
    let config = RandomForestConfig::new(50).unwrap().with_seed(3);
    let thresholds = BucketThresholds::default();

    let a = config.fit(&features, &labels, &names).unwrap().into_forest();
    let b = config.fit(&features, &labels, &names).unwrap().into_forest();

    let a = a.classify_tracks(&features, &thresholds).unwrap();
    let b = b.classify_tracks(&features, &thresholds).unwrap();
    assert_eq!(a.buckets(), b.buckets());
    assert_eq!(a.puff_probabilities(), b.puff_probabilities());
}

#[test]
fn saved_classifier_reproduces_buckets() {
    let (features, labels, names) = make_tracks(42);
    let forest = RandomForestConfig::new(30)
        .unwrap()
        .fit(&features, &labels, &names)
        .unwrap()
        .into_forest();

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("classifier.bin");
    forest.save(&path).unwrap();
    let loaded = RandomForest::load(&path).unwrap();

    let thresholds = BucketThresholds::new(0.2, 0.8).unwrap();
    let before = forest.classify_tracks(&features, &thresholds).unwrap();
    let after = loaded.classify_tracks(&features, &thresholds).unwrap();
    assert_eq!(before.buckets(), after.buckets());
    assert_eq!(loaded.feature_names(), names.as_slice());
}
