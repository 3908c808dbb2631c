//! Criterion benchmarks for puffin-rf: training, prediction, bucketing.

use criterion::{Criterion, criterion_group, criterion_main};
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use puffin_rf::{BucketThresholds, RandomForestConfig};

/// Two-class track table: first two columns informative, the rest noise.
fn make_tracks(n_tracks: usize, n_features: usize, seed: u64) -> (Vec<Vec<f64>>, Vec<usize>, Vec<String>) {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut features = Vec::with_capacity(n_tracks);
    let mut labels = Vec::with_capacity(n_tracks);
    for i in 0..n_tracks {
        let puff = i % 2;
        labels.push(puff);
        let row: Vec<f64> = (0..n_features)
            .map(|f| {
                let base = if f < 2 { puff as f64 * 2.0 } else { 0.0 };
                base + rng.r#gen::<f64>()
            })
            .collect();
        features.push(row);
    }
    let names: Vec<String> = (0..n_features).map(|f| format!("f{f}")).collect();
    (features, labels, names)
}

fn bench_train(c: &mut Criterion) {
    let (features, labels, names) = make_tracks(1000, 12, 42);
    let cfg = RandomForestConfig::new(100).unwrap();

    c.bench_function("rf_train_1000x12_100trees", |b| {
        b.iter(|| cfg.fit(&features, &labels, &names).unwrap());
    });
}

fn bench_classify_tracks(c: &mut Criterion) {
    let (features, labels, names) = make_tracks(1000, 12, 42);
    let forest = RandomForestConfig::new(100)
        .unwrap()
        .fit(&features, &labels, &names)
        .unwrap()
        .into_forest();
    let thresholds = BucketThresholds::default();

    c.bench_function("rf_classify_tracks_1000x12_100trees", |b| {
        b.iter(|| forest.classify_tracks(&features, &thresholds).unwrap());
    });
}

criterion_group!(benches, bench_train, bench_classify_tracks);
criterion_main!(benches);
