//! Puff / non-puff / maybe bucketing of classified tracks.

use std::fmt;

use serde::Serialize;
use tracing::{info, instrument};

use crate::error::RfError;
use crate::forest::RandomForest;

/// Class index the forest uses for puffs; class 0 is non-puff.
pub const PUFF_CLASS: usize = 1;

/// Outcome for one track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Bucket {
    /// Puff probability at or below the non-puff threshold.
    NonPuff,
    /// Puff probability at or above the puff threshold.
    Puff,
    /// Anything in between.
    Maybe,
}

impl Bucket {
    /// File-stem style name: `nonpuffs`, `puffs`, `maybe`.
    #[must_use]
    pub fn plural(self) -> &'static str {
        match self {
            Bucket::NonPuff => "nonpuffs",
            Bucket::Puff => "puffs",
            Bucket::Maybe => "maybe",
        }
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Bucket::NonPuff => "nonpuff",
            Bucket::Puff => "puff",
            Bucket::Maybe => "maybe",
        })
    }
}

/// Probability cut points separating the three buckets.
///
/// Must satisfy `0 <= nonpuff < puff <= 1`. Defaults: `nonpuff = 0.3`, `puff = 0.7`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BucketThresholds {
    nonpuff: f64,
    puff: f64,
}

impl BucketThresholds {
    /// Validate and build thresholds.
    ///
    /// # Errors
    ///
    /// Returns [`RfError::InvalidThresholds`] unless `0 <= nonpuff < puff <= 1`.
    pub fn new(nonpuff: f64, puff: f64) -> Result<Self, RfError> {
        if !(0.0..=1.0).contains(&nonpuff) || !(0.0..=1.0).contains(&puff) || nonpuff >= puff {
            return Err(RfError::InvalidThresholds { nonpuff, puff });
        }
        Ok(Self { nonpuff, puff })
    }

    /// Bucket a single puff probability.
    #[must_use]
    pub fn bucket(&self, puff_probability: f64) -> Bucket {
        if puff_probability >= self.puff {
            Bucket::Puff
        } else if puff_probability <= self.nonpuff {
            Bucket::NonPuff
        } else {
            Bucket::Maybe
        }
    }

    /// Upper bound of the non-puff bucket.
    #[must_use]
    pub fn nonpuff(&self) -> f64 {
        self.nonpuff
    }

    /// Lower bound of the puff bucket.
    #[must_use]
    pub fn puff(&self) -> f64 {
        self.puff
    }
}

impl Default for BucketThresholds {
    fn default() -> Self {
        Self {
            nonpuff: 0.3,
            puff: 0.7,
        }
    }
}

/// Track totals per bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct BucketCounts {
    /// Number of classified tracks.
    pub total: usize,
    /// Tracks in the non-puff bucket.
    pub nonpuffs: usize,
    /// Tracks in the puff bucket.
    pub puffs: usize,
    /// Ambiguous tracks.
    pub maybe: usize,
}

/// Per-track buckets and puff probabilities, in input order.
#[derive(Debug, Clone)]
pub struct TrackClassification {
    buckets: Vec<Bucket>,
    puff_probabilities: Vec<f64>,
    predictions: Vec<usize>,
}

impl TrackClassification {
    /// Bucket assigned to each track.
    #[must_use]
    pub fn buckets(&self) -> &[Bucket] {
        &self.buckets
    }

    /// Forest probability of [`PUFF_CLASS`] for each track.
    #[must_use]
    pub fn puff_probabilities(&self) -> &[f64] {
        &self.puff_probabilities
    }

    /// Argmax class for each track.
    #[must_use]
    pub fn predictions(&self) -> &[usize] {
        &self.predictions
    }

    /// Indices of the tracks that fell into `bucket`.
    #[must_use]
    pub fn indices(&self, bucket: Bucket) -> Vec<usize> {
        self.buckets
            .iter()
            .enumerate()
            .filter_map(|(i, &b)| (b == bucket).then_some(i))
            .collect()
    }

    /// Totals per bucket.
    #[must_use]
    pub fn counts(&self) -> BucketCounts {
        self.buckets.iter().fold(
            BucketCounts {
                total: self.buckets.len(),
                ..BucketCounts::default()
            },
            |mut counts, bucket| {
                match bucket {
                    Bucket::NonPuff => counts.nonpuffs += 1,
                    Bucket::Puff => counts.puffs += 1,
                    Bucket::Maybe => counts.maybe += 1,
                }
                counts
            },
        )
    }
}

impl RandomForest {
    /// Classify tracks and sort them into puff / non-puff / maybe buckets.
    ///
    /// # Errors
    ///
    /// Returns [`RfError::PredictionFeatureMismatch`] if any row has the wrong feature count.
    #[instrument(skip_all, fields(n_tracks = features.len()))]
    pub fn classify_tracks(
        &self,
        features: &[Vec<f64>],
        thresholds: &BucketThresholds,
    ) -> Result<TrackClassification, RfError> {
        let distributions = self.predict_proba_batch(features)?;
        let puff_probabilities: Vec<f64> =
            distributions.iter().map(|d| d.probability(PUFF_CLASS)).collect();
        let classification = TrackClassification {
            buckets: puff_probabilities.iter().map(|&p| thresholds.bucket(p)).collect(),
            predictions: distributions.iter().map(|d| d.predicted_class()).collect(),
            puff_probabilities,
        };

        let counts = classification.counts();
        info!(
            puffs = counts.puffs,
            nonpuffs = counts.nonpuffs,
            maybe = counts.maybe,
            "tracks classified"
        );
        Ok(classification)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RandomForestConfig;

    #[test]
    fn thresholds_validated() {
        assert!(BucketThresholds::new(0.3, 0.7).is_ok());
        assert!(BucketThresholds::new(0.5, 0.5).is_err());
        assert!(BucketThresholds::new(-0.1, 0.5).is_err());
        assert!(BucketThresholds::new(0.2, 1.5).is_err());
    }

    #[test]
    fn bucket_boundaries_are_inclusive() {
        let t = BucketThresholds::default();
        assert_eq!(t.bucket(0.7), Bucket::Puff);
        assert_eq!(t.bucket(1.0), Bucket::Puff);
        assert_eq!(t.bucket(0.3), Bucket::NonPuff);
        assert_eq!(t.bucket(0.0), Bucket::NonPuff);
        assert_eq!(t.bucket(0.5), Bucket::Maybe);
    }

    #[test]
    fn counts_and_indices() {
        let classification = TrackClassification {
            buckets: vec![Bucket::Puff, Bucket::NonPuff, Bucket::NonPuff, Bucket::Maybe],
            puff_probabilities: vec![0.9, 0.1, 0.0, 0.5],
            predictions: vec![1, 0, 0, 1],
        };
        let counts = classification.counts();
        assert_eq!(
            counts,
            BucketCounts { total: 4, nonpuffs: 2, puffs: 1, maybe: 1 }
        );
        assert_eq!(classification.indices(Bucket::NonPuff), vec![1, 2]);
        assert_eq!(classification.indices(Bucket::Maybe), vec![3]);
    }

    #[test]
    fn forest_buckets_clear_tracks() {
        let features = vec![
            vec![0.1],
            vec![0.2],
            vec![0.3],
            vec![2.0],
            vec![2.1],
            vec![2.2],
        ];
        let labels = vec![0, 0, 0, 1, 1, 1];
        let forest = RandomForestConfig::new(20)
            .unwrap()
            .fit(&features, &labels, &["amplitude".to_string()])
            .unwrap()
            .into_forest();

        let result = forest
            .classify_tracks(&[vec![0.0], vec![3.0]], &BucketThresholds::default())
            .unwrap();
        assert_eq!(result.buckets(), &[Bucket::NonPuff, Bucket::Puff]);
        assert_eq!(result.predictions(), &[0, 1]);
    }

    #[test]
    fn single_class_forest_never_finds_puffs() {
        let forest = RandomForestConfig::new(3)
            .unwrap()
            .fit(&[vec![1.0], vec![2.0]], &[0, 0], &["x".to_string()])
            .unwrap()
            .into_forest();
        let result = forest
            .classify_tracks(&[vec![1.5]], &BucketThresholds::default())
            .unwrap();
        assert_eq!(result.buckets(), &[Bucket::NonPuff]);
        assert_eq!(result.puff_probabilities(), &[0.0]);
    }
}
