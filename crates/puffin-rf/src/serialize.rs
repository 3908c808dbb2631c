//! Classifier file persistence via bincode.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::error::RfError;
use crate::forest::RandomForest;

/// Current binary format version.
const FORMAT_VERSION: u32 = 1;

/// Versioned envelope written in front of the forest.
#[derive(Serialize, Deserialize)]
struct ModelEnvelope {
    format_version: u32,
    forest: RandomForest,
}

/// Borrowing twin of [`ModelEnvelope`] so saving does not clone the forest.
#[derive(Serialize)]
struct ModelEnvelopeRef<'a> {
    format_version: u32,
    forest: &'a RandomForest,
}

impl RandomForest {
    /// Save the classifier to a binary file.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`RfError::SerializeModel`] | bincode encoding failed |
    /// | [`RfError::WriteModel`] | file write failed |
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), RfError> {
        let path = path.as_ref();
        let envelope = ModelEnvelopeRef {
            format_version: FORMAT_VERSION,
            forest: self,
        };
        let bytes = bincode::serialize(&envelope).map_err(|source| RfError::SerializeModel { source })?;

        std::fs::write(path, &bytes).map_err(|source| RfError::WriteModel {
            path: path.to_path_buf(),
            source,
        })?;

        info!(size_bytes = bytes.len(), n_trees = self.trees.len(), "classifier saved");
        Ok(())
    }

    /// Load a classifier from a binary file, checking the format version.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`RfError::ReadModel`] | file read failed |
    /// | [`RfError::DeserializeModel`] | bincode decoding failed |
    /// | [`RfError::IncompatibleModelVersion`] | format version mismatch |
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RfError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|source| RfError::ReadModel {
            path: path.to_path_buf(),
            source,
        })?;

        // The version leads the envelope, so it can be checked before the body decodes.
        let found: u32 = bincode::deserialize(&bytes).map_err(|source| RfError::DeserializeModel {
            path: path.to_path_buf(),
            source,
        })?;
        if found != FORMAT_VERSION {
            return Err(RfError::IncompatibleModelVersion {
                expected: FORMAT_VERSION,
                found,
                path: path.to_path_buf(),
            });
        }

        let envelope: ModelEnvelope =
            bincode::deserialize(&bytes).map_err(|source| RfError::DeserializeModel {
                path: path.to_path_buf(),
                source,
            })?;

        debug!(
            n_trees = envelope.forest.trees.len(),
            n_features = envelope.forest.n_features,
            n_classes = envelope.forest.n_classes,
            "classifier loaded"
        );
        Ok(envelope.forest)
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use crate::RfError;
    use crate::config::RandomForestConfig;
    use crate::forest::RandomForest;

    fn small_forest() -> RandomForest {
        let features = vec![
            vec![0.1, 3.0],
            vec![0.2, 3.5],
            vec![0.3, 2.5],
            vec![1.4, 0.5],
            vec![1.6, 0.4],
            vec![1.8, 0.6],
        ];
        let labels = vec![0, 0, 0, 1, 1, 1];
        let names = vec!["amplitude".to_string(), "duration".to_string()];
        RandomForestConfig::new(5)
            .unwrap()
            .fit(&features, &labels, &names)
            .unwrap()
            .into_forest()
    }

    #[test]
    fn round_trip_identical_predictions() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("classifier.bin");
        let forest = small_forest();
        forest.save(&path).unwrap();
        let loaded = RandomForest::load(&path).unwrap();

        assert_eq!(loaded.feature_names(), forest.feature_names());
        for sample in [[0.15, 3.1], [1.5, 0.5], [0.8, 1.5]] {
            let a = forest.predict_proba(&sample).unwrap();
            let b = loaded.predict_proba(&sample).unwrap();
            assert_eq!(a.as_slice(), b.as_slice());
        }
    }

    #[test]
    fn version_mismatch_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("future.bin");
        let mut bytes = bincode::serialize(&99u32).unwrap();
        bytes.extend_from_slice(&[0u8; 16]);
        std::fs::write(&path, bytes).unwrap();

        let err = RandomForest::load(&path).unwrap_err();
        assert!(matches!(
            err,
            RfError::IncompatibleModelVersion { expected: 1, found: 99, .. }
        ));
    }

    #[test]
    fn missing_and_corrupt_files_rejected() {
        let dir = TempDir::new().unwrap();
        let err = RandomForest::load(dir.path().join("absent.bin")).unwrap_err();
        assert!(matches!(err, RfError::ReadModel { .. }));

        let path = dir.path().join("corrupt.bin");
        std::fs::write(&path, [1u8, 0]).unwrap();
        let err = RandomForest::load(&path).unwrap_err();
        assert!(matches!(err, RfError::DeserializeModel { .. }));
    }
}
