//! Reference-resolving track stores.
//!
//! A field is stored as one reference per track; each reference points at the
//! track's numeric payload. [`TrackStore`] separates fetching the reference
//! array from resolving a single reference, so the field-by-track traversal in
//! [`convert_tracks`](crate::convert_tracks) does not depend on the container.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use hdf5::{ObjectReference1, ReferencedObject};
use tracing::{debug, instrument};

use crate::IoError;
use crate::format::ContainerFormat;

/// MATLAB marks empty arrays with this attribute and stores their shape as data.
const MATLAB_EMPTY_ATTR: &str = "MATLAB_empty";

/// Group holding the struct array in a v7.3 MAT-file.
pub const TRACKS_GROUP: &str = "tracks";

/// Source of per-track field payloads reached through references.
pub trait TrackStore {
    /// Handle to one payload.
    type Ref;

    /// The field's references, one per track, in track order.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::MissingField`] if the field does not exist.
    fn field_refs(&self, field: &str) -> Result<Vec<Self::Ref>, IoError>;

    /// Follow a reference to its payload, flattened in storage order.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::UnresolvedReference`] if the target is not numeric data.
    fn resolve(&self, reference: &Self::Ref) -> Result<Vec<f64>, IoError>;
}

/// Read-only view of the `tracks` group in a MATLAB v7.3 file.
///
/// The file handle closes when the store is dropped.
pub struct Hdf5TrackStore {
    path: PathBuf,
    file: hdf5::File,
    tracks: hdf5::Group,
}

impl Hdf5TrackStore {
    /// Open `path` read-only and locate its `tracks` group.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`IoError::FileNotFound`] | file cannot be read |
    /// | [`IoError::LegacyFormat`] | file head has no HDF5 superblock |
    /// | [`IoError::Hdf5`] | HDF5 library refuses to open it |
    /// | [`IoError::MissingGroup`] | no `tracks` group |
    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn open(path: &Path) -> Result<Self, IoError> {
        let format = ContainerFormat::detect(path)?;
        if format != ContainerFormat::Hdf5 {
            return Err(IoError::LegacyFormat {
                path: path.to_path_buf(),
                format,
            });
        }

        let file = hdf5::File::open(path).map_err(|source| IoError::Hdf5 {
            path: path.to_path_buf(),
            context: "opening file".into(),
            source,
        })?;

        let missing = || IoError::MissingGroup {
            path: path.to_path_buf(),
            group: TRACKS_GROUP.into(),
        };
        if !file.link_exists(TRACKS_GROUP) {
            return Err(missing());
        }
        let tracks = file.group(TRACKS_GROUP).map_err(|_| missing())?;

        debug!("tracks group opened");
        Ok(Self {
            path: path.to_path_buf(),
            file,
            tracks,
        })
    }

    fn hdf5_error(&self, context: String) -> impl FnOnce(hdf5::Error) -> IoError + '_ {
        move |source| IoError::Hdf5 {
            path: self.path.clone(),
            context,
            source,
        }
    }
}

impl TrackStore for Hdf5TrackStore {
    type Ref = ObjectReference1;

    fn field_refs(&self, field: &str) -> Result<Vec<ObjectReference1>, IoError> {
        if !self.tracks.link_exists(field) {
            return Err(IoError::MissingField {
                path: self.path.clone(),
                field: field.to_string(),
            });
        }
        let dataset = self
            .tracks
            .dataset(field)
            .map_err(self.hdf5_error(format!("opening field \"{field}\"")))?;
        dataset
            .read_raw::<ObjectReference1>()
            .map_err(self.hdf5_error(format!("reading references of field \"{field}\"")))
    }

    fn resolve(&self, reference: &ObjectReference1) -> Result<Vec<f64>, IoError> {
        let object = self
            .file
            .dereference(reference)
            .map_err(self.hdf5_error("dereferencing track payload".into()))?;
        let ReferencedObject::Dataset(dataset) = object else {
            return Err(IoError::UnresolvedReference {
                location: self.path.display().to_string(),
            });
        };

        let is_empty = dataset
            .attr_names()
            .map_err(self.hdf5_error("listing payload attributes".into()))?
            .iter()
            .any(|name| name == MATLAB_EMPTY_ATTR);
        if is_empty {
            return Ok(Vec::new());
        }

        dataset
            .read_raw::<f64>()
            .map_err(self.hdf5_error("reading track payload".into()))
    }
}

/// In-memory store for tracks that are already decoded.
///
/// Payloads live in an arena; fields hold indices into it, so one payload
/// may be referenced from several places.
#[derive(Debug, Default)]
pub struct MemoryTrackStore {
    payloads: Vec<Vec<f64>>,
    fields: HashMap<String, Vec<usize>>,
}

impl MemoryTrackStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field with one payload per track.
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, payloads: Vec<Vec<f64>>) -> Self {
        let refs = payloads.into_iter().map(|p| self.push_payload(p)).collect();
        self.fields.insert(name.into(), refs);
        self
    }

    /// Store a payload and return its reference.
    pub fn push_payload(&mut self, payload: Vec<f64>) -> usize {
        self.payloads.push(payload);
        self.payloads.len() - 1
    }

    /// Point a field at existing payload references.
    pub fn set_refs(&mut self, name: impl Into<String>, refs: Vec<usize>) {
        self.fields.insert(name.into(), refs);
    }
}

impl TrackStore for MemoryTrackStore {
    type Ref = usize;

    fn field_refs(&self, field: &str) -> Result<Vec<usize>, IoError> {
        self.fields
            .get(field)
            .cloned()
            .ok_or_else(|| IoError::MissingField {
                path: PathBuf::from("<memory>"),
                field: field.to_string(),
            })
    }

    fn resolve(&self, reference: &usize) -> Result<Vec<f64>, IoError> {
        self.payloads
            .get(*reference)
            .cloned()
            .ok_or_else(|| IoError::UnresolvedReference {
                location: format!("<memory> payload {reference}"),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_resolves_shared_payloads() {
        let mut store = MemoryTrackStore::new().with_field("x", vec![vec![1.0], vec![2.0]]);
        let shared = store.push_payload(vec![7.0, 8.0]);
        store.set_refs("pos", vec![shared, shared]);

        let refs = store.field_refs("pos").unwrap();
        assert_eq!(refs.len(), 2);
        assert_eq!(store.resolve(&refs[1]).unwrap(), vec![7.0, 8.0]);
        let x: Vec<Vec<f64>> = store
            .field_refs("x")
            .unwrap()
            .iter()
            .map(|r| store.resolve(r).unwrap())
            .collect();
        assert_eq!(x, vec![vec![1.0], vec![2.0]]);
    }

    #[test]
    fn memory_store_missing_field_and_dangling_ref() {
        let store = MemoryTrackStore::new();
        assert!(matches!(store.field_refs("x"), Err(IoError::MissingField { .. })));
        assert!(matches!(store.resolve(&3), Err(IoError::UnresolvedReference { .. })));
    }

    #[test]
    fn open_rejects_legacy_header() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("old.mat");
        std::fs::write(&path, b"MATLAB 5.0 MAT-file, Platform: MACI64").unwrap();
        let err = Hdf5TrackStore::open(&path).err().unwrap();
        assert!(matches!(
            err,
            IoError::LegacyFormat { format: ContainerFormat::LegacyMat, .. }
        ));
    }
}
