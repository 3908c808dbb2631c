//! Track struct to named table conversion.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument, warn};

use crate::domain::FieldList;
use crate::error::{IoError, IoErrorKind};
use crate::layout::output_path;
use crate::npy;
use crate::store::{Hdf5TrackStore, TrackStore};
use crate::table::{Column, FeatureTable};

/// Error kinds that [`StructConverter::convert`] reports as "no output" instead of failing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoverableKinds(BTreeSet<IoErrorKind>);

impl RecoverableKinds {
    /// Recover from nothing: every error propagates.
    #[must_use]
    pub fn none() -> Self {
        Self(BTreeSet::new())
    }

    /// Add a recoverable kind.
    #[must_use]
    pub fn with(mut self, kind: IoErrorKind) -> Self {
        self.0.insert(kind);
        self
    }

    /// Whether errors of `kind` are recovered.
    #[must_use]
    pub fn contains(&self, kind: IoErrorKind) -> bool {
        self.0.contains(&kind)
    }
}

/// Legacy-format sources are recoverable; everything else is fatal.
impl Default for RecoverableKinds {
    fn default() -> Self {
        Self::none().with(IoErrorKind::LegacyFormat)
    }
}

/// Conversion options.
#[derive(Debug, Clone, Default)]
pub struct ConvertOptions {
    /// Errors turned into an absent result.
    pub recoverable: RecoverableKinds,
}

/// Converts a MATLAB v7.3 track struct into a [`FeatureTable`] and saves it as `.npy`.
///
/// ```no_run
/// use std::path::Path;
/// use puffin_io::{FieldList, StructConverter};
///
/// let fields = FieldList::new(vec!["isPuff".into(), "amplitude".into()])?;
/// let table = StructConverter::new("cell1/Tracks/tracks.mat")
///     .convert(&fields, Path::new("cell1/Classification"))?;
/// # Ok::<(), puffin_io::IoError>(())
/// ```
#[derive(Debug, Clone)]
pub struct StructConverter {
    source: PathBuf,
    options: ConvertOptions,
}

impl StructConverter {
    /// Create a converter for `source` with default options.
    pub fn new(source: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            options: ConvertOptions::default(),
        }
    }

    /// Replace the conversion options.
    #[must_use]
    pub fn with_options(mut self, options: ConvertOptions) -> Self {
        self.options = options;
        self
    }

    /// Replace only the recoverable error kinds.
    #[must_use]
    pub fn with_recoverable(mut self, recoverable: RecoverableKinds) -> Self {
        self.options.recoverable = recoverable;
        self
    }

    /// Source path.
    #[must_use]
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Convert and write `<dest_dir>/<source stem>.npy`.
    ///
    /// Returns `Ok(None)` with a warning, and writes nothing, when the error
    /// kind is recoverable under the configured options.
    ///
    /// # Errors
    ///
    /// Any non-recoverable error from [`convert_strict`](Self::convert_strict).
    pub fn convert(
        &self,
        fields: &FieldList,
        dest_dir: &Path,
    ) -> Result<Option<FeatureTable>, IoError> {
        match self.convert_strict(fields, dest_dir) {
            Ok(table) => Ok(Some(table)),
            Err(e) if self.options.recoverable.contains(e.kind()) => {
                warn!(source = %self.source.display(), error = %e, "conversion skipped, no output written");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Convert and write, failing on every error.
    ///
    /// The source is closed before the output file is written.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`IoError::LegacyFormat`] | source is not HDF5-backed |
    /// | [`IoError::MissingGroup`] | no `tracks` group |
    /// | [`IoError::MissingField`] | a requested field is absent |
    /// | [`IoError::TrackCountMismatch`], [`IoError::PayloadShapeMismatch`], [`IoError::EmptyPayload`] | payloads do not form a table |
    /// | [`IoError::OutputDirCreate`], [`IoError::WriteFile`] | output cannot be written |
    #[instrument(skip_all, fields(source = %self.source.display(), field_list = %fields))]
    pub fn convert_strict(&self, fields: &FieldList, dest_dir: &Path) -> Result<FeatureTable, IoError> {
        let out = output_path(&self.source, dest_dir)?;
        let table = {
            let store = Hdf5TrackStore::open(&self.source)?;
            convert_tracks(&store, fields)?
        };

        std::fs::create_dir_all(dest_dir).map_err(|source| IoError::OutputDirCreate {
            path: dest_dir.to_path_buf(),
            source,
        })?;
        npy::write_table(&out, &table)?;

        info!(
            path = %out.display(),
            n_tracks = table.n_rows(),
            n_columns = table.n_columns(),
            "track table written"
        );
        Ok(table)
    }
}

/// Convert `source` into `dest_dir`, recovering from legacy-format sources.
///
/// # Errors
///
/// Any error except [`IoError::LegacyFormat`].
pub fn mat_to_table(
    source: &Path,
    fields: &FieldList,
    dest_dir: &Path,
) -> Result<Option<FeatureTable>, IoError> {
    StructConverter::new(source).convert(fields, dest_dir)
}

/// Resolve every requested field for every track and assemble the rows.
///
/// All fields are materialized before any row is built. Row `i` is the
/// concatenation of track `i`'s payloads in field order.
///
/// # Errors
///
/// Store errors, plus [`IoError::TrackCountMismatch`],
/// [`IoError::PayloadShapeMismatch`] and [`IoError::EmptyPayload`].
pub fn convert_tracks<S: TrackStore>(store: &S, fields: &FieldList) -> Result<FeatureTable, IoError> {
    let mut columns = Vec::with_capacity(fields.len());
    let mut per_field: Vec<Vec<Vec<f64>>> = Vec::with_capacity(fields.len());

    for field in fields {
        let payloads = store
            .field_refs(field)?
            .iter()
            .map(|r| store.resolve(r))
            .collect::<Result<Vec<_>, _>>()?;

        if let Some(first) = per_field.first()
            && payloads.len() != first.len()
        {
            return Err(IoError::TrackCountMismatch {
                field: field.clone(),
                expected: first.len(),
                got: payloads.len(),
            });
        }

        let width = payloads.first().map_or(1, Vec::len);
        for (track, payload) in payloads.iter().enumerate() {
            if payload.is_empty() {
                return Err(IoError::EmptyPayload {
                    field: field.clone(),
                    track,
                });
            }
            if payload.len() != width {
                return Err(IoError::PayloadShapeMismatch {
                    field: field.clone(),
                    track,
                    expected: width,
                    got: payload.len(),
                });
            }
        }

        debug!(field = %field, n_tracks = payloads.len(), width, "field resolved");
        columns.push(Column::new(field.clone(), width));
        per_field.push(payloads);
    }

    let n_tracks = per_field.first().map_or(0, Vec::len);
    let rows: Vec<Vec<f64>> = (0..n_tracks)
        .map(|track| {
            per_field
                .iter()
                .flat_map(|payloads| payloads[track].iter().copied())
                .collect()
        })
        .collect();

    FeatureTable::from_rows(columns, &rows)
}
