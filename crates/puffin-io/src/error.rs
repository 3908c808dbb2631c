//! I/O error types for puffin-io.

use std::path::PathBuf;

use crate::format::ContainerFormat;

/// Errors from track-struct conversion, `.npy` tables, and report files.
#[derive(Debug, thiserror::Error)]
pub enum IoError {
    /// Returned when the input file does not exist or is unreadable.
    #[error("file not found: {path}")]
    FileNotFound {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Returned when the source is not an HDF5-backed (v7.3) MAT-file.
    #[error("{path} is a {format} container, not MATLAB v7.3; re-save it with -v7.3")]
    LegacyFormat {
        /// Source path.
        path: PathBuf,
        /// What the file head looked like.
        format: ContainerFormat,
    },

    /// Returned when the HDF5 library rejects an operation on the source.
    #[error("HDF5 error in {path}: {context}")]
    Hdf5 {
        /// Source path.
        path: PathBuf,
        /// What was being done.
        context: String,
        /// Underlying HDF5 error.
        source: hdf5::Error,
    },

    /// Returned when the container has no top-level `tracks` group.
    #[error("no \"{group}\" group in {path}")]
    MissingGroup {
        /// Source path.
        path: PathBuf,
        /// Group name looked up.
        group: String,
    },

    /// Returned when a requested field is absent from the `tracks` group.
    #[error("field \"{field}\" not found under \"tracks\" in {path}")]
    MissingField {
        /// Source path.
        path: PathBuf,
        /// Requested field name.
        field: String,
    },

    /// Returned when a reference does not point at a numeric dataset.
    #[error("reference in {location} does not resolve to a dataset")]
    UnresolvedReference {
        /// Store description (file path or in-memory label).
        location: String,
    },

    /// Returned when a track's payload for a field holds no values.
    #[error("field \"{field}\" is empty for track {track}")]
    EmptyPayload {
        /// Field name.
        field: String,
        /// Zero-based track index.
        track: usize,
    },

    /// Returned when payload lengths differ between tracks of one field.
    #[error("field \"{field}\": track {track} has {got} values, expected {expected}")]
    PayloadShapeMismatch {
        /// Field name.
        field: String,
        /// Zero-based track index.
        track: usize,
        /// Payload length of track 0.
        expected: usize,
        /// Payload length of this track.
        got: usize,
    },

    /// Returned when two fields disagree on the number of tracks.
    #[error("field \"{field}\" has {got} tracks, expected {expected}")]
    TrackCountMismatch {
        /// Field name.
        field: String,
        /// Track count of the first field.
        expected: usize,
        /// Track count of this field.
        got: usize,
    },

    /// Returned when no fields were requested.
    #[error("field list is empty")]
    EmptyFieldList,

    /// Returned when a field name cannot be stored as a table column name.
    #[error("invalid field name \"{name}\": must be non-empty printable ASCII without quotes or backslashes")]
    InvalidFieldName {
        /// The rejected name.
        name: String,
    },

    /// Returned when the same field is requested twice.
    #[error("field \"{name}\" requested more than once")]
    DuplicateField {
        /// The repeated name.
        name: String,
    },

    /// Returned when classification gets fewer than a label plus one feature.
    #[error("must import at least two fields (label plus features) for classification, got {count}")]
    InsufficientFields {
        /// Number of fields provided.
        count: usize,
    },

    /// Returned when table rows do not match the column layout.
    #[error("row {row} has {got} values, columns need {expected}")]
    RowWidth {
        /// Zero-based row index.
        row: usize,
        /// Sum of column widths.
        expected: usize,
        /// Values in this row.
        got: usize,
    },

    /// Returned when the label column holds more than one value per track.
    #[error("label column \"{column}\" has width {width}, expected a scalar")]
    LabelNotScalar {
        /// Label column name.
        column: String,
        /// Its width.
        width: usize,
    },

    /// Returned when a label is not a non-negative whole number within range.
    #[error("label {value} at row {row} is not a non-negative integer up to 65535")]
    InvalidLabel {
        /// Zero-based row index.
        row: usize,
        /// Offending value.
        value: f64,
    },

    /// Returned when a `.npy` file has a malformed preamble or header.
    #[error("malformed .npy header in {path}: {reason}")]
    NpyHeader {
        /// Path of the file.
        path: PathBuf,
        /// What was wrong.
        reason: String,
    },

    /// Returned when a `.npy` file holds something other than an `<f8` record table.
    #[error("unsupported dtype in {path}: {descr}")]
    UnsupportedDtype {
        /// Path of the file.
        path: PathBuf,
        /// The offending descriptor.
        descr: String,
    },

    /// Returned when the source name has no usable file stem.
    #[error("cannot derive an output name from {path}")]
    InvalidSourcePath {
        /// The source path.
        path: PathBuf,
    },

    /// Returned when the output directory cannot be created.
    #[error("cannot create output directory {path}")]
    OutputDirCreate {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Returned when an output file cannot be written.
    #[error("cannot write file {path}")]
    WriteFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

/// Fieldless mirror of [`IoError`] used to configure recovery policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IoErrorKind {
    FileNotFound,
    LegacyFormat,
    Hdf5,
    MissingGroup,
    MissingField,
    UnresolvedReference,
    EmptyPayload,
    PayloadShapeMismatch,
    TrackCountMismatch,
    InvalidFields,
    InsufficientFields,
    RowWidth,
    InvalidLabel,
    Npy,
    InvalidSourcePath,
    Output,
}

impl IoError {
    /// Classify this error for [`RecoverableKinds`](crate::RecoverableKinds) lookups.
    #[must_use]
    pub fn kind(&self) -> IoErrorKind {
        match self {
            IoError::FileNotFound { .. } => IoErrorKind::FileNotFound,
            IoError::LegacyFormat { .. } => IoErrorKind::LegacyFormat,
            IoError::Hdf5 { .. } => IoErrorKind::Hdf5,
            IoError::MissingGroup { .. } => IoErrorKind::MissingGroup,
            IoError::MissingField { .. } => IoErrorKind::MissingField,
            IoError::UnresolvedReference { .. } => IoErrorKind::UnresolvedReference,
            IoError::EmptyPayload { .. } => IoErrorKind::EmptyPayload,
            IoError::PayloadShapeMismatch { .. } => IoErrorKind::PayloadShapeMismatch,
            IoError::TrackCountMismatch { .. } => IoErrorKind::TrackCountMismatch,
            IoError::EmptyFieldList
            | IoError::InvalidFieldName { .. }
            | IoError::DuplicateField { .. } => IoErrorKind::InvalidFields,
            IoError::InsufficientFields { .. } => IoErrorKind::InsufficientFields,
            IoError::RowWidth { .. } => IoErrorKind::RowWidth,
            IoError::LabelNotScalar { .. } | IoError::InvalidLabel { .. } => IoErrorKind::InvalidLabel,
            IoError::NpyHeader { .. } | IoError::UnsupportedDtype { .. } => IoErrorKind::Npy,
            IoError::InvalidSourcePath { .. } => IoErrorKind::InvalidSourcePath,
            IoError::OutputDirCreate { .. } | IoError::WriteFile { .. } => IoErrorKind::Output,
        }
    }
}
