//! MATLAB v7.3 track-struct conversion, `.npy` tables, and run notes for puffin.

mod convert;
mod domain;
mod error;
mod format;
mod layout;
mod notes;
pub mod npy;
mod store;
mod table;

pub use convert::{ConvertOptions, RecoverableKinds, StructConverter, convert_tracks, mat_to_table};
pub use domain::FieldList;
pub use error::{IoError, IoErrorKind};
pub use format::ContainerFormat;
pub use layout::{CLASSIFICATION_DIR, classification_dir, output_path};
pub use notes::{NOTES_FILE, NotesWriter, RunNotes};
pub use npy::{read_table, write_table};
pub use store::{Hdf5TrackStore, MemoryTrackStore, TRACKS_GROUP, TrackStore};
pub use table::{Column, FeatureTable, MAX_LABEL};
