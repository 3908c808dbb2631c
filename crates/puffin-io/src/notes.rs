//! Appending run summaries to `notes.txt`.

use std::fmt::Write as _;
use std::fs::{self, OpenOptions};
use std::io::Write as _;
use std::path::{Path, PathBuf};

use tracing::{info, instrument};

use crate::IoError;

/// File name of the per-directory run log.
pub const NOTES_FILE: &str = "notes.txt";

/// One classification run, in plain values so this crate stays independent of the classifier.
#[derive(Debug, Clone)]
pub struct RunNotes<'a> {
    /// Where the classifier came from (training table or source file).
    pub classifier_source: &'a Path,
    /// Feature names used, label excluded.
    pub features: &'a [String],
    /// Classified tracks.
    pub total: usize,
    /// Tracks bucketed as puffs.
    pub puffs: usize,
    /// Tracks bucketed as non-puffs.
    pub nonpuffs: usize,
    /// Ambiguous tracks.
    pub maybe: usize,
    /// Out-of-bag error, absent for loaded classifiers.
    ///
    /// This is `1 - OOB accuracy`, not the accuracy itself; reports that put the
    /// accuracy under the "OOB Error" label show the complement of this value.
    pub oob_error: Option<f64>,
    /// `(name, importance)` pairs, most important first.
    pub importances: &'a [(String, f64)],
}

impl RunNotes<'_> {
    /// Render the block appended to `notes.txt`.
    #[must_use]
    pub fn render(&self) -> String {
        let pct = |n: usize| {
            if self.total == 0 {
                0.0
            } else {
                n as f64 / self.total as f64 * 100.0
            }
        };
        let mut out = String::new();
        let _ = write!(out, "\n Classifier built from: {}", self.classifier_source.display());
        let _ = write!(out, "\n Params used: {}", self.features.join(","));
        for (label, n) in [("Puffs", self.puffs), ("Nonpuffs", self.nonpuffs), ("Maybe", self.maybe)] {
            let _ = write!(out, "\n {label}/Total: {n}/{} ({:.2}%)", self.total, pct(n));
        }
        match self.oob_error {
            Some(e) => {
                let _ = write!(out, "\n OOB Error: {e:.6}");
            }
            None => out.push_str("\n OOB Error: n/a"),
        }
        out.push_str("\n Feature Importances: ");
        for (rank, (name, importance)) in self.importances.iter().enumerate() {
            let _ = write!(out, "\n\t {}. {name} ({importance:.6})", rank + 1);
        }
        out
    }
}

/// Appends run summaries to `<dir>/notes.txt`.
pub struct NotesWriter {
    path: PathBuf,
}

impl NotesWriter {
    /// Target `<dir>/notes.txt`, creating `dir` if needed.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::OutputDirCreate`] if the directory cannot be created.
    pub fn new(dir: &Path) -> Result<Self, IoError> {
        fs::create_dir_all(dir).map_err(|source| IoError::OutputDirCreate {
            path: dir.to_path_buf(),
            source,
        })?;
        Ok(Self {
            path: dir.join(NOTES_FILE),
        })
    }

    /// Path of the notes file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one run's summary; earlier runs are kept.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::WriteFile`] if the file cannot be opened or written.
    #[instrument(skip_all, fields(path = %self.path.display()))]
    pub fn append(&self, notes: &RunNotes<'_>) -> Result<(), IoError> {
        let write_err = |source| IoError::WriteFile {
            path: self.path.clone(),
            source,
        };
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(write_err)?;
        file.write_all(notes.render().as_bytes()).map_err(write_err)?;
        info!(total = notes.total, puffs = notes.puffs, "run notes appended");
        Ok(())
    }
}
