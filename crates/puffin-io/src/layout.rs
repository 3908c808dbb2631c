//! Output path conventions.

use std::path::{Path, PathBuf};

use crate::IoError;

/// Name of the per-experiment output directory.
pub const CLASSIFICATION_DIR: &str = "Classification";

/// `<dest_dir>/<source stem>.npy`.
///
/// Only the source's file name contributes to the result; its directories
/// and the depth of `dest_dir` do not.
///
/// # Errors
///
/// Returns [`IoError::InvalidSourcePath`] if `source` has no file stem.
pub fn output_path(source: &Path, dest_dir: &Path) -> Result<PathBuf, IoError> {
    let stem = source.file_stem().ok_or_else(|| IoError::InvalidSourcePath {
        path: source.to_path_buf(),
    })?;
    let mut name = stem.to_os_string();
    name.push(".npy");
    Ok(dest_dir.join(name))
}

/// `Classification` directory next to the source's parent directory.
///
/// `cell1/Tracks/tracks.mat` maps to `cell1/Classification`. Paths too
/// shallow to have a grandparent resolve relative to the current directory.
#[must_use]
pub fn classification_dir(source: &Path) -> PathBuf {
    source
        .parent()
        .and_then(Path::parent)
        .unwrap_or_else(|| Path::new(""))
        .join(CLASSIFICATION_DIR)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_name_ignores_destination_depth() {
        let source = Path::new("/data/cell1/Tracks/tracks_2019.mat");
        for dest in ["/out", "/out/a/b/c/d", "relative/dir"] {
            let path = output_path(source, Path::new(dest)).unwrap();
            assert_eq!(path.file_name().unwrap(), "tracks_2019.npy");
            assert_eq!(path.parent().unwrap(), Path::new(dest));
        }
    }

    #[test]
    fn only_last_extension_replaced() {
        let path = output_path(Path::new("run.v2.mat"), Path::new("out")).unwrap();
        assert_eq!(path, Path::new("out/run.v2.npy"));
    }

    #[test]
    fn stemless_source_rejected() {
        assert!(matches!(
            output_path(Path::new(".."), Path::new("out")),
            Err(IoError::InvalidSourcePath { .. })
        ));
    }

    #[test]
    fn classification_dir_is_beside_parent() {
        assert_eq!(
            classification_dir(Path::new("/data/cell1/Tracks/tracks.mat")),
            Path::new("/data/cell1/Classification")
        );
        assert_eq!(
            classification_dir(Path::new("tracks.mat")),
            Path::new("Classification")
        );
        assert_eq!(
            classification_dir(Path::new("Tracks/tracks.mat")),
            Path::new("Classification")
        );
    }
}
