//! Container revision sniffing for MAT-files.

use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use tracing::debug;

use crate::IoError;

const HDF5_SIGNATURE: &[u8; 8] = b"\x89HDF\r\n\x1a\n";

/// Offsets HDF5 searches for its superblock. MATLAB v7.3 writes a 512-byte user block.
const SUPERBLOCK_OFFSETS: [usize; 4] = [0, 512, 1024, 2048];

/// What a file head says about its container revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerFormat {
    /// HDF5-backed, supports object references (MATLAB v7.3).
    Hdf5,
    /// Pre-v7.3 MAT-file with a `MATLAB` text header.
    LegacyMat,
    /// Neither.
    Unknown,
}

impl ContainerFormat {
    /// Sniff the container revision from the first few kilobytes of `path`.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::FileNotFound`] if the file cannot be opened or read.
    pub fn detect(path: &Path) -> Result<Self, IoError> {
        let mut head = Vec::with_capacity(SUPERBLOCK_OFFSETS[3] + HDF5_SIGNATURE.len());
        File::open(path)
            .and_then(|f| {
                f.take((SUPERBLOCK_OFFSETS[3] + HDF5_SIGNATURE.len()) as u64)
                    .read_to_end(&mut head)
            })
            .map_err(|source| IoError::FileNotFound {
                path: path.to_path_buf(),
                source,
            })?;

        let format = Self::from_head(&head);
        debug!(path = %path.display(), ?format, "container format sniffed");
        Ok(format)
    }

    fn from_head(head: &[u8]) -> Self {
        let has_superblock = SUPERBLOCK_OFFSETS
            .iter()
            .any(|&off| head.get(off..off + HDF5_SIGNATURE.len()) == Some(&HDF5_SIGNATURE[..]));
        if has_superblock {
            ContainerFormat::Hdf5
        } else if head.starts_with(b"MATLAB") {
            ContainerFormat::LegacyMat
        } else {
            ContainerFormat::Unknown
        }
    }
}

impl fmt::Display for ContainerFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ContainerFormat::Hdf5 => "HDF5",
            ContainerFormat::LegacyMat => "legacy MAT-file",
            ContainerFormat::Unknown => "non-HDF5",
        })
    }
}
