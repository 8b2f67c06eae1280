//! Stat records reported to the protocol collaborator.

use std::fs::Metadata;
use std::time::SystemTime;

use serde::Serialize;

use crate::archive::EntryInfo;
use crate::crypto::ENCRYPTED_SUFFIX;

/// File description surfaced by `stat` and `readdir`.
///
/// Names are logical: the `.pgp` suffix of encrypted files is stripped
/// wherever the gateway reports them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileInfo {
    pub name: String,
    pub size: u64,
    pub mode: u32,
    #[serde(skip)]
    pub mtime: Option<SystemTime>,
    pub is_dir: bool,
}

impl FileInfo {
    /// Describe a host filesystem object under a caller-chosen name.
    #[must_use]
    pub fn from_metadata(name: impl Into<String>, metadata: &Metadata) -> Self {
        Self {
            name: name.into(),
            size: metadata.len(),
            mode: mode_of(metadata),
            mtime: metadata.modified().ok(),
            is_dir: metadata.is_dir(),
        }
    }

    /// Same record under a different reported name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Same record with an overridden reported size.
    #[must_use]
    pub fn with_size(mut self, size: u64) -> Self {
        self.size = size;
        self
    }
}

impl From<&EntryInfo> for FileInfo {
    fn from(entry: &EntryInfo) -> Self {
        Self {
            name: entry.name.clone(),
            size: entry.size,
            mode: entry.mode,
            mtime: entry.mtime,
            is_dir: false,
        }
    }
}

/// Strip the on-disk encryption suffix from a reported name.
#[must_use]
pub fn display_name(name: &str) -> &str {
    name.strip_suffix(ENCRYPTED_SUFFIX).unwrap_or(name)
}

pub(crate) fn mode_of(metadata: &Metadata) -> u32 {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        metadata.permissions().mode()
    }
    #[cfg(not(unix))]
    {
        if metadata.is_dir() {
            0o755
        } else {
            0o644
        }
    }
}
