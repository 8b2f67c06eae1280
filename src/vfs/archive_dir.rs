//! View over an archived directory.

use std::fs;
use std::io::SeekFrom;
use std::sync::Arc;

use camino::Utf8PathBuf;

use crate::archive::{ArchiveReader, EntryInfo, ARCHIVE_NAME};
use crate::error::Result;
use crate::telemetry::GatewayStats;
use crate::vfs::info::FileInfo;
use crate::vfs::VfsFile;

/// Directory handle whose flat children are the archive's entries.
///
/// Listings concatenate the directory's real subdirectories (first call
/// only) with the archive entries in stored order, paginated across
/// calls. Reads, writes, and seeks are no-ops.
#[derive(Debug)]
pub struct ArchiveDirView {
    path: Utf8PathBuf,
    entries: Vec<EntryInfo>,
    cursor: usize,
    emitted_dirs: bool,
    stats: Arc<GatewayStats>,
}

impl ArchiveDirView {
    pub(crate) fn open(path: Utf8PathBuf, stats: Arc<GatewayStats>) -> Result<Self> {
        let reader = ArchiveReader::open(&path.join(ARCHIVE_NAME))?;
        let entries = reader.entries().to_vec();
        Ok(Self {
            path,
            entries,
            cursor: 0,
            emitted_dirs: false,
            stats,
        })
    }

    fn subdirectories(&self) -> Result<Vec<FileInfo>> {
        let mut children = Vec::new();
        for entry in fs::read_dir(self.path.as_std_path())? {
            let entry = entry?;
            let metadata = entry.metadata()?;
            if !metadata.is_dir() {
                continue;
            }
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            children.push(FileInfo::from_metadata(name, &metadata));
        }
        Ok(children)
    }
}

impl VfsFile for ArchiveDirView {
    fn read(&mut self, _buf: &mut [u8]) -> Result<usize> {
        Ok(0)
    }

    fn write(&mut self, _buf: &[u8]) -> Result<usize> {
        Ok(0)
    }

    fn seek(&mut self, _pos: SeekFrom) -> Result<u64> {
        Ok(0)
    }

    fn stat(&mut self) -> Result<FileInfo> {
        self.stats.record_file_statted();
        let metadata = fs::metadata(self.path.as_std_path())?;
        let name = self.path.file_name().unwrap_or("/");
        Ok(FileInfo::from_metadata(name, &metadata))
    }

    fn readdir(&mut self, count: usize) -> Result<Vec<FileInfo>> {
        let mut children = Vec::new();
        if !self.emitted_dirs {
            self.emitted_dirs = true;
            children = self.subdirectories()?;
        }

        let remaining = self.entries.len().saturating_sub(self.cursor);
        let take = if count == 0 {
            remaining
        } else {
            count.saturating_sub(children.len()).min(remaining)
        };
        for entry in &self.entries[self.cursor..self.cursor + take] {
            children.push(FileInfo::from(entry));
        }
        self.cursor += take;
        Ok(children)
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}
