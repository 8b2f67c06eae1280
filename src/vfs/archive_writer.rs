//! Write handle targeting an entry of an archived directory.

use std::fs::{self, File};
use std::io::{self, SeekFrom, Write};
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};

use crate::archive::{self, ArchiveReader, Rewrite};
use crate::error::Result;
use crate::telemetry::GatewayStats;
use crate::vfs::info::FileInfo;
use crate::vfs::VfsFile;

/// Captures writes in a sidecar file next to the archive; closing the
/// handle rewrites the archive with the sidecar added or replacing the
/// target entry, then removes the sidecar.
///
/// The sidecar is opened append-at-end by the host default, so the seek
/// offset is bookkeeping for the position reported back to the caller;
/// `SEEK_END` is treated as `SEEK_SET`.
pub struct ArchiveEntryWriter {
    archive_path: Utf8PathBuf,
    entry_name: String,
    sidecar_path: Utf8PathBuf,
    sidecar: Option<File>,
    pos: u64,
    closed_stat: Option<FileInfo>,
    stats: Arc<GatewayStats>,
}

impl ArchiveEntryWriter {
    pub(crate) fn create(
        archive_path: Utf8PathBuf,
        entry_name: &str,
        stats: Arc<GatewayStats>,
    ) -> Result<Self> {
        let parent = archive_path
            .parent()
            .unwrap_or_else(|| Utf8Path::new("."))
            .to_owned();
        let sidecar_path = parent.join(entry_name);
        let sidecar = File::create(sidecar_path.as_std_path())?;
        Ok(Self {
            archive_path,
            entry_name: entry_name.to_owned(),
            sidecar_path,
            sidecar: Some(sidecar),
            pos: 0,
            closed_stat: None,
            stats,
        })
    }
}

impl VfsFile for ArchiveEntryWriter {
    fn read(&mut self, _buf: &mut [u8]) -> Result<usize> {
        Ok(0)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        let sidecar = self
            .sidecar
            .as_mut()
            .ok_or_else(|| io::Error::other("archive writer already closed"))?;
        let written = sidecar.write(buf)?;
        self.pos += written as u64;
        self.stats.record_bytes_written(written as u64);
        Ok(written)
    }

    fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        self.pos = match pos {
            SeekFrom::Start(offset) => offset,
            SeekFrom::End(offset) => offset.max(0) as u64,
            SeekFrom::Current(offset) => self.pos.saturating_add_signed(offset),
        };
        Ok(self.pos)
    }

    fn stat(&mut self) -> Result<FileInfo> {
        self.stats.record_file_statted();
        // Some clients stat the path immediately after closing the write;
        // answer from the rewrite result once the sidecar is gone.
        if let Some(info) = &self.closed_stat {
            return Ok(info.clone());
        }
        let metadata = match self.sidecar.as_ref() {
            Some(sidecar) => sidecar.metadata()?,
            None => fs::metadata(self.sidecar_path.as_std_path())?,
        };
        Ok(FileInfo::from_metadata(&self.entry_name, &metadata))
    }

    fn readdir(&mut self, _count: usize) -> Result<Vec<FileInfo>> {
        Ok(Vec::new())
    }

    fn close(&mut self) -> Result<()> {
        let Some(sidecar) = self.sidecar.take() else {
            return Ok(());
        };
        drop(sidecar);

        let outcome = ArchiveReader::open(&self.archive_path)
            .and_then(|reader| archive::rewrite(reader, Rewrite::Replace(&self.entry_name)));
        let _ = fs::remove_file(self.sidecar_path.as_std_path());

        let appended = outcome?;
        self.closed_stat =
            appended.map(|metadata| FileInfo::from_metadata(&self.entry_name, &metadata));
        Ok(())
    }
}
