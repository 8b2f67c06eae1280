//! Read handle over a single archive entry.

use std::fmt;
use std::io::{self, Read, SeekFrom};
use std::sync::Arc;

use camino::Utf8PathBuf;

use crate::archive::{ArchiveReader, EntryInfo, EntryStream};
use crate::error::{GatewayError, Result};
use crate::telemetry::GatewayStats;
use crate::vfs::info::FileInfo;
use crate::vfs::VfsFile;

/// Streams the decompressed bytes of one entry. The underlying Deflate
/// stream is not seekable, so absolute and forward-relative seeks reopen
/// the entry and discard; `SEEK_END` only moves the logical position.
pub struct ArchiveEntryReader {
    archive_path: Utf8PathBuf,
    entry: EntryInfo,
    stream: Option<EntryStream>,
    pos: u64,
    stats: Arc<GatewayStats>,
}

impl fmt::Debug for ArchiveEntryReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArchiveEntryReader")
            .field("archive_path", &self.archive_path)
            .field("entry", &self.entry)
            .field("pos", &self.pos)
            .finish()
    }
}

impl ArchiveEntryReader {
    pub(crate) fn new(
        archive_path: Utf8PathBuf,
        entry: EntryInfo,
        stats: Arc<GatewayStats>,
    ) -> Self {
        Self {
            archive_path,
            entry,
            stream: None,
            pos: 0,
            stats,
        }
    }

    fn ensure_stream(&mut self) -> Result<&mut EntryStream> {
        let stream = match self.stream.take() {
            Some(stream) => stream,
            None => ArchiveReader::open(&self.archive_path)?.open_entry(&self.entry.name)?,
        };
        Ok(self.stream.insert(stream))
    }

    fn discard(&mut self, count: u64) -> Result<()> {
        let stream = self.ensure_stream()?;
        io::copy(&mut stream.by_ref().take(count), &mut io::sink())?;
        Ok(())
    }
}

impl VfsFile for ArchiveEntryReader {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let stream = self.ensure_stream()?;
        let read = stream.read(buf)?;
        self.pos += read as u64;
        self.stats.record_bytes_read(read as u64);
        Ok(read)
    }

    fn write(&mut self, _buf: &[u8]) -> Result<usize> {
        Ok(0)
    }

    fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        match pos {
            SeekFrom::Start(offset) => {
                self.stream = None;
                self.discard(offset)?;
                self.pos = offset;
            }
            SeekFrom::Current(offset) => {
                if offset < 0 {
                    return Err(GatewayError::SeekUnsupported);
                }
                self.discard(offset as u64)?;
                self.pos += offset as u64;
            }
            SeekFrom::End(offset) => {
                // Logical only; the stream is not repositioned.
                self.pos = self.entry.size.saturating_add_signed(offset);
            }
        }
        Ok(self.pos)
    }

    fn stat(&mut self) -> Result<FileInfo> {
        self.stats.record_file_statted();
        Ok(FileInfo::from(&self.entry))
    }

    fn readdir(&mut self, _count: usize) -> Result<Vec<FileInfo>> {
        Ok(Vec::new())
    }

    fn close(&mut self) -> Result<()> {
        self.stream = None;
        Ok(())
    }
}
