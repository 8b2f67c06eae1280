//! Plain passthrough handle for files and directories.

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::sync::Arc;

use camino::Utf8PathBuf;

use crate::error::Result;
use crate::telemetry::GatewayStats;
use crate::vfs::info::{display_name, FileInfo};
use crate::vfs::{OpenFlags, VfsFile};

/// Host-filesystem delegate. Directory listings rewrite encrypted names:
/// the `.pgp` suffix is stripped while the rest of the record (size
/// included) is reported as-is; see the encrypted reader for accurate
/// plaintext sizes.
pub struct PlainFile {
    path: Utf8PathBuf,
    file: Option<File>,
    listing: Option<Vec<FileInfo>>,
    cursor: usize,
    stats: Arc<GatewayStats>,
}

impl fmt::Debug for PlainFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlainFile").field("path", &self.path).finish()
    }
}

impl PlainFile {
    pub(crate) fn open(
        path: Utf8PathBuf,
        flags: OpenFlags,
        stats: Arc<GatewayStats>,
    ) -> Result<Self> {
        let is_dir = fs::metadata(path.as_std_path())
            .map(|metadata| metadata.is_dir())
            .unwrap_or(false);
        if is_dir {
            return Ok(Self {
                path,
                file: None,
                listing: None,
                cursor: 0,
                stats,
            });
        }

        let mut options = OpenOptions::new();
        options
            .read(flags.read || !flags.is_write())
            .write(flags.write)
            .append(flags.append)
            .truncate(flags.truncate)
            .create(flags.create)
            .create_new(flags.create_new);
        let file = options.open(path.as_std_path())?;
        Ok(Self {
            path,
            file: Some(file),
            listing: None,
            cursor: 0,
            stats,
        })
    }

    fn basename(&self) -> &str {
        self.path.file_name().unwrap_or("/")
    }

    fn load_listing(&mut self) -> Result<()> {
        if self.listing.is_none() {
            let mut entries = Vec::new();
            for entry in fs::read_dir(self.path.as_std_path())? {
                let entry = entry?;
                let Ok(name) = entry.file_name().into_string() else {
                    continue;
                };
                let metadata = entry.metadata()?;
                let mut info = FileInfo::from_metadata(&name, &metadata);
                let stripped = display_name(&name);
                if stripped != name {
                    info = info.with_name(stripped);
                }
                entries.push(info);
            }
            self.listing = Some(entries);
        }
        Ok(())
    }
}

impl VfsFile for PlainFile {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        match self.file.as_mut() {
            Some(file) => {
                let read = file.read(buf)?;
                self.stats.record_bytes_read(read as u64);
                Ok(read)
            }
            None => Ok(0),
        }
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        match self.file.as_mut() {
            Some(file) => {
                let written = file.write(buf)?;
                self.stats.record_bytes_written(written as u64);
                Ok(written)
            }
            None => Ok(0),
        }
    }

    fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        match self.file.as_mut() {
            Some(file) => Ok(file.seek(pos)?),
            None => Ok(0),
        }
    }

    fn stat(&mut self) -> Result<FileInfo> {
        self.stats.record_file_statted();
        let metadata = match self.file.as_ref() {
            Some(file) => file.metadata()?,
            None => fs::metadata(self.path.as_std_path())?,
        };
        Ok(FileInfo::from_metadata(self.basename(), &metadata))
    }

    fn readdir(&mut self, count: usize) -> Result<Vec<FileInfo>> {
        if self.file.is_some() {
            return Ok(Vec::new());
        }
        self.load_listing()?;
        let listing = self.listing.as_deref().unwrap_or_default();
        let remaining = listing.len().saturating_sub(self.cursor);
        let take = if count == 0 {
            remaining
        } else {
            count.min(remaining)
        };
        let page = listing[self.cursor..self.cursor + take].to_vec();
        self.cursor += take;
        Ok(page)
    }

    fn close(&mut self) -> Result<()> {
        self.file.take();
        Ok(())
    }
}
