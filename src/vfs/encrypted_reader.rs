//! Read handle over a transparently encrypted file.

use std::fs::{self, File};
use std::io::{self, Read, SeekFrom};
use std::sync::Arc;

use camino::Utf8PathBuf;
use sequoia_openpgp::crypto::Password;

use crate::crypto::{decrypt_stream, PlaintextReader};
use crate::error::{GatewayError, Result};
use crate::telemetry::GatewayStats;
use crate::vfs::info::{display_name, FileInfo};
use crate::vfs::VfsFile;

/// Lazily decrypts `<name>.pgp` as it is read.
///
/// OpenPGP framing hides the plaintext length, so `stat` drains the
/// decrypt stream into a discard sink to learn it, caches the result for
/// the handle's lifetime, and reopens the stream at the previous read
/// position. Expect `stat` to cost a full pass on first call.
pub struct EncryptedReader {
    path: Utf8PathBuf,
    name: String,
    key: Password,
    reader: Option<PlaintextReader>,
    pos: u64,
    plaintext_size: Option<u64>,
    stats: Arc<GatewayStats>,
}

impl EncryptedReader {
    pub(crate) fn open(path: Utf8PathBuf, key: Password, stats: Arc<GatewayStats>) -> Result<Self> {
        fs::metadata(path.as_std_path())?;
        let name = display_name(path.file_name().unwrap_or_default()).to_owned();
        Ok(Self {
            path,
            name,
            key,
            reader: None,
            pos: 0,
            plaintext_size: None,
            stats,
        })
    }

    /// Open the decrypt stream if there is anything to decrypt. An empty
    /// underlying file stays `None` and reads as EOF without touching the
    /// crypto layer.
    fn ensure_reader(&mut self) -> Result<Option<&mut PlaintextReader>> {
        if self.reader.is_none() {
            let metadata = fs::metadata(self.path.as_std_path())?;
            if metadata.len() == 0 {
                self.plaintext_size = Some(0);
                return Ok(None);
            }
            let source = File::open(self.path.as_std_path())?;
            self.reader = Some(decrypt_stream(source, &self.key)?);
        }
        Ok(self.reader.as_mut())
    }

    fn discard(&mut self, count: u64) -> Result<()> {
        if let Some(reader) = self.ensure_reader()? {
            io::copy(&mut reader.by_ref().take(count), &mut io::sink())?;
        }
        Ok(())
    }

    fn plaintext_size(&mut self) -> Result<u64> {
        if let Some(size) = self.plaintext_size {
            return Ok(size);
        }
        let drained = match self.ensure_reader()? {
            Some(reader) => io::copy(reader, &mut io::sink())?,
            None => 0,
        };
        let size = self.pos + drained;
        self.plaintext_size = Some(size);

        // Reopen at the position the caller left off so reads continue
        // where they were.
        self.reader = None;
        let pos = self.pos;
        if pos > 0 {
            self.discard(pos)?;
        }
        Ok(size)
    }
}

impl VfsFile for EncryptedReader {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let Some(reader) = self.ensure_reader()? else {
            return Ok(0);
        };
        let read = reader.read(buf)?;
        self.pos += read as u64;
        self.stats.record_bytes_read(read as u64);
        Ok(read)
    }

    fn write(&mut self, _buf: &[u8]) -> Result<usize> {
        Err(GatewayError::WriteUnsupported)
    }

    fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        match pos {
            SeekFrom::Start(offset) => {
                self.reader = None;
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
                let size = self.plaintext_size()?;
                let target = size.saturating_add_signed(offset);
                self.reader = None;
                self.discard(target)?;
                self.pos = target;
            }
        }
        Ok(self.pos)
    }

    fn stat(&mut self) -> Result<FileInfo> {
        self.stats.record_file_statted();
        let metadata = fs::metadata(self.path.as_std_path())?;
        let size = self.plaintext_size()?;
        Ok(FileInfo::from_metadata(&self.name, &metadata).with_size(size))
    }

    fn readdir(&mut self, _count: usize) -> Result<Vec<FileInfo>> {
        Ok(Vec::new())
    }

    fn close(&mut self) -> Result<()> {
        self.reader = None;
        Ok(())
    }
}
