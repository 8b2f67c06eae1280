//! Write handle producing a transparently encrypted file.

use std::fs::{self, File};
use std::io::{self, SeekFrom, Write};
use std::sync::Arc;

use camino::Utf8PathBuf;
use sequoia_openpgp::crypto::Password;

use crate::crypto::{encrypt_stream, CipherWriter};
use crate::error::{GatewayError, Result};
use crate::telemetry::GatewayStats;
use crate::vfs::info::{display_name, FileInfo};
use crate::vfs::VfsFile;

/// Streams writes through the cipher into `<target>.tmp` and renames over
/// the `.pgp` target on close, so a crashed write never destroys the
/// previous ciphertext. Encrypted writes are append-only; seeking fails.
pub struct EncryptedWriter {
    target_path: Utf8PathBuf,
    staging_path: Utf8PathBuf,
    name: String,
    writer: Option<CipherWriter>,
    plaintext_written: u64,
    stats: Arc<GatewayStats>,
}

impl EncryptedWriter {
    pub(crate) fn create(
        target_path: Utf8PathBuf,
        key: &Password,
        stats: Arc<GatewayStats>,
    ) -> Result<Self> {
        let staging_path = Utf8PathBuf::from(format!("{target_path}.tmp"));
        let name = display_name(target_path.file_name().unwrap_or_default()).to_owned();
        let staging = File::create(staging_path.as_std_path())?;
        // The cipher captures the key here; no copy is retained on the
        // handle.
        let writer = encrypt_stream(staging, key)?;
        Ok(Self {
            target_path,
            staging_path,
            name,
            writer: Some(writer),
            plaintext_written: 0,
            stats,
        })
    }
}

impl VfsFile for EncryptedWriter {
    fn read(&mut self, _buf: &mut [u8]) -> Result<usize> {
        Ok(0)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| io::Error::other("encrypted writer already closed"))?;
        let written = writer.write(buf)?;
        self.plaintext_written += written as u64;
        self.stats.record_bytes_written(written as u64);
        Ok(written)
    }

    fn seek(&mut self, _pos: SeekFrom) -> Result<u64> {
        Err(GatewayError::SeekUnsupported)
    }

    fn stat(&mut self) -> Result<FileInfo> {
        self.stats.record_file_statted();
        let path = if self.writer.is_some() {
            &self.staging_path
        } else {
            &self.target_path
        };
        let metadata = fs::metadata(path.as_std_path())?;
        Ok(FileInfo::from_metadata(&self.name, &metadata).with_size(self.plaintext_written))
    }

    fn readdir(&mut self, _count: usize) -> Result<Vec<FileInfo>> {
        Ok(Vec::new())
    }

    fn close(&mut self) -> Result<()> {
        let Some(writer) = self.writer.take() else {
            return Ok(());
        };
        // finish() flushes the trailing packets; its error outranks
        // anything later on this path.
        match writer.finish() {
            Ok(()) => {
                fs::rename(
                    self.staging_path.as_std_path(),
                    self.target_path.as_std_path(),
                )?;
                Ok(())
            }
            Err(err) => {
                let _ = fs::remove_file(self.staging_path.as_std_path());
                Err(err)
            }
        }
    }
}
