//! Streaming symmetric encryption into an OpenPGP message.

use std::io::{self, Write};

use sequoia_openpgp as openpgp;

use openpgp::crypto::Password;
use openpgp::serialize::stream::{Encryptor, LiteralWriter, Message};
use openpgp::types::SymmetricAlgorithm;

use crate::error::{GatewayError, Result};

/// Wrap `sink` in a symmetric OpenPGP encryption stream.
///
/// Bytes written to the returned writer are emitted to the sink as an
/// AES-256 symmetrically encrypted message with a single literal-data
/// packet and no compression layer. The key is captured by the cipher at
/// construction; callers drop their copy immediately after.
pub fn encrypt_stream<W>(sink: W, key: &Password) -> Result<CipherWriter>
where
    W: Write + Send + Sync + 'static,
{
    let message = Message::new(sink);
    let message = Encryptor::with_passwords(message, [key.clone()])
        .symmetric_algo(SymmetricAlgorithm::AES256)
        .build()
        .map_err(GatewayError::Pgp)?;
    let literal = LiteralWriter::new(message)
        .build()
        .map_err(GatewayError::Pgp)?;
    Ok(CipherWriter {
        inner: Some(literal),
        plaintext_written: 0,
    })
}

/// Encrypting writer with explicit finalisation.
///
/// [`CipherWriter::finish`] must be called to flush the trailing packets;
/// a dropped writer leaves a truncated message behind.
pub struct CipherWriter {
    inner: Option<Message<'static>>,
    plaintext_written: u64,
}

impl CipherWriter {
    /// Logical plaintext bytes accepted so far.
    #[must_use]
    pub fn plaintext_written(&self) -> u64 {
        self.plaintext_written
    }

    /// Flush trailing packets and close the underlying sink.
    pub fn finish(mut self) -> Result<()> {
        if let Some(inner) = self.inner.take() {
            inner.finalize().map_err(GatewayError::Pgp)?;
        }
        Ok(())
    }
}

impl Write for CipherWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let inner = self
            .inner
            .as_mut()
            .ok_or_else(|| io::Error::other("encryption stream already finalised"))?;
        let written = inner.write(buf)?;
        self.plaintext_written += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.inner.as_mut() {
            Some(inner) => inner.flush(),
            None => Ok(()),
        }
    }
}
