//! OpenPGP symmetric codec for transparently encrypted files.
//!
//! Encrypted files live on disk as `<name>.pgp`: a single OpenPGP message,
//! symmetrically encrypted with AES-256 and carrying one literal-data
//! packet. No OpenPGP compression layer is added (callers already get
//! transparent archival). One key per request; the key travels as a
//! zeroizing [`Password`].

use std::fs::{self, File};
use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use sequoia_openpgp::crypto::Password;
use tracing::debug;
use walkdir::WalkDir;

use crate::error::Result;

pub mod dec;
pub mod enc;

pub use dec::{decrypt_stream, PlaintextReader};
pub use enc::{encrypt_stream, CipherWriter};

/// On-disk suffix marking a transparently encrypted file.
pub const ENCRYPTED_SUFFIX: &str = ".pgp";

/// The on-disk location of the encrypted form of `path`.
#[must_use]
pub fn encrypted_path(path: &Utf8Path) -> Utf8PathBuf {
    Utf8PathBuf::from(format!("{path}{ENCRYPTED_SUFFIX}"))
}

/// Encrypt `path` in place: produce `<path>.pgp` and remove the original.
///
/// Paths already carrying the suffix and directories are no-ops.
pub fn encrypt_file(path: &Utf8Path, key: &Password) -> Result<()> {
    if path.as_str().ends_with(ENCRYPTED_SUFFIX) {
        return Ok(());
    }
    let metadata = fs::metadata(path.as_std_path())?;
    if metadata.is_dir() {
        return Ok(());
    }

    let target = encrypted_path(path);
    let mut source = File::open(path.as_std_path())?;
    let sink = File::create(target.as_std_path())?;
    let mut writer = encrypt_stream(sink, key)?;
    io::copy(&mut source, &mut writer)?;
    writer.finish()?;

    fs::remove_file(path.as_std_path())?;
    Ok(())
}

/// Decrypt `path` in place: produce the suffix-stripped file and remove
/// the `.pgp` original. Paths without the suffix and directories are
/// no-ops.
pub fn decrypt_file(path: &Utf8Path, key: &Password) -> Result<()> {
    let Some(target) = path.as_str().strip_suffix(ENCRYPTED_SUFFIX) else {
        return Ok(());
    };
    let metadata = fs::metadata(path.as_std_path())?;
    if metadata.is_dir() {
        return Ok(());
    }

    let source = File::open(path.as_std_path())?;
    let mut plaintext = decrypt_stream(source, key)?;
    let mut output = File::create(target)?;
    io::copy(&mut plaintext, &mut output)?;

    fs::remove_file(path.as_std_path())?;
    Ok(())
}

/// Encrypt every regular file under `dir`, walking subdirectories when
/// `recursive`. Stops at the first failure; completed work stays.
pub fn encrypt_dir(dir: &Utf8Path, key: &Password, recursive: bool) -> Result<()> {
    debug!(directory = %dir, recursive, "encrypting directory");
    apply_dir(dir, key, recursive, encrypt_file)
}

/// Mirror of [`encrypt_dir`] for decryption.
pub fn decrypt_dir(dir: &Utf8Path, key: &Password, recursive: bool) -> Result<()> {
    debug!(directory = %dir, recursive, "decrypting directory");
    apply_dir(dir, key, recursive, decrypt_file)
}

fn apply_dir(
    dir: &Utf8Path,
    key: &Password,
    recursive: bool,
    apply: fn(&Utf8Path, &Password) -> Result<()>,
) -> Result<()> {
    if recursive {
        for entry in WalkDir::new(dir.as_std_path()) {
            let entry = entry.map_err(io::Error::from)?;
            if entry.file_type().is_dir() {
                continue;
            }
            let path = Utf8PathBuf::from_path_buf(entry.into_path()).map_err(|path| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("path is not UTF-8: {}", path.display()),
                )
            })?;
            apply(&path, key)?;
        }
        return Ok(());
    }

    for entry in fs::read_dir(dir.as_std_path())? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            continue;
        }
        let path = Utf8PathBuf::from_path_buf(entry.path()).map_err(|path| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("path is not UTF-8: {}", path.display()),
            )
        })?;
        apply(&path, key)?;
    }
    Ok(())
}
