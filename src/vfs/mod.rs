//! Transparent-storage virtual filesystem.
//!
//! The facade classifies every request path into a storage class and
//! returns the matching file variant; callers see plain names and
//! plaintext sizes regardless of whether the on-disk form is an archive
//! entry or an encrypted file. Each variant owns the temporary resources
//! it creates and releases them on close; the facade keeps no map of open
//! handles, and competing writes are serialized by the external lock
//! manager, not here.

use std::fs::{self, File};
use std::io::{self, SeekFrom};
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use sequoia_openpgp::crypto::Password;
use tracing::debug;

use crate::archive::{self, ArchiveReader, Rewrite, ARCHIVE_NAME};
use crate::crypto::{self, decrypt_stream, encrypted_path};
use crate::error::{GatewayError, Result};
use crate::resolve::resolve;
use crate::telemetry::GatewayStats;

mod archive_dir;
mod archive_reader;
mod archive_writer;
mod encrypted_reader;
mod encrypted_writer;
mod info;
mod plain;

pub use archive_dir::ArchiveDirView;
pub use archive_reader::ArchiveEntryReader;
pub use archive_writer::ArchiveEntryWriter;
pub use encrypted_reader::EncryptedReader;
pub use encrypted_writer::EncryptedWriter;
pub use info::{display_name, FileInfo};
pub use plain::PlainFile;

/// Open-intent flags passed by the protocol collaborator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpenFlags {
    pub read: bool,
    pub write: bool,
    pub create: bool,
    pub create_new: bool,
    pub truncate: bool,
    pub append: bool,
}

impl OpenFlags {
    /// Read-only access.
    #[must_use]
    pub fn read_only() -> Self {
        Self {
            read: true,
            ..Self::default()
        }
    }

    /// Create-or-truncate write access, the shape a PUT takes.
    #[must_use]
    pub fn write_create() -> Self {
        Self {
            write: true,
            create: true,
            truncate: true,
            ..Self::default()
        }
    }

    /// Whether any write-capable intent is present.
    #[must_use]
    pub fn is_write(&self) -> bool {
        self.write || self.append || self.create || self.create_new || self.truncate
    }
}

/// Per-request state carried into every facade operation.
#[derive(Clone, Default)]
pub struct Context {
    key: Option<Password>,
}

impl Context {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Context carrying a symmetric key extracted from the request.
    #[must_use]
    pub fn with_key(key: impl Into<Password>) -> Self {
        Self {
            key: Some(key.into()),
        }
    }

    #[must_use]
    pub fn key(&self) -> Option<&Password> {
        self.key.as_ref()
    }

    pub fn require_key(&self) -> Result<&Password> {
        self.key.as_ref().ok_or(GatewayError::MissingKey)
    }
}

/// Storage classification of a request path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageClass {
    PlainDir,
    ArchivedDir,
    PlainFile,
    EncryptedFile,
    ArchivedFile,
    Absent,
}

/// Capability surface the protocol collaborator consumes.
///
/// Unsupported reads and writes return `Ok(0)` rather than failing; the
/// WebDAV handler probes handles duck-typed and treats zero as "nothing
/// to do". The exceptions are spelled out per variant.
pub trait VfsFile: Send {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;
    fn write(&mut self, buf: &[u8]) -> Result<usize>;
    fn seek(&mut self, pos: SeekFrom) -> Result<u64>;
    fn stat(&mut self) -> Result<FileInfo>;
    /// Next page of directory children; `count == 0` drains the rest. An
    /// empty page signals the end of the sequence.
    fn readdir(&mut self, count: usize) -> Result<Vec<FileInfo>>;
    fn close(&mut self) -> Result<()>;
}

/// Tagged variant over the concrete file handles.
pub enum Handle {
    Plain(PlainFile),
    ArchiveDir(ArchiveDirView),
    ArchiveRead(ArchiveEntryReader),
    ArchiveWrite(ArchiveEntryWriter),
    EncryptedRead(EncryptedReader),
    EncryptedWrite(EncryptedWriter),
}

impl Handle {
    fn as_file(&mut self) -> &mut dyn VfsFile {
        match self {
            Self::Plain(inner) => inner,
            Self::ArchiveDir(inner) => inner,
            Self::ArchiveRead(inner) => inner,
            Self::ArchiveWrite(inner) => inner,
            Self::EncryptedRead(inner) => inner,
            Self::EncryptedWrite(inner) => inner,
        }
    }
}

impl VfsFile for Handle {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.as_file().read(buf)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        self.as_file().write(buf)
    }

    fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        self.as_file().seek(pos)
    }

    fn stat(&mut self) -> Result<FileInfo> {
        self.as_file().stat()
    }

    fn readdir(&mut self, count: usize) -> Result<Vec<FileInfo>> {
        self.as_file().readdir(count)
    }

    fn close(&mut self) -> Result<()> {
        self.as_file().close()
    }
}

/// The filesystem facade over a served root.
pub struct TransparentFs {
    root: Utf8PathBuf,
    stats: Arc<GatewayStats>,
}

impl TransparentFs {
    #[must_use]
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self {
            root: root.into(),
            stats: Arc::new(GatewayStats::default()),
        }
    }

    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    #[must_use]
    pub fn stats(&self) -> Arc<GatewayStats> {
        Arc::clone(&self.stats)
    }

    fn locate(&self, name: &str) -> Result<Utf8PathBuf> {
        resolve(&self.root, name).ok_or_else(|| GatewayError::Unresolved(name.to_owned()))
    }

    /// Classify a request path per the open precedence.
    pub fn storage_class(&self, name: &str) -> Result<StorageClass> {
        let path = self.locate(name)?;
        Ok(classify(&path))
    }

    /// Create a plain directory.
    pub fn mkdir(&self, name: &str, mode: u32) -> Result<()> {
        let path = self.locate(name)?;
        fs::create_dir(path.as_std_path())?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(path.as_std_path(), fs::Permissions::from_mode(mode))?;
        }
        #[cfg(not(unix))]
        let _ = mode;
        self.stats.record_directory_created();
        Ok(())
    }

    /// Open a request path as the file variant its storage class demands.
    pub fn open(&self, ctx: &Context, name: &str, flags: OpenFlags) -> Result<Handle> {
        let path = self.locate(name)?;
        self.stats.record_file_opened();

        // (1) The path itself is an archived directory.
        if path.join(ARCHIVE_NAME).as_std_path().is_file() {
            debug!(%path, "open: archived directory view");
            return Ok(Handle::ArchiveDir(ArchiveDirView::open(
                path,
                self.stats(),
            )?));
        }

        // (2) The path names a member of its parent's archive.
        if let (Some(parent), Some(base)) = (path.parent(), path.file_name()) {
            let archive_path = parent.join(ARCHIVE_NAME);
            if archive_path.as_std_path().is_file() {
                if let Ok(reader) = ArchiveReader::open(&archive_path) {
                    if let Some(entry) = reader.entry(base) {
                        if flags.is_write() {
                            debug!(%path, "open: archived writer");
                            return Ok(Handle::ArchiveWrite(ArchiveEntryWriter::create(
                                archive_path,
                                base,
                                self.stats(),
                            )?));
                        }
                        debug!(%path, "open: archived reader");
                        let entry = entry.clone();
                        return Ok(Handle::ArchiveRead(ArchiveEntryReader::new(
                            archive_path,
                            entry,
                            self.stats(),
                        )));
                    }
                }
            }
        }

        // (3) The encrypted form exists.
        let encrypted = encrypted_path(&path);
        if encrypted.as_std_path().is_file() {
            if flags.is_write() {
                if let Some(key) = ctx.key() {
                    debug!(%path, "open: encrypted writer");
                    return Ok(Handle::EncryptedWrite(EncryptedWriter::create(
                        encrypted,
                        key,
                        self.stats(),
                    )?));
                }
                // No key: fall through to a plain open of the requested
                // path.
            } else if let Some(key) = ctx.key() {
                debug!(%path, "open: encrypted reader");
                return Ok(Handle::EncryptedRead(EncryptedReader::open(
                    encrypted,
                    key.clone(),
                    self.stats(),
                )?));
            } else {
                return Err(GatewayError::MissingKey);
            }
        }

        // (4) Plain file or directory.
        if flags.create || flags.create_new {
            let existed = path.as_std_path().exists();
            if !existed {
                self.stats.record_file_created();
            }
        }
        debug!(%path, "open: plain");
        Ok(Handle::Plain(PlainFile::open(path, flags, self.stats())?))
    }

    /// Stat a request path, reporting the logical name and size.
    pub fn stat(&self, ctx: &Context, name: &str) -> Result<FileInfo> {
        let mut handle = self.open(ctx, name, OpenFlags::read_only())?;
        let info = handle.stat();
        let closed = handle.close();
        let info = info?;
        closed?;
        let stripped = display_name(&info.name).to_owned();
        Ok(info.with_name(stripped))
    }

    /// Remove a request path from whichever storage class holds it.
    pub fn remove(&self, name: &str) -> Result<()> {
        let path = self.locate(name)?;

        if let (Some(parent), Some(base)) = (path.parent(), path.file_name()) {
            let archive_path = parent.join(ARCHIVE_NAME);
            if archive_path.as_std_path().is_file() {
                if let Ok(reader) = ArchiveReader::open(&archive_path) {
                    if reader.contains(base) {
                        debug!(%path, "remove: archive entry");
                        archive::rewrite(reader, Rewrite::Delete(base))?;
                        self.stats.record_file_removed();
                        return Ok(());
                    }
                }
            }
        }

        let encrypted = encrypted_path(&path);
        if encrypted.as_std_path().is_file() {
            debug!(%path, "remove: encrypted file");
            fs::remove_file(encrypted.as_std_path())?;
            self.stats.record_file_removed();
            return Ok(());
        }

        let metadata = fs::symlink_metadata(path.as_std_path())
            .map_err(|_| GatewayError::NotFound(path.clone()))?;
        debug!(%path, "remove: plain");
        if metadata.is_dir() {
            fs::remove_dir_all(path.as_std_path())?;
        } else {
            fs::remove_file(path.as_std_path())?;
        }
        self.stats.record_file_removed();
        Ok(())
    }

    /// Rename across storage classes.
    ///
    /// Multi-step paths are not atomic; the one crash-safety invariant is
    /// that the source archive is mutated last.
    pub fn rename(&self, ctx: &Context, old: &str, new: &str) -> Result<()> {
        let from = self.locate(old)?;
        let to = self.locate(new)?;
        let (from_parent, from_base) = split(&from).ok_or_else(|| unresolved(old))?;
        let (to_parent, to_base) = split(&to).ok_or_else(|| unresolved(new))?;

        let from_archive = from_parent.join(ARCHIVE_NAME);
        let from_archived = from_archive.as_std_path().is_file()
            && ArchiveReader::open(&from_archive)
                .map(|reader| reader.contains(from_base))
                .unwrap_or(false);
        let to_archive = to_parent.join(ARCHIVE_NAME);
        let to_archived = to_archive.as_std_path().is_file();
        let from_encrypted = !from_archived && encrypted_path(&from).as_std_path().is_file();
        let from_is_dir = fs::metadata(from.as_std_path())
            .map(|metadata| metadata.is_dir())
            .unwrap_or(false);

        debug!(%from, %to, from_archived, to_archived, from_encrypted, "rename");

        // Rename in place within one archive.
        if from_archived && to_archived && from_parent == to_parent {
            let reader = ArchiveReader::open(&from_archive)?;
            archive::rewrite(
                reader,
                Rewrite::Rename {
                    from: from_base,
                    to: to_base,
                },
            )?;
            return Ok(());
        }

        // Out of the source archive, into a plain file or another archive.
        if from_archived {
            let sidecar = from_parent.join(from_base);
            let reader = ArchiveReader::open(&from_archive)?;
            reader.extract_to(from_base, &sidecar)?;
            drop(reader);
            if let Err(err) = fs::rename(sidecar.as_std_path(), to.as_std_path()) {
                let _ = fs::remove_file(sidecar.as_std_path());
                return Err(err.into());
            }
            if to_archived {
                let target = ArchiveReader::open(&to_archive)?;
                archive::rewrite(target, Rewrite::Replace(to_base))?;
                fs::remove_file(to.as_std_path())?;
            }
            // The source archive is mutated last.
            let source = ArchiveReader::open(&from_archive)?;
            archive::rewrite(source, Rewrite::Delete(from_base))?;
            return Ok(());
        }

        if from_encrypted {
            if to_archived {
                // Extract-decrypt next to the target archive, fold it in,
                // then retire the ciphertext.
                let key = ctx.require_key()?;
                let source = File::open(encrypted_path(&from).as_std_path())?;
                let mut plaintext = decrypt_stream(source, key)?;
                let mut staged = File::create(to.as_std_path())?;
                io::copy(&mut plaintext, &mut staged)?;
                drop(staged);
                let target = ArchiveReader::open(&to_archive)?;
                archive::rewrite(target, Rewrite::Replace(to_base))?;
                fs::remove_file(to.as_std_path())?;
                fs::remove_file(encrypted_path(&from).as_std_path())?;
                return Ok(());
            }
            fs::rename(
                encrypted_path(&from).as_std_path(),
                encrypted_path(&to).as_std_path(),
            )?;
            return Ok(());
        }

        // Subdirectories are never archive members; a directory moving
        // under an archived parent stays a real directory.
        if to_archived && !from_is_dir {
            fs::rename(from.as_std_path(), to.as_std_path())?;
            let target = ArchiveReader::open(&to_archive)?;
            archive::rewrite(target, Rewrite::Replace(to_base))?;
            fs::remove_file(to.as_std_path())?;
            return Ok(());
        }

        fs::rename(from.as_std_path(), to.as_std_path())?;
        Ok(())
    }

    /// Fold a directory's flat files into `archive.zip`.
    pub fn archive_directory(&self, name: &str) -> Result<()> {
        let dir = self.require_dir(name)?;
        archive::archive_dir(&dir)
    }

    /// Expand `archive.zip` back into plain files.
    pub fn unarchive_directory(&self, name: &str) -> Result<()> {
        let dir = self.require_dir(name)?;
        archive::unarchive_dir(&dir)
    }

    /// Encrypt every regular file under a directory.
    pub fn encrypt_directory(&self, name: &str, key: &Password, recursive: bool) -> Result<()> {
        let dir = self.require_dir(name)?;
        crypto::encrypt_dir(&dir, key, recursive)
    }

    /// Decrypt every encrypted file under a directory.
    pub fn decrypt_directory(&self, name: &str, key: &Password, recursive: bool) -> Result<()> {
        let dir = self.require_dir(name)?;
        crypto::decrypt_dir(&dir, key, recursive)
    }

    fn require_dir(&self, name: &str) -> Result<Utf8PathBuf> {
        let path = self.locate(name)?;
        let metadata = fs::metadata(path.as_std_path())
            .map_err(|_| GatewayError::NotFound(path.clone()))?;
        if !metadata.is_dir() {
            return Err(GatewayError::NotDirectory(path));
        }
        Ok(path)
    }
}

fn classify(path: &Utf8Path) -> StorageClass {
    if path.join(ARCHIVE_NAME).as_std_path().is_file() {
        return StorageClass::ArchivedDir;
    }
    if let (Some(parent), Some(base)) = (path.parent(), path.file_name()) {
        let archive_path = parent.join(ARCHIVE_NAME);
        if archive_path.as_std_path().is_file() {
            if let Ok(reader) = ArchiveReader::open(&archive_path) {
                if reader.contains(base) {
                    return StorageClass::ArchivedFile;
                }
            }
        }
    }
    if encrypted_path(path).as_std_path().is_file() {
        return StorageClass::EncryptedFile;
    }
    match fs::metadata(path.as_std_path()) {
        Ok(metadata) if metadata.is_dir() => StorageClass::PlainDir,
        Ok(_) => StorageClass::PlainFile,
        Err(_) => StorageClass::Absent,
    }
}

fn split(path: &Utf8Path) -> Option<(&Utf8Path, &str)> {
    Some((path.parent()?, path.file_name()?))
}

fn unresolved(name: &str) -> GatewayError {
    GatewayError::Unresolved(name.to_owned())
}
