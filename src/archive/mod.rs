//! ZIP container codec for archived directories.
//!
//! An archived directory holds a single flat `archive.zip` whose entries
//! are the directory's regular files, stored under their basenames with
//! Deflate compression. Every mutation is a whole-archive rewrite staged
//! at `archive.zip~` and renamed over the original, so observers see
//! either the old archive or the new one.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom};
use std::time::SystemTime;

use camino::{Utf8Path, Utf8PathBuf};
use flate2::read::DeflateDecoder;
use time::OffsetDateTime;
use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipArchive, ZipWriter};

use crate::error::{GatewayError, Result};

/// Name of the container file that marks a directory as archived.
pub const ARCHIVE_NAME: &str = "archive.zip";

/// Header-derived description of a single archive entry.
#[derive(Debug, Clone)]
pub struct EntryInfo {
    pub name: String,
    pub size: u64,
    pub mode: u32,
    pub mtime: Option<SystemTime>,
    method: CompressionMethod,
    data_start: u64,
    compressed_size: u64,
}

/// Open ZIP container with its entry table decoded up front.
///
/// The entry table is kept in stored order; that order is what directory
/// listings expose.
pub struct ArchiveReader {
    path: Utf8PathBuf,
    zip: ZipArchive<File>,
    entries: Vec<EntryInfo>,
}

impl ArchiveReader {
    /// Open `path` as a ZIP container. A missing or unreadable container
    /// fails with `NotArchived`; the caller decides whether that is a
    /// classification miss or a real error.
    pub fn open(path: &Utf8Path) -> Result<Self> {
        let file = match File::open(path.as_std_path()) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(GatewayError::NotArchived(path.to_owned()));
            }
            Err(err) => return Err(err.into()),
        };
        let mut zip =
            ZipArchive::new(file).map_err(|_| GatewayError::NotArchived(path.to_owned()))?;

        let mut entries = Vec::with_capacity(zip.len());
        for index in 0..zip.len() {
            let entry = zip.by_index_raw(index)?;
            entries.push(EntryInfo {
                name: entry.name().to_owned(),
                size: entry.size(),
                mode: entry.unix_mode().unwrap_or(0o644),
                mtime: entry.last_modified().and_then(header_mtime),
                method: entry.compression(),
                data_start: entry
                    .data_start()
                    .expect("by_index_raw populates data_start"),
                compressed_size: entry.compressed_size(),
            });
        }

        Ok(Self { path: path.to_owned(), zip, entries })
    }

    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Entries in stored order.
    #[must_use]
    pub fn entries(&self) -> &[EntryInfo] {
        &self.entries
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entry(name).is_some()
    }

    /// Look up an entry by name. Duplicate names violate the container
    /// invariant; the first entry wins.
    #[must_use]
    pub fn entry(&self, name: &str) -> Option<&EntryInfo> {
        self.entries.iter().find(|entry| entry.name == name)
    }

    /// Open a streaming reader over the decompressed bytes of `name`.
    ///
    /// The stream owns an independent handle on the container file, so it
    /// outlives this reader and never buffers the whole entry.
    pub fn open_entry(&self, name: &str) -> Result<EntryStream> {
        let info = self
            .entry(name)
            .ok_or_else(|| GatewayError::NotFound(self.path.join(name)))?;
        EntryStream::open(&self.path, info)
    }

    /// Copy the decompressed bytes of `name` into a newly created (or
    /// truncated) file at `destination`, carrying the entry's mode.
    pub fn extract_to(&self, name: &str, destination: &Utf8Path) -> Result<()> {
        let info = self
            .entry(name)
            .ok_or_else(|| GatewayError::NotFound(self.path.join(name)))?;
        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(info.mode);
        }
        let mut output = options.open(destination.as_std_path())?;
        let mut stream = EntryStream::open(&self.path, info)?;
        io::copy(&mut stream, &mut output)?;
        Ok(())
    }
}

/// Streaming decompressor over a single entry's bytes.
pub struct EntryStream {
    inner: EntryStreamInner,
}

enum EntryStreamInner {
    Stored(io::Take<File>),
    Deflated(DeflateDecoder<io::Take<File>>),
}

impl EntryStream {
    fn open(archive_path: &Utf8Path, info: &EntryInfo) -> Result<Self> {
        let mut file = File::open(archive_path.as_std_path())?;
        file.seek(SeekFrom::Start(info.data_start))?;
        let raw = file.take(info.compressed_size);
        let inner = match info.method {
            CompressionMethod::Stored => EntryStreamInner::Stored(raw),
            CompressionMethod::Deflated => EntryStreamInner::Deflated(DeflateDecoder::new(raw)),
            _ => {
                return Err(GatewayError::Zip(zip::result::ZipError::UnsupportedArchive(
                    "unsupported compression method",
                )))
            }
        };
        Ok(Self { inner })
    }
}

impl Read for EntryStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match &mut self.inner {
            EntryStreamInner::Stored(inner) => inner.read(buf),
            EntryStreamInner::Deflated(inner) => inner.read(buf),
        }
    }
}

/// Single mutation applied by an archive rewrite.
#[derive(Debug, Clone, Copy)]
pub enum Rewrite<'a> {
    /// Copy every entry unchanged.
    Passthrough,
    /// Omit any entry named this, then append a new entry read from the
    /// identically named file next to the container.
    Replace(&'a str),
    /// Copy the `from` entry through under the name `to`.
    Rename { from: &'a str, to: &'a str },
    /// Omit the entry with this name.
    Delete(&'a str),
}

/// Rebuild the container applying `op`, atomically at the rename level.
///
/// The new container is staged at `<path>~` and renamed over the original
/// only once fully written; any earlier failure leaves the original
/// intact (the stale temporary is not cleaned up here). Returns the
/// metadata of the appended source file for `Replace`, which close paths
/// cache as the entry's fresh stat.
pub fn rewrite(mut reader: ArchiveReader, op: Rewrite<'_>) -> Result<Option<fs::Metadata>> {
    let archive_path = reader.path.clone();
    let staging_path = Utf8PathBuf::from(format!("{archive_path}~"));
    debug!(archive = %archive_path, ?op, "rewriting archive");

    let staging = File::create(staging_path.as_std_path())?;
    let mut writer = ZipWriter::new(staging);

    for index in 0..reader.zip.len() {
        let entry = reader.zip.by_index_raw(index)?;
        match op {
            Rewrite::Delete(name) if entry.name() == name => continue,
            Rewrite::Replace(name) if entry.name() == name => continue,
            Rewrite::Rename { from, to } if entry.name() == from => {
                writer.raw_copy_file_rename(entry, to)?;
            }
            _ => writer.raw_copy_file(entry)?,
        }
    }

    let appended = if let Rewrite::Replace(name) = op {
        let parent = archive_path
            .parent()
            .unwrap_or_else(|| Utf8Path::new("."))
            .to_owned();
        let source = parent.join(name);
        let mut file = File::open(source.as_std_path())?;
        let metadata = file.metadata()?;
        writer.start_file(name, entry_options(&metadata))?;
        io::copy(&mut file, &mut writer)?;
        Some(metadata)
    } else {
        None
    };

    let staging = writer.finish()?;
    staging.sync_all()?;
    drop(staging);
    drop(reader);
    fs::rename(staging_path.as_std_path(), archive_path.as_std_path())?;
    Ok(appended)
}

/// Fold every regular file of `dir` into a fresh `archive.zip`, then
/// delete the consumed files. Subdirectories are left alone.
pub fn archive_dir(dir: &Utf8Path) -> Result<()> {
    let archive_path = dir.join(ARCHIVE_NAME);
    if archive_path.as_std_path().exists() {
        return Err(GatewayError::AlreadyArchived(dir.to_owned()));
    }
    debug!(directory = %dir, "archiving directory");

    let container = File::create(archive_path.as_std_path())?;
    let mut writer = ZipWriter::new(container);
    let mut consumed = Vec::new();

    for entry in fs::read_dir(dir.as_std_path())? {
        let entry = entry?;
        let metadata = entry.metadata()?;
        if !metadata.is_file() {
            continue;
        }
        let name = entry
            .file_name()
            .into_string()
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "file name is not UTF-8"))?;
        if name == ARCHIVE_NAME {
            continue;
        }
        writer.start_file(name.as_str(), entry_options(&metadata))?;
        let mut source = File::open(entry.path())?;
        io::copy(&mut source, &mut writer)?;
        consumed.push(entry.path());
    }

    writer.finish()?;
    for path in consumed {
        fs::remove_file(path)?;
    }
    Ok(())
}

/// Expand `dir`'s container back into sibling files and remove it.
pub fn unarchive_dir(dir: &Utf8Path) -> Result<()> {
    let archive_path = dir.join(ARCHIVE_NAME);
    let reader = ArchiveReader::open(&archive_path)
        .map_err(|_| GatewayError::NotArchived(dir.to_owned()))?;
    debug!(directory = %dir, entries = reader.entries().len(), "unarchiving directory");

    for index in 0..reader.entries().len() {
        let name = reader.entries()[index].name.clone();
        let destination = dir.join(&name);
        reader.extract_to(&name, &destination)?;
    }

    drop(reader);
    fs::remove_file(archive_path.as_std_path())?;
    Ok(())
}

/// Entry header options derived from the source file's metadata.
fn entry_options(metadata: &fs::Metadata) -> SimpleFileOptions {
    let mut options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        options = options.unix_permissions(metadata.permissions().mode());
    }
    if let Ok(modified) = metadata.modified() {
        if let Ok(stamp) = DateTime::try_from(OffsetDateTime::from(modified)) {
            options = options.last_modified_time(stamp);
        }
    }
    options
}

fn header_mtime(stamp: DateTime) -> Option<SystemTime> {
    OffsetDateTime::try_from(stamp).ok().map(SystemTime::from)
}
