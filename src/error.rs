//! Shared error taxonomy surfaced across the gateway core.

use camino::Utf8PathBuf;
use thiserror::Error;

/// Errors produced by the resolver, codecs, file variants, and facade.
///
/// The HTTP collaborator maps classification failures and credential
/// problems to 400, missing-key failures to 401, and everything else to
/// 500.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("unable to resolve request path: {0:?}")]
    Unresolved(String),
    #[error("not found: {0}")]
    NotFound(Utf8PathBuf),
    #[error("not a directory: {0}")]
    NotDirectory(Utf8PathBuf),
    #[error("directory is already archived: {0}")]
    AlreadyArchived(Utf8PathBuf),
    #[error("directory is not archived: {0}")]
    NotArchived(Utf8PathBuf),
    #[error("file is not an encrypted message: {0}")]
    NotEncrypted(String),
    #[error("message is encrypted, but not symmetrically")]
    NotSymmetric,
    #[error("key does not decrypt this message")]
    BadKey,
    #[error("a symmetric key is required for this operation")]
    MissingKey,
    #[error("writing is not supported on this handle")]
    WriteUnsupported,
    #[error("seeking is not supported on this handle")]
    SeekUnsupported,
    #[error("malformed credentials: {0}")]
    Credentials(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("archive error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("openpgp error: {0}")]
    Pgp(#[source] anyhow::Error),
}

impl GatewayError {
    /// Whether the failure is a request-classification problem rather than
    /// an I/O fault. The boundary reports these as client errors.
    #[must_use]
    pub fn is_request_error(&self) -> bool {
        matches!(
            self,
            Self::Unresolved(_)
                | Self::NotFound(_)
                | Self::NotDirectory(_)
                | Self::AlreadyArchived(_)
                | Self::NotArchived(_)
                | Self::Credentials(_)
        )
    }

    /// Whether the failure belongs to the crypto layer (key required,
    /// wrong, or the on-disk form is not what the suffix promises).
    #[must_use]
    pub fn is_key_error(&self) -> bool {
        matches!(
            self,
            Self::NotEncrypted(_) | Self::NotSymmetric | Self::BadKey | Self::MissingKey
        )
    }
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, GatewayError>;
