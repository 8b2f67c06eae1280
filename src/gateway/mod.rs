//! HTTP-boundary contracts the core implements.
//!
//! The WebDAV handler, HTTP listener, and authentication check live
//! outside this crate; what they consume from the core is defined here,
//! framework-agnostically: the `password[:key]` credential split, the
//! directory-action requests, and the informational response header that
//! tells clients transparent encryption is active.

use crate::error::{GatewayError, Result};
use crate::vfs::{Context, TransparentFs};

/// Response header emitted whenever a request carries a symmetric key.
pub const ENCRYPTION_HEADER_NAME: &str = "X-Transparent-Encryption";
pub const ENCRYPTION_HEADER_VALUE: &str = "aes-256";

/// Parsed Basic credentials with the optional symmetric key split out of
/// the password field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    pub key: Option<String>,
}

impl Credentials {
    /// Split `password[:key]`. Neither the password nor the key may
    /// contain a colon; an empty key segment counts as no key.
    pub fn from_basic(username: &str, password_field: &str) -> Result<Self> {
        let mut parts = password_field.split(':');
        let password = parts.next().unwrap_or_default().to_owned();
        let key = parts.next().map(str::to_owned);
        if parts.next().is_some() {
            return Err(GatewayError::Credentials(
                "neither password nor encryption key can contain colons".to_owned(),
            ));
        }
        Ok(Self {
            username: username.to_owned(),
            password,
            key: key.filter(|key| !key.is_empty()),
        })
    }

    /// Request context carrying the key, if one was supplied.
    #[must_use]
    pub fn context(&self) -> Context {
        match &self.key {
            Some(key) => Context::with_key(key.as_str()),
            None => Context::new(),
        }
    }

    /// The informational header to emit, when a key is present.
    #[must_use]
    pub fn encryption_header(&self) -> Option<(&'static str, &'static str)> {
        self.key
            .is_some()
            .then_some((ENCRYPTION_HEADER_NAME, ENCRYPTION_HEADER_VALUE))
    }
}

/// Directory-level request interpreted from method and query parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectoryAction {
    Archive,
    Unarchive,
    Encrypt { recursive: bool },
    Decrypt { recursive: bool },
}

impl DirectoryAction {
    /// Interpret a request. Returns the directory actions it carries, in
    /// application order; an empty result means the request is not a
    /// directory action and should be served by the protocol handler.
    ///
    /// `POST` with `compress=true|false` archives or unarchives;
    /// `encrypt=true|false` encrypts or decrypts, honouring an optional
    /// `recursive=true|false` (default true). The two directives are
    /// independent: a request may carry both, and the compression action
    /// runs before the encryption action.
    pub fn from_query<'a, I>(method: &str, query: I) -> Vec<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        if method != "POST" {
            return Vec::new();
        }

        let mut compress = None;
        let mut encrypt = None;
        let mut recursive = true;
        for (name, value) in query {
            match name {
                "compress" if compress.is_none() => compress = Some(value == "true"),
                "encrypt" if encrypt.is_none() => encrypt = Some(value == "true"),
                "recursive" => recursive = value != "false",
                _ => {}
            }
        }

        let mut actions = Vec::new();
        if let Some(compress) = compress {
            actions.push(if compress {
                Self::Archive
            } else {
                Self::Unarchive
            });
        }
        if let Some(encrypt) = encrypt {
            actions.push(if encrypt {
                Self::Encrypt { recursive }
            } else {
                Self::Decrypt { recursive }
            });
        }
        actions
    }

    /// Run the action against a directory path. Encryption actions
    /// require a key in the context and fail `MissingKey` without one.
    pub fn apply(self, fs: &TransparentFs, ctx: &Context, path: &str) -> Result<()> {
        match self {
            Self::Archive => fs.archive_directory(path),
            Self::Unarchive => fs.unarchive_directory(path),
            Self::Encrypt { recursive } => {
                fs.encrypt_directory(path, ctx.require_key()?, recursive)
            }
            Self::Decrypt { recursive } => {
                fs.decrypt_directory(path, ctx.require_key()?, recursive)
            }
        }
    }
}
