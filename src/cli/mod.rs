//! Command-line interface definitions for veilfs.

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand, ValueHint};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt as _;

const CLI_EXAMPLES: &str = "Examples:\n  veilfs --root ./data archive /photos\n  veilfs --root ./data list /photos\n  veilfs --root ./data --key sesame cat /notes/secret.txt\n  veilfs --root ./data --key sesame encrypt /notes\n";

/// Top-level CLI parser.
#[derive(Debug, Parser)]
#[command(
    name = "veilfs",
    version,
    about = "Control surface for a transparent-storage file gateway",
    long_about = "Drives a served tree through the same virtual filesystem the WebDAV \
                  collaborator consumes: archived directories and encrypted files read \
                  and write as if they were plain.",
    after_help = CLI_EXAMPLES,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Root of the served tree.
    #[arg(
        short = 'r',
        long = "root",
        default_value = ".",
        global = true,
        value_hint = ValueHint::DirPath
    )]
    pub root: Utf8PathBuf,
    /// Symmetric key for transparent encryption.
    #[arg(short = 'k', long = "key", global = true)]
    pub key: Option<String>,
    /// Log verbosity (OFF, ERROR, WARN, INFO, DEBUG, TRACE).
    #[arg(long = "verbosity", default_value = "warn", global = true)]
    pub verbosity: LevelFilter,
    /// Command to execute.
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Initialise tracing for the process. Diagnostics go to stderr so
    /// `cat` and `list` output stays clean.
    pub fn init_logging(&self) {
        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(std::io::stderr))
            .with(EnvFilter::from_default_env().add_directive(self.verbosity.into()))
            .init();
    }
}

/// Supported subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Fold a directory's flat files into its archive container.
    Archive(DirArgs),
    /// Expand a directory's archive container back into plain files.
    Unarchive(DirArgs),
    /// Encrypt every regular file under a directory (requires --key).
    Encrypt(WalkArgs),
    /// Decrypt every encrypted file under a directory (requires --key).
    Decrypt(WalkArgs),
    /// List a directory the way a gateway client sees it.
    #[command(alias = "ls")]
    List(ListArgs),
    /// Stream a file's logical contents to stdout.
    Cat(PathArgs),
    /// Write stdin to a path through the gateway.
    Put(PathArgs),
    /// Move a file or directory across storage classes.
    #[command(alias = "mv")]
    Move(MoveArgs),
    /// Remove a file, archive entry, or directory tree.
    #[command(alias = "rm")]
    Remove(PathArgs),
    /// Create a plain directory.
    Mkdir(PathArgs),
}

/// A directory path inside the served tree.
#[derive(Debug, Args)]
pub struct DirArgs {
    #[arg(value_name = "PATH")]
    pub path: String,
}

/// Arguments for the encrypt/decrypt passes.
#[derive(Debug, Args)]
pub struct WalkArgs {
    #[arg(value_name = "PATH")]
    pub path: String,
    /// Stay in the top-level directory instead of recursing.
    #[arg(long = "flat")]
    pub flat: bool,
}

/// Arguments for the `list` subcommand.
#[derive(Debug, Args)]
pub struct ListArgs {
    #[arg(value_name = "PATH")]
    pub path: String,
    /// Emit machine-readable JSON.
    #[arg(long = "json")]
    pub json: bool,
}

/// A single path inside the served tree.
#[derive(Debug, Args)]
pub struct PathArgs {
    #[arg(value_name = "PATH")]
    pub path: String,
}

/// Arguments for the `move` subcommand.
#[derive(Debug, Args)]
pub struct MoveArgs {
    /// Source path.
    #[arg(value_name = "FROM")]
    pub from: String,
    /// Destination path.
    #[arg(value_name = "TO")]
    pub to: String,
}
