//! Operation counters shared across file variants.
//!
//! The publishing sink lives outside the core; collaborators call
//! [`GatewayStats::drain`] on their own interval and ship the snapshot.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Counter block for gateway activity. Variants hold an `Arc` to it and
/// bump counters as they go; no locking beyond the atomics.
#[derive(Debug, Default)]
pub struct GatewayStats {
    files_created: AtomicU64,
    files_opened: AtomicU64,
    files_removed: AtomicU64,
    files_statted: AtomicU64,
    directories_created: AtomicU64,
    bytes_read: AtomicU64,
    bytes_written: AtomicU64,
    failed_auths: AtomicU64,
}

impl GatewayStats {
    pub fn record_file_created(&self) {
        self.files_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_file_opened(&self) {
        self.files_opened.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_file_removed(&self) {
        self.files_removed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_file_statted(&self) {
        self.files_statted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_directory_created(&self) {
        self.directories_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_bytes_read(&self, count: u64) {
        self.bytes_read.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_bytes_written(&self, count: u64) {
        self.bytes_written.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_failed_auth(&self) {
        self.failed_auths.fetch_add(1, Ordering::Relaxed);
    }

    /// Read the counters without resetting them.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            files_created: self.files_created.load(Ordering::Relaxed),
            files_opened: self.files_opened.load(Ordering::Relaxed),
            files_removed: self.files_removed.load(Ordering::Relaxed),
            files_statted: self.files_statted.load(Ordering::Relaxed),
            directories_created: self.directories_created.load(Ordering::Relaxed),
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            failed_auths: self.failed_auths.load(Ordering::Relaxed),
        }
    }

    /// Read the counters and reset them to zero, for interval publishing.
    #[must_use]
    pub fn drain(&self) -> StatsSnapshot {
        StatsSnapshot {
            files_created: self.files_created.swap(0, Ordering::Relaxed),
            files_opened: self.files_opened.swap(0, Ordering::Relaxed),
            files_removed: self.files_removed.swap(0, Ordering::Relaxed),
            files_statted: self.files_statted.swap(0, Ordering::Relaxed),
            directories_created: self.directories_created.swap(0, Ordering::Relaxed),
            bytes_read: self.bytes_read.swap(0, Ordering::Relaxed),
            bytes_written: self.bytes_written.swap(0, Ordering::Relaxed),
            failed_auths: self.failed_auths.swap(0, Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of the counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub files_created: u64,
    pub files_opened: u64,
    pub files_removed: u64,
    pub files_statted: u64,
    pub directories_created: u64,
    pub bytes_read: u64,
    pub bytes_written: u64,
    pub failed_auths: u64,
}
