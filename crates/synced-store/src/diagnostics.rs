//! Non-fatal error channel.

use tracing::warn;

use crate::error::SyncError;

/// Errors collected since the host last drained them.
#[derive(Debug, Default)]
pub struct Diagnostics {
    entries: Vec<SyncError>,
}

impl Diagnostics {
    /// Record `error` and log it at `warn` level.
    pub fn report(&mut self, error: SyncError) {
        warn!(%error, "sync operation skipped");
        self.entries.push(error);
    }

    pub fn take(&mut self) -> Vec<SyncError> {
        std::mem::take(&mut self.entries)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
