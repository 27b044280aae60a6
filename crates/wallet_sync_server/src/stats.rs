//! Server statistics.
//!
//! All counters are atomic and can be read while the server runs. Values
//! only grow, except the `active_sessions` gauge.

use std::sync::atomic::{AtomicU64, Ordering};

/// Live server counters.
#[derive(Debug, Default)]
pub struct ServerStats {
    connections_accepted: AtomicU64,
    connections_rejected: AtomicU64,
    active_sessions: AtomicU64,
    sessions_committed: AtomicU64,
    sessions_rolled_back: AtomicU64,
}

impl ServerStats {
    /// Creates zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_accepted(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
        self.active_sessions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rejected(&self) {
        self.connections_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_session_end(&self, committed: bool) {
        self.active_sessions.fetch_sub(1, Ordering::Relaxed);
        if committed {
            self.sessions_committed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.sessions_rolled_back.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Connections accepted and served.
    pub fn connections_accepted(&self) -> u64 {
        self.connections_accepted.load(Ordering::Relaxed)
    }

    /// Connections closed at once because of the connection limit.
    pub fn connections_rejected(&self) -> u64 {
        self.connections_rejected.load(Ordering::Relaxed)
    }

    /// Sessions currently running.
    pub fn active_sessions(&self) -> u64 {
        self.active_sessions.load(Ordering::Relaxed)
    }

    /// Sessions that reached `FINISHED` and committed.
    pub fn sessions_committed(&self) -> u64 {
        self.sessions_committed.load(Ordering::Relaxed)
    }

    /// Sessions that ended without committing.
    pub fn sessions_rolled_back(&self) -> u64 {
        self.sessions_rolled_back.load(Ordering::Relaxed)
    }

    /// Returns a snapshot of all counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            connections_accepted: self.connections_accepted(),
            connections_rejected: self.connections_rejected(),
            active_sessions: self.active_sessions(),
            sessions_committed: self.sessions_committed(),
            sessions_rolled_back: self.sessions_rolled_back(),
        }
    }
}

/// A point-in-time copy of [`ServerStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Connections accepted and served.
    pub connections_accepted: u64,
    /// Connections rejected by the connection limit.
    pub connections_rejected: u64,
    /// Sessions currently running.
    pub active_sessions: u64,
    /// Sessions committed.
    pub sessions_committed: u64,
    /// Sessions rolled back.
    pub sessions_rolled_back: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_lifecycle_counts() {
        let stats = ServerStats::new();
        stats.record_accepted();
        stats.record_accepted();
        stats.record_rejected();
        assert_eq!(stats.active_sessions(), 2);

        stats.record_session_end(true);
        stats.record_session_end(false);

        assert_eq!(
            stats.snapshot(),
            StatsSnapshot {
                connections_accepted: 2,
                connections_rejected: 1,
                active_sessions: 0,
                sessions_committed: 1,
                sessions_rolled_back: 1,
            }
        );
    }
}
