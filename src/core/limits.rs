//! Runtime periods and capacities (normative defaults).

use serde::{Deserialize, Serialize};

/// Tunable limits for binders and their hosts.
///
/// Field names are explicit about their units. Channel capacities are
/// clamped to at least 1 when converted into a runtime configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// How often a dirty binder flushes its document to the store.
    pub flush_period_ms: u64,
    /// How long a binder lingers with zero subscribers before closing.
    pub idle_timeout_ms: u64,
    /// Heartbeat period surfaced for transport hosts; the core ignores it.
    pub client_kick_period_ms: u64,
    /// Capacity of each subscriber's outbound broadcast channel.
    pub outbound_buffer: usize,
    /// Capacity of a binder's aggregate submission channel.
    pub submission_buffer: usize,
    /// Committed versions retained beyond the minimum any subscriber needs.
    pub history_safety_window: u64,
    /// Upper bound on content length in code points; `None` is unbounded.
    pub max_document_size: Option<usize>,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            flush_period_ms: 500,
            idle_timeout_ms: 30_000,
            client_kick_period_ms: 10_000,
            outbound_buffer: 4,
            submission_buffer: 16,
            history_safety_window: 50,
            max_document_size: None,
        }
    }
}
