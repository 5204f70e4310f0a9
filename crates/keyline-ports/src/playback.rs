use serde::{Deserialize, Serialize};

/// How the scheduler treats a frame whose delta is unusually long (for
/// example after the host was suspended).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "type", content = "payload")]
pub enum GapPolicy {
    /// Fire every event that fell inside the gap.
    #[default]
    CatchUp,
    /// Only fire events from the last `max_gap_ms` of the window; older ones
    /// are skipped.
    FastForward { max_gap_ms: f64 },
}
