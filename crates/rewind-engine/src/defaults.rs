//! Default constants for continuation management.

use std::time::Duration;

/// How long a context stays resumable after its last start or reset (20 minutes).
pub const DEFAULT_CONTINUATION_DURATION_MS: u64 = 1_200_000;

/// Purge pass is triggered when a uniform draw in `0..scale` is `<=` this value.
pub const DEFAULT_CONTINUATION_PURGE_FREQUENCY: u32 = 20;

/// Upper bound of the purge draw. With the defaults roughly 2% of resumes purge.
pub const DEFAULT_CONTINUATION_PURGE_SCALE: u32 = 1000;

/// Initial number of int slots in a continuation stack.
pub const INITIAL_INT_CAPACITY: usize = 10;

/// Initial number of long, float, double and reference slots in a continuation stack.
pub const INITIAL_WIDE_CAPACITY: usize = 5;

/// Initial length of the index mapping tables of a continuation stack.
pub const INITIAL_MAPPING_CAPACITY: usize = 10;

/// Maximum times a flow node may be re-processed before type analysis gives up.
pub const MAX_NODE_VISITS: usize = 256;

/// Maximum interpreter call depth.
pub const MAX_CALL_DEPTH: usize = 512;

/// [`DEFAULT_CONTINUATION_DURATION_MS`] as a `Duration`.
pub fn default_continuation_duration() -> Duration {
    Duration::from_millis(DEFAULT_CONTINUATION_DURATION_MS)
}
