//! Counters collected during a sort, surfaced back to the caller.
//!
//! Mirrors the instrumentation kept by the reference run-generation and
//! merge routines: the caller can use these to compare page-access
//! patterns across buffer sizes or to sanity-check the adaptive decision
//! against the actual I/O it produced.

use std::time::Duration;

#[derive(Debug, Default, Clone, Copy)]
pub struct Metrics {
    pub num_reads: u64,
    pub num_writes: u64,
    pub num_compar: u64,
    pub num_memcpys: u64,
    pub num_runs: u32,
    /// Running `avg_distinct * 10` estimate, updated once per run during
    /// generation. See [`crate::sort::AdaptiveDecision`].
    pub avg_distinct_x10: u32,
    pub gen_time: Duration,
    pub time: Duration,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }
}
