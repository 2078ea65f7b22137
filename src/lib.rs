//! Adaptive external sort for memory-constrained devices.
//!
//! Sorts fixed-size records far larger than RAM using a block-structured
//! scratch file and a small fixed buffer (as few as two or three pages).
//! Run generation uses replacement selection; the finishing pass adaptively
//! picks between a multi-way merge with no output buffer (NOB-merge) and a
//! Flash MinSort scan, based on an estimate of key distinctness collected
//! during run generation.
//!
//! See [`sort::external_sort`] for the entry point.

pub mod common;
pub mod config;
pub mod error;
pub mod heap;
pub mod merge;
pub mod metrics;
pub mod minsort;
pub mod page;
pub mod record;
pub mod rungen;
pub mod sort;

pub use config::ExternalSortConfig;
pub use error::SortError;
pub use metrics::Metrics;
pub use record::{Comparator, RecordSource};
pub use sort::{external_sort, AdaptiveDecision, SortOutcome};
