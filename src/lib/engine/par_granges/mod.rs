//! Parallel genomic bin processing utilities.
//!
//! The [`ParGranges`] executor fans bins out across a Rayon pool and streams
//! each bin's batch through a bounded crossbeam channel to one consumer.
//! Callers implement [`RegionProcessor`] to define per-bin work and use
//! [`partition_references`] to tile the reference sequences into bins.

mod intervals;
mod scheduler;
mod types;

pub use intervals::{header_references, partition_references};
pub use scheduler::{ParGranges, RunSummary};
pub use types::{
    Bin, RegionProcessor, CHANNEL_SLOTS_PER_WORKER, DEFAULT_BIN_SIZE, DEFAULT_BIN_SIZE_STR,
};
