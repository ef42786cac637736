use std::fmt;
use std::sync::Arc;

use lazy_static::lazy_static;

/// Default number of reference bases covered by one bin.
pub const DEFAULT_BIN_SIZE: u64 = 10_000_000;

/// Completed-but-unmerged bin results buffered per worker before dispatch blocks.
pub const CHANNEL_SLOTS_PER_WORKER: usize = 2;

lazy_static! {
    /// [`DEFAULT_BIN_SIZE`] as a string.
    pub static ref DEFAULT_BIN_SIZE_STR: String = DEFAULT_BIN_SIZE.to_string();
}

/// A half-open coordinate range `[start, end)` on one reference sequence.
///
/// Bins of one reference are disjoint and contiguous, and each is handed to
/// exactly one worker.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Bin {
    /// Index of the reference sequence in the alignment header.
    pub tid: usize,
    pub contig: Arc<str>,
    /// 0-based inclusive start.
    pub start: u64,
    /// 0-based exclusive end.
    pub end: u64,
}

impl Bin {
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// Whether a 0-based coordinate belongs to this bin.
    #[inline]
    pub fn contains(&self, pos: u64) -> bool {
        pos >= self.start && pos < self.end
    }
}

impl fmt::Display for Bin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}-{}", self.contig, self.start, self.end)
    }
}

/// Trait defining how one bin is turned into a result batch.
///
/// Implementations must not share mutable state between calls; the executor
/// runs them concurrently on its worker pool.
pub trait RegionProcessor {
    /// The batch produced for one bin.
    type P: 'static + Send;

    /// Process every record attributed to `bin`. An `Err` marks the bin as
    /// failed and aborts the run.
    fn process_region(&self, bin: &Bin) -> anyhow::Result<Self::P>;
}
