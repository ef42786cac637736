//! Read filtering primitives.
//!
//! This module exposes the [`ReadFilter`] trait along with the confident-mapping
//! filter used by the read-type pipeline: only reads whose mapping quality equals
//! the aligner's "uniquely mapped" sentinel are kept.

use lazy_static::lazy_static;

/// Mapping quality written by STAR-based single-cell aligners for reads with a
/// single confident placement.
pub const CONFIDENT_MAPQ: u8 = 255;

lazy_static! {
    /// [`CONFIDENT_MAPQ`] as a string.
    pub static ref CONFIDENT_MAPQ_STR: String = CONFIDENT_MAPQ.to_string();
}

/// A trait for filtering reads on their mapping quality.
///
/// Implementations return `true` if the read passes the filter.
pub trait ReadFilter {
    fn filter_read(&self, mapq: u8) -> bool;
}

/// Keeps reads whose mapping quality is exactly the configured sentinel.
#[derive(Debug, Clone, Copy)]
pub struct ConfidentReadFilter {
    sentinel: u8,
}

impl ConfidentReadFilter {
    pub fn new(sentinel: u8) -> Self {
        Self { sentinel }
    }

    pub fn sentinel(&self) -> u8 {
        self.sentinel
    }
}

impl Default for ConfidentReadFilter {
    fn default() -> Self {
        Self::new(CONFIDENT_MAPQ)
    }
}

impl ReadFilter for ConfidentReadFilter {
    #[inline(always)]
    fn filter_read(&self, mapq: u8) -> bool {
        mapq == self.sentinel
    }
}
