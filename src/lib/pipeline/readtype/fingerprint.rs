//! Molecule fingerprints used for duplicate detection.

use std::fmt;

use ahash::RandomState;
use lazy_static::lazy_static;

lazy_static! {
    // Fixed seeds keep fingerprints identical across workers and runs.
    static ref FINGERPRINT_STATE: RandomState = RandomState::with_seeds(
        0x243f_6a88_85a3_08d3,
        0x1319_8a2e_0370_7344,
        0xa409_3822_299f_31d0,
        0x082e_fa98_ec4e_6c89,
    );
}

/// 64-bit fingerprint of an ordered (cell barcode, molecule barcode) pair.
///
/// Computed once per read by the extractor and reused by the global pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DedupKey(u64);

impl DedupKey {
    #[inline]
    pub fn of(cell_barcode: &str, molecule_barcode: &str) -> Self {
        // `str` hashing appends a terminator byte, so ("ab", "c") and
        // ("a", "bc") feed different byte streams.
        DedupKey(FINGERPRINT_STATE.hash_one((cell_barcode, molecule_barcode)))
    }
}

impl fmt::Display for DedupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}
