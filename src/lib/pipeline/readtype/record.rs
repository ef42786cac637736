//! Per-read and per-molecule record types

use std::fmt;

use serde::Serialize;
use smartstring::alias::String as CompactString;

use super::fingerprint::DedupKey;

/// Genomic region class an alignment was assigned to by the aligner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RegionType {
    Exonic,
    Intronic,
    Intergenic,
}

impl RegionType {
    pub const ALL: [RegionType; 3] = [
        RegionType::Exonic,
        RegionType::Intronic,
        RegionType::Intergenic,
    ];

    /// Decode the single-character region tag (`E`, `N`, `I`).
    #[inline]
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            b'E' => Some(RegionType::Exonic),
            b'N' => Some(RegionType::Intronic),
            b'I' => Some(RegionType::Intergenic),
            _ => None,
        }
    }

    /// Parse a textual region code; anything but exactly one recognised
    /// character is rejected.
    pub fn parse(text: &str) -> Option<Self> {
        match text.as_bytes() {
            [code] => Self::from_code(*code),
            _ => None,
        }
    }

    pub fn code(self) -> char {
        match self {
            RegionType::Exonic => 'E',
            RegionType::Intronic => 'N',
            RegionType::Intergenic => 'I',
        }
    }
}

impl fmt::Display for RegionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// The fields of one alignment record that read-type counting looks at.
///
/// Produced by the alignment source, consumed by the bin extractor. Every
/// attribute is optional because malformed or untagged reads are skipped, not
/// rejected.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadTags {
    /// 0-based alignment start.
    pub start: Option<u64>,
    pub mapq: u8,
    pub cell_barcode: Option<CompactString>,
    pub molecule_barcode: Option<CompactString>,
    /// Raw region-type tag byte.
    pub region_code: Option<u8>,
    pub gene_name: Option<String>,
}

/// Molecule details carried only when the molecule table is being written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoleculeAnnotation {
    pub molecule_barcode: CompactString,
    pub gene_name: Option<String>,
}

/// A read that passed every filter and survived deduplication within its bin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateRecord {
    pub cell_barcode: CompactString,
    pub region_type: RegionType,
    pub dedup_key: DedupKey,
    pub annotation: Option<Box<MoleculeAnnotation>>,
}
