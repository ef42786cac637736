//! Per-bin filtering and local deduplication.

use std::ops::AddAssign;

use rustc_hash::FxHashSet;

use super::fingerprint::DedupKey;
use super::record::{CandidateRecord, MoleculeAnnotation, ReadTags, RegionType};
use crate::core::read_filter::{ConfidentReadFilter, ReadFilter};
use crate::engine::Bin;

/// How reads are filtered and what each surviving candidate carries.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtractionConfig {
    pub filter: ConfidentReadFilter,
    /// Attach molecule barcode and gene name to every candidate.
    pub keep_annotations: bool,
}

/// Tally of what happened to the records scanned for a bin.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractionStats {
    pub scanned: u64,
    /// Overlapping reads whose start belongs to another bin.
    pub outside_bin: u64,
    pub malformed: u64,
    pub not_confident: u64,
    pub missing_barcode: u64,
    pub unknown_region: u64,
    pub local_duplicates: u64,
    pub emitted: u64,
}

impl AddAssign for ExtractionStats {
    fn add_assign(&mut self, other: Self) {
        self.scanned += other.scanned;
        self.outside_bin += other.outside_bin;
        self.malformed += other.malformed;
        self.not_confident += other.not_confident;
        self.missing_barcode += other.missing_barcode;
        self.unknown_region += other.unknown_region;
        self.local_duplicates += other.local_duplicates;
        self.emitted += other.emitted;
    }
}

/// Candidates of one bin, in file order, plus the skip tally.
#[derive(Debug, Default)]
pub struct BinBatch {
    pub records: Vec<CandidateRecord>,
    pub stats: ExtractionStats,
}

/// Stateful extractor for a single bin.
///
/// The seen-set lives only as long as the extractor, so memory is bounded by
/// the number of distinct molecules in the bin.
pub struct BinExtractor<'a> {
    config: &'a ExtractionConfig,
    bin: &'a Bin,
    seen: FxHashSet<DedupKey>,
    batch: BinBatch,
}

impl<'a> BinExtractor<'a> {
    pub fn new(config: &'a ExtractionConfig, bin: &'a Bin) -> Self {
        Self {
            config,
            bin,
            seen: FxHashSet::default(),
            batch: BinBatch::default(),
        }
    }

    /// Count a record whose fields could not be decoded.
    pub fn record_malformed(&mut self) {
        self.batch.stats.scanned += 1;
        self.batch.stats.malformed += 1;
    }

    /// Offer one read to the bin. Returns `true` when it became a candidate.
    pub fn push(&mut self, read: ReadTags) -> bool {
        let stats = &mut self.batch.stats;
        stats.scanned += 1;

        match read.start {
            Some(pos) if self.bin.contains(pos) => {}
            _ => {
                stats.outside_bin += 1;
                return false;
            }
        }

        if !self.config.filter.filter_read(read.mapq) {
            stats.not_confident += 1;
            return false;
        }

        let (cell_barcode, molecule_barcode) =
            match (non_empty(read.cell_barcode), non_empty(read.molecule_barcode)) {
                (Some(cb), Some(ub)) => (cb, ub),
                _ => {
                    stats.missing_barcode += 1;
                    return false;
                }
            };

        let Some(region_type) = read.region_code.and_then(RegionType::from_code) else {
            stats.unknown_region += 1;
            return false;
        };

        let dedup_key = DedupKey::of(&cell_barcode, &molecule_barcode);
        if !self.seen.insert(dedup_key) {
            stats.local_duplicates += 1;
            return false;
        }

        let annotation = if self.config.keep_annotations {
            Some(Box::new(MoleculeAnnotation {
                molecule_barcode,
                gene_name: read.gene_name.filter(|g| !g.is_empty()),
            }))
        } else {
            None
        };

        stats.emitted += 1;
        self.batch.records.push(CandidateRecord {
            cell_barcode,
            region_type,
            dedup_key,
            annotation,
        });
        true
    }

    pub fn finish(self) -> BinBatch {
        self.batch
    }
}

#[inline]
fn non_empty<S: AsRef<str>>(value: Option<S>) -> Option<S> {
    value.filter(|v| !v.as_ref().is_empty())
}

/// Run a whole bin's worth of reads through a fresh [`BinExtractor`].
pub fn extract_bin<I>(config: &ExtractionConfig, bin: &Bin, reads: I) -> BinBatch
where
    I: IntoIterator<Item = ReadTags>,
{
    let mut extractor = BinExtractor::new(config, bin);
    for read in reads {
        extractor.push(read);
    }
    extractor.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn bin(start: u64, end: u64) -> Bin {
        Bin {
            tid: 0,
            contig: Arc::from("chr1"),
            start,
            end,
        }
    }

    fn read(pos: u64, mapq: u8, cb: Option<&str>, ub: Option<&str>, re: Option<u8>) -> ReadTags {
        ReadTags {
            start: Some(pos),
            mapq,
            cell_barcode: cb.map(Into::into),
            molecule_barcode: ub.map(Into::into),
            region_code: re,
            gene_name: Some("GAPDH".to_string()),
        }
    }

    #[test]
    fn keeps_first_occurrence_within_a_bin() {
        let config = ExtractionConfig::default();
        let target = bin(0, 1_000);
        let batch = extract_bin(
            &config,
            &target,
            vec![
                read(10, 255, Some("cellA"), Some("umi1"), Some(b'E')),
                read(20, 255, Some("cellA"), Some("umi1"), Some(b'N')),
                read(30, 255, Some("cellA"), Some("umi2"), Some(b'N')),
            ],
        );

        assert_eq!(batch.records.len(), 2);
        assert_eq!(batch.records[0].region_type, RegionType::Exonic);
        assert_eq!(batch.records[1].region_type, RegionType::Intronic);
        assert_eq!(batch.stats.local_duplicates, 1);
        assert_eq!(batch.stats.emitted, 2);
        assert!(batch.records.iter().all(|r| r.annotation.is_none()));
    }

    #[test]
    fn filters_apply_in_order() {
        let config = ExtractionConfig::default();
        let target = bin(0, 1_000);
        let batch = extract_bin(
            &config,
            &target,
            vec![
                // low confidence wins over the missing barcode
                read(1, 3, None, Some("umi1"), Some(b'E')),
                read(2, 255, Some("cellA"), None, Some(b'E')),
                read(3, 255, Some(""), Some("umi1"), Some(b'E')),
                read(4, 255, Some("cellA"), Some("umi1"), None),
                read(5, 255, Some("cellA"), Some("umi1"), Some(b'X')),
                read(6, 255, Some("cellA"), Some("umi1"), Some(b'I')),
            ],
        );

        assert_eq!(batch.stats.scanned, 6);
        assert_eq!(batch.stats.not_confident, 1);
        assert_eq!(batch.stats.missing_barcode, 2);
        assert_eq!(batch.stats.unknown_region, 2);
        assert_eq!(batch.stats.local_duplicates, 0);
        assert_eq!(batch.records.len(), 1);
        assert_eq!(batch.records[0].region_type, RegionType::Intergenic);
    }

    #[test]
    fn rejected_reads_do_not_poison_the_seen_set() {
        let config = ExtractionConfig::default();
        let target = bin(0, 100);
        let batch = extract_bin(
            &config,
            &target,
            vec![
                read(1, 255, Some("cellA"), Some("umi1"), None),
                read(2, 255, Some("cellA"), Some("umi1"), Some(b'E')),
            ],
        );
        assert_eq!(batch.records.len(), 1);
    }

    #[test]
    fn reads_starting_in_other_bins_are_left_to_them() {
        let config = ExtractionConfig::default();
        let target = bin(100, 200);
        let mut extractor = BinExtractor::new(&config, &target);

        assert!(!extractor.push(read(99, 255, Some("c"), Some("u1"), Some(b'E'))));
        assert!(extractor.push(read(100, 255, Some("c"), Some("u2"), Some(b'E'))));
        assert!(extractor.push(read(199, 255, Some("c"), Some("u3"), Some(b'E'))));
        assert!(!extractor.push(read(200, 255, Some("c"), Some("u4"), Some(b'E'))));
        assert!(!extractor.push(ReadTags::default()));
        extractor.record_malformed();

        let batch = extractor.finish();
        assert_eq!(batch.stats.outside_bin, 3);
        assert_eq!(batch.stats.malformed, 1);
        assert_eq!(batch.stats.scanned, 6);
        assert_eq!(batch.records.len(), 2);
    }

    #[test]
    fn annotations_carry_umi_and_gene() {
        let config = ExtractionConfig {
            keep_annotations: true,
            ..Default::default()
        };
        let target = bin(0, 10);
        let mut tags = read(0, 255, Some("cellA"), Some("umi9"), Some(b'E'));
        let batch = extract_bin(&config, &target, vec![tags.clone()]);
        let annotation = batch.records[0].annotation.as_deref().unwrap();
        assert_eq!(annotation.molecule_barcode.as_str(), "umi9");
        assert_eq!(annotation.gene_name.as_deref(), Some("GAPDH"));

        tags.gene_name = Some(String::new());
        let batch = extract_bin(&config, &target, vec![tags]);
        assert_eq!(batch.records[0].annotation.as_ref().unwrap().gene_name, None);
    }

    #[test]
    fn custom_sentinel() {
        let config = ExtractionConfig {
            filter: ConfidentReadFilter::new(60),
            keep_annotations: false,
        };
        let target = bin(0, 10);
        let batch = extract_bin(
            &config,
            &target,
            vec![
                read(0, 255, Some("c"), Some("u1"), Some(b'E')),
                read(1, 60, Some("c"), Some("u2"), Some(b'E')),
            ],
        );
        assert_eq!(batch.records.len(), 1);
        assert_eq!(batch.stats.not_confident, 1);
    }

    #[test]
    fn stats_accumulate() {
        let mut total = ExtractionStats::default();
        total += ExtractionStats {
            scanned: 3,
            emitted: 1,
            ..Default::default()
        };
        total += ExtractionStats {
            scanned: 2,
            local_duplicates: 1,
            ..Default::default()
        };
        assert_eq!(total.scanned, 5);
        assert_eq!(total.emitted, 1);
        assert_eq!(total.local_duplicates, 1);
    }
}
