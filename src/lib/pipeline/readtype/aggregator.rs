//! Cross-bin deduplication and per-cell region counting.
//!
//! Everything here runs on the single consumer thread that drains the
//! executor's result channel, so none of it needs synchronisation.

use std::collections::BTreeMap;
use std::mem;

use log::{debug, info};
use rustc_hash::{FxHashMap, FxHashSet};
use smartstring::alias::String as CompactString;

use super::extractor::{BinBatch, ExtractionStats};
use super::fingerprint::DedupKey;
use super::record::RegionType;
use crate::core::error::Result;

/// Sink for per-bin batches arriving in completion order.
pub trait BatchConsumer {
    /// Take ownership of one batch; it is dropped once this returns.
    fn consume(&mut self, batch: BinBatch) -> Result<()>;
}

/// Run-wide set of molecule fingerprints already counted.
#[derive(Debug, Default)]
pub struct GlobalDeduplicator {
    seen: FxHashSet<DedupKey>,
}

impl GlobalDeduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `key`; `true` only the first time it is offered.
    #[inline]
    pub fn first_sighting(&mut self, key: DedupKey) -> bool {
        self.seen.insert(key)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    /// Rough heap footprint of the seen-set.
    pub fn approx_bytes(&self) -> usize {
        // one control byte per bucket on top of the key itself
        self.seen.capacity() * (mem::size_of::<DedupKey>() + 1)
    }
}

/// Deduplicated molecule counts of one cell.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegionCounts {
    pub exonic: u64,
    pub intronic: u64,
    pub intergenic: u64,
}

impl RegionCounts {
    #[inline]
    pub fn increment(&mut self, region: RegionType) {
        match region {
            RegionType::Exonic => self.exonic += 1,
            RegionType::Intronic => self.intronic += 1,
            RegionType::Intergenic => self.intergenic += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.exonic + self.intronic + self.intergenic
    }
}

/// Per-cell counters kept in the order cells were first counted.
#[derive(Debug, Default)]
pub struct CellCounters {
    cells: Vec<(CompactString, RegionCounts)>,
    index: FxHashMap<CompactString, u32>,
}

impl CellCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&mut self, cell_barcode: &CompactString, region: RegionType) {
        let slot = match self.index.get(cell_barcode) {
            Some(&slot) => slot as usize,
            None => {
                let slot = self.cells.len();
                self.index.insert(cell_barcode.clone(), slot as u32);
                self.cells.push((cell_barcode.clone(), RegionCounts::default()));
                slot
            }
        };
        self.cells[slot].1.increment(region);
    }

    pub fn get(&self, cell_barcode: &str) -> Option<&RegionCounts> {
        self.index
            .get(cell_barcode)
            .map(|&slot| &self.cells[slot as usize].1)
    }

    /// Cells in first-seen order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &RegionCounts)> {
        self.cells.iter().map(|(cb, counts)| (cb.as_str(), counts))
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn total_molecules(&self) -> u64 {
        self.cells.iter().map(|(_, counts)| counts.total()).sum()
    }

    /// Order-independent view, for comparing runs.
    pub fn to_sorted_map(&self) -> BTreeMap<String, RegionCounts> {
        self.cells
            .iter()
            .map(|(cb, counts)| (cb.to_string(), *counts))
            .collect()
    }
}

/// Book-keeping for the merge step.
#[derive(Debug, Clone, Copy, Default)]
pub struct MergeStats {
    pub bins_merged: usize,
    /// Candidates received from all bins.
    pub records_before: u64,
    /// Candidates that survived global deduplication.
    pub records_after: u64,
    pub extraction: ExtractionStats,
}

impl MergeStats {
    pub fn absorb(&mut self, batch: &BinBatch) {
        self.bins_merged += 1;
        self.records_before += batch.records.len() as u64;
        self.extraction += batch.stats;
    }

    pub fn log(&self, distinct: usize, seen_bytes: usize) {
        let x = &self.extraction;
        info!(
            "Merged {} bins: {} candidates, {} unique molecules after global deduplication",
            self.bins_merged, self.records_before, self.records_after
        );
        info!(
            "Scanned {} reads: {} outside bin, {} malformed, {} not confident, {} missing barcode, {} unknown region, {} local duplicates",
            x.scanned,
            x.outside_bin,
            x.malformed,
            x.not_confident,
            x.missing_barcode,
            x.unknown_region,
            x.local_duplicates
        );
        debug!(
            "Global seen-set holds {} keys (~{:.1} MiB)",
            distinct,
            seen_bytes as f64 / (1024.0 * 1024.0)
        );
    }
}

/// Folds batches into per-cell region counts.
#[derive(Debug, Default)]
pub struct ReadTypeAggregator {
    dedup: GlobalDeduplicator,
    counters: CellCounters,
    stats: MergeStats,
}

impl ReadTypeAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counters(&self) -> &CellCounters {
        &self.counters
    }

    pub fn stats(&self) -> &MergeStats {
        &self.stats
    }

    pub fn log_summary(&self) {
        self.stats.log(self.dedup.len(), self.dedup.approx_bytes());
        info!(
            "Counted {} molecules across {} cells",
            self.counters.total_molecules(),
            self.counters.len()
        );
    }

    pub fn into_counters(self) -> CellCounters {
        self.counters
    }
}

impl BatchConsumer for ReadTypeAggregator {
    fn consume(&mut self, batch: BinBatch) -> Result<()> {
        self.stats.absorb(&batch);
        for record in batch.records {
            if self.dedup.first_sighting(record.dedup_key) {
                self.counters
                    .increment(&record.cell_barcode, record.region_type);
                self.stats.records_after += 1;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::readtype::record::CandidateRecord;

    fn candidate(cb: &str, ub: &str, region: RegionType) -> CandidateRecord {
        CandidateRecord {
            cell_barcode: cb.into(),
            region_type: region,
            dedup_key: DedupKey::of(cb, ub),
            annotation: None,
        }
    }

    fn batch(records: Vec<CandidateRecord>) -> BinBatch {
        BinBatch {
            records,
            stats: ExtractionStats::default(),
        }
    }

    #[test]
    fn duplicates_across_batches_count_once() {
        let mut agg = ReadTypeAggregator::new();
        agg.consume(batch(vec![
            candidate("cellA", "umi1", RegionType::Exonic),
            candidate("cellB", "umi1", RegionType::Intergenic),
        ]))
        .unwrap();
        agg.consume(batch(vec![
            candidate("cellA", "umi1", RegionType::Intronic),
            candidate("cellA", "umi2", RegionType::Intronic),
        ]))
        .unwrap();

        let counters = agg.counters();
        let a = counters.get("cellA").unwrap();
        assert_eq!((a.exonic, a.intronic, a.intergenic), (1, 1, 0));
        assert_eq!(counters.get("cellB").unwrap().intergenic, 1);
        assert_eq!(agg.stats().records_before, 4);
        assert_eq!(agg.stats().records_after, 3);
        assert_eq!(agg.stats().bins_merged, 2);
    }

    #[test]
    fn cells_keep_first_seen_order() {
        let mut counters = CellCounters::new();
        for cb in ["z", "a", "m", "a", "z"] {
            counters.increment(&CompactString::from(cb), RegionType::Exonic);
        }
        let order: Vec<&str> = counters.iter().map(|(cb, _)| cb).collect();
        assert_eq!(order, vec!["z", "a", "m"]);
        assert_eq!(counters.total_molecules(), 5);
        assert_eq!(counters.get("a").unwrap().total(), 2);
        assert!(counters.get("q").is_none());
    }

    #[test]
    fn seen_set_reports_size() {
        let mut dedup = GlobalDeduplicator::new();
        assert!(dedup.is_empty());
        assert!(dedup.first_sighting(DedupKey::of("a", "b")));
        assert!(!dedup.first_sighting(DedupKey::of("a", "b")));
        assert_eq!(dedup.len(), 1);
        assert!(dedup.approx_bytes() >= mem::size_of::<DedupKey>());
    }
}
