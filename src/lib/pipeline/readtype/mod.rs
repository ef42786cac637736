//! Per-cell exonic, intronic and intergenic molecule proportions.
//!
//! The alignment file is cut into bins, each bin is filtered and locally
//! deduplicated on the worker pool, and a single consumer deduplicates across
//! bins while counting molecules per cell:
//!
//! ```text
//! partition_references -> ParGranges -> BamBinProcessor (extract_bin)
//!                                    -> ReadTypeAggregator | MoleculeTableWriter
//!                                    -> report / molecule table
//! ```

pub mod aggregator;
pub mod bam_source;
pub mod extractor;
pub mod fingerprint;
pub mod molecules;
pub mod record;
pub mod report;

use std::path::{Path, PathBuf};

use log::info;

pub use aggregator::{BatchConsumer, CellCounters, ReadTypeAggregator, RegionCounts};
pub use bam_source::{BamBinProcessor, BamSource, TagNames};
pub use extractor::{extract_bin, BinBatch, ExtractionConfig, ExtractionStats};
pub use fingerprint::DedupKey;
pub use molecules::{count_molecule_table, MoleculeTableWriter, MOLECULE_HEADER};
pub use record::{CandidateRecord, ReadTags, RegionType};
pub use report::{publish_report, ReportRow, REPORT_HEADER};

use crate::core::concurrency::determine_allowed_cpus;
use crate::core::error::{ReadPropError, Result};
use crate::core::fs::StagedOutput;
use crate::core::io::open_table_reader;
use crate::core::read_filter::{ConfidentReadFilter, CONFIDENT_MAPQ};
use crate::engine::par_granges::{partition_references, DEFAULT_BIN_SIZE};
use crate::engine::{Bin, ParGranges, RegionProcessor, RunSummary};

/// Settings for one pass over an indexed BAM file.
#[derive(Debug, Clone)]
pub struct ReadTypeConfig {
    pub input: PathBuf,
    pub output: PathBuf,
    /// Worker threads; `None` means all but one core.
    pub threads: Option<usize>,
    pub bin_size: u64,
    /// Unmerged batches allowed in flight; `None` means two per worker.
    pub channel_capacity: Option<usize>,
    pub confident_mapq: u8,
    pub tags: TagNames,
}

/// `bam-tags` reads the same settings as `read-type-prop`.
pub type TagExportConfig = ReadTypeConfig;

impl ReadTypeConfig {
    pub fn new<P: Into<PathBuf>, Q: Into<PathBuf>>(input: P, output: Q) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            threads: None,
            bin_size: DEFAULT_BIN_SIZE,
            channel_capacity: None,
            confident_mapq: CONFIDENT_MAPQ,
            tags: TagNames::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.bin_size == 0 {
            return Err(ReadPropError::Config("bin size must be positive".to_string()));
        }
        if self.channel_capacity == Some(0) {
            return Err(ReadPropError::Config(
                "channel capacity must be positive".to_string(),
            ));
        }
        Ok(())
    }

    fn extraction(&self, keep_annotations: bool) -> ExtractionConfig {
        ExtractionConfig {
            filter: ConfidentReadFilter::new(self.confident_mapq),
            keep_annotations,
        }
    }
}

/// What a finished run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub output: PathBuf,
    pub cells: usize,
    pub molecules: u64,
    pub summary: RunSummary,
}

/// Run `processor` over `bins` and feed every batch to `consumer`.
pub fn drive_bins<R, C>(
    bins: Vec<Bin>,
    processor: R,
    threads: usize,
    channel_capacity: Option<usize>,
    consumer: &mut C,
) -> Result<RunSummary>
where
    R: RegionProcessor<P = BinBatch> + Send + Sync + 'static,
    C: BatchConsumer,
{
    let executor = ParGranges::new(bins, threads, channel_capacity, processor);
    executor.process(|_bin, batch| consumer.consume(batch))
}

/// Count molecules per cell over `bins`, returning the finished counters.
pub fn aggregate_bins<R>(
    bins: Vec<Bin>,
    processor: R,
    threads: usize,
    channel_capacity: Option<usize>,
) -> Result<(CellCounters, RunSummary)>
where
    R: RegionProcessor<P = BinBatch> + Send + Sync + 'static,
{
    let mut aggregator = ReadTypeAggregator::new();
    let summary = drive_bins(bins, processor, threads, channel_capacity, &mut aggregator)?;
    aggregator.log_summary();
    Ok((aggregator.into_counters(), summary))
}

/// Count `bins` and publish the proportion report to `output`.
///
/// The report is staged next to `output` before any bin runs and only moved
/// into place once every bin has been merged, so a failed run leaves nothing
/// behind.
pub fn write_proportions<R>(
    bins: Vec<Bin>,
    processor: R,
    threads: usize,
    channel_capacity: Option<usize>,
    output: &Path,
) -> Result<RunReport>
where
    R: RegionProcessor<P = BinBatch> + Send + Sync + 'static,
{
    let staged = StagedOutput::create(output)?;
    let (counters, summary) = aggregate_bins(bins, processor, threads, channel_capacity)?;
    let output = report::commit_report(&counters, staged)?;
    Ok(RunReport {
        output,
        cells: counters.len(),
        molecules: counters.total_molecules(),
        summary,
    })
}

/// Stream the globally unique molecules of `bins` into a table at `output`.
pub fn write_molecules<R>(
    bins: Vec<Bin>,
    processor: R,
    threads: usize,
    channel_capacity: Option<usize>,
    output: &Path,
) -> Result<RunReport>
where
    R: RegionProcessor<P = BinBatch> + Send + Sync + 'static,
{
    let staged = StagedOutput::create(output)?;
    let mut table = MoleculeTableWriter::new(staged.stream()?, staged.target())?;
    let summary = drive_bins(bins, processor, threads, channel_capacity, &mut table)?;
    table.log_summary();
    let molecules = table.stats().records_after;
    table
        .finish()?
        .finish()
        .map_err(|e| ReadPropError::output(staged.target(), e))?;
    let output = staged.commit()?;
    info!("Wrote {} molecules to {}", molecules, output.display());
    Ok(RunReport {
        output,
        cells: 0,
        molecules,
        summary,
    })
}

fn prepare_bam_run(config: &ReadTypeConfig) -> Result<(usize, BamSource, Vec<Bin>)> {
    config.validate()?;
    let threads = determine_allowed_cpus(config.threads)?;
    let source = BamSource::open(&config.input)?;
    let bins = partition_references(&source.references(), config.bin_size);
    info!(
        "Partitioned {} into {} bins of up to {} bases",
        source.path().display(),
        bins.len(),
        config.bin_size
    );
    Ok((threads, source, bins))
}

/// `read-type-prop`: per-cell region proportions straight from an indexed BAM.
pub fn run_read_type_proportions(config: &ReadTypeConfig) -> Result<RunReport> {
    let (threads, source, bins) = prepare_bam_run(config)?;
    let processor = BamBinProcessor::new(&source, config.tags, config.extraction(false));
    write_proportions(
        bins,
        processor,
        threads,
        config.channel_capacity,
        &config.output,
    )
}

/// `bam-tags`: export the deduplicated molecule table of an indexed BAM.
pub fn run_molecule_export(config: &TagExportConfig) -> Result<RunReport> {
    let (threads, source, bins) = prepare_bam_run(config)?;
    let processor = BamBinProcessor::new(&source, config.tags, config.extraction(true));
    write_molecules(
        bins,
        processor,
        threads,
        config.channel_capacity,
        &config.output,
    )
}

/// `tags-prop`: per-cell region proportions from a molecule table.
pub fn run_table_proportions<P: AsRef<Path>, Q: AsRef<Path>>(
    input: P,
    output: Q,
) -> Result<RunReport> {
    let input = input.as_ref();
    let mut reader = open_table_reader(input)?;
    let (counters, _) = count_molecule_table(&mut reader, input)?;
    let output = publish_report(&counters, output)?;
    Ok(RunReport {
        output,
        cells: counters.len(),
        molecules: counters.total_molecules(),
        summary: RunSummary::default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rustc_hash::FxHashSet;
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use tempfile::tempdir;

    const CONTIGS: [(&str, i64); 2] = [("chr1", 1_000), ("chr2", 400)];

    /// In-memory alignments standing in for an indexed BAM.
    struct MemoryAlignments {
        reads: Arc<Vec<(usize, ReadTags)>>,
        config: ExtractionConfig,
        fail_on: Option<(usize, u64)>,
    }

    impl MemoryAlignments {
        fn new(reads: Vec<(usize, ReadTags)>) -> Self {
            Self {
                reads: Arc::new(reads),
                config: ExtractionConfig::default(),
                fail_on: None,
            }
        }
    }

    impl RegionProcessor for MemoryAlignments {
        type P = BinBatch;

        fn process_region(&self, bin: &Bin) -> anyhow::Result<BinBatch> {
            if self.fail_on == Some((bin.tid, bin.start)) {
                anyhow::bail!("truncated BGZF block");
            }
            // like an index query, hand over every read of the reference that
            // could overlap, including ones starting in earlier bins
            let reads = self
                .reads
                .iter()
                .filter(|(tid, read)| {
                    *tid == bin.tid && read.start.map_or(true, |s| s + 50 > bin.start && s < bin.end)
                })
                .map(|(_, read)| read.clone());
            Ok(extract_bin(&self.config, bin, reads))
        }
    }

    fn tags(pos: u64, cb: &str, ub: &str, region: u8) -> ReadTags {
        ReadTags {
            start: Some(pos),
            mapq: 255,
            cell_barcode: Some(cb.into()),
            molecule_barcode: Some(ub.into()),
            region_code: Some(region),
            gene_name: None,
        }
    }

    fn bins(bin_size: u64) -> Vec<Bin> {
        partition_references(&CONTIGS, bin_size)
    }

    fn counts(map: &BTreeMap<String, RegionCounts>, cb: &str) -> (u64, u64, u64) {
        let c = map[cb];
        (c.exonic, c.intronic, c.intergenic)
    }

    /// Straightforward single-pass computation to compare against.
    fn reference_counts(reads: &[(usize, ReadTags)]) -> BTreeMap<String, RegionCounts> {
        let mut seen = FxHashSet::default();
        let mut out: BTreeMap<String, RegionCounts> = BTreeMap::new();
        for (_, read) in reads {
            if read.mapq != 255 {
                continue;
            }
            let (Some(cb), Some(ub)) = (&read.cell_barcode, &read.molecule_barcode) else {
                continue;
            };
            if cb.is_empty() || ub.is_empty() {
                continue;
            }
            let Some(region) = read.region_code.and_then(RegionType::from_code) else {
                continue;
            };
            if seen.insert((cb.to_string(), ub.to_string())) {
                out.entry(cb.to_string()).or_default().increment(region);
            }
        }
        out
    }

    fn scenario() -> Vec<(usize, ReadTags)> {
        vec![
            (0, tags(10, "cellA", "umi1", b'E')),
            (0, tags(12, "cellA", "umi1", b'E')),
            (0, tags(500, "cellA", "umi2", b'N')),
            (1, tags(30, "cellB", "umi3", b'I')),
        ]
    }

    #[test]
    fn four_record_scenario() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("props.csv");
        let report = write_proportions(
            bins(100),
            MemoryAlignments::new(scenario()),
            2,
            None,
            &out,
        )
        .unwrap();
        assert_eq!(report.cells, 2);
        assert_eq!(report.molecules, 3);
        assert_eq!(report.summary.bins_merged, report.summary.bins_total);

        let text = std::fs::read_to_string(&out).unwrap();
        let mut lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.remove(0), REPORT_HEADER.join(","));
        lines.sort_unstable();
        assert_eq!(
            lines,
            vec!["cellA,2,1,0.5,1,0.5,0,0.0", "cellB,1,0,0.0,0,0.0,1,1.0"]
        );
    }

    #[test]
    fn one_worker_matches_eight_workers() {
        let mut reads = scenario();
        for i in 0..200u64 {
            let code = [b'E', b'N', b'I'][(i % 3) as usize];
            let cb = format!("cell{}", i % 7);
            let ub = format!("umi{}", i % 23);
            let tid = (i % 2) as usize;
            reads.push((tid, tags(i * 2 % 400, &cb, &ub, code)));
        }
        // tie the region code to the molecule so the first-seen winner
        // cannot depend on completion order
        for (_, read) in reads.iter_mut() {
            let ub = read.molecule_barcode.clone().unwrap();
            let code = [b'E', b'N', b'I'][ub.len() % 3];
            read.region_code = Some(code);
        }

        let (single, _) = aggregate_bins(bins(50), MemoryAlignments::new(reads.clone()), 1, None).unwrap();
        let (many, _) = aggregate_bins(bins(50), MemoryAlignments::new(reads.clone()), 8, Some(1)).unwrap();
        assert_eq!(single.to_sorted_map(), many.to_sorted_map());
        assert_eq!(single.to_sorted_map(), reference_counts(&reads));
    }

    #[test]
    fn duplicates_in_different_bins_count_once() {
        let reads = vec![
            (0, tags(5, "cellA", "umi1", b'E')),
            (0, tags(905, "cellA", "umi1", b'E')),
            (1, tags(5, "cellA", "umi1", b'E')),
        ];
        let (counters, summary) = aggregate_bins(bins(100), MemoryAlignments::new(reads), 4, None).unwrap();
        assert_eq!(summary.bins_total, 14);
        let map = counters.to_sorted_map();
        assert_eq!(counts(&map, "cellA"), (1, 0, 0));
    }

    #[test]
    fn conflicting_duplicates_keep_one_region() {
        let reads = vec![
            (0, tags(5, "cellA", "umi1", b'E')),
            (0, tags(505, "cellA", "umi1", b'N')),
        ];
        let (counters, _) = aggregate_bins(bins(100), MemoryAlignments::new(reads), 2, None).unwrap();
        let a = counters.get("cellA").unwrap();
        assert_eq!(a.total(), 1);
        assert_eq!(a.intergenic, 0);
    }

    #[test]
    fn malformed_reads_contribute_nothing() {
        let mut reads = scenario();
        let mut low = tags(40, "cellC", "umi9", b'E');
        low.mapq = 60;
        let mut no_umi = tags(41, "cellC", "umi9", b'E');
        no_umi.molecule_barcode = None;
        reads.push((0, low));
        reads.push((0, no_umi));
        reads.push((0, tags(42, "cellC", "umi9", b'Z')));
        reads.push((0, ReadTags::default()));

        let (with_noise, _) = aggregate_bins(bins(100), MemoryAlignments::new(reads), 3, None).unwrap();
        let (clean, _) = aggregate_bins(bins(100), MemoryAlignments::new(scenario()), 3, None).unwrap();
        assert_eq!(with_noise.to_sorted_map(), clean.to_sorted_map());
        assert!(with_noise.get("cellC").is_none());
    }

    #[test]
    fn proportions_sum_to_one() {
        let mut reads = Vec::new();
        for i in 0..60u64 {
            let code = [b'E', b'N', b'I'][(i % 3) as usize];
            reads.push((0, tags(i * 16, &format!("c{}", i % 4), &format!("u{}", i), code)));
        }
        let (counters, _) = aggregate_bins(bins(128), MemoryAlignments::new(reads), 2, None).unwrap();
        for row in report::report_rows(&counters) {
            assert!(row.total > 0);
            let sum = row.exonic_prop + row.intronic_prop + row.intergenic_prop;
            assert!((sum - 1.0).abs() < 1e-12, "{} sums to {}", row.cell_barcode, sum);
        }
    }

    #[test]
    fn failing_bin_leaves_no_output() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("props.csv");
        let mut processor = MemoryAlignments::new(scenario());
        processor.fail_on = Some((0, 300));

        let err = write_proportions(bins(100), processor, 2, None, &out).unwrap_err();
        assert_eq!(err.kind(), "worker-failure");
        assert!(err.to_string().contains("chr1:300-400"));
        assert!(!out.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn molecule_table_feeds_table_proportions() {
        let dir = tempdir().unwrap();
        let table = dir.path().join("molecules.csv.gz");
        let props = dir.path().join("props.csv");

        let mut processor = MemoryAlignments::new(scenario());
        processor.config.keep_annotations = true;
        let exported = write_molecules(bins(100), processor, 2, None, &table).unwrap();
        assert_eq!(exported.molecules, 3);

        let report = run_table_proportions(&table, &props).unwrap();
        assert_eq!(report.cells, 2);
        let text = std::fs::read_to_string(&props).unwrap();
        assert!(text.contains("cellA,2,1,0.5,1,0.5,0,0.0"));
        assert!(text.contains("cellB,1,0,0.0,0,0.0,1,1.0"));
    }

    #[test]
    fn missing_input_fails_before_output_exists() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("props.csv");
        let config = ReadTypeConfig::new(dir.path().join("absent.bam"), &out);
        let err = run_read_type_proportions(&config).unwrap_err();
        assert_eq!(err.kind(), "precondition");
        assert!(!out.exists());

        let bam = dir.path().join("reads.bam");
        std::fs::write(&bam, b"BAM\x01").unwrap();
        let config = ReadTypeConfig::new(&bam, &out);
        let err = run_molecule_export(&config).unwrap_err();
        assert_eq!(err.kind(), "precondition");
        assert!(!out.exists());
    }

    #[test]
    fn zero_bin_size_is_rejected() {
        let mut config = ReadTypeConfig::new("in.bam", "out.csv");
        config.bin_size = 0;
        assert_eq!(config.validate().unwrap_err().kind(), "config");
        config.bin_size = 10;
        config.channel_capacity = Some(0);
        assert_eq!(config.validate().unwrap_err().kind(), "config");
    }

    fn read_strategy() -> impl Strategy<Value = (usize, ReadTags)> {
        (0usize..2, 0u64..400, 0usize..4, 0usize..6, 0u8..4, prop::bool::weighted(0.9)).prop_map(
            |(tid, pos, cb, ub, noise, confident)| {
                // a molecule always carries the same region code
                let code = if noise == 0 { b'X' } else { [b'E', b'N', b'I'][(cb + ub) % 3] };
                let mut read = tags(pos, &format!("cell{}", cb), &format!("umi{}", ub), code);
                if !confident {
                    read.mapq = 0;
                }
                (tid, read)
            },
        )
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(48))]

        #[test]
        fn rebinning_does_not_change_counts(
            reads in prop::collection::vec(read_strategy(), 0..120),
            bin_size in 1u64..500,
            threads in 1usize..5,
        ) {
            let (whole, _) = aggregate_bins(bins(1_000), MemoryAlignments::new(reads.clone()), 1, None).unwrap();
            let (split, summary) = aggregate_bins(bins(bin_size), MemoryAlignments::new(reads.clone()), threads, None).unwrap();
            prop_assert_eq!(summary.bins_merged, summary.bins_total);
            prop_assert_eq!(whole.to_sorted_map(), split.to_sorted_map());
            prop_assert_eq!(whole.to_sorted_map(), reference_counts(&reads));
        }
    }
}
