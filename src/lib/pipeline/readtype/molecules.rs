//! Molecule table: one row per globally unique (cell, molecule) pair.
//!
//! Written by `bam-tags` and read back by `tags-prop`.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use log::{info, warn};
use serde::Deserialize;

use super::aggregator::{BatchConsumer, CellCounters, GlobalDeduplicator, MergeStats};
use super::extractor::BinBatch;
use super::fingerprint::DedupKey;
use super::record::RegionType;
use super::report::csv_to_io;
use crate::core::error::{ReadPropError, Result};
use crate::core::io::csv_writer;

pub const MOLECULE_HEADER: [&str; 4] = [
    "CB_cell_barcode",
    "UB_umi_barcode",
    "RE_region_type",
    "GN_gene_name",
];

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MoleculeRow {
    #[serde(rename = "CB_cell_barcode")]
    pub cell_barcode: String,
    #[serde(rename = "UB_umi_barcode")]
    pub molecule_barcode: String,
    #[serde(rename = "RE_region_type")]
    pub region_type: String,
    #[serde(rename = "GN_gene_name", default)]
    pub gene_name: String,
}

/// Streams globally deduplicated candidates into a CSV molecule table.
pub struct MoleculeTableWriter<W: Write> {
    writer: csv::Writer<W>,
    target: PathBuf,
    dedup: GlobalDeduplicator,
    stats: MergeStats,
    unannotated: u64,
}

impl<W: Write> MoleculeTableWriter<W> {
    /// `target` names the destination in error messages.
    pub fn new<P: Into<PathBuf>>(inner: W, target: P) -> Result<Self> {
        let target = target.into();
        let mut writer = csv_writer(inner, false);
        writer
            .write_record(MOLECULE_HEADER)
            .map_err(|e| ReadPropError::output(&target, csv_to_io(e)))?;
        Ok(Self {
            writer,
            target,
            dedup: GlobalDeduplicator::new(),
            stats: MergeStats::default(),
            unannotated: 0,
        })
    }

    pub fn stats(&self) -> &MergeStats {
        &self.stats
    }

    pub fn log_summary(&self) {
        self.stats.log(self.dedup.len(), self.dedup.approx_bytes());
        if self.unannotated > 0 {
            warn!(
                "{} candidates arrived without molecule details and were not written",
                self.unannotated
            );
        }
    }

    /// Flush pending rows and hand back the underlying sink.
    pub fn finish(self) -> Result<W> {
        let target = self.target;
        let mut writer = self.writer;
        writer
            .flush()
            .map_err(|e| ReadPropError::output(&target, e))?;
        writer
            .into_inner()
            .map_err(|e| ReadPropError::output(&target, e.into_error()))
    }
}

impl<W: Write> BatchConsumer for MoleculeTableWriter<W> {
    fn consume(&mut self, batch: BinBatch) -> Result<()> {
        self.stats.absorb(&batch);
        for record in batch.records {
            if !self.dedup.first_sighting(record.dedup_key) {
                continue;
            }
            let Some(annotation) = record.annotation else {
                self.unannotated += 1;
                continue;
            };
            self.stats.records_after += 1;
            let code = record.region_type.code();
            let mut code_buf = [0u8; 4];
            self.writer
                .write_record([
                    record.cell_barcode.as_bytes(),
                    annotation.molecule_barcode.as_bytes(),
                    code.encode_utf8(&mut code_buf).as_bytes(),
                    annotation.gene_name.as_deref().unwrap_or("").as_bytes(),
                ])
                .map_err(|e| ReadPropError::output(&self.target, csv_to_io(e)))?;
        }
        Ok(())
    }
}

/// Tallies from reading a molecule table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableStats {
    pub rows: u64,
    pub malformed: u64,
    pub missing_barcode: u64,
    pub unknown_region: u64,
    pub duplicates: u64,
}

/// Count a molecule table into per-cell region counters.
///
/// Rows go through the same filters and global deduplication as alignment
/// records, so a table concatenated from several runs still counts each
/// molecule once. `path` is only used for error messages.
pub fn count_molecule_table<R: Read>(
    reader: &mut csv::Reader<R>,
    path: &Path,
) -> Result<(CellCounters, TableStats)> {
    let headers = reader.headers().map_err(|e| input_error(path, e))?.clone();
    for required in &MOLECULE_HEADER[..3] {
        if !headers.iter().any(|h| h == *required) {
            return Err(ReadPropError::precondition(
                path,
                format!("molecule table has no {} column", required),
            ));
        }
    }

    let mut counters = CellCounters::new();
    let mut dedup = GlobalDeduplicator::new();
    let mut stats = TableStats::default();

    for (line, row) in reader.deserialize::<MoleculeRow>().enumerate() {
        stats.rows += 1;
        let row = match row {
            Ok(row) => row,
            Err(e) if e.is_io_error() => return Err(input_error(path, e)),
            Err(e) => {
                warn!("Skipping malformed row {} of {}: {}", line + 2, path.display(), e);
                stats.malformed += 1;
                continue;
            }
        };
        if row.cell_barcode.is_empty() || row.molecule_barcode.is_empty() {
            stats.missing_barcode += 1;
            continue;
        }
        let Some(region) = RegionType::parse(&row.region_type) else {
            stats.unknown_region += 1;
            continue;
        };
        if !dedup.first_sighting(DedupKey::of(&row.cell_barcode, &row.molecule_barcode)) {
            stats.duplicates += 1;
            continue;
        }
        counters.increment(&row.cell_barcode.as_str().into(), region);
    }

    info!(
        "Read {} rows from {}: {} malformed, {} missing barcode, {} unknown region, {} duplicates",
        stats.rows,
        path.display(),
        stats.malformed,
        stats.missing_barcode,
        stats.unknown_region,
        stats.duplicates
    );
    Ok((counters, stats))
}

fn input_error(path: &Path, source: csv::Error) -> ReadPropError {
    ReadPropError::Input {
        path: path.to_path_buf(),
        source,
    }
}
