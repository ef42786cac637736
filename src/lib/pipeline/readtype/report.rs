//! Proportion report rows and their CSV rendering.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use log::info;
use serde::Serialize;

use super::aggregator::{CellCounters, RegionCounts};
use crate::core::error::{ReadPropError, Result};
use crate::core::fs::StagedOutput;
use crate::core::io::csv_writer;

pub const REPORT_HEADER: [&str; 8] = [
    "CB_cell_barcode",
    "total_reads",
    "exon_reads",
    "exon_prop",
    "intron_reads",
    "intron_prop",
    "intergenic_reads",
    "intergenic_prop",
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportRow<'a> {
    #[serde(rename = "CB_cell_barcode")]
    pub cell_barcode: &'a str,
    #[serde(rename = "total_reads")]
    pub total: u64,
    #[serde(rename = "exon_reads")]
    pub exonic_count: u64,
    #[serde(rename = "exon_prop")]
    pub exonic_prop: f64,
    #[serde(rename = "intron_reads")]
    pub intronic_count: u64,
    #[serde(rename = "intron_prop")]
    pub intronic_prop: f64,
    #[serde(rename = "intergenic_reads")]
    pub intergenic_count: u64,
    #[serde(rename = "intergenic_prop")]
    pub intergenic_prop: f64,
}

impl<'a> ReportRow<'a> {
    pub fn from_counts(cell_barcode: &'a str, counts: &RegionCounts) -> Self {
        let total = counts.total();
        let prop = |count: u64| {
            if total == 0 {
                0.0
            } else {
                count as f64 / total as f64
            }
        };
        ReportRow {
            cell_barcode,
            total,
            exonic_count: counts.exonic,
            exonic_prop: prop(counts.exonic),
            intronic_count: counts.intronic,
            intronic_prop: prop(counts.intronic),
            intergenic_count: counts.intergenic,
            intergenic_prop: prop(counts.intergenic),
        }
    }
}

/// One row per cell, in first-seen order.
pub fn report_rows(counters: &CellCounters) -> impl Iterator<Item = ReportRow<'_>> {
    counters
        .iter()
        .map(|(cb, counts)| ReportRow::from_counts(cb, counts))
}

/// Serialize the report into `inner`, always starting with the header row.
pub fn write_report<W: Write>(counters: &CellCounters, inner: W) -> csv::Result<W> {
    let mut writer = csv_writer(inner, false);
    writer.write_record(REPORT_HEADER)?;
    for row in report_rows(counters) {
        writer.serialize(row)?;
    }
    writer.flush()?;
    writer
        .into_inner()
        .map_err(|e| csv::Error::from(e.into_error()))
}

pub(crate) fn csv_to_io(err: csv::Error) -> io::Error {
    match err.into_kind() {
        csv::ErrorKind::Io(e) => e,
        other => io::Error::new(io::ErrorKind::Other, format!("{:?}", other)),
    }
}

/// Write the report to a staged file next to `path` and move it into place.
pub fn publish_report<P: AsRef<Path>>(counters: &CellCounters, path: P) -> Result<PathBuf> {
    commit_report(counters, StagedOutput::create(path)?)
}

/// Fill an already-created staging file with the report and commit it.
pub fn commit_report(counters: &CellCounters, staged: StagedOutput) -> Result<PathBuf> {
    let stream = staged.stream()?;
    let stream = write_report(counters, stream)
        .map_err(|e| ReadPropError::output(staged.target(), csv_to_io(e)))?;
    stream
        .finish()
        .map_err(|e| ReadPropError::output(staged.target(), e))?;
    let target = staged.commit()?;
    info!(
        "Wrote proportions for {} cells to {}",
        counters.len(),
        target.display()
    );
    Ok(target)
}
