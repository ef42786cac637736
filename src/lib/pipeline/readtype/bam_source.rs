//! Indexed BAM input for read-type counting.

use std::convert::TryFrom;
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context};
use log::debug;
use noodles::bam::Record;
use noodles::sam::alignment::record::data::field::Value;
use noodles::{
    bam,
    core::{self, Position, Region},
    sam,
};
use smartstring::alias::String as CompactString;

use super::extractor::{BinBatch, BinExtractor, ExtractionConfig};
use super::record::ReadTags;
use crate::core::error::{ReadPropError, Result};
use crate::engine::par_granges::header_references;
use crate::engine::{Bin, RegionProcessor};

/// Consecutive unreadable records tolerated before a bin is declared broken.
const MAX_CONSECUTIVE_READ_ERRORS: usize = 64;

/// Auxiliary tags holding the per-read attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagNames {
    pub cell_barcode: [u8; 2],
    pub molecule_barcode: [u8; 2],
    pub region: [u8; 2],
    pub gene: [u8; 2],
}

impl Default for TagNames {
    fn default() -> Self {
        TagNames {
            cell_barcode: *b"CB",
            molecule_barcode: *b"UB",
            region: *b"RE",
            gene: *b"GN",
        }
    }
}

/// Validate a two-character SAM auxiliary tag name.
pub fn parse_tag(name: &str) -> Result<[u8; 2]> {
    match name.as_bytes() {
        [a, b] if a.is_ascii_alphabetic() && b.is_ascii_alphanumeric() => Ok([*a, *b]),
        _ => Err(ReadPropError::Config(format!(
            "invalid tag name {:?}: expected two characters like CB",
            name
        ))),
    }
}

/// Find `<input>.bai` or `<input>.csi` next to the alignment file.
pub fn locate_index(path: &Path) -> Option<PathBuf> {
    ["bai", "csi"].iter().find_map(|ext| {
        let mut name = OsString::from(path.as_os_str());
        name.push(".");
        name.push(ext);
        let candidate = PathBuf::from(name);
        candidate.is_file().then_some(candidate)
    })
}

/// An indexed BAM file whose header has been read and validated.
#[derive(Debug, Clone)]
pub struct BamSource {
    path: PathBuf,
    header: Arc<sam::Header>,
}

impl BamSource {
    /// Check that the alignment file and its index are usable.
    ///
    /// Every failure here is a precondition error; nothing has been
    /// dispatched or written yet.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.is_file() {
            return Err(ReadPropError::precondition(&path, "file does not exist"));
        }
        let index = locate_index(&path).ok_or_else(|| {
            ReadPropError::precondition(&path, "no .bai or .csi index found next to the file")
        })?;
        debug!("Using index {}", index.display());

        let mut reader = bam::io::indexed_reader::Builder::default()
            .build_from_path(&path)
            .map_err(|e| ReadPropError::precondition(&path, format!("cannot open: {}", e)))?;
        let header = reader
            .read_header()
            .map_err(|e| ReadPropError::precondition(&path, format!("unreadable header: {}", e)))?;
        if header.reference_sequences().is_empty() {
            return Err(ReadPropError::precondition(
                &path,
                "header declares no reference sequences",
            ));
        }

        Ok(Self {
            path,
            header: Arc::new(header),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn header(&self) -> &Arc<sam::Header> {
        &self.header
    }

    /// Reference names and lengths in header order.
    pub fn references(&self) -> Vec<(String, i64)> {
        header_references(&self.header)
    }
}

/// Implements [`RegionProcessor`] by querying one bin of an indexed BAM.
pub struct BamBinProcessor {
    reads: PathBuf,
    header: Arc<sam::Header>,
    tags: TagNames,
    config: ExtractionConfig,
}

impl BamBinProcessor {
    pub fn new(source: &BamSource, tags: TagNames, config: ExtractionConfig) -> Self {
        Self {
            reads: source.path().to_path_buf(),
            header: Arc::clone(source.header()),
            tags,
            config,
        }
    }

    fn decode_read(&self, record: &Record) -> ReadTags {
        let start = match record.alignment_start().transpose() {
            Ok(Some(pos)) => Some((usize::from(pos) - 1) as u64),
            _ => None,
        };

        // noodles reports MAPQ 255 ("unavailable") as `None`
        let mapq = if record.flags().is_unmapped() {
            0
        } else {
            record.mapping_quality().map(u8::from).unwrap_or(255)
        };

        let mut read = ReadTags {
            start,
            mapq,
            ..Default::default()
        };
        if mapq != self.config.filter.sentinel() {
            return read;
        }

        read.cell_barcode = string_tag(record, &self.tags.cell_barcode);
        read.molecule_barcode = string_tag(record, &self.tags.molecule_barcode);
        read.region_code = region_tag(record, &self.tags.region);
        if self.config.keep_annotations {
            read.gene_name = string_tag(record, &self.tags.gene).map(|g| g.to_string());
        }
        read
    }
}

/// A text-valued tag; missing, mistyped or non-UTF-8 values read as absent.
fn string_tag(record: &Record, tag: &[u8; 2]) -> Option<CompactString> {
    match record.data().get(tag) {
        Some(Ok(Value::String(value))) => std::str::from_utf8(value.as_ref())
            .ok()
            .map(CompactString::from),
        Some(Ok(Value::Character(c))) if c.is_ascii() => {
            let mut text = CompactString::new();
            text.push(char::from(c));
            Some(text)
        }
        _ => None,
    }
}

fn region_tag(record: &Record, tag: &[u8; 2]) -> Option<u8> {
    match record.data().get(tag) {
        Some(Ok(Value::Character(c))) => Some(c),
        Some(Ok(Value::String(value))) => {
            let bytes: &[u8] = value.as_ref();
            match bytes {
                [c] => Some(*c),
                _ => None,
            }
        }
        _ => None,
    }
}

impl RegionProcessor for BamBinProcessor {
    type P = BinBatch;

    fn process_region(&self, bin: &Bin) -> anyhow::Result<BinBatch> {
        let mut reader = bam::io::indexed_reader::Builder::default()
            .build_from_path(&self.reads)
            .with_context(|| format!("Failed to open {}", self.reads.display()))?;
        reader
            .read_header()
            .with_context(|| format!("Failed to read header for {}", self.reads.display()))?;

        let start = Position::try_from(bin.start as usize + 1)
            .map_err(|_| anyhow!("invalid bin start {}", bin.start))?;
        let end = Position::try_from(bin.end as usize)
            .map_err(|_| anyhow!("invalid bin end {}", bin.end))?;
        let region = Region::new(bin.contig.to_string(), core::region::Interval::from(start..=end));

        let query = reader
            .query(&self.header, &region)
            .with_context(|| format!("Failed to query region {}", bin))?;

        let mut extractor = BinExtractor::new(&self.config, bin);
        let mut consecutive_errors = 0usize;

        for result in query {
            let record = match result {
                Ok(record) => record,
                Err(err) if err.kind() == io::ErrorKind::InvalidData => {
                    consecutive_errors += 1;
                    if consecutive_errors > MAX_CONSECUTIVE_READ_ERRORS {
                        bail!("too many consecutive unreadable records: {}", err);
                    }
                    debug!("Skipping malformed record in {}: {}", bin, err);
                    extractor.record_malformed();
                    continue;
                }
                Err(err) => {
                    return Err(err).with_context(|| format!("Failed to read records in {}", bin))
                }
            };
            consecutive_errors = 0;

            match record.reference_sequence_id().transpose() {
                Ok(Some(id)) if id == bin.tid => {}
                Ok(_) => continue,
                Err(err) => {
                    debug!("Skipping record with bad reference id in {}: {}", bin, err);
                    extractor.record_malformed();
                    continue;
                }
            }

            let read = self.decode_read(&record);
            extractor.push(read);
        }

        let batch = extractor.finish();
        debug!(
            "{}: scanned {} records, emitted {}, skipped {} malformed",
            bin, batch.stats.scanned, batch.stats.emitted, batch.stats.malformed
        );
        Ok(batch)
    }
}
