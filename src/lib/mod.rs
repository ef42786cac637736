//! readprop: per-cell read-type proportions for single-cell alignments
//!
//! readprop counts, for every cell barcode in a coordinate-sorted, indexed
//! BAM file, how many distinct molecules were assigned to exonic, intronic and
//! intergenic regions, and reports those counts as proportions.
//!
//! # Modules
//!
//! - [`core`]: errors, staged output files, worker counts and read filters
//! - [`engine`]: the parallel bin executor ([`engine::ParGranges`])
//! - [`pipeline`]: read-type extraction, deduplication and reporting
//! - [`utils`]: short re-exports of the most used helpers

pub mod core;
pub mod engine;
pub mod pipeline;
pub mod utils;
