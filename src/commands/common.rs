use std::path::PathBuf;

use readprop_lib::core::read_filter::CONFIDENT_MAPQ_STR;
use readprop_lib::engine::par_granges;
use readprop_lib::pipeline::readtype::bam_source::parse_tag;
use readprop_lib::pipeline::readtype::{ReadTypeConfig, TagNames};
use structopt::StructOpt;

/// Arguments shared by every subcommand that reads an indexed BAM.
#[derive(Debug, Clone, StructOpt)]
pub struct BamRunArgs {
    /// Coordinate-sorted BAM with a `.bai` or `.csi` index next to it.
    #[structopt(long, short = "i")]
    pub input: PathBuf,

    /// Output CSV path; a `.gz` suffix compresses it.
    #[structopt(long, short = "o")]
    pub output: PathBuf,

    /// Number of worker threads (default: all cores but one).
    #[structopt(long, short = "t")]
    pub threads: Option<usize>,

    /// Reference bases covered by one bin.
    #[structopt(long, short = "b", default_value = par_granges::DEFAULT_BIN_SIZE_STR.as_str())]
    pub bin_size: u64,

    /// Finished bins buffered before workers block (default: two per worker).
    #[structopt(long)]
    pub channel_capacity: Option<usize>,

    /// Mapping quality a read must carry exactly to be counted.
    #[structopt(long, default_value = CONFIDENT_MAPQ_STR.as_str())]
    pub mapq: u8,

    /// Tag holding the cell barcode.
    #[structopt(long, default_value = "CB", parse(try_from_str = parse_tag))]
    pub cb_tag: [u8; 2],

    /// Tag holding the molecule barcode.
    #[structopt(long, default_value = "UB", parse(try_from_str = parse_tag))]
    pub umi_tag: [u8; 2],

    /// Tag holding the region type (`E`, `N` or `I`).
    #[structopt(long, default_value = "RE", parse(try_from_str = parse_tag))]
    pub region_tag: [u8; 2],
}

impl BamRunArgs {
    pub fn into_config(self, gene_tag: [u8; 2]) -> ReadTypeConfig {
        ReadTypeConfig {
            input: self.input,
            output: self.output,
            threads: self.threads,
            bin_size: self.bin_size,
            channel_capacity: self.channel_capacity,
            confident_mapq: self.mapq,
            tags: TagNames {
                cell_barcode: self.cb_tag,
                molecule_barcode: self.umi_tag,
                region: self.region_tag,
                gene: gene_tag,
            },
        }
    }
}

/// The gene tag for subcommands that never read it.
pub fn default_gene_tag() -> [u8; 2] {
    TagNames::default().gene
}
