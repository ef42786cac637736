use readprop_lib::pipeline::readtype::bam_source::parse_tag;
use readprop_lib::pipeline::readtype::TagExportConfig;
use structopt::StructOpt;

use crate::commands::common::BamRunArgs;

/// CLI arguments for the `bam-tags` subcommand.
#[derive(Debug, Clone, StructOpt)]
#[structopt(author, name = "bam-tags")]
pub struct BamTagsArgs {
    #[structopt(flatten)]
    pub run: BamRunArgs,

    /// Tag holding the gene name.
    #[structopt(long, default_value = "GN", parse(try_from_str = parse_tag))]
    pub gene_tag: [u8; 2],
}

impl From<BamTagsArgs> for TagExportConfig {
    fn from(args: BamTagsArgs) -> TagExportConfig {
        args.run.into_config(args.gene_tag)
    }
}
