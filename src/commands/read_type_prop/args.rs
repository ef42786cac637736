use readprop_lib::pipeline::readtype::ReadTypeConfig;
use structopt::StructOpt;

use crate::commands::common::{default_gene_tag, BamRunArgs};

/// CLI arguments for the `read-type-prop` subcommand.
#[derive(Debug, Clone, StructOpt)]
#[structopt(author, name = "read-type-prop")]
pub struct ReadTypePropArgs {
    #[structopt(flatten)]
    pub run: BamRunArgs,
}

impl From<ReadTypePropArgs> for ReadTypeConfig {
    fn from(args: ReadTypePropArgs) -> ReadTypeConfig {
        args.run.into_config(default_gene_tag())
    }
}
