use std::path::PathBuf;

use structopt::StructOpt;

/// CLI arguments for the `tags-prop` subcommand.
#[derive(Debug, Clone, StructOpt)]
#[structopt(author, name = "tags-prop")]
pub struct TagsPropArgs {
    /// Molecule table written by `bam-tags` (plain or gzip).
    #[structopt(long, short = "i")]
    pub input: PathBuf,

    /// Output CSV path; a `.gz` suffix compresses it.
    #[structopt(long, short = "o")]
    pub output: PathBuf,
}
