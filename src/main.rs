//! readprop - per-cell exonic / intronic / intergenic read proportions
//!
//! readprop walks a coordinate-sorted, indexed single-cell BAM in parallel
//! bins, keeps confidently mapped reads carrying a cell barcode, a molecule
//! barcode and a region-type tag, collapses duplicate molecules and reports
//! how each cell's molecules split across region types.
//!
//! # Tools
//!
//! - `read-type-prop`: proportions straight from the BAM
//! - `bam-tags`: export the deduplicated molecule table
//! - `tags-prop`: proportions from a previously exported molecule table
//!
//! # Usage
//!
//! ```bash
//! readprop read-type-prop -i possorted.bam -o read_types.csv -t 8
//!
//! readprop bam-tags -i possorted.bam -o molecules.csv.gz
//! readprop tags-prop -i molecules.csv.gz -o read_types.csv
//! ```

extern crate readprop_lib;
pub mod commands;
use anyhow::Result;
use env_logger::Env;
use log::*;
use readprop_lib::utils;
use structopt::StructOpt;

#[derive(StructOpt)]
#[structopt(rename_all = "kebab-case", author, about)]
/// Per-cell read-type proportions for single-cell BAM files
struct Args {
    #[structopt(subcommand)]
    subcommand: Subcommand,
}

#[derive(StructOpt)]
#[structopt(rename_all = "kebab-case")]
enum Subcommand {
    /// Count exonic, intronic and intergenic molecules per cell
    ReadTypeProp(commands::ReadTypePropArgs),
    /// Export one row per deduplicated molecule
    BamTags(commands::BamTagsArgs),
    /// Compute read-type proportions from a molecule table
    TagsProp(commands::TagsPropArgs),
}

impl Subcommand {
    fn run(self) -> Result<()> {
        match self {
            Subcommand::ReadTypeProp(args) => commands::run_read_type_prop(args)?,
            Subcommand::BamTags(args) => commands::run_bam_tags(args)?,
            Subcommand::TagsProp(args) => commands::run_tags_prop(args)?,
        }
        Ok(())
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    if let Err(err) = Args::from_args().subcommand.run() {
        if utils::is_broken_pipe(&err) {
            std::process::exit(0);
        }
        let code = match utils::find_readprop_error(&err) {
            Some(cause) => {
                error!("[{}] {:#}", cause.kind(), err);
                cause.exit_code()
            }
            None => {
                error!("{:#}", err);
                1
            }
        };
        std::process::exit(code);
    }
    Ok(())
}
