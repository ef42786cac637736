mod args;

use anyhow::{Context, Result};
use log::info;
use readprop_lib::pipeline::readtype::{run_molecule_export, TagExportConfig};

pub use args::BamTagsArgs;

/// Execute the `bam-tags` command end-to-end.
pub fn run_bam_tags(args: BamTagsArgs) -> Result<()> {
    let config: TagExportConfig = args.into();
    info!("Running readprop bam-tags on {:?}", config.input);

    let report = run_molecule_export(&config)
        .with_context(|| format!("bam-tags failed for {}", config.input.display()))?;

    info!(
        "Molecule export complete: {} molecules -> {:?}",
        report.molecules, report.output
    );
    Ok(())
}
