mod args;

use anyhow::{Context, Result};
use log::info;
use readprop_lib::pipeline::readtype::run_table_proportions;

pub use args::TagsPropArgs;

/// Execute the `tags-prop` command end-to-end.
pub fn run_tags_prop(args: TagsPropArgs) -> Result<()> {
    info!("Running readprop tags-prop on {:?}", args.input);

    let report = run_table_proportions(&args.input, &args.output)
        .with_context(|| format!("tags-prop failed for {}", args.input.display()))?;

    info!(
        "Read-type proportions complete: {} cells, {} molecules -> {:?}",
        report.cells, report.molecules, report.output
    );
    Ok(())
}
