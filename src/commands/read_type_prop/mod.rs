mod args;

use anyhow::{Context, Result};
use log::info;
use readprop_lib::pipeline::readtype::{run_read_type_proportions, ReadTypeConfig};

pub use args::ReadTypePropArgs;

/// Execute the `read-type-prop` command end-to-end.
pub fn run_read_type_prop(args: ReadTypePropArgs) -> Result<()> {
    let config: ReadTypeConfig = args.into();
    info!("Running readprop read-type-prop on {:?}", config.input);

    let report = run_read_type_proportions(&config)
        .with_context(|| format!("read-type-prop failed for {}", config.input.display()))?;

    info!(
        "Read-type proportions complete: {} cells, {} molecules, {} bins -> {:?}",
        report.cells, report.molecules, report.summary.bins_total, report.output
    );
    Ok(())
}
