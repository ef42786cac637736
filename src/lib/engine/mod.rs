pub mod par_granges;

pub use par_granges::{Bin, ParGranges, RegionProcessor, RunSummary};
