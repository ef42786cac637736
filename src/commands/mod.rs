pub mod bam_tags;
pub mod common;
pub mod read_type_prop;
pub mod tags_prop;

pub use bam_tags::{run_bam_tags, BamTagsArgs};
pub use read_type_prop::{run_read_type_prop, ReadTypePropArgs};
pub use tags_prop::{run_tags_prop, TagsPropArgs};
