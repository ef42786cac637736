//! Shortcuts to the helpers the command layer reaches for.

pub use crate::core::errors::{find_readprop_error, is_broken_pipe};
