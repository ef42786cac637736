use log::warn;

use super::error::{ReadPropError, Result};

/// Default worker count: every logical core but one, never fewer than one.
pub fn default_worker_count() -> usize {
    num_cpus::get().saturating_sub(1).max(1)
}

/// Validate and normalize a requested worker count, falling back to
/// [`default_worker_count`] when none was requested.
pub fn determine_allowed_cpus(desired: Option<usize>) -> Result<usize> {
    match desired {
        None => Ok(default_worker_count()),
        Some(0) => Err(ReadPropError::Config(
            "Must select > 0 worker threads".to_string(),
        )),
        Some(n) => {
            if n > num_cpus::get() {
                warn!(
                    "Specified {} threads but only {} logical cores are available",
                    n,
                    num_cpus::get()
                );
            }
            Ok(n)
        }
    }
}
