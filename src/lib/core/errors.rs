use anyhow::Error;
use std::io;

use super::error::ReadPropError;

/// Returns `true` if the error originated from a broken pipe, including
/// broken pipes wrapped in [`ReadPropError::Output`].
#[inline]
pub fn is_broken_pipe(err: &Error) -> bool {
    err.chain().any(|cause| {
        if let Some(io_err) = cause.downcast_ref::<io::Error>() {
            return io_err.kind() == io::ErrorKind::BrokenPipe;
        }
        matches!(
            cause.downcast_ref::<ReadPropError>(),
            Some(ReadPropError::Output { source, .. }) if source.kind() == io::ErrorKind::BrokenPipe
        )
    })
}

/// Finds the library error behind an `anyhow` chain, if there is one.
pub fn find_readprop_error(err: &Error) -> Option<&ReadPropError> {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<ReadPropError>())
}
