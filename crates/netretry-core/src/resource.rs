//! Scoped use of closeable resources with error logging.
//!
//! The resource is moved in and dropped (closed) on every path, success or
//! failure, before the result is handed back.

use std::fmt::Display;
use tracing::error;

/// Run `block` with `resource`, logging any error before returning it
/// unchanged.
pub fn use_and_log_error<T, R, E, F>(resource: T, block: F) -> Result<R, E>
where
    F: FnOnce(&mut T) -> Result<R, E>,
    E: Display,
{
    let mut resource = resource;
    let result = block(&mut resource);
    drop(resource);

    if let Err(e) = &result {
        error!(error = %e, "Caught an IO exception");
    }
    result
}

/// Run `block` with `resource`, logging and swallowing any error.
pub fn use_and_ignore_error<T, R, E, F>(resource: T, block: F) -> Option<R>
where
    F: FnOnce(&mut T) -> Result<R, E>,
    E: Display,
{
    use_and_log_error(resource, block).ok()
}
