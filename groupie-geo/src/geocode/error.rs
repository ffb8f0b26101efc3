//! Geocoding error types.

use thiserror::Error;

use crate::http::HttpError;

/// Errors returned by [`GeocodeResolver`](super::GeocodeResolver).
///
/// "Location not found" is not an error: it is `Ok(None)`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeocodeError {
    /// The key is empty or only whitespace.
    #[error("Invalid location key: {0:?}")]
    InvalidKey(String),

    /// Every attempt failed; `last` is the final attempt's error.
    #[error("Geocoding failed after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: HttpError },

    /// The service answered with something that is not a search result list.
    #[error("Failed to decode geocoding response: {0}")]
    Decode(String),

    /// The batch this lookup belonged to was cancelled.
    #[error("Geocoding cancelled")]
    Cancelled,
}
