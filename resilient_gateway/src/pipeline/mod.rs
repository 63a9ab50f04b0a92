//! Request pipelines composed by the service facade.
//!
//! * **read** – breaker-gated upstream reads with read-through cache fallback.
//! * **write** – create/update/delete passed straight to upstream.

pub mod read;
pub mod write;

pub use read::ResilientReader;
pub use write::PassThroughWriter;

use crate::error::{ServiceError, UpstreamError};

/// Map an upstream failure that is not recovered locally to the facade error.
pub(crate) fn propagate(err: UpstreamError) -> ServiceError {
    match err {
        UpstreamError::NotFound { resource } => ServiceError::NotFound { resource },
        other => ServiceError::Upstream(other),
    }
}
