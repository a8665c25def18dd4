//! Read-only Jellyfin integration.
//!
//! The media server is an external collaborator reached over HTTP with a
//! token header. Failures here are always recoverable: callers degrade to
//! per-item error statuses instead of aborting.

mod client;
mod models;

pub use client::JellyfinClient;
pub use models::{LibraryStats, LibraryStatus};

use async_trait::async_trait;
use thiserror::Error;

/// Failures of the external media server collaborator.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("failed to reach Jellyfin: {0}")]
    Connection(#[from] reqwest::Error),

    #[error("Jellyfin returned status {0}")]
    Status(reqwest::StatusCode),

    #[error("no Jellyfin user available")]
    NoUsers,
}

/// Seam over the media server, so the status reporter can be exercised
/// without a live Jellyfin instance.
#[async_trait]
pub trait JellyfinApi: Send + Sync {
    /// Cheap connectivity probe.
    async fn check_connection(&self) -> Result<(), UpstreamError>;

    /// Per-library item/collection counts. A single failing library is
    /// reported with zero counts and an error status, not propagated.
    async fn list_library_stats(&self) -> Result<Vec<LibraryStats>, UpstreamError>;
}
