use crate::tracker::TrackerError;
use thiserror::Error;

/// A peer source failed to refresh its candidate set.
///
/// Source failures are contained: the discovery sweep logs them and
/// moves on to the next source.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The tracker query behind the source failed.
    #[error("tracker query failed: {0}")]
    Tracker(#[from] TrackerError),

    /// A plug-in source failed.
    #[error("peer source failed: {0}")]
    Source(#[source] Box<dyn std::error::Error + Send + Sync>),
}
