use thiserror::Error;

/// Failure kinds a launch run can hit.
///
/// Only [`LaunchError::GeometryUnavailable`] aborts a run. The others are
/// logged where they happen and the run carries on.
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("screen geometry unavailable: {0}")]
    GeometryUnavailable(String),

    #[error("failed to spawn instance {index}: {source}")]
    Spawn {
        index: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to raise client windows: {0}")]
    ForegroundRaise(String),

    #[error("failed to terminate instance {index}: {source}")]
    TerminationPropagation {
        index: usize,
        #[source]
        source: std::io::Error,
    },
}
