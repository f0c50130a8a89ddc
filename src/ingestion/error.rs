use crate::listen_store::is_infrastructure_failure;
use crate::spotify::SpotifyError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestionError {
    #[error("No credential on record, authorize first")]
    CredentialMissing,

    #[error("Credential refresh failed: {0}")]
    CredentialRefreshFailed(String),

    #[error("Upstream unreachable: {0}")]
    UpstreamUnreachable(String),

    #[error("Upstream returned status {status}: {message}")]
    UpstreamError { status: u16, message: String },

    #[error("Malformed event: {0}")]
    MalformedEvent(String),

    #[error("Listen already recorded")]
    DuplicateListen,

    #[error("Store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),
}

impl IngestionError {
    /// Whether this error ends the whole run rather than just the current event.
    pub fn is_run_aborting(&self) -> bool {
        match self {
            IngestionError::CredentialMissing
            | IngestionError::CredentialRefreshFailed(_)
            | IngestionError::UpstreamUnreachable(_)
            | IngestionError::UpstreamError { .. }
            | IngestionError::StoreUnavailable(_) => true,
            IngestionError::Store(e) => is_infrastructure_failure(e),
            IngestionError::MalformedEvent(_) | IngestionError::DuplicateListen => false,
        }
    }
}

impl From<SpotifyError> for IngestionError {
    fn from(err: SpotifyError) -> Self {
        match err {
            SpotifyError::Unreachable(msg) => IngestionError::UpstreamUnreachable(msg),
            SpotifyError::Status { status, message } => {
                IngestionError::UpstreamError { status, message }
            }
            SpotifyError::InvalidResponse(msg) => IngestionError::UpstreamError {
                status: 200,
                message: msg,
            },
        }
    }
}
