//! Access to a currently valid upstream access token.

use super::error::IngestionError;
use crate::listen_store::{Credential, CredentialStore};
use crate::spotify::{SpotifyError, TokenEndpoint, TokenResponse};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{info, warn};

pub const DEFAULT_REFRESH_MARGIN_SECS: i64 = 60;
const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialStatus {
    Missing,
    Present {
        token_type: String,
        expires_at: DateTime<Utc>,
        expired: bool,
    },
}

pub struct CredentialProvider {
    store: Arc<dyn CredentialStore>,
    endpoint: Arc<dyn TokenEndpoint>,
    refresh_margin: Duration,
}

impl CredentialProvider {
    pub fn new(store: Arc<dyn CredentialStore>, endpoint: Arc<dyn TokenEndpoint>) -> Self {
        Self {
            store,
            endpoint,
            refresh_margin: Duration::seconds(DEFAULT_REFRESH_MARGIN_SECS),
        }
    }

    pub fn with_refresh_margin(mut self, refresh_margin: Duration) -> Self {
        self.refresh_margin = refresh_margin;
        self
    }

    fn load(&self) -> Result<Option<Credential>, IngestionError> {
        self.store
            .get_credential()
            .map_err(|e| IngestionError::StoreUnavailable(format!("{:#}", e)))
    }

    fn persist(&self, credential: &Credential) -> Result<(), IngestionError> {
        self.store
            .save_credential(credential)
            .map_err(|e| IngestionError::StoreUnavailable(format!("{:#}", e)))
    }

    /// Builds the credential to store from a token response.
    ///
    /// The previous refresh token is kept when the response doesn't rotate it.
    fn credential_from_response(
        response: TokenResponse,
        previous_refresh_token: Option<String>,
    ) -> Result<Credential, IngestionError> {
        let refresh_token = response
            .refresh_token
            .or(previous_refresh_token)
            .ok_or_else(|| {
                IngestionError::CredentialRefreshFailed("no refresh token available".to_string())
            })?;
        let expires_in = response.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS);
        let expires_at = Duration::try_seconds(expires_in)
            .and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
            .ok_or_else(|| {
                IngestionError::CredentialRefreshFailed(format!(
                    "expires_in out of range: {}",
                    expires_in
                ))
            })?;
        Ok(Credential {
            access_token: response.access_token,
            refresh_token,
            token_type: response.token_type.unwrap_or_else(|| "Bearer".to_string()),
            expires_at,
        })
    }

    /// Returns the stored access token, refreshing and persisting it first if
    /// it expires within the refresh margin.
    pub fn get_valid_token(&self) -> Result<String, IngestionError> {
        let credential = self.load()?.ok_or(IngestionError::CredentialMissing)?;

        if credential.expires_at > Utc::now() + self.refresh_margin {
            return Ok(credential.access_token);
        }

        info!("Access token expires at {}, refreshing", credential.expires_at);
        let response = self
            .endpoint
            .refresh(&credential.refresh_token)
            .map_err(|e| {
                warn!("Token refresh failed: {}", e);
                IngestionError::CredentialRefreshFailed(e.to_string())
            })?;
        let refreshed =
            Self::credential_from_response(response, Some(credential.refresh_token))?;
        self.persist(&refreshed)?;
        info!("Access token refreshed, valid until {}", refreshed.expires_at);
        Ok(refreshed.access_token)
    }

    pub fn authorize_url(&self) -> String {
        self.endpoint.authorize_url()
    }

    /// Exchanges an authorization code and replaces the stored credential.
    pub fn authorize_with_code(&self, code: &str) -> Result<Credential, IngestionError> {
        let response = self
            .endpoint
            .exchange_code(code)
            .map_err(|e| match e {
                SpotifyError::Unreachable(msg) => IngestionError::UpstreamUnreachable(msg),
                other => IngestionError::CredentialRefreshFailed(other.to_string()),
            })?;
        let credential = Self::credential_from_response(response, None)?;
        self.persist(&credential)?;
        info!("Stored new credential, valid until {}", credential.expires_at);
        Ok(credential)
    }

    /// Stores a refresh token obtained elsewhere. The next token request refreshes it.
    pub fn set_refresh_token(&self, refresh_token: &str) -> Result<(), IngestionError> {
        self.persist(&Credential {
            access_token: String::new(),
            refresh_token: refresh_token.to_string(),
            token_type: "Bearer".to_string(),
            expires_at: DateTime::<Utc>::default(),
        })
    }

    /// Removes the credential. Returns whether one was present.
    pub fn logout(&self) -> Result<bool, IngestionError> {
        self.store
            .clear_credential()
            .map_err(|e| IngestionError::StoreUnavailable(format!("{:#}", e)))
    }

    pub fn status(&self) -> Result<CredentialStatus, IngestionError> {
        Ok(match self.load()? {
            None => CredentialStatus::Missing,
            Some(credential) => CredentialStatus::Present {
                expired: credential.expires_at <= Utc::now(),
                token_type: credential.token_type,
                expires_at: credential.expires_at,
            },
        })
    }
}
