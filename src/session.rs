use std::sync::Arc;

use thiserror::Error;

use crate::{
    api::{ApiError, InstanceApi},
    store::{CredentialStore, StoreError},
};

/// Dashboard-side operations over the stored session credential.
pub struct Session {
    api: Arc<dyn InstanceApi>,
    credentials: Arc<dyn CredentialStore>,
}

/// Errors surfaced by session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("token must not be empty")]
    EmptyToken,
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl Session {
    pub fn new(api: Arc<dyn InstanceApi>, credentials: Arc<dyn CredentialStore>) -> Self {
        Self { api, credentials }
    }

    /// Returns the stored credential, if any.
    pub async fn token(&self) -> Option<String> {
        self.credentials.load().await
    }

    /// Validates a token against the gateway and stores it on success.
    pub async fn login(&self, token: &str) -> Result<(), SessionError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(SessionError::EmptyToken);
        }

        self.api.connection_status(token).await?;
        self.credentials.save(token).await?;

        Ok(())
    }

    /// Disconnects the instance, keeping the stored credential.
    pub async fn disconnect(&self) -> Result<(), SessionError> {
        let token = self.credentials.load().await.ok_or(SessionError::EmptyToken)?;
        self.api.disconnect(&token).await?;

        Ok(())
    }

    /// Clears the stored credential.
    pub async fn logout(&self) -> Result<(), SessionError> {
        self.credentials.clear().await?;

        Ok(())
    }
}
