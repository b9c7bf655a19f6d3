use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;
use tokio::{fs, sync::RwLock};

use crate::onboarding::OnboardingState;

/// Persistence contract for the wizard record.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Loads the saved record. Corrupt or missing data loads as absent.
    async fn load(&self) -> Option<OnboardingState>;

    /// Saves the full record.
    async fn save(&self, state: &OnboardingState) -> Result<(), StoreError>;

    /// Removes the saved record.
    async fn clear(&self) -> Result<(), StoreError>;
}

/// Persistence contract for the session credential.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn load(&self) -> Option<String>;
    async fn save(&self, token: &str) -> Result<(), StoreError>;
    async fn clear(&self) -> Result<(), StoreError>;
}

/// JSON-file-backed wizard record store.
pub struct JsonStateStore {
    path: PathBuf,
}

impl JsonStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl StateStore for JsonStateStore {
    async fn load(&self) -> Option<OnboardingState> {
        let raw = fs::read_to_string(&self.path).await.ok()?;
        serde_json::from_str(&raw).ok()
    }

    async fn save(&self, state: &OnboardingState) -> Result<(), StoreError> {
        let encoded = serde_json::to_string(state)?;
        fs::write(&self.path, encoded).await?;
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        remove_if_present(&self.path).await
    }
}

/// Plain-text credential store.
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn load(&self) -> Option<String> {
        let raw = fs::read_to_string(&self.path).await.ok()?;
        let token = raw.trim();
        if token.is_empty() {
            return None;
        }

        Some(token.to_owned())
    }

    async fn save(&self, token: &str) -> Result<(), StoreError> {
        fs::write(&self.path, token).await?;
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        remove_if_present(&self.path).await
    }
}

async fn remove_if_present(path: &PathBuf) -> Result<(), StoreError> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(error) => Err(StoreError::Io(error)),
    }
}

/// In-memory wizard record store used by tests and lightweight local runs.
#[derive(Default)]
pub struct InMemoryStateStore {
    state: RwLock<Option<OnboardingState>>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn load(&self) -> Option<OnboardingState> {
        self.state.read().await.clone()
    }

    async fn save(&self, state: &OnboardingState) -> Result<(), StoreError> {
        *self.state.write().await = Some(state.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        *self.state.write().await = None;
        Ok(())
    }
}

/// In-memory credential store used by tests.
#[derive(Default)]
pub struct InMemoryCredentialStore {
    token: RwLock<Option<String>>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn load(&self) -> Option<String> {
        self.token.read().await.clone()
    }

    async fn save(&self, token: &str) -> Result<(), StoreError> {
        *self.token.write().await = Some(token.to_owned());
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        *self.token.write().await = None;
        Ok(())
    }
}

/// Errors exposed by store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),
}
