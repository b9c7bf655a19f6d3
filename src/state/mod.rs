use std::sync::Arc;

use crate::{
    config::Config,
    upstream::{EvolutionClient, UpstreamError},
};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub upstream: Arc<EvolutionClient>,
}

impl AppState {
    /// Builds the app state and its upstream client.
    pub fn new(config: Config) -> Result<Self, UpstreamError> {
        let upstream = EvolutionClient::new(config.upstream_url.clone())?;

        Ok(Self {
            config: Arc::new(config),
            upstream: Arc::new(upstream),
        })
    }
}
