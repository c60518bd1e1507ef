use crate::app_lib::{ApiClient, AppConfig};
use crate::features::auth::{AuthStateMachine, FileStorage, PersistedSessionStore, SharedAuth};
use anyhow::{Context, Result};

/// Settings shared by every subcommand.
#[derive(Debug, Clone)]
pub struct GlobalArgs {
    pub config: AppConfig,
}

impl GlobalArgs {
    #[must_use]
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn api(&self) -> Result<ApiClient> {
        ApiClient::new(&self.config).context("Could not build the HTTP client")
    }

    /// Auth state machine backed by the session file, already restored.
    pub async fn restored_auth(&self) -> SharedAuth {
        let storage = FileStorage::new(self.config.session_file.clone());
        let auth = AuthStateMachine::new(PersistedSessionStore::new(storage)).shared();
        auth.lock().await.restore();
        auth
    }
}
