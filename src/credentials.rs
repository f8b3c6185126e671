//! Credential context shared by every view.
//!
//! Credentials are loaded from storage once at startup, replaced only after
//! a successful live probe, and cleared on logout. Views read them through
//! [`CredentialStore::current`] and pass them explicitly to the Graph client.

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::error::CredentialError;
use crate::graph::GraphClient;
use crate::model::{AccountInfo, Credentials};
use crate::storage::Storage;

#[derive(Clone)]
pub struct CredentialStore {
    storage: Storage,
    current: Arc<RwLock<Option<Credentials>>>,
}

impl CredentialStore {
    /// Create the store, restoring any persisted credentials.
    pub async fn load(storage: Storage) -> Result<Self, CredentialError> {
        let restored = storage.load_credentials().await?;
        if let Some(creds) = &restored {
            info!(account_id = %creds.account_id, "Restored saved credentials");
        }

        Ok(Self {
            storage,
            current: Arc::new(RwLock::new(restored)),
        })
    }

    /// Probe the platform with `credentials` and persist them on success.
    ///
    /// Nothing is stored when the probe fails; the previous credentials, if
    /// any, stay active.
    pub async fn submit(
        &self,
        credentials: Credentials,
        client: &GraphClient,
    ) -> Result<AccountInfo, CredentialError> {
        if credentials.is_blank() {
            return Err(CredentialError::Blank);
        }

        let account = match client.get_account(&credentials).await {
            Ok(account) => account,
            Err(e) => {
                warn!(account_id = %credentials.account_id, error = %e, "Credential probe failed");
                return Err(CredentialError::ProbeFailed(e));
            }
        };

        self.storage.save_credentials(&credentials).await?;
        info!(
            account_id = %credentials.account_id,
            account_name = account.name.as_deref().unwrap_or_default(),
            "Credentials saved"
        );

        *self.current.write().await = Some(credentials);
        Ok(account)
    }

    /// The active credentials.
    pub async fn current(&self) -> Result<Credentials, CredentialError> {
        self.current
            .read()
            .await
            .clone()
            .ok_or(CredentialError::Missing)
    }

    pub async fn is_connected(&self) -> bool {
        self.current.read().await.is_some()
    }

    /// Forget the credentials, both in memory and on disk.
    pub async fn logout(&self) -> Result<(), CredentialError> {
        self.storage.clear_credentials().await?;
        *self.current.write().await = None;
        info!("Credentials cleared");
        Ok(())
    }
}
