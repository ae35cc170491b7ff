//! Credential store — per-user provider configurations.
//!
//! The gateway depends only on the [`CredentialStore`] trait. The bundled
//! [`InMemoryCredentialStore`] keeps everything in memory and can be
//! persisted to a JSON file, which is what the CLI uses.

use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::StoreError;
use crate::types::{CredentialId, ProviderConfig, UserId};

/// Source of stored provider configurations.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// The user's preferred configuration: most recently used, else most
    /// recently added. `None` when the user has none.
    async fn fetch_config_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Option<ProviderConfig>, StoreError>;

    /// A specific configuration, only if it belongs to `user_id`.
    async fn fetch_config(
        &self,
        user_id: UserId,
        config_id: CredentialId,
    ) -> Result<Option<ProviderConfig>, StoreError>;

    /// Record that a configuration was just used for a generation.
    async fn mark_used(&self, user_id: UserId, config_id: CredentialId) -> Result<(), StoreError>;
}

/// Mask an API key for display: first four and last four characters.
/// Keys of eight characters or fewer are masked entirely.
pub fn mask_api_key(plain: &str) -> String {
    let chars: Vec<char> = plain.chars().collect();
    let n = chars.len();
    if n <= 8 {
        return "***".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[n - 4..].iter().collect();
    format!("{head}***{tail}")
}

// ─────────────────────────────────────────────
// InMemoryCredentialStore
// ─────────────────────────────────────────────

/// In-memory store, optionally backed by a JSON file.
#[derive(Debug, Default)]
pub struct InMemoryCredentialStore {
    configs: RwLock<Vec<ProviderConfig>>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a store with existing configurations (ids are kept as given).
    pub fn with_configs(configs: Vec<ProviderConfig>) -> Self {
        Self {
            configs: RwLock::new(configs),
        }
    }

    /// Load from a JSON file. A missing file yields an empty store.
    pub async fn load(path: &Path) -> Result<Self, StoreError> {
        if !tokio::fs::try_exists(path).await? {
            debug!("No credential file at {}, starting empty", path.display());
            return Ok(Self::new());
        }
        let content = tokio::fs::read_to_string(path).await?;
        let configs: Vec<ProviderConfig> = if content.trim().is_empty() {
            Vec::new()
        } else {
            serde_json::from_str(&content)?
        };
        debug!(count = configs.len(), "Loaded credentials from {}", path.display());
        Ok(Self::with_configs(configs))
    }

    /// Write all configurations to a JSON file, creating parent directories.
    pub async fn save(&self, path: &Path) -> Result<(), StoreError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = {
            let configs = self.configs.read().await;
            serde_json::to_string_pretty(&*configs)?
        };
        tokio::fs::write(path, json).await?;
        debug!("Credentials saved to {}", path.display());
        Ok(())
    }

    /// Add a configuration for `owner`, assigning the next id.
    ///
    /// Rejects a second entry with the same platform (case-insensitive) and
    /// model for the same owner.
    pub async fn add(
        &self,
        owner: UserId,
        platform: &str,
        encrypted_api_key: String,
        base_url: Option<String>,
        model_name: Option<String>,
    ) -> Result<ProviderConfig, StoreError> {
        let mut configs = self.configs.write().await;

        let candidate = ProviderConfig::new(CredentialId(0), owner, platform.trim(), encrypted_api_key)
            .with_base_url(base_url)
            .with_model(model_name);

        let duplicate = configs.iter().any(|c| {
            c.owner == owner
                && c.platform.eq_ignore_ascii_case(&candidate.platform)
                && c.model_name == candidate.model_name
        });
        if duplicate {
            return Err(StoreError::Duplicate {
                platform: candidate.platform,
                model: candidate
                    .model_name
                    .unwrap_or_else(|| "default model".to_string()),
            });
        }

        let next_id = configs.iter().map(|c| c.id.0).max().unwrap_or(0) + 1;
        let config = ProviderConfig {
            id: CredentialId(next_id),
            ..candidate
        };
        configs.push(config.clone());
        info!(user_id = %owner, config_id = next_id, platform = %config.platform, "Credential added");
        Ok(config)
    }

    /// Remove one of `owner`'s configurations.
    pub async fn remove(&self, owner: UserId, config_id: CredentialId) -> Result<(), StoreError> {
        let mut configs = self.configs.write().await;
        let before = configs.len();
        configs.retain(|c| !(c.owner == owner && c.id == config_id));
        if configs.len() == before {
            return Err(StoreError::NotFound(config_id));
        }
        info!(user_id = %owner, config_id = %config_id, "Credential removed");
        Ok(())
    }

    /// All of `owner`'s configurations, newest first.
    pub async fn list_for_user(&self, owner: UserId) -> Vec<ProviderConfig> {
        let configs = self.configs.read().await;
        let mut owned: Vec<ProviderConfig> =
            configs.iter().filter(|c| c.owner == owner).cloned().collect();
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        owned
    }

    /// Number of stored configurations, all users.
    pub async fn len(&self) -> usize {
        self.configs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.configs.read().await.is_empty()
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn fetch_config_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Option<ProviderConfig>, StoreError> {
        let configs = self.configs.read().await;
        let owned: Vec<&ProviderConfig> = configs.iter().filter(|c| c.owner == user_id).collect();

        let recently_used = owned
            .iter()
            .filter(|c| c.last_used_at.is_some())
            .max_by(|a, b| a.last_used_at.cmp(&b.last_used_at).then(a.id.cmp(&b.id)));

        let preferred = recently_used.or_else(|| {
            owned
                .iter()
                .max_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)))
        });

        Ok(preferred.map(|c| (*c).clone()))
    }

    async fn fetch_config(
        &self,
        user_id: UserId,
        config_id: CredentialId,
    ) -> Result<Option<ProviderConfig>, StoreError> {
        let configs = self.configs.read().await;
        Ok(configs
            .iter()
            .find(|c| c.owner == user_id && c.id == config_id)
            .cloned())
    }

    async fn mark_used(&self, user_id: UserId, config_id: CredentialId) -> Result<(), StoreError> {
        let mut configs = self.configs.write().await;
        let config = configs
            .iter_mut()
            .find(|c| c.owner == user_id && c.id == config_id)
            .ok_or(StoreError::NotFound(config_id))?;
        config.last_used_at = Some(Utc::now());
        Ok(())
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
