use std::sync::Arc;

use crate::error::StorageResult;
use crate::kv::KeyValueStore;

pub const USER_ID_KEY: &str = "nexus.user_id";
pub const USER_NAME_KEY: &str = "nexus.user_name";

/// Durable identity handed out by the gateway's user registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity {
    pub user_id: String,
    pub user_name: String,
}

impl Identity {
    pub fn new(user_id: impl Into<String>, user_name: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            user_name: user_name.into(),
        }
    }
}

/// Persists one [`Identity`] as a pair of keys in a [`KeyValueStore`].
#[derive(Clone)]
pub struct IdentityStore {
    store: Arc<dyn KeyValueStore>,
}

impl IdentityStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Returns the stored identity, treating any failure or half-written pair as absent.
    pub fn load(&self) -> Option<Identity> {
        let values = match self.store.get_entries(&[USER_ID_KEY, USER_NAME_KEY]) {
            Ok(values) => values,
            Err(error) => {
                tracing::warn!(error = %error, "failed to read stored identity, treating as absent");
                return None;
            }
        };

        let mut values = values
            .into_iter()
            .map(|value| value.filter(|value| !value.trim().is_empty()));
        let user_id = values.next().flatten()?;
        let user_name = values.next().flatten()?;
        Some(Identity { user_id, user_name })
    }

    pub fn save(&self, identity: &Identity) -> StorageResult<()> {
        self.store.set_entries(&[
            (USER_ID_KEY, identity.user_id.as_str()),
            (USER_NAME_KEY, identity.user_name.as_str()),
        ])?;
        tracing::info!(user_id = %identity.user_id, "stored identity");
        Ok(())
    }

    pub fn clear(&self) -> StorageResult<()> {
        self.store.remove_entries(&[USER_ID_KEY, USER_NAME_KEY])?;
        tracing::info!("cleared stored identity");
        Ok(())
    }
}
