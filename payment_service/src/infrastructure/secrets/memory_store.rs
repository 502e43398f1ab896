use crate::domain::error::PaymentError;
use crate::domain::secrets::SecretStore;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

/// Backend de secretos en memoria para desarrollo y tests.
pub struct InMemorySecretStore {
    secrets: RwLock<HashMap<String, String>>,
}

impl InMemorySecretStore {
    pub fn new() -> Self {
        Self {
            secrets: RwLock::new(HashMap::new()),
        }
    }

    pub fn insert(&self, path: &str, value: &str) {
        let mut secrets = self.secrets.write().unwrap_or_else(|e| e.into_inner());
        secrets.insert(path.to_string(), value.to_string());
    }
}

impl Default for InMemorySecretStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SecretStore for InMemorySecretStore {
    async fn get_secret(&self, path: &str) -> Result<String, PaymentError> {
        let secrets = self.secrets.read().unwrap_or_else(|e| e.into_inner());
        secrets
            .get(path)
            .cloned()
            .ok_or_else(|| PaymentError::SecretError(format!("secret '{}' is not configured", path)))
    }
}
