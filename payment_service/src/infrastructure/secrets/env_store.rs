use crate::domain::error::PaymentError;
use crate::domain::secrets::SecretStore;
use async_trait::async_trait;

/// Backend de secretos sobre variables de entorno.
///
/// Un `secret_path` como `merchants/acme/gateway` se resuelve a la variable
/// `SECRET_MERCHANTS_ACME_GATEWAY`. Pensado para desarrollo y despliegues
/// donde el orquestador inyecta los secretos como entorno; los backends de
/// vault remoto implementan el mismo port.
pub struct EnvSecretStore {
    prefix: String,
}

impl EnvSecretStore {
    pub fn new() -> Self {
        Self {
            prefix: "SECRET".to_string(),
        }
    }

    fn var_name(&self, path: &str) -> String {
        let normalized: String = path
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_uppercase()
                } else {
                    '_'
                }
            })
            .collect();
        format!("{}_{}", self.prefix, normalized)
    }
}

impl Default for EnvSecretStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SecretStore for EnvSecretStore {
    async fn get_secret(&self, path: &str) -> Result<String, PaymentError> {
        let var = self.var_name(path);
        std::env::var(&var)
            .map_err(|_| PaymentError::SecretError(format!("secret '{}' is not configured", path)))
    }
}
