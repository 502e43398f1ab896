use crate::domain::error::PaymentError;
use async_trait::async_trait;

// Port para la resolucion de secretos de comercio.
//
// El dominio solo conoce este contrato; el backend concreto (variables de
// entorno, KV en la nube, vault remoto) es un detalle de infraestructura.
#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn get_secret(&self, path: &str) -> Result<String, PaymentError>;
}
