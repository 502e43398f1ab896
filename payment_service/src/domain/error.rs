use crate::domain::types::{MerchantId, TransactionId};
use thiserror::Error;

/// Error unificado del dominio de pagos.
///
/// Los rechazos del Gateway NO son errores: una transaccion rechazada se
/// devuelve como resultado exitoso con estado DECLINED. `GatewayDeclined`
/// existe solo para los flujos de almacenamiento de metodos de pago, donde
/// no hay transaccion que devolver al cliente.
#[derive(Error, Debug, PartialEq)]
pub enum PaymentError {
    #[error("Validation failed: {0}")]
    ValidationError(String),

    // Se usa tanto para entidades inexistentes como para entidades fuera del
    // alcance del llamador: ambas respuestas deben ser indistinguibles.
    #[error("{0} not found")]
    NotFound(String),

    #[error("Merchant {0} is not active")]
    MerchantInactive(MerchantId),

    #[error("Payment method is not active")]
    PaymentMethodInactive,

    #[error("Payment method is expired")]
    PaymentMethodExpired,

    #[error("Payment method is not verified")]
    PaymentMethodNotVerified,

    #[error("Transaction cannot be captured: {0}")]
    CannotBeCaptured(String),

    #[error("Transaction cannot be voided: {0}")]
    CannotBeVoided(String),

    #[error("Transaction cannot be refunded: {0}")]
    CannotBeRefunded(String),

    // Interno: el pipeline lo convierte en exito idempotente releyendo la fila
    #[error("Transaction {0} already exists")]
    DuplicateTransaction(TransactionId),

    // Interno: el fingerprint ya existe; el flujo de almacenamiento lo
    // convierte en exito idempotente devolviendo el metodo existente
    #[error("Payment method already exists for this account")]
    DuplicatePaymentMethod,

    #[error("Gateway declined the request ({code}): {text}")]
    GatewayDeclined { code: String, text: String },

    #[error("Gateway unavailable: {0}")]
    GatewayUnavailable(String),

    #[error("Gateway circuit breaker is open")]
    CircuitOpen,

    #[error("Payment repository error: {0}")]
    RepositoryError(String),

    #[error("Secret resolution failed: {0}")]
    SecretError(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),
}
