use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::domain::error::PaymentError;

// Definimos un error unificado para la API HTTP del servicio de pagos
pub struct ApiError(pub PaymentError);

// Permitimos convertir errores de dominio al ApiError implícitamente
impl From<PaymentError> for ApiError {
    fn from(err: PaymentError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self.0 {
            PaymentError::ValidationError(_) => (StatusCode::BAD_REQUEST, self.0.to_string()),
            // Inexistente e invisible responden identico
            PaymentError::NotFound(_) => (StatusCode::NOT_FOUND, self.0.to_string()),
            PaymentError::AccessDenied(_) => (StatusCode::FORBIDDEN, self.0.to_string()),
            PaymentError::MerchantInactive(_) => (StatusCode::FORBIDDEN, self.0.to_string()),
            PaymentError::PaymentMethodInactive
            | PaymentError::PaymentMethodExpired
            | PaymentError::PaymentMethodNotVerified => {
                (StatusCode::UNPROCESSABLE_ENTITY, self.0.to_string())
            }
            PaymentError::CannotBeCaptured(_)
            | PaymentError::CannotBeVoided(_)
            | PaymentError::CannotBeRefunded(_) => (StatusCode::CONFLICT, self.0.to_string()),
            PaymentError::DuplicateTransaction(_) | PaymentError::DuplicatePaymentMethod => {
                (StatusCode::CONFLICT, self.0.to_string())
            }
            PaymentError::GatewayDeclined { .. } => {
                (StatusCode::PAYMENT_REQUIRED, self.0.to_string())
            }
            PaymentError::GatewayUnavailable(ref e) => {
                tracing::error!("Payment Gateway Error: {}", e);
                // Se oculta el detalle del upstream; el cliente reintenta con
                // la misma llave de idempotencia
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Payment gateway is unavailable, retry with the same idempotency key"
                        .to_string(),
                )
            }
            PaymentError::CircuitOpen => {
                (StatusCode::SERVICE_UNAVAILABLE, self.0.to_string())
            }
            PaymentError::RepositoryError(ref e) => {
                tracing::error!("Database Repository Error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            PaymentError::SecretError(ref e) => {
                tracing::error!("Secret Resolution Error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "status": "error",
            "message": error_message,
        }));

        (status, body).into_response()
    }
}
