pub mod audit_repository;
pub mod merchant_repository;
pub mod models;
pub mod payment_method_repository;
pub mod transaction_repository;

use crate::domain::error::PaymentError;
use std::future::Future;
use std::time::Duration;

// Niveles de timeout por forma de consulta. El repositorio elige el nivel;
// excederlo se reporta como error de repositorio reintentable.

/// Busquedas de una sola fila.
pub const SIMPLE_QUERY_TIMEOUT: Duration = Duration::from_secs(2);
/// Arboles recursivos y agregados con joins.
pub const COMPLEX_QUERY_TIMEOUT: Duration = Duration::from_secs(5);
/// Listados paginados con conteo total.
pub const REPORT_QUERY_TIMEOUT: Duration = Duration::from_secs(30);

pub(crate) async fn with_timeout<T>(
    limit: Duration,
    label: &str,
    fut: impl Future<Output = Result<T, PaymentError>>,
) -> Result<T, PaymentError> {
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(PaymentError::RepositoryError(format!(
            "query '{}' exceeded the {}s timeout",
            label,
            limit.as_secs()
        ))),
    }
}

pub(crate) fn map_db_err(e: sqlx::Error) -> PaymentError {
    PaymentError::RepositoryError(e.to_string())
}
