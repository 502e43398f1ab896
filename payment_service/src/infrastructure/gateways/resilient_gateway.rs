use crate::domain::error::PaymentError;
use crate::domain::gateways::{GatewayRequest, GatewayResponse, PaymentGateway};
use crate::infrastructure::gateways::circuit_breaker::CircuitBreaker;
use async_trait::async_trait;
use std::cmp::min;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

const INITIAL_BACKOFF_MS: u64 = 250;
const MAXIMUM_BACKOFF_MS: u64 = 8_000;

/// Espera exponencial entre intentos: 250 ms, 500 ms, 1 s, ... con tope.
fn backoff_delay(attempt: u32) -> Duration {
    let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
    let wait_ms = INITIAL_BACKOFF_MS.saturating_mul(factor);
    Duration::from_millis(min(wait_ms, MAXIMUM_BACKOFF_MS))
}

/// Decorador de resiliencia sobre cualquier transporte del Gateway.
///
/// Reintenta solo fallas de transporte: un rechazo del Gateway es una
/// respuesta valida y cierra el ciclo en el primer intento. Cada intento
/// lleva su propio deadline y las esperas entre intentos son awaits
/// normales, de modo que cancelar el request del llamador (drop del future)
/// desbloquea de inmediato en cualquier punto de suspension.
pub struct ResilientPaymentGateway {
    transport: Arc<dyn PaymentGateway>,
    breaker: CircuitBreaker,
    max_attempts: u32,
    attempt_timeout: Duration,
}

impl ResilientPaymentGateway {
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
    pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(30);

    pub fn new(transport: Arc<dyn PaymentGateway>) -> Self {
        Self::with_policy(
            transport,
            Self::DEFAULT_MAX_ATTEMPTS,
            Self::DEFAULT_ATTEMPT_TIMEOUT,
            CircuitBreaker::default(),
        )
    }

    pub fn with_policy(
        transport: Arc<dyn PaymentGateway>,
        max_attempts: u32,
        attempt_timeout: Duration,
        breaker: CircuitBreaker,
    ) -> Self {
        Self {
            transport,
            breaker,
            max_attempts,
            attempt_timeout,
        }
    }
}

#[async_trait]
impl PaymentGateway for ResilientPaymentGateway {
    async fn process(&self, request: GatewayRequest) -> Result<GatewayResponse, PaymentError> {
        self.breaker.try_acquire()?;

        let mut last_error = PaymentError::GatewayUnavailable("no attempts made".to_string());

        for attempt in 1..=self.max_attempts {
            let outcome =
                tokio::time::timeout(self.attempt_timeout, self.transport.process(request.clone()))
                    .await;

            match outcome {
                Ok(Ok(response)) => {
                    // Aprobada o rechazada, el Gateway respondio: el circuito
                    // ve un exito y el ciclo de reintentos termina
                    self.breaker.record_success();
                    return Ok(response);
                }
                Ok(Err(e)) => {
                    warn!(
                        "Gateway attempt {}/{} failed for tran_nbr {}: {}",
                        attempt, self.max_attempts, request.tran_nbr, e
                    );
                    last_error = e;
                }
                Err(_) => {
                    warn!(
                        "Gateway attempt {}/{} timed out for tran_nbr {}",
                        attempt, self.max_attempts, request.tran_nbr
                    );
                    last_error = PaymentError::GatewayUnavailable(format!(
                        "attempt timed out after {}s",
                        self.attempt_timeout.as_secs()
                    ));
                }
            }

            if attempt < self.max_attempts {
                tokio::time::sleep(backoff_delay(attempt)).await;
            }
        }

        self.breaker.record_failure();
        Err(match last_error {
            PaymentError::GatewayUnavailable(msg) => PaymentError::GatewayUnavailable(msg),
            other => PaymentError::GatewayUnavailable(other.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::PaymentMethodType;
    use crate::domain::gateways::{card_entry, tran_group, GatewayOperation};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn request() -> GatewayRequest {
        GatewayRequest {
            cust_nbr: "9001".to_string(),
            merch_nbr: "900300".to_string(),
            dba_nbr: "1".to_string(),
            terminal_nbr: "3".to_string(),
            shared_secret: "secret".to_string(),
            operation: GatewayOperation::Sale,
            amount: "25.00".to_string(),
            method_kind: PaymentMethodType::CREDIT_CARD,
            auth_guid: Some("TOKEN".to_string()),
            original_auth_guid: None,
            tran_nbr: "0123456789".to_string(),
            tran_group: tran_group::SALE.to_string(),
            card_entry_method: card_entry::TOKEN_ON_FILE.to_string(),
            customer_id: None,
            card: None,
            ach: None,
            billing: None,
        }
    }

    /// Transporte que falla N veces antes de responder.
    struct FlakyTransport {
        calls: AtomicU32,
        failures_before_success: u32,
        response: GatewayResponse,
    }

    #[async_trait]
    impl PaymentGateway for FlakyTransport {
        async fn process(&self, _request: GatewayRequest) -> Result<GatewayResponse, PaymentError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures_before_success {
                Err(PaymentError::GatewayUnavailable("connection reset".to_string()))
            } else {
                Ok(self.response.clone())
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_transport_failures_until_success() {
        let transport = Arc::new(FlakyTransport {
            calls: AtomicU32::new(0),
            failures_before_success: 2,
            response: GatewayResponse {
                auth_resp: "00".to_string(),
                ..Default::default()
            },
        });
        let gateway = ResilientPaymentGateway::new(transport.clone());

        let response = gateway.process(request()).await.unwrap();

        assert!(response.is_approved());
        assert_eq!(transport.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_decline_is_not_retried() {
        let transport = Arc::new(FlakyTransport {
            calls: AtomicU32::new(0),
            failures_before_success: 0,
            response: GatewayResponse {
                auth_resp: "05".to_string(),
                auth_resp_text: "DECLINE".to_string(),
                ..Default::default()
            },
        });
        let gateway = ResilientPaymentGateway::new(transport.clone());

        let response = gateway.process(request()).await.unwrap();

        assert!(!response.is_approved());
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_surface_gateway_unavailable() {
        let transport = Arc::new(FlakyTransport {
            calls: AtomicU32::new(0),
            failures_before_success: u32::MAX,
            response: GatewayResponse::default(),
        });
        let gateway = ResilientPaymentGateway::new(transport.clone());

        let result = gateway.process(request()).await;

        assert!(matches!(result, Err(PaymentError::GatewayUnavailable(_))));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_circuit_opens_after_repeated_call_failures() {
        let transport = Arc::new(FlakyTransport {
            calls: AtomicU32::new(0),
            failures_before_success: u32::MAX,
            response: GatewayResponse::default(),
        });
        let gateway = ResilientPaymentGateway::new(transport.clone());

        // Cinco llamadas agotadas abren el circuito
        for _ in 0..5 {
            let _ = gateway.process(request()).await;
        }

        let result = gateway.process(request()).await;
        assert_eq!(result.unwrap_err(), PaymentError::CircuitOpen);
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        assert_eq!(backoff_delay(1), Duration::from_millis(250));
        assert_eq!(backoff_delay(2), Duration::from_millis(500));
        assert_eq!(backoff_delay(3), Duration::from_millis(1000));
        assert_eq!(backoff_delay(20), Duration::from_millis(8000));
    }
}
