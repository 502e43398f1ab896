use crate::domain::error::PaymentError;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
struct BreakerInner {
    state: BreakerState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

/// Circuit breaker en memoria, uno por instancia de cliente del Gateway.
///
/// Cinco fallas consecutivas abren el circuito; mientras esta abierto toda
/// llamada falla rapido con `CircuitOpen`. Pasado el timeout se admite una
/// sola sonda (half-open): si responde, el circuito cierra; si falla,
/// reabre.
pub struct CircuitBreaker {
    inner: Mutex<BreakerInner>,
    failure_threshold: u32,
    open_timeout: Duration,
}

impl CircuitBreaker {
    pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;
    pub const DEFAULT_OPEN_TIMEOUT: Duration = Duration::from_secs(30);

    pub fn new(failure_threshold: u32, open_timeout: Duration) -> Self {
        Self {
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                opened_at: None,
            }),
            failure_threshold,
            open_timeout,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BreakerInner> {
        // Un lock envenenado solo significa que otro hilo entro en panico
        // con el guard tomado; el estado sigue siendo usable
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Decide si la llamada puede salir. La transicion Open -> HalfOpen
    /// admite exactamente una sonda; las demas llamadas siguen fallando
    /// rapido hasta que la sonda resuelva.
    pub fn try_acquire(&self) -> Result<(), PaymentError> {
        let mut inner = self.lock();
        match inner.state {
            BreakerState::Closed => Ok(()),
            BreakerState::Open => {
                let elapsed = inner
                    .opened_at
                    .map(|t| t.elapsed())
                    .unwrap_or(Duration::ZERO);
                if elapsed >= self.open_timeout {
                    inner.state = BreakerState::HalfOpen;
                    Ok(())
                } else {
                    Err(PaymentError::CircuitOpen)
                }
            }
            BreakerState::HalfOpen => Err(PaymentError::CircuitOpen),
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.lock();
        inner.state = BreakerState::Closed;
        inner.consecutive_failures = 0;
        inner.opened_at = None;
    }

    pub fn record_failure(&self) {
        let mut inner = self.lock();
        inner.consecutive_failures += 1;
        if inner.state == BreakerState::HalfOpen
            || inner.consecutive_failures >= self.failure_threshold
        {
            inner.state = BreakerState::Open;
            inner.opened_at = Some(Instant::now());
        }
    }

    pub fn state(&self) -> BreakerState {
        self.lock().state
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(
            Self::DEFAULT_FAILURE_THRESHOLD,
            Self::DEFAULT_OPEN_TIMEOUT,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_opens_after_consecutive_failures() {
        let breaker = CircuitBreaker::new(5, Duration::from_secs(30));

        for _ in 0..4 {
            breaker.record_failure();
            assert_eq!(breaker.state(), BreakerState::Closed);
        }

        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Open);
        assert_eq!(breaker.try_acquire(), Err(PaymentError::CircuitOpen));
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_resets_the_failure_count() {
        let breaker = CircuitBreaker::new(5, Duration::from_secs(30));

        for _ in 0..4 {
            breaker.record_failure();
        }
        breaker.record_success();
        breaker.record_failure();

        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_admits_a_single_probe() {
        let breaker = CircuitBreaker::new(1, Duration::from_secs(30));
        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Open);

        tokio::time::advance(Duration::from_secs(31)).await;

        // La primera llamada pasa como sonda; la segunda falla rapido
        assert!(breaker.try_acquire().is_ok());
        assert_eq!(breaker.state(), BreakerState::HalfOpen);
        assert_eq!(breaker.try_acquire(), Err(PaymentError::CircuitOpen));
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_success_closes_and_probe_failure_reopens() {
        let breaker = CircuitBreaker::new(1, Duration::from_secs(30));
        breaker.record_failure();

        tokio::time::advance(Duration::from_secs(31)).await;
        breaker.try_acquire().unwrap();
        breaker.record_success();
        assert_eq!(breaker.state(), BreakerState::Closed);

        breaker.record_failure();
        tokio::time::advance(Duration::from_secs(31)).await;
        breaker.try_acquire().unwrap();
        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stays_open_before_the_timeout() {
        let breaker = CircuitBreaker::new(1, Duration::from_secs(30));
        breaker.record_failure();

        tokio::time::advance(Duration::from_secs(29)).await;
        assert_eq!(breaker.try_acquire(), Err(PaymentError::CircuitOpen));
    }
}
