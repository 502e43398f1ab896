use crate::domain::error::PaymentError;
use crate::domain::secrets::SecretStore;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

struct CacheEntry {
    value: String,
    stored_at: Instant,
}

/// Cache TTL delante de cualquier backend de secretos.
///
/// Los misses concurrentes de una misma llave se coalescen detras de un
/// mutex por llave: solo una tarea viaja al backend y las demas esperan su
/// resultado en cache. Las fallas no se cachean, el siguiente intento
/// vuelve al backend.
pub struct CachedSecretResolver {
    inner: Arc<dyn SecretStore>,
    ttl: Duration,
    entries: Mutex<HashMap<String, CacheEntry>>,
    key_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl CachedSecretResolver {
    pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

    pub fn new(inner: Arc<dyn SecretStore>) -> Self {
        Self::with_ttl(inner, Self::DEFAULT_TTL)
    }

    pub fn with_ttl(inner: Arc<dyn SecretStore>, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            entries: Mutex::new(HashMap::new()),
            key_locks: Mutex::new(HashMap::new()),
        }
    }

    async fn fresh_value(&self, path: &str) -> Option<String> {
        let entries = self.entries.lock().await;
        entries
            .get(path)
            .filter(|entry| entry.stored_at.elapsed() < self.ttl)
            .map(|entry| entry.value.clone())
    }

    async fn key_lock(&self, path: &str) -> Arc<Mutex<()>> {
        let mut locks = self.key_locks.lock().await;
        locks
            .entry(path.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

#[async_trait]
impl SecretStore for CachedSecretResolver {
    async fn get_secret(&self, path: &str) -> Result<String, PaymentError> {
        if let Some(value) = self.fresh_value(path).await {
            return Ok(value);
        }

        let lock = self.key_lock(path).await;
        let _guard = lock.lock().await;

        // Alguien pudo haber poblado la cache mientras esperabamos el lock
        if let Some(value) = self.fresh_value(path).await {
            return Ok(value);
        }

        let value = self.inner.get_secret(path).await?;

        let mut entries = self.entries.lock().await;
        entries.insert(
            path.to_string(),
            CacheEntry {
                value: value.clone(),
                stored_at: Instant::now(),
            },
        );

        Ok(value)
    }
}
