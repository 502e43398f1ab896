use sqlx::PgPool;
use tracing::{error, warn};

const WARN_UTILIZATION_PCT: f64 = 80.0;
const ERROR_UTILIZATION_PCT: f64 = 95.0;

/// Monitor del pool de conexiones a la base de datos.
///
/// Muestrea la utilizacion cada 30 segundos (el intervalo lo pone el
/// scheduler de main): advertencia al 80% y error al 95%, para detectar
/// fugas de conexiones o un pool subdimensionado antes de que el servicio
/// empiece a rechazar operaciones.
pub struct PoolMonitorJob {
    pool: PgPool,
    max_connections: u32,
}

impl PoolMonitorJob {
    pub fn new(pool: PgPool, max_connections: u32) -> Self {
        Self {
            pool,
            max_connections,
        }
    }

    /// Toma una muestra y loguea segun el umbral alcanzado.
    pub fn sample(&self) {
        if self.max_connections == 0 {
            return;
        }

        let total = self.pool.size();
        let idle = self.pool.num_idle() as u32;
        let in_use = total.saturating_sub(idle);
        let utilization = f64::from(in_use) / f64::from(self.max_connections) * 100.0;

        if utilization >= ERROR_UTILIZATION_PCT {
            error!(
                "Database pool critically saturated: {}/{} connections in use ({:.0}%)",
                in_use, self.max_connections, utilization
            );
        } else if utilization >= WARN_UTILIZATION_PCT {
            warn!(
                "Database pool utilization high: {}/{} connections in use ({:.0}%)",
                in_use, self.max_connections, utilization
            );
        }
    }
}
