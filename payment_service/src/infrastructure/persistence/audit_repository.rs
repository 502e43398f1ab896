use crate::domain::error::PaymentError;
use crate::domain::repository::{AuditLogRepository, NewAuditEntry};
use crate::infrastructure::persistence::{map_db_err, with_timeout, SIMPLE_QUERY_TIMEOUT};
use async_trait::async_trait;
use sqlx::PgPool;

/// Bitacora de auditoria sobre PostgreSQL. Solo se inserta, nunca se edita.
pub struct PostgresAuditLogRepository {
    pool: PgPool,
}

impl PostgresAuditLogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditLogRepository for PostgresAuditLogRepository {
    async fn record(&self, entry: NewAuditEntry) -> Result<(), PaymentError> {
        with_timeout(SIMPLE_QUERY_TIMEOUT, "audit_log.record", async {
            sqlx::query(
                r#"
                INSERT INTO audit_log (entity_type, entity_id, action, actor, detail)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(entry.entity_type)
            .bind(entry.entity_id)
            .bind(entry.action)
            .bind(entry.actor)
            .bind(entry.detail)
            .execute(&self.pool)
            .await
            .map_err(map_db_err)?;

            Ok(())
        })
        .await
    }
}
