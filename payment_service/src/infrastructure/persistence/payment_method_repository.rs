use crate::domain::entities::{NewPaymentMethod, PaymentMethod};
use crate::domain::error::PaymentError;
use crate::domain::repository::PaymentMethodRepository;
use crate::domain::types::{MerchantId, PaymentMethodId, TransactionId};
use crate::infrastructure::persistence::models::PaymentMethodModel;
use crate::infrastructure::persistence::{map_db_err, with_timeout, SIMPLE_QUERY_TIMEOUT};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

/// Repositorio de metodos de pago sobre PostgreSQL.
pub struct PostgresPaymentMethodRepository {
    pool: PgPool,
}

impl PostgresPaymentMethodRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PaymentMethodRepository for PostgresPaymentMethodRepository {
    async fn create(&self, method: NewPaymentMethod) -> Result<PaymentMethod, PaymentError> {
        with_timeout(SIMPLE_QUERY_TIMEOUT, "payment_methods.create", async {
            let model = sqlx::query_as::<_, PaymentMethodModel>(
                r#"
                INSERT INTO payment_methods (
                    id, merchant_id, customer_id, method_type, token, last_four,
                    card_brand, card_exp_month, card_exp_year, bank_name,
                    account_type, routing_number_hash, is_default, is_verified,
                    verification_status, prenote_transaction_id
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
                RETURNING *
                "#,
            )
            .bind(method.id)
            .bind(method.merchant_id)
            .bind(method.customer_id)
            .bind(method.method_type)
            .bind(method.token)
            .bind(method.last_four)
            .bind(method.card_brand)
            .bind(method.card_exp_month)
            .bind(method.card_exp_year)
            .bind(method.bank_name)
            .bind(method.account_type)
            .bind(method.routing_number_hash)
            .bind(method.is_default)
            .bind(method.is_verified)
            .bind(method.verification_status)
            .bind(method.prenote_transaction_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| match &e {
                sqlx::Error::Database(db) if db.is_unique_violation() => {
                    PaymentError::DuplicatePaymentMethod
                }
                _ => PaymentError::RepositoryError(e.to_string()),
            })?;

            Ok(model.into())
        })
        .await
    }

    async fn find_by_id(
        &self,
        id: PaymentMethodId,
    ) -> Result<Option<PaymentMethod>, PaymentError> {
        with_timeout(SIMPLE_QUERY_TIMEOUT, "payment_methods.find_by_id", async {
            let model_opt = sqlx::query_as::<_, PaymentMethodModel>(
                r#"SELECT * FROM payment_methods WHERE id = $1"#,
            )
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_db_err)?;

            Ok(model_opt.map(Into::into))
        })
        .await
    }

    async fn find_by_fingerprint(
        &self,
        merchant_id: MerchantId,
        customer_id: String,
        routing_number_hash: String,
        last_four: String,
    ) -> Result<Option<PaymentMethod>, PaymentError> {
        with_timeout(SIMPLE_QUERY_TIMEOUT, "payment_methods.find_by_fingerprint", async {
            let model_opt = sqlx::query_as::<_, PaymentMethodModel>(
                r#"
                SELECT * FROM payment_methods
                WHERE merchant_id = $1
                  AND customer_id = $2
                  AND routing_number_hash = $3
                  AND last_four = $4
                ORDER BY created_at DESC
                LIMIT 1
                "#,
            )
            .bind(merchant_id)
            .bind(customer_id)
            .bind(routing_number_hash)
            .bind(last_four)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_db_err)?;

            Ok(model_opt.map(Into::into))
        })
        .await
    }

    async fn list_by_customer(
        &self,
        merchant_id: MerchantId,
        customer_id: String,
        include_inactive: bool,
    ) -> Result<Vec<PaymentMethod>, PaymentError> {
        with_timeout(SIMPLE_QUERY_TIMEOUT, "payment_methods.list_by_customer", async {
            let models = sqlx::query_as::<_, PaymentMethodModel>(
                r#"
                SELECT * FROM payment_methods
                WHERE merchant_id = $1
                  AND customer_id = $2
                  AND (is_active OR $3)
                ORDER BY is_default DESC, created_at DESC
                "#,
            )
            .bind(merchant_id)
            .bind(customer_id)
            .bind(include_inactive)
            .fetch_all(&self.pool)
            .await
            .map_err(map_db_err)?;

            Ok(models.into_iter().map(Into::into).collect())
        })
        .await
    }

    async fn find_default(
        &self,
        merchant_id: MerchantId,
        customer_id: String,
    ) -> Result<Option<PaymentMethod>, PaymentError> {
        with_timeout(SIMPLE_QUERY_TIMEOUT, "payment_methods.find_default", async {
            // Mismo orden que el indice parcial de listado por cliente
            let model_opt = sqlx::query_as::<_, PaymentMethodModel>(
                r#"
                SELECT * FROM payment_methods
                WHERE merchant_id = $1
                  AND customer_id = $2
                  AND is_active
                ORDER BY is_default DESC, created_at DESC
                LIMIT 1
                "#,
            )
            .bind(merchant_id)
            .bind(customer_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_db_err)?;

            Ok(model_opt.map(Into::into))
        })
        .await
    }

    async fn mark_used(&self, id: PaymentMethodId) -> Result<(), PaymentError> {
        with_timeout(SIMPLE_QUERY_TIMEOUT, "payment_methods.mark_used", async {
            sqlx::query(r#"UPDATE payment_methods SET last_used_at = NOW() WHERE id = $1"#)
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(map_db_err)?;

            Ok(())
        })
        .await
    }

    async fn deactivate(&self, id: PaymentMethodId, reason: String) -> Result<(), PaymentError> {
        with_timeout(SIMPLE_QUERY_TIMEOUT, "payment_methods.deactivate", async {
            let result = sqlx::query(
                r#"
                UPDATE payment_methods
                SET is_active = FALSE,
                    deactivation_reason = $2,
                    deactivated_at = COALESCE(deactivated_at, NOW())
                WHERE id = $1
                "#,
            )
            .bind(id)
            .bind(reason)
            .execute(&self.pool)
            .await
            .map_err(map_db_err)?;

            if result.rows_affected() == 0 {
                return Err(PaymentError::NotFound("Payment method".to_string()));
            }

            Ok(())
        })
        .await
    }

    async fn find_pending_ach_verifications(
        &self,
        older_than: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<PaymentMethod>, PaymentError> {
        with_timeout(SIMPLE_QUERY_TIMEOUT, "payment_methods.pending_ach", async {
            let models = sqlx::query_as::<_, PaymentMethodModel>(
                r#"
                SELECT * FROM payment_methods
                WHERE method_type = 'ACH'
                  AND verification_status = 'PENDING'
                  AND is_active
                  AND created_at < $1
                ORDER BY created_at ASC
                LIMIT $2
                "#,
            )
            .bind(older_than)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(map_db_err)?;

            Ok(models.into_iter().map(Into::into).collect())
        })
        .await
    }

    async fn mark_verified(
        &self,
        id: PaymentMethodId,
        verified_at: DateTime<Utc>,
    ) -> Result<(), PaymentError> {
        with_timeout(SIMPLE_QUERY_TIMEOUT, "payment_methods.mark_verified", async {
            // Solo transiciona desde PENDING; repetir la marca es inocuo
            sqlx::query(
                r#"
                UPDATE payment_methods
                SET is_verified = TRUE,
                    verification_status = 'VERIFIED',
                    verified_at = $2
                WHERE id = $1 AND verification_status = 'PENDING'
                "#,
            )
            .bind(id)
            .bind(verified_at)
            .execute(&self.pool)
            .await
            .map_err(map_db_err)?;

            Ok(())
        })
        .await
    }

    async fn mark_verification_failed(
        &self,
        id: PaymentMethodId,
        reason: String,
    ) -> Result<(), PaymentError> {
        with_timeout(SIMPLE_QUERY_TIMEOUT, "payment_methods.mark_failed", async {
            // Un metodo con verificacion fallida no puede quedar activo
            sqlx::query(
                r#"
                UPDATE payment_methods
                SET verification_status = 'FAILED',
                    is_verified = FALSE,
                    verification_failure_reason = $2,
                    is_active = FALSE,
                    deactivation_reason = COALESCE(deactivation_reason, 'verification_failed'),
                    deactivated_at = COALESCE(deactivated_at, NOW())
                WHERE id = $1
                "#,
            )
            .bind(id)
            .bind(reason)
            .execute(&self.pool)
            .await
            .map_err(map_db_err)?;

            Ok(())
        })
        .await
    }

    async fn increment_return_count(
        &self,
        id: PaymentMethodId,
        auto_deactivate_threshold: i32,
    ) -> Result<PaymentMethod, PaymentError> {
        with_timeout(SIMPLE_QUERY_TIMEOUT, "payment_methods.increment_returns", async {
            // Incremento y desactivacion en una sola sentencia para que dos
            // callbacks concurrentes no pierdan conteos
            let model_opt = sqlx::query_as::<_, PaymentMethodModel>(
                r#"
                UPDATE payment_methods
                SET return_count = return_count + 1,
                    is_active = CASE
                        WHEN return_count + 1 >= $2 THEN FALSE
                        ELSE is_active
                    END,
                    deactivation_reason = CASE
                        WHEN return_count + 1 >= $2 THEN 'excessive_returns'
                        ELSE deactivation_reason
                    END,
                    deactivated_at = CASE
                        WHEN return_count + 1 >= $2 THEN COALESCE(deactivated_at, NOW())
                        ELSE deactivated_at
                    END
                WHERE id = $1
                RETURNING *
                "#,
            )
            .bind(id)
            .bind(auto_deactivate_threshold)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_db_err)?;

            match model_opt {
                Some(model) => Ok(model.into()),
                None => Err(PaymentError::NotFound("Payment method".to_string())),
            }
        })
        .await
    }

    async fn find_by_prenote_transaction(
        &self,
        transaction_id: TransactionId,
    ) -> Result<Option<PaymentMethod>, PaymentError> {
        with_timeout(SIMPLE_QUERY_TIMEOUT, "payment_methods.find_by_prenote", async {
            let model_opt = sqlx::query_as::<_, PaymentMethodModel>(
                r#"SELECT * FROM payment_methods WHERE prenote_transaction_id = $1"#,
            )
            .bind(transaction_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_db_err)?;

            Ok(model_opt.map(Into::into))
        })
        .await
    }
}
