use crate::domain::entities::{Merchant, NewMerchant};
use crate::domain::error::PaymentError;
use crate::domain::repository::MerchantRepository;
use crate::domain::types::MerchantId;
use crate::infrastructure::persistence::models::MerchantModel;
use crate::infrastructure::persistence::{map_db_err, with_timeout, SIMPLE_QUERY_TIMEOUT};
use async_trait::async_trait;
use sqlx::PgPool;

/// Repositorio de comercios sobre PostgreSQL.
pub struct PostgresMerchantRepository {
    pool: PgPool,
}

impl PostgresMerchantRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MerchantRepository for PostgresMerchantRepository {
    async fn create(&self, merchant: NewMerchant) -> Result<Merchant, PaymentError> {
        with_timeout(SIMPLE_QUERY_TIMEOUT, "merchants.create", async {
            let model = sqlx::query_as::<_, MerchantModel>(
                r#"
                INSERT INTO merchants (
                    id, slug, cust_nbr, merch_nbr, dba_nbr, terminal_nbr,
                    secret_path, tier
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                RETURNING *
                "#,
            )
            .bind(merchant.id)
            .bind(merchant.slug)
            .bind(merchant.cust_nbr)
            .bind(merchant.merch_nbr)
            .bind(merchant.dba_nbr)
            .bind(merchant.terminal_nbr)
            .bind(merchant.secret_path)
            .bind(merchant.tier)
            .fetch_one(&self.pool)
            .await
            .map_err(map_db_err)?;

            Ok(model.into())
        })
        .await
    }

    async fn find_by_id(&self, id: MerchantId) -> Result<Option<Merchant>, PaymentError> {
        with_timeout(SIMPLE_QUERY_TIMEOUT, "merchants.find_by_id", async {
            let model_opt =
                sqlx::query_as::<_, MerchantModel>(r#"SELECT * FROM merchants WHERE id = $1"#)
                    .bind(id)
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(map_db_err)?;

            Ok(model_opt.map(Into::into))
        })
        .await
    }

    async fn find_by_slug(&self, slug: String) -> Result<Option<Merchant>, PaymentError> {
        with_timeout(SIMPLE_QUERY_TIMEOUT, "merchants.find_by_slug", async {
            let model_opt =
                sqlx::query_as::<_, MerchantModel>(r#"SELECT * FROM merchants WHERE slug = $1"#)
                    .bind(slug)
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(map_db_err)?;

            Ok(model_opt.map(Into::into))
        })
        .await
    }

    async fn set_active(&self, id: MerchantId, active: bool) -> Result<(), PaymentError> {
        with_timeout(SIMPLE_QUERY_TIMEOUT, "merchants.set_active", async {
            let result = sqlx::query(r#"UPDATE merchants SET is_active = $2 WHERE id = $1"#)
                .bind(id)
                .bind(active)
                .execute(&self.pool)
                .await
                .map_err(map_db_err)?;

            if result.rows_affected() == 0 {
                return Err(PaymentError::NotFound("Merchant".to_string()));
            }

            Ok(())
        })
        .await
    }
}
