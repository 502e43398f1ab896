use crate::domain::access::VisibilityScope;
use crate::domain::entities::{NewTransaction, Transaction};
use crate::domain::error::PaymentError;
use crate::domain::repository::{GatewayReconcile, TransactionFilter, TransactionRepository};
use crate::domain::state::{compute_state, plan_follow_up, FollowUpRequest, GroupState};
use crate::domain::types::TransactionId;
use crate::infrastructure::persistence::models::TransactionModel;
use crate::infrastructure::persistence::{
    map_db_err, with_timeout, COMPLEX_QUERY_TIMEOUT, REPORT_QUERY_TIMEOUT, SIMPLE_QUERY_TIMEOUT,
};
use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder};

/// Repositorio del ledger de transacciones sobre PostgreSQL.
///
/// El ledger es append-only: las filas se insertan pendientes y se
/// concilian exactamente una vez con la respuesta del Gateway; nunca se
/// borran. La serializacion por cadena se logra con `SELECT ... FOR UPDATE`
/// sobre la fila raiz, de modo que dos continuaciones concurrentes del mismo
/// grupo se ordenan una detras de la otra.
pub struct PostgresTransactionRepository {
    pool: PgPool,
}

impl PostgresTransactionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const INSERT_PENDING_SQL: &str = r#"
    INSERT INTO transactions (
        id, parent_transaction_id, merchant_id, customer_id, subscription_id,
        amount_cents, currency, tran_type, payment_method_type, payment_method_id,
        tran_nbr, metadata
    )
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
    RETURNING *
"#;

// Raiz mas descendientes en orden de replay. El desempate por id hace el
// orden totalmente deterministico cuando dos filas comparten timestamp.
const GROUP_SQL: &str = r#"
    WITH RECURSIVE chain AS (
        SELECT * FROM transactions WHERE id = $1
        UNION ALL
        SELECT t.* FROM transactions t
        JOIN chain c ON t.parent_transaction_id = c.id
    )
    SELECT * FROM chain
    ORDER BY created_at ASC, id ASC
"#;

/// Inserta la fila pendiente. Un choque con la primary key se reporta como
/// `DuplicateTransaction` para que el pipeline lo vuelva exito idempotente.
async fn insert_pending(
    conn: &mut sqlx::PgConnection,
    new_tx: &NewTransaction,
) -> Result<TransactionModel, PaymentError> {
    sqlx::query_as::<_, TransactionModel>(INSERT_PENDING_SQL)
        .bind(new_tx.id)
        .bind(new_tx.parent_transaction_id)
        .bind(new_tx.merchant_id)
        .bind(new_tx.customer_id.clone())
        .bind(new_tx.subscription_id.clone())
        .bind(new_tx.amount_cents)
        .bind(new_tx.currency.clone())
        .bind(new_tx.tran_type)
        .bind(new_tx.payment_method_type)
        .bind(new_tx.payment_method_id)
        .bind(new_tx.tran_nbr())
        .bind(new_tx.metadata.clone())
        .fetch_one(conn)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db)
                if db.is_unique_violation() && db.constraint() == Some("transactions_pkey") =>
            {
                PaymentError::DuplicateTransaction(new_tx.id)
            }
            _ => PaymentError::RepositoryError(e.to_string()),
        })
}

#[async_trait]
impl TransactionRepository for PostgresTransactionRepository {
    async fn create(&self, new_tx: NewTransaction) -> Result<Transaction, PaymentError> {
        with_timeout(SIMPLE_QUERY_TIMEOUT, "transactions.create", async {
            let mut conn = self.pool.acquire().await.map_err(map_db_err)?;
            let model = insert_pending(&mut conn, &new_tx).await?;
            Ok(model.into())
        })
        .await
    }

    async fn create_in_group(
        &self,
        root_id: TransactionId,
        request: FollowUpRequest,
    ) -> Result<(Transaction, GroupState), PaymentError> {
        with_timeout(COMPLEX_QUERY_TIMEOUT, "transactions.create_in_group", async {
            let mut db_tx = self.pool.begin().await.map_err(map_db_err)?;

            // El lock de la raiz serializa todas las continuaciones de la
            // cadena; quien llega segundo observa el estado ya mutado
            let locked = sqlx::query_as::<_, TransactionModel>(
                r#"
                SELECT * FROM transactions
                WHERE id = $1 AND parent_transaction_id IS NULL
                FOR UPDATE
                "#,
            )
            .bind(root_id)
            .fetch_optional(&mut *db_tx)
            .await
            .map_err(map_db_err)?;

            if locked.is_none() {
                return Err(PaymentError::NotFound("Transaction".to_string()));
            }

            let models = sqlx::query_as::<_, TransactionModel>(GROUP_SQL)
                .bind(root_id)
                .fetch_all(&mut *db_tx)
                .await
                .map_err(map_db_err)?;

            let tree: Vec<Transaction> = models.into_iter().map(Into::into).collect();
            let root = tree.first().ok_or_else(|| {
                PaymentError::RepositoryError("group query returned no rows".to_string())
            })?;

            let state = compute_state(&tree);
            // Si el predicado falla, el drop de db_tx libera el lock sin
            // insertar nada
            let planned = plan_follow_up(root, &state, &request)?;

            let inserted = insert_pending(&mut db_tx, &planned).await?;
            db_tx.commit().await.map_err(map_db_err)?;

            Ok((inserted.into(), state))
        })
        .await
    }

    async fn find_by_id(&self, id: TransactionId) -> Result<Option<Transaction>, PaymentError> {
        with_timeout(SIMPLE_QUERY_TIMEOUT, "transactions.find_by_id", async {
            let model_opt = sqlx::query_as::<_, TransactionModel>(
                r#"SELECT * FROM transactions WHERE id = $1"#,
            )
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_db_err)?;

            Ok(model_opt.map(Into::into))
        })
        .await
    }

    async fn find_by_tran_nbr(
        &self,
        tran_nbr: String,
    ) -> Result<Option<Transaction>, PaymentError> {
        with_timeout(SIMPLE_QUERY_TIMEOUT, "transactions.find_by_tran_nbr", async {
            let model_opt = sqlx::query_as::<_, TransactionModel>(
                r#"SELECT * FROM transactions WHERE tran_nbr = $1"#,
            )
            .bind(tran_nbr)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_db_err)?;

            Ok(model_opt.map(Into::into))
        })
        .await
    }

    async fn find_group(&self, root_id: TransactionId) -> Result<Vec<Transaction>, PaymentError> {
        with_timeout(COMPLEX_QUERY_TIMEOUT, "transactions.find_group", async {
            let models = sqlx::query_as::<_, TransactionModel>(GROUP_SQL)
                .bind(root_id)
                .fetch_all(&self.pool)
                .await
                .map_err(map_db_err)?;

            Ok(models.into_iter().map(Into::into).collect())
        })
        .await
    }

    async fn update_from_gateway_response(
        &self,
        tran_nbr: String,
        update: GatewayReconcile,
    ) -> Result<Transaction, PaymentError> {
        with_timeout(SIMPLE_QUERY_TIMEOUT, "transactions.reconcile", async {
            // El auth_guid es inmutable una vez escrito no-vacio; repetir la
            // conciliacion con la misma respuesta es inocuo
            let model_opt = sqlx::query_as::<_, TransactionModel>(
                r#"
                UPDATE transactions
                SET auth_guid = CASE WHEN auth_guid = '' THEN $2 ELSE auth_guid END,
                    auth_resp = $3,
                    auth_code = $4,
                    auth_card_type = $5,
                    metadata = metadata || $6::jsonb,
                    processed_at = $7
                WHERE tran_nbr = $1
                RETURNING *
                "#,
            )
            .bind(tran_nbr)
            .bind(update.auth_guid)
            .bind(update.auth_resp)
            .bind(update.auth_code)
            .bind(update.auth_card_type)
            .bind(update.metadata)
            .bind(update.processed_at)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_db_err)?;

            match model_opt {
                Some(model) => Ok(model.into()),
                None => Err(PaymentError::NotFound("Transaction".to_string())),
            }
        })
        .await
    }

    async fn append_metadata(
        &self,
        id: TransactionId,
        key: String,
        value: serde_json::Value,
    ) -> Result<(), PaymentError> {
        with_timeout(SIMPLE_QUERY_TIMEOUT, "transactions.append_metadata", async {
            let result = sqlx::query(
                r#"
                UPDATE transactions
                SET metadata = metadata || jsonb_build_object($2::text, $3::jsonb)
                WHERE id = $1
                "#,
            )
            .bind(id)
            .bind(key)
            .bind(value)
            .execute(&self.pool)
            .await
            .map_err(map_db_err)?;

            if result.rows_affected() == 0 {
                return Err(PaymentError::NotFound("Transaction".to_string()));
            }

            Ok(())
        })
        .await
    }

    async fn list(
        &self,
        filter: TransactionFilter,
    ) -> Result<(Vec<Transaction>, i64), PaymentError> {
        with_timeout(REPORT_QUERY_TIMEOUT, "transactions.list", async {
            let mut query = QueryBuilder::new("SELECT t.* FROM transactions t WHERE 1=1");
            push_filters(&mut query, &filter);
            query.push(" ORDER BY t.created_at DESC LIMIT ");
            query.push_bind(filter.limit);
            query.push(" OFFSET ");
            query.push_bind(filter.offset);

            let models = query
                .build_query_as::<TransactionModel>()
                .fetch_all(&self.pool)
                .await
                .map_err(map_db_err)?;

            let mut count_query =
                QueryBuilder::new("SELECT COUNT(*) FROM transactions t WHERE 1=1");
            push_filters(&mut count_query, &filter);
            let total: i64 = count_query
                .build_query_scalar()
                .fetch_one(&self.pool)
                .await
                .map_err(map_db_err)?;

            Ok((models.into_iter().map(Into::into).collect(), total))
        })
        .await
    }
}

/// Aplica el alcance de visibilidad y los filtros opcionales a la consulta.
/// El alcance vive dentro del SQL: una fila invisible jamas sale de la BD.
fn push_filters(query: &mut QueryBuilder<'_, Postgres>, filter: &TransactionFilter) {
    match &filter.scope {
        VisibilityScope::Merchants(ids) => {
            let raw: Vec<uuid::Uuid> = ids.iter().map(|m| m.0).collect();
            query.push(" AND merchant_id = ANY(");
            query.push_bind(raw);
            query.push(")");
        }
        VisibilityScope::Customer(customer_id) => {
            query.push(" AND customer_id = ");
            query.push_bind(customer_id.clone());
        }
        VisibilityScope::GuestSession {
            merchant_id,
            session_id,
        } => {
            query.push(" AND t.merchant_id = ");
            query.push_bind(merchant_id.0);
            // La sesion vive en la metadata de la RAIZ de la cadena; las
            // continuaciones apuntan directo a su raiz, por eso basta un
            // salto por parent_transaction_id
            query.push(
                " AND COALESCE((SELECT p.metadata->>'session_id' FROM transactions p \
                 WHERE p.id = t.parent_transaction_id), t.metadata->>'session_id') = ",
            );
            query.push_bind(session_id.clone());
        }
        VisibilityScope::All => {}
    }

    if let Some(merchant_id) = filter.merchant_id {
        query.push(" AND merchant_id = ");
        query.push_bind(merchant_id.0);
    }
    if let Some(customer_id) = &filter.customer_id {
        query.push(" AND customer_id = ");
        query.push_bind(customer_id.clone());
    }
    if let Some(parent_id) = filter.parent_transaction_id {
        query.push(" AND parent_transaction_id = ");
        query.push_bind(parent_id.0);
    }
    if let Some(subscription_id) = &filter.subscription_id {
        query.push(" AND subscription_id = ");
        query.push_bind(subscription_id.clone());
    }
    if let Some(status) = filter.status {
        query.push(" AND status = ");
        query.push_bind(status);
    }
    if let Some(tran_type) = filter.tran_type {
        query.push(" AND tran_type = ");
        query.push_bind(tran_type);
    }
    if let Some(method_id) = filter.payment_method_id {
        query.push(" AND payment_method_id = ");
        query.push_bind(method_id.0);
    }
}
