use crate::domain::access::CallerIdentity;
use crate::domain::entities::{Transaction, TransactionStatus, TransactionType};
use crate::domain::error::PaymentError;
use crate::domain::repository::{TransactionFilter, TransactionRepository};
use crate::domain::types::{MerchantId, PaymentMethodId, TransactionId};
use std::sync::Arc;

const DEFAULT_PAGE_SIZE: i64 = 50;
const MAX_PAGE_SIZE: i64 = 200;

#[derive(Debug, Clone, Default)]
pub struct ListTransactionsRequest {
    pub merchant_id: Option<MerchantId>,
    pub customer_id: Option<String>,
    pub parent_transaction_id: Option<TransactionId>,
    pub subscription_id: Option<String>,
    pub status: Option<TransactionStatus>,
    pub tran_type: Option<TransactionType>,
    pub payment_method_id: Option<PaymentMethodId>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Caso de uso: listado paginado de transacciones con conteo total.
///
/// El alcance de visibilidad del llamador se inyecta en el filtro y viaja
/// dentro del SQL: pedir un comercio ajeno produce una pagina vacia, no un
/// error que confirme su existencia.
pub struct ListTransactionsUseCase {
    transaction_repo: Arc<dyn TransactionRepository>,
}

impl ListTransactionsUseCase {
    pub fn new(transaction_repo: Arc<dyn TransactionRepository>) -> Self {
        Self { transaction_repo }
    }

    pub async fn execute(
        &self,
        identity: &CallerIdentity,
        request: ListTransactionsRequest,
    ) -> Result<(Vec<Transaction>, i64), PaymentError> {
        let limit = request
            .limit
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);
        let offset = request.offset.unwrap_or(0).max(0);

        let filter = TransactionFilter {
            scope: identity.visibility(),
            merchant_id: request.merchant_id,
            customer_id: request.customer_id,
            parent_transaction_id: request.parent_transaction_id,
            subscription_id: request.subscription_id,
            status: request.status,
            tran_type: request.tran_type,
            payment_method_id: request.payment_method_id,
            limit,
            offset,
        };

        self.transaction_repo.list(filter).await
    }
}
