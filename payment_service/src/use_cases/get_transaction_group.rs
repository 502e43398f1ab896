use crate::domain::access::CallerIdentity;
use crate::domain::entities::Transaction;
use crate::domain::error::PaymentError;
use crate::domain::repository::TransactionRepository;
use crate::domain::types::TransactionId;
use std::sync::Arc;

/// Caso de uso: cadena completa (raiz + descendientes) en orden de replay.
pub struct GetTransactionGroupUseCase {
    transaction_repo: Arc<dyn TransactionRepository>,
}

impl GetTransactionGroupUseCase {
    pub fn new(transaction_repo: Arc<dyn TransactionRepository>) -> Self {
        Self { transaction_repo }
    }

    pub async fn execute(
        &self,
        identity: &CallerIdentity,
        root_id: TransactionId,
    ) -> Result<Vec<Transaction>, PaymentError> {
        let root = self
            .transaction_repo
            .find_by_id(root_id)
            .await?
            .ok_or_else(|| PaymentError::NotFound("Transaction".to_string()))?;

        if root.parent_transaction_id.is_some() {
            return Err(PaymentError::ValidationError(
                "the id must reference the root of the chain".to_string(),
            ));
        }

        if !identity.can_view_transaction(&root, None) {
            return Err(PaymentError::NotFound("Transaction".to_string()));
        }

        self.transaction_repo.find_group(root_id).await
    }
}
