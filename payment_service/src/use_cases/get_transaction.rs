use crate::domain::access::CallerIdentity;
use crate::domain::entities::Transaction;
use crate::domain::error::PaymentError;
use crate::domain::repository::TransactionRepository;
use crate::domain::types::TransactionId;
use std::sync::Arc;

/// Caso de uso: consulta de una transaccion puntual.
///
/// Como la llave de idempotencia es el id, la busqueda por llave de
/// idempotencia es exactamente esta misma operacion. Una fila fuera del
/// alcance del llamador responde NotFound, identico a una inexistente.
pub struct GetTransactionUseCase {
    transaction_repo: Arc<dyn TransactionRepository>,
}

impl GetTransactionUseCase {
    pub fn new(transaction_repo: Arc<dyn TransactionRepository>) -> Self {
        Self { transaction_repo }
    }

    pub async fn execute(
        &self,
        identity: &CallerIdentity,
        id: TransactionId,
    ) -> Result<Transaction, PaymentError> {
        let tx = self
            .transaction_repo
            .find_by_id(id)
            .await?
            .ok_or_else(|| PaymentError::NotFound("Transaction".to_string()))?;

        // La sesion de invitado vive en la raiz de la cadena
        let root = match (&tx.parent_transaction_id, identity) {
            (Some(root_id), CallerIdentity::Guest { .. }) => {
                self.transaction_repo.find_by_id(*root_id).await?
            }
            _ => None,
        };

        if !identity.can_view_transaction(&tx, root.as_ref()) {
            return Err(PaymentError::NotFound("Transaction".to_string()));
        }

        Ok(tx)
    }
}
