use crate::domain::access::CallerIdentity;
use crate::domain::entities::Transaction;
use crate::domain::error::PaymentError;
use crate::domain::state::ChainOperation;
use crate::domain::types::TransactionId;
use crate::use_cases::pipeline::{FollowUpCommand, PaymentPipeline};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct VoidRequest {
    /// Id de la transaccion SALE o AUTH raiz de la cadena.
    pub parent_transaction_id: TransactionId,
    pub idempotency_key: Option<TransactionId>,
}

/// Caso de uso: anulacion.
///
/// Sobre una cadena sin capturar cancela la autorizacion; sobre una cadena
/// capturada revierte la captura. La clasificacion queda grabada en la
/// metadata del void para que el replay no sea ambiguo.
pub struct VoidUseCase {
    pipeline: Arc<PaymentPipeline>,
}

impl VoidUseCase {
    pub fn new(pipeline: Arc<PaymentPipeline>) -> Self {
        Self { pipeline }
    }

    pub async fn execute(
        &self,
        identity: &CallerIdentity,
        request: VoidRequest,
    ) -> Result<Transaction, PaymentError> {
        let command = FollowUpCommand {
            op: ChainOperation::Void,
            idempotency_key: request.idempotency_key.unwrap_or_else(TransactionId::new),
            parent_transaction_id: request.parent_transaction_id,
            amount_cents: None,
            reason: None,
        };
        self.pipeline.execute_follow_up(identity, command).await
    }
}
