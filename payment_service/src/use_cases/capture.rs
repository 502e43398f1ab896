use crate::domain::access::CallerIdentity;
use crate::domain::entities::Transaction;
use crate::domain::error::PaymentError;
use crate::domain::state::ChainOperation;
use crate::domain::types::TransactionId;
use crate::use_cases::pipeline::{FollowUpCommand, PaymentPipeline};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct CaptureRequest {
    /// Id de la transaccion AUTH raiz de la cadena.
    pub parent_transaction_id: TransactionId,
    /// Omitido = capturar todo el monto autorizado restante.
    pub amount_cents: Option<i64>,
    pub idempotency_key: Option<TransactionId>,
}

/// Caso de uso: captura (total o parcial) de una autorizacion previa.
///
/// Se admiten multiples capturas sobre el mismo auth hasta agotarlo; el
/// chequeo del monto restante ocurre bajo el lock de la cadena.
pub struct CaptureUseCase {
    pipeline: Arc<PaymentPipeline>,
}

impl CaptureUseCase {
    pub fn new(pipeline: Arc<PaymentPipeline>) -> Self {
        Self { pipeline }
    }

    pub async fn execute(
        &self,
        identity: &CallerIdentity,
        request: CaptureRequest,
    ) -> Result<Transaction, PaymentError> {
        let command = FollowUpCommand {
            op: ChainOperation::Capture,
            idempotency_key: request.idempotency_key.unwrap_or_else(TransactionId::new),
            parent_transaction_id: request.parent_transaction_id,
            amount_cents: request.amount_cents,
            reason: None,
        };
        self.pipeline.execute_follow_up(identity, command).await
    }
}
