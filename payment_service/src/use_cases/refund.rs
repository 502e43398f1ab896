use crate::domain::access::CallerIdentity;
use crate::domain::entities::Transaction;
use crate::domain::error::PaymentError;
use crate::domain::state::ChainOperation;
use crate::domain::types::TransactionId;
use crate::use_cases::pipeline::{FollowUpCommand, PaymentPipeline};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct RefundRequest {
    /// Id de la transaccion SALE o AUTH raiz de la cadena.
    pub parent_transaction_id: TransactionId,
    /// Omitido = reembolsar todo lo capturado pendiente.
    pub amount_cents: Option<i64>,
    pub reason: String,
    pub idempotency_key: Option<TransactionId>,
}

/// Caso de uso: reembolso (total o parcial) de fondos capturados.
///
/// Requiere una captura o venta previa; los reembolsos parciales se
/// acumulan hasta agotar lo capturado. Para ACH el clasificador del Gateway
/// es ACH-Credit.
pub struct RefundUseCase {
    pipeline: Arc<PaymentPipeline>,
}

impl RefundUseCase {
    pub fn new(pipeline: Arc<PaymentPipeline>) -> Self {
        Self { pipeline }
    }

    pub async fn execute(
        &self,
        identity: &CallerIdentity,
        request: RefundRequest,
    ) -> Result<Transaction, PaymentError> {
        if request.reason.trim().is_empty() {
            return Err(PaymentError::ValidationError(
                "a refund reason is required".to_string(),
            ));
        }

        let command = FollowUpCommand {
            op: ChainOperation::Refund,
            idempotency_key: request.idempotency_key.unwrap_or_else(TransactionId::new),
            parent_transaction_id: request.parent_transaction_id,
            amount_cents: request.amount_cents,
            reason: Some(request.reason),
        };
        self.pipeline.execute_follow_up(identity, command).await
    }
}
