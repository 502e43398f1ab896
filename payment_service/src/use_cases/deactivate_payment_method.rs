use crate::domain::access::CallerIdentity;
use crate::domain::error::PaymentError;
use crate::domain::repository::{AuditLogRepository, NewAuditEntry, PaymentMethodRepository};
use crate::domain::types::PaymentMethodId;
use crate::use_cases::pipeline::actor_label;
use std::sync::Arc;
use tracing::warn;

/// Caso de uso: desactivacion manual de un metodo de pago.
pub struct DeactivatePaymentMethodUseCase {
    payment_method_repo: Arc<dyn PaymentMethodRepository>,
    audit_repo: Arc<dyn AuditLogRepository>,
}

impl DeactivatePaymentMethodUseCase {
    pub fn new(
        payment_method_repo: Arc<dyn PaymentMethodRepository>,
        audit_repo: Arc<dyn AuditLogRepository>,
    ) -> Self {
        Self {
            payment_method_repo,
            audit_repo,
        }
    }

    pub async fn execute(
        &self,
        identity: &CallerIdentity,
        id: PaymentMethodId,
        reason: Option<String>,
    ) -> Result<(), PaymentError> {
        let method = self
            .payment_method_repo
            .find_by_id(id)
            .await?
            .ok_or_else(|| PaymentError::NotFound("Payment method".to_string()))?;

        // Desactivar es una escritura: la credencial debe alcanzar al
        // comercio dueño del metodo
        identity.resolve_write_merchant(Some(method.merchant_id))?;

        let reason = reason.unwrap_or_else(|| "merchant_request".to_string());
        self.payment_method_repo
            .deactivate(id, reason.clone())
            .await?;

        let entry = NewAuditEntry {
            entity_type: "payment_method".to_string(),
            entity_id: id.to_string(),
            action: "deactivated".to_string(),
            actor: actor_label(identity),
            detail: serde_json::json!({ "reason": reason }),
        };
        if let Err(e) = self.audit_repo.record(entry).await {
            warn!("Failed to record audit entry for {}: {}", id, e);
        }

        Ok(())
    }
}
