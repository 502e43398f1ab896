use crate::domain::access::CallerIdentity;
use crate::domain::entities::PaymentMethod;
use crate::domain::error::PaymentError;
use crate::domain::repository::PaymentMethodRepository;
use crate::domain::types::PaymentMethodId;
use std::sync::Arc;

/// Caso de uso: consulta de un metodo de pago puntual.
pub struct GetPaymentMethodUseCase {
    payment_method_repo: Arc<dyn PaymentMethodRepository>,
}

impl GetPaymentMethodUseCase {
    pub fn new(payment_method_repo: Arc<dyn PaymentMethodRepository>) -> Self {
        Self { payment_method_repo }
    }

    pub async fn execute(
        &self,
        identity: &CallerIdentity,
        id: PaymentMethodId,
    ) -> Result<PaymentMethod, PaymentError> {
        let method = self
            .payment_method_repo
            .find_by_id(id)
            .await?
            .ok_or_else(|| PaymentError::NotFound("Payment method".to_string()))?;

        if !identity.can_view_payment_method(&method) {
            return Err(PaymentError::NotFound("Payment method".to_string()));
        }

        Ok(method)
    }
}
