use crate::domain::access::CallerIdentity;
use crate::domain::entities::PaymentMethod;
use crate::domain::error::PaymentError;
use crate::domain::repository::{MerchantRepository, PaymentMethodRepository};
use crate::domain::types::MerchantId;
use crate::use_cases::pipeline::{merchant_ref_from, resolve_active_merchant};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct ListPaymentMethodsRequest {
    pub merchant_id: Option<MerchantId>,
    pub merchant_slug: Option<String>,
    pub customer_id: String,
    pub include_inactive: bool,
}

/// Caso de uso: metodos de pago de un cliente, el default primero.
pub struct ListPaymentMethodsUseCase {
    payment_method_repo: Arc<dyn PaymentMethodRepository>,
    merchant_repo: Arc<dyn MerchantRepository>,
}

impl ListPaymentMethodsUseCase {
    pub fn new(
        payment_method_repo: Arc<dyn PaymentMethodRepository>,
        merchant_repo: Arc<dyn MerchantRepository>,
    ) -> Self {
        Self {
            payment_method_repo,
            merchant_repo,
        }
    }

    pub async fn execute(
        &self,
        identity: &CallerIdentity,
        request: ListPaymentMethodsRequest,
    ) -> Result<Vec<PaymentMethod>, PaymentError> {
        if request.customer_id.is_empty() || request.customer_id.len() > 100 {
            return Err(PaymentError::ValidationError(
                "customer_id must be between 1 and 100 characters".to_string(),
            ));
        }

        // Un cliente solo puede listar sus propios metodos
        if let CallerIdentity::Customer { customer_id } = identity {
            if *customer_id != request.customer_id {
                return Err(PaymentError::NotFound("Customer".to_string()));
            }
        }

        let reference = merchant_ref_from(request.merchant_id, request.merchant_slug)?;
        let merchant = match identity {
            // Para clientes el comercio viene del parametro sin pasar por el
            // filtro de escritura
            CallerIdentity::Customer { .. } => match reference {
                Some(crate::use_cases::pipeline::MerchantRef::Id(id)) => self
                    .merchant_repo
                    .find_by_id(id)
                    .await?
                    .ok_or_else(|| PaymentError::NotFound("Merchant".to_string()))?,
                _ => {
                    return Err(PaymentError::ValidationError(
                        "merchant_id is required".to_string(),
                    ))
                }
            },
            _ => resolve_active_merchant(&self.merchant_repo, identity, reference.as_ref()).await?,
        };

        self.payment_method_repo
            .list_by_customer(merchant.id, request.customer_id, request.include_inactive)
            .await
    }
}
