use crate::domain::access::CallerIdentity;
use crate::domain::entities::Transaction;
use crate::domain::error::PaymentError;
use crate::use_cases::pipeline::{
    root_command_from, PaymentPipeline, RootPaymentKind, RootPaymentRequest,
};
use std::sync::Arc;

/// Caso de uso: venta (auth + captura en un solo paso).
///
/// El clasificador del Gateway es Sale para tarjetas y ACH-Debit para
/// cuentas; no hay chequeo de estado porque la venta abre su propia cadena.
pub struct SaleUseCase {
    pipeline: Arc<PaymentPipeline>,
}

impl SaleUseCase {
    pub fn new(pipeline: Arc<PaymentPipeline>) -> Self {
        Self { pipeline }
    }

    pub async fn execute(
        &self,
        identity: &CallerIdentity,
        request: RootPaymentRequest,
    ) -> Result<Transaction, PaymentError> {
        let command = root_command_from(RootPaymentKind::Sale, request)?;
        self.pipeline.execute_root(identity, command).await
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::error::PaymentError;
    use crate::domain::types::PaymentMethodId;
    use crate::use_cases::pipeline::{resolve_source_fields, PaymentSource};

    #[test]
    fn test_exactly_one_payment_source_is_required() {
        assert!(matches!(
            resolve_source_fields(None, None),
            Err(PaymentError::ValidationError(_))
        ));
        assert!(matches!(
            resolve_source_fields(Some(PaymentMethodId::new()), Some("TOKEN".to_string())),
            Err(PaymentError::ValidationError(_))
        ));
        assert!(matches!(
            resolve_source_fields(Some(PaymentMethodId::new()), None),
            Ok(PaymentSource::Method(_))
        ));
        assert!(matches!(
            resolve_source_fields(None, Some("TOKEN".to_string())),
            Ok(PaymentSource::OneShotToken(_))
        ));
    }
}
