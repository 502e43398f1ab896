use crate::domain::access::CallerIdentity;
use crate::domain::entities::Transaction;
use crate::domain::error::PaymentError;
use crate::use_cases::pipeline::{
    root_command_from, PaymentPipeline, RootPaymentKind, RootPaymentRequest,
};
use std::sync::Arc;

/// Caso de uso: autorizacion sin captura.
///
/// Reserva el monto contra la tarjeta; las capturas parciales posteriores
/// consumen la reserva hasta agotarla. Las cuentas ACH no soportan
/// retenciones, ese rechazo ocurre al resolver el metodo.
pub struct AuthorizeUseCase {
    pipeline: Arc<PaymentPipeline>,
}

impl AuthorizeUseCase {
    pub fn new(pipeline: Arc<PaymentPipeline>) -> Self {
        Self { pipeline }
    }

    pub async fn execute(
        &self,
        identity: &CallerIdentity,
        request: RootPaymentRequest,
    ) -> Result<Transaction, PaymentError> {
        let command = root_command_from(RootPaymentKind::Authorize, request)?;
        self.pipeline.execute_root(identity, command).await
    }
}
