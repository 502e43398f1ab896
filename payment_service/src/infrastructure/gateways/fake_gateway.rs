use crate::domain::error::PaymentError;
use crate::domain::gateways::{GatewayRequest, GatewayResponse, PaymentGateway};
use async_trait::async_trait;
use tracing::info;

/// Implementación Mock del Gateway de pagos para desarrollo y testing.
///
/// Aprueba todo con un token sintetico y loguea la operacion. Útil para
/// probar el pipeline completo sin credenciales reales del Gateway; el
/// transporte real se inyecta por configuracion en produccion.
pub struct FakePaymentGateway {
    decline: Option<(String, String)>,
}

impl FakePaymentGateway {
    pub fn new() -> Self {
        Self { decline: None }
    }

    /// Variante que rechaza todo con el codigo dado, para ejercitar los
    /// flujos de decline de punta a punta.
    pub fn declining(code: &str, text: &str) -> Self {
        Self {
            decline: Some((code.to_string(), text.to_string())),
        }
    }
}

impl Default for FakePaymentGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PaymentGateway for FakePaymentGateway {
    async fn process(&self, request: GatewayRequest) -> Result<GatewayResponse, PaymentError> {
        info!(
            " [FakePaymentGateway] Processing {:?} for tran_nbr {} (amount {})",
            request.operation, request.tran_nbr, request.amount
        );

        // Simulamos un pequeño delay de red
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;

        if let Some((code, text)) = &self.decline {
            info!(" [FakePaymentGateway] Operation DECLINED ({})", code);
            return Ok(GatewayResponse {
                auth_guid: String::new(),
                auth_resp: code.clone(),
                auth_resp_text: text.clone(),
                auth_code: None,
                auth_card_type: None,
                avs_resp: None,
                cvv_resp: None,
            });
        }

        info!(" [FakePaymentGateway] Operation APPROVED");
        Ok(GatewayResponse {
            auth_guid: format!("FAKE-{}", request.tran_nbr),
            auth_resp: "00".to_string(),
            auth_resp_text: "APPROVAL".to_string(),
            auth_code: Some("T0000".to_string()),
            auth_card_type: Some("V".to_string()),
            avs_resp: Some("Y".to_string()),
            cvv_resp: Some("M".to_string()),
        })
    }
}
