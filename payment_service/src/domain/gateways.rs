use crate::domain::entities::PaymentMethodType;
use crate::domain::error::PaymentError;
use async_trait::async_trait;
use std::fmt;

/// Codigo de respuesta con el que el Gateway aprueba una operacion.
pub const APPROVED_RESPONSE_CODE: &str = "00";

/// Clasificadores de operacion que entiende el Gateway. Valores opacos desde
/// el punto de vista del dominio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayOperation {
    Sale,
    AuthOnly,
    Capture,
    Void,
    Refund,
    AchDebit,
    AchCredit,
    AchPrenoteDebit,
    /// Convierte un token de un solo uso en un storage token persistente.
    StorageToken,
    /// Auth de monto cero con direccion de facturacion.
    AccountVerification,
}

/// Etiquetas `tran_group` que el Gateway acepta. Las capturas y las
/// operaciones de tokenizacion viajan sin etiqueta.
pub mod tran_group {
    pub const SALE: &str = "SALE";
    pub const AUTH: &str = "AUTH";
    pub const VOID: &str = "VOID";
    pub const REFUND: &str = "REFUND";
    pub const NONE: &str = "";
}

/// Valores de `card_entry_method` definidos por el Gateway.
pub mod card_entry {
    /// Datos digitados manualmente (tokenizacion directa).
    pub const KEYED: &str = "E";
    /// Instrumento previamente tokenizado.
    pub const TOKEN_ON_FILE: &str = "Z";
}

/// Datos crudos de tarjeta, solo en transito hacia la tokenizacion.
/// Jamas se persisten; el Debug los redacta para que no lleguen a los logs.
#[derive(Clone)]
pub struct RawCardData {
    pub number: String,
    pub exp_month: i32,
    pub exp_year: i32,
    pub cvv: String,
}

impl fmt::Debug for RawCardData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawCardData")
            .field("number", &"[REDACTED]")
            .field("exp_month", &self.exp_month)
            .field("exp_year", &self.exp_year)
            .field("cvv", &"[REDACTED]")
            .finish()
    }
}

/// Datos crudos de cuenta bancaria, solo en transito hacia el prenote.
#[derive(Clone)]
pub struct AchAccountData {
    pub routing_number: String,
    pub account_number: String,
}

impl fmt::Debug for AchAccountData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AchAccountData")
            .field("routing_number", &self.routing_number)
            .field("account_number", &"[REDACTED]")
            .finish()
    }
}

#[derive(Debug, Clone, Default)]
pub struct BillingInfo {
    pub full_name: Option<String>,
    pub street: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
}

/// Solicitud de una sola operacion contra el Gateway externo.
#[derive(Debug, Clone)]
pub struct GatewayRequest {
    // Numerales de ruteo del comercio
    pub cust_nbr: String,
    pub merch_nbr: String,
    pub dba_nbr: String,
    pub terminal_nbr: String,
    // Secreto compartido resuelto via Secret Resolver; autentica la solicitud
    pub shared_secret: String,
    pub operation: GatewayOperation,
    // Monto en formato "D.CC"
    pub amount: String,
    pub method_kind: PaymentMethodType,
    // Token del instrumento (storage token o token de un solo uso)
    pub auth_guid: Option<String>,
    // Token de la transaccion original (capture / void / refund)
    pub original_auth_guid: Option<String>,
    pub tran_nbr: String,
    pub tran_group: String,
    pub card_entry_method: String,
    pub customer_id: Option<String>,
    pub card: Option<RawCardData>,
    pub ach: Option<AchAccountData>,
    pub billing: Option<BillingInfo>,
}

/// Respuesta del Gateway a una operacion.
///
/// Un rechazo ("05", "51", ...) sigue siendo una respuesta valida: cierra el
/// ciclo de reintentos del cliente y se concilia igual que una aprobacion.
#[derive(Debug, Clone, Default)]
pub struct GatewayResponse {
    pub auth_guid: String,
    pub auth_resp: String,
    pub auth_resp_text: String,
    pub auth_code: Option<String>,
    pub auth_card_type: Option<String>,
    pub avs_resp: Option<String>,
    pub cvv_resp: Option<String>,
}

impl GatewayResponse {
    pub fn is_approved(&self) -> bool {
        self.auth_resp == APPROVED_RESPONSE_CODE
    }
}

// Port para el cliente del Gateway de pagos
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn process(&self, request: GatewayRequest) -> Result<GatewayResponse, PaymentError>;
}
