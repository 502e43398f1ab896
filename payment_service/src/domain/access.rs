use crate::domain::entities::{PaymentMethod, Transaction};
use crate::domain::error::PaymentError;
use crate::domain::types::MerchantId;

/// Llave de metadata donde una venta de invitado guarda su sesion.
pub const METADATA_SESSION_ID: &str = "session_id";

/// Identidad del llamador, extraida rio arriba por el transporte.
///
/// El filtro deriva de aqui el comercio efectivo de cada escritura y el
/// predicado de visibilidad de cada lectura. Las lecturas fuera de alcance
/// responden NotFound, nunca un 403: un 403 confirmaria la existencia de la
/// fila.
#[derive(Debug, Clone, PartialEq)]
pub enum CallerIdentity {
    /// Credencial de comercio; puede abarcar uno o varios tenants.
    Merchant { merchant_ids: Vec<MerchantId> },
    /// Cliente final: solo lecturas de sus propias filas.
    Customer { customer_id: String },
    /// Sesion de checkout anonima, ligada a un comercio.
    Guest {
        merchant_id: MerchantId,
        session_id: String,
    },
    /// Automatizacion interna (cron, conciliaciones).
    Service,
    Admin,
}

/// Predicado de visibilidad que los listados aplican en la consulta misma.
#[derive(Debug, Clone, PartialEq)]
pub enum VisibilityScope {
    Merchants(Vec<MerchantId>),
    Customer(String),
    GuestSession {
        merchant_id: MerchantId,
        session_id: String,
    },
    All,
}

impl CallerIdentity {
    /// Resuelve el comercio efectivo de una operacion de escritura.
    ///
    /// Una credencial de un solo comercio puede omitir el parametro; una
    /// multi-comercio debe nombrar uno de los suyos. Los clientes no
    /// escriben. Service y admin operan sobre cualquier comercio pero deben
    /// nombrarlo explicitamente.
    pub fn resolve_write_merchant(
        &self,
        requested: Option<MerchantId>,
    ) -> Result<MerchantId, PaymentError> {
        match self {
            CallerIdentity::Merchant { merchant_ids } => match (merchant_ids.as_slice(), requested)
            {
                ([only], None) => Ok(*only),
                (ids, Some(req)) if ids.contains(&req) => Ok(req),
                ([], _) => Err(PaymentError::AccessDenied(
                    "credential has no merchants".to_string(),
                )),
                (_, None) => Err(PaymentError::ValidationError(
                    "merchant_id is required for multi-merchant credentials".to_string(),
                )),
                // Un comercio ajeno es indistinguible de uno inexistente
                (_, Some(_)) => Err(PaymentError::NotFound("Merchant".to_string())),
            },
            CallerIdentity::Customer { .. } => Err(PaymentError::AccessDenied(
                "customers cannot initiate payment operations".to_string(),
            )),
            CallerIdentity::Guest { merchant_id, .. } => match requested {
                None => Ok(*merchant_id),
                Some(req) if req == *merchant_id => Ok(req),
                Some(_) => Err(PaymentError::NotFound("Merchant".to_string())),
            },
            CallerIdentity::Service | CallerIdentity::Admin => requested.ok_or_else(|| {
                PaymentError::ValidationError("merchant_id is required".to_string())
            }),
        }
    }

    /// Los invitados solo crean dentro de su sesion: capture / void / refund
    /// les estan vedados.
    pub fn allows_follow_up(&self) -> bool {
        !matches!(
            self,
            CallerIdentity::Guest { .. } | CallerIdentity::Customer { .. }
        )
    }

    pub fn visibility(&self) -> VisibilityScope {
        match self {
            CallerIdentity::Merchant { merchant_ids } => {
                VisibilityScope::Merchants(merchant_ids.clone())
            }
            CallerIdentity::Customer { customer_id } => {
                VisibilityScope::Customer(customer_id.clone())
            }
            CallerIdentity::Guest {
                merchant_id,
                session_id,
            } => VisibilityScope::GuestSession {
                merchant_id: *merchant_id,
                session_id: session_id.clone(),
            },
            CallerIdentity::Service | CallerIdentity::Admin => VisibilityScope::All,
        }
    }

    /// Visibilidad de una transaccion puntual. Para filas no-raiz el llamador
    /// pasa la raiz de la cadena, que es donde vive la sesion de invitado.
    pub fn can_view_transaction(&self, tx: &Transaction, root: Option<&Transaction>) -> bool {
        match self {
            CallerIdentity::Merchant { merchant_ids } => merchant_ids.contains(&tx.merchant_id),
            CallerIdentity::Customer { customer_id } => {
                tx.customer_id.as_deref() == Some(customer_id.as_str())
            }
            CallerIdentity::Guest {
                merchant_id,
                session_id,
            } => {
                let anchor = root.unwrap_or(tx);
                tx.merchant_id == *merchant_id
                    && anchor
                        .metadata
                        .get(METADATA_SESSION_ID)
                        .and_then(|v| v.as_str())
                        == Some(session_id.as_str())
            }
            CallerIdentity::Service | CallerIdentity::Admin => true,
        }
    }

    pub fn can_view_payment_method(&self, method: &PaymentMethod) -> bool {
        match self {
            CallerIdentity::Merchant { merchant_ids } => merchant_ids.contains(&method.merchant_id),
            CallerIdentity::Customer { customer_id } => method.customer_id == *customer_id,
            CallerIdentity::Guest { .. } => false,
            CallerIdentity::Service | CallerIdentity::Admin => true,
        }
    }
}
