use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use uuid::Uuid;

/// Identificador de Comercio usando NewType Pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(transparent)]
pub struct MerchantId(pub Uuid);

impl MerchantId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for MerchantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identificador de Transaccion usando NewType Pattern.
///
/// El llamador lo provee como llave de idempotencia: es la primary key del
/// ledger, por lo que reintentar con el mismo id nunca duplica un cobro.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(transparent)]
pub struct TransactionId(pub Uuid);

impl TransactionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identificador de Metodo de Pago usando NewType Pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(transparent)]
pub struct PaymentMethodId(pub Uuid);

impl PaymentMethodId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for PaymentMethodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Deriva el `tran_nbr` de 10 digitos que el Gateway usa para deduplicar.
///
/// Funcion fija y pura: SHA-256 sobre los 16 bytes crudos del UUID, los
/// primeros 8 bytes interpretados como u64 big-endian, modulo 10^10, con
/// ceros a la izquierda hasta completar 10 digitos ASCII.
///
/// La idempotencia del Gateway depende de que dos procesos deriven la misma
/// cadena del mismo UUID; esta funcion no debe cambiar entre despliegues.
///
/// # Examples
/// ```
/// use payment_service::domain::types::{derive_tran_nbr, TransactionId};
/// use uuid::Uuid;
///
/// let id = TransactionId(Uuid::nil());
/// assert_eq!(derive_tran_nbr(id).len(), 10);
/// ```
pub fn derive_tran_nbr(id: TransactionId) -> String {
    let digest = Sha256::digest(id.0.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    let folded = u64::from_be_bytes(prefix) % 10_000_000_000;
    format!("{:010}", folded)
}

/// Formatea centavos enteros como el monto `"D.CC"` que espera el Gateway.
///
/// # Examples
/// ```
/// use payment_service::domain::types::format_cents;
///
/// assert_eq!(format_cents(2500), "25.00");
/// assert_eq!(format_cents(0), "0.00");
/// assert_eq!(format_cents(7), "0.07");
/// ```
pub fn format_cents(amount_cents: i64) -> String {
    format!("{}.{:02}", amount_cents / 100, amount_cents % 100)
}
