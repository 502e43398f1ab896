use crate::domain::error::PaymentError;
use crate::domain::types::{derive_tran_nbr, MerchantId, PaymentMethodId, TransactionId};
use chrono::{DateTime, Datelike, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Ventana de gracia ACH: los debitos sobre un metodo no verificado solo se
/// permiten durante las primeras 72 horas desde su creacion.
pub const ACH_GRACE_WINDOW_HOURS: i64 = 72;

/// Numero de retornos ACH no criticos que desactiva el metodo automaticamente.
pub const RETURN_COUNT_DEACTIVATION_THRESHOLD: i32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "transaction_status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    PENDING,
    APPROVED,
    DECLINED,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "transaction_type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    SALE,
    AUTH,
    CAPTURE,
    VOID,
    REFUND,
    PRE_NOTE,
    STORAGE,
}

impl TransactionType {
    /// Los tipos raiz inician una cadena; todos los demas apuntan a un padre.
    pub fn is_root(&self) -> bool {
        matches!(
            self,
            TransactionType::SALE
                | TransactionType::AUTH
                | TransactionType::PRE_NOTE
                | TransactionType::STORAGE
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "payment_method_type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethodType {
    CREDIT_CARD,
    ACH,
    PINLESS_DEBIT,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "verification_status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerificationStatus {
    PENDING,
    VERIFIED,
    FAILED,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "ach_account_type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AchAccountType {
    CHECKING,
    SAVINGS,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "merchant_tier", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MerchantTier {
    STANDARD,
    PREMIUM,
    ENTERPRISE,
}

/// Modelo de Entidad: Merchant.
/// Identidad de un tenant. Inmutable una vez creado, excepto el flag activo.
/// Los secretos nunca viven aqui, solo el puntero `secret_path` al resolver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Merchant {
    pub id: MerchantId,
    pub slug: String,
    pub cust_nbr: String,
    pub merch_nbr: String,
    pub dba_nbr: String,
    pub terminal_nbr: String,
    pub secret_path: String,
    pub is_active: bool,
    pub tier: MerchantTier,
    pub created_at: DateTime<Utc>,
}

pub struct NewMerchant {
    pub id: MerchantId,
    pub slug: String,
    pub cust_nbr: String,
    pub merch_nbr: String,
    pub dba_nbr: String,
    pub terminal_nbr: String,
    pub secret_path: String,
    pub tier: MerchantTier,
}

/// Modelo de Entidad: PaymentMethod.
/// Instrumento tokenizado propiedad de (comercio, cliente). El `token` es el
/// storage token persistente emitido por el Gateway; nunca se almacena PAN
/// ni codigo de verificacion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentMethod {
    pub id: PaymentMethodId,
    pub merchant_id: MerchantId,
    pub customer_id: String,
    pub method_type: PaymentMethodType,
    pub token: String,
    pub last_four: String,
    pub card_brand: Option<String>,
    pub card_exp_month: Option<i32>,
    pub card_exp_year: Option<i32>,
    pub bank_name: Option<String>,
    pub account_type: Option<AchAccountType>,
    pub routing_number_hash: Option<String>,
    pub is_default: bool,
    pub is_active: bool,
    pub is_verified: bool,
    pub verification_status: VerificationStatus,
    pub prenote_transaction_id: Option<TransactionId>,
    pub verified_at: Option<DateTime<Utc>>,
    pub verification_failure_reason: Option<String>,
    pub return_count: i32,
    pub deactivation_reason: Option<String>,
    pub deactivated_at: Option<DateTime<Utc>>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl PaymentMethod {
    /// Una tarjeta expira al terminar su mes de vencimiento.
    pub fn is_card_expired(&self, now: DateTime<Utc>) -> bool {
        match (self.card_exp_year, self.card_exp_month) {
            (Some(year), Some(month)) => {
                (year, month) < (now.year(), now.month() as i32)
            }
            _ => false,
        }
    }

    /// Un metodo ACH sin verificar sigue siendo debitable durante la ventana
    /// de gracia de 72 horas desde su creacion.
    pub fn is_within_ach_grace(&self, now: DateTime<Utc>) -> bool {
        now - self.created_at < Duration::hours(ACH_GRACE_WINDOW_HOURS)
    }

    /// Valida que el metodo pueda usarse para iniciar un cobro ahora.
    pub fn ensure_usable(&self, now: DateTime<Utc>) -> Result<(), PaymentError> {
        if !self.is_active {
            return Err(PaymentError::PaymentMethodInactive);
        }

        match self.method_type {
            PaymentMethodType::CREDIT_CARD | PaymentMethodType::PINLESS_DEBIT => {
                if self.is_card_expired(now) {
                    return Err(PaymentError::PaymentMethodExpired);
                }
            }
            PaymentMethodType::ACH => match self.verification_status {
                VerificationStatus::VERIFIED => {}
                VerificationStatus::PENDING if self.is_within_ach_grace(now) => {}
                _ => return Err(PaymentError::PaymentMethodNotVerified),
            },
        }

        Ok(())
    }
}

pub struct NewPaymentMethod {
    pub id: PaymentMethodId,
    pub merchant_id: MerchantId,
    pub customer_id: String,
    pub method_type: PaymentMethodType,
    pub token: String,
    pub last_four: String,
    pub card_brand: Option<String>,
    pub card_exp_month: Option<i32>,
    pub card_exp_year: Option<i32>,
    pub bank_name: Option<String>,
    pub account_type: Option<AchAccountType>,
    pub routing_number_hash: Option<String>,
    pub is_default: bool,
    pub is_verified: bool,
    pub verification_status: VerificationStatus,
    pub prenote_transaction_id: Option<TransactionId>,
}

/// Modelo de Entidad: Transaction.
/// Atomo del ledger append-only. Las cadenas se enlazan por
/// `parent_transaction_id` y su estado se recalcula por replay, nunca se
/// desnormaliza sobre la fila del auth.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub parent_transaction_id: Option<TransactionId>,
    pub merchant_id: MerchantId,
    pub customer_id: Option<String>,
    pub subscription_id: Option<String>,
    pub amount_cents: i64,
    pub currency: String,
    pub tran_type: TransactionType,
    pub payment_method_type: PaymentMethodType,
    pub payment_method_id: Option<PaymentMethodId>,
    pub tran_nbr: String,
    // Token que el Gateway devolvio para ESTA transaccion; inmutable una vez
    // escrito no-vacio
    pub auth_guid: String,
    pub auth_resp: String,
    pub auth_code: Option<String>,
    pub auth_card_type: Option<String>,
    pub metadata: serde_json::Value,
    pub status: TransactionStatus,
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    /// Una fila esta conciliada cuando el Gateway ya respondio por ella.
    pub fn is_reconciled(&self) -> bool {
        !self.auth_resp.is_empty()
    }

    pub fn is_approved(&self) -> bool {
        self.status == TransactionStatus::APPROVED
    }
}

/// Parametros de insercion de una transaccion pendiente.
///
/// El `tran_nbr` no es un campo: se deriva siempre del id para que un
/// reintento tras un crash reconstruya exactamente la misma llave de
/// deduplicacion del Gateway.
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub id: TransactionId,
    pub parent_transaction_id: Option<TransactionId>,
    pub merchant_id: MerchantId,
    pub customer_id: Option<String>,
    pub subscription_id: Option<String>,
    pub amount_cents: i64,
    pub currency: String,
    pub tran_type: TransactionType,
    pub payment_method_type: PaymentMethodType,
    pub payment_method_id: Option<PaymentMethodId>,
    pub metadata: serde_json::Value,
}

impl NewTransaction {
    pub fn tran_nbr(&self) -> String {
        derive_tran_nbr(self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ach_method(created_at: DateTime<Utc>, status: VerificationStatus) -> PaymentMethod {
        PaymentMethod {
            id: PaymentMethodId::new(),
            merchant_id: MerchantId::new(),
            customer_id: "cust-001".to_string(),
            method_type: PaymentMethodType::ACH,
            token: "STORAGE-TOKEN".to_string(),
            last_four: "6789".to_string(),
            card_brand: None,
            card_exp_month: None,
            card_exp_year: None,
            bank_name: Some("Test Bank".to_string()),
            account_type: Some(AchAccountType::CHECKING),
            routing_number_hash: Some("abc123".to_string()),
            is_default: false,
            is_active: true,
            is_verified: status == VerificationStatus::VERIFIED,
            verification_status: status,
            prenote_transaction_id: Some(TransactionId::new()),
            verified_at: None,
            verification_failure_reason: None,
            return_count: 0,
            deactivation_reason: None,
            deactivated_at: None,
            last_used_at: None,
            created_at,
        }
    }

    #[test]
    fn test_ach_grace_window_allows_recent_unverified_method() {
        let created = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let method = ach_method(created, VerificationStatus::PENDING);

        // Un dia despues: dentro de la ventana de 72 horas
        let now = created + Duration::days(1);
        assert!(method.ensure_usable(now).is_ok());
    }

    #[test]
    fn test_ach_grace_window_rejects_old_unverified_method() {
        let created = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let method = ach_method(created, VerificationStatus::PENDING);

        // Cuatro dias despues: fuera de la ventana
        let now = created + Duration::days(4);
        assert_eq!(
            method.ensure_usable(now),
            Err(PaymentError::PaymentMethodNotVerified)
        );
    }

    #[test]
    fn test_ach_grace_window_boundary_is_exclusive() {
        let created = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let method = ach_method(created, VerificationStatus::PENDING);

        let now = created + Duration::hours(ACH_GRACE_WINDOW_HOURS);
        assert_eq!(
            method.ensure_usable(now),
            Err(PaymentError::PaymentMethodNotVerified)
        );
    }

    #[test]
    fn test_verified_ach_method_is_usable_after_grace() {
        let created = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let method = ach_method(created, VerificationStatus::VERIFIED);

        let now = created + Duration::days(30);
        assert!(method.ensure_usable(now).is_ok());
    }

    #[test]
    fn test_inactive_method_is_rejected_before_anything_else() {
        let created = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let mut method = ach_method(created, VerificationStatus::VERIFIED);
        method.is_active = false;

        assert_eq!(
            method.ensure_usable(created),
            Err(PaymentError::PaymentMethodInactive)
        );
    }

    #[test]
    fn test_expired_card_is_rejected() {
        let created = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let mut method = ach_method(created, VerificationStatus::VERIFIED);
        method.method_type = PaymentMethodType::CREDIT_CARD;
        method.card_exp_month = Some(5);
        method.card_exp_year = Some(2025);

        // Junio 2025: la tarjeta vencio en mayo
        assert_eq!(
            method.ensure_usable(created),
            Err(PaymentError::PaymentMethodExpired)
        );

        // Durante el mes de vencimiento la tarjeta sigue vigente
        method.card_exp_month = Some(6);
        assert!(method.ensure_usable(created).is_ok());
    }
}
