use crate::domain::entities::{
    AchAccountType, Merchant, MerchantTier, PaymentMethod, PaymentMethodType, Transaction,
    TransactionStatus, TransactionType, VerificationStatus,
};
use crate::domain::types::{MerchantId, PaymentMethodId, TransactionId};
use chrono::{DateTime, Utc};
use sqlx::FromRow;

#[derive(Debug, FromRow)]
pub struct MerchantModel {
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

impl From<MerchantModel> for Merchant {
    fn from(m: MerchantModel) -> Self {
        Self {
            id: m.id,
            slug: m.slug,
            cust_nbr: m.cust_nbr,
            merch_nbr: m.merch_nbr,
            dba_nbr: m.dba_nbr,
            terminal_nbr: m.terminal_nbr,
            secret_path: m.secret_path,
            is_active: m.is_active,
            tier: m.tier,
            created_at: m.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
pub struct PaymentMethodModel {
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

impl From<PaymentMethodModel> for PaymentMethod {
    fn from(m: PaymentMethodModel) -> Self {
        Self {
            id: m.id,
            merchant_id: m.merchant_id,
            customer_id: m.customer_id,
            method_type: m.method_type,
            token: m.token,
            last_four: m.last_four,
            card_brand: m.card_brand,
            card_exp_month: m.card_exp_month,
            card_exp_year: m.card_exp_year,
            bank_name: m.bank_name,
            account_type: m.account_type,
            routing_number_hash: m.routing_number_hash,
            is_default: m.is_default,
            is_active: m.is_active,
            is_verified: m.is_verified,
            verification_status: m.verification_status,
            prenote_transaction_id: m.prenote_transaction_id,
            verified_at: m.verified_at,
            verification_failure_reason: m.verification_failure_reason,
            return_count: m.return_count,
            deactivation_reason: m.deactivation_reason,
            deactivated_at: m.deactivated_at,
            last_used_at: m.last_used_at,
            created_at: m.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
pub struct TransactionModel {
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
    pub auth_guid: String,
    pub auth_resp: String,
    pub auth_code: Option<String>,
    pub auth_card_type: Option<String>,
    pub metadata: serde_json::Value,
    pub status: TransactionStatus,
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<TransactionModel> for Transaction {
    fn from(m: TransactionModel) -> Self {
        Self {
            id: m.id,
            parent_transaction_id: m.parent_transaction_id,
            merchant_id: m.merchant_id,
            customer_id: m.customer_id,
            subscription_id: m.subscription_id,
            amount_cents: m.amount_cents,
            currency: m.currency,
            tran_type: m.tran_type,
            payment_method_type: m.payment_method_type,
            payment_method_id: m.payment_method_id,
            tran_nbr: m.tran_nbr,
            auth_guid: m.auth_guid,
            auth_resp: m.auth_resp,
            auth_code: m.auth_code,
            auth_card_type: m.auth_card_type,
            metadata: m.metadata,
            status: m.status,
            processed_at: m.processed_at,
            created_at: m.created_at,
        }
    }
}
