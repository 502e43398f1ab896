#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mockall::mock;
use payment_service::domain::entities::{
    AchAccountType, Merchant, MerchantTier, NewMerchant, NewPaymentMethod, NewTransaction,
    PaymentMethod, PaymentMethodType, Transaction, TransactionStatus, VerificationStatus,
};
use payment_service::domain::error::PaymentError;
use payment_service::domain::gateways::{GatewayRequest, GatewayResponse, PaymentGateway};
use payment_service::domain::repository::{
    AuditLogRepository, GatewayReconcile, MerchantRepository, NewAuditEntry,
    PaymentMethodRepository, TransactionFilter, TransactionRepository,
};
use payment_service::domain::secrets::SecretStore;
use payment_service::domain::state::{FollowUpRequest, GroupState};
use payment_service::domain::types::{MerchantId, PaymentMethodId, TransactionId};

mock! {
    pub TransactionRepo {}

    #[async_trait]
    impl TransactionRepository for TransactionRepo {
        async fn create(&self, new_tx: NewTransaction) -> Result<Transaction, PaymentError>;
        async fn create_in_group(
            &self,
            root_id: TransactionId,
            request: FollowUpRequest,
        ) -> Result<(Transaction, GroupState), PaymentError>;
        async fn find_by_id(&self, id: TransactionId) -> Result<Option<Transaction>, PaymentError>;
        async fn find_by_tran_nbr(&self, tran_nbr: String) -> Result<Option<Transaction>, PaymentError>;
        async fn find_group(&self, root_id: TransactionId) -> Result<Vec<Transaction>, PaymentError>;
        async fn update_from_gateway_response(
            &self,
            tran_nbr: String,
            update: GatewayReconcile,
        ) -> Result<Transaction, PaymentError>;
        async fn append_metadata(
            &self,
            id: TransactionId,
            key: String,
            value: serde_json::Value,
        ) -> Result<(), PaymentError>;
        async fn list(&self, filter: TransactionFilter) -> Result<(Vec<Transaction>, i64), PaymentError>;
    }
}

mock! {
    pub MerchantRepo {}

    #[async_trait]
    impl MerchantRepository for MerchantRepo {
        async fn create(&self, merchant: NewMerchant) -> Result<Merchant, PaymentError>;
        async fn find_by_id(&self, id: MerchantId) -> Result<Option<Merchant>, PaymentError>;
        async fn find_by_slug(&self, slug: String) -> Result<Option<Merchant>, PaymentError>;
        async fn set_active(&self, id: MerchantId, active: bool) -> Result<(), PaymentError>;
    }
}

mock! {
    pub PaymentMethodRepo {}

    #[async_trait]
    impl PaymentMethodRepository for PaymentMethodRepo {
        async fn create(&self, method: NewPaymentMethod) -> Result<PaymentMethod, PaymentError>;
        async fn find_by_id(&self, id: PaymentMethodId) -> Result<Option<PaymentMethod>, PaymentError>;
        async fn find_by_fingerprint(
            &self,
            merchant_id: MerchantId,
            customer_id: String,
            routing_number_hash: String,
            last_four: String,
        ) -> Result<Option<PaymentMethod>, PaymentError>;
        async fn list_by_customer(
            &self,
            merchant_id: MerchantId,
            customer_id: String,
            include_inactive: bool,
        ) -> Result<Vec<PaymentMethod>, PaymentError>;
        async fn find_default(
            &self,
            merchant_id: MerchantId,
            customer_id: String,
        ) -> Result<Option<PaymentMethod>, PaymentError>;
        async fn mark_used(&self, id: PaymentMethodId) -> Result<(), PaymentError>;
        async fn deactivate(&self, id: PaymentMethodId, reason: String) -> Result<(), PaymentError>;
        async fn find_pending_ach_verifications(
            &self,
            older_than: DateTime<Utc>,
            limit: i64,
        ) -> Result<Vec<PaymentMethod>, PaymentError>;
        async fn mark_verified(
            &self,
            id: PaymentMethodId,
            verified_at: DateTime<Utc>,
        ) -> Result<(), PaymentError>;
        async fn mark_verification_failed(
            &self,
            id: PaymentMethodId,
            reason: String,
        ) -> Result<(), PaymentError>;
        async fn increment_return_count(
            &self,
            id: PaymentMethodId,
            auto_deactivate_threshold: i32,
        ) -> Result<PaymentMethod, PaymentError>;
        async fn find_by_prenote_transaction(
            &self,
            transaction_id: TransactionId,
        ) -> Result<Option<PaymentMethod>, PaymentError>;
    }
}

mock! {
    pub AuditRepo {}

    #[async_trait]
    impl AuditLogRepository for AuditRepo {
        async fn record(&self, entry: NewAuditEntry) -> Result<(), PaymentError>;
    }
}

mock! {
    pub Gateway {}

    #[async_trait]
    impl PaymentGateway for Gateway {
        async fn process(&self, request: GatewayRequest) -> Result<GatewayResponse, PaymentError>;
    }
}

mock! {
    pub Secrets {}

    #[async_trait]
    impl SecretStore for Secrets {
        async fn get_secret(&self, path: &str) -> Result<String, PaymentError>;
    }
}

// ---------------------------------------------------------------------------
// Builders compartidos por los escenarios

pub fn active_merchant(id: MerchantId) -> Merchant {
    Merchant {
        id,
        slug: "acme".to_string(),
        cust_nbr: "9001".to_string(),
        merch_nbr: "900300".to_string(),
        dba_nbr: "1".to_string(),
        terminal_nbr: "3".to_string(),
        secret_path: "merchants/acme/gateway".to_string(),
        is_active: true,
        tier: MerchantTier::STANDARD,
        created_at: Utc::now(),
    }
}

pub fn card_method(merchant_id: MerchantId, customer_id: &str) -> PaymentMethod {
    PaymentMethod {
        id: PaymentMethodId::new(),
        merchant_id,
        customer_id: customer_id.to_string(),
        method_type: PaymentMethodType::CREDIT_CARD,
        token: "STORAGE-VISA-0001".to_string(),
        last_four: "4242".to_string(),
        card_brand: Some("VISA".to_string()),
        card_exp_month: Some(12),
        card_exp_year: Some(2030),
        bank_name: None,
        account_type: None,
        routing_number_hash: None,
        is_default: true,
        is_active: true,
        is_verified: true,
        verification_status: VerificationStatus::VERIFIED,
        prenote_transaction_id: None,
        verified_at: Some(Utc::now()),
        verification_failure_reason: None,
        return_count: 0,
        deactivation_reason: None,
        deactivated_at: None,
        last_used_at: None,
        created_at: Utc::now(),
    }
}

pub fn ach_method(
    merchant_id: MerchantId,
    customer_id: &str,
    created_at: DateTime<Utc>,
    status: VerificationStatus,
) -> PaymentMethod {
    PaymentMethod {
        id: PaymentMethodId::new(),
        merchant_id,
        customer_id: customer_id.to_string(),
        method_type: PaymentMethodType::ACH,
        token: "STORAGE-ACH-0001".to_string(),
        last_four: "6789".to_string(),
        card_brand: None,
        card_exp_month: None,
        card_exp_year: None,
        bank_name: Some("Test Bank".to_string()),
        account_type: Some(AchAccountType::CHECKING),
        routing_number_hash: Some("hash".to_string()),
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

/// Construye la fila pendiente exactamente como la insertaria el repositorio.
pub fn tx_from_new(new_tx: &NewTransaction) -> Transaction {
    Transaction {
        id: new_tx.id,
        parent_transaction_id: new_tx.parent_transaction_id,
        merchant_id: new_tx.merchant_id,
        customer_id: new_tx.customer_id.clone(),
        subscription_id: new_tx.subscription_id.clone(),
        amount_cents: new_tx.amount_cents,
        currency: new_tx.currency.clone(),
        tran_type: new_tx.tran_type,
        payment_method_type: new_tx.payment_method_type,
        payment_method_id: new_tx.payment_method_id,
        tran_nbr: new_tx.tran_nbr(),
        auth_guid: String::new(),
        auth_resp: String::new(),
        auth_code: None,
        auth_card_type: None,
        metadata: new_tx.metadata.clone(),
        status: TransactionStatus::PENDING,
        processed_at: None,
        created_at: Utc::now(),
    }
}

/// Aplica la conciliacion como lo haria el UPDATE del repositorio,
/// incluyendo la columna derivada de estado y la inmutabilidad del
/// auth_guid.
pub fn apply_reconcile(mut tx: Transaction, update: &GatewayReconcile) -> Transaction {
    if tx.auth_guid.is_empty() {
        tx.auth_guid = update.auth_guid.clone();
    }
    tx.auth_resp = update.auth_resp.clone();
    tx.auth_code = update.auth_code.clone();
    tx.auth_card_type = update.auth_card_type.clone();
    if let (Some(base), Some(patch)) = (tx.metadata.as_object_mut(), update.metadata.as_object()) {
        for (key, value) in patch {
            base.insert(key.clone(), value.clone());
        }
    }
    tx.processed_at = Some(update.processed_at);
    tx.status = match tx.auth_resp.as_str() {
        "" => TransactionStatus::PENDING,
        "00" => TransactionStatus::APPROVED,
        _ => TransactionStatus::DECLINED,
    };
    tx
}

pub fn approved_response(auth_guid: &str) -> GatewayResponse {
    GatewayResponse {
        auth_guid: auth_guid.to_string(),
        auth_resp: "00".to_string(),
        auth_resp_text: "APPROVAL".to_string(),
        auth_code: Some("A1234".to_string()),
        auth_card_type: Some("V".to_string()),
        avs_resp: Some("Y".to_string()),
        cvv_resp: Some("M".to_string()),
    }
}

pub fn declined_response(code: &str) -> GatewayResponse {
    GatewayResponse {
        auth_guid: String::new(),
        auth_resp: code.to_string(),
        auth_resp_text: "DECLINE".to_string(),
        auth_code: None,
        auth_card_type: None,
        avs_resp: None,
        cvv_resp: None,
    }
}

pub fn approved(mut tx: Transaction, auth_guid: &str) -> Transaction {
    tx.auth_guid = auth_guid.to_string();
    tx.auth_resp = "00".to_string();
    tx.status = TransactionStatus::APPROVED;
    tx.processed_at = Some(Utc::now());
    tx
}
