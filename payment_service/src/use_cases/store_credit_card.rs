use crate::domain::access::CallerIdentity;
use crate::domain::entities::{
    NewPaymentMethod, PaymentMethod, PaymentMethodType, TransactionType, VerificationStatus,
};
use crate::domain::error::PaymentError;
use crate::domain::gateways::{card_entry, BillingInfo, GatewayOperation, PaymentGateway, RawCardData};
use crate::domain::repository::{
    AuditLogRepository, MerchantRepository, NewAuditEntry, PaymentMethodRepository,
    TransactionRepository,
};
use crate::domain::secrets::SecretStore;
use crate::domain::types::{MerchantId, PaymentMethodId};
use crate::use_cases::pipeline::{actor_label, merchant_ref_from, resolve_active_merchant};
use crate::use_cases::tokenization::{run_zero_amount_exchange, ZeroAmountExchange};
use std::sync::Arc;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct StoreCreditCardFromTokenRequest {
    pub merchant_id: Option<MerchantId>,
    pub merchant_slug: Option<String>,
    pub customer_id: String,
    /// Token de un solo uso emitido por el flujo de navegador del Gateway.
    pub financial_token: String,
    /// Datos de presentacion que el flujo de navegador entrego al cliente.
    pub last_four: String,
    pub card_brand: Option<String>,
    pub exp_month: i32,
    pub exp_year: i32,
    pub billing: BillingInfo,
    pub is_default: bool,
}

#[derive(Clone)]
pub struct StoreCreditCardDirectRequest {
    pub merchant_id: Option<MerchantId>,
    pub merchant_slug: Option<String>,
    pub customer_id: String,
    pub card_number: String,
    pub exp_month: i32,
    pub exp_year: i32,
    pub cvv: String,
    pub billing: BillingInfo,
    pub is_default: bool,
}

/// Caso de uso: almacenamiento de una tarjeta.
///
/// Dos variantes sobre el mismo nucleo: desde un token de un solo uso del
/// flujo de navegador, o desde datos digitados que se tokenizan en el
/// primer intercambio. En ambas el Gateway emite un storage token
/// persistente y luego se corre una verificacion de cuenta (auth de monto
/// cero con direccion de facturacion). Nunca se persiste PAN ni CVV: solo
/// marca, ultimos cuatro y vencimiento.
pub struct StoreCreditCardUseCase {
    transaction_repo: Arc<dyn TransactionRepository>,
    merchant_repo: Arc<dyn MerchantRepository>,
    payment_method_repo: Arc<dyn PaymentMethodRepository>,
    audit_repo: Arc<dyn AuditLogRepository>,
    gateway: Arc<dyn PaymentGateway>,
    secrets: Arc<dyn SecretStore>,
}

impl StoreCreditCardUseCase {
    pub fn new(
        transaction_repo: Arc<dyn TransactionRepository>,
        merchant_repo: Arc<dyn MerchantRepository>,
        payment_method_repo: Arc<dyn PaymentMethodRepository>,
        audit_repo: Arc<dyn AuditLogRepository>,
        gateway: Arc<dyn PaymentGateway>,
        secrets: Arc<dyn SecretStore>,
    ) -> Self {
        Self {
            transaction_repo,
            merchant_repo,
            payment_method_repo,
            audit_repo,
            gateway,
            secrets,
        }
    }

    /// Guarda una tarjeta a partir del token de un solo uso del navegador.
    pub async fn execute_from_token(
        &self,
        identity: &CallerIdentity,
        request: StoreCreditCardFromTokenRequest,
    ) -> Result<PaymentMethod, PaymentError> {
        validate_customer(&request.customer_id)?;
        validate_expiry(request.exp_month, request.exp_year)?;
        if request.financial_token.trim().is_empty() {
            return Err(PaymentError::ValidationError(
                "financial_token cannot be empty".to_string(),
            ));
        }
        if request.last_four.len() != 4 || !request.last_four.bytes().all(|b| b.is_ascii_digit()) {
            return Err(PaymentError::ValidationError(
                "last_four must be exactly 4 digits".to_string(),
            ));
        }

        let reference = merchant_ref_from(request.merchant_id, request.merchant_slug.clone())?;
        let merchant =
            resolve_active_merchant(&self.merchant_repo, identity, reference.as_ref()).await?;
        let secret = self.secrets.get_secret(&merchant.secret_path).await?;

        // Conversion del token de un solo uso en storage token
        let storage = self
            .storage_exchange(
                &merchant,
                &secret,
                &request.customer_id,
                Some(request.financial_token.clone()),
                None,
            )
            .await?;

        // Verificacion de cuenta con la direccion de facturacion
        let verification = self
            .verification_exchange(
                &merchant,
                &secret,
                &request.customer_id,
                &storage.auth_guid,
                request.billing.clone(),
            )
            .await?;

        let brand = request
            .card_brand
            .clone()
            .or_else(|| verification.auth_card_type.clone());

        self.insert_method(
            identity,
            &merchant,
            request.customer_id,
            storage.auth_guid.clone(),
            request.last_four,
            brand,
            request.exp_month,
            request.exp_year,
            request.is_default,
        )
        .await
    }

    /// Tokeniza y guarda una tarjeta digitada. El PAN y el CVV viajan al
    /// Gateway una sola vez y se descartan.
    pub async fn execute_direct(
        &self,
        identity: &CallerIdentity,
        request: StoreCreditCardDirectRequest,
    ) -> Result<PaymentMethod, PaymentError> {
        validate_customer(&request.customer_id)?;
        validate_expiry(request.exp_month, request.exp_year)?;

        let card_number = request.card_number.trim();
        if card_number.len() < 12
            || card_number.len() > 19
            || !luhn3::valid(card_number.as_bytes())
        {
            return Err(PaymentError::ValidationError(
                "card_number failed validation".to_string(),
            ));
        }
        if request.cvv.len() < 3 || request.cvv.len() > 4
            || !request.cvv.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(PaymentError::ValidationError(
                "cvv must be 3 or 4 digits".to_string(),
            ));
        }

        let reference = merchant_ref_from(request.merchant_id, request.merchant_slug.clone())?;
        let merchant =
            resolve_active_merchant(&self.merchant_repo, identity, reference.as_ref()).await?;
        let secret = self.secrets.get_secret(&merchant.secret_path).await?;

        let last_four = card_number[card_number.len() - 4..].to_string();

        // Tokenizacion directa: los datos crudos solo viajan en este paso
        let storage = self
            .storage_exchange(
                &merchant,
                &secret,
                &request.customer_id,
                None,
                Some(RawCardData {
                    number: card_number.to_string(),
                    exp_month: request.exp_month,
                    exp_year: request.exp_year,
                    cvv: request.cvv.clone(),
                }),
            )
            .await?;

        let verification = self
            .verification_exchange(
                &merchant,
                &secret,
                &request.customer_id,
                &storage.auth_guid,
                request.billing.clone(),
            )
            .await?;

        self.insert_method(
            identity,
            &merchant,
            request.customer_id,
            storage.auth_guid.clone(),
            last_four,
            verification.auth_card_type.clone(),
            request.exp_month,
            request.exp_year,
            request.is_default,
        )
        .await
    }

    async fn storage_exchange(
        &self,
        merchant: &crate::domain::entities::Merchant,
        secret: &str,
        customer_id: &str,
        one_shot_token: Option<String>,
        card: Option<RawCardData>,
    ) -> Result<crate::domain::entities::Transaction, PaymentError> {
        let entry_method = if card.is_some() {
            card_entry::KEYED
        } else {
            card_entry::TOKEN_ON_FILE
        };

        run_zero_amount_exchange(
            &self.transaction_repo,
            &self.gateway,
            merchant,
            secret,
            customer_id,
            ZeroAmountExchange {
                tran_type: TransactionType::STORAGE,
                operation: GatewayOperation::StorageToken,
                method_kind: PaymentMethodType::CREDIT_CARD,
                card_entry_method: entry_method,
                auth_guid: one_shot_token,
                card,
                ach: None,
                billing: None,
            },
        )
        .await
    }

    async fn verification_exchange(
        &self,
        merchant: &crate::domain::entities::Merchant,
        secret: &str,
        customer_id: &str,
        storage_token: &str,
        billing: BillingInfo,
    ) -> Result<crate::domain::entities::Transaction, PaymentError> {
        run_zero_amount_exchange(
            &self.transaction_repo,
            &self.gateway,
            merchant,
            secret,
            customer_id,
            ZeroAmountExchange {
                tran_type: TransactionType::AUTH,
                operation: GatewayOperation::AccountVerification,
                method_kind: PaymentMethodType::CREDIT_CARD,
                card_entry_method: card_entry::TOKEN_ON_FILE,
                auth_guid: Some(storage_token.to_string()),
                card: None,
                ach: None,
                billing: Some(billing),
            },
        )
        .await
    }

    #[allow(clippy::too_many_arguments)]
    async fn insert_method(
        &self,
        identity: &CallerIdentity,
        merchant: &crate::domain::entities::Merchant,
        customer_id: String,
        token: String,
        last_four: String,
        card_brand: Option<String>,
        exp_month: i32,
        exp_year: i32,
        is_default: bool,
    ) -> Result<PaymentMethod, PaymentError> {
        let new_method = NewPaymentMethod {
            id: PaymentMethodId::new(),
            merchant_id: merchant.id,
            customer_id,
            method_type: PaymentMethodType::CREDIT_CARD,
            token,
            last_four,
            card_brand,
            card_exp_month: Some(exp_month),
            card_exp_year: Some(exp_year),
            bank_name: None,
            account_type: None,
            routing_number_hash: None,
            is_default,
            // La verificacion de cuenta ya paso
            is_verified: true,
            verification_status: VerificationStatus::VERIFIED,
            prenote_transaction_id: None,
        };

        let method = self.payment_method_repo.create(new_method).await?;

        let entry = NewAuditEntry {
            entity_type: "payment_method".to_string(),
            entity_id: method.id.to_string(),
            action: "card_stored".to_string(),
            actor: actor_label(identity),
            detail: serde_json::json!({ "last_four": method.last_four }),
        };
        if let Err(e) = self.audit_repo.record(entry).await {
            warn!("Failed to record audit entry for {}: {}", method.id, e);
        }

        Ok(method)
    }
}

fn validate_customer(customer_id: &str) -> Result<(), PaymentError> {
    if customer_id.is_empty() || customer_id.len() > 100 {
        return Err(PaymentError::ValidationError(
            "customer_id must be between 1 and 100 characters".to_string(),
        ));
    }
    Ok(())
}

fn validate_expiry(exp_month: i32, exp_year: i32) -> Result<(), PaymentError> {
    if !(1..=12).contains(&exp_month) || !(2000..=2100).contains(&exp_year) {
        return Err(PaymentError::ValidationError(
            "card expiry is out of range".to_string(),
        ));
    }
    Ok(())
}
