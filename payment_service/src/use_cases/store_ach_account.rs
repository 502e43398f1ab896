use crate::domain::access::CallerIdentity;
use crate::domain::entities::{
    AchAccountType, NewPaymentMethod, PaymentMethod, PaymentMethodType, TransactionType,
    VerificationStatus,
};
use crate::domain::error::PaymentError;
use crate::domain::gateways::{card_entry, AchAccountData, GatewayOperation, PaymentGateway};
use crate::domain::repository::{
    AuditLogRepository, MerchantRepository, NewAuditEntry, PaymentMethodRepository,
    TransactionRepository,
};
use crate::domain::secrets::SecretStore;
use crate::domain::types::{MerchantId, PaymentMethodId};
use crate::use_cases::pipeline::{actor_label, merchant_ref_from, resolve_active_merchant};
use crate::use_cases::tokenization::{
    aba_routing_valid, run_zero_amount_exchange, sha256_hex, ZeroAmountExchange,
};
use std::sync::Arc;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct StoreAchAccountRequest {
    pub merchant_id: Option<MerchantId>,
    pub merchant_slug: Option<String>,
    pub customer_id: String,
    pub routing_number: String,
    pub account_number: String,
    pub account_type: AchAccountType,
    pub bank_name: Option<String>,
    pub is_default: bool,
}

/// Caso de uso: almacenamiento de una cuenta ACH.
///
/// Dos intercambios con el Gateway: un prenote-debit de monto cero (queda
/// registrado como transaccion PRE_NOTE) y la conversion del token del
/// prenote en storage token. El metodo nace sin verificar con estado
/// PENDING; el cron de verificaciones lo resuelve pasados tres dias y la
/// ventana de gracia de 72 horas permite debitarlo mientras tanto.
///
/// La operacion es idempotente por fingerprint: repetir el alta de la misma
/// cuenta devuelve el metodo existente sin tocar al Gateway.
pub struct StoreAchAccountUseCase {
    transaction_repo: Arc<dyn TransactionRepository>,
    merchant_repo: Arc<dyn MerchantRepository>,
    payment_method_repo: Arc<dyn PaymentMethodRepository>,
    audit_repo: Arc<dyn AuditLogRepository>,
    gateway: Arc<dyn PaymentGateway>,
    secrets: Arc<dyn SecretStore>,
}

impl StoreAchAccountUseCase {
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

    pub async fn execute(
        &self,
        identity: &CallerIdentity,
        request: StoreAchAccountRequest,
    ) -> Result<PaymentMethod, PaymentError> {
        validate(&request)?;

        let reference = merchant_ref_from(request.merchant_id, request.merchant_slug.clone())?;
        let merchant =
            resolve_active_merchant(&self.merchant_repo, identity, reference.as_ref()).await?;

        let routing_hash = sha256_hex(&request.routing_number);
        let last_four = request.account_number[request.account_number.len() - 4..].to_string();

        // Sonda de idempotencia por fingerprint
        if let Some(existing) = self
            .payment_method_repo
            .find_by_fingerprint(
                merchant.id,
                request.customer_id.clone(),
                routing_hash.clone(),
                last_four.clone(),
            )
            .await?
        {
            return Ok(existing);
        }

        let secret = self.secrets.get_secret(&merchant.secret_path).await?;

        // Paso 1: prenote de monto cero contra la cuenta cruda
        let prenote = run_zero_amount_exchange(
            &self.transaction_repo,
            &self.gateway,
            &merchant,
            &secret,
            &request.customer_id,
            ZeroAmountExchange {
                tran_type: TransactionType::PRE_NOTE,
                operation: GatewayOperation::AchPrenoteDebit,
                method_kind: PaymentMethodType::ACH,
                card_entry_method: card_entry::KEYED,
                auth_guid: None,
                card: None,
                ach: Some(AchAccountData {
                    routing_number: request.routing_number.clone(),
                    account_number: request.account_number.clone(),
                }),
                billing: None,
            },
        )
        .await?;

        // Paso 2: convertir el token del prenote en storage token persistente
        let storage = run_zero_amount_exchange(
            &self.transaction_repo,
            &self.gateway,
            &merchant,
            &secret,
            &request.customer_id,
            ZeroAmountExchange {
                tran_type: TransactionType::STORAGE,
                operation: GatewayOperation::StorageToken,
                method_kind: PaymentMethodType::ACH,
                card_entry_method: card_entry::TOKEN_ON_FILE,
                auth_guid: Some(prenote.auth_guid.clone()),
                card: None,
                ach: None,
                billing: None,
            },
        )
        .await?;

        let new_method = NewPaymentMethod {
            id: PaymentMethodId::new(),
            merchant_id: merchant.id,
            customer_id: request.customer_id.clone(),
            method_type: PaymentMethodType::ACH,
            token: storage.auth_guid.clone(),
            last_four: last_four.clone(),
            card_brand: None,
            card_exp_month: None,
            card_exp_year: None,
            bank_name: request.bank_name.clone(),
            account_type: Some(request.account_type),
            routing_number_hash: Some(routing_hash.clone()),
            is_default: request.is_default,
            is_verified: false,
            verification_status: VerificationStatus::PENDING,
            prenote_transaction_id: Some(prenote.id),
        };

        let method = match self.payment_method_repo.create(new_method).await {
            Ok(method) => method,
            Err(PaymentError::DuplicatePaymentMethod) => {
                // Carrera con otro alta identica: devolvemos la del ganador
                self.payment_method_repo
                    .find_by_fingerprint(
                        merchant.id,
                        request.customer_id.clone(),
                        routing_hash,
                        last_four,
                    )
                    .await?
                    .ok_or(PaymentError::DuplicatePaymentMethod)?
            }
            Err(e) => return Err(e),
        };

        let entry = NewAuditEntry {
            entity_type: "payment_method".to_string(),
            entity_id: method.id.to_string(),
            action: "ach_stored".to_string(),
            actor: actor_label(identity),
            detail: serde_json::json!({
                "prenote_transaction_id": prenote.id,
                "last_four": method.last_four,
            }),
        };
        if let Err(e) = self.audit_repo.record(entry).await {
            warn!("Failed to record audit entry for {}: {}", method.id, e);
        }

        Ok(method)
    }
}

fn validate(request: &StoreAchAccountRequest) -> Result<(), PaymentError> {
    if request.customer_id.is_empty() || request.customer_id.len() > 100 {
        return Err(PaymentError::ValidationError(
            "customer_id must be between 1 and 100 characters".to_string(),
        ));
    }
    if !aba_routing_valid(&request.routing_number) {
        return Err(PaymentError::ValidationError(
            "routing_number is not a valid ABA number".to_string(),
        ));
    }
    let account = &request.account_number;
    if account.len() < 4 || account.len() > 17 || !account.bytes().all(|b| b.is_ascii_digit()) {
        return Err(PaymentError::ValidationError(
            "account_number must be 4 to 17 digits".to_string(),
        ));
    }
    Ok(())
}
