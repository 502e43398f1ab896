use crate::domain::access::CallerIdentity;
use crate::domain::entities::{Transaction, RETURN_COUNT_DEACTIVATION_THRESHOLD};
use crate::domain::error::PaymentError;
use crate::domain::gateways::BillingInfo;
use crate::domain::repository::{
    AuditLogRepository, GatewayReconcile, MerchantRepository, NewAuditEntry,
    PaymentMethodRepository, TransactionRepository,
};
use crate::domain::secrets::SecretStore;
use crate::domain::state::METADATA_RETURN_CODE;
use crate::use_cases::store_credit_card::{StoreCreditCardFromTokenRequest, StoreCreditCardUseCase};
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use std::sync::Arc;
use tracing::warn;

type HmacSha256 = Hmac<Sha256>;

/// Codigos de retorno ACH que invalidan la cuenta de inmediato: cuenta
/// cerrada, inexistente, numero invalido, debito no autorizado, autorizacion
/// revocada y cliente-no-autorizado.
pub const CRITICAL_RETURN_CODES: [&str; 7] = ["R02", "R03", "R04", "R05", "R07", "R10", "R29"];

pub fn is_critical_return_code(code: &str) -> bool {
    CRITICAL_RETURN_CODES.contains(&code)
}

/// MAC del callback: HMAC-SHA256 en hex minuscula sobre
/// `tran_nbr|auth_resp|auth_guid|amount`, con el secreto del comercio.
pub fn compute_callback_mac(
    secret: &str,
    tran_nbr: &str,
    auth_resp: &str,
    auth_guid: &str,
    amount: &str,
) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(format!("{}|{}|{}|{}", tran_nbr, auth_resp, auth_guid, amount).as_bytes());

    let digest = mac.finalize().into_bytes();
    let mut out = String::with_capacity(64);
    for byte in digest {
        out.push_str(&format!("{:02x}", byte));
    }
    out
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.bytes().zip(b.bytes()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CallbackKind {
    /// Resultado de un pago iniciado en el flujo de navegador.
    Payment,
    /// Retorno ACH referido a una transaccion previa.
    Return,
}

/// Payload form-encoded que el Gateway envia al ingress de callbacks.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayCallbackPayload {
    pub merchant_slug: String,
    pub kind: CallbackKind,
    pub tran_nbr: String,
    #[serde(default)]
    pub auth_guid: String,
    #[serde(default)]
    pub auth_resp: String,
    pub auth_resp_text: Option<String>,
    pub auth_code: Option<String>,
    pub auth_card_type: Option<String>,
    /// Eco del monto en formato "D.CC"; participa en el MAC.
    pub amount: String,
    pub mac: String,
    pub return_code: Option<String>,
    /// "1" cuando el comprador pidio guardar la tarjeta.
    pub save_card: Option<String>,
    pub customer_id: Option<String>,
    pub last_four: Option<String>,
    pub card_brand: Option<String>,
    pub exp_month: Option<i32>,
    pub exp_year: Option<i32>,
}

#[derive(Debug)]
pub enum CallbackOutcome {
    Payment(Transaction),
    AchReturn { method_deactivated: bool },
}

/// Caso de uso: ingreso de callbacks del Gateway.
///
/// Verifica la autenticidad del payload con el HMAC del comercio y rutea
/// por el tipo declarado: los resultados de pago concilian la fila
/// pendiente (y disparan el guardado de tarjeta si el comprador lo pidio);
/// los retornos ACH registran el codigo y castigan al metodo de pago.
pub struct HandleGatewayCallbackUseCase {
    transaction_repo: Arc<dyn TransactionRepository>,
    merchant_repo: Arc<dyn MerchantRepository>,
    payment_method_repo: Arc<dyn PaymentMethodRepository>,
    audit_repo: Arc<dyn AuditLogRepository>,
    secrets: Arc<dyn SecretStore>,
    store_credit_card: Arc<StoreCreditCardUseCase>,
}

impl HandleGatewayCallbackUseCase {
    pub fn new(
        transaction_repo: Arc<dyn TransactionRepository>,
        merchant_repo: Arc<dyn MerchantRepository>,
        payment_method_repo: Arc<dyn PaymentMethodRepository>,
        audit_repo: Arc<dyn AuditLogRepository>,
        secrets: Arc<dyn SecretStore>,
        store_credit_card: Arc<StoreCreditCardUseCase>,
    ) -> Self {
        Self {
            transaction_repo,
            merchant_repo,
            payment_method_repo,
            audit_repo,
            secrets,
            store_credit_card,
        }
    }

    pub async fn execute(
        &self,
        payload: GatewayCallbackPayload,
    ) -> Result<CallbackOutcome, PaymentError> {
        let merchant = self
            .merchant_repo
            .find_by_slug(payload.merchant_slug.clone())
            .await?
            .ok_or_else(|| PaymentError::NotFound("Merchant".to_string()))?;

        let secret = self.secrets.get_secret(&merchant.secret_path).await?;
        let expected = compute_callback_mac(
            &secret,
            &payload.tran_nbr,
            &payload.auth_resp,
            &payload.auth_guid,
            &payload.amount,
        );
        if !constant_time_eq(&expected, &payload.mac.to_lowercase()) {
            return Err(PaymentError::ValidationError(
                "invalid callback signature".to_string(),
            ));
        }

        let tx = self
            .transaction_repo
            .find_by_tran_nbr(payload.tran_nbr.clone())
            .await?
            .ok_or_else(|| PaymentError::NotFound("Transaction".to_string()))?;

        if tx.merchant_id != merchant.id {
            return Err(PaymentError::NotFound("Transaction".to_string()));
        }

        match payload.kind {
            CallbackKind::Payment => self.handle_payment(merchant, payload).await,
            CallbackKind::Return => self.handle_return(tx, payload).await,
        }
    }

    async fn handle_payment(
        &self,
        merchant: crate::domain::entities::Merchant,
        payload: GatewayCallbackPayload,
    ) -> Result<CallbackOutcome, PaymentError> {
        let mut detail = serde_json::Map::new();
        if let Some(text) = &payload.auth_resp_text {
            detail.insert("auth_resp_text".to_string(), serde_json::json!(text));
        }

        let reconciled = self
            .transaction_repo
            .update_from_gateway_response(
                payload.tran_nbr.clone(),
                GatewayReconcile {
                    auth_guid: payload.auth_guid.clone(),
                    auth_resp: payload.auth_resp.clone(),
                    auth_code: payload.auth_code.clone(),
                    auth_card_type: payload.auth_card_type.clone(),
                    metadata: serde_json::Value::Object(detail),
                    processed_at: Utc::now(),
                },
            )
            .await?;

        // Conversion a storage token si el comprador pidio guardar la tarjeta
        if payload.save_card.as_deref() == Some("1") && reconciled.is_approved() {
            match (
                payload.customer_id.clone(),
                payload.last_four.clone(),
                payload.exp_month,
                payload.exp_year,
            ) {
                (Some(customer_id), Some(last_four), Some(exp_month), Some(exp_year)) => {
                    let request = StoreCreditCardFromTokenRequest {
                        merchant_id: Some(merchant.id),
                        merchant_slug: None,
                        customer_id,
                        financial_token: payload.auth_guid.clone(),
                        last_four,
                        card_brand: payload.card_brand.clone(),
                        exp_month,
                        exp_year,
                        billing: BillingInfo::default(),
                        is_default: false,
                    };
                    if let Err(e) = self
                        .store_credit_card
                        .execute_from_token(&CallerIdentity::Service, request)
                        .await
                    {
                        // El pago ya quedo conciliado; el guardado fallido no
                        // lo revierte
                        warn!(
                            "save-card conversion failed for tran_nbr {}: {}",
                            payload.tran_nbr, e
                        );
                    }
                }
                _ => warn!(
                    "save-card requested for tran_nbr {} without card display data",
                    payload.tran_nbr
                ),
            }
        }

        Ok(CallbackOutcome::Payment(reconciled))
    }

    async fn handle_return(
        &self,
        tx: Transaction,
        payload: GatewayCallbackPayload,
    ) -> Result<CallbackOutcome, PaymentError> {
        let code = payload.return_code.clone().ok_or_else(|| {
            PaymentError::ValidationError("return_code is required for RETURN callbacks".to_string())
        })?;

        self.transaction_repo
            .append_metadata(tx.id, METADATA_RETURN_CODE.to_string(), serde_json::json!(code))
            .await?;

        // El retorno puede referir a un cobro (metodo en la fila) o a un
        // prenote (metodo colgado del prenote)
        let method = match tx.payment_method_id {
            Some(method_id) => self.payment_method_repo.find_by_id(method_id).await?,
            None => {
                self.payment_method_repo
                    .find_by_prenote_transaction(tx.id)
                    .await?
            }
        };

        let Some(method) = method else {
            warn!(
                "ACH return {} for tran_nbr {} has no associated payment method",
                code, payload.tran_nbr
            );
            return Ok(CallbackOutcome::AchReturn {
                method_deactivated: false,
            });
        };

        let deactivated = if is_critical_return_code(&code) {
            self.payment_method_repo
                .mark_verification_failed(method.id, code.clone())
                .await?;
            true
        } else {
            let updated = self
                .payment_method_repo
                .increment_return_count(method.id, RETURN_COUNT_DEACTIVATION_THRESHOLD)
                .await?;
            !updated.is_active
        };

        let entry = NewAuditEntry {
            entity_type: "payment_method".to_string(),
            entity_id: method.id.to_string(),
            action: "ach_return".to_string(),
            actor: "gateway-callback".to_string(),
            detail: serde_json::json!({
                "return_code": code,
                "critical": is_critical_return_code(&code),
                "deactivated": deactivated,
            }),
        };
        if let Err(e) = self.audit_repo.record(entry).await {
            warn!("Failed to record audit entry for {}: {}", method.id, e);
        }

        Ok(CallbackOutcome::AchReturn {
            method_deactivated: deactivated,
        })
    }
}
