use crate::domain::entities::{
    Merchant, NewTransaction, PaymentMethodType, Transaction, TransactionType,
};
use crate::domain::error::PaymentError;
use crate::domain::gateways::{
    tran_group, AchAccountData, BillingInfo, GatewayOperation, GatewayRequest, PaymentGateway,
    RawCardData,
};
use crate::domain::repository::TransactionRepository;
use crate::domain::types::{format_cents, TransactionId};
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// Divisa de las transacciones de tokenizacion de monto cero.
pub(crate) const ZERO_AMOUNT_CURRENCY: &str = "USD";

/// Un intercambio de monto cero con el Gateway (prenote, conversion a
/// storage token, verificacion de cuenta), registrado como transaccion raiz.
pub(crate) struct ZeroAmountExchange {
    pub tran_type: TransactionType,
    pub operation: GatewayOperation,
    pub method_kind: PaymentMethodType,
    pub card_entry_method: &'static str,
    pub auth_guid: Option<String>,
    pub card: Option<RawCardData>,
    pub ach: Option<AchAccountData>,
    pub billing: Option<BillingInfo>,
}

/// Ejecuta el intercambio: fila pendiente, llamada al Gateway, conciliacion.
///
/// Sigue el mismo contrato de fallas del pipeline: un error de transporte
/// deja la fila PENDING; un rechazo del Gateway se concilia y se reporta
/// como `GatewayDeclined` porque aqui no hay cobro que devolver.
pub(crate) async fn run_zero_amount_exchange(
    transaction_repo: &Arc<dyn TransactionRepository>,
    gateway: &Arc<dyn PaymentGateway>,
    merchant: &Merchant,
    shared_secret: &str,
    customer_id: &str,
    exchange: ZeroAmountExchange,
) -> Result<Transaction, PaymentError> {
    let new_tx = NewTransaction {
        id: TransactionId::new(),
        parent_transaction_id: None,
        merchant_id: merchant.id,
        customer_id: Some(customer_id.to_string()),
        subscription_id: None,
        amount_cents: 0,
        currency: ZERO_AMOUNT_CURRENCY.to_string(),
        tran_type: exchange.tran_type,
        payment_method_type: exchange.method_kind,
        payment_method_id: None,
        metadata: serde_json::json!({}),
    };

    let pending = transaction_repo.create(new_tx).await?;

    let request = GatewayRequest {
        cust_nbr: merchant.cust_nbr.clone(),
        merch_nbr: merchant.merch_nbr.clone(),
        dba_nbr: merchant.dba_nbr.clone(),
        terminal_nbr: merchant.terminal_nbr.clone(),
        shared_secret: shared_secret.to_string(),
        operation: exchange.operation,
        amount: format_cents(0),
        method_kind: exchange.method_kind,
        auth_guid: exchange.auth_guid,
        original_auth_guid: None,
        tran_nbr: pending.tran_nbr.clone(),
        tran_group: tran_group::NONE.to_string(),
        card_entry_method: exchange.card_entry_method.to_string(),
        customer_id: Some(customer_id.to_string()),
        card: exchange.card,
        ach: exchange.ach,
        billing: exchange.billing,
    };

    let response = gateway.process(request).await?;
    let declined = (!response.is_approved())
        .then(|| (response.auth_resp.clone(), response.auth_resp_text.clone()));

    let reconciled = transaction_repo
        .update_from_gateway_response(
            pending.tran_nbr.clone(),
            crate::use_cases::pipeline::reconcile_from(&response),
        )
        .await?;

    if let Some((code, text)) = declined {
        return Err(PaymentError::GatewayDeclined { code, text });
    }

    Ok(reconciled)
}

pub(crate) fn sha256_hex(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    let mut out = String::with_capacity(64);
    for byte in digest {
        out.push_str(&format!("{:02x}", byte));
    }
    out
}

/// Checksum ABA de un numero de ruta bancaria (pesos 3-7-1).
pub(crate) fn aba_routing_valid(routing_number: &str) -> bool {
    if routing_number.len() != 9 || !routing_number.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }

    let digits: Vec<u32> = routing_number
        .bytes()
        .map(|b| u32::from(b - b'0'))
        .collect();
    let weights = [3, 7, 1, 3, 7, 1, 3, 7, 1];
    let sum: u32 = digits.iter().zip(weights).map(|(d, w)| d * w).sum();

    sum % 10 == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aba_routing_validation() {
        // Numeros de ruta reales con checksum valido
        assert!(aba_routing_valid("021000021"));
        assert!(aba_routing_valid("011401533"));

        assert!(!aba_routing_valid("021000020"));
        assert!(!aba_routing_valid("12345678"));
        assert!(!aba_routing_valid("02100002a"));
    }

    #[test]
    fn test_sha256_hex_is_pinned() {
        assert_eq!(
            sha256_hex("021000021"),
            "1f873cdde0ca4f83efeb62d639b3036fccc634a95a857225c789771109c4b5d3"
        );
    }
}
