use crate::domain::entities::{NewTransaction, Transaction, TransactionStatus, TransactionType};
use crate::domain::error::PaymentError;
use crate::domain::types::{MerchantId, TransactionId};

/// Llave de metadata que clasifica un VOID en el replay: "auth" cancela la
/// autorizacion, "capture" reduce el monto capturado. Sin ella el replay
/// seria ambiguo.
pub const METADATA_ORIGINAL_TRANSACTION_TYPE: &str = "original_transaction_type";

/// Llave de metadata donde los callbacks de retorno ACH dejan el codigo.
pub const METADATA_RETURN_CODE: &str = "return_code";

/// Operaciones que continuan una cadena existente.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainOperation {
    Capture,
    Void,
    Refund,
}

/// Estado de una cadena de transacciones, producto del replay.
///
/// Nunca se persiste: se recalcula bajo lock cada vez que una operacion lo
/// necesita. La columna `status` derivada de cada fila existe solo para
/// filtrado y observabilidad.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupState {
    pub active_auth_id: Option<TransactionId>,
    pub active_auth_amount_cents: i64,
    pub active_auth_token: String,
    pub captured_amount_cents: i64,
    pub capture_token: String,
    pub refunded_amount_cents: i64,
    pub is_auth_voided: bool,
    pub current_token: String,
}

impl GroupState {
    pub fn remaining_capturable_cents(&self) -> i64 {
        (self.active_auth_amount_cents - self.captured_amount_cents).max(0)
    }

    pub fn remaining_refundable_cents(&self) -> i64 {
        (self.captured_amount_cents - self.refunded_amount_cents).max(0)
    }

    pub fn can_capture(&self, amount_cents: i64) -> bool {
        !self.is_auth_voided
            && self.active_auth_id.is_some()
            && amount_cents <= self.active_auth_amount_cents - self.captured_amount_cents
    }

    pub fn can_void(&self) -> bool {
        !self.is_auth_voided && self.active_auth_id.is_some()
    }

    pub fn can_refund(&self, amount_cents: i64) -> bool {
        self.captured_amount_cents > 0
            && amount_cents <= self.captured_amount_cents - self.refunded_amount_cents
    }

    /// Token que la siguiente operacion debe enviar al Gateway.
    ///
    /// Capture y void operan contra el token del auth activo; refund usa el
    /// token del ultimo capture si existe (venta o captura previa), si no el
    /// del auth.
    pub fn token_for(&self, op: ChainOperation) -> &str {
        match op {
            ChainOperation::Capture | ChainOperation::Void => &self.active_auth_token,
            ChainOperation::Refund => {
                if !self.capture_token.is_empty() {
                    &self.capture_token
                } else {
                    &self.active_auth_token
                }
            }
        }
    }
}

/// Recalcula el estado de una cadena a partir de sus transacciones en orden
/// ascendente de `created_at`.
///
/// Funcion pura y deterministica: solo las filas APPROVED mutan el estado;
/// las pendientes y rechazadas se ignoran. Toda la aritmetica es en centavos
/// enteros.
///
/// # Examples
/// ```ignore
/// let tree = repo.find_group(root_id).await?;
/// let state = compute_state(&tree);
/// assert!(state.can_refund(1000));
/// ```
pub fn compute_state(transactions: &[Transaction]) -> GroupState {
    let mut state = GroupState::default();

    for tx in transactions {
        if tx.status != TransactionStatus::APPROVED {
            continue;
        }

        match tx.tran_type {
            TransactionType::AUTH => {
                // Una re-autorizacion reemplaza el auth activo y reinicia la
                // cadena deliberadamente
                state.active_auth_id = Some(tx.id);
                state.active_auth_amount_cents = tx.amount_cents;
                state.active_auth_token = tx.auth_guid.clone();
                state.captured_amount_cents = 0;
                state.capture_token.clear();
                state.refunded_amount_cents = 0;
                state.is_auth_voided = false;
                state.current_token = tx.auth_guid.clone();
            }
            TransactionType::SALE => {
                // Una venta equivale a auth + captura completa
                state.active_auth_id = Some(tx.id);
                state.active_auth_amount_cents = tx.amount_cents;
                state.active_auth_token = tx.auth_guid.clone();
                state.captured_amount_cents = tx.amount_cents;
                state.capture_token.clear();
                state.refunded_amount_cents = 0;
                state.is_auth_voided = false;
                state.current_token = tx.auth_guid.clone();
            }
            TransactionType::CAPTURE => {
                state.captured_amount_cents += tx.amount_cents;
                state.capture_token = tx.auth_guid.clone();
                state.current_token = tx.auth_guid.clone();
            }
            TransactionType::VOID => {
                let target = tx
                    .metadata
                    .get(METADATA_ORIGINAL_TRANSACTION_TYPE)
                    .and_then(|v| v.as_str());
                match target {
                    Some("capture") => {
                        state.captured_amount_cents -= tx.amount_cents;
                    }
                    _ => {
                        state.is_auth_voided = true;
                        state.active_auth_id = None;
                        state.active_auth_token.clear();
                    }
                }
            }
            TransactionType::REFUND => {
                state.refunded_amount_cents += tx.amount_cents;
            }
            TransactionType::PRE_NOTE | TransactionType::STORAGE => {}
        }
    }

    state
}

/// Solicitud de continuacion de cadena (capture / void / refund).
#[derive(Debug, Clone)]
pub struct FollowUpRequest {
    pub id: TransactionId,
    pub op: ChainOperation,
    pub merchant_id: MerchantId,
    pub amount_cents: Option<i64>,
    pub reason: Option<String>,
}

/// Decide, bajo el lock de la cadena, si la continuacion es legal y con que
/// monto y metadata debe insertarse la fila pendiente.
///
/// Funcion pura: el repositorio la invoca dentro de la misma transaccion de
/// BD que bloqueo el arbol, de modo que dos capturas concurrentes no puedan
/// exceder el monto autorizado.
pub fn plan_follow_up(
    root: &Transaction,
    state: &GroupState,
    request: &FollowUpRequest,
) -> Result<NewTransaction, PaymentError> {
    // Una cadena fuera del alcance del comercio efectivo es indistinguible
    // de una cadena inexistente
    if root.merchant_id != request.merchant_id {
        return Err(PaymentError::NotFound("Transaction".to_string()));
    }

    let (tran_type, amount_cents, metadata) = match request.op {
        ChainOperation::Capture => {
            let amount = request
                .amount_cents
                .unwrap_or_else(|| state.remaining_capturable_cents());
            if state.is_auth_voided {
                return Err(PaymentError::CannotBeCaptured(
                    "authorization was voided".to_string(),
                ));
            }
            if state.active_auth_id.is_none() {
                return Err(PaymentError::CannotBeCaptured(
                    "no active authorization in the chain".to_string(),
                ));
            }
            if amount < 1 || !state.can_capture(amount) {
                return Err(PaymentError::CannotBeCaptured(format!(
                    "requested {} cents but only {} remain authorized",
                    amount,
                    state.remaining_capturable_cents()
                )));
            }
            (TransactionType::CAPTURE, amount, serde_json::json!({}))
        }
        ChainOperation::Void => {
            if !state.can_void() {
                return Err(PaymentError::CannotBeVoided(
                    "no active authorization in the chain".to_string(),
                ));
            }
            // Con fondos capturados el void revierte la captura; si no,
            // cancela la autorizacion
            if state.captured_amount_cents > 0 {
                let reversible = state.captured_amount_cents - state.refunded_amount_cents;
                if reversible < 1 {
                    return Err(PaymentError::CannotBeVoided(
                        "captured amount was already refunded".to_string(),
                    ));
                }
                (
                    TransactionType::VOID,
                    reversible,
                    serde_json::json!({ METADATA_ORIGINAL_TRANSACTION_TYPE: "capture" }),
                )
            } else {
                (
                    TransactionType::VOID,
                    state.active_auth_amount_cents,
                    serde_json::json!({ METADATA_ORIGINAL_TRANSACTION_TYPE: "auth" }),
                )
            }
        }
        ChainOperation::Refund => {
            let amount = request
                .amount_cents
                .unwrap_or_else(|| state.remaining_refundable_cents());
            if amount < 1 || !state.can_refund(amount) {
                return Err(PaymentError::CannotBeRefunded(format!(
                    "requested {} cents but only {} remain refundable",
                    amount,
                    state.remaining_refundable_cents()
                )));
            }
            let metadata = match &request.reason {
                Some(reason) => serde_json::json!({ "reason": reason }),
                None => serde_json::json!({}),
            };
            (TransactionType::REFUND, amount, metadata)
        }
    };

    Ok(NewTransaction {
        id: request.id,
        parent_transaction_id: Some(root.id),
        merchant_id: root.merchant_id,
        customer_id: root.customer_id.clone(),
        subscription_id: root.subscription_id.clone(),
        amount_cents,
        currency: root.currency.clone(),
        tran_type,
        payment_method_type: root.payment_method_type,
        payment_method_id: root.payment_method_id,
        metadata,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::PaymentMethodType;
    use chrono::{Duration, TimeZone, Utc};
    use rstest::rstest;

    fn approved(
        tran_type: TransactionType,
        amount_cents: i64,
        auth_guid: &str,
        seq: i64,
    ) -> Transaction {
        tx_with(tran_type, amount_cents, auth_guid, "00", seq, serde_json::json!({}))
    }

    fn tx_with(
        tran_type: TransactionType,
        amount_cents: i64,
        auth_guid: &str,
        auth_resp: &str,
        seq: i64,
        metadata: serde_json::Value,
    ) -> Transaction {
        let base = Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap();
        let status = match auth_resp {
            "" => TransactionStatus::PENDING,
            "00" => TransactionStatus::APPROVED,
            _ => TransactionStatus::DECLINED,
        };
        Transaction {
            id: TransactionId::new(),
            parent_transaction_id: None,
            merchant_id: MerchantId(uuid::Uuid::nil()),
            customer_id: Some("cust-1".to_string()),
            subscription_id: None,
            amount_cents,
            currency: "USD".to_string(),
            tran_type,
            payment_method_type: PaymentMethodType::CREDIT_CARD,
            payment_method_id: None,
            tran_nbr: format!("{:010}", seq),
            auth_guid: auth_guid.to_string(),
            auth_resp: auth_resp.to_string(),
            auth_code: None,
            auth_card_type: None,
            metadata,
            status,
            processed_at: Some(base + Duration::seconds(seq)),
            created_at: base + Duration::seconds(seq),
        }
    }

    #[test]
    fn test_sale_is_auth_plus_full_capture() {
        let tree = vec![approved(TransactionType::SALE, 9000, "GUID-SALE", 0)];

        let state = compute_state(&tree);

        assert_eq!(state.active_auth_amount_cents, 9000);
        assert_eq!(state.captured_amount_cents, 9000);
        assert_eq!(state.active_auth_token, "GUID-SALE");
        assert!(!state.can_capture(1));
        assert!(state.can_refund(9000));
    }

    #[test]
    fn test_pending_and_declined_rows_do_not_mutate_state() {
        let tree = vec![
            approved(TransactionType::AUTH, 10000, "GUID-AUTH", 0),
            tx_with(TransactionType::CAPTURE, 4000, "", "", 1, serde_json::json!({})),
            tx_with(TransactionType::CAPTURE, 4000, "GUID-BAD", "05", 2, serde_json::json!({})),
        ];

        let state = compute_state(&tree);

        assert_eq!(state.captured_amount_cents, 0);
        assert!(state.can_capture(10000));
    }

    #[test]
    fn test_split_capture_exhausts_authorization() {
        let mut tree = vec![approved(TransactionType::AUTH, 10000, "GUID-AUTH", 0)];
        tree.push(approved(TransactionType::CAPTURE, 4000, "GUID-CAP1", 1));
        tree.push(approved(TransactionType::CAPTURE, 6000, "GUID-CAP2", 2));

        let state = compute_state(&tree);

        assert_eq!(state.captured_amount_cents, 10000);
        assert_eq!(state.remaining_capturable_cents(), 0);
        assert!(!state.can_capture(1));
        assert_eq!(state.capture_token, "GUID-CAP2");
        assert_eq!(state.token_for(ChainOperation::Refund), "GUID-CAP2");
    }

    #[test]
    fn test_void_auth_blocks_capture() {
        let tree = vec![
            approved(TransactionType::AUTH, 5000, "GUID-AUTH", 0),
            tx_with(
                TransactionType::VOID,
                5000,
                "GUID-VOID",
                "00",
                1,
                serde_json::json!({ METADATA_ORIGINAL_TRANSACTION_TYPE: "auth" }),
            ),
        ];

        let state = compute_state(&tree);

        assert!(state.is_auth_voided);
        assert!(state.active_auth_id.is_none());
        assert!(!state.can_capture(5000));
        assert!(!state.can_void());
    }

    #[test]
    fn test_void_capture_reduces_captured_amount() {
        let tree = vec![
            approved(TransactionType::SALE, 9000, "GUID-SALE", 0),
            tx_with(
                TransactionType::VOID,
                9000,
                "GUID-VOID",
                "00",
                1,
                serde_json::json!({ METADATA_ORIGINAL_TRANSACTION_TYPE: "capture" }),
            ),
        ];

        let state = compute_state(&tree);

        assert_eq!(state.captured_amount_cents, 0);
        assert!(!state.is_auth_voided);
        assert!(!state.can_refund(1));
    }

    #[test]
    fn test_reauthorization_resets_the_chain() {
        let tree = vec![
            approved(TransactionType::AUTH, 5000, "GUID-A1", 0),
            approved(TransactionType::CAPTURE, 5000, "GUID-C1", 1),
            approved(TransactionType::AUTH, 8000, "GUID-A2", 2),
        ];

        let state = compute_state(&tree);

        assert_eq!(state.active_auth_amount_cents, 8000);
        assert_eq!(state.active_auth_token, "GUID-A2");
        assert_eq!(state.captured_amount_cents, 0);
        assert!(state.can_capture(8000));
    }

    #[rstest]
    #[case(3000, true)]
    #[case(6000, true)]
    #[case(9001, false)]
    fn test_refund_predicate_over_sale(#[case] amount: i64, #[case] expected: bool) {
        let tree = vec![approved(TransactionType::SALE, 9000, "GUID-SALE", 0)];
        let state = compute_state(&tree);
        assert_eq!(state.can_refund(amount), expected);
    }

    #[test]
    fn test_partial_refunds_accumulate() {
        let tree = vec![
            approved(TransactionType::SALE, 9000, "GUID-SALE", 0),
            approved(TransactionType::REFUND, 3000, "GUID-R1", 1),
        ];

        let state = compute_state(&tree);

        assert_eq!(state.refunded_amount_cents, 3000);
        assert!(!state.can_refund(7000));
        assert!(state.can_refund(6000));
    }

    #[test]
    fn test_replay_is_idempotent() {
        let tree = vec![
            approved(TransactionType::AUTH, 10000, "GUID-AUTH", 0),
            approved(TransactionType::CAPTURE, 4000, "GUID-CAP", 1),
            approved(TransactionType::REFUND, 1000, "GUID-REF", 2),
        ];

        assert_eq!(compute_state(&tree), compute_state(&tree));
    }

    mod plan_follow_up {
        use super::*;

        fn root_sale(amount: i64) -> Transaction {
            approved(TransactionType::SALE, amount, "GUID-SALE", 0)
        }

        fn request(op: ChainOperation, root: &Transaction, amount: Option<i64>) -> FollowUpRequest {
            FollowUpRequest {
                id: TransactionId::new(),
                op,
                merchant_id: root.merchant_id,
                amount_cents: amount,
                reason: None,
            }
        }

        #[test]
        fn test_capture_defaults_to_remaining_authorized_amount() {
            let root = approved(TransactionType::AUTH, 10000, "GUID-AUTH", 0);
            let tree = vec![
                root.clone(),
                approved(TransactionType::CAPTURE, 4000, "GUID-CAP", 1),
            ];
            let state = compute_state(&tree);

            let planned =
                plan_follow_up(&root, &state, &request(ChainOperation::Capture, &root, None))
                    .unwrap();

            assert_eq!(planned.amount_cents, 6000);
            assert_eq!(planned.tran_type, TransactionType::CAPTURE);
            assert_eq!(planned.parent_transaction_id, Some(root.id));
        }

        #[test]
        fn test_capture_over_remaining_is_rejected() {
            let root = approved(TransactionType::AUTH, 10000, "GUID-AUTH", 0);
            let tree = vec![
                root.clone(),
                approved(TransactionType::CAPTURE, 10000, "GUID-CAP", 1),
            ];
            let state = compute_state(&tree);

            let result =
                plan_follow_up(&root, &state, &request(ChainOperation::Capture, &root, Some(1)));

            assert!(matches!(result, Err(PaymentError::CannotBeCaptured(_))));
        }

        #[test]
        fn test_void_of_uncaptured_auth_targets_the_auth() {
            let root = approved(TransactionType::AUTH, 5000, "GUID-AUTH", 0);
            let state = compute_state(&[root.clone()]);

            let planned =
                plan_follow_up(&root, &state, &request(ChainOperation::Void, &root, None)).unwrap();

            assert_eq!(planned.amount_cents, 5000);
            assert_eq!(
                planned.metadata[METADATA_ORIGINAL_TRANSACTION_TYPE],
                serde_json::json!("auth")
            );
        }

        #[test]
        fn test_void_of_captured_chain_targets_the_capture() {
            let root = root_sale(9000);
            let state = compute_state(&[root.clone()]);

            let planned =
                plan_follow_up(&root, &state, &request(ChainOperation::Void, &root, None)).unwrap();

            assert_eq!(planned.amount_cents, 9000);
            assert_eq!(
                planned.metadata[METADATA_ORIGINAL_TRANSACTION_TYPE],
                serde_json::json!("capture")
            );
        }

        #[test]
        fn test_refund_requires_captured_funds() {
            let root = approved(TransactionType::AUTH, 5000, "GUID-AUTH", 0);
            let state = compute_state(&[root.clone()]);

            let result =
                plan_follow_up(&root, &state, &request(ChainOperation::Refund, &root, Some(100)));

            assert!(matches!(result, Err(PaymentError::CannotBeRefunded(_))));
        }

        #[test]
        fn test_foreign_merchant_sees_not_found() {
            let root = root_sale(9000);
            let state = compute_state(&[root.clone()]);
            let mut req = request(ChainOperation::Refund, &root, Some(100));
            req.merchant_id = MerchantId::new();

            let result = plan_follow_up(&root, &state, &req);

            assert_eq!(
                result.unwrap_err(),
                PaymentError::NotFound("Transaction".to_string())
            );
        }
    }
}
