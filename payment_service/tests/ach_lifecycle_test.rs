mod support;

use chrono::{Duration, Utc};
use mockall::predicate::*;
use payment_service::domain::access::CallerIdentity;
use payment_service::domain::entities::{
    NewTransaction, PaymentMethodType, Transaction, TransactionStatus, TransactionType,
    VerificationStatus,
};
use payment_service::domain::error::PaymentError;
use payment_service::domain::gateways::GatewayOperation;
use payment_service::domain::types::{MerchantId, TransactionId};
use payment_service::use_cases::handle_gateway_callback::{
    compute_callback_mac, CallbackKind, CallbackOutcome, GatewayCallbackPayload,
    HandleGatewayCallbackUseCase,
};
use payment_service::use_cases::pipeline::{PaymentPipeline, RootPaymentRequest};
use payment_service::use_cases::process_ach_verifications::ProcessAchVerificationsUseCase;
use payment_service::use_cases::sale::SaleUseCase;
use payment_service::use_cases::store_credit_card::StoreCreditCardUseCase;
use std::sync::{Arc, Mutex};
use support::*;

fn merchant_identity(id: MerchantId) -> CallerIdentity {
    CallerIdentity::Merchant {
        merchant_ids: vec![id],
    }
}

fn pipeline_with(
    tx_repo: MockTransactionRepo,
    merchant_repo: MockMerchantRepo,
    pm_repo: MockPaymentMethodRepo,
    gateway: MockGateway,
) -> Arc<PaymentPipeline> {
    let mut audit = MockAuditRepo::new();
    audit.expect_record().returning(|_| Ok(()));

    let mut secrets = MockSecrets::new();
    secrets
        .expect_get_secret()
        .returning(|_| Ok("test-shared-secret".to_string()));

    Arc::new(PaymentPipeline::new(
        Arc::new(tx_repo),
        Arc::new(merchant_repo),
        Arc::new(pm_repo),
        Arc::new(audit),
        Arc::new(gateway),
        Arc::new(secrets),
    ))
}

fn ach_sale_request(method_id: payment_service::domain::types::PaymentMethodId) -> RootPaymentRequest {
    RootPaymentRequest {
        merchant_id: None,
        merchant_slug: None,
        customer_id: Some("cust-1".to_string()),
        subscription_id: None,
        amount_cents: 5000,
        currency: "USD".to_string(),
        payment_method_id: Some(method_id),
        payment_token: None,
        idempotency_key: TransactionId::new(),
        metadata: None,
    }
}

#[tokio::test]
async fn test_ach_debit_within_grace_window_is_approved() {
    // Arrange: metodo sin verificar creado hace un dia
    let merchant_id = MerchantId::new();
    let merchant = active_merchant(merchant_id);
    let method = ach_method(
        merchant_id,
        "cust-1",
        Utc::now() - Duration::days(1),
        VerificationStatus::PENDING,
    );

    let mut tx_repo = MockTransactionRepo::new();
    let mut merchant_repo = MockMerchantRepo::new();
    let mut pm_repo = MockPaymentMethodRepo::new();
    let mut gateway = MockGateway::new();

    merchant_repo
        .expect_find_by_id()
        .returning(move |_| Ok(Some(merchant.clone())));
    tx_repo.expect_find_by_id().returning(|_| Ok(None));

    let method_lookup = method.clone();
    pm_repo
        .expect_find_by_id()
        .returning(move |_| Ok(Some(method_lookup.clone())));

    let created: Arc<Mutex<Option<Transaction>>> = Arc::new(Mutex::new(None));
    let created_on_insert = created.clone();
    tx_repo.expect_create().times(1).returning(move |new_tx| {
        let pending = tx_from_new(&new_tx);
        *created_on_insert.lock().unwrap() = Some(pending.clone());
        Ok(pending)
    });

    // Un debito ACH viaja con el clasificador ACH-Debit
    gateway
        .expect_process()
        .times(1)
        .withf(|req| {
            req.operation == GatewayOperation::AchDebit
                && req.method_kind == PaymentMethodType::ACH
                && req.tran_group == "SALE"
        })
        .returning(|req| Ok(approved_response(&format!("BRIC-{}", req.tran_nbr))));

    let created_on_update = created.clone();
    tx_repo
        .expect_update_from_gateway_response()
        .times(1)
        .returning(move |_, update| {
            let pending = created_on_update.lock().unwrap().clone().unwrap();
            Ok(apply_reconcile(pending, &update))
        });

    pm_repo.expect_mark_used().times(1).returning(|_| Ok(()));

    let use_case = SaleUseCase::new(pipeline_with(tx_repo, merchant_repo, pm_repo, gateway));

    // Act
    let result = use_case
        .execute(&merchant_identity(merchant_id), ach_sale_request(method.id))
        .await;

    // Assert
    assert_eq!(result.unwrap().status, TransactionStatus::APPROVED);
}

#[tokio::test]
async fn test_ach_debit_outside_grace_window_is_rejected() {
    // Arrange: metodo sin verificar creado hace cuatro dias
    let merchant_id = MerchantId::new();
    let merchant = active_merchant(merchant_id);
    let method = ach_method(
        merchant_id,
        "cust-1",
        Utc::now() - Duration::days(4),
        VerificationStatus::PENDING,
    );

    let mut tx_repo = MockTransactionRepo::new();
    let mut merchant_repo = MockMerchantRepo::new();
    let mut pm_repo = MockPaymentMethodRepo::new();
    let gateway = MockGateway::new(); // cero llamadas

    merchant_repo
        .expect_find_by_id()
        .returning(move |_| Ok(Some(merchant.clone())));
    tx_repo.expect_find_by_id().returning(|_| Ok(None));

    let method_lookup = method.clone();
    pm_repo
        .expect_find_by_id()
        .returning(move |_| Ok(Some(method_lookup.clone())));

    let use_case = SaleUseCase::new(pipeline_with(tx_repo, merchant_repo, pm_repo, gateway));

    // Act
    let result = use_case
        .execute(&merchant_identity(merchant_id), ach_sale_request(method.id))
        .await;

    // Assert
    assert_eq!(result.unwrap_err(), PaymentError::PaymentMethodNotVerified);
}

#[tokio::test]
async fn test_verification_sweep_resolves_clean_and_returned_prenotes() {
    // Arrange: dos metodos pendientes, uno con retorno en su prenote
    let merchant_id = MerchantId::new();
    let clean = ach_method(
        merchant_id,
        "cust-1",
        Utc::now() - Duration::days(5),
        VerificationStatus::PENDING,
    );
    let returned = ach_method(
        merchant_id,
        "cust-2",
        Utc::now() - Duration::days(5),
        VerificationStatus::PENDING,
    );

    let clean_prenote_id = clean.prenote_transaction_id.unwrap();
    let returned_prenote_id = returned.prenote_transaction_id.unwrap();

    let prenote_of = |id: TransactionId, return_code: Option<&str>| {
        let mut tx = tx_from_new(&NewTransaction {
            id,
            parent_transaction_id: None,
            merchant_id,
            customer_id: Some("cust".to_string()),
            subscription_id: None,
            amount_cents: 0,
            currency: "USD".to_string(),
            tran_type: TransactionType::PRE_NOTE,
            payment_method_type: PaymentMethodType::ACH,
            payment_method_id: None,
            metadata: serde_json::json!({}),
        });
        if let Some(code) = return_code {
            tx.metadata = serde_json::json!({ "return_code": code });
        }
        tx
    };

    let mut tx_repo = MockTransactionRepo::new();
    let mut pm_repo = MockPaymentMethodRepo::new();

    let batch = vec![clean.clone(), returned.clone()];
    pm_repo
        .expect_find_pending_ach_verifications()
        .times(1)
        .returning(move |_, _| Ok(batch.clone()));

    let clean_tx = prenote_of(clean_prenote_id, None);
    tx_repo
        .expect_find_by_id()
        .with(eq(clean_prenote_id))
        .returning(move |_| Ok(Some(clean_tx.clone())));
    let returned_tx = prenote_of(returned_prenote_id, Some("R01"));
    tx_repo
        .expect_find_by_id()
        .with(eq(returned_prenote_id))
        .returning(move |_| Ok(Some(returned_tx.clone())));

    pm_repo
        .expect_mark_verified()
        .with(eq(clean.id), always())
        .times(1)
        .returning(|_, _| Ok(()));
    pm_repo
        .expect_mark_verification_failed()
        .with(eq(returned.id), eq("R01".to_string()))
        .times(1)
        .returning(|_, _| Ok(()));

    let use_case =
        ProcessAchVerificationsUseCase::new(Arc::new(pm_repo), Arc::new(tx_repo));

    // Act
    let stats = use_case.execute(100, false).await.unwrap();

    // Assert
    assert_eq!(stats.processed, 2);
    assert_eq!(stats.verified, 1);
    assert_eq!(stats.failed, 1);
}

#[tokio::test]
async fn test_verification_sweep_dry_run_only_counts() {
    // Arrange
    let merchant_id = MerchantId::new();
    let method = ach_method(
        merchant_id,
        "cust-1",
        Utc::now() - Duration::days(5),
        VerificationStatus::PENDING,
    );
    let prenote_id = method.prenote_transaction_id.unwrap();

    let mut tx_repo = MockTransactionRepo::new();
    let mut pm_repo = MockPaymentMethodRepo::new();

    let batch = vec![method];
    pm_repo
        .expect_find_pending_ach_verifications()
        .returning(move |_, _| Ok(batch.clone()));

    let prenote = tx_from_new(&NewTransaction {
        id: prenote_id,
        parent_transaction_id: None,
        merchant_id,
        customer_id: Some("cust-1".to_string()),
        subscription_id: None,
        amount_cents: 0,
        currency: "USD".to_string(),
        tran_type: TransactionType::PRE_NOTE,
        payment_method_type: PaymentMethodType::ACH,
        payment_method_id: None,
        metadata: serde_json::json!({}),
    });
    tx_repo
        .expect_find_by_id()
        .returning(move |_| Ok(Some(prenote.clone())));

    // Nota: sin expectativas de mark_*; dry_run no escribe

    let use_case =
        ProcessAchVerificationsUseCase::new(Arc::new(pm_repo), Arc::new(tx_repo));

    // Act
    let stats = use_case.execute(100, true).await.unwrap();

    // Assert
    assert_eq!(stats.processed, 1);
    assert_eq!(stats.verified, 1);
    assert_eq!(stats.failed, 0);
}

// ---------------------------------------------------------------------------
// Callbacks de retorno

fn callback_use_case(
    tx_repo: MockTransactionRepo,
    merchant_repo: MockMerchantRepo,
    pm_repo: MockPaymentMethodRepo,
) -> HandleGatewayCallbackUseCase {
    let mut audit = MockAuditRepo::new();
    audit.expect_record().returning(|_| Ok(()));

    let mut secrets = MockSecrets::new();
    secrets
        .expect_get_secret()
        .returning(|_| Ok("test-shared-secret".to_string()));
    let secrets = Arc::new(secrets);

    // El guardado de tarjeta no participa en los escenarios de retorno
    let store_card = Arc::new(StoreCreditCardUseCase::new(
        Arc::new(MockTransactionRepo::new()),
        Arc::new(MockMerchantRepo::new()),
        Arc::new(MockPaymentMethodRepo::new()),
        Arc::new(MockAuditRepo::new()),
        Arc::new(MockGateway::new()),
        secrets.clone(),
    ));

    HandleGatewayCallbackUseCase::new(
        Arc::new(tx_repo),
        Arc::new(merchant_repo),
        Arc::new(pm_repo),
        Arc::new(audit),
        secrets,
        store_card,
    )
}

fn return_payload(tran_nbr: &str, return_code: &str) -> GatewayCallbackPayload {
    let mac = compute_callback_mac("test-shared-secret", tran_nbr, "", "", "0.00");
    GatewayCallbackPayload {
        merchant_slug: "acme".to_string(),
        kind: CallbackKind::Return,
        tran_nbr: tran_nbr.to_string(),
        auth_guid: String::new(),
        auth_resp: String::new(),
        auth_resp_text: None,
        auth_code: None,
        auth_card_type: None,
        amount: "0.00".to_string(),
        mac,
        return_code: Some(return_code.to_string()),
        save_card: None,
        customer_id: None,
        last_four: None,
        card_brand: None,
        exp_month: None,
        exp_year: None,
    }
}

#[tokio::test]
async fn test_second_noncritical_return_deactivates_the_method() {
    // Arrange: metodo con un retorno previo recibe otro no critico
    let merchant_id = MerchantId::new();
    let merchant = active_merchant(merchant_id);
    let mut method = ach_method(
        merchant_id,
        "cust-1",
        Utc::now() - Duration::days(10),
        VerificationStatus::VERIFIED,
    );
    method.return_count = 1;

    let mut debit = tx_from_new(&NewTransaction {
        id: TransactionId::new(),
        parent_transaction_id: None,
        merchant_id,
        customer_id: Some("cust-1".to_string()),
        subscription_id: None,
        amount_cents: 5000,
        currency: "USD".to_string(),
        tran_type: TransactionType::SALE,
        payment_method_type: PaymentMethodType::ACH,
        payment_method_id: Some(method.id),
        metadata: serde_json::json!({}),
    });
    debit = approved(debit, "BRIC-ACH-1");
    let tran_nbr = debit.tran_nbr.clone();

    let mut tx_repo = MockTransactionRepo::new();
    let mut merchant_repo = MockMerchantRepo::new();
    let mut pm_repo = MockPaymentMethodRepo::new();

    let merchant_clone = merchant.clone();
    merchant_repo
        .expect_find_by_slug()
        .with(eq("acme".to_string()))
        .returning(move |_| Ok(Some(merchant_clone.clone())));

    let debit_lookup = debit.clone();
    tx_repo
        .expect_find_by_tran_nbr()
        .with(eq(tran_nbr.clone()))
        .returning(move |_| Ok(Some(debit_lookup.clone())));

    tx_repo
        .expect_append_metadata()
        .with(eq(debit.id), eq("return_code".to_string()), always())
        .times(1)
        .returning(|_, _, _| Ok(()));

    let method_lookup = method.clone();
    pm_repo
        .expect_find_by_id()
        .with(eq(method.id))
        .returning(move |_| Ok(Some(method_lookup.clone())));

    // El incremento atomico alcanza el umbral y desactiva
    let mut deactivated = method.clone();
    deactivated.return_count = 2;
    deactivated.is_active = false;
    deactivated.deactivation_reason = Some("excessive_returns".to_string());
    pm_repo
        .expect_increment_return_count()
        .with(eq(method.id), eq(2))
        .times(1)
        .returning(move |_, _| Ok(deactivated.clone()));

    let use_case = callback_use_case(tx_repo, merchant_repo, pm_repo);

    // Act: R01 (fondos insuficientes) no es critico
    let outcome = use_case.execute(return_payload(&tran_nbr, "R01")).await.unwrap();

    // Assert
    assert!(matches!(
        outcome,
        CallbackOutcome::AchReturn {
            method_deactivated: true
        }
    ));
}

#[tokio::test]
async fn test_critical_return_code_fails_the_method_immediately() {
    // Arrange
    let merchant_id = MerchantId::new();
    let merchant = active_merchant(merchant_id);
    let method = ach_method(
        merchant_id,
        "cust-1",
        Utc::now() - Duration::days(10),
        VerificationStatus::VERIFIED,
    );

    let mut debit = tx_from_new(&NewTransaction {
        id: TransactionId::new(),
        parent_transaction_id: None,
        merchant_id,
        customer_id: Some("cust-1".to_string()),
        subscription_id: None,
        amount_cents: 5000,
        currency: "USD".to_string(),
        tran_type: TransactionType::SALE,
        payment_method_type: PaymentMethodType::ACH,
        payment_method_id: Some(method.id),
        metadata: serde_json::json!({}),
    });
    debit = approved(debit, "BRIC-ACH-2");
    let tran_nbr = debit.tran_nbr.clone();

    let mut tx_repo = MockTransactionRepo::new();
    let mut merchant_repo = MockMerchantRepo::new();
    let mut pm_repo = MockPaymentMethodRepo::new();

    let merchant_clone = merchant.clone();
    merchant_repo
        .expect_find_by_slug()
        .returning(move |_| Ok(Some(merchant_clone.clone())));

    let debit_lookup = debit.clone();
    tx_repo
        .expect_find_by_tran_nbr()
        .returning(move |_| Ok(Some(debit_lookup.clone())));
    tx_repo
        .expect_append_metadata()
        .times(1)
        .returning(|_, _, _| Ok(()));

    let method_lookup = method.clone();
    pm_repo
        .expect_find_by_id()
        .returning(move |_| Ok(Some(method_lookup.clone())));

    // R02 = cuenta cerrada: falla y desactiva sin pasar por el contador
    pm_repo
        .expect_mark_verification_failed()
        .with(eq(method.id), eq("R02".to_string()))
        .times(1)
        .returning(|_, _| Ok(()));

    let use_case = callback_use_case(tx_repo, merchant_repo, pm_repo);

    // Act
    let outcome = use_case.execute(return_payload(&tran_nbr, "R02")).await.unwrap();

    // Assert
    assert!(matches!(
        outcome,
        CallbackOutcome::AchReturn {
            method_deactivated: true
        }
    ));
}

#[tokio::test]
async fn test_callback_with_bad_mac_is_rejected() {
    // Arrange
    let merchant_id = MerchantId::new();
    let merchant = active_merchant(merchant_id);

    let mut merchant_repo = MockMerchantRepo::new();
    let merchant_clone = merchant.clone();
    merchant_repo
        .expect_find_by_slug()
        .returning(move |_| Ok(Some(merchant_clone.clone())));

    let use_case = callback_use_case(
        MockTransactionRepo::new(),
        merchant_repo,
        MockPaymentMethodRepo::new(),
    );

    let mut payload = return_payload("0123456789", "R01");
    payload.mac = "deadbeef".repeat(8);

    // Act
    let result = use_case.execute(payload).await;

    // Assert
    assert!(matches!(result, Err(PaymentError::ValidationError(_))));
}
