use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::identity::Caller;
use crate::api::response::ApiResponse;
use crate::domain::entities::{
    AchAccountType, PaymentMethod, PaymentMethodType, Transaction, TransactionStatus,
    TransactionType, VerificationStatus,
};
use crate::domain::gateways::BillingInfo;
use crate::domain::types::{MerchantId, PaymentMethodId, TransactionId};
use crate::use_cases::authorize::AuthorizeUseCase;
use crate::use_cases::capture::{CaptureRequest, CaptureUseCase};
use crate::use_cases::deactivate_payment_method::DeactivatePaymentMethodUseCase;
use crate::use_cases::get_payment_method::GetPaymentMethodUseCase;
use crate::use_cases::get_transaction::GetTransactionUseCase;
use crate::use_cases::get_transaction_group::GetTransactionGroupUseCase;
use crate::use_cases::list_payment_methods::{ListPaymentMethodsRequest, ListPaymentMethodsUseCase};
use crate::use_cases::list_transactions::{ListTransactionsRequest, ListTransactionsUseCase};
use crate::use_cases::pipeline::RootPaymentRequest;
use crate::use_cases::refund::{RefundRequest, RefundUseCase};
use crate::use_cases::sale::SaleUseCase;
use crate::use_cases::store_ach_account::{StoreAchAccountRequest, StoreAchAccountUseCase};
use crate::use_cases::store_credit_card::{
    StoreCreditCardDirectRequest, StoreCreditCardFromTokenRequest, StoreCreditCardUseCase,
};
use crate::use_cases::void::{VoidRequest, VoidUseCase};

// Estado compartido de la aplicación
pub struct AppState {
    pub sale_use_case: Arc<SaleUseCase>,
    pub authorize_use_case: Arc<AuthorizeUseCase>,
    pub capture_use_case: Arc<CaptureUseCase>,
    pub void_use_case: Arc<VoidUseCase>,
    pub refund_use_case: Arc<RefundUseCase>,
    pub get_transaction_use_case: Arc<GetTransactionUseCase>,
    pub list_transactions_use_case: Arc<ListTransactionsUseCase>,
    pub get_transaction_group_use_case: Arc<GetTransactionGroupUseCase>,
    pub store_ach_account_use_case: Arc<StoreAchAccountUseCase>,
    pub store_credit_card_use_case: Arc<StoreCreditCardUseCase>,
    pub get_payment_method_use_case: Arc<GetPaymentMethodUseCase>,
    pub list_payment_methods_use_case: Arc<ListPaymentMethodsUseCase>,
    pub deactivate_payment_method_use_case: Arc<DeactivatePaymentMethodUseCase>,
}

pub fn routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/transactions/sale", post(sale))
        .route("/transactions/authorize", post(authorize))
        .route("/transactions/{id}/capture", post(capture))
        .route("/transactions/{id}/void", post(void))
        .route("/transactions/{id}/refund", post(refund))
        .route("/transactions/{id}", get(get_transaction))
        .route("/transactions/{id}/group", get(get_transaction_group))
        .route("/transactions", get(list_transactions))
        .route("/payment-methods/ach", post(store_ach_account))
        .route("/payment-methods/cards", post(store_credit_card_from_token))
        .route("/payment-methods/cards/direct", post(store_credit_card_direct))
        .route("/payment-methods/{id}", get(get_payment_method))
        .route("/payment-methods/{id}/deactivate", post(deactivate_payment_method))
        .route(
            "/customers/{customer_id}/payment-methods",
            get(list_payment_methods),
        )
        .with_state(state)
}

// ---------------------------------------------------------------------------
// DTOs de entrada

#[derive(Deserialize, ToSchema)]
pub struct SalePayload {
    pub merchant_id: Option<Uuid>,
    pub merchant_slug: Option<String>,
    pub customer_id: Option<String>,
    pub subscription_id: Option<String>,
    pub amount_cents: i64,
    pub currency: String,
    pub payment_method_id: Option<Uuid>,
    pub payment_token: Option<String>,
    pub idempotency_key: Uuid,
    #[schema(value_type = Option<Object>)]
    pub metadata: Option<serde_json::Value>,
}

impl SalePayload {
    fn into_request(self) -> RootPaymentRequest {
        RootPaymentRequest {
            merchant_id: self.merchant_id.map(MerchantId),
            merchant_slug: self.merchant_slug,
            customer_id: self.customer_id,
            subscription_id: self.subscription_id,
            amount_cents: self.amount_cents,
            currency: self.currency,
            payment_method_id: self.payment_method_id.map(PaymentMethodId),
            payment_token: self.payment_token,
            idempotency_key: TransactionId(self.idempotency_key),
            metadata: self.metadata,
        }
    }
}

#[derive(Deserialize, Default, ToSchema)]
pub struct CapturePayload {
    pub amount_cents: Option<i64>,
    pub idempotency_key: Option<Uuid>,
}

#[derive(Deserialize, Default)]
pub struct VoidPayload {
    pub idempotency_key: Option<Uuid>,
}

#[derive(Deserialize, ToSchema)]
pub struct RefundPayload {
    pub amount_cents: Option<i64>,
    pub reason: String,
    pub idempotency_key: Option<Uuid>,
}

#[derive(Deserialize, Default)]
pub struct ListTransactionsQuery {
    pub merchant_id: Option<Uuid>,
    pub customer_id: Option<String>,
    pub parent_transaction_id: Option<Uuid>,
    pub subscription_id: Option<String>,
    pub status: Option<TransactionStatus>,
    pub tran_type: Option<TransactionType>,
    pub payment_method_id: Option<Uuid>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Deserialize, Default)]
pub struct BillingPayload {
    pub full_name: Option<String>,
    pub street: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
}

impl From<BillingPayload> for BillingInfo {
    fn from(b: BillingPayload) -> Self {
        Self {
            full_name: b.full_name,
            street: b.street,
            city: b.city,
            state: b.state,
            postal_code: b.postal_code,
            country: b.country,
        }
    }
}

#[derive(Deserialize)]
pub struct StoreAchPayload {
    pub merchant_id: Option<Uuid>,
    pub merchant_slug: Option<String>,
    pub customer_id: String,
    pub routing_number: String,
    pub account_number: String,
    pub account_type: AchAccountType,
    pub bank_name: Option<String>,
    #[serde(default)]
    pub is_default: bool,
}

#[derive(Deserialize)]
pub struct StoreCardFromTokenPayload {
    pub merchant_id: Option<Uuid>,
    pub merchant_slug: Option<String>,
    pub customer_id: String,
    pub financial_token: String,
    pub last_four: String,
    pub card_brand: Option<String>,
    pub exp_month: i32,
    pub exp_year: i32,
    #[serde(default)]
    pub billing: BillingPayload,
    #[serde(default)]
    pub is_default: bool,
}

#[derive(Deserialize)]
pub struct StoreCardDirectPayload {
    pub merchant_id: Option<Uuid>,
    pub merchant_slug: Option<String>,
    pub customer_id: String,
    pub card_number: String,
    pub exp_month: i32,
    pub exp_year: i32,
    pub cvv: String,
    #[serde(default)]
    pub billing: BillingPayload,
    #[serde(default)]
    pub is_default: bool,
}

#[derive(Deserialize, Default)]
pub struct DeactivatePayload {
    pub reason: Option<String>,
}

#[derive(Deserialize, Default)]
pub struct ListPaymentMethodsQuery {
    pub merchant_id: Option<Uuid>,
    pub merchant_slug: Option<String>,
    #[serde(default)]
    pub include_inactive: bool,
}

// ---------------------------------------------------------------------------
// DTOs de salida: la forma de wire excluye tran_nbr y auth_guid, que son
// internos al dialogo con el Gateway

#[derive(Serialize)]
pub struct TransactionResponse {
    pub id: Uuid,
    pub parent_transaction_id: Option<Uuid>,
    pub merchant_id: Uuid,
    pub customer_id: Option<String>,
    pub subscription_id: Option<String>,
    pub amount_cents: i64,
    pub currency: String,
    #[serde(rename = "type")]
    pub tran_type: TransactionType,
    pub status: TransactionStatus,
    pub payment_method_type: PaymentMethodType,
    pub payment_method_id: Option<Uuid>,
    pub auth_resp: Option<String>,
    pub auth_code: Option<String>,
    pub auth_card_type: Option<String>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Transaction> for TransactionResponse {
    fn from(tx: Transaction) -> Self {
        Self {
            id: tx.id.0,
            parent_transaction_id: tx.parent_transaction_id.map(|p| p.0),
            merchant_id: tx.merchant_id.0,
            customer_id: tx.customer_id,
            subscription_id: tx.subscription_id,
            amount_cents: tx.amount_cents,
            currency: tx.currency,
            tran_type: tx.tran_type,
            status: tx.status,
            payment_method_type: tx.payment_method_type,
            payment_method_id: tx.payment_method_id.map(|p| p.0),
            auth_resp: if tx.auth_resp.is_empty() {
                None
            } else {
                Some(tx.auth_resp)
            },
            auth_code: tx.auth_code,
            auth_card_type: tx.auth_card_type,
            metadata: tx.metadata,
            updated_at: tx.processed_at.unwrap_or(tx.created_at),
            created_at: tx.created_at,
        }
    }
}

#[derive(Serialize)]
pub struct PaymentMethodResponse {
    pub id: Uuid,
    pub merchant_id: Uuid,
    pub customer_id: String,
    pub method_type: PaymentMethodType,
    pub last_four: String,
    pub card_brand: Option<String>,
    pub card_exp_month: Option<i32>,
    pub card_exp_year: Option<i32>,
    pub bank_name: Option<String>,
    pub account_type: Option<AchAccountType>,
    pub is_default: bool,
    pub is_active: bool,
    pub is_verified: bool,
    pub verification_status: VerificationStatus,
    pub return_count: i32,
    pub deactivation_reason: Option<String>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<PaymentMethod> for PaymentMethodResponse {
    fn from(m: PaymentMethod) -> Self {
        // El storage token jamas sale por el wire
        Self {
            id: m.id.0,
            merchant_id: m.merchant_id.0,
            customer_id: m.customer_id,
            method_type: m.method_type,
            last_four: m.last_four,
            card_brand: m.card_brand,
            card_exp_month: m.card_exp_month,
            card_exp_year: m.card_exp_year,
            bank_name: m.bank_name,
            account_type: m.account_type,
            is_default: m.is_default,
            is_active: m.is_active,
            is_verified: m.is_verified,
            verification_status: m.verification_status,
            return_count: m.return_count,
            deactivation_reason: m.deactivation_reason,
            last_used_at: m.last_used_at,
            created_at: m.created_at,
        }
    }
}

#[derive(Serialize)]
pub struct TransactionListResponse {
    pub transactions: Vec<TransactionResponse>,
    pub total_count: i64,
}

// ---------------------------------------------------------------------------
// Handlers de transacciones

// Handler: Iniciar una venta (auth + captura)
// POST /transactions/sale
#[utoipa::path(
    post,
    path = "/transactions/sale",
    request_body = SalePayload,
    responses((status = 200, description = "Transaccion conciliada", body = ApiResponse<serde_json::Value>))
)]
pub async fn sale(
    State(state): State<Arc<AppState>>,
    Caller(identity): Caller,
    Json(payload): Json<SalePayload>,
) -> Result<Json<ApiResponse<TransactionResponse>>, ApiError> {
    let tx = state
        .sale_use_case
        .execute(&identity, payload.into_request())
        .await?;
    Ok(Json(ApiResponse::success(tx.into())))
}

// Handler: Autorizar sin capturar
// POST /transactions/authorize
#[utoipa::path(
    post,
    path = "/transactions/authorize",
    request_body = SalePayload,
    responses((status = 200, description = "Transaccion conciliada", body = ApiResponse<serde_json::Value>))
)]
pub async fn authorize(
    State(state): State<Arc<AppState>>,
    Caller(identity): Caller,
    Json(payload): Json<SalePayload>,
) -> Result<Json<ApiResponse<TransactionResponse>>, ApiError> {
    let tx = state
        .authorize_use_case
        .execute(&identity, payload.into_request())
        .await?;
    Ok(Json(ApiResponse::success(tx.into())))
}

// Handler: Capturar una autorizacion (parcial o total)
// POST /transactions/{id}/capture
#[utoipa::path(
    post,
    path = "/transactions/{id}/capture",
    params(("id" = Uuid, Path, description = "Id de la transaccion AUTH raiz")),
    request_body = CapturePayload,
    responses((status = 200, description = "Captura conciliada", body = ApiResponse<serde_json::Value>))
)]
pub async fn capture(
    State(state): State<Arc<AppState>>,
    Caller(identity): Caller,
    Path(id): Path<Uuid>,
    Json(payload): Json<CapturePayload>,
) -> Result<Json<ApiResponse<TransactionResponse>>, ApiError> {
    let tx = state
        .capture_use_case
        .execute(
            &identity,
            CaptureRequest {
                parent_transaction_id: TransactionId(id),
                amount_cents: payload.amount_cents,
                idempotency_key: payload.idempotency_key.map(TransactionId),
            },
        )
        .await?;
    Ok(Json(ApiResponse::success(tx.into())))
}

// Handler: Anular una autorizacion o captura
// POST /transactions/{id}/void
pub async fn void(
    State(state): State<Arc<AppState>>,
    Caller(identity): Caller,
    Path(id): Path<Uuid>,
    Json(payload): Json<VoidPayload>,
) -> Result<Json<ApiResponse<TransactionResponse>>, ApiError> {
    let tx = state
        .void_use_case
        .execute(
            &identity,
            VoidRequest {
                parent_transaction_id: TransactionId(id),
                idempotency_key: payload.idempotency_key.map(TransactionId),
            },
        )
        .await?;
    Ok(Json(ApiResponse::success(tx.into())))
}

// Handler: Reembolsar fondos capturados
// POST /transactions/{id}/refund
#[utoipa::path(
    post,
    path = "/transactions/{id}/refund",
    params(("id" = Uuid, Path, description = "Id de la transaccion SALE o AUTH raiz")),
    request_body = RefundPayload,
    responses((status = 200, description = "Reembolso conciliado", body = ApiResponse<serde_json::Value>))
)]
pub async fn refund(
    State(state): State<Arc<AppState>>,
    Caller(identity): Caller,
    Path(id): Path<Uuid>,
    Json(payload): Json<RefundPayload>,
) -> Result<Json<ApiResponse<TransactionResponse>>, ApiError> {
    let tx = state
        .refund_use_case
        .execute(
            &identity,
            RefundRequest {
                parent_transaction_id: TransactionId(id),
                amount_cents: payload.amount_cents,
                reason: payload.reason,
                idempotency_key: payload.idempotency_key.map(TransactionId),
            },
        )
        .await?;
    Ok(Json(ApiResponse::success(tx.into())))
}

// Handler: Ver detalle de una transaccion (tambien sirve como busqueda por
// llave de idempotencia, que es el mismo id)
// GET /transactions/{id}
#[utoipa::path(
    get,
    path = "/transactions/{id}",
    params(("id" = Uuid, Path, description = "Id / llave de idempotencia")),
    responses((status = 200, description = "Transaccion", body = ApiResponse<serde_json::Value>))
)]
pub async fn get_transaction(
    State(state): State<Arc<AppState>>,
    Caller(identity): Caller,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<TransactionResponse>>, ApiError> {
    let tx = state
        .get_transaction_use_case
        .execute(&identity, TransactionId(id))
        .await?;
    Ok(Json(ApiResponse::success(tx.into())))
}

// Handler: Cadena completa en orden de replay
// GET /transactions/{id}/group
pub async fn get_transaction_group(
    State(state): State<Arc<AppState>>,
    Caller(identity): Caller,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Vec<TransactionResponse>>>, ApiError> {
    let group = state
        .get_transaction_group_use_case
        .execute(&identity, TransactionId(id))
        .await?;
    Ok(Json(ApiResponse::success(
        group.into_iter().map(Into::into).collect(),
    )))
}

// Handler: Listado paginado con conteo total
// GET /transactions
#[utoipa::path(
    get,
    path = "/transactions",
    responses((status = 200, description = "Pagina de transacciones", body = ApiResponse<serde_json::Value>))
)]
pub async fn list_transactions(
    State(state): State<Arc<AppState>>,
    Caller(identity): Caller,
    Query(query): Query<ListTransactionsQuery>,
) -> Result<Json<ApiResponse<TransactionListResponse>>, ApiError> {
    let (transactions, total_count) = state
        .list_transactions_use_case
        .execute(
            &identity,
            ListTransactionsRequest {
                merchant_id: query.merchant_id.map(MerchantId),
                customer_id: query.customer_id,
                parent_transaction_id: query.parent_transaction_id.map(TransactionId),
                subscription_id: query.subscription_id,
                status: query.status,
                tran_type: query.tran_type,
                payment_method_id: query.payment_method_id.map(PaymentMethodId),
                limit: query.limit,
                offset: query.offset,
            },
        )
        .await?;

    Ok(Json(ApiResponse::success(TransactionListResponse {
        transactions: transactions.into_iter().map(Into::into).collect(),
        total_count,
    })))
}

// ---------------------------------------------------------------------------
// Handlers de metodos de pago

// Handler: Alta de cuenta ACH (prenote + storage token)
// POST /payment-methods/ach
pub async fn store_ach_account(
    State(state): State<Arc<AppState>>,
    Caller(identity): Caller,
    Json(payload): Json<StoreAchPayload>,
) -> Result<Json<ApiResponse<PaymentMethodResponse>>, ApiError> {
    let method = state
        .store_ach_account_use_case
        .execute(
            &identity,
            StoreAchAccountRequest {
                merchant_id: payload.merchant_id.map(MerchantId),
                merchant_slug: payload.merchant_slug,
                customer_id: payload.customer_id,
                routing_number: payload.routing_number,
                account_number: payload.account_number,
                account_type: payload.account_type,
                bank_name: payload.bank_name,
                is_default: payload.is_default,
            },
        )
        .await?;
    Ok(Json(ApiResponse::success(method.into())))
}

// Handler: Guardar tarjeta desde token del flujo de navegador
// POST /payment-methods/cards
pub async fn store_credit_card_from_token(
    State(state): State<Arc<AppState>>,
    Caller(identity): Caller,
    Json(payload): Json<StoreCardFromTokenPayload>,
) -> Result<Json<ApiResponse<PaymentMethodResponse>>, ApiError> {
    let method = state
        .store_credit_card_use_case
        .execute_from_token(
            &identity,
            StoreCreditCardFromTokenRequest {
                merchant_id: payload.merchant_id.map(MerchantId),
                merchant_slug: payload.merchant_slug,
                customer_id: payload.customer_id,
                financial_token: payload.financial_token,
                last_four: payload.last_four,
                card_brand: payload.card_brand,
                exp_month: payload.exp_month,
                exp_year: payload.exp_year,
                billing: payload.billing.into(),
                is_default: payload.is_default,
            },
        )
        .await?;
    Ok(Json(ApiResponse::success(method.into())))
}

// Handler: Tokenizar y guardar tarjeta digitada
// POST /payment-methods/cards/direct
pub async fn store_credit_card_direct(
    State(state): State<Arc<AppState>>,
    Caller(identity): Caller,
    Json(payload): Json<StoreCardDirectPayload>,
) -> Result<Json<ApiResponse<PaymentMethodResponse>>, ApiError> {
    let method = state
        .store_credit_card_use_case
        .execute_direct(
            &identity,
            StoreCreditCardDirectRequest {
                merchant_id: payload.merchant_id.map(MerchantId),
                merchant_slug: payload.merchant_slug,
                customer_id: payload.customer_id,
                card_number: payload.card_number,
                exp_month: payload.exp_month,
                exp_year: payload.exp_year,
                cvv: payload.cvv,
                billing: payload.billing.into(),
                is_default: payload.is_default,
            },
        )
        .await?;
    Ok(Json(ApiResponse::success(method.into())))
}

// Handler: Ver un metodo de pago
// GET /payment-methods/{id}
pub async fn get_payment_method(
    State(state): State<Arc<AppState>>,
    Caller(identity): Caller,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<PaymentMethodResponse>>, ApiError> {
    let method = state
        .get_payment_method_use_case
        .execute(&identity, PaymentMethodId(id))
        .await?;
    Ok(Json(ApiResponse::success(method.into())))
}

// Handler: Metodos de pago de un cliente
// GET /customers/{customer_id}/payment-methods
pub async fn list_payment_methods(
    State(state): State<Arc<AppState>>,
    Caller(identity): Caller,
    Path(customer_id): Path<String>,
    Query(query): Query<ListPaymentMethodsQuery>,
) -> Result<Json<ApiResponse<Vec<PaymentMethodResponse>>>, ApiError> {
    let methods = state
        .list_payment_methods_use_case
        .execute(
            &identity,
            ListPaymentMethodsRequest {
                merchant_id: query.merchant_id.map(MerchantId),
                merchant_slug: query.merchant_slug,
                customer_id,
                include_inactive: query.include_inactive,
            },
        )
        .await?;
    Ok(Json(ApiResponse::success(
        methods.into_iter().map(Into::into).collect(),
    )))
}

// Handler: Desactivar un metodo de pago
// POST /payment-methods/{id}/deactivate
pub async fn deactivate_payment_method(
    State(state): State<Arc<AppState>>,
    Caller(identity): Caller,
    Path(id): Path<Uuid>,
    Json(payload): Json<DeactivatePayload>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    state
        .deactivate_payment_method_use_case
        .execute(&identity, PaymentMethodId(id), payload.reason)
        .await?;
    Ok(Json(ApiResponse::success(
        serde_json::json!({ "deactivated": true }),
    )))
}
