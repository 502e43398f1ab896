use std::sync::Arc;
use tonic::{Request, Response, Status};
use uuid::Uuid;

use crate::api::identity::caller_from_metadata;
use crate::api::proto::payment as proto;
use crate::api::proto::payment::payment_service_server::PaymentService;
use crate::domain::access::CallerIdentity;
use crate::domain::entities::{Transaction, TransactionStatus, TransactionType};
use crate::domain::error::PaymentError;
use crate::domain::types::{MerchantId, PaymentMethodId, TransactionId};
use crate::use_cases::authorize::AuthorizeUseCase;
use crate::use_cases::capture::{CaptureRequest, CaptureUseCase};
use crate::use_cases::get_transaction::GetTransactionUseCase;
use crate::use_cases::get_transaction_group::GetTransactionGroupUseCase;
use crate::use_cases::list_transactions::{ListTransactionsRequest, ListTransactionsUseCase};
use crate::use_cases::pipeline::RootPaymentRequest;
use crate::use_cases::refund::{RefundRequest, RefundUseCase};
use crate::use_cases::sale::SaleUseCase;
use crate::use_cases::void::{VoidRequest, VoidUseCase};

// Superficie RPC operacional: los mismos casos de uso que el API HTTP,
// montados sobre tonic para el trafico entre servicios.
pub struct PaymentGrpcService {
    sale_use_case: Arc<SaleUseCase>,
    authorize_use_case: Arc<AuthorizeUseCase>,
    capture_use_case: Arc<CaptureUseCase>,
    void_use_case: Arc<VoidUseCase>,
    refund_use_case: Arc<RefundUseCase>,
    get_transaction_use_case: Arc<GetTransactionUseCase>,
    list_transactions_use_case: Arc<ListTransactionsUseCase>,
    get_transaction_group_use_case: Arc<GetTransactionGroupUseCase>,
}

impl PaymentGrpcService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        sale_use_case: Arc<SaleUseCase>,
        authorize_use_case: Arc<AuthorizeUseCase>,
        capture_use_case: Arc<CaptureUseCase>,
        void_use_case: Arc<VoidUseCase>,
        refund_use_case: Arc<RefundUseCase>,
        get_transaction_use_case: Arc<GetTransactionUseCase>,
        list_transactions_use_case: Arc<ListTransactionsUseCase>,
        get_transaction_group_use_case: Arc<GetTransactionGroupUseCase>,
    ) -> Self {
        Self {
            sale_use_case,
            authorize_use_case,
            capture_use_case,
            void_use_case,
            refund_use_case,
            get_transaction_use_case,
            list_transactions_use_case,
            get_transaction_group_use_case,
        }
    }
}

fn status_from(error: PaymentError) -> Status {
    match &error {
        PaymentError::ValidationError(_) => Status::invalid_argument(error.to_string()),
        PaymentError::NotFound(_) => Status::not_found(error.to_string()),
        PaymentError::AccessDenied(_) => Status::permission_denied(error.to_string()),
        PaymentError::MerchantInactive(_)
        | PaymentError::PaymentMethodInactive
        | PaymentError::PaymentMethodExpired
        | PaymentError::PaymentMethodNotVerified
        | PaymentError::CannotBeCaptured(_)
        | PaymentError::CannotBeVoided(_)
        | PaymentError::CannotBeRefunded(_)
        | PaymentError::GatewayDeclined { .. } => Status::failed_precondition(error.to_string()),
        PaymentError::DuplicateTransaction(_) | PaymentError::DuplicatePaymentMethod => {
            Status::already_exists(error.to_string())
        }
        PaymentError::GatewayUnavailable(_) | PaymentError::CircuitOpen => {
            Status::unavailable(error.to_string())
        }
        PaymentError::RepositoryError(e) | PaymentError::SecretError(e) => {
            tracing::error!("Internal error on gRPC surface: {}", e);
            Status::internal("internal error")
        }
    }
}

fn identity_of<T>(request: &Request<T>) -> Result<CallerIdentity, Status> {
    caller_from_metadata(request.metadata()).map_err(Status::unauthenticated)
}

fn parse_uuid(value: &str, field: &str) -> Result<Uuid, Status> {
    Uuid::parse_str(value)
        .map_err(|_| Status::invalid_argument(format!("{} is not a valid UUID", field)))
}

fn opt_uuid(value: &str, field: &str) -> Result<Option<Uuid>, Status> {
    if value.is_empty() {
        Ok(None)
    } else {
        parse_uuid(value, field).map(Some)
    }
}

fn opt(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

fn parse_status(value: &str) -> Result<Option<TransactionStatus>, Status> {
    match value {
        "" => Ok(None),
        "PENDING" => Ok(Some(TransactionStatus::PENDING)),
        "APPROVED" => Ok(Some(TransactionStatus::APPROVED)),
        "DECLINED" => Ok(Some(TransactionStatus::DECLINED)),
        other => Err(Status::invalid_argument(format!(
            "unknown status '{}'",
            other
        ))),
    }
}

fn parse_tran_type(value: &str) -> Result<Option<TransactionType>, Status> {
    match value {
        "" => Ok(None),
        "SALE" => Ok(Some(TransactionType::SALE)),
        "AUTH" => Ok(Some(TransactionType::AUTH)),
        "CAPTURE" => Ok(Some(TransactionType::CAPTURE)),
        "VOID" => Ok(Some(TransactionType::VOID)),
        "REFUND" => Ok(Some(TransactionType::REFUND)),
        "PRE_NOTE" => Ok(Some(TransactionType::PRE_NOTE)),
        "STORAGE" => Ok(Some(TransactionType::STORAGE)),
        other => Err(Status::invalid_argument(format!(
            "unknown tran_type '{}'",
            other
        ))),
    }
}

fn to_reply(tx: Transaction) -> proto::TransactionReply {
    let updated_at = tx.processed_at.unwrap_or(tx.created_at);
    proto::TransactionReply {
        id: tx.id.to_string(),
        parent_transaction_id: tx
            .parent_transaction_id
            .map(|p| p.to_string())
            .unwrap_or_default(),
        merchant_id: tx.merchant_id.to_string(),
        customer_id: tx.customer_id.unwrap_or_default(),
        subscription_id: tx.subscription_id.unwrap_or_default(),
        amount_cents: tx.amount_cents,
        currency: tx.currency,
        tran_type: format!("{:?}", tx.tran_type),
        status: format!("{:?}", tx.status),
        payment_method_type: format!("{:?}", tx.payment_method_type),
        payment_method_id: tx
            .payment_method_id
            .map(|p| p.to_string())
            .unwrap_or_default(),
        auth_resp: tx.auth_resp,
        auth_code: tx.auth_code.unwrap_or_default(),
        auth_card_type: tx.auth_card_type.unwrap_or_default(),
        metadata_json: tx.metadata.to_string(),
        created_at: tx.created_at.to_rfc3339(),
        updated_at: updated_at.to_rfc3339(),
    }
}

fn root_request_from(message: proto::SaleRequest) -> Result<RootPaymentRequest, Status> {
    let metadata = if message.metadata_json.is_empty() {
        None
    } else {
        Some(
            serde_json::from_str(&message.metadata_json)
                .map_err(|_| Status::invalid_argument("metadata_json is not valid JSON"))?,
        )
    };

    Ok(RootPaymentRequest {
        merchant_id: opt_uuid(&message.merchant_id, "merchant_id")?.map(MerchantId),
        merchant_slug: opt(message.merchant_slug),
        customer_id: opt(message.customer_id),
        subscription_id: opt(message.subscription_id),
        amount_cents: message.amount_cents,
        currency: message.currency,
        payment_method_id: opt_uuid(&message.payment_method_id, "payment_method_id")?
            .map(PaymentMethodId),
        payment_token: opt(message.payment_token),
        idempotency_key: TransactionId(parse_uuid(&message.idempotency_key, "idempotency_key")?),
        metadata,
    })
}

#[tonic::async_trait]
impl PaymentService for PaymentGrpcService {
    async fn sale(
        &self,
        request: Request<proto::SaleRequest>,
    ) -> Result<Response<proto::TransactionReply>, Status> {
        let identity = identity_of(&request)?;
        let payload = root_request_from(request.into_inner())?;

        let tx = self
            .sale_use_case
            .execute(&identity, payload)
            .await
            .map_err(status_from)?;
        Ok(Response::new(to_reply(tx)))
    }

    async fn authorize(
        &self,
        request: Request<proto::SaleRequest>,
    ) -> Result<Response<proto::TransactionReply>, Status> {
        let identity = identity_of(&request)?;
        let payload = root_request_from(request.into_inner())?;

        let tx = self
            .authorize_use_case
            .execute(&identity, payload)
            .await
            .map_err(status_from)?;
        Ok(Response::new(to_reply(tx)))
    }

    async fn capture(
        &self,
        request: Request<proto::FollowUpRequest>,
    ) -> Result<Response<proto::TransactionReply>, Status> {
        let identity = identity_of(&request)?;
        let message = request.into_inner();

        let tx = self
            .capture_use_case
            .execute(
                &identity,
                CaptureRequest {
                    parent_transaction_id: TransactionId(parse_uuid(
                        &message.parent_transaction_id,
                        "parent_transaction_id",
                    )?),
                    amount_cents: (message.amount_cents > 0).then_some(message.amount_cents),
                    idempotency_key: opt_uuid(&message.idempotency_key, "idempotency_key")?
                        .map(TransactionId),
                },
            )
            .await
            .map_err(status_from)?;
        Ok(Response::new(to_reply(tx)))
    }

    async fn void(
        &self,
        request: Request<proto::FollowUpRequest>,
    ) -> Result<Response<proto::TransactionReply>, Status> {
        let identity = identity_of(&request)?;
        let message = request.into_inner();

        let tx = self
            .void_use_case
            .execute(
                &identity,
                VoidRequest {
                    parent_transaction_id: TransactionId(parse_uuid(
                        &message.parent_transaction_id,
                        "parent_transaction_id",
                    )?),
                    idempotency_key: opt_uuid(&message.idempotency_key, "idempotency_key")?
                        .map(TransactionId),
                },
            )
            .await
            .map_err(status_from)?;
        Ok(Response::new(to_reply(tx)))
    }

    async fn refund(
        &self,
        request: Request<proto::FollowUpRequest>,
    ) -> Result<Response<proto::TransactionReply>, Status> {
        let identity = identity_of(&request)?;
        let message = request.into_inner();

        let tx = self
            .refund_use_case
            .execute(
                &identity,
                RefundRequest {
                    parent_transaction_id: TransactionId(parse_uuid(
                        &message.parent_transaction_id,
                        "parent_transaction_id",
                    )?),
                    amount_cents: (message.amount_cents > 0).then_some(message.amount_cents),
                    reason: message.reason,
                    idempotency_key: opt_uuid(&message.idempotency_key, "idempotency_key")?
                        .map(TransactionId),
                },
            )
            .await
            .map_err(status_from)?;
        Ok(Response::new(to_reply(tx)))
    }

    async fn get_transaction(
        &self,
        request: Request<proto::GetTransactionRequest>,
    ) -> Result<Response<proto::TransactionReply>, Status> {
        let identity = identity_of(&request)?;
        let message = request.into_inner();

        let tx = self
            .get_transaction_use_case
            .execute(
                &identity,
                TransactionId(parse_uuid(&message.transaction_id, "transaction_id")?),
            )
            .await
            .map_err(status_from)?;
        Ok(Response::new(to_reply(tx)))
    }

    async fn list_transactions(
        &self,
        request: Request<proto::ListTransactionsRequest>,
    ) -> Result<Response<proto::ListTransactionsReply>, Status> {
        let identity = identity_of(&request)?;
        let message = request.into_inner();

        let (transactions, total_count) = self
            .list_transactions_use_case
            .execute(
                &identity,
                ListTransactionsRequest {
                    merchant_id: opt_uuid(&message.merchant_id, "merchant_id")?.map(MerchantId),
                    customer_id: opt(message.customer_id),
                    parent_transaction_id: opt_uuid(
                        &message.parent_transaction_id,
                        "parent_transaction_id",
                    )?
                    .map(TransactionId),
                    subscription_id: opt(message.subscription_id),
                    status: parse_status(&message.status)?,
                    tran_type: parse_tran_type(&message.tran_type)?,
                    payment_method_id: opt_uuid(&message.payment_method_id, "payment_method_id")?
                        .map(PaymentMethodId),
                    limit: (message.limit > 0).then_some(message.limit),
                    offset: (message.offset > 0).then_some(message.offset),
                },
            )
            .await
            .map_err(status_from)?;

        Ok(Response::new(proto::ListTransactionsReply {
            transactions: transactions.into_iter().map(to_reply).collect(),
            total_count,
        }))
    }

    async fn get_transaction_group(
        &self,
        request: Request<proto::GetTransactionRequest>,
    ) -> Result<Response<proto::TransactionGroupReply>, Status> {
        let identity = identity_of(&request)?;
        let message = request.into_inner();

        let group = self
            .get_transaction_group_use_case
            .execute(
                &identity,
                TransactionId(parse_uuid(&message.transaction_id, "transaction_id")?),
            )
            .await
            .map_err(status_from)?;

        Ok(Response::new(proto::TransactionGroupReply {
            transactions: group.into_iter().map(to_reply).collect(),
        }))
    }
}
