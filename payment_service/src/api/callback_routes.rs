use axum::{
    extract::State,
    response::Redirect,
    routing::{get, post},
    Form, Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

use crate::api::error::ApiError;
use crate::api::response::ApiResponse;
use crate::use_cases::handle_gateway_callback::{
    CallbackOutcome, GatewayCallbackPayload, HandleGatewayCallbackUseCase,
};
use crate::use_cases::process_ach_verifications::{
    AchVerificationStats, ProcessAchVerificationsUseCase,
};

// Ingress separado del API operacional: los callbacks del Gateway y el
// scheduler externo controlan este protocolo, no nuestros clientes. Las dos
// superficies no deben colapsarse en un solo listener.
pub struct CallbackState {
    pub handle_callback_use_case: Arc<HandleGatewayCallbackUseCase>,
    pub process_ach_verifications_use_case: Arc<ProcessAchVerificationsUseCase>,
}

pub fn routes(state: Arc<CallbackState>) -> Router {
    Router::new()
        .route("/callbacks/gateway", post(gateway_callback))
        .route("/callbacks/complete", get(callback_complete))
        .route("/cron/ach-verifications", post(run_ach_verifications))
        .with_state(state)
}

// Handler: Callback del Gateway (form-encoded, autenticado por HMAC)
// POST /callbacks/gateway
//
// Respondemos con un redirect 303 (POST-redirect-GET) para que el refresh
// del navegador del comprador no re-envie el formulario.
pub async fn gateway_callback(
    State(state): State<Arc<CallbackState>>,
    Form(payload): Form<GatewayCallbackPayload>,
) -> Result<Redirect, ApiError> {
    let outcome = state.handle_callback_use_case.execute(payload).await?;

    match outcome {
        CallbackOutcome::Payment(tx) => {
            info!("Gateway callback reconciled transaction {}", tx.id);
        }
        CallbackOutcome::AchReturn { method_deactivated } => {
            info!(
                "Gateway return callback processed (method_deactivated: {})",
                method_deactivated
            );
        }
    }

    Ok(Redirect::to("/callbacks/complete"))
}

// Handler: Destino del POST-redirect-GET
// GET /callbacks/complete
pub async fn callback_complete() -> &'static str {
    "OK"
}

#[derive(Deserialize)]
pub struct AchVerificationsPayload {
    pub batch_size: Option<i64>,
    #[serde(default)]
    pub dry_run: bool,
}

// Handler: Ingress del cron de verificaciones ACH
// POST /cron/ach-verifications
pub async fn run_ach_verifications(
    State(state): State<Arc<CallbackState>>,
    Json(payload): Json<AchVerificationsPayload>,
) -> Result<Json<ApiResponse<AchVerificationStats>>, ApiError> {
    let stats = state
        .process_ach_verifications_use_case
        .execute(payload.batch_size.unwrap_or(100), payload.dry_run)
        .await?;

    Ok(Json(ApiResponse::success(stats)))
}
