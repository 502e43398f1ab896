use crate::domain::access::{CallerIdentity, METADATA_SESSION_ID};
use crate::domain::entities::{
    Merchant, NewTransaction, PaymentMethod, PaymentMethodType, Transaction, TransactionType,
};
use crate::domain::error::PaymentError;
use crate::domain::gateways::{
    card_entry, tran_group, GatewayOperation, GatewayRequest, GatewayResponse, PaymentGateway,
};
use crate::domain::repository::{
    AuditLogRepository, GatewayReconcile, MerchantRepository, NewAuditEntry,
    PaymentMethodRepository, TransactionRepository,
};
use crate::domain::secrets::SecretStore;
use crate::domain::state::{ChainOperation, FollowUpRequest};
use crate::domain::types::{format_cents, MerchantId, PaymentMethodId, TransactionId};
use chrono::Utc;
use std::sync::Arc;
use tracing::warn;

/// Referencia de comercio en una solicitud: por id o por slug.
#[derive(Debug, Clone)]
pub enum MerchantRef {
    Id(MerchantId),
    Slug(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootPaymentKind {
    Sale,
    Authorize,
}

/// Origen del token del instrumento en una operacion raiz.
#[derive(Debug, Clone)]
pub enum PaymentSource {
    /// Metodo de pago almacenado (storage token persistente).
    Method(PaymentMethodId),
    /// Token de un solo uso emitido por el flujo de navegador del Gateway.
    OneShotToken(String),
}

#[derive(Debug, Clone)]
pub struct RootPaymentCommand {
    pub kind: RootPaymentKind,
    pub idempotency_key: TransactionId,
    pub merchant: Option<MerchantRef>,
    pub customer_id: Option<String>,
    pub subscription_id: Option<String>,
    pub amount_cents: i64,
    pub currency: String,
    pub source: PaymentSource,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct FollowUpCommand {
    pub op: ChainOperation,
    pub idempotency_key: TransactionId,
    pub parent_transaction_id: TransactionId,
    pub amount_cents: Option<i64>,
    pub reason: Option<String>,
}

/// Forma comun de las solicitudes Sale / Authorize que llegan del transporte.
#[derive(Debug, Clone)]
pub struct RootPaymentRequest {
    pub merchant_id: Option<MerchantId>,
    pub merchant_slug: Option<String>,
    pub customer_id: Option<String>,
    pub subscription_id: Option<String>,
    pub amount_cents: i64,
    pub currency: String,
    pub payment_method_id: Option<PaymentMethodId>,
    pub payment_token: Option<String>,
    pub idempotency_key: TransactionId,
    pub metadata: Option<serde_json::Value>,
}

/// Exactamente uno de {payment_method_id, payment_token} debe venir.
pub(crate) fn resolve_source_fields(
    payment_method_id: Option<PaymentMethodId>,
    payment_token: Option<String>,
) -> Result<PaymentSource, PaymentError> {
    match (payment_method_id, payment_token) {
        (Some(method_id), None) => Ok(PaymentSource::Method(method_id)),
        (None, Some(token)) => Ok(PaymentSource::OneShotToken(token)),
        (Some(_), Some(_)) => Err(PaymentError::ValidationError(
            "provide either payment_method_id or payment_token, not both".to_string(),
        )),
        (None, None) => Err(PaymentError::ValidationError(
            "either payment_method_id or payment_token is required".to_string(),
        )),
    }
}

/// A lo sumo una de las dos referencias de comercio puede venir.
pub(crate) fn merchant_ref_from(
    merchant_id: Option<MerchantId>,
    merchant_slug: Option<String>,
) -> Result<Option<MerchantRef>, PaymentError> {
    match (merchant_id, merchant_slug) {
        (Some(_), Some(_)) => Err(PaymentError::ValidationError(
            "provide either merchant_id or merchant_slug, not both".to_string(),
        )),
        (Some(id), None) => Ok(Some(MerchantRef::Id(id))),
        (None, Some(slug)) => Ok(Some(MerchantRef::Slug(slug))),
        (None, None) => Ok(None),
    }
}

pub(crate) fn root_command_from(
    kind: RootPaymentKind,
    request: RootPaymentRequest,
) -> Result<RootPaymentCommand, PaymentError> {
    let source = resolve_source_fields(request.payment_method_id, request.payment_token)?;
    let merchant = merchant_ref_from(request.merchant_id, request.merchant_slug)?;

    Ok(RootPaymentCommand {
        kind,
        idempotency_key: request.idempotency_key,
        merchant,
        customer_id: request.customer_id,
        subscription_id: request.subscription_id,
        amount_cents: request.amount_cents,
        currency: request.currency,
        source,
        metadata: request.metadata.unwrap_or_else(|| serde_json::json!({})),
    })
}

/// Resuelve el comercio efectivo de una escritura y verifica que este activo.
///
/// Compartida por el pipeline y por los flujos de almacenamiento de metodos
/// de pago. Un comercio fuera del alcance del llamador responde igual que
/// uno inexistente.
pub(crate) async fn resolve_active_merchant(
    merchant_repo: &Arc<dyn MerchantRepository>,
    identity: &CallerIdentity,
    reference: Option<&MerchantRef>,
) -> Result<Merchant, PaymentError> {
    let merchant = match reference {
        Some(MerchantRef::Id(id)) => merchant_repo
            .find_by_id(*id)
            .await?
            .ok_or_else(|| PaymentError::NotFound("Merchant".to_string()))?,
        Some(MerchantRef::Slug(slug)) => merchant_repo
            .find_by_slug(slug.clone())
            .await?
            .ok_or_else(|| PaymentError::NotFound("Merchant".to_string()))?,
        None => {
            let effective = identity.resolve_write_merchant(None)?;
            merchant_repo
                .find_by_id(effective)
                .await?
                .ok_or_else(|| PaymentError::NotFound("Merchant".to_string()))?
        }
    };

    // El filtro decide si la credencial alcanza a este comercio
    identity.resolve_write_merchant(Some(merchant.id))?;

    if !merchant.is_active {
        return Err(PaymentError::MerchantInactive(merchant.id));
    }

    Ok(merchant)
}

pub(crate) fn actor_label(identity: &CallerIdentity) -> String {
    match identity {
        CallerIdentity::Merchant { merchant_ids } => match merchant_ids.as_slice() {
            [only] => format!("merchant:{}", only),
            _ => "merchant:multi".to_string(),
        },
        CallerIdentity::Customer { customer_id } => format!("customer:{}", customer_id),
        CallerIdentity::Guest { session_id, .. } => format!("guest:{}", session_id),
        CallerIdentity::Service => "service".to_string(),
        CallerIdentity::Admin => "admin".to_string(),
    }
}

/// Motor de los cinco flujos de escritura (Sale / Authorize / Capture /
/// Void / Refund).
///
/// Todas las operaciones siguen el mismo pipeline: resolucion de comercio,
/// validacion, sonda de idempotencia, resolucion de token, chequeo de estado
/// bajo lock (solo continuaciones), insercion pendiente, llamada al Gateway
/// y conciliacion. Solo el validador por operacion y el clasificador del
/// Gateway varian; los wrappers por operacion ponen esa pieza.
pub struct PaymentPipeline {
    transaction_repo: Arc<dyn TransactionRepository>,
    merchant_repo: Arc<dyn MerchantRepository>,
    payment_method_repo: Arc<dyn PaymentMethodRepository>,
    audit_repo: Arc<dyn AuditLogRepository>,
    gateway: Arc<dyn PaymentGateway>,
    secrets: Arc<dyn SecretStore>,
}

impl PaymentPipeline {
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

    /// Ejecuta una operacion raiz (Sale o Authorize).
    pub async fn execute_root(
        &self,
        identity: &CallerIdentity,
        command: RootPaymentCommand,
    ) -> Result<Transaction, PaymentError> {
        let currency = validate_root(&command)?;

        let merchant =
            resolve_active_merchant(&self.merchant_repo, identity, command.merchant.as_ref())
                .await?;

        // Sonda de idempotencia: la llave ES el id de la transaccion
        if let Some(existing) = self
            .transaction_repo
            .find_by_id(command.idempotency_key)
            .await?
        {
            // Una llave ajena es indistinguible de una inexistente
            if existing.merchant_id != merchant.id {
                return Err(PaymentError::NotFound("Transaction".to_string()));
            }
            if existing.is_reconciled() {
                // Replay: se devuelve el resultado almacenado sin tocar nada
                return Ok(existing);
            }
            // Un intento previo murio entre el insert y la conciliacion: se
            // reemite la llamada con el mismo tran_nbr deterministico y el
            // Gateway dedupe por su cuenta
            let token = self.resolve_token_for_resume(&merchant, &command).await?;
            return self
                .call_gateway_and_reconcile_root(identity, &merchant, existing, token)
                .await;
        }

        let (token, method) = self.resolve_payment_source(&merchant, &command).await?;

        let mut metadata = command.metadata.clone();
        if let CallerIdentity::Guest { session_id, .. } = identity {
            metadata[METADATA_SESSION_ID] = serde_json::json!(session_id);
        }

        let new_tx = NewTransaction {
            id: command.idempotency_key,
            parent_transaction_id: None,
            merchant_id: merchant.id,
            customer_id: command.customer_id.clone(),
            subscription_id: command.subscription_id.clone(),
            amount_cents: command.amount_cents,
            currency,
            tran_type: match command.kind {
                RootPaymentKind::Sale => TransactionType::SALE,
                RootPaymentKind::Authorize => TransactionType::AUTH,
            },
            payment_method_type: method
                .as_ref()
                .map(|m| m.method_type)
                .unwrap_or(PaymentMethodType::CREDIT_CARD),
            payment_method_id: method.as_ref().map(|m| m.id),
            metadata,
        };

        // La fila pendiente se commitea ANTES de llamar al Gateway: si el
        // proceso muere a mitad, el reintento reconstruye el mismo tran_nbr
        let pending = match self.transaction_repo.create(new_tx).await {
            Ok(tx) => tx,
            Err(PaymentError::DuplicateTransaction(_)) => {
                // Carrera entre dos reintentos del mismo key: el perdedor lee
                // la fila del ganador
                let existing = self
                    .transaction_repo
                    .find_by_id(command.idempotency_key)
                    .await?
                    .ok_or_else(|| {
                        PaymentError::RepositoryError(
                            "duplicate transaction disappeared".to_string(),
                        )
                    })?;
                if existing.merchant_id != merchant.id {
                    return Err(PaymentError::NotFound("Transaction".to_string()));
                }
                if existing.is_reconciled() {
                    return Ok(existing);
                }
                existing
            }
            Err(e) => return Err(e),
        };

        self.call_gateway_and_reconcile_root(identity, &merchant, pending, token)
            .await
    }

    /// Ejecuta una continuacion de cadena (Capture, Void o Refund).
    pub async fn execute_follow_up(
        &self,
        identity: &CallerIdentity,
        command: FollowUpCommand,
    ) -> Result<Transaction, PaymentError> {
        if !identity.allows_follow_up() {
            return Err(PaymentError::AccessDenied(
                "this credential cannot continue payment chains".to_string(),
            ));
        }
        if let Some(amount) = command.amount_cents {
            if amount < 1 {
                return Err(PaymentError::ValidationError(
                    "amount_cents must be at least 1".to_string(),
                ));
            }
        }

        // Sonda de idempotencia
        if let Some(existing) = self
            .transaction_repo
            .find_by_id(command.idempotency_key)
            .await?
        {
            identity.resolve_write_merchant(Some(existing.merchant_id))?;
            if existing.is_reconciled() {
                return Ok(existing);
            }
            return self.resume_follow_up(identity, existing).await;
        }

        let root = self
            .transaction_repo
            .find_by_id(command.parent_transaction_id)
            .await?
            .ok_or_else(|| PaymentError::NotFound("Transaction".to_string()))?;

        if root.parent_transaction_id.is_some() {
            return Err(PaymentError::ValidationError(
                "parent_transaction_id must reference the root of the chain".to_string(),
            ));
        }

        let effective = identity.resolve_write_merchant(Some(root.merchant_id))?;
        let merchant = self
            .merchant_repo
            .find_by_id(effective)
            .await?
            .ok_or_else(|| PaymentError::NotFound("Merchant".to_string()))?;
        if !merchant.is_active {
            return Err(PaymentError::MerchantInactive(merchant.id));
        }

        let request = FollowUpRequest {
            id: command.idempotency_key,
            op: command.op,
            merchant_id: effective,
            amount_cents: command.amount_cents,
            reason: command.reason.clone(),
        };

        // Chequeo de estado e insercion pendiente dentro de la misma
        // transaccion de BD que bloquea la cadena
        let (pending, state) = match self
            .transaction_repo
            .create_in_group(root.id, request)
            .await
        {
            Ok(pair) => pair,
            Err(PaymentError::DuplicateTransaction(_)) => {
                let existing = self
                    .transaction_repo
                    .find_by_id(command.idempotency_key)
                    .await?
                    .ok_or_else(|| {
                        PaymentError::RepositoryError(
                            "duplicate transaction disappeared".to_string(),
                        )
                    })?;
                identity.resolve_write_merchant(Some(existing.merchant_id))?;
                if existing.is_reconciled() {
                    return Ok(existing);
                }
                return self.resume_follow_up(identity, existing).await;
            }
            Err(e) => return Err(e),
        };

        let token = state.token_for(command.op).to_string();
        self.call_gateway_and_reconcile_follow_up(identity, &merchant, pending, token, command.op)
            .await
    }

    /// Reanuda una continuacion pendiente: reconstruye el token desde el
    /// replay del arbol y reemite la llamada con el mismo tran_nbr.
    async fn resume_follow_up(
        &self,
        identity: &CallerIdentity,
        pending: Transaction,
    ) -> Result<Transaction, PaymentError> {
        let effective = identity.resolve_write_merchant(Some(pending.merchant_id))?;
        let merchant = self
            .merchant_repo
            .find_by_id(effective)
            .await?
            .ok_or_else(|| PaymentError::NotFound("Merchant".to_string()))?;
        if !merchant.is_active {
            return Err(PaymentError::MerchantInactive(merchant.id));
        }

        let op = match pending.tran_type {
            TransactionType::CAPTURE => ChainOperation::Capture,
            TransactionType::VOID => ChainOperation::Void,
            TransactionType::REFUND => ChainOperation::Refund,
            _ => {
                return Err(PaymentError::RepositoryError(format!(
                    "pending transaction {} is not a chain continuation",
                    pending.id
                )))
            }
        };

        let root_id = pending.parent_transaction_id.ok_or_else(|| {
            PaymentError::RepositoryError(format!(
                "continuation {} has no parent pointer",
                pending.id
            ))
        })?;

        let tree = self.transaction_repo.find_group(root_id).await?;
        let state = crate::domain::state::compute_state(&tree);
        let token = state.token_for(op).to_string();

        self.call_gateway_and_reconcile_follow_up(identity, &merchant, pending, token, op)
            .await
    }

    async fn resolve_payment_source(
        &self,
        merchant: &Merchant,
        command: &RootPaymentCommand,
    ) -> Result<(String, Option<PaymentMethod>), PaymentError> {
        match &command.source {
            PaymentSource::Method(method_id) => {
                let method = self
                    .payment_method_repo
                    .find_by_id(*method_id)
                    .await?
                    .ok_or_else(|| PaymentError::NotFound("Payment method".to_string()))?;

                // Un metodo de otro comercio u otro cliente no existe para
                // este llamador
                if method.merchant_id != merchant.id {
                    return Err(PaymentError::NotFound("Payment method".to_string()));
                }
                if let Some(customer_id) = &command.customer_id {
                    if method.customer_id != *customer_id {
                        return Err(PaymentError::NotFound("Payment method".to_string()));
                    }
                }

                method.ensure_usable(Utc::now())?;

                if command.kind == RootPaymentKind::Authorize
                    && method.method_type == PaymentMethodType::ACH
                {
                    return Err(PaymentError::ValidationError(
                        "ACH accounts do not support authorization holds".to_string(),
                    ));
                }

                Ok((method.token.clone(), Some(method)))
            }
            PaymentSource::OneShotToken(token) => {
                if token.trim().is_empty() {
                    return Err(PaymentError::ValidationError(
                        "payment_token cannot be empty".to_string(),
                    ));
                }
                Ok((token.clone(), None))
            }
        }
    }

    /// En la reanudacion el token se re-resuelve sin repetir los chequeos de
    /// usabilidad: la fila pendiente es la prueba de que pasaron al insertar.
    async fn resolve_token_for_resume(
        &self,
        merchant: &Merchant,
        command: &RootPaymentCommand,
    ) -> Result<String, PaymentError> {
        match &command.source {
            PaymentSource::Method(method_id) => {
                let method = self
                    .payment_method_repo
                    .find_by_id(*method_id)
                    .await?
                    .ok_or_else(|| PaymentError::NotFound("Payment method".to_string()))?;
                if method.merchant_id != merchant.id {
                    return Err(PaymentError::NotFound("Payment method".to_string()));
                }
                Ok(method.token.clone())
            }
            PaymentSource::OneShotToken(token) => Ok(token.clone()),
        }
    }

    async fn call_gateway_and_reconcile_root(
        &self,
        identity: &CallerIdentity,
        merchant: &Merchant,
        pending: Transaction,
        token: String,
    ) -> Result<Transaction, PaymentError> {
        let (operation, group) = match (pending.tran_type, pending.payment_method_type) {
            (TransactionType::SALE, PaymentMethodType::ACH) => {
                (GatewayOperation::AchDebit, tran_group::SALE)
            }
            (TransactionType::SALE, _) => (GatewayOperation::Sale, tran_group::SALE),
            (_, _) => (GatewayOperation::AuthOnly, tran_group::AUTH),
        };

        let request = GatewayRequest {
            cust_nbr: merchant.cust_nbr.clone(),
            merch_nbr: merchant.merch_nbr.clone(),
            dba_nbr: merchant.dba_nbr.clone(),
            terminal_nbr: merchant.terminal_nbr.clone(),
            shared_secret: self.secrets.get_secret(&merchant.secret_path).await?,
            operation,
            amount: format_cents(pending.amount_cents),
            method_kind: pending.payment_method_type,
            auth_guid: Some(token),
            original_auth_guid: None,
            tran_nbr: pending.tran_nbr.clone(),
            tran_group: group.to_string(),
            card_entry_method: card_entry::TOKEN_ON_FILE.to_string(),
            customer_id: pending.customer_id.clone(),
            card: None,
            ach: None,
            billing: None,
        };

        self.submit_and_reconcile(identity, request, pending, true)
            .await
    }

    async fn call_gateway_and_reconcile_follow_up(
        &self,
        identity: &CallerIdentity,
        merchant: &Merchant,
        pending: Transaction,
        original_token: String,
        op: ChainOperation,
    ) -> Result<Transaction, PaymentError> {
        let (operation, group) = match op {
            ChainOperation::Capture => (GatewayOperation::Capture, tran_group::NONE),
            ChainOperation::Void => (GatewayOperation::Void, tran_group::VOID),
            ChainOperation::Refund => {
                if pending.payment_method_type == PaymentMethodType::ACH {
                    (GatewayOperation::AchCredit, tran_group::REFUND)
                } else {
                    (GatewayOperation::Refund, tran_group::REFUND)
                }
            }
        };

        let request = GatewayRequest {
            cust_nbr: merchant.cust_nbr.clone(),
            merch_nbr: merchant.merch_nbr.clone(),
            dba_nbr: merchant.dba_nbr.clone(),
            terminal_nbr: merchant.terminal_nbr.clone(),
            shared_secret: self.secrets.get_secret(&merchant.secret_path).await?,
            operation,
            amount: format_cents(pending.amount_cents),
            method_kind: pending.payment_method_type,
            auth_guid: None,
            original_auth_guid: Some(original_token),
            tran_nbr: pending.tran_nbr.clone(),
            tran_group: group.to_string(),
            card_entry_method: card_entry::TOKEN_ON_FILE.to_string(),
            customer_id: pending.customer_id.clone(),
            card: None,
            ach: None,
            billing: None,
        };

        self.submit_and_reconcile(identity, request, pending, false)
            .await
    }

    /// Paso final compartido: envia al Gateway y concilia la fila pendiente.
    ///
    /// Cualquier respuesta del Gateway (aprobada o rechazada) se concilia y
    /// se devuelve como transaccion. Si el transporte falla, la fila queda
    /// PENDING y el reintento del llamador con la misma llave la reanuda.
    async fn submit_and_reconcile(
        &self,
        identity: &CallerIdentity,
        request: GatewayRequest,
        pending: Transaction,
        mark_method_used: bool,
    ) -> Result<Transaction, PaymentError> {
        let response = self.gateway.process(request).await?;

        let reconciled = self
            .transaction_repo
            .update_from_gateway_response(pending.tran_nbr.clone(), reconcile_from(&response))
            .await?;

        if mark_method_used && reconciled.is_approved() {
            if let Some(method_id) = reconciled.payment_method_id {
                // Best-effort: el cobro ya quedo conciliado
                if let Err(e) = self.payment_method_repo.mark_used(method_id).await {
                    warn!("Failed to mark payment method {} as used: {}", method_id, e);
                }
            }
        }

        let action = format!(
            "{:?}.{:?}",
            reconciled.tran_type, reconciled.status
        )
        .to_lowercase();
        let entry = NewAuditEntry {
            entity_type: "transaction".to_string(),
            entity_id: reconciled.id.to_string(),
            action,
            actor: actor_label(identity),
            detail: serde_json::json!({
                "amount_cents": reconciled.amount_cents,
                "auth_resp": reconciled.auth_resp,
            }),
        };
        if let Err(e) = self.audit_repo.record(entry).await {
            warn!("Failed to record audit entry for {}: {}", reconciled.id, e);
        }

        Ok(reconciled)
    }
}

/// Valida la forma de una operacion raiz y devuelve la divisa normalizada.
fn validate_root(command: &RootPaymentCommand) -> Result<String, PaymentError> {
    let currency = command.currency.trim().to_uppercase();
    if currency.len() != 3 || !currency.bytes().all(|b| b.is_ascii_uppercase()) {
        return Err(PaymentError::ValidationError(
            "currency must be a 3-letter ISO code".to_string(),
        ));
    }

    let zero_amount_allowed = command.kind == RootPaymentKind::Sale
        && matches!(command.source, PaymentSource::OneShotToken(_));
    if command.amount_cents < 1 && !(zero_amount_allowed && command.amount_cents == 0) {
        return Err(PaymentError::ValidationError(
            "amount_cents must be at least 1".to_string(),
        ));
    }

    if let Some(customer_id) = &command.customer_id {
        if customer_id.is_empty() || customer_id.len() > 100 {
            return Err(PaymentError::ValidationError(
                "customer_id must be between 1 and 100 characters".to_string(),
            ));
        }
    }

    if !command.metadata.is_object() {
        return Err(PaymentError::ValidationError(
            "metadata must be a JSON object".to_string(),
        ));
    }

    Ok(currency)
}

/// Construye la conciliacion a partir de la respuesta del Gateway. Los ecos
/// AVS/CVV y el texto de respuesta viajan en metadata.
pub(crate) fn reconcile_from(response: &GatewayResponse) -> GatewayReconcile {
    let mut detail = serde_json::Map::new();
    if !response.auth_resp_text.is_empty() {
        detail.insert(
            "auth_resp_text".to_string(),
            serde_json::json!(response.auth_resp_text),
        );
    }
    if let Some(avs) = &response.avs_resp {
        detail.insert("avs_resp".to_string(), serde_json::json!(avs));
    }
    if let Some(cvv) = &response.cvv_resp {
        detail.insert("cvv_resp".to_string(), serde_json::json!(cvv));
    }

    GatewayReconcile {
        auth_guid: response.auth_guid.clone(),
        auth_resp: response.auth_resp.clone(),
        auth_code: response.auth_code.clone(),
        auth_card_type: response.auth_card_type.clone(),
        metadata: serde_json::Value::Object(detail),
        processed_at: Utc::now(),
    }
}
