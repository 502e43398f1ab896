use crate::domain::access::VisibilityScope;
use crate::domain::entities::{
    Merchant, NewMerchant, NewPaymentMethod, NewTransaction, PaymentMethod, Transaction,
    TransactionStatus, TransactionType,
};
use crate::domain::error::PaymentError;
use crate::domain::state::{FollowUpRequest, GroupState};
use crate::domain::types::{MerchantId, PaymentMethodId, TransactionId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Campos con los que se concilia una fila pendiente tras la respuesta del
/// Gateway. La actualizacion es idempotente: repetirla con la misma
/// respuesta es inocua.
#[derive(Debug, Clone)]
pub struct GatewayReconcile {
    pub auth_guid: String,
    pub auth_resp: String,
    pub auth_code: Option<String>,
    pub auth_card_type: Option<String>,
    /// Se fusiona sobre la metadata existente, no la reemplaza.
    pub metadata: serde_json::Value,
    pub processed_at: DateTime<Utc>,
}

/// Filtro de listado de transacciones. El `scope` del filtro de autorizacion
/// se aplica dentro de la consulta misma, nunca despues.
#[derive(Debug, Clone)]
pub struct TransactionFilter {
    pub scope: VisibilityScope,
    pub merchant_id: Option<MerchantId>,
    pub customer_id: Option<String>,
    pub parent_transaction_id: Option<TransactionId>,
    pub subscription_id: Option<String>,
    pub status: Option<TransactionStatus>,
    pub tran_type: Option<TransactionType>,
    pub payment_method_id: Option<PaymentMethodId>,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Clone)]
pub struct NewAuditEntry {
    pub entity_type: String,
    pub entity_id: String,
    pub action: String,
    pub actor: String,
    pub detail: serde_json::Value,
}

// Port para la persistencia del ledger de transacciones
#[async_trait]
pub trait TransactionRepository: Send + Sync {
    /// Inserta una fila pendiente raiz. Falla con `DuplicateTransaction` si
    /// el id ya existe (la llave de idempotencia es la primary key).
    async fn create(&self, new_tx: NewTransaction) -> Result<Transaction, PaymentError>;

    /// Continua una cadena de forma atomica: bloquea la raiz, hace replay
    /// del arbol, valida el predicado de la operacion e inserta la fila
    /// pendiente, todo dentro de una sola transaccion de BD. Devuelve la
    /// fila insertada y el estado observado bajo el lock.
    async fn create_in_group(
        &self,
        root_id: TransactionId,
        request: FollowUpRequest,
    ) -> Result<(Transaction, GroupState), PaymentError>;

    async fn find_by_id(&self, id: TransactionId) -> Result<Option<Transaction>, PaymentError>;

    async fn find_by_tran_nbr(&self, tran_nbr: String)
        -> Result<Option<Transaction>, PaymentError>;

    /// Raiz mas descendientes en orden de replay (created_at ascendente).
    async fn find_group(&self, root_id: TransactionId) -> Result<Vec<Transaction>, PaymentError>;

    async fn update_from_gateway_response(
        &self,
        tran_nbr: String,
        update: GatewayReconcile,
    ) -> Result<Transaction, PaymentError>;

    /// Fusiona una llave puntual en la metadata de la fila.
    async fn append_metadata(
        &self,
        id: TransactionId,
        key: String,
        value: serde_json::Value,
    ) -> Result<(), PaymentError>;

    async fn list(
        &self,
        filter: TransactionFilter,
    ) -> Result<(Vec<Transaction>, i64), PaymentError>;
}

// Port para la persistencia de comercios
#[async_trait]
pub trait MerchantRepository: Send + Sync {
    async fn create(&self, merchant: NewMerchant) -> Result<Merchant, PaymentError>;
    async fn find_by_id(&self, id: MerchantId) -> Result<Option<Merchant>, PaymentError>;
    async fn find_by_slug(&self, slug: String) -> Result<Option<Merchant>, PaymentError>;
    async fn set_active(&self, id: MerchantId, active: bool) -> Result<(), PaymentError>;
}

// Port para la persistencia de metodos de pago
#[async_trait]
pub trait PaymentMethodRepository: Send + Sync {
    async fn create(&self, method: NewPaymentMethod) -> Result<PaymentMethod, PaymentError>;

    async fn find_by_id(&self, id: PaymentMethodId)
        -> Result<Option<PaymentMethod>, PaymentError>;

    /// Busqueda por fingerprint (hash de ruta + ultimos cuatro) que hace
    /// idempotente el almacenamiento de cuentas.
    async fn find_by_fingerprint(
        &self,
        merchant_id: MerchantId,
        customer_id: String,
        routing_number_hash: String,
        last_four: String,
    ) -> Result<Option<PaymentMethod>, PaymentError>;

    async fn list_by_customer(
        &self,
        merchant_id: MerchantId,
        customer_id: String,
        include_inactive: bool,
    ) -> Result<Vec<PaymentMethod>, PaymentError>;

    /// Metodo preferido del cliente: el marcado como default si existe, si
    /// no el activo mas reciente.
    async fn find_default(
        &self,
        merchant_id: MerchantId,
        customer_id: String,
    ) -> Result<Option<PaymentMethod>, PaymentError>;

    async fn mark_used(&self, id: PaymentMethodId) -> Result<(), PaymentError>;

    async fn deactivate(&self, id: PaymentMethodId, reason: String) -> Result<(), PaymentError>;

    async fn find_pending_ach_verifications(
        &self,
        older_than: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<PaymentMethod>, PaymentError>;

    async fn mark_verified(
        &self,
        id: PaymentMethodId,
        verified_at: DateTime<Utc>,
    ) -> Result<(), PaymentError>;

    /// Marca la verificacion como fallida y desactiva el metodo: un metodo
    /// ACH activo con verificacion fallida no puede existir.
    async fn mark_verification_failed(
        &self,
        id: PaymentMethodId,
        reason: String,
    ) -> Result<(), PaymentError>;

    /// Incrementa el contador de retornos de forma atomica; al alcanzar el
    /// umbral la misma sentencia desactiva el metodo con razon
    /// `excessive_returns`. Devuelve la fila resultante.
    async fn increment_return_count(
        &self,
        id: PaymentMethodId,
        auto_deactivate_threshold: i32,
    ) -> Result<PaymentMethod, PaymentError>;

    async fn find_by_prenote_transaction(
        &self,
        transaction_id: TransactionId,
    ) -> Result<Option<PaymentMethod>, PaymentError>;
}

// Port para la bitacora de auditoria
#[async_trait]
pub trait AuditLogRepository: Send + Sync {
    async fn record(&self, entry: NewAuditEntry) -> Result<(), PaymentError>;
}
