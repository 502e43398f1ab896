use dotenvy::dotenv;
use payment_service::{
    api::{
        callback_routes::{self, CallbackState},
        grpc_service::PaymentGrpcService,
        http_routes::{routes, AppState},
        proto::payment::payment_service_server::PaymentServiceServer,
    },
    infrastructure::{
        gateways::{fake_gateway::FakePaymentGateway, resilient_gateway::ResilientPaymentGateway},
        persistence::{
            audit_repository::PostgresAuditLogRepository,
            merchant_repository::PostgresMerchantRepository,
            payment_method_repository::PostgresPaymentMethodRepository,
            transaction_repository::PostgresTransactionRepository,
        },
        secrets::{cached_resolver::CachedSecretResolver, env_store::EnvSecretStore},
    },
    jobs::{ach_verification::AchVerificationJob, pool_monitor::PoolMonitorJob},
    use_cases::{
        authorize::AuthorizeUseCase, capture::CaptureUseCase,
        deactivate_payment_method::DeactivatePaymentMethodUseCase,
        get_payment_method::GetPaymentMethodUseCase, get_transaction::GetTransactionUseCase,
        get_transaction_group::GetTransactionGroupUseCase,
        handle_gateway_callback::HandleGatewayCallbackUseCase,
        list_payment_methods::ListPaymentMethodsUseCase,
        list_transactions::ListTransactionsUseCase, pipeline::PaymentPipeline,
        process_ach_verifications::ProcessAchVerificationsUseCase, refund::RefundUseCase,
        sale::SaleUseCase, store_ach_account::StoreAchAccountUseCase,
        store_credit_card::StoreCreditCardUseCase, void::VoidUseCase,
    },
};
use sqlx::postgres::PgPoolOptions;
use std::env;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::FmtSubscriber;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        payment_service::api::http_routes::sale,
        payment_service::api::http_routes::authorize,
        payment_service::api::http_routes::capture,
        payment_service::api::http_routes::refund,
        payment_service::api::http_routes::get_transaction,
        payment_service::api::http_routes::list_transactions
    ),
    components(schemas(
        payment_service::api::http_routes::SalePayload,
        payment_service::api::http_routes::CapturePayload,
        payment_service::api::http_routes::RefundPayload,
        payment_service::api::response::ApiResponse<serde_json::Value>
    ))
)]
struct ApiDoc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Cargar variables de entorno
    dotenv().ok();

    // 2. Configurar Logging/Tracing
    let subscriber = FmtSubscriber::builder()
        .with_max_level(tracing::Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    info!("Starting Payment Service...");

    // 3. Configurar Conexión a Base de Datos
    let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let max_connections: u32 = env::var("DATABASE_MAX_CONNECTIONS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(5);
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(&database_url)
        .await?;

    info!("Connected to Database");

    // 4. Instanciar Dependencias (Infraestructura)
    let transaction_repo = Arc::new(PostgresTransactionRepository::new(pool.clone()));
    let merchant_repo = Arc::new(PostgresMerchantRepository::new(pool.clone()));
    let payment_method_repo = Arc::new(PostgresPaymentMethodRepository::new(pool.clone()));
    let audit_repo = Arc::new(PostgresAuditLogRepository::new(pool.clone()));

    // El resolver de secretos: backend de entorno detras de la cache TTL
    let secrets = Arc::new(CachedSecretResolver::new(Arc::new(EnvSecretStore::new())));

    // TODO: Inyectar el transporte real del Gateway cuando las credenciales
    // de certificacion esten disponibles; el decorador de resiliencia es el
    // mismo para ambos
    let gateway = Arc::new(ResilientPaymentGateway::new(Arc::new(
        FakePaymentGateway::new(),
    )));

    // 5. Instanciar Casos de Uso
    let pipeline = Arc::new(PaymentPipeline::new(
        transaction_repo.clone(),
        merchant_repo.clone(),
        payment_method_repo.clone(),
        audit_repo.clone(),
        gateway.clone(),
        secrets.clone(),
    ));

    let sale_use_case = Arc::new(SaleUseCase::new(pipeline.clone()));
    let authorize_use_case = Arc::new(AuthorizeUseCase::new(pipeline.clone()));
    let capture_use_case = Arc::new(CaptureUseCase::new(pipeline.clone()));
    let void_use_case = Arc::new(VoidUseCase::new(pipeline.clone()));
    let refund_use_case = Arc::new(RefundUseCase::new(pipeline.clone()));
    let get_transaction_use_case = Arc::new(GetTransactionUseCase::new(transaction_repo.clone()));
    let list_transactions_use_case =
        Arc::new(ListTransactionsUseCase::new(transaction_repo.clone()));
    let get_transaction_group_use_case =
        Arc::new(GetTransactionGroupUseCase::new(transaction_repo.clone()));
    let store_ach_account_use_case = Arc::new(StoreAchAccountUseCase::new(
        transaction_repo.clone(),
        merchant_repo.clone(),
        payment_method_repo.clone(),
        audit_repo.clone(),
        gateway.clone(),
        secrets.clone(),
    ));
    let store_credit_card_use_case = Arc::new(StoreCreditCardUseCase::new(
        transaction_repo.clone(),
        merchant_repo.clone(),
        payment_method_repo.clone(),
        audit_repo.clone(),
        gateway.clone(),
        secrets.clone(),
    ));
    let get_payment_method_use_case =
        Arc::new(GetPaymentMethodUseCase::new(payment_method_repo.clone()));
    let list_payment_methods_use_case = Arc::new(ListPaymentMethodsUseCase::new(
        payment_method_repo.clone(),
        merchant_repo.clone(),
    ));
    let deactivate_payment_method_use_case = Arc::new(DeactivatePaymentMethodUseCase::new(
        payment_method_repo.clone(),
        audit_repo.clone(),
    ));
    let process_ach_verifications_use_case = Arc::new(ProcessAchVerificationsUseCase::new(
        payment_method_repo.clone(),
        transaction_repo.clone(),
    ));
    let handle_callback_use_case = Arc::new(HandleGatewayCallbackUseCase::new(
        transaction_repo.clone(),
        merchant_repo.clone(),
        payment_method_repo.clone(),
        audit_repo.clone(),
        secrets.clone(),
        store_credit_card_use_case.clone(),
    ));

    // 6. Configurar Servidor gRPC
    let grpc_host = env::var("GRPC_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let grpc_port = env::var("GRPC_PORT").unwrap_or_else(|_| "50051".to_string());
    let grpc_addr = format!("{}:{}", grpc_host, grpc_port).parse()?;

    let grpc_service = PaymentGrpcService::new(
        sale_use_case.clone(),
        authorize_use_case.clone(),
        capture_use_case.clone(),
        void_use_case.clone(),
        refund_use_case.clone(),
        get_transaction_use_case.clone(),
        list_transactions_use_case.clone(),
        get_transaction_group_use_case.clone(),
    );

    info!("gRPC Server listening on {}", grpc_addr);

    // Ejecutar servidor gRPC en una tarea separada
    tokio::spawn(async move {
        if let Err(e) = tonic::transport::Server::builder()
            .add_service(PaymentServiceServer::new(grpc_service))
            .serve(grpc_addr)
            .await
        {
            tracing::error!("gRPC server error: {}", e);
        }
    });

    // 7. Iniciar Background Jobs
    let ach_job = AchVerificationJob::new(process_ach_verifications_use_case.clone());
    tokio::spawn(async move {
        // Barrido horario; el caso de uso es idempotente
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(3600));
        info!("ACH verification scheduler started");
        loop {
            interval.tick().await;
            ach_job.run().await;
        }
    });

    let pool_monitor = PoolMonitorJob::new(pool.clone(), max_connections);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(30));
        loop {
            interval.tick().await;
            pool_monitor.sample();
        }
    });

    // 8. Configurar el ingress de callbacks/cron en su propio listener:
    // el Gateway y el scheduler externo controlan ese protocolo
    let callback_state = Arc::new(CallbackState {
        handle_callback_use_case,
        process_ach_verifications_use_case,
    });
    let callback_app = callback_routes::routes(callback_state);

    let callback_host = env::var("CALLBACK_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let callback_port = env::var("CALLBACK_PORT").unwrap_or_else(|_| "3001".to_string());
    let callback_addr = format!("{}:{}", callback_host, callback_port);

    info!("Callback ingress listening on {}", callback_addr);

    tokio::spawn(async move {
        match tokio::net::TcpListener::bind(&callback_addr).await {
            Ok(listener) => {
                if let Err(e) = axum::serve(listener, callback_app).await {
                    tracing::error!("Callback server error: {}", e);
                }
            }
            Err(e) => tracing::error!("Failed to bind callback listener: {}", e),
        }
    });

    // 9. Configurar Estado de la App Axum operacional
    let app_state = Arc::new(AppState {
        sale_use_case,
        authorize_use_case,
        capture_use_case,
        void_use_case,
        refund_use_case,
        get_transaction_use_case,
        list_transactions_use_case,
        get_transaction_group_use_case,
        store_ach_account_use_case,
        store_credit_card_use_case,
        get_payment_method_use_case,
        list_payment_methods_use_case,
        deactivate_payment_method_use_case,
    });

    // 10. Configurar Rutas y Servidor HTTP
    let app = routes(app_state)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port = env::var("PORT").unwrap_or_else(|_| "3000".to_string());
    let addr = format!("{}:{}", host, port);

    info!("HTTP Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
