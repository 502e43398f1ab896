use crate::use_cases::process_ach_verifications::ProcessAchVerificationsUseCase;
use std::sync::Arc;
use tracing::{error, info};

const BATCH_SIZE: i64 = 100;

/// Job en segundo plano que resuelve las verificaciones ACH pendientes.
///
/// Corre cada hora sobre los metodos cuyo prenote tiene mas de tres dias.
/// El mismo caso de uso se expone por el ingress HTTP de cron para
/// ejecuciones manuales con dry_run.
pub struct AchVerificationJob {
    use_case: Arc<ProcessAchVerificationsUseCase>,
}

impl AchVerificationJob {
    pub fn new(use_case: Arc<ProcessAchVerificationsUseCase>) -> Self {
        Self { use_case }
    }

    /// Ejecuta una pasada del barrido.
    pub async fn run(&self) {
        info!("Starting AchVerificationJob...");

        match self.use_case.execute(BATCH_SIZE, false).await {
            Ok(stats) => {
                if stats.processed > 0 {
                    info!(
                        "AchVerificationJob: {} processed, {} verified, {} failed",
                        stats.processed, stats.verified, stats.failed
                    );
                }
            }
            Err(e) => {
                // El siguiente tick reintenta; el barrido es idempotente
                error!("AchVerificationJob failed: {:?}", e);
            }
        }
    }
}
