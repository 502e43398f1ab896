use crate::domain::error::PaymentError;
use crate::domain::repository::{PaymentMethodRepository, TransactionRepository};
use crate::domain::state::METADATA_RETURN_CODE;
use chrono::{Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// Dias que debe esperar un prenote antes de darse por verificado: los
/// retornos ACH llegan dentro de este plazo.
pub const VERIFICATION_WAIT_DAYS: i64 = 3;

const MAX_BATCH_SIZE: i64 = 500;

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct AchVerificationStats {
    pub processed: u32,
    pub verified: u32,
    pub failed: u32,
}

/// Caso de uso: verificacion por lotes de metodos ACH pendientes.
///
/// Toma los metodos con verificacion PENDING cuyo prenote tiene mas de tres
/// dias: si el prenote acumulo un `return_code`, el metodo falla con esa
/// razon; si no hubo retorno, queda verificado. Correrlo dos veces es
/// inocuo: los metodos resueltos salen del barrido.
pub struct ProcessAchVerificationsUseCase {
    payment_method_repo: Arc<dyn PaymentMethodRepository>,
    transaction_repo: Arc<dyn TransactionRepository>,
}

impl ProcessAchVerificationsUseCase {
    pub fn new(
        payment_method_repo: Arc<dyn PaymentMethodRepository>,
        transaction_repo: Arc<dyn TransactionRepository>,
    ) -> Self {
        Self {
            payment_method_repo,
            transaction_repo,
        }
    }

    pub async fn execute(
        &self,
        batch_size: i64,
        dry_run: bool,
    ) -> Result<AchVerificationStats, PaymentError> {
        let cutoff = Utc::now() - Duration::days(VERIFICATION_WAIT_DAYS);
        let limit = batch_size.clamp(1, MAX_BATCH_SIZE);

        let methods = self
            .payment_method_repo
            .find_pending_ach_verifications(cutoff, limit)
            .await?;

        let mut stats = AchVerificationStats::default();

        for method in methods {
            let Some(prenote_id) = method.prenote_transaction_id else {
                warn!(
                    "ACH method {} is pending verification but has no prenote",
                    method.id
                );
                continue;
            };

            let Some(prenote) = self.transaction_repo.find_by_id(prenote_id).await? else {
                warn!(
                    "ACH method {} references missing prenote {}",
                    method.id, prenote_id
                );
                continue;
            };

            let return_code = prenote
                .metadata
                .get(METADATA_RETURN_CODE)
                .and_then(|v| v.as_str())
                .map(|s| s.to_string());

            stats.processed += 1;

            match return_code {
                Some(code) => {
                    stats.failed += 1;
                    if !dry_run {
                        self.payment_method_repo
                            .mark_verification_failed(method.id, code)
                            .await?;
                    }
                }
                None => {
                    stats.verified += 1;
                    if !dry_run {
                        self.payment_method_repo
                            .mark_verified(method.id, Utc::now())
                            .await?;
                    }
                }
            }
        }

        info!(
            "ACH verification batch finished: {} processed, {} verified, {} failed (dry_run: {})",
            stats.processed, stats.verified, stats.failed, dry_run
        );

        Ok(stats)
    }
}
