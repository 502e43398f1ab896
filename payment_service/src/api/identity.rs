use crate::domain::access::CallerIdentity;
use crate::domain::types::MerchantId;
use axum::extract::FromRequestParts;
use axum::http::{request::Parts, HeaderMap, StatusCode};
use uuid::Uuid;

// El transporte rio arriba (API gateway) ya autentico la credencial y nos
// inyecta la identidad resuelta en headers/metadata. Este modulo solo la
// parsea; la autorizacion por fila ocurre en el dominio.

const KIND_HEADER: &str = "x-caller-kind";
const MERCHANT_IDS_HEADER: &str = "x-merchant-ids";
const CUSTOMER_ID_HEADER: &str = "x-customer-id";
const SESSION_ID_HEADER: &str = "x-session-id";

/// Parsea la identidad desde un lookup generico de headers, compartido por
/// el extractor de axum y por la metadata de tonic.
pub fn parse_caller(get: impl Fn(&str) -> Option<String>) -> Result<CallerIdentity, String> {
    let kind = get(KIND_HEADER).ok_or_else(|| format!("missing {} header", KIND_HEADER))?;

    match kind.as_str() {
        "merchant" => {
            let raw = get(MERCHANT_IDS_HEADER)
                .ok_or_else(|| format!("missing {} header", MERCHANT_IDS_HEADER))?;
            let mut merchant_ids = Vec::new();
            for part in raw.split(',') {
                let part = part.trim();
                if part.is_empty() {
                    continue;
                }
                let id = Uuid::parse_str(part)
                    .map_err(|_| format!("invalid merchant id '{}'", part))?;
                merchant_ids.push(MerchantId(id));
            }
            if merchant_ids.is_empty() {
                return Err(format!("{} header is empty", MERCHANT_IDS_HEADER));
            }
            Ok(CallerIdentity::Merchant { merchant_ids })
        }
        "customer" => {
            let customer_id = get(CUSTOMER_ID_HEADER)
                .ok_or_else(|| format!("missing {} header", CUSTOMER_ID_HEADER))?;
            Ok(CallerIdentity::Customer { customer_id })
        }
        "guest" => {
            let raw = get(MERCHANT_IDS_HEADER)
                .ok_or_else(|| format!("missing {} header", MERCHANT_IDS_HEADER))?;
            let merchant_id = Uuid::parse_str(raw.trim())
                .map_err(|_| format!("invalid merchant id '{}'", raw))?;
            let session_id = get(SESSION_ID_HEADER)
                .ok_or_else(|| format!("missing {} header", SESSION_ID_HEADER))?;
            Ok(CallerIdentity::Guest {
                merchant_id: MerchantId(merchant_id),
                session_id,
            })
        }
        "service" => Ok(CallerIdentity::Service),
        "admin" => Ok(CallerIdentity::Admin),
        other => Err(format!("unknown caller kind '{}'", other)),
    }
}

pub fn caller_from_headers(headers: &HeaderMap) -> Result<CallerIdentity, String> {
    parse_caller(|name| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string())
    })
}

pub fn caller_from_metadata(
    metadata: &tonic::metadata::MetadataMap,
) -> Result<CallerIdentity, String> {
    parse_caller(|name| {
        metadata
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string())
    })
}

/// Extractor de axum para la identidad del llamador.
pub struct Caller(pub CallerIdentity);

impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, String);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        caller_from_headers(&parts.headers)
            .map(Caller)
            .map_err(|message| (StatusCode::UNAUTHORIZED, message))
    }
}
