use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use relaygate_auth::{AuthContext, AuthError};
use relaygate_protocol::auth::{AuthMetadata, BearerAuth};
use serde_json::json;

use crate::state::AppState;

/// Extracts a bearer token from `Authorization: Bearer <token>` for the
/// HTTP bridge surface, per §6 — the client RPC stream instead carries
/// `AuthMetadata` in its first frame.
pub fn bearer_from_headers(headers: &HeaderMap) -> Option<AuthMetadata> {
    let value = headers.get(axum::http::header::AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?;
    Some(AuthMetadata::Bearer(BearerAuth { token: token.to_string() }))
}

pub fn authenticate_http(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<AuthContext, (StatusCode, Json<serde_json::Value>)> {
    let metadata = bearer_from_headers(headers).ok_or_else(|| {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "missing bearer token" })),
        )
    })?;
    state.auth.authenticate(metadata).map_err(auth_error_response)
}

pub fn auth_error_response(err: AuthError) -> (StatusCode, Json<serde_json::Value>) {
    (status_for_kind(err.kind()), Json(json!({ "error": err.to_string() })))
}

/// Maps the shared error taxonomy onto HTTP status codes, so every bridge
/// handler reports a status consistent with the error's actual
/// classification rather than one hardcoded per call site.
pub fn status_for_kind(kind: relaygate_core::ErrorKind) -> StatusCode {
    use relaygate_core::ErrorKind::*;
    match kind {
        Unauthenticated => StatusCode::UNAUTHORIZED,
        PermissionDenied => StatusCode::FORBIDDEN,
        NotFound => StatusCode::NOT_FOUND,
        InvalidArgument => StatusCode::BAD_REQUEST,
        AlreadyExists => StatusCode::CONFLICT,
        Unavailable => StatusCode::BAD_GATEWAY,
        DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
        Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
