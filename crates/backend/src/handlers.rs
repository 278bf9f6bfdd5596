use axum::{extract::State, http::StatusCode, Json};
use shared_types::{validate_gmail_address, LogoutRequest, StatusResponse, TokenRequest};

use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// Addresses name directories in the token vault, so every endpoint checks
/// them before touching disk.
fn validate_email(email: &str) -> ApiResult<()> {
    validate_gmail_address(email).map_err(|e| ApiError::bad_request(e.to_string()))
}

pub async fn health_check() -> StatusCode {
    StatusCode::OK
}

/// Store the token a client obtained for a Gmail account.
pub async fn store_gmail_token(
    State(state): State<AppState>,
    Json(request): Json<TokenRequest>,
) -> ApiResult<Json<StatusResponse>> {
    validate_email(&request.email)?;

    state
        .vault
        .store(&request.email, &request.token)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to store token: {}", e)))?;

    tracing::info!("Stored Gmail token for {}", request.email);
    Ok(Json(StatusResponse::success("Token stored")))
}

/// Finalize a connection for an account whose token was stored earlier.
pub async fn connect_gmail(
    State(state): State<AppState>,
    Json(request): Json<TokenRequest>,
) -> ApiResult<Json<StatusResponse>> {
    validate_email(&request.email)?;

    let stored = state
        .vault
        .load(&request.email)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to read token: {}", e)))?
        .ok_or_else(|| {
            ApiError::NotFound(format!("No token stored for {}", request.email))
        })?;

    if stored.token != request.token {
        return Err(ApiError::Conflict(
            "Presented token does not match the stored token".to_string(),
        ));
    }

    tracing::info!("Gmail connection complete for {}", request.email);
    Ok(Json(StatusResponse::success("Gmail connection complete")))
}

pub async fn logout_gmail(
    State(state): State<AppState>,
    Json(request): Json<LogoutRequest>,
) -> ApiResult<Json<StatusResponse>> {
    validate_email(&request.email)?;

    let removed = state
        .vault
        .remove(&request.email)
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;

    if removed {
        tracing::info!("Token removed for {}", request.email);
    }

    Ok(Json(StatusResponse::success("Successfully logged out")))
}
