//! HTTP request handlers.

use super::types::{AccountInfo, AccountsResponse, HealthResponse, RegisterRequest, RegisterResponse};
use super::AppState;
use crate::error::ProvisioningError;
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use tracing::info;

/// Health check endpoint.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let provisioned_users = state.provisioner.registry().count().await;
    let control_channel_healthy = state.provisioner.reloader().channel_healthy().await;

    Json(HealthResponse {
        status: "ok".to_string(),
        provisioned_users,
        control_channel_healthy,
    })
}

/// Register a new account and return its one-time secret.
pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<RegisterResponse>), ProvisioningError> {
    let Json(request) = payload?;
    info!(identifier = %request.identifier, "Registration request received");

    let account = state
        .provisioner
        .register_account(&request.identifier, &request.contact_email)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            status: account.state,
            identifier: account.identifier,
            server_address: account.server_address,
            secret: account.secret.expose().to_string(),
        }),
    ))
}

/// Get a single account.
pub async fn get_account(
    State(state): State<AppState>,
    Path(identifier): Path<String>,
) -> Result<Json<AccountInfo>, ProvisioningError> {
    let record = state.provisioner.registry().get(&identifier).await?;
    Ok(Json(record.into()))
}

/// List all accounts.
pub async fn list_accounts(State(state): State<AppState>) -> Json<AccountsResponse> {
    let accounts: Vec<AccountInfo> = state
        .provisioner
        .registry()
        .list()
        .await
        .into_iter()
        .map(AccountInfo::from)
        .collect();

    let total = accounts.len();
    Json(AccountsResponse { accounts, total })
}
