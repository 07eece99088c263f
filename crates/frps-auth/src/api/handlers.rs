//! HTTP request handlers.

use super::types::{
    AddAuthRequest, AddAuthResponse, HandshakeResponse, HealthResponse, ListAuthResponse,
    StatusResponse, UpdateAuthRequest,
};
use super::AppState;
use crate::error::AuthError;
use crate::handshake::RegistrationIntent;
use crate::lifecycle::NewAuthorization;
use crate::record::AuthRecord;
use crate::render::client_config_page;
use crate::store::StoreError;
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    response::Html,
    Json,
};
use tracing::info;

/// Statistics page built into the binary.
const STATISTICS_PAGE: &str = include_str!("../../static/index.html");

/// Unwrap a JSON body, turning malformed input into a client error.
fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AuthError> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| AuthError::BadRequest(rejection.body_text()))
}

/// Run synchronous store work on the blocking thread pool.
async fn blocking<T, F>(work: F) -> Result<T, AuthError>
where
    F: FnOnce() -> Result<T, AuthError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| AuthError::Store(StoreError::Backend(format!("store task failed: {}", e))))?
}

/// Health check endpoint.
pub async fn health(State(state): State<AppState>) -> Result<Json<HealthResponse>, AuthError> {
    let record_count = blocking(move || state.authorizations.count()).await?;
    Ok(Json(HealthResponse {
        status: "ok".to_string(),
        record_count,
    }))
}

/// Registration callback from the tunnel server.
pub async fn handshake(
    State(state): State<AppState>,
    payload: Result<Json<RegistrationIntent>, JsonRejection>,
) -> Result<Json<HandshakeResponse>, AuthError> {
    let intent = json_body(payload)?;
    let decision = blocking(move || Ok(state.handshake.verify(&intent)?)).await?;
    Ok(Json(decision.into()))
}

/// Provision a new authorization record.
pub async fn add_auth(
    State(state): State<AppState>,
    payload: Result<Json<AddAuthRequest>, JsonRejection>,
) -> Result<Json<AddAuthResponse>, AuthError> {
    let request = NewAuthorization::try_from(json_body(payload)?)?;
    info!(proxy_name = %request.proxy_name, proxy_type = %request.proxy_type, "Add request received");

    let record = blocking(move || state.authorizations.add(request)).await?;

    Ok(Json(AddAuthResponse {
        status: 0,
        id: record.id,
    }))
}

/// Change a record's expiry and memo.
pub async fn update_auth(
    State(state): State<AppState>,
    payload: Result<Json<UpdateAuthRequest>, JsonRejection>,
) -> Result<Json<StatusResponse>, AuthError> {
    let request = json_body(payload)?;
    blocking(move || {
        state
            .authorizations
            .update(&request.id, request.auth_valid_to, &request.memo)
    })
    .await?;
    Ok(Json(StatusResponse::ok()))
}

/// Disable a record.
pub async fn disable_auth(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<StatusResponse>, AuthError> {
    blocking(move || state.authorizations.disable(&id)).await?;
    Ok(Json(StatusResponse::ok()))
}

/// Re-enable a record.
pub async fn enable_auth(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<StatusResponse>, AuthError> {
    blocking(move || state.authorizations.enable(&id)).await?;
    Ok(Json(StatusResponse::ok()))
}

/// Delete a record. Unknown ids succeed.
pub async fn delete_auth(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<StatusResponse>, AuthError> {
    blocking(move || state.authorizations.delete(&id)).await?;
    Ok(Json(StatusResponse::ok()))
}

/// List all records.
pub async fn list_auth(State(state): State<AppState>) -> Result<Json<ListAuthResponse>, AuthError> {
    let data = blocking(move || state.authorizations.list()).await?;
    Ok(Json(ListAuthResponse {
        code: 0,
        count: data.len(),
        data,
    }))
}

/// Fetch a single record.
pub async fn get_auth(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<AuthRecord>, AuthError> {
    let record = blocking(move || state.authorizations.get(&id)).await?;
    Ok(Json(record))
}

/// Render the client configuration for a record.
pub async fn get_auth_config(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Html<String>, AuthError> {
    let record = blocking(move || state.authorizations.get(&id)).await?;
    Ok(Html(client_config_page(&record)))
}

/// Built-in statistics page, used when no static directory exists.
pub async fn statistics_page() -> Html<&'static str> {
    Html(STATISTICS_PAGE)
}
