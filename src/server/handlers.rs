use axum::{
    extract::{rejection::JsonRejection, Path, State},
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::stream::{Stream, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::{SystemTime, UNIX_EPOCH};

use super::{
    auth,
    error::{ApiError, ApiResult},
    AppState, SERVICE_NAME, SERVICE_VERSION,
};
use crate::ethereum::{abi::INTERFACE_VERSION, utils, PendingTransaction};

fn success(data: Value) -> Json<Value> {
    Json(json!({ "success": true, "data": data }))
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> ApiResult<T> {
    payload
        .map(|Json(value)| value)
        .map_err(|e| ApiError::bad_request("Invalid request body", e.body_text()))
}

fn transaction_response(message: &str, data: Value, tx: &PendingTransaction) -> Json<Value> {
    Json(json!({
        "success": true,
        "message": message,
        "data": data,
        "transaction": tx,
    }))
}

pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": SERVICE_NAME,
        "version": SERVICE_VERSION,
        "interfaceVersion": INTERFACE_VERSION,
    }))
}

pub async fn metrics() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "metrics": { "uptime": "placeholder", "requests": "placeholder" },
    }))
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub address: String,
    pub message: String,
    pub signature: String,
}

/// Demo login: the configured admin address gets a token, nothing is verified.
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let request = body(payload)?;
    if request.message.is_empty() || request.signature.is_empty() {
        return Err(ApiError::bad_request(
            "Invalid request body",
            "message and signature are required",
        ));
    }

    let address = utils::parse_address(&request.address)?;
    if state.admin_address != Some(address) {
        tracing::warn!(address = %utils::format_address(&address), "Rejected admin login");
        return Err(ApiError::Forbidden("Not authorized as admin".to_string()));
    }

    let issued_at = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    let formatted = utils::format_address(&address);

    Ok(success(json!({
        "token": auth::issue_demo_token(&formatted, issued_at),
        "address": formatted,
        "role": "admin",
    })))
}

pub async fn verify_signature() -> Json<Value> {
    Json(json!({ "message": "verify signature endpoint" }))
}

pub async fn whitelist_status(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> ApiResult<Json<Value>> {
    let address = utils::parse_address(&address)?;
    let whitelisted = state.gateway.is_whitelisted(address).await?;

    Ok(success(json!({
        "address": utils::format_address(&address),
        "isWhitelisted": whitelisted,
    })))
}

pub async fn verify_whitelist(Path(address): Path<String>) -> Json<Value> {
    Json(json!({ "address": address, "verified": false }))
}

pub async fn sale_info(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let snapshot = state.gateway.get_sale_info().await?;
    Ok(success(json!(snapshot)))
}

pub async fn user_purchases(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> ApiResult<Json<Value>> {
    let address = utils::parse_address(&address)?;
    let info = state.gateway.get_user_purchase_info(address).await?;
    Ok(success(json!(info)))
}

pub async fn sale_stats() -> Json<Value> {
    Json(json!({ "message": "sale stats endpoint" }))
}

/// Streams purchase events as they are mined. The subscription lives exactly
/// as long as the client connection.
pub async fn sale_events(
    State(state): State<AppState>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, axum::Error>>>> {
    let watch = state.gateway.watch_purchase_events().await?;
    let stream = watch.map(|event| Event::default().event("purchase").json_data(event));
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

pub async fn token_balance(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> ApiResult<Json<Value>> {
    let address = utils::parse_address(&address)?;
    let balance = state.gateway.get_token_balance(address).await?;

    Ok(success(json!({
        "address": utils::format_address(&address),
        "balance": balance,
    })))
}

pub async fn analytics_overview() -> Json<Value> {
    Json(json!({ "message": "analytics overview endpoint" }))
}

pub async fn analytics_sales() -> Json<Value> {
    Json(json!({ "message": "sales analytics endpoint" }))
}

pub async fn analytics_users() -> Json<Value> {
    Json(json!({ "message": "user analytics endpoint" }))
}

#[derive(Debug, Deserialize)]
pub struct AddressRequest {
    pub address: String,
}

#[derive(Debug, Deserialize)]
pub struct BatchWhitelistRequest {
    pub addresses: Vec<String>,
    pub whitelisted: bool,
}

pub async fn add_to_whitelist(
    State(state): State<AppState>,
    payload: Result<Json<AddressRequest>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let request = body(payload)?;
    let address = utils::parse_address(&request.address)?;
    let tx = state.gateway.add_to_whitelist(&[address]).await?;

    Ok(transaction_response(
        "Address added to whitelist successfully",
        json!({ "address": utils::format_address(&address) }),
        &tx,
    ))
}

pub async fn remove_from_whitelist(
    State(state): State<AppState>,
    payload: Result<Json<AddressRequest>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let request = body(payload)?;
    let address = utils::parse_address(&request.address)?;
    let tx = state.gateway.remove_from_whitelist(&[address]).await?;

    Ok(transaction_response(
        "Address removed from whitelist successfully",
        json!({ "address": utils::format_address(&address) }),
        &tx,
    ))
}

pub async fn batch_update_whitelist(
    State(state): State<AppState>,
    payload: Result<Json<BatchWhitelistRequest>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let request = body(payload)?;
    let addresses = request
        .addresses
        .iter()
        .map(|a| utils::parse_address(a))
        .collect::<Result<Vec<_>, _>>()?;

    let tx = if request.whitelisted {
        state.gateway.add_to_whitelist(&addresses).await?
    } else {
        state.gateway.remove_from_whitelist(&addresses).await?
    };

    let formatted: Vec<String> = addresses.iter().map(utils::format_address).collect();
    Ok(transaction_response(
        "Whitelist updated successfully",
        json!({ "addresses": formatted, "whitelisted": request.whitelisted }),
        &tx,
    ))
}

pub async fn list_users() -> Json<Value> {
    Json(json!({ "message": "get all users endpoint" }))
}

pub async fn update_sale_config() -> Json<Value> {
    Json(json!({ "message": "update sale config endpoint" }))
}

pub async fn pause_sale(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let tx = state.gateway.pause_sale().await?;
    Ok(transaction_response("Sale paused", json!({ "paused": true }), &tx))
}

pub async fn unpause_sale(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let tx = state.gateway.unpause_sale().await?;
    Ok(transaction_response("Sale unpaused", json!({ "paused": false }), &tx))
}
