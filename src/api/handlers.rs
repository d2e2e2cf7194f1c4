use std::net::IpAddr;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Duration;
use serde::Deserialize;

use super::AppState;
use crate::core::{BanEntry, TopEntry, WhitelistEntry};
use crate::error::ApiError;
use crate::service::{IngestSummary, Observation};

const DEFAULT_TOP_LIMIT: usize = 100;

#[derive(Debug, Deserialize)]
pub struct AddBanRequest {
    pub ip: String,
    /// Ban length in seconds
    pub period: u64,
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct AddWhitelistRequest {
    pub ip: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Deserialize)]
pub struct TopQuery {
    pub limit: Option<usize>,
}

/// Addresses are stored in their canonical text form; IPv4-mapped IPv6
/// addresses become plain IPv4
fn canonical_ip(ip: &str) -> Result<String, ApiError> {
    ip.trim()
        .parse::<IpAddr>()
        .map(|ip| ip.to_canonical().to_string())
        .map_err(|_| ApiError::BadRequest(format!("invalid ip address: {}", ip)))
}

pub async fn health() -> &'static str {
    "OK"
}

pub async fn get_ban(
    State(state): State<Arc<AppState>>,
    Path(ip): Path<String>,
) -> Result<Json<BanEntry>, ApiError> {
    let ip = canonical_ip(&ip)?;
    state
        .service
        .get_ban(&ip)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(ip.clone()))
}

pub async fn add_ban(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AddBanRequest>,
) -> Result<StatusCode, ApiError> {
    let ip = canonical_ip(&request.ip)?;
    let period = i64::try_from(request.period)
        .ok()
        .and_then(Duration::try_seconds)
        .ok_or_else(|| ApiError::BadRequest("period out of range".to_string()))?;

    state
        .service
        .add_to_blacklist(&ip, period, state.admin_actor_id, &request.reason)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn remove_ban(
    State(state): State<Arc<AppState>>,
    Path(ip): Path<String>,
) -> Result<StatusCode, ApiError> {
    let ip = canonical_ip(&ip)?;
    state.service.remove_from_blacklist(&ip).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn top_ips(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TopQuery>,
) -> Result<Json<Vec<TopEntry>>, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_TOP_LIMIT);
    Ok(Json(state.service.top_ips(limit).await?))
}

pub async fn list_whitelist(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<WhitelistEntry>>, ApiError> {
    Ok(Json(state.service.list_whitelist().await?))
}

pub async fn add_whitelist(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AddWhitelistRequest>,
) -> Result<StatusCode, ApiError> {
    let ip = canonical_ip(&request.ip)?;
    let inserted = state
        .service
        .add_whitelist(&ip, request.description.trim())
        .await?;

    Ok(if inserted { StatusCode::CREATED } else { StatusCode::OK })
}

pub async fn remove_whitelist(
    State(state): State<Arc<AppState>>,
    Path(ip): Path<String>,
) -> Result<StatusCode, ApiError> {
    let ip = canonical_ip(&ip)?;
    state.service.remove_whitelist(&ip).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn ingest(
    State(state): State<Arc<AppState>>,
    Json(events): Json<Vec<Observation>>,
) -> Result<Json<IngestSummary>, ApiError> {
    Ok(Json(state.service.observe_batch(&events).await?))
}
