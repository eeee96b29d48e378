use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::http::server::ApiState;
use crate::store::{Setting, StoreError, SubscriptionRawV2};

#[derive(Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionInfo {
    pub version: String,
    pub found_new: bool,
    pub remote_version: String,
}

/// Failures surfaced over the API.
pub enum ApiError {
    Store(StoreError),
    InvalidSetting(String),
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        ApiError::Store(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Store(StoreError::Closed) => {
                (StatusCode::SERVICE_UNAVAILABLE, StoreError::Closed.to_string())
            }
            ApiError::Store(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
            ApiError::InvalidSetting(reason) => (StatusCode::BAD_REQUEST, reason),
        };
        tracing::warn!(status = %status, error = %message, "API request failed");
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

pub async fn get_health() -> Json<HealthStatus> {
    Json(HealthStatus { status: "ok" })
}

pub async fn get_version(State(state): State<ApiState>) -> Json<VersionInfo> {
    let status = state.updater.version_status();
    Json(VersionInfo {
        version: state.updater.current_version().to_string(),
        found_new: status.found_new,
        remote_version: status.remote_version.clone(),
    })
}

pub async fn get_settings(State(state): State<ApiState>) -> Result<Json<Setting>, ApiError> {
    Ok(Json(state.store.settings()?))
}

/// Persist new settings and retime the refresh timers.
///
/// A fixed-interval mode with a zero interval is rejected with 400.
pub async fn put_settings(
    State(state): State<ApiState>,
    Json(setting): Json<Setting>,
) -> Result<Json<Setting>, ApiError> {
    setting.check_intervals().map_err(ApiError::InvalidSetting)?;
    state.store.set_settings(&setting)?;
    state.updater.apply_settings(&setting);
    tracing::info!(
        rule_list = ?setting.rule_list_auto_update_mode,
        subscriptions = ?setting.subscription_auto_update_mode,
        "Settings updated"
    );
    Ok(Json(setting))
}

pub async fn get_subscriptions(
    State(state): State<ApiState>,
) -> Result<Json<Vec<SubscriptionRawV2>>, ApiError> {
    Ok(Json(state.store.subscriptions_v2()?))
}
