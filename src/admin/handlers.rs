use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::admin::AdminState;
use crate::dispatch::RequestContext;
use crate::error::EngineError;
use crate::gateway::GatewayStatus;
use crate::routing::{Explanation, HttpMethod, Route};
use crate::security::{PolicyFilter, PolicyStats, SecurityPolicy};

/// Engine error rendered as a JSON response.
#[derive(Debug)]
pub struct ApiError(pub EngineError);

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match &self.0 {
            EngineError::Validation(e) => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": e.message, "field": e.field })),
            )
                .into_response(),
            EngineError::NotFound { .. } => {
                (StatusCode::NOT_FOUND, Json(json!({ "error": self.0.to_string() }))).into_response()
            }
            EngineError::Internal(_) => {
                tracing::error!(error = %self.0, "Admin request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": self.0.to_string() })),
                )
                    .into_response()
            }
        }
    }
}

type ApiResult<T> = Result<T, ApiError>;

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    #[serde(flatten)]
    pub gateway: GatewayStatus,
}

#[derive(Debug, Deserialize)]
pub struct EnabledBody {
    pub enabled: bool,
}

/// Body of `POST /admin/explain`.
#[derive(Debug, Deserialize)]
pub struct ExplainRequest {
    pub method: HttpMethod,
    pub path: String,
    #[serde(default)]
    pub attributes: HashMap<String, String>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub query: HashMap<String, String>,
}

impl ExplainRequest {
    fn context(&self) -> RequestContext {
        let mut ctx = RequestContext::new();
        for (name, value) in &self.attributes {
            ctx.set_attribute(name.as_str(), value.as_str());
        }
        for (name, value) in &self.headers {
            ctx.set_header(name, value.as_str());
        }
        for (name, value) in &self.query {
            ctx = ctx.with_query(name.as_str(), value.as_str());
        }
        ctx
    }
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        gateway: state.gateway.status(),
    })
}

// ----- routes -----

pub async fn list_routes(State(state): State<AdminState>) -> Json<Vec<Route>> {
    Json(state.gateway.list_routes())
}

pub async fn create_route(
    State(state): State<AdminState>,
    Json(route): Json<Route>,
) -> ApiResult<(StatusCode, Json<Route>)> {
    let created = state.gateway.create_route(route)?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn update_route(
    State(state): State<AdminState>,
    Path(id): Path<String>,
    Json(mut route): Json<Route>,
) -> ApiResult<Json<Route>> {
    route.id = id;
    Ok(Json(state.gateway.update_route(route)?))
}

pub async fn delete_route(
    State(state): State<AdminState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Route>> {
    Ok(Json(state.gateway.delete_route(&id)?))
}

pub async fn set_route_enabled(
    State(state): State<AdminState>,
    Path(id): Path<String>,
    Json(body): Json<EnabledBody>,
) -> ApiResult<Json<Route>> {
    Ok(Json(state.gateway.set_route_enabled(&id, body.enabled)?))
}

pub async fn duplicate_route(
    State(state): State<AdminState>,
    Path(id): Path<String>,
) -> ApiResult<(StatusCode, Json<Route>)> {
    let copy = state.gateway.duplicate_route(&id)?;
    Ok((StatusCode::CREATED, Json(copy)))
}

pub async fn explain(
    State(state): State<AdminState>,
    Json(body): Json<ExplainRequest>,
) -> Json<Explanation> {
    let ctx = body.context();
    Json(state.gateway.explain_resolution(body.method, &body.path, &ctx))
}

// ----- policies -----

pub async fn list_policies(
    State(state): State<AdminState>,
    Query(filter): Query<PolicyFilter>,
) -> Json<Vec<SecurityPolicy>> {
    Json(state.gateway.list_policies(&filter))
}

pub async fn create_policy(
    State(state): State<AdminState>,
    Json(policy): Json<SecurityPolicy>,
) -> ApiResult<(StatusCode, Json<SecurityPolicy>)> {
    let created = state.gateway.create_policy(policy)?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn update_policy(
    State(state): State<AdminState>,
    Path(id): Path<String>,
    Json(mut policy): Json<SecurityPolicy>,
) -> ApiResult<Json<SecurityPolicy>> {
    policy.id = id;
    Ok(Json(state.gateway.update_policy(policy)?))
}

pub async fn delete_policy(
    State(state): State<AdminState>,
    Path(id): Path<String>,
) -> ApiResult<Json<SecurityPolicy>> {
    Ok(Json(state.gateway.delete_policy(&id)?))
}

pub async fn set_policy_enabled(
    State(state): State<AdminState>,
    Path(id): Path<String>,
    Json(body): Json<EnabledBody>,
) -> ApiResult<Json<SecurityPolicy>> {
    Ok(Json(state.gateway.set_policy_enabled(&id, body.enabled)?))
}

pub async fn policy_stats(State(state): State<AdminState>) -> Json<PolicyStats> {
    Json(state.gateway.policy_stats())
}
