//! # Route Table and Verb Mapping
//!
//! Two generic routes cover every service: the collection path and the
//! wildcard resource path. The HTTP verb picks the conventional action
//! name; path segments pick the queue and controller. The gateway never
//! knows which services exist, it just relays.

use crate::config::GatewayConfig;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{any, get};
use axum::Router;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::time::Duration;
use switchboard_client::RpcClient;
use switchboard_wire::actions;
use tracing::debug;

/// Shared state of every route: the client and the per-request deadline.
#[derive(Clone)]
pub struct GatewayState {
    client: RpcClient,
    call_timeout: Duration,
}

impl GatewayState {
    pub fn new(client: RpcClient, config: &GatewayConfig) -> Self {
        Self {
            client,
            call_timeout: config.call_timeout,
        }
    }
}

/// Build the bare route table. Layers (CORS, tracing, timeouts) are the
/// caller's business.
pub fn api_router(state: GatewayState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/:service/:controller", any(collection_endpoint))
        .route("/api/:service/:controller/*id", any(resource_endpoint))
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// `/api/:service/:controller` - GET lists, POST creates.
async fn collection_endpoint(
    State(state): State<GatewayState>,
    Path((service, controller)): Path<(String, String)>,
    method: Method,
    Query(query): Query<HashMap<String, String>>,
    body: Bytes,
) -> Response {
    if method == Method::GET {
        let query = query_object(query);
        relay(&state, &service, &controller, actions::GET_ALL, vec![query]).await
    } else if method == Method::POST {
        let body = match parse_body(&body) {
            Ok(body) => body,
            Err(response) => return response,
        };
        relay(&state, &service, &controller, actions::POST, vec![body]).await
    } else {
        method_not_allowed(&method)
    }
}

/// `/api/:service/:controller/*id` - GET, PUT, DELETE on one resource.
async fn resource_endpoint(
    State(state): State<GatewayState>,
    Path((service, controller, id)): Path<(String, String, String)>,
    method: Method,
    body: Bytes,
) -> Response {
    let action = if method == Method::GET {
        actions::GET_BY_ID
    } else if method == Method::PUT {
        actions::PUT
    } else if method == Method::DELETE {
        actions::DELETE
    } else {
        return method_not_allowed(&method);
    };

    let body = match parse_body(&body) {
        Ok(body) => body,
        Err(response) => return response,
    };
    let args = vec![Value::String(id), body];
    relay(&state, &service, &controller, action, args).await
}

/// Forward one call and translate the outcome: result straight through
/// with `200`, any failure as `500 {"error": ...}`.
async fn relay(
    state: &GatewayState,
    service: &str,
    controller: &str,
    action: &str,
    args: Vec<Value>,
) -> Response {
    debug!(service, controller, action, "relaying http request");
    match state
        .client
        .call_with_timeout(service, controller, action, args, Some(state.call_timeout))
        .await
    {
        Ok(result) => (StatusCode::OK, Json(result)).into_response(),
        Err(err) => error_response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
    }
}

/// Absent bodies read as `{}`; anything present must be JSON.
fn parse_body(body: &Bytes) -> Result<Value, Response> {
    if body.is_empty() {
        return Ok(json!({}));
    }
    serde_json::from_slice(body).map_err(|err| {
        error_response(StatusCode::BAD_REQUEST, format!("invalid JSON body: {err}"))
    })
}

/// Query pairs as a flat JSON object of strings.
fn query_object(query: HashMap<String, String>) -> Value {
    let map: Map<String, Value> = query
        .into_iter()
        .map(|(key, value)| (key, Value::String(value)))
        .collect();
    Value::Object(map)
}

fn method_not_allowed(method: &Method) -> Response {
    error_response(
        StatusCode::METHOD_NOT_ALLOWED,
        format!("method not allowed: {method}"),
    )
}

fn error_response(status: StatusCode, message: String) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}
