//! Axum router exposing the RPC edge: one generic command endpoint, one
//! generic query endpoint, plus the ambient `/healthz` and `/metrics`
//! surface (`spec.md` §6; `SPEC_FULL.md` §1 ambient stack, §4 real-time
//! metric stream).

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::stream::{Stream, StreamExt};
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;

use crate::translation::dto::RequestEnvelope;

use super::response::{self, RpcResponse};
use super::RpcEdge;

pub fn router(edge: Arc<RpcEdge>) -> Router {
    Router::new()
        .route("/v1/tenants/:tenant_id/commands/:kind", post(execute_command))
        .route("/v1/tenants/:tenant_id/queries/:kind", post(execute_query))
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics_text))
        .route("/metrics/stream", get(metrics_stream))
        .with_state(edge)
}

async fn execute_command(
    State(edge): State<Arc<RpcEdge>>,
    Path((tenant_id, kind)): Path<(String, String)>,
    Json(envelope): Json<RequestEnvelope<serde_json::Value>>,
) -> impl IntoResponse {
    match edge
        .execute_command(&tenant_id, &kind, envelope.payload, envelope.correlation_id)
        .await
    {
        Ok(outcome) => RpcResponse::ok(outcome).into_response(),
        Err(err) => {
            let e = response::from_rpc_error(&err);
            RpcResponse::<()>::err(e.code, e.message).into_response()
        }
    }
}

async fn execute_query(
    State(edge): State<Arc<RpcEdge>>,
    Path((tenant_id, kind)): Path<(String, String)>,
    Json(envelope): Json<RequestEnvelope<serde_json::Value>>,
) -> impl IntoResponse {
    match edge.execute_query(&tenant_id, &kind, envelope.payload).await {
        Ok(outcome) => RpcResponse::ok(outcome).into_response(),
        Err(err) => {
            let e = response::from_rpc_error(&err);
            RpcResponse::<()>::err(e.code, e.message).into_response()
        }
    }
}

async fn healthz(State(edge): State<Arc<RpcEdge>>) -> impl IntoResponse {
    let tenants = edge.supervisor.tenant_ids().await;
    Json(serde_json::json!({ "status": "ok", "tenants": tenants }))
}

async fn metrics_text(State(edge): State<Arc<RpcEdge>>) -> impl IntoResponse {
    edge.metrics.render_text()
}

/// Server-sent event stream of every metric update from subscription
/// time forward (`SPEC_FULL.md` §4, "Real-time metric stream").
async fn metrics_stream(State(edge): State<Arc<RpcEdge>>) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = edge.metrics.subscribe().filter_map(|item| async move {
        match item {
            Ok(sample) => serde_json::to_string(&sample).ok().map(|json| Ok(Event::default().data(json))),
            Err(BroadcastStreamRecvError::Lagged(_)) => None,
        }
    });
    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}
