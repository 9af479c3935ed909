use std::sync::Arc;
use std::time::Instant;

use axum::body::Bytes;
use axum::extract::State;
use axum::extract::rejection::{BytesRejection, FailedToBufferBody};
use axum::response::{IntoResponse, Response};
use http::{HeaderMap, Method, StatusCode, Uri};
use tracing::{info, warn};
use uuid::Uuid;

use crate::classify::classify;
use crate::core::CoreState;
use crate::dispatch::relay;
use crate::error::ProxyError;
use crate::rewrite::{InboundRequest, RewriteOutcome, rewrite};

pub async fn health() -> Response {
    ().into_response()
}

/// Body size is capped by the router's `DefaultBodyLimit`.
pub async fn proxy_handler(
    State(state): State<Arc<CoreState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let trace_id = Uuid::new_v4().to_string();

    let body = match body {
        Ok(body) => body,
        Err(rejection) => return body_rejection(&trace_id, rejection),
    };

    let inbound = InboundRequest {
        method,
        path: uri.path().to_string(),
        query: uri.query().map(|query| query.to_string()),
        headers,
        body,
    };

    let category = classify(&inbound.path);
    let outbound = match rewrite(&inbound, category, &state.config) {
        Ok(RewriteOutcome::Forward(outbound)) => outbound,
        Ok(RewriteOutcome::Static(doc)) => {
            info!(
                trace_id = %trace_id,
                category = category.as_str(),
                path = %inbound.path,
                "serving static document"
            );
            return doc.into_response();
        }
        Err(err) => {
            warn!(
                trace_id = %trace_id,
                category = category.as_str(),
                status = err.status.as_u16(),
                "request could not be rewritten"
            );
            return err.into_response();
        }
    };

    info!(
        trace_id = %trace_id,
        category = category.as_str(),
        backend = outbound.family.as_str(),
        "proxying request [{}] {} -> {}",
        outbound.model.as_deref().unwrap_or_default(),
        inbound.path_and_query(),
        outbound.url()
    );

    let started_at = Instant::now();
    let response = match state.upstream.send(outbound).await {
        Ok(response) => response,
        Err(err) => {
            warn!(
                trace_id = %trace_id,
                category = category.as_str(),
                kind = ?err.kind,
                error = %err.message,
                elapsed_ms = started_at.elapsed().as_millis(),
                "upstream request failed"
            );
            return err.into_proxy_error().into_response();
        }
    };

    info!(
        trace_id = %trace_id,
        category = category.as_str(),
        status = response.status.as_u16(),
        elapsed_ms = started_at.elapsed().as_millis(),
        "upstream responded"
    );

    relay(response, state.config.upstream.stream_idle_timeout, trace_id)
}

/// 413 when the body exceeds the limit, 400 for any other read failure.
fn body_rejection(trace_id: &str, rejection: BytesRejection) -> Response {
    let status = match &rejection {
        BytesRejection::FailedToBufferBody(FailedToBufferBody::LengthLimitError(_)) => {
            StatusCode::PAYLOAD_TOO_LARGE
        }
        _ => StatusCode::BAD_REQUEST,
    };
    warn!(
        trace_id = %trace_id,
        status = status.as_u16(),
        error = %rejection,
        "inbound body rejected"
    );
    ProxyError::new(status, format!("failed to read request body: {rejection}")).into_response()
}
