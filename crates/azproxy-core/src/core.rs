use std::sync::Arc;

use axum::Router;
use axum::extract::{DefaultBodyLimit, Request};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::any;
use azproxy_common::ProxyConfig;
use http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
};
use http::{HeaderValue, Method};

use crate::handler::{health, proxy_handler};
use crate::upstream_client::{UpstreamClient, WreqUpstreamClient};

pub struct CoreState {
    pub config: Arc<ProxyConfig>,
    pub upstream: Arc<dyn UpstreamClient>,
}

pub struct Core {
    state: Arc<CoreState>,
}

impl Core {
    pub fn new(config: ProxyConfig) -> Result<Self, wreq::Error> {
        let upstream = WreqUpstreamClient::new(&config.upstream)?;
        Ok(Self::with_upstream(config, Arc::new(upstream)))
    }

    pub fn with_upstream(config: ProxyConfig, upstream: Arc<dyn UpstreamClient>) -> Self {
        Self {
            state: Arc::new(CoreState {
                config: Arc::new(config),
                upstream,
            }),
        }
    }

    /// `/` and `/health` answer locally, everything else is classified and proxied.
    /// Preflight requests never reach either.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/", any(health))
            .route("/health", any(health))
            .fallback(proxy_handler)
            .layer(DefaultBodyLimit::max(self.state.config.max_body_bytes))
            .layer(middleware::from_fn(cors_preflight))
            .with_state(self.state.clone())
    }
}

async fn cors_preflight(req: Request, next: Next) -> Response {
    if req.method() != Method::OPTIONS {
        return next.run(req).await;
    }
    let mut resp = Response::default();
    let headers = resp.headers_mut();
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(
        ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("POST, GET, OPTIONS, PUT, DELETE"),
    );
    headers.insert(
        ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type, Authorization"),
    );
    resp
}
