use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use azproxy_common::UpstreamSettings;
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use http::StatusCode;
use wreq::{Client, Method, Proxy};

use crate::error::ProxyError;
use crate::headers::Headers;
use crate::rewrite::OutboundRequest;

pub type UpstreamBody = Pin<Box<dyn Stream<Item = Result<Bytes, UpstreamFailure>> + Send>>;

pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: Headers,
    pub body: UpstreamBody,
}

impl std::fmt::Debug for UpstreamResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("body", &"<stream>")
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamTransportErrorKind {
    Timeout,
    ReadTimeout,
    Connect,
    Dns,
    Tls,
    Other,
}

#[derive(Debug, thiserror::Error)]
#[error("upstream {kind:?} error: {message}")]
pub struct UpstreamFailure {
    pub kind: UpstreamTransportErrorKind,
    pub message: String,
}

impl UpstreamFailure {
    pub fn new(kind: UpstreamTransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn into_proxy_error(self) -> ProxyError {
        match self.kind {
            UpstreamTransportErrorKind::Timeout | UpstreamTransportErrorKind::ReadTimeout => {
                ProxyError::gateway_timeout(self.to_string())
            }
            _ => ProxyError::bad_gateway(self.to_string()),
        }
    }
}

pub trait UpstreamClient: Send + Sync {
    fn send<'a>(
        &'a self,
        req: OutboundRequest,
    ) -> Pin<Box<dyn Future<Output = Result<UpstreamResponse, UpstreamFailure>> + Send + 'a>>;
}

#[derive(Clone)]
pub struct WreqUpstreamClient {
    client: Client,
    response_timeout: Duration,
}

impl WreqUpstreamClient {
    pub fn new(settings: &UpstreamSettings) -> Result<Self, wreq::Error> {
        Ok(Self {
            client: build_client(settings)?,
            response_timeout: settings.response_timeout,
        })
    }
}

fn build_client(settings: &UpstreamSettings) -> Result<Client, wreq::Error> {
    let mut builder = Client::builder()
        .connect_timeout(settings.connect_timeout)
        .read_timeout(settings.stream_idle_timeout);

    if let Some(proxy) = settings.proxy.as_deref() {
        builder = builder.proxy(Proxy::all(proxy)?);
    }

    builder.build()
}

impl UpstreamClient for WreqUpstreamClient {
    fn send<'a>(
        &'a self,
        req: OutboundRequest,
    ) -> Pin<Box<dyn Future<Output = Result<UpstreamResponse, UpstreamFailure>> + Send + 'a>>
    {
        Box::pin(async move {
            let method = Method::from_bytes(req.method.as_str().as_bytes()).map_err(|err| {
                UpstreamFailure::new(UpstreamTransportErrorKind::Other, err.to_string())
            })?;
            let url = req.url();
            let mut builder = self.client.request(method, &url);

            for (k, v) in &req.headers {
                builder = builder.header(k.as_str(), v.clone());
            }
            builder = builder.body(req.body);

            let resp = tokio::time::timeout(self.response_timeout, builder.send())
                .await
                .map_err(|_| {
                    UpstreamFailure::new(
                        UpstreamTransportErrorKind::Timeout,
                        format!("no response within {:?}", self.response_timeout),
                    )
                })?
                .map_err(map_wreq_error)?;

            convert_response(resp)
        })
    }
}

fn convert_response(resp: wreq::Response) -> Result<UpstreamResponse, UpstreamFailure> {
    let status = StatusCode::from_u16(resp.status().as_u16()).map_err(|err| {
        UpstreamFailure::new(UpstreamTransportErrorKind::Other, err.to_string())
    })?;
    let headers = headers_from_wreq(resp.headers());
    let body = resp
        .bytes_stream()
        .map(|item| item.map_err(map_wreq_error));

    Ok(UpstreamResponse {
        status,
        headers,
        body: Box::pin(body),
    })
}

fn headers_from_wreq(map: &wreq::header::HeaderMap) -> Headers {
    map.iter()
        .map(|(k, v)| (k.as_str().to_string(), v.clone()))
        .collect()
}

fn map_wreq_error(err: wreq::Error) -> UpstreamFailure {
    let kind = classify_wreq_error(&err);
    UpstreamFailure::new(kind, err.to_string())
}

fn classify_wreq_error(err: &wreq::Error) -> UpstreamTransportErrorKind {
    let message = err.to_string().to_ascii_lowercase();
    if err.is_timeout() {
        if message.contains("read") || message.contains("idle") {
            return UpstreamTransportErrorKind::ReadTimeout;
        }
        return UpstreamTransportErrorKind::Timeout;
    }
    if err.is_connect() {
        if message.contains("dns") || message.contains("resolve") {
            return UpstreamTransportErrorKind::Dns;
        }
        if message.contains("tls") || message.contains("ssl") {
            return UpstreamTransportErrorKind::Tls;
        }
        return UpstreamTransportErrorKind::Connect;
    }
    if err.is_connection_reset() {
        return UpstreamTransportErrorKind::Connect;
    }
    if message.contains("tls") || message.contains("ssl") {
        return UpstreamTransportErrorKind::Tls;
    }
    UpstreamTransportErrorKind::Other
}
