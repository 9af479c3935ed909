//! Pure translation of an inbound OpenAI-style request into the request sent upstream.
//!
//! Nothing here performs IO: [`rewrite`] takes an immutable [`InboundRequest`] and
//! returns either a fully addressed [`OutboundRequest`] or a locally served
//! [`StaticDocument`]. Sending is the dispatcher's job.

use azproxy_common::ProxyConfig;
use bytes::Bytes;
use http::{HeaderMap, HeaderValue, Method};
use serde::Deserialize;

use crate::classify::RouteCategory;
use crate::credential::{self, BackendFamily};
use crate::error::ProxyError;
use crate::headers::{
    Headers, header_remove, header_set, headers_from_map, set_bearer, strip_hop_by_hop,
};
use crate::static_docs::StaticDocument;

const DEFAULT_AZURE_SCHEME: &str = "https";

/// Headers that describe the inbound connection rather than the request itself.
const NON_FORWARDED: [&str; 2] = ["host", "content-length"];

/// The client's request with its body fully buffered.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub method: Method,
    /// Raw (still percent-encoded) path.
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl InboundRequest {
    pub fn path_and_query(&self) -> String {
        join_query(&self.path, self.query.as_deref())
    }
}

#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub family: BackendFamily,
    pub method: Method,
    pub scheme: String,
    pub host: String,
    pub path: String,
    pub query: Option<String>,
    pub headers: Headers,
    pub body: Bytes,
    /// Model named in the request body; only known for Azure-bound requests.
    pub model: Option<String>,
}

impl OutboundRequest {
    pub fn url(&self) -> String {
        let path = join_query(&self.path, self.query.as_deref());
        format!("{}://{}{}", self.scheme, self.host, path)
    }
}

#[derive(Debug)]
pub enum RewriteOutcome {
    Forward(OutboundRequest),
    Static(StaticDocument),
}

pub fn rewrite(
    inbound: &InboundRequest,
    category: RouteCategory,
    config: &ProxyConfig,
) -> Result<RewriteOutcome, ProxyError> {
    match category {
        RouteCategory::CompletionOrEmbedding => {
            rewrite_azure(inbound, config).map(RewriteOutcome::Forward)
        }
        RouteCategory::ModelList => Ok(RewriteOutcome::Static(StaticDocument::Models)),
        RouteCategory::CreditGrants => Ok(RewriteOutcome::Static(StaticDocument::CreditGrants)),
        RouteCategory::PassThrough => rewrite_openai(inbound, config).map(RewriteOutcome::Forward),
    }
}

fn rewrite_azure(
    inbound: &InboundRequest,
    config: &ProxyConfig,
) -> Result<OutboundRequest, ProxyError> {
    let model = extract_model(&inbound.body);
    let credential = credential::resolve(config, &inbound.headers, BackendFamily::Azure);
    let deployment = credential
        .deployment_override
        .clone()
        .unwrap_or_else(|| config.model_mapper.resolve_deployment(&model));

    let target = (credential.host_override.as_deref(), config.azure_endpoint.as_ref());
    let (scheme, host) = match target {
        (Some(host), endpoint) => (
            endpoint
                .map(|endpoint| endpoint.scheme.clone())
                .unwrap_or_else(|| DEFAULT_AZURE_SCHEME.to_string()),
            host.to_string(),
        ),
        (None, Some(endpoint)) => (endpoint.scheme.clone(), endpoint.host.clone()),
        (None, None) => return Err(ProxyError::bad_gateway("azure endpoint not configured")),
    };

    let mut headers = forwardable_headers(&inbound.headers);
    header_remove(&mut headers, "authorization");
    let api_key = HeaderValue::from_str(&credential.token).map_err(|_| invalid_credential())?;
    header_set(&mut headers, "api-key", api_key);

    Ok(OutboundRequest {
        family: BackendFamily::Azure,
        method: inbound.method.clone(),
        scheme,
        host,
        path: deployment_path(&deployment, &inbound.path),
        query: Some(append_api_version(inbound.query.as_deref(), &config.api_version)),
        headers,
        body: inbound.body.clone(),
        model: Some(model),
    })
}

fn rewrite_openai(
    inbound: &InboundRequest,
    config: &ProxyConfig,
) -> Result<OutboundRequest, ProxyError> {
    let credential = credential::resolve(config, &inbound.headers, BackendFamily::OpenAI);
    let mut headers = forwardable_headers(&inbound.headers);
    set_bearer(&mut headers, &credential.token).map_err(|_| invalid_credential())?;

    Ok(OutboundRequest {
        family: BackendFamily::OpenAI,
        method: inbound.method.clone(),
        scheme: config.openai_endpoint.scheme.clone(),
        host: config.openai_endpoint.host.clone(),
        path: inbound.path.clone(),
        query: inbound.query.clone(),
        headers,
        body: inbound.body.clone(),
        model: None,
    })
}

fn invalid_credential() -> ProxyError {
    ProxyError::bad_request("credential is not a valid header value")
}

#[derive(Deserialize)]
struct ModelField {
    #[serde(default)]
    model: serde_json::Value,
}

/// Reads the top-level `model` string. Anything else (no body, invalid JSON,
/// non-string value) yields an empty model name.
pub fn extract_model(body: &[u8]) -> String {
    serde_json::from_slice::<ModelField>(body)
        .ok()
        .and_then(|field| field.model.as_str().map(|model| model.to_string()))
        .unwrap_or_default()
}

/// `/openai/deployments/{deployment}/{path}` with the first `/v1/` of the original
/// path replaced by `/` and empty segments collapsed.
pub fn deployment_path(deployment: &str, original_path: &str) -> String {
    let suffix = original_path.replacen("/v1/", "/", 1);
    let deployment = urlencoding::encode(deployment);
    let mut path = String::from("/openai/deployments");
    for segment in std::iter::once(deployment.as_ref())
        .chain(suffix.split('/'))
        .filter(|segment| !segment.is_empty())
    {
        path.push('/');
        path.push_str(segment);
    }
    path
}

/// Adds `api-version` after any client-supplied parameters; an existing
/// `api-version` is kept, not replaced.
pub fn append_api_version(query: Option<&str>, version: &str) -> String {
    let pair = format!("api-version={}", urlencoding::encode(version));
    match query.filter(|query| !query.is_empty()) {
        Some(query) => format!("{query}&{pair}"),
        None => pair,
    }
}

fn forwardable_headers(map: &HeaderMap) -> Headers {
    let mut headers = headers_from_map(map);
    strip_hop_by_hop(&mut headers);
    headers.retain(|(name, _)| {
        !NON_FORWARDED
            .iter()
            .any(|skip| name.eq_ignore_ascii_case(skip))
    });
    headers
}

fn join_query(path: &str, query: Option<&str>) -> String {
    match query.filter(|query| !query.is_empty()) {
        Some(query) => format!("{path}?{query}"),
        None => path.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use azproxy_common::Endpoint;
    use http::HeaderValue;

    use crate::headers::header_get;

    fn azure_config() -> ProxyConfig {
        ProxyConfig {
            azure_endpoint: Some(
                Endpoint::parse("AZURE_OPENAI_ENDPOINT", "https://x.openai.azure.com").unwrap(),
            ),
            ..Default::default()
        }
    }

    fn inbound(
        method: Method,
        path: &str,
        query: Option<&str>,
        auth: &str,
        body: &str,
    ) -> InboundRequest {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_str(auth).unwrap());
        headers.insert("content-type", HeaderValue::from_static("application/json"));
        headers.insert("host", HeaderValue::from_static("localhost:8080"));
        headers.insert("content-length", HeaderValue::from(body.len()));
        InboundRequest {
            method,
            path: path.to_string(),
            query: query.map(|query| query.to_string()),
            headers,
            body: Bytes::from(body.to_string()),
        }
    }

    fn forward(outcome: RewriteOutcome) -> OutboundRequest {
        match outcome {
            RewriteOutcome::Forward(outbound) => outbound,
            RewriteOutcome::Static(doc) => panic!("unexpected static document {doc:?}"),
        }
    }

    #[test]
    fn chat_completion_targets_mapped_azure_deployment() {
        let req = inbound(
            Method::POST,
            "/v1/chat/completions",
            None,
            "Bearer azure-key",
            r#"{"model":"gpt-3.5-turbo","messages":[]}"#,
        );
        let outbound = forward(
            rewrite(&req, RouteCategory::CompletionOrEmbedding, &azure_config()).unwrap(),
        );

        assert_eq!(
            outbound.url(),
            "https://x.openai.azure.com/openai/deployments/gpt-35-turbo/chat/completions?api-version=2023-03-15-preview"
        );
        assert_eq!(outbound.family, BackendFamily::Azure);
        assert_eq!(outbound.model.as_deref(), Some("gpt-3.5-turbo"));
        assert_eq!(header_get(&outbound.headers, "api-key"), Some("azure-key"));
        assert_eq!(header_get(&outbound.headers, "authorization"), None);
        assert_eq!(header_get(&outbound.headers, "host"), None);
        assert_eq!(header_get(&outbound.headers, "content-length"), None);
        assert_eq!(header_get(&outbound.headers, "content-type"), Some("application/json"));
        assert_eq!(outbound.body, req.body);
    }

    #[test]
    fn compound_token_overrides_host_and_deployment() {
        let req = inbound(
            Method::POST,
            "/v1/embeddings",
            None,
            "Bearer abc@other.openai.azure.com@emb-prod",
            r#"{"model":"text-embedding-ada-002","input":"hi"}"#,
        );
        let outbound = forward(
            rewrite(&req, RouteCategory::CompletionOrEmbedding, &azure_config()).unwrap(),
        );

        assert_eq!(
            outbound.url(),
            "https://other.openai.azure.com/openai/deployments/emb-prod/embeddings?api-version=2023-03-15-preview"
        );
        assert_eq!(header_get(&outbound.headers, "api-key"), Some("abc"));
    }

    #[test]
    fn host_override_works_without_configured_endpoint() {
        let req = inbound(
            Method::POST,
            "/v1/completions",
            None,
            "Bearer abc@res.openai.azure.com",
            r#"{"model":"text-davinci-003"}"#,
        );
        let outbound = forward(
            rewrite(&req, RouteCategory::CompletionOrEmbedding, &ProxyConfig::default()).unwrap(),
        );
        assert_eq!(
            outbound.url(),
            "https://res.openai.azure.com/openai/deployments/text-davinci-003/completions?api-version=2023-03-15-preview"
        );
    }

    #[test]
    fn missing_azure_target_is_a_bad_gateway() {
        let req = inbound(Method::POST, "/v1/chat/completions", None, "Bearer k", "{}");
        let err = rewrite(&req, RouteCategory::CompletionOrEmbedding, &ProxyConfig::default())
            .unwrap_err();
        assert_eq!(err.status, http::StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn api_version_is_appended_to_client_query() {
        let req = inbound(
            Method::POST,
            "/v1/chat/completions",
            Some("api-version=2022-12-01&foo=bar"),
            "Bearer k",
            r#"{"model":"gpt-4"}"#,
        );
        let outbound = forward(
            rewrite(&req, RouteCategory::CompletionOrEmbedding, &azure_config()).unwrap(),
        );
        assert_eq!(
            outbound.query.as_deref(),
            Some("api-version=2022-12-01&foo=bar&api-version=2023-03-15-preview")
        );
    }

    #[test]
    fn missing_or_non_string_model_falls_back_to_empty() {
        assert_eq!(extract_model(b""), "");
        assert_eq!(extract_model(b"not json"), "");
        assert_eq!(extract_model(br#"{"model":42}"#), "");
        assert_eq!(extract_model(br#"{"messages":[]}"#), "");
        assert_eq!(extract_model(br#"{"model":"gpt-4o"}"#), "gpt-4o");
    }

    #[test]
    fn deployment_path_strips_first_v1_and_collapses_slashes() {
        assert_eq!(
            deployment_path("dep", "/v1/chat/completions"),
            "/openai/deployments/dep/chat/completions"
        );
        assert_eq!(
            deployment_path("dep", "/proxy/v1/v1/completions"),
            "/openai/deployments/dep/proxy/v1/completions"
        );
        assert_eq!(deployment_path("", "/v1/embeddings"), "/openai/deployments/embeddings");
        assert_eq!(
            deployment_path("my dep", "/v1/completions"),
            "/openai/deployments/my%20dep/completions"
        );
    }

    #[test]
    fn passthrough_targets_openai_with_bearer_token() {
        let req = inbound(
            Method::GET,
            "/v1/files",
            Some("purpose=fine-tune"),
            r#"Bearer {"azure":"A1","openai":"O1"}"#,
            "",
        );
        let outbound =
            forward(rewrite(&req, RouteCategory::PassThrough, &azure_config()).unwrap());
        assert_eq!(outbound.url(), "https://api.openai.com/v1/files?purpose=fine-tune");
        assert_eq!(outbound.family, BackendFamily::OpenAI);
        assert_eq!(header_get(&outbound.headers, "authorization"), Some("Bearer O1"));
        assert_eq!(header_get(&outbound.headers, "api-key"), None);
    }

    #[test]
    fn passthrough_prefers_static_openai_token() {
        let config = ProxyConfig {
            openai_token: Some("sk-env".to_string()),
            ..azure_config()
        };
        let req = inbound(Method::POST, "/v1/images/generations", None, "Bearer client", "{}");
        let outbound = forward(rewrite(&req, RouteCategory::PassThrough, &config).unwrap());
        assert_eq!(header_get(&outbound.headers, "authorization"), Some("Bearer sk-env"));
    }

    #[test]
    fn static_routes_do_not_forward() {
        let req = inbound(Method::GET, "/v1/models", None, "Bearer k", "");
        assert!(matches!(
            rewrite(&req, RouteCategory::ModelList, &azure_config()).unwrap(),
            RewriteOutcome::Static(StaticDocument::Models)
        ));
        assert!(matches!(
            rewrite(&req, RouteCategory::CreditGrants, &azure_config()).unwrap(),
            RewriteOutcome::Static(StaticDocument::CreditGrants)
        ));
    }

    #[test]
    fn non_ascii_headers_are_forwarded_byte_for_byte() {
        let mut req = inbound(
            Method::POST,
            "/v1/chat/completions",
            None,
            "Bearer k",
            r#"{"model":"gpt-4"}"#,
        );
        let title = HeaderValue::from_bytes("café".as_bytes()).unwrap();
        req.headers.insert("x-title", title.clone());

        let outbound = forward(
            rewrite(&req, RouteCategory::CompletionOrEmbedding, &azure_config()).unwrap(),
        );
        let forwarded = outbound
            .headers
            .iter()
            .find(|(name, _)| name == "x-title")
            .map(|(_, value)| value);
        assert_eq!(forwarded, Some(&title));

        let outbound =
            forward(rewrite(&req, RouteCategory::PassThrough, &azure_config()).unwrap());
        assert!(
            outbound
                .headers
                .iter()
                .any(|(name, value)| name == "x-title" && *value == title)
        );
    }

    #[test]
    fn unencodable_static_token_is_rejected() {
        let config = ProxyConfig {
            azure_token: Some("bad\ntoken".to_string()),
            ..azure_config()
        };
        let req = inbound(Method::POST, "/v1/chat/completions", None, "Bearer k", "{}");
        let err = rewrite(&req, RouteCategory::CompletionOrEmbedding, &config).unwrap_err();
        assert_eq!(err.status, http::StatusCode::BAD_REQUEST);
    }
}
