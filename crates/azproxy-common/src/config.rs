use std::time::Duration;

use http::Uri;

use crate::model_mapper::ModelMapper;

pub const DEFAULT_ADDRESS: &str = "0.0.0.0:8080";
pub const DEFAULT_API_VERSION: &str = "2023-03-15-preview";
pub const DEFAULT_OPENAI_ENDPOINT: &str = "https://api.openai.com";

const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 600;
const DEFAULT_STREAM_IDLE_TIMEOUT_SECS: u64 = 120;
const DEFAULT_MAX_BODY_BYTES: usize = 32 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("error parsing AZURE_OPENAI_MODEL_MAPPER, invalid value {0}")]
    InvalidModelMapper(String),
    #[error("invalid {name} value {value:?}: {reason}")]
    InvalidEndpoint {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// Scheme and authority of an upstream base URL. Any path on the configured URL is ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub scheme: String,
    pub host: String,
}

impl Endpoint {
    pub fn parse(name: &'static str, raw: &str) -> Result<Self, ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidEndpoint {
            name,
            value: raw.to_string(),
            reason: reason.to_string(),
        };
        let uri: Uri = raw.trim().parse().map_err(|err: http::uri::InvalidUri| {
            invalid(&err.to_string())
        })?;
        let scheme = uri.scheme_str().ok_or_else(|| invalid("missing scheme"))?;
        if !scheme.eq_ignore_ascii_case("http") && !scheme.eq_ignore_ascii_case("https") {
            return Err(invalid("scheme must be http or https"));
        }
        let host = uri.authority().ok_or_else(|| invalid("missing host"))?;
        Ok(Self {
            scheme: scheme.to_ascii_lowercase(),
            host: host.as_str().to_string(),
        })
    }

    pub fn origin(&self) -> String {
        format!("{}://{}", self.scheme, self.host)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamSettings {
    /// Optional outbound proxy for upstream egress.
    pub proxy: Option<String>,
    pub connect_timeout: Duration,
    /// Deadline for the upstream response head. Exceeding it yields 504.
    pub response_timeout: Duration,
    /// Longest allowed gap between two body chunks of a streamed response.
    pub stream_idle_timeout: Duration,
}

impl Default for UpstreamSettings {
    fn default() -> Self {
        Self {
            proxy: None,
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            response_timeout: Duration::from_secs(DEFAULT_UPSTREAM_TIMEOUT_SECS),
            stream_idle_timeout: Duration::from_secs(DEFAULT_STREAM_IDLE_TIMEOUT_SECS),
        }
    }
}

/// Final configuration used by the running process. Built once at startup, never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    pub address: String,
    /// Azure resource endpoint. Requests can still reach Azure without it when the
    /// client supplies a host through a compound token.
    pub azure_endpoint: Option<Endpoint>,
    pub api_version: String,
    pub model_mapper: ModelMapper,
    pub azure_token: Option<String>,
    pub openai_token: Option<String>,
    pub openai_endpoint: Endpoint,
    pub upstream: UpstreamSettings,
    pub max_body_bytes: usize,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS.to_string(),
            azure_endpoint: None,
            api_version: DEFAULT_API_VERSION.to_string(),
            model_mapper: ModelMapper::with_defaults(),
            azure_token: None,
            openai_token: None,
            openai_endpoint: Endpoint {
                scheme: "https".to_string(),
                host: "api.openai.com".to_string(),
            },
            upstream: UpstreamSettings::default(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

/// Raw, already-sanitized settings collected from CLI/ENV before validation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProxyConfigPatch {
    pub address: Option<String>,
    pub azure_endpoint: Option<String>,
    pub api_version: Option<String>,
    pub model_mapper: Option<String>,
    pub azure_token: Option<String>,
    pub openai_token: Option<String>,
    pub openai_endpoint: Option<String>,
    pub proxy: Option<String>,
    pub connect_timeout_secs: Option<u64>,
    pub upstream_timeout_secs: Option<u64>,
    pub stream_idle_timeout_secs: Option<u64>,
    pub max_body_bytes: Option<usize>,
}

impl ProxyConfigPatch {
    pub fn into_config(self) -> Result<ProxyConfig, ConfigError> {
        let defaults = ProxyConfig::default();

        let azure_endpoint = self
            .azure_endpoint
            .as_deref()
            .map(|raw| Endpoint::parse("AZURE_OPENAI_ENDPOINT", raw))
            .transpose()?;
        let openai_endpoint = match self.openai_endpoint.as_deref() {
            Some(raw) => Endpoint::parse("OPENAI_ENDPOINT", raw)?,
            None => Endpoint::parse("OPENAI_ENDPOINT", DEFAULT_OPENAI_ENDPOINT)?,
        };

        let mut model_mapper = ModelMapper::with_defaults();
        if let Some(raw) = self.model_mapper.as_deref() {
            model_mapper.apply_overrides(raw)?;
        }

        let upstream = UpstreamSettings {
            proxy: self.proxy,
            connect_timeout: self
                .connect_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.upstream.connect_timeout),
            response_timeout: self
                .upstream_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.upstream.response_timeout),
            stream_idle_timeout: self
                .stream_idle_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.upstream.stream_idle_timeout),
        };

        Ok(ProxyConfig {
            address: self.address.unwrap_or(defaults.address),
            azure_endpoint,
            api_version: self.api_version.unwrap_or(defaults.api_version),
            model_mapper,
            azure_token: self.azure_token,
            openai_token: self.openai_token,
            openai_endpoint,
            upstream,
            max_body_bytes: self.max_body_bytes.unwrap_or(defaults.max_body_bytes),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_patch_uses_defaults() {
        let config = ProxyConfigPatch::default().into_config().unwrap();
        assert_eq!(config, ProxyConfig::default());
        assert_eq!(config.openai_endpoint.origin(), DEFAULT_OPENAI_ENDPOINT);
    }

    #[test]
    fn endpoint_keeps_scheme_and_host_only() {
        let endpoint = Endpoint::parse(
            "AZURE_OPENAI_ENDPOINT",
            "https://x.openai.azure.com/some/path",
        )
        .unwrap();
        assert_eq!(endpoint.scheme, "https");
        assert_eq!(endpoint.host, "x.openai.azure.com");

        let endpoint = Endpoint::parse("AZURE_OPENAI_ENDPOINT", "http://127.0.0.1:9000").unwrap();
        assert_eq!(endpoint.origin(), "http://127.0.0.1:9000");
    }

    #[test]
    fn endpoint_without_scheme_is_rejected() {
        let err = Endpoint::parse("AZURE_OPENAI_ENDPOINT", "x.openai.azure.com").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEndpoint { name: "AZURE_OPENAI_ENDPOINT", .. }));

        let err = Endpoint::parse("AZURE_OPENAI_ENDPOINT", "ftp://x.openai.azure.com").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEndpoint { .. }));
    }

    #[test]
    fn patch_overlays_mapper_and_timeouts() {
        let config = ProxyConfigPatch {
            azure_endpoint: Some("https://x.openai.azure.com".to_string()),
            model_mapper: Some("gpt-4=gpt4".to_string()),
            upstream_timeout_secs: Some(5),
            ..Default::default()
        }
        .into_config()
        .unwrap();
        assert_eq!(config.model_mapper.resolve_deployment("gpt-4"), "gpt4");
        assert_eq!(config.upstream.response_timeout, Duration::from_secs(5));
        assert_eq!(
            config.azure_endpoint.map(|endpoint| endpoint.origin()),
            Some("https://x.openai.azure.com".to_string())
        );
    }

    #[test]
    fn malformed_mapper_fails_the_whole_config() {
        let err = ProxyConfigPatch {
            model_mapper: Some("gpt-4".to_string()),
            ..Default::default()
        }
        .into_config()
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidModelMapper(_)));
    }
}
