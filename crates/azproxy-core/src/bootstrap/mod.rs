use anyhow::Context;
use clap::Parser;
use tracing::info;

use azproxy_common::{ModelMapper, ProxyConfig, ProxyConfigPatch};

#[derive(Debug, Clone, Default, Parser)]
#[command(
    name = "azproxy",
    version,
    about = "OpenAI-compatible front door for Azure OpenAI deployments"
)]
pub struct CliArgs {
    /// Listen address.
    #[arg(long, env = "AZURE_OPENAI_PROXY_ADDRESS")]
    pub address: Option<String>,

    /// Azure OpenAI endpoint, e.g. https://example.openai.azure.com.
    #[arg(long, env = "AZURE_OPENAI_ENDPOINT")]
    pub endpoint: Option<String>,

    /// Azure OpenAI api-version query parameter.
    #[arg(long, env = "AZURE_OPENAI_APIVERSION")]
    pub api_version: Option<String>,

    /// Comma-separated `model=deployment` overrides.
    #[arg(long, env = "AZURE_OPENAI_MODEL_MAPPER")]
    pub model_mapper: Option<String>,

    /// Static Azure api key. Overrides whatever the client sends.
    #[arg(long, env = "AZURE_OPENAI_TOKEN", hide_env_values = true)]
    pub azure_token: Option<String>,

    /// Static OpenAI token for passthrough routes.
    #[arg(long, env = "OPENAI_TOKEN", hide_env_values = true)]
    pub openai_token: Option<String>,

    /// Base URL for passthrough routes.
    #[arg(long, env = "OPENAI_ENDPOINT")]
    pub openai_endpoint: Option<String>,

    /// Optional outbound proxy for upstream requests.
    #[arg(long, env = "AZURE_OPENAI_HTTP_PROXY")]
    pub proxy: Option<String>,

    #[arg(long, env = "AZURE_OPENAI_CONNECT_TIMEOUT_SECS")]
    pub connect_timeout_secs: Option<String>,

    /// Seconds to wait for the upstream response head.
    #[arg(long, env = "AZURE_OPENAI_UPSTREAM_TIMEOUT_SECS")]
    pub upstream_timeout_secs: Option<String>,

    /// Seconds a streaming body may stall before it is cut.
    #[arg(long, env = "AZURE_OPENAI_STREAM_IDLE_TIMEOUT_SECS")]
    pub stream_idle_timeout_secs: Option<String>,

    #[arg(long, env = "AZURE_OPENAI_MAX_BODY_BYTES")]
    pub max_body_bytes: Option<String>,
}

pub fn bootstrap_from_env() -> anyhow::Result<ProxyConfig> {
    let args = CliArgs::parse();
    bootstrap(args)
}

pub fn bootstrap(args: CliArgs) -> anyhow::Result<ProxyConfig> {
    let patch = ProxyConfigPatch {
        address: sanitize_optional_env_value(args.address),
        azure_endpoint: sanitize_optional_env_value(args.endpoint),
        api_version: sanitize_optional_env_value(args.api_version),
        model_mapper: sanitize_optional_env_value(args.model_mapper),
        azure_token: sanitize_optional_env_value(args.azure_token),
        openai_token: sanitize_optional_env_value(args.openai_token),
        openai_endpoint: sanitize_optional_env_value(args.openai_endpoint),
        proxy: sanitize_optional_env_value(args.proxy),
        connect_timeout_secs: parse_u64_env_value(
            args.connect_timeout_secs,
            "AZURE_OPENAI_CONNECT_TIMEOUT_SECS",
        )?,
        upstream_timeout_secs: parse_u64_env_value(
            args.upstream_timeout_secs,
            "AZURE_OPENAI_UPSTREAM_TIMEOUT_SECS",
        )?,
        stream_idle_timeout_secs: parse_u64_env_value(
            args.stream_idle_timeout_secs,
            "AZURE_OPENAI_STREAM_IDLE_TIMEOUT_SECS",
        )?,
        max_body_bytes: parse_usize_env_value(args.max_body_bytes, "AZURE_OPENAI_MAX_BODY_BYTES")?,
    };

    let config = patch.into_config().context("finalize proxy config")?;
    log_config(&config);
    Ok(config)
}

fn log_config(config: &ProxyConfig) {
    info!("listening on {}", config.address);
    match config.azure_endpoint.as_ref() {
        Some(endpoint) => info!("azure openai endpoint: {}", endpoint.origin()),
        None => info!("azure openai endpoint not set, clients must supply token@host"),
    }
    info!("azure openai api version: {}", config.api_version);
    info!("openai passthrough endpoint: {}", config.openai_endpoint.origin());
    if config.azure_token.is_some() {
        info!("loading azure api token from env");
    }
    if config.openai_token.is_some() {
        info!("loading openai api token from env");
    }
    log_model_mapper(&config.model_mapper);
}

fn log_model_mapper(mapper: &ModelMapper) {
    for (model, deployment) in mapper.iter() {
        info!("loading azure openai model mapper: {model} -> {deployment}");
    }
}

fn sanitize_optional_env_value(value: Option<String>) -> Option<String> {
    let trimmed = value?.trim().to_string();
    if trimmed.is_empty() {
        return None;
    }
    // Some PaaS systems inject unresolved placeholders like `${VAR}`.
    if trimmed.starts_with("${") && trimmed.ends_with('}') {
        return None;
    }
    Some(trimmed)
}

fn parse_u64_env_value(value: Option<String>, env_name: &str) -> anyhow::Result<Option<u64>> {
    let Some(raw) = sanitize_optional_env_value(value) else {
        return Ok(None);
    };
    let parsed = raw
        .parse::<u64>()
        .with_context(|| format!("invalid {env_name} value: {raw}"))?;
    Ok(Some(parsed))
}

fn parse_usize_env_value(value: Option<String>, env_name: &str) -> anyhow::Result<Option<usize>> {
    let Some(raw) = sanitize_optional_env_value(value) else {
        return Ok(None);
    };
    let parsed = raw
        .parse::<usize>()
        .with_context(|| format!("invalid {env_name} value: {raw}"))?;
    Ok(Some(parsed))
}
