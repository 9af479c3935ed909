mod config;
mod model_mapper;

pub use config::{
    ConfigError, DEFAULT_ADDRESS, DEFAULT_API_VERSION, DEFAULT_OPENAI_ENDPOINT, Endpoint,
    ProxyConfig, ProxyConfigPatch, UpstreamSettings,
};
pub use model_mapper::ModelMapper;
