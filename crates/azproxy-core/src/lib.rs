pub mod bootstrap;
pub mod classify;
pub mod core;
pub mod credential;
pub mod dispatch;
pub mod error;
pub mod handler;
pub mod headers;
pub mod rewrite;
pub mod static_docs;
pub mod upstream_client;

pub use bootstrap::{CliArgs, bootstrap, bootstrap_from_env};
pub use classify::{RouteCategory, classify};
pub use crate::core::{Core, CoreState};
pub use credential::{BackendFamily, Credential, ResolvedCredential};
pub use error::ProxyError;
pub use rewrite::{InboundRequest, OutboundRequest, RewriteOutcome, rewrite};
pub use static_docs::StaticDocument;
pub use upstream_client::{
    UpstreamBody, UpstreamClient, UpstreamFailure, UpstreamResponse, UpstreamTransportErrorKind,
    WreqUpstreamClient,
};
