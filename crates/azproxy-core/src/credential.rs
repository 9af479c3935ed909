use azproxy_common::ProxyConfig;
use http::HeaderMap;
use serde::Deserialize;

/// Which upstream a credential is being resolved for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendFamily {
    Azure,
    OpenAI,
}

impl BackendFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendFamily::Azure => "azure",
            BackendFamily::OpenAI => "openai",
        }
    }
}

/// A credential presented by the client in its `Authorization` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    /// A plain token, used for whichever backend is targeted.
    Single(String),
    /// Legacy `token@host[@deployment]` form carrying inline Azure overrides.
    Compound {
        token: String,
        host: Option<String>,
        deployment: Option<String>,
    },
    /// `{"azure": "...", "openai": "..."}` carrying one secret per backend family.
    Dual { azure: String, openai: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedCredential {
    pub token: String,
    pub host_override: Option<String>,
    pub deployment_override: Option<String>,
}

impl Credential {
    pub fn for_family(self, family: BackendFamily) -> ResolvedCredential {
        match self {
            Credential::Single(token) => ResolvedCredential {
                token,
                ..Default::default()
            },
            Credential::Compound {
                token,
                host,
                deployment,
            } => ResolvedCredential {
                token,
                host_override: host,
                deployment_override: deployment,
            },
            Credential::Dual { azure, openai } => ResolvedCredential {
                token: match family {
                    BackendFamily::Azure => azure,
                    BackendFamily::OpenAI => openai,
                },
                ..Default::default()
            },
        }
    }
}

type ParseAttempt = fn(&str) -> Option<Credential>;

const PARSE_ORDER: [ParseAttempt; 2] = [parse_dual, parse_compound];

/// Resolves the outbound credential for `family`.
///
/// A static token configured for the family always wins. Otherwise the request's
/// bearer value is parsed as a dual-token JSON object, then as a compound token,
/// then taken verbatim. Resolution never fails; a missing header yields an empty
/// token that the backend rejects with its own 401.
pub fn resolve(
    config: &ProxyConfig,
    headers: &HeaderMap,
    family: BackendFamily,
) -> ResolvedCredential {
    let static_token = match family {
        BackendFamily::Azure => config.azure_token.as_deref(),
        BackendFamily::OpenAI => config.openai_token.as_deref(),
    };
    if let Some(token) = static_token {
        return ResolvedCredential {
            token: token.to_string(),
            ..Default::default()
        };
    }

    let raw = bearer_value(headers).unwrap_or_default();
    parse_credential(&raw).for_family(family)
}

/// Tries each structured form in order; anything else is a single token.
pub fn parse_credential(raw: &str) -> Credential {
    PARSE_ORDER
        .iter()
        .find_map(|attempt| attempt(raw))
        .unwrap_or_else(|| Credential::Single(raw.to_string()))
}

#[derive(Deserialize)]
struct DualTokens {
    #[serde(default)]
    azure: Option<String>,
    #[serde(default)]
    openai: Option<String>,
}

/// Accepts a JSON object naming at least one of `azure` / `openai`.
pub fn parse_dual(raw: &str) -> Option<Credential> {
    let raw = raw.trim();
    if !raw.starts_with('{') {
        return None;
    }
    let tokens: DualTokens = serde_json::from_str(raw).ok()?;
    if tokens.azure.is_none() && tokens.openai.is_none() {
        return None;
    }
    Some(Credential::Dual {
        azure: tokens.azure.unwrap_or_default(),
        openai: tokens.openai.unwrap_or_default(),
    })
}

/// Splits `token@host[@deployment]`. Empty host/deployment segments are treated as absent.
pub fn parse_compound(raw: &str) -> Option<Credential> {
    if !raw.contains('@') {
        return None;
    }
    let mut parts = raw.split('@');
    let token = parts.next().unwrap_or_default().to_string();
    let host = non_empty(parts.next());
    let deployment = non_empty(parts.next());
    Some(Credential::Compound {
        token,
        host,
        deployment,
    })
}

fn non_empty(segment: Option<&str>) -> Option<String> {
    segment
        .filter(|value| !value.is_empty())
        .map(|value| value.to_string())
}

fn bearer_value(headers: &HeaderMap) -> Option<String> {
    let auth = header_value(headers, "authorization")?;
    if let Some(token) = auth.strip_prefix("Bearer ") {
        return Some(token.to_string());
    }
    if let Some(token) = auth.strip_prefix("bearer ") {
        return Some(token.to_string());
    }
    Some(auth)
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn headers_with_auth(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn compound_token_yields_host_and_deployment_overrides() {
        let config = ProxyConfig::default();
        let headers = headers_with_auth("Bearer abc@myhost.example.com@dep1");
        let resolved = resolve(&config, &headers, BackendFamily::Azure);
        assert_eq!(resolved.token, "abc");
        assert_eq!(resolved.host_override.as_deref(), Some("myhost.example.com"));
        assert_eq!(resolved.deployment_override.as_deref(), Some("dep1"));
    }

    #[test]
    fn compound_token_without_deployment() {
        let cred = parse_credential("abc@myhost.example.com");
        assert_eq!(
            cred,
            Credential::Compound {
                token: "abc".to_string(),
                host: Some("myhost.example.com".to_string()),
                deployment: None,
            }
        );
        assert_eq!(
            parse_credential("abc@"),
            Credential::Compound {
                token: "abc".to_string(),
                host: None,
                deployment: None,
            }
        );
    }

    #[test]
    fn dual_token_selects_field_by_family() {
        let config = ProxyConfig::default();
        let headers = headers_with_auth(r#"Bearer {"azure":"A1","openai":"O1"}"#);
        assert_eq!(resolve(&config, &headers, BackendFamily::Azure).token, "A1");
        assert_eq!(resolve(&config, &headers, BackendFamily::OpenAI).token, "O1");
    }

    #[test]
    fn dual_token_wins_over_compound_form() {
        let cred = parse_credential(r#"{"azure":"a@b","openai":"o"}"#);
        assert_eq!(
            cred,
            Credential::Dual {
                azure: "a@b".to_string(),
                openai: "o".to_string(),
            }
        );
    }

    #[test]
    fn malformed_json_falls_through_to_raw_token() {
        assert_eq!(
            parse_credential(r#"{"azure":"#),
            Credential::Single(r#"{"azure":"#.to_string())
        );
        assert_eq!(parse_credential("{}"), Credential::Single("{}".to_string()));
        assert_eq!(parse_credential("sk-plain"), Credential::Single("sk-plain".to_string()));
    }

    #[test]
    fn static_token_takes_priority_over_header() {
        let config = ProxyConfig {
            azure_token: Some("env-azure".to_string()),
            ..Default::default()
        };
        let headers = headers_with_auth("Bearer abc@myhost.example.com@dep1");
        let resolved = resolve(&config, &headers, BackendFamily::Azure);
        assert_eq!(resolved, ResolvedCredential {
            token: "env-azure".to_string(),
            ..Default::default()
        });

        // The OpenAI family has no static token here, so the header is used.
        let resolved = resolve(&config, &headers, BackendFamily::OpenAI);
        assert_eq!(resolved.token, "abc");
    }

    #[test]
    fn missing_header_resolves_to_empty_token() {
        let resolved = resolve(&ProxyConfig::default(), &HeaderMap::new(), BackendFamily::Azure);
        assert_eq!(resolved, ResolvedCredential::default());
    }

    #[test]
    fn header_without_bearer_prefix_is_used_verbatim() {
        let headers = headers_with_auth("sk-raw");
        let resolved = resolve(&ProxyConfig::default(), &headers, BackendFamily::OpenAI);
        assert_eq!(resolved.token, "sk-raw");
    }
}
