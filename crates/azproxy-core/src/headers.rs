use http::header::InvalidHeaderValue;
use http::{HeaderMap, HeaderValue};

/// Ordered header list used for outbound requests and relayed responses.
/// Names compare case-insensitively; repeated names are kept as separate entries.
/// Values keep their raw bytes, so non-ASCII values survive the round trip.
pub type Headers = Vec<(String, HeaderValue)>;

/// Connection-scoped headers a proxy must not forward in either direction.
const HOP_BY_HOP: [&str; 9] = [
    "connection",
    "keep-alive",
    "proxy-connection",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

pub fn header_set(headers: &mut Headers, name: impl Into<String>, value: HeaderValue) {
    let name = name.into();
    header_remove(headers, &name);
    headers.push((name, value));
}

pub fn header_get<'a>(headers: &'a Headers, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .and_then(|(_, v)| v.to_str().ok())
}

/// Removes every entry named `name` and returns the first removed value.
pub fn header_remove(headers: &mut Headers, name: &str) -> Option<HeaderValue> {
    let mut first = None;
    headers.retain(|(k, v)| {
        if k.eq_ignore_ascii_case(name) {
            if first.is_none() {
                first = Some(v.clone());
            }
            false
        } else {
            true
        }
    });
    first
}

pub fn set_bearer(headers: &mut Headers, token: &str) -> Result<(), InvalidHeaderValue> {
    let value = HeaderValue::from_str(&format!("Bearer {token}"))?;
    header_set(headers, "Authorization", value);
    Ok(())
}

pub fn headers_from_map(map: &HeaderMap) -> Headers {
    map.iter()
        .map(|(k, v)| (k.as_str().to_string(), v.clone()))
        .collect()
}

pub fn strip_hop_by_hop(headers: &mut Headers) {
    headers.retain(|(k, _)| !HOP_BY_HOP.iter().any(|hop| k.eq_ignore_ascii_case(hop)));
}
