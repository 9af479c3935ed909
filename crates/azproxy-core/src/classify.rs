/// Backend family selected for an inbound request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteCategory {
    /// Chat/text completions and embeddings, served by an Azure deployment.
    CompletionOrEmbedding,
    ModelList,
    CreditGrants,
    /// Anything else, forwarded to the native OpenAI API.
    PassThrough,
}

impl RouteCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteCategory::CompletionOrEmbedding => "completion",
            RouteCategory::ModelList => "models",
            RouteCategory::CreditGrants => "credit_grants",
            RouteCategory::PassThrough => "passthrough",
        }
    }
}

/// Classifies by suffix of the percent-decoded path. The first matching rule wins.
pub fn classify(path: &str) -> RouteCategory {
    let decoded = urlencoding::decode(path);
    let path = decoded.as_deref().unwrap_or(path);

    if path.ends_with("completions") || path.ends_with("embeddings") {
        RouteCategory::CompletionOrEmbedding
    } else if path.ends_with("models") {
        RouteCategory::ModelList
    } else if path.ends_with("credit_grants") {
        RouteCategory::CreditGrants
    } else {
        RouteCategory::PassThrough
    }
}
