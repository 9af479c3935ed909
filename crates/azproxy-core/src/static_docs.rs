use axum::body::Body;
use axum::response::{IntoResponse, Response};
use http::header::CONTENT_TYPE;
use http::{HeaderValue, StatusCode};

/// Account metadata documents answered locally instead of being proxied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaticDocument {
    Models,
    CreditGrants,
}

impl StaticDocument {
    pub fn body(&self) -> &'static str {
        match self {
            StaticDocument::Models => MODELS_JSON,
            StaticDocument::CreditGrants => CREDIT_GRANTS_JSON,
        }
    }
}

impl IntoResponse for StaticDocument {
    fn into_response(self) -> Response {
        let mut resp = Response::new(Body::from(self.body()));
        *resp.status_mut() = StatusCode::OK;
        resp.headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        resp
    }
}

const CREDIT_GRANTS_JSON: &str = r#"{
  "object": "credit_summary",
  "total_granted": 18.0,
  "total_used": 0,
  "total_available": 18.0,
  "grants": {
    "object": "list",
    "data": [
      {
        "object": "credit_grant",
        "id": "",
        "grant_amount": 18.0,
        "used_amount": 0.0,
        "effective_at": 1675900800.0,
        "expires_at": 1685577600.0
      }
    ]
  }
}"#;

const MODELS_JSON: &str = r#"{
  "object": "list",
  "data": [
    {
      "id": "gpt-3.5-turbo-0301",
      "object": "model",
      "created": 1677649963,
      "owned_by": "openai",
      "permission": [
        {
          "id": "modelperm-vrvwsIOWpZCbya4ceX3Kj4qw",
          "object": "model_permission",
          "created": 1679602087,
          "allow_create_engine": false,
          "allow_sampling": true,
          "allow_logprobs": true,
          "allow_search_indices": false,
          "allow_view": true,
          "allow_fine_tuning": false,
          "organization": "*",
          "group": null,
          "is_blocking": false
        }
      ],
      "root": "gpt-3.5-turbo-0301",
      "parent": null
    },
    {
      "id": "gpt-3.5-turbo",
      "object": "model",
      "created": 1677610602,
      "owned_by": "openai",
      "permission": [
        {
          "id": "modelperm-M56FXnG1AsIr3SXq8BYPvXJA",
          "object": "model_permission",
          "created": 1679602088,
          "allow_create_engine": false,
          "allow_sampling": true,
          "allow_logprobs": true,
          "allow_search_indices": false,
          "allow_view": true,
          "allow_fine_tuning": false,
          "organization": "*",
          "group": null,
          "is_blocking": false
        }
      ],
      "root": "gpt-3.5-turbo",
      "parent": null
    }
  ]
}"#;
