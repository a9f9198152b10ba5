//! Caller identity extraction
//!
//! Authentication is enforced upstream; this service trusts the principal
//! headers injected by the edge and rejects requests without them.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// The authenticated caller, as asserted by the edge.
#[derive(Debug, Clone)]
pub struct Principal {
    pub user_id: String,
    pub organization_id: String,
}

#[derive(Debug)]
pub struct PrincipalRejection(String);

impl IntoResponse for PrincipalRejection {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "error": self.0 });
        (StatusCode::BAD_REQUEST, axum::Json(body)).into_response()
    }
}

impl<S: Send + Sync> FromRequestParts<S> for Principal {
    type Rejection = PrincipalRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = header_value(parts, "X-User-Id")?;
        let organization_id = header_value(parts, "X-Organization-Id")?;
        Ok(Principal {
            user_id,
            organization_id,
        })
    }
}

fn header_value(parts: &Parts, name: &str) -> Result<String, PrincipalRejection> {
    let header = parts
        .headers
        .get(name)
        .ok_or_else(|| PrincipalRejection(format!("missing {name} header")))?;

    let value = header
        .to_str()
        .map_err(|_| PrincipalRejection(format!("invalid {name} header value")))?;

    if value.is_empty() {
        return Err(PrincipalRejection(format!("empty {name} header")));
    }

    Ok(value.to_string())
}
