pub mod routes;

use axum::{
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap, StatusCode},
};
use serde::Deserialize;

use crate::evaluation::{FeatureContext, FilterConfig};

pub const USER_ID_HEADER: &str = "x-user-id";
pub const ROLES_HEADER: &str = "x-roles";
pub const PERMISSIONS_HEADER: &str = "x-permissions";

/// Body of `PUT /features/{name}`; the name comes from the path.
#[derive(Debug, Deserialize)]
pub struct UpsertFeatureRequest {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub filters: Vec<FilterConfig>,
}

fn default_enabled() -> bool {
    true
}

/// Caller identity taken from the `X-User-Id`, `X-Roles` and `X-Permissions`
/// headers. The values are trusted as given, nothing here authenticates them.
pub struct RequestIdentity(pub FeatureContext);

impl<S> FromRequestParts<S> for RequestIdentity
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or((StatusCode::BAD_REQUEST, "Missing X-User-Id header"))?;

        let ctx = FeatureContext::new(
            user_id.trim(),
            parse_list(&parts.headers, ROLES_HEADER),
            parse_list(&parts.headers, PERMISSIONS_HEADER),
        );
        Ok(RequestIdentity(ctx))
    }
}

// Comma-separated header value, blanks dropped
fn parse_list(headers: &HeaderMap, name: &str) -> Vec<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}
