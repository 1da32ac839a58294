use axum::http::HeaderMap;

use crate::app::AppState;

/// Checks the request's bearer token against the token configured for
/// `tenant_id` at startup. A tenant absent from `gateway.tenant_tokens` is
/// rejected outright — there is no "open" tenant (§6 "HTTP surface").
pub(crate) fn check_auth(state: &AppState, tenant_id: &str, headers: &HeaderMap) -> bool {
    match state.config.gateway.tenant_tokens.get(tenant_id) {
        Some(expected) => extract_bearer(headers).map(|t| t == expected).unwrap_or(false),
        None => false,
    }
}

pub(crate) fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn extracts_bearer_token() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Bearer abc123"));
        assert_eq!(extract_bearer(&headers), Some("abc123"));
    }

    #[test]
    fn missing_header_has_no_bearer() {
        assert_eq!(extract_bearer(&HeaderMap::new()), None);
    }
}
