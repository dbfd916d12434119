/// Authentication extractors and utilities
use crate::{
    context::AppContext,
    error::ConsoleError,
    identity::{self, Principal},
    moderation::Caller,
};
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap},
};

/// Extract a bearer token from the Authorization header
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
}

/// Admin authentication context - requires a provider token and an admin record
#[derive(Debug, Clone)]
pub struct AdminAuthContext {
    pub caller: Caller,
}

impl AdminAuthContext {
    pub fn principal(&self) -> &Principal {
        self.caller.principal()
    }
}

#[async_trait]
impl FromRequestParts<AppContext> for AdminAuthContext {
    type Rejection = ConsoleError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        // Extract bearer token
        let token = extract_bearer_token(&parts.headers).ok_or_else(|| {
            ConsoleError::Authentication("Missing authorization header".to_string())
        })?;

        let principal = identity::verify_token(&token, &state.config.authentication.jwt_secret)?;

        tracing::debug!("AdminAuthContext: Checking admin record for {}", principal.id);

        let caller = state.moderation.resolve_caller(&principal).await.map_err(|e| {
            tracing::warn!("AdminAuthContext: {} rejected: {}", principal.id, e);
            e
        })?;

        Ok(AdminAuthContext { caller })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_extract_bearer_token() {
        let mut headers = HeaderMap::new();
        assert!(extract_bearer_token(&headers).is_none());

        headers.insert("authorization", HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(extract_bearer_token(&headers).as_deref(), Some("abc.def"));

        headers.insert("authorization", HeaderValue::from_static("Basic abc"));
        assert!(extract_bearer_token(&headers).is_none());

        headers.insert("authorization", HeaderValue::from_static("Bearer "));
        assert!(extract_bearer_token(&headers).is_none());
    }
}
