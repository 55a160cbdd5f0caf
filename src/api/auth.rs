/// Bearer-token authentication
///
/// Resolves the caller's user context from the configured API keys. With no
/// keys configured every request runs as the default user.

use crate::api::AppState;
use crate::config::Config;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::StatusCode;
use serde::Serialize;

/// Identity handed to the engine and the tool provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserContext {
    pub user_id: String,
    pub plan: String,
}

/// Validate an optional bearer token against the configuration
pub fn authenticate(config: &Config, bearer: Option<&str>) -> Option<UserContext> {
    if config.auth.api_keys.is_empty() {
        return Some(UserContext {
            user_id: config.engine.default_user_id.clone(),
            plan: "free".to_string(),
        });
    }

    let token = bearer?;
    config
        .auth
        .api_keys
        .iter()
        .find(|key| key.key == token)
        .map(|key| UserContext {
            user_id: key.user_id.clone(),
            plan: key.plan.clone(),
        })
}

/// Extractor that validates the `Authorization: Bearer` header
pub struct Authenticated(pub UserContext);

impl FromRequestParts<AppState> for Authenticated {
    type Rejection = StatusCode;

    fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> impl std::future::Future<Output = Result<Self, Self::Rejection>> + Send {
        let bearer = parts
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.strip_prefix("Bearer "))
            .map(str::trim);

        let result = authenticate(&state.config, bearer);

        async move {
            match result {
                Some(user) => Ok(Authenticated(user)),
                None => {
                    tracing::warn!("🔒 Rejected request with missing or unknown API key");
                    Err(StatusCode::UNAUTHORIZED)
                }
            }
        }
    }
}
