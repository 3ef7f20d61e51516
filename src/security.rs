use crate::error::CrossListError;
use crate::models::{AuthUser, SubscriptionStatus, SubscriptionTier};
use crate::ratelimit::{FixedWindowLimiter, LockoutGuard};
use crate::store::{StoreError, supabase::SupabaseClient};
use async_trait::async_trait;
use axum::{
    body::Body,
    extract::State,
    http::{self, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::{collections::HashMap, convert::Infallible, sync::Arc};
use tracing::{info, warn};
use uuid::Uuid;

/// Resolves a bearer token to the user behind it. `Ok(None)` means the token
/// is unknown; `Err` means the identity backend could not answer.
#[async_trait]
pub trait SessionResolver: Send + Sync {
    async fn resolve(&self, token: &str) -> Result<Option<AuthUser>, StoreError>;
}

/// Fixed token table, loaded from `DEMO_SESSIONS`.
#[derive(Clone, Default)]
pub struct StaticSessionResolver {
    sessions: HashMap<String, AuthUser>,
}

impl StaticSessionResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(mut self, token: impl Into<String>, user: AuthUser) -> Self {
        self.sessions.insert(token.into(), user);
        self
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn users(&self) -> impl Iterator<Item = &AuthUser> {
        self.sessions.values()
    }

    /// Parses `token:user_uuid:tier:status` entries separated by commas.
    pub fn parse(raw: &str) -> Self {
        let mut resolver = Self::new();
        for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let parts: Vec<&str> = entry.split(':').map(str::trim).collect();
            let parsed = match parts.as_slice() {
                [token, id, tier, status] if !token.is_empty() => Uuid::parse_str(id)
                    .ok()
                    .zip(SubscriptionTier::parse(tier))
                    .zip(SubscriptionStatus::parse(status))
                    .map(|((id, tier), status)| (*token, id, tier, status)),
                _ => None,
            };
            match parsed {
                Some((token, id, tier, status)) => {
                    resolver.sessions.insert(
                        token.to_string(),
                        AuthUser {
                            id,
                            subscription_tier: tier,
                            subscription_status: status,
                        },
                    );
                }
                None => warn!(
                    target = "crosslist.security",
                    "ignored malformed DEMO_SESSIONS entry"
                ),
            }
        }
        resolver
    }

    pub fn from_env() -> Self {
        let resolver = Self::parse(&std::env::var("DEMO_SESSIONS").unwrap_or_default());
        info!(
            target = "crosslist.security",
            session_count = resolver.len(),
            "loaded demo sessions"
        );
        resolver
    }
}

#[async_trait]
impl SessionResolver for StaticSessionResolver {
    async fn resolve(&self, token: &str) -> Result<Option<AuthUser>, StoreError> {
        Ok(self.sessions.get(token).cloned())
    }
}

/// Supabase Auth plus the `users` row carrying subscription state.
#[derive(Clone)]
pub struct SupabaseSessionResolver {
    client: SupabaseClient,
}

impl SupabaseSessionResolver {
    pub fn new(client: SupabaseClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SessionResolver for SupabaseSessionResolver {
    async fn resolve(&self, token: &str) -> Result<Option<AuthUser>, StoreError> {
        let Some(record) = self.client.fetch_auth_user(token).await? else {
            return Ok(None);
        };
        // A user without a subscription row may authenticate but cannot cross-list.
        let (subscription_tier, subscription_status) =
            match self.client.fetch_subscription(record.id).await? {
                Some(sub) => (sub.subscription_tier, sub.subscription_status),
                None => (SubscriptionTier::Trial, SubscriptionStatus::Incomplete),
            };
        Ok(Some(AuthUser {
            id: record.id,
            subscription_tier,
            subscription_status,
        }))
    }
}

#[derive(Clone)]
pub struct AuthState {
    resolver: Arc<dyn SessionResolver>,
    limiter: FixedWindowLimiter,
    lockout: LockoutGuard,
}

impl AuthState {
    pub fn new(
        resolver: Arc<dyn SessionResolver>,
        limiter: FixedWindowLimiter,
        lockout: LockoutGuard,
    ) -> Self {
        Self {
            resolver,
            limiter,
            lockout,
        }
    }
}

pub async fn require_auth(
    State(state): State<AuthState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, Infallible> {
    let client = client_key(request.headers());

    match state.lockout.locked_for(&client).await {
        Ok(Some(retry_after)) => return Ok(locked_out(retry_after)),
        Ok(None) => {}
        Err(err) => warn!(target = "crosslist.security", error = %err, "lockout_check_unavailable"),
    }

    let Some(token) = extract_bearer(request.headers()) else {
        return Ok(CrossListError::unauthorized(
            "missing_token",
            "Provide an Authorization: Bearer <token> header",
        )
        .into_response());
    };

    let user = match state.resolver.resolve(&token).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            warn!(target = "crosslist.security", client = %client, "invalid_token");
            return Ok(match state.lockout.record_failure(&client).await {
                Ok(Some(retry_after)) => locked_out(retry_after),
                Ok(None) => invalid_token(),
                Err(err) => {
                    warn!(target = "crosslist.security", error = %err, "lockout_record_unavailable");
                    invalid_token()
                }
            });
        }
        Err(err) => {
            return Ok(CrossListError::internal("auth_unavailable", err.to_string()).into_response());
        }
    };

    if let Err(err) = state.lockout.clear(&client).await {
        warn!(target = "crosslist.security", error = %err, "lockout_clear_unavailable");
    }

    let decision = match state.limiter.check(&user.id.to_string()).await {
        Ok(decision) => Some(decision),
        Err(err) => {
            warn!(target = "crosslist.security", error = %err, "rate_limit_unavailable");
            None
        }
    };
    if let Some(decision) = decision.filter(|d| !d.allowed) {
        let mut response = CrossListError::rate_limited(
            "rate_limited",
            "Too many requests",
            decision.reset_secs.max(1),
        )
        .into_response();
        decision.apply_headers(response.headers_mut());
        return Ok(response);
    }

    request.extensions_mut().insert(user);
    let mut response = next.run(request).await;
    if let Some(decision) = decision {
        decision.apply_headers(response.headers_mut());
    }
    Ok(response)
}

fn invalid_token() -> Response {
    CrossListError::unauthorized("invalid_token", "Token not recognized").into_response()
}

fn locked_out(retry_after: u64) -> Response {
    CrossListError::rate_limited(
        "too_many_failed_attempts",
        "Too many failed authentication attempts; try again later",
        retry_after,
    )
    .into_response()
}

fn extract_bearer(headers: &http::HeaderMap) -> Option<String> {
    let raw = headers.get(http::header::AUTHORIZATION)?.to_str().ok()?;
    if raw.len() < 7 || !raw[..6].eq_ignore_ascii_case("bearer") {
        return None;
    }
    Some(raw[6..].trim().to_string()).filter(|token| !token.is_empty())
}

/// Address used for lockout bookkeeping: first `X-Forwarded-For` hop, then
/// `X-Real-IP`, else a shared bucket.
pub fn client_key(headers: &http::HeaderMap) -> String {
    headers
        .get("X-Forwarded-For")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .or_else(|| headers.get("X-Real-IP").and_then(|value| value.to_str().ok()))
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or("anonymous")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn parses_demo_sessions() {
        let id = Uuid::new_v4();
        let resolver = StaticSessionResolver::parse(&format!(
            "tok-1:{id}:professional:active, broken-entry ,tok-2:not-a-uuid:trial:active"
        ));
        assert_eq!(resolver.len(), 1);
        let user = &resolver.sessions["tok-1"];
        assert_eq!(user.id, id);
        assert_eq!(user.subscription_tier, SubscriptionTier::Professional);
        assert_eq!(user.subscription_status, SubscriptionStatus::Active);
    }

    #[test]
    fn client_key_prefers_forwarded_for() {
        let mut headers = http::HeaderMap::new();
        assert_eq!(client_key(&headers), "anonymous");
        headers.insert("X-Real-IP", HeaderValue::from_static("10.1.1.1"));
        assert_eq!(client_key(&headers), "10.1.1.1");
        headers.insert(
            "X-Forwarded-For",
            HeaderValue::from_static("203.0.113.9, 10.0.0.1"),
        );
        assert_eq!(client_key(&headers), "203.0.113.9");
    }

    #[test]
    fn bearer_extraction_is_case_insensitive() {
        let mut headers = http::HeaderMap::new();
        headers.insert(
            http::header::AUTHORIZATION,
            HeaderValue::from_static("bearer abc123"),
        );
        assert_eq!(extract_bearer(&headers).as_deref(), Some("abc123"));
        headers.insert(http::header::AUTHORIZATION, HeaderValue::from_static("Basic xyz"));
        assert_eq!(extract_bearer(&headers), None);
    }
}
