//! Session state and the authentication store.
//!
//! Identity is always derived from the bearer token: the token's claims
//! segment is decoded on every read, and an expired token is treated
//! identically to an absent one everywhere. [`SessionShared`] is the
//! single process-wide state container, injected into the HTTP gateway
//! (which reads the token and clears the session on 401) and into the
//! stores that gate on identity.

use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, RwLock};
use tracing::{debug, info, warn};

use crate::api::{ApiError, HttpGateway};
use crate::cache::storage::{Storage, SESSION_KEY};
use crate::models::{
    AuthPayload, Identity, LoginRequest, ProfileUpdate, RegisterRequest, Role, User,
};

/// Persisted session blob: the token plus the server's user snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct PersistedSession {
    token: String,
    user: User,
}

/// Claims carried in the token payload.
#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
    #[serde(default)]
    role: Option<Role>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    exp: Option<i64>,
}

/// Decode the claims segment of a bearer token without verifying the
/// signature. Verification is the server's job; the client only needs
/// the claims and the expiry.
fn decode_identity(token: &str) -> Option<Identity> {
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    let claims: Claims = serde_json::from_slice(&bytes).ok()?;
    let expires_at = claims
        .exp
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single());
    Some(Identity {
        subject_id: claims.sub,
        role: claims.role.unwrap_or(Role::Student),
        email: claims.email,
        display_name: claims.name,
        expires_at,
    })
}

fn is_expired(identity: &Identity) -> bool {
    identity
        .expires_at
        .map(|expiry| expiry <= Utc::now())
        .unwrap_or(false)
}

/// Process-wide session state: token, persisted user snapshot, and the
/// identity stream. One instance per process, shared via `Arc`.
pub struct SessionShared {
    storage: Storage,
    state: RwLock<Option<PersistedSession>>,
    identity_tx: watch::Sender<Option<Identity>>,
}

impl SessionShared {
    /// Restore from durable storage. An expired or undecodable token is
    /// discarded as if absent, including its blob on disk.
    pub fn new(storage: Storage) -> Self {
        let restored: Option<PersistedSession> = match storage.load(SESSION_KEY) {
            Ok(session) => session,
            Err(e) => {
                warn!(error = %e, "Failed to restore persisted session");
                None
            }
        };
        let restored = restored.filter(|session| match decode_identity(&session.token) {
            Some(identity) if !is_expired(&identity) => true,
            _ => {
                debug!("Discarding expired or undecodable persisted token");
                if let Err(e) = storage.remove(SESSION_KEY) {
                    warn!(error = %e, "Failed to clear stale session blob");
                }
                false
            }
        });

        let initial = restored
            .as_ref()
            .and_then(|session| decode_identity(&session.token));
        if initial.is_some() {
            info!("Session restored from storage");
        }
        let (identity_tx, _) = watch::channel(initial);

        Self {
            storage,
            state: RwLock::new(restored),
            identity_tx,
        }
    }

    /// Current identity, recomputed from the token. Finding an expired
    /// or undecodable token clears the session as a side effect.
    pub async fn identity(&self) -> Option<Identity> {
        let decoded = {
            let state = self.state.read().await;
            state.as_ref().map(|session| decode_identity(&session.token))
        };
        match decoded {
            None => None,
            Some(Some(identity)) if !is_expired(&identity) => Some(identity),
            Some(_) => {
                debug!("Token expired, clearing session");
                self.clear().await;
                None
            }
        }
    }

    /// Bearer token when a live session exists.
    pub async fn token(&self) -> Option<String> {
        // Routed through identity() so the expiry check runs on every read.
        self.identity().await?;
        let state = self.state.read().await;
        state.as_ref().map(|session| session.token.clone())
    }

    /// Persisted user snapshot for the live session.
    pub async fn user(&self) -> Option<User> {
        self.identity().await?;
        let state = self.state.read().await;
        state.as_ref().map(|session| session.user.clone())
    }

    /// Install a fresh token and snapshot (login/register).
    pub async fn establish(&self, token: String, user: User) {
        let session = PersistedSession { token, user };
        if let Err(e) = self.storage.save(SESSION_KEY, &session) {
            warn!(error = %e, "Failed to persist session");
        }
        let identity = decode_identity(&session.token);
        *self.state.write().await = Some(session);
        self.identity_tx.send_replace(identity);
    }

    /// Swap only the token, keeping the snapshot (token refresh).
    pub async fn replace_token(&self, token: String) {
        let mut state = self.state.write().await;
        if let Some(session) = state.as_mut() {
            session.token = token;
            if let Err(e) = self.storage.save(SESSION_KEY, session) {
                warn!(error = %e, "Failed to persist refreshed session");
            }
            let identity = decode_identity(&session.token);
            self.identity_tx.send_replace(identity);
        }
    }

    /// Swap only the user snapshot (profile update).
    pub async fn replace_user(&self, user: User) {
        let mut state = self.state.write().await;
        if let Some(session) = state.as_mut() {
            session.user = user;
            if let Err(e) = self.storage.save(SESSION_KEY, session) {
                warn!(error = %e, "Failed to persist updated profile");
            }
        }
    }

    /// Drop the session everywhere. Idempotent.
    pub async fn clear(&self) {
        *self.state.write().await = None;
        if let Err(e) = self.storage.remove(SESSION_KEY) {
            warn!(error = %e, "Failed to clear persisted session");
        }
        self.identity_tx.send_replace(None);
    }

    /// Identity stream; replays the current value to new subscribers.
    pub fn subscribe(&self) -> watch::Receiver<Option<Identity>> {
        self.identity_tx.subscribe()
    }
}

/// Authentication operations and identity reads over [`SessionShared`].
pub struct SessionStore {
    gateway: HttpGateway,
    shared: Arc<SessionShared>,
}

impl SessionStore {
    pub(crate) fn new(gateway: HttpGateway, shared: Arc<SessionShared>) -> Self {
        Self { gateway, shared }
    }

    /// Log in and establish a session. A server rejection surfaces as
    /// [`ApiError::InvalidCredentials`]; transport failures pass through.
    pub async fn login(&self, email: &str, password: &str) -> Result<Identity, ApiError> {
        let payload: AuthPayload = self
            .gateway
            .post("/auth/login", &LoginRequest { email, password })
            .await
            .map_err(|e| match e {
                ApiError::Unauthenticated | ApiError::Validation(_) => {
                    ApiError::InvalidCredentials
                }
                other => other,
            })?;
        self.establish(payload).await
    }

    /// Register a new account. Server-side validation messages
    /// (duplicate email, malformed fields) surface verbatim.
    pub async fn register(&self, fields: &RegisterRequest) -> Result<Identity, ApiError> {
        let payload: AuthPayload = self.gateway.post("/auth/register", fields).await?;
        self.establish(payload).await
    }

    async fn establish(&self, payload: AuthPayload) -> Result<Identity, ApiError> {
        let identity = decode_identity(&payload.access_token)
            .filter(|identity| !is_expired(identity))
            .ok_or_else(|| {
                ApiError::InvalidResponse("undecodable or expired access token".to_string())
            })?;
        self.shared
            .establish(payload.access_token, payload.user)
            .await;
        info!(user = %identity.subject_id, "Session established");
        Ok(identity)
    }

    /// Swap the bearer token for a fresh one. A rejected refresh means
    /// the session is gone server-side, so it logs out before surfacing.
    pub async fn refresh_token(&self) -> Result<(), ApiError> {
        #[derive(Deserialize)]
        struct RefreshPayload {
            #[serde(rename = "accessToken", alias = "token")]
            access_token: String,
        }

        match self
            .gateway
            .post::<RefreshPayload, _>("/auth/refresh", &serde_json::json!({}))
            .await
        {
            Ok(payload) => {
                self.shared.replace_token(payload.access_token).await;
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Token refresh failed, logging out");
                self.shared.clear().await;
                Err(e)
            }
        }
    }

    /// Update the profile; the server's response replaces the persisted
    /// user snapshot.
    pub async fn update_profile(&self, changes: &ProfileUpdate) -> Result<User, ApiError> {
        let user: User = self.gateway.put("/auth/profile", changes).await?;
        self.shared.replace_user(user.clone()).await;
        Ok(user)
    }

    /// Clear the session unconditionally. Idempotent.
    pub async fn logout(&self) {
        self.shared.clear().await;
        info!("Logged out");
    }

    pub async fn current_identity(&self) -> Option<Identity> {
        self.shared.identity().await
    }

    pub async fn is_authenticated(&self) -> bool {
        self.shared.identity().await.is_some()
    }

    pub async fn role(&self) -> Option<Role> {
        self.shared.identity().await.map(|identity| identity.role)
    }

    pub async fn user_id(&self) -> Option<String> {
        self.shared
            .identity()
            .await
            .map(|identity| identity.subject_id)
    }

    /// Persisted user snapshot for profile display.
    pub async fn profile(&self) -> Option<User> {
        self.shared.user().await
    }

    /// Identity stream; replays the last value to new subscribers.
    pub fn subscribe(&self) -> watch::Receiver<Option<Identity>> {
        self.shared.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn token_with_exp(exp: Option<i64>) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
        let mut claims = serde_json::json!({
            "sub": "u1",
            "role": "student",
            "email": "u1@example.com",
            "name": "Test User"
        });
        if let Some(exp) = exp {
            claims["exp"] = serde_json::json!(exp);
        }
        let payload = URL_SAFE_NO_PAD.encode(claims.to_string().as_bytes());
        format!("{}.{}.signature", header, payload)
    }

    #[test]
    fn test_decode_identity_reads_claims() {
        let exp = (Utc::now() + Duration::hours(1)).timestamp();
        let identity = decode_identity(&token_with_exp(Some(exp))).unwrap();
        assert_eq!(identity.subject_id, "u1");
        assert_eq!(identity.role, Role::Student);
        assert_eq!(identity.email.as_deref(), Some("u1@example.com"));
        assert!(!is_expired(&identity));
    }

    #[test]
    fn test_expired_token_is_detected() {
        let exp = (Utc::now() - Duration::minutes(5)).timestamp();
        let identity = decode_identity(&token_with_exp(Some(exp))).unwrap();
        assert!(is_expired(&identity));
    }

    #[test]
    fn test_token_without_expiry_never_expires() {
        let identity = decode_identity(&token_with_exp(None)).unwrap();
        assert!(!is_expired(&identity));
    }

    #[test]
    fn test_garbage_token_decodes_to_none() {
        assert!(decode_identity("not-a-jwt").is_none());
        assert!(decode_identity("a.b.c").is_none());
        assert!(decode_identity("").is_none());
    }
}
