//! Session manager: owns the credential and identity lifecycle.
//!
//! ```text
//!   start ──(stored credential)──▶ Restoring ──(identity ok)──▶ Authenticated
//!     │                               │                              │
//!     └──(nothing stored)──▶ Unauthenticated ◀──(fetch fails)────────┤
//!                                     ▲                              │
//!                                     └──────────(logout / 401)──────┘
//! ```
//!
//! Restoring is fail-safe: any identity fetch failure clears the stored
//! credential. There is no retry and a stale identity is never kept.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tracing::{info, warn};

use crate::credentials::{Credential, CredentialError, CredentialHandle, CredentialStore};
use crate::models::{AuthToken, Identity, UserCreate};
use crate::transport::{Transport, TransportError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Restoring,
    Authenticated,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Storage(#[from] CredentialError),
}

impl SessionError {
    pub fn display_message(&self) -> String {
        match self {
            SessionError::Transport(e) => e.display_message(),
            SessionError::Storage(_) => "Could not access saved login".to_string(),
        }
    }
}

pub struct SessionManager {
    transport: Transport,
    store: Arc<dyn CredentialStore>,
    state: SessionState,
    identity: Option<Identity>,
}

impl SessionManager {
    /// Build the manager from durable storage. A stored credential puts the
    /// session in `Restoring`; call [`SessionManager::restore`] to settle it.
    pub fn new(transport: Transport, store: Arc<dyn CredentialStore>) -> Result<Self, SessionError> {
        let state = match store.load()? {
            Some(credential) => {
                transport.credentials().set(credential);
                SessionState::Restoring
            }
            None => SessionState::Unauthenticated,
        };

        Ok(Self {
            transport,
            store,
            state,
            identity: None,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    /// True only while a stored credential is being verified.
    pub fn is_loading(&self) -> bool {
        self.state == SessionState::Restoring
    }

    pub fn is_authenticated(&self) -> bool {
        self.state == SessionState::Authenticated
    }

    pub fn credentials(&self) -> &CredentialHandle {
        self.transport.credentials()
    }

    /// Settle a `Restoring` session. Any other state is returned unchanged.
    pub async fn restore(&mut self) -> SessionState {
        if self.state != SessionState::Restoring {
            return self.state;
        }

        let expired = self
            .credentials()
            .current()
            .map(|c| c.is_expired_at(Utc::now()))
            .unwrap_or(true);
        if expired {
            info!("stored credential is expired, clearing session");
            self.invalidate();
            return self.state;
        }

        if let Err(e) = self.fetch_identity().await {
            warn!(error = %e, "failed to restore session, clearing credential");
            self.invalidate();
        }
        self.state
    }

    /// Exchange username/password for a credential, persist it, then load the identity.
    pub async fn login(&mut self, username: &str, password: &str) -> Result<Identity, SessionError> {
        let fields = vec![
            ("username".to_string(), username.to_string()),
            ("password".to_string(), password.to_string()),
        ];
        let token: AuthToken = self.transport.post_form("/auth/login", fields).await?;

        let credential = Credential::new(token.access_token);
        self.store.save(&credential)?;
        self.transport.credentials().set(credential);
        self.identity = None;
        self.state = SessionState::Restoring;

        match self.fetch_identity().await {
            Ok(identity) => {
                info!(username = %identity.username, "login succeeded");
                Ok(identity)
            }
            Err(e) => {
                warn!(error = %e, "identity fetch after login failed, clearing credential");
                self.invalidate();
                Err(e.into())
            }
        }
    }

    /// Create the account, then log in with the same credentials.
    ///
    /// The registration response is not trusted for identity; the profile is
    /// always refetched by the login that follows. A login failure after a
    /// successful registration is returned as is; the account stays created.
    pub async fn register(&mut self, user: &UserCreate) -> Result<Identity, SessionError> {
        let _created: Value = self.transport.post("/auth/register", user).await?;
        info!(username = %user.username, "account registered");
        self.login(&user.username, &user.password).await
    }

    /// Unconditionally end the session. Never fails.
    pub fn logout(&mut self) {
        info!("logging out");
        self.invalidate();
    }

    /// Drop the session when the backend rejected the credential.
    /// Returns true when the error was an auth rejection.
    pub fn handle_rejection(&mut self, error: &TransportError) -> bool {
        if error.is_unauthorized() && self.state != SessionState::Unauthenticated {
            warn!("backend rejected credential, ending session");
            self.invalidate();
            return true;
        }
        false
    }

    async fn fetch_identity(&mut self) -> Result<Identity, TransportError> {
        let identity: Identity = self.transport.get("/auth/me").await?;
        self.identity = Some(identity.clone());
        self.state = SessionState::Authenticated;
        Ok(identity)
    }

    fn invalidate(&mut self) {
        if let Err(e) = self.store.clear() {
            warn!(error = %e, "failed to clear stored credential");
        }
        self.transport.credentials().clear();
        self.identity = None;
        self.state = SessionState::Unauthenticated;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::{MemoryCredentialStore, MockCredentialStore};
    use crate::scripted::ScriptedBackend;
    use crate::transport::{Body, Method};
    use serde_json::json;

    fn identity_json() -> Value {
        json!({
            "id": "u1",
            "username": "kira",
            "email": "kira@example.com",
            "traits": {"openness": 6, "conscientiousness": 5, "extraversion": 4,
                       "agreeableness": 7, "neuroticism": 3},
            "created_at": "2024-01-01T00:00:00"
        })
    }

    fn setup(
        store: Arc<dyn CredentialStore>,
    ) -> (SessionManager, Arc<ScriptedBackend>) {
        let backend = Arc::new(ScriptedBackend::new());
        let transport = Transport::new(backend.clone(), CredentialHandle::new());
        (SessionManager::new(transport, store).unwrap(), backend)
    }

    #[test]
    fn test_initial_state_without_credential() {
        let (session, _) = setup(Arc::new(MemoryCredentialStore::new()));
        assert_eq!(session.state(), SessionState::Unauthenticated);
        assert!(!session.is_loading());
        assert!(session.identity().is_none());
    }

    #[test]
    fn test_initial_state_with_credential() {
        let store = Arc::new(MemoryCredentialStore::with_credential(Credential::new("tok1")));
        let (session, _) = setup(store);
        assert_eq!(session.state(), SessionState::Restoring);
        assert!(session.is_loading());
        assert!(session.credentials().is_present());
    }

    #[tokio::test]
    async fn test_login_scenario() {
        let store = Arc::new(MemoryCredentialStore::new());
        let (mut session, backend) = setup(store.clone());
        backend
            .respond(
                Method::Post,
                "/auth/login",
                200,
                json!({"access_token": "tok1", "token_type": "bearer"}),
            )
            .respond(Method::Get, "/auth/me", 200, identity_json());

        let identity = session.login("kira", "zen123").await.unwrap();
        assert_eq!(identity.id, "u1");
        assert_eq!(identity.traits.openness, 6.0);
        assert_eq!(session.state(), SessionState::Authenticated);
        assert_eq!(session.identity().unwrap().username, "kira");
        assert_eq!(store.load().unwrap(), Some(Credential::new("tok1")));

        let requests = backend.requests();
        assert_eq!(requests[0].bearer, None);
        assert_eq!(
            requests[0].body,
            Body::Form(vec![
                ("username".into(), "kira".into()),
                ("password".into(), "zen123".into())
            ])
        );
        assert_eq!(requests[1].bearer.as_deref(), Some("tok1"));
    }

    #[tokio::test]
    async fn test_login_failure_stores_nothing() {
        let store = Arc::new(MemoryCredentialStore::new());
        let (mut session, backend) = setup(store.clone());
        backend.respond(
            Method::Post,
            "/auth/login",
            401,
            json!({"detail": "Incorrect username or password"}),
        );

        let err = session.login("kira", "wrong").await.unwrap_err();
        assert_eq!(err.display_message(), "Incorrect username or password");
        assert_eq!(session.state(), SessionState::Unauthenticated);
        assert!(store.load().unwrap().is_none());
        assert_eq!(backend.calls(Method::Get, "/auth/me"), 0);
    }

    #[tokio::test]
    async fn test_login_identity_failure_invalidates() {
        let store = Arc::new(MemoryCredentialStore::new());
        let (mut session, backend) = setup(store.clone());
        backend
            .respond(Method::Post, "/auth/login", 200, json!({"access_token": "tok1", "token_type": "bearer"}))
            .fail(Method::Get, "/auth/me", TransportError::Timeout);

        assert!(session.login("kira", "zen123").await.is_err());
        assert_eq!(session.state(), SessionState::Unauthenticated);
        assert!(!session.credentials().is_present());
        assert!(store.load().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_restore_success() {
        let store = Arc::new(MemoryCredentialStore::with_credential(Credential::new("tok1")));
        let (mut session, backend) = setup(store);
        backend.respond(Method::Get, "/auth/me", 200, identity_json());

        assert_eq!(session.restore().await, SessionState::Authenticated);
        assert_eq!(session.identity().unwrap().id, "u1");
        assert!(!session.is_loading());
    }

    #[tokio::test]
    async fn test_restore_failure_clears_credential() {
        let store = Arc::new(MemoryCredentialStore::with_credential(Credential::new("tok1")));
        let (mut session, backend) = setup(store.clone());
        backend.respond(Method::Get, "/auth/me", 401, json!({"detail": "Could not validate credentials"}));

        assert_eq!(session.restore().await, SessionState::Unauthenticated);
        assert!(session.identity().is_none());
        assert!(store.load().unwrap().is_none());
        assert!(!session.credentials().is_present());
    }

    #[tokio::test]
    async fn test_restore_network_failure_clears_credential() {
        let store = Arc::new(MemoryCredentialStore::with_credential(Credential::new("tok1")));
        let (mut session, backend) = setup(store.clone());
        backend.fail(Method::Get, "/auth/me", TransportError::Network("connection refused".into()));

        assert_eq!(session.restore().await, SessionState::Unauthenticated);
        assert!(store.load().unwrap().is_none());
        // No retry loop
        assert_eq!(backend.calls(Method::Get, "/auth/me"), 1);
    }

    #[tokio::test]
    async fn test_restore_is_noop_when_not_restoring() {
        let (mut session, backend) = setup(Arc::new(MemoryCredentialStore::new()));
        assert_eq!(session.restore().await, SessionState::Unauthenticated);
        assert!(backend.requests().is_empty());
    }

    #[tokio::test]
    async fn test_logout_then_fresh_start_stays_logged_out() {
        let store = Arc::new(MemoryCredentialStore::with_credential(Credential::new("tok1")));
        let (mut session, backend) = setup(store.clone());
        backend.respond(Method::Get, "/auth/me", 200, identity_json());
        session.restore().await;
        session.logout();
        assert_eq!(session.state(), SessionState::Unauthenticated);
        assert!(session.identity().is_none());

        let (mut fresh, fresh_backend) = setup(store);
        assert_eq!(fresh.restore().await, SessionState::Unauthenticated);
        assert!(fresh.identity().is_none());
        assert!(fresh_backend.requests().is_empty());
    }

    #[tokio::test]
    async fn test_register_then_login() {
        let (mut session, backend) = setup(Arc::new(MemoryCredentialStore::new()));
        backend
            .respond(Method::Post, "/auth/register", 200, json!({"id": "u1", "username": "kira"}))
            .respond(Method::Post, "/auth/login", 200, json!({"access_token": "tok1", "token_type": "bearer"}))
            .respond(Method::Get, "/auth/me", 200, identity_json());

        let user = UserCreate {
            username: "kira".into(),
            email: "kira@example.com".into(),
            password: "zen123".into(),
            traits: None,
        };
        let identity = session.register(&user).await.unwrap();
        assert_eq!(identity.email, "kira@example.com");
        assert_eq!(backend.calls(Method::Get, "/auth/me"), 1);
    }

    #[tokio::test]
    async fn test_register_ok_login_fails() {
        let (mut session, backend) = setup(Arc::new(MemoryCredentialStore::new()));
        backend
            .respond(Method::Post, "/auth/register", 200, json!({"id": "u1"}))
            .respond(Method::Post, "/auth/login", 500, json!({"detail": "Database unavailable"}));

        let user = UserCreate {
            username: "kira".into(),
            email: "kira@example.com".into(),
            password: "zen123".into(),
            traits: None,
        };
        let err = session.register(&user).await.unwrap_err();
        assert_eq!(err.display_message(), "Database unavailable");
        assert_eq!(backend.calls(Method::Post, "/auth/register"), 1);
        assert_eq!(session.state(), SessionState::Unauthenticated);
    }

    #[tokio::test]
    async fn test_expired_jwt_skips_fetch() {
        use jsonwebtoken::{encode, EncodingKey, Header};
        let token = encode(
            &Header::default(),
            &json!({"sub": "kira", "exp": 1_000_000}),
            &EncodingKey::from_secret(b"s"),
        )
        .unwrap();
        let store = Arc::new(MemoryCredentialStore::with_credential(Credential::new(token)));
        let (mut session, backend) = setup(store.clone());

        assert_eq!(session.restore().await, SessionState::Unauthenticated);
        assert!(backend.requests().is_empty());
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_logout_never_fails_on_storage_error() {
        let mut store = MockCredentialStore::new();
        store.expect_load().returning(|| Ok(Some(Credential::new("tok1"))));
        store.expect_clear().times(1).returning(|| {
            Err(CredentialError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "read-only",
            )))
        });
        let (mut session, _) = setup(Arc::new(store));

        session.logout();
        assert_eq!(session.state(), SessionState::Unauthenticated);
        assert!(!session.credentials().is_present());
    }

    #[tokio::test]
    async fn test_login_save_failure_does_not_activate() {
        let mut store = MockCredentialStore::new();
        store.expect_load().returning(|| Ok(None));
        store.expect_save().returning(|_| {
            Err(CredentialError::Io(std::io::Error::new(std::io::ErrorKind::Other, "disk full")))
        });
        let (mut session, backend) = setup(Arc::new(store));
        backend.respond(Method::Post, "/auth/login", 200, json!({"access_token": "tok1", "token_type": "bearer"}));

        let err = session.login("kira", "zen123").await.unwrap_err();
        assert!(matches!(err, SessionError::Storage(_)));
        assert!(!session.credentials().is_present());
        assert_eq!(session.state(), SessionState::Unauthenticated);
    }

    #[tokio::test]
    async fn test_handle_rejection() {
        let store = Arc::new(MemoryCredentialStore::with_credential(Credential::new("tok1")));
        let (mut session, backend) = setup(store);
        backend.respond(Method::Get, "/auth/me", 200, identity_json());
        session.restore().await;

        assert!(!session.handle_rejection(&TransportError::Timeout));
        assert!(session.is_authenticated());

        let rejected = TransportError::Status { status: 401, detail: None };
        assert!(session.handle_rejection(&rejected));
        assert_eq!(session.state(), SessionState::Unauthenticated);
    }
}
