use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use regex::Regex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use tokio::sync::RwLock;

use super::events::{EventHub, Subscription};
use super::{ServiceError, ValidationError};
use crate::models::auth::{AuthResponse, Credentials, Registration, TokenClaims, User};
use crate::repositories::api::{BackendApi, TokenSource};
use crate::repositories::storage::{
    clear_user_data, get_json, set_json, KeyValueStore, StoreError, TOKEN_KEY, USER_KEY,
};

const MIN_PASSWORD_LEN: usize = 6;

#[derive(Clone, Debug, PartialEq)]
pub struct Session {
    pub token: String,
    pub user: User,
}

#[derive(Clone, Debug, PartialEq)]
pub enum SessionEvent {
    SignedIn(User),
    SignedOut,
}

// ============= Token helpers =============

/// Reads the claims of a JWT without verifying its signature.
pub fn decode_claims(token: &str) -> Option<TokenClaims> {
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .ok()?;
    serde_json::from_slice(&bytes).ok()
}

/// A token without a readable `exp` claim counts as expired.
pub fn token_expired_at(token: &str, now: DateTime<Utc>) -> bool {
    match decode_claims(token).and_then(|claims| claims.exp) {
        Some(exp) => exp < now.timestamp(),
        None => true,
    }
}

pub fn is_token_expired(token: &str) -> bool {
    token_expired_at(token, Utc::now())
}

// ============= Validation =============

fn email_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("static pattern"))
}

pub fn validate_login(credentials: &Credentials) -> Result<(), ValidationError> {
    if credentials.email.trim().is_empty() || credentials.password.is_empty() {
        return Err(ValidationError::EmptyFields);
    }
    if !email_pattern().is_match(credentials.email.trim()) {
        return Err(ValidationError::InvalidEmail);
    }
    Ok(())
}

pub fn validate_registration(registration: &Registration) -> Result<(), ValidationError> {
    if registration.email.trim().is_empty()
        || registration.password.is_empty()
        || registration.confirm_password.is_empty()
    {
        return Err(ValidationError::EmptyFields);
    }
    if !email_pattern().is_match(registration.email.trim()) {
        return Err(ValidationError::InvalidEmail);
    }
    if registration.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ValidationError::PasswordTooShort);
    }
    if registration.password != registration.confirm_password {
        return Err(ValidationError::PasswordMismatch);
    }
    Ok(())
}

// ============= Session state =============

pub struct SessionState {
    store: Arc<dyn KeyValueStore>,
    current: RwLock<Option<Session>>,
    events: EventHub<SessionEvent>,
    torn_down: AtomicBool,
}

impl SessionState {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            current: RwLock::new(None),
            events: EventHub::new(),
            torn_down: AtomicBool::new(false),
        }
    }

    pub async fn current(&self) -> Option<Session> {
        self.current.read().await.clone()
    }

    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&SessionEvent) + Send + Sync + 'static,
    {
        self.events.subscribe(listener)
    }

    async fn restore(&self) -> Result<Option<Session>, StoreError> {
        let token = self.store.get(TOKEN_KEY).await?;
        let user: Option<User> = match get_json(self.store.as_ref(), USER_KEY).await {
            Ok(user) => user,
            Err(e) => {
                log::warn!("Stored user is unreadable: {}", e);
                None
            }
        };

        let (Some(token), Some(user)) = (token, user) else {
            log::info!("No stored session.");
            return Ok(None);
        };

        if is_token_expired(&token) {
            log::info!("Stored session for {} has expired.", user.email);
            self.purge().await;
            return Ok(None);
        }

        let session = Session { token, user };
        *self.current.write().await = Some(session.clone());
        self.events.publish(&SessionEvent::SignedIn(session.user.clone()));
        Ok(Some(session))
    }

    async fn establish(&self, auth: AuthResponse) -> Result<Session, StoreError> {
        clear_user_data(self.store.as_ref()).await;
        self.store.set(TOKEN_KEY, &auth.access_token).await?;
        set_json(self.store.as_ref(), USER_KEY, &auth.user).await?;

        let session = Session {
            token: auth.access_token,
            user: auth.user,
        };
        *self.current.write().await = Some(session.clone());

        log::info!("Signed in as {}", session.user.email);
        self.events.publish(&SessionEvent::SignedIn(session.user.clone()));
        Ok(session)
    }

    async fn purge(&self) {
        for key in [TOKEN_KEY, USER_KEY] {
            if let Err(e) = self.store.remove(key).await {
                log::error!("Could not remove {}: {}", key, e);
            }
        }
        clear_user_data(self.store.as_ref()).await;

        let previous = self.current.write().await.take();
        if let Some(session) = previous {
            log::info!("Signed out {}", session.user.email);
            self.events.publish(&SessionEvent::SignedOut);
        }
    }
}

#[async_trait]
impl TokenSource for SessionState {
    async fn bearer_token(&self) -> Option<String> {
        if self.torn_down.load(Ordering::Acquire) {
            return None;
        }

        let token = self.current.read().await.as_ref()?.token.clone();
        if is_token_expired(&token) {
            log::warn!("Session token expired, signing out.");
            self.purge().await;
            return None;
        }
        Some(token)
    }

    async fn on_unauthorized(&self) {
        self.purge().await;
    }
}

// ============= Service =============

pub struct SessionService {
    state: Arc<SessionState>,
    api: BackendApi,
}

impl SessionService {
    pub fn new(state: Arc<SessionState>, api: BackendApi) -> Self {
        Self { state, api }
    }

    pub fn state(&self) -> &Arc<SessionState> {
        &self.state
    }

    pub async fn init(&self) -> Result<Option<Session>, ServiceError> {
        Ok(self.state.restore().await?)
    }

    pub async fn login(&self, credentials: Credentials) -> Result<Session, ServiceError> {
        validate_login(&credentials)?;

        let credentials = Credentials {
            email: credentials.email.trim().to_string(),
            password: credentials.password,
        };
        let auth = self.api.login(&credentials).await?;
        Ok(self.state.establish(auth).await?)
    }

    pub async fn register(&self, registration: Registration) -> Result<Session, ServiceError> {
        validate_registration(&registration)?;

        let credentials = Credentials {
            email: registration.email.trim().to_string(),
            password: registration.password,
        };
        let auth = self.api.register(&credentials).await?;
        Ok(self.state.establish(auth).await?)
    }

    /// Logs out on the server. Local data is only dropped once the server
    /// confirms; otherwise the session stays as it was.
    pub async fn logout(&self) -> Result<(), ServiceError> {
        if self.state.current().await.is_none() {
            return Err(ServiceError::NotSignedIn);
        }

        let response = self.api.logout().await?;
        if !response.success {
            let message = response
                .message
                .unwrap_or_else(|| "server refused to log out".to_string());
            log::error!("Logout rejected: {}", message);
            return Err(ServiceError::Logout(message));
        }

        if let Some(deleted) = response.deleted_tokens {
            log::info!("Server removed {} push tokens.", deleted);
        }
        self.state.purge().await;
        Ok(())
    }

    pub async fn invalidate(&self) {
        self.state.purge().await;
    }

    pub fn teardown(&self) {
        self.state.torn_down.store(true, Ordering::Release);
        self.state.events.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::storage::{expenses_key, MemoryStore, PRELOAD_KEY};
    use std::sync::Mutex;

    fn jwt(exp: Option<i64>) -> String {
        let claims = match exp {
            Some(exp) => serde_json::json!({ "sub": "1", "exp": exp }),
            None => serde_json::json!({ "sub": "1" }),
        };
        format!(
            "{}.{}.sig",
            URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#),
            URL_SAFE_NO_PAD.encode(claims.to_string())
        )
    }

    fn user() -> User {
        User {
            id: "42".to_string(),
            email: "ana@example.com".to_string(),
        }
    }

    #[test]
    fn expiry_reads_exp_claim() {
        let now = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        assert!(!token_expired_at(&jwt(Some(1_700_000_100)), now));
        assert!(!token_expired_at(&jwt(Some(1_700_000_000)), now));
        assert!(token_expired_at(&jwt(Some(1_699_999_999)), now));
        assert!(token_expired_at(&jwt(None), now));
        assert!(token_expired_at("not-a-jwt", now));
        assert!(token_expired_at("a.%%%.c", now));
    }

    #[test]
    fn padded_payload_is_accepted() {
        let token = jwt(Some(4_000_000_000));
        let mut parts: Vec<String> = token.split('.').map(str::to_string).collect();
        parts[1].push_str("==");
        assert_eq!(decode_claims(&parts.join(".")).unwrap().exp, Some(4_000_000_000));
    }

    #[test]
    fn login_validation() {
        let login = |email: &str, password: &str| {
            validate_login(&Credentials {
                email: email.to_string(),
                password: password.to_string(),
            })
        };
        assert_eq!(login("", "secret"), Err(ValidationError::EmptyFields));
        assert_eq!(login("ana@example.com", ""), Err(ValidationError::EmptyFields));
        assert_eq!(login("ana@example", "secret"), Err(ValidationError::InvalidEmail));
        assert_eq!(login("ana @x.com", "secret"), Err(ValidationError::InvalidEmail));
        assert_eq!(login(" ana@example.com ", "abc"), Ok(()));
    }

    #[test]
    fn registration_validation() {
        let register = |email: &str, password: &str, confirm: &str| {
            validate_registration(&Registration {
                email: email.to_string(),
                password: password.to_string(),
                confirm_password: confirm.to_string(),
            })
        };
        assert_eq!(register("a@b.co", "secret", ""), Err(ValidationError::EmptyFields));
        assert_eq!(register("a@b", "secret", "secret"), Err(ValidationError::InvalidEmail));
        assert_eq!(register("a@b.co", "12345", "12345"), Err(ValidationError::PasswordTooShort));
        assert_eq!(register("a@b.co", "123456", "123457"), Err(ValidationError::PasswordMismatch));
        assert_eq!(register("a@b.co", "123456", "123456"), Ok(()));
    }

    #[tokio::test]
    async fn establish_clears_previous_user_data() {
        let store = Arc::new(MemoryStore::new());
        store.set(&expenses_key(2025, 1), "{}").await.unwrap();
        store.set(PRELOAD_KEY, "true").await.unwrap();

        let state = SessionState::new(store.clone());
        let events = Arc::new(Mutex::new(Vec::new()));
        let _subscription = {
            let events = events.clone();
            state.subscribe(move |e| events.lock().unwrap().push(e.clone()))
        };

        let token = jwt(Some(Utc::now().timestamp() + 3600));
        state
            .establish(AuthResponse {
                access_token: token.clone(),
                user: user(),
            })
            .await
            .unwrap();

        let mut keys = store.keys().await.unwrap();
        keys.sort();
        assert_eq!(keys, vec![TOKEN_KEY.to_string(), USER_KEY.to_string()]);
        assert_eq!(state.bearer_token().await, Some(token));
        assert_eq!(*events.lock().unwrap(), vec![SessionEvent::SignedIn(user())]);
    }

    #[tokio::test]
    async fn restore_keeps_valid_and_purges_expired_sessions() {
        let store = Arc::new(MemoryStore::new());
        let valid = jwt(Some(Utc::now().timestamp() + 3600));
        store.set(TOKEN_KEY, &valid).await.unwrap();
        set_json(store.as_ref(), USER_KEY, &user()).await.unwrap();

        let state = SessionState::new(store.clone());
        let restored = state.restore().await.unwrap().unwrap();
        assert_eq!(restored.token, valid);

        let store = Arc::new(MemoryStore::new());
        store
            .set(TOKEN_KEY, &jwt(Some(Utc::now().timestamp() - 10)))
            .await
            .unwrap();
        set_json(store.as_ref(), USER_KEY, &user()).await.unwrap();
        store.set(&expenses_key(2025, 1), "{}").await.unwrap();

        let state = SessionState::new(store.clone());
        assert_eq!(state.restore().await.unwrap(), None);
        assert!(store.keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unauthorized_signs_out_and_notifies() {
        let store = Arc::new(MemoryStore::new());
        let state = SessionState::new(store.clone());
        state
            .establish(AuthResponse {
                access_token: jwt(Some(Utc::now().timestamp() + 3600)),
                user: user(),
            })
            .await
            .unwrap();

        let events = Arc::new(Mutex::new(Vec::new()));
        let _subscription = {
            let events = events.clone();
            state.subscribe(move |e| events.lock().unwrap().push(e.clone()))
        };

        state.on_unauthorized().await;
        // A second purge has no session left to announce.
        state.on_unauthorized().await;

        assert_eq!(state.current().await, None);
        assert_eq!(state.bearer_token().await, None);
        assert!(store.get(TOKEN_KEY).await.unwrap().is_none());
        assert_eq!(*events.lock().unwrap(), vec![SessionEvent::SignedOut]);
    }

    #[tokio::test]
    async fn expired_token_is_never_handed_out() {
        let state = SessionState::new(Arc::new(MemoryStore::new()));
        *state.current.write().await = Some(Session {
            token: jwt(Some(Utc::now().timestamp() - 1)),
            user: user(),
        });

        assert_eq!(state.bearer_token().await, None);
        assert_eq!(state.current().await, None);
    }

    #[tokio::test]
    async fn teardown_stops_tokens_and_listeners() {
        let state = Arc::new(SessionState::new(Arc::new(MemoryStore::new())));
        let api = BackendApi::new("http://127.0.0.1:9", state.clone());
        let service = SessionService::new(state.clone(), api);

        state
            .establish(AuthResponse {
                access_token: jwt(Some(Utc::now().timestamp() + 3600)),
                user: user(),
            })
            .await
            .unwrap();
        let _subscription = state.subscribe(|_| {});

        service.teardown();
        assert_eq!(state.bearer_token().await, None);
        assert_eq!(state.events.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn invalid_input_never_reaches_the_network() {
        let state = Arc::new(SessionState::new(Arc::new(MemoryStore::new())));
        let api = BackendApi::new("http://127.0.0.1:9", state.clone());
        let service = SessionService::new(state, api);

        let result = service
            .login(Credentials {
                email: "nobody".to_string(),
                password: "x".to_string(),
            })
            .await;
        assert!(matches!(
            result,
            Err(ServiceError::Validation(ValidationError::InvalidEmail))
        ));

        assert!(matches!(service.logout().await, Err(ServiceError::NotSignedIn)));
    }
}
