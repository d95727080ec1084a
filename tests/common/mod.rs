#![allow(dead_code)]

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use gastos::repositories::api::BackendApi;
use gastos::repositories::storage::MemoryStore;
use gastos::services::session::{SessionService, SessionState};

pub const EMAIL: &str = "ana@example.com";
pub const PASSWORD: &str = "hunter22";

/// Unsigned JWT expiring `seconds` from now.
pub fn jwt(seconds: i64) -> String {
    let claims = json!({ "sub": "7", "exp": Utc::now().timestamp() + seconds });
    format!(
        "{}.{}.signature",
        URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#),
        URL_SAFE_NO_PAD.encode(claims.to_string())
    )
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub state: Arc<SessionState>,
    pub api: BackendApi,
    pub session: SessionService,
}

impl Harness {
    pub fn new(server: &MockServer) -> Self {
        let store = Arc::new(MemoryStore::new());
        let state = Arc::new(SessionState::new(store.clone()));
        let api = BackendApi::new(&server.uri(), state.clone());
        let session = SessionService::new(state.clone(), api.clone());
        Self {
            store,
            state,
            api,
            session,
        }
    }

    /// Signs in through a mocked `/auth/login` and returns the token.
    pub async fn signed_in(server: &MockServer) -> (Self, String) {
        let harness = Self::new(server);
        let token = jwt(3600);

        Mock::given(method("POST"))
            .and(path("/auth/login"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": token,
                "user": { "id": 7, "email": EMAIL }
            })))
            .mount(server)
            .await;

        harness
            .session
            .login(gastos::models::auth::Credentials {
                email: EMAIL.to_string(),
                password: PASSWORD.to_string(),
            })
            .await
            .expect("login against mock server");

        (harness, token)
    }
}

pub fn month_body(month: u32, year: i32, ids: &[(&str, f64, &str)]) -> serde_json::Value {
    let gastos: Vec<_> = ids
        .iter()
        .map(|(id, amount, status)| {
            json!({
                "id": id,
                "merchant": format!("Shop {}", id),
                "amount": amount,
                "currency": "EUR",
                "date": format!("{}-{:02}-05T10:00:00Z", year, month),
                "status": status
            })
        })
        .collect();
    json!({ "year": year, "month": month, "count": gastos.len(), "gastos": gastos })
}
