use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::auth::{AuthResponse, CookieTest, Credentials, LogoutResponse};
use crate::models::expenses::ExpensesResponse;
use crate::models::opaque_value;
use crate::models::speedtest::{SpeedtestHistory, SpeedtestSummary};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Unauthorized: session is no longer valid")]
    Unauthorized,
    #[error("Server returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error("Bad response format: {0}")]
    Decode(String),
}

#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn bearer_token(&self) -> Option<String>;
    async fn on_unauthorized(&self);
}

#[async_trait]
pub trait ExpenseSource: Send + Sync {
    async fn fetch_expenses(&self, month: u32, year: i32) -> Result<ExpensesResponse, ApiError>;
}

#[derive(Clone)]
pub struct BackendApi {
    url: String,
    client: reqwest::Client,
    tokens: Arc<dyn TokenSource>,
}

impl BackendApi {
    pub fn new(url: &str, tokens: Arc<dyn TokenSource>) -> Self {
        Self {
            url: url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
            tokens,
        }
    }

    // ============= Auth =============

    pub async fn login(&self, credentials: &Credentials) -> Result<AuthResponse, ApiError> {
        let request = self.client.post(self.endpoint("/auth/login")).json(credentials);
        decode(self.send(request, false).await?).await
    }

    pub async fn register(&self, credentials: &Credentials) -> Result<AuthResponse, ApiError> {
        let request = self
            .client
            .post(self.endpoint("/auth/register"))
            .json(credentials);
        decode(self.send(request, false).await?).await
    }

    pub async fn logout(&self) -> Result<LogoutResponse, ApiError> {
        let request = self.client.post(self.endpoint("/auth/logout"));
        decode(self.send(request, true).await?).await
    }

    // ============= Config =============

    pub async fn cookie(&self) -> Result<Option<String>, ApiError> {
        self.get_opaque("/config/factorial-cookie", "cookie").await
    }

    pub async fn set_cookie(&self, cookie: &str) -> Result<(), ApiError> {
        self.post_opaque("/config/factorial-cookie", json!({ "cookie": cookie }))
            .await
    }

    pub async fn test_cookie(&self) -> Result<CookieTest, ApiError> {
        let request = self.client.get(self.endpoint("/config/test-cookie"));
        decode(self.send(request, true).await?).await
    }

    pub async fn card(&self) -> Result<Option<String>, ApiError> {
        self.get_opaque("/config/card", "card").await
    }

    pub async fn set_card(&self, card: &str) -> Result<(), ApiError> {
        self.post_opaque("/config/card", json!({ "card": card })).await
    }

    // ============= Push notifications =============

    pub async fn register_push_token(&self, token: &str) -> Result<(), ApiError> {
        self.post_opaque("/notifications/register-token", json!({ "token": token }))
            .await
    }

    pub async fn unregister_push_token(&self, token: &str) -> Result<(), ApiError> {
        self.post_opaque("/notifications/unregister-token", json!({ "token": token }))
            .await
    }

    pub async fn push_token(&self) -> Result<Option<String>, ApiError> {
        self.get_opaque("/notifications/token", "token").await
    }

    // ============= Speedtest =============

    pub async fn speedtest_summary(&self) -> Result<SpeedtestSummary, ApiError> {
        let request = self.client.get(self.endpoint("/speedtest/summary"));
        decode(self.send(request, true).await?).await
    }

    pub async fn speedtest_history(
        &self,
        page: u32,
        page_size: u32,
    ) -> Result<SpeedtestHistory, ApiError> {
        let request = self
            .client
            .get(self.endpoint("/speedtest/history"))
            .query(&[("page", page), ("pageSize", page_size)]);
        decode(self.send(request, true).await?).await
    }

    // ============= Plumbing =============

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.url, path)
    }

    async fn get_opaque(&self, path: &str, key: &str) -> Result<Option<String>, ApiError> {
        let request = self.client.get(self.endpoint(path));
        let value: Value = decode(self.send(request, true).await?).await?;
        Ok(opaque_value(&value, key))
    }

    async fn post_opaque(&self, path: &str, body: Value) -> Result<(), ApiError> {
        let request = self.client.post(self.endpoint(path)).json(&body);
        self.send(request, true).await?;
        Ok(())
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        authenticated: bool,
    ) -> Result<reqwest::Response, ApiError> {
        let mut request = request.header("X-Request-Id", Uuid::new_v4().hyphenated().to_string());
        if authenticated {
            if let Some(token) = self.tokens.bearer_token().await {
                request = request.bearer_auth(token);
            }
        }

        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::UNAUTHORIZED && authenticated {
            log::warn!("Backend rejected the session token, signing out.");
            self.tokens.on_unauthorized().await;
            return Err(ApiError::Unauthorized);
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = error_message(&body)
                .or_else(|| status.canonical_reason().map(str::to_string))
                .unwrap_or_else(|| "unknown error".to_string());
            log::error!("Backend returned {}: {}", status, message);
            return Err(ApiError::Status {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response)
    }
}

#[async_trait]
impl ExpenseSource for BackendApi {
    async fn fetch_expenses(&self, month: u32, year: i32) -> Result<ExpensesResponse, ApiError> {
        let request = self
            .client
            .get(self.endpoint("/gastos"))
            .query(&[("month", month.to_string()), ("year", year.to_string())]);
        let response: ExpensesResponse = decode(self.send(request, true).await?).await?;

        log::debug!(
            "Fetched {} expenses for {}-{:02}",
            response.gastos.len(),
            year,
            month
        );
        Ok(response)
    }
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ApiError> {
    let text = response.text().await?;
    if text.trim().is_empty() {
        return serde_json::from_value(Value::Null).map_err(|e| ApiError::Decode(e.to_string()));
    }
    serde_json::from_str(&text).map_err(|e| ApiError::Decode(e.to_string()))
}

fn error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    value
        .get("message")
        .or_else(|| value.get("error"))
        .and_then(|m| m.as_str())
        .map(str::to_string)
}
