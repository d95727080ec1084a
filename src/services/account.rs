use super::{ServiceError, ValidationError};
use crate::models::auth::CookieTest;
use crate::models::speedtest::{SpeedtestHistory, SpeedtestSummary};
use crate::repositories::api::BackendApi;

pub struct AccountService {
    api: BackendApi,
}

fn required(value: &str) -> Result<&str, ValidationError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ValidationError::EmptyValue);
    }
    Ok(value)
}

impl AccountService {
    pub fn new(api: BackendApi) -> Self {
        Self { api }
    }

    pub async fn cookie(&self) -> Result<Option<String>, ServiceError> {
        Ok(self.api.cookie().await?)
    }

    pub async fn save_cookie(&self, cookie: &str) -> Result<(), ServiceError> {
        let cookie = required(cookie)?;
        self.api.set_cookie(cookie).await?;
        log::info!("Expense platform cookie updated.");
        Ok(())
    }

    pub async fn test_cookie(&self) -> Result<CookieTest, ServiceError> {
        let result = self.api.test_cookie().await?;
        if !result.success {
            log::warn!("Cookie test failed: {:?}", result.message);
        }
        Ok(result)
    }

    pub async fn card(&self) -> Result<Option<String>, ServiceError> {
        Ok(self.api.card().await?)
    }

    pub async fn save_card(&self, card: &str) -> Result<(), ServiceError> {
        let card = required(card)?;
        self.api.set_card(card).await?;
        log::info!("Card updated.");
        Ok(())
    }

    pub async fn register_push_token(&self, token: &str) -> Result<(), ServiceError> {
        let token = required(token)?;
        self.api.register_push_token(token).await?;
        log::info!("Push token registered.");
        Ok(())
    }

    pub async fn unregister_push_token(&self, token: &str) -> Result<(), ServiceError> {
        let token = required(token)?;
        self.api.unregister_push_token(token).await?;
        log::info!("Push token unregistered.");
        Ok(())
    }

    pub async fn push_token(&self) -> Result<Option<String>, ServiceError> {
        Ok(self.api.push_token().await?)
    }

    pub async fn speedtest_summary(&self) -> Result<SpeedtestSummary, ServiceError> {
        Ok(self.api.speedtest_summary().await?)
    }

    pub async fn speedtest_history(
        &self,
        page: u32,
        page_size: u32,
    ) -> Result<SpeedtestHistory, ServiceError> {
        Ok(self.api.speedtest_history(page.max(1), page_size.max(1)).await?)
    }
}
