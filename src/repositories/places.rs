use anyhow::bail;
use async_trait::async_trait;
use serde_json::json;

use crate::models::location::{LocationInfo, PlacesResponse};

const FIELD_MASK: &str = "places.id,places.displayName,places.formattedAddress,places.location,places.addressComponents,places.types";

#[async_trait]
pub trait PlaceLookup: Send + Sync {
    async fn search(&self, query: &str) -> Result<Option<LocationInfo>, anyhow::Error>;
}

pub struct PlacesApi {
    url: String,
    api_key: String,
    client: reqwest::Client,
}

impl PlacesApi {
    pub fn new(url: &str, api_key: &str) -> Self {
        Self {
            url: url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl PlaceLookup for PlacesApi {
    async fn search(&self, query: &str) -> Result<Option<LocationInfo>, anyhow::Error> {
        if self.api_key.is_empty() {
            bail!("Places API key is not configured");
        }

        log::debug!("Searching place for {:?}", query);
        let response = self
            .client
            .post(format!("{}/v1/places:searchText", self.url))
            .header("X-Goog-Api-Key", &self.api_key)
            .header("X-Goog-FieldMask", FIELD_MASK)
            .json(&json!({
                "textQuery": query,
                "maxResultCount": 1
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!("Places: {} {}", status, body);
        }

        let places: PlacesResponse = response.json().await?;
        let found = places.places.first().and_then(LocationInfo::from_place);

        if found.is_none() {
            log::info!("No usable place found for {:?}", query);
        }
        Ok(found)
    }
}
