//! Remote catalog source.
//!
//! Async HTTP client using `reqwest`. The API key, when configured, is sent
//! verbatim in the `Authorization` header.

use std::future::Future;
use std::pin::Pin;

use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde::Deserialize;
use serde_json::Value;

use crate::error::SourceError;
use crate::types::{RawItem, RawVariantChannel};

pub const DEFAULT_BASE_URL: &str = "https://fortnite-api.com/v2";

/// Boxed future returned by [`CatalogSource`] methods.
pub type SourceFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, SourceError>> + Send + 'a>>;

/// Read-only view of the remote catalog.
pub trait CatalogSource: Send + Sync {
    /// Fetches the full item listing.
    fn list_all(&self) -> SourceFuture<'_, Vec<RawItem>>;

    /// Fetches the variant channels of one item.
    ///
    /// An item the source knows but that has no variants yields an empty
    /// list.
    fn variants<'a>(&'a self, item_id: &'a str) -> SourceFuture<'a, Vec<RawVariantChannel>>;
}

/// `{ "status": ..., "data": ... }` response envelope.
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    #[serde(default)]
    data: Option<T>,
}

#[derive(Debug, Default, Deserialize)]
struct ItemDetail {
    #[serde(default)]
    variants: Option<Vec<RawVariantChannel>>,
}

/// HTTP implementation of [`CatalogSource`].
pub struct HttpCatalogSource {
    http: reqwest::Client,
    base_url: String,
}

impl HttpCatalogSource {
    /// Creates a client, optionally authenticated with `api_key`.
    pub fn new(api_key: Option<&str>) -> Result<Self, SourceError> {
        let mut headers = HeaderMap::new();
        if let Some(key) = api_key.filter(|k| !k.is_empty()) {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(key).map_err(|_| SourceError::InvalidKey)?,
            );
        }

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;

        Ok(Self {
            http,
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    /// Points the client at a different API root.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Performs a GET request against the API root.
    async fn get(&self, endpoint: &str) -> Result<Vec<u8>, SourceError> {
        let url = format!("{}{}", self.base_url, endpoint);
        let resp = self.http.get(&url).send().await?;
        let status = resp.status();

        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SourceError::Api {
                status: status.as_u16(),
                body,
            });
        }

        Ok(resp.bytes().await?.to_vec())
    }

    async fn fetch_listing(&self) -> Result<Vec<RawItem>, SourceError> {
        let body = self.get("/cosmetics/br").await?;
        // Converted per record; an odd record reads as empty.
        let resp: ApiResponse<Vec<Value>> = serde_json::from_slice(&body)?;
        let records = resp
            .data
            .ok_or_else(|| SourceError::InvalidResponse("listing has no data".into()))?;
        Ok(records.into_iter().map(RawItem::from_value).collect())
    }

    async fn fetch_variants(&self, item_id: &str) -> Result<Vec<RawVariantChannel>, SourceError> {
        let encoded = utf8_percent_encode(item_id, NON_ALPHANUMERIC).to_string();
        let body = self.get(&format!("/cosmetics/br/{encoded}")).await?;
        let resp: ApiResponse<ItemDetail> = serde_json::from_slice(&body)?;
        Ok(resp.data.and_then(|d| d.variants).unwrap_or_default())
    }
}

impl CatalogSource for HttpCatalogSource {
    fn list_all(&self) -> SourceFuture<'_, Vec<RawItem>> {
        Box::pin(self.fetch_listing())
    }

    fn variants<'a>(&'a self, item_id: &'a str) -> SourceFuture<'a, Vec<RawVariantChannel>> {
        Box::pin(self.fetch_variants(item_id))
    }
}
