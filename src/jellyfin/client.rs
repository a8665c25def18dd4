//! HTTP client for the Jellyfin server.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::warn;

use super::models::{ItemsPage, JellyfinUser, JellyfinView, LibraryStats, LibraryStatus};
use super::{JellyfinApi, UpstreamError};

/// Reqwest-backed [`JellyfinApi`] implementation. Auth goes through the
/// `X-Emby-Token` header on every request.
pub struct JellyfinClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl JellyfinClient {
    /// Create a new client.
    ///
    /// # Arguments
    /// * `base_url` - Base URL of the Jellyfin server (e.g., "http://localhost:8096")
    /// * `api_key` - API token for the `X-Emby-Token` header
    /// * `timeout_sec` - Request timeout in seconds
    pub fn new(base_url: String, api_key: String, timeout_sec: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_sec))
            .build()
            .expect("Failed to create HTTP client");

        // Ensure base_url doesn't have trailing slash
        let base_url = base_url.trim_end_matches('/').to_string();

        Self {
            client,
            base_url,
            api_key,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_json<T: DeserializeOwned>(&self, path_and_query: &str) -> Result<T, UpstreamError> {
        let url = format!("{}{}", self.base_url, path_and_query);
        let response = self
            .client
            .get(&url)
            .header("X-Emby-Token", &self.api_key)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(UpstreamError::Status(response.status()));
        }

        Ok(response.json().await?)
    }

    async fn view_stats(&self, view: &JellyfinView) -> Result<LibraryStats, UpstreamError> {
        let items: ItemsPage<serde_json::Value> = self
            .get_json(&format!(
                "/Items?ParentId={}&Recursive=true&StartIndex=0&Limit=0",
                view.id
            ))
            .await?;
        let collections: ItemsPage<serde_json::Value> = self
            .get_json(&format!(
                "/Items?ParentId={}&IncludeItemTypes=BoxSet&Recursive=true&StartIndex=0&Limit=0",
                view.id
            ))
            .await?;

        Ok(LibraryStats {
            name: view.name.clone(),
            total_items: items.total(),
            collection_count: collections.total(),
            status: LibraryStatus::Success,
        })
    }
}

#[async_trait]
impl JellyfinApi for JellyfinClient {
    async fn check_connection(&self) -> Result<(), UpstreamError> {
        let _: serde_json::Value = self.get_json("/System/Info").await?;
        Ok(())
    }

    async fn list_library_stats(&self) -> Result<Vec<LibraryStats>, UpstreamError> {
        let users: Vec<JellyfinUser> = self.get_json("/Users").await?;
        let user = users.first().ok_or(UpstreamError::NoUsers)?;

        let views: ItemsPage<JellyfinView> = self
            .get_json(&format!("/Users/{}/Views", user.id))
            .await?;

        let mut stats = Vec::with_capacity(views.items.len());
        for view in &views.items {
            match self.view_stats(view).await {
                Ok(library) => stats.push(library),
                Err(err) => {
                    warn!("Failed to fetch stats for library {}: {}", view.name, err);
                    stats.push(LibraryStats::errored(view.name.clone()));
                }
            }
        }

        Ok(stats)
    }
}
