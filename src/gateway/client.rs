//! reqwest-backed admin API client
//!
//! Requests are addressed by node id under `<base>/sharedboxes/lists`, carry
//! the access token in the `access_token` header, and are parsed into the
//! shared `{success, total, lists}` envelope.

use crate::config::ApiConfig;
use crate::gateway::{FetchError, FetchGateway};
use crate::model::{Item, ListResponse, UserRecord};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::time::Duration;
use url::Url;

const ACCESS_TOKEN_HEADER: &str = "access_token";

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `timeout` - Transport-level timeout for a whole request
pub fn build_http_client(timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(concat!("sharedbox-sync/", env!("CARGO_PKG_VERSION")))
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Client for the admin list endpoints
#[derive(Clone)]
pub struct AdminApiClient {
    client: Client,
    base_url: Url,
    lang: String,
    access_token: String,
}

impl AdminApiClient {
    /// Creates a client already carrying a valid access token
    pub fn new(config: &ApiConfig, access_token: String) -> Result<Self, FetchError> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| FetchError::Url(format!("{}: {}", config.base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(FetchError::Url(format!(
                "{} cannot carry a path",
                config.base_url
            )));
        }

        let client = build_http_client(config.request_timeout()).map_err(|source| {
            FetchError::Http {
                url: config.base_url.clone(),
                source,
            }
        })?;

        Ok(Self {
            client,
            base_url,
            lang: config.lang.clone(),
            access_token,
        })
    }

    /// URL of the shared box list under `node`; the empty node lists the root
    pub fn shared_box_list_url(&self, node: &str) -> Url {
        let mut segments = vec!["sharedboxes", "lists"];
        if !node.is_empty() {
            segments.push(node);
        }
        self.endpoint(&segments)
    }

    /// URL of the user list
    pub fn user_list_url(&self) -> Url {
        self.endpoint(&["users", "lists"])
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        // cannot_be_a_base was rejected in new()
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url.query_pairs_mut().append_pair("lang", &self.lang);
        url
    }

    /// Lists the direct children of `node`
    pub async fn list_shared_boxes(&self, node: &str) -> Result<ListResponse<Item>, FetchError> {
        self.get_list(self.shared_box_list_url(node)).await
    }

    /// Lists every user of the tenant
    pub async fn list_users(&self) -> Result<ListResponse<UserRecord>, FetchError> {
        self.get_list(self.user_list_url()).await
    }

    async fn get_list<T: DeserializeOwned>(&self, url: Url) -> Result<ListResponse<T>, FetchError> {
        let url_str = url.to_string();
        tracing::trace!(url = %url_str, "Sending list request");

        let response = self
            .client
            .get(url)
            .header(ACCESS_TOKEN_HEADER, &self.access_token)
            .send()
            .await
            .map_err(|source| FetchError::Http {
                url: url_str.clone(),
                source,
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|source| FetchError::Http {
            url: url_str.clone(),
            source,
        })?;

        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ListResponse<T> =
            serde_json::from_str(&body).map_err(|e| FetchError::Decode {
                url: url_str.clone(),
                message: e.to_string(),
            })?;

        if !parsed.success {
            return Err(FetchError::Unsuccessful { url: url_str });
        }

        Ok(parsed)
    }
}

#[async_trait]
impl FetchGateway for AdminApiClient {
    async fn fetch_children(&self, node: &str) -> Result<Vec<Item>, FetchError> {
        let response = self.list_shared_boxes(node).await?;
        Ok(response.lists)
    }
}
