//! Fetch gateway for the admin API
//!
//! This module contains everything that talks to the remote tree:
//! - The `FetchGateway` seam the crawl coordinator depends on
//! - The reqwest-backed admin API client
//! - Loading the access token written by the login flow

mod client;
mod credential;

pub use client::{build_http_client, AdminApiClient};
pub use credential::{load_access_token, AdminToken, CredentialError};

use crate::model::Item;
use async_trait::async_trait;
use thiserror::Error;

/// Errors raised while fetching one node
///
/// All of these are isolated to the node being processed.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP error for {url}: {source}")]
    Http { url: String, source: reqwest::Error },

    #[error("API request failed with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("API reported an unsuccessful response for {url}")]
    Unsuccessful { url: String },

    #[error("Failed to parse response from {url}: {message}")]
    Decode { url: String, message: String },

    #[error("Invalid request URL: {0}")]
    Url(String),

    #[error("Request timeout for node '{node}'")]
    Timeout { node: String },

    #[error("Rate limiter wait exceeded the job deadline")]
    RateLimitWait,

    #[error("Request cancelled")]
    Cancelled,
}

/// Source of a node's direct children
///
/// Implementations must not retry and must be cancel-safe: the coordinator
/// drops the returned future when the job deadline passes.
#[async_trait]
pub trait FetchGateway: Send + Sync {
    async fn fetch_children(&self, node: &str) -> Result<Vec<Item>, FetchError>;
}
