//! Twitter/X source seam.
//!
//! Reads are expensive and budgeted (200/day rolling), so the trait is
//! minimal: search recent posts for a symbol. The default implementation is
//! a no-op used whenever the feature is disabled or unconfigured.

use crate::error::Result;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

#[async_trait]
pub trait TwitterSource: Send + Sync {
    /// Recent post texts mentioning the symbol, best-effort.
    async fn search(&self, symbol: &str) -> Result<Vec<String>>;

    fn is_configured(&self) -> bool;
}

/// Disabled source: always empty, never configured.
pub struct NoopTwitterSource;

#[async_trait]
impl TwitterSource for NoopTwitterSource {
    async fn search(&self, _symbol: &str) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    fn is_configured(&self) -> bool {
        false
    }
}

/// X API v2 recent search.
pub struct XApiSource {
    http: reqwest::Client,
    bearer_token: String,
}

impl XApiSource {
    pub fn new(bearer_token: String) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self { http, bearer_token })
    }
}

#[async_trait]
impl TwitterSource for XApiSource {
    async fn search(&self, symbol: &str) -> Result<Vec<String>> {
        #[derive(Debug, Deserialize)]
        struct SearchWire {
            #[serde(default)]
            data: Vec<TweetWire>,
        }
        #[derive(Debug, Deserialize)]
        struct TweetWire {
            text: String,
        }
        let wire: SearchWire = self
            .http
            .get("https://api.twitter.com/2/tweets/search/recent")
            .bearer_auth(&self.bearer_token)
            .query(&[
                ("query", format!("${symbol} -is:retweet lang:en")),
                ("max_results", "25".to_string()),
            ])
            .send()
            .await?
            .error_for_status()
            .map_err(crate::error::GambitError::Http)?
            .json()
            .await?;
        Ok(wire.data.into_iter().map(|t| t.text).collect())
    }

    fn is_configured(&self) -> bool {
        !self.bearer_token.is_empty()
    }
}
