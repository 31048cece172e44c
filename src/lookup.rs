//! External batch lookup service.
//!
//! [`LookupService`] is the seam between the recovery engine and the remote
//! `statuses/lookup` endpoint. [`HttpLookup`] is the real client; tests plug
//! in scripted services. The response classification in
//! [`parse_lookup_response`] is pure so it can be tested without a network.

use std::io::Write;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info};

use crate::config::Config;
use crate::fetcher::{FetchError, RateLimitedFetcher};
use crate::pipe;
use crate::snowflake;

/// Classified response of one lookup call.
#[derive(Debug, Clone, PartialEq)]
pub enum LookupResponse {
    /// Raw message bodies the service returned. Ids it did not return are
    /// treated as not found.
    Found(Vec<Value>),
    RateLimited,
    /// Error-shaped payload other than a rate limit.
    Error(Value),
}

#[async_trait]
pub trait LookupService: Send + Sync {
    async fn lookup(&self, ids: &[String]) -> Result<LookupResponse, FetchError>;
}

/// Error code the service uses for an exhausted rate limit.
const RATE_LIMIT_CODE: i64 = 88;
const RATE_LIMIT_MESSAGE: &str = "Rate limit exceeded";

/// Classify an HTTP status and body.
pub fn parse_lookup_response(status: u16, body: &str) -> LookupResponse {
    if status == 429 {
        return LookupResponse::RateLimited;
    }

    let value: Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(_) => return LookupResponse::Error(Value::String(body.to_string())),
    };

    match value {
        Value::Array(items) => LookupResponse::Found(items),
        other => {
            let rate_limited = other
                .get("errors")
                .and_then(Value::as_array)
                .map(|errors| {
                    errors.iter().any(|e| {
                        e.get("code").and_then(Value::as_i64) == Some(RATE_LIMIT_CODE)
                            || e.get("message").and_then(Value::as_str) == Some(RATE_LIMIT_MESSAGE)
                    })
                })
                .unwrap_or(false);
            if rate_limited {
                LookupResponse::RateLimited
            } else {
                LookupResponse::Error(other)
            }
        }
    }
}

/// HTTP client for the batch lookup endpoint.
pub struct HttpLookup {
    client: reqwest::Client,
    endpoint: String,
    token: String,
}

impl HttpLookup {
    /// Build a client from config. Fails when the bearer token variable is
    /// not set.
    pub fn from_config(config: &Config) -> Result<Self> {
        let token = std::env::var(&config.lookup.bearer_token_env).map_err(|_| {
            anyhow::anyhow!(
                "{} environment variable not set (needed for the lookup service)",
                config.lookup.bearer_token_env
            )
        })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.lookup.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            endpoint: config.lookup.endpoint.clone(),
            token,
        })
    }
}

#[async_trait]
impl LookupService for HttpLookup {
    async fn lookup(&self, ids: &[String]) -> Result<LookupResponse, FetchError> {
        let transport = |e: reqwest::Error| FetchError::Transport {
            ids: ids.to_vec(),
            source: Box::new(e),
        };

        let url = format!("{}?id={}", self.endpoint, ids.join(","));
        debug!(ids = ids.len(), "sending lookup request");
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .header("Content-Type", "application/json")
            .send()
            .await
            .map_err(transport)?;

        let status = resp.status().as_u16();
        let body = resp.text().await.map_err(transport)?;
        Ok(parse_lookup_response(status, &body))
    }
}

/// Read ids from `--ids`, fetch them, print each recovered raw message.
pub async fn run_lookup(config: &Config, ids_path: Option<&Path>, output: Option<&Path>) -> Result<()> {
    let reader = pipe::open_input(ids_path)?;
    let mut ids = Vec::new();
    for line in std::io::BufRead::lines(reader) {
        let line = line.context("Failed to read id list")?;
        let id = line.trim();
        if !id.is_empty() {
            ids.push(id.to_string());
        }
    }

    let fetcher = RateLimitedFetcher::from_config(HttpLookup::from_config(config)?, &config.lookup);
    let mut out = pipe::open_output(output)?;
    let mut found = 0usize;

    for chunk in ids.chunks(config.recovery.ids_per_call) {
        let recovered = fetcher.fetch(chunk).await?;
        let mut messages: Vec<_> = recovered.into_values().collect();
        messages.sort_by_key(|m| snowflake::sort_key(m.id()));
        for message in messages {
            writeln!(out, "{}", serde_json::to_string(&message)?)?;
            found += 1;
        }
    }
    out.flush()?;

    info!(
        requested = ids.len(),
        found,
        calls = fetcher.calls(),
        "lookup complete"
    );
    Ok(())
}
