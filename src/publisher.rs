//! Best-effort telemetry delivery to InfluxDB.
//!
//! A publish either reaches the database or is dropped; it never reports an
//! error to the caller. A lost sample is preferable to stalling the sample
//! loop, so there is no retry, backoff or local buffering. Dropped sends are
//! counted in [`PublishStats`] for whoever watches the logs.

use std::{future::Future, time::Duration};

use chrono::{DateTime, Utc};
use reqwest::{
    header::{AUTHORIZATION, CONTENT_TYPE},
    Client, StatusCode, Url,
};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::Config;

// ---

/// Classified reasons a point did not reach the database.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("request timed out")]
    Timeout,

    /// DNS failure or refused/unreachable connection.
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("server returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("transport error: {0}")]
    Transport(String),
}

impl From<reqwest::Error> for PublishError {
    fn from(e: reqwest::Error) -> Self {
        // ---
        if e.is_timeout() {
            PublishError::Timeout
        } else if e.is_connect() {
            PublishError::Connect(e.to_string())
        } else {
            PublishError::Transport(e.to_string())
        }
    }
}

/// Result of one publish attempt. There is deliberately no error variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    Delivered(StatusCode),
    Dropped,
}

/// Running delivery counters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PublishStats {
    // ---
    pub sent: u64,
    pub dropped: u64,
    pub last_success: Option<DateTime<Utc>>,
}

/// Destination for encoded line-protocol rows.
pub trait TelemetrySink {
    /// Send one row. Implementations swallow and log every failure.
    fn publish(&mut self, line: &str) -> impl Future<Output = PublishOutcome>;

    /// Delivery counters so far.
    fn stats(&self) -> &PublishStats;
}

/// HTTP publisher for the InfluxDB v2 write API.
pub struct InfluxPublisher {
    // ---
    client: Client,
    endpoint: Url,
    token: String,
    stats: PublishStats,
}

impl InfluxPublisher {
    // ---
    pub fn new(endpoint: Url, token: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        // ---
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("soil-moisture-agent/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            endpoint,
            token: token.into(),
            stats: PublishStats::default(),
        })
    }

    pub fn from_config(cfg: &Config) -> anyhow::Result<Self> {
        Self::new(cfg.influx_url.clone(), &cfg.influx_token, cfg.http_timeout)
    }

    async fn try_publish(&self, line: &str) -> Result<StatusCode, PublishError> {
        // ---
        let response = self
            .client
            .post(self.endpoint.clone())
            .header(AUTHORIZATION, format!("Token {}", self.token))
            .header(CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(line.to_owned())
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if !status.is_success() {
            return Err(PublishError::Status {
                status: status.as_u16(),
                body,
            });
        }

        debug!("InfluxDB response {}: {:?}", status, body);
        Ok(status)
    }
}

impl TelemetrySink for InfluxPublisher {
    async fn publish(&mut self, line: &str) -> PublishOutcome {
        // ---
        debug!("POST {} <- {}", self.endpoint, line);

        match self.try_publish(line).await {
            Ok(status) => {
                self.stats.sent += 1;
                self.stats.last_success = Some(Utc::now());
                info!("Data sent to InfluxDB ({})", status);
                PublishOutcome::Delivered(status)
            }
            Err(e) => {
                self.stats.dropped += 1;
                warn!(
                    dropped = self.stats.dropped,
                    "Failed to send data to InfluxDB: {}", e
                );
                PublishOutcome::Dropped
            }
        }
    }

    fn stats(&self) -> &PublishStats {
        &self.stats
    }
}
