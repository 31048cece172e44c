//! Rate-limited batch fetcher.
//!
//! [`RateGovernor`] keeps a sliding window of request timestamps and tells
//! callers how long to wait before the next request fits. The
//! [`RateLimitedFetcher`] owns one governor behind a `tokio::sync::Mutex`,
//! so the window check, the append and the call itself are one critical
//! section.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::LookupConfig;
use crate::lookup::{LookupResponse, LookupService};
use crate::models::Message;

/// External-service faults. Each carries the id batch that failed.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("lookup transport failure for {} ids (first: {:?})", .ids.len(), .ids.first())]
    Transport {
        ids: Vec<String>,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("lookup still rate limited after waiting a full window ({} ids)", .ids.len())]
    RateLimited { ids: Vec<String> },
    #[error("lookup returned an error payload for {} ids: {}", .ids.len(), .raw)]
    Malformed { ids: Vec<String>, raw: Value },
}

/// Sliding-window request governor.
#[derive(Debug)]
pub struct RateGovernor {
    window: Duration,
    max_requests: usize,
    safety_margin: Duration,
    history: VecDeque<Instant>,
}

impl RateGovernor {
    pub fn new(window: Duration, max_requests: usize, safety_margin: Duration) -> Self {
        Self {
            window,
            max_requests,
            safety_margin,
            history: VecDeque::new(),
        }
    }

    pub fn from_config(config: &LookupConfig) -> Self {
        Self::new(
            Duration::from_secs(config.window_secs),
            config.max_requests_per_window,
            Duration::from_secs(config.safety_margin_secs),
        )
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn safety_margin(&self) -> Duration {
        self.safety_margin
    }

    /// Requests made within `window` of `now`.
    pub fn in_window(&self, now: Instant) -> usize {
        self.live(now).count()
    }

    fn live(&self, now: Instant) -> impl Iterator<Item = &Instant> {
        let window = self.window;
        self.history
            .iter()
            .filter(move |t| now.saturating_duration_since(**t) < window)
    }

    /// How long to wait from `now` before one more request fits the window.
    pub fn delay_until_slot(&self, now: Instant) -> Duration {
        let live: Vec<Instant> = self.live(now).copied().collect();
        if live.len() < self.max_requests {
            return Duration::ZERO;
        }
        // History is append-only, so `live` is ascending.
        let must_expire = live[live.len() - self.max_requests];
        (must_expire + self.window + self.safety_margin).saturating_duration_since(now)
    }

    pub async fn wait_for_slot(&mut self) {
        let now = Instant::now();
        self.prune(now);
        let delay = self.delay_until_slot(now);
        if !delay.is_zero() {
            debug!(
                seconds = delay.as_secs(),
                "sleeping to stay under the lookup rate limit"
            );
            tokio::time::sleep(delay).await;
        }
    }

    pub fn record(&mut self, at: Instant) {
        self.history.push_back(at);
        self.prune(at);
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    fn prune(&mut self, now: Instant) {
        while let Some(front) = self.history.front() {
            if now.saturating_duration_since(*front) >= self.window {
                self.history.pop_front();
            } else {
                break;
            }
        }
    }
}

/// Lookup service wrapped in a rate governor.
pub struct RateLimitedFetcher<S> {
    service: S,
    governor: Mutex<RateGovernor>,
    calls: AtomicU64,
}

impl<S: LookupService> RateLimitedFetcher<S> {
    pub fn new(service: S, governor: RateGovernor) -> Self {
        Self {
            service,
            governor: Mutex::new(governor),
            calls: AtomicU64::new(0),
        }
    }

    pub fn from_config(service: S, config: &LookupConfig) -> Self {
        Self::new(service, RateGovernor::from_config(config))
    }

    /// Service calls issued so far, retries included.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    pub async fn history_len(&self) -> usize {
        self.governor.lock().await.history_len()
    }

    /// Fetch one batch of ids. Ids the service did not return are simply
    /// absent from the map.
    pub async fn fetch(&self, ids: &[String]) -> Result<HashMap<String, Message>, FetchError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let mut governor = self.governor.lock().await;
        governor.wait_for_slot().await;
        governor.record(Instant::now());
        let mut response = self.call(ids).await?;

        if response == LookupResponse::RateLimited {
            let pause = governor.window() + governor.safety_margin();
            warn!(
                seconds = pause.as_secs(),
                ids = ids.len(),
                "lookup service reports rate limit; pausing a full window before one retry"
            );
            tokio::time::sleep(pause).await;
            governor.record(Instant::now());
            response = self.call(ids).await?;
        }
        drop(governor);

        match response {
            LookupResponse::Found(values) => Ok(key_by_id(values)),
            LookupResponse::RateLimited => Err(FetchError::RateLimited { ids: ids.to_vec() }),
            LookupResponse::Error(raw) => Err(FetchError::Malformed {
                ids: ids.to_vec(),
                raw,
            }),
        }
    }

    async fn call(&self, ids: &[String]) -> Result<LookupResponse, FetchError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.service.lookup(ids).await
    }
}

fn key_by_id(values: Vec<Value>) -> HashMap<String, Message> {
    let mut found = HashMap::with_capacity(values.len());
    for value in values {
        match Message::try_from(value) {
            Ok(message) if !message.is_missing() => {
                found.insert(message.id().to_string(), message);
            }
            Ok(message) => warn!(id = %message.id(), "lookup returned a placeholder; ignoring"),
            Err(e) => warn!(error = %e, "lookup returned an unparseable message; skipping"),
        }
    }
    debug!(found = found.len(), "lookup batch parsed");
    found
}
