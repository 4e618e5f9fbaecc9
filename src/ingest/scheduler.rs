//! The fetch scheduler: one poll-decode-filter-store cycle per timer tick.
//!
//! The scheduler owns the rate-limit backoff deadline exclusively; the
//! query-serving path never sees it. A cycle either completes with
//! per-record counts, ends cleanly on a rate-limit signal, skips itself
//! while backoff is active, or aborts with a cycle-level error. Cycle
//! errors are reported to the caller and the next tick is the retry.

use chrono::{DateTime, Duration, Utc};
use reqwest::header::{AUTHORIZATION, HeaderValue};
use reqwest::{Method, Request, StatusCode, Url};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::fetch::token::{AuthError, TokenProvider};
use crate::fetch::HttpClient;
use crate::geo::BoundingBox;
use crate::ingest::filter::FilterConfig;
use crate::ingest::state_vector::StateVector;
use crate::store::{PersistError, PositionInserter};

pub const API_URL_STATES_ALL: &str = "https://opensky-network.org/api/states/all";

/// Header OpenSky uses to communicate the rate-limit backoff.
pub const RETRY_AFTER_HEADER: &str = "X-Rate-Limit-Retry-After-Seconds";

/// A cycle-level failure. Aborts the current cycle only; the scheduler
/// stays alive and the next tick retries.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("token exchange failed: {0}")]
    Auth(#[from] AuthError),
    #[error("states request failed: {0}")]
    Transport(String),
    #[error("states payload malformed: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Per-record counters for one completed cycle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleStats {
    pub received: usize,
    pub inserted: usize,
    pub duplicates: usize,
    pub rejected: usize,
    pub failed: usize,
}

/// How one triggered cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Backoff still active; no network call was made.
    Skipped { until: DateTime<Utc> },
    /// The API signalled rate limiting; backoff recorded, no error.
    RateLimited { retry_secs: i64 },
    Completed(CycleStats),
}

/// Shape of the states endpoint payload. Only `states` is consumed; it is
/// null when the bounding box is empty.
#[derive(Debug, Deserialize)]
struct StatesResponse {
    states: Option<Vec<Vec<Value>>>,
}

pub struct Fetcher<C, T, I> {
    client: C,
    tokens: T,
    inserter: I,
    states_url: Url,
    filter: FilterConfig,
    next_allowed: Option<DateTime<Utc>>,
}

impl<C, T, I> Fetcher<C, T, I>
where
    C: HttpClient,
    T: TokenProvider,
    I: PositionInserter,
{
    /// Builds a fetcher whose states URL carries the bounding-box query
    /// parameters, fixed for the fetcher's lifetime.
    pub fn new(
        client: C,
        tokens: T,
        inserter: I,
        api_url: &str,
        bbox: BoundingBox,
        filter: FilterConfig,
    ) -> anyhow::Result<Self> {
        let states_url = Url::parse_with_params(
            api_url,
            [
                ("lamin", format!("{:.4}", bbox.lat_min)),
                ("lamax", format!("{:.4}", bbox.lat_max)),
                ("lomin", format!("{:.4}", bbox.lon_min)),
                ("lomax", format!("{:.4}", bbox.lon_max)),
            ],
        )?;

        Ok(Self {
            client,
            tokens,
            inserter,
            states_url,
            filter,
            next_allowed: None,
        })
    }

    /// Runs one ingestion cycle. Never panics the loop: every failure mode
    /// is either a counted per-record event or a returned [`CycleError`].
    pub async fn run_cycle(&mut self) -> Result<CycleOutcome, CycleError> {
        if let Some(until) = self.next_allowed {
            if Utc::now() < until {
                debug!(%until, "skipping cycle, rate-limit backoff active");
                return Ok(CycleOutcome::Skipped { until });
            }
        }

        let token = self.tokens.fetch_token().await?;

        let mut req = Request::new(Method::GET, self.states_url.clone());
        let bearer = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|_| CycleError::Transport("token is not a valid header value".into()))?;
        req.headers_mut().insert(AUTHORIZATION, bearer);

        let resp = self
            .client
            .execute(req)
            .await
            .map_err(|e| CycleError::Transport(e.to_string()))?;

        if resp.status() == StatusCode::TOO_MANY_REQUESTS {
            let retry_secs = resp
                .headers()
                .get(RETRY_AFTER_HEADER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(0);

            self.next_allowed = Some(Utc::now() + Duration::seconds(retry_secs));
            warn!(retry_secs, "rate limited by states endpoint, backing off");
            return Ok(CycleOutcome::RateLimited { retry_secs });
        }

        if !resp.status().is_success() {
            return Err(CycleError::Transport(format!(
                "unexpected status {}",
                resp.status()
            )));
        }

        let body = resp
            .bytes()
            .await
            .map_err(|e| CycleError::Transport(e.to_string()))?;
        let payload: StatesResponse = serde_json::from_slice(&body)?;

        let stats = self.store_states(payload.states.unwrap_or_default()).await;
        info!(
            received = stats.received,
            inserted = stats.inserted,
            duplicates = stats.duplicates,
            rejected = stats.rejected,
            failed = stats.failed,
            "ingestion cycle complete"
        );

        Ok(CycleOutcome::Completed(stats))
    }

    /// Decodes, filters, and persists one batch. Failures stay local to a
    /// record; a bad row never costs the rest of the batch.
    async fn store_states(&self, states: Vec<Vec<Value>>) -> CycleStats {
        let mut stats = CycleStats {
            received: states.len(),
            ..Default::default()
        };

        for raw in &states {
            let Some(state) = StateVector::decode(raw) else {
                stats.rejected += 1;
                continue;
            };

            let position = match self.filter.screen(state) {
                Ok(p) => p,
                Err(reason) => {
                    debug!(?reason, "state vector rejected");
                    stats.rejected += 1;
                    continue;
                }
            };

            match self.inserter.insert(&position).await {
                Ok(()) => stats.inserted += 1,
                Err(PersistError::Duplicate) => stats.duplicates += 1,
                Err(e) => {
                    error!(error = %e, icao24 = ?position.icao24, "insert failed");
                    stats.failed += 1;
                }
            }
        }

        stats
    }

    #[cfg(test)]
    fn set_next_allowed(&mut self, until: Option<DateTime<Utc>>) {
        self.next_allowed = until;
    }
}
