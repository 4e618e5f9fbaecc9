//! HTTP query service: translates request parameters into an aggregation
//! query and serializes the bins as JSON.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Query, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use tracing::{error, info};

use crate::store::HeatmapQuerier;

/// Default bin granularity: coordinates are floored onto a 1/80° grid.
pub const DEFAULT_BIN_SIZE: i64 = 80;

#[derive(Debug, Default, Deserialize)]
pub struct HeatmapParams {
    /// Bin granularity divisor; larger means finer bins.
    pub bin: Option<i64>,
    /// Restrict aggregation to positions ingested this recently.
    pub minutes: Option<i64>,
}

pub fn router(querier: Arc<dyn HeatmapQuerier>) -> Router {
    Router::new()
        .route("/api/heatmap", get(heatmap_handler))
        .layer(middleware::from_fn(log_request))
        .with_state(querier)
}

async fn heatmap_handler(
    State(querier): State<Arc<dyn HeatmapQuerier>>,
    Query(params): Query<HeatmapParams>,
) -> Response {
    let bin_size = params.bin.unwrap_or(DEFAULT_BIN_SIZE);

    match querier.heatmap(bin_size, params.minutes).await {
        Ok(points) => Json(points).into_response(),
        Err(e) => {
            error!(error = %e, "heatmap query failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "error fetching heatmap").into_response()
        }
    }
}

/// Logs method, path, status, and latency for every request.
async fn log_request(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let start = Instant::now();

    let response = next.run(req).await;

    info!(
        %method,
        path,
        status = response.status().as_u16(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "request"
    );

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::store::HeatPoint;

    struct FixedQuerier {
        result: Vec<HeatPoint>,
        seen: std::sync::Mutex<Option<(i64, Option<i64>)>>,
    }

    impl FixedQuerier {
        fn new(result: Vec<HeatPoint>) -> Self {
            Self {
                result,
                seen: std::sync::Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl HeatmapQuerier for FixedQuerier {
        async fn heatmap(
            &self,
            bin_size: i64,
            window_minutes: Option<i64>,
        ) -> anyhow::Result<Vec<HeatPoint>> {
            *self.seen.lock().unwrap() = Some((bin_size, window_minutes));
            Ok(self.result.clone())
        }
    }

    struct FailingQuerier;

    #[async_trait]
    impl HeatmapQuerier for FailingQuerier {
        async fn heatmap(&self, _: i64, _: Option<i64>) -> anyhow::Result<Vec<HeatPoint>> {
            anyhow::bail!("store unavailable")
        }
    }

    async fn spawn_server(querier: Arc<dyn HeatmapQuerier>) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(querier)).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn test_heatmap_returns_json_bins() {
        let querier = Arc::new(FixedQuerier::new(vec![HeatPoint {
            lat_bin: 60.25,
            lon_bin: 24.75,
            count: 12,
        }]));
        let base = spawn_server(querier.clone()).await;

        let resp = reqwest::get(format!("{base}/api/heatmap?bin=80&minutes=15"))
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::OK);

        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body[0]["lat"], 60.25);
        assert_eq!(body[0]["lon"], 24.75);
        assert_eq!(body[0]["count"], 12);

        assert_eq!(*querier.seen.lock().unwrap(), Some((80, Some(15))));
    }

    #[tokio::test]
    async fn test_heatmap_defaults_without_params() {
        let querier = Arc::new(FixedQuerier::new(vec![]));
        let base = spawn_server(querier.clone()).await;

        let resp = reqwest::get(format!("{base}/api/heatmap")).await.unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::OK);
        assert_eq!(resp.json::<serde_json::Value>().await.unwrap(), serde_json::json!([]));

        // No window filtering unless explicitly requested.
        assert_eq!(*querier.seen.lock().unwrap(), Some((DEFAULT_BIN_SIZE, None)));
    }

    #[tokio::test]
    async fn test_heatmap_query_failure_is_generic_500() {
        let base = spawn_server(Arc::new(FailingQuerier)).await;

        let resp = reqwest::get(format!("{base}/api/heatmap")).await.unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::INTERNAL_SERVER_ERROR);

        // Internal detail must not leak to the caller.
        let body = resp.text().await.unwrap();
        assert_eq!(body, "error fetching heatmap");
    }
}
