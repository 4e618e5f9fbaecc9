//! Position persistence and heatmap aggregation.
//!
//! [`PositionInserter`] and [`HeatmapQuerier`] are the capability seams
//! between the pipeline and the relational store; [`SqliteStore`] is the
//! real implementation, and tests substitute in-memory ones.

mod sqlite;

pub use sqlite::SqliteStore;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

/// One accepted aircraft observation, ready for persistence.
///
/// Latitude and longitude are required by construction; every other field
/// stays optional so an unknown value is never conflated with a zero.
#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub icao24: Option<String>,
    pub callsign: Option<String>,
    pub origin_country: Option<String>,
    pub position_timestamp: f64,
    pub longitude: f64,
    pub latitude: f64,
    pub baro_altitude: Option<f64>,
    pub on_ground: Option<bool>,
    pub velocity: Option<f64>,
    pub heading: Option<f64>,
    pub vertical_rate: Option<f64>,
}

#[derive(Debug, Error)]
pub enum PersistError {
    /// The store already holds a row for this (icao24, timestamp) pair.
    /// Callers treat this as a no-op, not a failure.
    #[error("position already stored")]
    Duplicate,
    #[error("insert failed: {0}")]
    Insert(#[from] sqlx::Error),
}

/// Durable single-row insert. One bad row must never lose the rest of a
/// fetch cycle's data, so implementations report per-row results only.
#[async_trait]
pub trait PositionInserter: Send + Sync {
    async fn insert(&self, position: &Position) -> Result<(), PersistError>;
}

#[async_trait]
impl<T: PositionInserter + ?Sized> PositionInserter for std::sync::Arc<T> {
    async fn insert(&self, position: &Position) -> Result<(), PersistError> {
        (**self).insert(position).await
    }
}

/// One spatial bin of the heatmap: the bin's anchor coordinates and the
/// number of stored positions falling into it.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct HeatPoint {
    #[serde(rename = "lat")]
    pub lat_bin: f64,
    #[serde(rename = "lon")]
    pub lon_bin: f64,
    pub count: i64,
}

/// Spatially-binned density query over stored positions.
#[async_trait]
pub trait HeatmapQuerier: Send + Sync {
    /// `bin_size` divides coordinates onto a floor grid (larger value means
    /// finer bins); `window_minutes`, when present, restricts the count to
    /// positions ingested that recently. Row order is unspecified.
    async fn heatmap(
        &self,
        bin_size: i64,
        window_minutes: Option<i64>,
    ) -> anyhow::Result<Vec<HeatPoint>>;
}
