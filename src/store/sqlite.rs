//! sqlx/sqlite implementation of the persistence capabilities.

use std::str::FromStr;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tracing::info;

use super::{HeatPoint, HeatmapQuerier, PersistError, Position, PositionInserter};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS positions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    icao24 TEXT,
    callsign TEXT,
    origin_country TEXT,
    position_timestamp REAL NOT NULL,
    longitude REAL NOT NULL,
    latitude REAL NOT NULL,
    baro_altitude REAL,
    on_ground INTEGER,
    velocity REAL,
    heading REAL,
    vertical_rate REAL,
    ingested_at INTEGER NOT NULL DEFAULT (CAST(strftime('%s', 'now') AS INTEGER)),
    UNIQUE (icao24, position_timestamp)
)";

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Opens (creating if missing) the database at `url` and ensures the
    /// schema exists.
    pub async fn connect(url: &str) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        info!(url, "connected to position store");
        Ok(store)
    }

    /// In-memory store for tests. Pinned to a single connection because
    /// each new in-memory sqlite connection is a fresh empty database.
    pub async fn in_memory() -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), sqlx::Error> {
        sqlx::query(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl PositionInserter for SqliteStore {
    async fn insert(&self, position: &Position) -> Result<(), PersistError> {
        sqlx::query(
            "INSERT INTO positions (
                icao24, callsign, origin_country, position_timestamp,
                longitude, latitude, baro_altitude, on_ground,
                velocity, heading, vertical_rate
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        )
        .bind(&position.icao24)
        .bind(&position.callsign)
        .bind(&position.origin_country)
        .bind(position.position_timestamp)
        .bind(position.longitude)
        .bind(position.latitude)
        .bind(position.baro_altitude)
        .bind(position.on_ground)
        .bind(position.velocity)
        .bind(position.heading)
        .bind(position.vertical_rate)
        .execute(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => PersistError::Duplicate,
            _ => PersistError::Insert(e),
        })?;

        Ok(())
    }
}

#[async_trait]
impl HeatmapQuerier for SqliteStore {
    async fn heatmap(
        &self,
        bin_size: i64,
        window_minutes: Option<i64>,
    ) -> anyhow::Result<Vec<HeatPoint>> {
        // floor(coord * bin) / bin snaps each coordinate onto the grid.
        // SQLite's bundled build has no floor(), so it is spelled out:
        // CAST truncates toward zero, and the comparison term subtracts
        // one for negative fractional values to make it a true floor.
        // The NULL guards are defensive: stored rows always carry
        // coordinates, so no bin should ever be unknown.
        let rows: Vec<HeatPoint> = sqlx::query_as(
            "SELECT
                (CAST(latitude * ?1 AS INTEGER)
                 - (latitude * ?1 < CAST(latitude * ?1 AS INTEGER))) / ?1 AS lat_bin,
                (CAST(longitude * ?1 AS INTEGER)
                 - (longitude * ?1 < CAST(longitude * ?1 AS INTEGER))) / ?1 AS lon_bin,
                COUNT(*) AS count
             FROM positions
             WHERE latitude IS NOT NULL
               AND longitude IS NOT NULL
               AND (?2 IS NULL
                    OR ingested_at >= CAST(strftime('%s', 'now') AS INTEGER) - ?2 * 60)
             GROUP BY lat_bin, lon_bin",
        )
        .bind(bin_size as f64)
        .bind(window_minutes)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_position() -> Position {
        Position {
            icao24: Some("abc123".to_string()),
            callsign: Some("TEST123".to_string()),
            origin_country: Some("Finland".to_string()),
            position_timestamp: 1624281000.0,
            longitude: 24.75,
            latitude: 60.25,
            baro_altitude: Some(3000.0),
            on_ground: Some(false),
            velocity: Some(250.0),
            heading: Some(180.0),
            vertical_rate: Some(5.0),
        }
    }

    #[tokio::test]
    async fn test_insert_and_duplicate_classification() {
        let store = SqliteStore::in_memory().await.unwrap();
        let position = sample_position();

        store.insert(&position).await.unwrap();

        let err = store.insert(&position).await.unwrap_err();
        assert!(matches!(err, PersistError::Duplicate));
    }

    #[tokio::test]
    async fn test_batch_with_one_duplicate_keeps_others() {
        let store = SqliteStore::in_memory().await.unwrap();

        let mut batch = Vec::new();
        for i in 0..5 {
            let mut p = sample_position();
            p.position_timestamp += i as f64;
            batch.push(p);
        }
        // Repeat the third row to trigger a uniqueness violation.
        batch.push(batch[2].clone());

        let mut inserted = 0;
        let mut duplicates = 0;
        for p in &batch {
            match store.insert(p).await {
                Ok(()) => inserted += 1,
                Err(PersistError::Duplicate) => duplicates += 1,
                Err(e) => panic!("unexpected insert error: {e}"),
            }
        }

        assert_eq!(inserted, 5);
        assert_eq!(duplicates, 1);
    }

    #[tokio::test]
    async fn test_heatmap_groups_same_cell() {
        let store = SqliteStore::in_memory().await.unwrap();

        // Two positions that floor to the same 1/80° cell.
        let mut a = sample_position();
        a.latitude = 60.2501;
        a.longitude = 24.7502;
        let mut b = sample_position();
        b.position_timestamp += 10.0;
        b.latitude = 60.2549;
        b.longitude = 24.7551;

        store.insert(&a).await.unwrap();
        store.insert(&b).await.unwrap();

        let bins = store.heatmap(80, None).await.unwrap();
        assert_eq!(bins.len(), 1);
        assert_eq!(bins[0].count, 2);
    }

    #[tokio::test]
    async fn test_heatmap_distinct_cells() {
        let store = SqliteStore::in_memory().await.unwrap();

        let mut a = sample_position();
        let mut b = sample_position();
        b.position_timestamp += 10.0;
        b.latitude = 60.50;
        a.latitude = 60.25;

        store.insert(&a).await.unwrap();
        store.insert(&b).await.unwrap();

        let bins = store.heatmap(80, None).await.unwrap();
        assert_eq!(bins.len(), 2);
        assert!(bins.iter().all(|bin| bin.count == 1));
    }

    #[tokio::test]
    async fn test_heatmap_floors_negative_coordinates() {
        let store = SqliteStore::in_memory().await.unwrap();

        // Southern/western hemisphere: truncation toward zero would put
        // -0.004° into the 0.0 bin; flooring puts it at -1/80°.
        let mut a = sample_position();
        a.latitude = -0.004;
        a.longitude = -0.004;
        let mut b = sample_position();
        b.position_timestamp += 10.0;
        b.latitude = -0.008;
        b.longitude = -0.008;

        store.insert(&a).await.unwrap();
        store.insert(&b).await.unwrap();

        let bins = store.heatmap(80, None).await.unwrap();
        assert_eq!(bins.len(), 1);
        assert_eq!(bins[0].count, 2);
        assert!((bins[0].lat_bin - (-1.0 / 80.0)).abs() < 1e-12);
        assert!((bins[0].lon_bin - (-1.0 / 80.0)).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_heatmap_window_excludes_old_rows() {
        let store = SqliteStore::in_memory().await.unwrap();

        let old = sample_position();
        let mut fresh = sample_position();
        fresh.position_timestamp += 10.0;
        fresh.latitude = 60.50;

        store.insert(&old).await.unwrap();
        store.insert(&fresh).await.unwrap();

        // Age the first row by an hour.
        sqlx::query("UPDATE positions SET ingested_at = ingested_at - 3600 WHERE latitude = ?1")
            .bind(old.latitude)
            .execute(store.pool())
            .await
            .unwrap();

        let windowed = store.heatmap(80, Some(15)).await.unwrap();
        assert_eq!(windowed.len(), 1);
        assert_eq!(windowed[0].count, 1);

        // No window covers all retained history.
        let all = store.heatmap(80, None).await.unwrap();
        assert_eq!(all.len(), 2);
    }
}
