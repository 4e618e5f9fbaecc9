//! Environment configuration.
//!
//! Loaded once at startup from process environment variables (a `.env`
//! file is read first via dotenvy in `main`).

use anyhow::{Context, Result};

/// Reference point defaults: Helsinki-Vantaa airport (EFHK).
pub const DEFAULT_CENTER_LAT: f64 = 60.3172;
pub const DEFAULT_CENTER_LON: f64 = 24.9633;
pub const DEFAULT_RADIUS_KM: f64 = 50.0;
pub const DEFAULT_MAX_ALTITUDE_M: f64 = 10_000.0;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub center_lat: f64,
    pub center_lon: f64,
    pub radius_km: f64,
    pub max_altitude_m: f64,
}

impl Config {
    /// Reads configuration from the environment.
    ///
    /// `DATABASE_URL`, `OPENSKY_CLIENT_ID` and `OPENSKY_CLIENT_SECRET` are
    /// required; the region of interest falls back to EFHK defaults.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            database_url: required("DATABASE_URL")?,
            client_id: required("OPENSKY_CLIENT_ID")?,
            client_secret: required("OPENSKY_CLIENT_SECRET")?,
            center_lat: optional_f64("CENTER_LAT", DEFAULT_CENTER_LAT)?,
            center_lon: optional_f64("CENTER_LON", DEFAULT_CENTER_LON)?,
            radius_km: optional_f64("RADIUS_KM", DEFAULT_RADIUS_KM)?,
            max_altitude_m: optional_f64("MAX_ALTITUDE_M", DEFAULT_MAX_ALTITUDE_M)?,
        })
    }
}

fn required(name: &str) -> Result<String> {
    std::env::var(name).with_context(|| format!("{name} must be set"))
}

fn optional_f64(name: &str, default: f64) -> Result<f64> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse::<f64>()
            .with_context(|| format!("{name} is not a valid number: '{raw}'")),
        Err(_) => Ok(default),
    }
}
