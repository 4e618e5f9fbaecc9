//! Acceptance filter between decoded state vectors and the store.

use crate::geo::is_within_radius;
use crate::ingest::state_vector::StateVector;
use crate::store::Position;

/// Region-of-interest thresholds, fixed at startup.
#[derive(Debug, Clone)]
pub struct FilterConfig {
    pub reference_lat: f64,
    pub reference_lon: f64,
    pub max_distance_km: f64,
    pub max_altitude_m: f64,
}

/// Why a decoded record was not persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// A position without coordinates carries no value for the pipeline.
    MissingCoordinates,
    /// Grounded aircraft are excluded from the tracked dataset.
    OnGround,
    /// Outside the configured radius around the reference point.
    OutOfRange,
    /// Above the altitude ceiling; high-altitude overflights are noise
    /// for this use case.
    AboveCeiling,
}

impl FilterConfig {
    /// Applies the acceptance predicates in order, short-circuiting on the
    /// first failure (cheapest and most discriminating checks first), and
    /// builds the [`Position`] for a surviving record. All optional fields
    /// pass through unchanged.
    pub fn screen(&self, state: StateVector) -> Result<Position, Rejection> {
        let (Some(latitude), Some(longitude)) = (state.latitude, state.longitude) else {
            return Err(Rejection::MissingCoordinates);
        };

        if state.on_ground == Some(true) {
            return Err(Rejection::OnGround);
        }

        if !is_within_radius(
            latitude,
            longitude,
            self.reference_lat,
            self.reference_lon,
            self.max_distance_km,
        ) {
            return Err(Rejection::OutOfRange);
        }

        if state.baro_altitude.is_some_and(|alt| alt > self.max_altitude_m) {
            return Err(Rejection::AboveCeiling);
        }

        Ok(Position {
            icao24: state.icao24,
            callsign: state.callsign,
            origin_country: state.origin_country,
            position_timestamp: state.time_position.unwrap_or(0.0),
            longitude,
            latitude,
            baro_altitude: state.baro_altitude,
            on_ground: state.on_ground,
            velocity: state.velocity,
            heading: state.heading,
            vertical_rate: state.vertical_rate,
        })
    }
}
