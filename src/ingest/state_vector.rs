//! Decoding of OpenSky state vectors.
//!
//! The wire format is a positionally-encoded heterogeneous array:
//! `[icao24, callsign, origin_country, time_position, last_contact,
//! longitude, latitude, baro_altitude, on_ground, velocity, heading,
//! vertical_rate, …]`. Any field may be null, and the API occasionally
//! returns the wrong primitive kind; extraction is deliberately total,
//! mapping anything unexpected to "absent" instead of failing the record.
//! The one hard rule is arity: fewer than twelve elements is malformed.

use serde_json::Value;

/// Minimum number of elements in a well-formed state vector.
pub const MIN_FIELDS: usize = 12;

/// One positional telemetry record with every field typed and optional.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StateVector {
    pub icao24: Option<String>,
    pub callsign: Option<String>,
    pub origin_country: Option<String>,
    pub time_position: Option<f64>,
    pub last_contact: Option<f64>,
    pub longitude: Option<f64>,
    pub latitude: Option<f64>,
    pub baro_altitude: Option<f64>,
    pub on_ground: Option<bool>,
    pub velocity: Option<f64>,
    pub heading: Option<f64>,
    pub vertical_rate: Option<f64>,
}

impl StateVector {
    /// Decodes one raw record, or returns `None` when it is shorter than
    /// [`MIN_FIELDS`]. Individual field mismatches never reject the record.
    pub fn decode(raw: &[Value]) -> Option<Self> {
        if raw.len() < MIN_FIELDS {
            return None;
        }

        Some(Self {
            icao24: opt_string(raw.get(0)),
            callsign: opt_string(raw.get(1)),
            origin_country: opt_string(raw.get(2)),
            time_position: opt_f64(raw.get(3)),
            last_contact: opt_f64(raw.get(4)),
            longitude: opt_f64(raw.get(5)),
            latitude: opt_f64(raw.get(6)),
            baro_altitude: opt_f64(raw.get(7)),
            on_ground: opt_bool(raw.get(8)),
            velocity: opt_f64(raw.get(9)),
            heading: opt_f64(raw.get(10)),
            vertical_rate: opt_f64(raw.get(11)),
        })
    }
}

// Empty strings count as absent, matching how the upstream feed uses them.
fn opt_string(v: Option<&Value>) -> Option<String> {
    v.and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
}

fn opt_f64(v: Option<&Value>) -> Option<f64> {
    v.and_then(Value::as_f64)
}

fn opt_bool(v: Option<&Value>) -> Option<bool> {
    v.and_then(Value::as_bool)
}
