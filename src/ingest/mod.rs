//! The ingestion pipeline: decode OpenSky state vectors, filter them to
//! the region of interest, and persist survivors.
//!
//! [`state_vector`] turns one raw positional record into typed optionals,
//! [`filter`] applies the acceptance predicates, and [`scheduler`] owns the
//! poll-decode-filter-store cycle and its rate-limit backoff state.

pub mod filter;
pub mod scheduler;
pub mod state_vector;
