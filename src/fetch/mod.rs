//! HTTP transport for the OpenSky API.
//!
//! [`HttpClient`] is the seam the fetch scheduler issues requests through,
//! so tests can substitute canned responses. [`BasicClient`] is the real
//! reqwest-backed implementation. [`token`] handles the OAuth
//! client-credentials exchange.

mod client;
pub mod token;

pub use client::{BasicClient, HttpClient};
