pub mod config;
pub mod fetch;
pub mod geo;
pub mod ingest;
pub mod server;
pub mod store;
