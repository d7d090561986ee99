// Library for the binary and for tests

pub mod aggregate;
pub mod aggregator;
pub mod config;
pub mod fetcher;
pub mod live_channel;
pub mod models;
pub mod publisher;
pub mod routes;
pub mod version;
pub mod window;
