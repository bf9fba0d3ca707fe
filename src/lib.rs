//! Host telemetry agent core: sampling, ranking, SQLite time series,
//! collection cycles, live fan-out, and the HTTP/WS surface.

pub mod api;
pub mod collector;
pub mod config;
pub mod hub;
pub mod sampler;
pub mod state;
pub mod store;
pub mod types;
pub mod ws;
