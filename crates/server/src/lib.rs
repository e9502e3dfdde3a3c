//! HTTP surface and bootstrap for the token broker.

pub mod config;
pub mod enrich;
pub mod routes;

pub use config::ServerConfig;
pub use routes::{router, AppState};
