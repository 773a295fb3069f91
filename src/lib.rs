pub mod auth;
pub mod cache;
pub mod config;
pub mod proxy;
pub mod reload;
pub mod store;
pub mod telemetry;
