//! Sitegate - a portfolio site server with status aggregation
//!
//! This library provides a small single-binary web server that:
//! - Serves a built single-page app from disk with SPA fallback routing
//! - Aggregates monitor, heartbeat and uptime data from an Uptime-Kuma-style
//!   monitoring service into one status payload
//! - Reports a game-server status read from a sibling JSON file
//! - Exposes a deployment health check for blue/green slot probing
//! - Proxies all non-API traffic (WebSocket upgrades included) to a local
//!   development server when running in dev mode

pub mod config;
pub mod error;
pub mod proxy;
pub mod server;
pub mod static_files;
pub mod status;
pub mod upstream;
