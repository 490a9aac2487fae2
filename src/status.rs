//! Status aggregation for the portfolio site
//!
//! Combines the monitoring service's group listing and heartbeat payloads
//! into one response shape, reads the game-server status file, and builds the
//! deployment health record. All upstream data is passed through opaquely;
//! nothing here validates or reshapes individual monitor entries.

use crate::config::Config;
use crate::error::UpstreamError;
use crate::upstream::MonitorClient;
use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use std::path::Path;
use std::time::Instant;
use tracing::{debug, warn};

/// The composed status response: `{ monitors, heartbeats, uptimes }`.
///
/// Built fresh on every request; either fully populated from both upstream
/// calls or not produced at all.
#[derive(Debug, Serialize)]
pub struct AggregatedStatus {
    pub monitors: Value,
    pub heartbeats: Value,
    pub uptimes: Value,
}

/// Fetches and merges status data from the monitoring service.
///
/// One aggregator serves both the static and dev server modes; the upstream
/// target comes from the resolved configuration rather than per-mode code
/// paths.
pub struct StatusAggregator {
    client: MonitorClient,
    services_path: String,
    heartbeat_path: String,
}

impl StatusAggregator {
    pub fn new(config: &Config) -> Self {
        Self {
            client: MonitorClient::new(&config.upstream),
            services_path: format!("/api/status-page/{}", config.upstream.slug),
            heartbeat_path: format!("/api/status-page/heartbeat/{}", config.upstream.slug),
        }
    }

    /// Fetch both upstream payloads concurrently and merge them.
    ///
    /// The two calls have no ordering dependency; the first failure wins and
    /// the caller gets no partial result.
    pub async fn fetch_status(&self) -> Result<AggregatedStatus, UpstreamError> {
        let (services, heartbeat) = tokio::try_join!(
            self.client.fetch_json(&self.services_path),
            self.client.fetch_json(&self.heartbeat_path),
        )?;
        combine(services, heartbeat)
    }
}

/// Merge the two status-page payloads into one response shape.
///
/// Monitors come from `publicGroupList[0].monitorList`; an empty group list
/// is an explicit failure, not an index panic.
fn combine(services: Value, heartbeat: Value) -> Result<AggregatedStatus, UpstreamError> {
    let monitors = services
        .get("publicGroupList")
        .and_then(Value::as_array)
        .ok_or(UpstreamError::MissingField("publicGroupList"))?
        .first()
        .ok_or(UpstreamError::EmptyGroupList)?
        .get("monitorList")
        .cloned()
        .ok_or(UpstreamError::MissingField("monitorList"))?;

    let heartbeats = heartbeat
        .get("heartbeatList")
        .cloned()
        .ok_or(UpstreamError::MissingField("heartbeatList"))?;

    let uptimes = heartbeat
        .get("uptimeList")
        .cloned()
        .ok_or(UpstreamError::MissingField("uptimeList"))?;

    Ok(AggregatedStatus {
        monitors,
        heartbeats,
        uptimes,
    })
}

/// Read the game-server status file, passing its contents through unchanged.
///
/// The file is written by an external process and only ever read here; a
/// missing or malformed file degrades to the offline fallback object so the
/// front end always has something to render.
pub async fn read_game_status(path: &Path) -> Value {
    match tokio::fs::read(path).await {
        Ok(bytes) => match serde_json::from_slice(&bytes) {
            Ok(value) => value,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Game status file is malformed");
                offline_fallback()
            }
        },
        Err(e) => {
            debug!(path = %path.display(), error = %e, "Game status file unavailable");
            offline_fallback()
        }
    }
}

fn offline_fallback() -> Value {
    json!({
        "online": false,
        "players": { "online": 0, "max": 20 },
        "motd": null,
        "error": "Status unavailable",
    })
}

/// Ephemeral health record for deployment slot probing
#[derive(Debug, Serialize)]
pub struct DeploymentHealth {
    pub status: &'static str,
    pub slot: String,
    pub timestamp: String,
    pub uptime_seconds: u64,
}

impl DeploymentHealth {
    pub fn now(slot: &str, started_at: Instant) -> Self {
        Self {
            status: "healthy",
            slot: slot.to_string(),
            timestamp: Utc::now().to_rfc3339(),
            uptime_seconds: started_at.elapsed().as_secs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_services() -> Value {
        json!({
            "publicGroupList": [
                {
                    "name": "Services",
                    "monitorList": [
                        { "id": 1, "name": "website" },
                        { "id": 2, "name": "git" }
                    ]
                }
            ]
        })
    }

    fn sample_heartbeat() -> Value {
        json!({
            "heartbeatList": {
                "1": [ { "time": "2025-01-01 00:00:00", "status": 1, "ping": 12 } ],
                "2": [ { "time": "2025-01-01 00:00:00", "status": 0, "ping": null } ]
            },
            "uptimeList": { "1_24": 99.95, "2_24": 87.5 }
        })
    }

    #[test]
    fn test_combine_sources_each_key() {
        let status = combine(sample_services(), sample_heartbeat()).expect("combines");
        assert_eq!(status.monitors, sample_services()["publicGroupList"][0]["monitorList"]);
        assert_eq!(status.heartbeats, sample_heartbeat()["heartbeatList"]);
        assert_eq!(status.uptimes, sample_heartbeat()["uptimeList"]);
    }

    #[test]
    fn test_combine_serializes_with_exactly_three_keys() {
        let status = combine(sample_services(), sample_heartbeat()).expect("combines");
        let value = serde_json::to_value(&status).expect("serializes");
        let keys: Vec<&String> = value.as_object().expect("object").keys().collect();
        assert_eq!(keys, ["heartbeats", "monitors", "uptimes"]);
    }

    #[test]
    fn test_empty_group_list_is_explicit_failure() {
        let services = json!({ "publicGroupList": [] });
        let err = combine(services, sample_heartbeat()).unwrap_err();
        assert!(matches!(err, UpstreamError::EmptyGroupList));
    }

    #[test]
    fn test_missing_group_list_key() {
        let services = json!({ "incident": null });
        let err = combine(services, sample_heartbeat()).unwrap_err();
        assert!(matches!(
            err,
            UpstreamError::MissingField("publicGroupList")
        ));
    }

    #[test]
    fn test_missing_heartbeat_list_key() {
        let heartbeat = json!({ "uptimeList": {} });
        let err = combine(sample_services(), heartbeat).unwrap_err();
        assert!(matches!(err, UpstreamError::MissingField("heartbeatList")));
    }

    #[test]
    fn test_offline_fallback_shape() {
        let fallback = offline_fallback();
        assert_eq!(fallback["online"], json!(false));
        assert_eq!(fallback["players"]["online"], json!(0));
        assert_eq!(fallback["players"]["max"], json!(20));
        assert_eq!(fallback["motd"], Value::Null);
        assert_eq!(fallback["error"], json!("Status unavailable"));
    }

    #[tokio::test]
    async fn test_read_game_status_passes_file_through() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("minecraft-status.json");
        let status = json!({
            "online": true,
            "players": { "online": 3, "max": 20 },
            "motd": "A Minecraft Server"
        });
        std::fs::write(&path, status.to_string()).expect("write status file");

        let value = read_game_status(&path).await;
        assert_eq!(value, status);
    }

    #[tokio::test]
    async fn test_read_game_status_missing_file_degrades() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("does-not-exist.json");
        let value = read_game_status(&path).await;
        assert_eq!(value, offline_fallback());
    }

    #[tokio::test]
    async fn test_read_game_status_malformed_file_degrades() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("minecraft-status.json");
        std::fs::write(&path, "{ not json").expect("write status file");

        let value = read_game_status(&path).await;
        assert_eq!(value, offline_fallback());
    }

    #[test]
    fn test_deployment_health_record() {
        let health = DeploymentHealth::now("blue", Instant::now());
        assert_eq!(health.status, "healthy");
        assert_eq!(health.slot, "blue");
        assert!(!health.timestamp.is_empty());
        assert!(health.uptime_seconds < 5);
    }
}
