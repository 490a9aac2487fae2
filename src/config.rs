use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Global configuration for the site server
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Upstream monitoring service configuration
    #[serde(default)]
    pub upstream: UpstreamConfig,

    /// Site content configuration
    #[serde(default)]
    pub site: SiteConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Listen port (default: 8080)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Bind address (default: 0.0.0.0)
    #[serde(default = "default_bind_address")]
    pub bind: String,

    /// Deployment slot identifier reported by the health check (default: "default")
    #[serde(default = "default_slot")]
    pub slot: String,

    /// Serving mode: static bundle from disk, or dev-server passthrough
    #[serde(default)]
    pub mode: ServerMode,

    /// Port of the local development server (dev mode only, default: 5173)
    #[serde(default = "default_dev_server_port")]
    pub dev_server_port: u16,
}

/// Serving mode for non-API traffic
#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ServerMode {
    /// Serve the built SPA bundle from the static root (default)
    #[default]
    Static,
    /// Forward non-API traffic to a local development server
    Dev,
}

impl ServerMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServerMode::Static => "static",
            ServerMode::Dev => "dev",
        }
    }
}

impl std::str::FromStr for ServerMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "static" => Ok(ServerMode::Static),
            "dev" | "proxy" => Ok(ServerMode::Dev),
            other => Err(format!(
                "unknown server mode '{}' (expected 'static' or 'dev')",
                other
            )),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct UpstreamConfig {
    /// Monitoring service host, reachable over plain HTTP (default: 127.0.0.1)
    #[serde(default = "default_upstream_host")]
    pub host: String,

    /// Monitoring service port (default: 3001)
    #[serde(default = "default_upstream_port")]
    pub port: u16,

    /// Status page slug on the monitoring service (default: "services")
    #[serde(default = "default_upstream_slug")]
    pub slug: String,

    /// Per-request timeout ceiling in seconds (default: 10)
    #[serde(default = "default_upstream_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SiteConfig {
    /// Root directory of the built SPA bundle (default: ./dist)
    #[serde(default = "default_static_root")]
    pub static_root: PathBuf,

    /// Path to the game-server status file written by an external process
    /// (default: ./minecraft-status.json)
    #[serde(default = "default_status_file")]
    pub status_file: PathBuf,
}

fn default_port() -> u16 {
    8080
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_slot() -> String {
    "default".to_string()
}

fn default_dev_server_port() -> u16 {
    5173
}

fn default_upstream_host() -> String {
    "127.0.0.1".to_string()
}

fn default_upstream_port() -> u16 {
    3001
}

fn default_upstream_slug() -> String {
    "services".to_string()
}

fn default_upstream_timeout() -> u64 {
    10
}

fn default_static_root() -> PathBuf {
    PathBuf::from("./dist")
}

fn default_status_file() -> PathBuf {
    PathBuf::from("./minecraft-status.json")
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind: default_bind_address(),
            slot: default_slot(),
            mode: ServerMode::default(),
            dev_server_port: default_dev_server_port(),
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            host: default_upstream_host(),
            port: default_upstream_port(),
            slug: default_upstream_slug(),
            timeout_secs: default_upstream_timeout(),
        }
    }
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            static_root: default_static_root(),
            status_file: default_status_file(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            upstream: UpstreamConfig::default(),
            site: SiteConfig::default(),
        }
    }
}

impl UpstreamConfig {
    /// Base URL of the monitoring service
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Config {
    /// Load configuration from a TOML file, then apply environment overrides.
    ///
    /// A missing file is not an error: all settings have defaults and may be
    /// driven entirely by environment variables.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let mut config = match std::fs::read_to_string(path.as_ref()) {
            Ok(content) => toml::from_str(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Config::default(),
            Err(e) => return Err(e.into()),
        };
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Override file-based settings from the process environment.
    ///
    /// Recognized variables: PORT, HOST, DEPLOYMENT_SLOT, SERVER_MODE,
    /// DEV_SERVER_PORT, UPSTREAM_HOST, UPSTREAM_PORT, UPSTREAM_SLUG,
    /// UPSTREAM_TIMEOUT_SECS, STATIC_ROOT, STATUS_FILE.
    pub fn apply_env(&mut self) -> anyhow::Result<()> {
        if let Some(port) = env_parse::<u16>("PORT")? {
            self.server.port = port;
        }
        if let Some(bind) = env_var("HOST") {
            self.server.bind = bind;
        }
        if let Some(slot) = env_var("DEPLOYMENT_SLOT") {
            self.server.slot = slot;
        }
        if let Some(mode) = env_parse::<ServerMode>("SERVER_MODE")? {
            self.server.mode = mode;
        }
        if let Some(port) = env_parse::<u16>("DEV_SERVER_PORT")? {
            self.server.dev_server_port = port;
        }
        if let Some(host) = env_var("UPSTREAM_HOST") {
            self.upstream.host = host;
        }
        if let Some(port) = env_parse::<u16>("UPSTREAM_PORT")? {
            self.upstream.port = port;
        }
        if let Some(slug) = env_var("UPSTREAM_SLUG") {
            self.upstream.slug = slug;
        }
        if let Some(timeout) = env_parse::<u64>("UPSTREAM_TIMEOUT_SECS")? {
            self.upstream.timeout_secs = timeout;
        }
        if let Some(root) = env_var("STATIC_ROOT") {
            self.site.static_root = PathBuf::from(root);
        }
        if let Some(path) = env_var("STATUS_FILE") {
            self.site.status_file = PathBuf::from(path);
        }
        Ok(())
    }

    /// Validate all configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        let mut errors = Vec::new();

        if self.server.port == 0 {
            errors.push("server.port must be non-zero".to_string());
        }
        if self.server.bind.is_empty() {
            errors.push("server.bind must not be empty".to_string());
        }
        if self.upstream.host.is_empty() {
            errors.push("upstream.host must not be empty".to_string());
        }
        if self.upstream.slug.is_empty() {
            errors.push("upstream.slug must not be empty".to_string());
        }
        if self.upstream.timeout_secs == 0 {
            errors.push("upstream.timeout_secs must be non-zero".to_string());
        }
        if self.server.mode == ServerMode::Dev && self.server.dev_server_port == 0 {
            errors.push("server.dev_server_port must be non-zero in dev mode".to_string());
        }

        if !errors.is_empty() {
            anyhow::bail!("Configuration errors:\n  - {}", errors.join("\n  - "));
        }

        Ok(())
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn env_parse<T: std::str::FromStr>(name: &str) -> anyhow::Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match env_var(name) {
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("Invalid {}: {}", name, e)),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.bind, "0.0.0.0");
        assert_eq!(config.server.slot, "default");
        assert_eq!(config.server.mode, ServerMode::Static);
        assert_eq!(config.upstream.host, "127.0.0.1");
        assert_eq!(config.upstream.port, 3001);
        assert_eq!(config.upstream.slug, "services");
        assert_eq!(config.upstream.timeout_secs, 10);
        assert_eq!(config.site.static_root, PathBuf::from("./dist"));
        assert_eq!(
            config.site.status_file,
            PathBuf::from("./minecraft-status.json")
        );
    }

    #[test]
    fn test_parse_config() {
        let toml_str = r#"
[server]
port = 3000
bind = "127.0.0.1"
slot = "green"
mode = "dev"
dev_server_port = 5174

[upstream]
host = "10.0.0.5"
port = 3002
slug = "homelab"
timeout_secs = 5

[site]
static_root = "/srv/www/dist"
status_file = "/srv/www/minecraft-status.json"
"#;
        let config: Config = toml::from_str(toml_str).expect("valid config");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.slot, "green");
        assert_eq!(config.server.mode, ServerMode::Dev);
        assert_eq!(config.server.dev_server_port, 5174);
        assert_eq!(config.upstream.base_url(), "http://10.0.0.5:3002");
        assert_eq!(config.upstream.slug, "homelab");
        assert_eq!(config.site.static_root, PathBuf::from("/srv/www/dist"));
        config.validate().expect("valid config");
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let toml_str = r#"
[server]
port = 9000
"#;
        let config: Config = toml::from_str(toml_str).expect("valid config");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.bind, "0.0.0.0");
        assert_eq!(config.upstream.port, 3001);
    }

    #[test]
    fn test_mode_from_str() {
        assert_eq!("static".parse::<ServerMode>(), Ok(ServerMode::Static));
        assert_eq!("dev".parse::<ServerMode>(), Ok(ServerMode::Dev));
        assert_eq!("DEV".parse::<ServerMode>(), Ok(ServerMode::Dev));
        assert!("production".parse::<ServerMode>().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_port() {
        let mut config = Config::default();
        config.server.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let mut config = Config::default();
        config.upstream.timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_overrides() {
        std::env::set_var("PORT", "4242");
        std::env::set_var("DEPLOYMENT_SLOT", "blue");
        std::env::set_var("UPSTREAM_HOST", "192.168.1.50");

        let mut config = Config::default();
        config.apply_env().expect("valid env");

        std::env::remove_var("PORT");
        std::env::remove_var("DEPLOYMENT_SLOT");
        std::env::remove_var("UPSTREAM_HOST");

        assert_eq!(config.server.port, 4242);
        assert_eq!(config.server.slot, "blue");
        assert_eq!(config.upstream.host, "192.168.1.50");
    }
}
