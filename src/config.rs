use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::engine::EngineConfig;

// Default configuration constants
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:5000";
pub const DEFAULT_CREDENTIALS_FILE: &str = ".fleetdeck/credentials.json";
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_POLL_INSTANCES_SECS: u64 = 10;
pub const DEFAULT_POLL_METRICS_SECS: u64 = 3;
pub const DEFAULT_POLL_BILLING_SECS: u64 = 60;
pub const DEFAULT_POLL_HOSTS_SECS: u64 = 30;

pub fn load_env_file(env_file: Option<&str>) {
    if let Some(path) = env_file {
        dotenvy::from_path(Path::new(path)).ok();
    } else {
        dotenvy::dotenv().ok();
    }
}

pub fn get_api_base_url() -> String {
    sanitize_base_url(&env::var("FLEET_API_URL").unwrap_or_else(|_| DEFAULT_API_BASE_URL.to_string()))
}

pub fn get_credentials_file() -> PathBuf {
    env::var("FLEET_CREDENTIALS_FILE")
        .ok()
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CREDENTIALS_FILE))
}

pub fn get_http_timeout() -> Duration {
    secs_from_env("FLEET_HTTP_TIMEOUT_SECS", DEFAULT_HTTP_TIMEOUT_SECS)
}

/// Engine timing with poll cadences overridable from the environment.
pub fn get_engine_config() -> EngineConfig {
    EngineConfig {
        instances_every: secs_from_env("FLEET_POLL_INSTANCES_SECS", DEFAULT_POLL_INSTANCES_SECS),
        metrics_every: secs_from_env("FLEET_POLL_METRICS_SECS", DEFAULT_POLL_METRICS_SECS),
        billing_every: secs_from_env("FLEET_POLL_BILLING_SECS", DEFAULT_POLL_BILLING_SECS),
        hosts_every: secs_from_env("FLEET_POLL_HOSTS_SECS", DEFAULT_POLL_HOSTS_SECS),
        ..EngineConfig::default()
    }
}

/// Reads a positive number of seconds; zero, garbage or absence yield the default.
pub fn secs_from_env(var: &str, default_secs: u64) -> Duration {
    let secs = env::var(var)
        .ok()
        .and_then(|raw| raw.trim().parse::<u64>().ok())
        .filter(|s| *s > 0)
        .unwrap_or(default_secs);
    Duration::from_secs(secs)
}

pub fn sanitize_base_url(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        DEFAULT_API_BASE_URL.to_string()
    } else {
        trimmed.to_string()
    }
}
