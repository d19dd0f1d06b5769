//! Daemon configuration – reads/writes `~/.soma/config.toml`.
//!
//! Every field has a serde default so a partial file (or none at all) still
//! yields a working daemon; `SOMA_*` environment variables override the file
//! for containerised deployments.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Persisted daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Bind host for the bridge API.
    #[serde(default = "default_bridge_host")]
    pub bridge_host: String,

    /// TCP port of the bridge API.
    #[serde(default = "default_bridge_port")]
    pub bridge_port: u16,

    /// TCP port of the line-delimited fallback transport.
    #[serde(default = "default_fallback_port")]
    pub fallback_port: u16,

    /// Bearer token required on bridge requests; empty disables auth.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub api_token: String,

    /// Bridge requests per minute per client IP; 0 disables throttling.
    #[serde(default = "default_rate_limit")]
    pub rate_limit_per_min: u32,

    /// Sensor capture cadence in milliseconds.
    #[serde(default = "default_capture_interval_ms")]
    pub capture_interval_ms: u64,

    /// Consecutive failures before a sensor is marked unavailable.
    #[serde(default = "default_sensor_fail_threshold")]
    pub sensor_fail_threshold: u32,

    /// Minimum object-detection score kept in snapshots.
    #[serde(default = "default_object_score")]
    pub object_score: f32,

    /// Minimum cosine similarity for a face identity match.
    #[serde(default = "default_face_match")]
    pub face_match: f32,

    /// Similarity at which two encodings count as the same person.
    #[serde(default = "default_face_collide")]
    pub face_collide: f32,

    /// Minimum cosine similarity for a room signature match.
    #[serde(default = "default_room_match")]
    pub room_match: f32,

    /// Object-sighting rows retained per class.
    #[serde(default = "default_object_retention")]
    pub object_retention: usize,

    /// Per-cycle budget for deep analysis (scene description, audio).
    #[serde(default = "default_analysis_deadline_ms")]
    pub analysis_deadline_ms: u64,

    /// HTTP endpoint of the remote scene analyzer; empty disables it.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub scene_analyzer_url: String,

    /// Brain silence window before the body degrades to fallback.
    #[serde(default = "default_probe_window_ms")]
    pub probe_window_ms: u64,

    /// Liveness probe cadence.
    #[serde(default = "default_probe_interval_ms")]
    pub probe_interval_ms: u64,

    /// Battery voltage that triggers the low-battery reaction.
    #[serde(default = "default_battery_low")]
    pub battery_low: f32,

    /// Path of the SQLite memory database; empty means
    /// `~/.soma/memory.db`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub memory_db: String,
}

fn default_bridge_host() -> String {
    "0.0.0.0".to_string()
}
fn default_bridge_port() -> u16 {
    8888
}
fn default_fallback_port() -> u16 {
    9999
}
fn default_rate_limit() -> u32 {
    60
}
fn default_capture_interval_ms() -> u64 {
    500
}
fn default_sensor_fail_threshold() -> u32 {
    5
}
fn default_object_score() -> f32 {
    0.5
}
fn default_face_match() -> f32 {
    0.6
}
fn default_face_collide() -> f32 {
    0.92
}
fn default_room_match() -> f32 {
    0.75
}
fn default_object_retention() -> usize {
    50
}
fn default_analysis_deadline_ms() -> u64 {
    1500
}
fn default_probe_window_ms() -> u64 {
    10_000
}
fn default_probe_interval_ms() -> u64 {
    2_000
}
fn default_battery_low() -> f32 {
    6.8
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bridge_host: default_bridge_host(),
            bridge_port: default_bridge_port(),
            fallback_port: default_fallback_port(),
            api_token: String::new(),
            rate_limit_per_min: default_rate_limit(),
            capture_interval_ms: default_capture_interval_ms(),
            sensor_fail_threshold: default_sensor_fail_threshold(),
            object_score: default_object_score(),
            face_match: default_face_match(),
            face_collide: default_face_collide(),
            room_match: default_room_match(),
            object_retention: default_object_retention(),
            analysis_deadline_ms: default_analysis_deadline_ms(),
            scene_analyzer_url: String::new(),
            probe_window_ms: default_probe_window_ms(),
            probe_interval_ms: default_probe_interval_ms(),
            battery_low: default_battery_low(),
            memory_db: String::new(),
        }
    }
}

impl Config {
    /// Resolved path of the memory database.
    pub fn memory_db_path(&self) -> PathBuf {
        if self.memory_db.is_empty() {
            config_dir().join("memory.db")
        } else {
            PathBuf::from(&self.memory_db)
        }
    }
}

/// `~/.soma` (or a fallback of `.soma` in the working directory).
pub fn config_dir() -> PathBuf {
    config_dir_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_dir_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".soma")
}

/// Return the path to `~/.soma/config.toml`.
pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

/// Load the config from disk.  Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, String> {
    load_from(&config_path())
}

pub(crate) fn load_from(path: &PathBuf) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("failed to read config at {}: {e}", path.display()))?;
    let mut cfg: Config =
        toml::from_str(&raw).map_err(|e| format!("failed to parse config: {e}"))?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// Apply `SOMA_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `SOMA_BRIDGE_PORT` | `bridge_port` |
/// | `SOMA_FALLBACK_PORT` | `fallback_port` |
/// | `SOMA_API_TOKEN` | `api_token` |
/// | `SOMA_CAPTURE_INTERVAL_MS` | `capture_interval_ms` |
/// | `SOMA_SCENE_ANALYZER_URL` | `scene_analyzer_url` |
/// | `SOMA_BATTERY_LOW` | `battery_low` |
/// | `SOMA_MEMORY_DB` | `memory_db` |
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("SOMA_BRIDGE_PORT")
        && let Ok(port) = v.parse::<u16>()
    {
        cfg.bridge_port = port;
    }
    if let Ok(v) = std::env::var("SOMA_FALLBACK_PORT")
        && let Ok(port) = v.parse::<u16>()
    {
        cfg.fallback_port = port;
    }
    if let Ok(v) = std::env::var("SOMA_API_TOKEN") {
        cfg.api_token = v;
    }
    if let Ok(v) = std::env::var("SOMA_CAPTURE_INTERVAL_MS")
        && let Ok(ms) = v.parse::<u64>()
    {
        cfg.capture_interval_ms = ms;
    }
    if let Ok(v) = std::env::var("SOMA_SCENE_ANALYZER_URL") {
        cfg.scene_analyzer_url = v;
    }
    if let Ok(v) = std::env::var("SOMA_BATTERY_LOW")
        && let Ok(volts) = v.parse::<f32>()
    {
        cfg.battery_low = volts;
    }
    if let Ok(v) = std::env::var("SOMA_MEMORY_DB") {
        cfg.memory_db = v;
    }
}

/// Save the config to disk, creating `~/.soma/` if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

pub(crate) fn save_to(cfg: &Config, path: &PathBuf) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| format!("failed to create config directory: {e}"))?;
        // The config can carry the API token; owner-only on Unix.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("failed to set config directory permissions: {e}"))?;
        }
    }
    let raw = toml::to_string_pretty(cfg).map_err(|e| format!("failed to serialize config: {e}"))?;
    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| f.write_all(raw.as_bytes()))
            .map_err(|e| format!("failed to write config at {}: {e}", path.display()))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw).map_err(|e| format!("failed to write config at {}: {e}", path.display()))?;
    Ok(())
}
