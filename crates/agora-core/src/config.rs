use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

// Wire constants shared by every realtime endpoint
pub const DEFAULT_REALTIME_URL: &str = "ws://localhost:8080/ws";
pub const NORMAL_CLOSURE_CODE: u16 = 1000;
pub const MAX_FRAME_BYTES: usize = 128 * 1024; // 128 KB cap per inbound frame
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 3_000;
pub const DEFAULT_RECONNECT_MAX_DELAY_MS: u64 = 30_000;
pub const DEFAULT_TYPING_IDLE_MS: u64 = 2_000;
pub const DEFAULT_NOTIFICATION_CAPACITY: usize = 200;

/// Top-level config (agora.toml + AGORA_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgoraConfig {
    #[serde(default)]
    pub realtime: RealtimeConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

/// Settings for the single realtime channel a session owns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    /// WebSocket endpoint, e.g. `ws://localhost:8080/ws`.
    #[serde(default = "default_url")]
    pub url: String,
    /// Session cookie sent with the upgrade request. The server resolves the
    /// user from it; without one the upgrade is rejected with 401.
    #[serde(default)]
    pub cookie: Option<String>,
    /// Inbound frames larger than this are dropped.
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,
    /// When set, a `ping` envelope is sent at this cadence while open.
    #[serde(default)]
    pub heartbeat_interval_secs: Option<u64>,
    /// Event type assigned to frames that carry no `type` field.
    /// The likes endpoint pushes bare like updates, so `"like"` is the usual value there.
    #[serde(default)]
    pub untagged_event_type: Option<String>,
    #[serde(default)]
    pub reconnect: ReconnectConfig,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            cookie: None,
            max_frame_bytes: MAX_FRAME_BYTES,
            heartbeat_interval_secs: None,
            untagged_event_type: None,
            reconnect: ReconnectConfig::default(),
        }
    }
}

/// How the delay before the next reconnect attempt is chosen.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReconnectStrategy {
    /// Same delay before every attempt.
    #[default]
    Fixed,
    /// Delay doubles per failed attempt up to `max_delay_ms`, with jitter.
    Exponential,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectConfig {
    #[serde(default = "bool_true")]
    pub enabled: bool,
    #[serde(default)]
    pub strategy: ReconnectStrategy,
    #[serde(default = "default_reconnect_delay_ms")]
    pub delay_ms: u64,
    #[serde(default = "default_reconnect_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Jitter fraction applied to exponential delays (0.1 = up to +10 %).
    #[serde(default = "default_jitter")]
    pub jitter: f64,
    /// Give up after this many consecutive failed attempts. `None` retries forever.
    #[serde(default)]
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            strategy: ReconnectStrategy::Fixed,
            delay_ms: DEFAULT_RECONNECT_DELAY_MS,
            max_delay_ms: DEFAULT_RECONNECT_MAX_DELAY_MS,
            jitter: default_jitter(),
            max_attempts: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Id of the signed-in user. Resolved once at login and threaded to
    /// every consumer that needs ownership checks.
    #[serde(default)]
    pub user_id: Option<u64>,
    #[serde(default = "default_notification_capacity")]
    pub notification_capacity: usize,
    /// Quiet period after the last keystroke before `typing: false` is sent.
    #[serde(default = "default_typing_idle_ms")]
    pub typing_idle_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            user_id: None,
            notification_capacity: DEFAULT_NOTIFICATION_CAPACITY,
            typing_idle_ms: DEFAULT_TYPING_IDLE_MS,
        }
    }
}

fn bool_true() -> bool {
    true
}
fn default_url() -> String {
    DEFAULT_REALTIME_URL.to_string()
}
fn default_max_frame_bytes() -> usize {
    MAX_FRAME_BYTES
}
fn default_reconnect_delay_ms() -> u64 {
    DEFAULT_RECONNECT_DELAY_MS
}
fn default_reconnect_max_delay_ms() -> u64 {
    DEFAULT_RECONNECT_MAX_DELAY_MS
}
fn default_jitter() -> f64 {
    0.10
}
fn default_notification_capacity() -> usize {
    DEFAULT_NOTIFICATION_CAPACITY
}
fn default_typing_idle_ms() -> u64 {
    DEFAULT_TYPING_IDLE_MS
}

impl AgoraConfig {
    /// Load config from a TOML file with AGORA_* env var overrides.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. ~/.agora/agora.toml
    ///
    /// Nested keys use a double underscore: `AGORA_REALTIME__URL`.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);
        debug!(path = %path, "loading config");
        if !std::path::Path::new(&path).exists() {
            warn!(path = %path, "config file not found, using defaults and environment");
        }

        Self::figment(&path)
            .extract()
            .map_err(|e| crate::error::AgoraError::Config(e.to_string()))
    }

    fn figment(path: &str) -> Figment {
        Figment::from(Serialized::defaults(AgoraConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("AGORA_").split("__"))
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.agora/agora.toml", home)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_observed_client() {
        let config = AgoraConfig::default();
        assert_eq!(config.realtime.url, "ws://localhost:8080/ws");
        assert_eq!(config.realtime.reconnect.delay_ms, 3_000);
        assert_eq!(config.realtime.reconnect.strategy, ReconnectStrategy::Fixed);
        assert!(config.realtime.reconnect.enabled);
        assert!(config.realtime.reconnect.max_attempts.is_none());
        assert_eq!(config.session.typing_idle_ms, 2_000);
    }

    #[test]
    fn missing_file_yields_defaults() {
        figment::Jail::expect_with(|jail| {
            let path = jail.directory().join("absent.toml");
            let config = AgoraConfig::load(path.to_str()).expect("load");
            assert_eq!(config.realtime.max_frame_bytes, MAX_FRAME_BYTES);
            Ok(())
        });
    }

    #[test]
    fn toml_then_env_override() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "agora.toml",
                r#"
                [realtime]
                url = "ws://chat.example:9000/ws/chat"
                untagged_event_type = "like"

                [realtime.reconnect]
                strategy = "exponential"
                delay_ms = 500

                [session]
                user_id = 7
                "#,
            )?;
            jail.set_env("AGORA_REALTIME__RECONNECT__MAX_ATTEMPTS", "4");

            let config = AgoraConfig::load(Some("agora.toml")).expect("load");
            assert_eq!(config.realtime.url, "ws://chat.example:9000/ws/chat");
            assert_eq!(config.realtime.untagged_event_type.as_deref(), Some("like"));
            assert_eq!(
                config.realtime.reconnect.strategy,
                ReconnectStrategy::Exponential
            );
            assert_eq!(config.realtime.reconnect.delay_ms, 500);
            assert_eq!(config.realtime.reconnect.max_attempts, Some(4));
            assert_eq!(config.realtime.reconnect.max_delay_ms, 30_000);
            assert_eq!(config.session.user_id, Some(7));
            Ok(())
        });
    }

    #[test]
    fn invalid_value_is_config_error() {
        figment::Jail::expect_with(|jail| {
            jail.create_file("agora.toml", "[realtime]\nmax_frame_bytes = \"lots\"\n")?;
            let err = AgoraConfig::load(Some("agora.toml")).unwrap_err();
            assert_eq!(err.code(), "CONFIG_ERROR");
            Ok(())
        });
    }
}
