use std::fmt;
use std::path::Path;
use std::time::Duration;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::credential::ApiKey;
use crate::error::{InitError, ValidationError};
use crate::ssrf::validate_base_url;

pub const DEFAULT_BASE_URL: &str = "https://api.steampowered.com";
pub const DEFAULT_SETTINGS_FILE: &str = "steamgate.toml";
const ENV_PREFIX: &str = "STEAMGATE_";

const DEFAULT_DAILY_LIMIT: u32 = 100_000;
const DEFAULT_BURST_LIMIT: u32 = 200;
const DEFAULT_BURST_WINDOW_SECS: u64 = 300;
const DEFAULT_WARN_RATIO: f64 = 0.8;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 5;
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Limits enforced by the quota tracker. Immutable once the dispatcher starts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuotaConfig {
    /// Calls allowed per calendar day.
    pub daily_limit: u32,
    /// Calls allowed inside any trailing `burst_window`.
    pub burst_limit: u32,
    pub burst_window: Duration,
    /// Fraction of `daily_limit` past which every admission logs a warning.
    pub daily_warn_ratio: f64,
    /// Fraction of `burst_limit` past which every admission logs a warning.
    pub burst_warn_ratio: f64,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            daily_limit: DEFAULT_DAILY_LIMIT,
            burst_limit: DEFAULT_BURST_LIMIT,
            burst_window: Duration::from_secs(DEFAULT_BURST_WINDOW_SECS),
            daily_warn_ratio: DEFAULT_WARN_RATIO,
            burst_warn_ratio: DEFAULT_WARN_RATIO,
        }
    }
}

impl QuotaConfig {
    pub fn validate(&self) -> Result<(), InitError> {
        if self.daily_limit == 0 {
            return Err(InitError::Config("daily limit must be positive".into()));
        }
        if self.burst_limit == 0 {
            return Err(InitError::Config("burst limit must be positive".into()));
        }
        if self.burst_window.is_zero() {
            return Err(InitError::Config("burst window must be positive".into()));
        }
        for (name, ratio) in [
            ("daily warn ratio", self.daily_warn_ratio),
            ("burst warn ratio", self.burst_warn_ratio),
        ] {
            if !(0.0..=1.0).contains(&ratio) {
                return Err(InitError::Config(format!(
                    "{name} must be within [0, 1], got {ratio}"
                )));
            }
        }
        Ok(())
    }
}

/// Runtime knobs of the dispatcher worker.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub quota: QuotaConfig,
    /// Timeout handed to the transport for every outbound call.
    pub request_timeout: Duration,
    /// How long the worker blocks on an empty queue before re-checking the stop signal.
    pub poll_interval: Duration,
    /// Jobs allowed to wait in the queue; `None` is unbounded.
    pub max_queue_depth: Option<usize>,
    /// Bound on how long `shutdown` waits for the worker to exit.
    pub shutdown_timeout: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self::new(QuotaConfig::default())
    }
}

impl DispatcherConfig {
    pub fn new(quota: QuotaConfig) -> Self {
        Self {
            quota,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_queue_depth: None,
            shutdown_timeout: Duration::from_secs(DEFAULT_SHUTDOWN_TIMEOUT_SECS),
        }
    }

    pub fn validate(&self) -> Result<(), InitError> {
        self.quota.validate()?;
        if self.request_timeout.is_zero() {
            return Err(InitError::Config("request timeout must be positive".into()));
        }
        if self.poll_interval.is_zero() {
            return Err(InitError::Config("poll interval must be positive".into()));
        }
        if self.max_queue_depth == Some(0) {
            return Err(InitError::Config(
                "max queue depth must be positive when set".into(),
            ));
        }
        Ok(())
    }
}

/// Process settings, loaded once at startup.
///
/// Layers, lowest priority first: compiled defaults, the TOML settings file,
/// `STEAM_API_KEY`, then `STEAMGATE_*` environment variables.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub steam_api_key: Option<String>,
    pub steam_api_base_url: String,
    pub steam_api_default_version: u32,

    pub rate_limit: u32,
    pub burst_limit: u32,
    pub burst_window_seconds: u64,
    pub rate_warn_threshold: f64,
    pub burst_warn_threshold: f64,

    pub request_timeout_seconds: u64,
    pub max_queue_depth: Option<usize>,
    pub call_timeout_seconds: Option<u64>,
    pub shutdown_timeout_seconds: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            steam_api_key: None,
            steam_api_base_url: DEFAULT_BASE_URL.to_string(),
            steam_api_default_version: 1,
            rate_limit: DEFAULT_DAILY_LIMIT,
            burst_limit: DEFAULT_BURST_LIMIT,
            burst_window_seconds: DEFAULT_BURST_WINDOW_SECS,
            rate_warn_threshold: DEFAULT_WARN_RATIO,
            burst_warn_threshold: DEFAULT_WARN_RATIO,
            request_timeout_seconds: DEFAULT_REQUEST_TIMEOUT_SECS,
            max_queue_depth: None,
            call_timeout_seconds: None,
            shutdown_timeout_seconds: DEFAULT_SHUTDOWN_TIMEOUT_SECS,
        }
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("steam_api_key", &self.credential().ok().flatten())
            .field("steam_api_base_url", &self.steam_api_base_url)
            .field("steam_api_default_version", &self.steam_api_default_version)
            .field("rate_limit", &self.rate_limit)
            .field("burst_limit", &self.burst_limit)
            .field("burst_window_seconds", &self.burst_window_seconds)
            .field("rate_warn_threshold", &self.rate_warn_threshold)
            .field("burst_warn_threshold", &self.burst_warn_threshold)
            .field("request_timeout_seconds", &self.request_timeout_seconds)
            .field("max_queue_depth", &self.max_queue_depth)
            .field("call_timeout_seconds", &self.call_timeout_seconds)
            .field("shutdown_timeout_seconds", &self.shutdown_timeout_seconds)
            .finish()
    }
}

impl Settings {
    /// Load from `steamgate.toml` in the working directory (if present) and the environment.
    pub fn load() -> Result<Self, InitError> {
        Self::from_figment(Self::figment(Path::new(DEFAULT_SETTINGS_FILE)))
    }

    /// Load from an explicit settings file, which must exist.
    pub fn load_from(path: &Path) -> Result<Self, InitError> {
        if !path.is_file() {
            return Err(InitError::Config(format!(
                "settings file not found: {}",
                path.display()
            )));
        }
        Self::from_figment(Self::figment(path))
    }

    /// The provider stack used by `load`; exposed so callers can add layers.
    pub fn figment(file: &Path) -> Figment {
        Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(file))
            .merge(Env::raw().only(&["steam_api_key"]))
            .merge(Env::prefixed(ENV_PREFIX))
    }

    pub fn from_figment(figment: Figment) -> Result<Self, InitError> {
        let settings: Settings = figment.extract()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), InitError> {
        self.dispatcher().validate()?;
        if self.steam_api_default_version == 0 {
            return Err(InitError::Config(
                "steam_api_default_version must be at least 1".into(),
            ));
        }
        validate_base_url(&self.steam_api_base_url)?;
        self.credential()?;
        Ok(())
    }

    pub fn quota(&self) -> QuotaConfig {
        QuotaConfig {
            daily_limit: self.rate_limit,
            burst_limit: self.burst_limit,
            burst_window: Duration::from_secs(self.burst_window_seconds),
            daily_warn_ratio: self.rate_warn_threshold,
            burst_warn_ratio: self.burst_warn_threshold,
        }
    }

    pub fn dispatcher(&self) -> DispatcherConfig {
        DispatcherConfig {
            request_timeout: Duration::from_secs(self.request_timeout_seconds),
            max_queue_depth: self.max_queue_depth,
            shutdown_timeout: Duration::from_secs(self.shutdown_timeout_seconds),
            ..DispatcherConfig::new(self.quota())
        }
    }

    /// The configured API key. A blank value counts as not configured.
    pub fn credential(&self) -> Result<Option<ApiKey>, ValidationError> {
        match self.steam_api_key.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(raw) => ApiKey::new(raw).map(Some),
        }
    }

    pub fn call_timeout(&self) -> Option<Duration> {
        self.call_timeout_seconds.map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_steam_quotas() {
        let settings = Settings::default();
        let quota = settings.quota();
        assert_eq!(quota.daily_limit, 100_000);
        assert_eq!(quota.burst_limit, 200);
        assert_eq!(quota.burst_window, Duration::from_secs(300));
        assert_eq!(settings.steam_api_base_url, DEFAULT_BASE_URL);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn dispatcher_config_carries_knobs() {
        let settings = Settings {
            request_timeout_seconds: 3,
            max_queue_depth: Some(16),
            shutdown_timeout_seconds: 1,
            ..Settings::default()
        };
        let config = settings.dispatcher();
        assert_eq!(config.request_timeout, Duration::from_secs(3));
        assert_eq!(config.max_queue_depth, Some(16));
        assert_eq!(config.shutdown_timeout, Duration::from_secs(1));
        assert_eq!(config.poll_interval, DEFAULT_POLL_INTERVAL);
    }

    #[test]
    fn validate_rejects_zero_limits() {
        let settings = Settings {
            burst_limit: 0,
            ..Settings::default()
        };
        assert!(matches!(settings.validate(), Err(InitError::Config(_))));

        let settings = Settings {
            rate_limit: 0,
            ..Settings::default()
        };
        assert!(matches!(settings.validate(), Err(InitError::Config(_))));
    }

    #[test]
    fn validate_rejects_ratio_out_of_range() {
        let settings = Settings {
            burst_warn_threshold: 1.5,
            ..Settings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_queue_depth() {
        let settings = Settings {
            max_queue_depth: Some(0),
            ..Settings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn validate_rejects_plain_http_base_url() {
        let settings = Settings {
            steam_api_base_url: "http://api.steampowered.com".into(),
            ..Settings::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(InitError::Validation(ValidationError::BaseUrl(_)))
        ));
    }

    #[test]
    fn blank_key_counts_as_missing() {
        let settings = Settings {
            steam_api_key: Some("   ".into()),
            ..Settings::default()
        };
        assert!(settings.credential().unwrap().is_none());
    }

    #[test]
    fn debug_output_hides_key() {
        let settings = Settings {
            steam_api_key: Some("SECRETKEY123".into()),
            ..Settings::default()
        };
        let rendered = format!("{settings:?}");
        assert!(!rendered.contains("SECRETKEY123"));
        assert!(rendered.contains("key_"));
    }

    #[test]
    fn toml_layer_overrides_defaults() {
        let figment = Figment::from(Serialized::defaults(Settings::default())).merge(
            Toml::string(
                r#"
                burst_limit = 5
                burst_window_seconds = 60
                max_queue_depth = 32
                "#,
            ),
        );
        let settings = Settings::from_figment(figment).unwrap();
        assert_eq!(settings.burst_limit, 5);
        assert_eq!(settings.burst_window_seconds, 60);
        assert_eq!(settings.max_queue_depth, Some(32));
        assert_eq!(settings.rate_limit, DEFAULT_DAILY_LIMIT);
    }
}
