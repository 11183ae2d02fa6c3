//! Configuration for the provisioning service.

use crate::reload::{RetryPolicy, DEFAULT_HEALTH_TTL};
use anyhow::{Context, Result};
use governor::Quota;
use serde::Deserialize;
use std::num::NonZeroU32;
use std::path::PathBuf;
use std::time::Duration;

/// Service configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Telephony server configuration file and account defaults
    #[serde(default)]
    pub telephony: TelephonyConfig,

    /// Asterisk Manager Interface connection
    #[serde(default)]
    pub ami: AmiConfig,

    /// Reload retry behaviour
    #[serde(default)]
    pub reload: ReloadConfig,

    /// Registry storage configuration
    #[serde(default)]
    pub registry: RegistryConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Logging configuration
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Server listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelephonyConfig {
    /// PJSIP include file that receives new accounts
    #[serde(default = "default_config_path")]
    pub config_path: PathBuf,

    /// Template every new account section inherits from
    #[serde(default = "default_account_template")]
    pub account_template: String,

    /// SIP server address handed to clients
    #[serde(default = "default_server_address")]
    pub server_address: String,

    /// Module reloaded after each write
    #[serde(default = "default_reload_module")]
    pub reload_module: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AmiConfig {
    #[serde(default = "default_ami_host")]
    pub host: String,

    #[serde(default = "default_ami_port")]
    pub port: u16,

    #[serde(default = "default_ami_username")]
    pub username: String,

    /// Manager secret; wrapped in `SecretString` by the client
    #[serde(default)]
    pub secret: String,

    /// Connect and per-message timeout
    #[serde(default = "default_ami_timeout", with = "humantime_serde")]
    pub timeout: Duration,

    /// How long `/health` reuses the last ping result
    #[serde(default = "default_ami_health_ttl", with = "humantime_serde")]
    pub health_ttl: Duration,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReloadConfig {
    /// Retries after the first failed reload
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_initial_backoff", with = "humantime_serde")]
    pub initial_backoff: Duration,

    #[serde(default = "default_max_backoff", with = "humantime_serde")]
    pub max_backoff: Duration,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegistryConfig {
    /// Path to the registry snapshot
    #[serde(default = "default_registry_path")]
    pub path: PathBuf,

    /// Enable persistence (if false, registry is in-memory only)
    #[serde(default = "default_true")]
    pub persist: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    /// Registrations accepted per minute across all clients
    #[serde(default = "default_registrations_per_minute")]
    pub registrations_per_minute: u32,

    /// Registrations that may arrive back to back before pacing starts
    #[serde(default = "default_registration_burst")]
    pub registration_burst: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// `text` or `json`
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl RateLimitConfig {
    /// Registration quota; zero values fall back to the defaults.
    pub fn quota(&self) -> Quota {
        let per_minute =
            NonZeroU32::new(self.registrations_per_minute).unwrap_or(DEFAULT_REGISTRATIONS_PER_MINUTE);
        let burst = NonZeroU32::new(self.registration_burst)
            .unwrap_or(DEFAULT_REGISTRATION_BURST)
            .min(per_minute);

        Quota::per_minute(per_minute).allow_burst(burst)
    }
}

impl ReloadConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            initial_backoff: self.initial_backoff,
            max_backoff: self.max_backoff,
        }
    }
}

// Default implementations
impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            port: default_port(),
        }
    }
}

impl Default for TelephonyConfig {
    fn default() -> Self {
        Self {
            config_path: default_config_path(),
            account_template: default_account_template(),
            server_address: default_server_address(),
            reload_module: default_reload_module(),
        }
    }
}

impl Default for AmiConfig {
    fn default() -> Self {
        Self {
            host: default_ami_host(),
            port: default_ami_port(),
            username: default_ami_username(),
            secret: String::new(),
            timeout: default_ami_timeout(),
            health_ttl: default_ami_health_ttl(),
        }
    }
}

impl Default for ReloadConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff: default_initial_backoff(),
            max_backoff: default_max_backoff(),
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            path: default_registry_path(),
            persist: true,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            registrations_per_minute: default_registrations_per_minute(),
            registration_burst: default_registration_burst(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

// Default value functions
fn default_listen_addr() -> String {
    "0.0.0.0".into()
}

fn default_port() -> u16 {
    8000
}

fn default_config_path() -> PathBuf {
    PathBuf::from("/etc/asterisk/pjsip_custom.conf")
}

fn default_account_template() -> String {
    "user-template".into()
}

fn default_server_address() -> String {
    "your-server-ip:5061".into()
}

fn default_reload_module() -> String {
    "res_pjsip.so".into()
}

fn default_ami_host() -> String {
    "asterisk".into()
}

fn default_ami_port() -> u16 {
    5038
}

fn default_ami_username() -> String {
    "provisioning".into()
}

fn default_ami_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_ami_health_ttl() -> Duration {
    DEFAULT_HEALTH_TTL
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_backoff() -> Duration {
    Duration::from_millis(200)
}

fn default_max_backoff() -> Duration {
    Duration::from_secs(5)
}

fn default_registry_path() -> PathBuf {
    PathBuf::from("/data/accounts.json")
}

fn default_true() -> bool {
    true
}

const DEFAULT_REGISTRATIONS_PER_MINUTE: NonZeroU32 = match NonZeroU32::new(30) {
    Some(n) => n,
    None => NonZeroU32::MIN,
};

const DEFAULT_REGISTRATION_BURST: NonZeroU32 = match NonZeroU32::new(5) {
    Some(n) => n,
    None => NonZeroU32::MIN,
};

fn default_registrations_per_minute() -> u32 {
    DEFAULT_REGISTRATIONS_PER_MINUTE.get()
}

fn default_registration_burst() -> u32 {
    DEFAULT_REGISTRATION_BURST.get()
}

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "text".into()
}

impl Config {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self> {
        // Load .env file if present
        dotenvy::dotenv().ok();

        Self::from_source(config::Environment::default().separator("__"))
    }

    fn from_source<S>(source: S) -> Result<Self>
    where
        S: config::Source + Send + Sync + 'static,
    {
        let config = config::Config::builder()
            .add_source(source)
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }
}
