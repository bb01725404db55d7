use std::collections::HashMap;

use serde::Deserialize;

use crate::utils::constants::{
    ACCESS_KEY, DEFAULT_ALLOWLIST, DEFAULT_LOGOUT_PATH, DEFAULT_REFRESH_PATH, REFRESH_KEY,
};

/// ================================
/// Full service configuration
/// ================================
#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    pub settings: SettingsConfig,
}

/// ================================
/// Global service-wide settings
/// ================================
#[derive(Debug, Deserialize, Clone)]
pub struct SettingsConfig {
    pub backend: BackendConfig,
    #[serde(default)]
    pub refresh: RefreshConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub store: StoreConfig,
    pub logging: Option<LoggingConfig>,
}

/// ================================
/// Backend
/// ================================
#[derive(Debug, Deserialize, Clone)]
pub struct BackendConfig {
    /// e.g. `http://localhost:8080/api`; request paths are appended to it
    pub base_url: String,
    /// per request timeout, unset means the client default (none)
    pub timeout_ms: Option<u64>,
    /// headers sent with every request
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RefreshConfig {
    #[serde(default = "default_refresh_path")]
    pub path: String,
    /// unset keeps the refresh call unbounded
    pub timeout_ms: Option<u64>,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            path: default_refresh_path(),
            timeout_ms: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    /// path fragments exempt from credential attachment
    pub allowlist: Option<Vec<String>>,
    #[serde(default = "default_logout_path")]
    pub logout_path: String,
    /// endpoint used by `verify` when no explicit path is given
    pub probe_path: Option<String>,
}

impl AuthConfig {
    pub fn allowlist(&self) -> Vec<String> {
        self.allowlist.to_owned().unwrap_or_else(|| {
            DEFAULT_ALLOWLIST
                .iter()
                .map(|fragment| fragment.to_string())
                .collect()
        })
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            allowlist: None,
            logout_path: default_logout_path(),
            probe_path: None,
        }
    }
}

/// ================================
/// Credential store
/// ================================
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    File,
    Memory,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    pub kind: StoreKind,
    /// required for `file`
    pub path: Option<String>,
    #[serde(default = "default_access_key")]
    pub access_key: String,
    #[serde(default = "default_refresh_key")]
    pub refresh_key: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            kind: StoreKind::Memory,
            path: None,
            access_key: default_access_key(),
            refresh_key: default_refresh_key(),
        }
    }
}

/// ================================
/// Logging
/// ================================
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    pub level: String, // allowed: trace, debug, info, warn, error
    pub format: LogFormat,
}

impl LoggingConfig {
    pub fn new(level: String, format: LogFormat) -> Self {
        Self { level, format }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Compact,
}

impl LogFormat {
    pub fn from_env() -> Self {
        match std::env::var("LOG_FORMAT")
            .unwrap_or_else(|_| "compact".to_string())
            .to_lowercase()
            .as_str()
        {
            "json" => LogFormat::Json,
            _ => LogFormat::Compact,
        }
    }
}

fn default_refresh_path() -> String {
    DEFAULT_REFRESH_PATH.to_string()
}

fn default_logout_path() -> String {
    DEFAULT_LOGOUT_PATH.to_string()
}

fn default_access_key() -> String {
    ACCESS_KEY.to_string()
}

fn default_refresh_key() -> String {
    REFRESH_KEY.to_string()
}
