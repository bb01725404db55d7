//! Configuration validation with aggregated errors.
//! - Aggregates all issues into Vec<String>
//! - Validates invariants:
//!   * backend base url and timeouts
//!   * refresh / logout / probe paths
//!   * store kind vs path, key names
//!   * allowlist fragments
//!   * logging level

use std::collections::HashMap;

use reqwest::Url;
use tracing::{error, info};

use crate::config::settings::{
    AuthConfig, BackendConfig, LoggingConfig, RefreshConfig, ServiceConfig, StoreConfig, StoreKind,
};
use crate::observability::metrics::get_metrics;

/// Public entrypoint: returns Ok(()) or Err(Vec<String>) containing all issues.
pub async fn validate_service_config(cfg: &ServiceConfig) -> Result<(), Vec<String>> {
    let mut errors: Vec<String> = Vec::new();
    let settings = &cfg.settings;

    validate_backend(&settings.backend, &mut errors);
    validate_refresh(&settings.refresh, &mut errors);
    validate_auth(&settings.auth, &mut errors);
    validate_store(&settings.store, &mut errors);
    if let Some(logging) = &settings.logging {
        validate_logging(logging, &mut errors);
    }

    if errors.is_empty() {
        info!("config valid");
        Ok(())
    } else {
        error!("configuration validation errors ({}):", errors.len());
        for e in &errors {
            error!(" - {}", e);
        }
        get_metrics().await.config_validation_errors.inc();
        Err(errors)
    }
}

/// BACKEND VALIDATION
fn validate_backend(backend: &BackendConfig, errors: &mut Vec<String>) {
    match Url::parse(&backend.base_url) {
        Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
        Ok(url) => errors.push(format!(
            "settings.backend.base_url '{}' has unsupported scheme '{}'",
            backend.base_url,
            url.scheme()
        )),
        Err(err) => errors.push(format!(
            "settings.backend.base_url '{}' is not a valid url: {}",
            backend.base_url, err
        )),
    }

    validate_timeout("settings.backend.timeout_ms", backend.timeout_ms, errors);

    for name in backend.headers.keys() {
        if http::HeaderName::from_bytes(name.as_bytes()).is_err() {
            errors.push(format!(
                "settings.backend.headers: '{}' is not a valid header name",
                name
            ));
        }
    }
}

fn validate_refresh(refresh: &RefreshConfig, errors: &mut Vec<String>) {
    validate_path("settings.refresh.path", &refresh.path, errors);
    validate_timeout("settings.refresh.timeout_ms", refresh.timeout_ms, errors);
}

fn validate_auth(auth: &AuthConfig, errors: &mut Vec<String>) {
    if let Some(allowlist) = &auth.allowlist {
        for (idx, fragment) in allowlist.iter().enumerate() {
            // an empty fragment is contained in every target and would disable auth entirely
            if fragment.trim().is_empty() {
                errors.push(format!("settings.auth.allowlist[{}] is empty", idx));
            }
        }
    }
    validate_path("settings.auth.logout_path", &auth.logout_path, errors);
    if let Some(probe) = &auth.probe_path {
        validate_path("settings.auth.probe_path", probe, errors);
    }
}

/// STORE VALIDATION
fn validate_store(store: &StoreConfig, errors: &mut Vec<String>) {
    if store.kind == StoreKind::File {
        match &store.path {
            Some(path) if !path.trim().is_empty() => {}
            _ => errors.push("settings.store.path is required for kind 'file'".to_string()),
        }
    }

    let mut keys: HashMap<&str, &str> = HashMap::new();
    for (field, key) in [
        ("access_key", store.access_key.as_str()),
        ("refresh_key", store.refresh_key.as_str()),
    ] {
        if key.trim().is_empty() {
            errors.push(format!("settings.store.{} must not be empty", field));
            continue;
        }
        if let Some(prev) = keys.insert(key, field) {
            errors.push(format!(
                "settings.store.{} and settings.store.{} both use key '{}'",
                prev, field, key
            ));
        }
    }
}

fn validate_logging(logging: &LoggingConfig, errors: &mut Vec<String>) {
    let valid = ["trace", "debug", "info", "warn", "error"];
    if !valid.contains(&logging.level.to_lowercase().as_str()) {
        errors.push(format!(
            "settings.logging.level '{}' invalid; allowed: {:?}",
            logging.level, valid
        ));
    }
}

fn validate_path(path: &str, value: &str, errors: &mut Vec<String>) {
    if !value.starts_with('/') {
        errors.push(format!("{} '{}' must start with '/'", path, value));
    }
}

fn validate_timeout(path: &str, timeout_ms: Option<u64>, errors: &mut Vec<String>) {
    if timeout_ms == Some(0) {
        errors.push(format!("{} must be > 0", path));
    }
}
