use crate::config::settings::{LogFormat, LoggingConfig, ServiceConfig};

const CONTENT_TYPE: &str = "Content-Type";
const APPLICATION_JSON: &str = "application/json";

pub fn initiate_default_values(mut config: ServiceConfig) -> ServiceConfig {
    let settings = &mut config.settings;

    if settings.logging.is_none() {
        settings.logging = Some(LoggingConfig::new("info".to_owned(), LogFormat::from_env()));
    }

    // request paths always start with '/', so the base must not end with one
    settings.backend.base_url = settings.backend.base_url.trim_end_matches('/').to_owned();

    let has_content_type = settings
        .backend
        .headers
        .keys()
        .any(|name| name.eq_ignore_ascii_case(CONTENT_TYPE));
    if !has_content_type {
        settings
            .backend
            .headers
            .insert(CONTENT_TYPE.to_owned(), APPLICATION_JSON.to_owned());
    }

    config
}
