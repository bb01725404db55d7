use http::header::AUTHORIZATION;
use http::HeaderValue;
use tracing::{debug, warn};

use crate::pipeline::request::ApiRequest;
use crate::utils::constants::{BEARER_PREFIX, DEFAULT_ALLOWLIST};

/// Decides whether an outgoing request carries `Authorization: Bearer <access>`.
///
/// A target is exempt when it *contains* any allowlisted fragment anywhere, not
/// only as a prefix: `/v2/auth/login/history` is exempt because of `/auth/login`.
#[derive(Debug, Clone)]
pub struct AuthorizationDecider {
    allowlist: Vec<String>,
}

impl Default for AuthorizationDecider {
    fn default() -> Self {
        Self::new(DEFAULT_ALLOWLIST.iter().map(|f| f.to_string()).collect())
    }
}

impl AuthorizationDecider {
    pub fn new(allowlist: Vec<String>) -> Self {
        Self { allowlist }
    }

    pub fn allowlist(&self) -> &[String] {
        &self.allowlist
    }

    pub fn should_attach(&self, target: &str) -> bool {
        !self
            .allowlist
            .iter()
            .any(|fragment| target.contains(fragment.as_str()))
    }

    pub fn authorization(&self, target: &str, access_token: &str) -> Option<String> {
        if access_token.is_empty() || !self.should_attach(target) {
            return None;
        }
        Some(format!("{}{}", BEARER_PREFIX, access_token))
    }

    /// Returns the request with its authorization header set, or stripped when none applies.
    pub fn authorize(&self, mut request: ApiRequest, access_token: &str) -> ApiRequest {
        match self.authorization(&request.path, access_token) {
            Some(value) => match HeaderValue::from_str(&value) {
                Ok(mut header) => {
                    header.set_sensitive(true);
                    request.headers.insert(AUTHORIZATION, header);
                }
                Err(err) => {
                    warn!("access token is not a valid header value, sending without it: {}", err);
                    request.headers.remove(AUTHORIZATION);
                }
            },
            None => {
                debug!("no authorization attached for '{}'", request.path);
                request.headers.remove(AUTHORIZATION);
            }
        }
        request
    }
}
