use std::future::Future;
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::settings::SettingsConfig;
use crate::refresh::error::RefreshError;

/// Outcome of a successful refresh. A missing `refresh_token` means the
/// backend did not rotate it and the stored one stays valid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ReissueRequest<'a> {
    refresh_token: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReissueResponse {
    access_token: String,
    refresh_token: Option<String>,
}

/// Exchanges a refresh token for a new credential pair.
pub trait RefreshEndpoint: Send + Sync {
    fn refresh(
        &self,
        refresh_token: &str,
    ) -> impl Future<Output = Result<TokenPair, RefreshError>> + Send;
}

/// `POST {"refreshToken": ..}` against the backend's reissue endpoint.
///
/// Sent with a bare client call, outside the request pipeline: it never carries
/// an authorization header and a 401 here never triggers another refresh.
#[derive(Debug, Clone)]
pub struct HttpRefreshEndpoint {
    client: Client,
    url: String,
    timeout: Option<Duration>,
}

impl HttpRefreshEndpoint {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn from_settings(client: Client, settings: &SettingsConfig) -> Self {
        let url = format!("{}{}", settings.backend.base_url, settings.refresh.path);
        Self::new(client, url).with_timeout(settings.refresh.timeout_ms.map(Duration::from_millis))
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl RefreshEndpoint for HttpRefreshEndpoint {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, RefreshError> {
        debug!("refresh request to '{}'", self.url);
        let mut request = self
            .client
            .post(&self.url)
            .json(&ReissueRequest { refresh_token });
        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }

        let response = request
            .send()
            .await
            .map_err(|err| RefreshError::Transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RefreshError::Rejected { status, body });
        }

        let body = response
            .text()
            .await
            .map_err(|err| RefreshError::Transport(err.to_string()))?;
        let reissued: ReissueResponse = serde_json::from_str(&body)
            .map_err(|err| RefreshError::MalformedResponse(err.to_string()))?;
        if reissued.access_token.is_empty() {
            return Err(RefreshError::MalformedResponse(
                "empty accessToken".to_owned(),
            ));
        }

        info!(
            "refresh succeeded, refresh token rotated: {}",
            reissued.refresh_token.as_deref().is_some_and(|t| !t.is_empty())
        );
        Ok(TokenPair {
            access_token: reissued.access_token,
            refresh_token: reissued.refresh_token.filter(|token| !token.is_empty()),
        })
    }
}

#[cfg(test)]
mod tests {
    use httpmock::Method::POST;
    use httpmock::MockServer;
    use reqwest::Client;
    use serde_json::json;

    use super::{HttpRefreshEndpoint, RefreshEndpoint, TokenPair};
    use crate::refresh::error::RefreshError;

    #[tokio::test]
    async fn posts_refresh_token_and_keeps_missing_rotation_empty() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/auth/reissue")
                    .json_body(json!({"refreshToken": "R1"}));
                then.status(200)
                    .header("Content-Type", "application/json")
                    .json_body(json!({"accessToken": "A2"}));
            })
            .await;

        let endpoint = HttpRefreshEndpoint::new(Client::new(), server.url("/api/auth/reissue"));
        let pair = endpoint.refresh("R1").await.unwrap();

        mock.assert_async().await;
        assert_eq!(
            pair,
            TokenPair {
                access_token: "A2".to_owned(),
                refresh_token: None
            }
        );
    }

    #[tokio::test]
    async fn returns_rotated_refresh_token() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/auth/reissue");
                then.status(200)
                    .json_body(json!({"accessToken": "A2", "refreshToken": "R2"}));
            })
            .await;

        let endpoint = HttpRefreshEndpoint::new(Client::new(), server.url("/auth/reissue"));
        let pair = endpoint.refresh("R1").await.unwrap();
        assert_eq!(pair.refresh_token.as_deref(), Some("R2"));
    }

    #[tokio::test]
    async fn non_success_status_is_a_rejection() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/auth/reissue");
                then.status(401).body("expired refresh token");
            })
            .await;

        let endpoint = HttpRefreshEndpoint::new(Client::new(), server.url("/auth/reissue"));
        match endpoint.refresh("R1").await {
            Err(RefreshError::Rejected { status, body }) => {
                assert_eq!(status.as_u16(), 401);
                assert_eq!(body, "expired refresh token");
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn body_without_access_token_is_malformed() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/auth/reissue");
                then.status(200).json_body(json!({"accessToken": ""}));
            })
            .await;

        let endpoint = HttpRefreshEndpoint::new(Client::new(), server.url("/auth/reissue"));
        assert!(matches!(
            endpoint.refresh("R1").await,
            Err(RefreshError::MalformedResponse(_))
        ));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_a_transport_failure() {
        // port 9 (discard) is not expected to accept http
        let endpoint = HttpRefreshEndpoint::new(Client::new(), "http://127.0.0.1:9/auth/reissue");
        assert!(matches!(
            endpoint.refresh("R1").await,
            Err(RefreshError::Transport(_))
        ));
    }
}
