use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use http::StatusCode;
use reqwest::Client;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::auth::decider::AuthorizationDecider;
use crate::config::settings::SettingsConfig;
use crate::observability::metrics::get_metrics;
use crate::pipeline::request::{ApiRequest, ApiResponse};
use crate::pipeline::transport::{ReqwestTransport, Transport, TransportError};
use crate::refresh::coordinator::RefreshCoordinator;
use crate::refresh::endpoint::{HttpRefreshEndpoint, RefreshEndpoint};
use crate::refresh::error::RefreshError;
use crate::store::credential_store::CredentialStore;

static OK_MSG: &str = "ok";
static ERROR_MSG: &str = "error";
static SESSION_EXPIRED_MSG: &str = "session_expired";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PipelineError {
    /// The session could not be refreshed and has been cleared.
    #[error("session expired: {0}")]
    SessionExpired(RefreshError),

    /// Rejected again after a replay with a freshly refreshed token.
    #[error("unauthorized after token refresh: {body}")]
    Unauthorized { body: String },

    #[error("request failed with status {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl PipelineError {
    /// Errors after which the caller should treat the user as signed out.
    pub fn is_session_fatal(&self) -> bool {
        matches!(
            self,
            PipelineError::SessionExpired(_) | PipelineError::Unauthorized { .. }
        )
    }

    pub fn status(&self) -> Option<StatusCode> {
        match self {
            PipelineError::Unauthorized { .. } => Some(StatusCode::UNAUTHORIZED),
            PipelineError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// One send of a caller's request, with the token it carries and whether it
/// is already the replay after a refresh.
struct Attempt {
    access_token: String,
    retried: bool,
}

/// Entry point for every backend call: attaches credentials, and on a 401
/// refreshes once through the shared coordinator and replays the request.
pub struct RequestPipeline<T, R> {
    transport: T,
    decider: AuthorizationDecider,
    store: CredentialStore,
    coordinator: Arc<RefreshCoordinator<R>>,
}

impl RequestPipeline<ReqwestTransport, HttpRefreshEndpoint> {
    /// Wires the reqwest transport, the http refresh endpoint and the configured store.
    pub fn from_settings(settings: &SettingsConfig) -> Result<Self> {
        let client = Client::builder().build()?;
        let store = CredentialStore::from_config(&settings.store);
        let transport = ReqwestTransport::from_config(client.clone(), &settings.backend)?;
        let endpoint = HttpRefreshEndpoint::from_settings(client, settings);
        info!("refresh endpoint: {}", endpoint.url());

        let coordinator = Arc::new(RefreshCoordinator::new(endpoint, store.clone()));
        let decider = AuthorizationDecider::new(settings.auth.allowlist());
        Ok(Self::new(transport, decider, store, coordinator))
    }
}

impl<T: Transport, R: RefreshEndpoint> RequestPipeline<T, R> {
    pub fn new(
        transport: T,
        decider: AuthorizationDecider,
        store: CredentialStore,
        coordinator: Arc<RefreshCoordinator<R>>,
    ) -> Self {
        Self {
            transport,
            decider,
            store,
            coordinator,
        }
    }

    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    pub fn coordinator(&self) -> &Arc<RefreshCoordinator<R>> {
        &self.coordinator
    }

    pub async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, PipelineError> {
        let metrics = get_metrics().await;
        let start = Instant::now();
        let method = request.method.to_string();

        let result = self.dispatch(&request).await;

        metrics
            .request_duration
            .with_label_values(&[method.as_str()])
            .observe(start.elapsed().as_secs_f64());
        let outcome = match &result {
            Ok(_) => OK_MSG,
            Err(err) if err.is_session_fatal() => SESSION_EXPIRED_MSG,
            Err(_) => ERROR_MSG,
        };
        metrics.requests.with_label_values(&[outcome]).inc();
        result
    }

    async fn dispatch(&self, request: &ApiRequest) -> Result<ApiResponse, PipelineError> {
        let metrics = get_metrics().await;
        let mut attempt = Attempt {
            access_token: self.store.get_access(),
            retried: false,
        };

        loop {
            let outgoing = self.decider.authorize(request.clone(), &attempt.access_token);
            let response = self.transport.send(outgoing).await?;

            if response.is_success() {
                return Ok(response);
            }
            if response.status != StatusCode::UNAUTHORIZED {
                debug!("{} {} failed with {}", request.method, request.path, response.status);
                return Err(PipelineError::Status {
                    status: response.status,
                    body: response.body,
                });
            }

            metrics.unauthorized_responses.inc();
            if attempt.retried {
                warn!(
                    "{} {} rejected again after refresh, clearing session",
                    request.method, request.path
                );
                self.store.clear();
                metrics.session_clears.inc();
                return Err(PipelineError::Unauthorized {
                    body: response.body,
                });
            }

            warn!("{} {} rejected with 401", request.method, request.path);
            let access_token = self
                .coordinator
                .on_unauthorized(&attempt.access_token)
                .await
                .map_err(PipelineError::SessionExpired)?;

            metrics.requests_replayed.inc();
            attempt = Attempt {
                access_token,
                retried: true,
            };
        }
    }
}
