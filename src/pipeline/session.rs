use chrono::{DateTime, Utc};
use tracing::{debug, error, info};

use crate::auth::jwt::access_token_expiry;
use crate::observability::metrics::get_metrics;
use crate::pipeline::pipeline::{PipelineError, RequestPipeline};
use crate::pipeline::request::ApiRequest;
use crate::pipeline::transport::Transport;
use crate::refresh::endpoint::RefreshEndpoint;
use crate::store::credential_store::Session;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    Unauthenticated,
    Authenticated {
        /// `exp` of the access token when it is a readable JWT
        access_expires_at: Option<DateTime<Utc>>,
    },
}

impl SessionStatus {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, SessionStatus::Authenticated { .. })
    }
}

impl<T: Transport, R: RefreshEndpoint> RequestPipeline<T, R> {
    /// Stores a pair obtained from a login flow handled elsewhere.
    pub fn import_session(&self, access_token: &str, refresh_token: &str) {
        self.store().set(access_token, refresh_token);
        info!("session imported");
    }

    /// What the local store says, without touching the network.
    pub fn session_status(&self) -> SessionStatus {
        match self.store().session() {
            Session::Empty => SessionStatus::Unauthenticated,
            Session::Populated { access_token, .. } => SessionStatus::Authenticated {
                access_expires_at: access_token_expiry(&access_token)
                    .inspect_err(|err| debug!("access token expiry unknown: {}", err))
                    .ok(),
            },
        }
    }

    /// Confirms the session against the backend, refreshing it if the access token expired.
    ///
    /// Session-fatal outcomes report `Unauthenticated`; unrelated failures propagate.
    pub async fn verify_session(&self, probe: ApiRequest) -> Result<SessionStatus, PipelineError> {
        if self.store().session().is_empty() {
            return Ok(SessionStatus::Unauthenticated);
        }

        match self.execute(probe).await {
            Ok(_) => Ok(self.session_status()),
            Err(err) if err.is_session_fatal() => {
                info!("session rejected by backend: {}", err);
                Ok(SessionStatus::Unauthenticated)
            }
            Err(err) => Err(err),
        }
    }

    /// Best-effort server logout; the local session is cleared regardless.
    pub async fn logout(&self, path: &str) {
        if let Err(err) = self.execute(ApiRequest::delete(path)).await {
            error!("logout request failed: {}", err);
        }
        self.store().clear();
        get_metrics().await.session_clears.inc();
        info!("logged out");
    }
}
