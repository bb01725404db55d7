// Full stack against an axum backend: reqwest transport, http refresh
// endpoint and a file-backed credential store built from config.

#[cfg(test)]
mod test {
    use std::net::SocketAddr;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use axum::extract::State;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::{get, post};
    use axum::Json;
    use parking_lot::Mutex;
    use serde_json::Value;

    use crate::config::proc_loader::parse_config;
    use crate::config::settings::SettingsConfig;
    use crate::pipeline::pipeline::{PipelineError, RequestPipeline};
    use crate::pipeline::request::ApiRequest;
    use crate::refresh::error::RefreshError;
    use crate::store::credential_store::CredentialStore;
    use crate::tests::common::{json, spawn_axum, Router};

    #[derive(Clone)]
    struct Backend {
        valid_access: Arc<Mutex<String>>,
        valid_refresh: Arc<Mutex<String>>,
        reissues: Arc<AtomicUsize>,
    }

    impl Backend {
        fn new(access: &str, refresh: &str) -> Self {
            Self {
                valid_access: Arc::new(Mutex::new(access.to_owned())),
                valid_refresh: Arc::new(Mutex::new(refresh.to_owned())),
                reissues: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn expire_access(&self, next: &str) {
            *self.valid_access.lock() = next.to_owned();
        }

        fn revoke_refresh(&self) {
            *self.valid_refresh.lock() = String::new();
        }
    }

    async fn protected(State(backend): State<Backend>, headers: HeaderMap) -> (StatusCode, String) {
        let expected = format!("Bearer {}", backend.valid_access.lock());
        let presented = headers
            .get("authorization")
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();
        if presented == expected {
            (StatusCode::OK, "stamps".to_owned())
        } else {
            (StatusCode::UNAUTHORIZED, "access token expired".to_owned())
        }
    }

    async fn login_page(headers: HeaderMap) -> (StatusCode, String) {
        // allowlisted endpoints must never see credentials
        match headers.get("authorization") {
            Some(_) => (StatusCode::BAD_REQUEST, "unexpected credentials".to_owned()),
            None => (StatusCode::OK, "welcome".to_owned()),
        }
    }

    async fn reissue(
        State(backend): State<Backend>,
        Json(body): Json<Value>,
    ) -> (StatusCode, Json<Value>) {
        backend.reissues.fetch_add(1, Ordering::SeqCst);
        // keep the refresh in flight long enough for other 401s to queue behind it
        tokio::time::sleep(Duration::from_millis(100)).await;

        let presented = body["refreshToken"].as_str().unwrap_or_default().to_owned();
        let valid = backend.valid_refresh.lock().clone();
        if valid.is_empty() || presented != valid {
            return (StatusCode::UNAUTHORIZED, Json(json!({"message": "refresh token expired"})));
        }

        let access = backend.valid_access.lock().clone();
        *backend.valid_refresh.lock() = "R2".to_owned();
        (
            StatusCode::OK,
            Json(json!({"accessToken": access, "refreshToken": "R2"})),
        )
    }

    async fn start_backend(backend: Backend) -> SocketAddr {
        let router = Router::new()
            .route("/api/stamps", get(protected))
            .route("/api/auth/login", get(login_page))
            .route("/api/auth/reissue", post(reissue))
            .with_state(backend);
        let (_handle, addr) = spawn_axum(router).await;
        addr
    }

    async fn settings(addr: SocketAddr, session_file: &Path) -> SettingsConfig {
        let yaml = format!(
            r#"
settings:
  backend:
    base_url: "http://{}/api"
    timeout_ms: 5000
  refresh:
    timeout_ms: 5000
  store:
    kind: file
    path: "{}"
  logging:
    level: debug
    format: compact
"#,
            addr,
            session_file.display()
        );
        parse_config(yaml).await.unwrap().settings
    }

    #[tokio::test]
    async fn expired_access_token_is_refreshed_once_for_concurrent_requests() {
        let backend = Backend::new("A1", "R1");
        let addr = start_backend(backend.clone()).await;
        let dir = tempfile::tempdir().unwrap();
        let session_file = dir.path().join("session.json");
        let settings = settings(addr, &session_file).await;

        let pipeline = RequestPipeline::from_settings(&settings).unwrap();
        pipeline.import_session("A1", "R1");
        assert_eq!(
            pipeline.execute(ApiRequest::get("/stamps")).await.unwrap().body,
            "stamps"
        );

        backend.expire_access("A2");
        let (r1, r2, r3) = tokio::join!(
            pipeline.execute(ApiRequest::get("/stamps")),
            pipeline.execute(ApiRequest::get("/stamps")),
            pipeline.execute(ApiRequest::get("/stamps")),
        );
        for response in [r1, r2, r3] {
            assert_eq!(response.unwrap().body, "stamps");
        }
        assert_eq!(backend.reissues.load(Ordering::SeqCst), 1);

        // the rotated pair survives a restart
        let reopened = CredentialStore::from_config(&settings.store);
        assert_eq!(reopened.get_access(), "A2");
        assert_eq!(reopened.get_refresh(), "R2");
    }

    #[tokio::test]
    async fn revoked_refresh_token_expires_session_and_clears_file() {
        let backend = Backend::new("A1", "R1");
        let addr = start_backend(backend.clone()).await;
        let dir = tempfile::tempdir().unwrap();
        let session_file = dir.path().join("session.json");
        let settings = settings(addr, &session_file).await;

        let pipeline = RequestPipeline::from_settings(&settings).unwrap();
        pipeline.import_session("A1", "R1");
        backend.expire_access("A2");
        backend.revoke_refresh();

        let err = pipeline.execute(ApiRequest::get("/stamps")).await.unwrap_err();
        match err {
            PipelineError::SessionExpired(RefreshError::Rejected { status, .. }) => {
                assert_eq!(status.as_u16(), 401)
            }
            other => panic!("expected session expiry, got {:?}", other),
        }
        assert!(pipeline.store().session().is_empty());
        assert!(CredentialStore::from_config(&settings.store).session().is_empty());
        assert_eq!(backend.reissues.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn allowlisted_endpoint_never_receives_credentials() {
        let backend = Backend::new("A1", "R1");
        let addr = start_backend(backend.clone()).await;
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(addr, &dir.path().join("session.json")).await;

        let pipeline = RequestPipeline::from_settings(&settings).unwrap();
        pipeline.import_session("A1", "R1");

        let response = pipeline.execute(ApiRequest::get("/auth/login")).await.unwrap();
        assert_eq!(response.body, "welcome");
        assert_eq!(backend.reissues.load(Ordering::SeqCst), 0);
    }
}
