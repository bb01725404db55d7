pub use axum::Router;
pub use serde_json::json;
pub use tokio::task::JoinHandle;

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use parking_lot::Mutex;
use reqwest::Client;
use tokio::sync::Semaphore;

use crate::auth::decider::AuthorizationDecider;
use crate::pipeline::pipeline::RequestPipeline;
use crate::pipeline::request::{ApiRequest, ApiResponse};
use crate::pipeline::transport::{Transport, TransportError};
use crate::refresh::coordinator::RefreshCoordinator;
use crate::refresh::endpoint::{RefreshEndpoint, TokenPair};
use crate::refresh::error::RefreshError;
use crate::store::credential_store::CredentialStore;

/// Spawn an Axum router on an ephemeral port and return (JoinHandle, SocketAddr)
pub async fn spawn_axum(router: Router) -> (JoinHandle<()>, SocketAddr) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind failed");
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        axum::serve(listener, router).await.expect("server failed");
    });
    (handle, addr)
}

pub fn build_reqwest_client() -> Client {
    Client::builder()
        .timeout(std::time::Duration::from_secs(5))
        .build()
        .expect("reqwest client")
}

/// Minimal unsigned JWT carrying only `exp`.
pub fn sample_jwt(exp: i64) -> String {
    let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"none"}"#);
    let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"exp":{}}}"#, exp));
    format!("{}.{}.", header, payload)
}

/// What a scripted backend saw: path and authorization header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentRequest {
    pub path: String,
    pub authorization: Option<String>,
}

type Responder = Box<dyn Fn(&ApiRequest) -> ApiResponse + Send + Sync>;

/// In-process transport answering through a closure and recording every send.
pub struct ScriptedTransport {
    respond: Responder,
    sent: Mutex<Vec<SentRequest>>,
}

impl ScriptedTransport {
    pub fn new(respond: impl Fn(&ApiRequest) -> ApiResponse + Send + Sync + 'static) -> Self {
        Self {
            respond: Box::new(respond),
            sent: Mutex::new(Vec::new()),
        }
    }

    /// 200 echoing the path for `Bearer <valid>`, 401 for anything else.
    pub fn accepting(valid: &str) -> Self {
        let expected = format!("Bearer {}", valid);
        Self::new(move |request| match request.authorization() {
            Some(auth) if auth == expected => ApiResponse::new(http::StatusCode::OK, request.path.clone()),
            _ => ApiResponse::new(http::StatusCode::UNAUTHORIZED, "token expired"),
        })
    }

    pub fn sent(&self) -> Vec<SentRequest> {
        self.sent.lock().clone()
    }
}

impl Transport for Arc<ScriptedTransport> {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
        self.sent.lock().push(SentRequest {
            path: request.path.clone(),
            authorization: request.authorization().map(str::to_owned),
        });
        // let concurrent callers interleave like real network calls do
        tokio::task::yield_now().await;
        Ok((self.respond)(&request))
    }
}

/// Refresh endpoint with a canned outcome, optionally held until `open`.
pub struct StubRefresh {
    calls: AtomicUsize,
    seen: Mutex<Vec<String>>,
    gate: Semaphore,
    outcome: Result<TokenPair, RefreshError>,
}

impl StubRefresh {
    pub fn gated(outcome: Result<TokenPair, RefreshError>) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
            gate: Semaphore::new(0),
            outcome,
        }
    }

    pub fn open(outcome: Result<TokenPair, RefreshError>) -> Self {
        let stub = Self::gated(outcome);
        stub.release();
        stub
    }

    pub fn release(&self) {
        self.gate.add_permits(64);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().clone()
    }
}

impl RefreshEndpoint for Arc<StubRefresh> {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, RefreshError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().push(refresh_token.to_owned());
        let _permit = self.gate.acquire().await.map_err(|_| RefreshError::Abandoned)?;
        self.outcome.clone()
    }
}

pub fn token_pair(access: &str, refresh: Option<&str>) -> TokenPair {
    TokenPair {
        access_token: access.to_owned(),
        refresh_token: refresh.map(str::to_owned),
    }
}

pub type TestPipeline = RequestPipeline<Arc<ScriptedTransport>, Arc<StubRefresh>>;

pub fn build_pipeline(
    transport: &Arc<ScriptedTransport>,
    refresh: &Arc<StubRefresh>,
    store: &CredentialStore,
) -> TestPipeline {
    let coordinator = Arc::new(RefreshCoordinator::new(refresh.clone(), store.clone()));
    RequestPipeline::new(
        transport.clone(),
        AuthorizationDecider::default(),
        store.clone(),
        coordinator,
    )
}

pub fn populated_store(access: &str, refresh: &str) -> CredentialStore {
    let store = CredentialStore::in_memory();
    store.set(access, refresh);
    store
}

/// Polls until `count` requests are parked behind the in-flight refresh.
pub async fn wait_for_pending(pipeline: &TestPipeline, count: usize) {
    for _ in 0..400 {
        if pipeline.coordinator().pending() == count {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
    panic!(
        "expected {} pending requests, got {}",
        count,
        pipeline.coordinator().pending()
    );
}
