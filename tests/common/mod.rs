//! Shared test helpers for integration tests.

#![allow(dead_code)]

use axum::http::HeaderMap;
use axum::Router;
use tokio::net::TcpListener;

use checkin_harvest::calibrate::CalibratedRate;
use checkin_harvest::config::AccountConfig;
use checkin_harvest::orchestrator::{AccountOrchestrator, Job};
use checkin_harvest::pow::NonceSolver;
use checkin_harvest::session::StaticSessionProvider;
use checkin_harvest::transport::HttpConnector;

/// Starts a mock HTTP server on a random available port.
///
/// Returns the base URL (e.g., `http://127.0.0.1:54321`) and a `JoinHandle` for
/// the server task. The caller should `abort()` the handle when the test completes.
pub async fn start_mock_server(app: Router) -> (String, tokio::task::JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let url = format!("http://127.0.0.1:{}", addr.port());
    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    // Give the server a moment to start accepting connections.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    (url, handle)
}

pub fn account(name: &str, token: &str) -> AccountConfig {
    AccountConfig {
        name: name.to_string(),
        ..AccountConfig::from_token(token)
    }
}

/// Orchestrator over real HTTP with a fixed hash rate, so no benchmark runs.
pub fn http_orchestrator(job: Job) -> AccountOrchestrator {
    let sessions = Box::new(StaticSessionProvider::new(job.token_placement()));
    AccountOrchestrator::new(job, sessions, Box::new(HttpConnector))
        .with_rate(CalibratedRate::fixed(50_000))
        .with_solver(NonceSolver::new().with_workers(2).with_chunk(64))
}

/// Session token carried in the `Cookie` header under `name`, if any.
pub fn cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    let raw = headers.get("cookie")?.to_str().ok()?;
    raw.split(';').find_map(|pair| {
        let (k, v) = pair.trim().split_once('=')?;
        (k == name).then(|| v.to_string())
    })
}
