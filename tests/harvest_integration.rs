//! # Harvest Integration Tests — Real HTTP Mock Server
//!
//! The spin-wheel and lucky-draw providers over [`HttpConnector`] against
//! axum servers on ephemeral ports. Each mock keeps a draw counter so the
//! quota runs down the way the real sites do.
//!
//! - **Wheel**: daily check-in code plus spins until the `remaining` echo
//!   reaches zero; an upstream 502 mid-harvest keeps the codes and warns.
//! - **Lucky draw**: server-action calls routed on the `next-action` header,
//!   line-framed responses, quota spent when frame 1 is `0`.
//! - **Credit spin**: bearer-token status then one spin; the second run of
//!   the day sees `can_spin: false` and never posts.

mod common;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use checkin_harvest::creditspin::CreditSpinConfig;
use checkin_harvest::harvest::luckydraw::{LuckyDrawConfig, DEFAULT_DRAW_ACTION, DEFAULT_STATUS_ACTION};
use checkin_harvest::harvest::wheel::WheelConfig;
use checkin_harvest::orchestrator::Job;
use checkin_harvest::results::AccountResult;

use common::{account, cookie, http_orchestrator, start_mock_server};

// ============================================================================
// Spin wheel
// ============================================================================

#[derive(Clone)]
struct Wheel {
    spins: Arc<AtomicU64>,
    quota: u64,
    checked_in: bool,
    /// Spin number (1-based) that answers with a bad gateway.
    fail_on: Option<u64>,
}

impl Wheel {
    fn new(quota: u64) -> Self {
        Wheel {
            spins: Arc::new(AtomicU64::new(0)),
            quota,
            checked_in: false,
            fail_on: None,
        }
    }
}

fn wheel_app(wheel: Wheel) -> Router {
    Router::new()
        .route(
            "/api/checkin/status",
            get(|State(w): State<Wheel>| async move { Json(json!({"checked": w.checked_in})) }),
        )
        .route(
            "/api/checkin",
            post(|headers: HeaderMap| async move {
                match cookie(&headers, "session") {
                    Some(_) => (StatusCode::OK, Json(json!({"success": true, "code": "CK-1"}))),
                    None => (
                        StatusCode::BAD_REQUEST,
                        Json(json!({"success": false, "message": "login required"})),
                    ),
                }
            }),
        )
        .route(
            "/api/wheel/status",
            get(|State(w): State<Wheel>| async move {
                let used = w.spins.load(Ordering::SeqCst);
                Json(json!({"remaining": w.quota.saturating_sub(used)}))
            }),
        )
        .route(
            "/api/wheel",
            post(|State(w): State<Wheel>| async move {
                let n = w.spins.fetch_add(1, Ordering::SeqCst) + 1;
                if w.fail_on == Some(n) {
                    return (StatusCode::BAD_GATEWAY, "upstream down").into_response();
                }
                if n > w.quota {
                    return (
                        StatusCode::BAD_REQUEST,
                        Json(json!({"success": false, "message": "No more spins today"})),
                    )
                        .into_response();
                }
                Json(json!({
                    "success": true,
                    "code": format!("W-{}", n),
                    "remaining": w.quota - n
                }))
                .into_response()
            }),
        )
        .with_state(wheel)
}

fn wheel_job(url: &str) -> Job {
    Job::Wheel(WheelConfig {
        base_url: url.to_string(),
        ..WheelConfig::default()
    })
}

/// Check-in code first, then one code per spin, streamed to the sink in order.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_wheel_collects_checkin_and_spin_codes() {
    let wheel = Wheel::new(2);
    let spins = Arc::clone(&wheel.spins);
    let (url, handle) = start_mock_server(wheel_app(wheel)).await;

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let report = http_orchestrator(wheel_job(&url))
        .on_code(move |account, code| sink.lock().unwrap().push(format!("{}:{}", account, code)))
        .run_all(&[account("main", "tok")]);

    let Some(AccountResult::Success(reward)) = report.results.get("main") else {
        panic!("expected success, got {:?}", report.results.get("main"));
    };
    assert_eq!(reward.codes, vec!["CK-1", "W-1", "W-2"]);
    assert_eq!(reward.amount, "CK-1,W-1,W-2");
    assert_eq!(reward.warning, None);
    assert_eq!(*seen.lock().unwrap(), vec!["main:CK-1", "main:W-1", "main:W-2"]);
    assert_eq!(spins.load(Ordering::SeqCst), 2);

    handle.abort();
}

/// Checked in and no spins left: nothing to claim, not a failure.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_wheel_with_nothing_left_is_already_done() {
    let mut wheel = Wheel::new(0);
    wheel.checked_in = true;
    let spins = Arc::clone(&wheel.spins);
    let (url, handle) = start_mock_server(wheel_app(wheel)).await;

    let report = http_orchestrator(wheel_job(&url)).run_all(&[account("main", "tok")]);

    let Some(AccountResult::AlreadyDone(reward)) = report.results.get("main") else {
        panic!("expected already-done, got {:?}", report.results.get("main"));
    };
    assert!(reward.codes.is_empty());
    assert_eq!(spins.load(Ordering::SeqCst), 0);
    assert_eq!(report.results.failure_count(), 0);

    handle.abort();
}

/// A 502 after some codes: keep them, stop, and carry the failure as a warning.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_wheel_upstream_error_keeps_earlier_codes() {
    let mut wheel = Wheel::new(3);
    wheel.checked_in = true;
    wheel.fail_on = Some(2);
    let spins = Arc::clone(&wheel.spins);
    let (url, handle) = start_mock_server(wheel_app(wheel)).await;

    let report = http_orchestrator(wheel_job(&url)).run_all(&[account("main", "tok")]);

    let Some(AccountResult::Success(reward)) = report.results.get("main") else {
        panic!("expected success, got {:?}", report.results.get("main"));
    };
    assert_eq!(reward.codes, vec!["W-1"]);
    let warning = reward.warning.as_deref().unwrap_or_default();
    assert!(warning.starts_with("draw failed"), "{}", warning);
    assert!(warning.contains("502"), "{}", warning);
    assert_eq!(spins.load(Ordering::SeqCst), 2, "no spin after the failure");

    handle.abort();
}

/// Skipping the daily check-in leaves only spin codes.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_wheel_skip_checkin() {
    let (url, handle) = start_mock_server(wheel_app(Wheel::new(1))).await;

    let job = Job::Wheel(WheelConfig {
        base_url: url.clone(),
        daily_checkin: false,
        ..WheelConfig::default()
    });
    let report = http_orchestrator(job).run_all(&[account("main", "tok")]);

    let reward = report.results.get("main").and_then(AccountResult::reward).unwrap();
    assert_eq!(reward.codes, vec!["W-1"]);

    handle.abort();
}

// ============================================================================
// Lucky draw
// ============================================================================

#[derive(Clone)]
struct Draws {
    drawn: Arc<AtomicU64>,
    quota: u64,
    sessions: Arc<Mutex<Vec<Option<String>>>>,
}

fn framed(result: &str) -> String {
    format!("0:[\"$@1\",[\"build-7\",null]]\n1:{}\n", result)
}

async fn lucky_action(State(d): State<Draws>, headers: HeaderMap, body: String) -> impl IntoResponse {
    d.sessions.lock().unwrap().push(cookie(&headers, "session"));
    let action = headers
        .get("next-action")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();

    let payload = if action == DEFAULT_STATUS_ACTION {
        assert_eq!(body, "[]");
        let left = d.quota.saturating_sub(d.drawn.load(Ordering::SeqCst));
        framed(&left.to_string())
    } else if action == DEFAULT_DRAW_ACTION {
        assert!(body.contains("excludeThankYou"));
        let n = d.drawn.fetch_add(1, Ordering::SeqCst) + 1;
        if n > d.quota {
            framed("0")
        } else {
            framed(
                &json!({
                    "success": true,
                    "prize": {"name": format!("{} credits", n * 5)},
                    "redemptionCode": format!("B4U-{}", n)
                })
                .to_string(),
            )
        }
    } else {
        return (StatusCode::NOT_FOUND, "unknown action".to_string()).into_response();
    };
    ([("content-type", "text/x-component")], payload).into_response()
}

fn lucky_app(draws: Draws) -> Router {
    Router::new()
        .route("/luckydraw", post(lucky_action))
        .with_state(draws)
}

/// Draws until the status count is spent; every call carries the session cookie.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_luckydraw_draws_whole_quota() {
    let draws = Draws {
        drawn: Arc::new(AtomicU64::new(0)),
        quota: 2,
        sessions: Arc::new(Mutex::new(Vec::new())),
    };
    let sessions = Arc::clone(&draws.sessions);
    let (url, handle) = start_mock_server(lucky_app(draws)).await;

    let job = Job::LuckyDraw(LuckyDrawConfig {
        base_url: url.clone(),
        ..LuckyDrawConfig::default()
    });
    let report = http_orchestrator(job).run_all(&[account("acct", "s3cr3t")]);

    let Some(AccountResult::Success(reward)) = report.results.get("acct") else {
        panic!("expected success, got {:?}", report.results.get("acct"));
    };
    assert_eq!(reward.codes, vec!["B4U-1", "B4U-2"]);
    assert_eq!(reward.amount, "B4U-1,B4U-2");

    let sessions = sessions.lock().unwrap().clone();
    assert!(sessions.len() >= 3, "status plus two draws");
    assert!(sessions.iter().all(|s| s.as_deref() == Some("s3cr3t")));

    handle.abort();
}

/// An unknown action id: status fails (one attempt allowed), the draw 404s.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_luckydraw_wrong_action_fails_account() {
    let draws = Draws {
        drawn: Arc::new(AtomicU64::new(0)),
        quota: 5,
        sessions: Arc::new(Mutex::new(Vec::new())),
    };
    let (url, handle) = start_mock_server(lucky_app(draws)).await;

    let job = Job::LuckyDraw(LuckyDrawConfig {
        base_url: url.clone(),
        status_action: "stale-status".into(),
        draw_action: "stale-draw".into(),
        ..LuckyDrawConfig::default()
    });
    let report = http_orchestrator(job).run_all(&[account("acct", "tok")]);

    match report.results.get("acct") {
        Some(AccountResult::Failure { reason }) => {
            assert!(reason.starts_with("draw failed"), "{}", reason);
            assert!(reason.contains("404"), "{}", reason);
        }
        other => panic!("expected failure, got {:?}", other),
    }

    handle.abort();
}

// ============================================================================
// Credit spin
// ============================================================================

#[derive(Clone, Default)]
struct Spins {
    spun: Arc<AtomicU64>,
    auth: Arc<Mutex<Vec<Option<String>>>>,
}

fn bearer(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn credit_app(spins: Spins) -> Router {
    Router::new()
        .route(
            "/api/checkin/status",
            get(|State(s): State<Spins>, headers: HeaderMap| async move {
                s.auth.lock().unwrap().push(bearer(&headers));
                if s.spun.load(Ordering::SeqCst) == 0 {
                    Json(json!({"success": true, "can_spin": true}))
                } else {
                    Json(json!({"success": true, "can_spin": false, "today_record": {"quota_amount": 3000}}))
                }
            }),
        )
        .route(
            "/api/checkin/spin",
            post(|State(s): State<Spins>, headers: HeaderMap| async move {
                s.auth.lock().unwrap().push(bearer(&headers));
                if s.spun.fetch_add(1, Ordering::SeqCst) > 0 {
                    return (
                        StatusCode::BAD_REQUEST,
                        Json(json!({"success": false, "message": "Already spun today"})),
                    );
                }
                (
                    StatusCode::OK,
                    Json(json!({"success": true, "level": 2, "quota": 3000, "label": "second prize"})),
                )
            }),
        )
        .with_state(spins)
}

/// First run spins and is credited, the second sees the day's record.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_credit_spin_once_per_day() {
    let spins = Spins::default();
    let auth = Arc::clone(&spins.auth);
    let spun = Arc::clone(&spins.spun);
    let (url, handle) = start_mock_server(credit_app(spins)).await;

    let job = Job::CreditSpin(CreditSpinConfig {
        base_url: url.clone(),
        ..CreditSpinConfig::default()
    });
    let mut acct = account("acct", "ignored");
    acct.access_token = Some("jwt-1".into());

    let first = http_orchestrator(job.clone()).run_all(std::slice::from_ref(&acct));
    let Some(AccountResult::Success(reward)) = first.results.get("acct") else {
        panic!("expected success, got {:?}", first.results.get("acct"));
    };
    assert_eq!(reward.amount, "6.00");
    assert_eq!(reward.tier_name.as_deref(), Some("second prize"));

    let second = http_orchestrator(job).run_all(&[acct]);
    assert_eq!(
        second.results.get("acct").and_then(AccountResult::reward).map(|r| r.amount.as_str()),
        Some("6.00")
    );
    assert!(matches!(second.results.get("acct"), Some(AccountResult::AlreadyDone(_))));
    assert_eq!(spun.load(Ordering::SeqCst), 1);

    let auth = auth.lock().unwrap().clone();
    assert_eq!(auth.len(), 3, "status, spin, status");
    assert!(auth.iter().all(|a| a.as_deref() == Some("Bearer jwt-1")));

    handle.abort();
}
