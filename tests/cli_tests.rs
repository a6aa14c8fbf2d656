//! CLI integration tests using assert_cmd.
//!
//! Offline commands (`solve`, `bench`) and argument validation run without a
//! network. Job commands run against an axum mock site on an ephemeral port
//! to cover the digest file and notification gating across runs.

mod common;

use assert_cmd::Command;
use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use predicates::prelude::*;
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use common::start_mock_server;

#[allow(deprecated)]
fn checkin_harvest() -> Command {
    let mut cmd = Command::cargo_bin("checkin-harvest").unwrap();
    // Keep the caller's environment and any .env file out of the tests.
    cmd.env_remove("ACCOUNTS")
        .env_remove("ACCOUNTS_FILE")
        .env_remove("PROXY")
        .env_remove("TIER")
        .env_remove("NOTIFY_WEBHOOK_URL")
        .env_remove("STATE_DIR")
        .env_remove("LOG_FORMAT")
        .current_dir(std::env::temp_dir());
    cmd
}

// --- Help and arg validation ---

#[test]
fn help_shows_all_subcommands() {
    checkin_harvest().arg("--help").assert().success().stdout(
        predicate::str::contains("checkin")
            .and(predicate::str::contains("wheel"))
            .and(predicate::str::contains("luckydraw"))
            .and(predicate::str::contains("credit-spin"))
            .and(predicate::str::contains("bench"))
            .and(predicate::str::contains("solve")),
    );
}

#[test]
fn help_checkin_shows_args() {
    checkin_harvest()
        .args(["checkin", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--base-url").and(predicate::str::contains("--tier")));
}

#[test]
fn help_luckydraw_shows_action_args() {
    checkin_harvest()
        .args(["luckydraw", "--help"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("--status-action").and(predicate::str::contains("--draw-action")),
        );
}

#[test]
fn tier_out_of_range_rejected() {
    checkin_harvest()
        .args(["checkin", "--tier", "5"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("5"));
}

#[test]
fn solve_requires_prefix() {
    checkin_harvest()
        .args(["solve", "--difficulty", "8"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--prefix"));
}

#[test]
fn unknown_subcommand_fails() {
    checkin_harvest().arg("harvest-everything").assert().failure();
}

// --- Offline tools ---

#[test]
fn solve_prints_smallest_nonce_as_json() {
    let output = checkin_harvest()
        .args(["--threads", "2", "solve", "--prefix", "fixture-challenge", "--difficulty", "8"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let result: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(result["nonce"], 227);
    assert!(result["leading_zero_bits"].as_u64().unwrap() >= 8);
    assert!(result["hash_hex"].as_str().unwrap().starts_with("00"));
}

#[test]
fn solve_rejects_impossible_difficulty() {
    checkin_harvest()
        .args(["solve", "--prefix", "x", "--difficulty", "257"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("257"));
}

#[test]
fn bench_prints_a_rate() {
    checkin_harvest()
        .args(["bench", "--rounds", "1", "--duration-ms", "10"])
        .assert()
        .success()
        .stdout(predicate::str::is_match(r"^\d+ H/s\n$").unwrap());
}

// --- Job commands without network ---

#[test]
fn checkin_without_accounts_exits_one() {
    checkin_harvest().arg("checkin").assert().code(1).stdout(predicate::str::is_empty());
}

#[test]
fn wheel_with_blank_accounts_exits_one() {
    checkin_harvest()
        .args(["--accounts", " , ", "wheel"])
        .assert()
        .code(1);
}

#[test]
fn missing_accounts_file_exits_one() {
    let dir = tempfile::tempdir().unwrap();
    checkin_harvest()
        .arg("--accounts-file")
        .arg(dir.path().join("absent.toml"))
        .arg("luckydraw")
        .assert()
        .code(1);
}

#[test]
fn unreachable_site_reports_failure_and_writes_no_digest() {
    let dir = tempfile::tempdir().unwrap();
    checkin_harvest()
        .args(["--accounts", "tok-1", "--state-dir"])
        .arg(dir.path())
        .args(["wheel", "--base-url", "http://127.0.0.1:9"])
        .assert()
        .code(1);
    assert!(!dir.path().join("digest_wheel.txt").exists());
}

/// A wheel site that always awards the same check-in code and has no spins,
/// plus a webhook that counts deliveries.
fn wheel_site(hooks: Arc<AtomicU64>) -> Router {
    Router::new()
        .route("/api/checkin/status", get(|| async { Json(json!({"checked": false})) }))
        .route(
            "/api/checkin",
            post(|| async { Json(json!({"success": true, "code": "CK-1"})) }),
        )
        .route("/api/wheel/status", get(|| async { Json(json!({"remaining": 0})) }))
        .route(
            "/hook",
            post(|State(hooks): State<Arc<AtomicU64>>| async move {
                hooks.fetch_add(1, Ordering::SeqCst);
                Json(json!({"ok": true}))
            }),
        )
        .with_state(hooks)
}

/// Second run with identical results keeps the digest and sends nothing.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unchanged_results_skip_the_second_notification() {
    let hooks = Arc::new(AtomicU64::new(0));
    let (url, handle) = start_mock_server(wheel_site(Arc::clone(&hooks))).await;
    let dir = tempfile::tempdir().unwrap();

    let run = || {
        checkin_harvest()
            .env("RUST_LOG", "info")
            .args(["--accounts", "tok-1", "--state-dir"])
            .arg(dir.path())
            .arg("--webhook-url")
            .arg(format!("{}/hook", url))
            .args(["wheel", "--base-url", url.as_str()])
            .output()
            .unwrap()
    };

    let first = run();
    assert_eq!(first.status.code(), Some(0));
    assert_eq!(String::from_utf8_lossy(&first.stdout), "account_1\tCK-1\n");
    assert_eq!(hooks.load(Ordering::SeqCst), 1);

    let digest_path = dir.path().join("digest_wheel.txt");
    let saved = std::fs::read_to_string(&digest_path).unwrap();
    assert_eq!(saved.trim().len(), 16);
    assert!(saved.trim().chars().all(|c| c.is_ascii_hexdigit()));

    let second = run();
    assert_eq!(second.status.code(), Some(0));
    assert_eq!(hooks.load(Ordering::SeqCst), 1, "no second delivery");
    let stderr = String::from_utf8_lossy(&second.stderr);
    assert!(stderr.contains("notification skipped"), "{}", stderr);
    assert_eq!(std::fs::read_to_string(&digest_path).unwrap(), saved);

    handle.abort();
}
