//! # CLI Execution Functions
//!
//! Extracted from `main.rs` to keep the entry point slim. Contains the execution
//! logic for each subcommand: account loading, job dispatch, notification
//! gating, the offline solver and rayon configuration.

use anyhow::{bail, Result};
use checkin_harvest::calibrate::HashRateCalibrator;
use checkin_harvest::checkin::CheckinConfig;
use checkin_harvest::config::{self, AccountConfig, ProxyConfig};
use checkin_harvest::creditspin::CreditSpinConfig;
use checkin_harvest::digest::{self, NotificationGate};
use checkin_harvest::harvest::luckydraw::LuckyDrawConfig;
use checkin_harvest::harvest::wheel::WheelConfig;
use checkin_harvest::notify::{LogNotifier, Notifier, WebhookNotifier};
use checkin_harvest::orchestrator::{AccountOrchestrator, Job};
use checkin_harvest::pow::{NonceSolver, SolveOutcome, MAX_DIFFICULTY};
use checkin_harvest::report;
use checkin_harvest::session::StaticSessionProvider;
use checkin_harvest::store::FileDigestStore;
use checkin_harvest::transport::HttpConnector;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use super::{Cli, Commands};

/// Exit code for a run that never reached an account.
const EXIT_FAILURE: i32 = 1;
const EXIT_INTERRUPTED: i32 = 130;

// ── Job Dispatch ────────────────────────────────────────────────

fn job_for(cmd: &Commands) -> Option<Job> {
    match cmd {
        Commands::Checkin { base_url, tier } => Some(Job::Checkin(CheckinConfig {
            base_url: base_url.clone(),
            tier: *tier,
            ..CheckinConfig::default()
        })),
        Commands::Wheel {
            base_url,
            skip_checkin,
        } => Some(Job::Wheel(WheelConfig {
            base_url: base_url.clone(),
            daily_checkin: !skip_checkin,
            ..WheelConfig::default()
        })),
        Commands::Luckydraw {
            base_url,
            status_action,
            draw_action,
        } => Some(Job::LuckyDraw(LuckyDrawConfig {
            base_url: base_url.clone(),
            status_action: status_action.clone(),
            draw_action: draw_action.clone(),
            ..LuckyDrawConfig::default()
        })),
        Commands::CreditSpin { base_url } => Some(Job::CreditSpin(CreditSpinConfig {
            base_url: base_url.clone(),
            ..CreditSpinConfig::default()
        })),
        Commands::Bench { .. } | Commands::Solve { .. } => None,
    }
}

fn load_accounts(cli: &Cli) -> Result<Vec<AccountConfig>> {
    if let Some(path) = &cli.accounts_file {
        return config::load_accounts_file(path);
    }
    match cli.accounts.as_deref() {
        Some(raw) => config::parse_accounts(raw),
        None => bail!("no accounts configured (set ACCOUNTS or --accounts-file)"),
    }
}

fn load_proxy(cli: &Cli) -> Result<Option<ProxyConfig>> {
    match cli.proxy.as_deref().map(str::trim) {
        Some(raw) if !raw.is_empty() => Ok(Some(config::parse_proxy(raw)?)),
        _ => Ok(None),
    }
}

/// Run a job subcommand over every configured account. Returns the process
/// exit code; configuration problems exit 1 without touching the network.
pub fn run_job(cli: &Cli) -> Result<i32> {
    let Some(job) = job_for(&cli.command) else {
        bail!("not a job subcommand");
    };

    let accounts = match load_accounts(cli) {
        Ok(a) => a,
        Err(e) => {
            error!(error = %e, "could not load accounts");
            return Ok(EXIT_FAILURE);
        }
    };
    let proxy = match load_proxy(cli) {
        Ok(p) => p,
        Err(e) => {
            error!(error = %e, "invalid proxy configuration");
            return Ok(EXIT_FAILURE);
        }
    };

    let label = job.label();
    let key = job.name();
    info!(
        job = key,
        site = %label,
        accounts = accounts.len(),
        proxy = proxy.is_some(),
        "run starting"
    );

    let stop = Arc::new(AtomicBool::new(false));
    spawn_signal_handler(Arc::clone(&stop));

    let sessions = Box::new(StaticSessionProvider::new(job.token_placement()));
    let orchestrator = AccountOrchestrator::new(job, sessions, Box::new(HttpConnector))
        .with_proxy(proxy)
        .with_stop(Arc::clone(&stop))
        .with_solver(NonceSolver::new())
        .on_code(|account, code| println!("{}\t{}", account, code));

    let store = FileDigestStore::new(&cli.state_dir);
    let gate = NotificationGate::open(&store, key);

    let run = orchestrator.run_all(&accounts);
    let new_digest = digest::digest(&run.results);
    let summary = report::summarize(&label, &run, chrono::Local::now());

    if gate.should_notify(&new_digest) {
        let notifier: Box<dyn Notifier> = match cli.webhook_url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => Box::new(WebhookNotifier::new(url)),
            _ => Box::new(LogNotifier),
        };
        notifier.push(&summary.title, &summary.body, summary.kind);
    } else {
        info!("results unchanged since last run, notification skipped");
    }

    if let Err(e) = gate.commit(&new_digest) {
        warn!(error = %e, "could not persist digest");
    }

    info!(
        succeeded = run.results.success_count(),
        failed = run.results.failure_count(),
        interrupted = run.interrupted,
        "{}",
        summary.outcome.verdict()
    );
    Ok(summary.outcome.exit_code())
}

// ── Offline Tools ───────────────────────────────────────────────

/// Measure the local hash rate and print it.
pub fn run_bench(rounds: usize, duration_ms: u64) -> Result<i32> {
    let calibrator = HashRateCalibrator::new(rounds, Duration::from_millis(duration_ms));
    let rate = calibrator.measure();
    info!(rounds, duration_ms, rate, "calibration finished");
    println!("{} H/s", rate);
    Ok(0)
}

/// Solve a single challenge and print the result as JSON on stdout.
pub fn run_solve(prefix: &str, difficulty: u32) -> Result<i32> {
    if difficulty > MAX_DIFFICULTY {
        bail!(
            "difficulty {} exceeds the {} bits of a SHA-256 digest",
            difficulty,
            MAX_DIFFICULTY
        );
    }

    let stop = Arc::new(AtomicBool::new(false));
    spawn_signal_handler(Arc::clone(&stop));

    match NonceSolver::new().with_stop(stop).solve(prefix, difficulty) {
        SolveOutcome::Solved(result) => {
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(0)
        }
        SolveOutcome::Cancelled { attempts } => {
            warn!(attempts, "solve interrupted");
            Ok(EXIT_INTERRUPTED)
        }
    }
}

// ── Process Plumbing ────────────────────────────────────────────

/// Raise `stop` on SIGINT or SIGTERM. Engines poll the flag between steps.
fn spawn_signal_handler(stop: Arc<AtomicBool>) {
    std::thread::spawn(move || {
        let sig_rt = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(rt) => rt,
            Err(e) => {
                warn!(error = %e, "could not start signal handler runtime");
                return;
            }
        };
        sig_rt.block_on(async {
            let ctrl_c = tokio::signal::ctrl_c();
            #[cfg(unix)]
            {
                match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                    Ok(mut sigterm) => {
                        tokio::select! {
                            _ = ctrl_c => {},
                            _ = sigterm.recv() => {},
                        }
                    }
                    Err(_) => {
                        let _ = ctrl_c.await;
                    }
                }
            }
            #[cfg(not(unix))]
            {
                let _ = ctrl_c.await;
            }
            warn!("stop requested, finishing current step");
            stop.store(true, Ordering::Relaxed);
        });
    });
}

/// Configure the global rayon pool. `None` keeps rayon's default of one
/// thread per logical core.
pub fn configure_rayon(threads: Option<usize>) {
    let Some(num_threads) = threads.filter(|&n| n > 0) else {
        return;
    };
    match rayon::ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .build_global()
    {
        Ok(()) => info!(threads = num_threads, "rayon thread pool configured"),
        Err(e) => warn!(error = %e, "Could not configure rayon thread pool"),
    }
}
