//! # Main — CLI Entry Point
//!
//! Routes subcommands to the engines. Shared concerns handled here: `.env`
//! loading, logging setup and the rayon thread pool.
//!
//! ## Subcommands
//!
//! - `checkin`: PoW check-in for every account.
//! - `wheel`: daily check-in plus spin-wheel harvest.
//! - `luckydraw`: server-action lucky-draw harvest.
//! - `credit-spin`: one daily spin credited to the balance (bearer token).
//! - `bench`: print the calibrated local hash rate.
//! - `solve`: solve a single challenge offline and print the result as JSON.
//!
//! ## Global Options
//!
//! - `--accounts` / `ACCOUNTS`: JSON array (tokens or objects) or comma-separated tokens.
//! - `--accounts-file` / `ACCOUNTS_FILE`: TOML file with `[[accounts]]` tables.
//! - `--proxy` / `PROXY`: JSON `{server, username?, password?}` or a proxy URL.
//! - `--state-dir` / `STATE_DIR`: where the last-run digest is kept.
//! - `--webhook-url` / `NOTIFY_WEBHOOK_URL`: notification endpoint (log only when unset).
//! - `--threads`: rayon worker threads for the solver (defaults to all cores).

mod cli;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use checkin_harvest::checkin;
use checkin_harvest::creditspin;
use checkin_harvest::harvest::{luckydraw, wheel};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "checkin-harvest",
    version,
    about = "Solve PoW check-ins and harvest daily reward draws across accounts"
)]
struct Cli {
    /// Accounts: JSON array of tokens or objects, or comma-separated tokens
    #[arg(long, env = "ACCOUNTS", hide_env_values = true)]
    accounts: Option<String>,

    /// TOML file with [[accounts]] tables (takes precedence over --accounts)
    #[arg(long, env = "ACCOUNTS_FILE")]
    accounts_file: Option<PathBuf>,

    /// Global proxy: JSON {"server","username","password"} or a proxy URL
    #[arg(long, env = "PROXY", hide_env_values = true)]
    proxy: Option<String>,

    /// Directory holding the last-run digest files
    #[arg(long, env = "STATE_DIR", default_value = ".")]
    state_dir: PathBuf,

    /// Webhook receiving the run summary (logged only when unset)
    #[arg(long, env = "NOTIFY_WEBHOOK_URL")]
    webhook_url: Option<String>,

    /// Number of rayon worker threads (defaults to all logical cores)
    #[arg(long)]
    threads: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Proof-of-work check-in for every account
    Checkin {
        /// Site base URL
        #[arg(long, env = "CHECKIN_BASE_URL", default_value = checkin::DEFAULT_BASE_URL)]
        base_url: String,
        /// Difficulty tier 1-4; higher tiers pay more and take longer
        #[arg(long, env = "TIER", default_value_t = checkin::DEFAULT_TIER,
              value_parser = clap::value_parser!(u8).range(1..=4))]
        tier: u8,
    },
    /// Daily check-in plus spin-wheel harvest
    Wheel {
        /// Site base URL
        #[arg(long, env = "WHEEL_BASE_URL", default_value = wheel::DEFAULT_BASE_URL)]
        base_url: String,
        /// Skip the daily check-in and only spin
        #[arg(long)]
        skip_checkin: bool,
    },
    /// Server-action lucky-draw harvest
    Luckydraw {
        /// Site base URL
        #[arg(long, env = "LUCKYDRAW_BASE_URL", default_value = luckydraw::DEFAULT_BASE_URL)]
        base_url: String,
        /// Server action id returning the remaining draw count
        #[arg(long, default_value = luckydraw::DEFAULT_STATUS_ACTION)]
        status_action: String,
        /// Server action id performing one draw
        #[arg(long, default_value = luckydraw::DEFAULT_DRAW_ACTION)]
        draw_action: String,
    },
    /// Daily balance spin for bearer-token accounts
    CreditSpin {
        /// Site base URL
        #[arg(long, env = "CREDIT_SPIN_BASE_URL", default_value = creditspin::DEFAULT_BASE_URL)]
        base_url: String,
    },
    /// Measure the local SHA-256 hash rate
    Bench {
        /// Number of measurement rounds (median is reported)
        #[arg(long, default_value_t = 3)]
        rounds: usize,
        /// Length of each round in milliseconds
        #[arg(long, default_value_t = 1200)]
        duration_ms: u64,
    },
    /// Solve one challenge offline and print the result as JSON
    Solve {
        /// Challenge prefix (hashed as "<prefix>:<nonce>")
        #[arg(long)]
        prefix: String,
        /// Required leading zero bits (0-256)
        #[arg(long)]
        difficulty: u32,
    },
}

fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    // LOG_FORMAT=json for log shippers, human-readable on stderr otherwise
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();
    if log_format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .init();
    }

    let cli = Cli::parse();
    cli::configure_rayon(cli.threads);

    let code = match &cli.command {
        Commands::Bench {
            rounds,
            duration_ms,
        } => cli::run_bench(*rounds, *duration_ms)?,
        Commands::Solve { prefix, difficulty } => cli::run_solve(prefix, *difficulty)?,
        _ => cli::run_job(&cli)?,
    };
    std::process::exit(code);
}
