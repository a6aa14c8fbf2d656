//! # Orchestrator — Multi-Account Runs
//!
//! Runs one [`Job`] over every configured account, sequentially and in input
//! order, and aggregates a [`ResultsMap`].
//!
//! ## Failure Isolation
//!
//! Each account runs inside its own boundary: an [`EngineError`] or a panic
//! becomes that account's `Failure { reason }` and the batch moves on.
//!
//! ## Interrupts
//!
//! The shared stop flag (raised by SIGINT/SIGTERM) is checked before each
//! account, between protocol steps, between harvest draws and inside the
//! nonce search. Once raised, the in-flight account and every account not yet
//! started are recorded as `Failure` and the report is marked interrupted.
//! A flag raised after the last account already finished changes nothing.
//!
//! ## Harvest Results
//!
//! | Harvest ended with | Recorded as |
//! |--------------------|-------------|
//! | codes, quota spent | `Success` (codes) |
//! | no codes, quota spent | `AlreadyDone` |
//! | codes, then a failure | `Success` with the failure as `warning` |
//! | no codes, a failure | `Failure` |

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::calibrate::{CalibratedRate, HashRateCalibrator};
use crate::checkin::{self, ChallengeProtocolClient, CheckinConfig};
use crate::config::{AccountConfig, ProxyConfig};
use crate::creditspin::{CreditSpinConfig, CreditSpinProvider};
use crate::error::{EngineError, EngineResult};
use crate::harvest::luckydraw::{self, LuckyDrawConfig, LuckyDrawProvider};
use crate::harvest::wheel::{self, DailyCheckin, WheelConfig, WheelProvider};
use crate::pow::NonceSolver;
use crate::results::{AccountResult, ResultsMap, Reward};
use crate::session::{SessionProvider, TokenPlacement};
use crate::transport::{Connector, Transport};

/// What a run does for each account.
#[derive(Debug, Clone, PartialEq)]
pub enum Job {
    Checkin(CheckinConfig),
    Wheel(WheelConfig),
    LuckyDraw(LuckyDrawConfig),
    CreditSpin(CreditSpinConfig),
}

impl Job {
    pub fn name(&self) -> &'static str {
        match self {
            Job::Checkin(_) => "checkin",
            Job::Wheel(_) => "wheel",
            Job::LuckyDraw(_) => "luckydraw",
            Job::CreditSpin(_) => "creditspin",
        }
    }

    /// Where the job's site expects the account token.
    pub fn token_placement(&self) -> TokenPlacement {
        match self {
            Job::Checkin(_) => TokenPlacement::Cookie(checkin::SESSION_COOKIE),
            Job::Wheel(_) => TokenPlacement::Cookie(wheel::SESSION_COOKIE),
            Job::LuckyDraw(_) => TokenPlacement::Cookie(luckydraw::SESSION_COOKIE),
            Job::CreditSpin(_) => TokenPlacement::Bearer,
        }
    }

    pub fn base_url(&self) -> &str {
        match self {
            Job::Checkin(c) => &c.base_url,
            Job::Wheel(c) => &c.base_url,
            Job::LuckyDraw(c) => &c.base_url,
            Job::CreditSpin(c) => &c.base_url,
        }
    }

    /// Human-facing name: the site's host, or the job name if the URL has none.
    pub fn label(&self) -> String {
        url::Url::parse(self.base_url())
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_else(|| self.name().to_string())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub results: ResultsMap,
    pub interrupted: bool,
}

type CodeSink = Box<dyn Fn(&str, &str) + Send + Sync>;

pub struct AccountOrchestrator {
    job: Job,
    sessions: Box<dyn SessionProvider>,
    connector: Box<dyn Connector>,
    proxy: Option<ProxyConfig>,
    solver: NonceSolver,
    rate: CalibratedRate,
    stop: Arc<AtomicBool>,
    on_code: Option<CodeSink>,
}

impl AccountOrchestrator {
    pub fn new(job: Job, sessions: Box<dyn SessionProvider>, connector: Box<dyn Connector>) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        AccountOrchestrator {
            job,
            sessions,
            connector,
            proxy: None,
            solver: NonceSolver::new().with_stop(Arc::clone(&stop)),
            rate: CalibratedRate::new(HashRateCalibrator::default()),
            stop,
            on_code: None,
        }
    }

    /// Proxy for accounts that do not set their own.
    pub fn with_proxy(mut self, proxy: Option<ProxyConfig>) -> Self {
        self.proxy = proxy;
        self
    }

    /// Share an external stop flag with every engine.
    pub fn with_stop(mut self, stop: Arc<AtomicBool>) -> Self {
        self.solver = self.solver.with_stop(Arc::clone(&stop));
        self.stop = stop;
        self
    }

    /// Solver template; the orchestrator's stop flag is attached to it.
    pub fn with_solver(mut self, solver: NonceSolver) -> Self {
        self.solver = solver.with_stop(Arc::clone(&self.stop));
        self
    }

    pub fn with_rate(mut self, rate: CalibratedRate) -> Self {
        self.rate = rate;
        self
    }

    /// Called with `(account, code)` for every harvested code as it arrives.
    pub fn on_code(mut self, sink: impl Fn(&str, &str) + Send + Sync + 'static) -> Self {
        self.on_code = Some(Box::new(sink));
        self
    }

    pub fn job(&self) -> &Job {
        &self.job
    }

    pub fn run_all(&self, accounts: &[AccountConfig]) -> RunReport {
        let mut results = ResultsMap::new();
        let mut interrupted = false;

        for (i, account) in accounts.iter().enumerate() {
            if self.stopped() {
                warn!(skipped = accounts.len() - i, "interrupted, remaining accounts not processed");
                for rest in &accounts[i..] {
                    results.insert(&rest.name, AccountResult::failure("interrupted before processing"));
                }
                interrupted = true;
                break;
            }

            info!(
                account = %account.name,
                job = self.job.name(),
                progress = format_args!("{}/{}", i + 1, accounts.len()),
                "processing account"
            );
            let result = match panic::catch_unwind(AssertUnwindSafe(|| self.run_one(account))) {
                Ok(Ok(result)) => result,
                Ok(Err(e)) if e.is_interrupt() => {
                    interrupted = true;
                    match e {
                        EngineError::Cancelled => AccountResult::failure("interrupted"),
                        other => AccountResult::failure(other.to_string()),
                    }
                }
                Ok(Err(e)) => AccountResult::failure(e.to_string()),
                Err(payload) => {
                    let msg = panic_message(payload.as_ref());
                    error!(account = %account.name, panic = %msg, "account panicked");
                    AccountResult::failure(format!("panicked: {}", msg))
                }
            };

            match &result {
                AccountResult::Failure { reason } => {
                    warn!(account = %account.name, reason = %reason, "account failed")
                }
                AccountResult::Success(r) => info!(account = %account.name, reward = %r.amount, "account succeeded"),
                AccountResult::AlreadyDone(r) => {
                    info!(account = %account.name, reward = %r.amount, "account already done today")
                }
            }
            results.insert(&account.name, result);
        }

        RunReport {
            results,
            interrupted,
        }
    }

    fn stopped(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    fn run_one(&self, account: &AccountConfig) -> EngineResult<AccountResult> {
        let proxy = account.proxy.as_ref().or(self.proxy.as_ref());
        match &self.job {
            Job::Checkin(config) => ChallengeProtocolClient::new(
                self.sessions.as_ref(),
                self.connector.as_ref(),
                &self.rate,
                &self.solver,
                config,
            )
            .with_stop(Arc::clone(&self.stop))
            .run(account, proxy),
            Job::Wheel(config) => {
                let transport = self.connect(&config.base_url, account, proxy)?;
                let provider = WheelProvider::new(transport.as_ref(), config);
                let mut codes = Vec::new();
                if config.daily_checkin {
                    if let DailyCheckin::Awarded(code) = provider.daily_checkin()? {
                        self.emit(&account.name, &code);
                        codes.push(code);
                    }
                }
                let draws = provider.harvest().with_stop(Arc::clone(&self.stop));
                self.collect(account, draws, codes)
            }
            Job::LuckyDraw(config) => {
                let transport = self.connect(&config.base_url, account, proxy)?;
                let provider = LuckyDrawProvider::new(transport.as_ref(), config);
                let draws = provider.harvest().with_stop(Arc::clone(&self.stop));
                self.collect(account, draws, Vec::new())
            }
            Job::CreditSpin(config) => {
                let transport = self.connect(&config.base_url, account, proxy)?;
                CreditSpinProvider::new(transport.as_ref(), config).run()
            }
        }
    }

    fn connect(
        &self,
        base_url: &str,
        account: &AccountConfig,
        proxy: Option<&ProxyConfig>,
    ) -> EngineResult<Box<dyn Transport>> {
        let session = self
            .sessions
            .acquire(base_url, account, proxy)
            .ok_or(EngineError::SessionUnavailable)?;
        self.connector
            .connect(base_url, session, proxy)
            .map_err(|e| EngineError::from_transport("connect", e))
    }

    fn emit(&self, account: &str, code: &str) {
        if let Some(sink) = &self.on_code {
            sink(account, code);
        }
    }

    fn collect(
        &self,
        account: &AccountConfig,
        draws: impl Iterator<Item = EngineResult<String>>,
        mut codes: Vec<String>,
    ) -> EngineResult<AccountResult> {
        let mut warning = None;
        for item in draws {
            match item {
                Ok(code) => {
                    self.emit(&account.name, &code);
                    codes.push(code);
                }
                Err(EngineError::Cancelled) if !codes.is_empty() => {
                    return Err(EngineError::InterruptedAfterCodes(codes));
                }
                Err(e) if codes.is_empty() => return Err(e),
                Err(e) => {
                    warn!(account = %account.name, codes = codes.len(), error = %e, "harvest stopped early");
                    warning = Some(e.to_string());
                }
            }
        }

        if codes.is_empty() {
            return Ok(AccountResult::AlreadyDone(Reward::from_codes(codes)));
        }
        info!(account = %account.name, codes = codes.len(), "harvest finished");
        let mut reward = Reward::from_codes(codes);
        reward.warning = warning;
        Ok(AccountResult::Success(reward))
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
