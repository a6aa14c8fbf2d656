//! # Checkin — PoW Check-in Protocol Client
//!
//! Drives one account through the sign-in site's proof-of-work flow:
//!
//! ```text
//! Start ─► SessionReady ─► StatusChecked ─┬─ AlreadySignedToday ─────────────► Done
//!                                         └─ NeedsChallenge ─► ChallengeAcquired
//!                                              ─► NonceSolved ─► Submitted ─► Done
//! (any step) ─► Error
//! ```
//!
//! | Step | Request | Required fields |
//! |------|---------|-----------------|
//! | status | `GET /api/me` | `user`, `signedInToday`, `todaySignin.reward_final` |
//! | challenge | `GET /api/pow/challenge?tier=&hps=` | `challengeId`, `challenge`, `difficulty` |
//! | submit | `POST /api/pow/submit {challengeId, nonce, tier}` | `rewardFinal` |
//!
//! An account already signed in today never reaches the challenge or submit
//! endpoints. The hash rate sent with the challenge request comes from the
//! shared [`CalibratedRate`], measured on first use. Errors are terminal for
//! the account: the client moves to `Error` and returns the [`EngineError`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{info, warn};

use crate::calibrate::CalibratedRate;
use crate::config::{AccountConfig, ProxyConfig};
use crate::error::{EngineError, EngineResult};
use crate::pow::{NonceSolver, SolveOutcome, SolveResult, MAX_DIFFICULTY};
use crate::results::{scalar_string, AccountResult, Reward, SolveStats};
use crate::session::SessionProvider;
use crate::transport::{Connector, Request, Transport, TransportError};

pub const DEFAULT_BASE_URL: &str = "https://sign.qaq.al";
pub const DEFAULT_TIER: u8 = 4;
/// Cookie the site keeps its session id in.
pub const SESSION_COOKIE: &str = "sid";

#[derive(Debug, Clone, PartialEq)]
pub struct CheckinEndpoints {
    pub session_page: String,
    pub status: String,
    pub challenge: String,
    pub submit: String,
}

impl Default for CheckinEndpoints {
    fn default() -> Self {
        CheckinEndpoints {
            session_page: "/app".into(),
            status: "/api/me".into(),
            challenge: "/api/pow/challenge".into(),
            submit: "/api/pow/submit".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CheckinConfig {
    pub base_url: String,
    pub endpoints: CheckinEndpoints,
    /// Tier used when the account does not override it.
    pub tier: u8,
}

impl Default for CheckinConfig {
    fn default() -> Self {
        CheckinConfig {
            base_url: DEFAULT_BASE_URL.into(),
            endpoints: CheckinEndpoints::default(),
            tier: DEFAULT_TIER,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Challenge {
    pub id: String,
    pub prefix: String,
    pub difficulty: u32,
    pub target_seconds: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusVerdict {
    AlreadySignedToday,
    NeedsChallenge,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CheckinState {
    Start,
    SessionReady,
    StatusChecked(StatusVerdict),
    ChallengeAcquired(Challenge),
    NonceSolved(SolveResult),
    Submitted,
    Done,
    Error(EngineError),
}

pub struct ChallengeProtocolClient<'a> {
    sessions: &'a dyn SessionProvider,
    connector: &'a dyn Connector,
    rate: &'a CalibratedRate,
    solver: &'a NonceSolver,
    config: &'a CheckinConfig,
    stop: Option<Arc<AtomicBool>>,
    state: CheckinState,
}

impl<'a> ChallengeProtocolClient<'a> {
    pub fn new(
        sessions: &'a dyn SessionProvider,
        connector: &'a dyn Connector,
        rate: &'a CalibratedRate,
        solver: &'a NonceSolver,
        config: &'a CheckinConfig,
    ) -> Self {
        ChallengeProtocolClient {
            sessions,
            connector,
            rate,
            solver,
            config,
            stop: None,
            state: CheckinState::Start,
        }
    }

    /// Checked between steps. The solver carries its own copy of the flag.
    pub fn with_stop(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = Some(stop);
        self
    }

    pub fn state(&self) -> &CheckinState {
        &self.state
    }

    /// Run the full flow for `account`. `Ok` is either `Success` or `AlreadyDone`.
    pub fn run(
        &mut self,
        account: &AccountConfig,
        proxy: Option<&ProxyConfig>,
    ) -> EngineResult<AccountResult> {
        self.state = CheckinState::Start;
        let result = self.drive(account, proxy);
        if let Err(e) = &result {
            warn!(account = %account.name, state = ?self.state, error = %e, "check-in failed");
            self.state = CheckinState::Error(e.clone());
        }
        result
    }

    fn drive(
        &mut self,
        account: &AccountConfig,
        proxy: Option<&ProxyConfig>,
    ) -> EngineResult<AccountResult> {
        let endpoints = &self.config.endpoints;
        let page = format!(
            "{}{}",
            self.config.base_url.trim_end_matches('/'),
            endpoints.session_page
        );
        let session = self
            .sessions
            .acquire(&page, account, proxy)
            .ok_or(EngineError::SessionUnavailable)?;
        let transport = self
            .connector
            .connect(&self.config.base_url, session, proxy)
            .map_err(|e| EngineError::from_transport("connect", e))?;
        self.state = CheckinState::SessionReady;
        self.check_stop()?;

        if let Some(reward) = fetch_status(transport.as_ref(), &endpoints.status)? {
            self.state = CheckinState::StatusChecked(StatusVerdict::AlreadySignedToday);
            info!(
                account = %account.name,
                reward = %reward.amount,
                tier = reward.tier_name.as_deref().unwrap_or(""),
                "already signed in today, skipping PoW"
            );
            self.state = CheckinState::Done;
            return Ok(AccountResult::AlreadyDone(reward));
        }
        self.state = CheckinState::StatusChecked(StatusVerdict::NeedsChallenge);
        self.check_stop()?;

        let tier = account.tier.unwrap_or(self.config.tier);
        let hps = self.rate.get();
        let challenge = fetch_challenge(transport.as_ref(), &endpoints.challenge, tier, hps)?;
        info!(
            account = %account.name,
            challenge_id = %challenge.id,
            difficulty = challenge.difficulty,
            target_secs = ?challenge.target_seconds,
            tier,
            hps,
            "challenge acquired"
        );
        self.state = CheckinState::ChallengeAcquired(challenge.clone());

        let solver = self.solver.clone().with_rate_hint(Some(hps));
        let solved = match solver.solve(&challenge.prefix, challenge.difficulty) {
            SolveOutcome::Solved(r) => r,
            SolveOutcome::Cancelled { .. } => return Err(EngineError::Cancelled),
        };
        self.state = CheckinState::NonceSolved(solved.clone());
        self.check_stop()?;

        let mut reward = submit(
            transport.as_ref(),
            &endpoints.submit,
            &challenge.id,
            solved.nonce,
            tier,
        )?;
        self.state = CheckinState::Submitted;
        reward.solve = Some(SolveStats::from(&solved));
        info!(
            account = %account.name,
            reward = %reward.amount,
            multiplier = reward.multiplier.as_deref().unwrap_or(""),
            tier = reward.tier_name.as_deref().unwrap_or(""),
            "check-in accepted"
        );
        self.state = CheckinState::Done;
        Ok(AccountResult::Success(reward))
    }

    fn check_stop(&self) -> EngineResult<()> {
        match &self.stop {
            Some(stop) if stop.load(Ordering::Relaxed) => Err(EngineError::Cancelled),
            _ => Ok(()),
        }
    }
}

/// Send `request` and decode JSON. Request failures become
/// `TransportException`; bodies that are not JSON are reported through `malformed`.
fn call_json(
    transport: &dyn Transport,
    request: Request,
    malformed: fn(String) -> EngineError,
) -> EngineResult<Value> {
    let endpoint = request.path.clone();
    let response = transport
        .send(request)
        .map_err(|e| EngineError::from_transport(&endpoint, e))?;
    response.json().map_err(|e| match e {
        TransportError::Unparseable(reason) => malformed(format!("{}: {}", endpoint, reason)),
        other => EngineError::from_transport(&endpoint, other),
    })
}

fn site_error(data: &Value, fallback: &str) -> String {
    data.get("error")
        .or_else(|| data.get("message"))
        .and_then(scalar_string)
        .unwrap_or_else(|| fallback.to_string())
}

/// `Some(reward)` when the account already signed in today.
fn fetch_status(transport: &dyn Transport, path: &str) -> EngineResult<Option<Reward>> {
    let data = call_json(transport, Request::get(path), EngineError::StatusUnavailable)?;
    if matches!(data.get("user"), None | Some(Value::Null)) {
        return Err(EngineError::StatusUnavailable(site_error(&data, "response has no user")));
    }
    if !data.get("signedInToday").and_then(Value::as_bool).unwrap_or(false) {
        return Ok(None);
    }
    let today = data.get("todaySignin").cloned().unwrap_or(Value::Null);
    let mut reward = Reward::amount(
        today
            .get("reward_final")
            .and_then(scalar_string)
            .unwrap_or_else(|| "0".into()),
    );
    reward.tier_name = today.get("tier_name").and_then(scalar_string);
    Ok(Some(reward))
}

fn fetch_challenge(
    transport: &dyn Transport,
    path: &str,
    tier: u8,
    hps: u64,
) -> EngineResult<Challenge> {
    let request = Request::get(path).query("tier", tier).query("hps", hps);
    let data = call_json(transport, request, EngineError::ChallengeUnavailable)?;

    let missing = |field: &str| {
        EngineError::ChallengeUnavailable(site_error(&data, &format!("response has no {}", field)))
    };
    let prefix = data
        .get("challenge")
        .and_then(Value::as_str)
        .ok_or_else(|| missing("challenge"))?;
    let id = data
        .get("challengeId")
        .and_then(scalar_string)
        .ok_or_else(|| missing("challengeId"))?;
    let difficulty = data
        .get("difficulty")
        .and_then(Value::as_u64)
        .ok_or_else(|| missing("difficulty"))?;
    if difficulty > MAX_DIFFICULTY as u64 {
        return Err(EngineError::ChallengeUnavailable(format!(
            "difficulty {} exceeds {} bits",
            difficulty, MAX_DIFFICULTY
        )));
    }

    Ok(Challenge {
        id,
        prefix: prefix.to_string(),
        difficulty: difficulty as u32,
        target_seconds: data.get("targetSeconds").and_then(Value::as_f64),
    })
}

fn submit(
    transport: &dyn Transport,
    path: &str,
    challenge_id: &str,
    nonce: u64,
    tier: u8,
) -> EngineResult<Reward> {
    let request = Request::post(path).json(json!({
        "challengeId": challenge_id,
        "nonce": nonce,
        "tier": tier,
    }));
    let data = call_json(transport, request, EngineError::SubmitFailed)?;
    let amount = data
        .get("rewardFinal")
        .and_then(scalar_string)
        .ok_or_else(|| EngineError::SubmitFailed(site_error(&data, "response has no rewardFinal")))?;

    let field = |name: &str| data.get(name).and_then(scalar_string);
    Ok(Reward {
        base: field("rewardBase"),
        multiplier: field("multiplier"),
        tier_name: field("tierName"),
        notes: field("notes").filter(|n| !n.is_empty()),
        ..Reward::amount(amount)
    })
}
