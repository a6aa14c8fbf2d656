//! # Harvest — Draw Until the Quota Runs Out
//!
//! Reward-draw endpoints share one shape: ask how many draws are left, then
//! draw repeatedly until the count reaches zero or the site says no more.
//! [`harvest`] is that loop as a pull-based [`Iterator`]: every obtained code
//! is yielded before the next draw is issued, so a consumer can persist or
//! forward it immediately.
//!
//! The loop knows nothing about HTTP. A provider supplies two closures:
//!
//! - `check()` seeds the remaining count. Zero or negative means the sequence
//!   is empty and `perform` is never called.
//! - `perform(&state)` issues one draw and classifies it as an [`Outcome`].
//!
//! | Outcome | Effect |
//! |---------|--------|
//! | `Awarded { code, remaining }` | yield `code`; remaining = echoed value or `remaining - 1` |
//! | `Consumed { remaining }` | a draw spent without a code; same update, nothing yielded |
//! | `Exhausted` | stop cleanly |
//! | `TransientFailure(msg)` | yield one `Err`, then the iterator is fused |
//!
//! There are no retries and no cap beyond `remaining`.
//!
//! Providers: [`wheel`] (check-in plus spin wheel) and [`luckydraw`]
//! (server-action lucky draw).

pub mod luckydraw;
pub mod wheel;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::debug;

use crate::error::{EngineError, EngineResult};

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Awarded { code: String, remaining: Option<i64> },
    Consumed { remaining: Option<i64> },
    Exhausted,
    TransientFailure(String),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HarvestState {
    pub remaining: i64,
    pub obtained_codes: Vec<String>,
    pub attempts: u64,
}

impl HarvestState {
    fn update_remaining(&mut self, echoed: Option<i64>) {
        self.remaining = echoed.unwrap_or(self.remaining - 1).max(0);
    }
}

/// Free-text markers a site uses to say the quota is spent. Consulted only
/// when a response carries no structured `remaining`.
#[derive(Debug, Clone, Copy)]
pub struct ExhaustedPatterns {
    /// Matched against the lowercased message.
    pub ascii: &'static [&'static str],
    /// Matched verbatim.
    pub verbatim: &'static [&'static str],
}

impl ExhaustedPatterns {
    pub fn matches(&self, message: &str) -> bool {
        let lower = message.to_lowercase();
        self.ascii.iter().any(|p| lower.contains(p))
            || self.verbatim.iter().any(|p| message.contains(p))
    }
}

pub struct Harvest<C, P> {
    check: Option<C>,
    perform: P,
    state: HarvestState,
    stop: Option<Arc<AtomicBool>>,
    done: bool,
}

/// Build the harvest sequence. Nothing is sent until the first `next()`.
pub fn harvest<C, P>(check: C, perform: P) -> Harvest<C, P>
where
    C: FnOnce() -> EngineResult<i64>,
    P: FnMut(&HarvestState) -> Outcome,
{
    Harvest {
        check: Some(check),
        perform,
        state: HarvestState::default(),
        stop: None,
        done: false,
    }
}

impl<C, P> Harvest<C, P> {
    /// Raised flag ends the sequence with `Err(Cancelled)` before the next draw.
    pub fn with_stop(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = Some(stop);
        self
    }

    pub fn state(&self) -> &HarvestState {
        &self.state
    }

    fn fail(&mut self, err: EngineError) -> Option<EngineResult<String>> {
        self.done = true;
        Some(Err(err))
    }
}

impl<C, P> Iterator for Harvest<C, P>
where
    C: FnOnce() -> EngineResult<i64>,
    P: FnMut(&HarvestState) -> Outcome,
{
    type Item = EngineResult<String>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if let Some(check) = self.check.take() {
            match check() {
                Ok(n) => {
                    debug!(remaining = n, "harvest quota");
                    self.state.remaining = n.max(0);
                }
                Err(e) => return self.fail(e),
            }
        }

        while self.state.remaining > 0 {
            if self.stop.as_ref().is_some_and(|s| s.load(Ordering::Relaxed)) {
                return self.fail(EngineError::Cancelled);
            }
            self.state.attempts += 1;
            match (self.perform)(&self.state) {
                Outcome::Awarded { code, remaining } => {
                    self.state.update_remaining(remaining);
                    self.state.obtained_codes.push(code.clone());
                    return Some(Ok(code));
                }
                Outcome::Consumed { remaining } => self.state.update_remaining(remaining),
                Outcome::Exhausted => self.state.remaining = 0,
                Outcome::TransientFailure(msg) => {
                    return self.fail(EngineError::TransientFailure(msg));
                }
            }
        }

        self.done = true;
        None
    }
}
