//! Spin-wheel provider: an optional daily check-in that may itself award a
//! code, then the wheel harvest.
//!
//! Both POST endpoints answer meaningful JSON with HTTP 200 *and* 400 (a 400
//! typically carries "already checked in" or "no spins left"), so both are
//! read. Any other status is a failed draw. A wheel status that is not a
//! readable 2xx JSON body counts as no spins left.

use serde_json::Value;
use tracing::{info, warn};

use super::{harvest, ExhaustedPatterns, Harvest, HarvestState, Outcome};
use crate::error::{EngineError, EngineResult};
use crate::results::scalar_string;
use crate::transport::{RawResponse, Request, Transport};

pub const DEFAULT_BASE_URL: &str = "https://fuli.hxi.me";
pub const SESSION_COOKIE: &str = "session";

pub const SPIN_EXHAUSTED: ExhaustedPatterns = ExhaustedPatterns {
    ascii: &["already", "no more"],
    verbatim: &["已经", "次数"],
};

pub const CHECKIN_DONE: ExhaustedPatterns = ExhaustedPatterns {
    ascii: &["already"],
    verbatim: &["已经", "已签"],
};

#[derive(Debug, Clone, PartialEq)]
pub struct WheelConfig {
    pub base_url: String,
    pub checkin_status: String,
    pub checkin: String,
    pub wheel_status: String,
    pub wheel: String,
    pub daily_checkin: bool,
}

impl Default for WheelConfig {
    fn default() -> Self {
        WheelConfig {
            base_url: DEFAULT_BASE_URL.into(),
            checkin_status: "/api/checkin/status".into(),
            checkin: "/api/checkin".into(),
            wheel_status: "/api/wheel/status".into(),
            wheel: "/api/wheel".into(),
            daily_checkin: true,
        }
    }
}

/// Result of the daily check-in preceding the wheel.
#[derive(Debug, Clone, PartialEq)]
pub enum DailyCheckin {
    Awarded(String),
    AlreadyChecked,
    /// Accepted without a code, or refused with a message that is not fatal.
    NoCode(Option<String>),
}

#[derive(Clone, Copy)]
pub struct WheelProvider<'a> {
    transport: &'a dyn Transport,
    config: &'a WheelConfig,
}

impl<'a> WheelProvider<'a> {
    pub fn new(transport: &'a dyn Transport, config: &'a WheelConfig) -> Self {
        WheelProvider { transport, config }
    }

    fn base(&self) -> &str {
        self.config.base_url.trim_end_matches('/')
    }

    fn post(&self, path: &str, referer: &str) -> Request {
        Request::post(path)
            .header("origin", self.base())
            .header("referer", &format!("{}{}", self.base(), referer))
            .header("accept", "*/*")
    }

    fn get(&self, path: &str, referer: &str) -> Request {
        Request::get(path).header("referer", &format!("{}{}", self.base(), referer))
    }

    /// Check in for the day unless already done. Only transport failures are
    /// errors; a refusal is logged and the wheel still runs.
    pub fn daily_checkin(&self) -> EngineResult<DailyCheckin> {
        let status = self
            .transport
            .send(self.get(&self.config.checkin_status, "/"))
            .map_err(|e| EngineError::from_transport(&self.config.checkin_status, e))?;
        if status.is_success() {
            if let Ok(data) = status.json() {
                if data.get("checked").and_then(Value::as_bool).unwrap_or(false) {
                    info!("daily check-in already done");
                    return Ok(DailyCheckin::AlreadyChecked);
                }
            }
        }

        let response = self
            .transport
            .send(self.post(&self.config.checkin, "/"))
            .map_err(|e| EngineError::from_transport(&self.config.checkin, e))?;
        let Some(data) = readable_json(&response) else {
            warn!(status = response.status, "daily check-in returned no readable body");
            return Ok(DailyCheckin::NoCode(None));
        };

        if data.get("success").and_then(Value::as_bool).unwrap_or(false) {
            return Ok(match non_empty(&data, "code") {
                Some(code) => {
                    info!(code = %code, "daily check-in awarded a code");
                    DailyCheckin::Awarded(code)
                }
                None => DailyCheckin::NoCode(None),
            });
        }
        let message = message_of(&data);
        if CHECKIN_DONE.matches(&message) {
            info!("daily check-in already done");
            Ok(DailyCheckin::AlreadyChecked)
        } else {
            warn!(message = %message, "daily check-in refused");
            Ok(DailyCheckin::NoCode(Some(message)))
        }
    }

    /// The wheel harvest: quota from the status endpoint, one spin per draw.
    pub fn harvest(
        &self,
    ) -> Harvest<impl FnOnce() -> EngineResult<i64> + 'a, impl FnMut(&HarvestState) -> Outcome + 'a>
    {
        let this = *self;
        harvest(move || this.remaining(), move |state| this.spin(state))
    }

    fn remaining(&self) -> EngineResult<i64> {
        let path = &self.config.wheel_status;
        let response = self
            .transport
            .send(self.get(path, "/wheel"))
            .map_err(|e| EngineError::from_transport(path, e))?;
        if !response.is_success() {
            warn!(status = response.status, "wheel status unavailable, assuming no spins");
            return Ok(0);
        }
        let data = match response.json() {
            Ok(data) => data,
            Err(e) => {
                warn!(error = %e, "wheel status unreadable, assuming no spins");
                return Ok(0);
            }
        };
        let remaining = data.get("remaining").and_then(Value::as_i64).unwrap_or(0);
        info!(remaining, "wheel spins remaining");
        Ok(remaining)
    }

    fn spin(&self, state: &HarvestState) -> Outcome {
        let response = match self.transport.send(self.post(&self.config.wheel, "/wheel")) {
            Ok(r) => r,
            Err(e) => return Outcome::TransientFailure(e.to_string()),
        };
        let Some(data) = readable_json(&response) else {
            return Outcome::TransientFailure(format!("spin returned HTTP {}", response.status));
        };
        let outcome = classify_spin(&data);
        match &outcome {
            Outcome::Awarded { code, remaining } => {
                info!(spin = state.attempts, code = %code, remaining = ?remaining, "wheel spin awarded")
            }
            Outcome::Exhausted => info!(spin = state.attempts, "no more wheel spins"),
            _ => {}
        }
        outcome
    }
}

/// JSON body of a 200 or 400 response; anything else is unreadable.
fn readable_json(response: &RawResponse) -> Option<Value> {
    if response.status != 200 && response.status != 400 {
        return None;
    }
    response.json().ok()
}

fn non_empty(data: &Value, field: &str) -> Option<String> {
    data.get(field)
        .and_then(scalar_string)
        .filter(|s| !s.is_empty())
}

fn message_of(data: &Value) -> String {
    data.get("message")
        .or_else(|| data.get("msg"))
        .and_then(scalar_string)
        .unwrap_or_default()
}

/// Classify one spin response body.
pub fn classify_spin(data: &Value) -> Outcome {
    let remaining = data.get("remaining").and_then(Value::as_i64);
    if data.get("success").and_then(Value::as_bool).unwrap_or(false) {
        return match non_empty(data, "code") {
            Some(code) => Outcome::Awarded { code, remaining },
            None => Outcome::Consumed { remaining },
        };
    }
    if remaining.is_some_and(|r| r <= 0) {
        return Outcome::Exhausted;
    }
    let message = message_of(data);
    if SPIN_EXHAUSTED.matches(&message) {
        Outcome::Exhausted
    } else if message.is_empty() {
        Outcome::TransientFailure("spin rejected without a message".into())
    } else {
        Outcome::TransientFailure(message)
    }
}
