//! # Credit Spin — One Daily Spin Credited to the Account Balance
//!
//! Unlike the harvest sites, the credit-spin site pays out in balance quota
//! rather than redemption codes, and allows exactly one spin a day. The
//! account authenticates with a bearer token.
//!
//! | Step | Request | Read |
//! |------|---------|------|
//! | status | `GET /api/checkin/status` | `success`, `can_spin`, `today_record.quota_amount` |
//! | spin | `POST /api/checkin/spin` (empty JSON body) | `success`, `quota`, `label`, `message` |
//!
//! Quota is reported in raw units; [`QUOTA_PER_UNIT`] of them make one unit
//! of displayed balance. A spin answered with 400 carries JSON like a 200.

use serde_json::Value;
use tracing::{info, warn};

use crate::error::{EngineError, EngineResult};
use crate::results::{scalar_string, AccountResult, Reward};
use crate::transport::{RawResponse, Request, Transport};

pub const DEFAULT_BASE_URL: &str = "https://up.x666.me";
pub const QUOTA_PER_UNIT: f64 = 500.0;

const ALREADY_SPUN: [&str; 2] = ["already", "已签到"];

#[derive(Debug, Clone, PartialEq)]
pub struct CreditSpinConfig {
    pub base_url: String,
    pub status: String,
    pub spin: String,
}

impl Default for CreditSpinConfig {
    fn default() -> Self {
        CreditSpinConfig {
            base_url: DEFAULT_BASE_URL.into(),
            status: "/api/checkin/status".into(),
            spin: "/api/checkin/spin".into(),
        }
    }
}

/// What the status endpoint says about today.
#[derive(Debug, Clone, PartialEq)]
pub enum SpinStatus {
    Available,
    /// Spun earlier today; the credited amount when the site reports it.
    AlreadySpun(Option<String>),
}

pub struct CreditSpinProvider<'a> {
    transport: &'a dyn Transport,
    config: &'a CreditSpinConfig,
}

impl<'a> CreditSpinProvider<'a> {
    pub fn new(transport: &'a dyn Transport, config: &'a CreditSpinConfig) -> Self {
        CreditSpinProvider { transport, config }
    }

    fn referer(&self) -> String {
        format!("{}/", self.config.base_url.trim_end_matches('/'))
    }

    pub fn status(&self) -> EngineResult<SpinStatus> {
        let path = &self.config.status;
        let response = self
            .transport
            .send(Request::get(path).header("referer", &self.referer()))
            .map_err(|e| EngineError::from_transport(path, e))?;
        if !response.is_success() {
            return Err(EngineError::StatusUnavailable(format!("HTTP {}", response.status)));
        }
        let data = response
            .json()
            .map_err(|e| EngineError::from_transport(path, e))?;
        if !data.get("success").and_then(Value::as_bool).unwrap_or(false) {
            let message = message_of(&data);
            return Err(EngineError::StatusUnavailable(if message.is_empty() {
                "unknown error".into()
            } else {
                message
            }));
        }
        if data.get("can_spin").and_then(Value::as_bool).unwrap_or(false) {
            return Ok(SpinStatus::Available);
        }
        let credited = data
            .get("today_record")
            .and_then(|r| r.get("quota_amount"))
            .and_then(Value::as_f64)
            .map(to_units);
        Ok(SpinStatus::AlreadySpun(credited))
    }

    pub fn spin(&self) -> EngineResult<AccountResult> {
        let path = &self.config.spin;
        let base = self.config.base_url.trim_end_matches('/');
        let request = Request::post(path)
            .header("content-type", "application/json")
            .header("origin", base)
            .header("referer", &self.referer());
        let response = self
            .transport
            .send(request)
            .map_err(|e| EngineError::from_transport(path, e))?;
        classify_spin(&response, path)
    }

    /// Status, then a spin when one is still available today.
    pub fn run(&self) -> EngineResult<AccountResult> {
        match self.status()? {
            SpinStatus::AlreadySpun(credited) => {
                info!(credited = ?credited, "already spun today");
                Ok(AccountResult::AlreadyDone(Reward::amount(credited.unwrap_or_default())))
            }
            SpinStatus::Available => self.spin(),
        }
    }
}

fn classify_spin(response: &RawResponse, path: &str) -> EngineResult<AccountResult> {
    if response.status != 200 && response.status != 400 {
        return Err(EngineError::SubmitFailed(format!("spin returned HTTP {}", response.status)));
    }
    let data = response
        .json()
        .map_err(|e| EngineError::from_transport(path, e))?;

    if data.get("success").and_then(Value::as_bool).unwrap_or(false) {
        let amount = data
            .get("quota")
            .and_then(Value::as_f64)
            .map(to_units)
            .unwrap_or_default();
        let reward = Reward {
            tier_name: data.get("label").and_then(scalar_string),
            notes: Some(message_of(&data)).filter(|m| !m.is_empty()),
            ..Reward::amount(amount)
        };
        info!(amount = %reward.amount, label = ?reward.tier_name, "spin credited");
        return Ok(AccountResult::Success(reward));
    }

    let message = message_of(&data);
    let lowered = message.to_lowercase();
    if ALREADY_SPUN.iter().any(|m| lowered.contains(m)) {
        info!(message = %message, "already spun today");
        return Ok(AccountResult::AlreadyDone(Reward::amount("")));
    }
    warn!(status = response.status, message = %message, "spin refused");
    Err(EngineError::SubmitFailed(if message.is_empty() {
        "spin rejected without a message".into()
    } else {
        message
    }))
}

fn message_of(data: &Value) -> String {
    data.get("message")
        .or_else(|| data.get("msg"))
        .and_then(scalar_string)
        .unwrap_or_default()
}

/// Raw quota to displayed balance, two decimals.
fn to_units(quota: f64) -> String {
    format!("{:.2}", quota / QUOTA_PER_UNIT)
}
