//! Lucky-draw provider backed by a React server action.
//!
//! Both calls POST to the draw page with a `next-action` header naming the
//! action. Responses are line-framed (`<id>:<payload>` per line) and the
//! result lives in frame `1`:
//!
//! ```text
//! 0:["$@1",["build-id",null]]
//! 1:{"success":true,"prize":{"name":"5 credits"},"redemptionCode":"B4U-XXXX"}
//! ```
//!
//! For the status action frame 1 is the remaining draw count; for the draw
//! action it is the result object, or `0` once the quota is spent.

use serde_json::Value;
use tracing::{info, warn};

use super::{harvest, ExhaustedPatterns, Harvest, HarvestState, Outcome};
use crate::error::{EngineError, EngineResult};
use crate::results::scalar_string;
use crate::transport::{Request, Transport};

pub const DEFAULT_BASE_URL: &str = "https://tw.b4u.qzz.io";
pub const SESSION_COOKIE: &str = "session";
pub const DEFAULT_STATUS_ACTION: &str = "7a7a7bf7f7c47cf1a8351d225a4338b0f017cd35";
pub const DEFAULT_DRAW_ACTION: &str = "cfc5966b4123c674815ce067b6b8894545c15604";

const ROUTER_STATE_TREE: &str = "%5B%22%22%2C%7B%22children%22%3A%5B%22(dashboard)%22%2C%7B%22children%22%3A%5B%22luckydraw%22%2C%7B%22children%22%3A%5B%22__PAGE__%22%2C%7B%7D%2C%22%2Fluckydraw%22%2C%22refresh%22%5D%7D%5D%7D%5D%7D%2Cnull%2Cnull%2Ctrue%5D";
const STATUS_BODY: &str = "[]";
const DRAW_BODY: &str = r#"[{"excludeThankYou":false}]"#;

pub const DRAW_EXHAUSTED: ExhaustedPatterns = ExhaustedPatterns {
    ascii: &["no more", "no draws", "already"],
    verbatim: &["次数", "已用完", "已经"],
};

#[derive(Debug, Clone, PartialEq)]
pub struct LuckyDrawConfig {
    pub base_url: String,
    pub page: String,
    pub status_action: String,
    pub draw_action: String,
}

impl Default for LuckyDrawConfig {
    fn default() -> Self {
        LuckyDrawConfig {
            base_url: DEFAULT_BASE_URL.into(),
            page: "/luckydraw".into(),
            status_action: DEFAULT_STATUS_ACTION.into(),
            draw_action: DEFAULT_DRAW_ACTION.into(),
        }
    }
}

/// Payload of the first line tagged `1:`.
pub fn result_frame(body: &str) -> Option<&str> {
    body.lines()
        .map(str::trim_end)
        .find_map(|line| line.strip_prefix("1:"))
}

#[derive(Clone, Copy)]
pub struct LuckyDrawProvider<'a> {
    transport: &'a dyn Transport,
    config: &'a LuckyDrawConfig,
}

impl<'a> LuckyDrawProvider<'a> {
    pub fn new(transport: &'a dyn Transport, config: &'a LuckyDrawConfig) -> Self {
        LuckyDrawProvider { transport, config }
    }

    fn action(&self, action: &str, body: &str) -> Request {
        let base = self.config.base_url.trim_end_matches('/');
        Request::post(&self.config.page)
            .header("accept", "text/x-component")
            .header("content-type", "text/plain;charset=UTF-8")
            .header("origin", base)
            .header("referer", &format!("{}{}", base, self.config.page))
            .header("next-action", action)
            .header("next-router-state-tree", ROUTER_STATE_TREE)
            .text(body)
    }

    pub fn harvest(
        &self,
    ) -> Harvest<impl FnOnce() -> EngineResult<i64> + 'a, impl FnMut(&HarvestState) -> Outcome + 'a>
    {
        let this = *self;
        harvest(move || this.remaining(), move |state| this.draw(state))
    }

    /// Remaining draws. A failed status call still allows one attempt.
    fn remaining(&self) -> EngineResult<i64> {
        let response = self
            .transport
            .send(self.action(&self.config.status_action, STATUS_BODY))
            .map_err(|e| EngineError::from_transport(&self.config.page, e))?;
        if !response.is_success() {
            warn!(status = response.status, "draw status unavailable, trying once");
            return Ok(1);
        }
        let remaining = match result_frame(&response.body) {
            Some(frame) => frame.trim().parse::<i64>().unwrap_or_else(|_| {
                warn!(frame = %frame, "unreadable draw count, trying once");
                1
            }),
            None => 0,
        };
        info!(remaining, "lucky draws remaining");
        Ok(remaining)
    }

    fn draw(&self, state: &HarvestState) -> Outcome {
        let response = match self
            .transport
            .send(self.action(&self.config.draw_action, DRAW_BODY))
        {
            Ok(r) => r,
            Err(e) => return Outcome::TransientFailure(e.to_string()),
        };
        if !response.is_success() {
            return Outcome::TransientFailure(format!("draw returned HTTP {}", response.status));
        }
        let Some(frame) = result_frame(&response.body) else {
            return Outcome::TransientFailure("draw response has no result frame".into());
        };
        let outcome = classify_draw(frame);
        if let Outcome::Awarded { code, .. } = &outcome {
            info!(draw = state.attempts, code = %code, "lucky draw awarded");
        }
        outcome
    }
}

/// Classify the payload of a draw response's result frame.
pub fn classify_draw(frame: &str) -> Outcome {
    let value: Value = match serde_json::from_str(frame.trim()) {
        Ok(v) => v,
        Err(_) => return Outcome::TransientFailure(format!("unreadable draw frame {:?}", frame)),
    };
    match &value {
        Value::Number(n) if n.as_i64().is_some_and(|n| n <= 0) => Outcome::Exhausted,
        Value::Object(_) => {
            let message = value
                .get("message")
                .and_then(scalar_string)
                .unwrap_or_default();
            if value.get("success").and_then(Value::as_bool).unwrap_or(false) {
                let prize = value
                    .pointer("/prize/name")
                    .and_then(scalar_string)
                    .unwrap_or_else(|| "unknown".into());
                match value
                    .get("redemptionCode")
                    .and_then(scalar_string)
                    .filter(|c| !c.is_empty())
                {
                    Some(code) => {
                        info!(prize = %prize, "prize won");
                        Outcome::Awarded {
                            code,
                            remaining: None,
                        }
                    }
                    None => {
                        warn!(prize = %prize, message = %message, "draw succeeded without a redemption code");
                        Outcome::Consumed { remaining: None }
                    }
                }
            } else if DRAW_EXHAUSTED.matches(&message) {
                Outcome::Exhausted
            } else if message.is_empty() {
                Outcome::TransientFailure("draw rejected without a message".into())
            } else {
                Outcome::TransientFailure(message)
            }
        }
        other => Outcome::TransientFailure(format!("unexpected draw frame {}", other)),
    }
}
