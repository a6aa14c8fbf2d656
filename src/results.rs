//! Per-account outcomes and the ordered map the orchestrator aggregates them into.

use serde::Serialize;
use serde_json::Value;

use crate::pow::SolveResult;

/// Solver statistics attached to a PoW check-in reward.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SolveStats {
    pub nonce: u64,
    pub leading_zero_bits: u32,
    pub elapsed_secs: f64,
    pub observed_rate: u64,
}

impl From<&SolveResult> for SolveStats {
    fn from(r: &SolveResult) -> Self {
        SolveStats {
            nonce: r.nonce,
            leading_zero_bits: r.leading_zero_bits,
            elapsed_secs: r.elapsed_secs,
            observed_rate: r.observed_rate,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Reward {
    /// Final reward as the site reports it; for harvests, the codes joined by `,`.
    pub amount: String,
    pub base: Option<String>,
    pub multiplier: Option<String>,
    pub tier_name: Option<String>,
    pub notes: Option<String>,
    pub solve: Option<SolveStats>,
    pub codes: Vec<String>,
    /// A harvest that stopped on a failure after obtaining codes.
    pub warning: Option<String>,
}

impl Reward {
    pub fn amount(amount: impl Into<String>) -> Self {
        Reward {
            amount: amount.into(),
            ..Reward::default()
        }
    }

    pub fn from_codes(codes: Vec<String>) -> Self {
        Reward {
            amount: codes.join(","),
            codes,
            ..Reward::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AccountResult {
    Success(Reward),
    AlreadyDone(Reward),
    Failure { reason: String },
}

impl AccountResult {
    pub fn failure(reason: impl Into<String>) -> Self {
        AccountResult::Failure {
            reason: reason.into(),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, AccountResult::Failure { .. })
    }

    pub fn reward(&self) -> Option<&Reward> {
        match self {
            AccountResult::Success(r) | AccountResult::AlreadyDone(r) => Some(r),
            AccountResult::Failure { .. } => None,
        }
    }
}

/// Account key → result, kept in processing order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResultsMap {
    entries: Vec<(String, AccountResult)>,
}

impl ResultsMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `result` for `key`; a repeated key overwrites in place.
    pub fn insert(&mut self, key: &str, result: AccountResult) {
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some(slot) => slot.1 = result,
            None => self.entries.push((key.to_string(), result)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&AccountResult> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, r)| r)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AccountResult)> {
        self.entries.iter().map(|(k, r)| (k.as_str(), r))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn success_count(&self) -> usize {
        self.entries.iter().filter(|(_, r)| !r.is_failure()).count()
    }

    pub fn failure_count(&self) -> usize {
        self.len() - self.success_count()
    }
}

/// Render a JSON scalar the way the site displays it: strings as-is, numbers
/// and booleans via `to_string`, null and containers as `None`.
pub fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
