//! Run summary text and the process exit code derived from a [`RunReport`].

use chrono::{DateTime, Local};

use crate::notify::NotifyKind;
use crate::orchestrator::RunReport;
use crate::results::AccountResult;

const RULE: &str = "-------------------------------";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOutcome {
    AllSucceeded,
    Partial,
    AllFailed,
    Interrupted,
}

impl BatchOutcome {
    pub fn of(report: &RunReport) -> Self {
        let total = report.results.len();
        let ok = report.results.success_count();
        if report.interrupted {
            BatchOutcome::Interrupted
        } else if total > 0 && ok == total {
            BatchOutcome::AllSucceeded
        } else if ok > 0 {
            BatchOutcome::Partial
        } else {
            BatchOutcome::AllFailed
        }
    }

    pub fn exit_code(self) -> i32 {
        match self {
            BatchOutcome::AllSucceeded => 0,
            BatchOutcome::AllFailed => 1,
            BatchOutcome::Partial => 2,
            BatchOutcome::Interrupted => 130,
        }
    }

    pub fn verdict(self) -> &'static str {
        match self {
            BatchOutcome::AllSucceeded => "All accounts succeeded",
            BatchOutcome::Partial => "Some accounts succeeded",
            BatchOutcome::AllFailed => "All accounts failed",
            BatchOutcome::Interrupted => "Run interrupted",
        }
    }
}

/// One line per account, as shown in the notification body.
pub fn account_line(key: &str, result: &AccountResult) -> String {
    match result {
        AccountResult::Failure { reason } => format!("  {}: FAILED - {}", key, reason),
        AccountResult::AlreadyDone(r) if r.codes.is_empty() && r.amount.is_empty() => {
            format!("  {}: nothing left to claim today", key)
        }
        AccountResult::AlreadyDone(r) => {
            format!("  {}: already done today | reward {}{}", key, r.amount, tier_suffix(&r.tier_name))
        }
        AccountResult::Success(r) if !r.codes.is_empty() => {
            let mut line = format!("  {}: {} code(s): {}", key, r.codes.len(), r.codes.join(", "));
            if let Some(w) = &r.warning {
                line.push_str(&format!(" (stopped early: {})", w));
            }
            line
        }
        AccountResult::Success(r) => {
            let mut line = format!("  {}: reward {}{}", key, r.amount, tier_suffix(&r.tier_name));
            if let Some(m) = &r.multiplier {
                line.push_str(&format!(" x{}", m));
            }
            if let Some(s) = &r.solve {
                line.push_str(&format!(" | PoW {:.1}s @ {} H/s", s.elapsed_secs, s.observed_rate));
            }
            line
        }
    }
}

fn tier_suffix(tier: &Option<String>) -> String {
    match tier.as_deref() {
        Some(t) if !t.is_empty() => format!(" ({})", t),
        _ => String::new(),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub title: String,
    pub body: String,
    pub kind: NotifyKind,
    pub outcome: BatchOutcome,
}

pub fn summarize(label: &str, report: &RunReport, now: DateTime<Local>) -> Summary {
    let outcome = BatchOutcome::of(report);
    let total = report.results.len();
    let ok = report.results.success_count();

    let details: Vec<String> = report
        .results
        .iter()
        .map(|(key, result)| account_line(key, result))
        .collect();

    let body = [
        format!("Run time: {}", now.format("%Y-%m-%d %H:%M:%S")),
        format!("Details:\n{}", details.join("\n")),
        [
            RULE.to_string(),
            "Summary:".to_string(),
            format!("Succeeded: {}/{}", ok, total),
            format!("Failed: {}/{}", total - ok, total),
            outcome.verdict().to_string(),
        ]
        .join("\n"),
    ]
    .join("\n\n");

    let (title, kind) = if outcome == BatchOutcome::AllSucceeded {
        (format!("{} check-in succeeded", label), NotifyKind::Success)
    } else {
        (format!("{} check-in alert", label), NotifyKind::Alert)
    };

    Summary {
        title,
        body,
        kind,
        outcome,
    }
}
