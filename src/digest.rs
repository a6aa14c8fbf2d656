//! # Digest — Change Detection for Notifications
//!
//! A run's outcome is reduced to a short token: the successful reward amount
//! per account (`Success` and `AlreadyDone`), keyed by account name, serialized
//! as compact JSON with sorted keys, SHA-256 hashed and truncated to 16 hex
//! characters. Failures do not contribute, so a run that fails in a new way
//! but earns the same rewards produces the same token.
//!
//! The [`NotificationGate`] compares the token with the one persisted by the
//! previous run and only lets a notification through when they differ (or
//! when there is no previous token).

use std::collections::BTreeMap;

use anyhow::Result;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::results::ResultsMap;
use crate::store::DigestStore;

const DIGEST_LEN: usize = 16;

/// Stable token for the successful rewards in `results`; empty when none succeeded.
pub fn digest(results: &ResultsMap) -> String {
    let rewards: BTreeMap<&str, &str> = results
        .iter()
        .filter_map(|(key, result)| result.reward().map(|r| (key, r.amount.as_str())))
        .collect();
    if rewards.is_empty() {
        return String::new();
    }
    // BTreeMap serializes with sorted keys and serde_json::to_string is compact.
    let canonical = match serde_json::to_string(&rewards) {
        Ok(s) => s,
        Err(e) => {
            warn!(error = %e, "failed to serialize rewards for digest");
            return String::new();
        }
    };
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    let mut hex = format!("{:x}", hasher.finalize());
    hex.truncate(DIGEST_LEN);
    hex
}

/// Notify when there is no prior digest or it differs from the new one.
pub fn should_notify(new: &str, prior: Option<&str>) -> bool {
    match prior {
        None | Some("") => true,
        Some(p) => p != new,
    }
}

/// Loads the prior digest once, decides, and persists the new digest once.
pub struct NotificationGate<'a> {
    store: &'a dyn DigestStore,
    key: String,
    prior: Option<String>,
}

impl<'a> NotificationGate<'a> {
    /// Reads the prior digest for `key`. A store read error is treated as
    /// "no prior digest" so the run still notifies.
    pub fn open(store: &'a dyn DigestStore, key: &str) -> Self {
        let prior = match store.load(key) {
            Ok(p) => p.filter(|p| !p.is_empty()),
            Err(e) => {
                warn!(key, error = %e, "could not read previous digest");
                None
            }
        };
        match &prior {
            Some(p) => info!(key, digest = %p, "previous digest loaded"),
            None => info!(key, "no previous digest, first run"),
        }
        NotificationGate {
            store,
            key: key.to_string(),
            prior,
        }
    }

    pub fn prior(&self) -> Option<&str> {
        self.prior.as_deref()
    }

    pub fn should_notify(&self, new: &str) -> bool {
        let notify = should_notify(new, self.prior());
        info!(
            digest = %new,
            previous = self.prior().unwrap_or(""),
            notify,
            "digest compared"
        );
        notify
    }

    /// Persist `new` unless it is empty. Consumes the gate: one write per run.
    pub fn commit(self, new: &str) -> Result<()> {
        if new.is_empty() {
            return Ok(());
        }
        self.store.save(&self.key, new)
    }
}
