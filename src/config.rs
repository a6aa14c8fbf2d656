//! # Config — Account and Proxy Configuration
//!
//! Accounts arrive either through an environment variable (`ACCOUNTS`) or a
//! TOML file. The variable accepts three shapes, checked in order:
//!
//! 1. a JSON array of objects (`[{"name":"main","session_token":"..."}]`),
//! 2. a JSON array of bare tokens (`["tok1","tok2"]`),
//! 3. a comma-separated token list (`tok1,tok2`).
//!
//! Unnamed accounts are labelled `account_N` by position (1-based). Empty
//! tokens are dropped before numbering so the labels stay dense. A repeated
//! name gets a `_2`, `_3`, ... suffix so every account keeps its own result.
//!
//! The proxy (`PROXY`) is either a JSON object `{server, username?, password?}`
//! or a bare proxy URL.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProxyConfig {
    pub server: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl ProxyConfig {
    /// Proxy URL with credentials inlined, as HTTP clients expect it.
    pub fn to_url(&self) -> String {
        let raw = if self.server.contains("://") {
            self.server.clone()
        } else {
            format!("http://{}", self.server)
        };
        let Ok(mut url) = url::Url::parse(&raw) else {
            return raw;
        };
        if let Some(user) = self.username.as_deref() {
            let _ = url.set_username(user);
            let _ = url.set_password(self.password.as_deref());
        }
        url.to_string().trim_end_matches('/').to_string()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default, alias = "sid", alias = "token")]
    pub session_token: Option<String>,
    /// Bearer token for sites that authenticate with an `Authorization` header.
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default, alias = "get_cdk_cookies", alias = "fuli_cookies")]
    pub cookies: BTreeMap<String, String>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Per-account PoW tier override.
    #[serde(default)]
    pub tier: Option<u8>,
    /// Per-account proxy, taking precedence over the global one.
    #[serde(default)]
    pub proxy: Option<ProxyConfig>,
}

impl AccountConfig {
    pub fn from_token(token: &str) -> Self {
        AccountConfig {
            session_token: Some(token.to_string()),
            ..AccountConfig::default()
        }
    }

    fn has_credentials(&self) -> bool {
        let present = |t: &Option<String>| t.as_deref().is_some_and(|t| !t.is_empty());
        present(&self.session_token) || present(&self.access_token) || !self.cookies.is_empty()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum AccountEntry {
    Token(String),
    Full(AccountConfig),
}

/// Parse the `ACCOUNTS` value into an ordered account list.
pub fn parse_accounts(raw: &str) -> Result<Vec<AccountConfig>> {
    let raw = raw.trim();
    if raw.is_empty() {
        bail!("account list is empty");
    }

    let accounts: Vec<AccountConfig> = if raw.starts_with('[') {
        let entries: Vec<AccountEntry> =
            serde_json::from_str(raw).context("accounts must be a JSON array")?;
        entries
            .into_iter()
            .map(|e| match e {
                AccountEntry::Token(t) => AccountConfig::from_token(t.trim()),
                AccountEntry::Full(a) => a,
            })
            .collect()
    } else {
        raw.split(',')
            .map(str::trim)
            .map(AccountConfig::from_token)
            .collect()
    };

    finish(accounts)
}

#[derive(Deserialize)]
struct AccountsFile {
    #[serde(default)]
    accounts: Vec<AccountConfig>,
}

/// Load accounts from a TOML file with `[[accounts]]` tables.
pub fn load_accounts_file(path: &Path) -> Result<Vec<AccountConfig>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading accounts file {}", path.display()))?;
    let file: AccountsFile = toml::from_str(&content)
        .with_context(|| format!("parsing accounts file {}", path.display()))?;
    finish(file.accounts)
}

fn finish(accounts: Vec<AccountConfig>) -> Result<Vec<AccountConfig>> {
    let mut valid: Vec<AccountConfig> =
        accounts.into_iter().filter(|a| a.has_credentials()).collect();
    if valid.is_empty() {
        bail!("no account with a session token or cookies found");
    }
    for (i, account) in valid.iter_mut().enumerate() {
        if account.name.trim().is_empty() {
            account.name = format!("account_{}", i + 1);
        }
    }

    let mut taken: HashSet<String> = HashSet::new();
    for account in valid.iter_mut() {
        if taken.contains(&account.name) {
            let mut n = 2;
            while taken.contains(&format!("{}_{}", account.name, n)) {
                n += 1;
            }
            let renamed = format!("{}_{}", account.name, n);
            warn!(name = %account.name, renamed = %renamed, "duplicate account name");
            account.name = renamed;
        }
        taken.insert(account.name.clone());
    }
    Ok(valid)
}

/// Parse the `PROXY` value: a JSON object or a bare server URL.
pub fn parse_proxy(raw: &str) -> Result<ProxyConfig> {
    let raw = raw.trim();
    if raw.is_empty() {
        bail!("proxy is empty");
    }
    if raw.starts_with('{') {
        return serde_json::from_str(raw).context("proxy must be a JSON object with a server");
    }
    Ok(ProxyConfig {
        server: raw.to_string(),
        username: None,
        password: None,
    })
}
