//! # Session — Authenticated Session Acquisition
//!
//! A [`Session`] is the pair of cookies and fingerprint headers every request
//! for one account carries. Where those come from (a headless browser that
//! solved a Cloudflare interstitial, a cookie jar exported by hand) is the
//! business of a [`SessionProvider`]; the engines only ask for one and treat
//! `None` as an unrecoverable condition for that account.
//!
//! [`StaticSessionProvider`] is the shipped provider: it turns the account's
//! configured session token and extra cookies/headers into a session without
//! any network traffic. Where the token goes is a [`TokenPlacement`]: a named
//! cookie, or an `Authorization: Bearer` header for sites that hand out JWTs.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::config::{AccountConfig, ProxyConfig};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    pub cookies: BTreeMap<String, String>,
    pub headers: BTreeMap<String, String>,
}

impl Session {
    /// Render cookies as a single `Cookie` header value, `None` when empty.
    pub fn cookie_header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        Some(
            self.cookies
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }
}

pub trait SessionProvider: Send + Sync {
    /// Obtain a usable session for `account` against `url`. Providers own
    /// their retry policy; callers never retry a `None`.
    fn acquire(
        &self,
        url: &str,
        account: &AccountConfig,
        proxy: Option<&ProxyConfig>,
    ) -> Option<Session>;
}

/// Where a site expects the account's token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenPlacement {
    /// Under this cookie name (`sid` for the PoW sign-in site, `session` for
    /// the draw sites).
    Cookie(&'static str),
    /// As `Authorization: Bearer <token>`. `access_token` wins over
    /// `session_token` when both are set.
    Bearer,
}

/// Builds sessions straight from account configuration.
pub struct StaticSessionProvider {
    placement: TokenPlacement,
}

impl StaticSessionProvider {
    pub fn new(placement: TokenPlacement) -> Self {
        StaticSessionProvider { placement }
    }
}

fn non_empty(token: &Option<String>) -> Option<&str> {
    token.as_deref().filter(|t| !t.is_empty())
}

impl SessionProvider for StaticSessionProvider {
    fn acquire(
        &self,
        url: &str,
        account: &AccountConfig,
        _proxy: Option<&ProxyConfig>,
    ) -> Option<Session> {
        let mut cookies = account.cookies.clone();
        let mut headers = account.headers.clone();
        match self.placement {
            TokenPlacement::Cookie(name) => {
                if let Some(token) = non_empty(&account.session_token) {
                    cookies.insert(name.to_string(), token.to_string());
                }
                if cookies.is_empty() {
                    warn!(account = %account.name, url, "no session token or cookies configured");
                    return None;
                }
            }
            TokenPlacement::Bearer => {
                let Some(token) =
                    non_empty(&account.access_token).or_else(|| non_empty(&account.session_token))
                else {
                    warn!(account = %account.name, url, "no access token configured");
                    return None;
                };
                headers.insert("authorization".to_string(), format!("Bearer {}", token));
            }
        }
        debug!(account = %account.name, cookies = cookies.len(), "static session ready");
        Some(Session { cookies, headers })
    }
}
