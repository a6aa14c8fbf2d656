//! # Transport — HTTP Plumbing Behind a Trait
//!
//! The engines never talk to the network directly. They build a [`Request`]
//! and hand it to a [`Transport`], which returns the raw status and body.
//! JSON decoding happens in [`RawResponse::json`] so an unparseable body is
//! reported as [`TransportError::Unparseable`], separate from request-level
//! failures (DNS, TLS, timeouts, refused connections).
//!
//! HTTP status codes are *not* errors at this layer: several upstream sites
//! return meaningful JSON with a 400 (e.g. "already spun today"), so the
//! engine reads the body and decides.
//!
//! [`HttpTransport`] is the production implementation on top of a blocking
//! `ureq` agent carrying the session's cookies and fingerprint headers, an
//! optional proxy, and a 30 second global timeout.

use std::time::Duration;

use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::config::ProxyConfig;
use crate::session::Session;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    /// The request never produced a readable response.
    #[error("request failed: {0}")]
    Request(String),
    /// A response arrived but its body could not be decoded.
    #[error("unparseable body: {0}")]
    Unparseable(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Empty,
    Json(Value),
    Text(String),
}

/// A request relative to the transport's base URL.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: Body,
}

impl Request {
    pub fn get(path: &str) -> Self {
        Request {
            method: Method::Get,
            path: path.to_string(),
            query: Vec::new(),
            headers: Vec::new(),
            body: Body::Empty,
        }
    }

    pub fn post(path: &str) -> Self {
        Request {
            method: Method::Post,
            ..Request::get(path)
        }
    }

    pub fn query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    pub fn header(mut self, key: &str, value: &str) -> Self {
        self.headers.push((key.to_string(), value.to_string()));
        self
    }

    pub fn json(mut self, value: Value) -> Self {
        self.body = Body::Json(value);
        self
    }

    pub fn text(mut self, text: &str) -> Self {
        self.body = Body::Text(text.to_string());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        RawResponse {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Decode the body as JSON, whatever the status code.
    pub fn json(&self) -> Result<Value, TransportError> {
        serde_json::from_str(&self.body).map_err(|e| {
            let preview: String = self.body.chars().take(120).collect();
            TransportError::Unparseable(format!("HTTP {}: {} ({:?})", self.status, e, preview))
        })
    }
}

/// Issues requests on behalf of one authenticated session.
pub trait Transport: Send + Sync {
    fn send(&self, request: Request) -> Result<RawResponse, TransportError>;
}

/// Builds a [`Transport`] for a freshly acquired session.
pub trait Connector: Send + Sync {
    fn connect(
        &self,
        base_url: &str,
        session: Session,
        proxy: Option<&ProxyConfig>,
    ) -> Result<Box<dyn Transport>, TransportError>;
}

/// Blocking `ureq` transport bound to one base URL and session.
pub struct HttpTransport {
    base_url: String,
    session: Session,
    agent: ureq::Agent,
}

impl HttpTransport {
    pub fn new(
        base_url: &str,
        session: Session,
        proxy: Option<&ProxyConfig>,
    ) -> Result<Self, TransportError> {
        let proxy = match proxy {
            Some(p) => Some(
                ureq::Proxy::new(&p.to_url())
                    .map_err(|e| TransportError::Request(format!("invalid proxy: {}", e)))?,
            ),
            None => None,
        };

        let agent = ureq::Agent::new_with_config(
            ureq::config::Config::builder()
                .timeout_global(Some(REQUEST_TIMEOUT))
                .http_status_as_error(false)
                .proxy(proxy)
                .build(),
        );

        Ok(HttpTransport {
            base_url: base_url.trim_end_matches('/').to_string(),
            session,
            agent,
        })
    }

    fn url_for(&self, request: &Request) -> Result<String, TransportError> {
        let mut url = url::Url::parse(&format!("{}{}", self.base_url, request.path))
            .map_err(|e| TransportError::Request(format!("invalid url: {}", e)))?;
        if !request.query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in &request.query {
                pairs.append_pair(k, v);
            }
        }
        Ok(url.to_string())
    }
}

impl Transport for HttpTransport {
    fn send(&self, request: Request) -> Result<RawResponse, TransportError> {
        let url = self.url_for(&request)?;
        debug!(method = ?request.method, url = %url, "sending request");

        let mut headers: Vec<(String, String)> = self
            .session
            .headers
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        if let Some(cookie) = self.session.cookie_header() {
            headers.push(("Cookie".to_string(), cookie));
        }
        headers.extend(request.headers.iter().cloned());

        let result = match request.method {
            Method::Get => {
                let mut builder = self.agent.get(&url);
                for (k, v) in &headers {
                    builder = builder.header(k.as_str(), v.as_str());
                }
                builder.call()
            }
            Method::Post => {
                let mut builder = self.agent.post(&url);
                for (k, v) in &headers {
                    builder = builder.header(k.as_str(), v.as_str());
                }
                match &request.body {
                    Body::Empty => builder.send_empty(),
                    Body::Json(value) => builder.send_json(value),
                    Body::Text(text) => builder.send(text.as_str()),
                }
            }
        };

        let mut response = result.map_err(|e| TransportError::Request(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .body_mut()
            .read_to_string()
            .map_err(|e| TransportError::Request(format!("reading body: {}", e)))?;
        Ok(RawResponse { status, body })
    }
}

/// Connects [`HttpTransport`]s.
#[derive(Default)]
pub struct HttpConnector;

impl Connector for HttpConnector {
    fn connect(
        &self,
        base_url: &str,
        session: Session,
        proxy: Option<&ProxyConfig>,
    ) -> Result<Box<dyn Transport>, TransportError> {
        Ok(Box::new(HttpTransport::new(base_url, session, proxy)?))
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_decodes_regardless_of_status() {
        let resp = RawResponse::new(400, r#"{"success":false,"message":"already spun"}"#);
        assert!(!resp.is_success());
        let v = resp.json().unwrap();
        assert_eq!(v["message"], "already spun");
    }

    #[test]
    fn non_json_body_is_unparseable() {
        let resp = RawResponse::new(200, "<html>Just a moment...</html>");
        match resp.json() {
            Err(TransportError::Unparseable(msg)) => {
                assert!(msg.contains("HTTP 200"));
                assert!(msg.contains("Just a moment"));
            }
            other => panic!("expected Unparseable, got {:?}", other),
        }
    }

    #[test]
    fn errors_display_their_kind() {
        let err: Box<dyn std::error::Error> = Box::new(TransportError::Request("timed out".into()));
        assert_eq!(err.to_string(), "request failed: timed out");
        assert_eq!(
            TransportError::Unparseable("eof".into()).to_string(),
            "unparseable body: eof"
        );
    }

    #[test]
    fn request_builder_accumulates_parts() {
        let req = Request::get("/api/pow/challenge")
            .query("tier", 4)
            .query("hps", 250_000u64)
            .header("referer", "https://example.test/app");
        assert_eq!(req.method, Method::Get);
        assert_eq!(
            req.query,
            vec![
                ("tier".to_string(), "4".to_string()),
                ("hps".to_string(), "250000".to_string())
            ]
        );
        assert_eq!(req.headers.len(), 1);
        assert_eq!(req.body, Body::Empty);

        let post = Request::post("/api/wheel").text("[]");
        assert_eq!(post.method, Method::Post);
        assert_eq!(post.body, Body::Text("[]".into()));
    }

    #[test]
    fn url_includes_encoded_query() {
        let transport = HttpTransport::new(
            "https://sign.example.test/",
            Session::default(),
            None,
        )
        .unwrap();
        let url = transport
            .url_for(&Request::get("/api/pow/challenge").query("tier", 4).query("note", "a b"))
            .unwrap();
        assert_eq!(url, "https://sign.example.test/api/pow/challenge?tier=4&note=a+b");
    }

    #[test]
    fn invalid_proxy_is_a_request_error() {
        let proxy = ProxyConfig {
            server: "http://[unterminated".into(),
            username: None,
            password: None,
        };
        let result = HttpTransport::new("https://example.test", Session::default(), Some(&proxy));
        assert!(matches!(result, Err(TransportError::Request(_))));
    }
}
