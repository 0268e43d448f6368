//! Per-request context passed explicitly into every operation

use chrono::{DateTime, Utc};

/// Caller metadata for one request
///
/// Built by the HTTP layer; library callers construct it directly.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Client address, if known
    pub origin_ip: Option<String>,

    /// Raw `User-Agent` header, if sent
    pub user_agent: Option<String>,

    /// Server time the request was accepted
    pub received_at: DateTime<Utc>,
}

impl RequestContext {
    pub fn new(origin_ip: Option<String>, user_agent: Option<String>) -> Self {
        Self {
            origin_ip,
            user_agent,
            received_at: Utc::now(),
        }
    }

    /// Context with no caller metadata
    pub fn anonymous() -> Self {
        Self::new(None, None)
    }

    /// Pin the receive time (tests, replays)
    pub fn at(mut self, received_at: DateTime<Utc>) -> Self {
        self.received_at = received_at;
        self
    }

    pub fn origin_ip(&self) -> &str {
        self.origin_ip.as_deref().unwrap_or_default()
    }

    pub fn user_agent(&self) -> &str {
        self.user_agent.as_deref().unwrap_or_default()
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::anonymous()
    }
}
