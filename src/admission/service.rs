//! Turning limiter decisions into HTTP-shaped outcomes.

use std::sync::Arc;
use tracing::{debug, instrument, warn};

use super::mode::{client_ip, Mode};
use crate::config::{FailurePolicy, TurnstileConfig};
use crate::ratelimit::{Decision, LimiterBackend};

/// Status code for a rejected request.
pub const STATUS_TOO_MANY_REQUESTS: u16 = 429;
/// Status code when the limiter fails under a closed policy.
pub const STATUS_INTERNAL_SERVER_ERROR: u16 = 500;
/// Header carrying the retry delay in whole seconds.
pub const RETRY_AFTER_HEADER: &str = "Retry-After";
/// Body of every rejection.
pub const REJECTION_BODY: &str =
    "you have reached the maximum number of requests or actions allowed within a certain time frame";
/// Body of a limiter failure.
pub const FAILURE_BODY: &str = "Internal Server Error";

/// The request attributes admission depends on.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestParts<'a> {
    /// Value of the configured token header
    pub token: Option<&'a str>,
    /// Value of `X-Forwarded-For`
    pub forwarded_for: Option<&'a str>,
    /// Value of `X-Real-IP`
    pub real_ip: Option<&'a str>,
    /// Address of the connected peer
    pub peer_addr: &'a str,
}

/// What the HTTP layer should do with a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// Hand the request to the next handler; `None` when it was not metered
    Pass(Option<Decision>),
    /// Answer 429 with a `Retry-After` header
    Reject {
        retry_after_secs: u64,
        decision: Decision,
    },
    /// Answer 500; the limiter failed and the policy is closed
    Fail,
}

impl Admission {
    /// Whether the request proceeds.
    pub fn is_pass(&self) -> bool {
        matches!(self, Admission::Pass(_))
    }

    /// Status code to answer with, or `None` to pass the request on.
    pub fn status(&self) -> Option<u16> {
        match self {
            Admission::Pass(_) => None,
            Admission::Reject { .. } => Some(STATUS_TOO_MANY_REQUESTS),
            Admission::Fail => Some(STATUS_INTERNAL_SERVER_ERROR),
        }
    }

    /// Headers to add to the answer.
    pub fn headers(&self) -> Vec<(&'static str, String)> {
        match self {
            Admission::Reject {
                retry_after_secs, ..
            } => vec![(RETRY_AFTER_HEADER, retry_after_secs.to_string())],
            _ => Vec::new(),
        }
    }

    /// Body to answer with.
    pub fn body(&self) -> Option<&'static str> {
        match self {
            Admission::Pass(_) => None,
            Admission::Reject { .. } => Some(REJECTION_BODY),
            Admission::Fail => Some(FAILURE_BODY),
        }
    }
}

/// Request admission in front of a limiter backend.
pub struct AdmissionService<R: LimiterBackend> {
    /// The limiter instance
    limiter: Arc<R>,
    token_enabled: bool,
    ip_enabled: bool,
    trust_proxy_headers: bool,
    failure_policy: FailurePolicy,
}

impl<R: LimiterBackend> AdmissionService<R> {
    /// Create a service applying the mode switches and policy of `config`.
    pub fn new(limiter: Arc<R>, config: &TurnstileConfig) -> Self {
        Self {
            limiter,
            token_enabled: config.limiter.token.enabled,
            ip_enabled: config.limiter.ip.enabled,
            trust_proxy_headers: config.admission.trust_proxy_headers,
            failure_policy: config.admission.failure_policy,
        }
    }

    /// The backing limiter.
    pub fn limiter(&self) -> &Arc<R> {
        &self.limiter
    }

    /// Resolve the metering mode of a request.
    pub fn resolve(&self, request: &RequestParts<'_>) -> Mode {
        let ip = client_ip(
            self.trust_proxy_headers,
            request.forwarded_for,
            request.real_ip,
            request.peer_addr,
        );
        Mode::resolve(self.token_enabled, self.ip_enabled, request.token, &ip)
    }

    /// Resolve and admit a request.
    pub async fn evaluate(&self, request: &RequestParts<'_>) -> Admission {
        let mode = self.resolve(request);
        self.admit(&mode).await
    }

    /// Admit a request already resolved to a mode.
    #[instrument(skip(self, mode), fields(mode = mode.name()))]
    pub async fn admit(&self, mode: &Mode) -> Admission {
        let result = match mode {
            Mode::Token(token) => self.limiter.allow_by_token(token).await,
            Mode::Ip(ip) => self.limiter.allow_by_ip(ip).await,
            Mode::Disabled => return Admission::Pass(None),
        };

        match result {
            Ok(decision) if decision.allowed => Admission::Pass(Some(decision)),
            Ok(decision) => {
                debug!(
                    retry_after_ms = decision.retry_after.as_millis() as u64,
                    limit = decision.limit,
                    "Request rejected by rate limit"
                );
                Admission::Reject {
                    retry_after_secs: decision.retry_after_secs(),
                    decision,
                }
            }
            Err(e) => match self.failure_policy {
                FailurePolicy::Closed => {
                    warn!(error = %e, "Rate limiter failed, refusing request");
                    Admission::Fail
                }
                FailurePolicy::Open => {
                    warn!(error = %e, "Rate limiter failed, admitting request");
                    Admission::Pass(None)
                }
            },
        }
    }
}
