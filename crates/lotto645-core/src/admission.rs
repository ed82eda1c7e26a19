//! Purchase queue probe.
//!
//! During high-demand windows the remote site puts buyers into a virtual
//! waiting room. The probe is answered with a flat JSON map; a positive
//! waiting count means this cycle must not purchase.

use serde_json::Value;
use tracing::{info, warn};

use crate::error::LottoError;
use crate::session::SessionClient;

const WAITING_COUNT_FIELD: &str = "ready_cnt";
const WAITING_TIME_FIELD: &str = "ready_time";
const DIRECT_ROUTE_FIELD: &str = "ready_ip";

/// Result of a queue probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdmissionDecision {
    /// No queue; the token is submitted with the purchase.
    DirectRoute(String),
    /// Sessions are waiting ahead of this one.
    Queued {
        /// Number of sessions ahead.
        count: u64,
        /// Estimated wait, when reported.
        eta_secs: Option<u64>,
    },
    /// Neither field was present.
    Unknown,
}

impl AdmissionDecision {
    /// Direct-route value for the purchase form; empty unless
    /// [`AdmissionDecision::DirectRoute`].
    #[must_use]
    pub fn direct_route(&self) -> &str {
        match self {
            Self::DirectRoute(token) => token,
            Self::Queued { .. } | Self::Unknown => "",
        }
    }

    /// Converts a queued decision into the hard-stop error.
    ///
    /// # Errors
    ///
    /// Returns [`LottoError::Queued`] when sessions are waiting.
    pub fn ensure_admitted(&self) -> Result<(), LottoError> {
        match *self {
            Self::Queued { count, eta_secs } => Err(LottoError::Queued {
                waiting: count,
                eta_secs,
            }),
            Self::DirectRoute(_) | Self::Unknown => Ok(()),
        }
    }
}

/// Reads a non-negative integer that may arrive as a JSON number or string.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn as_count(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Interprets a queue-status body.
#[must_use]
pub fn parse_admission(body: &Value) -> AdmissionDecision {
    if let Some(count) = body.get(WAITING_COUNT_FIELD).and_then(as_count) {
        if count > 0 {
            return AdmissionDecision::Queued {
                count,
                eta_secs: body.get(WAITING_TIME_FIELD).and_then(as_count),
            };
        }
    }

    match body.get(DIRECT_ROUTE_FIELD).and_then(Value::as_str) {
        Some(route) => AdmissionDecision::DirectRoute(route.to_string()),
        None => AdmissionDecision::Unknown,
    }
}

impl SessionClient {
    /// Probes the purchase queue.
    ///
    /// # Errors
    ///
    /// Returns a transport error or a parse error when the body is not JSON.
    pub fn check_admission(&self) -> Result<AdmissionDecision, LottoError> {
        let _enter = self.span().enter();
        let body = self.post_xhr(&self.endpoints().queue_status, None, "queue probe")?;
        let value: Value = serde_json::from_str(&body)
            .map_err(|e| LottoError::parse("queue probe response", e, &body))?;

        let decision = parse_admission(&value);
        match &decision {
            AdmissionDecision::DirectRoute(route) => info!(%route, "no queue, direct route granted"),
            AdmissionDecision::Queued { count, eta_secs } => {
                warn!(waiting = count, eta_secs = ?eta_secs, "purchase queue is busy");
            },
            AdmissionDecision::Unknown => info!("queue probe carried no route"),
        }
        Ok(decision)
    }
}
