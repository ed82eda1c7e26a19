//! Error taxonomy for the purchase transaction engine.
//!
//! Every account-level task catches these, logs them and reports them to
//! the notifier. None of them is fatal to the process.

use thiserror::Error;

use crate::cipher::EncryptionError;
use crate::ledger::LedgerError;

/// Reasons a login attempt did not produce an authenticated session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoginError {
    /// The remote system rendered a credential failure page.
    #[error("credentials rejected by the remote system")]
    InvalidCredentials,

    /// No failure marker was present, but neither was a confirmed session.
    #[error("login could not be confirmed (no session marker or session cookie)")]
    Unconfirmed,
}

/// Errors raised by the session, admission and purchase components.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LottoError {
    /// Network failure or timeout. Never retried inside the engine.
    #[error("transport error during {context}: {message}")]
    Transport {
        /// Step that was running when the request failed.
        context: &'static str,
        /// Underlying transport message.
        message: String,
    },

    /// A body that had to be structured could not be parsed.
    #[error("failed to parse {context}: {message} (body: {snippet})")]
    Parse {
        /// What was being parsed.
        context: &'static str,
        /// Parser message.
        message: String,
        /// Bounded excerpt of the offending body.
        snippet: String,
    },

    /// The remote system answered with a recognized but unexpected shape.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The public key endpoint did not yield usable key material.
    #[error("public key fetch failed: {0}")]
    KeyFetch(String),

    /// Credentials rejected or session not confirmed.
    #[error("authentication failed: {0}")]
    Authentication(#[from] LoginError),

    /// Credential encryption failed.
    #[error(transparent)]
    Encryption(#[from] EncryptionError),

    /// The purchase page lacked a field the purchase cannot proceed without.
    #[error("purchase page is missing required field `{field}`")]
    MissingPurchaseContext {
        /// Name of the missing field.
        field: &'static str,
    },

    /// The admission queue is non-empty; this cycle must not purchase.
    #[error("purchase queue is busy ({waiting} waiting{})", eta_suffix(.eta_secs))]
    Queued {
        /// Number of sessions ahead in the queue.
        waiting: u64,
        /// Estimated wait reported by the remote system.
        eta_secs: Option<u64>,
    },

    /// Requested line count is outside `1..=5`.
    #[error("quantity {0} is outside the allowed range 1..=5")]
    InvalidQuantity(u8),

    /// Ledger persistence failed.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

#[allow(clippy::ref_option)]
fn eta_suffix(eta_secs: &Option<u64>) -> String {
    eta_secs.map_or_else(String::new, |secs| format!(", about {secs}s"))
}

impl LottoError {
    /// Wraps a `reqwest` failure for the given step.
    pub(crate) fn transport(context: &'static str, error: &reqwest::Error) -> Self {
        Self::Transport {
            context,
            message: error.to_string(),
        }
    }

    /// Builds a parse error carrying a bounded snippet of `body`.
    pub(crate) fn parse(context: &'static str, message: impl ToString, body: &str) -> Self {
        Self::Parse {
            context,
            message: message.to_string(),
            snippet: crate::redact::snippet(body, crate::redact::DIAGNOSTIC_SNIPPET_BYTES),
        }
    }
}
