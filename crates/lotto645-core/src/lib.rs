//! Purchase automation engine for the Lotto 6/45 online store.
//!
//! The remote site exposes no API, so every step emulates a browser session:
//!
//! - [`session`]: RSA-encrypted login, cookie-carrying client, balance reads
//! - [`admission`]: purchase queue probe
//! - [`purchase`]: draw window, request construction, outcome classification
//! - [`ledger`]: per-round record of what was bought
//! - [`winning`]: draw result fetch and prize ranking
//! - [`tasks`]: the account-level entry points that tie these together
//!
//! All network calls are blocking. Accounts are processed one at a time,
//! each with a fresh session.

pub mod admission;
pub mod cipher;
pub mod config;
pub mod endpoints;
pub mod error;
pub mod format;
pub mod ledger;
pub mod notify;
pub mod purchase;
pub mod redact;
pub mod session;
pub mod tasks;
pub mod winning;

pub use admission::AdmissionDecision;
pub use config::{Account, Config, ConfigError, ScheduleEntry};
pub use endpoints::Endpoints;
pub use error::{LoginError, LottoError};
pub use ledger::{LedgerEntry, PurchaseLedger};
pub use notify::{Notifier, NotifyError, TelegramNotifier};
pub use purchase::{DrawWindow, PurchaseOutcome, PurchaseRequest};
pub use session::{Balance, Credentials, SessionClient};
pub use tasks::{TaskEnv, TaskKind, TaskSummary};
pub use winning::{DrawResult, RankOutcome};
