//! Task entry points invoked by the CLI and the scheduler.
//!
//! Accounts are processed strictly one after another, each with its own
//! session. A failing account is logged and reported; it never stops the
//! accounts after it.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset, Offset, Utc};
use tracing::{error, info, info_span, warn};

use crate::config::{Account, Config};
use crate::endpoints::Endpoints;
use crate::error::LottoError;
use crate::format::{format_outcome, format_won};
use crate::ledger::PurchaseLedger;
use crate::notify::{Notifier, TelegramNotifier, notify_safe};
use crate::purchase::{self, PurchaseOutcome, UNIT_PRICE};
use crate::redact::{escape_html, mask_identifier};
use crate::session::{self, Balance, SessionClient};
use crate::winning::{fetch_latest_draw, format_winning_message};

/// Balance below which a top-up reminder is sent, in won.
pub const LOW_BALANCE_THRESHOLD: u64 = 10_000;

const KST_OFFSET_SECS: i32 = 9 * 3600;

/// Korea Standard Time, the remote system's time zone.
#[must_use]
pub fn kst() -> FixedOffset {
    FixedOffset::east_opt(KST_OFFSET_SECS).unwrap_or_else(|| Utc.fix())
}

/// Current time in Korea Standard Time.
#[must_use]
pub fn kst_now() -> DateTime<FixedOffset> {
    Utc::now().with_timezone(&kst())
}

/// The tasks the engine can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    /// Report the deposit balance.
    CheckBalance,
    /// Buy the configured number of lines.
    Buy,
    /// Buy only when the balance covers the purchase.
    CheckBalanceAndBuy,
    /// Compare the ledger with the latest draw.
    CheckWinning,
    /// Log in and inspect without buying or notifying.
    DryRun,
}

impl TaskKind {
    /// Command-line and config name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CheckBalance => "check-balance",
            Self::Buy => "buy",
            Self::CheckBalanceAndBuy => "check-and-buy",
            Self::CheckWinning => "check-winning",
            Self::DryRun => "dry-run",
        }
    }

    /// Whether the task may appear in the weekly timetable.
    #[must_use]
    pub const fn is_schedulable(self) -> bool {
        !matches!(self, Self::DryRun)
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unknown task name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown task {0:?}")]
pub struct UnknownTask(pub String);

impl FromStr for TaskKind {
    type Err = UnknownTask;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            Self::CheckBalance,
            Self::Buy,
            Self::CheckBalanceAndBuy,
            Self::CheckWinning,
            Self::DryRun,
        ]
        .into_iter()
        .find(|kind| kind.as_str() == s.trim())
        .ok_or_else(|| UnknownTask(s.to_string()))
    }
}

/// Shared collaborators for one run.
pub struct TaskEnv {
    /// Remote endpoints.
    pub endpoints: Endpoints,
    /// Ledger shared by every account.
    pub ledger: PurchaseLedger,
    /// Notification channel, if configured.
    pub notifier: Option<Box<dyn Notifier>>,
    /// Lines bought per account.
    pub quantity: u8,
}

impl TaskEnv {
    /// Builds the environment for production endpoints. A notifier that
    /// cannot be constructed is logged and left out.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        let notifier = config.telegram.as_ref().and_then(|settings| {
            match TelegramNotifier::new(settings) {
                Ok(notifier) => Some(Box::new(notifier) as Box<dyn Notifier>),
                Err(err) => {
                    warn!(error = %err, "telegram notifier unavailable");
                    None
                },
            }
        });
        Self {
            endpoints: Endpoints::default(),
            ledger: PurchaseLedger::new(config.ledger_path.clone()),
            notifier,
            quantity: config.quantity,
        }
    }

    fn notify(&self, text: &str) {
        notify_safe(self.notifier.as_deref(), text);
    }
}

/// Per-run tally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskSummary {
    /// Accounts whose task completed as intended.
    pub succeeded: usize,
    /// Accounts whose task failed or was skipped.
    pub failed: usize,
}

impl TaskSummary {
    fn record(&mut self, ok: bool) {
        if ok {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
    }
}

/// Runs `kind` for every account.
pub fn run(kind: TaskKind, accounts: &[Account], env: &TaskEnv) -> TaskSummary {
    info!(task = %kind, accounts = accounts.len(), "task started");
    let summary = match kind {
        TaskKind::CheckBalance => check_balance(accounts, env),
        TaskKind::Buy => buy_lotto(accounts, env),
        TaskKind::CheckBalanceAndBuy => check_balance_and_buy(accounts, env),
        TaskKind::CheckWinning => check_winning(accounts, env),
        TaskKind::DryRun => dry_run(accounts, env),
    };
    info!(
        task = %kind,
        succeeded = summary.succeeded,
        failed = summary.failed,
        "task finished"
    );
    summary
}

fn failure_message(user_id: &str, task: TaskKind, err: &LottoError) -> String {
    format!(
        "({}) ❌ <b>{task} failed</b>\n\n{}",
        escape_html(user_id),
        escape_html(&err.to_string())
    )
}

fn open_session(
    account: &Account,
    env: &TaskEnv,
    task: TaskKind,
) -> Result<SessionClient, LottoError> {
    let span = info_span!(
        "account",
        account = %mask_identifier(&account.user_id),
        task = %task
    );
    let client = SessionClient::new(account.credentials(), env.endpoints.clone(), span)?;
    client.login()?;
    Ok(client)
}

fn report_failure(account: &Account, env: &TaskEnv, task: TaskKind, err: &LottoError) {
    error!(
        account = %mask_identifier(&account.user_id),
        task = %task,
        error = %err,
        "account task failed"
    );
    env.notify(&failure_message(&account.user_id, task, err));
}

/// Logs in and reports each account's balance. A balance below
/// [`LOW_BALANCE_THRESHOLD`] or one that cannot be read is notified.
pub fn check_balance(accounts: &[Account], env: &TaskEnv) -> TaskSummary {
    let mut summary = TaskSummary::default();
    for account in accounts {
        let user = escape_html(&account.user_id);
        let result = open_session(account, env, TaskKind::CheckBalance)
            .and_then(|client| client.check_balance());
        match result {
            Ok(Balance::Known(amount)) if amount < LOW_BALANCE_THRESHOLD => {
                warn!(account = %mask_identifier(&account.user_id), balance = amount, "balance is low");
                env.notify(&format!(
                    "({user}) ⚠️ <b>Low balance</b>\n\nCurrent balance: {} won\nPlease top up before the next purchase.",
                    format_won(amount)
                ));
                summary.record(true);
            },
            Ok(Balance::Known(amount)) => {
                info!(account = %mask_identifier(&account.user_id), balance = amount, "balance is sufficient");
                summary.record(true);
            },
            Ok(Balance::Unknown) => {
                env.notify(&format!(
                    "({user}) ⚠️ <b>Balance unavailable</b>\n\nThe deposit balance could not be read."
                ));
                summary.record(false);
            },
            Err(err) => {
                report_failure(account, env, TaskKind::CheckBalance, &err);
                summary.record(false);
            },
        }
    }
    summary
}

/// Runs the purchase steps on a logged-in session, notifies the outcome and
/// records it in the ledger.
fn purchase_with(
    client: &SessionClient,
    account: &Account,
    env: &TaskEnv,
) -> Result<PurchaseOutcome, LottoError> {
    client.visit_game_page()?;
    let window = client.fetch_draw_window()?;
    let admission = client.check_admission()?;
    admission.ensure_admitted()?;
    let request = purchase::build_request(window, &admission, env.quantity)?;
    client.refresh_session();
    let outcome = client.submit(&request)?;

    let _enter = client.span().enter();
    if outcome.is_accepted() {
        info!(lines = outcome.lines().len(), "purchase accepted");
    } else {
        warn!(outcome = ?outcome, "purchase not accepted");
    }
    env.notify(&format_outcome(&account.user_id, &outcome, env.quantity));

    let purchase_date = kst_now().format("%Y-%m-%d").to_string();
    if let Err(err) = env.ledger.save(
        &account.user_id,
        &request.window.round,
        &purchase_date,
        &outcome,
    ) {
        error!(error = %err, "failed to record purchase in ledger");
    }
    Ok(outcome)
}

/// Buys the configured number of automatic lines for every account.
pub fn buy_lotto(accounts: &[Account], env: &TaskEnv) -> TaskSummary {
    let mut summary = TaskSummary::default();
    for account in accounts {
        let result = purchase::validate_quantity(env.quantity)
            .and_then(|()| open_session(account, env, TaskKind::Buy))
            .and_then(|client| purchase_with(&client, account, env));
        match result {
            Ok(outcome) => summary.record(outcome.is_accepted()),
            Err(err) => {
                report_failure(account, env, TaskKind::Buy, &err);
                summary.record(false);
            },
        }
    }
    summary
}

/// Buys only for accounts whose balance covers the purchase. Unknown
/// balances are skipped.
pub fn check_balance_and_buy(accounts: &[Account], env: &TaskEnv) -> TaskSummary {
    let required = u64::from(env.quantity) * UNIT_PRICE;
    let mut summary = TaskSummary::default();
    for account in accounts {
        let user = escape_html(&account.user_id);
        let result = purchase::validate_quantity(env.quantity)
            .and_then(|()| open_session(account, env, TaskKind::CheckBalanceAndBuy))
            .and_then(|client| {
                let balance = client.check_balance()?;
                match balance {
                    Balance::Unknown => {
                        env.notify(&format!(
                            "({user}) ⚠️ <b>Purchase skipped</b>\n\nThe deposit balance could not be read."
                        ));
                        Ok(None)
                    },
                    Balance::Known(amount) if amount < required => {
                        env.notify(&format!(
                            "({user}) ❌ <b>Purchase skipped</b>\n\nBalance {} won is below the required {} won.",
                            format_won(amount),
                            format_won(required)
                        ));
                        Ok(None)
                    },
                    Balance::Known(amount) => {
                        if amount < LOW_BALANCE_THRESHOLD {
                            env.notify(&format!(
                                "({user}) ⚠️ <b>Low balance</b>\n\nCurrent balance: {} won. Buying now; please top up soon.",
                                format_won(amount)
                            ));
                        }
                        purchase_with(&client, account, env).map(Some)
                    },
                }
            });
        match result {
            Ok(Some(outcome)) => summary.record(outcome.is_accepted()),
            Ok(None) => summary.record(false),
            Err(err) => {
                report_failure(account, env, TaskKind::CheckBalanceAndBuy, &err);
                summary.record(false);
            },
        }
    }
    summary
}

/// Fetches the latest draw once and reports each account's result against
/// the ledger. No login is needed.
pub fn check_winning(accounts: &[Account], env: &TaskEnv) -> TaskSummary {
    let draw = session::build_http_client(session::cookies::new_store())
        .and_then(|http| fetch_latest_draw(&http, &env.endpoints));
    let draw = match draw {
        Ok(draw) => draw,
        Err(err) => {
            error!(error = %err, "latest draw unavailable");
            env.notify(&format!(
                "❌ <b>Winning check failed</b>\n\n{}",
                escape_html(&err.to_string())
            ));
            return TaskSummary {
                succeeded: 0,
                failed: accounts.len(),
            };
        },
    };

    let ledger = env.ledger.load().unwrap_or_else(|err| {
        warn!(error = %err, "ledger unreadable, treating as empty");
        None
    });

    let mut summary = TaskSummary::default();
    for account in accounts {
        let message = format_winning_message(&account.user_id, &draw, ledger.as_ref());
        info!(
            account = %mask_identifier(&account.user_id),
            round = %draw.round,
            "winning report prepared"
        );
        env.notify(&message);
        summary.record(true);
    }
    summary
}

/// Logs in, reads the balance and opens the game page without buying or
/// notifying.
pub fn dry_run(accounts: &[Account], env: &TaskEnv) -> TaskSummary {
    let mut summary = TaskSummary::default();
    for account in accounts {
        let masked = mask_identifier(&account.user_id);
        let result = open_session(account, env, TaskKind::DryRun).and_then(|client| {
            let balance = client.check_balance()?;
            client.visit_game_page()?;
            Ok(balance)
        });
        match result {
            Ok(balance) => {
                info!(
                    account = %masked,
                    balance = ?balance.amount(),
                    "dry run complete, no purchase made"
                );
                summary.record(true);
            },
            Err(err) => {
                error!(account = %masked, error = %err, "dry run failed");
                summary.record(false);
            },
        }
    }
    summary
}
