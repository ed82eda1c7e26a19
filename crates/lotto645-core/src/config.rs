//! Account and notification configuration.
//!
//! Sources are tried in order: environment variables (single account), a
//! config file (JSON, or TOML when the extension is `.toml`), then an
//! interactive prompt on stdin.

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use chrono::{NaiveTime, Weekday};
use secrecy::SecretString;
use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::ledger::DEFAULT_LEDGER_PATH;
use crate::purchase::MAX_QUANTITY;
use crate::redact::mask_identifier;
use crate::session::Credentials;
use crate::tasks::TaskKind;

/// Default config file path.
pub const DEFAULT_CONFIG_PATH: &str = "config.json";

/// Default number of lines bought per account.
pub const DEFAULT_QUANTITY: u8 = 5;

const ENV_USER_ID: &str = "DH_LOTTERY_ID";
const ENV_PASSWORD: &str = "DH_LOTTERY_PW";
const ENV_BOT_TOKEN: &str = "TELEGRAM_BOT_TOKEN";
const ENV_CHAT_ID: &str = "TELEGRAM_CHAT_ID";

/// Configuration errors. Only these are fatal to the process.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variables are not set.
    #[error("environment variables DH_LOTTERY_ID and DH_LOTTERY_PW are not set")]
    MissingEnvironment,

    /// The config file could not be read.
    #[error("cannot read config file {path}: {source}")]
    Read {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// The config file is not valid JSON or TOML.
    #[error("cannot parse config file {path}: {message}")]
    Parse {
        /// File involved.
        path: PathBuf,
        /// Parser message.
        message: String,
    },

    /// No account is configured.
    #[error("no accounts configured")]
    NoAccounts,

    /// An account lacks an identifier or password.
    #[error("account {0}: user id and password are required")]
    IncompleteAccount(usize),

    /// Quantity is outside `1..=5`.
    #[error("quantity {0} is outside the allowed range 1..=5")]
    InvalidQuantity(u8),

    /// A schedule entry could not be interpreted.
    #[error("schedule entry {index}: {reason}")]
    InvalidSchedule {
        /// Position of the entry, starting at 1.
        index: usize,
        /// What is wrong with it.
        reason: String,
    },

    /// Reading the interactive prompt failed.
    #[error("interactive input failed: {0}")]
    Prompt(#[source] io::Error),
}

/// One account.
pub struct Account {
    /// Account identifier.
    pub user_id: String,
    /// Account password.
    pub password: SecretString,
}

impl Account {
    /// Credentials for a new session.
    #[must_use]
    pub fn credentials(&self) -> Credentials {
        use secrecy::ExposeSecret;
        Credentials {
            identifier: self.user_id.clone(),
            secret: SecretString::from(self.password.expose_secret().to_owned()),
        }
    }
}

impl std::fmt::Debug for Account {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Account")
            .field("user_id", &mask_identifier(&self.user_id))
            .finish_non_exhaustive()
    }
}

/// Telegram delivery settings.
pub struct TelegramSettings {
    /// Bot API token.
    pub bot_token: SecretString,
    /// Destination chat.
    pub chat_id: String,
}

impl std::fmt::Debug for TelegramSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramSettings")
            .field("chat_id", &self.chat_id)
            .finish_non_exhaustive()
    }
}

/// One weekly firing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleEntry {
    /// Task to run.
    pub task: TaskKind,
    /// Day of the week, Korea Standard Time.
    pub weekday: Weekday,
    /// Time of day, Korea Standard Time.
    pub time: NaiveTime,
}

impl ScheduleEntry {
    /// Monday 13:00 balance check, Monday 19:00 purchase, Saturday 21:00
    /// winning check.
    #[must_use]
    pub fn defaults() -> Vec<Self> {
        let at = |hour| NaiveTime::from_hms_opt(hour, 0, 0).unwrap_or(NaiveTime::MIN);
        vec![
            Self {
                task: TaskKind::CheckBalance,
                weekday: Weekday::Mon,
                time: at(13),
            },
            Self {
                task: TaskKind::Buy,
                weekday: Weekday::Mon,
                time: at(19),
            },
            Self {
                task: TaskKind::CheckWinning,
                weekday: Weekday::Sat,
                time: at(21),
            },
        ]
    }
}

/// Fully validated configuration.
#[derive(Debug)]
pub struct Config {
    /// Accounts, processed in order.
    pub accounts: Vec<Account>,
    /// Notification settings, when both token and chat are present.
    pub telegram: Option<TelegramSettings>,
    /// Lines bought per account and round.
    pub quantity: u8,
    /// Ledger file path.
    pub ledger_path: PathBuf,
    /// Weekly timetable of the service mode.
    pub schedule: Vec<ScheduleEntry>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAccount {
    #[serde(default)]
    user_id: String,
    #[serde(default)]
    password: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSchedule {
    task: String,
    weekday: String,
    time: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawConfig {
    #[serde(default)]
    accounts: Vec<RawAccount>,
    #[serde(default)]
    telegram_bot_token: Option<String>,
    #[serde(default)]
    telegram_chat_id: Option<String>,
    #[serde(default)]
    quantity: Option<u8>,
    #[serde(default)]
    ledger_path: Option<PathBuf>,
    #[serde(default)]
    schedule: Vec<RawSchedule>,
}

fn telegram_settings(token: Option<String>, chat_id: Option<String>) -> Option<TelegramSettings> {
    match (token, chat_id) {
        (Some(token), Some(chat_id)) if !token.trim().is_empty() && !chat_id.trim().is_empty() => {
            Some(TelegramSettings {
                bot_token: SecretString::from(token.trim().to_owned()),
                chat_id: chat_id.trim().to_owned(),
            })
        },
        _ => None,
    }
}

fn parse_schedule(index: usize, raw: &RawSchedule) -> Result<ScheduleEntry, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidSchedule { index, reason };
    let task = raw
        .task
        .parse::<TaskKind>()
        .map_err(|e| invalid(e.to_string()))?;
    let weekday = raw
        .weekday
        .trim()
        .parse::<Weekday>()
        .map_err(|_| invalid(format!("unknown weekday {:?}", raw.weekday)))?;
    let time = NaiveTime::parse_from_str(raw.time.trim(), "%H:%M")
        .map_err(|_| invalid(format!("time {:?} is not HH:MM", raw.time)))?;
    if !task.is_schedulable() {
        return Err(invalid(format!("task {task} cannot be scheduled")));
    }
    Ok(ScheduleEntry {
        task,
        weekday,
        time,
    })
}

impl Config {
    fn single_account(user_id: String, password: String) -> Self {
        Self {
            accounts: vec![Account {
                user_id,
                password: SecretString::from(password),
            }],
            telegram: None,
            quantity: DEFAULT_QUANTITY,
            ledger_path: PathBuf::from(DEFAULT_LEDGER_PATH),
            schedule: ScheduleEntry::defaults(),
        }
    }

    /// Loads configuration from the first source that yields one.
    ///
    /// # Errors
    ///
    /// Returns the interactive prompt's error when every source fails.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match Self::from_env() {
            Ok(config) => return Ok(config),
            Err(err) => warn!(error = %err, "environment configuration unavailable"),
        }
        match Self::from_file(path) {
            Ok(config) => return Ok(config),
            Err(err) => warn!(error = %err, "config file unavailable"),
        }
        info!("falling back to interactive configuration");
        let stdin = io::stdin();
        Self::interactive(&mut stdin.lock(), &mut io::stderr())
    }

    /// Reads a single account from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingEnvironment`] when the identifier or
    /// password variable is unset or empty.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_with(|key| std::env::var(key).ok())
    }

    /// Reads a single account through `lookup`.
    ///
    /// # Errors
    ///
    /// See [`Config::from_env`].
    pub fn from_env_with(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let present = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let (Some(user_id), Some(password)) = (present(ENV_USER_ID), present(ENV_PASSWORD)) else {
            return Err(ConfigError::MissingEnvironment);
        };
        let mut config = Self::single_account(user_id.trim().to_owned(), password);
        config.telegram = telegram_settings(present(ENV_BOT_TOKEN), present(ENV_CHAT_ID));
        Ok(config)
    }

    /// Loads a config file. Files ending in `.toml` are parsed as TOML,
    /// everything else as JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let is_toml = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
        let raw: RawConfig = if is_toml {
            toml::from_str(&content).map_err(|e| ConfigError::Parse {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?
        } else {
            serde_json::from_str(&content).map_err(|e| ConfigError::Parse {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?
        };
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawConfig) -> Result<Self, ConfigError> {
        if raw.accounts.is_empty() {
            return Err(ConfigError::NoAccounts);
        }
        let accounts = raw
            .accounts
            .into_iter()
            .enumerate()
            .map(|(i, account)| {
                if account.user_id.trim().is_empty() || account.password.is_empty() {
                    Err(ConfigError::IncompleteAccount(i + 1))
                } else {
                    Ok(Account {
                        user_id: account.user_id.trim().to_owned(),
                        password: SecretString::from(account.password),
                    })
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        let quantity = raw.quantity.unwrap_or(DEFAULT_QUANTITY);
        if quantity == 0 || quantity > MAX_QUANTITY {
            return Err(ConfigError::InvalidQuantity(quantity));
        }

        let schedule = if raw.schedule.is_empty() {
            ScheduleEntry::defaults()
        } else {
            raw.schedule
                .iter()
                .enumerate()
                .map(|(i, entry)| parse_schedule(i + 1, entry))
                .collect::<Result<Vec<_>, _>>()?
        };

        Ok(Self {
            accounts,
            telegram: telegram_settings(raw.telegram_bot_token, raw.telegram_chat_id),
            quantity,
            ledger_path: raw
                .ledger_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_LEDGER_PATH)),
            schedule,
        })
    }

    /// Prompts for a single account on `input`, writing prompts to `output`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Prompt`] on I/O failure and
    /// [`ConfigError::IncompleteAccount`] when either answer is empty.
    pub fn interactive(
        input: &mut impl BufRead,
        output: &mut impl Write,
    ) -> Result<Self, ConfigError> {
        let mut ask = |prompt: &str| -> Result<String, ConfigError> {
            write!(output, "{prompt}: ").map_err(ConfigError::Prompt)?;
            output.flush().map_err(ConfigError::Prompt)?;
            let mut line = String::new();
            input.read_line(&mut line).map_err(ConfigError::Prompt)?;
            Ok(line.trim().to_owned())
        };
        let user_id = ask("Lottery user id")?;
        let password = ask("Password")?;
        if user_id.is_empty() || password.is_empty() {
            return Err(ConfigError::IncompleteAccount(1));
        }
        Ok(Self::single_account(user_id, password))
    }

    /// Logs a masked summary.
    pub fn describe(&self) {
        let masked: Vec<String> = self
            .accounts
            .iter()
            .map(|account| mask_identifier(&account.user_id))
            .collect();
        info!(
            accounts = self.accounts.len(),
            ids = ?masked,
            quantity = self.quantity,
            ledger = %self.ledger_path.display(),
            notifications = self.telegram.is_some(),
            "configuration loaded"
        );
    }
}
