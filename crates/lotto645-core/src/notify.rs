//! Outbound notifications.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::TelegramSettings;
use crate::redact;

const DEFAULT_TELEGRAM_API_BASE_URL: &str = "https://api.telegram.org";

/// Delivery errors.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// The notifier could not be constructed.
    #[error("notifier setup failed: {0}")]
    Setup(String),

    /// The request did not complete.
    #[error("notification transport failed: {0}")]
    Transport(String),

    /// The channel answered with a non-success status.
    #[error("notification rejected with status {status}: {body}")]
    Rejected {
        /// HTTP status.
        status: u16,
        /// Bounded response excerpt.
        body: String,
    },
}

/// A channel that delivers pre-formatted text.
pub trait Notifier: Send + Sync {
    /// Sends one message.
    ///
    /// # Errors
    ///
    /// Returns an error when the message was not delivered.
    fn send(&self, text: &str) -> Result<(), NotifyError>;

    /// Channel name for logging.
    fn name(&self) -> &'static str;
}

/// Sends `text` when a notifier is configured. Failure is logged and
/// otherwise ignored.
pub fn notify_safe(notifier: Option<&dyn Notifier>, text: &str) {
    let Some(notifier) = notifier else {
        debug!("no notifier configured, message dropped");
        return;
    };
    if let Err(err) = notifier.send(text) {
        warn!(channel = notifier.name(), error = %err, "notification delivery failed");
    }
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'static str,
}

/// Telegram Bot API notifier.
pub struct TelegramNotifier {
    bot_token: SecretString,
    chat_id: String,
    api_base_url: String,
    http_client: reqwest::blocking::Client,
}

impl TelegramNotifier {
    /// Creates a notifier against the public Bot API.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be initialized.
    pub fn new(settings: &TelegramSettings) -> Result<Self, NotifyError> {
        Self::new_with_api_base_url(settings, DEFAULT_TELEGRAM_API_BASE_URL)
    }

    /// Creates a notifier with an explicit API base URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be initialized.
    pub fn new_with_api_base_url(
        settings: &TelegramSettings,
        api_base_url: impl Into<String>,
    ) -> Result<Self, NotifyError> {
        let http_client = reqwest::blocking::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|error| NotifyError::Setup(error.to_string()))?;
        Ok(Self {
            bot_token: SecretString::from(settings.bot_token.expose_secret().to_owned()),
            chat_id: settings.chat_id.clone(),
            api_base_url: api_base_url.into().trim_end_matches('/').to_owned(),
            http_client,
        })
    }
}

impl Notifier for TelegramNotifier {
    fn send(&self, text: &str) -> Result<(), NotifyError> {
        let url = format!(
            "{}/bot{}/sendMessage",
            self.api_base_url,
            self.bot_token.expose_secret()
        );
        let response = self
            .http_client
            .post(url)
            .json(&SendMessage {
                chat_id: &self.chat_id,
                text,
                parse_mode: "HTML",
            })
            .send()
            // The request URL embeds the token; keep it out of the message.
            .map_err(|error| NotifyError::Transport(error.without_url().to_string()))?;

        let status = response.status();
        if status.is_success() {
            debug!("notification delivered");
            return Ok(());
        }
        let body = response.text().unwrap_or_default();
        Err(NotifyError::Rejected {
            status: status.as_u16(),
            body: redact::snippet(&body, redact::DIAGNOSTIC_SNIPPET_BYTES),
        })
    }

    fn name(&self) -> &'static str {
        "telegram"
    }
}
