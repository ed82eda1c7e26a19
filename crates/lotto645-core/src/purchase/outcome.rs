//! Classification of purchase responses.
//!
//! The execution endpoint answers with a loosely typed JSON map, or with an
//! HTML login page when the session has silently expired. Everything that
//! interprets that body lives here.

use std::collections::BTreeSet;

use serde_json::Value;
use tracing::warn;

use crate::error::LottoError;

/// Sentinel the remote system uses for "no" flags.
const NEGATIVE_FLAG: &str = "N";

/// Result code of an accepted purchase.
pub const SUCCESS_CODE: &str = "100";

/// Separator between numbers in a purchased line.
const LINE_DELIMITER: char = '|';

/// Slot labels in submission order.
pub const SLOTS: [char; 5] = ['A', 'B', 'C', 'D', 'E'];

/// How the numbers of a line were chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenMode {
    /// Numbers picked by the remote system.
    Auto,
    /// Numbers picked by the buyer.
    Manual,
    /// Some numbers picked by the buyer, the rest by the remote system.
    SemiAuto,
}

impl GenMode {
    /// Maps the trailing mode digit of a line.
    #[must_use]
    pub const fn from_digit(digit: char) -> Option<Self> {
        match digit {
            '1' => Some(Self::Manual),
            '2' => Some(Self::SemiAuto),
            '3' => Some(Self::Auto),
            _ => None,
        }
    }

    /// Short human-readable label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Manual => "manual",
            Self::SemiAuto => "semi-auto",
        }
    }
}

/// One purchased line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchasedLine {
    /// Slot label, `A` to `E`.
    pub slot: String,
    /// The six numbers, in the order the remote system returned them.
    pub numbers: [u8; 6],
    /// How the numbers were chosen.
    pub gen_mode: GenMode,
}

/// Classified purchase response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PurchaseOutcome {
    /// The session is no longer authenticated.
    SessionExpired,
    /// The remote system refuses purchases from this client type.
    DeviceNotAllowed,
    /// Sales are closed right now.
    OutsideSaleWindow,
    /// The purchase was refused by a business rule.
    Rejected {
        /// Result code as sent by the remote system.
        code: String,
        /// Rejection message, empty when absent.
        message: String,
    },
    /// The purchase went through.
    Accepted {
        /// Purchased lines that could be parsed.
        lines: Vec<PurchasedLine>,
        /// Draw date of the round.
        draw_date: String,
        /// Prize claim deadline.
        pay_deadline: String,
        /// Ticket barcodes.
        barcodes: Vec<String>,
    },
}

impl PurchaseOutcome {
    /// Whether the purchase went through.
    #[must_use]
    pub const fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }

    /// Purchased lines; empty unless accepted.
    #[must_use]
    pub fn lines(&self) -> &[PurchasedLine] {
        match self {
            Self::Accepted { lines, .. } => lines,
            _ => &[],
        }
    }
}

/// Whether a body that failed to parse as JSON is the login page the remote
/// system serves to expired sessions.
fn looks_like_html(body: &str) -> bool {
    let head = body.trim_start();
    let lowered = head.get(..head.len().min(1024)).unwrap_or(head).to_ascii_lowercase();
    lowered.contains("<html") || lowered.contains("<!doctype")
}

/// Classifies a raw purchase response body.
///
/// A body that is not JSON but looks like an HTML document is
/// [`PurchaseOutcome::SessionExpired`]: the remote system redirects expired
/// sessions to its login page instead of answering with JSON.
///
/// # Errors
///
/// Returns [`LottoError::Parse`] for a body that is neither JSON nor HTML.
pub fn classify_body(body: &str) -> Result<PurchaseOutcome, LottoError> {
    match serde_json::from_str::<Value>(body) {
        Ok(value) => Ok(classify_json(&value)),
        Err(_) if looks_like_html(body) => Ok(PurchaseOutcome::SessionExpired),
        Err(err) => Err(LottoError::parse("purchase response", err, body)),
    }
}

/// Reads a field that may be a JSON string or number as text.
fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn text_field(value: &Value, key: &str) -> String {
    value.get(key).and_then(as_text).unwrap_or_default()
}

/// Classifies a parsed purchase response. The checks run in a fixed order
/// and the first match wins.
#[must_use]
pub fn classify_json(body: &Value) -> PurchaseOutcome {
    let flag_is_negative =
        |key: &str| body.get(key).and_then(Value::as_str) == Some(NEGATIVE_FLAG);

    if flag_is_negative("loginYn") {
        return PurchaseOutcome::SessionExpired;
    }
    if flag_is_negative("isAllowed") {
        return PurchaseOutcome::DeviceNotAllowed;
    }
    if body.get("checkOltSaleTime").and_then(Value::as_bool) == Some(false) {
        return PurchaseOutcome::OutsideSaleWindow;
    }

    let null = Value::Null;
    let result = body.get("result").unwrap_or(&null);
    let code = text_field(result, "resultCode");
    if code != SUCCESS_CODE {
        return PurchaseOutcome::Rejected {
            code,
            message: text_field(result, "resultMsg"),
        };
    }

    let lines = result
        .get("arrGameChoiceNum")
        .and_then(Value::as_array)
        .map(|raw| {
            raw.iter()
                .enumerate()
                .filter_map(|(position, item)| {
                    let text = item.as_str()?;
                    let parsed = parse_line(text, position);
                    if parsed.is_none() {
                        warn!(line = text, position, "skipping unparseable purchased line");
                    }
                    parsed
                })
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    let barcodes = result
        .get("barCode")
        .and_then(Value::as_array)
        .map(|codes| codes.iter().filter_map(as_text).collect::<Vec<_>>())
        .unwrap_or_default();

    PurchaseOutcome::Accepted {
        lines,
        draw_date: text_field(result, "drawDate"),
        pay_deadline: text_field(result, "payLimitDate"),
        barcodes,
    }
}

/// Parses one purchased line such as `"A|20|21|27|29|30|383"` or
/// `"3|7|12|20|33|41|3"`.
///
/// The last character is the mode digit. The rest splits on `|` into an
/// optional leading slot letter followed by exactly six distinct numbers in
/// `1..=45`. Without a slot letter, the slot comes from `position`.
#[must_use]
pub fn parse_line(raw: &str, position: usize) -> Option<PurchasedLine> {
    let raw = raw.trim();
    let mode_digit = raw.chars().last()?;
    let gen_mode = GenMode::from_digit(mode_digit)?;
    let rest = &raw[..raw.len() - mode_digit.len_utf8()];

    let mut segments = rest
        .split(LINE_DELIMITER)
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .peekable();

    let slot = match segments.peek() {
        Some(first) if first.len() == 1 && first.chars().all(|c| SLOTS.contains(&c)) => {
            let slot = (*first).to_string();
            segments.next();
            slot
        },
        _ => SLOTS.get(position)?.to_string(),
    };

    let numbers: Vec<u8> = segments
        .map(|segment| segment.parse::<u8>().ok().filter(|n| (1..=45).contains(n)))
        .collect::<Option<_>>()?;
    let numbers: [u8; 6] = numbers.try_into().ok()?;
    if numbers.iter().collect::<BTreeSet<_>>().len() != numbers.len() {
        return None;
    }

    Some(PurchasedLine {
        slot,
        numbers,
        gen_mode,
    })
}
