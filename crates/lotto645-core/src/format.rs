//! Notification text for purchase outcomes.
//!
//! Output is HTML-formatted for the notification channel. Anything taken from
//! the remote system or the configuration is escaped before embedding.

use std::fmt::Write as _;

use crate::purchase::{PurchaseOutcome, UNIT_PRICE};
use crate::redact::escape_html;

/// Rejection causes recognized by substring match on the remote message.
/// Order matters: the first matching entry supplies the hint.
const REJECTION_HINTS: &[(&[&str], &str)] = &[
    (
        &["한도", "5000"],
        "The per-round limit (5,000 won) has already been reached.",
    ),
    (
        &["예치금", "잔액"],
        "The deposit balance is too low. Top up and try again.",
    ),
    (&["시간"], "Sales are closed at this time of day."),
];

/// Renders an amount with thousands separators.
///
/// ```
/// use lotto645_core::format::format_won;
///
/// assert_eq!(format_won(1_234_567), "1,234,567");
/// assert_eq!(format_won(500), "500");
/// ```
#[must_use]
pub fn format_won(amount: u64) -> String {
    let digits = amount.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Returns the hint for a rejection message, if any cause is recognized.
#[must_use]
pub fn rejection_hint(message: &str) -> Option<&'static str> {
    REJECTION_HINTS
        .iter()
        .find(|(needles, _)| needles.iter().any(|needle| message.contains(needle)))
        .map(|(_, hint)| *hint)
}

fn failure_header(user: &str, title: &str) -> String {
    format!("({user}) ❌ <b>{title}</b>\n\n")
}

/// Formats a purchase outcome for the notification channel.
#[must_use]
pub fn format_outcome(user_id: &str, outcome: &PurchaseOutcome, quantity: u8) -> String {
    let user = escape_html(user_id);
    match outcome {
        PurchaseOutcome::SessionExpired => {
            failure_header(&user, "Session expired") + "Login is required again."
        },
        PurchaseOutcome::DeviceNotAllowed => {
            failure_header(&user, "Purchase failed") + "Purchases from this device are not allowed."
        },
        PurchaseOutcome::OutsideSaleWindow => {
            failure_header(&user, "Purchase failed") + "Tickets are not on sale right now."
        },
        PurchaseOutcome::Rejected { code, message } => {
            let mut msg = failure_header(&user, "Purchase failed");
            let reason = if message.is_empty() {
                format!("code {}", escape_html(code))
            } else {
                escape_html(message)
            };
            let _ = writeln!(msg, "Reason: {reason}");
            if let Some(hint) = rejection_hint(message) {
                let _ = write!(msg, "\n💡 {hint}");
            }
            msg
        },
        PurchaseOutcome::Accepted {
            lines, draw_date, ..
        } => {
            let mut msg = format!("({user}) ✅ <b>Purchase complete</b>\n\n");
            let _ = writeln!(
                msg,
                "💰 Amount: <b>{} won</b>",
                format_won(u64::from(quantity) * UNIT_PRICE)
            );
            let _ = writeln!(msg, "🎱 Games: <b>{quantity}</b>\n");
            for line in lines {
                let numbers = line
                    .numbers
                    .iter()
                    .map(|n| format!("{n:02}"))
                    .collect::<Vec<_>>()
                    .join(" - ");
                let _ = writeln!(
                    msg,
                    "[{} ({})] {numbers}",
                    escape_html(&line.slot),
                    line.gen_mode.label()
                );
            }
            if !draw_date.is_empty() {
                let _ = writeln!(msg, "\n📅 Draw date: {}", escape_html(draw_date));
            }
            msg.push_str("\nGood luck!");
            msg
        },
    }
}
