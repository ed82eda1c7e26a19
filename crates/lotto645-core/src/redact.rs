//! Masking and bounded excerpts for log output.
//!
//! Account identifiers are masked before they reach a log line, and remote
//! response bodies are only ever logged as bounded excerpts so that a large
//! HTML page cannot flood the log file.

/// Byte budget for protocol diagnostics attached to errors.
pub const DIAGNOSTIC_SNIPPET_BYTES: usize = 500;

/// Byte budget for the balance-page forensic dump.
pub const BALANCE_SNIPPET_BYTES: usize = 300;

/// Number of leading identifier characters left visible by [`mask_identifier`].
const VISIBLE_PREFIX_CHARS: usize = 2;

/// Masks an account identifier, keeping only its first two characters.
///
/// ```
/// use lotto645_core::redact::mask_identifier;
///
/// assert_eq!(mask_identifier("lucky777"), "lu******");
/// assert_eq!(mask_identifier("ab"), "**");
/// ```
#[must_use]
pub fn mask_identifier(identifier: &str) -> String {
    let total = identifier.chars().count();
    if total <= VISIBLE_PREFIX_CHARS {
        return "*".repeat(total);
    }
    let visible: String = identifier.chars().take(VISIBLE_PREFIX_CHARS).collect();
    format!("{visible}{}", "*".repeat(total - VISIBLE_PREFIX_CHARS))
}

/// Returns at most `max_bytes` of `body`, cut on a character boundary and
/// suffixed with `...` when anything was dropped.
#[must_use]
pub fn snippet(body: &str, max_bytes: usize) -> String {
    if body.len() <= max_bytes {
        return body.to_string();
    }
    let mut end = max_bytes;
    while end > 0 && !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}

/// Escapes text embedded into an HTML-formatted notification.
#[must_use]
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
    out
}
