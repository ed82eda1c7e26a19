//! Named field extraction from remote HTML pages.
//!
//! Markup on the remote site changes between page versions. Each field is
//! described by an ordered list of [`FieldSource`] strategies that are tried
//! until one yields a usable value, so markup churn only touches the tables
//! at the bottom of this module.

use std::sync::LazyLock;

use regex::Regex;

/// One way of locating a field in a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldSource {
    /// Text content of the element with this `id`.
    ElementText(&'static str),
    /// `value` attribute of the `<input>` with this `id`.
    InputValue(&'static str),
    /// Text content of the first element carrying this CSS class.
    ClassText(&'static str),
}

impl FieldSource {
    /// Returns the trimmed, non-empty value this strategy finds in `html`.
    #[must_use]
    pub fn find(self, html: &str) -> Option<String> {
        let raw = match self {
            Self::ElementText(id) => element_text(html, |tag| tag.has_id(id)),
            Self::InputValue(id) => input_value(html, id),
            Self::ClassText(class) => element_text(html, |tag| tag.has_class(class)),
        }?;
        let value = decode_entities(raw.trim());
        (!value.is_empty()).then_some(value)
    }
}

/// An ordered strategy list for one named field.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    /// Field name used in logs and errors.
    pub name: &'static str,
    /// Strategies in priority order.
    pub sources: &'static [FieldSource],
}

impl FieldSpec {
    /// Returns the first non-empty value produced by the strategies.
    #[must_use]
    pub fn extract(&self, html: &str) -> Option<String> {
        self.sources.iter().find_map(|source| source.find(html))
    }

    /// Returns the first value that parses as a non-zero amount of money.
    #[must_use]
    pub fn extract_amount(&self, html: &str) -> Option<u64> {
        self.sources
            .iter()
            .filter_map(|source| source.find(html))
            .filter_map(|text| parse_amount(&text))
            .find(|amount| *amount > 0)
    }
}

/// Current draw round on the purchase page.
pub const ROUND: FieldSpec = FieldSpec {
    name: "curRound",
    sources: &[
        FieldSource::ElementText("curRound"),
        FieldSource::InputValue("curRound"),
    ],
};

/// Draw date of the current round.
pub const DRAW_DATE: FieldSpec = FieldSpec {
    name: "ROUND_DRAW_DATE",
    sources: &[
        FieldSource::InputValue("ROUND_DRAW_DATE"),
        FieldSource::ElementText("ROUND_DRAW_DATE"),
    ],
};

/// Sale end / payment deadline timestamp.
pub const SALE_END: FieldSpec = FieldSpec {
    name: "WAMT_PAY_TLMT_END_DT",
    sources: &[
        FieldSource::InputValue("WAMT_PAY_TLMT_END_DT"),
        FieldSource::ElementText("WAMT_PAY_TLMT_END_DT"),
    ],
};

/// Deposit balance on the purchase page.
pub const PURCHASE_PAGE_BALANCE: FieldSpec = FieldSpec {
    name: "moneyBalance",
    sources: &[
        FieldSource::ElementText("moneyBalance"),
        FieldSource::InputValue("moneyBalance"),
    ],
};

/// Deposit balance on the account page.
pub const ACCOUNT_PAGE_BALANCE: FieldSpec = FieldSpec {
    name: "totalAmt",
    sources: &[
        FieldSource::ElementText("totalAmt"),
        FieldSource::ClassText("deposit-num"),
    ],
};

/// Parses a displayed amount such as `"12,000원"` or `"5,000 won"`.
#[must_use]
pub fn parse_amount(text: &str) -> Option<u64> {
    let cleaned: String = text
        .trim()
        .trim_end_matches('원')
        .trim_end_matches("won")
        .chars()
        .filter(|c| *c != ',' && !c.is_whitespace())
        .collect();
    cleaned.parse().ok()
}

static TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<([a-z][a-z0-9]*)(\s[^>]*)?>").expect("tag pattern is valid")
});

// Names must start after whitespace so `data-id` never passes for `id`.
static ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)(?:^|\s)([a-z_:][-a-z0-9_:.]*)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#)
        .expect("attribute pattern is valid")
});

/// An opening tag with its raw attribute text and the byte offset just past
/// its closing `>`.
struct OpenTag<'a> {
    name: &'a str,
    attributes: &'a str,
    end: usize,
}

impl<'a> OpenTag<'a> {
    fn attribute(&self, name: &str) -> Option<&'a str> {
        ATTRIBUTE
            .captures_iter(self.attributes)
            .find(|caps| {
                caps.get(1)
                    .is_some_and(|m| m.as_str().eq_ignore_ascii_case(name))
            })
            .and_then(|caps| caps.get(2).or_else(|| caps.get(3)).or_else(|| caps.get(4)))
            .map(|m| m.as_str())
    }

    fn has_id(&self, id: &str) -> bool {
        self.attribute("id") == Some(id)
    }

    fn has_class(&self, class: &str) -> bool {
        self.attribute("class")
            .is_some_and(|classes| classes.split_whitespace().any(|c| c == class))
    }
}

fn open_tags(html: &str) -> impl Iterator<Item = OpenTag<'_>> {
    TAG.captures_iter(html).filter_map(|caps| {
        Some(OpenTag {
            name: caps.get(1)?.as_str(),
            attributes: caps.get(2).map_or("", |m| m.as_str()),
            end: caps.get(0)?.end(),
        })
    })
}

/// Text directly inside the first element accepted by `matches`.
fn element_text(html: &str, matches: impl Fn(&OpenTag<'_>) -> bool) -> Option<String> {
    let tag = open_tags(html).find(|tag| matches(tag))?;
    let rest = &html[tag.end..];
    let text = rest.find('<').map_or(rest, |close| &rest[..close]);
    Some(text.to_string())
}

/// `value` attribute of the first `<input>` tag carrying `id`.
fn input_value(html: &str, id: &str) -> Option<String> {
    open_tags(html)
        .find(|tag| tag.name.eq_ignore_ascii_case("input") && tag.has_id(id))?
        .attribute("value")
        .map(str::to_string)
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&amp;", "&")
        .trim()
        .to_string()
}
