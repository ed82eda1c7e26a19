//! Draw result retrieval and prize ranking.

use std::collections::BTreeSet;
use std::fmt::Write as _;

use reqwest::blocking::Client;
use reqwest::header::ACCEPT;
use serde::Deserialize;
use tracing::info;

use crate::endpoints::Endpoints;
use crate::error::LottoError;
use crate::ledger::LedgerEntry;
use crate::redact::escape_html;

/// A published draw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrawResult {
    /// Draw round.
    pub round: String,
    /// Draw date, `YYYY-MM-DD` when the source date was `YYYYMMDD`.
    pub draw_date: String,
    /// The six winning numbers.
    pub numbers: [u8; 6],
    /// Bonus number.
    pub bonus: u8,
}

/// Prize evaluation of one line against a draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RankOutcome {
    /// Prize rank `1..=5`, or `0` for no prize.
    pub rank: u8,
    /// Number of winning numbers on the line.
    pub match_count: u8,
    /// Whether the bonus number is on the line.
    pub bonus_matched: bool,
}

impl RankOutcome {
    /// Whether the line won any prize.
    #[must_use]
    pub const fn is_winner(self) -> bool {
        self.rank > 0
    }
}

/// Ranks one purchased line against a draw. Both sides are compared as
/// sets, so a repeated number counts once.
#[must_use]
pub fn check_winning(purchased: &[u8; 6], draw: &DrawResult) -> RankOutcome {
    let purchased_set: BTreeSet<u8> = purchased.iter().copied().collect();
    let winning: BTreeSet<u8> = draw.numbers.iter().copied().collect();
    let match_count = purchased_set.intersection(&winning).count();
    let bonus_matched = purchased.contains(&draw.bonus);
    let rank = match (match_count, bonus_matched) {
        (6, _) => 1,
        (5, true) => 2,
        (5, false) => 3,
        (4, _) => 4,
        (3, _) => 5,
        _ => 0,
    };
    RankOutcome {
        rank,
        match_count: u8::try_from(match_count).unwrap_or(u8::MAX),
        bonus_matched,
    }
}

#[derive(Deserialize)]
struct DrawEnvelope {
    data: DrawList,
}

#[derive(Deserialize)]
struct DrawList {
    #[serde(default)]
    list: Vec<DrawRecord>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DrawRecord {
    lt_epsd: u32,
    lt_rfl_ymd: String,
    tm1_wn_no: u8,
    tm2_wn_no: u8,
    tm3_wn_no: u8,
    tm4_wn_no: u8,
    tm5_wn_no: u8,
    tm6_wn_no: u8,
    bns_wn_no: u8,
}

impl From<DrawRecord> for DrawResult {
    fn from(record: DrawRecord) -> Self {
        Self {
            round: record.lt_epsd.to_string(),
            draw_date: hyphenate_date(&record.lt_rfl_ymd),
            numbers: [
                record.tm1_wn_no,
                record.tm2_wn_no,
                record.tm3_wn_no,
                record.tm4_wn_no,
                record.tm5_wn_no,
                record.tm6_wn_no,
            ],
            bonus: record.bns_wn_no,
        }
    }
}

/// Renders `YYYYMMDD` as `YYYY-MM-DD`; anything else is returned unchanged.
fn hyphenate_date(raw: &str) -> String {
    if raw.len() == 8 && raw.bytes().all(|b| b.is_ascii_digit()) {
        format!("{}-{}-{}", &raw[..4], &raw[4..6], &raw[6..])
    } else {
        raw.to_string()
    }
}

/// Parses a draw-result body.
///
/// # Errors
///
/// Returns a parse error for a malformed body, or a protocol error when the
/// list is empty.
pub fn parse_latest_draw(body: &str) -> Result<DrawResult, LottoError> {
    let envelope: DrawEnvelope =
        serde_json::from_str(body).map_err(|e| LottoError::parse("draw result", e, body))?;
    let record = envelope
        .data
        .list
        .into_iter()
        .next()
        .ok_or_else(|| LottoError::Protocol("draw result list is empty".to_string()))?;
    Ok(record.into())
}

/// Fetches the most recent published draw. No login is needed.
///
/// # Errors
///
/// Returns a transport, parse or protocol error.
pub fn fetch_latest_draw(http: &Client, endpoints: &Endpoints) -> Result<DrawResult, LottoError> {
    let body = http
        .get(&endpoints.draw_result)
        .header(ACCEPT, "application/json")
        .send()
        .and_then(reqwest::blocking::Response::text)
        .map_err(|e| LottoError::transport("draw result", &e))?;
    let draw = parse_latest_draw(&body)?;
    info!(
        round = %draw.round,
        draw_date = %draw.draw_date,
        numbers = ?draw.numbers,
        bonus = draw.bonus,
        "latest draw fetched"
    );
    Ok(draw)
}

fn cannot_verify(user: &str, reason: &str) -> String {
    format!("({user}) ℹ️ <b>Cannot verify winnings</b>\n\n{reason}")
}

/// Formats the winning report for one user.
#[must_use]
pub fn format_winning_message(
    user_id: &str,
    draw: &DrawResult,
    ledger: Option<&LedgerEntry>,
) -> String {
    let user = escape_html(user_id);
    let round = escape_html(&draw.round);

    let Some(entry) = ledger else {
        return cannot_verify(&user, "No purchase record has been saved.");
    };
    if entry.round != draw.round {
        return cannot_verify(
            &user,
            &format!(
                "The recorded purchase is for round {} but the latest draw is round {round}.",
                escape_html(&entry.round)
            ),
        );
    }
    let Some(purchase) = entry.users.get(user_id) else {
        return cannot_verify(&user, &format!("No purchase is recorded for round {round}."));
    };
    if !purchase.success || purchase.games.is_empty() {
        return cannot_verify(&user, &format!("The purchase for round {round} failed."));
    }

    let mut msg = format!("({user}) 🎰 <b>Round {round} results</b>\n\n");
    let _ = writeln!(msg, "🗓 Draw date: {}", escape_html(&draw.draw_date));
    let winning = draw
        .numbers
        .iter()
        .map(|n| format!("<b>{n:02}</b>"))
        .collect::<Vec<_>>()
        .join(", ");
    let _ = writeln!(msg, "🎱 Winning numbers: {winning}");
    let _ = writeln!(msg, "➕ Bonus: <b>{:02}</b>\n", draw.bonus);

    let mut best_rank: Option<u8> = None;
    let mut winners = 0usize;
    for game in &purchase.games {
        let outcome = check_winning(&game.numbers, draw);
        let numbers = game
            .numbers
            .iter()
            .map(|n| {
                if draw.numbers.contains(n) {
                    format!("✅<b>{n:02}</b>")
                } else {
                    format!("{n:02}")
                }
            })
            .collect::<Vec<_>>()
            .join(", ");
        let _ = writeln!(msg, "🎲 [{}] {numbers}", escape_html(&game.slot));

        if outcome.is_winner() {
            let bonus = if outcome.rank == 2 { " + bonus" } else { "" };
            let _ = writeln!(
                msg,
                "   🎉 <b>Rank {}</b> ({} matched{bonus})",
                outcome.rank, outcome.match_count
            );
            winners += 1;
            best_rank = Some(best_rank.map_or(outcome.rank, |best| best.min(outcome.rank)));
        } else {
            let _ = writeln!(msg, "   ❌ No prize ({} matched)", outcome.match_count);
        }
    }

    msg.push('\n');
    match best_rank {
        Some(best) => {
            let _ = writeln!(msg, "🎊 <b>{winners} winning game(s)!</b>");
            if best <= 3 {
                msg.push_str("💰 <b>A major prize. Congratulations!</b>\n");
            }
        },
        None => msg.push_str("No luck this time.\n"),
    }
    msg
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use proptest::prelude::*;

    use super::*;
    use crate::ledger::{GameRecord, UserPurchase};

    fn draw() -> DrawResult {
        DrawResult {
            round: "1195".into(),
            draw_date: "2026-10-17".into(),
            numbers: [1, 2, 3, 4, 5, 6],
            bonus: 7,
        }
    }

    fn entry(round: &str, success: bool, games: Vec<[u8; 6]>) -> LedgerEntry {
        let mut users = BTreeMap::new();
        users.insert(
            "u1".to_string(),
            UserPurchase {
                success,
                games: games
                    .into_iter()
                    .zip(["A", "B", "C", "D", "E"])
                    .map(|(numbers, slot)| GameRecord {
                        slot: slot.to_string(),
                        numbers,
                    })
                    .collect(),
            },
        );
        LedgerEntry {
            round: round.into(),
            purchase_date: "2026-10-12".into(),
            users,
        }
    }

    #[test]
    fn rank_table() {
        let cases = [
            ([1, 2, 3, 4, 5, 6], 1, 6, false),
            ([1, 2, 3, 4, 5, 7], 2, 5, true),
            ([1, 2, 3, 4, 5, 8], 3, 5, false),
            ([1, 2, 3, 4, 9, 10], 4, 4, false),
            ([1, 2, 3, 7, 9, 10], 5, 3, true),
            ([1, 2, 7, 8, 9, 10], 0, 2, true),
            ([10, 11, 12, 13, 14, 15], 0, 0, false),
        ];
        for (numbers, rank, match_count, bonus_matched) in cases {
            assert_eq!(
                check_winning(&numbers, &draw()),
                RankOutcome {
                    rank,
                    match_count,
                    bonus_matched
                },
                "numbers {numbers:?}"
            );
        }
    }

    #[test]
    fn repeated_numbers_match_once() {
        assert_eq!(
            check_winning(&[1, 1, 1, 1, 1, 1], &draw()),
            RankOutcome {
                rank: 0,
                match_count: 1,
                bonus_matched: false
            }
        );
        assert_eq!(check_winning(&[1, 2, 3, 3, 3, 3], &draw()).rank, 5);
    }

    #[test]
    fn draw_body_is_parsed_and_date_hyphenated() {
        let body = r#"{"data":{"list":[{"ltEpsd":1195,"ltRflYmd":"20261017",
            "tm1WnNo":3,"tm2WnNo":9,"tm3WnNo":14,"tm4WnNo":22,"tm5WnNo":31,"tm6WnNo":44,
            "bnsWnNo":5}]}}"#;
        let draw = parse_latest_draw(body).unwrap();
        assert_eq!(draw.round, "1195");
        assert_eq!(draw.draw_date, "2026-10-17");
        assert_eq!(draw.numbers, [3, 9, 14, 22, 31, 44]);
        assert_eq!(draw.bonus, 5);
    }

    #[test]
    fn empty_draw_list_is_a_protocol_error() {
        assert!(matches!(
            parse_latest_draw(r#"{"data":{"list":[]}}"#),
            Err(LottoError::Protocol(_))
        ));
        assert!(matches!(
            parse_latest_draw("<html>"),
            Err(LottoError::Parse { .. })
        ));
    }

    #[test]
    fn cannot_verify_cases_are_distinct() {
        let draw = draw();
        let texts = [
            format_winning_message("u1", &draw, None),
            format_winning_message("u1", &draw, Some(&entry("1194", true, vec![[1, 2, 3, 4, 5, 6]]))),
            format_winning_message("u2", &draw, Some(&entry("1195", true, vec![[1, 2, 3, 4, 5, 6]]))),
            format_winning_message("u1", &draw, Some(&entry("1195", false, vec![]))),
        ];
        for text in &texts {
            assert!(text.contains("Cannot verify"), "{text}");
        }
        for (i, a) in texts.iter().enumerate() {
            for b in &texts[i + 1..] {
                assert_ne!(a, b);
            }
        }
        assert!(texts[1].contains("1194"));
    }

    #[test]
    fn report_highlights_matches_and_summarizes() {
        let ledger = entry(
            "1195",
            true,
            vec![[1, 2, 3, 4, 5, 7], [20, 21, 22, 23, 24, 25]],
        );
        let text = format_winning_message("u1", &draw(), Some(&ledger));
        assert!(text.contains("Round 1195 results"));
        assert!(text.contains("✅<b>01</b>"));
        assert!(text.contains("Rank 2</b> (5 matched + bonus)"));
        assert!(text.contains("No prize (0 matched)"));
        assert!(text.contains("1 winning game(s)"));
        assert!(text.contains("major prize"));
    }

    #[test]
    fn report_without_winners() {
        let ledger = entry("1195", true, vec![[20, 21, 22, 23, 24, 25]]);
        let text = format_winning_message("u1", &draw(), Some(&ledger));
        assert!(text.contains("No luck this time."));
    }

    proptest! {
        #[test]
        fn rank_agrees_with_match_count(
            purchased in proptest::sample::subsequence((1u8..=45).collect::<Vec<_>>(), 6),
            winning in proptest::sample::subsequence((1u8..=45).collect::<Vec<_>>(), 7),
        ) {
            let purchased: [u8; 6] = purchased.try_into().unwrap();
            let draw = DrawResult {
                round: "1".into(),
                draw_date: String::new(),
                numbers: winning[..6].try_into().unwrap(),
                bonus: winning[6],
            };
            let outcome = check_winning(&purchased, &draw);
            prop_assert!(outcome.match_count <= 6);
            match outcome.match_count {
                6 => prop_assert_eq!(outcome.rank, 1),
                5 => prop_assert_eq!(outcome.rank, if outcome.bonus_matched { 2 } else { 3 }),
                4 => prop_assert_eq!(outcome.rank, 4),
                3 => prop_assert_eq!(outcome.rank, 5),
                _ => prop_assert_eq!(outcome.rank, 0),
            }
            if outcome.match_count == 6 {
                prop_assert!(!outcome.bonus_matched);
            }
        }
    }
}
