//! Purchase executor.
//!
//! Reads the draw window from the purchase page, builds the automatic-pick
//! request and submits it. Response interpretation lives in [`outcome`].

pub mod outcome;

use serde::Serialize;
use tracing::{debug, info};

use crate::admission::AdmissionDecision;
use crate::error::LottoError;
use crate::session::SessionClient;
use crate::session::extract::{self, FieldSpec};

pub use self::outcome::{GenMode, PurchaseOutcome, PurchasedLine, SLOTS};

/// Price of one line, in won.
pub const UNIT_PRICE: u64 = 1_000;

/// Largest number of lines per round the remote system sells to one account.
pub const MAX_QUANTITY: u8 = 5;

/// Round-dependent purchase context read right before each attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrawWindow {
    /// Draw round number.
    pub round: String,
    /// Draw date of the round.
    pub draw_date: String,
    /// Sale end / payment deadline timestamp. May be empty.
    pub sale_end: String,
}

impl DrawWindow {
    /// Extracts the window from the purchase page markup.
    ///
    /// # Errors
    ///
    /// Returns [`LottoError::MissingPurchaseContext`] when the round or the
    /// draw date is absent.
    pub fn from_page(html: &str) -> Result<Self, LottoError> {
        let required = |spec: &FieldSpec| {
            spec.extract(html)
                .ok_or(LottoError::MissingPurchaseContext { field: spec.name })
        };
        Ok(Self {
            round: required(&extract::ROUND)?,
            draw_date: required(&extract::DRAW_DATE)?,
            sale_end: extract::SALE_END.extract(html).unwrap_or_default(),
        })
    }
}

/// Number generation mode requested for a line. Only automatic picks are
/// built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineMode {
    /// Numbers picked by the remote system.
    Auto,
}

/// One line of a purchase request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineSpec {
    /// Slot label, `A` to `E`.
    pub slot: char,
    /// Generation mode.
    pub mode: LineMode,
}

/// Wire form of a [`LineSpec`] inside the `param` form field.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WireLine {
    gen_type: &'static str,
    arr_game_choice_num: Option<String>,
    alpabet: String,
}

impl From<&LineSpec> for WireLine {
    fn from(spec: &LineSpec) -> Self {
        let gen_type = match spec.mode {
            LineMode::Auto => "0",
        };
        Self {
            gen_type,
            arr_game_choice_num: None,
            alpabet: spec.slot.to_string(),
        }
    }
}

/// A fully built purchase request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseRequest {
    /// Context read from the purchase page.
    pub window: DrawWindow,
    /// Direct-route token, empty when the probe granted none.
    pub direct_route: String,
    /// Lines to buy, labeled sequentially from `A`.
    pub lines: Vec<LineSpec>,
}

impl PurchaseRequest {
    /// Number of lines.
    #[must_use]
    pub fn quantity(&self) -> usize {
        self.lines.len()
    }

    /// Total price in won.
    #[must_use]
    pub fn amount(&self) -> u64 {
        self.quantity() as u64 * UNIT_PRICE
    }

    /// Form fields posted to the execution endpoint.
    ///
    /// # Errors
    ///
    /// Returns a parse error if the line list cannot be serialized.
    pub fn form_fields(&self) -> Result<Vec<(&'static str, String)>, LottoError> {
        let wire: Vec<WireLine> = self.lines.iter().map(WireLine::from).collect();
        let param = serde_json::to_string(&wire)
            .map_err(|e| LottoError::parse("purchase parameters", e, ""))?;
        Ok(vec![
            ("round", self.window.round.clone()),
            ("direct", self.direct_route.clone()),
            ("nBuyAmount", self.amount().to_string()),
            ("param", param),
            ("ROUND_DRAW_DATE", self.window.draw_date.clone()),
            ("WAMT_PAY_TLMT_END_DT", self.window.sale_end.clone()),
            ("gameCnt", self.quantity().to_string()),
        ])
    }
}

/// Rejects quantities outside `1..=5`.
///
/// # Errors
///
/// Returns [`LottoError::InvalidQuantity`].
pub fn validate_quantity(quantity: u8) -> Result<(), LottoError> {
    if quantity == 0 || quantity > MAX_QUANTITY {
        Err(LottoError::InvalidQuantity(quantity))
    } else {
        Ok(())
    }
}

/// Builds a request of `quantity` automatic lines.
///
/// # Errors
///
/// Returns [`LottoError::InvalidQuantity`] for quantities outside `1..=5`.
pub fn build_request(
    window: DrawWindow,
    admission: &AdmissionDecision,
    quantity: u8,
) -> Result<PurchaseRequest, LottoError> {
    validate_quantity(quantity)?;
    let lines = SLOTS
        .iter()
        .take(usize::from(quantity))
        .map(|&slot| LineSpec {
            slot,
            mode: LineMode::Auto,
        })
        .collect();
    Ok(PurchaseRequest {
        window,
        direct_route: admission.direct_route().to_string(),
        lines,
    })
}

impl SessionClient {
    /// Reads the current draw window from the purchase page.
    ///
    /// # Errors
    ///
    /// Returns a transport error or [`LottoError::MissingPurchaseContext`].
    pub fn fetch_draw_window(&self) -> Result<DrawWindow, LottoError> {
        let _enter = self.span().enter();
        let html = self.get_page(
            &self.endpoints().purchase_page,
            &self.endpoints().game_page,
            "purchase page",
        )?;
        let window = DrawWindow::from_page(&html)?;
        info!(
            round = %window.round,
            draw_date = %window.draw_date,
            "draw window read"
        );
        Ok(window)
    }

    /// Submits a purchase and classifies the answer.
    ///
    /// # Errors
    ///
    /// Returns a transport error, or a parse error for a body that is
    /// neither JSON nor an HTML page.
    pub fn submit(&self, request: &PurchaseRequest) -> Result<PurchaseOutcome, LottoError> {
        let _enter = self.span().enter();
        info!(
            round = %request.window.round,
            lines = request.quantity(),
            amount = request.amount(),
            "submitting purchase"
        );
        let fields = request.form_fields()?;
        let body = self.post_xhr(
            &self.endpoints().purchase_action,
            Some(fields.as_slice()),
            "purchase submit",
        )?;
        debug!(bytes = body.len(), "purchase response received");
        outcome::classify_body(&body)
    }
}
