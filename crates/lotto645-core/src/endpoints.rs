//! Remote endpoint table.

/// Origin of the main site (login, account pages, draw results).
pub const MAIN_ORIGIN: &str = "https://www.dhlottery.co.kr";

/// Origin of the online purchase host.
pub const PURCHASE_ORIGIN: &str = "https://ol.dhlottery.co.kr";

/// Origin of the game launcher host.
pub const GAME_ORIGIN: &str = "https://el.dhlottery.co.kr";

/// Browser identity sent with every request; the remote bot filter rejects
/// requests without it.
pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                              (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Accept header for page navigations.
pub const ACCEPT_HTML: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8";

/// Accept-Language header matching the remote site's locale.
pub const ACCEPT_LANGUAGE: &str = "ko-KR,ko;q=0.9,en-US;q=0.8,en;q=0.7";

/// Every URL the engine talks to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    /// Origin header value sent with the login POST.
    pub origin: String,
    /// Main page; also carries the logged-in marker.
    pub main_page: String,
    /// Login page that hands out baseline cookies.
    pub login_page: String,
    /// Key-distribution endpoint.
    pub public_key: String,
    /// Authentication POST endpoint.
    pub login_action: String,
    /// Game launcher page.
    pub game_page: String,
    /// Purchase page carrying round, draw date and balance fields.
    pub purchase_page: String,
    /// Account page used as the balance fallback.
    pub account_page: String,
    /// Queue-status probe.
    pub queue_status: String,
    /// Purchase execution endpoint.
    pub purchase_action: String,
    /// Latest draw result endpoint.
    pub draw_result: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            origin: MAIN_ORIGIN.to_string(),
            main_page: format!("{MAIN_ORIGIN}/"),
            login_page: format!("{MAIN_ORIGIN}/login"),
            public_key: format!("{MAIN_ORIGIN}/login/selectRsaModulus.do"),
            login_action: format!("{MAIN_ORIGIN}/login/securityLoginCheck.do"),
            game_page: format!("{GAME_ORIGIN}/game/TotalGame.jsp?LottoId=LO40"),
            purchase_page: format!("{PURCHASE_ORIGIN}/olotto/game/game645.do"),
            account_page: format!("{MAIN_ORIGIN}/mypage/home"),
            queue_status: format!("{PURCHASE_ORIGIN}/olotto/game/egovUserReadySocket.json"),
            purchase_action: format!("{PURCHASE_ORIGIN}/olotto/game/execBuy.do"),
            draw_result: format!("{MAIN_ORIGIN}/lt645/selectPstLt645Info.do"),
        }
    }
}

impl Endpoints {
    /// Re-roots every production path onto a single origin.
    ///
    /// ```
    /// use lotto645_core::Endpoints;
    ///
    /// let endpoints = Endpoints::rooted_at("http://127.0.0.1:8080/");
    /// assert_eq!(endpoints.login_page, "http://127.0.0.1:8080/login");
    /// ```
    #[must_use]
    pub fn rooted_at(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        let defaults = Self::default();
        let reroot = |url: &str| {
            let path = [MAIN_ORIGIN, PURCHASE_ORIGIN, GAME_ORIGIN]
                .iter()
                .find_map(|origin| url.strip_prefix(origin))
                .unwrap_or(url);
            format!("{base}{path}")
        };
        Self {
            origin: base.to_string(),
            main_page: reroot(&defaults.main_page),
            login_page: reroot(&defaults.login_page),
            public_key: reroot(&defaults.public_key),
            login_action: reroot(&defaults.login_action),
            game_page: reroot(&defaults.game_page),
            purchase_page: reroot(&defaults.purchase_page),
            account_page: reroot(&defaults.account_page),
            queue_status: reroot(&defaults.queue_status),
            purchase_action: reroot(&defaults.purchase_action),
            draw_result: reroot(&defaults.draw_result),
        }
    }
}
