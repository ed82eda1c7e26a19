//! Authenticated session against the remote ticketing site.
//!
//! A [`SessionClient`] owns one blocking HTTP client and one cookie store for
//! one account. The store enforces public-suffix rules ([`cookies`]). Every request after login goes through that client, so the
//! session cookie set by the authentication endpoint travels with the queue
//! probe and the purchase request.
//!
//! # Login sequence
//!
//! 1. GET the login page to collect baseline cookies
//! 2. Fetch a fresh RSA public key (never cached, the site rotates it)
//! 3. Encrypt identifier and secret with [`crate::cipher`]
//! 4. POST both ciphertexts with browser identity headers
//! 5. Classify the response with [`classify_login`]

pub mod cookies;
pub mod extract;

use std::time::Duration;

use reqwest::blocking::{Client, Response};
use reqwest::cookie::CookieStore;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, CONTENT_TYPE, ORIGIN, REFERER, USER_AGENT};
use reqwest::redirect::Policy;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{Span, debug, info, warn};

use crate::cipher::{self, RsaPublicKeyMaterial};
use crate::endpoints::{self, Endpoints};
use crate::error::{LoginError, LottoError};
use crate::redact::{self, mask_identifier};
use crate::session::cookies::SessionCookies;

/// Per-request timeout.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum redirect hops followed per request.
pub const MAX_REDIRECTS: usize = 10;

/// Name of the cookie that carries an authenticated session.
pub const SESSION_COOKIE: &str = "JSESSIONID";

/// Body phrases that mark a rejected login. Checked before any success
/// heuristic.
const LOGIN_FAILURE_PHRASES: &[&str] = &[
    "아이디 또는 비밀번호를 확인해주세요",
    "로그인에 실패",
    "loginFail",
];

/// Body phrases that only appear on pages rendered for a logged-in user.
const LOGGED_IN_MARKERS: &[&str] = &["로그아웃", "logout"];

/// URL fragments of the pages a successful login redirects to.
const LOGGED_IN_URL_FRAGMENTS: &[&str] = &["main", "index"];

/// Minimum size of a real game page; smaller bodies are error stubs.
const MIN_GAME_PAGE_BYTES: usize = 1000;

/// Account credentials. The secret never leaves process memory.
pub struct Credentials {
    /// Account identifier.
    pub identifier: String,
    /// Account password.
    pub secret: SecretString,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("identifier", &mask_identifier(&self.identifier))
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// Deposit balance as far as the engine could determine it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Balance {
    /// A non-zero balance was read from the page, in won.
    Known(u64),
    /// No extraction strategy produced a value. This includes a genuinely
    /// empty deposit, which the site renders the same way as a missing field.
    Unknown,
}

impl Balance {
    /// Returns the amount when known.
    #[must_use]
    pub const fn amount(self) -> Option<u64> {
        match self {
            Self::Known(amount) => Some(amount),
            Self::Unknown => None,
        }
    }
}

/// Builds the blocking HTTP client shared by every request of one account.
///
/// # Errors
///
/// Returns an error if the TLS backend cannot be initialized.
pub fn build_http_client(cookies: SessionCookies) -> Result<Client, LottoError> {
    Client::builder()
        .cookie_provider(cookies)
        .timeout(REQUEST_TIMEOUT)
        .redirect(Policy::limited(MAX_REDIRECTS))
        .user_agent(endpoints::USER_AGENT)
        .build()
        .map_err(|e| LottoError::transport("client construction", &e))
}

/// Classifies a login response. First match wins:
///
/// 1. a failure phrase in the body is a rejected login, even when the page
///    also carries stray success markers
/// 2. a logged-in URL or body marker together with a non-empty session
///    cookie is a confirmed session
/// 3. anything else is unconfirmed
///
/// # Errors
///
/// Returns the [`LoginError`] describing why the session is not
/// authenticated.
pub fn classify_login(
    body: &str,
    final_url: &reqwest::Url,
    session_cookie: Option<&str>,
) -> Result<(), LoginError> {
    if LOGIN_FAILURE_PHRASES.iter().any(|p| body.contains(p)) {
        return Err(LoginError::InvalidCredentials);
    }

    let url_marker = final_url.path() == "/"
        || LOGGED_IN_URL_FRAGMENTS
            .iter()
            .any(|fragment| final_url.as_str().contains(fragment));
    let body_marker = LOGGED_IN_MARKERS.iter().any(|m| body.contains(m));
    let has_cookie = session_cookie.is_some_and(|value| !value.is_empty());

    if (url_marker || body_marker) && has_cookie {
        Ok(())
    } else {
        Err(LoginError::Unconfirmed)
    }
}

/// Looks up one cookie value in a `Cookie` header string.
fn cookie_value(header: &str, name: &str) -> Option<String> {
    header.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        (key == name).then(|| value.to_string())
    })
}

/// One account's session with the remote site.
pub struct SessionClient {
    credentials: Credentials,
    endpoints: Endpoints,
    cookies: SessionCookies,
    http: Client,
    span: Span,
}

impl SessionClient {
    /// Creates an unauthenticated session. `span` is the logging handle every
    /// operation of this client records under.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        credentials: Credentials,
        endpoints: Endpoints,
        span: Span,
    ) -> Result<Self, LottoError> {
        let cookies = cookies::new_store();
        let http = build_http_client(SessionCookies::clone(&cookies))?;
        Ok(Self {
            credentials,
            endpoints,
            cookies,
            http,
            span,
        })
    }

    /// Endpoint table this client talks to.
    #[must_use]
    pub const fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    /// Logging handle of this client.
    #[must_use]
    pub const fn span(&self) -> &Span {
        &self.span
    }

    /// Masked account identifier for log lines.
    #[must_use]
    pub fn masked_identifier(&self) -> String {
        mask_identifier(&self.credentials.identifier)
    }

    pub(crate) const fn http(&self) -> &Client {
        &self.http
    }

    /// Current value of the session cookie for `url`, if any.
    #[must_use]
    pub fn session_cookie(&self, url: &reqwest::Url) -> Option<String> {
        let header = self.cookies.cookies(url)?;
        let header = header.to_str().ok()?;
        cookie_value(header, SESSION_COOKIE)
    }

    /// Fetches the RSA key material for this login attempt.
    ///
    /// # Errors
    ///
    /// Returns [`LottoError::KeyFetch`] on transport or envelope failures.
    pub fn fetch_public_key(&self) -> Result<RsaPublicKeyMaterial, LottoError> {
        #[derive(Deserialize)]
        struct Envelope {
            data: RsaPublicKeyMaterial,
        }

        let _enter = self.span.enter();
        let body = self
            .http
            .get(&self.endpoints.public_key)
            .header(REFERER, &self.endpoints.login_page)
            .send()
            .and_then(Response::text)
            .map_err(|e| LottoError::KeyFetch(e.to_string()))?;

        let envelope: Envelope = serde_json::from_str(&body).map_err(|e| {
            LottoError::KeyFetch(format!(
                "{e} (body: {})",
                redact::snippet(&body, redact::DIAGNOSTIC_SNIPPET_BYTES)
            ))
        })?;

        if envelope.data.modulus_hex.trim().is_empty() {
            return Err(LottoError::KeyFetch("empty modulus".to_string()));
        }

        debug!(
            modulus_prefix = %redact::snippet(&envelope.data.modulus_hex, 20),
            exponent = %envelope.data.exponent_hex,
            "received public key"
        );
        Ok(envelope.data)
    }

    /// Performs the full login handshake.
    ///
    /// # Errors
    ///
    /// Returns [`LottoError::Authentication`] when the site rejects or fails
    /// to confirm the login, or a transport/encryption error from any step.
    pub fn login(&self) -> Result<(), LottoError> {
        let _enter = self.span.enter();

        info!(step = 1, "opening login page");
        self.http
            .get(&self.endpoints.login_page)
            .header(ACCEPT, endpoints::ACCEPT_HTML)
            .send()
            .map_err(|e| LottoError::transport("login page", &e))?;

        info!(step = 2, "fetching public key");
        let key = self.fetch_public_key()?;

        info!(step = 3, "encrypting credentials");
        let identifier = cipher::encrypt_with(&self.credentials.identifier, &key)?;
        let secret = cipher::encrypt_with(self.credentials.secret.expose_secret(), &key)?;

        info!(step = 4, "submitting login");
        let response = self
            .http
            .post(&self.endpoints.login_action)
            .header(USER_AGENT, endpoints::USER_AGENT)
            .header(REFERER, &self.endpoints.login_page)
            .header(ORIGIN, &self.endpoints.origin)
            .header(ACCEPT, endpoints::ACCEPT_HTML)
            .header(ACCEPT_LANGUAGE, endpoints::ACCEPT_LANGUAGE)
            .form(&[("userId", identifier), ("userPswdEncn", secret)])
            .send()
            .map_err(|e| LottoError::transport("login submit", &e))?;

        let status = response.status();
        let final_url = response.url().clone();
        let body = response
            .text()
            .map_err(|e| LottoError::transport("login response", &e))?;
        debug!(status = status.as_u16(), url = %final_url, "login response received");

        let cookie = self.session_cookie(&final_url);
        match classify_login(&body, &final_url, cookie.as_deref()) {
            Ok(()) => {
                info!("login confirmed");
                Ok(())
            },
            Err(err) => {
                warn!(
                    error = %err,
                    body = %redact::snippet(&body, redact::DIAGNOSTIC_SNIPPET_BYTES),
                    "login not confirmed"
                );
                Err(err.into())
            },
        }
    }

    /// Checks whether the main page renders the logged-in marker.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the page cannot be fetched.
    pub fn is_logged_in(&self) -> Result<bool, LottoError> {
        let _enter = self.span.enter();
        let body = self.get_page(&self.endpoints.main_page, &self.endpoints.main_page, "main page")?;
        Ok(LOGGED_IN_MARKERS.iter().any(|m| body.contains(m)))
    }

    /// Re-opens the purchase page right before a submission so the server
    /// side session is touched. Failure is logged and ignored.
    pub fn refresh_session(&self) {
        let _enter = self.span.enter();
        match self.get_page(
            &self.endpoints.purchase_page,
            &self.endpoints.game_page,
            "session refresh",
        ) {
            Ok(_) => debug!("session refreshed"),
            Err(err) => warn!(error = %err, "session refresh failed, continuing"),
        }
    }

    /// Opens the game launcher page the way a browser would before buying.
    ///
    /// # Errors
    ///
    /// Returns a protocol error when the page is not a real game page.
    pub fn visit_game_page(&self) -> Result<(), LottoError> {
        let _enter = self.span.enter();
        self.http
            .get(&self.endpoints.main_page)
            .send()
            .map_err(|e| LottoError::transport("main page", &e))?;

        let response = self
            .http
            .get(&self.endpoints.game_page)
            .header(REFERER, &self.endpoints.main_page)
            .header(ACCEPT, endpoints::ACCEPT_HTML)
            .send()
            .map_err(|e| LottoError::transport("game page", &e))?;
        let status = response.status();
        let body = response
            .text()
            .map_err(|e| LottoError::transport("game page", &e))?;

        if status.is_success() && body.len() > MIN_GAME_PAGE_BYTES {
            info!(bytes = body.len(), "game page opened");
            Ok(())
        } else {
            Err(LottoError::Protocol(format!(
                "unexpected game page (status {}, {} bytes): {}",
                status.as_u16(),
                body.len(),
                redact::snippet(&body, redact::DIAGNOSTIC_SNIPPET_BYTES)
            )))
        }
    }

    /// Reads the deposit balance.
    ///
    /// Tries the purchase page first and falls back to the account page.
    /// Each page has its own ordered extraction strategies; the first
    /// non-zero value wins. When nothing matches the result is
    /// [`Balance::Unknown`] and a bounded excerpt of the purchase page is
    /// logged for diagnosis.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the purchase page cannot be fetched.
    /// Failures of the fallback page are logged, not returned.
    pub fn check_balance(&self) -> Result<Balance, LottoError> {
        let _enter = self.span.enter();
        info!("checking deposit balance");

        let purchase_page = self.get_page(
            &self.endpoints.purchase_page,
            &self.endpoints.main_page,
            "purchase page",
        )?;
        if let Some(amount) = extract::PURCHASE_PAGE_BALANCE.extract_amount(&purchase_page) {
            info!(balance = amount, "balance read from purchase page");
            return Ok(Balance::Known(amount));
        }

        debug!("purchase page carried no balance, trying account page");
        match self.get_page(
            &self.endpoints.account_page,
            &self.endpoints.main_page,
            "account page",
        ) {
            Ok(account_page) => {
                if let Some(amount) = extract::ACCOUNT_PAGE_BALANCE.extract_amount(&account_page) {
                    info!(balance = amount, "balance read from account page");
                    return Ok(Balance::Known(amount));
                }
            },
            Err(err) => warn!(error = %err, "account page unavailable"),
        }

        warn!(
            page = %redact::snippet(&purchase_page, redact::BALANCE_SNIPPET_BYTES),
            "balance not found on any page"
        );
        Ok(Balance::Unknown)
    }

    /// GETs a page with navigation headers and returns its body.
    pub(crate) fn get_page(
        &self,
        url: &str,
        referer: &str,
        context: &'static str,
    ) -> Result<String, LottoError> {
        self.http
            .get(url)
            .header(REFERER, referer)
            .header(ACCEPT, endpoints::ACCEPT_HTML)
            .send()
            .and_then(Response::text)
            .map_err(|e| LottoError::transport(context, &e))
    }

    /// POSTs a form as an XHR from the purchase page.
    pub(crate) fn post_xhr(
        &self,
        url: &str,
        form: Option<&[(&str, String)]>,
        context: &'static str,
    ) -> Result<String, LottoError> {
        let mut request = self
            .http
            .post(url)
            .header(REFERER, &self.endpoints.purchase_page)
            .header("X-Requested-With", "XMLHttpRequest");
        request = match form {
            Some(fields) => request
                .header(
                    CONTENT_TYPE,
                    "application/x-www-form-urlencoded; charset=UTF-8",
                )
                .form(fields),
            None => request.header(CONTENT_TYPE, "application/json; charset=UTF-8"),
        };
        let response = request
            .send()
            .map_err(|e| LottoError::transport(context, &e))?;
        debug!(
            context,
            status = response.status().as_u16(),
            url = %response.url(),
            "xhr response"
        );
        response
            .text()
            .map_err(|e| LottoError::transport(context, &e))
    }
}

impl std::fmt::Debug for SessionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionClient")
            .field("credentials", &self.credentials)
            .field("endpoints", &self.endpoints)
            .finish_non_exhaustive()
    }
}
