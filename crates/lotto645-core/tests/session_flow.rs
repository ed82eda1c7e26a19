//! End-to-end flows against an in-process fake of the remote site.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock, Mutex, mpsc};
use std::thread;

use axum::body::{self, Body};
use axum::extract::{Request, State};
use axum::http::header::SET_COOKIE;
use axum::middleware::{self, Next};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use lotto645_core::ledger::PurchaseLedger;
use lotto645_core::notify::{Notifier, NotifyError};
use lotto645_core::purchase::{self, DrawWindow};
use lotto645_core::tasks::{self, TaskEnv, TaskSummary};
use lotto645_core::{
    Account, AdmissionDecision, Balance, Credentials, Endpoints, LoginError, LottoError,
    PurchaseOutcome, SessionClient,
};
use rand::rngs::OsRng;
use rsa::traits::PublicKeyParts;
use rsa::{Pkcs1v15Encrypt, RsaPrivateKey};
use secrecy::SecretString;
use serde_json::{Value, json};
use tempfile::TempDir;
use tracing::Span;

static SITE_KEY: LazyLock<RsaPrivateKey> =
    LazyLock::new(|| RsaPrivateKey::new(&mut OsRng, 1024).expect("generate site key"));

const USER: &str = "player01";
const PASSWORD: &str = "correct-horse";

const PURCHASE_PAGE: &str = r#"<html><body>
  <strong id="curRound">1195</strong>
  <input type="hidden" id="ROUND_DRAW_DATE" value="2026/10/24">
  <input type="hidden" id="WAMT_PAY_TLMT_END_DT" value="2027/10/25">
  <span id="moneyBalance">12,000원</span>
</body></html>"#;

const PURCHASE_PAGE_WITHOUT_BALANCE: &str = r#"<html><body>
  <strong id="curRound">1195</strong>
  <input type="hidden" id="ROUND_DRAW_DATE" value="2026/10/24">
</body></html>"#;

const PURCHASE_PAGE_LOW_BALANCE: &str = r#"<html><body>
  <strong id="curRound">1195</strong>
  <input type="hidden" id="ROUND_DRAW_DATE" value="2026/10/24">
  <span id="moneyBalance">3,000원</span>
</body></html>"#;

const ACCOUNT_PAGE: &str = "<html><body><p>my page</p></body></html>";

const ACCEPTED: &str = r#"{"loginYn":"Y","isAllowed":"Y","checkOltSaleTime":true,
  "result":{"resultCode":"100",
    "arrGameChoiceNum":["A|01|09|17|23|34|453","B|02|10|18|24|35|443"],
    "drawDate":"2026/10/24","payLimitDate":"2027/10/25","barCode":["111","222"]}}"#;

const DRAW: &str = r#"{"data":{"list":[{"ltEpsd":1195,"ltRflYmd":"20261024",
  "tm1WnNo":1,"tm2WnNo":9,"tm3WnNo":17,"tm4WnNo":23,"tm5WnNo":34,"tm6WnNo":40,"bnsWnNo":45}]}}"#;

#[derive(Debug, Clone)]
struct Recorded {
    method: String,
    path: String,
    headers: HashMap<String, String>,
    body: String,
}

struct SiteBehavior {
    purchase_page: &'static str,
    account_page: &'static str,
    queue_body: &'static str,
    purchase_body: &'static str,
}

impl Default for SiteBehavior {
    fn default() -> Self {
        Self {
            purchase_page: PURCHASE_PAGE,
            account_page: ACCOUNT_PAGE,
            queue_body: r#"{"ready_cnt":0,"ready_ip":"10.0.0.7"}"#,
            purchase_body: ACCEPTED,
        }
    }
}

#[derive(Clone)]
struct SiteState {
    behavior: Arc<SiteBehavior>,
    requests: Arc<Mutex<Vec<Recorded>>>,
}

async fn record(State(site): State<SiteState>, request: Request, next: Next) -> Response {
    let (parts, request_body) = request.into_parts();
    let bytes = body::to_bytes(request_body, usize::MAX)
        .await
        .unwrap_or_default();
    let headers = parts
        .headers
        .iter()
        .filter_map(|(name, value)| Some((name.as_str().to_string(), value.to_str().ok()?.to_string())))
        .collect();
    site.requests.lock().unwrap().push(Recorded {
        method: parts.method.to_string(),
        path: parts.uri.path().to_string(),
        headers,
        body: String::from_utf8_lossy(&bytes).into_owned(),
    });
    next.run(Request::from_parts(parts, Body::from(bytes))).await
}

fn decrypt_hex(ciphertext: &str) -> String {
    let bytes = hex::decode(ciphertext).unwrap();
    String::from_utf8(SITE_KEY.decrypt(Pkcs1v15Encrypt, &bytes).unwrap()).unwrap()
}

async fn login_page() -> impl IntoResponse {
    (
        [(SET_COOKIE, "JSESSIONID=guest; Path=/")],
        Html("<html>login</html>"),
    )
}

async fn public_key() -> Json<Value> {
    let public = SITE_KEY.to_public_key();
    Json(json!({
        "data": {
            "rsaModulus": public.n().to_str_radix(16),
            "publicExponent": public.e().to_str_radix(16),
        }
    }))
}

async fn login_action(Form(form): Form<HashMap<String, String>>) -> Response {
    let field = |name: &str| form.get(name).map(|value| decrypt_hex(value));
    if field("userId").as_deref() == Some(USER) && field("userPswdEncn").as_deref() == Some(PASSWORD)
    {
        (
            [(SET_COOKIE, "JSESSIONID=authed; Path=/")],
            Html("<html><a href='/logout'>로그아웃</a></html>"),
        )
            .into_response()
    } else {
        Html("<script>alert('아이디 또는 비밀번호를 확인해주세요')</script>").into_response()
    }
}

async fn main_page() -> Html<&'static str> {
    Html("<html><a>로그아웃</a></html>")
}

async fn game_page() -> Html<String> {
    Html(format!("<html>LO40{}</html>", " ".repeat(2000)))
}

async fn purchase_page(State(site): State<SiteState>) -> Html<&'static str> {
    Html(site.behavior.purchase_page)
}

async fn account_page(State(site): State<SiteState>) -> Html<&'static str> {
    Html(site.behavior.account_page)
}

async fn queue_status(State(site): State<SiteState>) -> &'static str {
    site.behavior.queue_body
}

async fn execute_purchase(State(site): State<SiteState>) -> &'static str {
    site.behavior.purchase_body
}

async fn latest_draw() -> &'static str {
    DRAW
}

fn router(state: SiteState) -> Router {
    Router::new()
        .route("/", get(main_page))
        .route("/login", get(login_page))
        .route("/login/selectRsaModulus.do", get(public_key))
        .route("/login/securityLoginCheck.do", post(login_action))
        .route("/game/TotalGame.jsp", get(game_page))
        .route("/olotto/game/game645.do", get(purchase_page))
        .route("/mypage/home", get(account_page))
        .route("/olotto/game/egovUserReadySocket.json", post(queue_status))
        .route("/olotto/game/execBuy.do", post(execute_purchase))
        .route("/lt645/selectPstLt645Info.do", get(latest_draw))
        .layer(middleware::from_fn_with_state(state.clone(), record))
        .with_state(state)
}

struct FakeSite {
    base: String,
    requests: Arc<Mutex<Vec<Recorded>>>,
}

impl FakeSite {
    fn start(behavior: SiteBehavior) -> Self {
        let state = SiteState {
            behavior: Arc::new(behavior),
            requests: Arc::new(Mutex::new(Vec::new())),
        };
        let requests = Arc::clone(&state.requests);
        let app = router(state);

        let (ready_tx, ready_rx) = mpsc::channel();
        thread::spawn(move || {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            runtime.block_on(async move {
                let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
                ready_tx.send(listener.local_addr().unwrap()).unwrap();
                axum::serve(listener, app).await.unwrap();
            });
        });
        let addr = ready_rx.recv().unwrap();
        Self {
            base: format!("http://{addr}"),
            requests,
        }
    }

    fn endpoints(&self) -> Endpoints {
        Endpoints::rooted_at(&self.base)
    }

    fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }

    fn find(&self, path: &str) -> Option<Recorded> {
        self.requests().into_iter().find(|r| r.path == path)
    }
}

fn form_fields(body: &str) -> HashMap<String, String> {
    url::form_urlencoded::parse(body.as_bytes())
        .into_owned()
        .collect()
}

#[derive(Clone, Default)]
struct SharedNotifier {
    messages: Arc<Mutex<Vec<String>>>,
}

impl SharedNotifier {
    fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

impl Notifier for SharedNotifier {
    fn send(&self, text: &str) -> Result<(), NotifyError> {
        self.messages.lock().unwrap().push(text.to_string());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "shared"
    }
}

fn credentials(password: &str) -> Credentials {
    Credentials {
        identifier: USER.to_string(),
        secret: SecretString::from(password.to_string()),
    }
}

fn account(password: &str) -> Account {
    Account {
        user_id: USER.to_string(),
        password: SecretString::from(password.to_string()),
    }
}

fn env(site: &FakeSite, dir: &TempDir, notifier: &SharedNotifier, quantity: u8) -> TaskEnv {
    TaskEnv {
        endpoints: site.endpoints(),
        ledger: PurchaseLedger::new(dir.path().join("last_purchase.json")),
        notifier: Some(Box::new(notifier.clone())),
        quantity,
    }
}

#[test]
fn login_posts_encrypted_credentials() {
    let site = FakeSite::start(SiteBehavior::default());
    let client = SessionClient::new(credentials(PASSWORD), site.endpoints(), Span::none()).unwrap();
    client.login().unwrap();

    let post = site.find("/login/securityLoginCheck.do").unwrap();
    assert_eq!(post.method, "POST");
    let form = form_fields(&post.body);
    assert_eq!(decrypt_hex(&form["userId"]), USER);
    assert_ne!(form["userPswdEncn"], PASSWORD);
    assert!(post.headers["user-agent"].contains("Chrome/120"));
    assert!(post.headers["referer"].ends_with("/login"));
    assert_eq!(post.headers["origin"], site.base);

    assert!(client.is_logged_in().unwrap());
}

#[test]
fn wrong_password_is_rejected() {
    let site = FakeSite::start(SiteBehavior::default());
    let client = SessionClient::new(credentials("nope"), site.endpoints(), Span::none()).unwrap();
    assert!(matches!(
        client.login(),
        Err(LottoError::Authentication(LoginError::InvalidCredentials))
    ));
}

#[test]
fn session_cookie_travels_with_later_requests() {
    let site = FakeSite::start(SiteBehavior::default());
    let client = SessionClient::new(credentials(PASSWORD), site.endpoints(), Span::none()).unwrap();
    client.login().unwrap();

    assert_eq!(client.check_balance().unwrap(), Balance::Known(12_000));
    assert_eq!(
        client.check_admission().unwrap(),
        AdmissionDecision::DirectRoute("10.0.0.7".into())
    );
    let probe = site.find("/olotto/game/egovUserReadySocket.json").unwrap();
    assert!(probe.headers["cookie"].contains("JSESSIONID=authed"));
    assert_eq!(probe.headers["x-requested-with"], "XMLHttpRequest");
}

#[test]
fn html_purchase_response_means_expired_session() {
    let site = FakeSite::start(SiteBehavior {
        purchase_body: "<!DOCTYPE html><html><body>login required</body></html>",
        ..SiteBehavior::default()
    });
    let client = SessionClient::new(credentials(PASSWORD), site.endpoints(), Span::none()).unwrap();
    client.login().unwrap();

    let window = client.fetch_draw_window().unwrap();
    assert_eq!(
        window,
        DrawWindow {
            round: "1195".into(),
            draw_date: "2026/10/24".into(),
            sale_end: "2027/10/25".into(),
        }
    );
    let request = purchase::build_request(window, &AdmissionDecision::Unknown, 1).unwrap();
    assert_eq!(client.submit(&request).unwrap(), PurchaseOutcome::SessionExpired);
}

#[test]
fn buy_task_submits_notifies_and_records() {
    let site = FakeSite::start(SiteBehavior::default());
    let dir = TempDir::new().unwrap();
    let notifier = SharedNotifier::default();
    let env = env(&site, &dir, &notifier, 2);

    let summary = tasks::buy_lotto(&[account(PASSWORD)], &env);
    assert_eq!(
        summary,
        TaskSummary {
            succeeded: 1,
            failed: 0
        }
    );

    let submit = site.find("/olotto/game/execBuy.do").unwrap();
    let form = form_fields(&submit.body);
    assert_eq!(form["round"], "1195");
    assert_eq!(form["direct"], "10.0.0.7");
    assert_eq!(form["nBuyAmount"], "2000");
    assert_eq!(form["gameCnt"], "2");
    assert!(form["param"].contains(r#""alpabet":"B""#));
    assert!(
        submit.headers["content-type"].starts_with("application/x-www-form-urlencoded")
    );

    let messages = notifier.messages();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].contains("Purchase complete"));
    assert!(messages[0].contains("2,000 won"));

    let entry = env.ledger.load().unwrap().unwrap();
    assert_eq!(entry.round, "1195");
    let user = &entry.users[USER];
    assert!(user.success);
    assert_eq!(user.games[0].numbers, [1, 9, 17, 23, 34, 45]);
    assert_eq!(user.games[1].slot, "B");
}

#[test]
fn busy_queue_stops_the_purchase() {
    let site = FakeSite::start(SiteBehavior {
        queue_body: r#"{"ready_cnt":120,"ready_time":30}"#,
        ..SiteBehavior::default()
    });
    let dir = TempDir::new().unwrap();
    let notifier = SharedNotifier::default();
    let env = env(&site, &dir, &notifier, 5);

    let summary = tasks::buy_lotto(&[account(PASSWORD)], &env);
    assert_eq!(summary.failed, 1);
    assert!(site.find("/olotto/game/execBuy.do").is_none());
    assert!(notifier.messages()[0].contains("queue is busy"));
    assert!(env.ledger.load().unwrap().is_none());
}

#[test]
fn one_failing_account_does_not_stop_the_next() {
    let site = FakeSite::start(SiteBehavior::default());
    let dir = TempDir::new().unwrap();
    let notifier = SharedNotifier::default();
    let env = env(&site, &dir, &notifier, 1);

    let summary = tasks::check_balance(&[account("wrong"), account(PASSWORD)], &env);
    assert_eq!(
        summary,
        TaskSummary {
            succeeded: 1,
            failed: 1
        }
    );
    let messages = notifier.messages();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].contains("check-balance failed"));
}

#[test]
fn winning_task_reads_ledger_and_draw() {
    let site = FakeSite::start(SiteBehavior::default());
    let dir = TempDir::new().unwrap();
    let notifier = SharedNotifier::default();
    let env = env(&site, &dir, &notifier, 2);

    assert_eq!(tasks::buy_lotto(&[account(PASSWORD)], &env).succeeded, 1);
    let summary = tasks::check_winning(&[account(PASSWORD)], &env);
    assert_eq!(summary.succeeded, 1);

    let report = notifier.messages().pop().unwrap();
    assert!(report.contains("Round 1195 results"));
    assert!(report.contains("Rank 2</b> (5 matched + bonus)"));
}

#[test]
fn invalid_quantity_fails_before_any_request() {
    let site = FakeSite::start(SiteBehavior::default());
    let dir = TempDir::new().unwrap();
    let notifier = SharedNotifier::default();

    for quantity in [0, 6] {
        let env = env(&site, &dir, &notifier, quantity);
        assert_eq!(tasks::buy_lotto(&[account(PASSWORD)], &env).failed, 1);
        assert_eq!(
            tasks::check_balance_and_buy(&[account(PASSWORD)], &env).failed,
            1
        );
    }

    assert!(site.requests().is_empty());
    let messages = notifier.messages();
    assert_eq!(messages.len(), 4);
    assert!(messages[0].contains("quantity 0 is outside"));
    assert!(messages[3].contains("quantity 6 is outside"));
    assert!(!dir.path().join("last_purchase.json").exists());
}

#[test]
fn check_and_buy_skips_when_balance_is_unreadable() {
    let site = FakeSite::start(SiteBehavior {
        purchase_page: PURCHASE_PAGE_WITHOUT_BALANCE,
        ..SiteBehavior::default()
    });
    let dir = TempDir::new().unwrap();
    let notifier = SharedNotifier::default();
    let env = env(&site, &dir, &notifier, 1);

    let summary = tasks::check_balance_and_buy(&[account(PASSWORD)], &env);
    assert_eq!(
        summary,
        TaskSummary {
            succeeded: 0,
            failed: 1
        }
    );
    assert!(site.find("/mypage/home").is_some());
    assert!(site.find("/olotto/game/execBuy.do").is_none());
    let messages = notifier.messages();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].contains("Purchase skipped"));
    assert!(messages[0].contains("could not be read"));
}

#[test]
fn check_and_buy_skips_when_balance_is_short() {
    let site = FakeSite::start(SiteBehavior {
        purchase_page: PURCHASE_PAGE_LOW_BALANCE,
        ..SiteBehavior::default()
    });
    let dir = TempDir::new().unwrap();
    let notifier = SharedNotifier::default();
    let env = env(&site, &dir, &notifier, 5);

    let summary = tasks::check_balance_and_buy(&[account(PASSWORD)], &env);
    assert_eq!(summary.failed, 1);
    assert!(site.find("/olotto/game/egovUserReadySocket.json").is_none());
    assert!(site.find("/olotto/game/execBuy.do").is_none());
    let messages = notifier.messages();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].contains("Balance 3,000 won is below the required 5,000 won"));
    assert!(env.ledger.load().unwrap().is_none());
}

#[test]
fn check_and_buy_buys_when_balance_covers() {
    let site = FakeSite::start(SiteBehavior::default());
    let dir = TempDir::new().unwrap();
    let notifier = SharedNotifier::default();
    let env = env(&site, &dir, &notifier, 2);

    let summary = tasks::check_balance_and_buy(&[account(PASSWORD)], &env);
    assert_eq!(summary.succeeded, 1);
    assert!(site.find("/olotto/game/execBuy.do").is_some());
    let messages = notifier.messages();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].contains("Purchase complete"));
}

#[test]
fn balance_check_reports_unreadable_balance() {
    let site = FakeSite::start(SiteBehavior {
        purchase_page: PURCHASE_PAGE_WITHOUT_BALANCE,
        ..SiteBehavior::default()
    });
    let dir = TempDir::new().unwrap();
    let notifier = SharedNotifier::default();
    let env = env(&site, &dir, &notifier, 1);

    let summary = tasks::check_balance(&[account(PASSWORD)], &env);
    assert_eq!(
        summary,
        TaskSummary {
            succeeded: 0,
            failed: 1
        }
    );
    assert!(site.find("/mypage/home").is_some());
    let messages = notifier.messages();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].contains("Balance unavailable"));
}

#[test]
fn dry_run_inspects_without_buying_or_notifying() {
    let site = FakeSite::start(SiteBehavior::default());
    let dir = TempDir::new().unwrap();
    let notifier = SharedNotifier::default();
    let env = env(&site, &dir, &notifier, 5);

    let summary = tasks::dry_run(&[account(PASSWORD)], &env);
    assert_eq!(
        summary,
        TaskSummary {
            succeeded: 1,
            failed: 0
        }
    );
    assert!(site.find("/login/securityLoginCheck.do").is_some());
    assert!(site.find("/game/TotalGame.jsp").is_some());
    assert!(site.find("/olotto/game/egovUserReadySocket.json").is_none());
    assert!(site.find("/olotto/game/execBuy.do").is_none());
    assert!(notifier.messages().is_empty());
    assert!(env.ledger.load().unwrap().is_none());
}
