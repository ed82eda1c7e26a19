//! Per-session cookie store with public-suffix enforcement.
//!
//! A cookie whose `Domain` attribute is a public suffix (`co.kr`, `com`) is
//! rejected unless it names the request host itself, so one site cannot
//! plant cookies that travel to its registry neighbours.

use std::sync::Arc;

use cookie_store::CookieStore;
use publicsuffix::List;
use reqwest_cookie_store::CookieStoreMutex;
use tracing::warn;

/// Shared handle installed as the client's cookie provider.
pub type SessionCookies = Arc<CookieStoreMutex>;

/// Public suffix rules covering the hosts this client talks to.
const PUBLIC_SUFFIXES: &str = "\
// ===BEGIN ICANN DOMAINS===
com
net
org
kr
ac.kr
co.kr
es.kr
go.kr
hs.kr
kg.kr
mil.kr
ms.kr
ne.kr
or.kr
pe.kr
re.kr
sc.kr
busan.kr
chungbuk.kr
chungnam.kr
daegu.kr
daejeon.kr
gangwon.kr
gwangju.kr
gyeongbuk.kr
gyeonggi.kr
gyeongnam.kr
incheon.kr
jeju.kr
jeonbuk.kr
jeonnam.kr
seoul.kr
ulsan.kr
// ===END ICANN DOMAINS===
";

fn public_suffix_list() -> Option<List> {
    match PUBLIC_SUFFIXES.parse::<List>() {
        Ok(list) => Some(list),
        Err(err) => {
            warn!(error = %err, "public suffix rules unusable, cookie domains unchecked");
            None
        },
    }
}

/// Creates an empty store that enforces [`PUBLIC_SUFFIXES`].
#[must_use]
pub fn new_store() -> SessionCookies {
    Arc::new(CookieStoreMutex::new(CookieStore::new(public_suffix_list())))
}

#[cfg(test)]
mod tests {
    use reqwest::Url;
    use reqwest::cookie::CookieStore as _;
    use reqwest::header::HeaderValue;

    use super::*;

    fn set(store: &SessionCookies, header: &'static str, url: &Url) {
        let value = HeaderValue::from_static(header);
        store.set_cookies(&mut std::iter::once(&value), url);
    }

    #[test]
    fn suffix_list_parses() {
        assert!(public_suffix_list().is_some());
    }

    #[test]
    fn cookie_on_a_public_suffix_is_rejected() {
        let store = new_store();
        let site = Url::parse("https://www.dhlottery.co.kr/").unwrap();
        set(&store, "tracker=x; Domain=co.kr; Path=/", &site);

        let neighbour = Url::parse("https://evil.co.kr/").unwrap();
        assert!(store.cookies(&neighbour).is_none());
        assert!(store.cookies(&site).is_none());
    }

    #[test]
    fn cookie_on_the_registrable_domain_is_shared_across_hosts() {
        let store = new_store();
        let site = Url::parse("https://www.dhlottery.co.kr/").unwrap();
        set(&store, "JSESSIONID=abc; Domain=dhlottery.co.kr; Path=/", &site);

        let purchase_host = Url::parse("https://ol.dhlottery.co.kr/olotto/game/game645.do").unwrap();
        let header = store.cookies(&purchase_host).unwrap();
        assert_eq!(header.to_str().unwrap(), "JSESSIONID=abc");

        let neighbour = Url::parse("https://evil.co.kr/").unwrap();
        assert!(store.cookies(&neighbour).is_none());
    }

    #[test]
    fn host_only_cookie_stays_on_its_host() {
        let store = new_store();
        let site = Url::parse("http://127.0.0.1:8080/login").unwrap();
        set(&store, "JSESSIONID=guest; Path=/", &site);

        assert!(store.cookies(&site).is_some());
        let other = Url::parse("http://127.0.0.2:8080/login").unwrap();
        assert!(store.cookies(&other).is_none());
    }
}
