//! Session cookie jar.
//!
//! A project keeps one [`Session`] shared by single sends and flow steps. Before
//! every send the matching cookies are attached as a `Cookie` header; after every
//! send, `Set-Cookie` headers from the response are absorbed. Cookies are keyed by
//! `(domain, path, name)`, so a newer cookie replaces an older one with the same
//! key.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use url::Url;

use crate::models::{HttpRequest, HttpResponse};

/// A single HTTP cookie.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cookie {
    /// Cookie name.
    pub name: String,
    /// Cookie value.
    pub value: String,
    /// Domain the cookie belongs to, lower-cased and without a leading dot.
    pub domain: String,
    /// Path the cookie applies to.
    #[serde(default = "default_path")]
    pub path: String,
    /// Expiration time (None for session cookies).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<DateTime<Utc>>,
    /// HttpOnly flag.
    #[serde(default)]
    pub http_only: bool,
    /// Secure flag.
    #[serde(default)]
    pub secure: bool,
    /// When the cookie was received.
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

fn default_path() -> String {
    "/".to_string()
}

impl Cookie {
    /// Create a new cookie valid for the whole domain.
    pub fn new(name: impl Into<String>, value: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: domain.into().trim_start_matches('.').to_lowercase(),
            path: default_path(),
            expires: None,
            http_only: false,
            secure: false,
            created_at: Utc::now(),
        }
    }

    /// Set the path.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Set the expiration.
    #[must_use]
    pub fn with_expires(mut self, expires: DateTime<Utc>) -> Self {
        self.expires = Some(expires);
        self
    }

    /// Set Secure flag.
    #[must_use]
    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Check if the cookie has expired at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires.is_some_and(|exp| exp <= now)
    }

    /// Check if the cookie applies to a URL.
    pub fn applies_to(&self, url: &Url) -> bool {
        if self.secure && url.scheme() != "https" {
            return false;
        }

        let Some(host) = url.host_str() else {
            return false;
        };

        domain_matches(&self.domain, host) && path_matches(&self.path, url.path())
    }

    /// Parse from a Set-Cookie header received for `request_url`.
    ///
    /// Returns `None` when the header has no `name=value` pair or names a domain
    /// the request host does not belong to.
    pub fn from_set_cookie(header: &str, request_url: &Url) -> Option<Self> {
        let host = request_url.host_str()?;
        let mut parts = header.split(';');

        let (name, value) = parts.next()?.split_once('=')?;
        let name = name.trim();
        if name.is_empty() {
            return None;
        }

        let mut cookie = Cookie::new(name, value.trim().trim_matches('"'), host);
        cookie.path = default_cookie_path(request_url.path());
        let mut max_age = None;

        for part in parts {
            let part = part.trim();
            match part.split_once('=') {
                Some((attr, val)) => {
                    let val = val.trim();
                    match attr.trim().to_lowercase().as_str() {
                        "domain" => {
                            let domain = val.trim_start_matches('.').to_lowercase();
                            if !domain_matches(&domain, host) {
                                return None;
                            }
                            cookie.domain = domain;
                        }
                        "path" if val.starts_with('/') => cookie.path = val.to_string(),
                        "expires" => {
                            if let Ok(exp) = DateTime::parse_from_rfc2822(val) {
                                cookie.expires = Some(exp.with_timezone(&Utc));
                            }
                        }
                        "max-age" => max_age = val.parse::<i64>().ok(),
                        _ => {}
                    }
                }
                None => match part.to_lowercase().as_str() {
                    "httponly" => cookie.http_only = true,
                    "secure" => cookie.secure = true,
                    _ => {}
                },
            }
        }

        // Max-Age wins over Expires; zero or negative expires now, an
        // unrepresentable one never does
        if let Some(secs) = max_age {
            cookie.expires = if secs <= 0 {
                Some(cookie.created_at)
            } else {
                ChronoDuration::try_seconds(secs)
                    .and_then(|age| cookie.created_at.checked_add_signed(age))
            };
        }

        Some(cookie)
    }

    /// Format for the Cookie header.
    pub fn to_cookie_header(&self) -> String {
        format!("{}={}", self.name, self.value)
    }

    fn key(&self) -> CookieKey {
        CookieKey {
            domain: self.domain.clone(),
            path: self.path.clone(),
            name: self.name.clone(),
        }
    }
}

/// Default cookie path: the request path up to, not including, its last slash.
fn default_cookie_path(request_path: &str) -> String {
    match request_path.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(idx) => request_path[..idx].to_string(),
    }
}

fn domain_matches(cookie_domain: &str, host: &str) -> bool {
    let host = host.to_lowercase();
    host == cookie_domain || host.ends_with(&format!(".{}", cookie_domain))
}

fn path_matches(cookie_path: &str, request_path: &str) -> bool {
    if request_path == cookie_path {
        return true;
    }
    request_path.starts_with(cookie_path)
        && (cookie_path.ends_with('/') || request_path[cookie_path.len()..].starts_with('/'))
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct CookieKey {
    domain: String,
    path: String,
    name: String,
}

/// Cookie jar shared by every send in a project.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    cookies: BTreeMap<CookieKey, Cookie>,
}

impl Serialize for Session {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct Wire<'a> {
            cookies: Vec<&'a Cookie>,
        }
        Wire {
            cookies: self.cookies.values().collect(),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Session {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct Wire {
            #[serde(default)]
            cookies: Vec<Cookie>,
        }
        let wire = Wire::deserialize(deserializer)?;
        let mut session = Session::new();
        for cookie in wire.cookies {
            session.insert(cookie);
        }
        Ok(session)
    }
}

impl Session {
    /// Create an empty session.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a cookie. An already expired cookie removes its key instead.
    pub fn insert(&mut self, cookie: Cookie) {
        let key = cookie.key();
        if cookie.is_expired_at(Utc::now()) {
            self.cookies.remove(&key);
        } else {
            self.cookies.insert(key, cookie);
        }
    }

    /// All cookies, ordered by domain, path and name.
    pub fn cookies(&self) -> impl Iterator<Item = &Cookie> {
        self.cookies.values()
    }

    /// Get the total number of cookies.
    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    /// Check if the jar is empty.
    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    /// Clear all cookies.
    pub fn clear(&mut self) {
        self.cookies.clear();
    }

    /// Builds the Cookie header value for a URL.
    ///
    /// Longer paths come first, as browsers send them.
    pub fn cookie_header(&self, url: &str) -> Option<String> {
        let url = Url::parse(url).ok()?;
        let now = Utc::now();

        let mut matching: Vec<&Cookie> = self
            .cookies
            .values()
            .filter(|c| !c.is_expired_at(now) && c.applies_to(&url))
            .collect();
        if matching.is_empty() {
            return None;
        }

        matching.sort_by(|a, b| b.path.len().cmp(&a.path.len()));
        Some(
            matching
                .iter()
                .map(|c| c.to_cookie_header())
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    /// Attaches matching cookies to a rendered request.
    ///
    /// A `Cookie` header set explicitly by the template is left alone.
    pub fn attach(&self, request: &mut HttpRequest) {
        if request.header("cookie").is_some() {
            return;
        }
        if let Some(value) = self.cookie_header(&request.url) {
            log::debug!("attaching session cookies to {}", request.url);
            request.add_header("Cookie", value);
        }
    }

    /// Absorbs every `Set-Cookie` header of a response received for `url`.
    ///
    /// Returns the number of cookies stored or replaced.
    pub fn absorb(&mut self, url: &str, response: &HttpResponse) -> usize {
        let Ok(url) = Url::parse(url) else {
            return 0;
        };

        let mut stored = 0;
        for header in response.header_values("set-cookie") {
            match Cookie::from_set_cookie(header, &url) {
                Some(cookie) => {
                    log::debug!("session cookie {} for {}", cookie.name, cookie.domain);
                    self.insert(cookie);
                    stored += 1;
                }
                None => log::warn!("ignoring malformed Set-Cookie header from {}", url),
            }
        }
        stored
    }

    /// Removes expired cookies and cookies received longer than `lifetime` ago.
    pub fn prune(&mut self, lifetime: Duration, now: DateTime<Utc>) {
        let lifetime = ChronoDuration::from_std(lifetime).unwrap_or(ChronoDuration::MAX);
        self.cookies.retain(|_, cookie| {
            !cookie.is_expired_at(now)
                && now.signed_duration_since(cookie.created_at) <= lifetime
        });
    }
}
