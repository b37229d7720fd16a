//! Redirect following through the session cookie jar.
//!
//! Senders deliver a single hop. Redirects are followed here so that the
//! `Set-Cookie` headers of every hop reach the session, scoped to the URL of
//! the hop that set them, and each hop carries the cookies for its own URL.

use super::{HttpSender, RequestError, SendOutcome};
use crate::config::ProjectSettings;
use crate::models::{HttpMethod, HttpRequest};
use crate::session::Session;
use url::Url;

/// Headers dropped when a redirect leaves the original origin.
const CREDENTIAL_HEADERS: [&str; 3] = ["authorization", "proxy-authorization", "cookie"];

/// Whether and how far redirects are followed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RedirectPolicy {
    /// Follow `Location` on 301, 302, 303, 307 and 308 responses.
    pub follow: bool,
    /// Redirects allowed before the send fails.
    pub max_redirects: u32,
}

impl RedirectPolicy {
    /// Never follow; a redirect response is returned as is.
    pub fn none() -> Self {
        Self {
            follow: false,
            max_redirects: 0,
        }
    }

    /// Follow up to `max_redirects` redirects.
    pub fn limited(max_redirects: u32) -> Self {
        Self {
            follow: true,
            max_redirects,
        }
    }

    /// Reads `followRedirects` and `maxRedirects` from project settings.
    pub fn from_settings(settings: &ProjectSettings) -> Self {
        if settings.follow_redirects {
            Self::limited(settings.max_redirects)
        } else {
            Self::none()
        }
    }
}

impl Default for RedirectPolicy {
    fn default() -> Self {
        Self::limited(10)
    }
}

/// The last response of a send, after any redirects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exchange {
    /// Final response. `send_time` is when the first hop went out.
    pub outcome: SendOutcome,
    /// URL that produced the final response.
    pub final_url: String,
    /// Number of redirects followed.
    pub redirects: u32,
}

fn is_followable(status: u16) -> bool {
    matches!(status, 301 | 302 | 303 | 307 | 308)
}

/// Sends `request`, following redirects under `policy`.
///
/// Session cookies are attached before every hop, unless the request already
/// carries a `Cookie` header, and cookies set by every hop are absorbed, even
/// when a later hop fails.
///
/// # Errors
///
/// Transport errors from any hop, an unparsable `Location`, or
/// [`RequestError::TooManyRedirects`] once the limit is passed.
pub fn send_with_session(
    sender: &dyn HttpSender,
    request: &HttpRequest,
    session: &mut Session,
    policy: RedirectPolicy,
) -> Result<Exchange, RequestError> {
    let mut current = request.clone();
    let mut first_send = None;
    let mut redirects = 0;

    loop {
        let mut hop = current.clone();
        session.attach(&mut hop);
        let outcome = sender.send(&hop)?;
        let send_time = *first_send.get_or_insert(outcome.send_time);

        let absorbed = session.absorb(&hop.url, &outcome.response);
        if absorbed > 0 {
            log::debug!("stored {} cookie(s) from {}", absorbed, hop.url);
        }

        let status = outcome.response.status_code;
        let location = match outcome.response.header("location") {
            Some(location) if policy.follow && is_followable(status) => location.to_string(),
            _ => {
                return Ok(Exchange {
                    outcome: SendOutcome { send_time, ..outcome },
                    final_url: hop.url,
                    redirects,
                })
            }
        };

        if redirects >= policy.max_redirects {
            return Err(RequestError::TooManyRedirects {
                max: policy.max_redirects,
            });
        }

        let next = Url::parse(&current.url)?.join(&location)?;
        log::debug!("{} redirect from {} to {}", status, current.url, next);
        current = redirected(&current, next, status);
        redirects += 1;
    }
}

/// Builds the next hop of a redirect the way browsers do: 303, and 301/302
/// after a POST, become a body-less GET; 307 and 308 repeat the request.
fn redirected(previous: &HttpRequest, next: Url, status: u16) -> HttpRequest {
    let same_origin = Url::parse(&previous.url)
        .map(|url| url.origin() == next.origin())
        .unwrap_or(false);

    let mut request = previous.clone();
    request.url = next.to_string();

    let to_get = (status == 303 && previous.method != HttpMethod::HEAD)
        || (matches!(status, 301 | 302) && previous.method == HttpMethod::POST);
    if to_get {
        request.method = HttpMethod::GET;
        request.body = None;
        request.remove_header("content-type");
        request.remove_header("content-length");
    }

    if !same_origin {
        for name in CREDENTIAL_HEADERS {
            request.remove_header(name);
        }
    }
    request
}
