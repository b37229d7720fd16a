//! Native HTTP sender using blocking reqwest.

use super::{ExecutionConfig, HttpSender, SendOutcome};
use crate::executor::error::RequestError;
use crate::models::{HttpMethod, HttpRequest, HttpResponse};
use chrono::Utc;
use reqwest::blocking::Client;
use reqwest::redirect::Policy;
use std::time::Instant;

/// [`HttpSender`] backed by a blocking reqwest client.
///
/// The client is built once and reused, so connections are kept alive across
/// the steps of a flow. Neither redirects nor cookies are handled by reqwest;
/// [`send_with_session`](super::send_with_session) follows redirects hop by hop
/// through the project session.
#[derive(Debug, Clone)]
pub struct ReqwestSender {
    client: Client,
    config: ExecutionConfig,
}

impl ReqwestSender {
    /// Builds a sender from an execution config.
    pub fn new(config: ExecutionConfig) -> Result<Self, RequestError> {
        let client = Client::builder()
            .timeout(config.timeout_duration())
            .redirect(Policy::none())
            .build()
            .map_err(|e| RequestError::BuildError(e.to_string()))?;

        Ok(Self { client, config })
    }

    /// Returns the config the sender was built with.
    pub fn config(&self) -> &ExecutionConfig {
        &self.config
    }
}

fn to_reqwest_method(method: HttpMethod) -> reqwest::Method {
    match method {
        HttpMethod::GET => reqwest::Method::GET,
        HttpMethod::POST => reqwest::Method::POST,
        HttpMethod::PUT => reqwest::Method::PUT,
        HttpMethod::DELETE => reqwest::Method::DELETE,
        HttpMethod::PATCH => reqwest::Method::PATCH,
        HttpMethod::HEAD => reqwest::Method::HEAD,
        HttpMethod::OPTIONS => reqwest::Method::OPTIONS,
        HttpMethod::TRACE => reqwest::Method::TRACE,
        HttpMethod::CONNECT => reqwest::Method::CONNECT,
    }
}

impl HttpSender for ReqwestSender {
    fn send(&self, request: &HttpRequest) -> Result<SendOutcome, RequestError> {
        let url = url::Url::parse(&request.url)?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(RequestError::UnsupportedProtocol(url.scheme().to_string()));
        }

        let mut req_builder = self
            .client
            .request(to_reqwest_method(request.method), url);

        for (name, value) in &self.config.default_headers {
            if request.header(name).is_none() {
                req_builder = req_builder.header(name, value);
            }
        }

        for (name, value) in &request.headers {
            req_builder = req_builder.header(name, value);
        }

        if let Some(body) = &request.body {
            req_builder = req_builder.body(body.clone());
        }

        log::debug!("{} {}", request.method, request.url);
        let send_time = Utc::now();
        let start = Instant::now();

        let response = req_builder.send()?;

        let status = response.status();
        let status_text = status.canonical_reason().unwrap_or("Unknown").to_string();
        let mut http_response = HttpResponse::new(status.as_u16(), status_text);

        for (name, value) in response.headers() {
            match value.to_str() {
                Ok(value) => http_response.add_header(name.as_str(), value),
                Err(_) => log::warn!("dropping non-text response header {}", name),
            }
        }

        let body = response.bytes()?;
        http_response.set_body(body.to_vec());
        http_response.duration = start.elapsed();
        let recv_time = Utc::now();

        log::debug!(
            "{} {} -> {} in {:?}",
            request.method,
            request.url,
            http_response.status_code,
            http_response.duration
        );

        Ok(SendOutcome {
            response: http_response,
            send_time,
            recv_time,
        })
    }
}
