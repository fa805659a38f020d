//! Key probing
//!
//! Sends one request per service and classifies what comes back.
//!
//! # Module Structure
//!
//! - [`http`] - Request construction, timeout and key masking
//! - [`classify`] - Mapping of status and error body to an [`Outcome`]
//!
//! Probes run strictly one after another. A failing service never stops the
//! run: transport errors become [`Outcome::Unreachable`] results.
//!
//! # Example
//!
//! ```ignore
//! use gcp_keyprobe::catalog::list_services;
//! use gcp_keyprobe::probe::{KeyProber, http::ProbeHttpClient};
//!
//! async fn example() -> anyhow::Result<()> {
//!     let http = ProbeHttpClient::new(http::DEFAULT_TIMEOUT, http::DEFAULT_USER_AGENT)?;
//!     let report = KeyProber::new(http).run_all(&list_services(None), "AIza...").await;
//!     println!("{} accessible", report.accessible().count());
//!     Ok(())
//! }
//! ```

pub mod classify;
pub mod http;

pub use classify::{classify, Classification, Outcome};

use crate::catalog::ServiceDescriptor;
use crate::report::Report;
use http::{format_transport_error, truncate_chars, ProbeHttpClient, RawResponse};
use serde::Serialize;
use serde_json::Value;

/// Body length kept in verbose details
const MAX_DETAIL_BODY_LENGTH: usize = 1000;

/// Header count kept in verbose details
const MAX_DETAIL_HEADERS: usize = 5;

/// Header value length kept in verbose details
const MAX_HEADER_VALUE_LENGTH: usize = 50;

/// Request side of a verbose detail record
#[derive(Debug, Clone, Serialize)]
pub struct RequestDetail {
    pub method: &'static str,
    /// Key masked
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

/// Response side of a verbose detail record
#[derive(Debug, Clone, Serialize)]
pub struct ResponseDetail {
    pub status_code: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

/// Raw request/response data, kept only in verbose mode
#[derive(Debug, Clone, Serialize)]
pub struct ProbeDetail {
    pub request: RequestDetail,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<ResponseDetail>,
}

/// Result of probing one service
#[derive(Debug, Clone)]
pub struct ProbeResult<'a> {
    pub service: &'a ServiceDescriptor,
    pub outcome: Outcome,
    pub http_status: Option<u16>,
    pub reason: Option<String>,
    pub message: Option<String>,
    pub detail: Option<ProbeDetail>,
}

impl<'a> ProbeResult<'a> {
    fn from_response(service: &'a ServiceDescriptor, response: &RawResponse) -> Self {
        let Classification {
            outcome,
            reason,
            message,
        } = classify(response.status, &response.body, service.expects_json());

        Self {
            service,
            outcome,
            http_status: Some(response.status),
            reason,
            message,
            detail: None,
        }
    }

    fn unreachable(service: &'a ServiceDescriptor, message: String) -> Self {
        Self {
            service,
            outcome: Outcome::Unreachable,
            http_status: None,
            reason: None,
            message: Some(message),
            detail: None,
        }
    }
}

/// Render a response body for verbose output
fn describe_body(body: &[u8]) -> String {
    if body.is_empty() {
        return String::new();
    }
    match std::str::from_utf8(body) {
        Ok(text) if !text.contains('\0') => truncate_chars(text, MAX_DETAIL_BODY_LENGTH),
        _ => format!("<binary or non-JSON data, {} bytes>", body.len()),
    }
}

fn describe_response(response: &RawResponse) -> ResponseDetail {
    let headers = response
        .headers
        .iter()
        .take(MAX_DETAIL_HEADERS)
        .map(|(name, value)| (name.clone(), truncate_chars(value, MAX_HEADER_VALUE_LENGTH)))
        .collect();

    ResponseDetail {
        status_code: response.status,
        headers,
        body: describe_body(&response.body),
    }
}

/// Runs probes for one API key
#[derive(Clone)]
pub struct KeyProber {
    http: ProbeHttpClient,
    verbose: bool,
}

impl KeyProber {
    pub fn new(http: ProbeHttpClient) -> Self {
        Self {
            http,
            verbose: false,
        }
    }

    /// Keep request/response details in every result
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Probe a single service. Never fails: transport errors are an outcome.
    pub async fn probe<'a>(&self, service: &'a ServiceDescriptor, api_key: &str) -> ProbeResult<'a> {
        let mut result = match self.http.send(service, api_key).await {
            Ok(response) => {
                let mut result = ProbeResult::from_response(service, &response);
                if self.verbose {
                    result.detail = Some(ProbeDetail {
                        request: self.describe_request(service, api_key),
                        response: Some(describe_response(&response)),
                    });
                }
                result
            }
            Err(e) => {
                let message = format_transport_error(&e, self.http.timeout(), api_key);
                tracing::warn!("{} unreachable: {}", service.name, message);
                ProbeResult::unreachable(service, message)
            }
        };

        if self.verbose && result.detail.is_none() {
            result.detail = Some(ProbeDetail {
                request: self.describe_request(service, api_key),
                response: None,
            });
        }

        tracing::info!(
            "{}: {} (status={:?}, reason={:?})",
            service.key,
            result.outcome.label(),
            result.http_status,
            result.reason
        );

        result
    }

    /// Probe every service in order, one request at a time
    pub async fn run_all<'a>(&self, services: &[&'a ServiceDescriptor], api_key: &str) -> Report<'a> {
        let mut report = Report::new();
        tracing::info!("Probing {} services (run {})", services.len(), report.run_id);

        for &service in services {
            let result = self.probe(service, api_key).await;
            report.push(result);
        }

        report
    }

    fn describe_request(&self, service: &ServiceDescriptor, api_key: &str) -> RequestDetail {
        RequestDetail {
            method: service.method.as_str(),
            url: self.http.display_url(service, api_key),
            body: service.body.clone(),
        }
    }
}
