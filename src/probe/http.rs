//! HTTP transport for probe requests

use crate::catalog::{ProbeMethod, ServiceDescriptor};
use anyhow::{Context, Result};
use reqwest::Client;
use std::time::Duration;
use url::Url;

/// Default bound for a single probe request
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default User-Agent header
pub const DEFAULT_USER_AGENT: &str = concat!("gcp-keyprobe/", env!("CARGO_PKG_VERSION"));

/// Maximum length of response body to log (to avoid logging sensitive data)
const MAX_LOG_BODY_LENGTH: usize = 200;

/// Truncate to at most `max` characters, noting the original size
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!("{}... [truncated, {} bytes total]", &text[..cut], text.len()),
        None => text.to_string(),
    }
}

/// Sanitize response body for logging
/// Truncates long responses and strips control characters
fn sanitize_for_log(body: &str) -> String {
    truncate_chars(body, MAX_LOG_BODY_LENGTH).replace(|c: char| !c.is_ascii_graphic() && c != ' ', "")
}

/// Mask an API key for display: first 8 and last 4 characters, or `***` for short keys
pub fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 12 {
        return "***".to_string();
    }
    let head: String = chars[..8].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}

/// Raw response of one probe
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

/// HTTP client wrapper for probe requests
#[derive(Clone)]
pub struct ProbeHttpClient {
    client: Client,
    base_url: Option<Url>,
    timeout: Duration,
}

impl ProbeHttpClient {
    /// Create a new HTTP client with a per-request timeout
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: None,
            timeout,
        })
    }

    /// Send every probe to `base` instead of the service's own origin.
    /// The endpoint path is kept.
    pub fn with_base_url(mut self, base: &str) -> Result<Self> {
        let base = Url::parse(base).with_context(|| format!("Invalid base URL: {}", base))?;
        self.base_url = Some(base);
        Ok(self)
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn build_url(&self, descriptor: &ServiceDescriptor, key_value: &str) -> Result<Url> {
        let endpoint = Url::parse(&descriptor.url)
            .with_context(|| format!("Invalid endpoint URL for {}", descriptor.key))?;

        let mut url = match &self.base_url {
            Some(base) => base
                .join(endpoint.path())
                .with_context(|| format!("Cannot rebase endpoint for {}", descriptor.key))?,
            None => endpoint,
        };

        url.query_pairs_mut()
            .extend_pairs(descriptor.params.iter())
            .append_pair(&descriptor.key_param, key_value);

        Ok(url)
    }

    /// Full request URL, key included
    pub fn request_url(&self, descriptor: &ServiceDescriptor, api_key: &str) -> Result<Url> {
        self.build_url(descriptor, api_key)
    }

    /// Request URL with the key masked, safe for logs and reports
    pub fn display_url(&self, descriptor: &ServiceDescriptor, api_key: &str) -> String {
        match self.build_url(descriptor, &mask_key(api_key)) {
            Ok(url) => url.to_string(),
            Err(_) => descriptor.url.clone(),
        }
    }

    /// Send the probe request for a service
    pub async fn send(&self, descriptor: &ServiceDescriptor, api_key: &str) -> Result<RawResponse> {
        let url = self.request_url(descriptor, api_key)?;
        tracing::debug!(
            "{} {}",
            descriptor.method.as_str(),
            self.display_url(descriptor, api_key)
        );

        let request = match descriptor.method {
            ProbeMethod::Get => self.client.get(url),
            ProbeMethod::Post => {
                let request = self.client.post(url);
                match &descriptor.body {
                    Some(body) => request.json(body),
                    None => request,
                }
            }
        };

        let response = request.send().await.context("Failed to send request")?;

        let status = response.status();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                let value = value.to_str().unwrap_or("<non-ascii>");
                (name.to_string(), value.to_string())
            })
            .collect();
        let body = response
            .bytes()
            .await
            .context("Failed to read response body")?
            .to_vec();

        if !status.is_success() {
            tracing::debug!(
                "API error: {} - {}",
                status,
                sanitize_for_log(&String::from_utf8_lossy(&body))
            );
        }

        Ok(RawResponse {
            status: status.as_u16(),
            headers,
            body,
        })
    }
}

/// Display text of a reqwest error without the request URL it carries
fn describe_without_url(error: &reqwest::Error) -> String {
    let text = error.to_string();
    match error.url() {
        Some(url) => text.replace(&format!(" for url ({})", url), ""),
        None => text,
    }
}

/// Format a transport error for display
/// Security: reqwest errors are rendered without their URL, then any raw or
/// percent-encoded copy of the key left in the text is masked
pub fn format_transport_error(error: &anyhow::Error, timeout: Duration, api_key: &str) -> String {
    let reqwest_error = error
        .chain()
        .find_map(|cause| cause.downcast_ref::<reqwest::Error>());

    let message = match reqwest_error {
        Some(e) if e.is_timeout() => format!("Request timed out after {}s", timeout.as_secs_f32()),
        Some(e) if e.is_connect() => {
            let root = error.root_cause();
            let root = match root.downcast_ref::<reqwest::Error>() {
                Some(e) => describe_without_url(e),
                None => root.to_string(),
            };
            format!("Connection error: {}", root)
        }
        Some(e) if e.is_body() || e.is_decode() => "Failed to read response body".to_string(),
        _ => error
            .chain()
            .map(|cause| match cause.downcast_ref::<reqwest::Error>() {
                Some(e) => describe_without_url(e),
                None => cause.to_string(),
            })
            .collect::<Vec<_>>()
            .join(": "),
    };

    mask_key_in(&message, api_key)
}

fn mask_key_in(text: &str, api_key: &str) -> String {
    if api_key.is_empty() {
        return text.to_string();
    }
    let masked = mask_key(api_key);
    let encoded: String = url::form_urlencoded::byte_serialize(api_key.as_bytes()).collect();
    text.replace(api_key, &masked).replace(&encoded, &masked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::get_service;

    fn client() -> ProbeHttpClient {
        ProbeHttpClient::new(DEFAULT_TIMEOUT, DEFAULT_USER_AGENT).unwrap()
    }

    #[test]
    fn test_mask_key_long() {
        assert_eq!(mask_key("AIzaSyA1234567890abcdef"), "AIzaSyA1...cdef");
    }

    #[test]
    fn test_mask_key_short() {
        assert_eq!(mask_key(""), "***");
        assert_eq!(mask_key("123456789012"), "***");
    }

    #[test]
    fn test_mask_key_multibyte() {
        assert_eq!(mask_key("ééééééééééééé"), "éééééééé...éééé");
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("short", 10), "short");
        let long = "a".repeat(300);
        let truncated = truncate_chars(&long, 200);
        assert!(truncated.starts_with(&"a".repeat(200)));
        assert!(truncated.contains("300 bytes total"));
    }

    #[test]
    fn test_sanitize_for_log_strips_control_chars() {
        assert_eq!(sanitize_for_log("a\nb\tc d"), "abc d");
    }

    #[test]
    fn test_request_url_carries_params_and_key() {
        let geocoding = get_service("maps-geocoding").unwrap();
        let url = client().request_url(geocoding, "my-key").unwrap();

        assert_eq!(url.host_str(), Some("maps.googleapis.com"));
        assert_eq!(url.path(), "/maps/api/geocode/json");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("address".to_string(), "1600 Amphitheatre Parkway".to_string())));
        assert_eq!(pairs.last(), Some(&("key".to_string(), "my-key".to_string())));
    }

    #[test]
    fn test_empty_key_is_sent_as_is() {
        let safe_browsing = get_service("safe-browsing").unwrap();
        let url = client().request_url(safe_browsing, "").unwrap();
        assert_eq!(url.query(), Some("key="));
    }

    #[test]
    fn test_base_url_override_keeps_path() {
        let vision = get_service("cloud-vision").unwrap();
        let client = client().with_base_url("http://127.0.0.1:8080").unwrap();
        let url = client.request_url(vision, "k").unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:8080/v1/images:annotate?key=k");
    }

    #[test]
    fn test_display_url_masks_key() {
        let youtube = get_service("youtube-data").unwrap();
        let shown = client().display_url(youtube, "AIzaSyA1234567890abcdef");
        assert!(!shown.contains("AIzaSyA1234567890abcdef"));
        assert!(shown.contains("AIzaSyA1...cdef"));
    }

    #[test]
    fn test_format_transport_error_masks_key() {
        let key = "AIzaSyA1234567890abcdef";
        let error = anyhow::anyhow!("failed for url https://example.com/?key={}", key);
        let message = format_transport_error(&error, DEFAULT_TIMEOUT, key);
        assert!(!message.contains(key));
        assert!(message.contains("AIzaSyA1...cdef"));
    }

    #[test]
    fn test_format_transport_error_masks_encoded_key() {
        let key = "AIza/Secret+Key=0123456789";
        let error = anyhow::anyhow!("failed for url https://example.com/?key=AIza%2FSecret%2BKey%3D0123456789");
        let message = format_transport_error(&error, DEFAULT_TIMEOUT, key);
        assert!(!message.contains("Secret%2BKey"));
        assert!(message.contains(&mask_key(key)));
    }

    #[tokio::test]
    async fn test_connect_error_omits_request_url() {
        let key = "AIza/Secret+Key=0123456789";
        let http = client().with_base_url("http://127.0.0.1:1").unwrap();
        let service = get_service("safe-browsing").unwrap();
        let error = http.send(service, key).await.unwrap_err();
        let message = format_transport_error(&error, DEFAULT_TIMEOUT, key);
        assert!(!message.contains("127.0.0.1:1/"));
        assert!(!message.contains("Secret"));
    }
}
