//! Response classification
//!
//! Turns the raw outcome of a probe (HTTP status plus body) into an
//! [`Outcome`]. The status code alone cannot tell a wrong key from a key that
//! is valid but blocked from the service, or from a project without billing.
//! Google encodes the real reason in the error body, so the classifier reads
//! the structured error fields first and only falls back to message phrases.
//!
//! Two error formats are recognised:
//!
//! - The standard Google API error: `{"error": {"code", "message", "status",
//!   "details": [{"reason"}], "errors": [{"reason"}]}}`
//! - The Maps web service format, which answers HTTP 200 with a top-level
//!   `status` (`REQUEST_DENIED`, `OVER_QUERY_LIMIT`, ...) and `error_message`

use super::http::truncate_chars;
use serde::Serialize;
use serde_json::Value;
use std::fmt;

/// Access outcome of a single probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Key accepted and the service answered
    Accessible,
    /// HTTP 429 or quota exhausted; the key got past auth, but this is inconclusive
    RateLimited,
    /// Key is valid but the API is not enabled or the key is restricted to other APIs
    ScopeBlocked,
    /// Key is valid and the API enabled, but billing is not configured
    BillingBlocked,
    /// Key itself was rejected
    InvalidKey,
    /// Access refused without a recognised reason
    Denied,
    /// Transport failure or timeout
    Unreachable,
    /// Response did not fit any known pattern
    Unknown,
}

impl Outcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Accessible => "Accessible",
            Self::RateLimited => "Rate-limited (inconclusive)",
            Self::ScopeBlocked => "Blocked (key lacks scope)",
            Self::BillingBlocked => "Blocked (billing required)",
            Self::InvalidKey => "Invalid key",
            Self::Denied => "Blocked (access denied)",
            Self::Unreachable => "Unreachable",
            Self::Unknown => "Unknown",
        }
    }

    /// Short upper-case tag for one-line output
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Accessible => "ACCESSIBLE",
            Self::RateLimited => "RATE-LIMITED",
            Self::ScopeBlocked => "BLOCKED",
            Self::BillingBlocked => "NO-BILLING",
            Self::InvalidKey => "INVALID-KEY",
            Self::Denied => "DENIED",
            Self::Unreachable => "UNREACHABLE",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Whether the key can (probably) use the service. Rate-limited counts,
    /// since a quota error is only returned after the key was accepted.
    pub fn is_accessible(&self) -> bool {
        matches!(self, Self::Accessible | Self::RateLimited)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Result of classifying one response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub outcome: Outcome,
    /// Structured reason (`API_KEY_SERVICE_BLOCKED`, `REQUEST_DENIED`, ...)
    pub reason: Option<String>,
    /// Error message from the body, or a note from the classifier
    pub message: Option<String>,
}

impl Classification {
    fn new(outcome: Outcome, signal: &ErrorSignal, reason: Option<String>) -> Self {
        Self {
            outcome,
            reason: reason.or_else(|| signal.primary_reason()),
            message: signal.message.clone(),
        }
    }

    fn with_note(mut self, note: &str) -> Self {
        if self.message.is_none() {
            self.message = Some(note.to_string());
        }
        self
    }
}

/// Kind of problem an error body points at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ErrorKind {
    InvalidKey,
    Billing,
    Scope,
    Quota,
}

impl ErrorKind {
    /// Checked in this order: an invalid key trumps everything else
    const PRIORITY: [ErrorKind; 4] = [Self::InvalidKey, Self::Billing, Self::Scope, Self::Quota];

    fn reasons(self) -> &'static [&'static str] {
        match self {
            Self::InvalidKey => &["API_KEY_INVALID", "API_KEY_EXPIRED", "keyInvalid", "keyExpired"],
            Self::Billing => &["BILLING_DISABLED", "BILLING_NOT_ENABLED", "billingNotEnabled"],
            Self::Scope => &[
                "API_KEY_SERVICE_BLOCKED",
                "API_KEY_HTTP_REFERRER_BLOCKED",
                "API_KEY_IP_ADDRESS_BLOCKED",
                "API_KEY_ANDROID_APP_BLOCKED",
                "API_KEY_IOS_APP_BLOCKED",
                "SERVICE_DISABLED",
                "accessNotConfigured",
                "ipRefererBlocked",
            ],
            Self::Quota => &[
                "RATE_LIMIT_EXCEEDED",
                "RESOURCE_EXHAUSTED",
                "rateLimitExceeded",
                "userRateLimitExceeded",
                "dailyLimitExceeded",
                "quotaExceeded",
            ],
        }
    }

    /// Lower-case message fragments, used when no structured reason matched
    fn phrases(self) -> &'static [&'static str] {
        match self {
            Self::InvalidKey => &[
                "api key not valid",
                "invalid api key",
                "api key is invalid",
                "api key expired",
                "api key is expired",
            ],
            Self::Billing => &[
                "enable billing",
                "billing to be enabled",
                "billing account",
                "billing has not been enabled",
                "billing is not enabled",
                "billing is disabled",
            ],
            Self::Scope => &[
                "has not been used in project",
                "api is not enabled",
                "is not enabled",
                "not authorized to use this",
                "cannot be used with this api",
                "are blocked",
            ],
            Self::Quota => &["quota", "rate limit"],
        }
    }
}

/// Maps statuses that mean the request never got served
const LEGACY_ERROR_STATUSES: &[&str] = &[
    "REQUEST_DENIED",
    "OVER_QUERY_LIMIT",
    "OVER_DAILY_LIMIT",
    "RESOURCE_EXHAUSTED",
];

/// google.rpc statuses returned when the key passed and the probe payload was rejected
const PAYLOAD_REJECTED_STATUSES: &[&str] = &["INVALID_ARGUMENT", "FAILED_PRECONDITION"];

/// Legacy `errors[].reason` values with the same meaning
const PAYLOAD_REJECTED_REASONS: &[&str] = &["badRequest", "invalid", "required", "invalidParameter"];

/// Plain-text error bodies kept as the message
const MAX_TEXT_MESSAGE_LENGTH: usize = 300;

/// Error fields pulled out of a response body
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct ErrorSignal {
    /// Body has an `error` member
    error_present: bool,
    code: Option<i64>,
    /// google.rpc status, e.g. `PERMISSION_DENIED`
    rpc_status: Option<String>,
    /// `details[].reason` first, then legacy `errors[].reason`
    reasons: Vec<String>,
    message: Option<String>,
    /// Maps top-level `status`
    legacy_status: Option<String>,
}

impl ErrorSignal {
    fn from_json(json: &Value) -> Self {
        let mut signal = Self::default();

        match json.get("error") {
            Some(Value::Object(error)) => {
                signal.error_present = true;
                signal.code = error.get("code").and_then(Value::as_i64);
                signal.rpc_status = error.get("status").and_then(Value::as_str).map(String::from);
                signal.message = error.get("message").and_then(Value::as_str).map(String::from);

                for list in ["details", "errors"] {
                    let reasons = error
                        .get(list)
                        .and_then(Value::as_array)
                        .into_iter()
                        .flatten()
                        .filter_map(|entry| entry.get("reason").and_then(Value::as_str));
                    signal.reasons.extend(reasons.map(String::from));
                }
            }
            Some(Value::String(message)) => {
                signal.error_present = true;
                signal.message = Some(message.clone());
            }
            _ => {}
        }

        signal.legacy_status = json.get("status").and_then(Value::as_str).map(String::from);

        if signal.message.is_none() {
            signal.message = ["error_message", "errorMessage"]
                .iter()
                .find_map(|field| json.get(*field).and_then(Value::as_str))
                .map(String::from);
        }

        signal
    }

    /// Plain-text error bodies, e.g. the Static Maps refusal page
    fn from_text(body: &[u8]) -> Self {
        let text = String::from_utf8_lossy(body);
        let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
        Self {
            message: Some(truncate_chars(&text, MAX_TEXT_MESSAGE_LENGTH)).filter(|m| !m.is_empty()),
            ..Self::default()
        }
    }

    fn has_error(&self) -> bool {
        self.error_present
            || self
                .legacy_status
                .as_deref()
                .is_some_and(|s| LEGACY_ERROR_STATUSES.contains(&s))
    }

    fn legacy_status_is(&self, candidates: &[&str]) -> bool {
        self.legacy_status.as_deref().is_some_and(|s| candidates.contains(&s))
    }

    fn primary_reason(&self) -> Option<String> {
        self.reasons
            .first()
            .or(self.rpc_status.as_ref())
            .or(self.legacy_status.as_ref().filter(|_| self.has_error()))
            .cloned()
    }

    /// Find what the error points at: structured reasons first, then message phrases
    fn detect(&self) -> Option<(ErrorKind, Option<String>)> {
        for kind in ErrorKind::PRIORITY {
            let matched = self
                .reasons
                .iter()
                .chain(self.rpc_status.iter())
                .find(|r| kind.reasons().contains(&r.as_str()));
            if let Some(reason) = matched {
                return Some((kind, Some(reason.clone())));
            }
        }

        let message = self.message.as_deref()?.to_lowercase();
        ErrorKind::PRIORITY
            .into_iter()
            .find(|kind| kind.phrases().iter().any(|p| message.contains(p)))
            .map(|kind| (kind, None))
    }

    fn payload_rejected(&self) -> bool {
        self.rpc_status
            .as_deref()
            .is_some_and(|s| PAYLOAD_REJECTED_STATUSES.contains(&s))
            || self
                .reasons
                .iter()
                .any(|r| PAYLOAD_REJECTED_REASONS.contains(&r.as_str()))
    }
}

fn outcome_for(kind: ErrorKind) -> Outcome {
    match kind {
        ErrorKind::InvalidKey => Outcome::InvalidKey,
        ErrorKind::Billing => Outcome::BillingBlocked,
        ErrorKind::Scope => Outcome::ScopeBlocked,
        ErrorKind::Quota => Outcome::RateLimited,
    }
}

/// Classify a probe response.
///
/// `expects_json` tells whether a successful response should carry a JSON
/// body. Binary endpoints (static maps) answer with an image on success.
pub fn classify(status: u16, body: &[u8], expects_json: bool) -> Classification {
    let json: Option<Value> = serde_json::from_slice(body).ok();
    let signal = match &json {
        Some(json) => ErrorSignal::from_json(json),
        None if (200..=299).contains(&status) => ErrorSignal::default(),
        None => ErrorSignal::from_text(body),
    };
    let detected = signal.detect();

    match status {
        429 => {
            let reason = detected.and_then(|(_, r)| r);
            Classification::new(Outcome::RateLimited, &signal, reason)
        }
        200..=299 => classify_success(json.is_some(), expects_json, &signal, detected),
        400 | 401 | 403 => classify_rejection(status, json.is_some(), &signal, detected),
        _ => Classification::new(Outcome::Unknown, &signal, None)
            .with_note(&format!("Unexpected HTTP status {}", status)),
    }
}

fn classify_success(
    is_json: bool,
    expects_json: bool,
    signal: &ErrorSignal,
    detected: Option<(ErrorKind, Option<String>)>,
) -> Classification {
    if !is_json {
        return if expects_json {
            Classification::new(Outcome::Unknown, signal, None)
                .with_note("Non-JSON response where JSON was expected")
        } else {
            Classification::new(Outcome::Accessible, signal, None)
        };
    }

    if !signal.has_error() {
        return Classification::new(Outcome::Accessible, signal, None);
    }

    if let Some((kind, reason)) = detected {
        return Classification::new(outcome_for(kind), signal, reason);
    }

    if signal.legacy_status_is(&["OVER_QUERY_LIMIT", "OVER_DAILY_LIMIT", "RESOURCE_EXHAUSTED"]) {
        return Classification::new(Outcome::RateLimited, signal, None);
    }
    if signal.legacy_status_is(&["REQUEST_DENIED"]) || matches!(signal.code, Some(401 | 403)) {
        return Classification::new(Outcome::Denied, signal, None);
    }

    Classification::new(Outcome::Unknown, signal, None)
        .with_note("Error field in a successful response")
}

fn classify_rejection(
    status: u16,
    is_json: bool,
    signal: &ErrorSignal,
    detected: Option<(ErrorKind, Option<String>)>,
) -> Classification {
    if let Some((kind, reason)) = detected {
        return Classification::new(outcome_for(kind), signal, reason);
    }

    match status {
        400 if signal.payload_rejected() => Classification::new(Outcome::Accessible, signal, None)
            .with_note("Key accepted; probe payload rejected"),
        401 | 403 if is_json => Classification::new(Outcome::Denied, signal, None),
        _ => Classification::new(Outcome::Unknown, signal, None)
            .with_note(&format!("Unrecognised HTTP {} response", status)),
    }
}
