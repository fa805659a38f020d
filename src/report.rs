//! Probe report
//!
//! Ordered results of one run, plus the human-readable and JSON renderings.

use crate::catalog::Category;
use crate::probe::{Outcome, ProbeDetail, ProbeResult};
use chrono::{DateTime, Utc};
use crossterm::style::{style, Color, Stylize};
use serde::Serialize;
use std::fmt::Write;
use uuid::Uuid;

/// Where to restrict a key that exposes paid services
pub const CREDENTIALS_CONSOLE_URL: &str = "https://console.cloud.google.com/apis/credentials";

const RULE_WIDTH: usize = 70;
const DETAIL_INDENT: &str = "           ";

/// Display order of the outcome breakdown in the summary
const OUTCOME_ORDER: [Outcome; 8] = [
    Outcome::Accessible,
    Outcome::RateLimited,
    Outcome::ScopeBlocked,
    Outcome::BillingBlocked,
    Outcome::InvalidKey,
    Outcome::Denied,
    Outcome::Unreachable,
    Outcome::Unknown,
];

/// Options for the human-readable rendering
#[derive(Debug, Clone, Copy, Default)]
pub struct TextOptions {
    /// Add error text and request/response details under each line
    pub verbose: bool,
    /// ANSI colours
    pub color: bool,
}

fn paint(text: &str, color: Color, enabled: bool) -> String {
    if enabled {
        style(text).with(color).to_string()
    } else {
        text.to_string()
    }
}

fn outcome_color(outcome: Outcome) -> Color {
    match outcome {
        Outcome::Accessible => Color::Green,
        Outcome::RateLimited => Color::Yellow,
        Outcome::ScopeBlocked | Outcome::BillingBlocked | Outcome::InvalidKey | Outcome::Denied => {
            Color::Red
        }
        Outcome::Unreachable | Outcome::Unknown => Color::Magenta,
    }
}

/// Header printed before the probes start
pub fn render_header(service_count: usize) -> String {
    format!(
        "\nTesting Google API key against {} services...\n\n{}\n",
        service_count,
        "-".repeat(RULE_WIDTH)
    )
}

/// Results of one run, in probe order
#[derive(Debug, Clone)]
pub struct Report<'a> {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    results: Vec<ProbeResult<'a>>,
}

impl<'a> Default for Report<'a> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> Report<'a> {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            results: Vec::new(),
        }
    }

    pub fn push(&mut self, result: ProbeResult<'a>) {
        self.results.push(result);
    }

    pub fn results(&self) -> &[ProbeResult<'a>] {
        &self.results
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Results where the key got through (rate-limited included)
    pub fn accessible(&self) -> impl Iterator<Item = &ProbeResult<'a>> {
        self.results.iter().filter(|r| r.outcome.is_accessible())
    }

    pub fn accessible_in(&self, category: Category) -> impl Iterator<Item = &ProbeResult<'a>> {
        self.accessible().filter(move |r| r.service.category == category)
    }

    /// Results restricted to one category, order kept
    pub fn filtered(&self, category: Category) -> impl Iterator<Item = &ProbeResult<'a>> {
        self.results.iter().filter(move |r| r.service.category == category)
    }

    pub fn count(&self, outcome: Outcome) -> usize {
        self.results.iter().filter(|r| r.outcome == outcome).count()
    }

    /// Pretty-printed JSON document of the whole report
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&ReportView::from(self))
    }

    /// Human-readable rendering: one line per service, then the summary
    pub fn render_text(&self, options: TextOptions) -> String {
        let mut out = String::new();

        for result in &self.results {
            render_result(&mut out, result, options);
        }

        let _ = writeln!(out, "{}", "-".repeat(RULE_WIDTH));
        self.render_summary(&mut out, options.color);
        out
    }

    fn render_summary(&self, out: &mut String, color: bool) {
        let rule = "=".repeat(RULE_WIDTH);
        let paid: Vec<_> = self.accessible_in(Category::Paid).collect();
        let free = self.accessible_in(Category::Free).count();

        let _ = writeln!(out, "\n{}\nSUMMARY\n{}", rule, rule);
        let _ = writeln!(out, "Total APIs tested: {}", self.len());
        let _ = writeln!(
            out,
            "{}",
            paint(&format!("Accessible paid services: {}", paid.len()), Color::Green, color)
        );
        let _ = writeln!(out, "Accessible free services: {}", free);

        for outcome in OUTCOME_ORDER {
            let n = self.count(outcome);
            if n > 0 {
                let _ = writeln!(out, "  {}: {}", outcome.label(), n);
            }
        }

        if paid.is_empty() {
            let _ = writeln!(out, "\n{}", paint(&rule, Color::Green, color));
            let _ = writeln!(
                out,
                "{}",
                paint("GOOD NEWS: No paid services are accessible with this API key!", Color::Green, color)
            );
            let _ = writeln!(out, "{}", paint(&rule, Color::Green, color));
            return;
        }

        let bang = "!".repeat(RULE_WIDTH);
        let _ = writeln!(out, "\n{}", paint(&bang, Color::Yellow, color));
        let _ = writeln!(
            out,
            "{}",
            paint(
                "WARNING: The following PAID services are accessible with this API key:",
                Color::Yellow,
                color
            )
        );
        let _ = writeln!(out, "{}\n", paint(&bang, Color::Yellow, color));
        for result in paid {
            let _ = writeln!(out, "  - {}", result.service.name);
            let _ = writeln!(out, "    Cost: {}", result.service.cost_info);
            if result.outcome == Outcome::RateLimited {
                let _ = writeln!(out, "    Note: rate-limited, access is likely but unconfirmed");
            }
        }
        let _ = writeln!(
            out,
            "\n{}",
            paint("Recommendation: Review API restrictions in Google Cloud Console", Color::Yellow, color)
        );
        let _ = writeln!(out, "{}", CREDENTIALS_CONSOLE_URL);
    }
}

fn render_result(out: &mut String, result: &ProbeResult<'_>, options: TextOptions) {
    let service = result.service;
    let tag = paint(
        &format!("[{}]", result.outcome.tag()),
        outcome_color(result.outcome),
        options.color,
    );
    let category = match service.category {
        Category::Paid => paint("[PAID]", Color::Yellow, options.color),
        Category::Free => "[FREE]".to_string(),
    };

    let mut line = format!("{} {} {}: {}", tag, category, service.name, result.outcome.label());
    match (result.http_status, result.reason.as_deref()) {
        (Some(status), Some(reason)) => {
            let _ = write!(line, " (HTTP {}, {})", status, reason);
        }
        (Some(status), None) => {
            let _ = write!(line, " (HTTP {})", status);
        }
        (None, Some(reason)) => {
            let _ = write!(line, " ({})", reason);
        }
        (None, None) => {}
    }
    let _ = writeln!(out, "{}", line);

    if result.outcome.is_accessible() && service.category == Category::Paid {
        let _ = writeln!(out, "{}Cost: {}", DETAIL_INDENT, service.cost_info);
    }

    if !options.verbose {
        return;
    }

    if let Some(message) = &result.message {
        let _ = writeln!(out, "{}Error: {}", DETAIL_INDENT, message);
    }

    if let Some(detail) = &result.detail {
        render_detail(out, detail, options.color);
    }
}

fn render_detail(out: &mut String, detail: &ProbeDetail, color: bool) {
    let _ = writeln!(out, "\n{}{}", DETAIL_INDENT, paint("--- REQUEST ---", Color::Cyan, color));
    let _ = writeln!(out, "{}Method: {}", DETAIL_INDENT, detail.request.method);
    let _ = writeln!(out, "{}URL: {}", DETAIL_INDENT, detail.request.url);
    if let Some(body) = &detail.request.body {
        let _ = writeln!(out, "{}Body: {}", DETAIL_INDENT, body);
    }

    if let Some(response) = &detail.response {
        let _ = writeln!(out, "\n{}{}", DETAIL_INDENT, paint("--- RESPONSE ---", Color::Cyan, color));
        let _ = writeln!(out, "{}Status: {}", DETAIL_INDENT, response.status_code);
        if !response.headers.is_empty() {
            let _ = writeln!(out, "{}Headers:", DETAIL_INDENT);
            for (name, value) in &response.headers {
                let _ = writeln!(out, "{}  {}: {}", DETAIL_INDENT, name, value);
            }
        }
        if !response.body.is_empty() {
            let _ = writeln!(out, "{}Body:", DETAIL_INDENT);
            for line in response.body.lines() {
                let _ = writeln!(out, "{}  {}", DETAIL_INDENT, line);
            }
        }
    }
    let _ = writeln!(out);
}

/// Serialized shape of one result
#[derive(Serialize)]
struct ResultView<'r> {
    service: &'r str,
    key: &'r str,
    category: Category,
    cost_info: &'r str,
    outcome: Outcome,
    outcome_label: &'static str,
    http_status: Option<u16>,
    reason: Option<&'r str>,
    message: Option<&'r str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<&'r ProbeDetail>,
}

/// Serialized shape of the report
#[derive(Serialize)]
struct ReportView<'r> {
    run_id: Uuid,
    started_at: DateTime<Utc>,
    total_tested: usize,
    accessible_paid_services: usize,
    accessible_free_services: usize,
    results: Vec<ResultView<'r>>,
}

impl<'r, 'a> From<&'r Report<'a>> for ReportView<'r> {
    fn from(report: &'r Report<'a>) -> Self {
        let results = report
            .results
            .iter()
            .map(|r| ResultView {
                service: &r.service.name,
                key: &r.service.key,
                category: r.service.category,
                cost_info: &r.service.cost_info,
                outcome: r.outcome,
                outcome_label: r.outcome.label(),
                http_status: r.http_status,
                reason: r.reason.as_deref(),
                message: r.message.as_deref(),
                detail: r.detail.as_ref(),
            })
            .collect();

        Self {
            run_id: report.run_id,
            started_at: report.started_at,
            total_tested: report.len(),
            accessible_paid_services: report.accessible_in(Category::Paid).count(),
            accessible_free_services: report.accessible_in(Category::Free).count(),
            results,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::get_service;
    use serde_json::Value;

    fn result(key: &str, outcome: Outcome, status: Option<u16>) -> ProbeResult<'static> {
        ProbeResult {
            service: get_service(key).unwrap(),
            outcome,
            http_status: status,
            reason: None,
            message: None,
            detail: None,
        }
    }

    fn sample_report() -> Report<'static> {
        let mut report = Report::new();
        report.push(result("maps-geocoding", Outcome::Accessible, Some(200)));
        report.push(result("cloud-vision", Outcome::ScopeBlocked, Some(403)));
        report.push(result("translation", Outcome::RateLimited, Some(429)));
        report.push(result("youtube-data", Outcome::Accessible, Some(200)));
        report.push(result("safe-browsing", Outcome::Unreachable, None));
        report
    }

    #[test]
    fn test_summary_counts() {
        let report = sample_report();
        assert_eq!(report.len(), 5);
        assert_eq!(report.accessible_in(Category::Paid).count(), 2);
        assert_eq!(report.accessible_in(Category::Free).count(), 1);
        assert_eq!(report.count(Outcome::Unreachable), 1);
        assert_eq!(report.filtered(Category::Free).count(), 2);
    }

    #[test]
    fn test_text_has_one_line_per_service() {
        let report = sample_report();
        let text = report.render_text(TextOptions::default());

        let lines: Vec<&str> = text.lines().filter(|l| l.starts_with('[')).collect();
        assert_eq!(lines.len(), 5);
        assert_eq!(
            lines[0],
            "[ACCESSIBLE] [PAID] Maps Geocoding API: Accessible (HTTP 200)"
        );
        assert_eq!(
            lines[1],
            "[BLOCKED] [PAID] Cloud Vision API: Blocked (key lacks scope) (HTTP 403)"
        );
        assert_eq!(lines[4], "[UNREACHABLE] [FREE] Safe Browsing API: Unreachable");
        assert!(!text.contains('\u{1b}'), "no ANSI codes without colour");
    }

    #[test]
    fn test_text_warns_about_paid_services() {
        let text = sample_report().render_text(TextOptions::default());
        assert!(text.contains("WARNING: The following PAID services"));
        assert!(text.contains("    Cost: $5 per 1000 requests"));
        assert!(text.contains(CREDENTIALS_CONSOLE_URL));
    }

    #[test]
    fn test_text_good_news_without_paid_access() {
        let mut report = Report::new();
        report.push(result("youtube-data", Outcome::Accessible, Some(200)));
        let text = report.render_text(TextOptions::default());
        assert!(text.contains("GOOD NEWS"));
    }

    #[test]
    fn test_verbose_text_includes_message() {
        let mut report = Report::new();
        let mut r = result("cloud-vision", Outcome::ScopeBlocked, Some(403));
        r.message = Some("Requests to this API are blocked.".to_string());
        report.push(r);

        let quiet = report.render_text(TextOptions::default());
        assert!(!quiet.contains("Error:"));

        let verbose = report.render_text(TextOptions {
            verbose: true,
            color: false,
        });
        assert!(verbose.contains("Error: Requests to this API are blocked."));
    }

    #[test]
    fn test_colored_text_has_ansi() {
        if std::env::var_os("NO_COLOR").is_some() {
            return;
        }
        let text = sample_report().render_text(TextOptions {
            verbose: false,
            color: true,
        });
        assert!(text.contains('\u{1b}'));
    }

    #[test]
    fn test_json_shape() {
        let report = sample_report();
        let json: Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();

        assert_eq!(json["total_tested"], 5);
        assert_eq!(json["accessible_paid_services"], 2);
        assert_eq!(json["accessible_free_services"], 1);

        let results = json["results"].as_array().unwrap();
        assert_eq!(results.len(), 5);
        assert_eq!(results[0]["service"], "Maps Geocoding API");
        assert_eq!(results[0]["category"], "paid");
        assert_eq!(results[0]["outcome"], "accessible");
        assert_eq!(results[1]["outcome_label"], "Blocked (key lacks scope)");
        assert_eq!(results[4]["http_status"], Value::Null);
        assert!(results[0].get("detail").is_none());
    }
}
