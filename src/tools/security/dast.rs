//! Dynamic check of a live endpoint: one GET, response headers inspected.

use reqwest::header::HeaderMap;

use super::{Severity, Vulnerability};
use crate::types::Result;

struct HeaderRule {
    id: &'static str,
    header: &'static str,
    severity: Severity,
    title: &'static str,
    recommendation: &'static str,
    https_only: bool,
}

const HEADER_RULES: &[HeaderRule] = &[
    HeaderRule {
        id: "QG-DAST-HSTS",
        header: "strict-transport-security",
        severity: Severity::Medium,
        title: "Missing Strict-Transport-Security header",
        recommendation: "Send `Strict-Transport-Security: max-age=31536000; includeSubDomains`.",
        https_only: true,
    },
    HeaderRule {
        id: "QG-DAST-CSP",
        header: "content-security-policy",
        severity: Severity::Medium,
        title: "Missing Content-Security-Policy header",
        recommendation: "Define a restrictive Content-Security-Policy.",
        https_only: false,
    },
    HeaderRule {
        id: "QG-DAST-XCTO",
        header: "x-content-type-options",
        severity: Severity::Low,
        title: "Missing X-Content-Type-Options header",
        recommendation: "Send `X-Content-Type-Options: nosniff`.",
        https_only: false,
    },
    HeaderRule {
        id: "QG-DAST-XFO",
        header: "x-frame-options",
        severity: Severity::Low,
        title: "Missing X-Frame-Options header",
        recommendation: "Send `X-Frame-Options: DENY` or a CSP frame-ancestors directive.",
        https_only: false,
    },
    HeaderRule {
        id: "QG-DAST-REFERRER",
        header: "referrer-policy",
        severity: Severity::Info,
        title: "Missing Referrer-Policy header",
        recommendation: "Send `Referrer-Policy: strict-origin-when-cross-origin`.",
        https_only: false,
    },
];

/// Whether `target` is something the dynamic scan can reach.
pub fn is_url(target: &str) -> bool {
    target.starts_with("http://") || target.starts_with("https://")
}

/// GET `url` and report missing security headers. Transport failures are
/// errors.
pub async fn scan_endpoint(client: &reqwest::Client, url: &str) -> Result<Vec<Vulnerability>> {
    let response = client.get(url).send().await?;
    tracing::debug!("dast: GET {} -> {}", url, response.status());
    Ok(inspect_headers(url, response.headers()))
}

/// Findings for the headers of one response.
pub fn inspect_headers(url: &str, headers: &HeaderMap) -> Vec<Vulnerability> {
    let https = url.starts_with("https://");
    let csp_frames = headers
        .get("content-security-policy")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("frame-ancestors"));

    let mut found: Vec<Vulnerability> = HEADER_RULES
        .iter()
        .filter(|rule| https || !rule.https_only)
        .filter(|rule| !headers.contains_key(rule.header))
        .filter(|rule| !(rule.header == "x-frame-options" && csp_frames))
        .map(|rule| Vulnerability {
            id: Some(rule.id.to_string()),
            severity: rule.severity,
            title: rule.title.to_string(),
            description: Some(format!("{} does not send the {} header", url, rule.header)),
            recommendation: Some(rule.recommendation.to_string()),
            ..Vulnerability::default()
        })
        .collect();

    if let Some(server) = headers.get("server").and_then(|v| v.to_str().ok()) {
        if server.chars().any(|c| c.is_ascii_digit()) {
            found.push(Vulnerability {
                id: Some("QG-DAST-SERVER".to_string()),
                severity: Severity::Info,
                title: "Server header discloses version".to_string(),
                description: Some(format!("Server: {}", server)),
                recommendation: Some("Strip version details from the Server header.".to_string()),
                ..Vulnerability::default()
            });
        }
    }
    found
}
