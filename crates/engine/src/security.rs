//! Baseline security posture checks.
//!
//! A fixed battery: TLS in use, plus presence of the common hardening
//! headers. No active scanning; a failed header fetch is recorded as a
//! failed check, never an error.

use std::time::Duration;

use reqwest::header::HeaderMap;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

const REQUIRED_HEADERS: &[&str] = &[
    "x-frame-options",
    "content-security-policy",
    "strict-transport-security",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityCheck {
    pub name: String,
    pub passed: bool,
    pub details: String,
}

#[derive(Clone)]
pub struct SecurityScanner {
    client: Client,
}

impl SecurityScanner {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }

    pub async fn scan(&self, website_url: &str, timeout: Duration) -> Vec<SecurityCheck> {
        debug!("Running security checks for {}", website_url);

        let mut checks = Vec::new();

        match Url::parse(website_url) {
            Ok(url) => {
                let https = url.scheme() == "https";
                checks.push(SecurityCheck {
                    name: "SSL Certificate".to_string(),
                    passed: https,
                    details: if https {
                        "HTTPS enabled".to_string()
                    } else {
                        "Not using HTTPS".to_string()
                    },
                });
            }
            Err(_) => {
                checks.push(SecurityCheck {
                    name: "SSL Certificate".to_string(),
                    passed: false,
                    details: "Invalid URL".to_string(),
                });
            }
        }

        match self.client.head(website_url).timeout(timeout).send().await {
            Ok(response) => checks.extend(header_checks(response.headers())),
            Err(e) => checks.push(SecurityCheck {
                name: "Headers Check".to_string(),
                passed: false,
                details: e.to_string(),
            }),
        }

        checks
    }
}

impl Default for SecurityScanner {
    fn default() -> Self {
        Self::new()
    }
}

fn header_checks(headers: &HeaderMap) -> Vec<SecurityCheck> {
    REQUIRED_HEADERS
        .iter()
        .map(|name| {
            let value = headers.get(*name).and_then(|v| v.to_str().ok());
            SecurityCheck {
                name: canonical_header_name(name),
                passed: value.is_some(),
                details: value.map(str::to_string).unwrap_or_else(|| "Missing".to_string()),
            }
        })
        .collect()
}

fn canonical_header_name(name: &str) -> String {
    name.split('-')
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join("-")
}
