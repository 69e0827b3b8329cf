use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Outcome category of a single endpoint check.
///
/// Categories are mutually exclusive and ordered by evaluation precedence:
/// DNS resolution, TLS validation, HTTP fetch, content assertion. `Content`
/// serializes and displays as `"String"` so persisted status vocabulary
/// matches existing records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "DNS")]
    Dns,
    #[serde(rename = "SSL")]
    Ssl,
    #[serde(rename = "HTTP")]
    Http,
    #[serde(rename = "String")]
    Content,
    Timeout,
    Error,
}

impl Category {
    /// Every category except `Ok`.
    pub fn is_failure(self) -> bool {
        !matches!(self, Category::Ok)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Category::Ok => write!(f, "OK"),
            Category::Dns => write!(f, "DNS"),
            Category::Ssl => write!(f, "SSL"),
            Category::Http => write!(f, "HTTP"),
            Category::Content => write!(f, "String"),
            Category::Timeout => write!(f, "Timeout"),
            Category::Error => write!(f, "Error"),
        }
    }
}

/// Result of evaluating one endpoint: exactly one category, plus a free-form
/// diagnostic (an HTTP status code, a DNS error name, a certificate error).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckOutcome {
    pub category: Category,
    pub detail: String,
}

impl CheckOutcome {
    pub fn ok(detail: impl Into<String>) -> Self {
        Self { category: Category::Ok, detail: detail.into() }
    }

    pub fn fail(category: Category, detail: impl Into<String>) -> Self {
        Self { category, detail: detail.into() }
    }

    pub fn is_ok(&self) -> bool {
        self.category == Category::Ok
    }
}

impl fmt::Display for CheckOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.category, self.detail)
    }
}

/// Read-only snapshot of the check switches and timings. Taken once per
/// engine construction and never mutated mid-batch.
#[derive(Debug, Clone)]
pub struct CheckConfig {
    pub check_dns: bool,
    pub check_ssl: bool,
    pub check_http: bool,
    pub check_content: bool,
    pub request_timeout: Duration,
    /// Client identifier sent on outbound HTTP requests.
    pub user_agent: String,
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self {
            check_dns: true,
            check_ssl: true,
            check_http: true,
            check_content: true,
            request_timeout: Duration::from_secs(10),
            user_agent: concat!("webwatch/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}
