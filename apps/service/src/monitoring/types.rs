use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Transport scheme of a check target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Http,
    Https,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Https => "https",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// HTTP method used to probe a check target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "get",
            HttpMethod::Post => "post",
            HttpMethod::Put => "put",
            HttpMethod::Delete => "delete",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Binary up/down classification of a check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckState {
    Up,
    #[default]
    Down,
}

impl fmt::Display for CheckState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckState::Up => write!(f, "up"),
            CheckState::Down => write!(f, "down"),
        }
    }
}

/// A validated, well-formed check definition.
///
/// Only [`crate::monitoring::validation::validate_check`] produces these from
/// stored records, so anything holding a `CheckSpec` may be probed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckSpec {
    /// 20-character alphanumeric identifier
    pub id: String,

    /// Account key of the owner (phone or e-mail)
    pub owner_id: String,

    pub protocol: Protocol,

    /// Host and path, without the scheme
    pub url: String,

    pub method: HttpMethod,

    /// Status codes counted as "up"
    pub success_codes: BTreeSet<u16>,

    /// Probe timeout, 1 to 5 seconds
    pub timeout_seconds: u8,

    pub state: CheckState,

    /// When the check was last evaluated, `None` if it never was
    #[serde(with = "chrono::serde::ts_milliseconds_option", skip_serializing_if = "Option::is_none", default)]
    pub last_checked: Option<DateTime<Utc>>,
}

impl CheckSpec {
    /// Full target URL, `protocol://url`
    pub fn target(&self) -> String {
        format!("{}://{}", self.protocol, self.url)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(u64::from(self.timeout_seconds))
    }

    /// Whether this check has ever been evaluated
    pub fn has_been_checked(&self) -> bool {
        self.last_checked.is_some()
    }
}

/// Why a probe did not produce a response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "details", rename_all = "lowercase")]
pub enum OutcomeError {
    /// The connection failed before any response arrived
    Transport(String),
    /// No response arrived within the check's timeout
    Timeout,
}

impl fmt::Display for OutcomeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutcomeError::Transport(details) => write!(f, "transport error: {details}"),
            OutcomeError::Timeout => write!(f, "timeout"),
        }
    }
}

/// Result of a single probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckOutcome {
    pub error: Option<OutcomeError>,
    pub response_code: Option<u16>,
}

impl CheckOutcome {
    /// A response arrived with `code`
    pub fn response(code: u16) -> Self {
        Self { error: None, response_code: Some(code) }
    }

    /// The transport failed before a response arrived
    pub fn transport_error(details: impl Into<String>) -> Self {
        Self { error: Some(OutcomeError::Transport(details.into())), response_code: None }
    }

    /// The timeout elapsed first
    pub fn timeout() -> Self {
        Self { error: Some(OutcomeError::Timeout), response_code: None }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self.error, Some(OutcomeError::Timeout))
    }
}

/// Append-only audit entry for one evaluation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    /// The check as it was before this evaluation
    pub check: CheckSpec,
    pub outcome: CheckOutcome,
    pub state: CheckState,
    pub alert: bool,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub time: DateTime<Utc>,
}
