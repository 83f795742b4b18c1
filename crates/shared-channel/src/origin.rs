//! Origin matching for inbound frames.

use std::fmt;

/// The origin a binding accepts frames from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllowedOrigin {
    /// Exactly this origin (normalized).
    Exact(String),
    /// Any origin. Only meant for in-process embedding and tests.
    Any,
}

impl AllowedOrigin {
    pub fn exact(origin: &str) -> Self {
        AllowedOrigin::Exact(normalize_origin(origin))
    }

    /// `"*"` means [`AllowedOrigin::Any`]; everything else is exact.
    pub fn parse(raw: &str) -> Self {
        if raw.trim() == "*" {
            AllowedOrigin::Any
        } else {
            Self::exact(raw)
        }
    }

    pub fn matches(&self, origin: &str) -> bool {
        match self {
            AllowedOrigin::Any => true,
            AllowedOrigin::Exact(expected) => *expected == normalize_origin(origin),
        }
    }
}

impl fmt::Display for AllowedOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AllowedOrigin::Exact(origin) => f.write_str(origin),
            AllowedOrigin::Any => f.write_str("*"),
        }
    }
}

impl From<&str> for AllowedOrigin {
    fn from(raw: &str) -> Self {
        Self::parse(raw)
    }
}

/// Lowercase, drop trailing slashes and default ports.
///
/// `"HTTPS://Widgets.Example:443/"` → `"https://widgets.example"`.
pub fn normalize_origin(origin: &str) -> String {
    let lowered = origin.trim().trim_end_matches('/').to_ascii_lowercase();
    if let Some(host) = lowered.strip_prefix("https://") {
        if let Some(bare) = host.strip_suffix(":443") {
            return format!("https://{}", bare);
        }
    } else if let Some(host) = lowered.strip_prefix("http://") {
        if let Some(bare) = host.strip_suffix(":80") {
            return format!("http://{}", bare);
        }
    }
    lowered
}
