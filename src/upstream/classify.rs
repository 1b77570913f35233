//! Upstream error classification.
//!
//! Failures from the AI backend are classified into an [`ErrorKind`]
//! by an explicit, ordered rule table evaluated top-to-bottom. Each
//! rule matches on HTTP status codes and/or lowercase message
//! fragments; the first hit wins, which makes the precedence
//! (RateLimited > Timeout > Unavailable > AuthFailure >
//! ValidationFailure > Generic) deterministic and testable.

use std::fmt;

use super::UpstreamError;

/// The kind of upstream failure, after classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    RateLimited,
    Timeout,
    Unavailable,
    AuthFailure,
    ValidationFailure,
    Generic,
}

impl ErrorKind {
    /// Whether this failure counts toward tripping the circuit
    /// breaker. Auth and validation failures are caller errors and
    /// must not open the circuit.
    pub fn trips_breaker(self) -> bool {
        !matches!(self, ErrorKind::AuthFailure | ErrorKind::ValidationFailure)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::RateLimited => write!(f, "rate-limited"),
            ErrorKind::Timeout => write!(f, "timeout"),
            ErrorKind::Unavailable => write!(f, "unavailable"),
            ErrorKind::AuthFailure => write!(f, "auth-failure"),
            ErrorKind::ValidationFailure => write!(f, "validation-failure"),
            ErrorKind::Generic => write!(f, "generic"),
        }
    }
}

/// One classification rule: status codes and message fragments that
/// map to a kind.
struct Rule {
    kind: ErrorKind,
    statuses: &'static [u16],
    needles: &'static [&'static str],
}

/// The rule table, in precedence order. A failure matching several
/// rules (e.g. a 429 whose body also says "temporarily unavailable")
/// takes the kind of the earliest row.
const RULES: &[Rule] = &[
    Rule {
        kind: ErrorKind::RateLimited,
        statuses: &[429],
        needles: &["rate limit", "too many requests", "quota exceeded"],
    },
    Rule {
        kind: ErrorKind::Timeout,
        statuses: &[408, 504],
        needles: &["timeout", "timed out", "deadline exceeded"],
    },
    Rule {
        kind: ErrorKind::Unavailable,
        statuses: &[502, 503, 529],
        needles: &[
            "service unavailable",
            "overloaded",
            "connection refused",
            "connection reset",
            "high demand",
        ],
    },
    Rule {
        kind: ErrorKind::AuthFailure,
        statuses: &[401, 403],
        needles: &["unauthorized", "invalid api key", "authentication", "forbidden"],
    },
    Rule {
        kind: ErrorKind::ValidationFailure,
        statuses: &[400, 413, 422],
        needles: &["invalid request", "validation", "too large", "unsupported"],
    },
];

/// Classify a status/message pair against the rule table.
pub fn classify(status: Option<u16>, message: &str) -> ErrorKind {
    let msg_lower = message.to_lowercase();
    for rule in RULES {
        let status_hit = status.is_some_and(|s| rule.statuses.contains(&s));
        let needle_hit = rule.needles.iter().any(|n| msg_lower.contains(n));
        if status_hit || needle_hit {
            return rule.kind;
        }
    }
    ErrorKind::Generic
}

/// Classify an [`UpstreamError`].
///
/// A malformed response is `Generic`: the caller cannot fix it, so it
/// degrades to a fallback like any other upstream defect. Missing
/// configuration maps to `AuthFailure` so it surfaces without opening
/// the circuit.
pub fn classify_error(err: &UpstreamError) -> ErrorKind {
    match err {
        UpstreamError::Api { status, message } => classify(*status, message),
        UpstreamError::Parse(_) => ErrorKind::Generic,
        UpstreamError::NotConfigured(_) => ErrorKind::AuthFailure,
    }
}
