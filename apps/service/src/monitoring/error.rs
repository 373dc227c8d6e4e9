use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Machine readable classification of a failed check.
///
/// The string forms are stable: they are persisted with every failure and
/// used by notification templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reason {
    Lookup,
    Connection,
    Tls,
    Request,
    Regex,
    StatusCode,
    ResponseCode,
    ResponseBody,
    Close,
    ParseDomain,
    Smtp,
    Imap,
}

impl Reason {
    const ALL: [Reason; 12] = [
        Reason::Lookup,
        Reason::Connection,
        Reason::Tls,
        Reason::Request,
        Reason::Regex,
        Reason::StatusCode,
        Reason::ResponseCode,
        Reason::ResponseBody,
        Reason::Close,
        Reason::ParseDomain,
        Reason::Smtp,
        Reason::Imap,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Reason::Lookup => "lookup",
            Reason::Connection => "connection",
            Reason::Tls => "tls",
            Reason::Request => "request",
            Reason::Regex => "regex",
            Reason::StatusCode => "status_code",
            Reason::ResponseCode => "response_code",
            Reason::ResponseBody => "response_body",
            Reason::Close => "close",
            Reason::ParseDomain => "parse_domain",
            Reason::Smtp => "smtp",
            Reason::Imap => "imap",
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Reason {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Reason::ALL
            .into_iter()
            .find(|reason| reason.as_str() == value)
            .ok_or_else(|| format!("unknown failure reason '{value}'"))
    }
}

/// A failed probe: the human readable issue plus its reason code
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{issue}")]
pub struct ProbeError {
    pub reason: Reason,
    pub issue: String,
}

impl ProbeError {
    pub fn new(reason: Reason, issue: impl Into<String>) -> Self {
        Self { reason, issue: issue.into() }
    }
}
