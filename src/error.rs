use std::fmt;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Customer,
    Project,
    Service,
    User,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityKind::Customer => "customer",
            EntityKind::Project => "project",
            EntityKind::Service => "service",
            EntityKind::User => "user",
        };
        f.write_str(name)
    }
}

/// Stable tag reported to the calling agent alongside the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    AuthError,
    NotFound,
    AmbiguousMatch,
    RateLimited,
    ValidationError,
    ServerError,
    TransportError,
    AlreadyRunning,
    NoRunningEntry,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::AuthError => "auth_error",
            ErrorKind::NotFound => "not_found",
            ErrorKind::AmbiguousMatch => "ambiguous_match",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::ValidationError => "validation_error",
            ErrorKind::ServerError => "server_error",
            ErrorKind::TransportError => "transport_error",
            ErrorKind::AlreadyRunning => "already_running",
            ErrorKind::NoRunningEntry => "no_running_entry",
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum ClockodoError {
    #[error("Clockodo rejected the credentials ({status}): {message}")]
    Auth { status: u16, message: String },

    #[error("{0}")]
    NotFound(String),

    #[error("'{query}' matches several {kind}s: {}", .candidates.join(", "))]
    AmbiguousMatch {
        kind: EntityKind,
        query: String,
        candidates: Vec<String>,
    },

    #[error("Clockodo rate limit reached: {message}")]
    RateLimited {
        retry_after: Option<Duration>,
        message: String,
    },

    #[error("{message}{}", format_fields(.fields))]
    Validation { message: String, fields: Vec<String> },

    #[error("Clockodo server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("request to Clockodo failed: {0}")]
    Transport(String),

    #[error("{0}")]
    AlreadyRunning(String),

    #[error("No time tracking is currently running")]
    NoRunningEntry,
}

impl ClockodoError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClockodoError::Auth { .. } => ErrorKind::AuthError,
            ClockodoError::NotFound(_) => ErrorKind::NotFound,
            ClockodoError::AmbiguousMatch { .. } => ErrorKind::AmbiguousMatch,
            ClockodoError::RateLimited { .. } => ErrorKind::RateLimited,
            ClockodoError::Validation { .. } => ErrorKind::ValidationError,
            ClockodoError::Server { .. } => ErrorKind::ServerError,
            ClockodoError::Transport(_) => ErrorKind::TransportError,
            ClockodoError::AlreadyRunning(_) => ErrorKind::AlreadyRunning,
            ClockodoError::NoRunningEntry => ErrorKind::NoRunningEntry,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        ClockodoError::Validation {
            message: message.into(),
            fields: Vec::new(),
        }
    }

    pub fn not_found(kind: EntityKind, query: &str, available: &[&str]) -> Self {
        let mut message = format!("{} '{}' not found", capitalize(kind), query);
        if !available.is_empty() {
            message.push_str(&format!(". Available: {}", available.join(", ")));
        }
        ClockodoError::NotFound(message)
    }
}

fn format_fields(fields: &[String]) -> String {
    if fields.is_empty() {
        String::new()
    } else {
        format!(" ({})", fields.join("; "))
    }
}

fn capitalize(kind: EntityKind) -> String {
    let name = kind.to_string();
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => name,
    }
}
