//! Error types for the team gateway
//!
//! Every failure the gateway can surface is a [`GatewayError`]. Handlers map
//! each variant to an HTTP status and a sanitized [`ErrorResponse`] body.

use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

static SECRET_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(password|token|key|secret)[=:]\s*\S+").expect("secret pattern is valid")
});

static SENSITIVE_PATH_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"/[a-zA-Z0-9._/-]+/(secrets?|\.ssh|\.aws|\.config)/[a-zA-Z0-9._/-]+")
        .expect("sensitive path pattern is valid")
});

const MAX_ERROR_MESSAGE_LEN: usize = 500;

/// Main error type for gateway operations
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Team {team_id} not found")]
    NotFound { team_id: String },

    #[error("No available team: {reason}")]
    NoAvailableTeam {
        team_id: Option<String>,
        reason: String,
    },

    #[error("Failed to execute task on team {team_id}: {reason}")]
    DownstreamFailure { team_id: String, reason: String },

    #[error("Persistence failure during {operation}: {message}")]
    PersistenceFailure { operation: String, message: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Configuration error: {0}")]
    ConfigError(#[from] crate::config::ConfigError),

    #[error("Internal error: {message}")]
    InternalError { message: String },
}

/// Structured error body returned by the HTTP surface
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorResponse {
    pub error: String,
    pub detail: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_id: Option<String>,
    pub timestamp: String,
}

impl GatewayError {
    /// Create not found error
    pub fn not_found<S: Into<String>>(team_id: S) -> Self {
        Self::NotFound {
            team_id: team_id.into(),
        }
    }

    /// Create "no candidate" error without a specific team
    pub fn no_available_team<S: Into<String>>(reason: S) -> Self {
        Self::NoAvailableTeam {
            team_id: None,
            reason: reason.into(),
        }
    }

    /// Create "no candidate" error for an explicitly requested team
    pub fn team_unavailable<S: Into<String>>(team_id: S) -> Self {
        let team_id = team_id.into();
        Self::NoAvailableTeam {
            reason: format!("Team {team_id} is not available"),
            team_id: Some(team_id),
        }
    }

    /// Create downstream failure error
    pub fn downstream_failure<T: Into<String>, R: Into<String>>(team_id: T, reason: R) -> Self {
        Self::DownstreamFailure {
            team_id: team_id.into(),
            reason: reason.into(),
        }
    }

    /// Create persistence failure error
    pub fn persistence_failure<O: Into<String>, M: Into<String>>(operation: O, message: M) -> Self {
        Self::PersistenceFailure {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create invalid input error
    pub fn invalid_input<S: Into<String>>(message: S) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create internal error
    pub fn internal_error<S: Into<String>>(message: S) -> Self {
        Self::InternalError {
            message: message.into(),
        }
    }

    /// HTTP status code this error maps to at the API boundary
    pub fn status_code(&self) -> u16 {
        match self {
            GatewayError::NotFound { .. } => 404,
            GatewayError::NoAvailableTeam { .. } => 503,
            GatewayError::DownstreamFailure { .. } => 502,
            GatewayError::InvalidInput { .. } => 400,
            GatewayError::PersistenceFailure { .. }
            | GatewayError::ConfigError(_)
            | GatewayError::InternalError { .. } => 500,
        }
    }

    /// Short machine-readable error kind
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::NotFound { .. } => "not_found",
            GatewayError::NoAvailableTeam { .. } => "no_available_team",
            GatewayError::DownstreamFailure { .. } => "downstream_failure",
            GatewayError::PersistenceFailure { .. } => "persistence_failure",
            GatewayError::InvalidInput { .. } => "invalid_input",
            GatewayError::ConfigError(_) => "config_error",
            GatewayError::InternalError { .. } => "internal_error",
        }
    }

    /// Team the error is about, when there is one
    pub fn team_id(&self) -> Option<&str> {
        match self {
            GatewayError::NotFound { team_id } | GatewayError::DownstreamFailure { team_id, .. } => {
                Some(team_id.as_str())
            }
            GatewayError::NoAvailableTeam { team_id, .. } => team_id.as_deref(),
            _ => None,
        }
    }

    /// Convert to the structured body returned to callers
    pub fn to_error_response(&self) -> ErrorResponse {
        ErrorResponse {
            error: self.kind().to_string(),
            detail: sanitize_error_message(&self.to_string()),
            team_id: self.team_id().map(str::to_string),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

/// Sanitize error messages so downstream bodies never leak credentials
pub fn sanitize_error_message(message: &str) -> String {
    let mut sanitized = SECRET_PATTERN
        .replace_all(message, "${1}=***")
        .to_string();

    sanitized = SENSITIVE_PATH_PATTERN
        .replace_all(&sanitized, "/***REDACTED***/")
        .to_string();

    if sanitized.len() > MAX_ERROR_MESSAGE_LEN {
        let truncate_suffix = "...[truncated]";
        let mut cut = MAX_ERROR_MESSAGE_LEN - truncate_suffix.len();
        while !sanitized.is_char_boundary(cut) {
            cut -= 1;
        }
        sanitized = format!("{}{}", &sanitized[..cut], truncate_suffix);
    }

    sanitized
}

/// Result type for gateway operations
pub type GatewayResult<T> = Result<T, GatewayError>;
