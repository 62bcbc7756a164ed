//! Error types and OAuth2-shaped error mapping

use serde::Serialize;
use thiserror::Error;

use crate::directory::DirectoryError;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, ProvisioningError>;

/// OAuth2 error category used for every rejected token response
pub const SERVER_ERROR: &str = "server_error";

/// OAuth2 error category for a token request the proxy could not read
pub const INVALID_REQUEST: &str = "invalid_request";

/// Terminal failure of one provisioning invocation
#[derive(Error, Debug)]
pub enum ProvisioningError {
    #[error("failed to parse token response: {message}")]
    ResponseParseFailed { message: String },

    #[error("token response has no id_token")]
    MissingIdToken,

    #[error("failed to decode id_token: {message}")]
    ClaimsDecodeFailed { message: String },

    #[error("id_token has no sub claim")]
    MissingSubjectClaim,

    #[error("platform authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("platform API call {method} {resource} failed: {message}")]
    UpstreamApiFailed {
        method: String,
        resource: String,
        message: String,
    },

    #[error("directory lookup failed: {message}")]
    DirectoryLookupFailed { message: String },
}

impl ProvisioningError {
    pub fn response_parse_failed(message: impl Into<String>) -> Self {
        Self::ResponseParseFailed {
            message: message.into(),
        }
    }

    pub fn claims_decode_failed(message: impl Into<String>) -> Self {
        Self::ClaimsDecodeFailed {
            message: message.into(),
        }
    }

    pub fn authentication_failed(message: impl Into<String>) -> Self {
        Self::AuthenticationFailed {
            message: message.into(),
        }
    }

    pub fn upstream_api_failed(
        method: impl Into<String>,
        resource: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::UpstreamApiFailed {
            method: method.into(),
            resource: resource.into(),
            message: message.into(),
        }
    }

    pub fn directory_lookup_failed(message: impl Into<String>) -> Self {
        Self::DirectoryLookupFailed {
            message: message.into(),
        }
    }

    /// Get the OAuth2 error code for this error
    pub fn error_code(&self) -> &'static str {
        SERVER_ERROR
    }

    /// Get the caller-facing description for this error
    ///
    /// Remote detail stays in the logs.
    pub fn description(&self) -> &'static str {
        match self {
            Self::ResponseParseFailed { .. } => {
                "The token proxy failed to parse the token response."
            }
            Self::MissingIdToken => {
                "The token proxy failed to find an id_token in the token response."
            }
            Self::ClaimsDecodeFailed { .. } => "The token proxy failed to decode the id_token.",
            Self::MissingSubjectClaim => {
                "The token proxy failed to find a sub claim in the id_token."
            }
            Self::AuthenticationFailed { .. }
            | Self::UpstreamApiFailed { .. }
            | Self::DirectoryLookupFailed { .. } => "The token proxy failed to provision access.",
        }
    }
}

impl From<DirectoryError> for ProvisioningError {
    fn from(e: DirectoryError) -> Self {
        Self::directory_lookup_failed(e.to_string())
    }
}

/// Error response body written in place of the upstream token response
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_description: String,
}

impl ErrorResponse {
    /// HTTP status used when rendering this body
    pub fn status_code(&self) -> u16 {
        match self.error.as_str() {
            INVALID_REQUEST => 400,
            _ => 500,
        }
    }
}

impl From<&ProvisioningError> for ErrorResponse {
    fn from(err: &ProvisioningError) -> Self {
        Self {
            error: err.error_code().to_string(),
            error_description: err.description().to_string(),
        }
    }
}
