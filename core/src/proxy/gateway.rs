//! Terminal outcomes of one proxied token response

use tracing::error;

use super::token::UpstreamResponse;
use crate::error::{ErrorResponse, ProvisioningError};

/// What the caller receives
///
/// Exactly one value is produced per token response, so a response is either
/// forwarded or rejected, never both.
#[derive(Debug, Clone, PartialEq)]
pub enum ProxyResponse {
    /// Upstream status and body, unchanged
    Forward(UpstreamResponse),
    /// Error document replacing the upstream body
    Reject(ErrorResponse),
}

impl ProxyResponse {
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Forward(upstream) => upstream.status,
            Self::Reject(body) => body.status_code(),
        }
    }
}

/// Replace the response with `{error, error_description}`
pub fn reject(code: &str, description: &str) -> ProxyResponse {
    ProxyResponse::Reject(ErrorResponse {
        error: code.to_string(),
        error_description: description.to_string(),
    })
}

/// Log `err` with its full context, then reject with its public description
pub fn reject_error(err: &ProvisioningError) -> ProxyResponse {
    error!(
        code = err.error_code(),
        description = err.description(),
        error = %err,
        "rejecting token response"
    );

    reject(err.error_code(), err.description())
}
