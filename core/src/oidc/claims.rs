//! Identity claims extraction

use serde::Deserialize;

use super::validate::verify_token;
use crate::config::OidcConfig;
use crate::error::{ProvisioningError, Result};
use crate::platform::{Clock, HttpClient};

/// Verified subject identity, immutable once extracted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityClaims {
    pub subject: String,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
    pub email: Option<String>,
}

/// Identity claims as they appear in the token payload
#[derive(Debug, Deserialize)]
pub(super) struct TokenClaims {
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default)]
    pub given_name: Option<String>,
    #[serde(default)]
    pub family_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

impl TokenClaims {
    fn into_identity(self) -> Result<IdentityClaims> {
        let subject = match self.sub {
            Some(sub) if !sub.is_empty() => sub,
            _ => return Err(ProvisioningError::MissingSubjectClaim),
        };

        Ok(IdentityClaims {
            subject,
            given_name: self.given_name,
            family_name: self.family_name,
            email: self.email,
        })
    }
}

/// Decodes id tokens, verifying signatures when a JWKS is configured
pub struct IdTokenDecoder<'a> {
    oidc: &'a OidcConfig,
    http: &'a dyn HttpClient,
    clock: &'a dyn Clock,
}

impl<'a> IdTokenDecoder<'a> {
    pub fn new(oidc: &'a OidcConfig, http: &'a dyn HttpClient, clock: &'a dyn Clock) -> Self {
        Self { oidc, http, clock }
    }

    /// Extract the identity claims from `id_token`
    ///
    /// The payload and `sub` are checked before any key material is fetched.
    pub async fn decode(&self, id_token: &str) -> Result<IdentityClaims> {
        let claims = extract_unverified_claims(id_token)?.into_identity()?;

        let Some(jwks_uri) = &self.oidc.jwks_uri else {
            return Ok(claims);
        };

        let verified = verify_token(id_token, jwks_uri, self.oidc, self.http, self.clock)
            .await?
            .into_identity()?;

        if verified != claims {
            return Err(ProvisioningError::claims_decode_failed(
                "verified claims differ from token payload",
            ));
        }

        Ok(verified)
    }
}

/// Decode the payload segment without checking the signature
fn extract_unverified_claims(token: &str) -> Result<TokenClaims> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return Err(ProvisioningError::claims_decode_failed("invalid JWT format"));
    }

    let payload = base64_url_decode(parts[1])?;
    serde_json::from_slice(&payload)
        .map_err(|e| ProvisioningError::claims_decode_failed(format!("invalid JWT claims: {}", e)))
}

/// Base64 URL decode, tolerating padding
fn base64_url_decode(input: &str) -> Result<Vec<u8>> {
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};

    URL_SAFE_NO_PAD
        .decode(input)
        .or_else(|_| {
            use base64::engine::general_purpose::URL_SAFE;
            URL_SAFE.decode(input)
        })
        .map_err(|e| ProvisioningError::claims_decode_failed(format!("invalid base64: {}", e)))
}
