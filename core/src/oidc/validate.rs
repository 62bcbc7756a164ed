//! Id token signature verification
//!
//! Verifies the token against the configured JWKS and checks time and
//! issuer/audience claims.

use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::Deserialize;

use super::claims::TokenClaims;
use super::jwks::fetch_jwks;
use crate::config::OidcConfig;
use crate::error::{ProvisioningError, Result};
use crate::platform::{Clock, HttpClient};

/// Allowed clock skew when checking `exp`
const LEEWAY_SECS: u64 = 60;

#[derive(Deserialize)]
struct VerifiedClaims {
    exp: u64,
    #[serde(flatten)]
    identity: TokenClaims,
}

/// Verify `token` against the key set at `jwks_uri` and return its claims
pub(super) async fn verify_token(
    token: &str,
    jwks_uri: &str,
    oidc: &OidcConfig,
    http: &dyn HttpClient,
    clock: &dyn Clock,
) -> Result<TokenClaims> {
    let header = decode_header(token)
        .map_err(|e| ProvisioningError::claims_decode_failed(format!("invalid JWT header: {}", e)))?;

    // Keys come from the JWKS, so symmetric algorithms never apply
    if matches!(header.alg, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512) {
        return Err(ProvisioningError::claims_decode_failed(format!(
            "unsupported JWT algorithm {:?}",
            header.alg
        )));
    }

    let kid = header
        .kid
        .as_deref()
        .ok_or_else(|| ProvisioningError::claims_decode_failed("JWT missing 'kid' header"))?;

    let jwks = fetch_jwks(jwks_uri, http).await?;
    let jwk = jwks
        .find(kid)
        .ok_or_else(|| ProvisioningError::claims_decode_failed(format!("key '{}' not found in JWKS", kid)))?;

    let key = DecodingKey::from_jwk(jwk)
        .map_err(|e| ProvisioningError::claims_decode_failed(format!("invalid JWK: {}", e)))?;

    // exp is checked below against the platform clock
    let mut validation = Validation::new(header.alg);
    validation.validate_exp = false;
    validation.validate_nbf = false;
    if let Some(issuer) = &oidc.issuer {
        validation.set_issuer(&[issuer]);
    }
    match &oidc.audience {
        Some(audience) => validation.set_audience(&[audience]),
        None => validation.validate_aud = false,
    }

    let data = decode::<VerifiedClaims>(token, &key, &validation).map_err(|e| {
        ProvisioningError::claims_decode_failed(format!("token verification failed: {}", e))
    })?;

    if data.claims.exp.saturating_add(LEEWAY_SECS) <= clock.now_secs() {
        return Err(ProvisioningError::claims_decode_failed("token has expired"));
    }

    Ok(data.claims.identity)
}
