//! JWKS (JSON Web Key Set) fetching

use jsonwebtoken::jwk::JwkSet;

use crate::error::{ProvisioningError, Result};
use crate::platform::HttpClient;

/// Fetch the key set published at `jwks_uri`
pub async fn fetch_jwks(jwks_uri: &str, http: &dyn HttpClient) -> Result<JwkSet> {
    let response = http
        .get(jwks_uri, &[("Accept", "application/json")])
        .await
        .map_err(|e| ProvisioningError::claims_decode_failed(format!("failed to fetch JWKS: {}", e)))?;

    if response.status != 200 {
        return Err(ProvisioningError::claims_decode_failed(format!(
            "failed to fetch JWKS: HTTP {}",
            response.status
        )));
    }

    response
        .json()
        .map_err(|e| ProvisioningError::claims_decode_failed(format!("invalid JWKS: {}", e)))
}
