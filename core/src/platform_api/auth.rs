//! Service authentication against the platform API
//!
//! Exchanges the configured service identity for a bearer token using the
//! password grant.

use serde::Deserialize;
use tracing::debug;

use super::client::{PlatformApiClient, JSON_HEADERS};
use crate::config::PlatformConfig;
use crate::error::{ProvisioningError, Result};
use crate::platform::HttpMethod;

/// Token response from the platform's `/token` endpoint
#[derive(Deserialize)]
struct TokenGrant {
    access_token: String,
}

/// Obtain a bearer token for the configured service identity
pub async fn authenticate(api: &PlatformApiClient<'_>, platform: &PlatformConfig) -> Result<String> {
    let body = serde_json::json!({
        "username": platform.username,
        "password": platform.password,
        "client_id": platform.client_id,
        "client_secret": platform.client_secret,
        "grant_type": "password",
        "realm": platform.realm,
    });

    let grant: TokenGrant = api
        .request_as(HttpMethod::Post, "/token", &JSON_HEADERS, Some(&body))
        .await
        .map_err(|e| ProvisioningError::authentication_failed(e.to_string()))?;

    if grant.access_token.is_empty() {
        return Err(ProvisioningError::authentication_failed(
            "platform returned an empty access_token",
        ));
    }

    debug!(realm = %platform.realm, "authenticated to platform API");

    Ok(grant.access_token)
}
