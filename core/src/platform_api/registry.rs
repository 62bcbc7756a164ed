//! Registry users
//!
//! Finds the subject in the platform's user registry, creating it from the
//! identity claims when absent.

use serde_json::{json, Value};
use tracing::{debug, info};

use super::client::{PlatformApiClient, SessionHeaders};
use super::types::{PlatformUser, ResultList};
use crate::config::PlatformConfig;
use crate::error::Result;
use crate::oidc::IdentityClaims;
use crate::platform::HttpMethod;

/// Find the registry user named `claims.subject`, or create it
pub async fn find_or_create_user(
    api: &PlatformApiClient<'_>,
    session: &SessionHeaders,
    platform: &PlatformConfig,
    claims: &IdentityClaims,
) -> Result<PlatformUser> {
    let users_path = format!("/user-registries/{}/{}/users", platform.org, platform.registry);

    let existing: ResultList<PlatformUser> = api
        .request_as(
            HttpMethod::Get,
            &format!("{}?fields=username,url", users_path),
            &session.as_pairs(),
            None,
        )
        .await?;

    if let Some(user) = existing.results.into_iter().find(|u| u.username == claims.subject) {
        debug!(username = %user.username, "registry user exists");
        return Ok(user);
    }

    info!(username = %claims.subject, registry = %platform.registry, "creating registry user");

    let body = new_user_body(claims, &platform.registry);
    api.request_as(HttpMethod::Post, &users_path, &session.as_pairs(), Some(&body))
        .await
}

/// Registry user document; absent claims are omitted
fn new_user_body(claims: &IdentityClaims, registry: &str) -> Value {
    let mut body = json!({
        "username": claims.subject,
        "identity_provider": registry,
    });

    let optional = [
        ("first_name", &claims.given_name),
        ("last_name", &claims.family_name),
        ("email", &claims.email),
    ];
    for (field, value) in optional {
        if let Some(value) = value {
            body[field] = json!(value);
        }
    }

    body
}
