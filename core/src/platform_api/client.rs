//! Generic platform API client
//!
//! Builds the target URL from the configured endpoint, serializes JSON
//! bodies, and normalizes every failure into `UpstreamApiFailed`.

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, error};

use crate::error::{ProvisioningError, Result};
use crate::platform::{HttpClient, HttpMethod};

/// Headers for calls made before a bearer token exists
pub const JSON_HEADERS: [(&str, &str); 2] = [
    ("Accept", "application/json"),
    ("Content-Type", "application/json"),
];

/// Headers for one authenticated session
///
/// Holds the bearer token for a single invocation; never shared.
pub struct SessionHeaders {
    authorization: String,
}

impl SessionHeaders {
    pub fn bearer(token: &str) -> Self {
        Self {
            authorization: format!("Bearer {}", token),
        }
    }

    pub fn as_pairs(&self) -> [(&str, &str); 3] {
        [
            JSON_HEADERS[0],
            JSON_HEADERS[1],
            ("Authorization", self.authorization.as_str()),
        ]
    }
}

/// REST client against the platform management API
pub struct PlatformApiClient<'a> {
    endpoint: &'a str,
    http: &'a dyn HttpClient,
}

impl<'a> PlatformApiClient<'a> {
    /// `http` must already be bound to the platform's TLS profile
    pub fn new(endpoint: &'a str, http: &'a dyn HttpClient) -> Self {
        Self { endpoint, http }
    }

    /// Issue one call and return the parsed JSON body
    ///
    /// Any status >= 300 is a failure carrying the raw status and body.
    pub async fn request(
        &self,
        method: HttpMethod,
        resource: &str,
        headers: &[(&str, &str)],
        body: Option<&Value>,
    ) -> Result<Value> {
        let target = format!("{}{}", self.endpoint.trim_end_matches('/'), resource);
        let fail = |message: String| {
            ProvisioningError::upstream_api_failed(method.as_str(), resource, message)
        };

        debug!(method = %method, resource = %resource, "platform API request");

        let payload = match body {
            Some(value) => serde_json::to_vec(value)
                .map_err(|e| fail(format!("failed to serialize request body: {}", e)))?,
            None => Vec::new(),
        };

        let response = match method {
            HttpMethod::Get => self.http.get(&target, headers).await,
            HttpMethod::Post => self.http.post(&target, headers, &payload).await,
            HttpMethod::Patch => self.http.patch(&target, headers, &payload).await,
        }
        .map_err(|e| {
            error!(method = %method, target = %target, error = %e, "platform API transport error");
            fail(format!("transport error: {}", e))
        })?;

        if response.status >= 300 {
            let raw = response.text_lossy();
            error!(
                method = %method,
                target = %target,
                status = response.status,
                body = %raw,
                "non 2xx response from platform API"
            );
            return Err(fail(format!("HTTP {}: {}", response.status, raw)));
        }

        response.json::<Value>().map_err(|e| {
            error!(method = %method, target = %target, error = %e, "failed to parse platform API response");
            fail(format!("invalid JSON response: {}", e))
        })
    }

    /// Like [`request`](Self::request), deserializing the body into `T`
    pub async fn request_as<T: DeserializeOwned>(
        &self,
        method: HttpMethod,
        resource: &str,
        headers: &[(&str, &str)],
        body: Option<&Value>,
    ) -> Result<T> {
        let value = self.request(method, resource, headers, body).await?;

        serde_json::from_value(value).map_err(|e| {
            ProvisioningError::upstream_api_failed(
                method.as_str(),
                resource,
                format!("unexpected response shape: {}", e),
            )
        })
    }
}
