//! Server platform implementations
//!
//! Implements the core platform traits with native libraries:
//! - HttpClient: reqwest, built per TLS profile
//! - Clock: std::time::SystemTime

use anyhow::Context;
use async_trait::async_trait;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::debug;

use token_provisioner_core::config::TlsProfile;
use token_provisioner_core::platform::{Clock, HttpClient, HttpError, HttpResponse};
use token_provisioner_core::proxy::UpstreamResponse;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// reqwest-based HTTP client bound to one TLS profile
pub struct ReqwestHttpClient {
    client: reqwest::Client,
}

impl ReqwestHttpClient {
    /// Client trusting the system roots only
    pub fn new() -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self { client })
    }

    /// Client carrying the CA bundle and client identity of `profile`
    pub fn with_profile(profile: &TlsProfile) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder().timeout(REQUEST_TIMEOUT);

        if let Some(path) = &profile.ca_cert {
            let pem = std::fs::read(path)
                .with_context(|| format!("failed to read CA bundle {}", path.display()))?;
            for cert in reqwest::Certificate::from_pem_bundle(&pem)
                .with_context(|| format!("invalid CA bundle {}", path.display()))?
            {
                builder = builder.add_root_certificate(cert);
            }
        }

        if let Some(path) = &profile.client_identity {
            let pem = std::fs::read(path)
                .with_context(|| format!("failed to read client identity {}", path.display()))?;
            let identity = reqwest::Identity::from_pem(&pem)
                .with_context(|| format!("invalid client identity {}", path.display()))?;
            builder = builder.identity(identity);
        }

        debug!(profile = %profile.name, "building HTTP client for TLS profile");

        let client = builder
            .build()
            .with_context(|| format!("failed to build HTTP client for TLS profile {}", profile.name))?;

        Ok(Self { client })
    }

    /// POST `body` to the token endpoint, keeping the end-to-end response headers
    pub async fn forward(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        body: Vec<u8>,
    ) -> Result<UpstreamResponse, HttpError> {
        let mut builder = self.client.post(url).body(body);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| HttpError::new(format!("token endpoint request failed: {}", e)))?;

        let status = response.status().as_u16();
        let headers = end_to_end_headers(response.headers());
        let body = response
            .bytes()
            .await
            .map_err(|e| HttpError::new(format!("failed to read token response: {}", e)))?
            .to_vec();

        Ok(UpstreamResponse {
            status,
            headers,
            body,
        })
    }

    async fn send(
        &self,
        builder: reqwest::RequestBuilder,
        headers: &[(&str, &str)],
    ) -> Result<HttpResponse, HttpError> {
        let mut builder = builder;
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| HttpError::new(format!("request failed: {}", e)))?;

        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| HttpError::new(format!("failed to read response: {}", e)))?
            .to_vec();

        Ok(HttpResponse { status, body })
    }
}

#[async_trait(?Send)]
impl HttpClient for ReqwestHttpClient {
    async fn get(&self, url: &str, headers: &[(&str, &str)]) -> Result<HttpResponse, HttpError> {
        self.send(self.client.get(url), headers).await
    }

    async fn post(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        body: &[u8],
    ) -> Result<HttpResponse, HttpError> {
        self.send(self.client.post(url).body(body.to_vec()), headers).await
    }

    async fn patch(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        body: &[u8],
    ) -> Result<HttpResponse, HttpError> {
        self.send(self.client.patch(url).body(body.to_vec()), headers).await
    }
}

/// Headers a proxy must not pass on, per RFC 9110 section 7.6.1
const HOP_BY_HOP: [&str; 9] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Response headers worth forwarding, in received order
///
/// Drops hop-by-hop headers, anything named in `Connection`, and
/// `Content-Length` (recomputed for the outgoing body).
fn end_to_end_headers(headers: &reqwest::header::HeaderMap) -> Vec<(String, String)> {
    let listed: Vec<String> = headers
        .get_all(reqwest::header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|name| name.trim().to_ascii_lowercase())
        .collect();

    headers
        .iter()
        .filter(|(name, _)| {
            let name = name.as_str();
            !HOP_BY_HOP.contains(&name)
                && name != "content-length"
                && !listed.iter().any(|l| l == name)
        })
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect()
}

/// System clock using std::time
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_secs(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
            .as_secs()
    }
}
