//! Token endpoint response handling
//!
//! A 200 response is only released once its subject has been provisioned.
//! Every other status passes through untouched.

use serde_json::Value;
use tracing::{debug, info};

use super::gateway::{self, ProxyResponse};
use crate::config::Config;
use crate::directory::DirectoryGroupClient;
use crate::error::{ProvisioningError, Result};
use crate::oidc::IdTokenDecoder;
use crate::platform::{Clock, HttpClient};
use crate::platform_api::OrgMember;
use crate::provision::Provisioner;

/// Response received from the token endpoint
///
/// `headers` holds the end-to-end headers in received order; hop-by-hop
/// headers are stripped by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl UpstreamResponse {
    pub fn new(status: u16, body: Vec<u8>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// First value of header `name`, compared case-insensitively
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

pub struct TokenProxy<'a> {
    decoder: IdTokenDecoder<'a>,
    provisioner: Provisioner<'a>,
}

impl<'a> TokenProxy<'a> {
    pub fn new(
        config: &'a Config,
        http: &'a dyn HttpClient,
        directory: &'a dyn DirectoryGroupClient,
        clock: &'a dyn Clock,
    ) -> Self {
        Self {
            decoder: IdTokenDecoder::new(&config.oidc, http, clock),
            provisioner: Provisioner::new(config, http, directory),
        }
    }

    /// Decide what the caller receives for `upstream`
    pub async fn handle(&self, upstream: UpstreamResponse) -> ProxyResponse {
        if upstream.status != 200 {
            debug!(status = upstream.status, "forwarding non-200 token response");
            return ProxyResponse::Forward(upstream);
        }

        match self.provision_from(&upstream.body).await {
            Ok(member) => {
                info!(
                    member = %member.name,
                    roles = member.role_urls.len(),
                    "access provisioned, forwarding token response"
                );
                ProxyResponse::Forward(upstream)
            }
            Err(e) => gateway::reject_error(&e),
        }
    }

    async fn provision_from(&self, body: &[u8]) -> Result<OrgMember> {
        let id_token = extract_id_token(body)?;
        let claims = self.decoder.decode(&id_token).await?;
        self.provisioner.provision(&claims).await
    }
}

/// The `id_token` string of a token response body
fn extract_id_token(body: &[u8]) -> Result<String> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| ProvisioningError::response_parse_failed(e.to_string()))?;

    let Value::Object(mut fields) = value else {
        return Err(ProvisioningError::response_parse_failed(
            "token response is not a JSON object",
        ));
    };

    match fields.remove("id_token") {
        Some(Value::String(token)) => Ok(token),
        _ => Err(ProvisioningError::MissingIdToken),
    }
}
