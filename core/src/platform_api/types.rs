//! Platform API resource shapes

use serde::{Deserialize, Serialize};

/// User in the platform's identity registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformUser {
    pub username: String,
    pub url: String,
}

/// Role available within an organization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrgRole {
    pub name: String,
    #[serde(default)]
    pub title: String,
    pub url: String,
}

/// Organization member record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrgMember {
    pub name: String,
    #[serde(default)]
    pub title: String,
    pub url: String,
    /// Absent from list responses, which only request name, title and url
    #[serde(default)]
    pub role_urls: Vec<String>,
}

/// Collection envelope returned by list endpoints
#[derive(Debug, Deserialize)]
pub(crate) struct ResultList<T> {
    pub results: Vec<T>,
}
