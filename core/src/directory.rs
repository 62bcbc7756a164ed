//! Directory group lookup
//!
//! The pipeline only sees group identities and their member names; the
//! directory protocol lives behind [`DirectoryGroupClient`].

use async_trait::async_trait;
use thiserror::Error;

/// Directory lookup failure, reported to the pipeline as `DirectoryLookupFailed`
#[derive(Error, Debug)]
pub enum DirectoryError {
    #[error("connection failed: {message}")]
    Connection { message: String },

    #[error("bind failed: {message}")]
    Bind { message: String },

    #[error("search failed: {message}")]
    Search { message: String },
}

impl DirectoryError {
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    pub fn bind(message: impl Into<String>) -> Self {
        Self::Bind {
            message: message.into(),
        }
    }

    pub fn search(message: impl Into<String>) -> Self {
        Self::Search {
            message: message.into(),
        }
    }
}

/// Search parameters for one group lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryQuery {
    /// Search base
    pub target_dn: String,
    /// Filter expression, e.g. `(&(member=*)(cn=GR-APIC_*))`
    pub filter: String,
    /// Attribute holding the group's members
    pub attribute_name: String,
}

/// A directory group and the names of its members
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryGroup {
    pub identity: String,
    pub members: Vec<String>,
}

impl DirectoryGroup {
    pub fn new(identity: impl Into<String>, members: Vec<String>) -> Self {
        Self {
            identity: identity.into(),
            members,
        }
    }

    /// Membership test, case-insensitive through uppercase normalization
    pub fn has_member(&self, username: &str) -> bool {
        let wanted = username.to_uppercase();
        self.members.iter().any(|m| m.to_uppercase() == wanted)
    }
}

/// Resolves the groups and member sets matching a query
#[async_trait(?Send)]
pub trait DirectoryGroupClient {
    async fn lookup_groups(
        &self,
        query: &DirectoryQuery,
    ) -> Result<Vec<DirectoryGroup>, DirectoryError>;
}

/// Leading RDN value of a distinguished name
///
/// `CN=GR-APIC_ADMIN,OU=Groups,DC=EXAMPLE,DC=ORG` gives `GR-APIC_ADMIN`.
/// Values without an `=` are returned unchanged.
pub fn leading_rdn_value(dn: &str) -> &str {
    let first = split_rdns(dn).next().unwrap_or(dn);
    match first.split_once('=') {
        Some((_, value)) => value.trim(),
        None => dn.trim(),
    }
}

/// Split a DN on unescaped commas
fn split_rdns(dn: &str) -> impl Iterator<Item = &str> {
    let mut escaped = false;
    dn.split(move |c: char| {
        if escaped {
            escaped = false;
            return false;
        }
        if c == '\\' {
            escaped = true;
            return false;
        }
        c == ','
    })
}
