//! token-provisioner-core: platform-agnostic provisioning pipeline
//!
//! Intercepts token endpoint responses and, before releasing a successful
//! one, reconciles the subject's organization membership on the platform
//! management API with its directory group memberships. It depends only on
//! abstract platform traits (HttpClient, Clock, DirectoryGroupClient) and
//! never imports transport-specific code.

pub mod config;
pub mod directory;
pub mod error;
pub mod membership;
pub mod oidc;
pub mod platform;
pub mod platform_api;
pub mod provision;
pub mod proxy;
pub mod roles;

#[cfg(test)]
pub mod test_support;
