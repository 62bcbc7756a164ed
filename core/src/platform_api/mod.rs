//! Platform management API
//!
//! A generic authenticated REST client plus the resource operations the
//! pipeline needs: service authentication, registry users, organization
//! roles and members.

pub mod auth;
pub mod client;
pub mod org;
pub mod registry;
mod types;

pub use client::{PlatformApiClient, SessionHeaders};
pub use types::{OrgMember, OrgRole, PlatformUser};
