//! Directory group to platform role resolution

use std::collections::{BTreeMap, BTreeSet};

use crate::directory::DirectoryGroup;
use crate::platform_api::OrgRole;

/// Compute the platform role names granted to `username`
///
/// A mapped role is granted when a group with exactly the mapped identity
/// exists and lists the user as a member. Groups missing from the table are
/// ignored; an empty result is valid.
pub fn resolve_roles(
    username: &str,
    groups: &[DirectoryGroup],
    table: &BTreeMap<String, String>,
) -> BTreeSet<String> {
    let mut roles = BTreeSet::new();

    for (identity, role) in table {
        let Some(group) = groups.iter().find(|g| &g.identity == identity) else {
            continue;
        };

        if group.has_member(username) {
            roles.insert(role.clone());
        }
    }

    roles
}

/// Urls of the organization roles whose name was resolved, in platform order
///
/// Resolved names with no matching organization role are dropped.
pub fn role_urls(org_roles: &[OrgRole], resolved: &BTreeSet<String>) -> Vec<String> {
    let mut urls = Vec::new();

    for role in org_roles {
        if resolved.contains(&role.name) {
            urls.push(role.url.clone());
        }
    }

    urls
}
