//! Organization roles and members

use serde_json::json;

use super::client::{PlatformApiClient, SessionHeaders};
use super::types::{OrgMember, OrgRole, PlatformUser, ResultList};
use crate::error::Result;
use crate::platform::HttpMethod;

/// List the roles defined in `org`
pub async fn list_roles(
    api: &PlatformApiClient<'_>,
    session: &SessionHeaders,
    org: &str,
) -> Result<Vec<OrgRole>> {
    let list: ResultList<OrgRole> = api
        .request_as(
            HttpMethod::Get,
            &format!("/orgs/{}/roles?fields=name,title,url", org),
            &session.as_pairs(),
            None,
        )
        .await?;

    Ok(list.results)
}

/// List the members of `org`
pub async fn list_members(
    api: &PlatformApiClient<'_>,
    session: &SessionHeaders,
    org: &str,
) -> Result<Vec<OrgMember>> {
    let list: ResultList<OrgMember> = api
        .request_as(
            HttpMethod::Get,
            &format!("/orgs/{}/members?fields=name,title,url", org),
            &session.as_pairs(),
            None,
        )
        .await?;

    Ok(list.results)
}

/// Create a member of `org` for `user` holding `role_urls`
pub async fn create_member(
    api: &PlatformApiClient<'_>,
    session: &SessionHeaders,
    org: &str,
    user: &PlatformUser,
    role_urls: &[String],
) -> Result<OrgMember> {
    let body = json!({
        "user": { "url": user.url },
        "role_urls": role_urls,
    });

    api.request_as(
        HttpMethod::Post,
        &format!("/orgs/{}/members", org),
        &session.as_pairs(),
        Some(&body),
    )
    .await
}

/// Replace the role urls of the existing member `member_name`
///
/// The name is percent-encoded as a single path segment.
pub async fn update_member_roles(
    api: &PlatformApiClient<'_>,
    session: &SessionHeaders,
    org: &str,
    member_name: &str,
    role_urls: &[String],
) -> Result<OrgMember> {
    let body = json!({ "role_urls": role_urls });

    api.request_as(
        HttpMethod::Patch,
        &format!("/orgs/{}/members/{}", org, urlencoding::encode(member_name)),
        &session.as_pairs(),
        Some(&body),
    )
    .await
}
