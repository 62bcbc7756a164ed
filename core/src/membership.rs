//! Organization membership reconciliation
//!
//! Creates the subject's member record or replaces its roles, so that every
//! run with the same inputs ends in the same state.

use tracing::info;

use crate::error::Result;
use crate::platform_api::{org, OrgMember, PlatformApiClient, PlatformUser, SessionHeaders};

pub struct MembershipReconciler<'a> {
    api: &'a PlatformApiClient<'a>,
    session: &'a SessionHeaders,
    org: &'a str,
}

impl<'a> MembershipReconciler<'a> {
    pub fn new(api: &'a PlatformApiClient<'a>, session: &'a SessionHeaders, org: &'a str) -> Self {
        Self { api, session, org }
    }

    /// Create or update the member for `username` so it holds exactly `role_urls`
    ///
    /// An existing member must match on both `name` and `title`. Found members
    /// get a PATCH replacing their role urls; otherwise a member is POSTed
    /// referencing `user`.
    pub async fn upsert(
        &self,
        username: &str,
        user: &PlatformUser,
        role_urls: Vec<String>,
    ) -> Result<OrgMember> {
        let members = org::list_members(self.api, self.session, self.org).await?;

        match find_member(&members, username) {
            Some(existing) => {
                info!(
                    member = %existing.name,
                    roles = role_urls.len(),
                    "updating organization member roles"
                );
                org::update_member_roles(self.api, self.session, self.org, &existing.name, &role_urls)
                    .await
            }
            None => {
                info!(
                    username = %username,
                    roles = role_urls.len(),
                    "creating organization member"
                );
                org::create_member(self.api, self.session, self.org, user, &role_urls).await
            }
        }
    }
}

/// Member whose name and title both equal `username`
fn find_member<'m>(members: &'m [OrgMember], username: &str) -> Option<&'m OrgMember> {
    members
        .iter()
        .find(|m| m.name == username && m.title == username)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::HttpMethod;
    use crate::test_support::{FakePlatformApi, ENDPOINT};
    use pretty_assertions::assert_eq;

    fn member(name: &str, title: &str) -> OrgMember {
        OrgMember {
            name: name.to_string(),
            title: title.to_string(),
            url: format!("https://p/members/{}", name),
            role_urls: vec![],
        }
    }

    fn registered_user(fake: &FakePlatformApi, username: &str) -> PlatformUser {
        fake.users()
            .into_iter()
            .find(|u| u.username == username)
            .expect("user should be registered")
    }

    #[test]
    fn test_find_member_requires_name_and_title() {
        let members = [member("jdoe", "John Doe"), member("asmith", "asmith")];

        assert!(find_member(&members, "jdoe").is_none());
        assert_eq!(find_member(&members, "asmith").map(|m| m.name.as_str()), Some("asmith"));
    }

    #[test]
    fn test_find_member_is_case_sensitive() {
        let members = [member("JDOE", "JDOE")];
        assert!(find_member(&members, "jdoe").is_none());
    }

    #[tokio::test]
    async fn test_absent_member_is_posted_never_patched() {
        let fake = FakePlatformApi::new().with_roles(&["administrator"]).with_user("jdoe");
        let api = PlatformApiClient::new(ENDPOINT, &fake);
        let session = SessionHeaders::bearer("fake-platform-token");
        let reconciler = MembershipReconciler::new(&api, &session, "admin");
        let user = registered_user(&fake, "jdoe");
        let admin = FakePlatformApi::role_url("administrator");

        let created = reconciler.upsert("jdoe", &user, vec![admin.clone()]).await.unwrap();

        assert_eq!(created.role_urls, vec![admin]);
        assert_eq!(fake.calls_with(HttpMethod::Post).len(), 1);
        assert!(fake.calls_with(HttpMethod::Patch).is_empty());
    }

    #[tokio::test]
    async fn test_existing_member_is_patched_never_posted() {
        let viewer = FakePlatformApi::role_url("viewer");
        let admin = FakePlatformApi::role_url("administrator");
        let fake = FakePlatformApi::new()
            .with_roles(&["administrator", "viewer"])
            .with_user("jdoe")
            .with_member("jdoe", vec![viewer]);
        let api = PlatformApiClient::new(ENDPOINT, &fake);
        let session = SessionHeaders::bearer("fake-platform-token");
        let reconciler = MembershipReconciler::new(&api, &session, "admin");
        let user = registered_user(&fake, "jdoe");

        let updated = reconciler.upsert("jdoe", &user, vec![admin.clone()]).await.unwrap();

        assert_eq!(updated.role_urls, vec![admin.clone()]);
        assert_eq!(fake.member("jdoe").unwrap().role_urls, vec![admin]);
        assert!(fake.calls_with(HttpMethod::Post).is_empty());
        assert_eq!(fake.calls_with(HttpMethod::Patch).len(), 1);
    }

    #[tokio::test]
    async fn test_empty_role_set_still_updates() {
        let fake = FakePlatformApi::new()
            .with_roles(&["administrator"])
            .with_user("jdoe")
            .with_member("jdoe", vec![FakePlatformApi::role_url("administrator")]);
        let api = PlatformApiClient::new(ENDPOINT, &fake);
        let session = SessionHeaders::bearer("fake-platform-token");
        let reconciler = MembershipReconciler::new(&api, &session, "admin");
        let user = registered_user(&fake, "jdoe");

        let updated = reconciler.upsert("jdoe", &user, vec![]).await.unwrap();

        assert!(updated.role_urls.is_empty());
        assert!(fake.member("jdoe").unwrap().role_urls.is_empty());
    }

    #[tokio::test]
    async fn test_repeated_upsert_reaches_same_state() {
        let admin = FakePlatformApi::role_url("administrator");
        let fake = FakePlatformApi::new().with_roles(&["administrator"]).with_user("jdoe");
        let api = PlatformApiClient::new(ENDPOINT, &fake);
        let session = SessionHeaders::bearer("fake-platform-token");
        let reconciler = MembershipReconciler::new(&api, &session, "admin");
        let user = registered_user(&fake, "jdoe");

        let first = reconciler.upsert("jdoe", &user, vec![admin.clone()]).await.unwrap();
        let second = reconciler.upsert("jdoe", &user, vec![admin.clone()]).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(fake.members().len(), 1);
        assert_eq!(fake.calls_with(HttpMethod::Post).len(), 1);
        assert_eq!(fake.calls_with(HttpMethod::Patch).len(), 1);
    }

    #[tokio::test]
    async fn test_member_listing_failure_propagates() {
        let fake = FakePlatformApi::new()
            .with_user("jdoe")
            .failing_on(HttpMethod::Get, "/orgs/admin/members");
        let api = PlatformApiClient::new(ENDPOINT, &fake);
        let session = SessionHeaders::bearer("fake-platform-token");
        let reconciler = MembershipReconciler::new(&api, &session, "admin");
        let user = registered_user(&fake, "jdoe");

        let err = reconciler.upsert("jdoe", &user, vec![]).await.unwrap_err();

        assert!(err.to_string().contains("/orgs/admin/members"));
        assert!(fake.calls_with(HttpMethod::Post).is_empty());
        assert!(fake.calls_with(HttpMethod::Patch).is_empty());
    }
}
