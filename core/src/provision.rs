//! Access provisioning pipeline
//!
//! Runs the stages that bring the subject's organization membership in line
//! with its directory groups. Stages run strictly in order and the first
//! failure aborts the run; writes already made are left in place.

use tracing::{debug, info};

use crate::config::Config;
use crate::directory::DirectoryGroupClient;
use crate::error::Result;
use crate::membership::MembershipReconciler;
use crate::oidc::IdentityClaims;
use crate::platform::HttpClient;
use crate::platform_api::{auth, org, registry, OrgMember, PlatformApiClient, SessionHeaders};
use crate::roles::{resolve_roles, role_urls};

pub struct Provisioner<'a> {
    config: &'a Config,
    http: &'a dyn HttpClient,
    directory: &'a dyn DirectoryGroupClient,
}

impl<'a> Provisioner<'a> {
    pub fn new(
        config: &'a Config,
        http: &'a dyn HttpClient,
        directory: &'a dyn DirectoryGroupClient,
    ) -> Self {
        Self {
            config,
            http,
            directory,
        }
    }

    /// Provision `claims.subject` and return its resulting member record
    pub async fn provision(&self, claims: &IdentityClaims) -> Result<OrgMember> {
        let platform = &self.config.platform;
        let api = PlatformApiClient::new(&platform.endpoint, self.http);

        let token = auth::authenticate(&api, platform).await?;
        let session = SessionHeaders::bearer(&token);

        let user = registry::find_or_create_user(&api, &session, platform, claims).await?;

        let groups = self
            .directory
            .lookup_groups(&self.config.directory.query())
            .await?;
        debug!(groups = groups.len(), "directory groups fetched");

        let resolved = resolve_roles(&user.username, &groups, &self.config.role_mapping);

        let org_roles = org::list_roles(&api, &session, &platform.org).await?;
        let urls = role_urls(&org_roles, &resolved);

        info!(
            username = %user.username,
            roles = ?resolved,
            role_urls = urls.len(),
            "resolved platform roles"
        );

        MembershipReconciler::new(&api, &session, &platform.org)
            .upsert(&user.username, &user, urls)
            .await
    }
}
