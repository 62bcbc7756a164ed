//! LDAP-backed directory group client
//!
//! Opens one connection per lookup, binds with the service account, runs a
//! subtree search and unbinds. TLS uses the directory's own profile, or the
//! platform profile when none is configured.

use anyhow::Context;
use async_trait::async_trait;
use ldap3::{Ldap, LdapConnAsync, LdapConnSettings, Scope, SearchEntry};
use native_tls::{Certificate, Identity, TlsConnector};
use std::time::Duration;
use tracing::{debug, warn};

use token_provisioner_core::config::{DirectoryConfig, TlsProfile};
use token_provisioner_core::directory::{
    leading_rdn_value, DirectoryError, DirectoryGroup, DirectoryGroupClient, DirectoryQuery,
};

/// LDAP result code for invalid credentials
const INVALID_CREDENTIALS: u32 = 49;

const PEM_CERT_END: &str = "-----END CERTIFICATE-----";

pub struct LdapDirectoryClient {
    config: DirectoryConfig,
    connector: TlsConnector,
}

impl LdapDirectoryClient {
    pub fn new(config: DirectoryConfig, tls: &TlsProfile) -> anyhow::Result<Self> {
        let connector = tls_connector(tls)?;
        Ok(Self { config, connector })
    }

    async fn connect(&self) -> Result<Ldap, DirectoryError> {
        let url = self.config.url();
        debug!(url = %url, "connecting to directory server");

        let settings = LdapConnSettings::new()
            .set_conn_timeout(Duration::from_secs(self.config.timeout_secs))
            .set_starttls(self.config.use_starttls && !self.config.use_ssl)
            .set_connector(self.connector.clone());

        let (conn, mut ldap) = LdapConnAsync::with_settings(settings, &url)
            .await
            .map_err(|e| DirectoryError::connection(format!("{}: {}", url, e)))?;

        tokio::spawn(async move {
            if let Err(e) = conn.drive().await {
                warn!(error = %e, "directory connection driver error");
            }
        });

        ldap.with_timeout(Duration::from_secs(self.config.timeout_secs));

        let result = ldap
            .simple_bind(&self.config.bind_dn, &self.config.bind_password)
            .await
            .map_err(|e| DirectoryError::bind(format!("{}: {}", self.config.bind_dn, e)))?;

        if result.rc == INVALID_CREDENTIALS {
            return Err(DirectoryError::bind(format!(
                "invalid credentials for {}",
                self.config.bind_dn
            )));
        }
        if result.rc != 0 {
            return Err(DirectoryError::bind(format!(
                "bind failed with code {}: {}",
                result.rc, result.text
            )));
        }

        Ok(ldap)
    }

    async fn search(
        ldap: &mut Ldap,
        query: &DirectoryQuery,
    ) -> Result<Vec<DirectoryGroup>, DirectoryError> {
        let (entries, _) = ldap
            .search(
                &query.target_dn,
                Scope::Subtree,
                &query.filter,
                vec![query.attribute_name.as_str()],
            )
            .await
            .map_err(|e| DirectoryError::search(e.to_string()))?
            .success()
            .map_err(|e| DirectoryError::search(e.to_string()))?;

        Ok(entries
            .into_iter()
            .map(SearchEntry::construct)
            .map(|entry| entry_to_group(&entry, &query.attribute_name))
            .collect())
    }
}

#[async_trait(?Send)]
impl DirectoryGroupClient for LdapDirectoryClient {
    async fn lookup_groups(
        &self,
        query: &DirectoryQuery,
    ) -> Result<Vec<DirectoryGroup>, DirectoryError> {
        let mut ldap = self.connect().await?;

        let outcome = Self::search(&mut ldap, query).await;

        if let Err(e) = ldap.unbind().await {
            warn!(error = %e, "directory unbind failed");
        }

        let groups = outcome?;
        debug!(
            base = %query.target_dn,
            filter = %query.filter,
            groups = groups.len(),
            "directory search complete"
        );

        Ok(groups)
    }
}

/// Connector trusting the system roots plus the profile's CA bundle, and
/// presenting its client identity (PEM certificate and PKCS#8 key in one file)
fn tls_connector(profile: &TlsProfile) -> anyhow::Result<TlsConnector> {
    let mut builder = TlsConnector::builder();

    if let Some(path) = &profile.ca_cert {
        let pem = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read CA bundle {}", path.display()))?;
        let blocks: Vec<&str> = pem
            .split_inclusive(PEM_CERT_END)
            .filter(|block| block.contains(PEM_CERT_END))
            .collect();
        if blocks.is_empty() {
            anyhow::bail!("no certificates in CA bundle {}", path.display());
        }
        for block in blocks {
            let cert = Certificate::from_pem(block.trim().as_bytes())
                .with_context(|| format!("invalid CA bundle {}", path.display()))?;
            builder.add_root_certificate(cert);
        }
    }

    if let Some(path) = &profile.client_identity {
        let pem = std::fs::read(path)
            .with_context(|| format!("failed to read client identity {}", path.display()))?;
        let identity = Identity::from_pkcs8(&pem, &pem)
            .with_context(|| format!("invalid client identity {}", path.display()))?;
        builder.identity(identity);
    }

    debug!(profile = %profile.name, "building directory TLS connector");

    builder
        .build()
        .with_context(|| format!("failed to build directory TLS connector for profile {}", profile.name))
}

/// Group named by the entry's leading RDN, with uppercased member names
fn entry_to_group(entry: &SearchEntry, attribute_name: &str) -> DirectoryGroup {
    let members = entry
        .attrs
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(attribute_name))
        .map(|(_, values)| {
            values
                .iter()
                .map(|dn| leading_rdn_value(dn).to_uppercase())
                .collect()
        })
        .unwrap_or_default();

    DirectoryGroup::new(leading_rdn_value(&entry.dn), members)
}
