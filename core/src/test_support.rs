//! Test doubles for the platform traits and the remote systems

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::config::{Config, DirectoryConfig, OidcConfig, PlatformConfig, ProxyConfig, TlsProfile};
use crate::directory::{DirectoryError, DirectoryGroup, DirectoryGroupClient, DirectoryQuery};
use crate::platform::{Clock, HttpClient, HttpError, HttpMethod, HttpResponse};
use crate::platform_api::{OrgMember, OrgRole, PlatformUser};

pub const ENDPOINT: &str = "https://platform.example.org/api";

/// Configuration used across tests
pub fn sample_config() -> Config {
    Config {
        platform: PlatformConfig {
            endpoint: ENDPOINT.to_string(),
            tls: TlsProfile::default(),
            org: "admin".to_string(),
            registry: "sso-oidc".to_string(),
            username: "svc-admin".to_string(),
            password: "password".to_string(),
            client_id: "proxy-client".to_string(),
            client_secret: "secret".to_string(),
            realm: "admin/default-idp-1".to_string(),
        },
        directory: DirectoryConfig {
            server: "ldap.example.org".to_string(),
            port: 636,
            use_ssl: true,
            use_starttls: false,
            bind_dn: "CN=SVC_Proxy,OU=Service Accounts,DC=EXAMPLE,DC=ORG".to_string(),
            bind_password: "password".to_string(),
            target_dn: "OU=Groups,DC=EXAMPLE,DC=ORG".to_string(),
            attribute_name: "member".to_string(),
            filter: "(&(member=*)(cn=GR-APIC_*))".to_string(),
            timeout_secs: 10,
            tls: None,
        },
        role_mapping: BTreeMap::from([
            ("GR-APIC_ADMIN_MEMBER".to_string(), "administrator".to_string()),
            ("GR-APIC_ADMIN_VIEWER".to_string(), "viewer".to_string()),
        ]),
        oidc: OidcConfig::default(),
        proxy: ProxyConfig::default(),
    }
}

/// JWT with the given payload and a placeholder signature
pub fn unsigned_id_token(payload: &Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","typ":"JWT"}"#);
    let body = URL_SAFE_NO_PAD.encode(payload.to_string());
    format!("{}.{}.c2lnbmF0dXJl", header, body)
}

/// One outbound request seen by a test double
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

fn record(method: HttpMethod, url: &str, headers: &[(&str, &str)], body: &[u8]) -> RecordedCall {
    RecordedCall {
        method,
        url: url.to_string(),
        headers: headers
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
        body: body.to_vec(),
    }
}

/// Mock HTTP client with pre-configured responses, recording every call
///
/// A response is picked by method and a substring of the URL; unmatched
/// calls fail at the transport level.
pub struct MockHttp {
    responses: Vec<(HttpMethod, String, HttpResponse)>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl MockHttp {
    pub fn new() -> Self {
        Self {
            responses: Vec::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn on(mut self, method: HttpMethod, pattern: &str, status: u16, body: &str) -> Self {
        self.responses.push((
            method,
            pattern.to_string(),
            HttpResponse {
                status,
                body: body.as_bytes().to_vec(),
            },
        ));
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_with(&self, method: HttpMethod) -> Vec<RecordedCall> {
        self.calls().into_iter().filter(|c| c.method == method).collect()
    }

    fn respond(
        &self,
        method: HttpMethod,
        url: &str,
        headers: &[(&str, &str)],
        body: &[u8],
    ) -> Result<HttpResponse, HttpError> {
        self.calls.lock().unwrap().push(record(method, url, headers, body));

        self.responses
            .iter()
            .find(|(m, pattern, _)| *m == method && url.contains(pattern.as_str()))
            .map(|(_, _, response)| response.clone())
            .ok_or_else(|| HttpError::new(format!("no mock response for {} {}", method, url)))
    }
}

#[async_trait(?Send)]
impl HttpClient for MockHttp {
    async fn get(&self, url: &str, headers: &[(&str, &str)]) -> Result<HttpResponse, HttpError> {
        self.respond(HttpMethod::Get, url, headers, &[])
    }

    async fn post(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        body: &[u8],
    ) -> Result<HttpResponse, HttpError> {
        self.respond(HttpMethod::Post, url, headers, body)
    }

    async fn patch(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        body: &[u8],
    ) -> Result<HttpResponse, HttpError> {
        self.respond(HttpMethod::Patch, url, headers, body)
    }
}

/// Mock clock with a fixed timestamp
pub struct MockClock(pub u64);

impl Clock for MockClock {
    fn now_secs(&self) -> u64 {
        self.0
    }
}

/// Directory double returning a fixed outcome and counting lookups
pub struct MockDirectory {
    outcome: Result<Vec<DirectoryGroup>, String>,
    lookups: Mutex<Vec<DirectoryQuery>>,
}

impl MockDirectory {
    pub fn with_groups(groups: Vec<DirectoryGroup>) -> Self {
        Self {
            outcome: Ok(groups),
            lookups: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            outcome: Err(message.to_string()),
            lookups: Mutex::new(Vec::new()),
        }
    }

    pub fn lookups(&self) -> Vec<DirectoryQuery> {
        self.lookups.lock().unwrap().clone()
    }
}

#[async_trait(?Send)]
impl DirectoryGroupClient for MockDirectory {
    async fn lookup_groups(
        &self,
        query: &DirectoryQuery,
    ) -> Result<Vec<DirectoryGroup>, DirectoryError> {
        self.lookups.lock().unwrap().push(query.clone());
        self.outcome.clone().map_err(DirectoryError::search)
    }
}

const FAKE_TOKEN: &str = "fake-platform-token";

#[derive(Default)]
struct FakeState {
    users: Vec<PlatformUser>,
    roles: Vec<OrgRole>,
    members: Vec<OrgMember>,
    next_id: u32,
}

/// Stateful stand-in for the platform management API (org `admin`,
/// registry `sso-oidc`), so repeated pipeline runs observe earlier writes
pub struct FakePlatformApi {
    state: Mutex<FakeState>,
    calls: Mutex<Vec<RecordedCall>>,
    fail_on: Option<(HttpMethod, String)>,
}

impl FakePlatformApi {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeState::default()),
            calls: Mutex::new(Vec::new()),
            fail_on: None,
        }
    }

    pub fn with_roles(self, names: &[&str]) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            for name in names {
                state.roles.push(OrgRole {
                    name: name.to_string(),
                    title: name.to_string(),
                    url: Self::role_url(name),
                });
            }
        }
        self
    }

    pub fn with_user(self, username: &str) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            let user = Self::new_user(&mut state, username);
            state.users.push(user);
        }
        self
    }

    pub fn with_member(self, username: &str, role_urls: Vec<String>) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state.members.push(OrgMember {
                name: username.to_string(),
                title: username.to_string(),
                url: format!("{}/orgs/admin/members/{}", ENDPOINT, username),
                role_urls,
            });
        }
        self
    }

    /// Answer 500 to the first call whose method matches and URL contains `pattern`
    pub fn failing_on(mut self, method: HttpMethod, pattern: &str) -> Self {
        self.fail_on = Some((method, pattern.to_string()));
        self
    }

    pub fn role_url(name: &str) -> String {
        format!("{}/orgs/admin/roles/{}", ENDPOINT, name)
    }

    pub fn member(&self, name: &str) -> Option<OrgMember> {
        let state = self.state.lock().unwrap();
        state.members.iter().find(|m| m.name == name).cloned()
    }

    pub fn members(&self) -> Vec<OrgMember> {
        self.state.lock().unwrap().members.clone()
    }

    pub fn users(&self) -> Vec<PlatformUser> {
        self.state.lock().unwrap().users.clone()
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_with(&self, method: HttpMethod) -> Vec<RecordedCall> {
        self.calls().into_iter().filter(|c| c.method == method).collect()
    }

    fn new_user(state: &mut FakeState, username: &str) -> PlatformUser {
        state.next_id += 1;
        PlatformUser {
            username: username.to_string(),
            url: format!("{}/user-registries/admin/sso-oidc/users/{}", ENDPOINT, state.next_id),
        }
    }

    fn reply(status: u16, body: Value) -> HttpResponse {
        HttpResponse {
            status,
            body: body.to_string().into_bytes(),
        }
    }

    fn handle(
        &self,
        method: HttpMethod,
        url: &str,
        headers: &[(&str, &str)],
        body: &[u8],
    ) -> Result<HttpResponse, HttpError> {
        self.calls.lock().unwrap().push(record(method, url, headers, body));

        if let Some((fail_method, pattern)) = &self.fail_on {
            if *fail_method == method && url.contains(pattern.as_str()) {
                return Ok(Self::reply(500, json!({"message": "injected failure"})));
            }
        }

        let path = url
            .strip_prefix(ENDPOINT)
            .ok_or_else(|| HttpError::new(format!("unexpected host in {}", url)))?;
        let (path, _query) = path.split_once('?').unwrap_or((path, ""));

        if method == HttpMethod::Post && path == "/token" {
            return Ok(Self::reply(200, json!({"access_token": FAKE_TOKEN, "token_type": "Bearer"})));
        }

        let bearer = format!("Bearer {}", FAKE_TOKEN);
        if !headers.iter().any(|(k, v)| *k == "Authorization" && *v == bearer) {
            return Ok(Self::reply(401, json!({"message": "missing bearer token"})));
        }

        let request: Value = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(body).map_err(|e| HttpError::new(e.to_string()))?
        };

        let mut state = self.state.lock().unwrap();
        let response = match (method, path) {
            (HttpMethod::Get, "/user-registries/admin/sso-oidc/users") => {
                Self::reply(200, json!({ "results": state.users }))
            }
            (HttpMethod::Post, "/user-registries/admin/sso-oidc/users") => {
                let username = request["username"].as_str().unwrap_or_default().to_string();
                let user = Self::new_user(&mut state, &username);
                state.users.push(user.clone());
                Self::reply(201, json!(user))
            }
            (HttpMethod::Get, "/orgs/admin/roles") => Self::reply(200, json!({ "results": state.roles })),
            (HttpMethod::Get, "/orgs/admin/members") => {
                let listed: Vec<Value> = state
                    .members
                    .iter()
                    .map(|m| json!({"name": m.name, "title": m.title, "url": m.url}))
                    .collect();
                Self::reply(200, json!({ "results": listed }))
            }
            (HttpMethod::Post, "/orgs/admin/members") => {
                let user_url = request["user"]["url"].as_str().unwrap_or_default();
                let Some(user) = state.users.iter().find(|u| u.url == user_url).cloned() else {
                    return Ok(Self::reply(400, json!({"message": "unknown user"})));
                };
                if state.members.iter().any(|m| m.name == user.username) {
                    return Ok(Self::reply(409, json!({"message": "member exists"})));
                }
                let member = OrgMember {
                    name: user.username.clone(),
                    title: user.username.clone(),
                    url: format!("{}/orgs/admin/members/{}", ENDPOINT, user.username),
                    role_urls: serde_json::from_value(request["role_urls"].clone()).unwrap_or_default(),
                };
                state.members.push(member.clone());
                Self::reply(201, json!(member))
            }
            (HttpMethod::Patch, p) if p.starts_with("/orgs/admin/members/") => {
                let name = &p["/orgs/admin/members/".len()..];
                let Some(member) = state.members.iter_mut().find(|m| m.name == name) else {
                    return Ok(Self::reply(404, json!({"message": "no such member"})));
                };
                member.role_urls = serde_json::from_value(request["role_urls"].clone()).unwrap_or_default();
                Self::reply(200, json!(member.clone()))
            }
            _ => Self::reply(404, json!({"message": format!("no route for {} {}", method, path)})),
        };

        Ok(response)
    }
}

#[async_trait(?Send)]
impl HttpClient for FakePlatformApi {
    async fn get(&self, url: &str, headers: &[(&str, &str)]) -> Result<HttpResponse, HttpError> {
        self.handle(HttpMethod::Get, url, headers, &[])
    }

    async fn post(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        body: &[u8],
    ) -> Result<HttpResponse, HttpError> {
        self.handle(HttpMethod::Post, url, headers, body)
    }

    async fn patch(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        body: &[u8],
    ) -> Result<HttpResponse, HttpError> {
        self.handle(HttpMethod::Patch, url, headers, body)
    }
}
