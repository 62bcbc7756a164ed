//! token-provisioner: token endpoint proxy
//!
//! Lightweight HTTP server using hyper. Token requests are forwarded to the
//! upstream token endpoint and a successful response is only released once
//! the subject's platform access has been provisioned.
//! Uses a single-threaded tokio runtime (core's async traits are !Send), with
//! connections served on a LocalSet.

use anyhow::Context;
use clap::Parser;
use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::header::{
    HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION, CACHE_CONTROL, CONTENT_TYPE, PRAGMA,
};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use std::path::PathBuf;
use std::rc::Rc;
use tracing::{error, info, warn};

use token_provisioner_core::config::Config;
use token_provisioner_core::error::{INVALID_REQUEST, SERVER_ERROR};
use token_provisioner_core::proxy::{gateway, ProxyResponse, TokenProxy};

mod ldap;
mod platform;

use ldap::LdapDirectoryClient;
use platform::{ReqwestHttpClient, SystemClock};

const UPSTREAM_UNAVAILABLE: &str = "The token proxy failed to reach the token endpoint.";

#[derive(Parser)]
#[command(name = "token-provisioner", version, about)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, default_value = "provisioner.toml")]
    config: PathBuf,
}

/// Shared application state
struct AppState {
    config: Config,
    /// Platform API and JWKS calls, bound to the platform TLS profile
    platform_http: ReqwestHttpClient,
    upstream_http: ReqwestHttpClient,
    directory: LdapDirectoryClient,
    clock: SystemClock,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing()?;

    let config = Config::load(&cli.config)
        .with_context(|| format!("failed to load configuration from {}", cli.config.display()))?;
    anyhow::ensure!(
        !config.proxy.upstream_token_url.is_empty(),
        "proxy.upstream_token_url must be set"
    );

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;
    let local = tokio::task::LocalSet::new();

    local.block_on(&runtime, serve(config))
}

fn init_tracing() -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_env("PROVISIONER_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|error| anyhow::anyhow!("failed to initialize tracing subscriber: {error}"))?;

    Ok(())
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let platform_http = ReqwestHttpClient::with_profile(&config.platform.tls)?;
    let upstream_http = ReqwestHttpClient::new()?;
    let directory = LdapDirectoryClient::new(config.directory.clone(), config.directory_tls())?;

    let listener = tokio::net::TcpListener::bind(&config.proxy.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.proxy.listen_addr))?;

    info!(
        addr = %config.proxy.listen_addr,
        token_path = %config.proxy.token_path,
        upstream = %config.proxy.upstream_token_url,
        "token-provisioner listening"
    );

    let state = Rc::new(AppState {
        config,
        platform_http,
        upstream_http,
        directory,
        clock: SystemClock,
    });

    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!(error = %e, "accept failed");
                continue;
            }
        };

        let state = state.clone();
        tokio::task::spawn_local(async move {
            let io = hyper_util::rt::TokioIo::new(stream);
            let service = service_fn(move |req| {
                let state = state.clone();
                async move { handle_request(req, &state).await }
            });

            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                warn!(peer = %peer, error = %e, "connection error");
            }
        });
    }
}

type HyperResponse = Response<Full<Bytes>>;

async fn handle_request(
    req: Request<Incoming>,
    state: &AppState,
) -> Result<HyperResponse, std::convert::Infallible> {
    Ok(route_request(req, state).await)
}

async fn route_request(req: Request<Incoming>, state: &AppState) -> HyperResponse {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    if method == Method::GET && path == "/" {
        return handle_health();
    }
    if method == Method::POST && path == state.config.proxy.token_path {
        return handle_token(req, state).await;
    }

    json_response(StatusCode::NOT_FOUND, &serde_json::json!({"error": "not_found"}))
}

fn handle_health() -> HyperResponse {
    json_response(
        StatusCode::OK,
        &serde_json::json!({
            "name": "token-provisioner",
            "version": env!("CARGO_PKG_VERSION"),
        }),
    )
}

async fn handle_token(req: Request<Incoming>, state: &AppState) -> HyperResponse {
    let headers = forwarded_headers(req.headers());

    let body = match req.collect().await {
        Ok(b) => b.to_bytes().to_vec(),
        Err(e) => {
            warn!(error = %e, "failed to read request body");
            return render(gateway::reject(INVALID_REQUEST, "failed to read request body"));
        }
    };

    let header_refs: Vec<(&str, &str)> = headers
        .iter()
        .map(|(name, value)| (*name, value.as_str()))
        .collect();

    let upstream = match state
        .upstream_http
        .forward(&state.config.proxy.upstream_token_url, &header_refs, body)
        .await
    {
        Ok(upstream) => upstream,
        Err(e) => {
            error!(
                upstream = %state.config.proxy.upstream_token_url,
                error = %e,
                "token endpoint unreachable"
            );
            return render(gateway::reject(SERVER_ERROR, UPSTREAM_UNAVAILABLE));
        }
    };

    let proxy = TokenProxy::new(
        &state.config,
        &state.platform_http,
        &state.directory,
        &state.clock,
    );

    render(proxy.handle(upstream).await)
}

/// Request headers passed on to the token endpoint
fn forwarded_headers(headers: &HeaderMap) -> Vec<(&'static str, String)> {
    [("Content-Type", CONTENT_TYPE), ("Authorization", AUTHORIZATION), ("Accept", ACCEPT)]
        .into_iter()
        .filter_map(|(name, key)| {
            headers
                .get(key)
                .and_then(|v| v.to_str().ok())
                .map(|v| (name, v.to_string()))
        })
        .collect()
}

fn render(response: ProxyResponse) -> HyperResponse {
    match response {
        ProxyResponse::Forward(upstream) => {
            let mut out = Response::new(Full::new(Bytes::from(upstream.body)));
            *out.status_mut() =
                StatusCode::from_u16(upstream.status).unwrap_or(StatusCode::BAD_GATEWAY);
            let headers = out.headers_mut();
            for (name, value) in &upstream.headers {
                let (Ok(name), Ok(value)) =
                    (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value))
                else {
                    warn!(header = %name, "dropping malformed upstream header");
                    continue;
                };
                headers.append(name, value);
            }
            headers
                .entry(CONTENT_TYPE)
                .or_insert(HeaderValue::from_static("application/json"));
            headers
                .entry(CACHE_CONTROL)
                .or_insert(HeaderValue::from_static("no-store"));
            headers.entry(PRAGMA).or_insert(HeaderValue::from_static("no-cache"));
            out
        }
        ProxyResponse::Reject(body) => {
            let status =
                StatusCode::from_u16(body.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            json_response(status, &body)
        }
    }
}

fn json_response<T: serde::Serialize>(status: StatusCode, body: &T) -> HyperResponse {
    let json = serde_json::to_vec(body).unwrap_or_default();
    let mut out = Response::new(Full::new(Bytes::from(json)));
    *out.status_mut() = status;
    out.headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    no_store(out)
}

fn no_store(mut response: HyperResponse) -> HyperResponse {
    let headers = response.headers_mut();
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
    headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
    response
}
