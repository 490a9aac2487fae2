//! HTTP front door for the portfolio site
//!
//! One listener, one dispatch function: requests are routed by exact URL path
//! to the health check, the status aggregator, the game-status file, or the
//! mode-specific content backend (static bundle or dev-server passthrough).
//! Stateless per request; the only cross-request state is the immutable
//! application context.

use crate::config::{Config, ServerMode};
use crate::proxy::{self, DevProxy};
use crate::static_files::{StaticReply, StaticServer};
use crate::status::{self, DeploymentHealth, StatusAggregator};
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::header::{
    HeaderValue, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN, CACHE_CONTROL, CONTENT_TYPE,
};
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as AutoBuilder;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Version information for the server
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const PKG_NAME: &str = env!("CARGO_PKG_NAME");

/// Header name for request ID
const X_REQUEST_ID: &str = "x-request-id";
/// Header name for forwarded-for
const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Immutable per-process state shared by every request
pub struct AppContext {
    pub config: Config,
    pub aggregator: StatusAggregator,
    pub backend: SiteBackend,
    pub started_at: Instant,
}

/// Content backend for non-API paths, fixed at startup by the server mode
pub enum SiteBackend {
    Static(StaticServer),
    Dev(DevProxy),
}

impl AppContext {
    pub fn new(config: Config) -> Self {
        let aggregator = StatusAggregator::new(&config);
        let backend = match config.server.mode {
            ServerMode::Static => {
                SiteBackend::Static(StaticServer::new(config.site.static_root.clone()))
            }
            ServerMode::Dev => SiteBackend::Dev(DevProxy::new(config.server.dev_server_port)),
        };

        Self {
            config,
            aggregator,
            backend,
            started_at: Instant::now(),
        }
    }
}

/// The site server: accept loop plus per-request dispatch
pub struct SiteServer {
    bind_addr: SocketAddr,
    context: Arc<AppContext>,
    shutdown_rx: watch::Receiver<bool>,
}

impl SiteServer {
    pub fn new(
        bind_addr: SocketAddr,
        context: Arc<AppContext>,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            bind_addr,
            context,
            shutdown_rx,
        }
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let listener = TcpListener::bind(self.bind_addr).await?;
        info!(
            addr = %self.bind_addr,
            mode = self.context.config.server.mode.as_str(),
            "Site server listening (HTTP/1.1 and HTTP/2)"
        );

        let mut shutdown_rx = self.shutdown_rx.clone();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let context = Arc::clone(&self.context);
                            tokio::spawn(async move {
                                if let Err(e) = handle_connection(stream, addr, context).await {
                                    debug!(addr = %addr, error = %e, "Connection error");
                                }
                            });
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to accept connection");
                        }
                    }
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Site server shutting down");
                        break;
                    }
                }
            }
        }

        Ok(())
    }
}

async fn handle_connection<S>(
    stream: S,
    addr: SocketAddr,
    context: Arc<AppContext>,
) -> anyhow::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let io = TokioIo::new(stream);

    let service = service_fn(move |req: Request<Incoming>| {
        let ctx = Arc::clone(&context);
        let client_addr = addr;
        async move { handle_request(req, ctx, client_addr).await }
    });

    // Upgrade support is required for WebSocket passthrough in dev mode
    AutoBuilder::new(TokioExecutor::new())
        .serve_connection_with_upgrades(io, service)
        .await
        .map_err(|e| anyhow::anyhow!("Connection error: {}", e))?;

    Ok(())
}

async fn handle_request(
    mut req: Request<Incoming>,
    ctx: Arc<AppContext>,
    client_addr: SocketAddr,
) -> Result<Response<BoxBody<Bytes, hyper::Error>>, hyper::Error> {
    // Generate or propagate request ID
    let request_id = req
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .map(String::from)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let path = req.uri().path().to_string();
    debug!(method = %req.method(), path, request_id, "Incoming request");

    if req.method() == Method::OPTIONS {
        return Ok(preflight_response());
    }

    // Dispatch purely on path; the API surface is identical in both modes
    let response = match path.as_str() {
        "/health" => {
            let health =
                DeploymentHealth::now(&ctx.config.server.slot, ctx.started_at);
            json_response(to_json(&health))
        }

        "/version" => {
            let version_info = serde_json::json!({
                "name": PKG_NAME,
                "version": VERSION,
            });
            json_response(version_info.to_string())
        }

        "/api/status" => match ctx.aggregator.fetch_status().await {
            Ok(aggregate) => no_cache_json_response(to_json(&aggregate)),
            Err(e) => {
                warn!(request_id, error = %e, "Status aggregation failed");
                no_cache_json_response(r#"{"error":"Unable to fetch status"}"#)
            }
        },

        "/api/minecraft-status" => {
            let game_status = status::read_game_status(&ctx.config.site.status_file).await;
            no_cache_json_response(game_status.to_string())
        }

        _ => match &ctx.backend {
            SiteBackend::Static(statics) => {
                let reply = if path == "/" || path == "/index.html" {
                    statics.serve_entry().await
                } else {
                    statics.serve(&path).await
                };
                static_response(reply)
            }

            SiteBackend::Dev(dev_proxy) => {
                // Tag the forwarded request the way a first trusted hop does
                let headers = req.headers_mut();
                if let Ok(value) = HeaderValue::from_str(&request_id) {
                    headers.insert(X_REQUEST_ID, value);
                }
                if let Ok(value) = HeaderValue::from_str(&client_addr.ip().to_string()) {
                    headers.insert(X_FORWARDED_FOR, value);
                }

                if proxy::is_upgrade_request(&req) {
                    return dev_proxy.handle_upgrade(req, request_id).await;
                }

                match dev_proxy.forward(req).await {
                    Ok(response) => response,
                    Err(e) => {
                        error!(request_id, port = dev_proxy.port(), error = %e, "Failed to forward request to dev server");
                        dev_unavailable_response()
                    }
                }
            }
        },
    };

    Ok(response)
}

fn to_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
}

fn full_body(body: impl Into<Bytes>) -> BoxBody<Bytes, hyper::Error> {
    Full::new(body.into())
        .map_err(|never| match never {})
        .boxed()
}

/// JSON response, open to cross-origin reads
fn json_response(body: impl Into<Bytes>) -> Response<BoxBody<Bytes, hyper::Error>> {
    Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, "application/json")
        .header(ACCESS_CONTROL_ALLOW_ORIGIN, "*")
        .body(full_body(body))
        .expect("valid response with static headers")
}

/// JSON response for the status endpoints, which must never be cached
fn no_cache_json_response(body: impl Into<Bytes>) -> Response<BoxBody<Bytes, hyper::Error>> {
    Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, "application/json")
        .header(CACHE_CONTROL, "no-cache")
        .header(ACCESS_CONTROL_ALLOW_ORIGIN, "*")
        .body(full_body(body))
        .expect("valid response with static headers")
}

/// Map a static lookup outcome to its HTTP response
fn static_response(reply: StaticReply) -> Response<BoxBody<Bytes, hyper::Error>> {
    match reply {
        StaticReply::File {
            bytes,
            content_type,
            cacheable,
        } => {
            let cache_control = if cacheable {
                "public, max-age=31536000"
            } else {
                "no-cache"
            };
            static_builder()
                .status(StatusCode::OK)
                .header(CONTENT_TYPE, content_type)
                .header(CACHE_CONTROL, cache_control)
                .body(full_body(bytes))
                .expect("valid response with static headers")
        }
        StaticReply::Forbidden => static_builder()
            .status(StatusCode::FORBIDDEN)
            .header(CONTENT_TYPE, "text/plain")
            .body(full_body("Forbidden"))
            .expect("valid response with static headers"),
        StaticReply::NotFound => static_builder()
            .status(StatusCode::NOT_FOUND)
            .header(CONTENT_TYPE, "text/plain")
            .body(full_body("Not Found"))
            .expect("valid response with static headers"),
        StaticReply::Error(kind) => static_builder()
            .status(StatusCode::INTERNAL_SERVER_ERROR)
            .header(CONTENT_TYPE, "text/plain")
            .body(full_body(format!("Internal error: {}", kind)))
            .expect("valid response with static headers"),
    }
}

/// Response builder carrying the permissive CORS allow-lists used for static
/// content
fn static_builder() -> hyper::http::response::Builder {
    Response::builder()
        .header(ACCESS_CONTROL_ALLOW_ORIGIN, "*")
        .header(ACCESS_CONTROL_ALLOW_METHODS, "GET, OPTIONS")
        .header(ACCESS_CONTROL_ALLOW_HEADERS, "Content-Type")
}

/// 204 preflight answer with the CORS allow-lists
fn preflight_response() -> Response<BoxBody<Bytes, hyper::Error>> {
    static_builder()
        .status(StatusCode::NO_CONTENT)
        .body(full_body(Bytes::new()))
        .expect("valid response with static headers")
}

/// 502 when the dev server cannot be reached
fn dev_unavailable_response() -> Response<BoxBody<Bytes, hyper::Error>> {
    Response::builder()
        .status(StatusCode::BAD_GATEWAY)
        .header(CONTENT_TYPE, "application/json")
        .header(ACCESS_CONTROL_ALLOW_ORIGIN, "*")
        .body(full_body(r#"{"error":"Dev server unavailable"}"#))
        .expect("valid response with static headers")
}
