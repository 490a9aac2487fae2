//! Dev-mode passthrough to the local development server
//!
//! In dev mode every non-API request is forwarded to the development server
//! on localhost, WebSocket upgrades included, so hot-module reloading works
//! through the same port that serves the status endpoints.

use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Empty, Full};
use hyper::body::{Bytes, Incoming};
use hyper::header::HeaderValue;
use hyper::upgrade::Upgraded;
use hyper::{Request, Response, StatusCode};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::{TokioExecutor, TokioIo};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, error, warn};

/// Forwards requests to the development server
pub struct DevProxy {
    client: Client<HttpConnector, Incoming>,
    port: u16,
}

impl DevProxy {
    pub fn new(port: u16) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_nodelay(true);
        connector.enforce_http(true);

        let client = Client::builder(TokioExecutor::new())
            .pool_max_idle_per_host(8)
            .pool_idle_timeout(Duration::from_secs(90))
            .build(connector);

        Self { client, port }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Forward a request to the development server unchanged and stream the
    /// response back.
    pub async fn forward(
        &self,
        req: Request<Incoming>,
    ) -> anyhow::Result<Response<BoxBody<Bytes, hyper::Error>>> {
        let uri = format!(
            "http://127.0.0.1:{}{}",
            self.port,
            req.uri()
                .path_and_query()
                .map(|pq| pq.as_str())
                .unwrap_or("/")
        );

        let (parts, body) = req.into_parts();
        let mut builder = Request::builder().method(parts.method).uri(&uri);
        for (key, value) in parts.headers.iter() {
            builder = builder.header(key, value);
        }
        let dev_req = builder
            .body(body)
            .map_err(|e| anyhow::anyhow!("Failed to build forwarded request: {}", e))?;

        let response = self.client.request(dev_req).await?;
        let (parts, body) = response.into_parts();
        Ok(Response::from_parts(parts, body.boxed()))
    }

    /// Handle a WebSocket upgrade request by speaking raw HTTP/1.1 to the
    /// development server and splicing the two connections together.
    pub async fn handle_upgrade(
        &self,
        req: Request<Incoming>,
        request_id: String,
    ) -> Result<Response<BoxBody<Bytes, hyper::Error>>, hyper::Error> {
        let upgrade_type = upgrade_type(&req).unwrap_or_else(|| "unknown".to_string());
        debug!(request_id, upgrade_type, "Handling upgrade request");

        let raw_request = build_upgrade_request(&req, self.port);

        let dev_addr = format!("127.0.0.1:{}", self.port);
        let mut dev_stream = match TcpStream::connect(&dev_addr).await {
            Ok(stream) => stream,
            Err(e) => {
                error!(port = self.port, error = %e, "Failed to connect to dev server for upgrade");
                return Ok(unavailable_response());
            }
        };

        if let Err(e) = dev_stream.write_all(&raw_request).await {
            error!(error = %e, "Failed to send upgrade request to dev server");
            return Ok(unavailable_response());
        }

        let mut head_buf = vec![0u8; 4096];
        let n = match dev_stream.read(&mut head_buf).await {
            Ok(n) if n > 0 => n,
            Ok(_) => {
                error!("Dev server closed connection before responding to upgrade");
                return Ok(unavailable_response());
            }
            Err(e) => {
                error!(error = %e, "Failed to read upgrade response from dev server");
                return Ok(unavailable_response());
            }
        };

        let (status, response_headers) = match parse_upgrade_head(&head_buf[..n]) {
            Some(parsed) => parsed,
            None => {
                error!("Failed to parse dev server upgrade response");
                return Ok(unavailable_response());
            }
        };

        if status != StatusCode::SWITCHING_PROTOCOLS {
            warn!(%status, "Dev server rejected upgrade request");
            // Pass the non-101 response back as-is
            let mut response = Response::builder().status(status);
            for (name, value) in &response_headers {
                if let Ok(hv) = HeaderValue::from_str(value) {
                    response = response.header(name.as_str(), hv);
                }
            }
            return Ok(response
                .body(Empty::<Bytes>::new().map_err(|never| match never {}).boxed())
                .expect("valid response builder"));
        }

        debug!(request_id, upgrade_type, "WebSocket upgrade successful");

        let mut response = Response::builder().status(StatusCode::SWITCHING_PROTOCOLS);
        for (name, value) in &response_headers {
            // Skip hop-by-hop headers that hyper handles
            let name_lower = name.to_lowercase();
            if name_lower == "content-length" || name_lower == "transfer-encoding" {
                continue;
            }
            if let Ok(hv) = HeaderValue::from_str(value) {
                response = response.header(name.as_str(), hv);
            }
        }
        let response = response
            .body(Empty::<Bytes>::new().map_err(|never| match never {}).boxed())
            .expect("valid response builder");

        tokio::spawn(async move {
            match hyper::upgrade::on(req).await {
                Ok(upgraded) => {
                    pipe_upgraded(upgraded, dev_stream, &request_id).await;
                }
                Err(e) => {
                    error!(request_id, error = %e, "Failed to upgrade client connection");
                }
            }
        });

        Ok(response)
    }
}

/// Check if a request asks for a protocol upgrade (WebSocket)
pub fn is_upgrade_request<B>(req: &Request<B>) -> bool {
    let has_upgrade_connection = req
        .headers()
        .get(hyper::header::CONNECTION)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_lowercase().contains("upgrade"))
        .unwrap_or(false);

    let has_upgrade_header = req.headers().contains_key(hyper::header::UPGRADE);

    has_upgrade_connection && has_upgrade_header
}

fn upgrade_type<B>(req: &Request<B>) -> Option<String> {
    req.headers()
        .get(hyper::header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_lowercase())
}

/// Build the raw HTTP/1.1 upgrade request sent to the dev server
fn build_upgrade_request<B>(req: &Request<B>, port: u16) -> Vec<u8> {
    let path = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let mut request = format!("{} {} HTTP/1.1\r\n", req.method(), path);

    for (name, value) in req.headers() {
        if name == hyper::header::HOST {
            continue;
        }
        if let Ok(v) = value.to_str() {
            request.push_str(&format!("{}: {}\r\n", name, v));
        }
    }

    request.push_str(&format!("Host: 127.0.0.1:{}\r\n", port));
    request.push_str("\r\n");

    request.into_bytes()
}

/// Parse the status line and headers of the dev server's upgrade response
fn parse_upgrade_head(data: &[u8]) -> Option<(StatusCode, Vec<(String, String)>)> {
    let response_str = std::str::from_utf8(data).ok()?;
    let mut lines = response_str.lines();

    let status_line = lines.next()?;
    let parts: Vec<&str> = status_line.splitn(3, ' ').collect();
    if parts.len() < 2 {
        return None;
    }

    let status_code: u16 = parts[1].parse().ok()?;
    let status = StatusCode::from_u16(status_code).ok()?;

    let mut headers = Vec::new();
    for line in lines {
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            headers.push((name.trim().to_string(), value.trim().to_string()));
        }
    }

    Some((status, headers))
}

/// Splice the upgraded client connection and the dev server socket together
async fn pipe_upgraded(client: Upgraded, dev_server: TcpStream, request_id: &str) {
    let mut client_io = TokioIo::new(client);
    let mut dev_io = dev_server;

    match tokio::io::copy_bidirectional(&mut client_io, &mut dev_io).await {
        Ok((client_to_dev, dev_to_client)) => {
            debug!(
                request_id,
                client_to_dev, dev_to_client, "WebSocket connection closed normally"
            );
        }
        Err(e) => {
            debug!(request_id, error = %e, "WebSocket connection closed with error");
        }
    }
}

/// 502 returned when the dev server cannot be reached
fn unavailable_response() -> Response<BoxBody<Bytes, hyper::Error>> {
    Response::builder()
        .status(StatusCode::BAD_GATEWAY)
        .header(hyper::header::CONTENT_TYPE, "application/json")
        .header(hyper::header::ACCESS_CONTROL_ALLOW_ORIGIN, "*")
        .body(
            Full::new(Bytes::from(r#"{"error":"Dev server unavailable"}"#))
                .map_err(|never| match never {})
                .boxed(),
        )
        .expect("valid response with static headers")
}
