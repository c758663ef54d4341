//! Request logging middleware

use super::super::state::ServerState;
use crate::server::metrics::record_http_request;
use axum::{
    body::Body,
    extract::{MatchedPath, State},
    http::{header, HeaderMap, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::time::Instant;
use tracing::{error, info};

#[derive(PartialEq, PartialOrd, Clone, Debug, Default, clap::ValueEnum)]
pub enum RequestsLoggingLevel {
    None,
    #[default]
    Path,
    Headers,
    Body,
}

impl std::fmt::Display for RequestsLoggingLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

const MAX_LOGGABLE_BODY_LENGTH: usize = 1024;

/// Route label of requests no route matched. Keeps metric labels bounded.
const UNMATCHED_ROUTE: &str = "<unmatched>";

fn content_length(headers: &HeaderMap) -> Result<usize, &'static str> {
    headers
        .get(header::CONTENT_LENGTH)
        .ok_or("content-length not set")?
        .to_str()
        .map_err(|_| "unreadable content-length")?
        .parse::<usize>()
        .map_err(|_| "non-numeric content-length")
}

/// Upgrades and audio streams are passed through untouched.
fn is_loggable_body(headers: &HeaderMap) -> bool {
    if headers.contains_key(header::UPGRADE) {
        return false;
    }
    match headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
    {
        Some(content_type) => {
            content_type.starts_with("application/json") || content_type.starts_with("text/")
        }
        None => true,
    }
}

fn log_headers(direction: &str, headers: &HeaderMap) {
    for (name, value) in headers {
        if name == header::AUTHORIZATION {
            info!("  {} {}: <redacted>", direction, name);
        } else {
            info!("  {} {}: {:?}", direction, name, value);
        }
    }
}

/// Prints a small textual body and hands back an equivalent one.
async fn log_body(direction: &str, headers: &HeaderMap, body: Body) -> Result<Body, axum::Error> {
    if !is_loggable_body(headers) {
        info!("  {} body: not logged", direction);
        return Ok(body);
    }
    let size = match content_length(headers) {
        Ok(size) => size,
        Err(reason) => {
            info!("  {} body: {}", direction, reason);
            return Ok(body);
        }
    };
    if size >= MAX_LOGGABLE_BODY_LENGTH {
        info!(
            "  {} body: too big to log ({:#})",
            direction,
            byte_unit::Byte::from(size)
        );
        return Ok(body);
    }
    let bytes = axum::body::to_bytes(body, size).await?;
    info!("  {} body: {}", direction, String::from_utf8_lossy(&bytes));
    Ok(Body::from(bytes))
}

/// Logs each request at the configured level and records its metrics under
/// the matched route template, so media ids and channel keys never become
/// labels.
pub async fn log_requests(
    State(state): State<ServerState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let level = state.config.requests_logging_level.clone();
    let start = Instant::now();

    let method = request.method().to_string();
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| UNMATCHED_ROUTE.to_string());

    if level > RequestsLoggingLevel::None {
        info!(">>> {} {}", method, request.uri());
    }
    if level >= RequestsLoggingLevel::Headers {
        log_headers("req", request.headers());
    }
    if level >= RequestsLoggingLevel::Body {
        let (parts, body) = request.into_parts();
        match log_body("req", &parts.headers, body).await {
            Ok(body) => request = Request::from_parts(parts, body),
            Err(err) => {
                error!("Failed to read request body: {:?}", err);
                return (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
                    .into_response();
            }
        }
    }

    let mut response = next.run(request).await;

    if level >= RequestsLoggingLevel::Headers {
        log_headers("resp", response.headers());
    }
    if level >= RequestsLoggingLevel::Body {
        let (parts, body) = response.into_parts();
        match log_body("resp", &parts.headers, body).await {
            Ok(body) => response = Response::from_parts(parts, body),
            Err(err) => {
                error!("Failed to read response body: {:?}", err);
                return (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
                    .into_response();
            }
        }
    }

    let status = response.status().as_u16();
    let duration = start.elapsed();
    if level > RequestsLoggingLevel::None {
        info!("<<< {} {} ({}ms)", status, route, duration.as_millis());
    }
    record_http_request(&method, &route, status, duration);

    response
}
