//! Response builders shared by the dispatcher and the file server.
//!
//! # Design Decisions
//! - Error, redirect and not-modified responses always carry
//!   `Connection: close`; hyper closes the connection after flushing them
//! - Dates use the fixed RFC 1123 form, e.g. `Sun, 06 Nov 1994 08:49:37 GMT`

use std::time::{SystemTime, UNIX_EPOCH};

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode, Version};
use axum::response::Response;
use chrono::{DateTime, NaiveDateTime, Utc};

use crate::channel::handshake::SUPPORTED_VERSION;

pub const HTTP_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

fn with_status(status: StatusCode, body: Body) -> Response {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    response
}

fn close(response: &mut Response) {
    response
        .headers_mut()
        .insert(header::CONNECTION, HeaderValue::from_static("close"));
}

/// Plaintext `Failure: <status>` body; the connection is closed afterwards.
pub fn error(status: StatusCode) -> Response {
    let mut response = with_status(status, Body::from(format!("Failure: {status}\r\n")));
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=UTF-8"),
    );
    close(&mut response);
    response
}

/// `302 Found` to `location`.
pub fn redirect(location: &str) -> Response {
    let mut response = with_status(StatusCode::FOUND, Body::empty());
    match HeaderValue::from_str(location) {
        Ok(value) => {
            response.headers_mut().insert(header::LOCATION, value);
        }
        Err(_) => return error(StatusCode::INTERNAL_SERVER_ERROR),
    }
    close(&mut response);
    response
}

/// `304 Not Modified` with only a `Date` header.
pub fn not_modified() -> Response {
    let mut response = with_status(StatusCode::NOT_MODIFIED, Body::empty());
    insert_date(response.headers_mut(), header::DATE, SystemTime::now());
    close(&mut response);
    response
}

/// `426 Upgrade Required` advertising the one supported channel version.
pub fn unsupported_version() -> Response {
    let mut response = with_status(StatusCode::UPGRADE_REQUIRED, Body::empty());
    response.headers_mut().insert(
        header::SEC_WEBSOCKET_VERSION,
        HeaderValue::from_static(SUPPORTED_VERSION),
    );
    close(&mut response);
    response
}

pub fn http_date(time: SystemTime) -> String {
    DateTime::<Utc>::from(time).format(HTTP_DATE_FORMAT).to_string()
}

pub(crate) fn insert_date(headers: &mut HeaderMap, name: header::HeaderName, time: SystemTime) {
    if let Ok(value) = HeaderValue::from_str(&http_date(time)) {
        headers.insert(name, value);
    }
}

/// Parse an HTTP date into Unix seconds. Unparsable input is `None`.
pub fn parse_http_date(value: &str) -> Option<i64> {
    let value = value.trim();
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, HTTP_DATE_FORMAT) {
        return Some(naive.and_utc().timestamp());
    }
    DateTime::parse_from_rfc2822(value).ok().map(|dt| dt.timestamp())
}

/// Whole seconds since the epoch; pre-epoch times count as negative.
pub fn unix_seconds(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_secs() as i64,
        Err(e) => -(e.duration().as_secs() as i64),
    }
}

/// Does the client want the connection reused after this response?
pub fn is_keep_alive(version: Version, headers: &HeaderMap) -> bool {
    let connection = headers
        .get(header::CONNECTION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let has = |token: &str| {
        connection
            .split(',')
            .any(|t| t.trim().eq_ignore_ascii_case(token))
    };
    match version {
        Version::HTTP_09 | Version::HTTP_10 => has("keep-alive"),
        Version::HTTP_11 => !has("close"),
        _ => true,
    }
}
