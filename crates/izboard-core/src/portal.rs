//! HTTP surface of the setup portal.
//!
//! Serves the settings form, accepts the urlencoded submission, and bounces
//! every other path (including OS connectivity probes) back to the form so
//! captive-portal detection opens it.

use core::fmt::Write as _;

use embedded_io_async::{Read, Write};
use heapless::{String, Vec};
use log::{info, warn};

use crate::config::{
    API_KEY_BYTES, ConfigStore, Configuration, PASSWORD_BYTES, RefreshUnit, SERVER_BYTES,
    SSID_BYTES, refresh_rate_seconds,
};

pub const FORM_PAGE: &str = include_str!("portal/form.html");
pub const REQUEST_BUFFER_BYTES: usize = 2048;

pub const FIELD_SSID: &str = "ssid";
pub const FIELD_PASSWORD: &str = "password";
pub const FIELD_SERVER: &str = "dashboard_url";
pub const FIELD_PORT: &str = "dashboard_port";
pub const FIELD_API_KEY: &str = "dashboard_apikey";
pub const FIELD_RATE: &str = "dashboard_rate";
pub const FIELD_RATE_UNIT: &str = "dashboard_rate_unit";

const NUMBER_BYTES: usize = 24;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Method {
    Get,
    Post,
    Other,
}

/// A parsed request, borrowing the connection buffer.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Request<'a> {
    pub method: Method,
    pub path: &'a str,
    pub query: &'a [u8],
    pub body: &'a [u8],
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum PortalError<E> {
    Io(E),
    Closed,
    Malformed,
    TooLarge,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Route {
    Form,
    Submit,
    Redirect,
    NotFound,
}

pub fn route(method: Method, path: &str) -> Route {
    match (path, method) {
        ("/", _) => Route::Form,
        ("/submit", Method::Post) => Route::Submit,
        ("/submit", _) => Route::NotFound,
        // Connectivity probes (/generate_204, /hotspot-detect.html, /ncsi.txt) included.
        _ => Route::Redirect,
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Response {
    pub status: u16,
    pub reason: &'static str,
    pub content_type: &'static str,
    pub location: Option<&'static str>,
    pub body: &'static str,
}

pub const FORM: Response = Response {
    status: 200,
    reason: "OK",
    content_type: "text/html",
    location: None,
    body: FORM_PAGE,
};

pub const INVALID_FORM: Response = Response {
    status: 400,
    reason: "Bad Request",
    ..FORM
};

pub const SAVED: Response = Response {
    status: 200,
    reason: "OK",
    content_type: "text/html",
    location: None,
    body: "Settings saved. Rebooting...",
};

pub const SAVE_FAILED: Response = Response {
    status: 500,
    reason: "Internal Server Error",
    content_type: "text/plain",
    location: None,
    body: "Saving settings failed. Please try again.",
};

pub const REDIRECT: Response = Response {
    status: 302,
    reason: "Found",
    content_type: "text/plain",
    location: Some("/"),
    body: "Redirecting to setup page...",
};

pub const NOT_FOUND: Response = Response {
    status: 404,
    reason: "Not Found",
    content_type: "text/plain",
    location: None,
    body: "Not found",
};

/// Result of one served connection.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PortalOutcome {
    Served(Route),
    /// Settings were stored; the caller should reboot.
    Saved,
}

/// Reads one request, handles it, and writes the response.
pub async fn serve<C, S>(
    conn: &mut C,
    store: &mut S,
    buf: &mut [u8],
) -> Result<PortalOutcome, PortalError<C::Error>>
where
    C: Read + Write,
    S: ConfigStore,
{
    let request = read_request(conn, buf).await?;
    let route = route(request.method, request.path);
    info!("portal: {:?} {} -> {:?}", request.method, request.path, route);

    let (response, outcome) = match route {
        Route::Form => (&FORM, PortalOutcome::Served(route)),
        Route::Redirect => (&REDIRECT, PortalOutcome::Served(route)),
        Route::NotFound => (&NOT_FOUND, PortalOutcome::Served(route)),
        Route::Submit => match parse_submission(request.query, request.body) {
            Ok(config) => match store.save(&config) {
                Ok(()) => {
                    info!(
                        "portal: saved settings for ssid={} server={}:{}",
                        config.ssid, config.server, config.port
                    );
                    (&SAVED, PortalOutcome::Saved)
                }
                Err(err) => {
                    warn!("store: save failed: {:?}", err);
                    (&SAVE_FAILED, PortalOutcome::Served(route))
                }
            },
            Err(err) => {
                warn!("portal: form rejected: {:?}", err);
                (&INVALID_FORM, PortalOutcome::Served(route))
            }
        },
    };

    write_response(conn, response).await?;
    Ok(outcome)
}

/// Reads the request head and (if announced) the body into `buf`.
pub async fn read_request<'b, C>(
    conn: &mut C,
    buf: &'b mut [u8],
) -> Result<Request<'b>, PortalError<C::Error>>
where
    C: Read,
{
    let mut filled = 0usize;
    let head_len = loop {
        if let Some(pos) = find(&buf[..filled], b"\r\n\r\n") {
            break pos + 4;
        }
        if filled == buf.len() {
            return Err(PortalError::TooLarge);
        }
        let n = conn.read(&mut buf[filled..]).await.map_err(PortalError::Io)?;
        if n == 0 {
            return Err(PortalError::Closed);
        }
        filled += n;
    };

    let content_length = content_length(&buf[..head_len]).unwrap_or(0);
    let total = head_len
        .checked_add(content_length)
        .filter(|total| *total <= buf.len())
        .ok_or(PortalError::TooLarge)?;

    while filled < total {
        let n = conn
            .read(&mut buf[filled..total])
            .await
            .map_err(PortalError::Io)?;
        if n == 0 {
            break;
        }
        filled += n;
    }

    let buf: &'b [u8] = buf;
    let line_end = find(buf, b"\r\n").ok_or(PortalError::Malformed)?;
    let line = core::str::from_utf8(&buf[..line_end]).map_err(|_| PortalError::Malformed)?;
    let mut parts = line.split(' ');
    let method = match parts.next() {
        Some("GET") => Method::Get,
        Some("POST") => Method::Post,
        Some(_) => Method::Other,
        None => return Err(PortalError::Malformed),
    };
    let target = parts.next().ok_or(PortalError::Malformed)?;
    let (path, query) = match target.split_once('?') {
        Some((path, query)) => (path, query.as_bytes()),
        None => (target, &[][..]),
    };

    Ok(Request {
        method,
        path,
        query,
        body: &buf[head_len..filled.min(total)],
    })
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn content_length(head: &[u8]) -> Option<usize> {
    let head = core::str::from_utf8(head).ok()?;
    head.split("\r\n").find_map(|line| {
        let (name, value) = line.split_once(':')?;
        if name.trim().eq_ignore_ascii_case("content-length") {
            value.trim().parse().ok()
        } else {
            None
        }
    })
}

pub async fn write_response<W>(writer: &mut W, response: &Response) -> Result<(), PortalError<W::Error>>
where
    W: Write,
{
    let mut head: String<256> = String::new();
    write!(
        head,
        "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n",
        response.status,
        response.reason,
        response.content_type,
        response.body.len()
    )
    .map_err(|_| PortalError::TooLarge)?;
    if let Some(location) = response.location {
        write!(head, "Location: {}\r\n", location).map_err(|_| PortalError::TooLarge)?;
    }
    head.push_str("\r\n").map_err(|_| PortalError::TooLarge)?;

    writer
        .write_all(head.as_bytes())
        .await
        .map_err(PortalError::Io)?;
    writer
        .write_all(response.body.as_bytes())
        .await
        .map_err(PortalError::Io)?;
    writer.flush().await.map_err(PortalError::Io)
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FormError {
    Missing(&'static str),
    TooLong(&'static str),
    NotUtf8(&'static str),
}

/// Builds a configuration from the submitted fields.
///
/// Fields are looked up in the body first, then in the query string. Every
/// field has to be present; empty values are accepted as they are.
pub fn parse_submission(query: &[u8], body: &[u8]) -> Result<Configuration, FormError> {
    let field = |name: &'static str| {
        lookup(body, name)
            .or_else(|| lookup(query, name))
            .ok_or(FormError::Missing(name))
    };

    let ssid = field(FIELD_SSID)?;
    let password = field(FIELD_PASSWORD)?;
    let server = field(FIELD_SERVER)?;
    let port = field(FIELD_PORT)?;
    let api_key = field(FIELD_API_KEY)?;
    let rate = field(FIELD_RATE)?;
    let rate_unit = field(FIELD_RATE_UNIT)?;

    let port: String<NUMBER_BYTES> = decode(port, FIELD_PORT)?;
    let rate: String<NUMBER_BYTES> = decode(rate, FIELD_RATE)?;
    let rate_unit: String<NUMBER_BYTES> = decode(rate_unit, FIELD_RATE_UNIT)?;

    Ok(Configuration {
        ssid: decode::<SSID_BYTES>(ssid, FIELD_SSID)?,
        password: decode::<PASSWORD_BYTES>(password, FIELD_PASSWORD)?,
        server: decode::<SERVER_BYTES>(server, FIELD_SERVER)?,
        port: parse_int(&port).clamp(i32::MIN as i64, i32::MAX as i64) as i32,
        refresh_rate_secs: refresh_rate_seconds(parse_int(&rate), RefreshUnit::parse(&rate_unit)),
        api_key: decode::<API_KEY_BYTES>(api_key, FIELD_API_KEY)?,
    })
}

fn lookup<'a>(encoded: &'a [u8], name: &str) -> Option<&'a [u8]> {
    encoded.split(|b| *b == b'&').find_map(|pair| {
        let (key, value) = match pair.iter().position(|b| *b == b'=') {
            Some(eq) => (&pair[..eq], &pair[eq + 1..]),
            None => (pair, &pair[pair.len()..]),
        };
        (key == name.as_bytes()).then_some(value)
    })
}

/// Percent-decodes a form value; `+` is a space.
fn decode<const N: usize>(raw: &[u8], name: &'static str) -> Result<String<N>, FormError> {
    let mut out: Vec<u8, N> = Vec::new();
    let mut i = 0;
    while i < raw.len() {
        let byte = match raw[i] {
            b'+' => b' ',
            b'%' => match (
                raw.get(i + 1).copied().and_then(hex),
                raw.get(i + 2).copied().and_then(hex),
            ) {
                (Some(high), Some(low)) => {
                    i += 2;
                    (high << 4) | low
                }
                _ => b'%',
            },
            other => other,
        };
        out.push(byte).map_err(|_| FormError::TooLong(name))?;
        i += 1;
    }
    String::from_utf8(out).map_err(|_| FormError::NotUtf8(name))
}

fn hex(digit: u8) -> Option<u8> {
    match digit {
        b'0'..=b'9' => Some(digit - b'0'),
        b'a'..=b'f' => Some(digit - b'a' + 10),
        b'A'..=b'F' => Some(digit - b'A' + 10),
        _ => None,
    }
}

/// Lenient integer parse: optional sign and leading digits, otherwise `0`.
pub fn parse_int(text: &str) -> i64 {
    let text = text.trim_start();
    let (negative, digits) = match text.as_bytes().first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        _ => (false, text),
    };

    let mut value = 0i64;
    for digit in digits.bytes().take_while(u8::is_ascii_digit) {
        value = value
            .saturating_mul(10)
            .saturating_add((digit - b'0') as i64);
    }
    if negative { -value } else { value }
}

#[cfg(test)]
mod tests;
