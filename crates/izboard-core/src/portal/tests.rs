use std::{string::String as StdString, vec::Vec as StdVec};

use embassy_futures::block_on;

use super::*;
use crate::test_support::ScriptedStream;

#[derive(Default)]
struct MemoryStore {
    saved: Option<Configuration>,
    fail_save: bool,
}

impl ConfigStore for MemoryStore {
    type Error = &'static str;

    fn load(&mut self) -> Result<Option<Configuration>, Self::Error> {
        Ok(self.saved.clone())
    }

    fn save(&mut self, config: &Configuration) -> Result<(), Self::Error> {
        if self.fail_save {
            return Err("erase failed");
        }
        self.saved = Some(config.clone());
        Ok(())
    }

    fn clear(&mut self) -> Result<(), Self::Error> {
        self.saved = None;
        Ok(())
    }
}

const FULL_FORM: &str = "ssid=My+Home&password=p%40ss%21&dashboard_url=dash.lan\
    &dashboard_port=8080&dashboard_apikey=k%2F1&dashboard_rate=4&dashboard_rate_unit=m";

fn post(path: &str, body: &str) -> StdVec<u8> {
    format!(
        "POST {path} HTTP/1.1\r\nHost: 192.168.4.1\r\nContent-Type: application/x-www-form-urlencoded\r\nContent-Length: {}\r\n\r\n{body}",
        body.len()
    )
    .into_bytes()
}

fn get(path: &str) -> StdVec<u8> {
    format!("GET {path} HTTP/1.1\r\nHost: 192.168.4.1\r\n\r\n").into_bytes()
}

fn exchange(request: &[u8], store: &mut MemoryStore) -> (PortalOutcome, StdString) {
    let mut conn = ScriptedStream::chunked(request, 13);
    let mut buf = [0u8; REQUEST_BUFFER_BYTES];
    let outcome = block_on(serve(&mut conn, store, &mut buf)).unwrap();
    (outcome, conn.written_str().into())
}

#[test]
fn root_serves_the_form() {
    let mut store = MemoryStore::default();
    let (outcome, response) = exchange(&get("/"), &mut store);

    assert_eq!(outcome, PortalOutcome::Served(Route::Form));
    assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(response.contains("Content-Type: text/html\r\n"));
    assert!(response.ends_with(FORM_PAGE));
    for field in [
        FIELD_SSID,
        FIELD_PASSWORD,
        FIELD_SERVER,
        FIELD_PORT,
        FIELD_API_KEY,
        FIELD_RATE,
        FIELD_RATE_UNIT,
    ] {
        assert!(FORM_PAGE.contains(&format!("name=\"{field}\"")), "{field}");
    }
}

#[test]
fn complete_submission_is_stored_and_acknowledged() {
    let mut store = MemoryStore::default();
    let (outcome, response) = exchange(&post("/submit", FULL_FORM), &mut store);

    assert_eq!(outcome, PortalOutcome::Saved);
    assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(response.ends_with("Settings saved. Rebooting..."));

    let saved = store.saved.unwrap();
    assert_eq!(saved.ssid.as_str(), "My Home");
    assert_eq!(saved.password.as_str(), "p@ss!");
    assert_eq!(saved.server.as_str(), "dash.lan");
    assert_eq!(saved.port, 8080);
    assert_eq!(saved.api_key.as_str(), "k/1");
    assert_eq!(saved.refresh_rate_secs, 300);
}

#[test]
fn missing_field_returns_form_with_400() {
    let mut store = MemoryStore::default();
    let body = FULL_FORM.replace("&dashboard_apikey=k%2F1", "");
    let (outcome, response) = exchange(&post("/submit", &body), &mut store);

    assert_eq!(outcome, PortalOutcome::Served(Route::Submit));
    assert!(response.starts_with("HTTP/1.1 400 Bad Request\r\n"));
    assert!(response.ends_with(FORM_PAGE));
    assert!(store.saved.is_none());
}

#[test]
fn failed_save_keeps_portal_running() {
    let mut store = MemoryStore {
        fail_save: true,
        ..Default::default()
    };
    let (outcome, response) = exchange(&post("/submit", FULL_FORM), &mut store);

    assert_eq!(outcome, PortalOutcome::Served(Route::Submit));
    assert!(response.starts_with("HTTP/1.1 500 "));
}

#[test]
fn submit_with_get_is_not_found() {
    let mut store = MemoryStore::default();
    let (outcome, response) = exchange(&get("/submit"), &mut store);

    assert_eq!(outcome, PortalOutcome::Served(Route::NotFound));
    assert!(response.starts_with("HTTP/1.1 404 Not Found\r\n"));
    assert!(response.ends_with("Not found"));
}

#[test]
fn probes_and_unknown_paths_redirect_to_root() {
    for path in [
        "/generate_204",
        "/hotspot-detect.html",
        "/ncsi.txt",
        "/favicon.ico",
        "/some/page?x=1",
    ] {
        let mut store = MemoryStore::default();
        let (outcome, response) = exchange(&get(path), &mut store);

        assert_eq!(outcome, PortalOutcome::Served(Route::Redirect), "{path}");
        assert!(response.starts_with("HTTP/1.1 302 Found\r\n"), "{path}");
        assert!(response.contains("Location: /\r\n"), "{path}");
    }
}

#[test]
fn query_string_fields_are_accepted() {
    let config = parse_submission(FULL_FORM.as_bytes(), b"").unwrap();
    assert_eq!(config.ssid.as_str(), "My Home");
}

#[test]
fn body_fields_win_over_query_fields() {
    let config = parse_submission(b"ssid=from-query", FULL_FORM.as_bytes()).unwrap();
    assert_eq!(config.ssid.as_str(), "My Home");
}

#[test]
fn overlong_ssid_is_rejected() {
    let body = FULL_FORM.replace("My+Home", &"x".repeat(33));
    assert_eq!(
        parse_submission(b"", body.as_bytes()),
        Err(FormError::TooLong(FIELD_SSID))
    );
}

#[test]
fn malformed_percent_sequences_are_kept_literally() {
    let body = FULL_FORM.replace("p%40ss%21", "100%25%zz%4");
    let config = parse_submission(b"", body.as_bytes()).unwrap();
    assert_eq!(config.password.as_str(), "100%%zz%4");
}

#[test]
fn non_numeric_port_and_rate_parse_as_zero() {
    let body = FULL_FORM
        .replace("dashboard_port=8080", "dashboard_port=http")
        .replace("dashboard_rate=4", "dashboard_rate=")
        .replace("dashboard_rate_unit=m", "dashboard_rate_unit=h");
    let config = parse_submission(b"", body.as_bytes()).unwrap();

    assert_eq!(config.port, 0);
    assert_eq!(config.refresh_rate_secs, 3_600);
}

#[test]
fn lenient_integer_parsing() {
    assert_eq!(parse_int("42"), 42);
    assert_eq!(parse_int("  -7x"), -7);
    assert_eq!(parse_int("+15"), 15);
    assert_eq!(parse_int("abc"), 0);
    assert_eq!(parse_int(""), 0);
    assert_eq!(parse_int("99999999999999999999"), i64::MAX);
}

#[test]
fn oversized_request_is_rejected() {
    let request = get(&format!("/{}", "a".repeat(REQUEST_BUFFER_BYTES)));
    let mut conn = ScriptedStream::new(&request);
    let mut buf = [0u8; REQUEST_BUFFER_BYTES];

    assert_eq!(
        block_on(read_request(&mut conn, &mut buf)),
        Err(PortalError::TooLarge)
    );
}

#[test]
fn connection_closed_before_head_end() {
    let mut conn = ScriptedStream::new(b"GET / HTTP/1.1\r\nHost: x\r\n");
    let mut buf = [0u8; REQUEST_BUFFER_BYTES];

    assert_eq!(
        block_on(read_request(&mut conn, &mut buf)),
        Err(PortalError::Closed)
    );
}
