//! HAR 1.2 export built from completed network records.
//!
//! Header-size fields are computed by reconstructing the literal request
//! or status line plus each header line plus the trailing blank line and
//! measuring byte length; timing phases are derived from CDP
//! ResourceTiming with `-1` for anything not computable.

use std::collections::HashMap;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::DateTime;
use pagetap_protocol::NetworkRequestRecord;
use pagetap_protocol::ResourceTiming;
use serde::Serialize;

pub const HAR_VERSION: &str = "1.2";

#[derive(Debug, Clone, Serialize)]
pub struct Har {
    pub log: HarLog,
}

#[derive(Debug, Clone, Serialize)]
pub struct HarLog {
    pub version: String,
    pub creator: HarTool,
    pub browser: HarTool,
    pub entries: Vec<HarEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HarTool {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HarEntry {
    pub started_date_time: String,
    /// Total elapsed milliseconds, `-1` when unknown.
    pub time: f64,
    pub request: HarRequest,
    pub response: HarResponse,
    pub cache: serde_json::Value,
    pub timings: HarTimings,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HarRequest {
    pub method: String,
    pub url: String,
    pub http_version: String,
    pub cookies: Vec<HarCookie>,
    pub headers: Vec<HarHeader>,
    pub query_string: Vec<HarQueryItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post_data: Option<HarPostData>,
    pub headers_size: i64,
    pub body_size: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HarResponse {
    pub status: i64,
    pub status_text: String,
    pub http_version: String,
    pub cookies: Vec<HarCookie>,
    pub headers: Vec<HarHeader>,
    pub content: HarContent,
    #[serde(rename = "redirectURL")]
    pub redirect_url: String,
    pub headers_size: i64,
    pub body_size: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HarCookie {
    pub name: String,
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_only: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secure: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HarHeader {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HarQueryItem {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HarPostData {
    pub mime_type: String,
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HarContent {
    pub size: i64,
    pub mime_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
}

/// Phase durations in milliseconds; `-1` marks a phase that did not happen
/// or could not be computed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HarTimings {
    pub blocked: f64,
    pub dns: f64,
    pub connect: f64,
    pub ssl: f64,
    pub send: f64,
    pub wait: f64,
    pub receive: f64,
}

pub fn build_har(
    records: &[NetworkRequestRecord],
    browser_name: &str,
    browser_version: &str,
) -> Har {
    let entries = records.iter().map(build_entry).collect();
    Har {
        log: HarLog {
            version: HAR_VERSION.to_string(),
            creator: HarTool {
                name: "pagetap".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            browser: HarTool {
                name: browser_name.to_string(),
                version: browser_version.to_string(),
            },
            entries,
        },
    }
}

fn build_entry(record: &NetworkRequestRecord) -> HarEntry {
    let http_version = record
        .protocol
        .clone()
        .unwrap_or_else(|| "HTTP/1.1".to_string());
    let timings = build_timings(record);
    let time = total_time(record, &timings);

    HarEntry {
        started_date_time: iso8601(record.started_at_ms),
        time,
        request: build_request(record, &http_version),
        response: build_response(record, &http_version),
        cache: serde_json::json!({}),
        timings,
    }
}

fn build_request(record: &NetworkRequestRecord, http_version: &str) -> HarRequest {
    let headers = header_list(&record.request_headers);
    let cookies = header_value(&record.request_headers, "cookie")
        .map(parse_cookie_header)
        .unwrap_or_default();
    let post_data = record.post_data.as_ref().map(|text| HarPostData {
        mime_type: header_value(&record.request_headers, "content-type")
            .unwrap_or_else(|| "application/octet-stream".to_string()),
        text: text.clone(),
    });
    let body_size = record
        .post_data
        .as_ref()
        .map_or(-1, |text| text.len() as i64);

    HarRequest {
        method: record.method.clone(),
        url: record.url.clone(),
        http_version: http_version.to_string(),
        cookies,
        query_string: parse_query_string(&record.url),
        headers_size: request_headers_size(record),
        body_size,
        headers,
        post_data,
    }
}

fn build_response(record: &NetworkRequestRecord, http_version: &str) -> HarResponse {
    let headers = header_list(&record.response_headers);
    let cookies = header_value(&record.response_headers, "set-cookie")
        .map(|raw| parse_set_cookie_header(&raw))
        .unwrap_or_default();
    let mime_type = record.mime_type.clone().unwrap_or_default();
    let redirect_url = header_value(&record.response_headers, "location").unwrap_or_default();
    let body_size = record.encoded_data_length.map_or(-1, |len| len as i64);

    HarResponse {
        status: record.status,
        status_text: record.status_text.clone().unwrap_or_default(),
        http_version: http_version.to_string(),
        cookies,
        content: build_content(record, &mime_type),
        redirect_url,
        headers_size: response_headers_size(record),
        body_size,
        headers,
    }
}

fn build_content(record: &NetworkRequestRecord, mime_type: &str) -> HarContent {
    let (text, encoding) = match record.body.as_ref() {
        None => (None, None),
        Some(body) if record.body_base64 => (Some(body.clone()), Some("base64".to_string())),
        Some(body) if is_binary_mime(mime_type) => (
            Some(BASE64.encode(body.as_bytes())),
            Some("base64".to_string()),
        ),
        Some(body) => (Some(body.clone()), None),
    };
    HarContent {
        size: record.encoded_data_length.map_or(-1, |len| len as i64),
        mime_type: mime_type.to_string(),
        text,
        encoding,
    }
}

/// MIME types whose HAR content is always base64-encoded.
fn is_binary_mime(mime_type: &str) -> bool {
    let mime = mime_type.to_ascii_lowercase();
    mime.starts_with("image/")
        || mime.starts_with("video/")
        || mime.starts_with("audio/")
        || mime.starts_with("font/")
        || mime == "application/pdf"
        || mime == "application/zip"
        || mime == "application/octet-stream"
}

/// `GET /path?q=1 HTTP/1.1\r\n` + one `name: value\r\n` per header + the
/// trailing blank line, measured in bytes.
fn request_headers_size(record: &NetworkRequestRecord) -> i64 {
    let target = url::Url::parse(&record.url)
        .map(|u| {
            let mut target = u.path().to_string();
            if let Some(query) = u.query() {
                target.push('?');
                target.push_str(query);
            }
            target
        })
        .unwrap_or_else(|_| record.url.clone());
    let mut text = format!("{} {} HTTP/1.1\r\n", record.method, target);
    append_header_lines(&mut text, &record.request_headers);
    text.push_str("\r\n");
    text.len() as i64
}

fn response_headers_size(record: &NetworkRequestRecord) -> i64 {
    let mut text = format!(
        "HTTP/1.1 {} {}\r\n",
        record.status,
        record.status_text.clone().unwrap_or_default()
    );
    append_header_lines(&mut text, &record.response_headers);
    text.push_str("\r\n");
    text.len() as i64
}

fn append_header_lines(text: &mut String, headers: &HashMap<String, String>) {
    let mut names: Vec<&String> = headers.keys().collect();
    names.sort();
    for name in names {
        if let Some(value) = headers.get(name) {
            text.push_str(&format!("{name}: {value}\r\n"));
        }
    }
}

fn header_list(headers: &HashMap<String, String>) -> Vec<HarHeader> {
    let mut list: Vec<HarHeader> = headers
        .iter()
        .map(|(name, value)| HarHeader {
            name: name.clone(),
            value: value.clone(),
        })
        .collect();
    list.sort_by(|a, b| a.name.cmp(&b.name));
    list
}

fn header_value(headers: &HashMap<String, String>, name: &str) -> Option<String> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.clone())
}

fn parse_query_string(raw_url: &str) -> Vec<HarQueryItem> {
    let Ok(parsed) = url::Url::parse(raw_url) else {
        return Vec::new();
    };
    parsed
        .query_pairs()
        .map(|(name, value)| HarQueryItem {
            name: name.into_owned(),
            value: value.into_owned(),
        })
        .collect()
}

/// Parse a raw request `Cookie` header: `a=1; b=2`.
fn parse_cookie_header(raw: String) -> Vec<HarCookie> {
    raw.split(';')
        .filter_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            Some(HarCookie {
                name: name.trim().to_string(),
                value: value.trim().to_string(),
                path: None,
                domain: None,
                http_only: None,
                secure: None,
            })
        })
        .collect()
}

/// Parse a raw `Set-Cookie` header. CDP folds multiple cookies into one
/// newline-separated value.
fn parse_set_cookie_header(raw: &str) -> Vec<HarCookie> {
    raw.split('\n')
        .filter_map(|line| {
            let mut segments = line.split(';');
            let (name, value) = segments.next()?.trim().split_once('=')?;
            let mut cookie = HarCookie {
                name: name.trim().to_string(),
                value: value.trim().to_string(),
                path: None,
                domain: None,
                http_only: None,
                secure: None,
            };
            for attribute in segments {
                let attribute = attribute.trim();
                if let Some((key, val)) = attribute.split_once('=') {
                    match key.to_ascii_lowercase().as_str() {
                        "path" => cookie.path = Some(val.to_string()),
                        "domain" => cookie.domain = Some(val.to_string()),
                        _ => {}
                    }
                } else {
                    match attribute.to_ascii_lowercase().as_str() {
                        "httponly" => cookie.http_only = Some(true),
                        "secure" => cookie.secure = Some(true),
                        _ => {}
                    }
                }
            }
            Some(cookie)
        })
        .collect()
}

fn build_timings(record: &NetworkRequestRecord) -> HarTimings {
    let Some(timing) = record.timing.as_ref() else {
        return HarTimings {
            blocked: -1.0,
            dns: -1.0,
            connect: -1.0,
            ssl: -1.0,
            send: -1.0,
            wait: -1.0,
            receive: -1.0,
        };
    };
    HarTimings {
        blocked: blocked_time(timing),
        dns: phase(timing.dns_start, timing.dns_end),
        connect: phase(timing.connect_start, timing.connect_end),
        ssl: phase(timing.ssl_start, timing.ssl_end),
        send: phase(timing.send_start, timing.send_end),
        wait: phase(timing.send_end, timing.receive_headers_end),
        receive: receive_time(record, timing),
    }
}

fn phase(start: f64, end: f64) -> f64 {
    if start >= 0.0 && end >= start {
        end - start
    } else {
        -1.0
    }
}

/// Time before the first network phase begins.
fn blocked_time(timing: &ResourceTiming) -> f64 {
    for start in [timing.dns_start, timing.connect_start, timing.send_start] {
        if start >= 0.0 {
            return start;
        }
    }
    -1.0
}

fn receive_time(record: &NetworkRequestRecord, timing: &ResourceTiming) -> f64 {
    let Some(finished) = record.finished_at_ms else {
        return -1.0;
    };
    if timing.receive_headers_end < 0.0 {
        return -1.0;
    }
    let total = finished - record.started_at_ms;
    (total - timing.receive_headers_end).max(0.0)
}

fn total_time(record: &NetworkRequestRecord, timings: &HarTimings) -> f64 {
    if let Some(finished) = record.finished_at_ms {
        return finished - record.started_at_ms;
    }
    let phases = [
        timings.blocked,
        timings.dns,
        timings.connect,
        timings.send,
        timings.wait,
        timings.receive,
    ];
    let known: f64 = phases.iter().filter(|p| **p >= 0.0).sum();
    if known > 0.0 { known } else { -1.0 }
}

fn iso8601(epoch_ms: f64) -> String {
    DateTime::from_timestamp_millis(epoch_ms as i64)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| "1970-01-01T00:00:00+00:00".to_string())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn record(url: &str, mime: &str, body: Option<&str>) -> NetworkRequestRecord {
        NetworkRequestRecord {
            request_id: "r1".to_string(),
            url: url.to_string(),
            method: "GET".to_string(),
            status: 200,
            status_text: Some("OK".to_string()),
            mime_type: Some(mime.to_string()),
            body: body.map(str::to_string),
            started_at_ms: 1_700_000_000_000.0,
            finished_at_ms: Some(1_700_000_000_250.0),
            encoded_data_length: Some(100.0),
            ..Default::default()
        }
    }

    #[test]
    fn headers_size_is_the_literal_reconstruction() {
        let mut rec = record("https://example.com/path", "text/html", None);
        rec.request_headers =
            HashMap::from([("host".to_string(), "example.com".to_string())]);
        let entry = build_entry(&rec);
        let expected =
            "GET /path HTTP/1.1\r\n".len() + "host: example.com\r\n".len() + "\r\n".len();
        assert_eq!(expected as i64, entry.request.headers_size);
    }

    #[test]
    fn binary_mime_types_always_encode_base64() {
        for mime in [
            "image/png",
            "video/mp4",
            "audio/ogg",
            "application/pdf",
            "application/zip",
        ] {
            let entry = build_entry(&record("https://example.com/x", mime, Some("rawbytes")));
            assert_eq!(
                Some("base64".to_string()),
                entry.response.content.encoding,
                "{mime} should be base64-encoded"
            );
            assert_eq!(
                Some(BASE64.encode("rawbytes")),
                entry.response.content.text
            );
        }
    }

    #[test]
    fn text_mime_types_are_never_encoded() {
        for mime in ["text/html", "application/json", "text/plain"] {
            let entry = build_entry(&record("https://example.com/x", mime, Some("payload")));
            assert_eq!(None, entry.response.content.encoding, "{mime}");
            assert_eq!(Some("payload".to_string()), entry.response.content.text);
        }
    }

    #[test]
    fn cookies_parse_from_raw_headers() {
        let mut rec = record("https://example.com/", "text/html", None);
        rec.request_headers =
            HashMap::from([("Cookie".to_string(), "session=abc; theme=dark".to_string())]);
        rec.response_headers = HashMap::from([(
            "Set-Cookie".to_string(),
            "session=def; Path=/; HttpOnly; Secure\ntheme=light; Domain=example.com".to_string(),
        )]);
        let entry = build_entry(&rec);

        assert_eq!(2, entry.request.cookies.len());
        assert_eq!("session", entry.request.cookies[0].name);
        assert_eq!("abc", entry.request.cookies[0].value);

        assert_eq!(2, entry.response.cookies.len());
        let first = &entry.response.cookies[0];
        assert_eq!(Some("/".to_string()), first.path);
        assert_eq!(Some(true), first.http_only);
        assert_eq!(Some(true), first.secure);
        assert_eq!(
            Some("example.com".to_string()),
            entry.response.cookies[1].domain
        );
    }

    #[test]
    fn query_string_comes_from_the_url() {
        let entry = build_entry(&record(
            "https://example.com/search?q=rust&page=2",
            "text/html",
            None,
        ));
        assert_eq!(
            vec![
                HarQueryItem {
                    name: "q".to_string(),
                    value: "rust".to_string()
                },
                HarQueryItem {
                    name: "page".to_string(),
                    value: "2".to_string()
                },
            ],
            entry.request.query_string
        );
    }

    #[test]
    fn missing_timing_yields_all_minus_one() {
        let entry = build_entry(&record("https://example.com/", "text/html", None));
        assert_eq!(
            HarTimings {
                blocked: -1.0,
                dns: -1.0,
                connect: -1.0,
                ssl: -1.0,
                send: -1.0,
                wait: -1.0,
                receive: -1.0,
            },
            entry.timings
        );
        // Total time still falls back to wall-clock duration.
        assert_eq!(250.0, entry.time);
    }

    #[test]
    fn timing_phases_map_from_resource_timing() {
        let mut rec = record("https://example.com/", "text/html", None);
        rec.timing = Some(ResourceTiming {
            request_time: 10.0,
            dns_start: 1.0,
            dns_end: 4.0,
            connect_start: 4.0,
            connect_end: 20.0,
            ssl_start: 8.0,
            ssl_end: 20.0,
            send_start: 20.0,
            send_end: 22.0,
            receive_headers_end: 120.0,
        });
        let entry = build_entry(&rec);
        assert_eq!(1.0, entry.timings.blocked);
        assert_eq!(3.0, entry.timings.dns);
        assert_eq!(16.0, entry.timings.connect);
        assert_eq!(12.0, entry.timings.ssl);
        assert_eq!(2.0, entry.timings.send);
        assert_eq!(98.0, entry.timings.wait);
        assert_eq!(130.0, entry.timings.receive);
    }
}
