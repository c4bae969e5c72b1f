//! PROPFIND `207 Multi-Status` parsing
//!
//! Elements are matched by local name so any namespace prefix (`d:`, `D:`,
//! `lp1:`, none) is accepted. Only `<propstat>` blocks with a 2xx status
//! contribute properties.

use chrono::DateTime;
use davsync_core::{DavsyncError, DavsyncResult};
use percent_encoding::percent_decode_str;
use quick_xml::events::Event;
use quick_xml::Reader;

use crate::backend::{trim_dir, DavEntry};

/// Request body for PROPFIND; asks only for what listing needs.
pub const PROPFIND_BODY: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<d:propfind xmlns:d="DAV:">
  <d:prop>
    <d:resourcetype/>
    <d:getcontentlength/>
    <d:getlastmodified/>
    <d:getetag/>
  </d:prop>
</d:propfind>"#;

#[derive(Default)]
struct Props {
    is_dir: bool,
    size: Option<u64>,
    last_modified: Option<i64>,
    etag: Option<String>,
}

impl Props {
    fn merge(&mut self, other: Props) {
        self.is_dir |= other.is_dir;
        self.size = other.size.or(self.size);
        self.last_modified = other.last_modified.or(self.last_modified);
        self.etag = other.etag.or(self.etag.take());
    }
}

/// Parse a multistatus document.
///
/// `root_prefix` is the path component of the server address (e.g. `/dav`);
/// it is stripped from every href so entry paths are relative to the address.
pub fn parse(xml: &str, root_prefix: &str) -> DavsyncResult<Vec<DavEntry>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();

    let mut entries = Vec::new();
    let mut stack: Vec<String> = Vec::new();
    let mut text = String::new();

    let mut href: Option<String> = None;
    let mut props = Props::default();
    let mut pending = Props::default();
    let mut status_ok = true;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                let name = local_name(e.local_name().as_ref());
                match name.as_str() {
                    "response" => {
                        href = None;
                        props = Props::default();
                    }
                    "propstat" => {
                        pending = Props::default();
                        status_ok = true;
                    }
                    "collection" => pending.is_dir = true,
                    _ => {}
                }
                text.clear();
                stack.push(name);
            }
            Ok(Event::Empty(ref e)) => {
                if local_name(e.local_name().as_ref()) == "collection" {
                    pending.is_dir = true;
                }
            }
            Ok(Event::Text(ref e)) => {
                let chunk = e
                    .unescape()
                    .map_err(|e| DavsyncError::Transport(format!("malformed multistatus: {e}")))?;
                text.push_str(&chunk);
            }
            Ok(Event::CData(ref e)) => {
                text.push_str(&String::from_utf8_lossy(e.as_ref()));
            }
            Ok(Event::End(_)) => {
                let Some(name) = stack.pop() else {
                    continue;
                };
                let in_propstat = stack.iter().any(|s| s == "propstat");
                let value = text.trim();
                match name.as_str() {
                    "href" if !in_propstat && href.is_none() => {
                        href = Some(href_to_path(value, root_prefix));
                    }
                    "status" if in_propstat => status_ok = status_is_success(value),
                    "getcontentlength" => pending.size = value.parse().ok(),
                    "getlastmodified" => pending.last_modified = parse_http_date(value),
                    "getetag" if !value.is_empty() => {
                        pending.etag = Some(value.trim_matches('"').to_string());
                    }
                    "propstat" => {
                        if status_ok {
                            props.merge(std::mem::take(&mut pending));
                        }
                    }
                    "response" => {
                        if let Some(path) = href.take() {
                            let props = std::mem::take(&mut props);
                            entries.push(DavEntry {
                                path,
                                is_dir: props.is_dir,
                                size: if props.is_dir { 0 } else { props.size.unwrap_or(0) },
                                last_modified: props.last_modified.unwrap_or(0),
                                etag: props.etag,
                            });
                        }
                    }
                    _ => {}
                }
                text.clear();
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(DavsyncError::Transport(format!(
                    "malformed multistatus at byte {}: {e}",
                    reader.buffer_position()
                )))
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(entries)
}

fn local_name(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).to_ascii_lowercase()
}

/// `HTTP/1.1 200 OK` and friends; a missing status counts as success.
fn status_is_success(line: &str) -> bool {
    line.split_whitespace()
        .nth(1)
        .and_then(|code| code.parse::<u16>().ok())
        .map_or(true, |code| (200..300).contains(&code))
}

/// RFC 1123 dates per WebDAV, with an RFC 3339 fallback for odd servers.
fn parse_http_date(value: &str) -> Option<i64> {
    DateTime::parse_from_rfc2822(value)
        .or_else(|_| DateTime::parse_from_rfc3339(value))
        .map(|dt| dt.timestamp_millis())
        .ok()
}

/// Turn an href (absolute URL or absolute path, percent-encoded) into a
/// decoded path relative to the server address.
pub(crate) fn href_to_path(href: &str, root_prefix: &str) -> String {
    let path = match href.find("://") {
        Some(scheme_end) => {
            let after = &href[scheme_end + 3..];
            after.find('/').map_or("/", |i| &after[i..])
        }
        None => href,
    };
    let decoded = percent_decode_str(path).decode_utf8_lossy();

    let prefix = trim_dir(root_prefix);
    let relative = if prefix == "/" {
        decoded.as_ref()
    } else {
        match decoded.strip_prefix(prefix) {
            Some(rest) if rest.is_empty() || rest.starts_with('/') => rest,
            _ => decoded.as_ref(),
        }
    };

    let relative = if relative.starts_with('/') {
        relative.to_string()
    } else {
        format!("/{relative}")
    };
    trim_dir(&relative).to_string()
}
