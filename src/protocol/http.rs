//! HTTP/1.1 request parsing, WebSocket upgrade detection and static file
//! serving. Like [`super::ws::parse_client_frame`], the request parser is
//! additive: it looks for `\r\n\r\n` and returns `None` until it's there.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct Request {
    pub method: String,
    pub path: String,
    pub headers: HashMap<String, String>,
}

impl Request {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(|s| s.as_str())
    }
}

/// Scans for the end of the request headers (`\r\n\r\n`). Returns the
/// offset of the first byte past the blank line, or `None` if the buffer
/// doesn't contain a complete header block yet.
pub fn header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n").map(|pos| pos + 4)
}

/// Parses the request line and headers out of `buf[..end]`. `end` must be
/// the value returned by [`header_end`].
pub fn parse_request(buf: &[u8], end: usize) -> Option<Request> {
    let text = std::str::from_utf8(&buf[..end]).ok()?;
    let mut lines = text.split("\r\n");
    let request_line = lines.next()?;
    let mut parts = request_line.split(' ');
    let method = parts.next()?.to_string();
    let path = parts.next()?.to_string();

    let mut headers = HashMap::new();
    for line in lines {
        if line.is_empty() {
            continue;
        }
        if let Some((name, value)) = line.split_once(':') {
            headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
        }
    }

    Some(Request { method, path, headers })
}

/// Per §4.5: promote to WebSocket iff `Upgrade` contains "websocket" and
/// `Sec-WebSocket-Key` is present. Returns the key on success.
pub fn websocket_upgrade_key(req: &Request) -> Option<&str> {
    let upgrade = req.header("upgrade")?;
    if !upgrade.to_ascii_lowercase().contains("websocket") {
        return None;
    }
    req.header("sec-websocket-key")
}

/// Rejects `..` and absolute-path traversal; maps `/` to `/index.html`.
/// Returns `None` if the path cannot be safely resolved under `web_root`.
pub fn sanitize_path(web_root: &Path, url_path: &str) -> Option<PathBuf> {
    let url_path = url_path.split(['?', '#']).next().unwrap_or(url_path);
    let url_path = if url_path == "/" { "/index.html" } else { url_path };

    if !url_path.starts_with('/') {
        return None;
    }
    let relative = &url_path[1..];
    if relative.is_empty() {
        return None;
    }

    let mut resolved = web_root.to_path_buf();
    for component in relative.split('/') {
        match component {
            "" | "." => continue,
            ".." => return None,
            part => resolved.push(part),
        }
    }
    Some(resolved)
}

pub fn mime_type(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("html") => "text/html",
        Some("js") => "application/javascript",
        Some("css") => "text/css",
        Some("wasm") => "application/wasm",
        _ => "application/octet-stream",
    }
}

pub fn ok_response(content_type: &str, body: &[u8]) -> Vec<u8> {
    let header = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nCache-Control: no-cache\r\nConnection: close\r\n\r\n",
        body.len()
    );
    let mut response = header.into_bytes();
    response.extend_from_slice(body);
    response
}

pub fn not_found_response() -> Vec<u8> {
    let body = b"404 Not Found";
    format!(
        "HTTP/1.1 404 Not Found\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    )
    .into_bytes()
    .into_iter()
    .chain(body.iter().copied())
    .collect()
}

pub fn switching_protocols_response(accept_key: &str) -> Vec<u8> {
    format!(
        "HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Accept: {accept_key}\r\n\r\n"
    )
    .into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_end_waits_for_blank_line() {
        assert_eq!(header_end(b"GET / HTTP/1.1\r\nHost: x"), None);
        assert_eq!(
            header_end(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n"),
            Some(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n".len())
        );
    }

    #[test]
    fn parses_upgrade_request() {
        let raw = b"GET /ws HTTP/1.1\r\nUpgrade: websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\r\n";
        let end = header_end(raw).unwrap();
        let req = parse_request(raw, end).unwrap();
        assert_eq!(req.method, "GET");
        assert_eq!(req.path, "/ws");
        assert_eq!(
            websocket_upgrade_key(&req),
            Some("dGhlIHNhbXBsZSBub25jZQ==")
        );
    }

    #[test]
    fn non_upgrade_request_has_no_key() {
        let raw = b"GET / HTTP/1.1\r\nHost: x\r\n\r\n";
        let end = header_end(raw).unwrap();
        let req = parse_request(raw, end).unwrap();
        assert_eq!(websocket_upgrade_key(&req), None);
    }

    #[test]
    fn sanitize_path_rejects_traversal() {
        let root = Path::new("/srv/web");
        assert_eq!(sanitize_path(root, "/../../etc/passwd"), None);
        assert_eq!(sanitize_path(root, "/a/../../b"), None);
    }

    #[test]
    fn sanitize_path_defaults_root_to_index() {
        let root = Path::new("/srv/web");
        assert_eq!(sanitize_path(root, "/"), Some(root.join("index.html")));
    }

    #[test]
    fn sanitize_path_resolves_nested_file() {
        let root = Path::new("/srv/web");
        assert_eq!(
            sanitize_path(root, "/assets/app.js"),
            Some(root.join("assets").join("app.js"))
        );
    }

    #[test]
    fn mime_type_by_extension() {
        assert_eq!(mime_type(Path::new("a.html")), "text/html");
        assert_eq!(mime_type(Path::new("a.js")), "application/javascript");
        assert_eq!(mime_type(Path::new("a.css")), "text/css");
        assert_eq!(mime_type(Path::new("a.wasm")), "application/wasm");
        assert_eq!(mime_type(Path::new("a.bin")), "application/octet-stream");
    }
}
