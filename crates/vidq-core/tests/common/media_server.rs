//! Minimal HTTP/1.1 server for integration tests.
//!
//! Serves canned responses by path for GET and HEAD, and accepts PUT
//! uploads (recording what it received) for object-store tests.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// One canned response.
#[derive(Debug, Clone)]
pub struct Route {
    pub status: u16,
    pub content_type: &'static str,
    pub body: Vec<u8>,
}

impl Route {
    pub fn ok(content_type: &'static str, body: impl Into<Vec<u8>>) -> Self {
        Route {
            status: 200,
            content_type,
            body: body.into(),
        }
    }

    pub fn status(status: u16) -> Self {
        Route {
            status,
            content_type: "text/plain",
            body: format!("status {status}").into_bytes(),
        }
    }
}

/// A PUT the server accepted.
#[derive(Debug, Clone)]
pub struct Received {
    pub path: String,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

pub struct MediaServer {
    /// Base URL with trailing slash, e.g. `http://127.0.0.1:12345/`.
    pub base: String,
    received: Arc<Mutex<Vec<Received>>>,
}

impl MediaServer {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path.trim_start_matches('/'))
    }

    pub fn received(&self) -> Vec<Received> {
        self.received.lock().unwrap().clone()
    }
}

/// Starts a server in a background thread. Routes are keyed by path
/// (`/clip.mp4`). A PUT to a path with a route answers with that route's
/// status when it is not 2xx; otherwise it is stored and answered with 201
/// and an ETag. The server runs until the process exits.
pub fn start(routes: Vec<(&'static str, Route)>) -> MediaServer {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    let routes: Arc<HashMap<&'static str, Route>> = Arc::new(routes.into_iter().collect());
    let received = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&received);
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            let routes = Arc::clone(&routes);
            let sink = Arc::clone(&sink);
            thread::spawn(move || handle(stream, &routes, &sink));
        }
    });
    MediaServer {
        base: format!("http://127.0.0.1:{port}/"),
        received,
    }
}

struct Request {
    method: String,
    path: String,
    headers: HashMap<String, String>,
    /// Body bytes that arrived together with the headers.
    body_start: Vec<u8>,
}

fn read_request(stream: &mut TcpStream) -> Option<Request> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 8192];
    let head_end = loop {
        let n = stream.read(&mut chunk).ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
    };
    let head = std::str::from_utf8(&buf[..head_end]).ok()?;
    let mut lines = head.lines();
    let mut first = lines.next()?.split_whitespace();
    let method = first.next()?.to_string();
    let target = first.next()?;
    let path = target.split('?').next().unwrap_or(target).to_string();
    let headers = lines
        .filter_map(|l| l.split_once(':'))
        .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().to_string()))
        .collect();
    Some(Request {
        method,
        path,
        headers,
        body_start: buf[head_end + 4..].to_vec(),
    })
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        _ => "Status",
    }
}

fn respond(stream: &mut TcpStream, status: u16, content_type: &str, extra: &str, body: &[u8], send_body: bool) {
    let response = format!(
        "HTTP/1.1 {status} {}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\n{extra}Connection: close\r\n\r\n",
        reason(status),
        body.len()
    );
    let _ = stream.write_all(response.as_bytes());
    if send_body {
        let _ = stream.write_all(body);
    }
}

fn handle(mut stream: TcpStream, routes: &HashMap<&'static str, Route>, sink: &Mutex<Vec<Received>>) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(5)));
    let _ = stream.set_write_timeout(Some(Duration::from_secs(5)));
    let Some(req) = read_request(&mut stream) else {
        return;
    };
    let route = routes.get(req.path.as_str());

    match req.method.as_str() {
        "GET" | "HEAD" => {
            let send_body = req.method == "GET";
            match route {
                Some(r) => respond(&mut stream, r.status, r.content_type, "", &r.body, send_body),
                None => respond(&mut stream, 404, "text/plain", "", b"not found", send_body),
            }
        }
        "PUT" => {
            if req
                .headers
                .get("expect")
                .is_some_and(|v| v.eq_ignore_ascii_case("100-continue"))
            {
                let _ = stream.write_all(b"HTTP/1.1 100 Continue\r\n\r\n");
            }
            let len: usize = req
                .headers
                .get("content-length")
                .and_then(|v| v.parse().ok())
                .unwrap_or(0);
            let mut body = req.body_start;
            let mut chunk = [0u8; 65536];
            while body.len() < len {
                match stream.read(&mut chunk) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => body.extend_from_slice(&chunk[..n]),
                }
            }
            if let Some(r) = route.filter(|r| !(200..300).contains(&r.status)) {
                respond(&mut stream, r.status, r.content_type, "", &r.body, true);
                return;
            }
            sink.lock().unwrap().push(Received {
                path: req.path,
                headers: req.headers,
                body,
            });
            respond(&mut stream, 201, "text/plain", "ETag: \"stub-etag\"\r\n", b"", true);
        }
        _ => respond(&mut stream, 405, "text/plain", "", b"", true),
    }
}
