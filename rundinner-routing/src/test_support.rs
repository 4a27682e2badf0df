//! Test utilities for the HTTP backends.
//!
//! [`LoopbackServer`] is a minimal HTTP/1.1 responder bound to `127.0.0.1`.
//! It replays scripted responses and records every request so tests can
//! exercise the real backends without a routing service.

use std::io::{BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;

/// A scripted HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CannedResponse {
    /// Status code.
    pub status: u16,
    /// JSON body.
    pub body: String,
}

impl CannedResponse {
    /// A response with `status` and `body`.
    #[must_use]
    pub fn json(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// A `200 OK` response with `body`.
    #[must_use]
    pub fn ok(body: impl Into<String>) -> Self {
        Self::json(200, body)
    }
}

/// A request as seen by the server.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordedRequest {
    /// HTTP method.
    pub method: String,
    /// Request target: path plus query.
    pub target: String,
    /// Headers with lower-cased names.
    pub headers: Vec<(String, String)>,
    /// Request body.
    pub body: String,
}

impl RecordedRequest {
    /// The first header called `name` (case-insensitive).
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        let name = name.to_ascii_lowercase();
        self.headers
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Debug, Default)]
struct Script {
    responses: Vec<CannedResponse>,
    requests: Vec<RecordedRequest>,
}

impl Script {
    /// Responses are served in order; the last one repeats.
    fn next_response(&self) -> CannedResponse {
        let index = self.requests.len().saturating_sub(1);
        self.responses
            .get(index)
            .or_else(|| self.responses.last())
            .cloned()
            .unwrap_or_else(|| CannedResponse::json(500, r#"{"error":"no scripted response"}"#))
    }
}

/// Loopback HTTP server replaying [`CannedResponse`]s.
///
/// The server stops when dropped.
///
/// # Example
///
/// ```
/// use rundinner_routing::test_support::{CannedResponse, LoopbackServer};
///
/// let server = LoopbackServer::start(vec![CannedResponse::ok("{}")]).expect("bind");
/// assert!(server.base_url().starts_with("http://127.0.0.1:"));
/// assert_eq!(server.hits(), 0);
/// ```
#[derive(Debug)]
pub struct LoopbackServer {
    addr: SocketAddr,
    script: Arc<Mutex<Script>>,
    stopping: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl LoopbackServer {
    /// Bind an ephemeral port and start serving `responses`.
    ///
    /// # Errors
    ///
    /// Returns the IO error if the listener cannot be bound or the server
    /// thread cannot be spawned.
    pub fn start(responses: Vec<CannedResponse>) -> std::io::Result<Self> {
        let listener = TcpListener::bind(("127.0.0.1", 0))?;
        let addr = listener.local_addr()?;
        let script = Arc::new(Mutex::new(Script {
            responses,
            requests: Vec::new(),
        }));
        let stopping = Arc::new(AtomicBool::new(false));

        let worker = {
            let script = Arc::clone(&script);
            let stopping = Arc::clone(&stopping);
            std::thread::Builder::new()
                .name("loopback-routing".to_owned())
                .spawn(move || serve(&listener, &script, &stopping))?
        };

        Ok(Self {
            addr,
            script,
            stopping,
            worker: Some(worker),
        })
    }

    /// `http://127.0.0.1:<port>`.
    #[must_use]
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Number of requests served so far.
    #[must_use]
    pub fn hits(&self) -> usize {
        self.lock().requests.len()
    }

    /// Copies of the requests served so far.
    #[must_use]
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.lock().requests.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for LoopbackServer {
    fn drop(&mut self) {
        self.stopping.store(true, Ordering::SeqCst);
        // Wake the blocking accept so the thread sees the flag.
        let _ = TcpStream::connect(self.addr);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn serve(listener: &TcpListener, script: &Mutex<Script>, stopping: &AtomicBool) {
    for stream in listener.incoming() {
        if stopping.load(Ordering::SeqCst) {
            break;
        }
        let Ok(stream) = stream else { continue };
        let _ = handle(stream, script);
    }
}

fn handle(stream: TcpStream, script: &Mutex<Script>) -> std::io::Result<()> {
    let mut reader = BufReader::new(stream.try_clone()?);
    let request = read_request(&mut reader)?;

    let response = {
        let mut script = script.lock().unwrap_or_else(PoisonError::into_inner);
        script.requests.push(request);
        script.next_response()
    };

    let mut stream = stream;
    write!(
        stream,
        "HTTP/1.1 {} Scripted\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        response.status,
        response.body.len(),
        response.body
    )?;
    stream.flush()
}

fn read_request(reader: &mut impl BufRead) -> std::io::Result<RecordedRequest> {
    let mut line = String::new();
    reader.read_line(&mut line)?;
    let mut parts = line.split_whitespace();
    let method = parts.next().unwrap_or_default().to_owned();
    let target = parts.next().unwrap_or_default().to_owned();

    let mut headers = Vec::new();
    loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            break;
        }
        let trimmed = line.trim_end();
        if trimmed.is_empty() {
            break;
        }
        if let Some((name, value)) = trimmed.split_once(':') {
            headers.push((name.trim().to_ascii_lowercase(), value.trim().to_owned()));
        }
    }

    let length = headers
        .iter()
        .find(|(name, _)| name == "content-length")
        .and_then(|(_, value)| value.parse::<usize>().ok())
        .unwrap_or(0);
    let mut body = vec![0; length];
    reader.read_exact(&mut body)?;

    Ok(RecordedRequest {
        method,
        target,
        headers,
        body: String::from_utf8_lossy(&body).into_owned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn parses_request_line_headers_and_body() {
        let raw = "POST /v2/directions HTTP/1.1\r\nAuthorization: key\r\nContent-Length: 4\r\n\r\nbody";
        let request = read_request(&mut raw.as_bytes()).expect("request parses");
        assert_eq!(request.method, "POST");
        assert_eq!(request.target, "/v2/directions");
        assert_eq!(request.header("authorization"), Some("key"));
        assert_eq!(request.body, "body");
    }

    #[rstest]
    fn last_response_repeats() {
        let mut script = Script {
            responses: vec![CannedResponse::json(429, "{}"), CannedResponse::ok("{}")],
            requests: Vec::new(),
        };
        for expected in [429, 200, 200] {
            script.requests.push(RecordedRequest::default());
            assert_eq!(script.next_response().status, expected);
        }
    }
}
