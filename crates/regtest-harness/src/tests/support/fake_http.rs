//! In-process HTTP server standing in for daemons and the indexing service.
//!
//! The server accepts connections on an ephemeral port until dropped,
//! records every request, and answers each one through a handler closure.
//! Every response closes its connection so requests never pipeline.

use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde_json::{Value, json};

/// A request as seen by the fake server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub authorization: Option<String>,
    pub body: String,
}

impl RecordedRequest {
    /// Parses the body as JSON, yielding `Null` for empty or invalid bodies.
    pub fn json(&self) -> Value {
        serde_json::from_str(&self.body).unwrap_or(Value::Null)
    }
}

/// A canned response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct FakeResponse {
    pub status: u16,
    pub body: String,
}

impl FakeResponse {
    pub fn json(status: u16, body: &Value) -> Self {
        Self {
            status,
            body: body.to_string(),
        }
    }

    pub fn ok(body: &Value) -> Self {
        Self::json(200, body)
    }

    /// A JSON-RPC success envelope.
    pub fn rpc_result(result: Value) -> Self {
        Self::ok(&json!({"result": result, "error": null, "id": 1}))
    }

    /// A JSON-RPC error envelope carried on `status`.
    pub fn rpc_error(status: u16, code: i64, message: &str) -> Self {
        Self::json(
            status,
            &json!({"result": null, "error": {"code": code, "message": message}, "id": 1}),
        )
    }
}

type Handler = dyn Fn(&RecordedRequest) -> FakeResponse + Send + Sync;

/// A fake HTTP server running on a background thread.
pub(crate) struct FakeHttpServer {
    port: u16,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    stop: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl FakeHttpServer {
    /// Spawns a server on an ephemeral port.
    pub fn spawn(
        handler: impl Fn(&RecordedRequest) -> FakeResponse + Send + Sync + 'static,
    ) -> Result<Self> {
        let listener = TcpListener::bind(("127.0.0.1", 0)).context("bind fake server")?;
        Self::serve(listener, Arc::new(handler))
    }

    /// Spawns a server on a specific port.
    pub fn spawn_on(
        port: u16,
        handler: impl Fn(&RecordedRequest) -> FakeResponse + Send + Sync + 'static,
    ) -> Result<Self> {
        let listener = TcpListener::bind(("127.0.0.1", port)).context("bind fake server")?;
        Self::serve(listener, Arc::new(handler))
    }

    fn serve(listener: TcpListener, handler: Arc<Handler>) -> Result<Self> {
        listener
            .set_nonblocking(true)
            .context("fake server nonblocking")?;
        let port = listener.local_addr().context("local addr")?.port();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let stop = Arc::new(AtomicBool::new(false));
        let requests_clone = Arc::clone(&requests);
        let stop_clone = Arc::clone(&stop);
        let handle = thread::spawn(move || {
            accept_loop(&listener, handler.as_ref(), &requests_clone, &stop_clone);
        });
        Ok(Self {
            port,
            requests,
            stop,
            handle: Some(handle),
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Requests received so far.
    pub fn requests(&self) -> Result<Vec<RecordedRequest>> {
        let guard = self
            .requests
            .lock()
            .map_err(|error| anyhow!("lock requests: {error}"))?;
        Ok(guard.clone())
    }
}

impl Drop for FakeHttpServer {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Returns a port nothing is listening on.
pub(crate) fn unused_port() -> Result<u16> {
    let listener = TcpListener::bind(("127.0.0.1", 0)).context("bind probe listener")?;
    Ok(listener.local_addr().context("local addr")?.port())
}

fn accept_loop(
    listener: &TcpListener,
    handler: &Handler,
    requests: &Mutex<Vec<RecordedRequest>>,
    stop: &AtomicBool,
) {
    while !stop.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, _)) => {
                if let Ok(request) = handle_connection(stream, handler)
                    && let Ok(mut guard) = requests.lock()
                {
                    guard.push(request);
                }
            }
            Err(ref error) if error.kind() == io::ErrorKind::WouldBlock => {
                thread::sleep(Duration::from_millis(5));
            }
            Err(_) => return,
        }
    }
}

fn handle_connection(mut stream: TcpStream, handler: &Handler) -> Result<RecordedRequest> {
    stream.set_nonblocking(false).context("blocking stream")?;
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .context("read timeout")?;
    let request = read_request(&stream)?;
    let response = handler(&request);
    write_response(&mut stream, &response)?;
    Ok(request)
}

fn read_request(stream: &TcpStream) -> Result<RecordedRequest> {
    let mut reader = BufReader::new(stream.try_clone().context("clone stream")?);
    let mut request_line = String::new();
    reader
        .read_line(&mut request_line)
        .context("read request line")?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default().to_owned();
    let path = parts.next().unwrap_or_default().to_owned();

    let mut content_length = 0;
    let mut authorization = None;
    loop {
        let mut header = String::new();
        reader.read_line(&mut header).context("read header")?;
        let header = header.trim_end();
        if header.is_empty() {
            break;
        }
        if let Some((name, value)) = header.split_once(':') {
            let value = value.trim();
            if name.eq_ignore_ascii_case("content-length") {
                content_length = value.parse().context("content length")?;
            } else if name.eq_ignore_ascii_case("authorization") {
                authorization = Some(value.to_owned());
            }
        }
    }

    let mut body = vec![0; content_length];
    reader.read_exact(&mut body).context("read body")?;
    Ok(RecordedRequest {
        method,
        path,
        authorization,
        body: String::from_utf8(body).context("utf-8 body")?,
    })
}

fn write_response(stream: &mut TcpStream, response: &FakeResponse) -> Result<()> {
    let reason = match response.status {
        200 => "OK",
        201 => "Created",
        401 => "Unauthorized",
        404 => "Not Found",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Status",
    };
    write!(
        stream,
        "HTTP/1.1 {} {reason}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        response.status,
        response.body.len(),
        response.body
    )
    .context("write response")?;
    stream.flush().context("flush response")
}
