//! Shared helpers for integration tests: a loopback robot API mock and a
//! batch that records the decision taken for it.

#![allow(dead_code)]

use std::io::{BufRead, BufReader, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::{Arc, mpsc};
use std::thread;
use std::time::Duration;

use dingtalk_output::{Batch, Event};
use parking_lot::Mutex;
use rstest::fixture;

/// Body returned by the mock for every response.
pub const ROBOT_REPLY: &str = r#"{"errcode":0,"errmsg":"ok"}"#;

fn status_text(code: u16) -> &'static str {
    match code {
        200 => "OK",
        201 => "Created",
        400 => "Bad Request",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}

#[derive(Debug)]
pub struct CapturedRequest {
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl CapturedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        let name = name.to_ascii_lowercase();
        self.headers
            .iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.body).expect("request body is json")
    }
}

fn read_headers(reader: &mut BufReader<TcpStream>) -> (Vec<(String, String)>, usize) {
    let mut headers = Vec::new();
    let mut content_length = 0usize;
    loop {
        let mut line = String::new();
        reader.read_line(&mut line).expect("read header");
        let line = line.trim();
        if line.is_empty() {
            break;
        }
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let (key, value) = (key.trim().to_lowercase(), value.trim().to_string());
        if key == "content-length" {
            content_length = value.parse().unwrap_or(0);
        }
        headers.push((key, value));
    }
    (headers, content_length)
}

fn read_http_request(stream: &mut TcpStream) -> CapturedRequest {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(5)));
    let mut reader = BufReader::new(stream.try_clone().expect("clone stream"));

    let mut request_line = String::new();
    reader
        .read_line(&mut request_line)
        .expect("read request line");
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default().to_string();
    let path = parts.next().unwrap_or_default().to_string();

    let (headers, content_length) = read_headers(&mut reader);
    let mut body = vec![0u8; content_length];
    reader.read_exact(&mut body).expect("read body");

    CapturedRequest {
        method,
        path,
        headers,
        body: String::from_utf8(body).expect("utf-8 body"),
    }
}

#[fixture]
pub fn tcp_listener() -> TcpListener {
    TcpListener::bind(("127.0.0.1", 0)).expect("bind ephemeral listener")
}

/// Serve one request per status in `statuses`, one connection each.
///
/// Every response closes its connection so each request is accepted afresh.
pub fn spawn_robot_server(
    listener: TcpListener,
    statuses: Vec<u16>,
) -> (SocketAddr, mpsc::Receiver<CapturedRequest>) {
    let addr = listener.local_addr().expect("listener has address");
    let (tx, rx) = mpsc::channel();

    thread::spawn(move || {
        for status in statuses {
            let Ok((mut stream, _)) = listener.accept() else {
                break;
            };
            let captured = read_http_request(&mut stream);
            let response = format!(
                "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                status_text(status),
                ROBOT_REPLY.len(),
                ROBOT_REPLY
            );
            let _ = stream.write_all(response.as_bytes());
            let _ = tx.send(captured);
        }
    });

    (addr, rx)
}

/// Decision recorded by a [`SharedBatch`].
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Decision {
    #[default]
    Pending,
    Acked,
    Retried(Vec<Event>),
    Cancelled,
}

/// Batch whose decision stays observable after it was handed to a worker.
pub struct SharedBatch {
    events: Vec<Event>,
    decision: Arc<Mutex<Decision>>,
}

impl SharedBatch {
    pub fn new(events: Vec<Event>) -> (Self, Arc<Mutex<Decision>>) {
        let decision = Arc::new(Mutex::new(Decision::Pending));
        (
            Self {
                events,
                decision: Arc::clone(&decision),
            },
            decision,
        )
    }
}

impl Batch for SharedBatch {
    fn events(&self) -> &[Event] {
        &self.events
    }

    fn acknowledge(&mut self) {
        *self.decision.lock() = Decision::Acked;
    }

    fn retry_all(&mut self, events: Vec<Event>) {
        *self.decision.lock() = Decision::Retried(events);
    }

    fn cancel_all(&mut self) {
        *self.decision.lock() = Decision::Cancelled;
    }
}

pub fn messages(texts: &[&str]) -> Vec<Event> {
    texts.iter().map(|t| Event::with_message(*t)).collect()
}
