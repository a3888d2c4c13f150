//! Stub ingestion endpoint for integration tests
//!
//! Plain HTTP/1.1 over a std `TcpListener` on a background thread. Every
//! request is recorded; responses follow a status script (then a fallback),
//! optionally after a delay.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use insights_core::config::{IngestionConfig, StorageConfig, TrackerConfig};
use insights_core::Config;

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub headers: HashMap<String, String>,
    pub body: serde_json::Value,
}

#[derive(Default)]
struct Script {
    statuses: VecDeque<(u16, String)>,
    fallback: (u16, String),
    delay: Option<Duration>,
}

pub struct StubServer {
    addr: String,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    script: Arc<Mutex<Script>>,
    shutdown: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl StubServer {
    pub fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind stub server");
        let addr = listener.local_addr().expect("discover addr").to_string();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let script = Arc::new(Mutex::new(Script {
            fallback: (200, String::new()),
            ..Default::default()
        }));
        let shutdown = Arc::new(AtomicBool::new(false));

        let handle = thread::spawn({
            let requests = requests.clone();
            let script = script.clone();
            let shutdown = shutdown.clone();
            move || {
                for stream in listener.incoming() {
                    if shutdown.load(Ordering::SeqCst) {
                        break;
                    }
                    let Ok(tcp) = stream else {
                        continue;
                    };
                    handle_connection(tcp, &requests, &script);
                }
            }
        });

        Self {
            addr,
            requests,
            script,
            shutdown,
            handle: Some(handle),
        }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Answer `status` with `body` from now on
    pub fn respond(&self, status: u16, body: &str) {
        let mut script = self.script.lock().unwrap();
        script.statuses.clear();
        script.fallback = (status, body.to_string());
    }

    /// Answer the next requests with `statuses` in order
    pub fn respond_sequence(&self, statuses: &[u16]) {
        let mut script = self.script.lock().unwrap();
        script
            .statuses
            .extend(statuses.iter().map(|status| (*status, String::new())));
    }

    pub fn delay(&self, delay: Duration) {
        self.script.lock().unwrap().delay = Some(delay);
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Every event record received so far, in arrival order
    pub fn received_events(&self) -> Vec<serde_json::Value> {
        self.requests()
            .into_iter()
            .flat_map(|request| {
                request.body["events"]
                    .as_array()
                    .cloned()
                    .unwrap_or_default()
            })
            .collect()
    }

    /// Poll until `count` requests have arrived
    pub async fn wait_for_requests(&self, count: usize) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while self.requests().len() < count {
            assert!(
                Instant::now() < deadline,
                "expected {} request(s), got {}",
                count,
                self.requests().len()
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

impl Drop for StubServer {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        let _ = TcpStream::connect(&self.addr);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn handle_connection(
    mut tcp: TcpStream,
    requests: &Mutex<Vec<RecordedRequest>>,
    script: &Mutex<Script>,
) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    let header_end = loop {
        match tcp.read(&mut chunk) {
            Ok(0) | Err(_) => return,
            Ok(n) => {
                buf.extend_from_slice(&chunk[..n]);
                if let Some(pos) = buf.windows(4).position(|window| window == b"\r\n\r\n") {
                    break pos + 4;
                }
            }
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let mut lines = head.lines();
    let mut request_line = lines.next().unwrap_or_default().split_whitespace();
    let method = request_line.next().unwrap_or_default().to_string();
    let path = request_line.next().unwrap_or("/").to_string();
    let headers: HashMap<String, String> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(name, value)| (name.trim().to_ascii_lowercase(), value.trim().to_string()))
        .collect();

    let content_length = headers
        .get("content-length")
        .and_then(|value| value.parse::<usize>().ok())
        .unwrap_or(0);
    while buf.len() < header_end + content_length {
        match tcp.read(&mut chunk) {
            Ok(0) | Err(_) => break,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }
    let body = serde_json::from_slice(&buf[header_end..]).unwrap_or(serde_json::Value::Null);

    requests.lock().unwrap().push(RecordedRequest {
        method,
        path,
        headers,
        body,
    });

    let ((status, body), delay) = {
        let mut script = script.lock().unwrap();
        let reply = script
            .statuses
            .pop_front()
            .unwrap_or_else(|| script.fallback.clone());
        (reply, script.delay)
    };
    if let Some(delay) = delay {
        thread::sleep(delay);
    }

    let response = format!(
        "HTTP/1.1 {} Stub\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        body.len(),
        body
    );
    let _ = tcp.write_all(response.as_bytes());
}

/// Pipeline configuration pointing at `server` with a queue under `dir`
pub fn config(server: &StubServer, dir: &Path, min_batch_size: usize) -> Config {
    Config {
        ingestion: IngestionConfig {
            endpoint: server.url(),
            app_id: Some("testApp".to_string()),
            api_key: Some("testKey".to_string()),
            connect_timeout_ms: 1000,
            read_timeout_ms: 1000,
        },
        tracker: TrackerConfig {
            min_batch_size,
            enabled: true,
        },
        storage: StorageConfig {
            database_path: Some(dir.join("events.db")),
        },
        ..Default::default()
    }
}
