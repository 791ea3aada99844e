#![allow(dead_code)]

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chatline::client::{ChatClient, ClientSettings, RetryPolicy};
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

pub const TEST_API_KEY: &str = "test-key-123";

/// What the mock does after sending a truncated body.
#[derive(Debug, Clone, Copy)]
pub enum AfterPartial {
    Stall(Duration),
    Disconnect,
}

#[derive(Debug, Clone)]
pub enum Reply {
    Status {
        status: u16,
        headers: Vec<(String, String)>,
        body: String,
    },
    /// Declares the full body length in the headers but only writes a prefix.
    Partial {
        status: u16,
        declared_len: usize,
        body: String,
        then: AfterPartial,
    },
    Hang(Duration),
}

impl Reply {
    pub fn json(status: u16, body: Value) -> Self {
        Self::text(status, body.to_string())
    }

    pub fn text(status: u16, body: impl Into<String>) -> Self {
        Self::Status {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn content(text: &str) -> Self {
        Self::json(
            200,
            serde_json::json!({
                "id": "cmpl-1",
                "choices": [{"index": 0, "message": {"role": "assistant", "content": text}}]
            }),
        )
    }

    pub fn partial(declared_len: usize, body: impl Into<String>, then: AfterPartial) -> Self {
        Self::Partial {
            status: 200,
            declared_len,
            body: body.into(),
            then,
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let Self::Status { headers, .. } = &mut self {
            headers.push((name.to_string(), value.to_string()));
        }
        self
    }
}

#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Value,
}

impl CapturedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// In-process upstream that plays back scripted replies in order; once the
/// script runs out the last reply repeats.
pub struct MockUpstream {
    addr: SocketAddr,
    requests: Arc<Mutex<Vec<CapturedRequest>>>,
}

impl MockUpstream {
    pub async fn start(script: Vec<Reply>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind should succeed");
        let addr = listener.local_addr().expect("address should be available");
        let requests = Arc::new(Mutex::new(Vec::new()));
        let script = Arc::new(Mutex::new(VecDeque::from(script)));

        let captured = Arc::clone(&requests);
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                let captured = Arc::clone(&captured);
                let script = Arc::clone(&script);
                tokio::spawn(async move {
                    handle_connection(stream, captured, script).await;
                });
            }
        });

        Self { addr, requests }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}/v1", self.addr)
    }

    pub fn requests(&self) -> Vec<CapturedRequest> {
        self.requests.lock().expect("lock should not be poisoned").clone()
    }

    pub fn attempts(&self) -> usize {
        self.requests.lock().expect("lock should not be poisoned").len()
    }

    pub fn client(&self, max_retries: u32) -> ChatClient {
        self.client_with_timeout(max_retries, Duration::from_secs(5))
    }

    pub fn client_with_timeout(&self, max_retries: u32, timeout: Duration) -> ChatClient {
        self.client_with_policy(RetryPolicy::new(max_retries, 0.0), timeout)
    }

    pub fn client_with_policy(&self, retry: RetryPolicy, timeout: Duration) -> ChatClient {
        ChatClient::new(ClientSettings {
            base_url: self.base_url(),
            api_key: TEST_API_KEY.to_string(),
            model: "mistral-test".to_string(),
            timeout,
            retry,
        })
        .expect("client should build")
    }
}

fn next_reply(script: &Mutex<VecDeque<Reply>>) -> Reply {
    let mut script = script.lock().expect("lock should not be poisoned");
    if script.len() > 1 {
        script.pop_front().expect("script is non-empty")
    } else {
        script
            .front()
            .cloned()
            .unwrap_or_else(|| Reply::text(500, "mock script is empty"))
    }
}

fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|window| window == b"\r\n\r\n")
}

async fn read_request(stream: &mut TcpStream) -> Option<CapturedRequest> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let header_end = loop {
        if let Some(end) = find_header_end(&buf) {
            break end;
        }
        let read = stream.read(&mut chunk).await.ok()?;
        if read == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..read]);
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let mut lines = head.split("\r\n");
    let mut request_line = lines.next()?.split_whitespace();
    let method = request_line.next()?.to_string();
    let path = request_line.next()?.to_string();
    let headers: Vec<(String, String)> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
        .collect();

    let content_length = headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.parse::<usize>().ok())
        .unwrap_or(0);

    let body_start = header_end + 4;
    while buf.len() < body_start + content_length {
        let read = stream.read(&mut chunk).await.ok()?;
        if read == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..read]);
    }

    let body = serde_json::from_slice(&buf[body_start..body_start + content_length])
        .unwrap_or(Value::Null);
    Some(CapturedRequest {
        method,
        path,
        headers,
        body,
    })
}

async fn handle_connection(
    mut stream: TcpStream,
    captured: Arc<Mutex<Vec<CapturedRequest>>>,
    script: Arc<Mutex<VecDeque<Reply>>>,
) {
    let Some(request) = read_request(&mut stream).await else {
        return;
    };
    captured
        .lock()
        .expect("lock should not be poisoned")
        .push(request);

    match next_reply(&script) {
        Reply::Hang(duration) => {
            tokio::time::sleep(duration).await;
        }
        Reply::Status {
            status,
            headers,
            body,
        } => {
            let mut response = response_head(status, body.len());
            for (name, value) in headers {
                response.push_str(&format!("{name}: {value}\r\n"));
            }
            response.push_str("\r\n");
            response.push_str(&body);
            let _ = stream.write_all(response.as_bytes()).await;
            let _ = stream.shutdown().await;
        }
        Reply::Partial {
            status,
            declared_len,
            body,
            then,
        } => {
            let response = format!("{}\r\n{body}", response_head(status, declared_len));
            let _ = stream.write_all(response.as_bytes()).await;
            let _ = stream.flush().await;
            match then {
                AfterPartial::Stall(duration) => tokio::time::sleep(duration).await,
                AfterPartial::Disconnect => drop(stream),
            }
        }
    }
}

fn response_head(status: u16, content_length: usize) -> String {
    format!(
        "HTTP/1.1 {status} Mock\r\ncontent-type: application/json\r\n\
         content-length: {content_length}\r\nconnection: close\r\n"
    )
}
