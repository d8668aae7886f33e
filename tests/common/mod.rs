#![allow(dead_code)]

use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use tokio::{
    io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
};

/// A request received by [`StubServer`]
#[derive(Debug, Clone, Default)]
pub struct Captured {
    pub method: String,
    pub path: String,
    /// Lowercase names
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
}

impl Captured {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    pub fn body_str(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).unwrap()
    }
}

/// HTTP/1.1 server answering every request with the same canned response
pub struct StubServer {
    pub url: String,
    captured: Arc<Mutex<Vec<Captured>>>,
}

impl StubServer {
    pub async fn start(status: u16, body: &'static str) -> StubServer {
        StubServer::start_with_delay(status, body, Duration::from_secs(0)).await
    }

    /// Waits `delay` before answering
    pub async fn start_with_delay(status: u16, body: &'static str, delay: Duration) -> StubServer {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let captured = Arc::new(Mutex::new(Vec::new()));

        let record = captured.clone();
        tokio::spawn(async move {
            loop {
                let (stream, _) = match listener.accept().await {
                    Ok(accepted) => accepted,
                    Err(_) => return,
                };
                let record = record.clone();
                tokio::spawn(async move {
                    let _ = handle(stream, status, body, delay, record).await;
                });
            }
        });

        StubServer { url, captured }
    }

    pub fn requests(&self) -> Vec<Captured> {
        self.captured.lock().unwrap().clone()
    }

    pub fn last(&self) -> Captured {
        self.requests().pop().expect("no request received")
    }
}

async fn handle(
    stream: TcpStream,
    status: u16,
    body: &'static str,
    delay: Duration,
    record: Arc<Mutex<Vec<Captured>>>,
) -> std::io::Result<()> {
    let mut reader = BufReader::new(stream);

    let mut line = String::new();
    reader.read_line(&mut line).await?;
    let mut parts = line.split_whitespace();
    let mut captured = Captured {
        method: parts.next().unwrap_or_default().to_owned(),
        path: parts.next().unwrap_or_default().to_owned(),
        ..Captured::default()
    };

    loop {
        line.clear();
        reader.read_line(&mut line).await?;
        let header = line.trim_end();
        if header.is_empty() {
            break;
        }
        if let Some((name, value)) = header.split_once(':') {
            captured
                .headers
                .insert(name.trim().to_lowercase(), value.trim().to_owned());
        }
    }

    let length = captured
        .header("content-length")
        .and_then(|l| l.parse::<usize>().ok())
        .unwrap_or(0);
    captured.body = vec![0; length];
    reader.read_exact(&mut captured.body).await?;
    record.lock().unwrap().push(captured);

    tokio::time::sleep(delay).await;

    let response = format!(
        "HTTP/1.1 {} Stub\r\nContent-Type: application/json\r\nX-Stub: 1\r\nX-Stub: 2\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        body.len(),
        body
    );
    let mut stream = reader.into_inner();
    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}
