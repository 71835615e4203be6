//! Buffered console writer.
//!
//! A dedicated worker task owns the byte buffer and the secret table. Lines
//! and secret registrations travel over the same channel, so a secret
//! registered before a write is always applied to it. The buffer is flushed
//! to the server on a periodic tick and drained once more on close; delivery
//! is best-effort and flush failures never abort the job.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, warn};

use super::secrets::SecretTable;

enum Event {
    Line(String),
    Secret { plain: String, mask: String },
    Close(oneshot::Sender<()>),
}

/// Console writer configuration
#[derive(Debug, Clone)]
pub struct ConsoleConfig {
    /// Console ingestion endpoint, targeted with `PUT`.
    pub url: String,
    pub flush_interval: Duration,
    pub write_timestamp: bool,
}

impl ConsoleConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            flush_interval: Duration::from_secs(5),
            write_timestamp: true,
        }
    }

    pub fn flush_interval_ms(mut self, millis: u64) -> Self {
        self.flush_interval = Duration::from_millis(millis);
        self
    }
}

/// Handle to a per-job console stream.
///
/// Cheap to clone; all clones feed the same worker. [`Console::write`] never
/// blocks on the network.
#[derive(Debug, Clone)]
pub struct Console {
    tx: mpsc::UnboundedSender<Event>,
}

impl Console {
    /// Create a console and spawn its worker task.
    pub fn new(http: reqwest::Client, config: ConsoleConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = Worker {
            http,
            url: config.url,
            write_timestamp: config.write_timestamp,
            buffer: Vec::with_capacity(10 * 1024),
            secrets: SecretTable::new(),
        };
        tokio::spawn(worker.run(rx, config.flush_interval));
        Self { tx }
    }

    /// Queue `text` for delivery, one console line per newline-separated
    /// fragment.
    pub fn write(&self, text: &str) {
        for line in text.split('\n') {
            let _ = self.tx.send(Event::Line(line.to_string()));
        }
    }

    /// Register a secret to be masked in every subsequent line.
    pub fn add_secret(&self, plain: &str, mask: &str) {
        let _ = self.tx.send(Event::Secret {
            plain: plain.to_string(),
            mask: mask.to_string(),
        });
    }

    /// Drain pending lines and perform a final flush. Safe to call once.
    pub async fn close(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.tx.send(Event::Close(ack_tx)).is_ok() {
            let _ = ack_rx.await;
        }
    }
}

struct Worker {
    http: reqwest::Client,
    url: String,
    write_timestamp: bool,
    buffer: Vec<u8>,
    secrets: SecretTable,
}

impl Worker {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Event>, flush_interval: Duration) {
        let mut tick = interval(flush_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                event = rx.recv() => match event {
                    Some(Event::Line(line)) => self.append_line(&line),
                    Some(Event::Secret { plain, mask }) => self.secrets.add(&plain, &mask),
                    Some(Event::Close(ack)) => {
                        self.flush().await;
                        debug!("build console closed");
                        let _ = ack.send(());
                        return;
                    }
                    None => {
                        self.flush().await;
                        return;
                    }
                },
                _ = tick.tick() => self.flush().await,
            }
        }
    }

    fn append_line(&mut self, line: &str) {
        let masked = self.secrets.apply(line);
        if self.write_timestamp {
            let timestamp = chrono::Local::now().format("%H:%M:%S%.3f");
            self.buffer
                .extend_from_slice(format!("{timestamp} {masked}\n").as_bytes());
        } else {
            self.buffer.extend_from_slice(masked.as_bytes());
            self.buffer.push(b'\n');
        }
    }

    /// Send the accumulated buffer to the server. The buffer is reset on any
    /// outcome: console delivery is best-effort and must not abort the job.
    async fn flush(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        debug!("console flush, buffer len: {}", self.buffer.len());
        let body = std::mem::take(&mut self.buffer);

        let result = self
            .http
            .put(&self.url)
            .header(reqwest::header::CONNECTION, "close")
            .body(body)
            .send()
            .await;

        match result {
            Ok(response) if !response.status().is_success() => {
                warn!("console flush rejected: {}", response.status());
            }
            Ok(_) => {}
            Err(e) => warn!("console flush failed: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::extract::State;
    use axum::routing::put;
    use axum::Router;
    use tokio::sync::Mutex;

    use super::*;

    async fn start_sink() -> (String, Arc<Mutex<Vec<u8>>>) {
        let received: Arc<Mutex<Vec<u8>>> = Arc::new(Mutex::new(Vec::new()));
        let state = received.clone();
        let app = Router::new()
            .route(
                "/console",
                put(
                    |State(state): State<Arc<Mutex<Vec<u8>>>>, body: axum::body::Bytes| async move {
                        state.lock().await.extend_from_slice(&body);
                    },
                ),
            )
            .with_state(state);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}/console"), received)
    }

    fn lines(bytes: &[u8]) -> Vec<String> {
        String::from_utf8(bytes.to_vec())
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[tokio::test]
    async fn lines_are_timestamped_and_delivered_on_close() {
        let (url, received) = start_sink().await;
        let console = Console::new(reqwest::Client::new(), ConsoleConfig::new(url));

        console.write("hello");
        console.write("world");
        console.close().await;

        let lines = lines(&received.lock().await);
        assert_eq!(lines.len(), 2);
        // HH:MM:SS.mmm followed by a single space and the text.
        for (line, text) in lines.iter().zip(["hello", "world"]) {
            let (stamp, rest) = line.split_at(13);
            assert_eq!(rest, text);
            assert_eq!(stamp.as_bytes()[2], b':');
            assert_eq!(stamp.as_bytes()[5], b':');
            assert_eq!(stamp.as_bytes()[8], b'.');
            assert_eq!(stamp.as_bytes()[12], b' ');
        }
    }

    #[tokio::test]
    async fn secrets_mask_subsequent_writes() {
        let (url, received) = start_sink().await;
        let console = Console::new(reqwest::Client::new(), ConsoleConfig::new(url));

        console.add_secret("topsecret", "$$$$$$");
        console.write("hello (topsecret)");
        console.close().await;

        let lines = lines(&received.lock().await);
        assert_eq!(&lines[0][13..], "hello ($$$$$$)");
    }

    #[tokio::test]
    async fn flush_failure_is_swallowed() {
        // Nothing listens on this port; close must still complete.
        let console = Console::new(
            reqwest::Client::new(),
            ConsoleConfig::new("http://127.0.0.1:1/console"),
        );
        console.write("lost line");
        console.close().await;
    }
}
