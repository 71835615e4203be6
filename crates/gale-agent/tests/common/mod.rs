//! Shared in-process server stub for agent integration tests.
//!
//! Implements the three endpoints a build session talks to: console
//! ingestion (`PUT`), artifact upload (`POST` multipart with `zipfile` and
//! `file_checksum` parts, extracted under the build's artifact namespace
//! with checksum lines appended), and artifact download (`GET` with a
//! `file` query).
#![allow(dead_code)]

use std::collections::HashMap;
use std::io::Cursor;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Multipart, Path as UrlPath, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::Router;
use tempfile::TempDir;
use tokio::sync::Mutex;

pub struct StubState {
    root: TempDir,
    consoles: Mutex<HashMap<String, Vec<u8>>>,
}

#[derive(Clone)]
pub struct StubServer {
    addr: SocketAddr,
    state: Arc<StubState>,
}

impl StubServer {
    pub async fn start() -> StubServer {
        let state = Arc::new(StubState {
            root: tempfile::tempdir().expect("stub server storage"),
            consoles: Mutex::new(HashMap::new()),
        });

        let app = Router::new()
            .route("/console/:build_id", put(put_console))
            .route("/artifacts/:build_id", post(post_artifacts))
            .route("/artifacts/:build_id", get(get_artifact))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        StubServer { addr, state }
    }

    pub fn console_url(&self, build_id: &str) -> String {
        format!("http://{}/console/{build_id}", self.addr)
    }

    pub fn artifact_url(&self, build_id: &str) -> String {
        format!("http://{}/artifacts/{build_id}", self.addr)
    }

    /// Everything the agent has flushed to the build's console so far.
    pub async fn console_log(&self, build_id: &str) -> String {
        let consoles = self.state.consoles.lock().await;
        String::from_utf8_lossy(consoles.get(build_id).map(Vec::as_slice).unwrap_or_default())
            .into_owned()
    }

    /// Server-side path of one uploaded artifact file.
    pub fn artifact_file(&self, build_id: &str, rel: &str) -> PathBuf {
        self.artifact_dir(build_id).join(rel)
    }

    pub fn artifact_dir(&self, build_id: &str) -> PathBuf {
        self.state.root.path().join("artifacts").join(build_id)
    }

    pub fn checksum_file(&self, build_id: &str) -> PathBuf {
        self.state
            .root
            .path()
            .join("artifacts")
            .join(format!("{build_id}.checksum"))
    }

    /// Contents of the build's append-only checksum file.
    pub async fn checksum(&self, build_id: &str) -> String {
        tokio::fs::read_to_string(self.checksum_file(build_id))
            .await
            .unwrap_or_default()
    }

    /// Seed a server-side artifact so download tests have something to pull.
    pub async fn seed_artifact(&self, build_id: &str, rel: &str, content: &[u8]) {
        let path = self.artifact_file(build_id, rel);
        tokio::fs::create_dir_all(path.parent().unwrap()).await.unwrap();
        tokio::fs::write(path, content).await.unwrap();
    }
}

async fn put_console(
    State(state): State<Arc<StubState>>,
    UrlPath(build_id): UrlPath<String>,
    body: Bytes,
) -> StatusCode {
    state
        .consoles
        .lock()
        .await
        .entry(build_id)
        .or_default()
        .extend_from_slice(&body);
    StatusCode::OK
}

async fn post_artifacts(
    State(state): State<Arc<StubState>>,
    UrlPath(build_id): UrlPath<String>,
    mut multipart: Multipart,
) -> StatusCode {
    while let Some(field) = match multipart.next_field().await {
        Ok(field) => field,
        Err(_) => return StatusCode::BAD_REQUEST,
    } {
        let name = field.name().unwrap_or_default().to_string();
        let data = match field.bytes().await {
            Ok(data) => data,
            Err(_) => return StatusCode::BAD_REQUEST,
        };
        let outcome = match name.as_str() {
            "zipfile" => extract_zip(&state, &build_id, &data),
            "file_checksum" => append_checksum(&state, &build_id, &data),
            _ => Ok(()),
        };
        if outcome.is_err() {
            return StatusCode::INTERNAL_SERVER_ERROR;
        }
    }
    StatusCode::CREATED
}

fn extract_zip(state: &StubState, build_id: &str, data: &[u8]) -> std::io::Result<()> {
    let mut archive = zip::ZipArchive::new(Cursor::new(data.to_vec()))
        .map_err(|e| std::io::Error::other(e.to_string()))?;
    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| std::io::Error::other(e.to_string()))?;
        if entry.is_dir() {
            continue;
        }
        let Some(rel) = entry.enclosed_name() else {
            continue;
        };
        let dest = state.root.path().join("artifacts").join(build_id).join(rel);
        std::fs::create_dir_all(dest.parent().unwrap())?;
        let mut out = std::fs::File::create(dest)?;
        std::io::copy(&mut entry, &mut out)?;
    }
    Ok(())
}

fn append_checksum(state: &StubState, build_id: &str, data: &[u8]) -> std::io::Result<()> {
    use std::io::Write;

    let path = state
        .root
        .path()
        .join("artifacts")
        .join(format!("{build_id}.checksum"));
    std::fs::create_dir_all(path.parent().unwrap())?;
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    file.write_all(data)
}

async fn get_artifact(
    State(state): State<Arc<StubState>>,
    UrlPath(build_id): UrlPath<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Vec<u8>, StatusCode> {
    let path = match params.get("file") {
        Some(file) => state.root.path().join("artifacts").join(&build_id).join(file),
        None => state
            .root
            .path()
            .join("artifacts")
            .join(format!("{build_id}.checksum")),
    };
    std::fs::read(path).map_err(|_| StatusCode::BAD_REQUEST)
}

/// Strip the `HH:MM:SS.mmm ` prefix from every console line.
pub fn trim_timestamps(log: &str) -> String {
    log.lines()
        .map(strip_stamp)
        .map(|line| format!("{line}\n"))
        .collect()
}

fn strip_stamp(line: &str) -> &str {
    let bytes = line.as_bytes();
    if bytes.len() >= 13
        && bytes[2] == b':'
        && bytes[5] == b':'
        && bytes[8] == b'.'
        && bytes[12] == b' '
    {
        &line[13..]
    } else {
        line
    }
}
