//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    extract::{Path as UrlPath, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;

use remote_config::remote::{RemoteSectionCollection, RemoteSectionParam};
use remote_config::{DocumentVersion, FileWatcher, RemoteSettings, SectionChanged};

/// Debounce used by every test watcher.
pub const DEBOUNCE: Duration = Duration::from_millis(150);

struct Published {
    version: DocumentVersion,
    body: String,
}

#[derive(Default)]
struct MockState {
    base_url: String,
    sections: Mutex<HashMap<String, Published>>,
    latency: Mutex<Duration>,
    download_latency: Mutex<Duration>,
    polls: AtomicUsize,
    downloads: AtomicUsize,
}

/// Programmable authority.
///
/// Answers every poll with all published sections the client asked about,
/// whatever version the client holds, so client-side filtering is what
/// decides whether anything gets downloaded.
#[derive(Clone)]
pub struct MockAuthority {
    addr: SocketAddr,
    state: Arc<MockState>,
}

impl MockAuthority {
    pub async fn start() -> Self {
        Self::start_on("127.0.0.1:0".parse().unwrap()).await
    }

    pub async fn start_on(addr: SocketAddr) -> Self {
        let listener = TcpListener::bind(addr).await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(MockState {
            base_url: format!("http://{addr}"),
            ..MockState::default()
        });

        let app = Router::new()
            .route("/sections/poll", post(poll))
            .route("/sections/{name}", get(download))
            .with_state(Arc::clone(&state));
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self { addr, state }
    }

    pub fn poll_url(&self) -> String {
        format!("http://{}/sections/poll", self.addr)
    }

    /// Announce `version` for `section` and serve `body` for it.
    pub fn publish(&self, section: &str, version: DocumentVersion, body: &str) {
        self.state.sections.lock().unwrap().insert(
            section.to_lowercase(),
            Published {
                version,
                body: body.to_string(),
            },
        );
    }

    /// Publish a well-formed document.
    pub fn publish_document(&self, section: &str, version: DocumentVersion, extra: &str) {
        self.publish(section, version, &document(version, extra));
    }

    pub fn set_latency(&self, latency: Duration) {
        *self.state.latency.lock().unwrap() = latency;
    }

    pub fn set_download_latency(&self, latency: Duration) {
        *self.state.download_latency.lock().unwrap() = latency;
    }

    pub fn polls(&self) -> usize {
        self.state.polls.load(Ordering::SeqCst)
    }

    pub fn downloads(&self) -> usize {
        self.state.downloads.load(Ordering::SeqCst)
    }
}

async fn poll(
    State(state): State<Arc<MockState>>,
    Json(request): Json<RemoteSectionCollection>,
) -> Json<RemoteSectionCollection> {
    state.polls.fetch_add(1, Ordering::SeqCst);
    let latency = *state.latency.lock().unwrap();
    tokio::time::sleep(latency).await;

    let sections = {
        let published = state.sections.lock().unwrap();
        request
            .sections
            .iter()
            .filter_map(|held| {
                let doc = published.get(&held.section_name.to_lowercase())?;
                Some(RemoteSectionParam {
                    section_name: held.section_name.clone(),
                    major_version: doc.version.major,
                    minor_version: doc.version.minor,
                    download_url: Some(format!("{}/sections/{}", state.base_url, held.section_name)),
                })
            })
            .collect()
    };

    Json(RemoteSectionCollection::new(request.machine_name, request.application_name).with_sections(sections))
}

async fn download(
    State(state): State<Arc<MockState>>,
    UrlPath(name): UrlPath<String>,
) -> Result<String, StatusCode> {
    state.downloads.fetch_add(1, Ordering::SeqCst);
    let latency = *state.download_latency.lock().unwrap();
    tokio::time::sleep(latency).await;

    let published = state.sections.lock().unwrap();
    published
        .get(&name.to_lowercase())
        .map(|doc| doc.body.clone())
        .ok_or(StatusCode::NOT_FOUND)
}

/// A section document at `version` with `extra` appended.
pub fn document(version: DocumentVersion, extra: &str) -> String {
    format!(
        "majorVersion = {}\nminorVersion = {}\n{extra}\n",
        version.major, version.minor
    )
}

/// Settings pointing at `poll_url` with a section folder of `<root>/sections`.
pub fn settings(poll_url: &str) -> RemoteSettings {
    RemoteSettings {
        application_name: "integration".into(),
        timeout_ms: 500,
        read_write_timeout_ms: 3_000,
        timer_interval_ms: 60_000,
        remote_configuration_url: poll_url.to_string(),
        local_configuration_folder: Some("sections".into()),
        ..RemoteSettings::default()
    }
}

pub fn watcher() -> Arc<FileWatcher> {
    Arc::new(FileWatcher::with_delay(DEBOUNCE).unwrap())
}

pub fn write_section(root: &Path, section: &str, text: &str) {
    let folder = root.join("sections");
    std::fs::create_dir_all(&folder).unwrap();
    std::fs::write(folder.join(format!("{section}.config")), text).unwrap();
}

pub fn section_path(root: &Path, section: &str) -> std::path::PathBuf {
    root.join("sections").join(format!("{section}.config"))
}

/// Wait until the authority has served `count` downloads in total.
pub async fn wait_for_downloads(authority: &MockAuthority, count: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while authority.downloads() < count {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("downloads not served within 5s")
}

/// A local address nothing is listening on.
pub async fn unused_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// Wait for a change notification for `section`.
pub async fn wait_for_change(
    changes: &mut broadcast::Receiver<SectionChanged>,
    section: &str,
) -> SectionChanged {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let event = changes.recv().await.unwrap();
            if event.section.eq_ignore_ascii_case(section) {
                return event;
            }
        }
    })
    .await
    .expect("no change notification within 5s")
}
