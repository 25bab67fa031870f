//! Shared fixtures for integration tests
//!
//! - [`FakeCatalog`]: in-memory [`CatalogSource`] with configurable results and delay
//! - [`StubServer`]: minimal HTTP server on a local port for exercising the real fetcher

#![allow(dead_code)]

use modwatch::models::{ModSummary, VersionRecord};
use modwatch::services::{CatalogError, CatalogSource};
use modwatch::{MemoryStorage, Storage, Tracker, TrackerOptions};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

#[derive(Default)]
struct FakeCatalogInner {
    summaries: Mutex<Vec<ModSummary>>,
    versions: Mutex<HashMap<String, Result<Option<VersionRecord>, CatalogError>>>,
    delay: Mutex<Duration>,
    version_calls: AtomicUsize,
}

/// In-memory catalog. Clones share state, so a test can keep a handle after
/// moving one into a [`Tracker`].
#[derive(Clone, Default)]
pub struct FakeCatalog {
    inner: Arc<FakeCatalogInner>,
}

impl FakeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `id` resolvable by `fetch_summaries`
    pub fn with_mod(self, id: &str, name: &str) -> Self {
        self.inner
            .summaries
            .lock()
            .unwrap()
            .push(ModSummary::new(id, name).with_catalog_url(format!("https://catalog.test/mod/{id}")));
        self
    }

    /// Latest version returned for `id`
    pub fn set_latest(&self, id: &str, version: Option<&str>, compatibility: Option<&str>) {
        let record = VersionRecord {
            id: Some(format!("{id}-v")),
            version: version.map(str::to_string),
            compatibility_constraint: compatibility.map(str::to_string),
        };
        self.inner
            .versions
            .lock()
            .unwrap()
            .insert(id.to_string(), Ok(Some(record)));
    }

    pub fn set_failure(&self, id: &str, error: CatalogError) {
        self.inner
            .versions
            .lock()
            .unwrap()
            .insert(id.to_string(), Err(error));
    }

    /// Delay applied to every `latest_version` call
    pub fn set_delay(&self, delay: Duration) {
        *self.inner.delay.lock().unwrap() = delay;
    }

    pub fn version_calls(&self) -> usize {
        self.inner.version_calls.load(Ordering::SeqCst)
    }
}

impl CatalogSource for FakeCatalog {
    async fn fetch_summaries(&self, ids: &[String]) -> Result<Vec<ModSummary>, CatalogError> {
        let summaries = self.inner.summaries.lock().unwrap().clone();
        Ok(summaries
            .into_iter()
            .filter(|s| ids.contains(&s.id))
            .collect())
    }

    async fn latest_version(&self, id: &str) -> Result<Option<VersionRecord>, CatalogError> {
        self.inner.version_calls.fetch_add(1, Ordering::SeqCst);

        let delay = *self.inner.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let result = self.inner.versions.lock().unwrap().get(id).cloned();
        result.unwrap_or(Ok(None))
    }
}

pub fn server_error(id: &str) -> CatalogError {
    CatalogError::Status {
        status: 500,
        url: format!("http://catalog.test/mod/{id}/versions"),
    }
}

pub fn memory_storage() -> Arc<dyn Storage> {
    Arc::new(MemoryStorage::new())
}

/// Tracker over `catalog` and `storage` with a short tick unit
pub fn tracker_with(
    catalog: FakeCatalog,
    storage: Arc<dyn Storage>,
    tick_unit: Duration,
) -> Arc<Tracker<FakeCatalog>> {
    Arc::new(Tracker::new(
        catalog,
        storage,
        TrackerOptions {
            history_limit: None,
            tick_unit,
        },
        tokio::runtime::Handle::current(),
    ))
}

pub fn ids(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

type Route = dyn Fn(&str) -> (u16, String) + Send + Sync;

/// Minimal HTTP/1.1 server answering each request from a route function.
///
/// The route receives the request target (path and query) and returns the
/// status code and JSON body. Every request head is recorded.
pub struct StubServer {
    pub base_url: String,
    requests: Arc<Mutex<Vec<String>>>,
    _task: JoinHandle<()>,
}

impl StubServer {
    pub async fn start<F>(route: F) -> Self
    where
        F: Fn(&str) -> (u16, String) + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let route: Arc<Route> = Arc::new(route);

        let recorded = Arc::clone(&requests);
        let task = tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };
                let route = Arc::clone(&route);
                let recorded = Arc::clone(&recorded);

                tokio::spawn(async move {
                    let mut head = Vec::new();
                    let mut buf = [0u8; 1024];
                    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                        match socket.read(&mut buf).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => head.extend_from_slice(&buf[..n]),
                        }
                    }

                    let head = String::from_utf8_lossy(&head).to_string();
                    let target = head
                        .lines()
                        .next()
                        .and_then(|line| line.split_whitespace().nth(1))
                        .unwrap_or("/")
                        .to_string();
                    recorded.lock().unwrap().push(head);

                    let (status, body) = route(&target);
                    let response = format!(
                        "HTTP/1.1 {} Stub\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                        status,
                        body.len(),
                        body
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });

        Self {
            base_url: format!("http://{addr}/api"),
            requests,
            _task: task,
        }
    }

    /// Recorded request heads, in arrival order
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    /// Request targets (path and query), in arrival order
    pub fn targets(&self) -> Vec<String> {
        self.requests()
            .iter()
            .filter_map(|head| head.lines().next())
            .filter_map(|line| line.split_whitespace().nth(1))
            .map(str::to_string)
            .collect()
    }
}
