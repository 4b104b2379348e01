//! Shared fixtures for worker integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use http::StatusCode;
use turf_common::{try_init_logging, LogConfig};
use turf_net::{Fetcher, NetError, Request, RequestDestination, Response, ResponseType};
use turf_sw::{CacheBackend, ServiceWorker, WorkerConfig};

pub const SCOPE: &str = "https://turf.example/";

#[derive(Clone)]
struct Route {
    status: StatusCode,
    response_type: ResponseType,
    body: String,
}

/// A network with canned per-URL responses. Unknown URLs get a 404.
#[derive(Default)]
pub struct ScriptedNetwork {
    routes: Mutex<HashMap<String, Route>>,
    offline: AtomicBool,
    calls: AtomicUsize,
}

impl ScriptedNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Serve `body` with status 200 for the URL `path` resolves to.
    pub fn serve(&self, path: &str, body: &str) {
        self.route(path, StatusCode::OK, ResponseType::Basic, body);
    }

    pub fn route(&self, path: &str, status: StatusCode, response_type: ResponseType, body: &str) {
        self.lock().insert(
            url(path),
            Route {
                status,
                response_type,
                body: body.to_string(),
            },
        );
    }

    /// Serve every default pre-warm URL, using the path as the body.
    pub fn serve_precache(&self) {
        for path in WorkerConfig::default().precache_urls {
            self.serve(&path, &path);
        }
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of fetches attempted so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Route>> {
        self.routes.lock().unwrap()
    }
}

#[async_trait]
impl Fetcher for ScriptedNetwork {
    async fn fetch(&self, request: Request) -> Result<Response, NetError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) {
            return Err(NetError::Unreachable(format!("{} (offline)", request.url)));
        }

        let route = self.lock().get(request.url.as_str()).cloned();
        Ok(match route {
            Some(route) => Response::new(request.url, route.status, route.body)
                .with_type(route.response_type),
            None => Response::new(request.url, StatusCode::NOT_FOUND, "not found"),
        })
    }
}

/// Resolve a path (or absolute URL) against the test scope.
pub fn url(path: &str) -> String {
    turf_net::Url::parse(SCOPE)
        .unwrap()
        .join(path)
        .unwrap()
        .to_string()
}

pub fn page(path: &str) -> Request {
    Request::parse(&url(path))
        .unwrap()
        .destination(RequestDestination::Document)
}

pub fn asset(path: &str) -> Request {
    Request::parse(&url(path)).unwrap()
}

pub fn config() -> WorkerConfig {
    WorkerConfig::default().with_scope(SCOPE)
}

pub fn init_logging() {
    let _ = try_init_logging(LogConfig::test());
}

/// A started worker over `caches`, with every pre-warm URL served.
pub async fn started_worker(
    network: &Arc<ScriptedNetwork>,
    caches: Arc<dyn CacheBackend>,
) -> ServiceWorker {
    init_logging();
    network.serve_precache();
    let worker = ServiceWorker::new(config(), caches, network.clone()).unwrap();
    worker.start().await.unwrap();
    worker
}

pub fn body(response: Response) -> String {
    response.text().unwrap()
}
