//! Worker wired to the reqwest fetcher against a local server.

mod common;

use std::sync::Arc;

use common::init_logging;
use turf_net::{HttpFetcher, LoaderConfig, Request, ResponseType};
use turf_sw::{MemoryCacheStorage, ServiceWorker, WorkerConfig};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CACHE: &str = "turf-admin-v1.0.0";

async fn server() -> MockServer {
    let server = MockServer::start().await;
    for (route, body) in [("/admin.html", "<h1>admin</h1>"), ("/app.js", "console.log('turf')")] {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;
    }
    server
}

fn config(server: &MockServer) -> WorkerConfig {
    WorkerConfig::default()
        .with_scope(format!("{}/", server.uri()))
        .with_precache_urls(["/admin.html"])
}

#[tokio::test]
async fn scope_origin_makes_assets_cacheable() {
    init_logging();
    let server = server().await;
    let config = config(&server);
    let network = HttpFetcher::new(config.loader_config().unwrap()).unwrap();
    let caches = Arc::new(MemoryCacheStorage::new());
    let worker = ServiceWorker::new(config, caches.clone(), Arc::new(network)).unwrap();
    worker.start().await.unwrap();
    assert_eq!(caches.entry_count(CACHE).await, 1);

    let request = Request::parse(&format!("{}/app.js", server.uri())).unwrap();
    let handled = worker.handle_fetch(request).await.unwrap();
    assert_eq!(handled.response.response_type, ResponseType::Basic);
    assert_eq!(handled.tasks.len(), 1);

    handled.tasks.settle().await;
    assert_eq!(caches.entry_count(CACHE).await, 2);
}

#[tokio::test]
async fn fetcher_without_origin_caches_no_assets() {
    init_logging();
    let server = server().await;
    let config = config(&server);
    let network = HttpFetcher::new(LoaderConfig::default()).unwrap();
    let caches = Arc::new(MemoryCacheStorage::new());
    let worker = ServiceWorker::new(config, caches.clone(), Arc::new(network)).unwrap();
    worker.start().await.unwrap();

    let request = Request::parse(&format!("{}/app.js", server.uri())).unwrap();
    let handled = worker.handle_fetch(request).await.unwrap();
    assert_eq!(handled.response.response_type, ResponseType::Opaque);
    assert!(handled.tasks.is_empty());
}
