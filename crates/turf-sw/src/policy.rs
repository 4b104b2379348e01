//! Fetch interception policy.
//!
//! Documents are served network-first with the cache as backup. Everything
//! else is served cache-first and cached on the first successful same-origin
//! fetch. Cache writes never delay or fail the response.

use std::sync::Arc;

use http::StatusCode;
use tracing::{debug, info, warn};
use turf_common::ErrorCategory;
use turf_net::{CacheMode, Fetcher, Request, Response, Url};

use crate::cache::{CacheBackend, CacheError};
use crate::classify::{classify, RequestClass};
use crate::config::WorkerConfig;
use crate::tasks::{BackgroundTasks, TaskLabel};
use crate::ServiceWorkerError;

/// The fetch policy engine.
#[derive(Clone)]
pub struct CachePolicy {
    config: Arc<WorkerConfig>,
    fallback: Url,
    caches: Arc<dyn CacheBackend>,
    network: Arc<dyn Fetcher>,
}

impl CachePolicy {
    /// Create a policy engine. Fails if the fallback document doesn't resolve.
    pub fn new(
        config: Arc<WorkerConfig>,
        caches: Arc<dyn CacheBackend>,
        network: Arc<dyn Fetcher>,
    ) -> Result<Self, ServiceWorkerError> {
        let fallback = config.resolve(&config.fallback_path)?;
        Ok(Self {
            config,
            fallback,
            caches,
            network,
        })
    }

    /// URL of the fallback document.
    pub fn fallback_url(&self) -> &Url {
        &self.fallback
    }

    /// Produce a response for an intercepted request.
    ///
    /// Cache writes are spawned onto `tasks` and not awaited.
    pub async fn respond(
        &self,
        request: Request,
        tasks: &BackgroundTasks,
    ) -> Result<Response, ServiceWorkerError> {
        let class = classify(&request, &self.config.document_suffixes);
        debug!(url = %request.url, strategy = class.strategy(), "Handling fetch");

        match class {
            RequestClass::Document => self.network_first(request, tasks).await,
            RequestClass::Asset => self.cache_first(request, tasks).await,
        }
    }

    async fn network_first(
        &self,
        request: Request,
        tasks: &BackgroundTasks,
    ) -> Result<Response, ServiceWorkerError> {
        let network_request = request.clone().cache_mode(CacheMode::NoStore);

        match self.network.fetch(network_request).await {
            Ok(response) => {
                if response.status == StatusCode::OK {
                    self.schedule_put(tasks, &request, response.clone());
                }
                Ok(response)
            }
            Err(err) => {
                info!(
                    url = %request.url,
                    category = err.category(),
                    error = %err,
                    "Network failed, using cache"
                );

                if let Some(cached) = self.lookup(&request).await? {
                    return Ok(cached);
                }

                let fallback = Request::get(self.fallback.clone());
                if let Some(cached) = self.lookup(&fallback).await? {
                    debug!(
                        url = %request.url,
                        fallback = %self.fallback,
                        "Serving fallback document"
                    );
                    return Ok(cached);
                }

                Err(ServiceWorkerError::Offline {
                    url: request.url.to_string(),
                    source: err,
                })
            }
        }
    }

    async fn cache_first(
        &self,
        request: Request,
        tasks: &BackgroundTasks,
    ) -> Result<Response, ServiceWorkerError> {
        if let Some(cached) = self.lookup(&request).await? {
            debug!(url = %request.url, "Cache hit");
            return Ok(cached);
        }

        let fetch_request = request.clone();
        match self.network.fetch(fetch_request).await {
            Ok(response) => {
                if response.status != StatusCode::OK || !response.is_basic() {
                    debug!(
                        url = %request.url,
                        status = response.status.as_u16(),
                        response_type = response.response_type.as_str(),
                        "Not caching response"
                    );
                    return Ok(response);
                }

                self.schedule_put(tasks, &request, response.clone());
                Ok(response)
            }
            Err(err) => {
                info!(
                    url = %request.url,
                    category = err.category(),
                    error = %err,
                    "Network failed, retrying cache"
                );

                match self.lookup(&request).await? {
                    Some(cached) => Ok(cached),
                    None => Err(ServiceWorkerError::Offline {
                        url: request.url.to_string(),
                        source: err,
                    }),
                }
            }
        }
    }

    /// Cache lookup. An unreadable entry counts as a miss.
    async fn lookup(&self, request: &Request) -> Result<Option<Response>, ServiceWorkerError> {
        match self
            .caches
            .match_request(&self.config.cache_name, request)
            .await
        {
            Ok(found) => Ok(found),
            Err(e @ CacheError::Corrupt(_)) => {
                warn!(
                    url = %request.url,
                    category = e.category(),
                    error = %e,
                    "Unreadable cache entry, treating as miss"
                );
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn schedule_put(&self, tasks: &BackgroundTasks, request: &Request, response: Response) {
        let caches = Arc::clone(&self.caches);
        let cache_name = self.config.cache_name.clone();
        let request = request.clone();
        let label = TaskLabel::CachePut {
            cache: cache_name.clone(),
            url: request.url.to_string(),
        };

        tasks.spawn(label, async move {
            match caches.put(&cache_name, &request, response).await {
                Ok(()) => {
                    debug!(cache = %cache_name, url = %request.url, "Cached response");
                    Ok(())
                }
                Err(e) => {
                    warn!(
                        cache = %cache_name,
                        url = %request.url,
                        category = e.category(),
                        error = %e,
                        "Cache write failed"
                    );
                    Err(e.to_string())
                }
            }
        });
    }
}
