//! reqwest-backed [`Fetcher`].

use std::time::Duration;

use async_trait::async_trait;
use http::{header, HeaderMap, HeaderValue};
use reqwest::Client;
use tracing::{debug, info, trace, warn};

use crate::{Fetcher, NetError, Request, Response, ResponseType, Url};

/// Resource loader configuration.
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// User agent string.
    pub user_agent: String,
    /// Default timeout.
    pub default_timeout: Duration,
    /// Maximum redirects.
    pub max_redirects: usize,
    /// Origin of the controlled page. Responses from this origin are `basic`.
    pub origin: Option<Url>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            user_agent: format!("TurfAdminSW/{}", env!("CARGO_PKG_VERSION")),
            default_timeout: Duration::from_secs(30),
            max_redirects: 10,
            origin: None,
        }
    }
}

impl LoaderConfig {
    /// Set the page origin.
    pub fn with_origin(mut self, origin: Url) -> Self {
        self.origin = Some(origin);
        self
    }
}

/// Fetches requests over HTTP.
pub struct HttpFetcher {
    client: Client,
    config: LoaderConfig,
}

impl HttpFetcher {
    /// Create a new fetcher.
    ///
    /// Only responses from `config.origin` are typed `basic`. Without an
    /// origin every response is `cors` or `opaque` and the worker caches no
    /// assets; build the config with `WorkerConfig::loader_config`.
    pub fn new(config: LoaderConfig) -> Result<Self, NetError> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.default_timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()
            .map_err(|e| NetError::RequestFailed(e.to_string()))?;

        match config.origin {
            Some(ref origin) => info!(origin = %origin, "HttpFetcher initialized"),
            None => warn!("HttpFetcher initialized without an origin; no response will be basic"),
        }

        Ok(Self { client, config })
    }

    /// Derive the response type from the final URL and headers.
    pub fn response_type(&self, response_url: &Url, headers: &HeaderMap) -> ResponseType {
        let same_origin = self
            .config
            .origin
            .as_ref()
            .map(|origin| origin.origin() == response_url.origin())
            .unwrap_or(false);

        if same_origin {
            ResponseType::Basic
        } else if headers.contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN) {
            ResponseType::Cors
        } else {
            ResponseType::Opaque
        }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: Request) -> Result<Response, NetError> {
        debug!(
            url = %request.url,
            method = %request.method,
            cache = ?request.cache,
            "Fetching resource"
        );

        let mut req_builder = self
            .client
            .request(request.method.clone(), request.url.clone());

        for (name, value) in request.headers.iter() {
            req_builder = req_builder.header(name, value);
        }

        // No transport cache lives in-process; tell intermediaries to revalidate.
        if request.cache.bypasses_transport_cache() {
            req_builder = req_builder
                .header(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"))
                .header(header::PRAGMA, HeaderValue::from_static("no-cache"));
        }

        if let Some(body) = request.body {
            req_builder = req_builder.body(body);
        }

        if let Some(timeout) = request.timeout {
            req_builder = req_builder.timeout(timeout);
        }

        let response = req_builder.send().await.map_err(|e| {
            if e.is_timeout() {
                NetError::Timeout(request.timeout.unwrap_or(self.config.default_timeout))
            } else if e.is_connect() {
                NetError::Unreachable(e.to_string())
            } else {
                NetError::HttpError(e)
            }
        })?;

        let status = response.status();
        let headers = response.headers().clone();
        let url = response.url().clone();
        let response_type = self.response_type(&url, &headers);

        let body = response.bytes().await?;

        trace!(
            url = %url,
            status = %status,
            response_type = response_type.as_str(),
            body_len = body.len(),
            "Response received"
        );

        Ok(Response {
            url,
            status,
            headers,
            response_type,
            body,
        })
    }
}
