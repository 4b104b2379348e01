//! Named cache stores (`caches` global).
//!
//! ```text
//! CacheBackend (caches)
//!     └── "turf-admin-v1.0.0"
//!             └── GET url → CachedResponse
//! ```
//!
//! Only GET requests are matched or stored. Keys ignore the URL fragment.

use std::fmt;
use std::path::Path;

use async_trait::async_trait;
use hashbrown::{HashMap, HashSet};
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, trace};
use turf_common::{now_millis, ErrorCategory};
use turf_net::{Request, Response, ResponseType, Url};

/// Errors from the cache store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("Only GET requests can be cached, got {0}")]
    UnsupportedMethod(String),

    #[error("Quota exceeded for cache {cache}: limit is {limit} entries")]
    QuotaExceeded { cache: String, limit: usize },

    #[error("Cache storage unavailable: {0}")]
    Unavailable(String),

    #[error("Corrupt cache entry for {0}")]
    Corrupt(String),

    #[error("Snapshot error: {0}")]
    Snapshot(String),
}

impl ErrorCategory for CacheError {
    fn category(&self) -> &'static str {
        match self {
            CacheError::UnsupportedMethod(_) => "unsupported_method",
            CacheError::QuotaExceeded { .. } => "quota",
            CacheError::Unavailable(_) => "unavailable",
            CacheError::Corrupt(_) => "corrupt",
            CacheError::Snapshot(_) => "snapshot",
        }
    }
}

/// Identity of a cached request: method plus normalized URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub method: String,
    pub url: String,
}

impl CacheKey {
    /// Build the key for a request.
    pub fn for_request(request: &Request) -> Self {
        Self::new(&request.method, &request.url)
    }

    pub fn new(method: &Method, url: &Url) -> Self {
        let mut url = url.clone();
        url.set_fragment(None);
        Self {
            method: method.as_str().to_string(),
            url: url.into(),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}

/// A stored response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedResponse {
    /// Response URL.
    pub url: String,

    /// Response status.
    pub status: u16,

    /// Response type (`basic`, `cors`, ...).
    pub response_type: String,

    /// Response headers. Values that are not valid UTF-8 are dropped.
    pub headers: Vec<(String, String)>,

    /// Response body.
    pub body: Vec<u8>,

    /// Cached at timestamp (ms since epoch).
    pub cached_at: u64,
}

impl CachedResponse {
    /// Capture a response for storage.
    pub fn from_response(response: &Response) -> Self {
        let headers = response
            .headers
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        Self {
            url: response.url.to_string(),
            status: response.status.as_u16(),
            response_type: response.response_type.as_str().to_string(),
            headers,
            body: response.body().to_vec(),
            cached_at: now_millis(),
        }
    }

    /// Rebuild a live response.
    pub fn to_response(&self) -> Result<Response, CacheError> {
        let url = Url::parse(&self.url).map_err(|_| CacheError::Corrupt(self.url.clone()))?;
        let status =
            StatusCode::from_u16(self.status).map_err(|_| CacheError::Corrupt(self.url.clone()))?;

        let mut headers = HeaderMap::new();
        for (name, value) in &self.headers {
            if let (Ok(n), Ok(v)) = (
                HeaderName::try_from(name.as_str()),
                HeaderValue::try_from(value.as_str()),
            ) {
                headers.append(n, v);
            }
        }

        let mut response = Response::new(url, status, self.body.clone())
            .with_type(ResponseType::parse(&self.response_type));
        response.headers = headers;
        Ok(response)
    }
}

/// Storage of named caches.
///
/// Implementations serialize their own writes; callers never lock.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Open a cache, creating it if it doesn't exist.
    async fn open(&self, name: &str) -> Result<(), CacheError>;

    /// Check if a cache exists.
    async fn has(&self, name: &str) -> Result<bool, CacheError>;

    /// All cache names.
    async fn keys(&self) -> Result<Vec<String>, CacheError>;

    /// Delete a cache and every entry in it.
    async fn delete(&self, name: &str) -> Result<bool, CacheError>;

    /// Find the response stored for `request` in cache `name`.
    async fn match_request(
        &self,
        name: &str,
        request: &Request,
    ) -> Result<Option<Response>, CacheError>;

    /// Store `response` under `request` in cache `name`, replacing any
    /// previous entry.
    async fn put(&self, name: &str, request: &Request, response: Response)
        -> Result<(), CacheError>;

    /// Store every pair in cache `name`, or none of them.
    async fn put_all(
        &self,
        name: &str,
        entries: Vec<(Request, Response)>,
    ) -> Result<(), CacheError>;
}

// ==================== Cache ====================

/// A single named cache.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Cache {
    /// Cache name.
    pub name: String,

    /// Cached entries.
    entries: Vec<(CacheKey, CachedResponse)>,

    #[serde(skip)]
    index: HashMap<CacheKey, usize>,
}

impl Cache {
    /// Create a new cache.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    /// Match a key.
    pub fn match_key(&self, key: &CacheKey) -> Option<&CachedResponse> {
        self.index.get(key).map(|&i| &self.entries[i].1)
    }

    /// Insert or replace an entry. Returns true if the key was new.
    pub fn put(&mut self, key: CacheKey, entry: CachedResponse) -> bool {
        match self.index.get(&key) {
            Some(&i) => {
                self.entries[i].1 = entry;
                false
            }
            None => {
                self.index.insert(key.clone(), self.entries.len());
                self.entries.push((key, entry));
                true
            }
        }
    }

    /// Check whether a key is present.
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.index.contains_key(key)
    }

    /// Delete entry.
    pub fn delete(&mut self, key: &CacheKey) -> bool {
        if self.index.remove(key).is_none() {
            return false;
        }
        self.entries.retain(|(k, _)| k != key);
        self.reindex();
        true
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &CacheKey> {
        self.entries.iter().map(|(k, _)| k)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn reindex(&mut self) {
        self.index = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, (k, _))| (k.clone(), i))
            .collect();
    }
}

// ==================== Memory storage ====================

/// On-disk form of [`MemoryCacheStorage`].
#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    caches: Vec<Cache>,
}

/// In-process cache storage with optional JSON snapshots.
#[derive(Debug, Default)]
pub struct MemoryCacheStorage {
    caches: RwLock<HashMap<String, Cache>>,
    /// Maximum entries per cache.
    max_entries: Option<usize>,
}

impl MemoryCacheStorage {
    /// Create new cache storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create storage that rejects new keys once a cache holds `max_entries`.
    pub fn with_quota(max_entries: usize) -> Self {
        Self {
            max_entries: Some(max_entries),
            ..Default::default()
        }
    }

    /// Number of entries in cache `name`.
    pub async fn entry_count(&self, name: &str) -> usize {
        self.caches.read().await.get(name).map_or(0, Cache::len)
    }

    /// Write every cache to `path` as JSON.
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<(), CacheError> {
        let snapshot = {
            let caches = self.caches.read().await;
            let mut caches: Vec<Cache> = caches.values().cloned().collect();
            caches.sort_by(|a, b| a.name.cmp(&b.name));
            Snapshot { caches }
        };

        let json = serde_json::to_vec_pretty(&snapshot)
            .map_err(|e| CacheError::Snapshot(e.to_string()))?;
        tokio::fs::write(path.as_ref(), json)
            .await
            .map_err(|e| CacheError::Snapshot(e.to_string()))?;

        debug!(
            path = %path.as_ref().display(),
            caches = snapshot.caches.len(),
            "Saved cache snapshot"
        );
        Ok(())
    }

    /// Restore storage from a snapshot written by [`save`](Self::save).
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, CacheError> {
        let json = tokio::fs::read(path.as_ref())
            .await
            .map_err(|e| CacheError::Snapshot(e.to_string()))?;
        let snapshot: Snapshot =
            serde_json::from_slice(&json).map_err(|e| CacheError::Snapshot(e.to_string()))?;

        let caches = snapshot
            .caches
            .into_iter()
            .map(|mut cache| {
                cache.reindex();
                (cache.name.clone(), cache)
            })
            .collect::<HashMap<_, _>>();

        debug!(path = %path.as_ref().display(), caches = caches.len(), "Loaded cache snapshot");
        Ok(Self {
            caches: RwLock::new(caches),
            max_entries: None,
        })
    }
}

#[async_trait]
impl CacheBackend for MemoryCacheStorage {
    async fn open(&self, name: &str) -> Result<(), CacheError> {
        self.caches
            .write()
            .await
            .entry(name.to_string())
            .or_insert_with(|| Cache::new(name));
        Ok(())
    }

    async fn has(&self, name: &str) -> Result<bool, CacheError> {
        Ok(self.caches.read().await.contains_key(name))
    }

    async fn keys(&self) -> Result<Vec<String>, CacheError> {
        let mut names: Vec<String> = self.caches.read().await.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn delete(&self, name: &str) -> Result<bool, CacheError> {
        Ok(self.caches.write().await.remove(name).is_some())
    }

    async fn match_request(
        &self,
        name: &str,
        request: &Request,
    ) -> Result<Option<Response>, CacheError> {
        if request.method != Method::GET {
            return Ok(None);
        }

        let key = CacheKey::for_request(request);
        let caches = self.caches.read().await;
        let hit = caches.get(name).and_then(|cache| cache.match_key(&key));
        trace!(cache = name, key = %key, hit = hit.is_some(), "Cache lookup");

        hit.map(CachedResponse::to_response).transpose()
    }

    async fn put(
        &self,
        name: &str,
        request: &Request,
        response: Response,
    ) -> Result<(), CacheError> {
        if request.method != Method::GET {
            return Err(CacheError::UnsupportedMethod(request.method.to_string()));
        }

        let key = CacheKey::for_request(request);
        let mut caches = self.caches.write().await;
        let cache = caches
            .entry(name.to_string())
            .or_insert_with(|| Cache::new(name));

        if let Some(limit) = self.max_entries {
            if !cache.contains(&key) && cache.len() >= limit {
                return Err(CacheError::QuotaExceeded {
                    cache: name.to_string(),
                    limit,
                });
            }
        }

        trace!(cache = name, key = %key, status = response.status.as_u16(), "Cache put");
        cache.put(key, CachedResponse::from_response(&response));
        Ok(())
    }

    async fn put_all(
        &self,
        name: &str,
        entries: Vec<(Request, Response)>,
    ) -> Result<(), CacheError> {
        if let Some((request, _)) = entries.iter().find(|(r, _)| r.method != Method::GET) {
            return Err(CacheError::UnsupportedMethod(request.method.to_string()));
        }

        let mut caches = self.caches.write().await;
        let cache = caches
            .entry(name.to_string())
            .or_insert_with(|| Cache::new(name));

        if let Some(limit) = self.max_entries {
            let new_keys: HashSet<CacheKey> = entries
                .iter()
                .map(|(request, _)| CacheKey::for_request(request))
                .filter(|key| !cache.contains(key))
                .collect();
            if cache.len() + new_keys.len() > limit {
                return Err(CacheError::QuotaExceeded {
                    cache: name.to_string(),
                    limit,
                });
            }
        }

        trace!(cache = name, count = entries.len(), "Cache put_all");
        for (request, response) in &entries {
            cache.put(
                CacheKey::for_request(request),
                CachedResponse::from_response(response),
            );
        }
        Ok(())
    }
}
