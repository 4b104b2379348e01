//! # Turf Admin Service Worker
//!
//! Offline support and push notifications for the Turf Admin page.
//!
//! ## Features
//!
//! - **Fetch Interception**: network-first documents, cache-first assets
//! - **Lifecycle**: install with pre-warmed cache, activate with stale cache cleanup
//! - **Cache Storage**: named caches with optional quota and JSON snapshots
//! - **Push**: notifications with view/dismiss actions
//!
//! ## Architecture
//!
//! ```text
//! ServiceWorker
//!     │
//!     ├── Lifecycle (Parsed → Installing → Installed → Activating → Activated)
//!     └── DispatchTable
//!             ├── install   → precache
//!             ├── activate  → prune caches, claim clients
//!             ├── message   → skipWaiting
//!             ├── fetch     → CachePolicy
//!             │                 ├── Fetcher (network)
//!             │                 └── CacheBackend
//!             │                         └── Cache
//!             │                                 └── CacheKey → CachedResponse
//!             ├── push      → Notifications
//!             └── notificationclick → Clients
//! ```

use thiserror::Error;
use turf_common::ErrorCategory;
use turf_net::NetError;

pub mod cache;
pub mod classify;
pub mod clients;
pub mod config;
pub mod dispatch;
pub mod lifecycle;
pub mod notification;
pub mod policy;
pub mod tasks;
pub mod worker;

pub use cache::{CacheBackend, CacheError, CacheKey, CachedResponse, MemoryCacheStorage};
pub use classify::{classify, RequestClass};
pub use clients::{Client, ClientMatchOptions, ClientType, Clients};
pub use config::{NotificationConfig, WorkerConfig};
pub use dispatch::{
    Dispatch, DispatchTable, EventKind, EventOutcome, FetchEvent, Handler, MessageEvent,
    NotificationClickEvent, PushEvent, WorkerContext, WorkerEvent,
};
pub use lifecycle::{Lifecycle, ServiceWorkerState};
pub use notification::{
    Notification, NotificationAction, Notifications, ACTION_DISMISS, ACTION_VIEW,
};
pub use policy::CachePolicy;
pub use tasks::{BackgroundTasks, TaskLabel, TaskReport};
pub use worker::{FetchHandled, ServiceWorker, ServiceWorkerId};

// ==================== Errors ====================

/// Errors that can occur in service worker operations.
#[derive(Error, Debug)]
pub enum ServiceWorkerError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("State error: {0}")]
    State(String),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Network error: {0}")]
    Network(#[from] NetError),

    /// The network failed and nothing usable was cached.
    #[error("Offline and no cached copy of {url}")]
    Offline {
        url: String,
        #[source]
        source: NetError,
    },

    #[error("No handler registered for {0} events")]
    NoHandler(dispatch::EventKind),

    #[error("Bad status {status} for {url}")]
    BadStatus { url: String, status: u16 },
}

impl ErrorCategory for ServiceWorkerError {
    fn category(&self) -> &'static str {
        match self {
            ServiceWorkerError::Config(_) => "config",
            ServiceWorkerError::State(_) => "state",
            ServiceWorkerError::Cache(e) => e.category(),
            ServiceWorkerError::Network(e) => e.category(),
            ServiceWorkerError::Offline { .. } => "offline",
            ServiceWorkerError::NoHandler(_) => "dispatch",
            ServiceWorkerError::BadStatus { .. } => "http",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_offline_keeps_network_cause() {
        let err = ServiceWorkerError::Offline {
            url: "https://turf.example/admin".to_string(),
            source: NetError::Unreachable("connection refused".to_string()),
        };
        assert_eq!(err.category(), "offline");
        assert!(err.to_string().contains("https://turf.example/admin"));
        assert!(err.source().is_some());
    }

    #[test]
    fn test_cache_errors_convert() {
        let err: ServiceWorkerError = CacheError::Unavailable("disk full".to_string()).into();
        assert!(matches!(err, ServiceWorkerError::Cache(_)));
        assert_eq!(err.category(), "unavailable");
    }

    #[test]
    fn test_no_handler_message() {
        let err = ServiceWorkerError::NoHandler(EventKind::Push);
        assert_eq!(err.to_string(), "No handler registered for push events");
    }
}
