//! The service worker instance.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, info};
use turf_net::{Fetcher, Request, Response};

use crate::cache::CacheBackend;
use crate::clients::Client;
use crate::config::WorkerConfig;
use crate::dispatch::{
    Dispatch, DispatchTable, EventOutcome, FetchEvent, MessageEvent, NotificationClickEvent,
    PushEvent, WorkerContext, WorkerEvent,
};
use crate::lifecycle::ServiceWorkerState;
use crate::notification::Notification;
use crate::tasks::BackgroundTasks;
use crate::ServiceWorkerError;

/// Unique identifier for a service worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServiceWorkerId(u64);

impl ServiceWorkerId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// A handled fetch: the response and the cache writes it scheduled.
#[derive(Debug)]
pub struct FetchHandled {
    pub response: Response,
    pub tasks: BackgroundTasks,
}

/// A service worker instance.
pub struct ServiceWorker {
    id: ServiceWorkerId,
    context: WorkerContext,
    table: DispatchTable,
}

impl ServiceWorker {
    /// Create a worker with the standard handlers.
    pub fn new(
        config: WorkerConfig,
        caches: Arc<dyn CacheBackend>,
        network: Arc<dyn Fetcher>,
    ) -> Result<Self, ServiceWorkerError> {
        let context = WorkerContext::new(config, caches, network)?;
        let id = ServiceWorkerId::new();
        debug!(worker = id.raw(), cache = %context.config.cache_name, "Service worker created");

        Ok(Self {
            id,
            context,
            table: DispatchTable::standard(),
        })
    }

    /// Replace the dispatch table.
    pub fn with_dispatch_table(mut self, table: DispatchTable) -> Self {
        self.table = table;
        self
    }

    pub fn id(&self) -> ServiceWorkerId {
        self.id
    }

    pub fn context(&self) -> &WorkerContext {
        &self.context
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> ServiceWorkerState {
        self.context.lifecycle.read().await.state()
    }

    /// Route an event without any lifecycle checks.
    pub fn dispatch(&self, event: WorkerEvent) -> Result<Dispatch, ServiceWorkerError> {
        self.table.dispatch(&self.context, event)
    }

    /// Run the install event.
    pub async fn install(&self) -> Result<EventOutcome, ServiceWorkerError> {
        self.context.lifecycle.write().await.begin_install()?;
        let result = self.run(WorkerEvent::Install).await.map(|(outcome, _)| outcome);
        self.context
            .lifecycle
            .write()
            .await
            .install_complete(result.is_ok());
        result
    }

    /// Run the activate event.
    pub async fn activate(&self) -> Result<EventOutcome, ServiceWorkerError> {
        self.context.lifecycle.write().await.begin_activate()?;
        let result = self.run(WorkerEvent::Activate).await.map(|(outcome, _)| outcome);
        // Activation completes even if the handler failed.
        self.context.lifecycle.write().await.activate_complete();
        info!(worker = self.id.raw(), "Service worker activated");
        result
    }

    /// Install, then activate right away if skip-waiting was requested.
    pub async fn start(&self) -> Result<ServiceWorkerState, ServiceWorkerError> {
        self.install().await?;
        if self.context.lifecycle.read().await.should_activate() {
            self.activate().await?;
        }
        Ok(self.state().await)
    }

    /// Post a message to the worker.
    ///
    /// `{"action": "skipWaiting"}` activates an installed, waiting worker.
    pub async fn post_message(
        &self,
        data: serde_json::Value,
    ) -> Result<EventOutcome, ServiceWorkerError> {
        if self.state().await == ServiceWorkerState::Redundant {
            return Err(ServiceWorkerError::State(
                "Cannot post message to redundant worker".to_string(),
            ));
        }

        let (outcome, _) = self.run(WorkerEvent::Message(MessageEvent { data })).await?;
        if matches!(outcome, EventOutcome::SkipWaiting)
            && self.context.lifecycle.read().await.should_activate()
        {
            self.activate().await?;
        }
        Ok(outcome)
    }

    /// Intercept a request from a controlled page.
    pub async fn handle_fetch(&self, request: Request) -> Result<FetchHandled, ServiceWorkerError> {
        self.ensure_functional("fetch").await?;

        let event = WorkerEvent::Fetch(FetchEvent {
            request,
            client_id: None,
        });
        match self.run(event).await? {
            (EventOutcome::Response(response), tasks) => Ok(FetchHandled { response, tasks }),
            (other, _) => Err(ServiceWorkerError::State(format!(
                "fetch handler produced {other:?} instead of a response"
            ))),
        }
    }

    /// Deliver a push message.
    pub async fn push(&self, data: Option<Bytes>) -> Result<Notification, ServiceWorkerError> {
        self.ensure_functional("push").await?;

        match self.run(WorkerEvent::Push(PushEvent { data })).await? {
            (EventOutcome::NotificationShown(notification), _) => Ok(notification),
            (other, _) => Err(ServiceWorkerError::State(format!(
                "push handler produced {other:?} instead of a notification"
            ))),
        }
    }

    /// Deliver a notification click. Returns the window opened, if any.
    pub async fn notification_click(
        &self,
        tag: &str,
        action: Option<&str>,
    ) -> Result<Option<Client>, ServiceWorkerError> {
        self.ensure_functional("notificationclick").await?;

        let event = WorkerEvent::NotificationClick(NotificationClickEvent {
            tag: tag.to_string(),
            action: action.map(str::to_string),
        });
        match self.run(event).await? {
            (EventOutcome::NotificationClicked { opened }, _) => Ok(opened),
            (other, _) => Err(ServiceWorkerError::State(format!(
                "notificationclick handler produced {other:?}"
            ))),
        }
    }

    async fn run(
        &self,
        event: WorkerEvent,
    ) -> Result<(EventOutcome, BackgroundTasks), ServiceWorkerError> {
        let Dispatch { outcome, tasks } = self.dispatch(event)?;
        let outcome = outcome.await?;
        Ok((outcome, tasks))
    }

    async fn ensure_functional(&self, event: &str) -> Result<(), ServiceWorkerError> {
        let state = self.state().await;
        if state.handles_functional_events() {
            Ok(())
        } else {
            Err(ServiceWorkerError::State(format!(
                "cannot handle {event} while {state:?}"
            )))
        }
    }
}

impl std::fmt::Debug for ServiceWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceWorker")
            .field("id", &self.id)
            .field("cache_name", &self.context.config.cache_name)
            .field("table", &self.table)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCacheStorage;
    use async_trait::async_trait;
    use turf_net::NetError;

    struct Offline;

    #[async_trait]
    impl Fetcher for Offline {
        async fn fetch(&self, _request: Request) -> Result<Response, NetError> {
            Err(NetError::Unreachable("offline".to_string()))
        }
    }

    fn worker() -> ServiceWorker {
        ServiceWorker::new(
            WorkerConfig::default().with_scope("https://turf.example/"),
            Arc::new(MemoryCacheStorage::new()),
            Arc::new(Offline),
        )
        .unwrap()
    }

    #[test]
    fn test_worker_ids_unique() {
        assert_ne!(worker().id(), worker().id());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let result = ServiceWorker::new(
            WorkerConfig::default().with_cache_name(""),
            Arc::new(MemoryCacheStorage::new()),
            Arc::new(Offline),
        );
        assert!(matches!(result, Err(ServiceWorkerError::Config(_))));
    }

    #[tokio::test]
    async fn test_start_activates_after_install() {
        let worker = worker();
        assert_eq!(worker.state().await, ServiceWorkerState::Parsed);
        assert_eq!(worker.start().await.unwrap(), ServiceWorkerState::Activated);
    }

    #[tokio::test]
    async fn test_fetch_before_activation_rejected() {
        let worker = worker();
        let request = Request::parse("https://turf.example/app.js").unwrap();
        let err = worker.handle_fetch(request).await.unwrap_err();
        assert!(matches!(err, ServiceWorkerError::State(_)));
    }

    #[tokio::test]
    async fn test_install_twice_rejected() {
        let worker = worker();
        worker.install().await.unwrap();
        assert!(worker.install().await.is_err());
    }

    #[tokio::test]
    async fn test_skip_waiting_message_activates_waiting_worker() {
        let worker = worker();
        worker.install().await.unwrap();
        assert_eq!(worker.state().await, ServiceWorkerState::Installed);

        let outcome = worker
            .post_message(serde_json::json!({ "action": "skipWaiting" }))
            .await
            .unwrap();
        assert!(matches!(outcome, EventOutcome::SkipWaiting));
        assert_eq!(worker.state().await, ServiceWorkerState::Activated);
    }

    #[tokio::test]
    async fn test_other_messages_ignored() {
        let worker = worker();
        let outcome = worker
            .post_message(serde_json::json!({ "action": "reload" }))
            .await
            .unwrap();
        assert!(matches!(outcome, EventOutcome::MessageIgnored));
        assert_eq!(worker.state().await, ServiceWorkerState::Parsed);
    }
}
