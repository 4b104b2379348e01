//! Event dispatch.
//!
//! Each event kind maps to a plain function from `(context, event)` to a
//! [`Dispatch`]: the future producing the event's outcome plus the
//! [`BackgroundTasks`] it schedules along the way.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use futures::future::{try_join_all, BoxFuture, FutureExt};
use hashbrown::{HashMap, HashSet};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use turf_common::ErrorCategory;
use turf_net::{Fetcher, Request, Response, Url};

use crate::cache::CacheBackend;
use crate::clients::{Client, Clients};
use crate::config::WorkerConfig;
use crate::lifecycle::Lifecycle;
use crate::notification::{Notification, Notifications, ACTION_VIEW};
use crate::policy::CachePolicy;
use crate::tasks::BackgroundTasks;
use crate::ServiceWorkerError;

// ==================== Events ====================

/// Kinds of events a worker handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Install,
    Activate,
    Message,
    Fetch,
    Push,
    NotificationClick,
}

impl EventKind {
    pub const ALL: [EventKind; 6] = [
        EventKind::Install,
        EventKind::Activate,
        EventKind::Message,
        EventKind::Fetch,
        EventKind::Push,
        EventKind::NotificationClick,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Install => "install",
            EventKind::Activate => "activate",
            EventKind::Message => "message",
            EventKind::Fetch => "fetch",
            EventKind::Push => "push",
            EventKind::NotificationClick => "notificationclick",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A message posted to the worker.
#[derive(Debug, Clone)]
pub struct MessageEvent {
    pub data: serde_json::Value,
}

impl MessageEvent {
    /// The `action` field of an object message.
    pub fn action(&self) -> Option<&str> {
        self.data.get("action").and_then(serde_json::Value::as_str)
    }
}

/// A fetch event.
#[derive(Debug, Clone)]
pub struct FetchEvent {
    /// The intercepted request.
    pub request: Request,

    /// Client ID.
    pub client_id: Option<String>,
}

/// A push message.
#[derive(Debug, Clone, Default)]
pub struct PushEvent {
    pub data: Option<Bytes>,
}

impl PushEvent {
    /// The payload as text. Invalid UTF-8 is replaced.
    pub fn text(&self) -> Option<String> {
        self.data
            .as_ref()
            .map(|data| String::from_utf8_lossy(data).into_owned())
    }
}

/// A click on a notification or one of its actions.
#[derive(Debug, Clone)]
pub struct NotificationClickEvent {
    /// Tag of the clicked notification.
    pub tag: String,

    /// Chosen action; `None` for a click on the notification body.
    pub action: Option<String>,
}

/// An event delivered to the worker.
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    Install,
    Activate,
    Message(MessageEvent),
    Fetch(FetchEvent),
    Push(PushEvent),
    NotificationClick(NotificationClickEvent),
}

impl WorkerEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            WorkerEvent::Install => EventKind::Install,
            WorkerEvent::Activate => EventKind::Activate,
            WorkerEvent::Message(_) => EventKind::Message,
            WorkerEvent::Fetch(_) => EventKind::Fetch,
            WorkerEvent::Push(_) => EventKind::Push,
            WorkerEvent::NotificationClick(_) => EventKind::NotificationClick,
        }
    }
}

/// What handling an event produced.
#[derive(Debug)]
pub enum EventOutcome {
    /// Install finished; `precached` resources were stored.
    Installed { precached: usize },
    /// Activation finished; stale caches were deleted.
    Activated { deleted: Vec<String> },
    /// The worker was asked to skip waiting.
    SkipWaiting,
    /// The message was not a recognized command.
    MessageIgnored,
    /// Response for a fetch event.
    Response(Response),
    /// A notification was shown.
    NotificationShown(Notification),
    /// A notification was clicked; `opened` is the window opened, if any.
    NotificationClicked { opened: Option<Client> },
}

// ==================== Context ====================

/// Everything a handler can reach.
#[derive(Clone)]
pub struct WorkerContext {
    pub config: Arc<WorkerConfig>,
    pub caches: Arc<dyn CacheBackend>,
    pub network: Arc<dyn Fetcher>,
    pub lifecycle: Arc<RwLock<Lifecycle>>,
    pub clients: Arc<RwLock<Clients>>,
    pub notifications: Arc<RwLock<Notifications>>,
    policy: CachePolicy,
}

impl WorkerContext {
    /// Create a context. The configuration is validated first.
    pub fn new(
        config: WorkerConfig,
        caches: Arc<dyn CacheBackend>,
        network: Arc<dyn Fetcher>,
    ) -> Result<Self, ServiceWorkerError> {
        config.validate()?;
        let config = Arc::new(config);
        let policy =
            CachePolicy::new(Arc::clone(&config), Arc::clone(&caches), Arc::clone(&network))?;

        Ok(Self {
            config,
            caches,
            network,
            lifecycle: Arc::new(RwLock::new(Lifecycle::new())),
            clients: Arc::new(RwLock::new(Clients::new())),
            notifications: Arc::new(RwLock::new(Notifications::new())),
            policy,
        })
    }

    /// The fetch policy engine.
    pub fn policy(&self) -> &CachePolicy {
        &self.policy
    }

    /// URL of the fallback document.
    pub fn fallback_url(&self) -> &Url {
        self.policy.fallback_url()
    }
}

// ==================== Dispatch ====================

/// Future resolving to an event outcome.
pub type OutcomeFuture = BoxFuture<'static, Result<EventOutcome, ServiceWorkerError>>;

/// A handled event: its outcome and the background work it schedules.
pub struct Dispatch {
    pub outcome: OutcomeFuture,
    pub tasks: BackgroundTasks,
}

impl Dispatch {
    /// Wrap an outcome future that schedules onto `tasks`.
    pub fn new<F>(outcome: F, tasks: BackgroundTasks) -> Self
    where
        F: Future<Output = Result<EventOutcome, ServiceWorkerError>> + Send + 'static,
    {
        Self {
            outcome: outcome.boxed(),
            tasks,
        }
    }

    /// An outcome without background work.
    pub fn ready(result: Result<EventOutcome, ServiceWorkerError>) -> Self {
        Self::new(futures::future::ready(result), BackgroundTasks::new())
    }
}

impl fmt::Debug for Dispatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatch")
            .field("tasks", &self.tasks)
            .finish_non_exhaustive()
    }
}

/// An event handler.
pub type Handler = fn(&WorkerContext, WorkerEvent) -> Dispatch;

/// Event kind to handler table.
#[derive(Clone, Default)]
pub struct DispatchTable {
    handlers: HashMap<EventKind, Handler>,
}

impl fmt::Debug for DispatchTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.handlers.keys()).finish()
    }
}

impl DispatchTable {
    /// An empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// The admin worker's handlers.
    pub fn standard() -> Self {
        let mut table = Self::new();
        table.register(EventKind::Install, on_install);
        table.register(EventKind::Activate, on_activate);
        table.register(EventKind::Message, on_message);
        table.register(EventKind::Fetch, on_fetch);
        table.register(EventKind::Push, on_push);
        table.register(EventKind::NotificationClick, on_notification_click);
        table
    }

    /// Register (or replace) the handler for `kind`.
    pub fn register(&mut self, kind: EventKind, handler: Handler) -> Option<Handler> {
        self.handlers.insert(kind, handler)
    }

    /// Check whether `kind` has a handler.
    pub fn handles(&self, kind: EventKind) -> bool {
        self.handlers.contains_key(&kind)
    }

    /// Route an event to its handler.
    pub fn dispatch(
        &self,
        ctx: &WorkerContext,
        event: WorkerEvent,
    ) -> Result<Dispatch, ServiceWorkerError> {
        let kind = event.kind();
        let handler = self
            .handlers
            .get(&kind)
            .ok_or(ServiceWorkerError::NoHandler(kind))?;
        debug!(event = %kind, "Dispatching event");
        Ok(handler(ctx, event))
    }
}

fn unexpected(expected: EventKind, got: EventKind) -> Dispatch {
    Dispatch::ready(Err(ServiceWorkerError::State(format!(
        "{expected} handler received a {got} event"
    ))))
}

// ==================== Handlers ====================

fn on_install(ctx: &WorkerContext, _event: WorkerEvent) -> Dispatch {
    let ctx = ctx.clone();
    Dispatch::new(
        async move {
            info!(cache = %ctx.config.cache_name, "Service worker installing");
            ctx.lifecycle.write().await.skip_waiting();

            let precached = match precache(&ctx).await {
                Ok(count) => count,
                Err(e) => {
                    warn!(
                        cache = %ctx.config.cache_name,
                        category = e.category(),
                        error = %e,
                        "Precache failed"
                    );
                    0
                }
            };
            Ok(EventOutcome::Installed { precached })
        },
        BackgroundTasks::new(),
    )
}

/// Fetch every distinct pre-warm URL and store them all, or none.
async fn precache(ctx: &WorkerContext) -> Result<usize, ServiceWorkerError> {
    let cache_name = &ctx.config.cache_name;
    ctx.caches.open(cache_name).await?;
    debug!(cache = %cache_name, "Opened cache");

    let mut seen = HashSet::new();
    let mut urls = Vec::new();
    for url in &ctx.config.precache_urls {
        let url = ctx.config.resolve(url)?;
        if seen.insert(url.to_string()) {
            urls.push(url);
        }
    }

    let fetches = urls.into_iter().map(|url| {
        let network = Arc::clone(&ctx.network);
        async move {
            let request = Request::get(url);
            let response = network.fetch(request.clone()).await?;
            if !response.ok() {
                return Err(ServiceWorkerError::BadStatus {
                    url: request.url.to_string(),
                    status: response.status.as_u16(),
                });
            }
            Ok::<_, ServiceWorkerError>((request, response))
        }
    });
    let entries = try_join_all(fetches).await?;

    let count = entries.len();
    ctx.caches.put_all(cache_name, entries).await?;
    info!(cache = %cache_name, count, "Precached resources");
    Ok(count)
}

fn on_activate(ctx: &WorkerContext, _event: WorkerEvent) -> Dispatch {
    let ctx = ctx.clone();
    Dispatch::new(
        async move {
            info!(cache = %ctx.config.cache_name, "Service worker activating");

            let mut deleted = Vec::new();
            for name in ctx.caches.keys().await? {
                if name == ctx.config.cache_name {
                    continue;
                }
                info!(cache = %name, "Deleting stale cache");
                if ctx.caches.delete(&name).await? {
                    deleted.push(name);
                }
            }

            ctx.clients.write().await.claim();
            Ok(EventOutcome::Activated { deleted })
        },
        BackgroundTasks::new(),
    )
}

fn on_message(ctx: &WorkerContext, event: WorkerEvent) -> Dispatch {
    let kind = event.kind();
    let WorkerEvent::Message(message) = event else {
        return unexpected(EventKind::Message, kind);
    };

    let ctx = ctx.clone();
    Dispatch::new(
        async move {
            if message.action() == Some("skipWaiting") {
                info!("Skip waiting requested");
                ctx.lifecycle.write().await.skip_waiting();
                Ok(EventOutcome::SkipWaiting)
            } else {
                debug!(data = %message.data, "Ignoring message");
                Ok(EventOutcome::MessageIgnored)
            }
        },
        BackgroundTasks::new(),
    )
}

fn on_fetch(ctx: &WorkerContext, event: WorkerEvent) -> Dispatch {
    let kind = event.kind();
    let WorkerEvent::Fetch(fetch) = event else {
        return unexpected(EventKind::Fetch, kind);
    };

    let policy = ctx.policy().clone();
    let tasks = BackgroundTasks::new();
    let scheduled = tasks.clone();
    Dispatch::new(
        async move {
            policy
                .respond(fetch.request, &scheduled)
                .await
                .map(EventOutcome::Response)
        },
        tasks,
    )
}

fn on_push(ctx: &WorkerContext, event: WorkerEvent) -> Dispatch {
    let kind = event.kind();
    let WorkerEvent::Push(push) = event else {
        return unexpected(EventKind::Push, kind);
    };

    let ctx = ctx.clone();
    Dispatch::new(
        async move {
            let notification = Notification::from_push(&ctx.config.notification, push.text());
            info!(tag = %notification.tag, "Push received");
            ctx.notifications.write().await.show(notification.clone());
            Ok(EventOutcome::NotificationShown(notification))
        },
        BackgroundTasks::new(),
    )
}

fn on_notification_click(ctx: &WorkerContext, event: WorkerEvent) -> Dispatch {
    let kind = event.kind();
    let WorkerEvent::NotificationClick(click) = event else {
        return unexpected(EventKind::NotificationClick, kind);
    };

    let ctx = ctx.clone();
    Dispatch::new(
        async move {
            ctx.notifications.write().await.close(&click.tag);

            let opened = if click.action.as_deref() == Some(ACTION_VIEW) {
                let url = ctx.fallback_url().clone();
                Some(ctx.clients.write().await.open_window(url))
            } else {
                None
            };

            debug!(
                tag = %click.tag,
                action = ?click.action,
                opened = opened.is_some(),
                "Notification clicked"
            );
            Ok(EventOutcome::NotificationClicked { opened })
        },
        BackgroundTasks::new(),
    )
}
