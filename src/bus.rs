//! Message Bus Manager
//!
//! Single responsibility: Correlate requests with responses and dispatch inbound traffic
//! for one side of one session.
//!
//! # Architecture
//!
//! ```text
//!   request() ──► PendingCall table ──► Transport::post(REQUEST)
//!                        ▲
//!   Inbox ──► receive() ─┼── RESPONSE ──► settle pending call (exactly once)
//!                        ├── REQUEST ──► request handler (own task) ──► post(RESPONSE)
//!                        └── NOTIFICATION ──► notification task ──► subscribers, in order
//! ```
//!
//! # Guarantees
//!
//! - Request ids start at 1, strictly increase and are never reused
//! - Every pending call settles exactly once: by its response, by teardown,
//!   or by the caller dropping the request future
//! - A duplicate or stale response is discarded
//! - A request for an unregistered method is answered with an error, never dropped
//! - Notifications reach subscribers in arrival order and registration order
//!
//! There is no per-request timeout here. Timeouts belong to the caller
//! (see `handshake::poll_init`), which cancels by dropping the request future.

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use tokio::sync::{mpsc, oneshot};
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, info, warn};

use crate::api::{ApiCall, ApiHandler, CallKind};
use crate::error::BridgeError;
use crate::protocol::{self, Message, RequestId, WireMessage};
use crate::session::{SessionState, SharedSession};
use crate::transport::{Inbox, Posted, Transport};

/// What a request handler produces: a `result` or an `error` payload.
pub type HandlerResult = Result<Value, Value>;

/// Handler for one request method.
pub type RequestHandler = Arc<dyn Fn(Vec<Value>) -> BoxFuture<'static, HandlerResult> + Send + Sync>;

/// Subscriber for one notification method.
pub type NotificationHandler = Arc<dyn Fn(Vec<Value>) -> BoxFuture<'static, ()> + Send + Sync>;

/// Identifies one notification subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Subscribers = Arc<RwLock<HashMap<String, Vec<(SubscriptionId, NotificationHandler)>>>>;

/// One in-flight request awaiting its response.
struct PendingCall {
    method: String,
    tx: oneshot::Sender<Result<Value, BridgeError>>,
}

struct Inner {
    /// Label used in logs ("channel" / "envelope")
    label: &'static str,
    transport: Arc<dyn Transport>,
    session: SharedSession,
    next_id: AtomicU64,
    next_subscription: AtomicU64,
    pending: Mutex<HashMap<RequestId, PendingCall>>,
    request_handlers: RwLock<HashMap<String, RequestHandler>>,
    subscribers: Subscribers,
    notify_tx: mpsc::UnboundedSender<(String, Vec<Value>)>,
    tasks: Mutex<Vec<AbortHandle>>,
    torn_down: AtomicBool,
}

/// Per-side message bus. Cloning yields another handle to the same bus.
#[derive(Clone)]
pub struct MessageBus {
    inner: Arc<Inner>,
}

/// Removes the pending record if the request future is dropped before settling.
struct PendingGuard<'a> {
    bus: &'a MessageBus,
    request_id: RequestId,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if lock(&self.bus.inner.pending).remove(&self.request_id).is_some() {
            debug!(
                bus = self.bus.inner.label,
                request_id = self.request_id,
                "Request abandoned by caller"
            );
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MessageBus {
    /// Create a bus for one side of a session.
    ///
    /// Spawns the notification task, so this must be called from within a Tokio runtime.
    pub fn new(label: &'static str, transport: Arc<dyn Transport>, session: SharedSession) -> Self {
        let (notify_tx, notify_rx) = mpsc::unbounded_channel();
        let subscribers: Subscribers = Arc::new(RwLock::new(HashMap::new()));

        let notifier = tokio::spawn(notification_loop(label, notify_rx, Arc::clone(&subscribers)));

        Self {
            inner: Arc::new(Inner {
                label,
                transport,
                session,
                next_id: AtomicU64::new(1),
                next_subscription: AtomicU64::new(1),
                pending: Mutex::new(HashMap::new()),
                request_handlers: RwLock::new(HashMap::new()),
                subscribers,
                notify_tx,
                tasks: Mutex::new(vec![notifier.abort_handle()]),
                torn_down: AtomicBool::new(false),
            }),
        }
    }

    pub fn session(&self) -> &SharedSession {
        &self.inner.session
    }

    pub fn is_torn_down(&self) -> bool {
        self.inner.torn_down.load(Ordering::SeqCst)
    }

    /// Number of requests still awaiting a response.
    pub fn pending_count(&self) -> usize {
        lock(&self.inner.pending).len()
    }

    /// Send a request and wait for its response.
    ///
    /// # Errors
    /// - `TornDown` if the bus is (or gets) torn down before the response arrives
    /// - `NotAssociated` if this side cannot originate calls yet
    /// - `UnknownMethod` if the other side has no handler for `method`
    /// - `Remote` with the handler's error payload
    /// - `Transport` if the message could not be posted
    pub async fn request(&self, method: &str, args: Vec<Value>) -> Result<Value, BridgeError> {
        let outbound = self.inner.session.read().await.outbound()?;

        let (tx, rx) = oneshot::channel();
        let request_id = {
            let mut pending = lock(&self.inner.pending);
            // Checked under the pending lock so teardown cannot miss this record
            if self.is_torn_down() {
                return Err(BridgeError::TornDown);
            }
            let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
            pending.insert(
                id,
                PendingCall {
                    method: method.to_string(),
                    tx,
                },
            );
            id
        };
        let _guard = PendingGuard {
            bus: self,
            request_id,
        };

        debug!(
            bus = self.inner.label,
            request_id = request_id,
            method = %method,
            "Sending request"
        );

        let wire = WireMessage::new(
            Message::Request {
                request_id,
                method: method.to_string(),
                args,
            },
            outbound.envelope_server_id,
        );
        self.post(&wire, &outbound.target_origin).await?;

        match rx.await {
            Ok(result) => result,
            // Sender dropped without settling: the bus went away
            Err(_) => Err(BridgeError::TornDown),
        }
    }

    /// Send a fire-and-forget notification.
    pub async fn notify(&self, method: &str, args: Vec<Value>) -> Result<(), BridgeError> {
        if self.is_torn_down() {
            return Err(BridgeError::TornDown);
        }
        let outbound = self.inner.session.read().await.outbound()?;

        debug!(bus = self.inner.label, method = %method, "Sending notification");

        let wire = WireMessage::new(
            Message::Notification {
                method: method.to_string(),
                args,
            },
            outbound.envelope_server_id,
        );
        self.post(&wire, &outbound.target_origin).await
    }

    /// Register the handler for a request method, replacing any previous one.
    pub fn on_request<F, Fut>(&self, method: &str, handler: F)
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        let handler: RequestHandler = Arc::new(move |args| handler(args).boxed());
        self.inner
            .request_handlers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(method.to_string(), handler);
    }

    /// Subscribe to a notification method. Several subscribers per method are allowed.
    pub fn subscribe<F, Fut>(&self, method: &str, handler: F) -> SubscriptionId
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let id = SubscriptionId(self.inner.next_subscription.fetch_add(1, Ordering::SeqCst));
        let handler: NotificationHandler = Arc::new(move |args| handler(args).boxed());
        self.inner
            .subscribers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .entry(method.to_string())
            .or_default()
            .push((id, handler));
        id
    }

    /// Stop delivering to one subscriber. Returns false if it was not subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self
            .inner
            .subscribers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut removed = false;
        subscribers.retain(|_, handlers| {
            let before = handlers.len();
            handlers.retain(|(sub, _)| *sub != id);
            removed |= handlers.len() != before;
            !handlers.is_empty()
        });
        removed
    }

    /// Wire every method of an API surface into the dispatch tables.
    pub fn register_api<C, H>(&self, handler: Arc<H>)
    where
        C: ApiCall,
        H: ApiHandler<C>,
    {
        for &(method, kind) in C::METHODS {
            let handler = Arc::clone(&handler);
            match kind {
                CallKind::Request => self.on_request(method, move |args| {
                    let handler = Arc::clone(&handler);
                    async move {
                        let call = C::from_wire(method, args).map_err(|e| invalid_arguments(method, &e))?;
                        handler.handle(call).await
                    }
                }),
                CallKind::Notification => {
                    self.subscribe(method, move |args| {
                        let handler = Arc::clone(&handler);
                        async move {
                            match C::from_wire(method, args) {
                                Ok(call) => {
                                    if let Err(error) = handler.handle(call).await {
                                        warn!(method = %method, error = %error, "Notification handler failed");
                                    }
                                }
                                Err(e) => {
                                    warn!(method = %method, error = %e, "Dropping notification with bad arguments");
                                }
                            }
                        }
                    });
                }
            }
        }
    }

    /// Spawn the receive loop over a transport inbox.
    ///
    /// When the inbox closes the transport is gone for good and the bus tears itself down.
    pub fn run(&self, mut inbox: Inbox) -> JoinHandle<()> {
        let bus = self.clone();
        let handle = tokio::spawn(async move {
            debug!(bus = bus.inner.label, "Receive loop started");
            while let Some(posted) = inbox.recv().await {
                bus.receive(posted).await;
            }
            info!(bus = bus.inner.label, "Transport closed");
            bus.teardown().await;
        });
        lock(&self.inner.tasks).push(handle.abort_handle());
        handle
    }

    /// Inbound entry point: decode, admit, dispatch.
    pub async fn receive(&self, posted: Posted) {
        if self.is_torn_down() {
            return;
        }

        let wire = match protocol::decode(&posted.data) {
            Ok(wire) => wire,
            Err(e) => {
                warn!(bus = self.inner.label, origin = %posted.origin, error = %e, "Dropping malformed message");
                return;
            }
        };

        let admitted = self
            .inner
            .session
            .read()
            .await
            .admit(&posted.origin, wire.target_envelope_server_id.as_deref());
        if let Err(rejection) = admitted {
            // Not surfaced to anyone: a forger learns nothing
            debug!(bus = self.inner.label, origin = %posted.origin, %rejection, "Dropping inbound message");
            return;
        }

        match wire.message {
            Message::Request {
                request_id,
                method,
                args,
            } => self.dispatch_request(request_id, method, args, posted.origin, wire.target_envelope_server_id),
            Message::Response {
                request_id,
                method,
                outcome,
            } => self.settle(request_id, &method, outcome),
            Message::Notification { method, args } => {
                if self.inner.notify_tx.send((method, args)).is_err() {
                    debug!(bus = self.inner.label, "Notification task stopped");
                }
            }
        }
    }

    /// Tear the bus down. Idempotent.
    ///
    /// Rejects every pending call with `TornDown`, drops all handlers,
    /// marks the session torn down and stops the background tasks.
    pub async fn teardown(&self) {
        if self.inner.torn_down.swap(true, Ordering::SeqCst) {
            return;
        }

        let drained: Vec<(RequestId, PendingCall)> = lock(&self.inner.pending).drain().collect();
        for (id, call) in drained {
            debug!(bus = self.inner.label, request_id = id, method = %call.method, "Rejecting pending request");
            let _ = call.tx.send(Err(BridgeError::TornDown));
        }

        self.inner
            .request_handlers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
        self.inner
            .subscribers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();

        self.inner.session.write().await.tear_down();
        info!(bus = self.inner.label, "Message bus torn down");

        // Last: this may abort the task we are running on
        let tasks: Vec<AbortHandle> = lock(&self.inner.tasks).drain(..).collect();
        for task in tasks {
            task.abort();
        }
    }

    pub async fn state(&self) -> SessionState {
        self.inner.session.read().await.state()
    }

    fn dispatch_request(
        &self,
        request_id: RequestId,
        method: String,
        args: Vec<Value>,
        reply_origin: String,
        envelope_server_id: Option<String>,
    ) {
        let handler = self
            .inner
            .request_handlers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&method)
            .cloned();

        debug!(
            bus = self.inner.label,
            request_id = request_id,
            method = %method,
            "Dispatching request"
        );

        // Each request runs on its own task: slow handlers must not hold up the inbox
        let bus = self.clone();
        tokio::spawn(async move {
            let outcome = match handler {
                Some(handler) => handler(args).await,
                None => {
                    warn!(bus = bus.inner.label, method = %method, "No handler registered");
                    Err(protocol::unknown_method_error(&method))
                }
            };

            if bus.is_torn_down() {
                debug!(bus = bus.inner.label, request_id = request_id, "Torn down, response not sent");
                return;
            }

            let wire = WireMessage::new(
                Message::Response {
                    request_id,
                    method,
                    outcome,
                },
                envelope_server_id,
            );
            if let Err(e) = bus.post(&wire, &reply_origin).await {
                warn!(bus = bus.inner.label, request_id = request_id, error = %e, "Failed to send response");
            }
        });
    }

    fn settle(&self, request_id: RequestId, method: &str, outcome: Result<Value, Value>) {
        let call = lock(&self.inner.pending).remove(&request_id);

        let Some(call) = call else {
            debug!(
                bus = self.inner.label,
                request_id = request_id,
                method = %method,
                "Discarding response without pending request"
            );
            return;
        };

        // The request id is the only correlation key; a mismatched methodName still settles
        if call.method != method {
            warn!(
                bus = self.inner.label,
                request_id = request_id,
                expected = %call.method,
                actual = %method,
                "Response method does not match request"
            );
        }

        let result = outcome.map_err(|error| match protocol::parse_unknown_method(&error) {
            Some(method) => BridgeError::UnknownMethod(method),
            None => BridgeError::Remote(error),
        });

        // The caller may have gone away already; nothing to do then
        let _ = call.tx.send(result);
    }

    async fn post(&self, wire: &WireMessage, target_origin: &str) -> Result<(), BridgeError> {
        let data = protocol::encode(wire)?;
        self.inner.transport.post(data, target_origin).await
    }
}

/// Notification loop - runs in a spawned task.
///
/// Delivers notifications one at a time so subscribers observe arrival order.
async fn notification_loop(
    label: &'static str,
    mut rx: mpsc::UnboundedReceiver<(String, Vec<Value>)>,
    subscribers: Subscribers,
) {
    while let Some((method, args)) = rx.recv().await {
        let handlers: Vec<NotificationHandler> = subscribers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&method)
            .map(|handlers| handlers.iter().map(|(_, h)| Arc::clone(h)).collect())
            .unwrap_or_default();

        if handlers.is_empty() {
            debug!(bus = label, method = %method, "No subscriber for notification");
            continue;
        }

        for handler in handlers {
            handler(args.clone()).await;
        }
    }
}

fn invalid_arguments(method: &str, error: &BridgeError) -> Value {
    json!({
        "kind": "InvalidArguments",
        "method": method,
        "message": error.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Session;
    use crate::transport::window_pair;
    use std::time::Duration;
    use tokio::time::timeout;

    const HOST: &str = "https://host";
    const ENVELOPE: &str = "https://envelope";

    /// A host-side bus whose outbound traffic lands in the returned inbox.
    fn host_bus() -> (MessageBus, Inbox) {
        let ((host, _host_inbox), (_envelope, envelope_inbox)) = window_pair(HOST, ENVELOPE, 32);
        let session = Session::for_server("s1", HOST, "*").shared();
        (MessageBus::new("channel", Arc::new(host), session), envelope_inbox)
    }

    fn response(id: RequestId, method: &str, outcome: Result<Value, Value>) -> Posted {
        let wire = WireMessage::new(
            Message::Response {
                request_id: id,
                method: method.into(),
                outcome,
            },
            Some("s1".into()),
        );
        Posted {
            origin: ENVELOPE.into(),
            data: protocol::encode(&wire).unwrap(),
        }
    }

    async fn next_request(inbox: &mut Inbox) -> (RequestId, String) {
        let posted = inbox.recv().await.unwrap();
        match protocol::decode(&posted.data).unwrap().message {
            Message::Request {
                request_id, method, ..
            } => (request_id, method),
            other => panic!("expected request, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_request_ids_start_at_one_and_increase() {
        let (bus, mut inbox) = host_bus();

        let b1 = bus.clone();
        let r1 = tokio::spawn(async move { b1.request("a", vec![]).await });
        let (id1, _) = next_request(&mut inbox).await;
        let b2 = bus.clone();
        let r2 = tokio::spawn(async move { b2.request("b", vec![]).await });
        let (id2, _) = next_request(&mut inbox).await;

        assert_eq!(id1, 1);
        assert_eq!(id2, 2);

        bus.teardown().await;
        assert!(r1.await.unwrap().unwrap_err().is_torn_down());
        assert!(r2.await.unwrap().unwrap_err().is_torn_down());
    }

    #[tokio::test]
    async fn test_duplicate_response_is_ignored() {
        let (bus, mut inbox) = host_bus();

        let b = bus.clone();
        let call = tokio::spawn(async move { b.request("jobsQuery", vec![json!("p1")]).await });
        let (id, _) = next_request(&mut inbox).await;

        bus.receive(response(id, "jobsQuery", Ok(json!("first")))).await;
        bus.receive(response(id, "jobsQuery", Ok(json!("second")))).await;

        assert_eq!(call.await.unwrap().unwrap(), json!("first"));
        assert_eq!(bus.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_response_settles_by_id_despite_method_mismatch() {
        let (bus, mut inbox) = host_bus();

        let b = bus.clone();
        let call = tokio::spawn(async move { b.request("jobsQuery", vec![]).await });
        let (id, _) = next_request(&mut inbox).await;

        bus.receive(response(id, "somethingElse", Ok(json!(["j1"])))).await;

        assert_eq!(call.await.unwrap().unwrap(), json!(["j1"]));
        assert_eq!(bus.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_method_error_is_typed() {
        let (bus, mut inbox) = host_bus();

        let b = bus.clone();
        let call = tokio::spawn(async move { b.request("nope", vec![]).await });
        let (id, _) = next_request(&mut inbox).await;
        bus.receive(response(id, "nope", Err(protocol::unknown_method_error("nope"))))
            .await;

        match call.await.unwrap() {
            Err(BridgeError::UnknownMethod(method)) => assert_eq!(method, "nope"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_dropped_request_future_releases_record() {
        let (bus, mut inbox) = host_bus();

        let result = timeout(Duration::from_millis(20), bus.request("slow", vec![])).await;
        assert!(result.is_err());
        assert_eq!(bus.pending_count(), 0);

        // The late response is stale and discarded
        let (id, _) = next_request(&mut inbox).await;
        bus.receive(response(id, "slow", Ok(Value::Null))).await;
        assert_eq!(bus.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_request_after_teardown_fails_fast() {
        let (bus, _inbox) = host_bus();
        bus.teardown().await;
        bus.teardown().await;

        assert!(bus.request("x", vec![]).await.unwrap_err().is_torn_down());
        assert!(bus.notify("x", vec![]).await.unwrap_err().is_torn_down());
        assert_eq!(bus.state().await, SessionState::TornDown);
    }

    #[tokio::test]
    async fn test_unsubscribe_unknown_id() {
        let (bus, _inbox) = host_bus();
        let id = bus.subscribe("tick", |_| async {});
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
    }

    #[tokio::test]
    async fn test_malformed_message_is_dropped() {
        let (bus, _inbox) = host_bus();
        bus.receive(Posted {
            origin: ENVELOPE.into(),
            data: "{ definitely not a message".into(),
        })
        .await;
        assert_eq!(bus.pending_count(), 0);
        assert!(!bus.is_torn_down());
    }
}
