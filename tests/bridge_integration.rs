//! End-to-end bridge tests: host and embedded view over real transports

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};

use envelope_bridge::api::ApiProxy;
use envelope_bridge::driver::{DriverError, InMemoryProcessDetailsDriver};
use envelope_bridge::models::{Job, JobStatus, ProcessDetailsInitArgs, ProcessInstance, ProcessInstanceState};
use envelope_bridge::process_details::{
    ProcessDetailsChannelApiImpl, ProcessDetailsChannelCall, ProcessDetailsDriver, ProcessDetailsEnvelopeApi,
    ProcessDetailsEnvelopeApiImpl, ProcessDetailsEnvelopeCall, ProcessDetailsView,
};
use envelope_bridge::protocol::{self, Message, WireMessage};
use envelope_bridge::{
    window_pair, BridgeConfig, BridgeError, EnvelopeClient, EnvelopeServer, Posted, SessionState, Transport,
    WebSocketTransport, WindowTransport,
};

const HOST: &str = "https://host";
const ENVELOPE: &str = "https://envelope";

fn config() -> BridgeConfig {
    BridgeConfig {
        host_origin: HOST.to_string(),
        init_poll_interval_ms: 10,
        init_timeout_ms: 2_000,
        ..Default::default()
    }
}

// ============================================================================
// Fixtures
// ============================================================================

/// View that records what the bridge does to it.
#[derive(Default)]
struct RecordingView {
    initialized: AtomicUsize,
    ready: AtomicUsize,
    driver: Mutex<Option<Arc<dyn ProcessDetailsDriver>>>,
}

impl RecordingView {
    fn driver(&self) -> Arc<dyn ProcessDetailsDriver> {
        self.driver
            .lock()
            .unwrap()
            .clone()
            .expect("view initialized")
    }
}

#[async_trait]
impl ProcessDetailsView for RecordingView {
    async fn initialize(&self, _init_args: ProcessDetailsInitArgs, driver: Arc<dyn ProcessDetailsDriver>) {
        self.initialized.fetch_add(1, Ordering::SeqCst);
        *self.driver.lock().unwrap() = Some(driver);
    }

    fn ready(&self) {
        self.ready.fetch_add(1, Ordering::SeqCst);
    }
}

/// Transport that keeps a copy of everything it posts.
struct RecordingTransport {
    inner: WindowTransport,
    sent: Mutex<Vec<String>>,
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn post(&self, data: String, target_origin: &str) -> Result<(), BridgeError> {
        self.sent.lock().unwrap().push(data.clone());
        self.inner.post(data, target_origin).await
    }
}

struct Mounted {
    server: EnvelopeServer,
    client: EnvelopeClient,
    driver: Arc<InMemoryProcessDetailsDriver>,
    view: Arc<RecordingView>,
    envelope_api: ProcessDetailsEnvelopeApi,
}

impl Mounted {
    async fn handshake(&self) -> Result<(), BridgeError> {
        let init_args = ProcessDetailsInitArgs::new(ProcessInstance::new("id-42", "travels", "Travels"));
        self.server
            .start_init_polling(|association| self.envelope_api.init(association, init_args.clone()))
            .await
    }
}

async fn seeded_driver() -> Arc<InMemoryProcessDetailsDriver> {
    let driver = Arc::new(InMemoryProcessDetailsDriver::new());
    let mut instance = ProcessInstance::new("id-42", "travels", "Travels");
    instance.business_key = Some("T-42".to_string());
    driver.insert_instance(instance).await;
    driver.insert_job(Job::scheduled("job-1", "travels", "id-42")).await;
    driver
}

/// Host with the in-memory Driver and an embedded view, joined by a window pair.
async fn mount() -> Mounted {
    let ((host, host_inbox), (envelope, envelope_inbox)) = window_pair(HOST, ENVELOPE, 64);
    let driver = seeded_driver().await;

    let server = EnvelopeServer::new(Arc::new(host), config());
    server.register_channel_api::<ProcessDetailsChannelCall, _>(Arc::new(ProcessDetailsChannelApiImpl::new(
        Arc::clone(&driver),
    )));
    server.run(host_inbox);

    let client = EnvelopeClient::new(Arc::new(envelope));
    let view = Arc::new(RecordingView::default());
    client.register_envelope_api::<ProcessDetailsEnvelopeCall, _>(Arc::new(ProcessDetailsEnvelopeApiImpl::new(
        client.clone(),
        Arc::clone(&view),
    )));
    client.run(envelope_inbox);

    let envelope_api = ProcessDetailsEnvelopeApi::new(server.envelope_api());
    Mounted {
        server,
        client,
        driver,
        view,
        envelope_api,
    }
}

fn encoded(message: Message, target: &str) -> String {
    protocol::encode(&WireMessage::new(message, Some(target.to_string()))).unwrap()
}

// ============================================================================
// Handshake
// ============================================================================

#[tokio::test]
async fn test_handshake_associates_both_sides() {
    let mounted = mount().await;

    mounted.handshake().await.unwrap();

    assert_eq!(mounted.server.state().await, SessionState::Associated);
    let association = mounted.client.association().await.unwrap();
    assert_eq!(association.origin, HOST);
    assert_eq!(association.envelope_server_id, mounted.server.id());
    assert_eq!(mounted.view.ready.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_init_is_idempotent() {
    let mounted = mount().await;
    mounted.handshake().await.unwrap();

    // A late or repeated init changes nothing
    let again = ProcessDetailsInitArgs::new(ProcessInstance::new("other", "travels", "Travels"));
    mounted
        .envelope_api
        .init(mounted.server.association(), again)
        .await
        .unwrap();

    assert_eq!(mounted.view.initialized.load(Ordering::SeqCst), 1);
    assert_eq!(mounted.view.ready.load(Ordering::SeqCst), 1);
    assert_eq!(
        mounted.client.association().await.map(|a| a.envelope_server_id),
        Some(mounted.server.id().to_string())
    );
}

#[tokio::test]
async fn test_handshake_times_out_without_envelope() {
    let ((host, host_inbox), _envelope) = window_pair(HOST, ENVELOPE, 64);
    let server = EnvelopeServer::new(
        Arc::new(host),
        BridgeConfig {
            init_timeout_ms: 60,
            ..config()
        },
    );
    server.run(host_inbox);
    let envelope_api = ProcessDetailsEnvelopeApi::new(server.envelope_api());
    let init_args = ProcessDetailsInitArgs::new(ProcessInstance::new("p1", "travels", "Travels"));

    let result = server
        .start_init_polling(|association| envelope_api.init(association, init_args.clone()))
        .await;

    assert!(matches!(result, Err(BridgeError::HandshakeTimeout(_))));
    assert_eq!(server.state().await, SessionState::TornDown);
}

// ============================================================================
// Request / response
// ============================================================================

#[tokio::test]
async fn test_host_query_reaches_embedded_handler() {
    // Host calls processDetailsQuery on a handler living in the embedded context
    let ((host, host_inbox), (envelope, envelope_inbox)) = window_pair(HOST, ENVELOPE, 64);
    let recording = Arc::new(RecordingTransport {
        inner: host,
        sent: Mutex::new(Vec::new()),
    });

    let server = EnvelopeServer::with_id(
        "s1",
        recording.clone(),
        BridgeConfig {
            init_poll_interval_ms: 1_000,
            ..config()
        },
    );
    server.run(host_inbox);

    let client = EnvelopeClient::new(Arc::new(envelope));
    let view = Arc::new(RecordingView::default());
    client.register_envelope_api::<ProcessDetailsEnvelopeCall, _>(Arc::new(ProcessDetailsEnvelopeApiImpl::new(
        client.clone(),
        Arc::clone(&view),
    )));
    client.register_envelope_api::<ProcessDetailsChannelCall, _>(Arc::new(ProcessDetailsChannelApiImpl::new(
        seeded_driver().await,
    )));
    client.run(envelope_inbox);

    let envelope_api = ProcessDetailsEnvelopeApi::new(server.envelope_api());
    let init_args = ProcessDetailsInitArgs::new(ProcessInstance::new("id-42", "travels", "Travels"));
    server
        .start_init_polling(|association| envelope_api.init(association, init_args.clone()))
        .await
        .unwrap();

    let proxy: ApiProxy<ProcessDetailsChannelCall> = ApiProxy::new(server.bus().clone());
    let instance: ProcessInstance = proxy
        .request(ProcessDetailsChannelCall::ProcessDetailsQuery { id: "id-42".into() })
        .await
        .unwrap();
    assert_eq!(instance.id, "id-42");
    assert_eq!(instance.business_key.as_deref(), Some("T-42"));

    let sent = recording.sent.lock().unwrap().clone();
    let query = protocol::decode(&sent[1]).unwrap();
    assert_eq!(query.message.request_id(), Some(2));
    assert_eq!(query.message.method(), "processDetailsQuery");
    assert_eq!(query.target_envelope_server_id.as_deref(), Some("s1"));
}

#[tokio::test]
async fn test_view_driver_calls_host_driver() {
    let mounted = mount().await;
    mounted.handshake().await.unwrap();
    let driver = mounted.view.driver();

    // Concurrent independent requests
    let (instance, jobs) = tokio::join!(driver.process_details_query("id-42"), driver.jobs_query("id-42"));
    assert_eq!(instance.unwrap().business_key.as_deref(), Some("T-42"));
    let jobs = jobs.unwrap();
    assert_eq!(jobs.len(), 1);

    let modal = driver.cancel_job(&jobs[0]).await.unwrap();
    assert_eq!(modal.modal_title, "success");
    assert_eq!(
        mounted.driver.jobs_for("id-42").await[0].status,
        JobStatus::Canceled
    );
}

#[tokio::test]
async fn test_driver_error_reaches_view_verbatim() {
    let mounted = mount().await;
    mounted.handshake().await.unwrap();

    let err = mounted
        .view
        .driver()
        .process_details_query("missing")
        .await
        .unwrap_err();
    assert_eq!(err, DriverError::new("Process instance missing not found"));
}

#[tokio::test]
async fn test_notification_reaches_host_driver() {
    let mounted = mount().await;
    mounted.handshake().await.unwrap();

    let driver = mounted.view.driver();
    driver.open_process_instance_details("parent-1").await;
    driver.open_process_instance_details("parent-2").await;

    timeout(Duration::from_secs(2), async {
        while mounted.driver.opened().await.len() < 2 {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
    assert_eq!(mounted.driver.opened().await, vec!["parent-1", "parent-2"]);
}

#[tokio::test]
async fn test_unknown_method_rejects() {
    let mounted = mount().await;
    mounted.handshake().await.unwrap();

    match mounted.server.bus().request("notAMethod", vec![]).await {
        Err(BridgeError::UnknownMethod(method)) => assert_eq!(method, "notAMethod"),
        other => panic!("unexpected {:?}", other),
    }
    match mounted.client.bus().request("alsoNotAMethod", vec![json!(1)]).await {
        Err(BridgeError::UnknownMethod(method)) => assert_eq!(method, "alsoNotAMethod"),
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(mounted.server.bus().pending_count(), 0);
}

#[tokio::test]
async fn test_out_of_order_responses_reach_their_callers() {
    let ((host, host_inbox), (envelope, mut envelope_inbox)) = window_pair(HOST, ENVELOPE, 64);
    let server = EnvelopeServer::with_id("s1", Arc::new(host), config());
    server.run(host_inbox);

    let methods = ["first", "second", "third"];
    let mut calls = Vec::new();
    for method in methods {
        let bus = server.bus().clone();
        calls.push(tokio::spawn(async move { bus.request(method, vec![]).await }));
    }

    let mut requests = HashMap::new();
    for _ in 0..3 {
        let posted = envelope_inbox.recv().await.unwrap();
        if let Message::Request {
            request_id, method, ..
        } = protocol::decode(&posted.data).unwrap().message
        {
            requests.insert(request_id, method);
        }
    }
    let mut ids: Vec<u64> = requests.keys().copied().collect();
    ids.sort_unstable();
    assert_eq!(ids, vec![1, 2, 3]);

    for id in [3, 1, 2] {
        let method = requests[&id].clone();
        let response = Message::Response {
            request_id: id,
            outcome: Ok(json!(format!("answer to {}", method))),
            method,
        };
        envelope.post(encoded(response, "s1"), HOST).await.unwrap();
    }

    for (call, method) in calls.into_iter().zip(methods) {
        assert_eq!(call.await.unwrap().unwrap(), json!(format!("answer to {}", method)));
    }
    assert_eq!(server.bus().pending_count(), 0);
}

#[tokio::test]
async fn test_duplicate_response_settles_once() {
    let ((host, host_inbox), (envelope, mut envelope_inbox)) = window_pair(HOST, ENVELOPE, 64);
    let server = EnvelopeServer::with_id("s1", Arc::new(host), config());
    server.run(host_inbox);

    let bus = server.bus().clone();
    let call = tokio::spawn(async move { bus.request("jobsQuery", vec![json!("p1")]).await });
    let request_id = protocol::decode(&envelope_inbox.recv().await.unwrap().data)
        .unwrap()
        .message
        .request_id()
        .unwrap();

    for answer in ["first", "second"] {
        let response = Message::Response {
            request_id,
            method: "jobsQuery".into(),
            outcome: Ok(json!(answer)),
        };
        envelope.post(encoded(response, "s1"), HOST).await.unwrap();
    }

    assert_eq!(call.await.unwrap().unwrap(), json!("first"));

    // The second response was discarded; the server still works
    let bus = server.bus().clone();
    let next = tokio::spawn(async move { bus.request("jobsQuery", vec![]).await });
    let next_id = protocol::decode(&envelope_inbox.recv().await.unwrap().data)
        .unwrap()
        .message
        .request_id()
        .unwrap();
    assert_eq!(next_id, request_id + 1);
    let response = Message::Response {
        request_id: next_id,
        method: "jobsQuery".into(),
        outcome: Err(json!({ "message": "boom" })),
    };
    envelope.post(encoded(response, "s1"), HOST).await.unwrap();
    assert!(matches!(next.await.unwrap(), Err(BridgeError::Remote(_))));
}

// ============================================================================
// Notifications
// ============================================================================

#[tokio::test]
async fn test_notifications_fan_out_in_registration_order() {
    let ((host, host_inbox), (envelope, _envelope_inbox)) = window_pair(HOST, ENVELOPE, 64);
    let server = EnvelopeServer::with_id("s1", Arc::new(host), config());
    server.run(host_inbox);

    let (seen_tx, mut seen) = mpsc::unbounded_channel::<String>();
    let mut subscriptions = Vec::new();
    for label in ["a", "b"] {
        let tx = seen_tx.clone();
        subscriptions.push(server.bus().subscribe("tick", move |args: Vec<Value>| {
            let _ = tx.send(format!("{}:{}", label, args[0]));
            async {}
        }));
    }

    for n in 1..=2 {
        let tick = Message::Notification {
            method: "tick".into(),
            args: vec![json!(n)],
        };
        envelope.post(encoded(tick, "s1"), HOST).await.unwrap();
    }

    let mut order = Vec::new();
    for _ in 0..4 {
        order.push(seen.recv().await.unwrap());
    }
    assert_eq!(order, vec!["a:1", "b:1", "a:2", "b:2"]);

    assert!(server.bus().unsubscribe(subscriptions[0]));
    for n in 3..=4 {
        let tick = Message::Notification {
            method: "tick".into(),
            args: vec![json!(n)],
        };
        envelope.post(encoded(tick, "s1"), HOST).await.unwrap();
    }
    assert_eq!(seen.recv().await.unwrap(), "b:3");
    assert_eq!(seen.recv().await.unwrap(), "b:4");
}

// ============================================================================
// Origin enforcement
// ============================================================================

#[tokio::test]
async fn test_associated_client_drops_foreign_messages() {
    let ((_host, mut host_inbox), (envelope, _envelope_inbox)) = window_pair(HOST, ENVELOPE, 64);
    let client = EnvelopeClient::new(Arc::new(envelope));
    client.associate(HOST, "s1").await;

    let handled = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&handled);
    client.bus().on_request("ping", move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        async { Ok::<Value, Value>(json!("pong")) }
    });

    let ping = |id| Message::Request {
        request_id: id,
        method: "ping".into(),
        args: vec![],
    };
    let forged = [
        ("https://evil", "s1", 1),
        (HOST, "s2", 2),
    ];
    for (origin, target, id) in forged {
        client
            .bus()
            .receive(Posted {
                origin: origin.to_string(),
                data: encoded(ping(id), target),
            })
            .await;
    }
    client
        .bus()
        .receive(Posted {
            origin: HOST.to_string(),
            data: encoded(ping(3), "s1"),
        })
        .await;

    let reply = protocol::decode(&host_inbox.recv().await.unwrap().data).unwrap();
    assert_eq!(reply.message.request_id(), Some(3));
    assert_eq!(reply.target_envelope_server_id.as_deref(), Some("s1"));
    assert_eq!(handled.load(Ordering::SeqCst), 1);
    assert!(host_inbox.try_recv().is_err());
}

#[tokio::test]
async fn test_server_drops_requests_from_foreign_origin() {
    let ((host, _host_inbox), (_envelope, mut envelope_inbox)) = window_pair(HOST, ENVELOPE, 64);
    let driver = seeded_driver().await;
    let server = EnvelopeServer::with_id(
        "s1",
        Arc::new(host),
        BridgeConfig {
            envelope_target_origin: ENVELOPE.to_string(),
            ..config()
        },
    );
    server.register_channel_api::<ProcessDetailsChannelCall, _>(Arc::new(ProcessDetailsChannelApiImpl::new(
        Arc::clone(&driver),
    )));
    server.session().write().await.mark_associated();

    let abort = |id| Message::Request {
        request_id: id,
        method: "handleProcessAbort".into(),
        args: vec![serde_json::to_value(ProcessInstance::new("id-42", "travels", "Travels")).unwrap()],
    };

    // Right envelope server id, wrong origin
    server
        .bus()
        .receive(Posted {
            origin: "https://evil".to_string(),
            data: encoded(abort(1), "s1"),
        })
        .await;
    server
        .bus()
        .receive(Posted {
            origin: ENVELOPE.to_string(),
            data: encoded(abort(2), "s1"),
        })
        .await;

    // Had the forged abort run first, this one would fail on an aborted instance
    let reply = protocol::decode(&envelope_inbox.recv().await.unwrap().data).unwrap();
    assert_eq!(
        reply.message,
        Message::Response {
            request_id: 2,
            method: "handleProcessAbort".into(),
            outcome: Ok(Value::Null),
        }
    );
    assert_eq!(
        driver.instance("id-42").await.map(|i| i.state),
        Some(ProcessInstanceState::Aborted)
    );
    assert!(envelope_inbox.try_recv().is_err());
}

#[tokio::test]
async fn test_late_envelope_api_registration_is_retried() {
    let ((host, host_inbox), (envelope, envelope_inbox)) = window_pair(HOST, ENVELOPE, 64);
    let server = EnvelopeServer::new(Arc::new(host), config());
    server.run(host_inbox);

    // The embedded bus is live before its Envelope API exists
    let client = EnvelopeClient::new(Arc::new(envelope));
    client.run(envelope_inbox);
    let view = Arc::new(RecordingView::default());
    {
        let client = client.clone();
        let view = Arc::clone(&view);
        tokio::spawn(async move {
            sleep(Duration::from_millis(40)).await;
            client.register_envelope_api::<ProcessDetailsEnvelopeCall, _>(Arc::new(
                ProcessDetailsEnvelopeApiImpl::new(client.clone(), view),
            ));
        });
    }

    let envelope_api = ProcessDetailsEnvelopeApi::new(server.envelope_api());
    let init_args = ProcessDetailsInitArgs::new(ProcessInstance::new("id-42", "travels", "Travels"));
    server
        .start_init_polling(|association| envelope_api.init(association, init_args.clone()))
        .await
        .unwrap();

    assert_eq!(server.state().await, SessionState::Associated);
    assert_eq!(view.ready.load(Ordering::SeqCst), 1);
}

// ============================================================================
// Teardown
// ============================================================================

#[tokio::test]
async fn test_teardown_rejects_every_pending_call() {
    let ((host, host_inbox), (_envelope, mut envelope_inbox)) = window_pair(HOST, ENVELOPE, 64);
    let server = EnvelopeServer::with_id("s1", Arc::new(host), config());
    server.run(host_inbox);

    let mut calls = Vec::new();
    for method in ["a", "b", "c"] {
        let bus = server.bus().clone();
        calls.push(tokio::spawn(async move { bus.request(method, vec![]).await }));
    }
    for _ in 0..3 {
        envelope_inbox.recv().await.unwrap();
    }
    assert_eq!(server.bus().pending_count(), 3);

    server.teardown().await;

    for call in calls {
        assert!(call.await.unwrap().unwrap_err().is_torn_down());
    }
    assert_eq!(server.bus().pending_count(), 0);
    assert!(server.bus().request("d", vec![]).await.unwrap_err().is_torn_down());
    assert_eq!(server.state().await, SessionState::TornDown);
}

#[tokio::test]
async fn test_closed_transport_tears_client_down() {
    let ((host, host_inbox), (envelope, envelope_inbox)) = window_pair(HOST, ENVELOPE, 64);
    let client = EnvelopeClient::new(Arc::new(envelope));
    let receiver = client.run(envelope_inbox);

    // Host side goes away entirely
    drop(host);
    drop(host_inbox);

    timeout(Duration::from_secs(2), receiver).await.unwrap().ok();
    assert_eq!(client.state().await, SessionState::TornDown);
}

// ============================================================================
// WebSocket transport
// ============================================================================

#[tokio::test]
async fn test_full_session_over_websocket() {
    use tokio_tungstenite::tungstenite::protocol::Role;
    use tokio_tungstenite::WebSocketStream;

    let (a, b) = tokio::io::duplex(64 * 1024);
    let host_ws = WebSocketStream::from_raw_socket(a, Role::Server, None).await;
    let envelope_ws = WebSocketStream::from_raw_socket(b, Role::Client, None).await;
    let (host, host_inbox, _host_reader) = WebSocketTransport::from_stream(host_ws, HOST, 64);
    let (envelope, envelope_inbox, _envelope_reader) = WebSocketTransport::from_stream(envelope_ws, ENVELOPE, 64);

    let driver = seeded_driver().await;
    let server = EnvelopeServer::new(Arc::new(host), config());
    server.register_channel_api::<ProcessDetailsChannelCall, _>(Arc::new(ProcessDetailsChannelApiImpl::new(
        Arc::clone(&driver),
    )));
    server.run(host_inbox);

    let client = EnvelopeClient::new(Arc::new(envelope));
    let view = Arc::new(RecordingView::default());
    client.register_envelope_api::<ProcessDetailsEnvelopeCall, _>(Arc::new(ProcessDetailsEnvelopeApiImpl::new(
        client.clone(),
        Arc::clone(&view),
    )));
    client.run(envelope_inbox);

    let envelope_api = ProcessDetailsEnvelopeApi::new(server.envelope_api());
    let init_args = ProcessDetailsInitArgs::new(ProcessInstance::new("id-42", "travels", "Travels"));
    server
        .start_init_polling(|association| envelope_api.init(association, init_args.clone()))
        .await
        .unwrap();

    let jobs = view.driver().jobs_query("id-42").await.unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].id, "job-1");

    client.teardown().await;
    server.teardown().await;
}
