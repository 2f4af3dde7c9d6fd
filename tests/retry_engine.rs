use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use netservice_http::{
    CallOptions, FragmentSink, HttpRequest, HttpResponse, HttpService, NetworkConfig,
    NetworkError, NoopProcessor, RequestDescriptor, RequestKind, RouteRegistry, TerminalState,
    Transport, TransportFaultKind, WrapPolicy,
};
use serde_json::{json, Value as JsonValue};
use tokio::{sync::Notify, time::Instant};
use tokio_util::sync::CancellationToken;

const RETRY_DELAY: Duration = Duration::from_millis(100);

#[derive(Default)]
struct Script {
    responses: HashMap<String, VecDeque<HttpResponse>>,
    sent: Vec<(String, Instant)>,
    gate: Option<Arc<Notify>>,
}

/// Replays queued responses per URI path; an empty queue means the host is down.
#[derive(Clone, Default)]
struct ScriptedTransport {
    script: Arc<Mutex<Script>>,
}

impl ScriptedTransport {
    fn respond(&self, path: &str, responses: Vec<HttpResponse>) -> &Self {
        self.script
            .lock()
            .expect("script mutex")
            .responses
            .entry(path.to_owned())
            .or_default()
            .extend(responses);
        self
    }

    fn hold_until(&self, gate: Arc<Notify>) {
        self.script.lock().expect("script mutex").gate = Some(gate);
    }

    fn attempts(&self, path: &str) -> usize {
        self.send_times(path).len()
    }

    fn send_times(&self, path: &str) -> Vec<Instant> {
        self.script
            .lock()
            .expect("script mutex")
            .sent
            .iter()
            .filter(|(uri, _)| uri.ends_with(path))
            .map(|(_, at)| *at)
            .collect()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: HttpRequest) -> HttpResponse {
        let (next, gate) = {
            let mut script = self.script.lock().expect("script mutex");
            script.sent.push((request.uri.clone(), Instant::now()));
            let path = request
                .uri
                .strip_prefix(HOST)
                .unwrap_or(&request.uri)
                .to_owned();
            let next = script
                .responses
                .get_mut(&path)
                .and_then(VecDeque::pop_front);
            (next, script.gate.clone())
        };
        if let Some(gate) = gate {
            gate.notified().await;
        }
        next.unwrap_or_else(refused)
    }

    async fn stream(&self, _request: HttpRequest, _sink: &mut dyn FragmentSink) -> HttpResponse {
        HttpResponse::failed(TerminalState::Aborted, "streaming is not scripted")
    }
}

const HOST: &str = "http://scripted";

fn refused() -> HttpResponse {
    HttpResponse::failed(TerminalState::Error, "connection refused")
}

fn ok(body: JsonValue) -> HttpResponse {
    HttpResponse::finished(200, body.to_string().into_bytes())
}

struct Ping;
impl RequestKind for Ping {
    type Payload = ();
    type Output = JsonValue;
}

struct Pong;
impl RequestKind for Pong {
    type Payload = ();
    type Output = JsonValue;
}

struct Critical;
impl RequestKind for Critical {
    type Payload = ();
    type Output = JsonValue;
}

fn routes() -> RouteRegistry {
    RouteRegistry::builder()
        .route::<Ping, _, _>(RequestDescriptor::post("/ping"), || NoopProcessor)
        .route::<Pong, _, _>(RequestDescriptor::post("/pong"), || NoopProcessor)
        .route::<Critical, _, _>(
            RequestDescriptor::post("/critical").with_max_retries(1),
            || NoopProcessor,
        )
        .build()
        .expect("routes must be valid")
}

fn service(transport: &ScriptedTransport, max_retries: u32, allow_retry: bool) -> HttpService {
    let mut config = NetworkConfig::new(HOST);
    config.max_retries = max_retries;
    config.allow_retry = allow_retry;
    config.retry_delay_ms = RETRY_DELAY.as_millis() as u64;
    HttpService::new(config, routes())
        .with_transport(transport.clone())
        .with_wrap_policy(WrapPolicy::RAW)
}

#[tokio::test(start_paused = true)]
async fn persistent_connection_failure_makes_max_retries_plus_one_attempts() {
    let transport = ScriptedTransport::default();
    let http = service(&transport, 3, true);

    let err = http.send::<Ping>(&()).await.expect_err("must exhaust");

    match err {
        NetworkError::ConnectivityExhausted { attempts, message, .. } => {
            assert_eq!(attempts, 4);
            assert_eq!(message, "connection refused");
        }
        other => panic!("expected connectivity exhaustion, got {other:?}"),
    }

    let times = transport.send_times("/ping");
    assert_eq!(times.len(), 4);
    for pair in times.windows(2) {
        let gap = pair[1] - pair[0];
        assert!(gap >= RETRY_DELAY && gap <= RETRY_DELAY + Duration::from_millis(1));
    }
    assert!(!http.connection().has_internet());
    assert!(!http.connection().is_in_flight());
}

#[tokio::test(start_paused = true)]
async fn disallowed_retry_makes_a_single_attempt() {
    let transport = ScriptedTransport::default();
    let http = service(&transport, 5, false);

    let err = http.send::<Ping>(&()).await.expect_err("must fail");

    assert!(err.is_connectivity());
    assert_eq!(transport.attempts("/ping"), 1);
}

#[tokio::test(start_paused = true)]
async fn descriptor_budget_overrides_configured_retries() {
    let transport = ScriptedTransport::default();
    let http = service(&transport, 5, true);

    http.send::<Critical>(&()).await.expect_err("must fail");

    assert_eq!(transport.attempts("/critical"), 2);
}

#[tokio::test(start_paused = true)]
async fn recovery_after_transient_failures_restores_connectivity() {
    let transport = ScriptedTransport::default();
    transport.respond("/ping", vec![refused(), refused(), ok(json!({"pong": true}))]);
    let http = service(&transport, 3, true);

    let outcome = http.send::<Ping>(&()).await.expect("must recover");

    assert_eq!(outcome.success(), Some(json!({"pong": true})));
    assert_eq!(transport.attempts("/ping"), 3);
    assert!(http.connection().has_internet());
}

#[tokio::test(start_paused = true)]
async fn connectivity_flag_follows_latest_outcome() {
    let transport = ScriptedTransport::default();
    let http = service(&transport, 0, true);

    http.send::<Ping>(&()).await.expect_err("must fail");
    assert!(!http.connection().has_internet());

    transport.respond("/ping", vec![ok(json!(null))]);
    http.send::<Ping>(&()).await.expect("must succeed");
    assert!(http.connection().has_internet());
}

#[tokio::test(start_paused = true)]
async fn concurrent_calls_keep_separate_retry_budgets() {
    let transport = ScriptedTransport::default();
    transport
        .respond("/ping", vec![refused(), refused(), refused(), ok(json!("ping"))])
        .respond("/pong", vec![refused(), refused(), refused(), ok(json!("pong"))]);
    let http = service(&transport, 3, true);

    let (ping, pong) = tokio::join!(http.send::<Ping>(&()), http.send::<Pong>(&()));

    assert_eq!(ping.expect("ping").success(), Some(json!("ping")));
    assert_eq!(pong.expect("pong").success(), Some(json!("pong")));
    assert_eq!(transport.attempts("/ping"), 4);
    assert_eq!(transport.attempts("/pong"), 4);
}

#[tokio::test(start_paused = true)]
async fn concurrent_calls_of_the_same_kind_do_not_alias() {
    let transport = ScriptedTransport::default();
    transport.respond(
        "/ping",
        vec![
            refused(),
            refused(),
            refused(),
            refused(),
            ok(json!(1)),
            ok(json!(2)),
        ],
    );
    let http = service(&transport, 2, true);

    let (first, second) = tokio::join!(http.send::<Ping>(&()), http.send::<Ping>(&()));

    assert!(first.expect("first").is_success());
    assert!(second.expect("second").is_success());
    assert_eq!(transport.attempts("/ping"), 6);
}

#[tokio::test(start_paused = true)]
async fn cancellation_during_backoff_ends_the_call() {
    let transport = ScriptedTransport::default();
    let http = service(&transport, 10, true);
    let token = CancellationToken::new();

    let canceller = {
        let token = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(RETRY_DELAY / 2).await;
            token.cancel();
        })
    };

    let err = http
        .send_with::<Ping>(&(), &CallOptions::new().cancel_on(token))
        .await
        .expect_err("must be cancelled");
    canceller.await.expect("canceller task");

    assert!(matches!(err, NetworkError::Cancelled));
    assert_eq!(transport.attempts("/ping"), 1);
    assert!(!http.connection().is_in_flight());
}

#[tokio::test(start_paused = true)]
async fn cancellation_during_a_pending_exchange_ends_the_call() {
    let transport = ScriptedTransport::default();
    transport.hold_until(Arc::new(Notify::new()));
    transport.respond("/ping", vec![ok(json!(true))]);
    let http = service(&transport, 3, true);
    let token = CancellationToken::new();
    let mut in_flight = http.connection().subscribe_in_flight();

    let canceller = {
        let token = token.clone();
        tokio::spawn(async move {
            in_flight
                .wait_for(|flag| *flag)
                .await
                .expect("in-flight sender alive");
            token.cancel();
        })
    };

    let err = http
        .send_with::<Ping>(&(), &CallOptions::new().cancel_on(token))
        .await
        .expect_err("must be cancelled");
    canceller.await.expect("canceller task");

    assert!(matches!(err, NetworkError::Cancelled));
    assert_eq!(transport.attempts("/ping"), 1);
    assert!(!http.connection().is_in_flight());
    assert!(http.connection().has_internet());
}

#[tokio::test(start_paused = true)]
async fn timeouts_and_aborts_are_not_retried() {
    let transport = ScriptedTransport::default();
    transport.respond(
        "/ping",
        vec![HttpResponse::failed(TerminalState::TimedOut, "deadline")],
    );
    transport.respond(
        "/pong",
        vec![HttpResponse::failed(TerminalState::Aborted, "reset")],
    );
    let http = service(&transport, 3, true);

    match http.send::<Ping>(&()).await.expect_err("must fail") {
        NetworkError::TransportFault { kind, .. } => assert_eq!(kind, TransportFaultKind::TimedOut),
        other => panic!("expected transport fault, got {other:?}"),
    }
    match http.send::<Pong>(&()).await.expect_err("must fail") {
        NetworkError::TransportFault { kind, .. } => assert_eq!(kind, TransportFaultKind::Aborted),
        other => panic!("expected transport fault, got {other:?}"),
    }
    assert_eq!(transport.attempts("/ping"), 1);
    assert_eq!(transport.attempts("/pong"), 1);
}

#[tokio::test]
async fn in_flight_flag_is_raised_while_a_call_is_pending() {
    let transport = ScriptedTransport::default();
    let gate = Arc::new(Notify::new());
    transport.hold_until(Arc::clone(&gate));
    transport.respond("/ping", vec![ok(json!(true))]);
    let http = service(&transport, 0, true);
    let mut in_flight = http.connection().subscribe_in_flight();

    let call = tokio::spawn({
        let http = http.clone();
        async move { http.send::<Ping>(&()).await }
    });

    in_flight
        .wait_for(|flag| *flag)
        .await
        .expect("in-flight sender alive");
    assert!(http.connection().is_in_flight());

    gate.notify_one();
    call.await.expect("call task").expect("call");
    assert!(!http.connection().is_in_flight());
}

#[cfg(feature = "fake-data")]
#[tokio::test]
async fn fake_response_skips_the_transport() {
    let transport = ScriptedTransport::default();
    let routes = RouteRegistry::builder()
        .route::<Ping, _, _>(RequestDescriptor::post("/ping"), || NoopProcessor)
        .fake_response::<Ping, _>(|| json!({"fake": true}))
        .build()
        .expect("routes must be valid");
    let http = HttpService::new(NetworkConfig::new(HOST), routes).with_transport(transport.clone());

    let outcome = http.send::<Ping>(&()).await.expect("fake call");

    assert_eq!(outcome.success(), Some(json!({"fake": true})));
    assert_eq!(transport.attempts("/ping"), 0);
}
