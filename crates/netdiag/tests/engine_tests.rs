//! End-to-end probe flows against scripted collaborators.
//!
//! The resolver and transport here hold on to their callbacks so each test
//! decides exactly when and in which order the network stack answers.

use netdiag::{
    Delivery, EchoCallback, EchoEvent, EchoReply, EchoTransport, Ipv4Address, LookupCallback,
    NameResolver, PingEngine, PingResponse, ProbeConfig, ProbeFailure, ProbeSummary, ResolveError,
    ResultSink, SessionState, SessionToken, TransportError,
};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

/// Resolver that parks every lookup until the test answers it.
#[derive(Default)]
struct ScriptedResolver {
    pending: Mutex<Vec<(String, LookupCallback)>>,
}

impl ScriptedResolver {
    fn answer(&self, name: &str, answer: Option<Ipv4Address>) {
        let done = {
            let mut pending = self.pending.lock();
            let pos = pending
                .iter()
                .position(|(n, _)| n == name)
                .expect("no pending lookup");
            pending.remove(pos).1
        };
        done(answer);
    }

    fn pending(&self) -> usize {
        self.pending.lock().len()
    }
}

impl NameResolver for ScriptedResolver {
    fn resolve_name(&self, name: &str, done: LookupCallback) {
        self.pending.lock().push((name.to_string(), done));
    }
}

struct Sent {
    target: Ipv4Address,
    count: u32,
    token: SessionToken,
    on_event: EchoCallback,
}

/// Transport that records each send and lets the test fire events.
#[derive(Default)]
struct RecordingTransport {
    sent: Mutex<Vec<Sent>>,
    refuse: Mutex<Option<TransportError>>,
}

impl RecordingTransport {
    fn sends(&self) -> Vec<(Ipv4Address, u32, SessionToken)> {
        self.sent
            .lock()
            .iter()
            .map(|s| (s.target, s.count, s.token))
            .collect()
    }

    fn fire(&self, token: SessionToken, event: EchoEvent) {
        let on_event = {
            let sent = self.sent.lock();
            let send = sent
                .iter()
                .find(|s| s.token == token)
                .expect("no send for token");
            Arc::clone(&send.on_event)
        };
        on_event(token, event);
    }
}

impl EchoTransport for RecordingTransport {
    fn send_echo_request(
        &self,
        target: Ipv4Address,
        count: u32,
        token: SessionToken,
        on_event: EchoCallback,
    ) -> Result<(), TransportError> {
        if let Some(e) = self.refuse.lock().clone() {
            return Err(e);
        }
        self.sent.lock().push(Sent {
            target,
            count,
            token,
            on_event,
        });
        Ok(())
    }
}

#[derive(Default)]
struct Recorder {
    deliveries: Mutex<Vec<Delivery>>,
    summaries: Mutex<Vec<ProbeSummary>>,
}

impl Recorder {
    fn deliveries(&self) -> Vec<Delivery> {
        self.deliveries.lock().clone()
    }

    fn seqnos(&self) -> Vec<u16> {
        self.deliveries
            .lock()
            .iter()
            .filter_map(|d| match d {
                Delivery::Reply(r) => Some(r.seqno),
                Delivery::Failure(_) => None,
            })
            .collect()
    }
}

impl ResultSink for Recorder {
    fn deliver(&self, delivery: &Delivery) {
        self.deliveries.lock().push(delivery.clone());
    }

    fn on_complete(&self, summary: &ProbeSummary) {
        self.summaries.lock().push(*summary);
    }
}

struct Harness {
    engine: PingEngine,
    resolver: Arc<ScriptedResolver>,
    transport: Arc<RecordingTransport>,
    fallback: Arc<Recorder>,
}

fn harness() -> Harness {
    let resolver = Arc::new(ScriptedResolver::default());
    let transport = Arc::new(RecordingTransport::default());
    let fallback = Arc::new(Recorder::default());
    let engine = PingEngine::with_fallback(
        Arc::clone(&resolver) as Arc<dyn NameResolver>,
        Arc::clone(&transport) as Arc<dyn EchoTransport>,
        ProbeConfig::default(),
        Arc::clone(&fallback) as Arc<dyn ResultSink>,
    );
    Harness {
        engine,
        resolver,
        transport,
        fallback,
    }
}

fn reply(seqno: u16, ttl: u8, rtt_ms: u32) -> EchoEvent {
    EchoEvent::Reply(EchoReply {
        bytes: 32,
        seqno,
        ttl,
        rtt_ms,
    })
}

const TARGET: Ipv4Address = Ipv4Address::new(192, 168, 4, 1);

#[test]
fn test_literal_single_reply() {
    let h = harness();
    let token = h.engine.ping("192.168.4.1", Some(1), None).unwrap();

    assert_eq!(h.resolver.pending(), 0);
    assert_eq!(h.transport.sends(), vec![(TARGET, 1, token)]);
    assert_eq!(h.engine.session_state(token), Some(SessionState::Active));

    h.transport.fire(token, reply(0, 255, 12));

    assert_eq!(
        h.fallback.deliveries(),
        vec![Delivery::Reply(PingResponse {
            bytes: 32,
            source: TARGET,
            seqno: 0,
            ttl: 255,
            rtt_ms: 12,
        })]
    );
    assert_eq!(h.engine.session_state(token), Some(SessionState::Complete));
    assert_eq!(h.engine.active_sessions(), 0);
}

#[test]
fn test_out_of_order_replies() {
    let h = harness();
    let token = h.engine.ping("10.0.0.1", Some(3), None).unwrap();

    for seqno in [0, 2, 1] {
        h.transport.fire(token, reply(seqno, 64, 5));
    }

    assert_eq!(h.fallback.seqnos(), vec![0, 2, 1]);
    assert_eq!(h.engine.session_state(token), Some(SessionState::Complete));

    let summaries = h.fallback.summaries.lock().clone();
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].transmitted, 3);
    assert_eq!(summaries[0].received, 3);
}

#[test]
fn test_stale_reply_after_complete() {
    let h = harness();
    let token = h.engine.ping("10.0.0.1", Some(1), None).unwrap();

    h.transport.fire(token, reply(0, 64, 5));
    h.transport.fire(token, reply(0, 64, 5));
    h.transport.fire(token, reply(1, 64, 5));

    assert_eq!(h.fallback.deliveries().len(), 1);
    assert_eq!(h.engine.session_state(token), Some(SessionState::Complete));
}

#[test]
fn test_timeouts_are_not_delivered() {
    let h = harness();
    let token = h.engine.ping("10.0.0.1", Some(2), None).unwrap();

    h.transport.fire(token, EchoEvent::Timeout { seqno: 0 });
    assert!(h.fallback.deliveries().is_empty());
    assert_eq!(h.engine.session_state(token), Some(SessionState::Active));

    h.transport.fire(token, reply(1, 64, 9));
    assert_eq!(h.fallback.seqnos(), vec![1]);
    assert_eq!(h.engine.session_state(token), Some(SessionState::Complete));

    let summary = h.fallback.summaries.lock()[0];
    assert_eq!(summary.lost(), 1);
    assert_eq!(summary.loss_percent(), 50);
}

#[test]
fn test_unrequested_seqno_does_not_complete() {
    let h = harness();
    let token = h.engine.ping("10.0.0.1", Some(2), None).unwrap();

    h.transport.fire(token, reply(0, 64, 5));
    h.transport.fire(token, reply(7, 64, 5));
    assert_eq!(h.engine.session_state(token), Some(SessionState::Active));

    h.transport.fire(token, reply(1, 64, 5));
    assert_eq!(h.fallback.seqnos(), vec![0, 1]);
    assert_eq!(h.engine.session_state(token), Some(SessionState::Complete));
}

#[test]
fn test_literal_no_address_is_not_pinged() {
    let h = harness();
    let broadcast = h.engine.ping("255.255.255.255", Some(3), None).unwrap();
    let unspecified = h.engine.ping("0.0.0.0", None, None).unwrap();

    assert!(h.transport.sends().is_empty());
    assert_eq!(h.resolver.pending(), 0);
    assert_eq!(
        h.fallback.deliveries(),
        vec![
            Delivery::Failure(ProbeFailure::new("255.255.255.255", ResolveError::NoSuchHost)),
            Delivery::Failure(ProbeFailure::new("0.0.0.0", ResolveError::NoSuchHost)),
        ]
    );
    assert_eq!(h.engine.session_state(broadcast), Some(SessionState::Failed));
    assert_eq!(h.engine.session_state(unspecified), Some(SessionState::Failed));
    assert_eq!(h.engine.active_sessions(), 0);
}

#[test]
fn test_target_whitespace_is_trimmed() {
    let h = harness();
    let token = h.engine.ping("  10.0.0.1 ", Some(1), None).unwrap();

    assert_eq!(h.resolver.pending(), 0);
    assert_eq!(
        h.transport.sends(),
        vec![(Ipv4Address::new(10, 0, 0, 1), 1, token)]
    );

    h.engine.ping("\tgateway.local\n", Some(1), None).unwrap();
    h.resolver.answer("gateway.local", None);
    assert_eq!(
        h.fallback.deliveries(),
        vec![Delivery::Failure(ProbeFailure::new(
            "gateway.local",
            ResolveError::NoResponse
        ))]
    );
}

#[test]
fn test_hostname_resolves_then_sends() {
    let h = harness();
    let token = h.engine.ping("gateway.local", Some(2), None).unwrap();

    assert_eq!(
        h.engine.session_state(token),
        Some(SessionState::PendingResolution)
    );
    assert!(h.transport.sends().is_empty());

    h.resolver.answer("gateway.local", Some(TARGET));
    assert_eq!(h.transport.sends(), vec![(TARGET, 2, token)]);
    assert_eq!(h.engine.session_state(token), Some(SessionState::Active));

    h.transport.fire(token, reply(1, 64, 3));
    h.transport.fire(token, reply(0, 64, 4));

    let deliveries = h.fallback.deliveries();
    assert_eq!(deliveries.len(), 2);
    for delivery in deliveries {
        match delivery {
            Delivery::Reply(r) => assert_eq!(r.source, TARGET),
            Delivery::Failure(f) => panic!("unexpected failure {}", f),
        }
    }
}

#[test]
fn test_hostname_failure_reported_once() {
    let h = harness();
    let no_response = h.engine.ping("down.local", None, None).unwrap();
    let no_host = h.engine.ping("nohost.local", None, None).unwrap();

    h.resolver.answer("down.local", None);
    h.resolver.answer("nohost.local", Some(Ipv4Address::UNSPECIFIED));

    assert!(h.transport.sends().is_empty());
    assert_eq!(
        h.fallback.deliveries(),
        vec![
            Delivery::Failure(ProbeFailure::new("down.local", ResolveError::NoResponse)),
            Delivery::Failure(ProbeFailure::new("nohost.local", ResolveError::NoSuchHost)),
        ]
    );
    assert_eq!(
        h.engine.session_state(no_response),
        Some(SessionState::Failed)
    );
    assert_eq!(h.engine.session_state(no_host), Some(SessionState::Failed));
    assert!(h.fallback.summaries.lock().is_empty());
}

#[test]
fn test_transport_refusal_fails_session() {
    let h = harness();
    *h.transport.refuse.lock() = Some(TransportError::Send("no route".to_string()));

    let token = h.engine.ping("10.0.0.9", Some(2), None).unwrap();

    assert_eq!(
        h.fallback.deliveries(),
        vec![Delivery::Failure(ProbeFailure::new(
            "10.0.0.9",
            TransportError::Send("no route".to_string())
        ))]
    );
    assert_eq!(h.engine.session_state(token), Some(SessionState::Failed));
    assert_eq!(h.engine.active_sessions(), 0);
}

#[test]
fn test_reregister_handler_mid_session() {
    let h = harness();
    let first = Arc::new(Recorder::default());
    let second = Arc::new(Recorder::default());

    assert!(h
        .engine
        .register_handler(Some(Arc::clone(&first) as Arc<dyn ResultSink>))
        .is_none());
    let token = h.engine.ping("10.0.0.1", Some(3), None).unwrap();

    h.transport.fire(token, reply(0, 64, 1));
    let previous = h
        .engine
        .register_handler(Some(Arc::clone(&second) as Arc<dyn ResultSink>));
    assert!(previous.is_some());
    h.transport.fire(token, reply(1, 64, 1));
    h.transport.fire(token, reply(2, 64, 1));

    assert_eq!(first.seqnos(), vec![0]);
    assert_eq!(second.seqnos(), vec![1, 2]);
    assert!(h.fallback.deliveries().is_empty());

    // Unregistering falls back to the default renderer.
    h.engine.register_handler(None);
    let token = h.engine.ping("10.0.0.2", Some(1), None).unwrap();
    h.transport.fire(token, reply(0, 64, 1));
    assert_eq!(h.fallback.seqnos(), vec![0]);
}

/// Holds its first delivery until the test lets it go.
struct GatedRecorder {
    entered: Barrier,
    release: Barrier,
    seen: Recorder,
}

impl ResultSink for GatedRecorder {
    fn deliver(&self, delivery: &Delivery) {
        let first = self.seen.deliveries.lock().is_empty();
        if first {
            self.entered.wait();
            self.release.wait();
        }
        self.seen.deliver(delivery);
    }
}

#[test]
fn test_reregister_during_delivery() {
    let h = harness();
    let old = Arc::new(GatedRecorder {
        entered: Barrier::new(2),
        release: Barrier::new(2),
        seen: Recorder::default(),
    });
    let new = Arc::new(Recorder::default());
    h.engine
        .register_handler(Some(Arc::clone(&old) as Arc<dyn ResultSink>));
    let token = h.engine.ping("10.0.0.1", Some(2), None).unwrap();

    let transport = Arc::clone(&h.transport);
    let delivering = thread::spawn(move || transport.fire(token, reply(0, 64, 1)));

    // The first delivery is now parked inside the old handler.
    old.entered.wait();
    let previous = h
        .engine
        .register_handler(Some(Arc::clone(&new) as Arc<dyn ResultSink>))
        .unwrap();
    assert!(Arc::ptr_eq(
        &previous,
        &(Arc::clone(&old) as Arc<dyn ResultSink>)
    ));
    old.release.wait();
    delivering.join().unwrap();

    h.transport.fire(token, reply(1, 64, 1));

    assert_eq!(old.seen.seqnos(), vec![0]);
    assert_eq!(new.seqnos(), vec![1]);
    assert!(h.fallback.deliveries().is_empty());
}

#[test]
fn test_session_handler_wins_over_registered() {
    let h = harness();
    let registered = Arc::new(Recorder::default());
    let own = Arc::new(Recorder::default());
    h.engine
        .register_handler(Some(Arc::clone(&registered) as Arc<dyn ResultSink>));

    let a = h
        .engine
        .ping("10.0.0.1", Some(1), Some(Arc::clone(&own) as Arc<dyn ResultSink>))
        .unwrap();
    let b = h.engine.ping("10.0.0.2", Some(1), None).unwrap();

    h.transport.fire(b, reply(0, 64, 2));
    h.transport.fire(a, reply(0, 64, 1));

    assert_eq!(own.deliveries().len(), 1);
    assert_eq!(registered.deliveries().len(), 1);
    match &own.deliveries()[0] {
        Delivery::Reply(r) => assert_eq!(r.source, Ipv4Address::new(10, 0, 0, 1)),
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_sink_may_reenter_engine() {
    let h = harness();
    let engine = h.engine.clone();
    let started = Arc::new(Mutex::new(Vec::new()));
    let started_by_sink = Arc::clone(&started);

    // Starting a follow-up probe from inside a delivery must not deadlock.
    let handler: Arc<dyn ResultSink> = Arc::new(move |d: &Delivery| {
        if let Delivery::Reply(r) = d {
            if r.seqno == 0 {
                let token = engine.ping("10.0.0.3", Some(1), None).unwrap();
                started_by_sink.lock().push(token);
            }
        }
    });

    let token = h.engine.ping("10.0.0.1", Some(1), Some(handler)).unwrap();
    h.transport.fire(token, reply(0, 64, 1));

    assert_eq!(started.lock().len(), 1);
    assert_eq!(h.transport.sends().len(), 2);
}

#[tokio::test]
async fn test_idle_waits_for_all_sessions() {
    let h = harness();
    h.engine.idle().await;

    let token = h.engine.ping("10.0.0.1", Some(2), None).unwrap();
    h.engine.ping("late.local", Some(1), None).unwrap();

    let transport = Arc::clone(&h.transport);
    let resolver = Arc::clone(&h.resolver);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        transport.fire(token, reply(0, 64, 1));
        transport.fire(token, EchoEvent::Timeout { seqno: 1 });
        resolver.answer("late.local", None);
    });

    tokio::time::timeout(Duration::from_secs(5), h.engine.idle())
        .await
        .expect("engine never went idle");
    assert_eq!(h.engine.active_sessions(), 0);
    assert_eq!(h.fallback.deliveries().len(), 2);
}
