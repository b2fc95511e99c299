//! Ping engine.
//!
//! Accepts probe requests, resolves hostname targets, drives the echo
//! primitive and routes every reply back to the session that caused it.
//!
//! The engine is purely reactive. `ping` returns as soon as the work is
//! handed to the resolver or the echo primitive; everything afterwards runs
//! inside their completion callbacks. No lock is held while a collaborator or
//! a sink is called, so both may call back into the engine synchronously.

use netdiag_types::Ipv4Address;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::watch;
use tracing::{debug, info, instrument, trace, warn};

use crate::config::{defaults, ProbeConfig};
use crate::echo::{EchoCallback, EchoEvent, EchoTransport, SessionToken};
use crate::error::{ProbeError, ProbeFailure, ProbeFailureKind, ResolveError};
use crate::resolver::{NameResolver, ResolverAdapter};
use crate::session::{Advance, PingSession, SessionState};
use crate::sink::{Delivery, ResultSink, SinkSlot, TextSink};

/// Terminal states remembered for [`PingEngine::session_state`].
const FINISHED_HISTORY: usize = 64;

/// A probe request as received from the caller.
#[derive(Clone)]
pub struct PingRequest {
    /// Literal IPv4 address or hostname.
    pub target: String,
    /// Number of echo requests; the configured default when `None`.
    pub count: Option<u32>,
    /// Handler for this probe's results only.
    pub handler: Option<Arc<dyn ResultSink>>,
}

impl PingRequest {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            count: None,
            handler: None,
        }
    }

    pub fn with_count(mut self, count: u32) -> Self {
        self.count = Some(count);
        self
    }

    pub fn with_handler(mut self, handler: Arc<dyn ResultSink>) -> Self {
        self.handler = Some(handler);
        self
    }
}

impl std::fmt::Debug for PingRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PingRequest")
            .field("target", &self.target)
            .field("count", &self.count)
            .field("handler", &self.handler.is_some())
            .finish()
    }
}

/// Asynchronous ICMP echo prober. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct PingEngine {
    inner: Arc<Inner>,
}

struct Inner {
    resolver: ResolverAdapter,
    transport: Arc<dyn EchoTransport>,
    config: ProbeConfig,
    sessions: Mutex<Sessions>,
    next_token: AtomicU64,
    handler: SinkSlot,
    fallback: Arc<dyn ResultSink>,
    active: watch::Sender<usize>,
}

#[derive(Default)]
struct Sessions {
    live: HashMap<SessionToken, PingSession>,
    finished: VecDeque<(SessionToken, SessionState)>,
}

impl Sessions {
    fn retire(&mut self, session: &PingSession) {
        if self.finished.len() == FINISHED_HISTORY {
            self.finished.pop_front();
        }
        self.finished.push_back((session.token(), session.state()));
    }

    fn finished_state(&self, token: SessionToken) -> Option<SessionState> {
        self.finished
            .iter()
            .rev()
            .find(|(t, _)| *t == token)
            .map(|(_, state)| *state)
    }
}

impl PingEngine {
    /// Creates an engine whose unhandled results are printed to stdout.
    pub fn new(
        resolver: Arc<dyn NameResolver>,
        transport: Arc<dyn EchoTransport>,
        config: ProbeConfig,
    ) -> Self {
        Self::with_fallback(resolver, transport, config, Arc::new(TextSink::stdout()))
    }

    /// Creates an engine that renders unhandled results through `fallback`.
    pub fn with_fallback(
        resolver: Arc<dyn NameResolver>,
        transport: Arc<dyn EchoTransport>,
        config: ProbeConfig,
        fallback: Arc<dyn ResultSink>,
    ) -> Self {
        let (active, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                resolver: ResolverAdapter::new(resolver),
                transport,
                config,
                sessions: Mutex::new(Sessions::default()),
                next_token: AtomicU64::new(1),
                handler: SinkSlot::new(),
                fallback,
                active,
            }),
        }
    }

    /// Starts a probe. See [`PingEngine::start_probe`].
    pub fn ping(
        &self,
        target: &str,
        count: Option<u32>,
        handler: Option<Arc<dyn ResultSink>>,
    ) -> Result<SessionToken, ProbeError> {
        self.start_probe(PingRequest {
            target: target.to_string(),
            count,
            handler,
        })
    }

    /// Validates `request` and starts it without waiting for any result.
    ///
    /// Input errors are returned here and nothing is started. Every later
    /// outcome goes to the request's handler, else the registered handler,
    /// else the fallback renderer.
    ///
    /// Surrounding whitespace in the target is ignored. A literal "no
    /// address" (`0.0.0.0`, `255.255.255.255`) is never pinged; it fails the
    /// session the same way an unresolvable hostname does.
    #[instrument(skip(self, request), fields(target = %request.target))]
    pub fn start_probe(&self, request: PingRequest) -> Result<SessionToken, ProbeError> {
        let target = request.target.trim();
        if target.is_empty() {
            return Err(ProbeError::EmptyTarget);
        }
        let count = request.count.unwrap_or(self.inner.config.default_count);
        if count == 0 || count > defaults::MAX_PING_COUNT {
            return Err(ProbeError::InvalidCount(count));
        }

        let token = SessionToken::new(self.inner.next_token.fetch_add(1, Ordering::Relaxed));

        match target.parse::<Ipv4Address>() {
            Ok(address) if address.is_none_marker() => {
                info!(%token, %address, "Probe target is not a usable address");
                self.inner
                    .insert(PingSession::pending(token, target, count, request.handler));
                self.inner.fail(token, ResolveError::NoSuchHost.into());
            }
            Ok(address) => {
                info!(%token, %address, count, "Starting probe");
                self.inner.insert(PingSession::active(
                    token,
                    target,
                    address,
                    count,
                    request.handler,
                ));
                self.inner.dispatch(token, address, count);
            }
            Err(_) => {
                info!(%token, count, "Resolving probe target");
                self.inner
                    .insert(PingSession::pending(token, target, count, request.handler));
                let weak = Arc::downgrade(&self.inner);
                self.inner.resolver.resolve(target, move |result| {
                    if let Some(inner) = weak.upgrade() {
                        inner.on_resolved(token, result);
                    }
                });
            }
        }

        Ok(token)
    }

    /// Replaces the handler used by sessions started without their own,
    /// returning the previous one. Deliveries already underway finish
    /// against the handler they started with.
    pub fn register_handler(
        &self,
        handler: Option<Arc<dyn ResultSink>>,
    ) -> Option<Arc<dyn ResultSink>> {
        debug!(installed = handler.is_some(), "Registering result handler");
        self.inner.handler.register(handler)
    }

    /// State of a live or recently finished session.
    pub fn session_state(&self, token: SessionToken) -> Option<SessionState> {
        let sessions = self.inner.sessions.lock();
        match sessions.live.get(&token) {
            Some(session) => Some(session.state()),
            None => sessions.finished_state(token),
        }
    }

    /// Sessions still waiting for resolution or replies.
    pub fn active_sessions(&self) -> usize {
        self.inner.sessions.lock().live.len()
    }

    /// Resolves once no session is pending or active.
    pub async fn idle(&self) {
        let mut rx = self.inner.active.subscribe();
        // The sender lives in `inner`, so this only ends on a zero count.
        let _ = rx.wait_for(|active| *active == 0).await;
    }

    pub fn config(&self) -> &ProbeConfig {
        &self.inner.config
    }
}

impl Inner {
    fn insert(&self, session: PingSession) {
        let mut sessions = self.sessions.lock();
        sessions.live.insert(session.token(), session);
        self.active.send_replace(sessions.live.len());
    }

    fn sink_for(&self, session: &PingSession) -> Arc<dyn ResultSink> {
        session
            .sink()
            .cloned()
            .or_else(|| self.handler.current())
            .unwrap_or_else(|| Arc::clone(&self.fallback))
    }

    fn dispatch(self: &Arc<Self>, token: SessionToken, address: Ipv4Address, count: u32) {
        let weak: Weak<Inner> = Arc::downgrade(self);
        let on_event: EchoCallback = Arc::new(move |token: SessionToken, event: EchoEvent| {
            if let Some(inner) = weak.upgrade() {
                inner.on_echo(token, event);
            }
        });

        debug!(%token, %address, count, "Sending echo requests");
        if let Err(e) = self
            .transport
            .send_echo_request(address, count, token, on_event)
        {
            warn!(%token, error = %e, "Echo request could not be sent");
            self.fail(token, e.into());
        }
    }

    fn on_resolved(self: &Arc<Self>, token: SessionToken, result: Result<Ipv4Address, ResolveError>) {
        match result {
            Ok(address) => {
                let count = {
                    let mut sessions = self.sessions.lock();
                    let Some(session) = sessions.live.get_mut(&token) else {
                        debug!(%token, "Resolution finished for unknown session");
                        return;
                    };
                    if !session.resolved(address) {
                        debug!(%token, state = %session.state(), "Resolution finished twice");
                        return;
                    }
                    session.total()
                };
                self.dispatch(token, address, count);
            }
            Err(e) => self.fail(token, e.into()),
        }
    }

    /// Drops a session that never got going and reports why, once.
    fn fail(&self, token: SessionToken, kind: ProbeFailureKind) {
        let (failure, sink) = {
            let mut sessions = self.sessions.lock();
            let Some(mut session) = sessions.live.remove(&token) else {
                return;
            };
            session.fail();
            sessions.retire(&session);
            self.active.send_replace(sessions.live.len());
            (
                ProbeFailure::new(session.target(), kind),
                self.sink_for(&session),
            )
        };
        sink.deliver(&Delivery::Failure(failure));
    }

    fn on_echo(&self, token: SessionToken, event: EchoEvent) {
        let (advance, sink, summary) = {
            let mut sessions = self.sessions.lock();
            let Some(session) = sessions.live.get_mut(&token) else {
                match sessions.finished_state(token) {
                    Some(state) => debug!(%token, %state, seqno = event.seqno(), "Discarding stale echo event"),
                    None => debug!(%token, seqno = event.seqno(), "Discarding echo event for unknown session"),
                }
                return;
            };

            let advance = session.advance(event);
            let sink = self.sink_for(session);
            let summary = if advance.completed() {
                let finished = sessions.live.remove(&token);
                self.active.send_replace(sessions.live.len());
                finished.and_then(|session| {
                    sessions.retire(&session);
                    session.summary()
                })
            } else {
                None
            };
            (advance, sink, summary)
        };

        match advance {
            Advance::Reply { response, .. } => {
                trace!(%token, seqno = response.seqno, rtt_ms = response.rtt_ms, "Echo reply");
                sink.deliver(&Delivery::Reply(response));
            }
            Advance::Lost { .. } => trace!(%token, seqno = event.seqno(), "Echo request timed out"),
            Advance::Ignored => debug!(%token, seqno = event.seqno(), "Duplicate or unrequested echo event ignored"),
        }

        if let Some(summary) = summary {
            info!(
                %token,
                target = %summary.target,
                transmitted = summary.transmitted,
                received = summary.received,
                "Probe complete"
            );
            sink.on_complete(&summary);
        }
    }
}
