//! Per-probe bookkeeping and its state machine.
//!
//! ```text
//!  PendingResolution ──resolved──▶ Active ──last seqno settled──▶ Complete
//!          │                        │ ▲
//!          └──failed──▶ Failed      └─┘ reply / timeout
//! ```
//!
//! Literal-address probes start directly in `Active`. A session never leaves
//! `Complete` or `Failed`.

use netdiag_types::Ipv4Address;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use crate::echo::{EchoEvent, EchoReply, SessionToken};
use crate::sink::{PingResponse, ProbeSummary, ResultSink};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    PendingResolution,
    Active,
    Complete,
    Failed,
}

impl SessionState {
    pub const fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Complete | SessionState::Failed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::PendingResolution => "PENDING_RESOLUTION",
            SessionState::Active => "ACTIVE",
            SessionState::Complete => "COMPLETE",
            SessionState::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// What applying one echo event did to a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    /// A new reply to deliver. `done` is set if it was the last outstanding one.
    Reply { response: PingResponse, done: bool },
    /// A sequence number was abandoned without a reply.
    Lost { done: bool },
    /// Duplicate, or the session is not accepting events.
    Ignored,
}

impl Advance {
    pub fn completed(&self) -> bool {
        matches!(
            self,
            Advance::Reply { done: true, .. } | Advance::Lost { done: true }
        )
    }
}

/// State of one outstanding probe request.
pub struct PingSession {
    token: SessionToken,
    /// Target exactly as the caller wrote it.
    target: String,
    address: Option<Ipv4Address>,
    total: u32,
    settled: HashSet<u16>,
    received: u32,
    state: SessionState,
    sink: Option<Arc<dyn ResultSink>>,
}

impl PingSession {
    /// A session for a literal address, ready to send.
    pub fn active(
        token: SessionToken,
        target: impl Into<String>,
        address: Ipv4Address,
        count: u32,
        sink: Option<Arc<dyn ResultSink>>,
    ) -> Self {
        let mut session = Self::pending(token, target, count, sink);
        session.address = Some(address);
        session.state = SessionState::Active;
        session
    }

    /// A session whose target still has to be resolved.
    pub fn pending(
        token: SessionToken,
        target: impl Into<String>,
        count: u32,
        sink: Option<Arc<dyn ResultSink>>,
    ) -> Self {
        Self {
            token,
            target: target.into(),
            address: None,
            total: count,
            settled: HashSet::new(),
            received: 0,
            state: SessionState::PendingResolution,
            sink,
        }
    }

    pub fn token(&self) -> SessionToken {
        self.token
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn address(&self) -> Option<Ipv4Address> {
        self.address
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn total(&self) -> u32 {
        self.total
    }

    /// Requests neither answered nor abandoned yet.
    pub fn outstanding(&self) -> u32 {
        self.total - self.settled.len() as u32
    }

    /// The handler bound to this session, if the caller supplied one.
    pub fn sink(&self) -> Option<&Arc<dyn ResultSink>> {
        self.sink.as_ref()
    }

    /// `PendingResolution -> Active`. Returns false from any other state.
    pub fn resolved(&mut self, address: Ipv4Address) -> bool {
        if self.state != SessionState::PendingResolution {
            return false;
        }
        self.address = Some(address);
        self.state = SessionState::Active;
        true
    }

    /// Moves a non-terminal session to `Failed`.
    pub fn fail(&mut self) {
        if !self.state.is_terminal() {
            self.state = SessionState::Failed;
        }
    }

    /// Applies one reply or timeout.
    ///
    /// Events may arrive in any order. Each sequence number below `total`
    /// counts once; repeats, numbers never requested and anything arriving
    /// outside `Active` are ignored.
    pub fn advance(&mut self, event: EchoEvent) -> Advance {
        let Some(address) = self.address else {
            return Advance::Ignored;
        };
        if u32::from(event.seqno()) >= self.total {
            return Advance::Ignored;
        }
        if self.state != SessionState::Active || !self.settled.insert(event.seqno()) {
            return Advance::Ignored;
        }

        let done = self.outstanding() == 0;
        if done {
            self.state = SessionState::Complete;
        }

        match event {
            EchoEvent::Reply(EchoReply {
                bytes,
                seqno,
                ttl,
                rtt_ms,
            }) => {
                self.received += 1;
                Advance::Reply {
                    response: PingResponse {
                        bytes,
                        source: address,
                        seqno,
                        ttl,
                        rtt_ms,
                    },
                    done,
                }
            }
            EchoEvent::Timeout { .. } => Advance::Lost { done },
        }
    }

    /// Totals so far; final once the session is `Complete`.
    pub fn summary(&self) -> Option<ProbeSummary> {
        Some(ProbeSummary {
            token: self.token,
            target: self.address?,
            transmitted: self.settled.len() as u32,
            received: self.received,
        })
    }
}

impl fmt::Debug for PingSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PingSession")
            .field("token", &self.token)
            .field("target", &self.target)
            .field("address", &self.address)
            .field("total", &self.total)
            .field("outstanding", &self.outstanding())
            .field("state", &self.state)
            .finish()
    }
}
