//! Seam to the network stack's ICMP echo primitive.
//!
//! A probe hands the primitive a target, a request count and a
//! [`SessionToken`]. Every reply or abandoned sequence number comes back
//! through the callback tagged with that token, which is how the engine
//! finds the owning session.

use netdiag_types::Ipv4Address;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

use crate::error::TransportError;

/// Identifies one probe session across the asynchronous boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct SessionToken(u64);

impl SessionToken {
    pub const fn new(raw: u64) -> Self {
        SessionToken(raw)
    }

    pub const fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Raw reply data reported by the echo primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EchoReply {
    pub bytes: u32,
    pub seqno: u16,
    pub ttl: u8,
    pub rtt_ms: u32,
}

/// Outcome of one echo request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EchoEvent {
    Reply(EchoReply),
    /// The primitive gave up waiting for this sequence number.
    Timeout { seqno: u16 },
}

impl EchoEvent {
    pub fn seqno(&self) -> u16 {
        match self {
            EchoEvent::Reply(reply) => reply.seqno,
            EchoEvent::Timeout { seqno } => *seqno,
        }
    }
}

/// Callback the primitive invokes once per reply or timeout.
pub type EchoCallback = Arc<dyn Fn(SessionToken, EchoEvent) + Send + Sync + 'static>;

/// ICMP echo primitive provided by the network stack.
pub trait EchoTransport: Send + Sync {
    /// Starts sending `count` echo requests to `target`.
    ///
    /// Returns once the requests are scheduled; results arrive later through
    /// `on_event`, from whatever context the transport runs on. An error means
    /// nothing was sent and `on_event` will never be called for `token`.
    fn send_echo_request(
        &self,
        target: Ipv4Address,
        count: u32,
        token: SessionToken,
        on_event: EchoCallback,
    ) -> Result<(), TransportError>;
}
