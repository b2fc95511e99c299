//! Result delivery.
//!
//! Every reply and every terminal failure of a probe is delivered exactly
//! once to a [`ResultSink`]. A sink is either a callback registered by the
//! caller or one of the renderers here ([`TextSink`], [`JsonSink`]).

use netdiag_types::Ipv4Address;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::fmt;
use std::io::{self, Write};
use std::sync::Arc;
use tracing::warn;

use crate::echo::SessionToken;
use crate::error::ProbeFailure;

/// One echo reply, as delivered to a sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PingResponse {
    pub bytes: u32,
    pub source: Ipv4Address,
    pub seqno: u16,
    pub ttl: u8,
    /// Round-trip time in whole milliseconds.
    pub rtt_ms: u32,
}

impl fmt::Display for PingResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} bytes from {}, icmp_seq={} ttl={} time={}ms",
            self.bytes, self.source, self.seqno, self.ttl, self.rtt_ms
        )
    }
}

/// Either a reply or the terminal failure of a probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Reply(PingResponse),
    Failure(ProbeFailure),
}

/// Totals for a probe that ran to completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProbeSummary {
    pub token: SessionToken,
    pub target: Ipv4Address,
    pub transmitted: u32,
    pub received: u32,
}

impl ProbeSummary {
    pub fn lost(&self) -> u32 {
        self.transmitted.saturating_sub(self.received)
    }

    pub fn loss_percent(&self) -> u32 {
        if self.transmitted == 0 {
            return 0;
        }
        self.lost() * 100 / self.transmitted
    }
}

impl fmt::Display for ProbeSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "--- {} ping statistics ---\n{} packets transmitted, {} received, {}% packet loss",
            self.target,
            self.transmitted,
            self.received,
            self.loss_percent()
        )
    }
}

/// Receives probe results.
///
/// Called from whatever context the network stack completes work on, so
/// implementations must be thread-safe and should return quickly.
pub trait ResultSink: Send + Sync {
    fn deliver(&self, delivery: &Delivery);

    /// Called once when a probe has accounted for all of its requests.
    fn on_complete(&self, _summary: &ProbeSummary) {}
}

impl<F> ResultSink for F
where
    F: Fn(&Delivery) + Send + Sync,
{
    fn deliver(&self, delivery: &Delivery) {
        self(delivery)
    }
}

/// Renders results as human-readable lines.
pub struct TextSink<W: Write + Send> {
    out: Mutex<W>,
}

impl TextSink<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> TextSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner()
    }

    fn emit(&self, line: fmt::Arguments<'_>) {
        let mut out = self.out.lock();
        if let Err(e) = out.write_fmt(line).and_then(|_| out.flush()) {
            warn!(error = %e, "Failed to write probe result");
        }
    }
}

impl<W: Write + Send> ResultSink for TextSink<W> {
    fn deliver(&self, delivery: &Delivery) {
        match delivery {
            Delivery::Reply(reply) => self.emit(format_args!("{}\n", reply)),
            Delivery::Failure(failure) => self.emit(format_args!("{}\n", failure.kind)),
        }
    }

    fn on_complete(&self, summary: &ProbeSummary) {
        self.emit(format_args!("{}\n", summary));
    }
}

/// Renders results as one JSON object per line.
pub struct JsonSink<W: Write + Send> {
    out: Mutex<W>,
}

impl<W: Write + Send> JsonSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    fn emit(&self, value: serde_json::Value) {
        let mut out = self.out.lock();
        if let Err(e) = writeln!(out, "{}", value).and_then(|_| out.flush()) {
            warn!(error = %e, "Failed to write probe result");
        }
    }
}

impl<W: Write + Send> ResultSink for JsonSink<W> {
    fn deliver(&self, delivery: &Delivery) {
        let value = match delivery {
            Delivery::Reply(reply) => serde_json::json!({ "reply": reply }),
            Delivery::Failure(failure) => serde_json::json!({
                "failure": { "target": failure.target, "error": failure.kind.to_string() }
            }),
        };
        self.emit(value);
    }

    fn on_complete(&self, summary: &ProbeSummary) {
        self.emit(serde_json::json!({ "summary": summary }));
    }
}

/// Holds the handler registered for sessions that did not bring their own.
///
/// Registration swaps the whole reference. A delivery clones the reference
/// first and then calls it, so it always completes against the handler that
/// was registered when the result arrived.
#[derive(Default)]
pub struct SinkSlot {
    current: RwLock<Option<Arc<dyn ResultSink>>>,
}

impl SinkSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs `handler`, returning the one it replaced.
    pub fn register(&self, handler: Option<Arc<dyn ResultSink>>) -> Option<Arc<dyn ResultSink>> {
        std::mem::replace(&mut *self.current.write(), handler)
    }

    pub fn current(&self) -> Option<Arc<dyn ResultSink>> {
        self.current.read().clone()
    }
}
