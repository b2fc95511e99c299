//! Error types for netdiag operations.
//!
//! Input errors ([`ProbeError`]) are returned synchronously to the caller.
//! Everything that goes wrong after a probe has started is turned into a
//! [`ProbeFailure`] and delivered through the result sink instead.

use std::io;
use thiserror::Error;

use crate::config::defaults::MAX_PING_COUNT;

/// Result type alias for netdiag host and binary plumbing.
pub type Result<T> = std::result::Result<T, NetdiagError>;

/// Errors raised synchronously by `ping`, before any work is started.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProbeError {
    /// Target string was empty or only whitespace.
    #[error("no address specified")]
    EmptyTarget,

    /// Count was zero or does not fit in the sequence-number space.
    #[error("invalid ping count {0} (must be 1-{max})", max = MAX_PING_COUNT)]
    InvalidCount(u32),
}

/// Why a hostname could not be turned into an address.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// The resolver produced no answer at all.
    #[error("SEVERE problem resolving hostname - network and DNS accessible?")]
    NoResponse,

    /// The resolver answered, but with no usable address.
    #[error("problem resolving hostname - maybe nonexistent host?")]
    NoSuchHost,
}

/// The echo-request primitive refused to start a probe.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("failed to open ICMP socket: {0}")]
    Socket(String),

    #[error("failed to send echo request: {0}")]
    Send(String),

    #[error("echo requests are not supported on this platform")]
    Unsupported,
}

/// What went wrong with a probe that never produced replies.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProbeFailureKind {
    #[error(transparent)]
    Resolution(#[from] ResolveError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Terminal failure of one probe, as delivered to a result sink.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("ping {target}: {kind}")]
pub struct ProbeFailure {
    /// The target string exactly as the caller supplied it.
    pub target: String,
    pub kind: ProbeFailureKind,
}

impl ProbeFailure {
    pub fn new(target: impl Into<String>, kind: impl Into<ProbeFailureKind>) -> Self {
        Self {
            target: target.into(),
            kind: kind.into(),
        }
    }

    /// Returns true if the failure happened while resolving the target.
    pub fn is_resolution(&self) -> bool {
        matches!(self.kind, ProbeFailureKind::Resolution(_))
    }
}

/// Errors from host integration and the command line front end.
#[derive(Debug, Error)]
pub enum NetdiagError {
    #[error(transparent)]
    Probe(#[from] ProbeError),

    #[error("Invalid configuration for {field}: {message}")]
    Config {
        /// The setting that failed validation.
        field: String,
        message: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Interface enumeration failed: {0}")]
    Interfaces(String),
}

impl NetdiagError {
    /// Creates an invalid configuration error.
    pub fn config(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Config {
            field: field.into(),
            message: message.into(),
        }
    }
}
