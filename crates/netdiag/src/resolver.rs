//! Hostname resolution adapter.
//!
//! The network stack exposes an asynchronous lookup that reports back
//! through a callback, possibly on another thread. [`ResolverAdapter`]
//! turns the stack's raw answer into a single `Result` and performs no
//! retries of its own.

use netdiag_types::Ipv4Address;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::ResolveError;

/// Completion callback handed to a [`NameResolver`].
///
/// `None` means the facility gave no answer at all. `Some(addr)` is the
/// facility's answer, which may still be one of the "no address" markers.
pub type LookupCallback = Box<dyn FnOnce(Option<Ipv4Address>) + Send + 'static>;

/// Asynchronous name lookup provided by the network stack.
pub trait NameResolver: Send + Sync {
    /// Starts resolving `name` and eventually calls `done` exactly once.
    fn resolve_name(&self, name: &str, done: LookupCallback);
}

/// Wraps a [`NameResolver`] and classifies its answers.
#[derive(Clone)]
pub struct ResolverAdapter {
    resolver: Arc<dyn NameResolver>,
}

impl ResolverAdapter {
    pub fn new(resolver: Arc<dyn NameResolver>) -> Self {
        Self { resolver }
    }

    /// Resolves `name`, calling `on_done` once with the address or failure.
    pub fn resolve<F>(&self, name: &str, on_done: F)
    where
        F: FnOnce(Result<Ipv4Address, ResolveError>) + Send + 'static,
    {
        let host = name.to_string();
        self.resolver.resolve_name(
            name,
            Box::new(move |answer| {
                let result = classify(answer);
                match &result {
                    Ok(addr) => debug!(host = %host, addr = %addr, "Hostname resolved"),
                    Err(e) => warn!(host = %host, error = %e, "Hostname resolution failed"),
                }
                on_done(result);
            }),
        );
    }
}

fn classify(answer: Option<Ipv4Address>) -> Result<Ipv4Address, ResolveError> {
    match answer {
        None => Err(ResolveError::NoResponse),
        Some(addr) if addr.is_none_marker() => Err(ResolveError::NoSuchHost),
        Some(addr) => Ok(addr),
    }
}
