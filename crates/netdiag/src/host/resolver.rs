//! System resolver running on the tokio runtime.

use netdiag_types::Ipv4Address;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::debug;

use crate::resolver::{LookupCallback, NameResolver};

/// How long a lookup may take before it counts as "no response".
const LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);

/// Resolves names with the host's `getaddrinfo`, off the calling thread.
///
/// A lookup that errors out is reported as the "no address" marker; one that
/// does not finish within the timeout is reported as no response at all.
pub struct SystemResolver {
    handle: Handle,
}

impl SystemResolver {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Uses the runtime the caller is running on.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn current() -> Self {
        Self::new(Handle::current())
    }
}

impl NameResolver for SystemResolver {
    fn resolve_name(&self, name: &str, done: LookupCallback) {
        let host = name.to_string();
        self.handle.spawn(async move {
            let lookup = tokio::net::lookup_host((host.as_str(), 0));
            let answer = match tokio::time::timeout(LOOKUP_TIMEOUT, lookup).await {
                Err(_) => {
                    debug!(host = %host, "Lookup timed out");
                    None
                }
                Ok(Err(e)) => {
                    debug!(host = %host, error = %e, "Lookup failed");
                    Some(Ipv4Address::UNSPECIFIED)
                }
                Ok(Ok(addrs)) => Some(first_ipv4(addrs).unwrap_or(Ipv4Address::UNSPECIFIED)),
            };
            done(answer);
        });
    }
}

fn first_ipv4(addrs: impl Iterator<Item = SocketAddr>) -> Option<Ipv4Address> {
    addrs
        .filter_map(|addr| match addr {
            SocketAddr::V4(v4) => Some(Ipv4Address::from(*v4.ip())),
            SocketAddr::V6(_) => None,
        })
        .next()
}
