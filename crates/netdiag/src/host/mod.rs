//! Collaborators backed by the host operating system.
//!
//! The engine only sees the [`NameResolver`](crate::resolver::NameResolver)
//! and [`EchoTransport`](crate::echo::EchoTransport) traits. These
//! implementations let the `netdiag` binary run against a real network:
//!
//! - [`SystemResolver`]: `getaddrinfo` through `tokio::net::lookup_host`
//! - [`IcmpTransport`]: unprivileged ICMP datagram sockets (Linux)
//! - [`snapshot_interfaces`]: the host's interface table as an
//!   [`InterfaceChain`](crate::iface::InterfaceChain)

mod icmp;
mod ifaces;
mod resolver;

pub use icmp::{EchoHeader, IcmpTransport, ICMP_ECHO_REPLY, ICMP_ECHO_REQUEST};
pub use ifaces::snapshot_interfaces;
pub use resolver::SystemResolver;
