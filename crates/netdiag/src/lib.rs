//! Network diagnostics for embedded network devices.
//!
//! Two facilities are exposed to a scripting front end:
//!
//! - **Interface listing** ([`iface`]): walk the stack's interface chain and
//!   render one block per interface.
//! - **Ping** ([`engine`]): an asynchronous ICMP echo prober that accepts a
//!   literal address or a hostname and delivers each reply, or the reason the
//!   probe could not run, to a [`ResultSink`].
//!
//! # Architecture
//!
//! ```text
//!   ping(target, count, handler)
//!          │
//!          ▼
//!   ┌─────────────┐  hostname   ┌──────────────────┐
//!   │ PingEngine  │────────────▶│ ResolverAdapter  │──▶ NameResolver
//!   │             │◀────────────│                  │    (network stack)
//!   │  sessions   │  address    └──────────────────┘
//!   │  by token   │
//!   │             │  token      ┌──────────────────┐
//!   │             │────────────▶│  EchoTransport   │    (network stack)
//!   │             │◀────────────│                  │
//!   └─────────────┘ reply/timeout└─────────────────┘
//!          │
//!          ▼
//!     ResultSink (per-session handler, registered handler, or text)
//! ```
//!
//! The network stack itself is a collaborator: [`resolver::NameResolver`]
//! and [`echo::EchoTransport`] are the seams. [`host`] implements them on top
//! of the operating system.

pub mod config;
pub mod echo;
pub mod engine;
pub mod error;
pub mod host;
pub mod iface;
pub mod resolver;
pub mod session;
pub mod sink;

pub use config::ProbeConfig;
pub use echo::{EchoCallback, EchoEvent, EchoReply, EchoTransport, SessionToken};
pub use engine::{PingEngine, PingRequest};
pub use error::{
    NetdiagError, ProbeError, ProbeFailure, ProbeFailureKind, ResolveError, Result,
    TransportError,
};
pub use iface::{
    first_record, list_interfaces, print_interfaces, DhcpLease, InterfaceChain, InterfaceRecord,
    NetInterface,
};
pub use resolver::{LookupCallback, NameResolver, ResolverAdapter};
pub use session::{PingSession, SessionState};
pub use sink::{Delivery, JsonSink, PingResponse, ProbeSummary, ResultSink, TextSink};

pub use netdiag_types::{HwAddress, InterfaceFlags, Ipv4Address};
