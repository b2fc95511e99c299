//! ICMP echo over unprivileged datagram sockets.
//!
//! On Linux an `IPPROTO_ICMP` datagram socket lets an ordinary user send
//! echo requests (subject to `net.ipv4.ping_group_range`). The kernel owns the
//! identifier field and only hands back replies addressed to the socket, so
//! one socket per probe is enough to keep sessions apart.

use byteorder::{BigEndian, ByteOrder};
use netdiag_types::Ipv4Address;
use tokio::runtime::Handle;

use crate::config::ProbeConfig;
use crate::echo::{EchoCallback, EchoTransport, SessionToken};
use crate::error::TransportError;

pub const ICMP_ECHO_REPLY: u8 = 0;
pub const ICMP_ECHO_REQUEST: u8 = 8;

const ICMP_HEADER_LEN: usize = 8;

/// The 8-byte header of an echo request or reply (RFC 792).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EchoHeader {
    pub msg_type: u8,
    pub code: u8,
    pub checksum: u16,
    pub identifier: u16,
    pub sequence: u16,
}

impl EchoHeader {
    pub fn request(identifier: u16, sequence: u16) -> Self {
        Self {
            msg_type: ICMP_ECHO_REQUEST,
            code: 0,
            checksum: 0,
            identifier,
            sequence,
        }
    }

    /// Returns None if `data` is too short to hold a header.
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < ICMP_HEADER_LEN {
            return None;
        }
        Some(Self {
            msg_type: data[0],
            code: data[1],
            checksum: BigEndian::read_u16(&data[2..4]),
            identifier: BigEndian::read_u16(&data[4..6]),
            sequence: BigEndian::read_u16(&data[6..8]),
        })
    }

    pub fn is_echo_reply(&self) -> bool {
        self.msg_type == ICMP_ECHO_REPLY && self.code == 0
    }

    /// Header plus `payload_len` pattern bytes, checksummed.
    pub fn encode(&self, payload_len: usize) -> Vec<u8> {
        let mut packet = vec![0u8; ICMP_HEADER_LEN + payload_len];
        packet[0] = self.msg_type;
        packet[1] = self.code;
        BigEndian::write_u16(&mut packet[4..6], self.identifier);
        BigEndian::write_u16(&mut packet[6..8], self.sequence);
        for (i, byte) in packet[ICMP_HEADER_LEN..].iter_mut().enumerate() {
            *byte = (i % 256) as u8;
        }
        let sum = checksum(&packet);
        BigEndian::write_u16(&mut packet[2..4], sum);
        packet
    }
}

/// Internet checksum (RFC 1071).
pub(crate) fn checksum(data: &[u8]) -> u16 {
    let mut sum = 0u32;
    let mut chunks = data.chunks_exact(2);
    for chunk in &mut chunks {
        sum += BigEndian::read_u16(chunk) as u32;
    }
    if let [last] = chunks.remainder() {
        sum += (*last as u32) << 8;
    }
    while sum >> 16 != 0 {
        sum = (sum & 0xffff) + (sum >> 16);
    }
    !(sum as u16)
}

/// Echo primitive that runs each probe as a task on a tokio runtime.
///
/// Requests are sent one at a time, `interval` apart. A request whose reply
/// does not arrive within `reply_timeout` is reported as a timeout.
pub struct IcmpTransport {
    handle: Handle,
    config: ProbeConfig,
}

impl IcmpTransport {
    pub fn new(handle: Handle, config: ProbeConfig) -> Self {
        Self { handle, config }
    }
}

impl EchoTransport for IcmpTransport {
    fn send_echo_request(
        &self,
        target: Ipv4Address,
        count: u32,
        token: SessionToken,
        on_event: EchoCallback,
    ) -> Result<(), TransportError> {
        sys::start(&self.handle, &self.config, target, count, token, on_event)
    }
}

#[cfg(target_os = "linux")]
mod sys {
    use super::*;
    use crate::echo::{EchoEvent, EchoReply};
    use nix::sys::socket::{
        recvmsg, sendto, setsockopt, socket, sockopt, AddressFamily, ControlMessageOwned,
        MsgFlags, SockFlag, SockProtocol, SockType, SockaddrIn,
    };
    use std::io::{self, IoSliceMut};
    use std::net::SocketAddrV4;
    use std::os::fd::{AsRawFd, OwnedFd};
    use tokio::io::unix::AsyncFd;
    use tokio::time::{self, Instant};
    use tracing::{debug, trace, warn};

    const RECV_BUFFER_SIZE: usize = 2048;

    pub(super) fn start(
        handle: &Handle,
        config: &ProbeConfig,
        target: Ipv4Address,
        count: u32,
        token: SessionToken,
        on_event: EchoCallback,
    ) -> Result<(), TransportError> {
        let fd = open_socket().map_err(|e| TransportError::Socket(e.to_string()))?;
        let socket = register(handle, fd)?;
        handle.spawn(run_probe(socket, config.clone(), target, count, token, on_event));
        Ok(())
    }

    /// Registers `fd` with the reactor of `handle`'s runtime.
    pub(super) fn register(
        handle: &Handle,
        fd: OwnedFd,
    ) -> Result<AsyncFd<OwnedFd>, TransportError> {
        let _entered = handle.enter();
        AsyncFd::new(fd).map_err(|e| TransportError::Socket(e.to_string()))
    }

    async fn run_probe(
        socket: AsyncFd<OwnedFd>,
        config: ProbeConfig,
        target: Ipv4Address,
        count: u32,
        token: SessionToken,
        on_event: EchoCallback,
    ) {
        let mut buf = vec![0u8; RECV_BUFFER_SIZE];

        for n in 0..count {
            let seqno = n as u16;
            let sent_at = Instant::now();
            let packet = EchoHeader::request(0, seqno).encode(config.payload_len);

            let event = match send(&socket, &packet, target).await {
                Err(e) => {
                    warn!(%token, seqno, error = %e, "Echo request send failed");
                    EchoEvent::Timeout { seqno }
                }
                Ok(()) => {
                    let deadline = sent_at + config.reply_timeout;
                    match time::timeout_at(deadline, recv_reply(&socket, seqno, &mut buf)).await {
                        Ok(Ok((bytes, ttl))) => EchoEvent::Reply(EchoReply {
                            bytes: bytes as u32,
                            seqno,
                            ttl,
                            rtt_ms: sent_at.elapsed().as_millis() as u32,
                        }),
                        Ok(Err(e)) => {
                            warn!(%token, seqno, error = %e, "Echo reply receive failed");
                            EchoEvent::Timeout { seqno }
                        }
                        Err(_) => EchoEvent::Timeout { seqno },
                    }
                }
            };
            on_event(token, event);

            if n + 1 < count {
                time::sleep_until(sent_at + config.interval).await;
            }
        }
        debug!(%token, "ICMP probe finished");
    }

    async fn send(socket: &AsyncFd<OwnedFd>, packet: &[u8], target: Ipv4Address) -> io::Result<()> {
        loop {
            let mut guard = socket.writable().await?;
            match guard.try_io(|inner| send_to(inner.get_ref(), packet, target)) {
                Ok(result) => return result.map(|_| ()),
                Err(_would_block) => continue,
            }
        }
    }

    /// Waits for the echo reply carrying `seqno`; anything else is dropped.
    async fn recv_reply(
        socket: &AsyncFd<OwnedFd>,
        seqno: u16,
        buf: &mut [u8],
    ) -> io::Result<(usize, u8)> {
        loop {
            let mut guard = socket.readable().await?;
            let (len, ttl) = match guard.try_io(|inner| recv_with_ttl(inner.get_ref(), &mut *buf)) {
                Ok(result) => result?,
                Err(_would_block) => continue,
            };
            match EchoHeader::parse(&buf[..len]) {
                Some(header) if header.is_echo_reply() && header.sequence == seqno => {
                    return Ok((len, ttl.unwrap_or(0)));
                }
                other => trace!(seqno, header = ?other, "Ignoring unrelated ICMP message"),
            }
        }
    }

    fn open_socket() -> nix::Result<OwnedFd> {
        let fd = socket(
            AddressFamily::Inet,
            SockType::Datagram,
            SockFlag::SOCK_NONBLOCK | SockFlag::SOCK_CLOEXEC,
            SockProtocol::Icmp,
        )?;
        if let Err(e) = setsockopt(&fd, sockopt::Ipv4RecvTtl, &true) {
            warn!(error = %e, "Failed to set IP_RECVTTL, replies will report ttl=0");
        }
        Ok(fd)
    }

    fn send_to(fd: &OwnedFd, packet: &[u8], target: Ipv4Address) -> io::Result<usize> {
        let addr = SockaddrIn::from(SocketAddrV4::new(target.inner(), 0));
        Ok(sendto(fd.as_raw_fd(), packet, &addr, MsgFlags::empty())?)
    }

    /// recvmsg(2) that also picks the IP_TTL control message out.
    fn recv_with_ttl(fd: &OwnedFd, buf: &mut [u8]) -> io::Result<(usize, Option<u8>)> {
        let mut iov = [IoSliceMut::new(buf)];
        let mut control = nix::cmsg_space!(nix::libc::c_int);
        let msg = recvmsg::<SockaddrIn>(
            fd.as_raw_fd(),
            &mut iov,
            Some(&mut control),
            MsgFlags::empty(),
        )?;
        let ttl = msg.cmsgs().into_iter().flatten().find_map(|cmsg| match cmsg {
            ControlMessageOwned::Ipv4Ttl(ttl) => u8::try_from(ttl).ok(),
            _ => None,
        });
        Ok((msg.bytes, ttl))
    }
}

#[cfg(not(target_os = "linux"))]
mod sys {
    use super::*;

    pub(super) fn start(
        _handle: &Handle,
        _config: &ProbeConfig,
        _target: Ipv4Address,
        _count: u32,
        _token: SessionToken,
        _on_event: EchoCallback,
    ) -> Result<(), TransportError> {
        Err(TransportError::Unsupported)
    }
}
