/*! Interface to the underlying TCP/IP stack.

The `stack` module defines what this crate needs from the stack it fronts:
a way to open a listening socket with a backlog, [`TcpStack`], and a view
of each accepted connection, [`Connection`]. The stack side of the
contract is small on purpose; retransmission, congestion control and the
connection state machine all stay on the stack's side of the seam.

# Execution contexts

Implementations are driven from two contexts that never run in parallel
but may interleave: the application's call path, and an interrupt-like
context where the stack processes received frames and periodic timeouts.
The listener serializes its side by performing every stack mutation inside
`critical_section::with`; implementations may rely on not being re-entered
from the interrupt-like context while such a call is running, and must
take the same critical section around any timer-driven mutation of state
shared with this crate (the backlog accounting in particular).
*/

use core::fmt;
use core::net::IpAddr;

use crate::queue::AcceptSink;
use crate::server::ListenError;

/// A handle to a socket inside the underlying stack.
///
/// Identifies an accepted connection across the facade boundary; the
/// teardown notification path ([`AcceptSink::discard`]) is keyed on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SocketHandle(pub usize);

impl fmt::Display for SocketHandle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A local endpoint to listen on.
///
/// A `None` address listens on every local address. A port of zero asks
/// the stack to allocate an ephemeral port when binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]

pub struct ListenEndpoint {
    pub addr: Option<IpAddr>,
    pub port: u16,
}

impl fmt::Display for ListenEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.addr {
            Some(addr) => write!(f, "{}:{}", addr, self.port),
            None => write!(f, "*:{}", self.port),
        }
    }
}

impl From<u16> for ListenEndpoint {
    fn from(port: u16) -> ListenEndpoint {
        ListenEndpoint { addr: None, port }
    }
}

impl From<(IpAddr, u16)> for ListenEndpoint {
    fn from((addr, port): (IpAddr, u16)) -> ListenEndpoint {
        ListenEndpoint {
            addr: Some(addr),
            port,
        }
    }
}

/// The state of a TCP socket, according to [RFC 793].
///
/// [RFC 793]: https://tools.ietf.org/html/rfc793
#[derive(Debug, PartialEq, Eq, Clone, Copy)]

pub enum State {
    Closed,
    Listen,
    SynSent,
    SynReceived,
    Established,
    FinWait1,
    FinWait2,
    CloseWait,
    Closing,
    LastAck,
    TimeWait,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            State::Closed => write!(f, "CLOSED"),
            State::Listen => write!(f, "LISTEN"),
            State::SynSent => write!(f, "SYN-SENT"),
            State::SynReceived => write!(f, "SYN-RECEIVED"),
            State::Established => write!(f, "ESTABLISHED"),
            State::FinWait1 => write!(f, "FIN-WAIT-1"),
            State::FinWait2 => write!(f, "FIN-WAIT-2"),
            State::CloseWait => write!(f, "CLOSE-WAIT"),
            State::Closing => write!(f, "CLOSING"),
            State::LastAck => write!(f, "LAST-ACK"),
            State::TimeWait => write!(f, "TIME-WAIT"),
        }
    }
}

/// One accepted connection, as exposed by the underlying stack.
///
/// Values are created by the stack's receive path and travel through the
/// pending queue to the application, which becomes their sole owner once
/// [`Listener::accept`](crate::server::Listener::accept) returns them.
pub trait Connection {
    /// Stack-level handle of this connection, or `None` once the peer has
    /// torn it down.
    fn handle(&self) -> Option<SocketHandle>;

    /// Number of received octets waiting to be read.
    fn recv_queue(&self) -> usize;

    /// Enable or disable send coalescing (Nagle's algorithm) for this
    /// connection.
    fn set_nodelay(&mut self, enabled: bool);

    /// Keep holding this connection's backlog slot until the application
    /// claims it.
    ///
    /// Called inside a critical section, before the connection becomes
    /// visible to the application.
    fn backlog_delayed(&mut self);

    /// Release this connection's backlog slot, permitting the stack to
    /// accept one more peer.
    ///
    /// Called inside a critical section, once the application claims the
    /// connection. Never called when [`handle`](Self::handle) is `None`.
    fn backlog_accepted(&mut self);
}

/// An interface for opening and closing listening sockets.
///
/// The single lifetime ties the [`AcceptSink`] handed to [`listen`] to the
/// pending queue it feeds; the stack holds the sink for as long as the
/// listening socket exists and calls it from its receive context.
///
/// [`listen`]: TcpStack::listen
pub trait TcpStack<'a> {
    /// Accepted-connection context delivered to the accept sink.
    type Conn: Connection;

    /// Listening-socket handle, owned by the listener while bound.
    type Bound;

    /// Open a listening socket on `local` with address reuse enabled and
    /// the given backlog, and arm `sink` as its accept path.
    ///
    /// A `local` port of zero requests an ephemeral port; the effective
    /// port must afterwards be reported by [`local_port`](Self::local_port).
    /// Returns `Err(ListenError::AddressInUse)` if the port is already
    /// bound and `Err(ListenError::ResourceExhausted)` if no socket can be
    /// allocated.
    fn listen(
        &mut self,
        local: ListenEndpoint,
        backlog: u8,
        sink: AcceptSink<'a, Self::Conn>,
    ) -> Result<Self::Bound, ListenError>;

    /// Return the effective local port of a listening socket.
    fn local_port(&self, bound: &Self::Bound) -> u16;

    /// Return the connection state of a listening socket.
    fn state(&self, bound: &Self::Bound) -> State;

    /// Return the number of connections accepted on this socket whose
    /// backlog slot is still held.
    fn accepts_pending(&self, bound: &Self::Bound) -> u8;

    /// Close a listening socket and disarm its accept path.
    fn close(&mut self, bound: Self::Bound);
}
