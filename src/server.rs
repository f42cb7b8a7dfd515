// Heads up! The accept path feeding the pending queue runs in the stack's
// receive context and may preempt every method in this file. Read the
// execution-context notes in stack.rs before changing the locking here.

use core::fmt;

use crate::config::{SERVER_DEFAULT_BACKLOG, SERVER_PENDING_COUNT};
use crate::queue::{AcceptSink, PendingQueue};
use crate::stack::{Connection, ListenEndpoint, State, TcpStack};

macro_rules! server_trace {
    ($($arg:expr),*) => (net_log!(trace, $($arg),*));
}

/// Error returned by [`Listener::listen`].
#[derive(Debug, PartialEq, Eq, Clone, Copy)]

pub enum ListenError {
    /// The requested port is already bound by another listener.
    AddressInUse,
    /// The stack could not allocate a listening socket, or the requested
    /// backlog does not leave the pending-connection queue any headroom.
    ResourceExhausted,
    /// A backlog of zero was requested.
    ZeroBacklog,
}

impl fmt::Display for ListenError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            ListenError::AddressInUse => write!(f, "address in use"),
            ListenError::ResourceExhausted => write!(f, "resource exhausted"),
            ListenError::ZeroBacklog => write!(f, "zero backlog requested"),
        }
    }
}

impl core::error::Error for ListenError {}

/// Listener configuration applied at construction time.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]

pub struct Config {
    /// Whether claimed connections disable send coalescing when
    /// [`set_nodelay`](Listener::set_nodelay) was never called.
    pub nodelay: bool,
    /// Backlog advertised by [`listen`](Listener::listen) and
    /// [`listen_on`](Listener::listen_on).
    pub backlog: u8,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            nodelay: false,
            backlog: SERVER_DEFAULT_BACKLOG,
        }
    }
}

/// A TCP server socket.
///
/// A `Listener` fronts one listening socket of the underlying stack. The
/// stack feeds established connections into the pending queue from its
/// receive context; the application polls with
/// [`can_accept`](Self::can_accept) and claims them with
/// [`accept`](Self::accept), oldest first. No method blocks; a caller
/// that wants a deadline polls inside its own loop.
///
/// Closing does not disturb connections already queued: they stay
/// claimable until popped or discarded by the stack.
pub struct Listener<'a, S: TcpStack<'a>> {
    queue: &'a PendingQueue<S::Conn>,
    local: ListenEndpoint,
    bound: Option<S::Bound>,
    backlog: u8,
    config: Config,
    nodelay: Option<bool>,
}

impl<'a, S: TcpStack<'a>> Listener<'a, S> {
    /// Create a closed listener over the given pending queue.
    ///
    /// `local` is the endpoint later used by [`listen`](Self::listen);
    /// a port of zero requests an ephemeral port at that point.
    pub fn new<T>(queue: &'a PendingQueue<S::Conn>, local: T, config: Config) -> Listener<'a, S>
    where
        T: Into<ListenEndpoint>,
    {
        Listener {
            queue,
            local: local.into(),
            bound: None,
            backlog: 0,
            config,
            nodelay: None,
        }
    }

    /// Start listening on the configured endpoint with the configured
    /// backlog.
    ///
    /// After a successful [`listen_on`](Self::listen_on) or an
    /// ephemeral-port bind, the recorded port is the effective one, and
    /// that is what gets reused here.
    pub fn listen(&mut self, stack: &mut S) -> Result<(), ListenError> {
        self.listen_with_backlog(stack, self.local.port, self.config.backlog)
    }

    /// Start listening on the given port with the configured backlog.
    pub fn listen_on(&mut self, stack: &mut S, port: u16) -> Result<(), ListenError> {
        self.listen_with_backlog(stack, port, self.config.backlog)
    }

    /// Start listening on the given port, advertising `backlog` to the
    /// stack.
    ///
    /// Any existing listening socket is closed first. This function
    /// returns `Err(ListenError::ZeroBacklog)` if `backlog` is zero, in
    /// which case the listener stays closed, and
    /// `Err(ListenError::ResourceExhausted)` if `backlog` does not leave
    /// the pending queue one slot of headroom for a handshake that was
    /// already in flight when the backlog filled up. Stack-side failures
    /// are returned as-is; in every error case the listener is left
    /// closed and [`state`](Self::state) reports [`State::Closed`].
    pub fn listen_with_backlog(
        &mut self,
        stack: &mut S,
        port: u16,
        backlog: u8,
    ) -> Result<(), ListenError> {
        self.close(stack);
        if backlog == 0 {
            return Err(ListenError::ZeroBacklog);
        }
        if usize::from(backlog) >= SERVER_PENDING_COUNT {
            return Err(ListenError::ResourceExhausted);
        }

        let local = ListenEndpoint {
            addr: self.local.addr,
            port,
        };
        let sink = AcceptSink::new(self.queue);
        let bound = critical_section::with(|_| stack.listen(local, backlog, sink))?;

        self.local.port = stack.local_port(&bound);
        self.backlog = backlog;
        self.bound = Some(bound);
        server_trace!("server: listening on {}", self.local);
        Ok(())
    }

    /// Stop listening.
    ///
    /// Safe to call when already closed. Connections still in the pending
    /// queue remain claimable.
    #[doc(alias = "stop")]
    pub fn close(&mut self, stack: &mut S) {
        if let Some(bound) = self.bound.take() {
            critical_section::with(|_| stack.close(bound));
            server_trace!("server: closed");
        }
    }

    /// Return whether the listener currently owns a listening socket.
    #[inline]
    pub fn is_open(&self) -> bool {
        self.bound.is_some()
    }

    /// Return the connection state of the listening socket, or
    /// [`State::Closed`] when there is none.
    pub fn state(&self, stack: &S) -> State {
        match &self.bound {
            Some(bound) => stack.state(bound),
            None => State::Closed,
        }
    }

    /// Return the configured port, replaced by the effective port once a
    /// bind succeeds.
    #[inline]
    pub fn port(&self) -> u16 {
        self.local.port
    }

    /// Set whether claimed connections disable send coalescing.
    ///
    /// Applies to connections returned by [`accept`](Self::accept) from
    /// now on, including ones already pending.
    pub fn set_nodelay(&mut self, enabled: bool) {
        self.nodelay = Some(enabled);
    }

    /// Return the no-delay policy applied to claimed connections, falling
    /// back to the configured default while unset.
    #[inline]
    pub fn nodelay(&self) -> bool {
        self.nodelay.unwrap_or(self.config.nodelay)
    }

    /// Return whether a pending connection is waiting to be claimed.
    #[inline]
    pub fn can_accept(&self) -> bool {
        !self.queue.is_empty()
    }

    /// Return the number of received octets queued on the first pending
    /// connection that has any, looking past connections that have not
    /// received anything yet. Returns 0 if none qualify.
    ///
    /// Note that [`accept`](Self::accept) still claims strictly in
    /// arrival order; this peeks ahead only for read-readiness.
    pub fn recv_queue(&self) -> usize {
        self.queue.recv_queue()
    }

    /// Return whether the stack is holding as many unclaimed accepts as
    /// the advertised backlog allows. Informational; callers wanting
    /// their own admission control poll this.
    pub fn backlog_full(&self, stack: &S) -> bool {
        match &self.bound {
            Some(bound) => stack.accepts_pending(bound) >= self.backlog,
            None => false,
        }
    }

    /// Claim the oldest pending connection, if any.
    ///
    /// The connection's backlog slot is released, permitting the stack to
    /// accept one more peer, and the no-delay policy is applied before
    /// the connection is handed over. Ownership transfers entirely to the
    /// caller; servicing the connection is the caller's job from here on.
    ///
    /// A pending connection whose peer is already gone is dropped, not
    /// returned, and its slot release is skipped.
    #[doc(alias = "available")]
    pub fn accept(&mut self) -> Option<S::Conn> {
        while let Some(mut conn) = self.queue.pop() {
            if conn.handle().is_none() {
                // Torn down after the discard notification window.
                server_trace!("server: dropping dead pending connection");
                continue;
            }
            critical_section::with(|_| conn.backlog_accepted());
            conn.set_nodelay(self.nodelay());
            server_trace!("server: connection claimed, {} still pending", self.queue.len());
            return Some(conn);
        }
        None
    }
}
