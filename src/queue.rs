/*! Storage for accepted-but-unclaimed connections.

A [`PendingQueue`] is shared between the two halves of a server socket:
the stack's receive context appends through an [`AcceptSink`], and the
application consumes from the head through
[`Listener::accept`](crate::server::Listener::accept). Both sides reach
the storage through a `critical_section`, so the queue itself hands out
no references; elements move in and out by value.
*/

use core::cell::RefCell;

use critical_section::Mutex;
use heapless::Deque;

use crate::config::SERVER_PENDING_COUNT;
use crate::stack::{Connection, SocketHandle};

/// A FIFO of connections accepted by the stack and not yet claimed by the
/// application.
///
/// The queue is allocated by you, usually as a `static`, and borrowed by
/// both the [`Listener`](crate::server::Listener) and the stack:
///
/// ```ignore
/// static PENDING: PendingQueue<Conn> = PendingQueue::new();
///
/// let mut server = Listener::new(&PENDING, 4212, Config::default());
/// server.listen(&mut stack)?;
/// ```
///
/// Capacity is fixed at [`SERVER_PENDING_COUNT`]. Ownership of an element
/// belongs to the queue from append until removal, at which point it
/// transfers entirely to the caller.
pub struct PendingQueue<C> {
    inner: Mutex<RefCell<Deque<C, SERVER_PENDING_COUNT>>>,
}

impl<C> PendingQueue<C> {
    /// Create an empty queue.
    pub const fn new() -> PendingQueue<C> {
        PendingQueue {
            inner: Mutex::new(RefCell::new(Deque::new())),
        }
    }

    /// Return whether no connections are waiting.
    pub fn is_empty(&self) -> bool {
        critical_section::with(|cs| self.inner.borrow(cs).borrow().is_empty())
    }

    /// Return the number of waiting connections.
    pub fn len(&self) -> usize {
        critical_section::with(|cs| self.inner.borrow(cs).borrow().len())
    }

    pub(crate) fn push(&self, conn: C) -> Result<(), C> {
        critical_section::with(|cs| self.inner.borrow(cs).borrow_mut().push_back(conn))
    }

    pub(crate) fn pop(&self) -> Option<C> {
        critical_section::with(|cs| self.inner.borrow(cs).borrow_mut().pop_front())
    }
}

impl<C: Connection> PendingQueue<C> {
    /// Return the number of received octets queued on the first waiting
    /// connection that has any, scanning oldest-first past connections
    /// whose buffers are still empty. Returns 0 if none qualify.
    pub fn recv_queue(&self) -> usize {
        critical_section::with(|cs| {
            self.inner
                .borrow(cs)
                .borrow()
                .iter()
                .map(|conn| conn.recv_queue())
                .find(|&size| size > 0)
                .unwrap_or(0)
        })
    }

    /// Remove and return the waiting connection with the given handle,
    /// preserving the order of the others.
    pub(crate) fn remove(&self, handle: SocketHandle) -> Option<C> {
        critical_section::with(|cs| {
            let mut queue = self.inner.borrow(cs).borrow_mut();
            let mut removed = None;
            for _ in 0..queue.len() {
                let Some(conn) = queue.pop_front() else { break };
                if removed.is_none() && conn.handle() == Some(handle) {
                    removed = Some(conn);
                } else {
                    // One element was just popped, so this cannot fail.
                    let _ = queue.push_back(conn);
                }
            }
            removed
        })
    }
}

impl<C> Default for PendingQueue<C> {
    fn default() -> PendingQueue<C> {
        PendingQueue::new()
    }
}

/// The stack-facing half of a [`PendingQueue`].
///
/// Handed to [`TcpStack::listen`](crate::stack::TcpStack::listen). The
/// stack calls [`accept`](Self::accept) from its receive path whenever an
/// inbound connection reaches the established state, and
/// [`discard`](Self::discard) when it tears a still-queued connection
/// down before the application claims it.
pub struct AcceptSink<'a, C: Connection> {
    queue: &'a PendingQueue<C>,
}

impl<C: Connection> Clone for AcceptSink<'_, C> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<C: Connection> Copy for AcceptSink<'_, C> {}

impl<'a, C: Connection> AcceptSink<'a, C> {
    pub(crate) fn new(queue: &'a PendingQueue<C>) -> AcceptSink<'a, C> {
        AcceptSink { queue }
    }

    /// Queue a newly accepted connection for the application.
    ///
    /// The connection's backlog slot is marked delayed before it becomes
    /// visible, so the slot is held until the application claims it. Data
    /// the peer sends in the meantime lands in the connection's own
    /// buffers rather than being dropped.
    ///
    /// The connection is handed back if the queue is full, and the stack
    /// should then abort it. This cannot happen while the stack enforces
    /// the backlog advertised to [`TcpStack::listen`], which
    /// [`Listener::listen_with_backlog`] keeps below the queue capacity.
    ///
    /// [`TcpStack::listen`]: crate::stack::TcpStack::listen
    /// [`Listener::listen_with_backlog`]: crate::server::Listener::listen_with_backlog
    pub fn accept(&self, mut conn: C) -> Result<(), C> {
        critical_section::with(|_| conn.backlog_delayed());
        match self.queue.push(conn) {
            Ok(()) => {
                net_trace!("server: inbound connection queued, {} pending", self.queue.len());
                Ok(())
            }
            Err(conn) => {
                net_debug!("server: pending queue full, refusing connection");
                Err(conn)
            }
        }
    }

    /// Drop the still-queued connection with the given handle.
    ///
    /// Returns whether an entry was removed. Connections the stack tears
    /// down before the application claims them are removed here rather
    /// than left to be discovered dead at claim time.
    pub fn discard(&self, handle: SocketHandle) -> bool {
        match self.queue.remove(handle) {
            Some(conn) => {
                net_trace!("server: discarding pending connection {}", handle);
                drop(conn);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[derive(Debug, PartialEq, Eq)]
    struct Conn {
        handle: usize,
        recv: usize,
    }

    impl Conn {
        fn new(handle: usize, recv: usize) -> Conn {
            Conn { handle, recv }
        }
    }

    impl Connection for Conn {
        fn handle(&self) -> Option<SocketHandle> {
            Some(SocketHandle(self.handle))
        }

        fn recv_queue(&self) -> usize {
            self.recv
        }

        fn set_nodelay(&mut self, _enabled: bool) {}

        fn backlog_delayed(&mut self) {}

        fn backlog_accepted(&mut self) {}
    }

    #[test]
    fn test_push_pop_fifo() {
        let queue = PendingQueue::new();
        assert!(queue.is_empty());

        for handle in 0..3 {
            assert!(queue.push(Conn::new(handle, 0)).is_ok());
        }
        assert_eq!(queue.len(), 3);

        for handle in 0..3 {
            assert_eq!(queue.pop(), Some(Conn::new(handle, 0)));
        }
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn test_push_full() {
        let queue = PendingQueue::new();
        for handle in 0..SERVER_PENDING_COUNT {
            assert!(queue.push(Conn::new(handle, 0)).is_ok());
        }

        let refused = Conn::new(SERVER_PENDING_COUNT, 0);
        assert_eq!(queue.push(refused), Err(Conn::new(SERVER_PENDING_COUNT, 0)));
        assert_eq!(queue.len(), SERVER_PENDING_COUNT);
    }

    #[test]
    fn test_recv_queue_scans_past_empty() {
        let queue = PendingQueue::new();
        assert_eq!(queue.recv_queue(), 0);

        queue.push(Conn::new(1, 0)).unwrap();
        queue.push(Conn::new(2, 5)).unwrap();
        queue.push(Conn::new(3, 9)).unwrap();

        // The head has nothing buffered; the scan reports the first
        // connection that does.
        assert_eq!(queue.recv_queue(), 5);
    }

    #[test]
    fn test_remove_preserves_order() {
        let queue = PendingQueue::new();
        for handle in 0..4 {
            queue.push(Conn::new(handle, 0)).unwrap();
        }

        assert_eq!(queue.remove(SocketHandle(2)), Some(Conn::new(2, 0)));
        assert_eq!(queue.remove(SocketHandle(7)), None);

        assert_eq!(queue.pop(), Some(Conn::new(0, 0)));
        assert_eq!(queue.pop(), Some(Conn::new(1, 0)));
        assert_eq!(queue.pop(), Some(Conn::new(3, 0)));
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn test_sink_accept_and_discard() {
        let queue = PendingQueue::new();
        let sink = AcceptSink::new(&queue);

        sink.accept(Conn::new(1, 0)).unwrap();
        sink.accept(Conn::new(2, 0)).unwrap();
        assert_eq!(queue.len(), 2);

        assert!(sink.discard(SocketHandle(1)));
        assert!(!sink.discard(SocketHandle(1)));
        assert_eq!(queue.pop(), Some(Conn::new(2, 0)));
    }
}
