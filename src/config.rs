//! Compile-time build options.
//!
//! These are plain constants rather than runtime configuration so that all
//! storage can live in `static`s on heapless targets.

/// Capacity of a pending-connection queue.
///
/// [`Listener::listen_with_backlog`](crate::server::Listener::listen_with_backlog)
/// refuses any backlog that does not leave at least one slot of headroom
/// below this, so a handshake already in flight when the backlog fills up
/// still has somewhere to go.
pub const SERVER_PENDING_COUNT: usize = 16;

/// Backlog advertised to the stack when `listen` is not given one explicitly.
pub const SERVER_DEFAULT_BACKLOG: u8 = 5;
