/*! A server-socket layer for event-driven TCP/IP stacks on bare-metal targets.

This crate sits between an embedded TCP/IP stack and application code that
wants the classic poll-driven server workflow: bind a port, poll for a
pending connection, claim it, service it. The stack hands established
connections to this layer from its receive path; the application drains
them at its own pace with [`Listener::accept`](server::Listener::accept),
which never blocks.

Buffering follows the same philosophy as the stacks this crate targets:
nothing is allocated behind your back. You allocate the pending-connection
queue (usually as a `static`), hand a reference to the
[`Listener`](server::Listener), and its capacity is fixed at build time in
[`config`].

Three pieces cooperate:

  * the [`Listener`](server::Listener) owns the bound, listening socket
    handle and the accept policy;
  * the [`PendingQueue`](queue::PendingQueue) holds connections the stack
    has accepted but the application has not yet claimed;
  * the [`AcceptSink`](queue::AcceptSink) is the stack-facing half of that
    queue, invoked from the stack's receive context.

The receive context is assumed to be interrupt-like: it may preempt the
application, but the two never run in parallel. Every piece of state both
sides can reach is mutated inside a `critical_section`, which is also what
excludes the stack's periodic timer processing. See [`stack`] for the
contract implementations must uphold.
*/

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_code)]

#[macro_use]
mod macros;

pub mod config;
pub mod queue;
pub mod server;
pub mod stack;
