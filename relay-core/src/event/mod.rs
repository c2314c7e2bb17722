//! Events
//!
//! Clients send events naming a handler path (`"<container path>.<handler>"`)
//! and a list of arguments. The [`EventLoop`] resolves the handler, runs it
//! against the session's tree, flushes the resulting delta and then
//! dispatches any follow-up events the handler returned.

mod dispatch;
mod handler;

pub use dispatch::{EventLoop, LoopPhase, StateUpdate, DEFAULT_MAX_CHAIN};
pub use handler::{Event, Handler, HandlerResult};
