//! Sessions
//!
//! Each connected client gets a [`Session`] holding its own state tree. The
//! [`App`] keeps the session registry, routes inbound events to the right
//! session and turns the resulting updates into outbound deltas.
//!
//! Sessions never share mutable state. Different sessions can process events
//! in parallel, while events of one session run strictly one after another.

mod app;
mod connection;

pub use app::App;
pub use connection::Session;
