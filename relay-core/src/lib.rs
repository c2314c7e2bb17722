//! Relay Core
//!
//! This crate provides the server-side core of the Relay server-driven UI
//! framework. It implements:
//!
//! - Typed expressions (Vars) that compose with operators, render to
//!   JavaScript for the component compiler, and evaluate on the server
//! - Per-session state trees with computed fields and client storage bindings
//! - A delta engine that turns mutations into minimal patches
//! - An event loop that runs handlers and their follow-up events
//! - Session management and the JSON / MessagePack wire protocol
//!
//! # Architecture
//!
//! - `var`: Var expressions, their type tags, rendering and evaluation
//! - `graph`: dependency graph between stored and computed fields
//! - `state`: schemas, the compiled app schema and per-session trees
//! - `delta`: patches and the fixed-point delta computation
//! - `event`: handlers and the dispatch loop
//! - `session`: the session registry and connect/disconnect hooks
//!
//! # Example
//!
//! ```rust,ignore
//! use relay_core::prelude::*;
//!
//! let count = Var::field("count", VarType::Int);
//! let counter = StateSchema::builder("counter")?
//!     .field("count", VarType::Int, 0)?
//!     .computed("double", count.mul(&Var::literal(2))?)?
//!     .handler("increment", Handler::sync(|scope, _| {
//!         scope.modify("count", |v| *v = Value::Int(v.as_i64().unwrap_or(0) + 1))?;
//!         Ok(Vec::new())
//!     }))?
//!     .build();
//!
//! let app = App::new(AppSchema::compile(counter)?, RuntimeConfig::default())?;
//! app.on_connect("s1").await?;
//! let deltas = app.process(InboundEvent::new("s1", "counter.increment", vec![])).await?;
//! // deltas[0].patch == {"counter": {"count": 1, "double": 2}}
//! ```

pub mod config;
pub mod delta;
pub mod error;
pub mod event;
pub mod graph;
pub mod logging;
pub mod protocol;
pub mod session;
pub mod state;
pub mod value;
pub mod var;

/// Commonly used types.
pub mod prelude {
    pub use crate::config::RuntimeConfig;
    pub use crate::delta::Delta;
    pub use crate::error::{DispatchError, FlushError, HandlerError, StateError, VarError};
    pub use crate::event::{Event, Handler, HandlerResult};
    pub use crate::protocol::{InboundEvent, OutboundDelta, WireFormat};
    pub use crate::session::App;
    pub use crate::state::{AppSchema, FieldDecl, StateSchema, StateScope, StateTree};
    pub use crate::value::Value;
    pub use crate::var::{FieldKey, Var, VarType};
}
