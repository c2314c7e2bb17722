//! State
//!
//! This module implements the typed, observable state that UI components are
//! bound to.
//!
//! # Concepts
//!
//! ## Schemas
//!
//! A [`StateSchema`] declares one container type: typed fields, computed
//! fields defined by [`Var`](crate::var::Var)s, event handlers and named
//! children. Schemas compose by copying base declarations, never by runtime
//! lookup.
//!
//! ## App Schema
//!
//! [`AppSchema::compile`] places every container of the tree at its dotted
//! path, checks computed-field references and builds the dependency graph.
//! The result is immutable and shared by every session through an `Arc`.
//!
//! ## Trees
//!
//! A [`StateTree`] is one session's instance of the app schema. Children are
//! owned by their parents; a parent is only referenced by path. Assigning a
//! field marks it dirty and invalidates its computed dependents, which are
//! recomputed lazily on read or during the next flush.

mod computed;
mod container;
mod registry;
mod schema;
mod scope;
mod storage;
mod tree;

pub use computed::{ComputedSlot, MemoState};
pub use container::StateContainer;
pub use registry::{global, install, AppSchema, ContainerInfo};
pub use schema::{FieldDecl, StateSchema, StateSchemaBuilder};
pub use scope::StateScope;
pub use storage::{
    ClientStorage, ClientStorageManifest, CookieOptions, LocalStorageOptions,
    SessionStorageOptions,
};
pub use tree::StateTree;
