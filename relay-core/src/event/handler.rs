//! Event Handlers
//!
//! A [`Handler`] mutates the state of the container that declares it and may
//! return follow-up [`Event`]s. Handlers come in two forms:
//!
//! - synchronous closures, which run to completion immediately;
//! - asynchronous functions, which may await external work. While one is
//!   suspended it keeps exclusive access to the session's tree.
//!
//! # Example
//!
//! ```rust,ignore
//! let increment = Handler::sync(|scope, _args| {
//!     scope.modify("count", |v| *v = Value::Int(v.as_i64().unwrap_or(0) + 1))?;
//!     Ok(Vec::new())
//! });
//! ```

use std::fmt;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::error::HandlerError;
use crate::state::StateScope;
use crate::value::Value;

/// Result of a handler: follow-up events to dispatch after the flush.
pub type HandlerResult = Result<Vec<Event>, HandlerError>;

type SyncFn = dyn Fn(&mut StateScope<'_>, &[Value]) -> HandlerResult + Send + Sync;

type AsyncFn = dyn for<'a, 'b> Fn(&'a mut StateScope<'b>, Vec<Value>) -> BoxFuture<'a, HandlerResult>
    + Send
    + Sync;

/// An event addressed to a handler by its full path,
/// `"<container path>.<handler name>"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub handler: String,
    #[serde(default)]
    pub args: Vec<Value>,
}

impl Event {
    pub fn new(handler: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            handler: handler.into(),
            args,
        }
    }
}

/// An executable event handler. Cloning is cheap.
#[derive(Clone)]
pub enum Handler {
    Sync(Arc<SyncFn>),
    Async(Arc<AsyncFn>),
}

impl Handler {
    /// Wrap a synchronous closure.
    pub fn sync<F>(f: F) -> Self
    where
        F: Fn(&mut StateScope<'_>, &[Value]) -> HandlerResult + Send + Sync + 'static,
    {
        Handler::Sync(Arc::new(f))
    }

    /// Wrap an asynchronous function.
    ///
    /// ```rust,ignore
    /// fn load<'a, 'b>(scope: &'a mut StateScope<'b>, args: Vec<Value>) -> BoxFuture<'a, HandlerResult> {
    ///     Box::pin(async move {
    ///         let data = fetch(&args).await?;
    ///         scope.set("data", data)?;
    ///         Ok::<_, HandlerError>(Vec::new())
    ///     })
    /// }
    /// let handler = Handler::from_async(load);
    /// ```
    pub fn from_async<F>(f: F) -> Self
    where
        F: for<'a, 'b> Fn(&'a mut StateScope<'b>, Vec<Value>) -> BoxFuture<'a, HandlerResult>
            + Send
            + Sync
            + 'static,
    {
        Handler::Async(Arc::new(f))
    }

    pub fn is_async(&self) -> bool {
        matches!(self, Handler::Async(_))
    }

    /// Run the handler against `scope`.
    pub async fn invoke(&self, scope: &mut StateScope<'_>, args: Vec<Value>) -> HandlerResult {
        match self {
            Handler::Sync(f) => f(scope, &args),
            Handler::Async(f) => f(scope, args).await,
        }
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Handler::Sync(_) => f.write_str("Handler::Sync"),
            Handler::Async(_) => f.write_str("Handler::Async"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{AppSchema, StateSchema, StateTree};
    use crate::var::VarType;

    fn tree() -> StateTree {
        let root = StateSchema::builder("app")
            .unwrap()
            .field("count", VarType::Int, 0)
            .unwrap()
            .build();
        StateTree::new(AppSchema::compile(root).unwrap()).unwrap()
    }

    fn add_later<'a, 'b>(
        scope: &'a mut StateScope<'b>,
        args: Vec<Value>,
    ) -> BoxFuture<'a, HandlerResult> {
        Box::pin(async move {
            tokio::task::yield_now().await;
            let amount = args.first().and_then(Value::as_i64).unwrap_or(1);
            scope.set("count", amount)?;
            Ok::<_, HandlerError>(vec![scope.event("done", Vec::new())])
        })
    }

    #[tokio::test]
    async fn sync_handler_mutates_scope() {
        let handler = Handler::sync(|scope, args| {
            scope.set("count", args[0].clone())?;
            Ok(Vec::new())
        });
        assert!(!handler.is_async());

        let mut tree = tree();
        let mut scope = tree.scope("app").unwrap();
        let events = handler.invoke(&mut scope, vec![Value::Int(3)]).await.unwrap();
        assert!(events.is_empty());
        assert_eq!(scope.get("count").unwrap(), Value::Int(3));
    }

    #[tokio::test]
    async fn async_handler_returns_follow_ups() {
        let handler = Handler::from_async(add_later);
        assert!(handler.is_async());

        let mut tree = tree();
        let mut scope = tree.scope("app").unwrap();
        let events = handler.invoke(&mut scope, vec![Value::Int(9)]).await.unwrap();
        assert_eq!(events, vec![Event::new("app.done", Vec::new())]);
        assert_eq!(scope.get("count").unwrap(), Value::Int(9));
    }

    #[tokio::test]
    async fn failures_surface_as_errors() {
        let handler = Handler::sync(|_, _| Err(HandlerError::msg("nope")));
        let mut tree = tree();
        let mut scope = tree.scope("app").unwrap();
        let err = handler.invoke(&mut scope, Vec::new()).await.unwrap_err();
        assert_eq!(err, HandlerError::msg("nope"));
    }

    #[test]
    fn events_deserialize_without_args() {
        let event: Event = serde_json::from_str(r#"{"handler": "app.reset"}"#).unwrap();
        assert_eq!(event, Event::new("app.reset", Vec::new()));
    }
}
