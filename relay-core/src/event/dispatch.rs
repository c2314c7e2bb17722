//! Event Loop
//!
//! The [`EventLoop`] runs one inbound event, and the follow-up events its
//! handlers return, against a session's [`StateTree`].
//!
//! # Phases
//!
//! ```text
//! Idle ──> Dispatching ──> Flushing ──┬──> Idle
//!               ^                     │
//!               └──── next follow-up ─┘
//! ```
//!
//! Every handler runs to completion before its delta is flushed. Follow-up
//! events are queued and dispatched in order, each after the previous flush,
//! so their mutations never interleave.
//!
//! A handler failure still flushes whatever the handler changed before it
//! failed. Nothing is rolled back, and the rest of the chain is dropped. A
//! computed field that fails to evaluate during the flush stops the chain the
//! same way, with the rest of the delta still delivered.

use std::collections::VecDeque;
use std::sync::Arc;

use serde::Serialize;
use tracing::Instrument;

use crate::delta::Delta;
use crate::error::{DispatchError, FlushError};
use crate::state::StateTree;

use super::handler::Event;

/// Default bound on the number of events one inbound event may trigger.
pub const DEFAULT_MAX_CHAIN: usize = 1024;

/// Where the loop is in processing an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopPhase {
    Idle,
    Dispatching,
    Flushing,
}

/// The result of dispatching one event of a chain.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateUpdate {
    /// Handler path that produced this update.
    pub handler: String,
    pub delta: Delta,
    /// Failure message for the client, if the chain stopped on an error.
    pub error: Option<String>,
    /// True for the last update of the chain.
    pub is_final: bool,
}

impl StateUpdate {
    fn failed(handler: String, delta: Delta, error: impl ToString) -> Self {
        Self {
            handler,
            delta,
            error: Some(error.to_string()),
            is_final: true,
        }
    }
}

/// Dispatches events for one session.
#[derive(Debug)]
pub struct EventLoop {
    phase: LoopPhase,
    max_chain: usize,
}

impl Default for EventLoop {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CHAIN)
    }
}

impl EventLoop {
    /// Create a loop that stops after `max_chain` events per inbound event.
    pub fn new(max_chain: usize) -> Self {
        Self {
            phase: LoopPhase::Idle,
            max_chain: max_chain.max(1),
        }
    }

    pub fn phase(&self) -> LoopPhase {
        self.phase
    }

    pub fn max_chain(&self) -> usize {
        self.max_chain
    }

    /// Dispatch `event` and its follow-ups, returning one update per handler
    /// run.
    ///
    /// An unknown handler for the inbound event itself is an error and
    /// leaves the tree untouched. Failures further down the chain are
    /// reported in the last update instead.
    pub async fn run(
        &mut self,
        tree: &mut StateTree,
        event: Event,
    ) -> Result<Vec<StateUpdate>, DispatchError> {
        if tree.schema().resolve_handler(&event.handler).is_none() {
            return Err(DispatchError::HandlerNotFound {
                path: event.handler,
            });
        }

        let result = self.run_chain(tree, event).await;
        self.phase = LoopPhase::Idle;
        result
    }

    async fn run_chain(
        &mut self,
        tree: &mut StateTree,
        event: Event,
    ) -> Result<Vec<StateUpdate>, DispatchError> {
        let schema = Arc::clone(tree.schema());
        let mut queue = VecDeque::from([event]);
        let mut updates = Vec::new();
        let mut dispatched = 0usize;

        while let Some(Event { handler: handler_path, args }) = queue.pop_front() {
            if dispatched == self.max_chain {
                let error = DispatchError::EventChainLimit {
                    limit: self.max_chain,
                };
                tracing::warn!(handler = %handler_path, %error, "event chain stopped");
                updates.push(StateUpdate::failed(handler_path, Delta::new(), error));
                break;
            }
            dispatched += 1;

            let Some((path, handler)) = schema.resolve_handler(&handler_path) else {
                let error = DispatchError::HandlerNotFound {
                    path: handler_path.clone(),
                };
                tracing::warn!(%error, "follow-up event dropped");
                updates.push(StateUpdate::failed(handler_path, Delta::new(), error));
                break;
            };

            self.phase = LoopPhase::Dispatching;
            let span = tracing::debug_span!("dispatch", handler = %handler_path);
            let mut scope = tree.scope(path)?;
            let mut outcome = handler.invoke(&mut scope, args).instrument(span).await;
            drop(scope);

            self.phase = LoopPhase::Flushing;
            let delta = match tree.flush() {
                Ok(delta) => delta,
                Err(FlushError { delta, error }) => {
                    tracing::warn!(handler = %handler_path, %error, "flush incomplete");
                    if outcome.is_ok() {
                        outcome = Err(error.into());
                    }
                    delta
                }
            };

            match outcome {
                Ok(follow_ups) => {
                    queue.extend(follow_ups);
                    updates.push(StateUpdate {
                        handler: handler_path,
                        delta,
                        error: None,
                        is_final: queue.is_empty(),
                    });
                }
                Err(error) => {
                    tracing::warn!(handler = %handler_path, %error, "handler failed");
                    updates.push(StateUpdate::failed(handler_path, delta, error));
                    break;
                }
            }
        }

        Ok(updates)
    }
}
