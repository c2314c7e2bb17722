//! Sessions
//!
//! A [`Session`] owns one client's [`StateTree`] together with the
//! [`EventLoop`] that mutates it. Both sit behind a single async mutex, so an
//! event and its follow-up chain finish before the next event of the same
//! session starts, even while an async handler is suspended.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::error::DispatchError;
use crate::event::{Event, EventLoop, StateUpdate};
use crate::state::StateTree;

#[derive(Debug)]
struct SessionState {
    tree: StateTree,
    event_loop: EventLoop,
}

/// One connected client.
#[derive(Debug)]
pub struct Session {
    id: String,
    state: tokio::sync::Mutex<SessionState>,
    connected: AtomicBool,
    last_active: Mutex<Instant>,
}

impl Session {
    pub(crate) fn new(id: impl Into<String>, tree: StateTree, max_chain: usize) -> Self {
        Self {
            id: id.into(),
            state: tokio::sync::Mutex::new(SessionState {
                tree,
                event_loop: EventLoop::new(max_chain),
            }),
            connected: AtomicBool::new(true),
            last_active: Mutex::new(Instant::now()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub(crate) fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Release);
    }

    /// Time since the session last connected or received an event.
    pub fn idle_for(&self) -> Duration {
        self.last_active.lock().elapsed()
    }

    pub(crate) fn touch(&self) {
        *self.last_active.lock() = Instant::now();
    }

    /// True while an event is being processed.
    pub fn is_busy(&self) -> bool {
        self.state.try_lock().is_err()
    }

    /// Run an event chain. Waits for any chain already in progress.
    pub(crate) async fn dispatch(&self, event: Event) -> Result<Vec<StateUpdate>, DispatchError> {
        let mut state = self.state.lock().await;
        self.touch();
        let SessionState { tree, event_loop } = &mut *state;
        event_loop.run(tree, event).await
    }

    /// Access the tree once no event is in progress.
    pub async fn with_tree<R>(&self, f: impl FnOnce(&mut StateTree) -> R) -> R {
        let mut state = self.state.lock().await;
        f(&mut state.tree)
    }
}
