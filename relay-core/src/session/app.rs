//! Apps
//!
//! An [`App`] serves every session of one compiled [`AppSchema`]. The schema
//! is shared read-only; each session gets its own [`StateTree`].
//!
//! # Lifecycle
//!
//! 1. [`App::on_connect`] creates the session (or reattaches to it) and
//!    returns the full state for the client to hydrate from.
//! 2. [`App::process`] runs inbound events and returns the deltas to send.
//! 3. [`App::on_disconnect`] drops the session. A handler that is still
//!    running completes, but its deltas are discarded.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tracing::Instrument;

use crate::config::RuntimeConfig;
use crate::delta::Delta;
use crate::error::{ConfigError, DispatchError, StateError};
use crate::protocol::{InboundEvent, OutboundDelta};
use crate::state::{AppSchema, StateTree};

use super::connection::Session;

/// The session registry of one app.
#[derive(Debug)]
pub struct App {
    schema: Arc<AppSchema>,
    config: RuntimeConfig,
    sessions: DashMap<String, Arc<Session>>,
}

impl App {
    pub fn new(schema: Arc<AppSchema>, config: RuntimeConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            schema,
            config,
            sessions: DashMap::new(),
        })
    }

    /// An app for the process-wide schema, if one is installed.
    pub fn from_global(config: RuntimeConfig) -> Option<Result<Self, ConfigError>> {
        crate::state::global().map(|schema| Self::new(schema, config))
    }

    pub fn schema(&self) -> &Arc<AppSchema> {
        &self.schema
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn session(&self, session_id: &str) -> Option<Arc<Session>> {
        self.sessions.get(session_id).map(|entry| Arc::clone(entry.value()))
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Create or reattach a session and return its full current state.
    pub async fn on_connect(&self, session_id: &str) -> Result<Delta, StateError> {
        let session = match self.session(session_id) {
            Some(session) => {
                tracing::info!(session = %session_id, "session reattached");
                session
            }
            None => {
                let tree = StateTree::new(Arc::clone(&self.schema))?;
                let session = Arc::new(Session::new(
                    session_id,
                    tree,
                    self.config.max_event_chain,
                ));
                let entry = self.sessions.entry(session_id.to_string()).or_insert(session);
                tracing::info!(session = %session_id, "session connected");
                Arc::clone(entry.value())
            }
        };

        session.set_connected(true);
        session.touch();
        session.with_tree(StateTree::snapshot).await
    }

    /// Forget a session. Returns `false` if it was not connected.
    pub fn on_disconnect(&self, session_id: &str) -> bool {
        match self.sessions.remove(session_id) {
            Some((_, session)) => {
                session.set_connected(false);
                tracing::info!(session = %session_id, busy = session.is_busy(), "session disconnected");
                true
            }
            None => false,
        }
    }

    /// Run an inbound event and return the deltas for its session.
    ///
    /// Returns no deltas if the session disconnected while the event ran.
    pub async fn process(&self, inbound: InboundEvent) -> Result<Vec<OutboundDelta>, DispatchError> {
        let (session_id, event) = inbound.into_event();
        let session = self
            .session(&session_id)
            .ok_or_else(|| DispatchError::SessionNotFound {
                session_id: session_id.clone(),
            })?;

        let span = tracing::debug_span!("event", session = %session_id, handler = %event.handler);
        let updates = session.dispatch(event).instrument(span).await?;

        if !session.is_connected() {
            tracing::debug!(session = %session_id, "discarding deltas of disconnected session");
            return Ok(Vec::new());
        }
        Ok(updates
            .into_iter()
            .map(|update| OutboundDelta::from_update(&session_id, update))
            .collect())
    }

    /// Like [`App::process`], with dispatch errors reported to the client as
    /// a final error delta.
    pub async fn handle(&self, inbound: InboundEvent) -> Vec<OutboundDelta> {
        let session_id = inbound.session_id.clone();
        match self.process(inbound).await {
            Ok(deltas) => deltas,
            Err(error) => {
                tracing::debug!(session = %session_id, %error, "event rejected");
                vec![OutboundDelta::error(&session_id, error)]
            }
        }
    }

    /// Disconnect sessions idle for longer than the configured timeout.
    pub fn reap_idle(&self) -> Vec<String> {
        match self.config.idle_timeout() {
            Some(timeout) => self.reap_idle_longer_than(timeout),
            None => Vec::new(),
        }
    }

    /// Disconnect sessions idle for at least `timeout`. Sessions in the
    /// middle of an event are skipped.
    pub fn reap_idle_longer_than(&self, timeout: Duration) -> Vec<String> {
        let idle: Vec<String> = self
            .sessions
            .iter()
            .filter(|entry| !entry.is_busy() && entry.idle_for() >= timeout)
            .map(|entry| entry.key().clone())
            .collect();

        for session_id in &idle {
            self.on_disconnect(session_id);
        }
        if !idle.is_empty() {
            tracing::info!(reaped = idle.len(), "reaped idle sessions");
        }
        idle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Handler;
    use crate::state::StateSchema;
    use crate::value::Value;
    use crate::var::VarType;

    fn app() -> App {
        let root = StateSchema::builder("app")
            .unwrap()
            .field("n", VarType::Int, 0)
            .unwrap()
            .handler(
                "bump",
                Handler::sync(|scope, _| {
                    scope.modify("n", |v| *v = Value::Int(v.as_i64().unwrap_or(0) + 1))?;
                    Ok(Vec::new())
                }),
            )
            .unwrap()
            .build();
        App::new(AppSchema::compile(root).unwrap(), RuntimeConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn connect_returns_full_state() {
        let app = app();
        let state = app.on_connect("s1").await.unwrap();
        assert_eq!(state.get("app", "n"), Some(&Value::Int(0)));
        assert_eq!(app.session_count(), 1);
    }

    #[tokio::test]
    async fn reconnect_keeps_state() {
        let app = app();
        app.on_connect("s1").await.unwrap();
        app.process(InboundEvent::new("s1", "app.bump", Vec::new()))
            .await
            .unwrap();

        let state = app.on_connect("s1").await.unwrap();
        assert_eq!(state.get("app", "n"), Some(&Value::Int(1)));
        assert_eq!(app.session_count(), 1);
    }

    #[tokio::test]
    async fn unknown_session_is_rejected() {
        let app = app();
        let err = app
            .process(InboundEvent::new("ghost", "app.bump", Vec::new()))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            DispatchError::SessionNotFound {
                session_id: "ghost".into()
            }
        );

        let deltas = app.handle(InboundEvent::new("ghost", "app.bump", Vec::new())).await;
        assert_eq!(deltas.len(), 1);
        assert!(deltas[0].is_final);
        assert!(deltas[0].patch.is_empty());
        assert_eq!(deltas[0].error.as_deref(), Some("no connected session `ghost`"));
    }

    #[tokio::test]
    async fn disconnect_releases_session() {
        let app = app();
        app.on_connect("s1").await.unwrap();
        assert!(app.on_disconnect("s1"));
        assert!(!app.on_disconnect("s1"));
        assert_eq!(app.session_count(), 0);
    }

    #[tokio::test]
    async fn reaps_only_when_configured() {
        let app = app();
        app.on_connect("s1").await.unwrap();
        assert!(app.reap_idle().is_empty());

        assert_eq!(app.reap_idle_longer_than(Duration::ZERO), vec!["s1".to_string()]);
        assert_eq!(app.session_count(), 0);
    }

    #[test]
    fn rejects_invalid_config() {
        let root = StateSchema::builder("app").unwrap().build();
        let config = RuntimeConfig {
            max_event_chain: 0,
            ..RuntimeConfig::default()
        };
        assert!(App::new(AppSchema::compile(root).unwrap(), config).is_err());
    }
}
