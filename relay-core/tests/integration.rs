//! Integration Tests for Sessions, Dispatch and Deltas
//!
//! These tests drive complete apps through the public API: connect a session,
//! send events, and check the patches a client would receive.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;

use relay_core::prelude::*;
use relay_core::event::EventLoop;
use relay_core::state::StateTree;

fn increment_count(scope: &mut StateScope<'_>, _args: &[Value]) -> HandlerResult {
    scope.modify("count", |v| *v = Value::Int(v.as_i64().unwrap_or(0) + 1))?;
    Ok(Vec::new())
}

fn counter_schema() -> Arc<AppSchema> {
    let count = Var::field("count", VarType::Int);
    let counter = StateSchema::builder("counter")
        .unwrap()
        .field("count", VarType::Int, 0)
        .unwrap()
        .computed("double", count.mul(&Var::literal(2)).unwrap())
        .unwrap()
        .handler("increment", Handler::sync(increment_count))
        .unwrap()
        .build();
    AppSchema::compile(counter).unwrap()
}

fn counter_app() -> Arc<App> {
    Arc::new(App::new(counter_schema(), RuntimeConfig::default()).unwrap())
}

fn patch_json(delta: &OutboundDelta) -> String {
    serde_json::to_string(&delta.patch).unwrap()
}

/// The canonical counter: one increment yields the count and its double.
#[tokio::test]
async fn counter_increment_emits_count_and_double() {
    let app = counter_app();
    let initial = app.on_connect("s1").await.unwrap();
    assert_eq!(
        serde_json::to_string(&initial).unwrap(),
        r#"{"counter":{"count":0,"double":0}}"#
    );

    let deltas = app
        .process(InboundEvent::new("s1", "counter.increment", Vec::new()))
        .await
        .unwrap();
    assert_eq!(deltas.len(), 1);
    assert!(deltas[0].is_final);
    assert_eq!(deltas[0].error, None);
    assert_eq!(patch_json(&deltas[0]), r#"{"counter":{"count":1,"double":2}}"#);
}

/// An unknown handler changes nothing and the session stays usable.
#[tokio::test]
async fn unknown_handler_then_valid_event() {
    let app = counter_app();
    app.on_connect("s1").await.unwrap();

    let err = app
        .process(InboundEvent::new("s1", "counter.nope", Vec::new()))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        DispatchError::HandlerNotFound {
            path: "counter.nope".into()
        }
    );
    let err = app
        .process(InboundEvent::new("s1", "elsewhere.increment", Vec::new()))
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::HandlerNotFound { .. }));

    let session = app.session("s1").unwrap();
    assert!(!session.with_tree(|tree| tree.is_dirty()).await);

    let deltas = app
        .process(InboundEvent::new("s1", "counter.increment", Vec::new()))
        .await
        .unwrap();
    assert_eq!(patch_json(&deltas[0]), r#"{"counter":{"count":1,"double":2}}"#);
}

/// Events in one session never show up in another.
#[tokio::test]
async fn sessions_are_isolated() {
    let app = counter_app();
    app.on_connect("a").await.unwrap();
    app.on_connect("b").await.unwrap();

    for _ in 0..3 {
        app.process(InboundEvent::new("a", "counter.increment", Vec::new()))
            .await
            .unwrap();
    }
    let deltas = app
        .process(InboundEvent::new("b", "counter.increment", Vec::new()))
        .await
        .unwrap();
    assert_eq!(deltas[0].session_id, "b");
    assert_eq!(patch_json(&deltas[0]), r#"{"counter":{"count":1,"double":2}}"#);

    let a = app.on_connect("a").await.unwrap();
    assert_eq!(a.get("counter", "count"), Some(&Value::Int(3)));
}

/// Sessions can be driven concurrently from different tasks.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn sessions_run_in_parallel() {
    let app = counter_app();
    let mut tasks = Vec::new();
    for i in 0..8 {
        let app = Arc::clone(&app);
        tasks.push(tokio::spawn(async move {
            let id = format!("s{i}");
            app.on_connect(&id).await.unwrap();
            for _ in 0..=i {
                app.process(InboundEvent::new(id.as_str(), "counter.increment", Vec::new()))
                    .await
                    .unwrap();
            }
            app.on_connect(&id).await.unwrap()
        }));
    }
    for (i, task) in tasks.into_iter().enumerate() {
        let state = task.await.unwrap();
        assert_eq!(state.get("counter", "count"), Some(&Value::Int(i as i64 + 1)));
    }
}

fn todo_schema() -> Arc<AppSchema> {
    let items = Var::field("items", VarType::sequence(VarType::Str));
    let todo = StateSchema::builder("todo")
        .unwrap()
        .field("items", VarType::sequence(VarType::Str), Value::List(Vec::new()))
        .unwrap()
        .field("draft", VarType::Str, "")
        .unwrap()
        .computed("count", items.length().unwrap())
        .unwrap()
        .handler(
            "submit",
            Handler::sync(|scope, _| {
                let draft = scope.get("draft")?;
                scope.set("draft", "")?;
                Ok(vec![scope.event("add", vec![draft])])
            }),
        )
        .unwrap()
        .handler(
            "add",
            Handler::sync(|scope, args| {
                let item = args.first().cloned().unwrap_or_default();
                if item.as_str().is_some_and(str::is_empty) {
                    return Err(HandlerError::msg("empty item"));
                }
                scope.modify("items", |v| {
                    if let Value::List(list) = v {
                        list.push(item);
                    }
                })?;
                Ok(Vec::new())
            }),
        )
        .unwrap()
        .handler(
            "add_then_fail",
            Handler::sync(|scope, args| {
                scope.modify("items", |v| {
                    if let Value::List(list) = v {
                        list.extend(args.iter().cloned());
                    }
                })?;
                Err(HandlerError::msg("storage offline"))
            }),
        )
        .unwrap()
        .build();

    let root = StateSchema::builder("app")
        .unwrap()
        .child("todo", todo)
        .unwrap()
        .build();
    AppSchema::compile(root).unwrap()
}

/// Follow-up events are flushed separately, in order.
#[tokio::test]
async fn follow_up_events_flush_in_order() {
    let app = App::new(todo_schema(), RuntimeConfig::default()).unwrap();
    app.on_connect("s1").await.unwrap();

    let session = app.session("s1").unwrap();
    session
        .with_tree(|tree| tree.set(&FieldKey::new("app.todo", "draft"), "milk"))
        .await
        .unwrap();
    session.with_tree(|tree| tree.flush()).await.unwrap();

    let deltas = app
        .process(InboundEvent::new("s1", "app.todo.submit", Vec::new()))
        .await
        .unwrap();
    assert_eq!(deltas.len(), 2);
    assert!(!deltas[0].is_final);
    assert_eq!(patch_json(&deltas[0]), r#"{"app.todo":{"draft":""}}"#);
    assert!(deltas[1].is_final);
    assert_eq!(
        patch_json(&deltas[1]),
        r#"{"app.todo":{"count":1,"items":["milk"]}}"#
    );
}

/// A failing handler keeps what it changed and the session stays usable.
#[tokio::test]
async fn failure_is_reported_without_rollback() {
    let app = App::new(todo_schema(), RuntimeConfig::default()).unwrap();
    app.on_connect("s1").await.unwrap();

    let deltas = app
        .process(InboundEvent::new(
            "s1",
            "app.todo.add_then_fail",
            vec![Value::from("eggs")],
        ))
        .await
        .unwrap();
    assert_eq!(deltas.len(), 1);
    assert!(deltas[0].is_final);
    assert_eq!(deltas[0].error.as_deref(), Some("storage offline"));
    assert_eq!(
        patch_json(&deltas[0]),
        r#"{"app.todo":{"count":1,"items":["eggs"]}}"#
    );

    let deltas = app
        .process(InboundEvent::new("s1", "app.todo.add", vec![Value::from("ham")]))
        .await
        .unwrap();
    assert_eq!(deltas[0].error, None);
    assert_eq!(deltas[0].patch.get("app.todo", "count"), Some(&Value::Int(2)));
}

/// A chain of computed fields across containers settles in one flush.
#[test]
fn computed_cascade_settles_in_one_flush() {
    let x = Var::state_field("app", "x", VarType::Int);
    let y = Var::field("y", VarType::Int);
    let child = StateSchema::builder("stats")
        .unwrap()
        .computed("y", x.add(&Var::literal(1)).unwrap())
        .unwrap()
        .computed("z", y.mul(&Var::literal(10)).unwrap())
        .unwrap()
        .build();
    let root = StateSchema::builder("app")
        .unwrap()
        .field("x", VarType::Int, 0)
        .unwrap()
        .child("stats", child)
        .unwrap()
        .build();
    let mut tree = StateTree::new(AppSchema::compile(root).unwrap()).unwrap();

    tree.set(&FieldKey::new("app", "x"), 4).unwrap();
    let delta = tree.flush().unwrap();
    assert_eq!(
        serde_json::to_string(&delta).unwrap(),
        r#"{"app":{"x":4},"app.stats":{"y":5,"z":50}}"#
    );

    assert!(tree.flush().unwrap().is_empty());
}

/// Mutually dependent computed fields are rejected at compile time.
#[test]
fn computed_cycles_are_rejected() {
    let a = Var::field("a", VarType::Int);
    let b = Var::field("b", VarType::Int);
    let root = StateSchema::builder("app")
        .unwrap()
        .computed("a", b.add(&Var::literal(1)).unwrap())
        .unwrap()
        .computed("b", a.add(&Var::literal(1)).unwrap())
        .unwrap()
        .build();
    let err = AppSchema::compile(root).unwrap_err();
    match err {
        StateError::CyclicComputedDependency { cycle } => {
            assert!(cycle.len() >= 3);
            assert_eq!(cycle.first(), cycle.last());
        }
        other => panic!("unexpected error: {other}"),
    }
}

fn load_remote<'a, 'b>(
    scope: &'a mut StateScope<'b>,
    args: Vec<Value>,
) -> BoxFuture<'a, HandlerResult> {
    Box::pin(async move {
        let delay = args.first().and_then(Value::as_i64).unwrap_or(0);
        tokio::time::sleep(Duration::from_millis(delay as u64)).await;
        scope.modify("count", |v| *v = Value::Int(v.as_i64().unwrap_or(0) + 10))?;
        Ok::<_, HandlerError>(Vec::new())
    })
}

fn slow_counter_app() -> Arc<App> {
    let count = Var::field("count", VarType::Int);
    let counter = StateSchema::builder("counter")
        .unwrap()
        .field("count", VarType::Int, 0)
        .unwrap()
        .computed("double", count.mul(&Var::literal(2)).unwrap())
        .unwrap()
        .handler("increment", Handler::sync(increment_count))
        .unwrap()
        .handler("load", Handler::from_async(load_remote))
        .unwrap()
        .build();
    let schema = AppSchema::compile(counter).unwrap();
    Arc::new(App::new(schema, RuntimeConfig::default()).unwrap())
}

/// Async handlers hold the session until they finish.
#[tokio::test]
async fn async_handler_serializes_session_events() {
    let app = slow_counter_app();
    app.on_connect("s1").await.unwrap();

    let slow = {
        let app = Arc::clone(&app);
        tokio::spawn(async move {
            app.process(InboundEvent::new("s1", "counter.load", vec![Value::Int(50)]))
                .await
                .unwrap()
        })
    };
    let session = app.session("s1").unwrap();
    while !session.is_busy() {
        tokio::task::yield_now().await;
    }
    let fast = app
        .process(InboundEvent::new("s1", "counter.increment", Vec::new()))
        .await
        .unwrap();
    let slow = slow.await.unwrap();

    assert_eq!(patch_json(&slow[0]), r#"{"counter":{"count":10,"double":20}}"#);
    assert_eq!(patch_json(&fast[0]), r#"{"counter":{"count":11,"double":22}}"#);
}

/// A handler that outlives its session completes, but nothing is sent.
#[tokio::test]
async fn disconnect_discards_in_flight_deltas() {
    let app = slow_counter_app();
    app.on_connect("s1").await.unwrap();

    let pending = {
        let app = Arc::clone(&app);
        tokio::spawn(async move {
            app.process(InboundEvent::new("s1", "counter.load", vec![Value::Int(50)]))
                .await
        })
    };
    let session = app.session("s1").unwrap();
    while !session.is_busy() {
        tokio::task::yield_now().await;
    }
    assert!(app.on_disconnect("s1"));

    let deltas = pending.await.unwrap().unwrap();
    assert!(deltas.is_empty());
    assert_eq!(app.session_count(), 0);

    let err = app
        .process(InboundEvent::new("s1", "counter.increment", Vec::new()))
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::SessionNotFound { .. }));
}

/// Runaway follow-up chains stop at the configured bound.
#[tokio::test]
async fn event_chain_bound_comes_from_config() {
    let root = StateSchema::builder("app")
        .unwrap()
        .field("n", VarType::Int, 0)
        .unwrap()
        .handler(
            "again",
            Handler::sync(|scope, _| {
                scope.modify("n", |v| *v = Value::Int(v.as_i64().unwrap_or(0) + 1))?;
                Ok(vec![scope.event("again", Vec::new())])
            }),
        )
        .unwrap()
        .build();
    let config = RuntimeConfig::from_toml_str("max_event_chain = 3").unwrap();
    let app = App::new(AppSchema::compile(root).unwrap(), config).unwrap();
    app.on_connect("s1").await.unwrap();

    let deltas = app
        .process(InboundEvent::new("s1", "app.again", Vec::new()))
        .await
        .unwrap();
    assert_eq!(deltas.len(), 4);
    assert_eq!(deltas[2].patch.get("app", "n"), Some(&Value::Int(3)));
    let last = deltas.last().unwrap();
    assert!(last.is_final);
    assert!(last.patch.is_empty());
    assert_eq!(last.error.as_deref(), Some("event chain exceeded 3 events"));
}

fn ratio_app() -> App {
    let x = Var::field("x", VarType::Int);
    let y = Var::field("y", VarType::Int);
    let n = Var::field("n", VarType::Int);
    let root = StateSchema::builder("app")
        .unwrap()
        .field("x", VarType::Int, 0)
        .unwrap()
        .field("y", VarType::Int, 1)
        .unwrap()
        .field("n", VarType::Int, 1)
        .unwrap()
        .computed("next", x.add(&Var::literal(1)).unwrap())
        .unwrap()
        .computed("ratio", Var::literal(10).floor_div(&y).unwrap())
        .unwrap()
        .computed("banner", Var::literal("=").mul(&n).unwrap())
        .unwrap()
        .handler(
            "set",
            Handler::sync(|scope, args| {
                let [field, value] = args else {
                    return Err(HandlerError::msg("expected a field and a value"));
                };
                let field = field.as_str().unwrap_or_default().to_string();
                scope.set(&field, value.clone())?;
                Ok(Vec::new())
            }),
        )
        .unwrap()
        .build();
    App::new(AppSchema::compile(root).unwrap(), RuntimeConfig::default()).unwrap()
}

fn set(session_id: &str, field: &str, value: i64) -> InboundEvent {
    InboundEvent::new(session_id, "app.set", vec![Value::from(field), Value::Int(value)])
}

/// A computed field that cannot be evaluated is reported, and the client
/// still receives every other change.
#[tokio::test]
async fn computed_failure_keeps_client_in_sync() {
    let app = ratio_app();
    app.on_connect("s1").await.unwrap();

    app.process(set("s1", "x", 5)).await.unwrap();
    let deltas = app.process(set("s1", "y", 0)).await.unwrap();
    assert_eq!(deltas.len(), 1);
    assert_eq!(
        deltas[0].error.as_deref(),
        Some("failed to evaluate computed field `app.ratio`: division by zero")
    );
    assert_eq!(patch_json(&deltas[0]), r#"{"app":{"y":0}}"#);

    let deltas = app.process(set("s1", "y", 2)).await.unwrap();
    assert_eq!(deltas[0].error, None);
    assert_eq!(patch_json(&deltas[0]), r#"{"app":{"ratio":5,"y":2}}"#);

    let state = app.on_connect("s1").await.unwrap();
    assert_eq!(state.get("app", "next"), Some(&Value::Int(6)));
}

/// Huge repetitions fail the event instead of taking the session down.
#[tokio::test]
async fn oversized_values_are_rejected_per_session() {
    let app = ratio_app();
    app.on_connect("s1").await.unwrap();
    app.on_connect("s2").await.unwrap();

    let deltas = app.process(set("s1", "n", i64::MAX)).await.unwrap();
    assert!(deltas[0].error.as_deref().is_some_and(|e| e.contains("more than")));
    assert_eq!(patch_json(&deltas[0]), format!(r#"{{"app":{{"n":{}}}}}"#, i64::MAX));

    let deltas = app.process(set("s1", "n", 3)).await.unwrap();
    assert_eq!(patch_json(&deltas[0]), r#"{"app":{"banner":"===","n":3}}"#);

    let deltas = app.process(set("s2", "x", 1)).await.unwrap();
    assert_eq!(patch_json(&deltas[0]), r#"{"app":{"next":2,"x":1}}"#);
}

/// An event loop can be driven directly against a tree.
#[tokio::test]
async fn event_loop_without_sessions() {
    let mut tree = StateTree::new(counter_schema()).unwrap();
    let mut event_loop = EventLoop::default();
    let updates = event_loop
        .run(&mut tree, Event::new("counter.increment", Vec::new()))
        .await
        .unwrap();
    assert_eq!(
        serde_json::to_string(&updates[0].delta).unwrap(),
        r#"{"counter":{"count":1,"double":2}}"#
    );
}

/// Payloads survive both wire formats.
#[tokio::test]
async fn deltas_encode_for_the_wire() {
    let app = counter_app();
    app.on_connect("s1").await.unwrap();

    let inbound = WireFormat::MessagePack
        .encode(&InboundEvent::new("s1", "counter.increment", Vec::new()))
        .unwrap();
    let event: InboundEvent = WireFormat::MessagePack.decode(&inbound).unwrap();
    let deltas = app.handle(event).await;

    let json = WireFormat::Json.encode(&deltas[0]).unwrap();
    assert_eq!(
        String::from_utf8(json).unwrap(),
        r#"{"session_id":"s1","patch":{"counter":{"count":1,"double":2}},"final":true}"#
    );

    let packed = WireFormat::MessagePack.encode(&deltas[0]).unwrap();
    let decoded: OutboundDelta = WireFormat::MessagePack.decode(&packed).unwrap();
    assert_eq!(decoded, deltas[0]);
}
