#![allow(clippy::unwrap_used)]
// End-to-end tests for the read and write paths through `Engine`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use tokio::sync::oneshot;

use entsync_core::{
    Action, ActionConfig, ActionConfigPatch, ActionsSet, CacheMutation, CoreError, Engine,
    EngineConfig, IndexedParams, LoadSource, LoaderOptions, Params, SessionScope, Severity,
    UpdaterOptions,
};

// ── Helpers ─────────────────────────────────────────────────────────

fn params(value: Value) -> Params {
    value.as_object().unwrap().clone()
}

type Notes = Arc<Mutex<Vec<(String, String, Severity)>>>;

fn recording_engine(config: EngineConfig) -> (Engine, Notes) {
    let notes: Notes = Arc::new(Mutex::new(Vec::new()));
    let sink = {
        let notes = Arc::clone(&notes);
        move |title: &str, message: &str, severity: Severity| {
            notes
                .lock()
                .unwrap()
                .push((title.to_owned(), message.to_owned(), severity));
        }
    };
    (Engine::with_notifier(config, sink), notes)
}

fn ids(items: &[Value]) -> Vec<String> {
    items
        .iter()
        .map(|i| i["id"].as_str().unwrap().to_owned())
        .collect()
}

fn volumes(calls: Arc<AtomicUsize>) -> ActionsSet {
    let mut set = ActionsSet::new(
        ActionConfigPatch::new()
            .cache_key("volumes")
            .entity_name("Volume"),
    );
    set.add(Action::list(move |_| {
        let calls = Arc::clone(&calls);
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(json!([{"id": "v1", "size": 10}, {"id": "v2", "size": 20}]))
        }
    }))
    .unwrap();
    set.add(Action::create(|p: Params| async move {
        Ok(json!({"id": p["id"], "size": p["size"]}))
    }))
    .unwrap();
    set.add(Action::delete(|_| async { Ok(Value::Null) }))
        .unwrap();
    set
}

// ── Read path ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_list_create_delete_round_trip() {
    let calls = Arc::new(AtomicUsize::new(0));
    let set = volumes(Arc::clone(&calls));
    let engine = Engine::default();

    let loader = engine.loader(set.get("list").unwrap(), Params::new(), LoaderOptions::new());
    loader.start().await.unwrap();
    assert_eq!(ids(&loader.data()), ["v1", "v2"]);

    let create = engine.action_updater(set.get("create").unwrap(), UpdaterOptions::new());
    let (ok, _) = create
        .update(params(json!({"id": "v3", "size": 5})))
        .await
        .unwrap();
    assert!(ok);
    assert_eq!(ids(&loader.data()), ["v1", "v2", "v3"]);

    let delete = engine.action_updater(set.get("delete").unwrap(), UpdaterOptions::new());
    delete.update(params(json!({"id": "v1"}))).await.unwrap();
    assert_eq!(ids(&loader.data()), ["v2", "v3"]);

    // Served from cache: the list callback ran once.
    loader.load(false).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_uncached_list_replaces_slice() {
    let engine = Engine::default();
    let round = Arc::new(AtomicUsize::new(0));
    let action = Arc::new(
        Action::list({
            let round = Arc::clone(&round);
            move |_| {
                let n = round.fetch_add(1, Ordering::SeqCst);
                async move {
                    Ok(if n == 0 {
                        json!([{"id": "a"}, {"id": "b"}])
                    } else {
                        json!([{"id": "c"}])
                    })
                }
            }
        })
        .with_config(ActionConfig::new("images").cache(false)),
    );

    let loader = engine.loader(action, Params::new(), LoaderOptions::new());
    loader.start().await.unwrap();
    loader.reload().await.unwrap();
    assert_eq!(ids(&engine.store().data("images")), ["c"]);
}

#[tokio::test]
async fn test_slices_stay_partitioned() {
    let engine = Engine::default();
    let action = Arc::new(
        Action::list(|p: Params| async move {
            let cluster = p["clusterId"].as_str().unwrap().to_owned();
            Ok(json!([{"id": "n1", "owner": cluster}]))
        })
        .with_config(ActionConfig::new("nodes").index_by(["clusterId"])),
    );

    let east = engine.loader(
        Arc::clone(&action),
        params(json!({"clusterId": "east"})),
        LoaderOptions::new(),
    );
    let west = engine.loader(action, params(json!({"clusterId": "west"})), LoaderOptions::new());
    east.start().await.unwrap();
    west.start().await.unwrap();

    // Same id in two slices: both survive.
    assert_eq!(engine.store().data("nodes").len(), 2);
    assert_eq!(east.data()[0]["owner"], json!("east"));
    assert_eq!(west.data()[0]["owner"], json!("west"));
    assert_eq!(engine.store().fetched_params("nodes").len(), 2);
}

#[tokio::test]
async fn test_incomplete_params_never_call() {
    let calls = Arc::new(AtomicUsize::new(0));
    let engine = Engine::default();
    let action = Arc::new(
        Action::list({
            let calls = Arc::clone(&calls);
            move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(json!([])) }
            }
        })
        .with_config(ActionConfig::new("pods").index_by(["clusterId"])),
    );

    let loader = engine.loader(action, Params::new(), LoaderOptions::new());
    loader.start().await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(loader.data().is_empty());
    assert!(!loader.loading());
}

#[tokio::test]
async fn test_create_then_delete_round_trip_in_slice() {
    let engine = Engine::default();
    let config = ActionConfig::new("projects")
        .unique_identifier(["id"])
        .index_by(["projectId"]);
    let create = Action::create(|_| async { Ok(json!({"id": "1", "name": "foo"})) })
        .with_config(config.clone());
    let delete = Action::delete(|_| async { Ok(Value::Null) }).with_config(config);

    create
        .call(engine.store(), params(json!({"projectId": "p1", "name": "foo"})))
        .await
        .unwrap();
    assert_eq!(
        *engine.store().data("projects"),
        vec![json!({"id": "1", "name": "foo", "projectId": "p1"})]
    );

    delete
        .call(engine.store(), params(json!({"projectId": "p1", "id": "1"})))
        .await
        .unwrap();
    assert!(engine.store().data("projects").is_empty());
}

#[tokio::test]
async fn test_cache_keys_are_isolated() {
    let engine = Engine::default();
    let a = Action::create(|_| async { Ok(json!({"id": "1", "kind": "a"})) })
        .with_config(ActionConfig::new("alpha"));
    let b = Action::create(|_| async { Ok(json!({"id": "1", "kind": "b"})) })
        .with_config(ActionConfig::new("beta"));

    a.call(engine.store(), Params::new()).await.unwrap();
    b.call(engine.store(), Params::new()).await.unwrap();
    Action::delete(|_| async { Ok(Value::Null) })
        .with_config(ActionConfig::new("alpha"))
        .call(engine.store(), params(json!({"id": "1"})))
        .await
        .unwrap();

    assert!(engine.store().data("alpha").is_empty());
    assert_eq!(engine.store().data("beta")[0]["kind"], json!("b"));
}

#[tokio::test]
async fn test_failed_load_keeps_stale_data_and_notifies() {
    let (engine, notes) = recording_engine(EngineConfig::default());
    let fail = Arc::new(AtomicUsize::new(0));
    let source = LoadSource::function({
        let fail = Arc::clone(&fail);
        move |_, _| {
            let failing = fail.load(Ordering::SeqCst) > 0;
            async move {
                if failing {
                    Err(CoreError::Api {
                        message: "gateway timeout".into(),
                        status: Some(504),
                    })
                } else {
                    Ok(json!([{"id": "t1"}]))
                }
            }
        }
    });

    let loader = engine.loader(
        source,
        Params::new(),
        LoaderOptions::new().error_message("Could not load tenants"),
    );
    loader.start().await.unwrap();
    fail.store(1, Ordering::SeqCst);
    loader.reload().await.unwrap();

    assert_eq!(ids(&loader.data()), ["t1"]);
    let state = loader.state();
    assert_eq!(state.error.as_deref(), Some("API error: gateway timeout"));
    assert!(!state.loading);

    let notes = notes.lock().unwrap();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].1, "Could not load tenants");
    assert_eq!(notes[0].2, Severity::Error);
}

#[tokio::test]
async fn test_selector_failure_triggers_single_refetch() {
    let (engine, notes) = recording_engine(EngineConfig::default());
    let calls = Arc::new(AtomicUsize::new(0));
    let action = Arc::new(
        Action::list({
            let calls = Arc::clone(&calls);
            move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(json!([{"id": "s1"}])) }
            }
        })
        .with_config(ActionConfig::new("servers")),
    );
    let corrupt = || {
        engine.store().dispatch(CacheMutation::Add {
            cache_key: "servers".into(),
            item: json!("garbage"),
            indexed: IndexedParams::default(),
        });
    };

    corrupt();
    let loader = engine.loader(action, Params::new(), LoaderOptions::new());
    loader.start().await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(ids(&loader.data()), ["s1"]);

    // The retry is spent: a second failure only notifies.
    corrupt();
    assert!(loader.data().is_empty());
    tokio::task::yield_now().await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(notes.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn test_selector_failure_on_read_schedules_refetch() {
    let (engine, notes) = recording_engine(EngineConfig::default());
    let calls = Arc::new(AtomicUsize::new(0));
    let action = Arc::new(
        Action::list({
            let calls = Arc::clone(&calls);
            move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(json!([{"id": "s1"}])) }
            }
        })
        .with_config(ActionConfig::new("servers")),
    );
    let loader = engine.loader(action, Params::new(), LoaderOptions::new());
    loader.start().await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    engine.store().dispatch(CacheMutation::Add {
        cache_key: "servers".into(),
        item: json!(42),
        indexed: IndexedParams::default(),
    });
    assert!(loader.data().is_empty());

    for _ in 0..50 {
        if calls.load(Ordering::SeqCst) == 2 && !loader.loading() {
            break;
        }
        tokio::task::yield_now().await;
    }
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(ids(&loader.data()), ["s1"]);
    // Once from the read, once from the refetch's own evaluation.
    assert_eq!(notes.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn test_torn_down_loader_still_writes_store() {
    let engine = Engine::default();
    let action = Arc::new(
        Action::list(|_| async { Ok(json!([{"id": "k1"}])) })
            .with_config(ActionConfig::new("keypairs")),
    );
    let loader = engine.loader(action, Params::new(), LoaderOptions::new());
    let mut state = loader.subscribe();
    loader.teardown();
    loader.start().await.unwrap();

    assert_eq!(engine.store().data("keypairs").len(), 1);
    assert!(state.latest().data.is_empty());
    assert!(!engine.store().loading("keypairs"));
}

#[tokio::test]
async fn test_scope_change_reevaluates() {
    let engine = Engine::default();
    let calls = Arc::new(AtomicUsize::new(0));
    let source = LoadSource::function({
        let calls = Arc::clone(&calls);
        move |_, _| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(json!([{"id": "r1"}])) }
        }
    });
    let loader = engine.loader(source, Params::new(), LoaderOptions::new());
    loader.start().await.unwrap();

    let watcher = tokio::spawn({
        let loader = loader.clone();
        async move { loader.watch_scope().await }
    });
    tokio::task::yield_now().await;
    engine.set_scope(SessionScope::new("acme", "eu-west"));
    for _ in 0..50 {
        if calls.load(Ordering::SeqCst) == 2 {
            break;
        }
        tokio::task::yield_now().await;
    }
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    loader.teardown();
    watcher.await.unwrap().unwrap();
}

// ── Write path ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_updates_run_in_fifo_order() {
    let engine = Engine::default();
    let log = Arc::new(Mutex::new(Vec::<String>::new()));
    let (release, gate) = oneshot::channel::<()>();
    let gate = Arc::new(Mutex::new(Some(gate)));
    let completions = Arc::new(Mutex::new(Vec::new()));

    let updater = engine.updater(
        {
            let log = Arc::clone(&log);
            move |p: Params| {
                let log = Arc::clone(&log);
                let gate = Arc::clone(&gate);
                async move {
                    let name = p["name"].as_str().unwrap().to_owned();
                    log.lock().unwrap().push(format!("start:{name}"));
                    if name == "first" {
                        let rx = gate.lock().unwrap().take();
                        if let Some(rx) = rx {
                            rx.await.unwrap();
                        }
                    }
                    log.lock().unwrap().push(format!("end:{name}"));
                    Ok((true, json!(name)))
                }
            }
        },
        UpdaterOptions::new().on_complete({
            let completions = Arc::clone(&completions);
            move |ok, payload| completions.lock().unwrap().push((ok, payload.clone()))
        }),
    );

    let first = tokio::spawn({
        let updater = updater.clone();
        async move { updater.update(params(json!({"name": "first"}))).await }
    });
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    let second = tokio::spawn({
        let updater = updater.clone();
        async move { updater.update(params(json!({"name": "second"}))).await }
    });
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }

    assert_eq!(*log.lock().unwrap(), ["start:first"]);
    assert_eq!(updater.pending(), 2);
    assert!(updater.loading());

    release.send(()).unwrap();
    first.await.unwrap().unwrap();
    second.await.unwrap().unwrap();

    assert_eq!(
        *log.lock().unwrap(),
        ["start:first", "end:first", "start:second", "end:second"]
    );
    assert!(!updater.loading());
    assert_eq!(*completions.lock().unwrap(), [(true, json!("second"))]);
}

#[tokio::test]
async fn test_concurrent_list_calls_last_writer_wins() {
    let engine = Engine::default();
    let (release, gate) = oneshot::channel::<()>();
    let gate = Arc::new(Mutex::new(Some(gate)));
    let round = Arc::new(AtomicUsize::new(0));
    let action = Arc::new(
        Action::list(move |_| {
            let n = round.fetch_add(1, Ordering::SeqCst);
            let rx = if n == 0 { gate.lock().unwrap().take() } else { None };
            async move {
                if let Some(rx) = rx {
                    rx.await.unwrap();
                    Ok(json!([{"id": "x", "rev": "stale"}]))
                } else {
                    Ok(json!([{"id": "x", "rev": "fresh"}]))
                }
            }
        })
        .with_config(ActionConfig::new("flavors")),
    );

    let slow = tokio::spawn({
        let action = Arc::clone(&action);
        let store = Arc::clone(engine.store());
        async move { action.call(&store, Params::new()).await }
    });
    tokio::task::yield_now().await;
    action.call(engine.store(), Params::new()).await.unwrap();
    assert_eq!(engine.store().data("flavors")[0]["rev"], json!("fresh"));

    release.send(()).unwrap();
    slow.await.unwrap().unwrap();
    assert_eq!(engine.store().data("flavors")[0]["rev"], json!("stale"));
}

#[tokio::test]
async fn test_refetch_overtaken_by_slower_plain_load() {
    let engine = Engine::default();
    let (release, gate) = oneshot::channel::<()>();
    let gate = Arc::new(Mutex::new(Some(gate)));
    let action = Arc::new(
        Action::list(move |_| {
            let rx = gate.lock().unwrap().take();
            async move {
                if let Some(rx) = rx {
                    rx.await.unwrap();
                    Ok(json!([{"id": "1"}, {"id": "2"}]))
                } else {
                    Ok(json!([{"id": "1"}]))
                }
            }
        })
        .with_config(ActionConfig::new("images")),
    );

    let plain = tokio::spawn({
        let action = Arc::clone(&action);
        let store = Arc::clone(engine.store());
        async move { action.call(&store, Params::new()).await }
    });
    tokio::task::yield_now().await;
    action
        .call_with(engine.store(), Params::new(), true)
        .await
        .unwrap();
    assert_eq!(ids(&engine.store().data("images")), ["1"]);

    // Completion order decides: the plain upsert landed last.
    release.send(()).unwrap();
    plain.await.unwrap().unwrap();
    assert_eq!(ids(&engine.store().data("images")), ["1", "2"]);
}

#[tokio::test]
async fn test_three_updates_complete_in_submission_order() {
    let engine = Engine::default();
    let log = Arc::new(Mutex::new(Vec::<String>::new()));
    let (release, gate) = oneshot::channel::<()>();
    let gate = Arc::new(Mutex::new(Some(gate)));
    let completions = Arc::new(Mutex::new(Vec::new()));

    let updater = engine.updater(
        {
            let log = Arc::clone(&log);
            move |p: Params| {
                let log = Arc::clone(&log);
                let gate = Arc::clone(&gate);
                async move {
                    let name = p["name"].as_str().unwrap().to_owned();
                    if name == "u1" {
                        let rx = gate.lock().unwrap().take();
                        if let Some(rx) = rx {
                            rx.await.unwrap();
                        }
                    }
                    log.lock().unwrap().push(name.clone());
                    Ok((true, json!(name)))
                }
            }
        },
        UpdaterOptions::new().on_complete({
            let completions = Arc::clone(&completions);
            move |ok, payload| completions.lock().unwrap().push((ok, payload.clone()))
        }),
    );

    let mut calls = Vec::new();
    for name in ["u1", "u2", "u3"] {
        calls.push(tokio::spawn({
            let updater = updater.clone();
            async move { updater.update(params(json!({"name": name}))).await }
        }));
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    // u2 and u3 would finish at once, but wait behind u1.
    assert!(log.lock().unwrap().is_empty());
    assert_eq!(updater.pending(), 3);
    assert!(updater.loading());
    assert!(completions.lock().unwrap().is_empty());

    release.send(()).unwrap();
    for call in calls {
        call.await.unwrap().unwrap();
    }

    assert_eq!(*log.lock().unwrap(), ["u1", "u2", "u3"]);
    assert!(!updater.loading());
    assert_eq!(*completions.lock().unwrap(), [(true, json!("u3"))]);
}

#[tokio::test]
async fn test_action_updater_reports_failure() {
    let (engine, notes) = recording_engine(EngineConfig::default());
    let action = Arc::new(
        Action::update(|_| async { Err(CoreError::operation("volume is attached")) })
            .with_config(ActionConfig::new("volumes").entity_name("Volume")),
    );
    let updater = engine.action_updater(action, UpdaterOptions::new());

    let (ok, payload) = updater.update(Params::new()).await.unwrap();
    assert!(!ok);
    assert_eq!(payload, json!("Operation failed: volume is attached"));

    let notes = notes.lock().unwrap();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].0, "Volume");
    assert_eq!(notes[0].1, "Operation failed: volume is attached");
}
