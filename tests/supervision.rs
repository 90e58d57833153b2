//! End-to-end supervision scenarios against real child processes.

#![cfg(unix)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use process_pilot::{
    ChildView, HookFn, HookKind, HookMap, LifecycleState, PilotConfig, PilotError, Plugin,
    ProcessManifest, ProcessPilot, ProcessStats, StatsFn, StatsRef,
};

fn fast_cfg() -> PilotConfig {
    let mut cfg = PilotConfig::default();
    cfg.tick_interval = Duration::from_millis(20);
    cfg.probe_interval = Duration::from_millis(20);
    cfg
}

fn manifest(value: serde_json::Value) -> ProcessManifest {
    ProcessManifest::from_json(&value.to_string()).unwrap()
}

/// Polls `cond` until it holds or `budget` elapses.
async fn eventually(budget: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + budget;
    loop {
        if cond() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn single_sleeper_with_do_not_restart_runs_out_and_stop_is_immediate() {
    let pilot = ProcessPilot::new(
        manifest(serde_json::json!({
            "processes": [{
                "name": "a",
                "path": "/bin/sleep",
                "args": ["0.1"],
                "shutdown_strategy": "do_not_restart"
            }]
        })),
        fast_cfg(),
    )
    .unwrap();

    pilot.start().await.unwrap();
    let status = pilot.status("a").unwrap();
    assert!(matches!(
        status.state,
        LifecycleState::Ready | LifecycleState::Running
    ));
    assert!(status.pid.is_some());

    assert!(
        eventually(Duration::from_secs(5), || {
            pilot.status("a").unwrap().state == LifecycleState::Exited
        })
        .await,
        "sleeper never transitioned to Exited"
    );

    let before = tokio::time::Instant::now();
    pilot.stop().await.unwrap();
    assert!(before.elapsed() < Duration::from_secs(2));

    // Idempotent second stop.
    pilot.stop().await.unwrap();
}

#[tokio::test]
async fn dependents_wait_for_tcp_and_file_readiness() {
    // Learn a free port, then leave it unbound until the test opens it.
    let probe_port = {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        port
    };
    let dir = tempfile::tempdir().unwrap();
    let api_ready = dir.path().join("api_ready");

    let pilot = Arc::new(
        ProcessPilot::new(
            manifest(serde_json::json!({
                "processes": [
                    {
                        "name": "db",
                        "path": "/bin/sleep", "args": ["30"],
                        "ready_strategy": "tcp",
                        "ready_timeout_sec": 10.0,
                        "ready_params": {"port": probe_port}
                    },
                    {
                        "name": "api",
                        "path": "/bin/sh",
                        "args": ["-c", format!("touch {}; exec sleep 30", api_ready.display())],
                        "dependencies": ["db"],
                        "ready_strategy": "file",
                        "ready_timeout_sec": 10.0,
                        "ready_params": {"path": api_ready.to_str().unwrap()}
                    },
                    {
                        "name": "worker",
                        "path": "/bin/sleep", "args": ["30"],
                        "dependencies": ["api", "db"]
                    }
                ]
            })),
            fast_cfg(),
        )
        .unwrap(),
    );

    let starter = {
        let pilot = Arc::clone(&pilot);
        tokio::spawn(async move { pilot.start().await })
    };

    // db is probing; its dependents must not have spawned.
    assert!(
        eventually(Duration::from_secs(5), || {
            pilot.status("db").unwrap().state == LifecycleState::Starting
        })
        .await,
        "db never began probing"
    );
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(pilot.status("db").unwrap().state, LifecycleState::Starting);
    assert_eq!(pilot.status("api").unwrap().state, LifecycleState::Pending);
    assert_eq!(pilot.status("worker").unwrap().state, LifecycleState::Pending);

    // Open the port: db becomes ready, the chain unblocks.
    let _listener = tokio::net::TcpListener::bind(("127.0.0.1", probe_port))
        .await
        .unwrap();

    starter.await.unwrap().unwrap();

    let db = pilot.status("db").unwrap();
    let api = pilot.status("api").unwrap();
    let worker = pilot.status("worker").unwrap();
    for status in [&db, &api, &worker] {
        assert!(matches!(
            status.state,
            LifecycleState::Ready | LifecycleState::Running
        ));
    }
    assert!(db.started_at.unwrap() <= api.started_at.unwrap());
    assert!(api.started_at.unwrap() <= worker.started_at.unwrap());

    pilot.stop().await.unwrap();
    assert_eq!(pilot.status("db").unwrap().state, LifecycleState::Exited);
}

#[tokio::test]
async fn startup_failure_tears_down_whatever_started() {
    // Bind-then-drop: nothing listens, every connect is refused.
    let dead_port = {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        port
    };

    let pilot = ProcessPilot::new(
        manifest(serde_json::json!({
            "processes": [{
                "name": "a",
                "path": "/bin/sleep", "args": ["10"],
                "timeout": 1.0,
                "ready_strategy": "tcp",
                "ready_timeout_sec": 0.5,
                "ready_params": {"port": dead_port}
            }]
        })),
        fast_cfg(),
    )
    .unwrap();

    let err = pilot.start().await.unwrap_err();
    match err {
        PilotError::Startup { process, .. } => assert_eq!(process, "a"),
        other => panic!("expected Startup, got {other:?}"),
    }
    // The probed child was terminated during teardown.
    let status = pilot.status("a").unwrap();
    assert_eq!(status.state, LifecycleState::Exited);
    assert!(status.pid.is_none());
}

#[tokio::test]
async fn shutdown_everything_exit_takes_the_fleet_down() {
    let pilot = ProcessPilot::new(
        manifest(serde_json::json!({
            "processes": [
                {"name": "x", "path": "/bin/sleep", "args": ["30"], "timeout": 2.0},
                {"name": "y", "path": "/bin/sleep", "args": ["30"], "timeout": 2.0,
                 "dependencies": ["x"]},
                {"name": "z", "path": "/bin/sleep", "args": ["0.2"], "timeout": 2.0,
                 "shutdown_strategy": "shutdown_everything"}
            ]
        })),
        fast_cfg(),
    )
    .unwrap();

    pilot.start().await.unwrap();
    pilot.wait_terminated().await.unwrap();

    assert_eq!(pilot.status("z").unwrap().state, LifecycleState::Exited);
    assert_eq!(
        pilot.status("x").unwrap().state,
        LifecycleState::TerminatedByPolicy
    );
    assert_eq!(
        pilot.status("y").unwrap().state,
        LifecycleState::TerminatedByPolicy
    );

    // The fleet is already down; stop() returns immediately.
    pilot.stop().await.unwrap();
}

#[tokio::test]
async fn restart_policy_respawns_with_a_fresh_pid() {
    let pilot = ProcessPilot::new(
        manifest(serde_json::json!({
            "processes": [{
                "name": "r",
                "path": "/bin/sleep", "args": ["0.05"],
                "shutdown_strategy": "restart"
            }]
        })),
        fast_cfg(),
    )
    .unwrap();

    pilot.start().await.unwrap();
    let first_pid = pilot.status("r").unwrap().pid.unwrap();

    assert!(
        eventually(Duration::from_secs(5), || {
            pilot.status("r").unwrap().restarts >= 1
        })
        .await,
        "restart counter never advanced"
    );
    let status = pilot.status("r").unwrap();
    if let Some(pid) = status.pid {
        assert_ne!(pid, first_pid);
    }

    // Restarts keep coming until an operator stop.
    pilot.stop().await.unwrap();
    let final_state = pilot.status("r").unwrap().state;
    assert!(matches!(
        final_state,
        LifecycleState::Exited | LifecycleState::TerminatedByPolicy
    ));
}

#[tokio::test]
async fn sigterm_ignoring_child_is_escalated_to_sigkill() {
    let pilot = ProcessPilot::new(
        manifest(serde_json::json!({
            "processes": [{
                "name": "stubborn",
                "path": "/bin/sh",
                "args": ["-c", "trap '' TERM; sleep 30"],
                "timeout": 0.3
            }]
        })),
        fast_cfg(),
    )
    .unwrap();

    pilot.start().await.unwrap();
    // Give the shell a beat to install the trap.
    tokio::time::sleep(Duration::from_millis(200)).await;

    let before = tokio::time::Instant::now();
    pilot.stop().await.unwrap();
    // Bounded by the graceful budget plus the kill, not the 30s sleep.
    assert!(before.elapsed() < Duration::from_secs(5));
    assert_eq!(
        pilot.status("stubborn").unwrap().state,
        LifecycleState::Exited
    );
}

#[tokio::test]
async fn restart_processes_validates_names_before_acting() {
    let pilot = ProcessPilot::new(
        manifest(serde_json::json!({
            "processes": [{"name": "svc", "path": "/bin/sleep", "args": ["30"]}]
        })),
        fast_cfg(),
    )
    .unwrap();

    pilot.start().await.unwrap();
    let first_pid = pilot.status("svc").unwrap().pid.unwrap();

    let err = pilot.restart_processes(&["svc", "ghost"]).await.unwrap_err();
    assert!(matches!(
        err,
        PilotError::UnknownProcess { ref name } if name == "ghost"
    ));
    // No side effects from the rejected call.
    assert_eq!(pilot.status("svc").unwrap().pid.unwrap(), first_pid);

    pilot.restart_processes(&["svc"]).await.unwrap();
    let status = pilot.status("svc").unwrap();
    assert_eq!(status.restarts, 1);
    assert_ne!(status.pid.unwrap(), first_pid);

    pilot.stop().await.unwrap();
}

#[tokio::test]
async fn facade_lifecycle_misuse_is_rejected() {
    let pilot = ProcessPilot::new(
        manifest(serde_json::json!({
            "processes": [{"name": "svc", "path": "/bin/sleep", "args": ["30"]}]
        })),
        fast_cfg(),
    )
    .unwrap();

    assert!(matches!(
        pilot.stop().await.unwrap_err(),
        PilotError::NotStarted
    ));
    assert!(matches!(
        pilot.restart_processes(&["svc"]).await.unwrap_err(),
        PilotError::NotStarted
    ));

    pilot.start().await.unwrap();
    assert!(matches!(
        pilot.start().await.unwrap_err(),
        PilotError::AlreadyStarted
    ));

    pilot.stop().await.unwrap();
    // Terminated: a third start is still a misuse, stop stays idempotent.
    assert!(matches!(
        pilot.start().await.unwrap_err(),
        PilotError::AlreadyStarted
    ));
    pilot.stop().await.unwrap();
}

/// Counts lifecycle transitions and stats batches for the plugin tests.
struct Recorder {
    pre_start: AtomicUsize,
    post_start: AtomicUsize,
    on_shutdown: AtomicUsize,
    batches: Mutex<Vec<Vec<String>>>,
}

struct RecorderPlugin(Arc<Recorder>);

impl Plugin for RecorderPlugin {
    fn name(&self) -> &str {
        "recorder"
    }

    fn hooks(&self) -> HookMap {
        let rec = &self.0;
        let mut kinds = std::collections::HashMap::new();
        let pre = Arc::clone(rec);
        kinds.insert(
            HookKind::PreStart,
            vec![HookFn::arc(move |view: &ChildView| {
                assert!(view.pid().is_none(), "no pid before spawn");
                pre.pre_start.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })],
        );
        let post = Arc::clone(rec);
        kinds.insert(
            HookKind::PostStart,
            vec![HookFn::arc(move |view: &ChildView| {
                assert!(view.pid().is_some(), "pid present after spawn");
                post.post_start.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })],
        );
        let down = Arc::clone(rec);
        kinds.insert(
            HookKind::OnShutdown,
            vec![HookFn::arc(move |_: &ChildView| {
                down.on_shutdown.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })],
        );
        std::collections::HashMap::from([("record".to_string(), kinds)])
    }

    fn stats_handlers(&self) -> std::collections::HashMap<String, StatsRef> {
        let rec = Arc::clone(&self.0);
        std::collections::HashMap::from([(
            "record_stats".to_string(),
            StatsFn::arc(move |batch: &[ProcessStats]| {
                let names: Vec<String> = batch.iter().map(|s| s.name.clone()).collect();
                rec.batches.lock().unwrap().push(names);
                Ok(())
            }),
        )])
    }
}

#[tokio::test]
async fn hooks_and_stats_handlers_fire_in_lifecycle_order() {
    let recorder = Arc::new(Recorder {
        pre_start: AtomicUsize::new(0),
        post_start: AtomicUsize::new(0),
        on_shutdown: AtomicUsize::new(0),
        batches: Mutex::new(Vec::new()),
    });

    let pilot = ProcessPilot::new(
        manifest(serde_json::json!({
            "processes": [{
                "name": "svc",
                "path": "/bin/sleep", "args": ["30"],
                "hooks": ["record"],
                "stats_handlers": ["record_stats"]
            }]
        })),
        fast_cfg(),
    )
    .unwrap();
    pilot
        .register_plugins(vec![Arc::new(RecorderPlugin(Arc::clone(&recorder)))])
        .await
        .unwrap();

    pilot.start().await.unwrap();
    assert_eq!(recorder.pre_start.load(Ordering::SeqCst), 1);
    assert_eq!(recorder.post_start.load(Ordering::SeqCst), 1);
    assert_eq!(recorder.on_shutdown.load(Ordering::SeqCst), 0);

    // Stats batches arrive tick by tick, one entry per running child.
    assert!(
        eventually(Duration::from_secs(5), || {
            !recorder.batches.lock().unwrap().is_empty()
        })
        .await,
        "no stats batch was dispatched"
    );
    {
        let batches = recorder.batches.lock().unwrap();
        for batch in batches.iter() {
            assert_eq!(batch.as_slice(), ["svc"]);
        }
    }

    pilot.stop().await.unwrap();
    assert_eq!(recorder.on_shutdown.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unknown_capability_fails_start_before_any_spawn() {
    let pilot = ProcessPilot::new(
        manifest(serde_json::json!({
            "processes": [{
                "name": "svc",
                "path": "/bin/sleep", "args": ["30"],
                "hooks": ["no_such_group"]
            }]
        })),
        fast_cfg(),
    )
    .unwrap();

    let err = pilot.start().await.unwrap_err();
    assert!(matches!(
        err,
        PilotError::Manifest(process_pilot::ManifestError::UnknownCapability { .. })
    ));
    // Nothing was spawned.
    assert_eq!(pilot.status("svc").unwrap().state, LifecycleState::Pending);
}

#[tokio::test]
async fn failing_pre_start_hook_aborts_startup() {
    struct BrokenPreStart;
    impl Plugin for BrokenPreStart {
        fn name(&self) -> &str {
            "broken"
        }
        fn hooks(&self) -> HookMap {
            let mut kinds = std::collections::HashMap::new();
            kinds.insert(
                HookKind::PreStart,
                vec![HookFn::arc(|_: &ChildView| {
                    anyhow::bail!("port reservation failed")
                })],
            );
            std::collections::HashMap::from([("broken_hooks".to_string(), kinds)])
        }
    }

    let pilot = ProcessPilot::new(
        manifest(serde_json::json!({
            "processes": [{
                "name": "svc",
                "path": "/bin/sleep", "args": ["30"],
                "hooks": ["broken_hooks"]
            }]
        })),
        fast_cfg(),
    )
    .unwrap();
    pilot
        .register_plugins(vec![Arc::new(BrokenPreStart)])
        .await
        .unwrap();

    let err = pilot.start().await.unwrap_err();
    assert!(matches!(err, PilotError::Startup { ref process, .. } if process == "svc"));
    assert!(pilot.status("svc").unwrap().pid.is_none());
}

#[tokio::test]
async fn pipe_strategy_gates_on_the_ready_token() {
    let dir = tempfile::tempdir().unwrap();
    let pipe_path = dir.path().join("svc.ready");

    let pilot = ProcessPilot::new(
        manifest(serde_json::json!({
            "processes": [{
                "name": "svc",
                "path": "/bin/sh",
                // Holding fd 3 open keeps the token buffered in the FIFO
                // until the prober reads it.
                "args": ["-c", format!("exec 3<> {p}; echo ready >&3; exec sleep 30", p = pipe_path.display())],
                "ready_strategy": "pipe",
                "ready_timeout_sec": 10.0,
                "ready_params": {"path": pipe_path.to_str().unwrap()}
            }]
        })),
        fast_cfg(),
    )
    .unwrap();

    pilot.start().await.unwrap();
    assert!(matches!(
        pilot.status("svc").unwrap().state,
        LifecycleState::Ready | LifecycleState::Running
    ));

    pilot.stop().await.unwrap();
    // The supervisor unlinks its pipe on teardown.
    assert!(!pipe_path.exists());
}
