use std::collections::HashSet;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use parking_lot::Mutex;
use relaunch_kernel::{
    CodeLocation, Content, LaunchError, LimitedRetry, ModuleTable, OverlayRecord, RestartError, RetryPolicy,
    StaticInitializer, context,
};
use relaunch_runtime::{ControllerState, LeakSafeExecutor, RESTARTED_THREAD_NAME, RestartController, RestartControllerBuilder};
use relaunch_testing::{CountingHook, MockModule, RecordingListener, Transcript, assert_fired, init_tracing};

fn controller_with(main: &MockModule) -> RestartController {
    init_tracing();
    let table = ModuleTable::new("app").with("main", main.content());
    RestartControllerBuilder::new(["--profile", "dev"])
        .with_initializer(StaticInitializer::new("main").with_location(CodeLocation::table(table)))
        .build_detached()
        .unwrap()
}

#[test]
fn test_relaunch_v1_then_v2() {
    init_tracing();
    let transcript = Transcript::new();
    let v1 = MockModule::new("v1", &transcript);
    let v2 = MockModule::new("v2", &transcript);
    let hook = CountingHook::new(&transcript);

    let table = ModuleTable::new("app").with("main", v1.content());
    let controller = RestartControllerBuilder::new(["--profile", "dev"])
        .with_initializer(StaticInitializer::new("main").with_location(CodeLocation::table(table)))
        .with_reclaim_hook(hook.hook())
        .build_detached()
        .unwrap();

    controller.restart().unwrap();
    let listener = RecordingListener::new("web", &transcript);
    controller.add_listener(listener.clone());
    controller
        .overlay()
        .push(OverlayRecord::modified("main", v2.content()));
    controller.restart().unwrap();

    assert_eq!(
        transcript.entries(),
        vec!["reclaim", "run:v1@1", "stop:web", "reclaim", "run:v2@2"]
    );
    assert_eq!(hook.count(), 2);
    assert_fired!(listener, 1);
    assert_eq!(controller.state(), ControllerState::Running);

    let history = v2.history();
    assert_eq!(history[0].thread.as_deref(), Some(RESTARTED_THREAD_NAME));
    assert_eq!(history[0].args, vec!["--profile".to_string(), "dev".to_string()]);
}

#[test]
fn test_listener_is_one_shot() {
    let transcript = Transcript::new();
    let main = MockModule::new("main", &transcript);
    let controller = controller_with(&main);
    let listener = RecordingListener::new("cache", &transcript);

    controller.add_listener(listener.clone());
    controller.restart().unwrap();
    controller.restart().unwrap();
    assert_fired!(listener, 1);

    controller.add_listener(listener.clone());
    controller.restart().unwrap();
    assert_fired!(listener, 2);
}

#[test]
fn test_listener_added_during_stop_waits_for_next_restart() {
    let transcript = Transcript::new();
    let main = MockModule::new("main", &transcript);
    let controller = controller_with(&main);
    let late = RecordingListener::new("late", &transcript);

    let registrar = {
        let controller = controller.clone();
        let late = Arc::clone(&late);
        let transcript = transcript.clone();
        move || {
            transcript.push("stop:registrar");
            controller.add_listener(late.clone());
        }
    };
    controller.add_listener(Arc::new(registrar));

    controller.restart().unwrap();
    assert_fired!(late, 0);

    controller.restart().unwrap();
    assert_fired!(late, 1);

    controller.restart().unwrap();
    assert_fired!(late, 1);
    assert_eq!(transcript.matching("stop:"), vec!["stop:registrar", "stop:late"]);
}

#[test]
fn test_listeners_fire_in_registration_order() {
    let transcript = Transcript::new();
    let main = MockModule::new("main", &transcript);
    let controller = controller_with(&main);

    for name in ["first", "second", "third"] {
        controller.add_listener(RecordingListener::new(name, &transcript));
    }
    controller.restart().unwrap();

    assert_eq!(
        transcript.matching("stop:"),
        vec!["stop:first", "stop:second", "stop:third"]
    );
}

#[test]
fn test_overlay_precedence() {
    let transcript = Transcript::new();
    let main = MockModule::new("main", &transcript);
    let lib = ModuleTable::new("lib")
        .with("A", Content::bytes(b"v1".to_vec()))
        .with("B", Content::bytes(b"b".to_vec()));
    let app = ModuleTable::new("app").with("main", main.content());
    let controller = RestartControllerBuilder::new(Vec::<String>::new())
        .with_initializer(
            StaticInitializer::new("main")
                .with_location(CodeLocation::table(lib))
                .with_location(CodeLocation::table(app)),
        )
        .build_detached()
        .unwrap();

    controller.overlay().apply(vec![
        OverlayRecord::modified("A", Content::bytes(b"v2".to_vec())),
        OverlayRecord::deleted("B"),
    ]);
    controller.restart().unwrap();

    let image = controller.current_image().unwrap();
    assert_eq!(image.lookup("A"), Some(Content::bytes(b"v2".to_vec())));
    assert!(image.lookup("B").is_none());
    assert!(image.contains("main"));
}

#[test]
fn test_each_job_gets_a_fresh_idle_worker() {
    let executor = LeakSafeExecutor::new("p4-worker").unwrap();
    let mut threads = HashSet::new();

    for _ in 0..3 {
        let observer = executor.clone();
        let (thread, idle_during_work) = executor
            .call_and_wait(move || (std::thread::current().id(), observer.idle_workers()))
            .unwrap();
        assert_eq!(idle_during_work, 1, "successor must be parked before the work runs");
        assert_ne!(thread, std::thread::current().id());
        assert!(threads.insert(thread), "worker threads are never reused");
    }
}

#[test]
fn test_always_retry_until_success() {
    let transcript = Transcript::new();
    let main = MockModule::new("flaky", &transcript).failing(2);
    let controller = controller_with(&main);

    controller.restart_with(RetryPolicy).unwrap();

    assert_eq!(main.call_count(), 3);
    assert_eq!(controller.state(), ControllerState::Running);
    // Every attempt reuses the same image.
    assert!(main.history().iter().all(|call| call.generation == Some(1)));
}

#[test]
fn test_default_policy_aborts_after_one_attempt() {
    init_tracing();
    let transcript = Transcript::new();
    let main = MockModule::new("broken", &transcript).always_failing();
    let reported = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&reported);

    let table = ModuleTable::new("app").with("main", main.content());
    let controller = RestartControllerBuilder::new(Vec::<String>::new())
        .with_initializer(StaticInitializer::new("main").with_location(CodeLocation::table(table)))
        .with_uncaught_handler(move |error: &LaunchError| sink.lock().push(error.chain()))
        .build_detached()
        .unwrap();

    let err = controller.restart().unwrap_err();

    assert!(matches!(err, RestartError::Aborted(LaunchError::Failed { .. })));
    assert_eq!(main.call_count(), 1);
    assert_eq!(controller.state(), ControllerState::Failed);
    let reported = reported.lock();
    assert_eq!(reported.len(), 1);
    assert!(reported[0].contains("broken failed on attempt 1"));
}

#[test]
fn test_limited_retry_gives_up() {
    let transcript = Transcript::new();
    let main = MockModule::new("broken", &transcript).always_failing();
    let controller = controller_with(&main);

    let err = controller.restart_with(LimitedRetry::new(2)).unwrap_err();

    assert!(matches!(err, RestartError::Aborted(_)));
    assert_eq!(main.call_count(), 2);
}

#[test]
fn test_overlay_accumulates_across_restarts() {
    let transcript = Transcript::new();
    let main = MockModule::new("main", &transcript);
    let controller = controller_with(&main);

    controller
        .overlay()
        .push(OverlayRecord::added("Extra", Content::bytes(b"x".to_vec())));
    controller.restart().unwrap();
    controller
        .overlay()
        .push(OverlayRecord::added("Other", Content::bytes(b"y".to_vec())));
    controller.restart().unwrap();

    let image = controller.current_image().unwrap();
    assert_eq!(image.generation(), 2);
    assert_eq!(image.overlay_names(), vec!["Extra", "Other"]);
}

#[test]
fn test_thread_factory_binds_current_generation() {
    let transcript = Transcript::new();
    let main = MockModule::new("main", &transcript);
    let controller = controller_with(&main);
    controller.restart().unwrap();
    controller.restart().unwrap();

    let factory = controller.thread_factory();
    let seen = factory
        .spawn_named("worker", || (context::generation(), context::lookup("main").is_some()))
        .unwrap()
        .join()
        .unwrap();

    assert_eq!(seen, (Some(2), true));
}

#[test]
fn test_wait_for_exit_outlives_entry_point() {
    let controller_slot: Arc<OnceLock<RestartController>> = Arc::new(OnceLock::new());
    let slot = Arc::clone(&controller_slot);
    let finished = Arc::new(Mutex::new(false));
    let flag = Arc::clone(&finished);

    let main = Content::from_fn(move |_: &[String]| {
        let controller = slot.get().ok_or_else(|| anyhow::anyhow!("controller not published"))?;
        let flag = Arc::clone(&flag);
        controller.thread_factory().spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            *flag.lock() = true;
        })?;
        Ok(())
    });

    let table = ModuleTable::new("app").with("main", main);
    let controller = RestartControllerBuilder::new(Vec::<String>::new())
        .with_initializer(StaticInitializer::new("main").with_location(CodeLocation::table(table)))
        .build_detached()
        .unwrap();
    let _ = controller_slot.set(controller.clone());

    controller.restart().unwrap();
    controller.wait_for_exit();

    assert!(*finished.lock());
}

#[test]
fn test_restart_from_starting_entry_point_is_rejected() {
    let controller_slot: Arc<OnceLock<RestartController>> = Arc::new(OnceLock::new());
    let slot = Arc::clone(&controller_slot);
    let outcome = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&outcome);

    let main = Content::from_fn(move |_: &[String]| {
        if let Some(controller) = slot.get() {
            *sink.lock() = Some(controller.restart());
        }
        Ok(())
    });

    let table = ModuleTable::new("app").with("main", main);
    let controller = RestartControllerBuilder::new(Vec::<String>::new())
        .with_initializer(StaticInitializer::new("main").with_location(CodeLocation::table(table)))
        .build_detached()
        .unwrap();
    let _ = controller_slot.set(controller.clone());

    controller.restart().unwrap();

    assert!(matches!(*outcome.lock(), Some(Err(RestartError::Reentrant))));
    assert_eq!(controller.generation(), 1);
}

#[test]
fn test_concurrent_restarts_are_serialized() {
    let transcript = Transcript::new();
    let main = MockModule::new("main", &transcript);
    let controller = controller_with(&main);

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let controller = controller.clone();
            std::thread::spawn(move || controller.restart())
        })
        .collect();
    for handle in handles {
        handle.join().unwrap().unwrap();
    }

    assert_eq!(controller.generation(), 4);
    let mut generations: Vec<_> = main.history().iter().filter_map(|call| call.generation).collect();
    generations.sort_unstable();
    assert_eq!(generations, vec![1, 2, 3, 4]);
}
