//! A broken build pending at startup. Own test binary: it creates the process
//! controller.

use relaunch_kernel::{CodeLocation, InitializationError, LaunchError, ModuleTable, OverlayRecord, RestartError, StaticInitializer};
use relaunch_runtime::{ControllerState, catch_silent_exit, initialize, instance};
use relaunch_testing::{MockModule, Transcript, init_tracing};

#[test]
fn test_failed_immediate_restart_returns_to_the_caller() {
    init_tracing();
    let transcript = Transcript::new();
    let v1 = MockModule::new("v1", &transcript);
    let broken = MockModule::new("broken", &transcript).always_failing();

    let initializer = StaticInitializer::new("main")
        .with_location(CodeLocation::table(ModuleTable::new("app").with("main", v1.content())))
        .with_pending(OverlayRecord::modified("main", broken.content()));

    let outcome = catch_silent_exit(|| {
        let result = initialize(Vec::<String>::new(), initializer, true);
        transcript.push("original main resumed");
        result
    });

    // The calling thread was not ended and sees the launch failure.
    let report = outcome.expect("thread must not exit silently").unwrap_err();
    assert!(matches!(
        report.current_context(),
        InitializationError::ImmediateRestart(RestartError::Aborted(LaunchError::Failed { .. }))
    ));
    assert_eq!(broken.call_count(), 1);
    assert_eq!(v1.call_count(), 0);
    assert_eq!(transcript.entries().last().map(String::as_str), Some("original main resumed"));

    let controller = instance().unwrap();
    assert_eq!(controller.state(), ControllerState::Failed);
    assert_eq!(controller.generation(), 1);
}
