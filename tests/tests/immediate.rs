//! Immediate restart on initialization. Kept in its own test binary: it
//! creates the process controller.

use relaunch_kernel::{CodeLocation, ModuleTable, OverlayRecord, StaticInitializer};
use relaunch_runtime::{ControllerState, catch_silent_exit, initialize, instance};
use relaunch_testing::{MockModule, Transcript, init_tracing};

#[test]
fn test_restart_immediately_with_pending_changes() {
    init_tracing();
    let transcript = Transcript::new();
    let v1 = MockModule::new("v1", &transcript);
    let v2 = MockModule::new("v2", &transcript);

    let initializer = StaticInitializer::new("main")
        .with_location(CodeLocation::table(ModuleTable::new("app").with("main", v1.content())))
        .with_pending(OverlayRecord::modified("main", v2.content()));

    let outcome = catch_silent_exit(|| {
        let _ = initialize(["--port", "0"], initializer, true);
        transcript.push("original main resumed");
    });

    // The calling thread exited silently right after the relaunch.
    assert!(outcome.is_none());
    assert_eq!(transcript.entries(), vec!["run:v2@1"]);
    assert_eq!(v1.call_count(), 0);

    let controller = instance().unwrap();
    assert_eq!(controller.state(), ControllerState::Running);
    assert_eq!(controller.generation(), 1);
    controller.wait_for_exit();
}
