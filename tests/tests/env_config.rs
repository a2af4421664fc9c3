//! `RELAUNCH_*` overrides reach a builder without explicit config. Own test
//! binary: it changes the process environment.

use relaunch_kernel::{CodeLocation, ModuleTable, StaticInitializer};
use relaunch_runtime::RestartControllerBuilder;
use relaunch_testing::{MockModule, Transcript, init_tracing};

#[test]
fn test_builder_picks_up_environment_overrides() {
    init_tracing();
    // SAFETY: single test in this binary, set before any thread reads it
    unsafe { std::env::set_var("RELAUNCH_LAUNCHER_THREAD_NAME", "envMain") };

    let transcript = Transcript::new();
    let main = MockModule::new("main", &transcript);
    let table = ModuleTable::new("app").with("main", main.content());
    let controller = RestartControllerBuilder::new(Vec::<String>::new())
        .with_initializer(StaticInitializer::new("main").with_location(CodeLocation::table(table)))
        .build_detached()
        .unwrap();

    controller.restart().unwrap();

    assert_eq!(main.history()[0].thread.as_deref(), Some("envMain"));
}
