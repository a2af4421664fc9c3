//! Process singleton. Kept in its own test binary: the controller lives for
//! the rest of the process once created.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread::Thread;

use relaunch_kernel::{
    CodeLocation, InitializationError, Initializer, ModuleTable, RestartError, StaticInitializer,
};
use relaunch_runtime::{RestartControllerBuilder, initialize, install, instance, is_initialized};
use relaunch_testing::{MockModule, Transcript, init_tracing};

/// Counts how often the controller asked for its entry point.
struct CountingInitializer {
    inner: StaticInitializer,
    calls: Arc<AtomicUsize>,
}

impl Initializer for CountingInitializer {
    fn initial_locations(&self, thread: &Thread) -> Result<Vec<CodeLocation>, InitializationError> {
        self.inner.initial_locations(thread)
    }

    fn entry_point(&self, thread: &Thread) -> Result<String, InitializationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.entry_point(thread)
    }
}

#[test]
fn test_singleton_under_concurrent_initialize() {
    init_tracing();
    assert!(!is_initialized());
    assert!(matches!(instance(), Err(RestartError::NotInitialized)));

    let transcript = Transcript::new();
    let main = MockModule::new("main", &transcript);
    let table = ModuleTable::new("app").with("main", main.content());
    let calls = Arc::new(AtomicUsize::new(0));
    let barrier = Arc::new(Barrier::new(8));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let initializer = CountingInitializer {
                inner: StaticInitializer::new("main").with_location(CodeLocation::table(table.clone())),
                calls: Arc::clone(&calls),
            };
            let barrier = Arc::clone(&barrier);
            std::thread::spawn(move || {
                barrier.wait();
                initialize(Vec::<String>::new(), initializer, false).unwrap()
            })
        })
        .collect();

    let controllers: Vec<_> = handles.into_iter().map(|handle| handle.join().unwrap()).collect();
    let overlay = controllers[0].overlay();
    for controller in &controllers {
        assert!(Arc::ptr_eq(&overlay, &controller.overlay()));
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(Arc::ptr_eq(&overlay, &instance().unwrap().overlay()));

    // Nothing was launched by initialization alone.
    assert_eq!(main.call_count(), 0);

    let second = RestartControllerBuilder::new(Vec::<String>::new())
        .with_initializer(StaticInitializer::new("main").with_location(CodeLocation::table(table)));
    let report = install(second).unwrap_err();
    assert!(matches!(
        report.current_context(),
        InitializationError::AlreadyInitialized
    ));
}
