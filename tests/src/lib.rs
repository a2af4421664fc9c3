//! Relaunch Testing
//!
//! Mocks for exercising a restart controller without real application code:
//! scripted entry points, recording listeners and a shared transcript that
//! shows the order in which things happened.

pub mod listener;
pub mod module;

pub use listener::{CountingHook, RecordingListener};
pub use module::{Invocation, MockModule, Transcript};

/// Install a `tracing` subscriber honouring `RUST_LOG`, once per process.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("relaunch_runtime=debug")),
        )
        .with_test_writer()
        .try_init();
}

/// Assert how many times a [`RecordingListener`] fired.
#[macro_export]
macro_rules! assert_fired {
    ($listener:expr, $expected_count:expr) => {
        let count = $listener.fired_count();
        assert_eq!(
            count, $expected_count,
            "Expected listener '{}' to fire {} times, but it fired {} times",
            $listener.name(),
            $expected_count,
            count
        );
    };
}
