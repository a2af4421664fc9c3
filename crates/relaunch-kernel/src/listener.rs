//! Stop listeners

/// One-shot hook fired before the running generation is torn down.
///
/// Listeners run synchronously on the restart worker, in registration order,
/// and are dropped from the controller afterwards; register again to hear
/// about the next restart. A slow `before_stop` delays the whole restart.
pub trait RestartListener: Send + Sync {
    fn before_stop(&self);
}

impl<F> RestartListener for F
where
    F: Fn() + Send + Sync,
{
    fn before_stop(&self) {
        self()
    }
}
