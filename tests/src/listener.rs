use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use relaunch_kernel::RestartListener;

use crate::module::Transcript;

/// Listener logging `stop:<name>` each time it fires
#[derive(Debug)]
pub struct RecordingListener {
    name: String,
    fired: AtomicUsize,
    transcript: Transcript,
}

impl RecordingListener {
    pub fn new(name: &str, transcript: &Transcript) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            fired: AtomicUsize::new(0),
            transcript: transcript.clone(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fired_count(&self) -> usize {
        self.fired.load(Ordering::SeqCst)
    }
}

impl RestartListener for RecordingListener {
    fn before_stop(&self) {
        self.fired.fetch_add(1, Ordering::SeqCst);
        self.transcript.push(format!("stop:{}", self.name));
    }
}

/// Reclaim hook logging `reclaim`
#[derive(Debug, Clone, Default)]
pub struct CountingHook {
    count: Arc<AtomicUsize>,
    transcript: Transcript,
}

impl CountingHook {
    pub fn new(transcript: &Transcript) -> Self {
        Self {
            count: Arc::new(AtomicUsize::new(0)),
            transcript: transcript.clone(),
        }
    }

    /// Closure for `RestartControllerBuilder::with_reclaim_hook`
    pub fn hook(&self) -> impl Fn() + Send + Sync + 'static {
        let count = Arc::clone(&self.count);
        let transcript = self.transcript.clone();
        move || {
            count.fetch_add(1, Ordering::SeqCst);
            transcript.push("reclaim");
        }
    }

    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}
