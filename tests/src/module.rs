use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use relaunch_kernel::{Content, Module, context};

/// Ordered log shared by mocks, e.g. `["run:v1@1", "stop:web", "reclaim"]`
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    entries: Arc<Mutex<Vec<String>>>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, entry: impl Into<String>) {
        self.entries.lock().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().clone()
    }

    /// Entries starting with `prefix`, in order
    pub fn matching(&self, prefix: &str) -> Vec<String> {
        self.entries
            .lock()
            .iter()
            .filter(|entry| entry.starts_with(prefix))
            .cloned()
            .collect()
    }
}

/// What a [`MockModule`] saw when it ran
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub generation: Option<u64>,
    pub thread: Option<String>,
    pub args: Vec<String>,
}

/// Scripted entry point.
///
/// Records every run, logs `run:<label>@<generation>` to the transcript and
/// fails its first `fail_first` runs.
#[derive(Clone)]
pub struct MockModule {
    label: String,
    fail_first: usize,
    attempts: Arc<AtomicUsize>,
    calls: Arc<Mutex<Vec<Invocation>>>,
    transcript: Transcript,
}

impl MockModule {
    pub fn new(label: &str, transcript: &Transcript) -> Self {
        Self {
            label: label.to_string(),
            fail_first: 0,
            attempts: Arc::new(AtomicUsize::new(0)),
            calls: Arc::new(Mutex::new(Vec::new())),
            transcript: transcript.clone(),
        }
    }

    /// Fail the first `times` runs.
    pub fn failing(mut self, times: usize) -> Self {
        self.fail_first = times;
        self
    }

    /// Fail every run.
    pub fn always_failing(self) -> Self {
        self.failing(usize::MAX)
    }

    /// Content handle running this mock; clones share their records.
    pub fn content(&self) -> Content {
        Content::module(self.clone())
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn history(&self) -> Vec<Invocation> {
        self.calls.lock().clone()
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

impl Module for MockModule {
    fn run(&self, args: &[String]) -> anyhow::Result<()> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        let generation = context::generation();
        self.calls.lock().push(Invocation {
            generation,
            thread: std::thread::current().name().map(str::to_string),
            args: args.to_vec(),
        });
        self.transcript
            .push(format!("run:{}@{}", self.label, generation.unwrap_or_default()));

        if attempt <= self.fail_first {
            anyhow::bail!("{} failed on attempt {attempt}", self.label);
        }
        Ok(())
    }
}
