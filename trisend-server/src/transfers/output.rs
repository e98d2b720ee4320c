//! Where an upload session writes its user-facing text

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

/// Text streams of an upload session
///
/// Writes are best effort: a sender who hung up simply misses the message.
#[async_trait]
pub trait SessionOutput: Send + Sync {
    /// Write to the session's standard output
    async fn stdout(&self, text: &str);

    /// Write to the session's standard error
    async fn stderr(&self, text: &str);
}

/// Session output captured in memory
///
/// Clones share the same buffers.
#[derive(Debug, Clone, Default)]
pub struct CapturedOutput {
    stdout: Arc<Mutex<String>>,
    stderr: Arc<Mutex<String>>,
}

impl CapturedOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written to stdout so far
    pub fn stdout_text(&self) -> String {
        self.stdout.lock().expect("output lock poisoned").clone()
    }

    /// Everything written to stderr so far
    pub fn stderr_text(&self) -> String {
        self.stderr.lock().expect("output lock poisoned").clone()
    }
}

#[async_trait]
impl SessionOutput for CapturedOutput {
    async fn stdout(&self, text: &str) {
        self.stdout.lock().expect("output lock poisoned").push_str(text);
    }

    async fn stderr(&self, text: &str) {
        self.stderr.lock().expect("output lock poisoned").push_str(text);
    }
}
