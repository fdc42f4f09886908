use std::io::{self, Write};
use std::sync::{Arc, Mutex};
use tracing::warn;

/// Destination for text produced by the print primitives of an evaluated
/// script. One operation: accept a chunk of text.
pub trait OutputSink: Send {
    fn accept(&mut self, text: &str);
}

/// In-memory sink. Cloning yields another handle onto the same buffer, so a
/// caller can keep one handle and hand the other to the sandbox.
#[derive(Clone, Default)]
pub struct BufferSink {
    buf: Arc<Mutex<String>>,
}

impl BufferSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything accepted so far.
    pub fn contents(&self) -> String {
        self.buf.lock().expect("sink buffer poisoned").clone()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.lock().expect("sink buffer poisoned").is_empty()
    }
}

impl OutputSink for BufferSink {
    fn accept(&mut self, text: &str) {
        self.buf.lock().expect("sink buffer poisoned").push_str(text);
    }
}

/// Sink over any writable stream.
pub struct WriteSink<W: Write + Send> {
    inner: W,
}

impl<W: Write + Send> WriteSink<W> {
    pub fn new(writer: W) -> Self {
        Self { inner: writer }
    }
}

impl WriteSink<io::Stdout> {
    /// Sink writing to the process stdout. This is the sandbox default, so
    /// print output is observable before a sink has been bound.
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> OutputSink for WriteSink<W> {
    fn accept(&mut self, text: &str) {
        let result = self
            .inner
            .write_all(text.as_bytes())
            .and_then(|_| self.inner.flush());
        if let Err(e) = result {
            warn!("Output sink write failed: {}", e);
        }
    }
}
