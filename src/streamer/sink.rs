//! Line sinks: where completed lines go.

use std::io::{self, Write};

/// Capability interface for consumers of completed output lines.
///
/// Implementations must not suspend: streamer writes happen on the process
/// pump path, so a sink either completes synchronously or hands the line
/// off to a queue.
pub trait LineSink: Send + Sync {
    fn send_line(&self, prefix: &str, line: &str) -> io::Result<()>;
}

/// Local console mirror. Stdout lines go to stdout, stderr lines to
/// stderr, each tagged with the stream prefix and the command name.
pub struct ConsoleSink {
    name: String,
}

impl ConsoleSink {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

impl LineSink for ConsoleSink {
    fn send_line(&self, prefix: &str, line: &str) -> io::Result<()> {
        if prefix == "stderr" {
            let stderr = io::stderr();
            let mut handle = stderr.lock();
            write!(handle, "[{}][{}] {}", prefix, self.name, line)
        } else {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            write!(handle, "[{}][{}] {}", prefix, self.name, line)
        }
    }
}
