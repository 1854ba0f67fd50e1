//! Byte-stream-to-line reassembly with multi-sink fanout.
//!
//! Process output arrives in arbitrary chunk boundaries unrelated to line
//! boundaries, while the consumers downstream (wire frames, the console
//! mirror) operate on whole lines. A [`LineStreamer`] buffers incoming
//! bytes, forwards every `\n`-terminated line to its sinks as soon as it
//! completes, and holds the trailing fragment until more bytes arrive or a
//! flush forces it out.

pub mod sink;

pub use sink::{ConsoleSink, LineSink};

use std::io;

/// Per-stream line-reassembly buffer.
pub struct LineStreamer {
    buf: Vec<u8>,
    prefix: String,
    /// When set, every emitted line is also appended to `persisted`.
    recording: bool,
    persisted: String,
    sinks: Vec<Box<dyn LineSink>>,
}

impl LineStreamer {
    pub fn new(prefix: &str, recording: bool) -> Self {
        Self {
            buf: Vec::new(),
            prefix: prefix.to_string(),
            recording,
            persisted: String::new(),
            sinks: Vec::new(),
        }
    }

    pub fn with_sink(mut self, sink: Box<dyn LineSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Append bytes and forward every newly completed line. Incomplete
    /// trailing bytes stay buffered. Returns the number of bytes accepted.
    pub fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(bytes);
        self.forward_complete_lines()?;
        Ok(bytes.len())
    }

    /// Force out whatever remains in the buffer as a final line, newline
    /// or not. Flushing an empty buffer emits nothing.
    pub fn flush(&mut self) -> io::Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let rest = String::from_utf8_lossy(&self.buf).into_owned();
        self.buf.clear();
        self.emit(&rest)
    }

    /// Flush, then release the buffer. Safe to call repeatedly.
    pub fn close(&mut self) -> io::Result<()> {
        self.flush()?;
        self.buf = Vec::new();
        Ok(())
    }

    /// Return and clear the recorded output. Empty string when nothing was
    /// recorded (or recording is off).
    pub fn drain_recording(&mut self) -> String {
        std::mem::take(&mut self.persisted)
    }

    fn forward_complete_lines(&mut self) -> io::Result<()> {
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let line = String::from_utf8_lossy(&self.buf[..=pos]).into_owned();
            self.buf.drain(..=pos);
            self.emit(&line)?;
        }
        Ok(())
    }

    fn emit(&mut self, line: &str) -> io::Result<()> {
        if line.is_empty() {
            return Ok(());
        }
        if self.recording {
            self.persisted.push_str(line);
        }
        for sink in &self.sinks {
            sink.send_line(&self.prefix, line)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct CaptureSink {
        lines: Arc<Mutex<Vec<String>>>,
    }

    impl CaptureSink {
        fn lines(&self) -> Vec<String> {
            self.lines.lock().unwrap().clone()
        }
    }

    impl LineSink for CaptureSink {
        fn send_line(&self, _prefix: &str, line: &str) -> io::Result<()> {
            self.lines.lock().unwrap().push(line.to_string());
            Ok(())
        }
    }

    fn streamer_with_capture(recording: bool) -> (LineStreamer, CaptureSink) {
        let capture = CaptureSink::default();
        let streamer =
            LineStreamer::new("stdout", recording).with_sink(Box::new(capture.clone()));
        (streamer, capture)
    }

    #[test]
    fn reassembles_split_lines() {
        let (mut streamer, capture) = streamer_with_capture(false);
        streamer.write(b"abc").unwrap();
        assert!(capture.lines().is_empty());
        streamer.write(b"def\n").unwrap();
        assert_eq!(capture.lines(), vec!["abcdef\n"]);
    }

    #[test]
    fn forwards_multiple_lines_from_one_chunk() {
        let (mut streamer, capture) = streamer_with_capture(false);
        streamer.write(b"one\ntwo\nthr").unwrap();
        assert_eq!(capture.lines(), vec!["one\n", "two\n"]);
        streamer.flush().unwrap();
        assert_eq!(capture.lines(), vec!["one\n", "two\n", "thr"]);
    }

    #[test]
    fn flush_is_idempotent() {
        let (mut streamer, capture) = streamer_with_capture(false);
        streamer.write(b"tail").unwrap();
        streamer.flush().unwrap();
        streamer.flush().unwrap();
        assert_eq!(capture.lines(), vec!["tail"]);
    }

    #[test]
    fn close_is_safe_to_repeat() {
        let (mut streamer, capture) = streamer_with_capture(false);
        streamer.write(b"x\ny").unwrap();
        streamer.close().unwrap();
        streamer.close().unwrap();
        assert_eq!(capture.lines(), vec!["x\n", "y"]);
    }

    #[test]
    fn recording_roundtrip() {
        let (mut streamer, _capture) = streamer_with_capture(true);
        streamer.write(b"L1\nL2\n").unwrap();
        assert_eq!(streamer.drain_recording(), "L1\nL2\n");
        assert_eq!(streamer.drain_recording(), "");
    }

    #[test]
    fn recording_off_records_nothing() {
        let (mut streamer, _capture) = streamer_with_capture(false);
        streamer.write(b"L1\n").unwrap();
        assert_eq!(streamer.drain_recording(), "");
    }

    #[test]
    fn sink_failure_surfaces_as_io_error() {
        struct FailingSink;
        impl LineSink for FailingSink {
            fn send_line(&self, _prefix: &str, _line: &str) -> io::Result<()> {
                Err(io::Error::new(io::ErrorKind::BrokenPipe, "gone"))
            }
        }
        let mut streamer = LineStreamer::new("stderr", false).with_sink(Box::new(FailingSink));
        assert!(streamer.write(b"boom\n").is_err());
    }
}
