//! Line-oriented output the test harness asserts on.
//!
//! Status lines go to stdout and failure diagnostics to stderr, each flushed
//! as soon as it is written so the harness sees them in the same order as the
//! JVM's own output. These lines are a contract and bypass the `log` facade;
//! `RUST_LOG` only controls the extra diagnostics.

use std::fmt;
use std::io::{self, Write};
use std::sync::Arc;

use parking_lot::Mutex;

type Sink = Mutex<Box<dyn Write + Send>>;

pub struct Console {
    out: Sink,
    err: Sink,
}

impl Console {
    pub fn new(out: impl Write + Send + 'static, err: impl Write + Send + 'static) -> Self {
        Self {
            out: Mutex::new(Box::new(out)),
            err: Mutex::new(Box::new(err)),
        }
    }

    pub fn stdio() -> Self {
        Self::new(io::stdout(), io::stderr())
    }

    /// A console that records into memory, and the handle to read it back.
    pub fn capture() -> (Self, Transcript) {
        let transcript = Transcript::default();
        let console = Self::new(SharedBuf(transcript.out.clone()), SharedBuf(transcript.err.clone()));
        (console, transcript)
    }

    pub fn status(&self, line: fmt::Arguments<'_>) {
        write_line(&self.out, line);
    }

    pub fn diagnostic(&self, line: fmt::Arguments<'_>) {
        write_line(&self.err, line);
    }
}

impl fmt::Debug for Console {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Console").finish_non_exhaustive()
    }
}

fn write_line(sink: &Sink, line: fmt::Arguments<'_>) {
    let mut w = sink.lock();
    // Nothing sensible to do if the JVM's stdout is gone.
    let _ = w.write_fmt(format_args!("{}\n", line));
    let _ = w.flush();
}

/// Everything a captured [`Console`] has written so far.
#[derive(Clone, Default)]
pub struct Transcript {
    out: Arc<Mutex<Vec<u8>>>,
    err: Arc<Mutex<Vec<u8>>>,
}

impl Transcript {
    pub fn stdout(&self) -> String {
        String::from_utf8_lossy(&self.out.lock()).into_owned()
    }

    pub fn stderr(&self) -> String {
        String::from_utf8_lossy(&self.err.lock()).into_owned()
    }

    pub fn stdout_lines(&self) -> Vec<String> {
        self.stdout().lines().map(str::to_owned).collect()
    }

    pub fn stderr_lines(&self) -> Vec<String> {
        self.stderr().lines().map(str::to_owned).collect()
    }
}

struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
