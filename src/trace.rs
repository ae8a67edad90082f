//! Line-oriented progress and debug output.
//!
//! Trace output is a side channel: nothing here feeds back into control flow.

use std::sync::{Arc, Mutex};

use colored::Colorize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Level {
    Progress,
    Debug,
    Notice,
}

/// Where trace lines go.
#[derive(Debug, Clone)]
pub enum Sink {
    Stdout,
    Silent,
    /// Keeps every line in memory, for tests.
    Capture(Arc<Mutex<Vec<String>>>),
}

#[derive(Debug, Clone)]
pub struct Tracer {
    debug: bool,
    progress: bool,
    sink: Sink,
}

impl Default for Tracer {
    fn default() -> Self {
        Self::stdout(false, true)
    }
}

impl Tracer {
    pub fn stdout(debug: bool, progress: bool) -> Self {
        Self {
            debug,
            progress,
            sink: Sink::Stdout,
        }
    }

    pub fn silent() -> Self {
        Self {
            debug: false,
            progress: false,
            sink: Sink::Silent,
        }
    }

    /// Tracer that records every line, with the buffer it writes to.
    pub fn capture(debug: bool) -> (Self, Arc<Mutex<Vec<String>>>) {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let tracer = Self {
            debug,
            progress: true,
            sink: Sink::Capture(Arc::clone(&lines)),
        };
        (tracer, lines)
    }

    pub fn debug_enabled(&self) -> bool {
        self.debug && !matches!(self.sink, Sink::Silent)
    }

    /// Per-cycle progress, e.g. critical section entry and exit.
    pub fn progress(&self, line: impl FnOnce() -> String) {
        if self.progress {
            self.emit(Level::Progress, line());
        }
    }

    /// Phase-transition trace, only built when debug is on.
    pub fn debug(&self, line: impl FnOnce() -> String) {
        if self.debug_enabled() {
            self.emit(Level::Debug, line());
        }
    }

    /// Lifecycle lines printed regardless of the progress switch.
    pub fn notice(&self, line: impl Into<String>) {
        self.emit(Level::Notice, line.into());
    }

    fn emit(&self, level: Level, line: String) {
        match &self.sink {
            Sink::Silent => {}
            Sink::Stdout => match level {
                Level::Progress => println!("{line}"),
                Level::Debug => println!("{}", line.dimmed()),
                Level::Notice => println!("{}", line.yellow()),
            },
            Sink::Capture(lines) => {
                // A poisoned buffer still holds every line written before the panic.
                let mut lines = lines.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                lines.push(line);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_records_progress_and_notice() {
        let (tracer, lines) = Tracer::capture(false);
        tracer.progress(|| "0: entering critical section".to_string());
        tracer.debug(|| "0: choosing".to_string());
        tracer.notice("stopping");

        let lines = lines.lock().unwrap();
        assert_eq!(*lines, vec!["0: entering critical section", "stopping"]);
    }

    #[test]
    fn test_debug_lines_only_when_enabled() {
        let (tracer, lines) = Tracer::capture(true);
        tracer.debug(|| "1: chose number 4".to_string());
        assert!(tracer.debug_enabled());
        assert_eq!(lines.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_silent_never_builds_lines() {
        let tracer = Tracer::silent();
        tracer.progress(|| panic!("progress line built"));
        tracer.debug(|| panic!("debug line built"));
        assert!(!tracer.debug_enabled());
    }
}
