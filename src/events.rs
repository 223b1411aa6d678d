// src/events.rs

//! Installer events and the reporting sink
//!
//! Every significant step (file installed, file unchanged, checksum
//! computed, optional source skipped) emits a leveled [`Event`] through a
//! [`Reporter`]. The core makes no assumption about rendering: the default
//! reporter forwards to `tracing`, and tests use a collecting reporter to
//! assert on what was emitted.

use std::fmt;
use std::sync::Mutex;
use tracing::{debug, info, warn};

/// Verbosity level attached to an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Level {
    #[default]
    Default,
    Verbose,
    Debug,
}

/// A reportable installer event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A target's checksum was computed and verified
    Checksum { name: String, checksum: String },
    /// A target was already up to date and left untouched
    FileUnchanged { desc: String },
    /// A job (source pull or target install) completed
    JobDone { desc: String, level: Level },
    /// A job failed; the error is also surfaced through the job graph
    JobFailed { desc: String, error: String },
    /// A namelist group was written
    NamelistGroup { text: String },
    /// A missing optional source was dropped from a target
    SourceSkipped { target: String, source: String },
}

impl Event {
    pub fn level(&self) -> Level {
        match self {
            Event::Checksum { .. } => Level::Default,
            Event::FileUnchanged { .. } => Level::Verbose,
            Event::JobDone { level, .. } => *level,
            Event::JobFailed { .. } => Level::Default,
            Event::NamelistGroup { .. } => Level::Debug,
            Event::SourceSkipped { .. } => Level::Default,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::Checksum { name, checksum } => {
                write!(f, "checksum: {}: {}", name, checksum)
            }
            Event::FileUnchanged { desc } => write!(f, "{}", desc),
            Event::JobDone { desc, .. } => write!(f, "{}", desc),
            Event::JobFailed { desc, error } => write!(f, "{}: {}", desc, error),
            Event::NamelistGroup { text } => write!(f, "{}", text),
            Event::SourceSkipped { target, source } => {
                write!(f, "file:{}: skip missing optional source: {}", target, source)
            }
        }
    }
}

/// Sink for installer events
pub trait Reporter {
    fn report(&self, event: &Event);
}

/// Default reporter: forwards events to `tracing` by level
#[derive(Debug, Default)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn report(&self, event: &Event) {
        match event {
            Event::JobFailed { .. } => warn!("{}", event),
            _ => match event.level() {
                Level::Default => info!("{}", event),
                Level::Verbose | Level::Debug => debug!("{}", event),
            },
        }
    }
}

/// Reporter that records every event, for tests and embedders
#[derive(Debug, Default)]
pub struct CollectingReporter {
    events: Mutex<Vec<Event>>,
}

impl CollectingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything reported so far
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

impl Reporter for CollectingReporter {
    fn report(&self, event: &Event) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_display() {
        let event = Event::Checksum {
            name: "etc/app.conf".to_string(),
            checksum: "abc123".to_string(),
        };
        assert_eq!(event.to_string(), "checksum: etc/app.conf: abc123");

        let event = Event::SourceSkipped {
            target: "etc/app.conf".to_string(),
            source: "missing.conf".to_string(),
        };
        assert_eq!(
            event.to_string(),
            "file:etc/app.conf: skip missing optional source: missing.conf"
        );
    }

    #[test]
    fn test_collecting_reporter() {
        let reporter = CollectingReporter::new();
        reporter.report(&Event::FileUnchanged {
            desc: "unchanged: a".to_string(),
        });
        reporter.report(&Event::JobDone {
            desc: "install: b".to_string(),
            level: Level::Default,
        });

        let events = reporter.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].level(), Level::Verbose);
    }
}
