//! Test logging for gate scenarios.
//!
//! Concurrency tests record what each actor observed into a [`TestLogger`]
//! and assert on the recorded order afterwards, instead of asserting from
//! inside worker threads.
//!
//! Every event is kept. The history checks ([`TestLogger::assert_exclusion`],
//! [`TestLogger::assert_all_released`]) replay grants and releases, so a
//! logger never filters them out.
//!
//! # Example
//!
//! ```
//! use accessgate::test_logging::{TestEvent, TestLogger};
//!
//! let logger = TestLogger::new();
//! logger.log(TestEvent::ReadAcquired { actor: "r1".into(), readers: 1 });
//! logger.log(TestEvent::ReadReleased { actor: "r1".into(), readers: 1 });
//!
//! logger.assert_exclusion(2);
//! logger.assert_all_released();
//! ```

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt::{self, Write as _};
use std::time::{Duration, Instant};

use crate::gate::PermitKind;

/// A typed event captured by the test logger.
///
/// `actor` is whatever label the test gives the thread or task involved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TestEvent {
    /// A read permit was granted.
    ReadAcquired {
        /// Who acquired it.
        actor: String,
        /// Active readers the actor observed.
        readers: usize,
    },
    /// A read permit is about to be released.
    ReadReleased {
        /// Who released it.
        actor: String,
        /// Active readers the actor observed.
        readers: usize,
    },
    /// The write permit was granted.
    WriteAcquired {
        /// Who acquired it.
        actor: String,
    },
    /// The write permit is about to be released.
    WriteReleased {
        /// Who released it.
        actor: String,
    },
    /// An acquire had to wait.
    Waiting {
        /// Who is waiting.
        actor: String,
        /// Which permit.
        kind: PermitKind,
    },
    /// A non-blocking acquire was refused.
    TryFailed {
        /// Who tried.
        actor: String,
        /// Which permit.
        kind: PermitKind,
        /// The refusal, rendered.
        reason: String,
    },
    /// A wait ended through cancellation.
    AcquireCancelled {
        /// Who gave up.
        actor: String,
        /// Which permit.
        kind: PermitKind,
    },
    /// A release was rejected as a protocol violation.
    Violation {
        /// Who attempted the release.
        actor: String,
        /// Which permit.
        kind: PermitKind,
    },
}

impl TestEvent {
    /// Short category name used in reports.
    #[must_use]
    pub fn category(&self) -> &'static str {
        match self {
            Self::ReadAcquired { .. } | Self::ReadReleased { .. } => "read",
            Self::WriteAcquired { .. } | Self::WriteReleased { .. } => "write",
            Self::Waiting { .. } | Self::TryFailed { .. } | Self::AcquireCancelled { .. } => {
                "acquire"
            }
            Self::Violation { .. } => "protocol",
        }
    }

    /// The actor the event is about.
    #[must_use]
    pub fn actor(&self) -> &str {
        match self {
            Self::ReadAcquired { actor, .. }
            | Self::ReadReleased { actor, .. }
            | Self::WriteAcquired { actor }
            | Self::WriteReleased { actor }
            | Self::Waiting { actor, .. }
            | Self::TryFailed { actor, .. }
            | Self::AcquireCancelled { actor, .. }
            | Self::Violation { actor, .. } => actor,
        }
    }
}

impl fmt::Display for TestEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadAcquired { actor, readers } => {
                write!(f, "read acquired: actor={actor} readers={readers}")
            }
            Self::ReadReleased { actor, readers } => {
                write!(f, "read released: actor={actor} readers={readers}")
            }
            Self::WriteAcquired { actor } => write!(f, "write acquired: actor={actor}"),
            Self::WriteReleased { actor } => write!(f, "write released: actor={actor}"),
            Self::Waiting { actor, kind } => write!(f, "waiting: actor={actor} kind={kind}"),
            Self::TryFailed {
                actor,
                kind,
                reason,
            } => write!(f, "try failed: actor={actor} kind={kind} reason=\"{reason}\""),
            Self::AcquireCancelled { actor, kind } => {
                write!(f, "cancelled: actor={actor} kind={kind}")
            }
            Self::Violation { actor, kind } => write!(f, "violation: actor={actor} kind={kind}"),
        }
    }
}

/// A timestamped event record.
#[derive(Debug, Clone)]
pub struct LogRecord {
    /// Time since logger creation.
    pub elapsed: Duration,
    /// The event that occurred.
    pub event: TestEvent,
}

/// Captures typed gate events with timestamps.
///
/// Shared by reference between scoped threads; recording order is the order
/// the internal lock was taken.
#[derive(Debug)]
pub struct TestLogger {
    events: Mutex<Vec<LogRecord>>,
    start_time: Instant,
}

impl TestLogger {
    /// Creates an empty logger.
    #[must_use]
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            start_time: Instant::now(),
        }
    }

    /// Records an event.
    pub fn log(&self, event: TestEvent) {
        let elapsed = self.start_time.elapsed();
        self.events.lock().push(LogRecord { elapsed, event });
    }

    /// Returns the number of captured events.
    #[must_use]
    pub fn event_count(&self) -> usize {
        self.events.lock().len()
    }

    /// Returns a snapshot of all captured events.
    #[must_use]
    pub fn events(&self) -> Vec<LogRecord> {
        self.events.lock().clone()
    }

    /// Returns the captured events matching `pred`, in order.
    #[must_use]
    pub fn filter(&self, pred: impl Fn(&TestEvent) -> bool) -> Vec<TestEvent> {
        self.events
            .lock()
            .iter()
            .filter(|r| pred(&r.event))
            .map(|r| r.event.clone())
            .collect()
    }

    /// Generates a report of all captured events.
    #[must_use]
    pub fn report(&self) -> String {
        let events = self.events();
        let mut report = String::new();

        let _ = writeln!(report, "=== Gate Event Log ({} events) ===", events.len());
        let _ = writeln!(report);

        for record in &events {
            let _ = writeln!(
                report,
                "[{:>10.3}ms] {:>8} | {}",
                record.elapsed.as_secs_f64() * 1000.0,
                record.event.category(),
                record.event
            );
        }

        let count = |pred: fn(&TestEvent) -> bool| {
            events.iter().filter(|r| pred(&r.event)).count()
        };

        let _ = writeln!(report);
        let _ = writeln!(report, "=== Statistics ===");
        let _ = writeln!(
            report,
            "Read grants: {}",
            count(|e| matches!(e, TestEvent::ReadAcquired { .. }))
        );
        let _ = writeln!(
            report,
            "Write grants: {}",
            count(|e| matches!(e, TestEvent::WriteAcquired { .. }))
        );
        let _ = writeln!(
            report,
            "Waits: {}",
            count(|e| matches!(e, TestEvent::Waiting { .. }))
        );
        let _ = writeln!(
            report,
            "Cancellations: {}",
            count(|e| matches!(e, TestEvent::AcquireCancelled { .. }))
        );
        let _ = writeln!(
            report,
            "Violations: {}",
            count(|e| matches!(e, TestEvent::Violation { .. }))
        );

        if let Some(last) = events.last() {
            let _ = writeln!(report, "Total duration: {:?}", last.elapsed);
        }

        report
    }

    /// Replays the recorded grants and releases and checks exclusion.
    ///
    /// Actors must record a grant after acquiring and a release before
    /// releasing, so every logged interval sits inside the real one.
    ///
    /// # Panics
    ///
    /// Panics if the log ever shows a writer alongside readers, two writers,
    /// or more than `max_readers` readers.
    pub fn assert_exclusion(&self, max_readers: usize) {
        let events = self.events();
        let mut readers = 0usize;
        let mut writer = false;

        for (index, record) in events.iter().enumerate() {
            match &record.event {
                TestEvent::ReadAcquired { .. } => readers += 1,
                TestEvent::ReadReleased { .. } => readers = readers.saturating_sub(1),
                TestEvent::WriteAcquired { .. } => {
                    assert!(!writer, "second writer at event {index}\n{}", self.report());
                    writer = true;
                }
                TestEvent::WriteReleased { .. } => writer = false,
                _ => continue,
            }
            assert!(
                !(writer && readers > 0),
                "writer overlapped {readers} readers at event {index}\n{}",
                self.report()
            );
            assert!(
                readers <= max_readers,
                "{readers} readers exceed capacity {max_readers} at event {index}\n{}",
                self.report()
            );
        }
    }

    /// Asserts that every actor released as many permits as it acquired.
    ///
    /// # Panics
    ///
    /// Panics listing the actors still holding permits.
    pub fn assert_all_released(&self) {
        let mut held: HashMap<String, i64> = HashMap::new();
        for record in self.events() {
            let delta = match record.event {
                TestEvent::ReadAcquired { .. } | TestEvent::WriteAcquired { .. } => 1,
                TestEvent::ReadReleased { .. } | TestEvent::WriteReleased { .. } => -1,
                _ => continue,
            };
            *held.entry(record.event.actor().to_owned()).or_default() += delta;
        }

        let mut leaked: Vec<_> = held.into_iter().filter(|(_, n)| *n != 0).collect();
        leaked.sort();
        assert!(
            leaked.is_empty(),
            "Permit leak detected: {leaked:?}\n\nFull log:\n{}",
            self.report()
        );
    }
}

impl Default for TestLogger {
    fn default() -> Self {
        Self::new()
    }
}

/// Assert a condition, printing the full log on failure.
///
/// ```ignore
/// assert_log!(logger, result.is_ok(), "expected success, got {:?}", result);
/// ```
#[macro_export]
macro_rules! assert_log {
    ($logger:expr, $cond:expr) => {
        if !$cond {
            eprintln!("{}", $logger.report());
            panic!("assertion failed: {}", stringify!($cond));
        }
    };
    ($logger:expr, $cond:expr, $($arg:tt)*) => {
        if !$cond {
            eprintln!("{}", $logger.report());
            panic!($($arg)*);
        }
    };
}
