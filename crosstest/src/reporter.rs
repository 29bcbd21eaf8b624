//
// Copyright 2026 The Project Oak Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Outcome sinks that scenarios report progress to.

use std::fmt;

/// Proof that a fatal failure was reported. Scenarios return it as their
/// error so that nothing runs after the report.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Fatal {
    message: String,
}

impl Fatal {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for Fatal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

pub trait Reporter: Send {
    /// Marks the caller as a helper. Only meaningful for reporters that print
    /// source locations.
    fn helper(&mut self) {}

    /// Starts a new scenario, clearing the failure state of the previous one.
    fn begin(&mut self, scenario: &'static str);

    /// Records a failure and lets the scenario continue.
    fn error(&mut self, args: fmt::Arguments<'_>);

    /// Records a failure that ends the scenario.
    fn fatal(&mut self, args: fmt::Arguments<'_>) -> Fatal;

    /// Records the end of the happy path. Counts as a failure if an error was
    /// reported earlier in the same scenario.
    fn success(&mut self, args: fmt::Arguments<'_>);

    /// Ends the scenario as failed without a message of its own.
    fn fail_now(&mut self) -> Fatal;

    fn failed(&self) -> bool;
}

#[macro_export]
macro_rules! report_error {
    ($reporter:expr, $($arg:tt)+) => {
        $crate::reporter::Reporter::error(&mut *$reporter, format_args!($($arg)+))
    };
}

/// Evaluates to the [`Fatal`](crate::reporter::Fatal) produced by the report.
#[macro_export]
macro_rules! report_fatal {
    ($reporter:expr, $($arg:tt)+) => {
        $crate::reporter::Reporter::fatal(&mut *$reporter, format_args!($($arg)+))
    };
}

#[macro_export]
macro_rules! report_success {
    ($reporter:expr, $($arg:tt)+) => {
        $crate::reporter::Reporter::success(&mut *$reporter, format_args!($($arg)+))
    };
}

/// Reports a non-fatal error unless `$cond` holds.
#[macro_export]
macro_rules! check {
    ($reporter:expr, $cond:expr, $($arg:tt)+) => {
        if !$cond {
            $crate::report_error!($reporter, $($arg)+);
        }
    };
}

/// Reports a non-fatal error unless both values are equal.
#[macro_export]
macro_rules! check_eq {
    ($reporter:expr, $actual:expr, $expected:expr, $($arg:tt)+) => {
        match (&$actual, &$expected) {
            (actual, expected) => {
                if !(*actual == *expected) {
                    $crate::report_error!(
                        $reporter,
                        "{}: got {:?}, want {:?}",
                        format_args!($($arg)+),
                        actual,
                        expected
                    );
                }
            }
        }
    };
}

/// Returns from the enclosing scenario with a fatal report unless `$cond`
/// holds.
#[macro_export]
macro_rules! require {
    ($reporter:expr, $cond:expr, $($arg:tt)+) => {
        if !$cond {
            return Err($crate::report_fatal!($reporter, $($arg)+));
        }
    };
}

/// Unwraps an `Ok` value, or returns from the enclosing scenario with a fatal
/// report naming the error.
#[macro_export]
macro_rules! require_ok {
    ($reporter:expr, $result:expr, $($arg:tt)+) => {
        match $result {
            Ok(value) => value,
            Err(err) => {
                return Err($crate::report_fatal!(
                    $reporter,
                    "{}: {}",
                    format_args!($($arg)+),
                    err
                ));
            }
        }
    };
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventKind {
    Error,
    Fatal,
    Success,
    /// A success reported after an earlier error, or an explicit `fail_now`.
    Failure,
}

/// A structured record of one report.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Event {
    pub scenario: &'static str,
    pub kind: EventKind,
    pub message: String,
}

/// Collects events in memory and never terminates the process, so a test
/// can run the whole catalogue and inspect every failure afterwards.
#[derive(Debug, Default)]
pub struct InProcessReporter {
    scenario: &'static str,
    failed: bool,
    events: Vec<Event>,
}

impl InProcessReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn failures(&self) -> impl Iterator<Item = &Event> {
        self.events.iter().filter(|event| event.kind != EventKind::Success)
    }

    fn record(&mut self, kind: EventKind, message: String) {
        if kind != EventKind::Success {
            self.failed = true;
            log::warn!("{}: {:?}: {}", self.scenario, kind, message);
        }
        self.events.push(Event { scenario: self.scenario, kind, message });
    }
}

impl Reporter for InProcessReporter {
    fn begin(&mut self, scenario: &'static str) {
        self.scenario = scenario;
        self.failed = false;
    }

    fn error(&mut self, args: fmt::Arguments<'_>) {
        self.record(EventKind::Error, args.to_string());
    }

    fn fatal(&mut self, args: fmt::Arguments<'_>) -> Fatal {
        let message = args.to_string();
        self.record(EventKind::Fatal, message.clone());
        Fatal::new(message)
    }

    fn success(&mut self, args: fmt::Arguments<'_>) {
        if self.failed {
            self.record(EventKind::Failure, format!("{args} (after earlier errors)"));
        } else {
            self.record(EventKind::Success, args.to_string());
        }
    }

    fn fail_now(&mut self) -> Fatal {
        self.record(EventKind::Failure, "failed".to_string());
        Fatal::new(format!("{} failed", self.scenario))
    }

    fn failed(&self) -> bool {
        self.failed
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Sink {
    Log,
    Stdout,
}

/// Line-oriented reporter for the standalone drivers. Any fatal report, and
/// any success following an error, exits the process with status 1.
pub struct ConsoleReporter {
    sink: Sink,
    scenario: &'static str,
    failed: bool,
    exit: fn(i32) -> !,
}

impl ConsoleReporter {
    /// Writes through the `log` facade.
    pub fn cli() -> Self {
        Self::with_sink(Sink::Log)
    }

    /// Writes plain lines to standard output for a cross-runner to collect.
    pub fn cross() -> Self {
        Self::with_sink(Sink::Stdout)
    }

    fn with_sink(sink: Sink) -> Self {
        Self { sink, scenario: "", failed: false, exit: std::process::exit }
    }

    #[cfg(test)]
    fn with_exit(mut self, exit: fn(i32) -> !) -> Self {
        self.exit = exit;
        self
    }

    fn line(&self, prefix: &str, args: fmt::Arguments<'_>) {
        match self.sink {
            Sink::Log if prefix == "SUCCESS" => log::info!("{prefix}: {}: {args}", self.scenario),
            Sink::Log => log::error!("{prefix}: {}: {args}", self.scenario),
            Sink::Stdout => println!("{prefix}: {}: {args}", self.scenario),
        }
    }
}

impl Reporter for ConsoleReporter {
    fn begin(&mut self, scenario: &'static str) {
        self.scenario = scenario;
        self.failed = false;
    }

    fn error(&mut self, args: fmt::Arguments<'_>) {
        self.failed = true;
        self.line("ERROR", args);
    }

    fn fatal(&mut self, args: fmt::Arguments<'_>) -> Fatal {
        self.failed = true;
        self.line("FAIL", args);
        (self.exit)(1)
    }

    fn success(&mut self, args: fmt::Arguments<'_>) {
        if self.failed {
            self.line("FAIL", format_args!("{args} (after earlier errors)"));
            (self.exit)(1)
        }
        self.line("SUCCESS", args);
    }

    fn fail_now(&mut self) -> Fatal {
        self.failed = true;
        self.line("FAIL", format_args!("failed"));
        (self.exit)(1)
    }

    fn failed(&self) -> bool {
        self.failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exit_by_panicking(code: i32) -> ! {
        panic!("exit({code})")
    }

    fn scenario(reporter: &mut dyn Reporter, healthy: bool) -> Result<(), Fatal> {
        check!(reporter, healthy, "first check");
        require!(reporter, healthy, "prerequisite");
        report_success!(reporter, "done");
        Ok(())
    }

    #[test]
    fn in_process_records_success() {
        let mut reporter = InProcessReporter::new();
        reporter.begin("healthy");
        assert_eq!(scenario(&mut reporter, true), Ok(()));
        assert!(!reporter.failed());
        assert_eq!(reporter.events().len(), 1);
        assert_eq!(reporter.events()[0].kind, EventKind::Success);
    }

    #[test]
    fn in_process_fatal_stops_the_scenario() {
        let mut reporter = InProcessReporter::new();
        reporter.begin("broken");
        let fatal = scenario(&mut reporter, false).unwrap_err();
        assert_eq!(fatal.message(), "prerequisite");
        let kinds: Vec<EventKind> = reporter.events().iter().map(|event| event.kind).collect();
        assert_eq!(kinds, vec![EventKind::Error, EventKind::Fatal]);
        assert!(reporter.events().iter().all(|event| event.scenario == "broken"));
    }

    #[test]
    fn success_after_error_is_a_failure() {
        let mut reporter = InProcessReporter::new();
        reporter.begin("flaky");
        report_error!(&mut reporter, "value was {}", 3);
        report_success!(&mut reporter, "done");
        assert_eq!(reporter.failures().count(), 2);
        assert_eq!(reporter.events()[1].kind, EventKind::Failure);
    }

    #[test]
    fn begin_resets_failure_state() {
        let mut reporter = InProcessReporter::new();
        reporter.begin("first");
        let _ = reporter.fail_now();
        reporter.begin("second");
        assert!(!reporter.failed());
    }

    #[test]
    fn check_eq_formats_both_sides() {
        let mut reporter = InProcessReporter::new();
        reporter.begin("sizes");
        check_eq!(&mut reporter, 8usize, 9usize, "payload {}", "length");
        assert_eq!(reporter.events()[0].message, "payload length: got 8, want 9");
    }

    #[test]
    fn require_ok_includes_the_error() {
        fn parse(reporter: &mut dyn Reporter) -> Result<(), Fatal> {
            let _value: i32 = require_ok!(reporter, "x".parse::<i32>(), "parsing");
            Ok(())
        }
        let mut reporter = InProcessReporter::new();
        reporter.begin("parse");
        let fatal = parse(&mut reporter).unwrap_err();
        assert!(fatal.message().starts_with("parsing: "));
    }

    #[test]
    fn console_success_without_errors_returns() {
        let mut reporter = ConsoleReporter::cli().with_exit(exit_by_panicking);
        reporter.begin("healthy");
        assert_eq!(scenario(&mut reporter, true), Ok(()));
    }

    #[test]
    #[should_panic(expected = "exit(1)")]
    fn console_fatal_exits() {
        let mut reporter = ConsoleReporter::cross().with_exit(exit_by_panicking);
        reporter.begin("broken");
        let _ = report_fatal!(&mut reporter, "cannot open stream");
    }

    #[test]
    #[should_panic(expected = "exit(1)")]
    fn console_success_after_error_exits() {
        let mut reporter = ConsoleReporter::cli().with_exit(exit_by_panicking);
        reporter.begin("flaky");
        report_error!(&mut reporter, "mismatch");
        report_success!(&mut reporter, "done");
    }
}
