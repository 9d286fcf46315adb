//! Recovery reporters
//!
//! A reporter only observes. It cannot fail a run and it never sees
//! anything it could use to change what gets recovered.

use std::io::{self, Write};

use super::events::RecoveryEvent;
use crate::path::display_name;

/// Receives events from a recovery run.
pub trait Reporter {
    fn report(&mut self, event: &RecoveryEvent);
}

/// Prints line-oriented progress for humans.
pub struct ConsoleReporter<W: Write> {
    out: W,
    destination: Option<String>,
}

impl ConsoleReporter<io::Stdout> {
    /// Reporter writing to stdout
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> ConsoleReporter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            destination: None,
        }
    }

    /// Names the destination in the final summary.
    pub fn with_destination(mut self, destination: impl Into<String>) -> Self {
        self.destination = Some(destination.into());
        self
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn render(&mut self, event: &RecoveryEvent) -> io::Result<()> {
        match event {
            RecoveryEvent::Started { bucket_count } => {
                writeln!(self.out, "Found {} top-level buckets to recover", bucket_count)
            }
            RecoveryEvent::BucketStarted { path } => {
                writeln!(self.out, "Recovering bucket {} ...", path)
            }
            RecoveryEvent::Fault(fault) => writeln!(
                self.out,
                "  [FAULT] {}: {} (recovered {} entries before the fault)",
                fault.path, fault.diagnostic, fault.entries_staged
            ),
            RecoveryEvent::WriteWarning(warning) => match &warning.key {
                Some(key) => writeln!(
                    self.out,
                    "  [WARN] Failed to write key {} in {}: {}",
                    display_name(key),
                    warning.path,
                    warning.diagnostic
                ),
                None => writeln!(
                    self.out,
                    "  [WARN] Failed to create bucket {}: {}",
                    warning.path, warning.diagnostic
                ),
            },
            RecoveryEvent::BucketFinished(outcome) => {
                let status = if outcome.faulted { "PARTIAL" } else { "OK" };
                write!(
                    self.out,
                    "  [{}] {} keys, {} sub-buckets",
                    status, outcome.entries_written, outcome.sub_buckets
                )?;
                if outcome.skipped_nested > 0 {
                    write!(self.out, ", {} nested buckets skipped", outcome.skipped_nested)?;
                }
                writeln!(self.out)
            }
            RecoveryEvent::Finished(summary) => {
                writeln!(self.out)?;
                writeln!(self.out, "=== Recovery Summary ===")?;
                writeln!(self.out, "Total keys recovered: {}", summary.entries_recovered)?;
                writeln!(
                    self.out,
                    "Buckets with errors:  {} / {}",
                    summary.buckets_with_faults, summary.buckets_total
                )?;
                if summary.root_fault.is_some() {
                    writeln!(self.out, "Bucket listing:       incomplete")?;
                }
                if summary.write_warnings > 0 {
                    writeln!(self.out, "Skipped writes:       {}", summary.write_warnings)?;
                }
                if summary.skipped_nested > 0 {
                    writeln!(self.out, "Skipped nested:       {}", summary.skipped_nested)?;
                }
                if let Some(destination) = &self.destination {
                    writeln!(self.out, "Output: {}", destination)?;
                }
                self.out.flush()
            }
        }
    }
}

impl<W: Write> Reporter for ConsoleReporter<W> {
    fn report(&mut self, event: &RecoveryEvent) {
        if let Err(e) = self.render(event) {
            tracing::debug!(error = %e, event = event.as_str(), "failed to print progress");
        }
    }
}

/// Keeps every event, for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryReporter {
    events: Vec<RecoveryEvent>,
}

impl MemoryReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[RecoveryEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl Reporter for MemoryReporter {
    fn report(&mut self, event: &RecoveryEvent) {
        self.events.push(event.clone());
    }
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn report(&mut self, _event: &RecoveryEvent) {}
}
