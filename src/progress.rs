use crate::error::{ReportError, Result};
use log::debug;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Receives progress updates. Returning `false` asks generation to stop at
/// the next checkpoint.
pub trait ProgressObserver {
    fn report(&mut self, status: &str, percent: u8) -> bool;
}

impl<F> ProgressObserver for F
where
    F: FnMut(&str, u8) -> bool,
{
    fn report(&mut self, status: &str, percent: u8) -> bool {
        self(status, percent)
    }
}

/// Observer for callers that do not track progress.
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentProgress;

impl ProgressObserver for SilentProgress {
    fn report(&mut self, _status: &str, _percent: u8) -> bool {
        true
    }
}

/// Shared cancellation flag; cloning shares the flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// The single "should continue" predicate consulted before each item and each
/// image fetch.
pub struct Checkpoint<'a> {
    observer: &'a mut (dyn ProgressObserver + Send),
    token: Option<CancellationToken>,
    last_percent: u8,
}

impl<'a> Checkpoint<'a> {
    pub fn new(
        observer: &'a mut (dyn ProgressObserver + Send),
        token: Option<CancellationToken>,
    ) -> Self {
        Self {
            observer,
            token,
            last_percent: 0,
        }
    }

    pub fn check(&mut self, status: &str, percent: u8) -> Result<()> {
        let percent = percent.min(100).max(self.last_percent);
        self.last_percent = percent;
        let keep_going = self.observer.report(status, percent);
        let token_cancelled = self.token.as_ref().is_some_and(CancellationToken::is_cancelled);
        if !keep_going || token_cancelled {
            debug!("cancellation observed at '{status}' ({percent}%)");
            return Err(ReportError::Cancelled);
        }
        Ok(())
    }

    /// Final notification. Work is already done, so the answer is ignored.
    pub fn complete(&mut self, status: &str) {
        self.last_percent = 100;
        let _ = self.observer.report(status, 100);
    }
}

/// Terminal classification of an export attempt.
#[derive(Debug)]
pub enum ExportOutcome<T> {
    Completed(T),
    Cancelled,
    Failed(String),
}

impl<T> ExportOutcome<T> {
    pub fn from_result(result: Result<T>) -> Self {
        match result {
            Ok(value) => ExportOutcome::Completed(value),
            Err(ReportError::Cancelled) => ExportOutcome::Cancelled,
            Err(err) => ExportOutcome::Failed(err.to_string()),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ExportOutcome::Cancelled)
    }
}

/// Percentage for the `index`-th of `total` units inside a `base..base+span` band.
pub fn proportional(base: u8, span: u8, index: usize, total: usize) -> u8 {
    if total == 0 {
        return base;
    }
    let step = (span as usize * index.min(total)) / total;
    base.saturating_add(step as u8)
}
