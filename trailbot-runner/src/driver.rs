//! The run loop: repeated controller passes separated by a cooldown.
//!
//! Cancellation is cooperative. The flag is checked before each pass and
//! during the cooldown sleep, so a pass always completes before the loop
//! exits and the book is never persisted mid-pass. A failed save inside the
//! loop is logged and counted; only the final save can fail the run.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use thiserror::Error;
use trailbot_core::engine::{PassReport, TradingController};

use crate::state::{PersistedState, StateError, StateStore};

/// Longest single sleep between cancellation checks.
const CANCEL_POLL: Duration = Duration::from_millis(100);

#[derive(Debug, Error)]
pub enum DriverError {
    /// The closing save failed. The run itself completed; its totals are kept.
    #[error("failed to persist positions after {} passes: {source}", .summary.passes)]
    FinalSave {
        source: StateError,
        summary: Box<RunSummary>,
    },
}

/// Totals over a whole run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    pub passes: u64,
    pub opened: usize,
    pub closed: usize,
    pub failed: usize,
    pub saves: usize,
    /// In-loop saves that failed; the loop keeps managing positions.
    pub save_failures: usize,
    pub open_positions: usize,
    pub realized_pnl: f64,
    pub cancelled: bool,
}

impl RunSummary {
    fn record(&mut self, report: &PassReport) {
        self.passes += 1;
        self.opened += report.opened();
        self.closed += report.closed();
        self.failed += report.failed();
    }
}

pub struct Driver {
    controller: TradingController,
    store: Option<StateStore>,
    cooldown: Duration,
    max_passes: Option<u64>,
    cancel: Arc<AtomicBool>,
}

impl Driver {
    pub fn new(controller: TradingController) -> Self {
        let cooldown = Duration::from_secs(controller.config().cooldown_secs);
        Self {
            controller,
            store: None,
            cooldown,
            max_passes: None,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Persist the book to `store` after every pass that changed it.
    pub fn with_store(mut self, store: StateStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn with_max_passes(mut self, max_passes: Option<u64>) -> Self {
        self.max_passes = max_passes;
        self
    }

    /// Share an externally owned cancel flag.
    pub fn with_cancel(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    /// Flag that stops the loop at the next pass boundary when set.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn controller(&self) -> &TradingController {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut TradingController {
        &mut self.controller
    }

    pub fn into_controller(self) -> TradingController {
        self.controller
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    fn save(&self) -> Result<bool, StateError> {
        let Some(store) = &self.store else {
            return Ok(false);
        };
        let state = PersistedState::new(
            self.controller.tracker().book().clone(),
            self.controller.portfolio().clone(),
        );
        store.save(&state)?;
        Ok(true)
    }

    /// Sleep for `duration`, waking early on cancellation.
    fn cooldown_sleep(&self, duration: Duration) {
        let deadline = Instant::now() + duration;
        while !self.cancelled() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            std::thread::sleep((deadline - now).min(CANCEL_POLL));
        }
    }

    /// Run passes until cancelled or `max_passes` is reached.
    pub fn run(&mut self) -> Result<RunSummary, DriverError> {
        let mut summary = RunSummary::default();

        if let Err(e) = self.controller.initialize_portfolio() {
            // Sizing fetches the balance again per entry; nothing depends on this one.
            tracing::warn!(error = %e, "initial balance unavailable");
        }

        loop {
            if self.cancelled() {
                summary.cancelled = true;
                break;
            }

            let report = self.controller.run_pass();
            summary.record(&report);
            tracing::info!(
                pass = summary.passes,
                opened = report.opened(),
                closed = report.closed(),
                failed = report.failed(),
                positions = self.controller.tracker().len(),
                "pass finished"
            );

            if report.book_changed {
                match self.save() {
                    Ok(true) => summary.saves += 1,
                    Ok(false) => {}
                    Err(e) => {
                        summary.save_failures += 1;
                        tracing::error!(pass = summary.passes, error = %e, "state save failed");
                    }
                }
            }

            if self.max_passes.is_some_and(|max| summary.passes >= max) {
                break;
            }
            self.cooldown_sleep(self.cooldown);
        }

        if let Err(e) = self.controller.refresh_balance() {
            tracing::debug!(error = %e, "final balance unavailable");
        }
        summary.open_positions = self.controller.tracker().len();
        summary.realized_pnl = self.controller.portfolio().realized_pnl;
        match self.save() {
            Ok(true) => summary.saves += 1,
            Ok(false) => {}
            Err(source) => {
                tracing::error!(error = %source, "final state save failed");
                return Err(DriverError::FinalSave {
                    source,
                    summary: Box::new(summary),
                });
            }
        }
        tracing::info!(
            passes = summary.passes,
            opened = summary.opened,
            closed = summary.closed,
            realized_pnl = summary.realized_pnl,
            cancelled = summary.cancelled,
            "run stopped"
        );
        Ok(summary)
    }
}
