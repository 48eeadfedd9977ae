//! `TerminalReporter`, the presentation side of `ProgressReporter`.
//!
//! On a terminal each `step()` becomes a spinner that the next `success()` or
//! `warn()` resolves in place. Elsewhere every event is printed as a plain
//! status line, so piped logs of an install stay readable.

use std::cell::RefCell;

use indicatif::ProgressBar;

use crate::application::ports::ProgressReporter;
use crate::output::{Mark, OutputContext, progress};

pub struct TerminalReporter<'a> {
    ctx: &'a OutputContext,
    active: RefCell<Option<ProgressBar>>,
}

impl<'a> TerminalReporter<'a> {
    #[must_use]
    pub fn new(ctx: &'a OutputContext) -> Self {
        Self { ctx, active: RefCell::new(None) }
    }

    /// Clear a spinner whose step never resolved.
    fn settle(&self) {
        if let Some(pb) = self.active.borrow_mut().take() {
            pb.finish_and_clear();
        }
    }

    fn resolve(&self, mark: Mark, message: &str) {
        match self.active.borrow_mut().take() {
            Some(pb) => progress::finish(&pb, mark, message),
            None if mark == Mark::Ok => self.ctx.success(message),
            None => self.ctx.warn(message),
        }
    }
}

impl ProgressReporter for TerminalReporter<'_> {
    fn step(&self, message: &str) {
        if self.ctx.quiet {
            return;
        }
        self.settle();
        if self.ctx.show_progress() {
            *self.active.borrow_mut() = Some(progress::spinner(message));
        } else {
            self.ctx.step(message);
        }
    }

    fn success(&self, message: &str) {
        if !self.ctx.quiet {
            self.resolve(Mark::Ok, message);
        }
    }

    fn warn(&self, message: &str) {
        if !self.ctx.quiet {
            self.resolve(Mark::Warn, message);
        }
    }
}

impl Drop for TerminalReporter<'_> {
    fn drop(&mut self) {
        self.settle();
    }
}
