//! Spinners for long-running install and teardown steps.

#![allow(clippy::expect_used)] // Templates are compile-time constants

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

use crate::output::Mark;

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", " "];

/// Start a spinner showing `msg` and the elapsed time.
#[must_use]
pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .tick_strings(TICKS)
            .template("  {spinner:.cyan} {msg} {elapsed:.dim}")
            .expect("valid template"),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Replace the spinner with a final `mark` line.
pub fn finish(pb: &ProgressBar, mark: Mark, msg: &str) {
    let template = match mark {
        Mark::Ok => "  {prefix:.green} {msg}",
        Mark::Warn => "  {prefix:.yellow} {msg}",
        Mark::Fail => "  {prefix:.red} {msg}",
        Mark::Step | Mark::Info => "  {prefix:.cyan} {msg}",
    };
    pb.set_style(ProgressStyle::default_spinner().template(template).expect("valid template"));
    pb.set_prefix(mark.symbol());
    pb.finish_with_message(msg.to_string());
}
