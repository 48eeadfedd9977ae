//! Terminal output: human and JSON renderers plus the shared `OutputContext`.
//!
//! Human text goes to stdout, errors to stderr. The JSON renderer prints one
//! document per command and the context is forced quiet in JSON mode, so
//! nothing else reaches stdout.

pub mod human;
pub mod json;
pub mod progress;
pub mod reporter;
pub mod styles;

use console::Term;
use owo_colors::{OwoColorize as _, Style};

pub use human::HumanRenderer;
pub use json::JsonRenderer;
pub use reporter::TerminalReporter;
pub use styles::Styles;

/// Leading symbol of a status line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mark {
    Step,
    Ok,
    Warn,
    Fail,
    Info,
}

impl Mark {
    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Step => "→",
            Self::Ok => "✓",
            Self::Warn => "!",
            Self::Fail => "✗",
            Self::Info => "ℹ",
        }
    }
}

/// Styling and terminal state shared by every human-mode printer.
pub struct OutputContext {
    pub styles: Styles,
    /// Whether stdout is a terminal.
    pub is_tty: bool,
    /// Suppress everything but errors.
    pub quiet: bool,
}

impl OutputContext {
    /// Colors are enabled only on a terminal, and never with `--no-color`
    /// or `NO_COLOR` set.
    #[must_use]
    pub fn new(no_color: bool, quiet: bool) -> Self {
        let is_tty = Term::stdout().is_term();
        let mut styles = Styles::default();
        let no_color_env = std::env::var_os("NO_COLOR").is_some_and(|v| !v.is_empty());
        if is_tty && !no_color && !no_color_env {
            styles.colorize();
        }
        Self { styles, is_tty, quiet }
    }

    /// Spinners need an interactive, non-quiet stdout.
    #[must_use]
    pub fn show_progress(&self) -> bool {
        self.is_tty && !self.quiet
    }

    #[must_use]
    pub fn style_of(&self, mark: Mark) -> Style {
        match mark {
            Mark::Step => self.styles.header,
            Mark::Ok => self.styles.success,
            Mark::Warn => self.styles.warning,
            Mark::Fail => self.styles.error,
            Mark::Info => self.styles.info,
        }
    }

    /// `"  <mark> <msg>"` with the mark styled.
    #[must_use]
    pub fn line(&self, mark: Mark, msg: &str) -> String {
        format!("  {} {msg}", mark.symbol().style(self.style_of(mark)))
    }

    fn print(&self, mark: Mark, msg: &str) {
        if !self.quiet {
            println!("{}", self.line(mark, msg));
        }
    }

    pub fn step(&self, msg: &str) {
        self.print(Mark::Step, msg);
    }

    pub fn success(&self, msg: &str) {
        self.print(Mark::Ok, msg);
    }

    pub fn warn(&self, msg: &str) {
        self.print(Mark::Warn, msg);
    }

    pub fn info(&self, msg: &str) {
        self.print(Mark::Info, msg);
    }

    /// Written to stderr even when quiet.
    pub fn error(&self, msg: &str) {
        eprintln!("{}", self.line(Mark::Fail, msg));
    }

    pub fn header(&self, title: &str) {
        if !self.quiet {
            println!("  {}", title.style(self.styles.header));
        }
    }

    /// Dimmed key followed by its value.
    pub fn kv(&self, key: &str, value: &str) {
        if !self.quiet {
            println!("  {}  {value}", key.style(self.styles.dim));
        }
    }
}

/// Renderer for the active output mode.
pub enum Renderer<'a> {
    Human(HumanRenderer<'a>),
    Json(JsonRenderer),
}
