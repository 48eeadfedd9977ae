//! Installation session state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::module::SessionReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Created,
    PreflightPassed,
    Downloading,
    Installing,
    Configuring,
    Verifying,
    Completed,
    Failed,
}

impl SessionState {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// The state that follows on success.
    #[must_use]
    pub fn next(self) -> Self {
        match self {
            Self::Created => Self::PreflightPassed,
            Self::PreflightPassed => Self::Downloading,
            Self::Downloading => Self::Installing,
            Self::Installing => Self::Configuring,
            Self::Configuring => Self::Verifying,
            Self::Verifying | Self::Completed => Self::Completed,
            Self::Failed => Self::Failed,
        }
    }

    /// Whether moving to `to` is legal.
    #[must_use]
    pub fn can_transition(self, to: Self) -> bool {
        if self.is_terminal() {
            return false;
        }
        to == Self::Failed || to == self.next()
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::PreflightPassed => "preflight",
            Self::Downloading => "downloading",
            Self::Installing => "installing",
            Self::Configuring => "configuring",
            Self::Verifying => "verifying",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// Persisted record of the most recent install session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionLog {
    pub finished_at: DateTime<Utc>,
    pub state: SessionState,
    pub report: SessionReport,
}
