//! Color palette for human output.
//!
//! The default `Styles` is plain text; `colorize` switches the palette on.

use owo_colors::Style;

use crate::domain::cleanup::StepOutcome;
use crate::domain::module::ModuleStatus;
use crate::domain::service::ServiceStatus;

#[derive(Default, Clone)]
pub struct Styles {
    pub success: Style,
    pub warning: Style,
    pub error: Style,
    pub info: Style,
    /// Secondary detail such as captured output and skip reasons.
    pub dim: Style,
    pub header: Style,
}

impl Styles {
    pub fn colorize(&mut self) {
        *self = Self {
            success: Style::new().green(),
            warning: Style::new().yellow(),
            error: Style::new().red(),
            info: Style::new().blue(),
            dim: Style::new().dimmed(),
            header: Style::new().bold().cyan(),
        };
    }

    #[must_use]
    pub fn for_module(&self, status: ModuleStatus) -> Style {
        match status {
            ModuleStatus::Installed => self.success,
            ModuleStatus::InstalledWithWarnings => self.warning,
            ModuleStatus::Failed => self.error,
            ModuleStatus::Skipped => self.dim,
        }
    }

    /// A teardown step. A skipped step is not a problem, so it stays dim.
    #[must_use]
    pub fn for_step(&self, outcome: &StepOutcome) -> Style {
        match outcome {
            StepOutcome::Succeeded => self.success,
            StepOutcome::Failed(_) => self.error,
            StepOutcome::Skipped(_) => self.dim,
        }
    }

    #[must_use]
    pub fn for_service(&self, status: &ServiceStatus) -> Style {
        match status {
            ServiceStatus::Running { .. } => self.success,
            ServiceStatus::Stopped => self.dim,
            ServiceStatus::PortOccupiedByOther { .. } => self.warning,
        }
    }
}
