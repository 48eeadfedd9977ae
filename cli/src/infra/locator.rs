//! Executable lookup: implements `ToolLocator` with `which`.

use std::path::{Path, PathBuf};

use crate::application::ports::ToolLocator;

#[derive(Debug, Default, Clone, Copy)]
pub struct PathLocator;

fn is_executable(path: &Path) -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        path.metadata()
            .is_ok_and(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
    }
    #[cfg(not(unix))]
    {
        path.is_file()
    }
}

impl ToolLocator for PathLocator {
    fn locate(&self, candidates: &[String]) -> Option<PathBuf> {
        let explicit = candidates
            .iter()
            .map(Path::new)
            .filter(|p| p.components().count() > 1)
            .find(|p| is_executable(p))
            .map(Path::to_path_buf);
        explicit.or_else(|| candidates.iter().find_map(|c| which::which(c).ok()))
    }

    fn on_path(&self, program: &str) -> bool {
        which::which(program).is_ok()
    }
}
