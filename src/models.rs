// src/models.rs

use crate::core::task_manager::DisplayMode;
use std::fmt;
use std::num::NonZeroUsize;
use std::path::PathBuf;

/// The operations `vx` can perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Generate,
    Delete,
    Init,
}

impl Command {
    pub const ALL: [Self; 3] = [Self::Generate, Self::Delete, Self::Init];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Generate => "generate",
            Self::Delete => "delete",
            Self::Init => "init",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Flags given on the command line, shared by every operation.
#[derive(Debug, Clone)]
pub struct CliSettings {
    pub template: Option<String>,
    pub name: Option<String>,
    pub workspace: Option<String>,
    /// Ask for confirmation before acting.
    pub confirm: bool,
    /// Maximum number of file operations in flight. `None` is unbounded.
    pub concurrency: Option<NonZeroUsize>,
    pub dir: Option<String>,
    pub author: Option<String>,
    pub email: Option<String>,
}

impl Default for CliSettings {
    fn default() -> Self {
        Self {
            template: None,
            name: None,
            workspace: None,
            confirm: true,
            concurrency: None,
            dir: None,
            author: None,
            email: None,
        }
    }
}

/// Switches that change how an operation prompts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Override {
    /// Skip every question and fall back to defaults.
    pub use_default: bool,
    pub disable_confirm: bool,
}

/// Everything needed to construct an operation.
#[derive(Debug, Clone, Default)]
pub struct OpSettings {
    pub cli: CliSettings,
    pub overrides: Override,
    /// Working directory the project is discovered from. Defaults to `--dir` or the cwd.
    pub root: Option<PathBuf>,
    /// Directory holding `templates/` and `init/`. Defaults to the tool home.
    pub home: Option<PathBuf>,
    pub display: DisplayMode,
}
