// src/operations/mod.rs

//! The prompt, verify, process lifecycle shared by every command.
//!
//! An operation first resolves its parameters (`prompt`), then validates them
//! without modifying the filesystem (`verify`), and only then builds and runs its
//! task pipeline (`process`). `process` refuses to run unless `verify` succeeded.

pub mod delete;
pub mod generate;
pub mod init;
pub mod steps;

use crate::core::package::PackageError;
use crate::core::paths::{PathError, get_vx_home, set_root};
use crate::core::project::{Project, ProjectError, Template, get_template_list};
use crate::core::task_manager::{DisplayMode, RenderSummary, TaskManager};
use crate::core::traversal::TraversalError;
use crate::models::{CliSettings, Command, OpSettings, Override};
use delete::DeleteOperation;
use generate::GenerateOperation;
use init::InitOperation;
use lazy_static::lazy_static;
use regex::Regex;
use std::path::PathBuf;
use steps::{Answers, DialoguerPrompter, Prompter, Question, StepContext};
use thiserror::Error;

lazy_static! {
    static ref NAME_RE: Result<Regex, regex::Error> = Regex::new(r"^[a-z_-]+$");
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Template does not exist")]
    TemplateNotFound,
    #[error("Name must be lowercase, no spaces, no special characters, and at least 3 characters long")]
    InvalidName,
    #[error("Workspace does not exist")]
    WorkspaceNotFound,
    #[error("App {0} already exists")]
    AppExists(String),
    #[error("Destination directory has files in it")]
    DestinationNotEmpty,
    #[error("App does not exist")]
    AppNotFound,
    #[error("App is locked")]
    AppLocked,
    #[error("No apps found")]
    NoApps,
    #[error("Current directory is not empty")]
    DirectoryNotEmpty,
    #[error("'{0}' is outside the project")]
    OutsideTarget(String),
}

#[derive(Error, Debug)]
pub enum OperationError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("Aborted")]
    Cancelled,
    #[error("The operation must be verified before it is processed")]
    NotVerified,
    #[error("Prompt failed: {0}")]
    Prompt(#[source] dialoguer::Error),
    #[error(transparent)]
    Project(#[from] ProjectError),
    #[error(transparent)]
    Package(#[from] PackageError),
    #[error(transparent)]
    Path(#[from] PathError),
    #[error(transparent)]
    Traversal(#[from] TraversalError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Package names: lowercase letters, `-` and `_`, at least 3 characters.
pub fn validate_name(name: &str) -> Result<(), ValidationError> {
    let well_formed = match &*NAME_RE {
        Ok(re) => re.is_match(name),
        Err(_) => false,
    };
    if well_formed && name.chars().count() > 2 {
        Ok(())
    } else {
        Err(ValidationError::InvalidName)
    }
}

/// The three phases every command goes through.
///
/// `overrides` values take precedence over flags and answers.
#[allow(async_fn_in_trait)]
pub trait Lifecycle {
    type Proxy: Default;

    fn prompt(&mut self, overrides: Option<Self::Proxy>) -> Result<(), OperationError>;

    fn verify(&mut self, overrides: Option<Self::Proxy>) -> Result<(), OperationError>;

    /// Runs the side effects. Pipeline failures are reported in the summary, not as errors.
    async fn process(&mut self) -> Result<RenderSummary, OperationError>;
}

/// State and helpers shared by every operation.
#[derive(Debug)]
pub struct OperationBase {
    pub cli: CliSettings,
    pub overrides: Override,
    /// Directory the project is discovered from.
    pub root: PathBuf,
    pub home: PathBuf,
    pub display: DisplayMode,
    prompter: Box<dyn Prompter>,
}

impl OperationBase {
    pub fn new(settings: OpSettings) -> Result<Self, OperationError> {
        let OpSettings {
            cli,
            mut overrides,
            root,
            home,
            display,
        } = settings;

        let root = match root {
            Some(root) => root,
            None => set_root(cli.dir.as_deref())?,
        };
        overrides.disable_confirm = overrides.disable_confirm || !cli.confirm;

        Ok(Self {
            cli,
            overrides,
            root,
            home: home.unwrap_or_else(get_vx_home),
            display,
            prompter: Box::new(DialoguerPrompter),
        })
    }

    pub fn project(&self) -> Result<Project, ProjectError> {
        Project::discover(&self.root)
    }

    /// Templates available to `project` (built-in ones only without a project).
    pub fn templates(&self, project: Option<&Project>) -> Result<Vec<Template>, ProjectError> {
        get_template_list(&self.home, project)
    }

    pub fn steps(&self) -> StepContext<'_> {
        StepContext {
            cli: &self.cli,
            use_default: self.overrides.use_default,
            disable_confirm: self.overrides.disable_confirm,
        }
    }

    pub fn ask(&mut self, questions: Vec<Question>) -> Result<Answers, OperationError> {
        steps::ask(self.prompter.as_mut(), questions)
    }

    pub fn manager(&self) -> TaskManager {
        TaskManager::new(self.display)
    }
}

/// A command ready to go through its lifecycle.
#[derive(Debug)]
pub enum Operation {
    Generate(GenerateOperation),
    Delete(DeleteOperation),
    Init(InitOperation),
}

impl Operation {
    pub fn new(command: Command, settings: OpSettings) -> Result<Self, OperationError> {
        let base = OperationBase::new(settings)?;
        Ok(match command {
            Command::Generate => Self::Generate(GenerateOperation::new(base)),
            Command::Delete => Self::Delete(DeleteOperation::new(base)),
            Command::Init => Self::Init(InitOperation::new(base)),
        })
    }

    pub fn generate(settings: OpSettings) -> Result<Self, OperationError> {
        Self::new(Command::Generate, settings)
    }

    pub fn delete(settings: OpSettings) -> Result<Self, OperationError> {
        Self::new(Command::Delete, settings)
    }

    pub fn init(settings: OpSettings) -> Result<Self, OperationError> {
        Self::new(Command::Init, settings)
    }

    pub fn command(&self) -> Command {
        match self {
            Self::Generate(_) => Command::Generate,
            Self::Delete(_) => Command::Delete,
            Self::Init(_) => Command::Init,
        }
    }

    /// Replaces the terminal prompts, e.g. with a scripted prompter.
    pub fn with_prompter(mut self, prompter: Box<dyn Prompter>) -> Self {
        self.base_mut().prompter = prompter;
        self
    }

    pub fn base(&self) -> &OperationBase {
        match self {
            Self::Generate(op) => &op.base,
            Self::Delete(op) => &op.base,
            Self::Init(op) => &op.base,
        }
    }

    fn base_mut(&mut self) -> &mut OperationBase {
        match self {
            Self::Generate(op) => &mut op.base,
            Self::Delete(op) => &mut op.base,
            Self::Init(op) => &mut op.base,
        }
    }

    pub fn prompt(&mut self) -> Result<(), OperationError> {
        log::debug!("Prompting for '{}'", self.command());
        match self {
            Self::Generate(op) => op.prompt(None),
            Self::Delete(op) => op.prompt(None),
            Self::Init(op) => op.prompt(None),
        }
    }

    pub fn verify(&mut self) -> Result<(), OperationError> {
        log::debug!("Verifying '{}'", self.command());
        match self {
            Self::Generate(op) => op.verify(None),
            Self::Delete(op) => op.verify(None),
            Self::Init(op) => op.verify(None),
        }
    }

    pub async fn process(&mut self) -> Result<RenderSummary, OperationError> {
        log::debug!("Processing '{}'", self.command());
        match self {
            Self::Generate(op) => op.process().await,
            Self::Delete(op) => op.process().await,
            Self::Init(op) => op.process().await,
        }
    }

    /// Prompt, verify and process in order, stopping at the first error.
    pub async fn run(&mut self) -> Result<RenderSummary, OperationError> {
        self.prompt()?;
        self.verify()?;
        self.process().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_rules() {
        for bad in ["My-App", "ab", "app 1", "app1", "", "é-app"] {
            assert_eq!(validate_name(bad), Err(ValidationError::InvalidName), "{bad:?}");
        }
        for good in ["my-app", "valid-name", "abc", "snake_case"] {
            assert!(validate_name(good).is_ok(), "{good:?}");
        }
    }

    #[test]
    fn confirm_flag_disables_confirmation() {
        let dir = tempfile::tempdir().unwrap();
        let settings = OpSettings {
            cli: CliSettings {
                confirm: false,
                ..Default::default()
            },
            root: Some(dir.path().to_path_buf()),
            ..Default::default()
        };

        let base = OperationBase::new(settings).unwrap();

        assert!(base.overrides.disable_confirm);
        assert!(!base.overrides.use_default);
    }

    #[tokio::test]
    async fn process_requires_verify() {
        let dir = tempfile::tempdir().unwrap();
        for command in Command::ALL {
            let settings = OpSettings {
                root: Some(dir.path().to_path_buf()),
                display: DisplayMode::Hidden,
                ..Default::default()
            };
            let mut op = Operation::new(command, settings).unwrap();
            assert!(matches!(op.process().await, Err(OperationError::NotVerified)));
        }
    }
}
