// src/operations/init.rs

use super::steps;
use super::{Lifecycle, OperationBase, OperationError, ValidationError, validate_name};
use crate::core::batch::map_bounded;
use crate::core::package::{fields, set_pkg};
use crate::core::paths::{PathError, init_dir};
use crate::core::task::{Status, Task, TaskApi};
use crate::core::task_builder::task;
use crate::core::task_manager::RenderSummary;
use crate::core::traversal::copy_plan;
use anyhow::{Context, Result};
use serde_json::{Value, json};
use std::cell::Cell;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InitProxy {
    pub name: Option<String>,
    /// Directory to initialize. Defaults to the working root.
    pub target: Option<PathBuf>,
    pub author: Option<String>,
    pub email: Option<String>,
}

impl InitProxy {
    fn or(self, other: Self) -> Self {
        Self {
            name: self.name.or(other.name),
            target: self.target.or(other.target),
            author: self.author.or(other.author),
            email: self.email.or(other.email),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitValues {
    pub name: String,
    pub target: PathBuf,
    /// `Name <email>`, or just the name when no email was given.
    pub author: Option<String>,
}

/// Fills an empty directory with the starter monorepo files.
#[derive(Debug)]
pub struct InitOperation {
    pub(crate) base: OperationBase,
    proxy: InitProxy,
    values: Option<InitValues>,
}

impl InitOperation {
    pub fn new(base: OperationBase) -> Self {
        Self {
            base,
            proxy: InitProxy::default(),
            values: None,
        }
    }

    pub fn values(&self) -> Option<&InitValues> {
        self.values.as_ref()
    }

    fn pipeline(&self, values: InitValues) -> Task {
        let source = init_dir(&self.base.home);
        let concurrency = self.base.cli.concurrency;

        task(format!("Initializing {}", values.name), move |api| async move {
            let target = values.target.clone();
            api.task("Copying files", move |t| copy_init_files(t, source, target, concurrency));
            api.task(format!("Setting up {}", values.name), move |t| async move {
                setup_project(&t, &values)
            });
            Ok(())
        })
    }
}

impl Lifecycle for InitOperation {
    type Proxy = InitProxy;

    fn prompt(&mut self, overrides: Option<InitProxy>) -> Result<(), OperationError> {
        let overrides = overrides.unwrap_or_default();
        let target = overrides.target.clone().unwrap_or_else(|| self.base.root.clone());
        let default_name = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let questions = steps::init_steps(
            self.base.steps(),
            target.display().to_string(),
            default_name.clone(),
        );
        let answers = self.base.ask(questions)?;

        let cli = &self.base.cli;
        let name = cli
            .name
            .clone()
            .or_else(|| answers.text("name").map(str::to_string))
            .unwrap_or(default_name);
        let resolved = InitProxy {
            name: Some(name),
            target: Some(target),
            author: cli.author.clone(),
            email: cli.email.clone(),
        };
        self.proxy = overrides.or(resolved);
        Ok(())
    }

    fn verify(&mut self, overrides: Option<InitProxy>) -> Result<(), OperationError> {
        self.values = None;
        let proxy = overrides.unwrap_or_default().or(self.proxy.clone());
        let target = proxy.target.unwrap_or_else(|| self.base.root.clone());

        if !target.is_dir() {
            return Err(PathError::InvalidPath.into());
        }
        if std::fs::read_dir(&target)?.next().is_some() {
            return Err(ValidationError::DirectoryNotEmpty.into());
        }
        let name = proxy.name.unwrap_or_default();
        validate_name(&name)?;

        let author = match (proxy.author, proxy.email) {
            (Some(author), Some(email)) => Some(format!("{author} <{email}>")),
            (Some(author), None) => Some(author),
            (None, Some(email)) => Some(format!("<{email}>")),
            (None, None) => None,
        };

        self.values = Some(InitValues { name, target, author });
        Ok(())
    }

    async fn process(&mut self) -> Result<RenderSummary, OperationError> {
        let values = self.values.clone().ok_or(OperationError::NotVerified)?;
        let pipeline = self.pipeline(values);
        Ok(self.base.manager().render(vec![pipeline]).await)
    }
}

async fn copy_init_files(
    t: TaskApi,
    source: PathBuf,
    target: PathBuf,
    concurrency: Option<NonZeroUsize>,
) -> Result<()> {
    t.set_status(Status::Loading);
    let files = copy_plan(&source, &target)?;
    let total = files.len();
    let done = Cell::new(0usize);

    map_bounded(files, concurrency, |file, _| {
        let t = &t;
        let done = &done;
        async move {
            t.set_message(format!("Copying: {}", file.name));
            if let Some(parent) = file.dest.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::copy(&file.src, &file.dest)
                .await
                .with_context(|| format!("Could not copy {}", file.name))?;
            done.set(done.get() + 1);
            t.set_progress(done.get() as f64 / total as f64);
            Ok(())
        }
    })
    .await?;

    t.set_message("Copying files");
    t.set_status(Status::Success);
    Ok(())
}

fn setup_project(t: &TaskApi, values: &InitValues) -> Result<()> {
    t.set_status(Status::Loading);
    let mut updates: Vec<(&str, Value)> = vec![("name", json!(values.name))];
    if let Some(author) = &values.author {
        updates.push(("author", json!(author)));
    }
    set_pkg(Path::new(&values.target), fields(updates))?;
    t.set_status(Status::Success);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::package::get_pkg;
    use crate::core::task_manager::DisplayMode;
    use crate::models::{CliSettings, OpSettings, Override};
    use std::fs;
    use tempfile::tempdir;

    fn operation(root: &Path, home: &Path, cli: CliSettings) -> InitOperation {
        let base = OperationBase::new(OpSettings {
            cli,
            overrides: Override {
                use_default: true,
                disable_confirm: true,
            },
            root: Some(root.to_path_buf()),
            home: Some(home.to_path_buf()),
            display: DisplayMode::Hidden,
        })
        .unwrap();
        InitOperation::new(base)
    }

    fn home() -> tempfile::TempDir {
        let home = tempdir().unwrap();
        let init = home.path().join("init");
        fs::create_dir_all(init.join("packages")).unwrap();
        fs::write(init.join("package.json"), r#"{"name":"starter","workspaces":["packages/*"]}"#).unwrap();
        fs::write(init.join("packages/.gitkeep"), "").unwrap();
        home
    }

    #[test]
    fn name_defaults_to_the_directory_name() {
        let home = home();
        let parent = tempdir().unwrap();
        let target = parent.path().join("my-project");
        fs::create_dir(&target).unwrap();

        let mut op = operation(&target, home.path(), CliSettings::default());
        op.prompt(None).unwrap();
        op.verify(None).unwrap();

        assert_eq!(op.values().unwrap().name, "my-project");
    }

    #[test]
    fn non_empty_directories_are_refused() {
        let home = home();
        let target = tempdir().unwrap();
        fs::write(target.path().join("README.md"), "").unwrap();

        let mut op = operation(
            target.path(),
            home.path(),
            CliSettings {
                name: Some("my-project".into()),
                ..Default::default()
            },
        );
        op.prompt(None).unwrap();

        assert_eq!(op.verify(None).unwrap_err().to_string(), "Current directory is not empty");
    }

    #[tokio::test]
    async fn process_copies_the_starter_and_writes_identity() {
        let home = home();
        let target = tempdir().unwrap();
        let mut op = operation(
            target.path(),
            home.path(),
            CliSettings {
                name: Some("acme".into()),
                author: Some("Jane".into()),
                email: Some("jane@example.com".into()),
                ..Default::default()
            },
        );
        op.prompt(None).unwrap();
        op.verify(None).unwrap();

        let summary = op.process().await.unwrap();

        assert!(!summary.failed(), "{:?}", summary.first_error());
        assert!(target.path().join("packages/.gitkeep").is_file());
        let pkg = get_pkg(target.path()).unwrap().unwrap();
        assert_eq!(pkg.name.as_deref(), Some("acme"));
        assert_eq!(pkg.extra.get("author"), Some(&json!("Jane <jane@example.com>")));
        assert_eq!(pkg.workspace_entries(), vec!["packages/*"]);
    }
}
