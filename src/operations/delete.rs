// src/operations/delete.rs

use super::steps::{self, Choice};
use super::{Lifecycle, OperationBase, OperationError, ValidationError};
use crate::constants::UNLOCK_FILENAME;
use crate::core::batch::map_bounded;
use crate::core::package::{fields, get_pkg, package_path, set_pkg};
use crate::core::project::App;
use crate::core::task::{Status, Task, TaskApi};
use crate::core::task_builder::task;
use crate::core::task_manager::RenderSummary;
use crate::core::traversal::list_files;
use anyhow::{Context, Result, anyhow};
use std::cell::Cell;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

/// What the user asked to delete: an app name or an app path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteProxy {
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteValues {
    pub name: String,
    pub path: PathBuf,
    /// Every file under `path`, enumerated during verification.
    pub files: Vec<PathBuf>,
    pub root: PathBuf,
    /// Entry of the root workspace list that registers this app directly, if any.
    pub workspace_entry: Option<String>,
}

/// Removes an unlocked app from the workspace.
#[derive(Debug)]
pub struct DeleteOperation {
    pub(crate) base: OperationBase,
    proxy: DeleteProxy,
    values: Option<DeleteValues>,
}

impl DeleteOperation {
    pub fn new(base: OperationBase) -> Self {
        Self {
            base,
            proxy: DeleteProxy::default(),
            values: None,
        }
    }

    pub fn values(&self) -> Option<&DeleteValues> {
        self.values.as_ref()
    }

    fn pipeline(&self, values: DeleteValues) -> Task {
        let concurrency = self.base.cli.concurrency;

        task(format!("Deleting {}", values.name), move |api| async move {
            let (path, name) = (values.path.clone(), values.name.clone());
            api.task(format!("Checking {}", values.name), move |t| async move {
                check_app(&t, &path, &name)
            });

            let (path, files) = (values.path.clone(), values.files.clone());
            api.task("Deleting files", move |t| delete_files(t, path, files, concurrency));

            if let Some(entry) = values.workspace_entry.clone() {
                let root = values.root.clone();
                api.task("Updating workspaces", move |t| async move {
                    unregister_app(&t, &root, &entry)
                });
            }
            Ok(())
        })
    }
}

impl Lifecycle for DeleteOperation {
    type Proxy = DeleteProxy;

    fn prompt(&mut self, overrides: Option<DeleteProxy>) -> Result<(), OperationError> {
        let project = self.base.project()?;
        let apps = project.apps()?;
        let requested = overrides
            .and_then(|o| o.name)
            .or_else(|| self.base.cli.name.clone());
        if apps.is_empty() {
            return Err(match requested {
                Some(_) => ValidationError::AppNotFound,
                None => ValidationError::NoApps,
            }
            .into());
        }

        let choices = apps
            .iter()
            .map(|app| Choice::new(app.name.clone(), app.path.display().to_string()))
            .collect();
        let questions = steps::delete_steps(self.base.steps(), choices);
        let answers = self.base.ask(questions)?;

        let name = requested.or_else(|| answers.text("app").map(str::to_string));
        self.proxy = DeleteProxy { name };
        Ok(())
    }

    fn verify(&mut self, overrides: Option<DeleteProxy>) -> Result<(), OperationError> {
        self.values = None;
        let requested = overrides
            .and_then(|o| o.name)
            .or_else(|| self.proxy.name.clone())
            .or_else(|| self.base.cli.name.clone())
            .ok_or(ValidationError::AppNotFound)?;

        let project = self.base.project()?;
        let apps = project.apps()?;
        let (app, by_path) = find_app(&apps, &requested).ok_or(ValidationError::AppNotFound)?;
        let expected_name = if by_path { app.name.clone() } else { requested };

        if !app.path.is_dir() {
            return Err(ValidationError::AppNotFound.into());
        }
        if !app.path.join(UNLOCK_FILENAME).is_file() {
            return Err(ValidationError::AppLocked.into());
        }
        let declared = get_pkg(&app.path)?.and_then(|pkg| pkg.name);
        if declared.as_deref() != Some(expected_name.as_str()) {
            return Err(ValidationError::AppNotFound.into());
        }

        // Links are not followed while listing, so every file stays under the app directory.
        // The directory itself must resolve inside the project and not be its root.
        let app_dir = dunce::canonicalize(&app.path)?;
        let project_dir = dunce::canonicalize(&project.root)?;
        if app_dir == project_dir || !app_dir.starts_with(&project_dir) {
            return Err(ValidationError::OutsideTarget(app.path.display().to_string()).into());
        }
        let files = list_files(&app.path)?;

        let workspace_entry = project
            .direct_entries()
            .into_iter()
            .find(|entry| same_dir(&project.root.join(entry), &app.path));

        self.values = Some(DeleteValues {
            name: expected_name,
            path: app.path.clone(),
            files,
            root: project.root,
            workspace_entry,
        });
        Ok(())
    }

    async fn process(&mut self) -> Result<RenderSummary, OperationError> {
        let values = self.values.clone().ok_or(OperationError::NotVerified)?;
        let pipeline = self.pipeline(values);
        Ok(self.base.manager().render(vec![pipeline]).await)
    }
}

/// Finds an app by path first, then by name. The flag tells which one matched.
fn find_app<'a>(apps: &'a [App], requested: &str) -> Option<(&'a App, bool)> {
    let wanted = Path::new(requested);
    apps.iter()
        .find(|app| same_dir(&app.path, wanted))
        .map(|app| (app, true))
        .or_else(|| apps.iter().find(|app| app.name == requested).map(|app| (app, false)))
}

fn same_dir(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (dunce::canonicalize(a), dunce::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

fn check_app(t: &TaskApi, path: &Path, name: &str) -> Result<()> {
    t.set_status(Status::Loading);
    if !path.is_dir() || !package_path(path).is_file() {
        return Err(anyhow!("App does not exist"));
    }
    let declared = get_pkg(path)?.and_then(|pkg| pkg.name);
    if declared.as_deref() != Some(name) {
        return Err(anyhow!("App does not exist"));
    }
    t.set_status(Status::Success);
    Ok(())
}

async fn delete_files(
    t: TaskApi,
    path: PathBuf,
    files: Vec<PathBuf>,
    concurrency: Option<NonZeroUsize>,
) -> Result<()> {
    t.set_status(Status::Loading);
    let total = files.len();
    let done = Cell::new(0usize);

    map_bounded(files, concurrency, |file, _| {
        let t = &t;
        let done = &done;
        let path = &path;
        async move {
            let name = file.strip_prefix(path).unwrap_or(file.as_path()).display().to_string();
            t.set_message(format!("Deleting: {name}"));
            tokio::fs::remove_file(&file)
                .await
                .with_context(|| format!("Could not delete {name}"))?;
            log::trace!("{name} deleted");
            done.set(done.get() + 1);
            t.set_progress(done.get() as f64 / total as f64);
            Ok(())
        }
    })
    .await?;

    tokio::fs::remove_dir_all(&path)
        .await
        .with_context(|| format!("Could not remove '{}'", path.display()))?;
    t.set_message("Deleting files");
    t.set_status(Status::Success);
    Ok(())
}

/// Drops the direct entry of a root-scope app from the workspace list in effect.
fn unregister_app(t: &TaskApi, root: &Path, entry: &str) -> Result<()> {
    t.set_status(Status::Loading);
    let pkg = get_pkg(root)?.unwrap_or_default();

    if let Some(mut vx) = pkg.vx.filter(|vx| vx.workspaces.is_some()) {
        if let Some(list) = vx.workspaces.as_mut() {
            list.retain(|e| e != entry);
        }
        set_pkg(root, fields([("vx", serde_json::to_value(vx)?)]))?;
    } else if let Some(mut workspaces) = pkg.workspaces {
        if workspaces.remove(entry) {
            set_pkg(root, fields([("workspaces", serde_json::to_value(workspaces)?)]))?;
        }
    }
    t.set_status(Status::Success);
    Ok(())
}
