// src/operations/generate.rs

use super::steps::{self, Choice};
use super::{Lifecycle, OperationBase, OperationError, ValidationError, validate_name};
use crate::constants::ROOT_WORKSPACE;
use crate::core::batch::map_bounded;
use crate::core::package::{Workspaces, fields, get_pkg, set_pkg};
use crate::core::project::{Project, Template};
use crate::core::task::{Status, Task, TaskApi};
use crate::core::task_builder::task;
use crate::core::task_manager::RenderSummary;
use crate::core::traversal::{FileEntry, copy_plan};
use anyhow::{Context, Result};
use serde_json::{Value, json};
use std::cell::{Cell, RefCell};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// Parameters of a generate run before validation. Any field may be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerateProxy {
    /// Template name or path.
    pub template: Option<String>,
    pub name: Option<String>,
    pub workspace: Option<String>,
    pub destination: Option<PathBuf>,
    /// Project root.
    pub root: Option<PathBuf>,
    /// Whether the app goes directly under the project root.
    pub is_root: Option<bool>,
}

impl GenerateProxy {
    /// Fields of `self`, falling back to `other` where missing.
    fn or(self, other: Self) -> Self {
        Self {
            template: self.template.or(other.template),
            name: self.name.or(other.name),
            workspace: self.workspace.or(other.workspace),
            destination: self.destination.or(other.destination),
            root: self.root.or(other.root),
            is_root: self.is_root.or(other.is_root),
        }
    }
}

/// Validated parameters of a generate run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerateValues {
    pub template: PathBuf,
    pub name: String,
    pub workspace: String,
    pub destination: PathBuf,
    pub root: PathBuf,
    pub is_root: bool,
}

type FileLog = Rc<RefCell<Vec<FileEntry>>>;

/// Copies a template into a new app of the workspace.
#[derive(Debug)]
pub struct GenerateOperation {
    pub(crate) base: OperationBase,
    proxy: GenerateProxy,
    values: Option<GenerateValues>,
    files_copied: FileLog,
    files_rolled_back: FileLog,
}

impl GenerateOperation {
    pub fn new(base: OperationBase) -> Self {
        Self {
            base,
            proxy: GenerateProxy::default(),
            values: None,
            files_copied: Rc::default(),
            files_rolled_back: Rc::default(),
        }
    }

    pub fn proxy(&self) -> &GenerateProxy {
        &self.proxy
    }

    pub fn values(&self) -> Option<&GenerateValues> {
        self.values.as_ref()
    }

    /// Files copied by the last run, in the order they were copied.
    pub fn files_copied(&self) -> Vec<FileEntry> {
        self.files_copied.borrow().clone()
    }

    /// Files removed by the rollback of the last run.
    pub fn files_rolled_back(&self) -> Vec<FileEntry> {
        self.files_rolled_back.borrow().clone()
    }

    fn pipeline(&self, values: GenerateValues) -> Task {
        let copied = self.files_copied.clone();
        let rolled_back = self.files_rolled_back.clone();
        let concurrency = self.base.cli.concurrency;

        task("Generating files", move |api| async move {
            let rollback_log = copied.clone();
            let destination = values.destination.clone();
            api.task_fail(move |api, error| async move {
                log::debug!("Generation failed, rolling back: {error:#}");
                api.task_with("Rolling back files", Status::Loading, move |t| {
                    rollback_files(t, rollback_log, rolled_back, destination)
                });
                Ok(())
            });

            let template = values.template.clone();
            let destination = values.destination.clone();
            api.task("Copying", move |t| {
                copy_files(t, template, destination, copied, concurrency)
            });

            api.task(format!("Setting up {}", values.name), move |t| async move {
                setup_app(&t, &values)
            });
            Ok(())
        })
    }
}

impl Lifecycle for GenerateOperation {
    type Proxy = GenerateProxy;

    fn prompt(&mut self, overrides: Option<GenerateProxy>) -> Result<(), OperationError> {
        let overrides = overrides.unwrap_or_default();
        let project = Project::find(&self.base.root)?;
        let templates = self.base.templates(project.as_ref())?;
        let workspaces = project.as_ref().map(Project::workspaces).unwrap_or_default();

        let mut workspace_choices = workspaces.clone();
        workspace_choices.sort();
        if !workspace_choices.iter().any(|w| w == ROOT_WORKSPACE) {
            workspace_choices.push(ROOT_WORKSPACE.to_string());
        }
        let template_choices = templates
            .iter()
            .map(|t| Choice::new(t.name.clone(), t.path.display().to_string()))
            .collect();

        let questions = steps::generate_steps(self.base.steps(), template_choices, workspace_choices);
        let answers = self.base.ask(questions)?;

        let cli = &self.base.cli;
        let template = cli
            .template
            .clone()
            .or_else(|| answers.text("template").map(str::to_string))
            .or_else(|| templates.first().map(|t| t.path.display().to_string()));
        let workspace = cli
            .workspace
            .clone()
            .or_else(|| answers.text("workspace").map(str::to_string))
            .or_else(|| workspaces.first().cloned())
            .unwrap_or_else(|| ROOT_WORKSPACE.to_string());
        let name = cli
            .name
            .clone()
            .or_else(|| answers.text("name").map(str::to_string));

        let root = project.map(|p| p.root);
        let is_root = workspace == ROOT_WORKSPACE && !workspaces.iter().any(|w| w == ROOT_WORKSPACE);
        let destination = root
            .as_ref()
            .map(|root| destination_for(root, &workspace, is_root, name.as_deref().unwrap_or_default()));

        let resolved = GenerateProxy {
            template,
            name,
            workspace: Some(workspace),
            destination,
            root,
            is_root: Some(is_root),
        };
        self.proxy = overrides.or(resolved);
        log::debug!("Generate proxy: {:?}", self.proxy);
        Ok(())
    }

    fn verify(&mut self, overrides: Option<GenerateProxy>) -> Result<(), OperationError> {
        self.values = None;
        let overrides = overrides.unwrap_or_default();
        let explicit_destination = overrides.destination.clone();
        let explicit_is_root = overrides.is_root;
        let proxy = overrides.or(self.proxy.clone());

        let project = match &proxy.root {
            Some(root) => Project::find(root)?,
            None => None,
        };
        let templates = self.base.templates(project.as_ref())?;
        let template = proxy
            .template
            .as_deref()
            .and_then(|t| resolve_template(&templates, t))
            .ok_or(ValidationError::TemplateNotFound)?;

        let name = proxy.name.clone().unwrap_or_default();
        validate_name(&name)?;

        let Some(project) = project else {
            return Err(ValidationError::WorkspaceNotFound.into());
        };
        let workspaces = project.workspaces();
        let workspace = proxy.workspace.clone().unwrap_or_default();
        let is_root = explicit_is_root
            .unwrap_or(workspace == ROOT_WORKSPACE && !workspaces.contains(&workspace));
        if !is_root && !workspaces.contains(&workspace) {
            return Err(ValidationError::WorkspaceNotFound.into());
        }

        if project.apps()?.iter().any(|app| app.name == name) {
            return Err(ValidationError::AppExists(name).into());
        }

        let destination = explicit_destination
            .unwrap_or_else(|| destination_for(&project.root, &workspace, is_root, &name));
        if destination.exists() && std::fs::read_dir(&destination)?.next().is_some() {
            return Err(ValidationError::DestinationNotEmpty.into());
        }

        self.values = Some(GenerateValues {
            template,
            name,
            workspace,
            destination,
            root: project.root,
            is_root,
        });
        Ok(())
    }

    async fn process(&mut self) -> Result<RenderSummary, OperationError> {
        let values = self.values.clone().ok_or(OperationError::NotVerified)?;
        self.files_copied.borrow_mut().clear();
        self.files_rolled_back.borrow_mut().clear();

        let pipeline = self.pipeline(values);
        Ok(self.base.manager().render(vec![pipeline]).await)
    }
}

fn destination_for(root: &Path, workspace: &str, is_root: bool, name: &str) -> PathBuf {
    if is_root {
        root.join(name)
    } else {
        root.join(workspace).join(name)
    }
}

/// A template by name, by listed path, or any existing directory.
fn resolve_template(templates: &[Template], wanted: &str) -> Option<PathBuf> {
    templates
        .iter()
        .find(|t| t.name == wanted || t.path == Path::new(wanted))
        .map(|t| t.path.clone())
        .or_else(|| {
            let path = PathBuf::from(wanted);
            path.is_dir().then_some(path)
        })
}

async fn copy_files(
    t: TaskApi,
    template: PathBuf,
    destination: PathBuf,
    copied: FileLog,
    concurrency: Option<NonZeroUsize>,
) -> Result<()> {
    t.set_status(Status::Loading);
    let files = copy_plan(&template, &destination)?;
    let total = files.len();
    let done = Cell::new(0usize);

    map_bounded(files, concurrency, |file, _| {
        let t = &t;
        let copied = &copied;
        let done = &done;
        async move {
            t.set_message(format!("Copying: {}", file.name));
            copy_file(&file).await?;
            log::trace!("Copied '{}'", file.dest.display());
            copied.borrow_mut().push(file);
            done.set(done.get() + 1);
            t.set_progress(done.get() as f64 / total as f64);
            Ok(())
        }
    })
    .await?;

    t.set_status(Status::Success);
    Ok(())
}

async fn copy_file(file: &FileEntry) -> Result<()> {
    if let Some(parent) = file.dest.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Could not create '{}'", parent.display()))?;
    }
    tokio::fs::copy(&file.src, &file.dest)
        .await
        .with_context(|| format!("Could not copy {}", file.name))?;
    Ok(())
}

async fn rollback_files(t: TaskApi, copied: FileLog, rolled_back: FileLog, destination: PathBuf) -> Result<()> {
    t.set_status(Status::Loading);
    let files = copied.borrow().clone();
    let total = files.len();

    for (index, file) in files.into_iter().enumerate() {
        t.set_message(format!("Rolling Back: {}", file.name));
        t.set_progress((index + 1) as f64 / total as f64);
        if tokio::fs::try_exists(&file.dest).await.unwrap_or(false) {
            tokio::fs::remove_file(&file.dest)
                .await
                .with_context(|| format!("Could not remove {}", file.name))?;
            log::trace!("Rolled back '{}'", file.dest.display());
            rolled_back.borrow_mut().push(file);
        }
    }

    if tokio::fs::try_exists(&destination).await.unwrap_or(false) {
        tokio::fs::remove_dir_all(&destination)
            .await
            .with_context(|| format!("Could not remove '{}'", destination.display()))?;
    }
    t.set_message("Rolling back files");
    t.set_status(Status::Success);
    Ok(())
}

fn setup_app(t: &TaskApi, values: &GenerateValues) -> Result<()> {
    t.set_status(Status::Loading);
    set_pkg(&values.destination, fields([("name", json!(values.name))]))?;
    // Registered last: a rollback removes the app but never touches the root descriptor.
    if values.is_root {
        append_to_workspace(&values.root, &values.name)?;
    }
    t.set_status(Status::Success);
    Ok(())
}

/// Registers `name` in the workspace list of the root descriptor.
///
/// `vx.workspaces` is used when present, otherwise `workspaces` (created if missing).
fn append_to_workspace(root: &Path, name: &str) -> Result<()> {
    let pkg = get_pkg(root)?.unwrap_or_default();

    if let Some(mut vx) = pkg.vx.filter(|vx| vx.workspaces.is_some()) {
        vx.workspaces.get_or_insert_with(Vec::new).push(name.to_string());
        set_pkg(root, fields([("vx", serde_json::to_value(vx)?)]))?;
        return Ok(());
    }

    let mut workspaces = pkg.workspaces.unwrap_or(Workspaces::List(Vec::new()));
    workspaces.push(name);
    let value: Value = serde_json::to_value(workspaces)?;
    set_pkg(root, fields([("workspaces", value)]))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::project::ProjectError;
    use crate::core::task_manager::DisplayMode;
    use crate::models::{CliSettings, OpSettings, Override};
    use std::fs;
    use tempfile::{TempDir, tempdir};

    struct Fixture {
        home: TempDir,
        project: TempDir,
    }

    impl Fixture {
        fn new(root_pkg: &str) -> Self {
            let home = tempdir().unwrap();
            let template = home.path().join("templates/basic");
            fs::create_dir_all(template.join("src")).unwrap();
            fs::write(template.join("package.json"), r#"{"name":"template","private":true}"#).unwrap();
            fs::write(template.join("a.txt"), "a").unwrap();
            fs::write(template.join("b.txt"), "b").unwrap();
            fs::write(template.join("c.txt"), "c").unwrap();

            let project = tempdir().unwrap();
            fs::write(project.path().join("package.json"), root_pkg).unwrap();
            fs::create_dir_all(project.path().join("packages")).unwrap();
            Self { home, project }
        }

        fn operation(&self, cli: CliSettings) -> GenerateOperation {
            let base = OperationBase::new(OpSettings {
                cli,
                overrides: Override {
                    use_default: true,
                    disable_confirm: true,
                },
                root: Some(self.project.path().to_path_buf()),
                home: Some(self.home.path().to_path_buf()),
                display: DisplayMode::Hidden,
            })
            .unwrap();
            GenerateOperation::new(base)
        }
    }

    fn cli(name: &str, workspace: &str) -> CliSettings {
        CliSettings {
            template: Some("basic".into()),
            name: Some(name.into()),
            workspace: Some(workspace.into()),
            ..Default::default()
        }
    }

    fn verify_error(op: &mut GenerateOperation) -> String {
        op.prompt(None).unwrap();
        op.verify(None).unwrap_err().to_string()
    }

    #[test]
    fn prompt_resolves_destination_inside_the_workspace() {
        let fx = Fixture::new(r#"{"workspaces":["packages/*"]}"#);
        let mut op = fx.operation(cli("my-app", "packages"));

        op.prompt(None).unwrap();

        let proxy = op.proxy();
        assert_eq!(proxy.is_root, Some(false));
        assert_eq!(
            proxy.destination.as_deref(),
            Some(fx.project.path().join("packages/my-app").as_path())
        );
        assert!(op.values().is_none());
    }

    #[test]
    fn verify_reports_checks_in_order() {
        let fx = Fixture::new(r#"{"workspaces":["packages/*"]}"#);

        let mut op = fx.operation(CliSettings {
            template: Some("missing".into()),
            ..cli("Bad Name", "nope")
        });
        assert_eq!(verify_error(&mut op), "Template does not exist");

        let mut op = fx.operation(cli("Bad Name", "nope"));
        assert_eq!(
            verify_error(&mut op),
            "Name must be lowercase, no spaces, no special characters, and at least 3 characters long"
        );

        let mut op = fx.operation(cli("my-app", "nope"));
        assert_eq!(verify_error(&mut op), "Workspace does not exist");
    }

    #[test]
    fn a_broken_root_descriptor_is_reported() {
        let fx = Fixture::new("{ nope");
        let mut op = fx.operation(cli("my-app", "packages"));

        let err = op.prompt(None).unwrap_err();

        assert!(matches!(err, OperationError::Project(ProjectError::Package(_))));
        assert!(err.to_string().starts_with("Could not parse"));
    }

    #[test]
    fn verify_rejects_existing_apps_and_busy_destinations() {
        let fx = Fixture::new(r#"{"workspaces":["packages/*"]}"#);
        let existing = fx.project.path().join("packages/taken");
        fs::create_dir_all(&existing).unwrap();
        fs::write(existing.join("package.json"), r#"{"name":"taken"}"#).unwrap();
        let busy = fx.project.path().join("packages/busy");
        fs::create_dir_all(&busy).unwrap();
        fs::write(busy.join("notes.md"), "").unwrap();

        let mut op = fx.operation(cli("taken", "packages"));
        assert_eq!(verify_error(&mut op), "App taken already exists");

        let mut op = fx.operation(cli("busy", "packages"));
        assert_eq!(verify_error(&mut op), "Destination directory has files in it");
    }

    #[test]
    fn verify_overrides_take_precedence() {
        let fx = Fixture::new(r#"{"workspaces":["packages/*"]}"#);
        let mut op = fx.operation(cli("Bad Name", "packages"));
        op.prompt(None).unwrap();

        op.verify(Some(GenerateProxy {
            name: Some("good-name".into()),
            destination: None,
            ..Default::default()
        }))
        .unwrap();

        let values = op.values().unwrap();
        assert_eq!(values.name, "good-name");
        assert_eq!(values.destination, fx.project.path().join("packages/good-name"));
    }

    #[tokio::test]
    async fn process_copies_the_template_and_names_the_package() {
        let fx = Fixture::new(r#"{"workspaces":["packages/*"]}"#);
        let mut op = fx.operation(cli("my-app", "packages"));
        op.prompt(None).unwrap();
        op.verify(None).unwrap();

        let summary = op.process().await.unwrap();

        assert!(!summary.failed(), "{:?}", summary.first_error());
        let dest = fx.project.path().join("packages/my-app");
        assert_eq!(fs::read_to_string(dest.join("a.txt")).unwrap(), "a");
        let pkg = get_pkg(&dest).unwrap().unwrap();
        assert_eq!(pkg.name.as_deref(), Some("my-app"));
        assert_eq!(pkg.extra.get("private"), Some(&json!(true)));
        assert_eq!(op.files_copied().len(), 4);
    }

    #[tokio::test]
    async fn root_scope_apps_are_registered_in_vx_workspaces() {
        let fx = Fixture::new(r#"{"workspaces":["packages/*"],"vx":{"workspaces":["packages/*"]}}"#);
        let mut op = fx.operation(cli("root-app", "root"));
        op.prompt(None).unwrap();
        op.verify(None).unwrap();

        let summary = op.process().await.unwrap();

        assert!(!summary.failed());
        let pkg = get_pkg(fx.project.path()).unwrap().unwrap();
        assert_eq!(pkg.vx.unwrap().workspaces.unwrap(), vec!["packages/*", "root-app"]);
        assert_eq!(pkg.workspaces, Some(Workspaces::List(vec!["packages/*".into()])));
        assert!(fx.project.path().join("root-app/package.json").is_file());
    }

    #[tokio::test]
    async fn failed_copy_rolls_back_everything() {
        let fx = Fixture::new(r#"{"workspaces":["packages/*"]}"#);
        let mut op = fx.operation(CliSettings {
            concurrency: NonZeroUsize::new(1),
            ..cli("my-app", "packages")
        });
        op.prompt(None).unwrap();
        op.verify(None).unwrap();

        // A directory where a file should go makes the copy fail midway.
        let dest = fx.project.path().join("packages/my-app");
        fs::create_dir_all(dest.join("c.txt")).unwrap();

        let summary = op.process().await.unwrap();

        assert!(summary.failed());
        assert_eq!(summary.first_error(), Some("Could not copy c.txt"));
        assert!(!dest.exists());

        let copied: Vec<_> = op.files_copied().into_iter().map(|f| f.name).collect();
        let mut rolled_back: Vec<_> = op.files_rolled_back().into_iter().map(|f| f.name).collect();
        assert!(!copied.contains(&"c.txt".to_string()));
        rolled_back.sort();
        let mut expected = copied.clone();
        expected.sort();
        assert_eq!(rolled_back, expected);

        let setup = summary.find("Setting up my-app").unwrap();
        assert!(setup.skipped);
        let rollback = summary.find("Rolling back files").unwrap();
        assert!(rollback.completed && rollback.error.is_none());
    }

    #[tokio::test]
    async fn failed_setup_rolls_back_and_leaves_the_root_untouched() {
        let root_pkg = r#"{"workspaces":["packages/*"]}"#;
        let fx = Fixture::new(root_pkg);
        fs::write(fx.home.path().join("templates/basic/package.json"), "{ not json").unwrap();
        let mut op = fx.operation(cli("my-app", "root"));
        op.prompt(None).unwrap();
        op.verify(None).unwrap();

        let summary = op.process().await.unwrap();

        assert!(summary.failed());
        let setup = summary.find("Setting up my-app").unwrap();
        assert!(setup.error.as_deref().is_some_and(|e| e.starts_with("Could not parse")));
        let rollback = summary.find("Rolling back files").unwrap();
        assert!(rollback.completed && rollback.error.is_none());
        assert_eq!(rollback.status, Status::Success);

        assert!(!fx.project.path().join("my-app").exists());
        assert_eq!(op.files_rolled_back().len(), 4);
        let root = fs::read_to_string(fx.project.path().join("package.json")).unwrap();
        assert_eq!(root, root_pkg);
    }
}
