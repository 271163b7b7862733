// src/core/project.rs

//! Discovery of the workspace root, its workspaces, apps and templates.

use crate::constants::IGNORED_DIRS;
use crate::core::package::{PackageError, PackageJson, get_pkg, package_path};
use crate::core::paths::templates_dir;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProjectError {
    #[error("Could not find project root")]
    RootNotFound,
    #[error("Could not list '{path}': {source}")]
    List {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Package(#[from] PackageError),
}

/// An app package found inside the project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct App {
    /// The descriptor's `name`, or the directory name when it has none.
    pub name: String,
    pub path: PathBuf,
}

/// A template directory that can be copied by `vx generate`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    pub name: String,
    pub path: PathBuf,
}

/// A workspace root and its parsed descriptor.
#[derive(Debug, Clone)]
pub struct Project {
    pub root: PathBuf,
    pub pkg: PackageJson,
}

impl Project {
    /// Walks upward from `start` to the first directory whose descriptor declares workspaces.
    pub fn discover(start: &Path) -> Result<Self, ProjectError> {
        let mut current = Some(start);
        while let Some(dir) = current {
            if let Some(pkg) = get_pkg(dir)? {
                if pkg.declares_workspaces() {
                    log::debug!("Project root found at '{}'", dir.display());
                    return Ok(Self {
                        root: dir.to_path_buf(),
                        pkg,
                    });
                }
            }
            current = dir.parent();
        }
        Err(ProjectError::RootNotFound)
    }

    /// Like [`Project::discover`], but a missing root is `Ok(None)`. Unreadable descriptors still fail.
    pub fn find(start: &Path) -> Result<Option<Self>, ProjectError> {
        match Self::discover(start) {
            Ok(project) => Ok(Some(project)),
            Err(ProjectError::RootNotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Workspace directories, from entries of the form `a/b/*` (`/*` stripped).
    pub fn workspaces(&self) -> Vec<String> {
        self.pkg
            .workspace_entries()
            .iter()
            .filter_map(|entry| entry.strip_suffix("/*"))
            .filter(|ws| !ws.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Entries that point at a single app rather than a workspace directory.
    pub fn direct_entries(&self) -> Vec<String> {
        self.pkg
            .workspace_entries()
            .into_iter()
            .filter(|entry| !entry.contains('*'))
            .collect()
    }

    /// Every app of every workspace plus the directly registered ones, sorted by name.
    pub fn apps(&self) -> Result<Vec<App>, ProjectError> {
        let mut apps = Vec::new();
        for workspace in self.workspaces() {
            let dir = self.root.join(&workspace);
            if !dir.is_dir() {
                continue;
            }
            for child in list_dirs(&dir)? {
                if let Some(app) = read_app(&child)? {
                    apps.push(app);
                }
            }
        }
        for entry in self.direct_entries() {
            let dir = self.root.join(&entry);
            if dir.is_dir() {
                if let Some(app) = read_app(&dir)? {
                    apps.push(app);
                }
            }
        }
        apps.sort_by(|a, b| a.name.cmp(&b.name));
        apps.dedup_by(|a, b| a.path == b.path);
        Ok(apps)
    }
}

/// Built-in templates of the tool home plus `vx.templatesPaths` of the project, sorted by name.
pub fn get_template_list(home: &Path, project: Option<&Project>) -> Result<Vec<Template>, ProjectError> {
    let mut sources = vec![templates_dir(home)];
    if let Some(project) = project {
        sources.extend(project.pkg.templates_paths().iter().map(|p| project.root.join(p)));
    }

    let mut templates = Vec::new();
    for source in sources {
        if !source.is_dir() {
            log::debug!("Skipping missing template source '{}'", source.display());
            continue;
        }
        for path in list_dirs(&source)? {
            let name = dir_name(&path);
            templates.push(Template { name, path });
        }
    }
    templates.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(templates)
}

fn read_app(dir: &Path) -> Result<Option<App>, ProjectError> {
    if !package_path(dir).is_file() {
        return Ok(None);
    }
    let pkg = get_pkg(dir)?;
    let name = pkg.and_then(|p| p.name).unwrap_or_else(|| dir_name(dir));
    Ok(Some(App {
        name,
        path: dir.to_path_buf(),
    }))
}

fn list_dirs(dir: &Path) -> Result<Vec<PathBuf>, ProjectError> {
    let entries = fs::read_dir(dir).map_err(|source| ProjectError::List {
        path: dir.display().to_string(),
        source,
    })?;
    let mut dirs: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .filter(|path| !IGNORED_DIRS.contains(&dir_name(path).as_str()))
        .collect();
    dirs.sort();
    Ok(dirs)
}

fn dir_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn discovers_root_from_nested_directory() {
        let dir = tempdir().unwrap();
        write(&dir.path().join("package.json"), r#"{"workspaces":["packages/*"]}"#);
        write(&dir.path().join("packages/a/package.json"), r#"{"name":"a"}"#);

        let project = Project::discover(&dir.path().join("packages/a")).unwrap();

        assert_eq!(project.root, dir.path());
    }

    #[test]
    fn missing_root_is_reported() {
        let dir = tempdir().unwrap();
        write(&dir.path().join("package.json"), r#"{"name":"plain"}"#);
        let err = Project::discover(dir.path()).unwrap_err();
        assert_eq!(err.to_string(), "Could not find project root");
    }

    #[test]
    fn find_tells_a_missing_root_from_a_broken_one() {
        let dir = tempdir().unwrap();
        let plain = dir.path().join("plain");
        write(&plain.join("package.json"), r#"{"name":"plain"}"#);
        let broken = dir.path().join("broken");
        write(&broken.join("package.json"), "{ nope");

        assert!(Project::find(&plain).unwrap().is_none());
        assert!(matches!(
            Project::find(&broken),
            Err(ProjectError::Package(PackageError::Parse { .. }))
        ));
    }

    #[test]
    fn apps_come_from_workspaces_and_direct_entries() {
        let dir = tempdir().unwrap();
        write(
            &dir.path().join("package.json"),
            r#"{"workspaces":["packages/*","tools/cli/*","standalone"]}"#,
        );
        write(&dir.path().join("packages/web/package.json"), r#"{"name":"web-app"}"#);
        write(&dir.path().join("packages/unnamed/package.json"), "{}");
        write(&dir.path().join("packages/no-pkg/readme.md"), "");
        write(&dir.path().join("standalone/package.json"), r#"{"name":"standalone"}"#);

        let project = Project::discover(dir.path()).unwrap();
        let names: Vec<_> = project.apps().unwrap().into_iter().map(|a| a.name).collect();

        assert_eq!(project.workspaces(), vec!["packages", "tools/cli"]);
        assert_eq!(project.direct_entries(), vec!["standalone"]);
        assert_eq!(names, vec!["standalone", "unnamed", "web-app"]);
    }

    #[test]
    fn templates_include_project_sources() {
        let home = tempdir().unwrap();
        let dir = tempdir().unwrap();
        fs::create_dir_all(home.path().join("templates/with-node")).unwrap();
        fs::create_dir_all(dir.path().join("tpl/custom")).unwrap();
        write(
            &dir.path().join("package.json"),
            r#"{"workspaces":["packages/*"],"vx":{"templatesPaths":["tpl"]}}"#,
        );

        let project = Project::discover(dir.path()).unwrap();
        let templates = get_template_list(home.path(), Some(&project)).unwrap();

        let names: Vec<_> = templates.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["custom", "with-node"]);
        assert_eq!(templates[0].path, dir.path().join("tpl/custom"));
    }
}
