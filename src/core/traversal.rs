// src/core/traversal.rs

//! File enumeration for template copies and app removal.

use crate::constants::{IGNORE_FILENAME, MATCH_FILENAME};
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use ignore::overrides::{Override, OverrideBuilder};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum TraversalError {
    #[error("Could not walk '{path}': {source}")]
    Walk {
        path: String,
        #[source]
        source: walkdir::Error,
    },
    #[error("Invalid pattern in '{path}': {source}")]
    Pattern {
        path: String,
        #[source]
        source: ignore::Error,
    },
    #[error("Could not read '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// One file to copy: its path relative to the source root, and both absolute ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub name: String,
    pub src: PathBuf,
    pub dest: PathBuf,
}

/// Selects which files of a template are copied.
#[derive(Debug, Clone)]
pub enum Matcher {
    /// Globs from `.vxmatch`; `!` negates. With no positive glob, everything not negated matches.
    Globs(Override),
    /// Gitignore rules from `.vxignore`.
    Ignore(Gitignore),
    All,
}

impl Matcher {
    /// Reads the control file shipped in `dir`. `.vxmatch` wins over `.vxignore`.
    pub fn load(dir: &Path) -> Result<Self, TraversalError> {
        let match_file = dir.join(MATCH_FILENAME);
        if match_file.is_file() {
            let content = fs::read_to_string(&match_file).map_err(|source| TraversalError::Read {
                path: match_file.display().to_string(),
                source,
            })?;
            let pattern_error = |source| TraversalError::Pattern {
                path: match_file.display().to_string(),
                source,
            };

            let mut builder = OverrideBuilder::new(dir);
            for line in content.lines().map(str::trim) {
                if line.is_empty() || line.starts_with('#') {
                    continue;
                }
                builder.add(line).map_err(pattern_error)?;
            }
            return builder.build().map(Self::Globs).map_err(pattern_error);
        }

        let ignore_file = dir.join(IGNORE_FILENAME);
        if ignore_file.is_file() {
            let mut builder = GitignoreBuilder::new(dir);
            if let Some(source) = builder.add(&ignore_file) {
                return Err(TraversalError::Pattern {
                    path: ignore_file.display().to_string(),
                    source,
                });
            }
            return builder
                .build()
                .map(Self::Ignore)
                .map_err(|source| TraversalError::Pattern {
                    path: ignore_file.display().to_string(),
                    source,
                });
        }

        Ok(Self::All)
    }

    /// Whether the file at `relative` (relative to the matcher root) is selected.
    pub fn is_match(&self, relative: &Path) -> bool {
        match self {
            Self::Globs(globs) => {
                let matched = globs.matched(relative, false);
                if matched.is_whitelist() {
                    true
                } else if matched.is_ignore() {
                    false
                } else {
                    globs.num_whitelists() == 0
                }
            }
            Self::Ignore(rules) => !rules.matched_path_or_any_parents(relative, false).is_ignore(),
            Self::All => true,
        }
    }
}

/// Relative paths of every file under `root` selected by `matcher`, sorted.
///
/// The `.vxmatch`/`.vxignore` control files at the top level are never returned.
pub fn directory_traversal(root: &Path, matcher: &Matcher) -> Result<Vec<PathBuf>, TraversalError> {
    let mut selected = Vec::new();
    for relative in walk_files(root)? {
        let is_control = relative == Path::new(MATCH_FILENAME) || relative == Path::new(IGNORE_FILENAME);
        if !is_control && matcher.is_match(&relative) {
            selected.push(relative);
        }
    }
    log::debug!("{} file(s) selected under '{}'", selected.len(), root.display());
    Ok(selected)
}

/// Files of the template at `source`, paired with their target under `destination`.
pub fn copy_plan(source: &Path, destination: &Path) -> Result<Vec<FileEntry>, TraversalError> {
    let matcher = Matcher::load(source)?;
    let files = directory_traversal(source, &matcher)?;
    Ok(files
        .into_iter()
        .map(|relative| FileEntry {
            name: display_name(&relative),
            src: source.join(&relative),
            dest: destination.join(&relative),
        })
        .collect())
}

/// Absolute paths of every file under `root`, hidden files included, sorted.
pub fn list_files(root: &Path) -> Result<Vec<PathBuf>, TraversalError> {
    Ok(walk_files(root)?
        .into_iter()
        .map(|relative| root.join(relative))
        .collect())
}

fn walk_files(root: &Path) -> Result<Vec<PathBuf>, TraversalError> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|source| TraversalError::Walk {
            path: root.display().to_string(),
            source,
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        if let Ok(relative) = entry.path().strip_prefix(root) {
            files.push(relative.to_path_buf());
        }
    }
    Ok(files)
}

/// Relative path with `/` separators on every platform.
pub fn display_name(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn touch(root: &Path, relative: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, relative).unwrap();
    }

    fn names(files: &[PathBuf]) -> Vec<String> {
        files.iter().map(|p| display_name(p)).collect()
    }

    #[test]
    fn match_file_selects_and_negates() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "package.json");
        touch(dir.path(), "src/index.js");
        touch(dir.path(), "src/index.test.js");
        touch(dir.path(), "notes.txt");
        fs::write(
            dir.path().join(MATCH_FILENAME),
            "package.json\nsrc/**\n!**/*.test.js\n",
        )
        .unwrap();

        let matcher = Matcher::load(dir.path()).unwrap();
        let files = directory_traversal(dir.path(), &matcher).unwrap();

        assert_eq!(names(&files), vec!["package.json", "src/index.js"]);
    }

    #[test]
    fn ignore_file_excludes_like_gitignore() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "package.json");
        touch(dir.path(), "node_modules/dep/index.js");
        touch(dir.path(), "dist/out.js");
        touch(dir.path(), ".env");
        fs::write(dir.path().join(IGNORE_FILENAME), "node_modules\ndist/\n").unwrap();

        let matcher = Matcher::load(dir.path()).unwrap();
        let files = directory_traversal(dir.path(), &matcher).unwrap();

        assert_eq!(names(&files), vec![".env", "package.json"]);
    }

    #[test]
    fn without_control_files_everything_is_copied() {
        let dir = tempdir().unwrap();
        let dest = tempdir().unwrap();
        touch(dir.path(), "b.txt");
        touch(dir.path(), "a/c.txt");

        let plan = copy_plan(dir.path(), dest.path()).unwrap();

        let names: Vec<_> = plan.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["a/c.txt", "b.txt"]);
        assert_eq!(plan[0].dest, dest.path().join("a").join("c.txt"));
    }

    #[test]
    fn list_files_includes_hidden_files() {
        let dir = tempdir().unwrap();
        touch(dir.path(), ".unlock");
        touch(dir.path(), "src/main.js");

        let files = list_files(dir.path()).unwrap();

        assert_eq!(
            files,
            vec![dir.path().join(".unlock"), dir.path().join("src/main.js")]
        );
    }
}
