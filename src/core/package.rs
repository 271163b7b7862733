// src/core/package.rs

use crate::constants::PACKAGE_FILENAME;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PackageError {
    #[error("Could not read '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Could not parse '{path}': {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("Could not write '{path}': {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("'{path}' does not hold a JSON object")]
    NotAnObject { path: String },
}

/// The `workspaces` field, either a plain list or `{ "packages": [...] }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Workspaces {
    List(Vec<String>),
    Packages {
        #[serde(default)]
        packages: Vec<String>,
    },
}

impl Workspaces {
    pub fn entries(&self) -> &[String] {
        match self {
            Self::List(list) => list,
            Self::Packages { packages } => packages,
        }
    }

    pub fn push(&mut self, entry: impl Into<String>) {
        match self {
            Self::List(list) => list.push(entry.into()),
            Self::Packages { packages } => packages.push(entry.into()),
        }
    }

    /// Removes every entry equal to `entry`. Returns whether something was removed.
    pub fn remove(&mut self, entry: &str) -> bool {
        let list = match self {
            Self::List(list) => list,
            Self::Packages { packages } => packages,
        };
        let before = list.len();
        list.retain(|e| e != entry);
        before != list.len()
    }
}

/// The `vx` section of a workspace root descriptor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VxSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspaces: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub templates_paths: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Typed view over a `package.json`. Unknown fields are kept in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PackageJson {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspaces: Option<Workspaces>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vx: Option<VxSettings>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PackageJson {
    /// The workspace globs in effect: `vx.workspaces` first, then `workspaces`.
    pub fn workspace_entries(&self) -> Vec<String> {
        if let Some(list) = self.vx.as_ref().and_then(|vx| vx.workspaces.clone()) {
            return list;
        }
        self.workspaces
            .as_ref()
            .map(|w| w.entries().to_vec())
            .unwrap_or_default()
    }

    /// True when this descriptor marks a workspace root.
    pub fn declares_workspaces(&self) -> bool {
        self.workspaces.is_some() || self.vx.as_ref().is_some_and(|vx| vx.workspaces.is_some())
    }

    pub fn templates_paths(&self) -> &[String] {
        self.vx
            .as_ref()
            .map(|vx| vx.templates_paths.as_slice())
            .unwrap_or_default()
    }
}

pub fn package_path(dir: &Path) -> PathBuf {
    dir.join(PACKAGE_FILENAME)
}

/// Reads `<dir>/package.json`. Returns `Ok(None)` if the file does not exist.
pub fn get_pkg(dir: &Path) -> Result<Option<PackageJson>, PackageError> {
    let Some(value) = read_value(dir)? else {
        return Ok(None);
    };
    let path = package_path(dir);
    serde_json::from_value(value)
        .map(Some)
        .map_err(|source| PackageError::Parse {
            path: path.display().to_string(),
            source,
        })
}

/// Merges the top-level keys of `values` into `<dir>/package.json` and writes it back
/// pretty-printed. A missing descriptor is created. Key order is preserved.
pub fn set_pkg(dir: &Path, values: Map<String, Value>) -> Result<PackageJson, PackageError> {
    let path = package_path(dir);
    let mut current = match read_value(dir)? {
        Some(Value::Object(map)) => map,
        Some(_) => {
            return Err(PackageError::NotAnObject {
                path: path.display().to_string(),
            });
        }
        None => Map::new(),
    };
    for (key, value) in values {
        current.insert(key, value);
    }

    let merged = Value::Object(current);
    let mut text = serde_json::to_string_pretty(&merged).map_err(|source| PackageError::Parse {
        path: path.display().to_string(),
        source,
    })?;
    text.push('\n');
    fs::write(&path, text).map_err(|source| PackageError::Write {
        path: path.display().to_string(),
        source,
    })?;
    log::debug!("Updated '{}'", path.display());

    serde_json::from_value(merged).map_err(|source| PackageError::Parse {
        path: path.display().to_string(),
        source,
    })
}

/// Builds the partial object accepted by [`set_pkg`] from `(key, value)` pairs.
pub fn fields<I, K>(pairs: I) -> Map<String, Value>
where
    I: IntoIterator<Item = (K, Value)>,
    K: Into<String>,
{
    pairs.into_iter().map(|(k, v)| (k.into(), v)).collect()
}

fn read_value(dir: &Path) -> Result<Option<Value>, PackageError> {
    let path = package_path(dir);
    if !path.is_file() {
        return Ok(None);
    }
    let text = fs::read_to_string(&path).map_err(|source| PackageError::Read {
        path: path.display().to_string(),
        source,
    })?;
    serde_json::from_str(&text)
        .map(Some)
        .map_err(|source| PackageError::Parse {
            path: path.display().to_string(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn missing_descriptor_reads_as_none() {
        let dir = tempdir().unwrap();
        assert!(get_pkg(dir.path()).unwrap().is_none());
    }

    #[test]
    fn set_pkg_merges_and_keeps_unknown_fields() {
        let dir = tempdir().unwrap();
        fs::write(
            package_path(dir.path()),
            r#"{"name":"old","version":"1.0.0","scripts":{"dev":"node ."}}"#,
        )
        .unwrap();

        let pkg = set_pkg(dir.path(), fields([("name", json!("new"))])).unwrap();

        assert_eq!(pkg.name.as_deref(), Some("new"));
        assert_eq!(pkg.extra.get("version"), Some(&json!("1.0.0")));
        let text = fs::read_to_string(package_path(dir.path())).unwrap();
        assert!(text.ends_with("}\n"));
        assert!(text.find("\"name\"").unwrap() < text.find("\"version\"").unwrap());
    }

    #[test]
    fn set_pkg_creates_a_missing_descriptor() {
        let dir = tempdir().unwrap();
        set_pkg(dir.path(), fields([("name", json!("fresh"))])).unwrap();
        let pkg = get_pkg(dir.path()).unwrap().unwrap();
        assert_eq!(pkg.name.as_deref(), Some("fresh"));
    }

    #[test]
    fn workspaces_accept_both_shapes() {
        let list: PackageJson = serde_json::from_value(json!({"workspaces": ["apps/*"]})).unwrap();
        let object: PackageJson =
            serde_json::from_value(json!({"workspaces": {"packages": ["libs/*"]}})).unwrap();

        assert_eq!(list.workspace_entries(), vec!["apps/*"]);
        assert_eq!(object.workspace_entries(), vec!["libs/*"]);
        assert!(list.declares_workspaces());
    }

    #[test]
    fn vx_workspaces_take_precedence() {
        let pkg: PackageJson = serde_json::from_value(json!({
            "workspaces": ["apps/*"],
            "vx": {"workspaces": ["custom/*"], "templatesPaths": ["tpl"]}
        }))
        .unwrap();

        assert_eq!(pkg.workspace_entries(), vec!["custom/*"]);
        assert_eq!(pkg.templates_paths(), ["tpl".to_string()]);
    }

    #[test]
    fn invalid_json_is_a_parse_error() {
        let dir = tempdir().unwrap();
        fs::write(package_path(dir.path()), "{ nope").unwrap();
        assert!(matches!(get_pkg(dir.path()), Err(PackageError::Parse { .. })));
    }
}
