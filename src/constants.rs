// src/constants.rs

/// The name of the package descriptor of every app and of the workspace root.
pub const PACKAGE_FILENAME: &str = "package.json";

/// Marker file that must exist inside an app directory before it can be deleted.
pub const UNLOCK_FILENAME: &str = ".unlock";

/// Template file listing the globs to copy (`!` excludes).
pub const MATCH_FILENAME: &str = ".vxmatch";

/// Template file listing gitignore-style exclusions.
pub const IGNORE_FILENAME: &str = ".vxignore";

/// Directory (inside the tool home) holding the built-in templates.
pub const TEMPLATES_DIR: &str = "templates";

/// Directory (inside the tool home) holding the files copied by `vx init`.
pub const INIT_DIR: &str = "init";

/// Pseudo-workspace that places an app directly under the project root.
pub const ROOT_WORKSPACE: &str = "root";

/// Environment variable overriding the tool home directory.
pub const HOME_ENV: &str = "VX_HOME";

/// Directories never descended into while discovering apps.
pub const IGNORED_DIRS: &[&str] = &["node_modules", ".git"];
