// build.rs

//! Compiles `locales/<lang>.toml` into the `t!` macro.
//!
//! `VX_LANG` picks the catalogue; keys it lacks come from `en`. Keys must be
//! `area.kind.name` and the colour tags of every value must be balanced, or the
//! build fails.

use std::collections::BTreeMap;
use std::env;
use std::error::Error;
use std::fs;
use std::path::Path;

type Catalogue = BTreeMap<String, String>;

/// Tags rendered by `cli::build_help_string`.
const MARKUP_TAGS: &[&str] = &["title", "hl", "cmd", "err", "dim"];

const FALLBACK_LANG: &str = "en";

fn main() -> Result<(), Box<dyn Error>> {
    println!("cargo:rerun-if-env-changed=VX_LANG");
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=locales");

    let lang = env::var("VX_LANG").unwrap_or_else(|_| FALLBACK_LANG.to_string());
    let mut catalogue = load(FALLBACK_LANG)?;
    if lang != FALLBACK_LANG {
        if Path::new(&locale_path(&lang)).is_file() {
            catalogue.extend(load(&lang)?);
        } else {
            println!("cargo:warning=No catalogue for VX_LANG={lang}, using '{FALLBACK_LANG}'");
        }
    }

    for (key, value) in &catalogue {
        check_key(key)?;
        check_markup(key, value)?;
    }

    let out_dir = env::var("OUT_DIR")?;
    fs::write(Path::new(&out_dir).join("translations.rs"), render(&catalogue))?;
    Ok(())
}

fn locale_path(lang: &str) -> String {
    format!("locales/{lang}.toml")
}

fn load(lang: &str) -> Result<Catalogue, Box<dyn Error>> {
    let path = locale_path(lang);
    let content = fs::read_to_string(&path).map_err(|e| format!("Could not read {path}: {e}"))?;
    let catalogue = toml::from_str(&content).map_err(|e| format!("Could not parse {path}: {e}"))?;
    Ok(catalogue)
}

/// Keys are `area.kind.name`, lowercase.
fn check_key(key: &str) -> Result<(), String> {
    let segments: Vec<&str> = key.split('.').collect();
    let well_formed = segments.len() == 3
        && segments.iter().all(|s| {
            !s.is_empty() && s.chars().all(|c| c.is_ascii_lowercase() || c == '_')
        });
    if well_formed {
        Ok(())
    } else {
        Err(format!("Catalogue key '{key}' is not of the form area.kind.name"))
    }
}

/// Colour tags must be closed in the order they were opened.
fn check_markup(key: &str, value: &str) -> Result<(), String> {
    let mut open: Vec<&str> = Vec::new();
    let mut rest = value;
    while let Some((_, after)) = rest.split_once('<') {
        let Some((tag, tail)) = after.split_once('>') else {
            break;
        };
        rest = tail;

        let (closing, name) = match tag.strip_prefix('/') {
            Some(name) => (true, name),
            None => (false, tag),
        };
        if !MARKUP_TAGS.contains(&name) {
            // Literal placeholders such as `<command>` in usage lines.
            continue;
        }
        if !closing {
            open.push(name);
        } else if open.pop() != Some(name) {
            return Err(format!("'{key}': unexpected </{name}>"));
        }
    }
    match open.last() {
        Some(name) => Err(format!("'{key}': <{name}> is never closed")),
        None => Ok(()),
    }
}

fn render(catalogue: &Catalogue) -> String {
    let mut code = String::from("#[macro_export]\nmacro_rules! t {\n");
    for (key, value) in catalogue {
        let literal = value.replace('\\', "\\\\").replace('"', "\\\"");
        code.push_str(&format!("    (\"{key}\") => {{ \"{literal}\" }};\n"));
    }
    code.push_str(
        "    ($key:expr) => {{ compile_error!(concat!(\"Missing translation key: \", $key)) }};\n",
    );
    code.push_str("}\n");
    code
}
