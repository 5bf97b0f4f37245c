// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! IDE configuration bundles.
//!
//! The configuration root ships IDE specific bundles under `install/`, one
//! hidden directory per IDE, e.g. `install/.cursor`. Syncing a bundle copies
//! it into the project root without ever deleting what is already there.
//!
//! # Secret Extraction
//!
//! Bundles may carry an `mcp.json` with API keys and tokens. Every copied
//! `mcp.json` gets those values swapped for `${KEY}` references. The values
//! themselves move into `.env.local` at the project root, which is kept out
//! of version control.

use crate::{
    config::{ConfigError, EnvFile, Settings},
    path::{Layout, NotConfigured},
};

use ignore::WalkBuilder;
use regex::{Captures, Regex};
use serde_json::Value;
use std::{
    collections::{BTreeMap, BTreeSet, HashSet},
    fs,
    path::{Path, PathBuf},
    sync::LazyLock,
};
use tracing::{debug, info, instrument, warn};

/// Name of MCP configuration file that gets sanitized.
pub const MCP_FILE: &str = "mcp.json";

/// Name of file receiving extracted secrets.
pub const ENV_LOCAL_FILE: &str = ".env.local";

/// Header written on top of `.env.local`.
pub const ENV_LOCAL_HEADER: [&str; 3] = [
    "IDE configuration secrets",
    "This file holds secrets, never commit it",
    "Precedence: .env.local > .env",
];

// INVARIANT: Strings match first, so `//` inside a URL is never a comment.
static STRING_OR_COMMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""(?:[^"\\]|\\.)*"|//[^\n]*|(?s:/\*.*?\*/)"#)
        .expect("valid string or comment pattern")
});
static ENV_KEY_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Z0-9_]").expect("valid env key pattern"));

/// List IDE bundles available under install directory.
///
/// Names come back sorted and without their leading dot.
///
/// # Errors
///
/// - Return [`IdeError::MissingInstallDir`] if install directory is missing.
pub fn list_ides(layout: &Layout) -> Result<Vec<String>> {
    let install_dir = layout.install_dir();
    if !install_dir.is_dir() {
        return Err(IdeError::MissingInstallDir { path: install_dir });
    }

    let mut ides = Vec::new();
    for entry in fs::read_dir(&install_dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if entry.file_type()?.is_dir() && name.starts_with('.') && name != ".DS_Store" {
            ides.push(name[1..].to_string());
        }
    }
    ides.sort();

    Ok(ides)
}

/// Counts of an IDE bundle sync.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncReport {
    /// Files that did not exist in target.
    pub added: usize,

    /// Files whose content differed and got overwritten.
    pub updated: usize,

    /// Files with identical content.
    pub skipped: usize,

    /// Target files with no counterpart in bundle, left untouched.
    pub kept: usize,

    /// Names of extracted secret variables.
    pub secrets: BTreeSet<String>,
}

/// Copy IDE bundle into project root.
///
/// Target ends up at `<project root>/.<ide>`.
///
/// # Errors
///
/// - Return [`IdeError::NotConfigured`] if project is not configured.
/// - Return [`IdeError::UnknownIde`] if no bundle exists for `ide`.
/// - Return [`IdeError::Io`] if files cannot be copied.
#[instrument(skip(layout, settings), level = "debug")]
pub fn sync(layout: &Layout, ide: &str, settings: &Settings) -> Result<SyncReport> {
    layout.check_environment()?;
    let install_dir = layout.install_dir();
    if !install_dir.is_dir() {
        return Err(IdeError::MissingInstallDir { path: install_dir });
    }

    let bundle = format!(".{ide}");
    let source = install_dir.join(&bundle);
    if !source.is_dir() {
        return Err(IdeError::UnknownIde {
            name: ide.into(),
            path: source,
        });
    }

    let project_root = layout.root();
    let target = project_root.join(&bundle);
    info!("sync {:?} into {:?}", source.display(), target.display());

    let report = copy_incremental(&source, &target, project_root, settings)?;
    info!(
        "added {}, updated {}, skipped {} file(s)",
        report.added, report.updated, report.skipped
    );
    if !report.secrets.is_empty() {
        warn!(
            "moved {} secret(s) into {ENV_LOCAL_FILE}, check their values",
            report.secrets.len()
        );
    }
    if report.kept > 0 {
        info!("kept {} custom file(s) in target", report.kept);
    }

    Ok(report)
}

/// Copy every file of source into target, never deleting anything.
///
/// # Errors
///
/// - Return [`IdeError::Io`] if files cannot be read or written.
pub fn copy_incremental(
    source: &Path,
    target: &Path,
    project_root: &Path,
    settings: &Settings,
) -> Result<SyncReport> {
    let mut report = SyncReport::default();
    fs::create_dir_all(target)?;

    let files = walk_files(source);
    for relative in &files {
        let from = source.join(relative);
        let to = target.join(relative);
        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent)?;
        }

        if !to.exists() {
            fs::copy(&from, &to)?;
            report.added += 1;
        } else if fs::read(&from)? == fs::read(&to)? {
            report.skipped += 1;
        } else {
            fs::copy(&from, &to)?;
            report.updated += 1;
        }

        if to.file_name().is_some_and(|name| name == MCP_FILE) {
            match extract_secrets(&to, project_root, settings) {
                Ok(secrets) => {
                    if !secrets.is_empty() {
                        info!(
                            "extracted {} secret(s) from {:?}",
                            secrets.len(),
                            relative.display()
                        );
                    }
                    report.secrets.extend(secrets);
                }
                Err(error) => warn!("failed to sanitize {:?}: {error}", to.display()),
            }
        }
    }

    let bundled = files.into_iter().collect::<HashSet<_>>();
    report.kept = walk_files(target)
        .into_iter()
        .filter(|relative| !bundled.contains(relative))
        .count();

    Ok(report)
}

/// Every file below a directory, relative to it.
fn walk_files(root: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for result in WalkBuilder::new(root).standard_filters(false).build() {
        match result {
            Ok(entry) => {
                if !entry.file_type().is_some_and(|kind| kind.is_file()) {
                    continue;
                }

                if let Ok(relative) = entry.path().strip_prefix(root) {
                    files.push(relative.to_path_buf());
                }
            }
            Err(error) => warn!("failed to read entry: {error}"),
        }
    }
    files.sort();

    files
}

/// Sanitize `mcp.json` in place and move its secrets into `.env.local`.
///
/// File is left alone when it holds no secrets.
///
/// # Errors
///
/// - Return [`IdeError::Json`] if file is not valid JSON after comments are
///   stripped.
/// - Return [`IdeError::Io`] if files cannot be read or written.
pub fn extract_secrets(
    mcp_file: &Path,
    project_root: &Path,
    settings: &Settings,
) -> Result<BTreeSet<String>> {
    let content = fs::read_to_string(mcp_file)?;
    let Some((sanitized, secrets)) = sanitize_mcp(&content, settings)? else {
        return Ok(BTreeSet::new());
    };

    fs::write(mcp_file, sanitized)?;

    let env_local = project_root.join(ENV_LOCAL_FILE);
    let mut env = EnvFile::load_or_default(&env_local)?;
    let names = secrets.keys().cloned().collect();
    env.extend(secrets);
    env.with_header(ENV_LOCAL_HEADER).save(&env_local)?;

    ignore_env_local(project_root)?;

    Ok(names)
}

/// Replace secret values of MCP configuration with variable references.
///
/// Returns the sanitized document together with the extracted variables, or
/// nothing when no secret was found.
///
/// # Errors
///
/// - Return [`IdeError::Json`] if content is not valid JSON after comments
///   are stripped.
pub fn sanitize_mcp(
    content: &str,
    settings: &Settings,
) -> Result<Option<(String, BTreeMap<String, String>)>> {
    let content = strip_comments(content);
    let mut document: Value = serde_json::from_str(&content)?;

    let mut secrets = BTreeMap::new();
    replace_secrets(&mut document, settings, &mut secrets);
    if secrets.is_empty() {
        return Ok(None);
    }

    let mut sanitized = serde_json::to_string_pretty(&document)?;
    sanitized.push('\n');
    Ok(Some((sanitized, secrets)))
}

/// Drop `//` and `/* */` comments outside of JSON strings.
pub fn strip_comments(content: &str) -> String {
    STRING_OR_COMMENT
        .replace_all(content, |caps: &Captures| {
            let token = &caps[0];
            if token.starts_with('"') {
                token.to_string()
            } else {
                String::new()
            }
        })
        .into_owned()
}

fn replace_secrets(value: &mut Value, settings: &Settings, secrets: &mut BTreeMap<String, String>) {
    match value {
        Value::Object(map) => {
            for (key, value) in map.iter_mut() {
                if let Value::String(secret) = value {
                    if is_secret(key, secret, settings) {
                        let name = env_key(key);
                        debug!("extract {key:?} as {name}");
                        secrets.insert(name.clone(), std::mem::take(secret));
                        *secret = format!("${{{name}}}");
                    }
                    continue;
                }

                replace_secrets(value, settings, secrets);
            }
        }
        Value::Array(items) => {
            for item in items {
                replace_secrets(item, settings, secrets);
            }
        }
        _ => {}
    }
}

fn is_secret(key: &str, value: &str, settings: &Settings) -> bool {
    let is_reference = value.starts_with("${") && value.ends_with('}');
    !value.is_empty() && !is_reference && settings.is_sensitive_key(key)
}

/// Turn a configuration key into an environment variable name.
pub fn env_key(key: &str) -> String {
    ENV_KEY_CHARS
        .replace_all(&key.to_uppercase(), "_")
        .into_owned()
}

/// Make sure `.env.local` is ignored by Git at project root.
fn ignore_env_local(project_root: &Path) -> Result<()> {
    let gitignore = project_root.join(".gitignore");
    let mut content = if gitignore.exists() {
        fs::read_to_string(&gitignore)?
    } else {
        String::new()
    };

    if content.contains(ENV_LOCAL_FILE) {
        return Ok(());
    }

    if !content.is_empty() && !content.ends_with('\n') {
        content.push('\n');
    }
    content.push_str("\n# IDE configuration secrets\n.env.local\n");
    fs::write(&gitignore, content)?;
    info!("added {ENV_LOCAL_FILE} to .gitignore");

    Ok(())
}

/// IDE bundle error types.
#[derive(Debug, thiserror::Error)]
pub enum IdeError {
    /// Project has no driving configuration.
    #[error(transparent)]
    NotConfigured(#[from] NotConfigured),

    /// Configuration root ships no IDE bundles.
    #[error("install directory {:?} does not exist", path.display())]
    MissingInstallDir { path: PathBuf },

    /// No bundle for requested IDE.
    #[error(
        "no configuration for IDE {name:?} at {:?}, run 'driving ide-list' to see available ones",
        path.display()
    )]
    UnknownIde { name: String, path: PathBuf },

    /// MCP configuration is not valid JSON.
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Env file cannot be updated.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// File system failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Friendly result alias :3
pub type Result<T, E = IdeError> = std::result::Result<T, E>;
