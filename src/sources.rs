// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Source path materialization and merging.
//!
//! Manifest entries list their sources relative to wherever the code lives.
//! For a cloned framework that is `<framework base dir>/<project name>`, and
//! for a local pseudo-entry it is the root of the host project's working
//! tree. Materialization turns those relative paths into absolute ones.
//!
//! Paths are joined as plain strings with a single `/`. Nothing gets
//! normalized or canonicalized, so `..` segments survive as written.

use crate::{
    manifest::Entry,
    path::Mode,
    resolve::Resolution,
};

use serde::Serialize;
use std::{
    collections::HashSet,
    path::{Path, PathBuf},
};

/// Rewrite source paths of an entry into absolute paths.
///
/// The project root is only requested when the entry is a local
/// pseudo-entry with at least one source.
///
/// # Errors
///
/// - Return error from `project_root` if host project root cannot be found.
pub fn materialize<E>(
    mut entry: Entry,
    project_root: impl FnOnce() -> Result<PathBuf, E>,
    framework_base_dir: &Path,
) -> Result<Entry, E> {
    if entry.sources.is_empty() {
        return Ok(entry);
    }

    let base = if entry.is_local() {
        project_root()?.display().to_string()
    } else {
        format!("{}/{}", framework_base_dir.display(), entry.project_name)
    };

    entry.sources = entry
        .sources
        .iter()
        .map(|source| format!("{base}/{source}"))
        .collect();

    Ok(entry)
}

/// Materialize source paths of many entries.
///
/// Finds the host project root at most once, no matter how many local
/// pseudo-entries there are.
///
/// # Errors
///
/// - Return error from `project_root` if host project root cannot be found.
pub fn materialize_all<E>(
    entries: impl IntoIterator<Item = Entry>,
    project_root: impl FnMut() -> Result<PathBuf, E>,
    framework_base_dir: &Path,
) -> Result<Vec<Entry>, E> {
    let mut roots = ProjectRoot::new(project_root);
    entries
        .into_iter()
        .map(|entry| materialize(entry, || roots.get(), framework_base_dir))
        .collect()
}

/// Materialize source paths of a whole resolution.
///
/// # Errors
///
/// - Return error from `project_root` if host project root cannot be found.
pub fn materialize_resolution<E>(
    resolution: Resolution,
    project_root: impl FnMut() -> Result<PathBuf, E>,
    framework_base_dir: &Path,
) -> Result<Resolution, E> {
    let mut roots = ProjectRoot::new(project_root);
    resolution.try_map(|entry| materialize(entry, || roots.get(), framework_base_dir))
}

/// Lazily found host project root.
struct ProjectRoot<F> {
    find: F,
    found: Option<PathBuf>,
}

impl<F, E> ProjectRoot<F>
where
    F: FnMut() -> Result<PathBuf, E>,
{
    fn new(find: F) -> Self {
        Self { find, found: None }
    }

    fn get(&mut self) -> Result<PathBuf, E> {
        if let Some(root) = &self.found {
            return Ok(root.clone());
        }

        let root = (self.find)()?;
        self.found = Some(root.clone());
        Ok(root)
    }
}

/// Merge resolution into a single entry.
///
/// Main entry keeps all of its fields. Its sources become the sources of
/// every entry in the resolution, main entry first, with duplicates removed
/// while keeping first occurrence order.
pub fn merge_sources(resolution: Resolution) -> EntryView {
    if resolution.extensions().is_empty() {
        return resolution.into_parts().0.into();
    }

    let (mut main, extensions) = resolution.into_parts();
    let combined = std::mem::take(&mut main.sources)
        .into_iter()
        .chain(extensions.into_iter().flat_map(|entry| entry.sources));
    main.sources = dedup_stable(combined);

    main.into()
}

/// Remove duplicates, keeping first occurrence order.
pub fn dedup_stable(items: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.clone()))
        .collect()
}

/// Entry narrowed to fields fit for output.
///
/// Passthrough fields the manifest left out stay out of the output too.
#[derive(Default, Debug, PartialEq, Eq, Clone, Serialize)]
pub struct EntryView {
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub project_name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub module: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub creator: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub date: String,
    pub sources: Vec<String>,
}

impl From<Entry> for EntryView {
    fn from(entry: Entry) -> Self {
        Self {
            name: entry.name,
            description: entry.description,
            project_name: entry.project_name,
            url: entry.url,
            branch: entry.branch,
            module: entry.module,
            creator: entry.creator,
            date: entry.date,
            sources: entry.sources,
        }
    }
}

/// Output of listing frameworks.
#[derive(Debug, PartialEq, Eq, Clone, Serialize)]
pub struct Listing {
    /// Listed entries.
    pub frameworks: Vec<EntryView>,

    /// Directory frameworks get installed into.
    pub install_path: String,

    /// Operating mode of project.
    pub mode: Mode,
}
