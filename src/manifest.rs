// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Framework manifest handling.
//!
//! A __manifest__ is a `gitlist.json` file holding a JSON array of entries.
//! Each entry describes a framework repository that can be cloned into the
//! framework base directory, or a __local pseudo-entry__ that points at code
//! living inside the host project itself.
//!
//! # Catalog
//!
//! The __catalog__ is every manifest found at the well-known locations,
//! concatenated in precedence order (see [`Layout::manifest_locations`]).
//! Entries are not deduplicated by name. Lookup returns the first entry with
//! a matching name, so a project-local manifest shadows the shared one.
//!
//! A manifest that fails to parse is reported and skipped. The catalog as a
//! whole only fails when it ends up empty.

use crate::path::{Layout, Probe};

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::{
    fs::read_to_string,
    path::{Path, PathBuf},
};
use tracing::{debug, error, instrument};

/// Sentinel marking local pseudo-entries.
pub const LOCAL_SENTINEL: &str = "__local__";

/// Name of placeholder entry shipped in manifest templates.
pub const TEMPLATE_PLACEHOLDER: &str = "框架名称";

/// One manifest record.
///
/// Missing or null fields default to empty values, so a sparse record still
/// loads. Scalars of the wrong type are kept in their JSON text form, e.g.
/// `"date": 20240120` becomes `"20240120"`. Fields outside this layout are
/// ignored.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize)]
#[serde(default)]
pub struct Entry {
    /// Catalog name used for lookup.
    #[serde(deserialize_with = "lenient_string")]
    pub name: String,

    /// Directory name of installed repository.
    #[serde(deserialize_with = "lenient_string")]
    pub project_name: String,

    /// Remote URL to clone from.
    #[serde(deserialize_with = "lenient_string")]
    pub url: String,

    /// Branch to check out, if any.
    #[serde(deserialize_with = "lenient_branch")]
    pub branch: Option<String>,

    /// Module name, passed through untouched.
    #[serde(deserialize_with = "lenient_string")]
    pub module: String,

    /// Source paths relative to repository or project root.
    #[serde(deserialize_with = "lenient_list")]
    pub sources: Vec<String>,

    /// Brief description.
    #[serde(deserialize_with = "lenient_string")]
    pub description: String,

    /// Author of entry.
    #[serde(deserialize_with = "lenient_string")]
    pub creator: String,

    /// Creation date.
    #[serde(deserialize_with = "lenient_string")]
    pub date: String,

    /// Names of other entries whose sources extend this one.
    #[serde(deserialize_with = "lenient_list")]
    pub extends: Vec<String>,
}

impl Entry {
    /// Check if entry is a local pseudo-entry.
    ///
    /// Only true when project name, URL, and branch are all exactly the
    /// local sentinel.
    pub fn is_local(&self) -> bool {
        self.project_name == LOCAL_SENTINEL
            && self.url == LOCAL_SENTINEL
            && self.branch.as_deref() == Some(LOCAL_SENTINEL)
    }
}

fn value_to_string(value: Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text,
        other => other.to_string(),
    }
}

fn lenient_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(value_to_string(Value::deserialize(deserializer)?))
}

fn lenient_branch<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        other => Ok(Some(value_to_string(other))),
    }
}

fn lenient_list<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => Ok(items
            .into_iter()
            .filter(|item| !item.is_null())
            .map(value_to_string)
            .collect()),
        other => Ok(vec![value_to_string(other)]),
    }
}

/// Load one manifest file.
///
/// Drops the template placeholder entry.
///
/// # Errors
///
/// - Return [`ManifestError::Read`] if file cannot be read.
/// - Return [`ManifestError::Parse`] if file is not a JSON array of objects.
pub fn load_manifest(path: impl AsRef<Path>) -> Result<Vec<Entry>> {
    let path = path.as_ref();
    let data = read_to_string(path).map_err(|err| ManifestError::Read {
        source: err,
        path: path.to_path_buf(),
    })?;

    parse_manifest(&data).map_err(|err| ManifestError::Parse {
        source: err,
        path: path.to_path_buf(),
    })
}

/// Parse manifest content.
///
/// Drops the template placeholder entry.
///
/// # Errors
///
/// - Return [`serde_json::Error`] if data is not a JSON array of objects.
pub fn parse_manifest(data: &str) -> std::result::Result<Vec<Entry>, serde_json::Error> {
    let entries: Vec<Entry> = serde_json::from_str(data)?;
    Ok(entries
        .into_iter()
        .filter(|entry| entry.name != TEMPLATE_PLACEHOLDER)
        .collect())
}

/// Merged view over every manifest of a project.
#[derive(Default, Debug, PartialEq, Eq, Clone)]
pub struct Catalog {
    entries: Vec<Entry>,
}

impl Catalog {
    /// Construct catalog from entries already in precedence order.
    pub fn new(entries: impl IntoIterator<Item = Entry>) -> Self {
        Self {
            entries: entries.into_iter().collect(),
        }
    }

    /// Load catalog from every manifest location of a layout.
    ///
    /// Manifests that fail to load are logged and skipped.
    ///
    /// # Errors
    ///
    /// - Return [`ManifestError::NoManifest`] if no manifest location exists.
    /// - Return [`ManifestError::EmptyCatalog`] if no entry could be loaded.
    #[instrument(skip(layout), level = "debug")]
    pub fn load<P: Probe>(layout: &Layout<P>) -> Result<Self> {
        let locations = layout.manifest_locations();
        if locations.is_empty() {
            return Err(ManifestError::NoManifest {
                config_root: layout.config_root(),
            });
        }

        let mut entries = Vec::new();
        for location in &locations {
            match load_manifest(location) {
                Ok(loaded) => {
                    debug!("loaded {} entries from {:?}", loaded.len(), location.display());
                    entries.extend(loaded);
                }
                Err(error) => error!("{error}"),
            }
        }

        if entries.is_empty() {
            return Err(ManifestError::EmptyCatalog { locations });
        }

        Ok(Self { entries })
    }

    /// Find first entry whose name matches exactly.
    pub fn find_exact(&self, name: &str) -> Option<&Entry> {
        self.entries.iter().find(|entry| entry.name == name)
    }

    /// All entries in precedence order.
    pub fn entries(&self) -> &[Entry] {
        self.entries.as_slice()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if catalog has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl IntoIterator for Catalog {
    type Item = Entry;
    type IntoIter = std::vec::IntoIter<Entry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// Manifest error types.
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    /// Manifest file cannot be read.
    #[error("failed to read manifest {:?}", path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Manifest file is not valid.
    #[error("failed to parse manifest {:?}: {source}", path.display())]
    Parse {
        #[source]
        source: serde_json::Error,
        path: PathBuf,
    },

    /// No manifest at any well-known location.
    #[error("no gitlist.json found under {:?}", config_root.display())]
    NoManifest { config_root: PathBuf },

    /// Every manifest was empty or broken.
    #[error("no framework entries found in {locations:?}")]
    EmptyCatalog { locations: Vec<PathBuf> },
}

/// Friendly result alias :3
pub type Result<T, E = ManifestError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::FsProbe;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;
    use simple_test_case::test_case;
    use std::fs::{create_dir_all, write};

    fn entry(name: &str, project_name: &str) -> Entry {
        Entry {
            name: name.into(),
            project_name: project_name.into(),
            ..Default::default()
        }
    }

    #[test]
    fn parse_manifest_defaults_missing_fields() -> anyhow::Result<()> {
        let result = parse_manifest(indoc! {r#"
            [
                {
                    "name": "xstatic",
                    "project_name": "xstatic",
                    "url": "https://example.org/xstatic.git",
                    "module": "library_xstatic",
                    "sources": ["src/main/java/hb/xstatic/*"],
                    "description": "base activity wrappers",
                    "creator": "team",
                    "date": "2024-01-20",
                    "docs": "ignored extra field"
                },
                { "name": "bare" }
            ]
        "#})?;

        let expect = vec![
            Entry {
                name: "xstatic".into(),
                project_name: "xstatic".into(),
                url: "https://example.org/xstatic.git".into(),
                branch: None,
                module: "library_xstatic".into(),
                sources: vec!["src/main/java/hb/xstatic/*".into()],
                description: "base activity wrappers".into(),
                creator: "team".into(),
                date: "2024-01-20".into(),
                extends: vec![],
            },
            Entry {
                name: "bare".into(),
                ..Default::default()
            },
        ];
        assert_eq!(result, expect);

        Ok(())
    }

    #[test]
    fn parse_manifest_tolerates_null_and_numeric_fields() -> anyhow::Result<()> {
        let result = parse_manifest(indoc! {r#"
            [
                { "name": "a", "branch": null, "sources": null, "description": null },
                {
                    "name": "b",
                    "project_name": "b",
                    "date": 20240120,
                    "creator": true,
                    "branch": 2,
                    "sources": ["lib/*", null, 7],
                    "extends": "a"
                }
            ]
        "#})?;

        let expect = vec![
            entry("a", ""),
            Entry {
                name: "b".into(),
                project_name: "b".into(),
                branch: Some("2".into()),
                sources: vec!["lib/*".into(), "7".into()],
                creator: "true".into(),
                date: "20240120".into(),
                extends: vec!["a".into()],
                ..Default::default()
            },
        ];
        assert_eq!(result, expect);

        Ok(())
    }

    #[test]
    fn parse_manifest_drops_template_placeholder() -> anyhow::Result<()> {
        let result = parse_manifest(r#"[{"name": "框架名称"}, {"name": "real"}]"#)?;
        assert_eq!(result, vec![entry("real", "")]);
        Ok(())
    }

    #[test]
    fn parse_manifest_rejects_non_array() {
        assert!(parse_manifest(r#"{"name": "x"}"#).is_err());
        assert!(parse_manifest("[{").is_err());
    }

    #[test_case("__local__", "__local__", Some("__local__"), true; "all sentinels")]
    #[test_case("__local__", "__local__", None, false; "missing branch")]
    #[test_case("__local__", "https://x", Some("__local__"), false; "real url")]
    #[test_case("foo", "__local__", Some("__local__"), false; "real project")]
    #[test]
    fn entry_is_local_needs_all_three_sentinels(
        project_name: &str,
        url: &str,
        branch: Option<&str>,
        expect: bool,
    ) {
        let entry = Entry {
            project_name: project_name.into(),
            url: url.into(),
            branch: branch.map(Into::into),
            ..Default::default()
        };
        pretty_assertions::assert_eq!(entry.is_local(), expect);
    }

    #[test]
    fn find_exact_returns_first_match() {
        let catalog = Catalog::new([entry("a", "first"), entry("b", "b"), entry("a", "second")]);
        assert_eq!(catalog.find_exact("a"), Some(&entry("a", "first")));
        assert_eq!(catalog.find_exact("A"), None);
        assert_eq!(catalog.find_exact("missing"), None);
    }

    #[sealed_test]
    fn catalog_load_respects_precedence() -> anyhow::Result<()> {
        let root = std::env::current_dir()?;
        let config_root = root.join(".driving");
        create_dir_all(config_root.join("ai-docs-local"))?;
        create_dir_all(config_root.join("ai-docs"))?;
        write(
            config_root.join("ai-docs-local/gitlist.json"),
            r#"[{"name": "dup", "project_name": "from-local"}]"#,
        )?;
        write(
            config_root.join("ai-docs/gitlist.json"),
            r#"[{"name": "dup", "project_name": "from-docs"}, {"name": "框架名称"}]"#,
        )?;
        write(
            config_root.join("gitlist.json"),
            r#"[{"name": "dup", "project_name": "from-legacy"}, {"name": "old"}]"#,
        )?;

        let catalog = Catalog::load(&Layout::new(&root, FsProbe))?;
        assert_eq!(catalog.len(), 4);
        assert_eq!(catalog.find_exact("dup"), Some(&entry("dup", "from-local")));
        assert!(catalog.find_exact(TEMPLATE_PLACEHOLDER).is_none());

        Ok(())
    }

    #[sealed_test]
    fn catalog_load_skips_broken_manifest() -> anyhow::Result<()> {
        let root = std::env::current_dir()?;
        create_dir_all(root.join("ai-docs"))?;
        write(root.join("ai-docs/gitlist.json"), "[{ broken")?;
        write(root.join("gitlist.json"), r#"[{"name": "ok"}]"#)?;

        let catalog = Catalog::load(&Layout::new(&root, FsProbe))?;
        assert_eq!(catalog.entries(), &[entry("ok", "")]);

        Ok(())
    }

    #[sealed_test]
    fn catalog_load_fails_when_everything_is_broken() -> anyhow::Result<()> {
        let root = std::env::current_dir()?;
        write(root.join("gitlist.json"), "not json")?;

        let result = Catalog::load(&Layout::new(&root, FsProbe));
        assert!(matches!(result, Err(ManifestError::EmptyCatalog { .. })));

        Ok(())
    }

    #[sealed_test]
    fn catalog_load_fails_without_manifest() -> anyhow::Result<()> {
        let root = std::env::current_dir()?;
        create_dir_all(root.join(".driving"))?;

        let result = Catalog::load(&Layout::new(&root, FsProbe));
        assert!(matches!(result, Err(ManifestError::NoManifest { .. })));

        Ok(())
    }
}
