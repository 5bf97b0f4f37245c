// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Entry resolution.
//!
//! Resolving a name yields the matching entry followed by every entry named
//! in its `extends` listing, in declared order. Extensions are followed
//! exactly one level deep, so an extension's own `extends` listing is never
//! consulted and cycles cannot occur.
//!
//! An `extends` reference with no catalog match is skipped without error.
//! Callers that want to know about such references can observe them through
//! [`resolve_with`].

use crate::manifest::{Catalog, Entry};

use tracing::debug;

/// Entry together with its resolved extensions.
///
/// Never empty: the main entry always comes first.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Resolution {
    main: Entry,
    extensions: Vec<Entry>,
}

impl Resolution {
    /// Construct resolution from a main entry and its extensions.
    pub fn new(main: Entry, extensions: impl IntoIterator<Item = Entry>) -> Self {
        Self {
            main,
            extensions: extensions.into_iter().collect(),
        }
    }

    /// Main entry that was asked for.
    pub fn main(&self) -> &Entry {
        &self.main
    }

    /// Resolved extensions in declared order.
    pub fn extensions(&self) -> &[Entry] {
        self.extensions.as_slice()
    }

    /// Iterate main entry and then extensions.
    pub fn iter(&self) -> impl Iterator<Item = &Entry> {
        std::iter::once(&self.main).chain(self.extensions.iter())
    }

    /// Number of entries, main entry included.
    pub fn len(&self) -> usize {
        1 + self.extensions.len()
    }

    /// Always false, a resolution has at least its main entry.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Rewrite every entry through a fallible mapping.
    ///
    /// # Errors
    ///
    /// - Return first error produced by the mapping.
    pub fn try_map<E>(self, mut map: impl FnMut(Entry) -> Result<Entry, E>) -> Result<Self, E> {
        let main = map(self.main)?;
        let extensions = self
            .extensions
            .into_iter()
            .map(map)
            .collect::<Result<Vec<_>, E>>()?;

        Ok(Self { main, extensions })
    }

    /// Split into main entry and extensions.
    pub fn into_parts(self) -> (Entry, Vec<Entry>) {
        (self.main, self.extensions)
    }

    /// Flatten into an ordered listing of entries.
    pub fn into_entries(self) -> Vec<Entry> {
        let mut entries = Vec::with_capacity(self.len());
        entries.push(self.main);
        entries.extend(self.extensions);
        entries
    }
}

/// Resolve a name against a catalog.
///
/// Missing extensions are logged at debug level and skipped.
///
/// # Errors
///
/// - Return [`NotFound`] if no entry matches the name exactly.
pub fn resolve(catalog: &Catalog, name: &str) -> Result<Resolution> {
    resolve_with(catalog, name, |entry, reference| {
        debug!(
            "entry {:?} extends {:?}, which is not in the catalog",
            entry.name, reference
        );
    })
}

/// Resolve a name against a catalog, reporting missing extensions.
///
/// The callback receives the main entry and every `extends` reference that
/// has no match. Resolution continues regardless.
///
/// # Errors
///
/// - Return [`NotFound`] if no entry matches the name exactly.
pub fn resolve_with(
    catalog: &Catalog,
    name: &str,
    mut on_missing: impl FnMut(&Entry, &str),
) -> Result<Resolution> {
    let main = catalog
        .find_exact(name)
        .cloned()
        .ok_or_else(|| NotFound { name: name.into() })?;

    let mut extensions = Vec::with_capacity(main.extends.len());
    for reference in &main.extends {
        match catalog.find_exact(reference) {
            Some(extension) => extensions.push(extension.clone()),
            None => on_missing(&main, reference),
        }
    }

    Ok(Resolution { main, extensions })
}

/// Requested name has no catalog entry.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("framework {name:?} not found, run 'driving git-list' to see available frameworks")]
pub struct NotFound {
    pub name: String,
}

/// Friendly result alias :3
pub type Result<T, E = NotFound> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn entry(name: &str, extends: &[&str]) -> Entry {
        Entry {
            name: name.into(),
            project_name: name.into(),
            extends: extends.iter().map(ToString::to_string).collect(),
            ..Default::default()
        }
    }

    fn names(resolution: &Resolution) -> Vec<&str> {
        resolution.iter().map(|entry| entry.name.as_str()).collect()
    }

    #[test]
    fn resolve_without_extends() -> anyhow::Result<()> {
        let catalog = Catalog::new([entry("a", &[]), entry("b", &[])]);
        let result = resolve(&catalog, "b")?;
        assert_eq!(names(&result), vec!["b"]);
        assert_eq!(result.len(), 1);
        Ok(())
    }

    #[test]
    fn resolve_follows_extends_one_level_in_order() -> anyhow::Result<()> {
        let catalog = Catalog::new([
            entry("d", &[]),
            entry("c", &[]),
            entry("b", &["d"]),
            entry("a", &["b", "c"]),
        ]);
        let result = resolve(&catalog, "a")?;
        assert_eq!(names(&result), vec!["a", "b", "c"]);
        Ok(())
    }

    #[test]
    fn resolve_skips_missing_extension_and_reports_it() -> anyhow::Result<()> {
        let catalog = Catalog::new([entry("a", &["b", "ghost"]), entry("b", &[])]);
        let mut missing = Vec::new();
        let result = resolve_with(&catalog, "a", |main, reference| {
            missing.push((main.name.clone(), reference.to_string()));
        })?;
        assert_eq!(names(&result), vec!["a", "b"]);
        assert_eq!(missing, vec![("a".to_string(), "ghost".to_string())]);
        Ok(())
    }

    #[test]
    fn resolve_keeps_duplicate_extensions() -> anyhow::Result<()> {
        let catalog = Catalog::new([entry("a", &["b", "b"]), entry("b", &[])]);
        let result = resolve(&catalog, "a")?;
        assert_eq!(names(&result), vec!["a", "b", "b"]);
        Ok(())
    }

    #[test]
    fn resolve_self_reference_does_not_loop() -> anyhow::Result<()> {
        let catalog = Catalog::new([entry("a", &["a"])]);
        let result = resolve(&catalog, "a")?;
        assert_eq!(names(&result), vec!["a", "a"]);
        Ok(())
    }

    #[test]
    fn resolve_unknown_name() {
        let catalog = Catalog::new([entry("a", &[])]);
        let result = resolve(&catalog, "nope");
        assert_eq!(
            result,
            Err(NotFound {
                name: "nope".into()
            })
        );
    }

    #[test]
    fn try_map_stops_on_first_error() {
        let resolution = Resolution::new(entry("a", &[]), [entry("b", &[]), entry("c", &[])]);
        let mut seen = Vec::new();
        let result = resolution.try_map(|entry| {
            seen.push(entry.name.clone());
            if entry.name == "b" {
                Err("boom")
            } else {
                Ok(entry)
            }
        });
        assert_eq!(result, Err("boom"));
        assert_eq!(seen, vec!["a", "b"]);
    }
}
