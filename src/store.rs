// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Framework store management.
//!
//! Driving groups framework repositories together into one place called the
//! __framework store__, which is the framework base directory of a project
//! layout. Each framework named in the catalog is cloned into its own
//! directory `<framework base dir>/<project name>`.
//!
//! Local pseudo-entries never occupy the store. Their sources already live
//! inside the host project, so installing one is a no-op and switching or
//! pulling one is refused.

use crate::{
    manifest::{Catalog, Entry, ManifestError},
    path::{Layout, Mode, NotConfigured},
    resolve::{resolve, NotFound, Resolution},
    sources::{materialize_all, materialize_resolution, merge_sources, EntryView, Listing},
    vcs::{Outcome, Pull, Vcs, VcsError},
};

use futures::future::join_all;
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::{error, info, instrument};

/// Result of installing a framework with its extensions.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct InstallReport {
    /// Installed frameworks with what happened to them.
    pub installed: Vec<(String, Outcome)>,

    /// Local pseudo-entries that were skipped.
    pub skipped: Vec<Entry>,

    /// Entries dropped because an earlier entry already claimed their
    /// project directory.
    pub duplicates: Vec<Entry>,
}

/// Framework commands over a project layout.
#[derive(Debug, Clone)]
pub struct FrameworkStore<V: Vcs> {
    layout: Layout,
    vcs: Arc<V>,
}

impl<V: Vcs> FrameworkStore<V> {
    /// Construct new framework store for a project layout.
    pub fn new(layout: Layout, vcs: Arc<V>) -> Self {
        Self { layout, vcs }
    }

    /// Project layout of store.
    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Load catalog of configured project.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::NotConfigured`] if project is not configured.
    /// - Return [`StoreError::Manifest`] if catalog cannot be loaded.
    pub fn catalog(&self) -> Result<Catalog> {
        self.layout.check_environment()?;
        Ok(Catalog::load(&self.layout)?)
    }

    /// List entries of catalog, or of one resolved name.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::NotFound`] if name is given but not in catalog.
    /// - Return [`StoreError::Manifest`] if catalog cannot be loaded.
    pub fn list(&self, name: Option<&str>) -> Result<Vec<Entry>> {
        let catalog = self.catalog()?;
        match name {
            Some(name) => Ok(resolve(&catalog, name)?.into_entries()),
            None => Ok(catalog.into_iter().collect()),
        }
    }

    /// List entries with absolute source paths, fit for output.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::Vcs`] if a local pseudo-entry is listed but
    ///   project root is not inside a Git working tree.
    /// - Return errors of [`FrameworkStore::list`].
    pub fn listing(&self, name: Option<&str>) -> Result<Listing> {
        let base = self.layout.framework_base_dir();
        let entries = materialize_all(self.list(name)?, || self.project_root(), &base)?;

        Ok(Listing {
            frameworks: entries.into_iter().map(EntryView::from).collect(),
            install_path: base.display().to_string(),
            mode: self.layout.mode(),
        })
    }

    /// Resolve name into one entry listing every source of its extensions.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::NotFound`] if name is not in catalog.
    /// - Return [`StoreError::Vcs`] if a local pseudo-entry is involved but
    ///   project root is not inside a Git working tree.
    pub fn sources(&self, name: &str) -> Result<EntryView> {
        let resolution = resolve(&self.catalog()?, name)?;
        let base = self.layout.framework_base_dir();
        let resolution = materialize_resolution(resolution, || self.project_root(), &base)?;
        Ok(merge_sources(resolution))
    }

    /// Clone or update a framework and all of its extensions.
    ///
    /// Every remote entry is handled concurrently. Failures are reported only
    /// after every job has finished, so one bad remote does not leave others
    /// half cloned.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::NotConfigured`] if project is not configured.
    /// - Return [`StoreError::InstallFailed`] if any entry failed.
    #[instrument(skip(self), level = "debug")]
    pub async fn install(&self, name: &str) -> Result<InstallReport> {
        let resolution = resolve(&self.catalog()?, name)?;
        log_extensions(&resolution);

        let base = self.layout.framework_base_dir();
        mkdirp::mkdirp(&base)?;

        let mut report = InstallReport::default();
        let mut claimed = HashMap::new();
        let mut jobs = Vec::new();
        let mut names = Vec::new();
        for entry in resolution.into_entries() {
            if entry.is_local() {
                info!("skip local entry {:?} with sources {:?}", entry.name, entry.sources);
                report.skipped.push(entry);
                continue;
            }

            // INVARIANT: Never clone two jobs into the same directory.
            if let Some(owner) = claimed.get(&entry.project_name) {
                info!(
                    "skip {:?} (branch {:?}), project {:?} already installed by {owner:?}",
                    entry.name, entry.branch, entry.project_name
                );
                report.duplicates.push(entry);
                continue;
            }
            claimed.insert(entry.project_name.clone(), entry.name.clone());

            let vcs = Arc::clone(&self.vcs);
            let path = base.join(&entry.project_name);
            let url = entry.url.clone();
            let branch = entry.branch.clone();
            names.push(entry.name);
            jobs.push(tokio::task::spawn_blocking(move || {
                vcs.clone_or_update(&url, &path, branch.as_deref())
            }));
        }

        let mut failed = 0;
        for (name, result) in names.into_iter().zip(join_all(jobs).await) {
            match result {
                Ok(Ok(outcome)) => report.installed.push((name, outcome)),
                Ok(Err(err)) => {
                    error!("failed to install {name:?}: {err}");
                    failed += 1;
                }
                Err(err) => {
                    error!("install job of {name:?} did not finish: {err}");
                    failed += 1;
                }
            }
        }

        if failed > 0 {
            return Err(StoreError::InstallFailed {
                failed,
                total: failed + report.installed.len(),
            });
        }

        info!(
            "installed {} framework(s), skipped {} local and {} duplicate entr(ies)",
            report.installed.len(),
            report.skipped.len(),
            report.duplicates.len()
        );

        Ok(report)
    }

    /// Switch installed framework to a branch.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::LocalEntry`] if entry is a local pseudo-entry.
    /// - Return [`StoreError::NotInstalled`] if framework was never installed.
    /// - Return [`StoreError::Vcs`] if branch cannot be checked out.
    #[instrument(skip(self), level = "debug")]
    pub fn checkout(&self, name: &str, branch: &str) -> Result<()> {
        let path = self.installed_path(name)?;
        self.vcs.checkout(&path, branch)?;
        info!("switched {name:?} to branch {branch}");
        Ok(())
    }

    /// Fast-forward installed framework from its remote.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::LocalEntry`] if entry is a local pseudo-entry.
    /// - Return [`StoreError::NotInstalled`] if framework was never installed.
    /// - Return [`StoreError::Vcs`] if pull fails.
    #[instrument(skip(self), level = "debug")]
    pub fn pull(&self, name: &str) -> Result<Pull> {
        let path = self.installed_path(name)?;
        let pull = self.vcs.pull(&path)?;
        match pull {
            Pull::UpToDate => info!("{name:?} is already up to date"),
            Pull::FastForward => info!("updated {name:?}"),
        }
        Ok(pull)
    }

    fn installed_path(&self, name: &str) -> Result<PathBuf> {
        let catalog = self.catalog()?;
        let entry = catalog
            .find_exact(name)
            .ok_or_else(|| NotFound { name: name.into() })?;

        if entry.is_local() {
            return Err(StoreError::LocalEntry { name: name.into() });
        }

        let path = self.layout.framework_base_dir().join(&entry.project_name);
        if !path.exists() {
            return Err(StoreError::NotInstalled {
                name: name.into(),
                path,
            });
        }

        Ok(path)
    }

    fn project_root(&self) -> std::result::Result<PathBuf, VcsError> {
        self.vcs.find_repository_root(self.layout.root())
    }
}

fn log_extensions(resolution: &Resolution) {
    if resolution.extensions().is_empty() {
        return;
    }

    let names = resolution
        .extensions()
        .iter()
        .map(|entry| entry.name.as_str())
        .collect::<Vec<_>>();
    info!("{:?} extends {names:?}", resolution.main().name);
}

/// Render install path of a listing for humans.
pub fn install_path_note(listing_path: &Path, mode: Mode) -> String {
    match mode {
        Mode::Local => format!("install path: {} (local mode)", listing_path.display()),
        Mode::Standard => format!("install path: {}", listing_path.display()),
    }
}

/// Framework store error types.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Project has no driving configuration.
    #[error(transparent)]
    NotConfigured(#[from] NotConfigured),

    /// Catalog cannot be loaded.
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    /// Name is not in catalog.
    #[error(transparent)]
    NotFound(#[from] NotFound),

    /// Operation makes no sense for a local pseudo-entry.
    #[error("{name:?} is a local entry, its sources live in the project itself")]
    LocalEntry { name: String },

    /// Framework has not been cloned yet.
    #[error("{name:?} is not installed at {:?}, run 'driving git-install {name}' first", path.display())]
    NotInstalled { name: String, path: PathBuf },

    /// Some install jobs failed.
    #[error("{failed} of {total} framework(s) failed to install")]
    InstallFailed { failed: usize, total: usize },

    /// Version control failure.
    #[error(transparent)]
    Vcs(#[from] VcsError),

    /// File system failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Friendly result alias :3
pub type Result<T, E = StoreError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vcs::fake::FakeVcs;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;
    use std::fs;

    const MANIFEST: &str = r#"[
        {"name": "app", "project_name": "app", "url": "https://x/app.git", "branch": "dev",
         "sources": ["src"], "extends": ["lib", "me", "ghost"]},
        {"name": "lib", "project_name": "lib", "url": "https://x/lib.git", "sources": ["lib", "src"]},
        {"name": "me", "project_name": "__local__", "url": "__local__", "branch": "__local__",
         "sources": ["docs"]}
    ]"#;

    type Setup = (PathBuf, FrameworkStore<FakeVcs>, Arc<FakeVcs>);

    fn setup(vcs: FakeVcs) -> anyhow::Result<Setup> {
        setup_with(vcs, MANIFEST)
    }

    fn setup_with(vcs: FakeVcs, manifest: &str) -> anyhow::Result<Setup> {
        let root = std::env::current_dir()?;
        fs::create_dir_all(root.join(".driving/ai-docs"))?;
        fs::write(root.join(".driving/ai-docs/gitlist.json"), manifest)?;
        let vcs = Arc::new(vcs);
        let store = FrameworkStore::new(Layout::discover(&root), Arc::clone(&vcs));
        Ok((root, store, vcs))
    }

    fn names(entries: &[Entry]) -> Vec<&str> {
        entries.iter().map(|entry| entry.name.as_str()).collect()
    }

    #[sealed_test]
    fn list_whole_catalog_or_resolution() -> anyhow::Result<()> {
        let (_, store, _) = setup(FakeVcs::default())?;
        assert_eq!(names(&store.list(None)?), vec!["app", "lib", "me"]);
        assert_eq!(names(&store.list(Some("app"))?), vec!["app", "lib", "me"]);
        assert_eq!(names(&store.list(Some("lib"))?), vec!["lib"]);
        assert!(matches!(store.list(Some("nope")), Err(StoreError::NotFound(_))));
        Ok(())
    }

    #[sealed_test]
    fn listing_materializes_sources() -> anyhow::Result<()> {
        let (root, store, _) = setup(FakeVcs::default())?;
        let listing = store.listing(Some("app"))?;
        let base = root.join(".driving/submodules");
        let sources = listing
            .frameworks
            .iter()
            .map(|view| view.sources.clone())
            .collect::<Vec<_>>();
        assert_eq!(
            sources,
            vec![
                vec![format!("{}/app/src", base.display())],
                vec![
                    format!("{}/lib/lib", base.display()),
                    format!("{}/lib/src", base.display())
                ],
                vec!["/proj/docs".to_string()],
            ]
        );
        assert_eq!(listing.install_path, base.display().to_string());
        assert_eq!(listing.mode, Mode::Standard);
        Ok(())
    }

    #[sealed_test]
    fn sources_merges_resolution() -> anyhow::Result<()> {
        let (root, store, _) = setup(FakeVcs::default())?;
        let base = root.join(".driving/submodules");
        let result = store.sources("app")?;
        assert_eq!(result.name, "app");
        assert_eq!(result.branch.as_deref(), Some("dev"));
        assert_eq!(
            result.sources,
            vec![
                format!("{}/app/src", base.display()),
                format!("{}/lib/lib", base.display()),
                format!("{}/lib/src", base.display()),
                "/proj/docs".to_string(),
            ]
        );
        Ok(())
    }

    #[sealed_test]
    fn install_clones_remote_entries_and_skips_local() -> anyhow::Result<()> {
        let (root, store, vcs) = setup(FakeVcs::default())?;
        let report = tokio::runtime::Runtime::new()?.block_on(store.install("app"))?;
        let base = root.join(".driving/submodules");
        assert!(base.is_dir());
        assert_eq!(
            report.installed,
            vec![
                ("app".to_string(), Outcome::Cloned),
                ("lib".to_string(), Outcome::Cloned)
            ]
        );
        assert_eq!(names(&report.skipped), vec!["me"]);
        assert!(report.duplicates.is_empty());
        assert_eq!(
            vcs.calls(),
            vec![
                format!("clone https://x/app.git {}/app Some(\"dev\")", base.display()),
                format!("clone https://x/lib.git {}/lib None", base.display()),
            ]
        );
        Ok(())
    }

    #[sealed_test]
    fn install_reports_entries_sharing_project_directory() -> anyhow::Result<()> {
        let (root, store, vcs) = setup_with(
            FakeVcs::default(),
            r#"[
                {"name": "app", "project_name": "shared", "url": "https://x/app.git",
                 "branch": "main", "extends": ["app-next"]},
                {"name": "app-next", "project_name": "shared", "url": "https://x/app.git",
                 "branch": "next"}
            ]"#,
        )?;
        let report = tokio::runtime::Runtime::new()?.block_on(store.install("app"))?;
        let base = root.join(".driving/submodules");
        assert_eq!(report.installed, vec![("app".to_string(), Outcome::Cloned)]);
        assert_eq!(names(&report.duplicates), vec!["app-next"]);
        assert_eq!(report.duplicates[0].branch.as_deref(), Some("next"));
        assert_eq!(
            vcs.calls(),
            vec![format!("clone https://x/app.git {}/shared Some(\"main\")", base.display())]
        );
        Ok(())
    }

    #[sealed_test]
    fn install_reports_failures_after_all_jobs() -> anyhow::Result<()> {
        let (_, store, vcs) = setup(FakeVcs {
            fail_url: Some("https://x/app.git".into()),
            ..Default::default()
        })?;
        let result = tokio::runtime::Runtime::new()?.block_on(store.install("app"));
        assert!(matches!(
            result,
            Err(StoreError::InstallFailed {
                failed: 1,
                total: 2
            })
        ));
        assert_eq!(vcs.calls().len(), 2);
        Ok(())
    }

    #[sealed_test]
    fn install_needs_configured_project() -> anyhow::Result<()> {
        let root = std::env::current_dir()?;
        let store = FrameworkStore::new(Layout::discover(&root), Arc::new(FakeVcs::default()));
        let result = tokio::runtime::Runtime::new()?.block_on(store.install("app"));
        assert!(matches!(result, Err(StoreError::NotConfigured(_))));
        Ok(())
    }

    #[sealed_test]
    fn checkout_and_pull_need_installed_remote_entry() -> anyhow::Result<()> {
        let (root, store, vcs) = setup(FakeVcs::default())?;
        assert!(matches!(
            store.checkout("lib", "dev"),
            Err(StoreError::NotInstalled { .. })
        ));
        assert!(matches!(store.pull("me"), Err(StoreError::LocalEntry { .. })));
        assert!(matches!(store.pull("ghost"), Err(StoreError::NotFound(_))));

        let lib = root.join(".driving/submodules/lib");
        fs::create_dir_all(&lib)?;
        store.checkout("lib", "main")?;
        assert_eq!(store.pull("lib")?, Pull::FastForward);
        assert_eq!(
            vcs.calls(),
            vec![
                format!("checkout {} main", lib.display()),
                format!("pull {}", lib.display()),
            ]
        );
        Ok(())
    }

    #[test]
    fn install_path_note_tags_local_mode() {
        assert_eq!(
            install_path_note(Path::new("/p/submodules"), Mode::Local),
            "install path: /p/submodules (local mode)"
        );
        assert_eq!(
            install_path_note(Path::new("/p/.driving/submodules"), Mode::Standard),
            "install path: /p/.driving/submodules"
        );
    }
}
