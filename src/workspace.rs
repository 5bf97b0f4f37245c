// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration repository commands.
//!
//! The configuration root is a Git repository of its own: the `.driving`
//! submodule in standard mode, or the project itself in local mode. These
//! commands keep it in sync with its remote.

use crate::{
    path::{Layout, NotConfigured},
    vcs::{DirtyFiles, Pull, Vcs, VcsError},
};

use git2::Oid;
use std::{
    fmt::Write as _,
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::{info, instrument, warn};

/// Branches tried in order to leave a detached HEAD.
pub const FALLBACK_BRANCHES: [&str; 2] = ["main", "master"];

/// Commands over the configuration repository of a project.
#[derive(Debug, Clone)]
pub struct Workspace<V: Vcs> {
    layout: Layout,
    vcs: Arc<V>,
}

impl<V: Vcs> Workspace<V> {
    /// Construct new workspace for a project layout.
    pub fn new(layout: Layout, vcs: Arc<V>) -> Self {
        Self { layout, vcs }
    }

    /// Bring configuration repository up to date with its remote.
    ///
    /// Refuses to touch a working tree with uncommitted changes. A detached
    /// HEAD is moved onto one of the [`FALLBACK_BRANCHES`] first.
    ///
    /// # Errors
    ///
    /// - Return [`WorkspaceError::Dirty`] if there are uncommitted changes.
    /// - Return [`WorkspaceError::NoRemote`] if no remote is configured.
    /// - Return [`WorkspaceError::NoBranch`] if HEAD is detached and no
    ///   fallback branch exists.
    /// - Return [`WorkspaceError::Pull`] if fetch or fast-forward fails.
    #[instrument(skip(self), level = "debug")]
    pub fn pull(&self) -> Result<Pull> {
        let config_root = self.config_root()?;

        let dirty = self.vcs.dirty_files(&config_root)?;
        if !dirty.is_clean() {
            return Err(WorkspaceError::Dirty {
                listing: dirty_listing(&dirty),
            });
        }

        if !self.vcs.has_remote(&config_root)? {
            return Err(WorkspaceError::NoRemote);
        }

        let branch = match self.vcs.current_branch(&config_root)? {
            Some(branch) => branch,
            None => self.leave_detached_head(&config_root)?,
        };
        info!("current branch: {branch}");

        let pull = self
            .vcs
            .pull(&config_root)
            .map_err(|err| WorkspaceError::Pull {
                hint: pull_hint(&err, &config_root),
                source: err,
            })?;

        match pull {
            Pull::UpToDate => info!("already up to date"),
            Pull::FastForward => info!("updated {:?}", config_root.display()),
        }

        Ok(pull)
    }

    /// Stage every change of configuration repository and commit it.
    ///
    /// # Errors
    ///
    /// - Return [`WorkspaceError::Vcs`] if changes cannot be committed.
    #[instrument(skip(self), level = "debug")]
    pub fn commit(&self, message: &str) -> Result<Oid> {
        let config_root = self.config_root()?;
        let oid = self.vcs.commit_all(&config_root, message)?;
        info!("committed {oid}: {message}");
        info!("run 'driving push' to publish it");
        Ok(oid)
    }

    /// Push current branch of configuration repository to its remote.
    ///
    /// # Errors
    ///
    /// - Return [`WorkspaceError::Rejected`] if remote refused the update.
    /// - Return [`WorkspaceError::Vcs`] if push fails otherwise.
    #[instrument(skip(self), level = "debug")]
    pub fn push(&self) -> Result<()> {
        let config_root = self.config_root()?;
        self.vcs.push(&config_root).map_err(|err| match err {
            VcsError::Rejected { reason } => WorkspaceError::Rejected { reason },
            err => WorkspaceError::Vcs(err),
        })?;

        info!("pushed {:?}", config_root.display());
        if !self.layout.mode().is_local() {
            info!("remember to commit the updated submodule in the project root");
        }

        Ok(())
    }

    fn config_root(&self) -> Result<PathBuf> {
        self.layout.check_environment()?;
        let config_root = self.layout.config_root();
        if !config_root.exists() {
            return Err(WorkspaceError::MissingConfigRoot { path: config_root });
        }

        Ok(config_root)
    }

    fn leave_detached_head(&self, config_root: &Path) -> Result<String> {
        warn!("HEAD is detached, switching to a default branch");
        for branch in FALLBACK_BRANCHES {
            match self.vcs.checkout(config_root, branch) {
                Ok(()) => {
                    info!("switched to branch {branch}");
                    return Ok(branch.to_string());
                }
                Err(VcsError::BranchNotFound { .. }) => continue,
                Err(err) => return Err(err.into()),
            }
        }

        Err(WorkspaceError::NoBranch {
            path: config_root.to_path_buf(),
        })
    }
}

/// Render uncommitted changes for humans.
pub fn dirty_listing(dirty: &DirtyFiles) -> String {
    let mut listing = String::new();
    if !dirty.untracked.is_empty() {
        listing.push_str("untracked files:\n");
        for file in &dirty.untracked {
            let _ = writeln!(listing, "  - {}", file.display());
        }
    }

    if !dirty.modified.is_empty() {
        listing.push_str("modified files:\n");
        for file in &dirty.modified {
            let _ = writeln!(listing, "  - {}", file.display());
        }
    }

    listing
}

/// Suggest a way out of a failed pull.
pub fn pull_hint(error: &VcsError, config_root: &Path) -> String {
    let message = error.to_string();
    match error {
        VcsError::Fetch { .. } if message.contains("couldn't find remote ref") => {
            "remote branch does not exist, check git configuration of the repository".into()
        }
        VcsError::Diverged { .. } | VcsError::Git2(_) if message.contains("unrelated") => format!(
            "histories are unrelated, merge manually with \
             'git -C {} pull --allow-unrelated-histories'",
            config_root.display()
        ),
        VcsError::Diverged { .. } => format!(
            "local branch has commits origin lacks, merge manually with 'git -C {} pull'",
            config_root.display()
        ),
        VcsError::Git2(err) if err.class() == git2::ErrorClass::Checkout => {
            "local changes would be overwritten, commit or discard them first".into()
        }
        VcsError::DetachedHead => format!(
            "HEAD is detached, run 'git -C {} checkout main' (or master)",
            config_root.display()
        ),
        _ => format!(
            "try updating manually with 'git -C {} status' and 'git -C {} pull'",
            config_root.display(),
            config_root.display()
        ),
    }
}

/// Workspace error types.
#[derive(Debug, thiserror::Error)]
pub enum WorkspaceError {
    /// Project has no driving configuration.
    #[error(transparent)]
    NotConfigured(#[from] NotConfigured),

    /// Configuration repository is missing.
    #[error(
        "configuration directory {:?} does not exist, run 'driving install' first",
        path.display()
    )]
    MissingConfigRoot { path: PathBuf },

    /// Working tree has uncommitted changes.
    #[error(
        "uncommitted changes found:\n{listing}\
         commit them with 'driving commit <message>', or discard them with \
         'git reset --hard && git clean -fd'"
    )]
    Dirty { listing: String },

    /// Repository has no remote.
    #[error("no remote repository configured")]
    NoRemote,

    /// HEAD is detached and no fallback branch exists.
    #[error(
        "cannot switch to main or master, pick a branch manually with 'git -C {} checkout <branch>'",
        path.display()
    )]
    NoBranch { path: PathBuf },

    /// Pull failed.
    #[error("failed to pull: {source}\nhint: {hint}")]
    Pull {
        #[source]
        source: VcsError,
        hint: String,
    },

    /// Remote refused pushed update.
    #[error("push rejected ({reason}), run 'driving pull' and resolve conflicts first")]
    Rejected { reason: String },

    /// Version control failure.
    #[error(transparent)]
    Vcs(#[from] VcsError),
}

/// Friendly result alias :3
pub type Result<T, E = WorkspaceError> = std::result::Result<T, E>;
