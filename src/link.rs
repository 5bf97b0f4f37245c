// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Attach driving configuration to a host project.
//!
//! In standard mode the configuration repository is added as a Git submodule
//! at `.driving` in the current directory, and its `ai-docs` directory is
//! exposed next to it through a relative symlink. Nothing is attached in
//! local mode, because the project already is the configuration root.

use crate::{
    config::{EnvFile, Settings, REPO_URL_VAR},
    path::{DOCS_DIR, DRIVING_DIR, MANIFEST_FILE, SUBMODULES_DIR},
    vcs::{Vcs, VcsError},
};

use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::{info, instrument, warn};

/// Header written on top of project `.env` file.
pub const ENV_HEADER: [&str; 2] = [
    "Driving CLI configuration",
    "This file holds project configuration and may be committed",
];

/// Entries of `.driving` that do not count as real configuration content.
const NON_ESSENTIAL: [&str; 4] = [".git", ".DS_Store", SUBMODULES_DIR, ".gitignore"];

/// What installing the configuration submodule did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Install {
    /// Project is in local mode, nothing to attach.
    LocalMode,

    /// Submodule was already in place.
    Ready,

    /// Registered submodule was initialized.
    Initialized,

    /// Submodule was newly added.
    Added,
}

/// Attach and detach configuration submodule in a directory.
#[derive(Debug, Clone)]
pub struct Linker<V: Vcs> {
    cwd: PathBuf,
    vcs: Arc<V>,
}

impl<V: Vcs> Linker<V> {
    /// Construct new linker working in target directory.
    pub fn new(cwd: impl Into<PathBuf>, vcs: Arc<V>) -> Self {
        Self {
            cwd: cwd.into(),
            vcs,
        }
    }

    /// Add configuration repository as submodule, or finish a partial install.
    ///
    /// URL given through `url` wins over [`Settings::repo_url`], and is saved
    /// into the `.env` file of the current directory for later runs.
    ///
    /// # Errors
    ///
    /// - Return [`LinkError::NoUrl`] if no repository URL is known.
    /// - Return [`LinkError::Vcs`] if current directory is not inside a Git
    ///   working tree, or a submodule command fails.
    /// - Return [`LinkError::StrayDirectory`] if `.driving` is an empty
    ///   directory that no submodule claims.
    /// - Return [`LinkError::Uninitialized`] if `.driving` is registered but
    ///   missing.
    #[instrument(skip(self, settings), level = "debug")]
    pub fn install(&self, url: Option<&str>, settings: &Settings) -> Result<Install> {
        let repo_url = url
            .map(ToString::to_string)
            .or_else(|| settings.repo_url.clone())
            .ok_or(LinkError::NoUrl)?;

        if self.cwd.join(MANIFEST_FILE).exists() {
            info!("found {MANIFEST_FILE} in current directory, project is in local mode");
            info!("nothing to install, use 'driving git-list' and 'driving git-install' directly");
            return Ok(Install::LocalMode);
        }

        let git_root = self.vcs.find_repository_root(&self.cwd)?;
        let submodule = self.submodule_path(&git_root);
        let registered = is_registered(&git_root, &submodule)?;
        let driving_dir = self.cwd.join(DRIVING_DIR);

        let install = if driving_dir.exists() {
            if has_essential_content(&driving_dir)? {
                info!("{DRIVING_DIR} already exists");
                Install::Ready
            } else if registered {
                warn!("{DRIVING_DIR} is empty but registered, fetching its content");
                self.vcs.init_submodule(&git_root, &submodule)?;
                Install::Initialized
            } else {
                return Err(LinkError::StrayDirectory { path: driving_dir });
            }
        } else if registered {
            return Err(LinkError::Uninitialized { submodule });
        } else {
            info!("add {repo_url} as submodule {:?}", submodule.display());
            self.vcs.add_submodule(&git_root, &repo_url, &submodule)?;
            fs::write(
                driving_dir.join(".gitignore"),
                "# framework repositories, local only\nsubmodules/\n",
            )?;
            Install::Added
        };

        if let Some(url) = url {
            self.save_repo_url(url)?;
        }

        self.link_docs()?;

        if install == Install::Added {
            info!(
                "next: commit .gitmodules and {} then run 'driving git-list'",
                submodule.display()
            );
        }

        Ok(install)
    }

    /// Remove configuration submodule.
    ///
    /// Returns false if project is in local mode and there was nothing to do.
    ///
    /// # Errors
    ///
    /// - Return [`LinkError::NotInstalled`] if no submodule is registered.
    /// - Return [`LinkError::Vcs`] if submodule cannot be removed.
    #[instrument(skip(self), level = "debug")]
    pub fn uninstall(&self) -> Result<bool> {
        if self.cwd.join(MANIFEST_FILE).exists() {
            info!("found {MANIFEST_FILE} in current directory, project is in local mode");
            return Ok(false);
        }

        let git_root = self.vcs.find_repository_root(&self.cwd)?;
        let submodule = self.submodule_path(&git_root);
        if !is_registered(&git_root, &submodule)? {
            return Err(LinkError::NotInstalled { submodule });
        }

        warn!("removing {DRIVING_DIR} together with every installed framework");
        self.vcs.remove_submodule(&git_root, &submodule)?;
        info!("removed submodule, commit .gitmodules to finish");

        Ok(true)
    }

    /// Path of configuration submodule relative to Git root.
    fn submodule_path(&self, git_root: &Path) -> PathBuf {
        self.cwd
            .strip_prefix(git_root)
            .map(|relative| relative.join(DRIVING_DIR))
            .unwrap_or_else(|_| PathBuf::from(DRIVING_DIR))
    }

    fn save_repo_url(&self, url: &str) -> Result<()> {
        let path = self.cwd.join(".env");
        let mut env = EnvFile::load_or_default(&path)?;
        env.set(REPO_URL_VAR, url);
        env.with_header(ENV_HEADER).save(&path)?;
        info!("saved {REPO_URL_VAR}={url} into {:?}", path.display());

        let gitignore = self.cwd.join(".gitignore");
        if gitignore.exists() && fs::read_to_string(&gitignore)?.lines().any(|line| line == ".env") {
            warn!(".gitignore lists .env, remove it there so the project configuration gets committed");
        }

        Ok(())
    }

    /// Expose `.driving/ai-docs` as `ai-docs` in the current directory.
    fn link_docs(&self) -> Result<()> {
        let link = self.cwd.join(DOCS_DIR);
        let relative = Path::new(DRIVING_DIR).join(DOCS_DIR);
        let target = self.cwd.join(&relative);

        if !target.exists() {
            warn!("{:?} does not exist, skip linking", target.display());
            return Ok(());
        }

        if let Ok(metadata) = fs::symlink_metadata(&link) {
            if metadata.is_symlink() && link.canonicalize().ok() == Some(target.canonicalize()?) {
                info!("{DOCS_DIR} already links to {:?}", relative.display());
                return Ok(());
            }

            warn!("replace existing {DOCS_DIR} with symlink");
            if metadata.is_dir() {
                fs::remove_dir_all(&link)?;
            } else {
                fs::remove_file(&link)?;
            }
        }

        symlink_dir(&relative, &link)?;
        info!("linked {DOCS_DIR} -> {:?}", relative.display());

        Ok(())
    }
}

#[cfg(unix)]
fn symlink_dir(original: &Path, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(original, link)
}

#[cfg(windows)]
fn symlink_dir(original: &Path, link: &Path) -> std::io::Result<()> {
    std::os::windows::fs::symlink_dir(original, link)
}

/// Check if `.gitmodules` at Git root registers target submodule path.
pub fn is_registered(git_root: &Path, submodule: &Path) -> Result<bool> {
    let gitmodules = git_root.join(".gitmodules");
    if !gitmodules.exists() {
        return Ok(false);
    }

    let header = format!("[submodule \"{}\"]", submodule.display());
    Ok(fs::read_to_string(gitmodules)?.contains(&header))
}

/// Check if directory holds anything besides Git and build leftovers.
pub fn has_essential_content(dir: &Path) -> Result<bool> {
    for entry in fs::read_dir(dir)? {
        let name = entry?.file_name();
        if !NON_ESSENTIAL.iter().any(|skip| name == *skip) {
            return Ok(true);
        }
    }

    Ok(false)
}

/// Link error types.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    /// No repository URL was given or configured.
    #[error(
        "no driving repository URL given, do one of the following:\n  \
           1. pass it directly: driving install --url <url>\n  \
           2. export {REPO_URL_VAR}=<url>\n  \
           3. add {REPO_URL_VAR}=<url> to .env in the project root"
    )]
    NoUrl,

    /// Directory exists without content and without registration.
    #[error(
        "{:?} exists but is empty and not a registered submodule, remove it and retry",
        path.display()
    )]
    StrayDirectory { path: PathBuf },

    /// Submodule is registered but was never checked out.
    #[error(
        "submodule {path:?} is registered in .gitmodules, initialize it with \
         'git submodule update --init {path}'",
        path = submodule.display()
    )]
    Uninitialized { submodule: PathBuf },

    /// No configuration submodule to remove.
    #[error("no {:?} submodule registered in this directory", submodule.display())]
    NotInstalled { submodule: PathBuf },

    /// Project `.env` cannot be updated.
    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),

    /// Version control failure.
    #[error(transparent)]
    Vcs(#[from] VcsError),

    /// File system failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Friendly result alias :3
pub type Result<T, E = LinkError> = std::result::Result<T, E>;
