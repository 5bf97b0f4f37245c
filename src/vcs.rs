// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Version control collaborator.
//!
//! Everything driving needs from Git goes through the [`Vcs`] trait, so the
//! command logic never touches libgit2 directly and can be exercised against
//! a fake. [`Git2Vcs`] is the real implementation.
//!
//! # Repository Operations
//!
//! Clone, fetch, checkout, commit, and push are done through libgit2. Remote
//! operations share one credential flow: if the remote asks for credentials,
//! the user is prompted for them while any progress bar is suspended.
//!
//! Pulling is fetch plus fast-forward. A branch that diverged from its remote
//! counterpart is reported, never merged.
//!
//! # Submodule Operations
//!
//! Submodule management is delegated to the Git binary, the same way a user
//! would do it by hand. Libgit2 has no equivalent of `git submodule deinit`
//! or of staging a submodule removal.

use auth_git2::{GitAuthenticator, Prompter};
use git2::{
    build::{CheckoutBuilder, RepoBuilder},
    BranchType, Config, FetchOptions, IndexAddOption, Oid, PushOptions, RemoteCallbacks,
    Repository, StatusOptions,
};
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use inquire::{Password, Text};
use std::{
    cell::RefCell,
    ffi::OsStr,
    path::{Path, PathBuf},
    process::Command,
    time,
};
use tracing::{debug, info, instrument, warn};

/// What happened to a repository during clone or update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Repository did not exist and was cloned.
    Cloned,

    /// Repository existed and was brought up to date.
    Updated(Pull),
}

/// Outcome of pulling a branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pull {
    /// Nothing new on remote.
    UpToDate,

    /// Local branch moved forward to remote.
    FastForward,
}

/// Uncommitted changes of a working tree.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DirtyFiles {
    /// Files Git does not track yet.
    pub untracked: Vec<PathBuf>,

    /// Tracked files with staged or unstaged changes.
    pub modified: Vec<PathBuf>,
}

impl DirtyFiles {
    /// Check if working tree is clean.
    pub fn is_clean(&self) -> bool {
        self.untracked.is_empty() && self.modified.is_empty()
    }
}

/// Version control capabilities.
pub trait Vcs: Send + Sync + 'static {
    /// Clone repository into path, or update it if path already exists.
    fn clone_or_update(&self, url: &str, path: &Path, branch: Option<&str>) -> Result<Outcome>;

    /// Find root of working tree that contains target path.
    fn find_repository_root(&self, start: &Path) -> Result<PathBuf>;

    /// Switch repository to a branch.
    fn checkout(&self, path: &Path, branch: &str) -> Result<()>;

    /// Fetch and fast-forward current branch from origin.
    fn pull(&self, path: &Path) -> Result<Pull>;

    /// Name of current branch, or nothing if HEAD is detached.
    fn current_branch(&self, path: &Path) -> Result<Option<String>>;

    /// Check if repository has any remote configured.
    fn has_remote(&self, path: &Path) -> Result<bool>;

    /// List uncommitted changes.
    fn dirty_files(&self, path: &Path) -> Result<DirtyFiles>;

    /// Stage every change and commit it.
    fn commit_all(&self, path: &Path, message: &str) -> Result<Oid>;

    /// Push current branch to origin.
    fn push(&self, path: &Path) -> Result<()>;

    /// Register a new submodule.
    fn add_submodule(&self, git_root: &Path, url: &str, submodule: &Path) -> Result<()>;

    /// Initialize and check out a registered submodule.
    fn init_submodule(&self, git_root: &Path, submodule: &Path) -> Result<()>;

    /// Unregister a submodule and delete its working tree.
    fn remove_submodule(&self, git_root: &Path, submodule: &Path) -> Result<()>;
}

/// Version control through libgit2.
#[derive(Debug, Clone)]
pub struct Git2Vcs {
    progress: MultiProgress,
}

impl Default for Git2Vcs {
    fn default() -> Self {
        Self::new(MultiProgress::new())
    }
}

impl Git2Vcs {
    /// Construct new libgit2 collaborator drawing progress on target.
    pub fn new(progress: MultiProgress) -> Self {
        Self { progress }
    }

    /// Construct new libgit2 collaborator that draws no progress.
    pub fn hidden() -> Self {
        Self::new(MultiProgress::with_draw_target(ProgressDrawTarget::hidden()))
    }

    /// Clone repository with progress bar and credential prompts.
    #[instrument(skip(self), level = "debug")]
    fn clone_repository(&self, url: &str, path: &Path, branch: Option<&str>) -> Result<()> {
        let style = ProgressStyle::with_template(
            "{elapsed_precise:.green}  {msg:<50}  [{wide_bar:.yellow/blue}]",
        )?
        .progress_chars("-Cco.");
        let bar = self.progress.add(ProgressBar::no_length());
        bar.set_style(style);
        bar.set_message(url.to_string());
        bar.enable_steady_tick(time::Duration::from_millis(100));

        let prompter = IndicatifPrompter::new(bar);
        let authenticator = GitAuthenticator::default().set_prompter(prompter.clone());
        let config = Config::open_default()?;

        let mut throttle = time::Instant::now();
        let mut rc = RemoteCallbacks::new();
        rc.credentials(authenticator.credentials(&config));
        rc.transfer_progress(|progress| {
            let stats = progress.to_owned();
            if throttle.elapsed() > time::Duration::from_millis(10) {
                throttle = time::Instant::now();
                prompter.bar.set_length(stats.total_objects() as u64);
                prompter.bar.set_position(stats.received_objects() as u64);
            }
            true
        });

        let mut fo = FetchOptions::new();
        fo.remote_callbacks(rc);
        let mut builder = RepoBuilder::new();
        builder.fetch_options(fo);
        if let Some(branch) = branch {
            builder.branch(branch);
        }

        let result = builder.clone(url, path);
        prompter.bar.finish_and_clear();
        result.map_err(|err| VcsError::Clone {
            source: err,
            url: url.to_string(),
        })?;

        Ok(())
    }

    /// Remote callbacks that only ask for credentials.
    fn auth_callbacks<'a>(
        &self,
        authenticator: &'a GitAuthenticator,
        config: &'a Config,
    ) -> RemoteCallbacks<'a> {
        let mut rc = RemoteCallbacks::new();
        rc.credentials(authenticator.credentials(config));
        rc
    }

    fn authenticator(&self) -> GitAuthenticator {
        let bar = self.progress.add(ProgressBar::hidden());
        GitAuthenticator::default().set_prompter(IndicatifPrompter::new(bar))
    }
}

impl Vcs for Git2Vcs {
    #[instrument(skip(self), level = "debug")]
    fn clone_or_update(&self, url: &str, path: &Path, branch: Option<&str>) -> Result<Outcome> {
        if !path.exists() {
            info!("clone {url} into {:?}", path.display());
            self.clone_repository(url, path, branch)?;
            return Ok(Outcome::Cloned);
        }

        info!("update existing repository {:?}", path.display());
        if let Some(branch) = branch {
            match self.checkout(path, branch) {
                Ok(()) => info!("switched to branch {branch}"),
                Err(VcsError::BranchNotFound { .. }) => {
                    warn!("branch {branch} does not exist, keeping current branch")
                }
                Err(error) => return Err(error),
            }
        }

        Ok(Outcome::Updated(self.pull(path)?))
    }

    fn find_repository_root(&self, start: &Path) -> Result<PathBuf> {
        let repository = Repository::discover(start).map_err(|_| VcsError::NotARepository {
            path: start.to_path_buf(),
        })?;

        // INVARIANT: Bare repositories have no working tree to be rooted in.
        repository
            .workdir()
            .map(|workdir| workdir.components().collect::<PathBuf>())
            .ok_or_else(|| VcsError::NotARepository {
                path: start.to_path_buf(),
            })
    }

    #[instrument(skip(self), level = "debug")]
    fn checkout(&self, path: &Path, branch: &str) -> Result<()> {
        let repository = Repository::open(path)?;
        let local = match repository.find_branch(branch, BranchType::Local) {
            Ok(local) => local,
            Err(_) => {
                let upstream = format!("origin/{branch}");
                let remote = repository
                    .find_branch(&upstream, BranchType::Remote)
                    .map_err(|_| VcsError::BranchNotFound {
                        branch: branch.to_string(),
                    })?;
                let commit = remote.get().peel_to_commit()?;
                let mut local = repository.branch(branch, &commit, false)?;
                local.set_upstream(Some(&upstream))?;
                local
            }
        };

        let refname = local
            .get()
            .name()
            .ok_or_else(|| VcsError::BranchNotFound {
                branch: branch.to_string(),
            })?
            .to_string();
        let target = repository.revparse_single(&refname)?;
        repository.checkout_tree(&target, Some(CheckoutBuilder::new().safe()))?;
        repository.set_head(&refname)?;
        debug!("checked out {refname}");

        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    fn pull(&self, path: &Path) -> Result<Pull> {
        let repository = Repository::open(path)?;
        let branch = self
            .current_branch(path)?
            .ok_or(VcsError::DetachedHead)?;
        let mut remote = repository
            .find_remote("origin")
            .map_err(|_| VcsError::NoRemote)?;

        let authenticator = self.authenticator();
        let config = Config::open_default()?;
        let mut fo = FetchOptions::new();
        fo.remote_callbacks(self.auth_callbacks(&authenticator, &config));
        remote
            .fetch(&[branch.as_str()], Some(&mut fo), None)
            .map_err(|err| VcsError::Fetch {
                source: err,
                branch: branch.clone(),
            })?;

        let fetch_head = repository.find_reference("FETCH_HEAD")?;
        let fetch_commit = repository.reference_to_annotated_commit(&fetch_head)?;
        let (analysis, _) = repository.merge_analysis(&[&fetch_commit])?;

        if analysis.is_up_to_date() {
            debug!("{branch} is up to date");
            return Ok(Pull::UpToDate);
        }

        if !analysis.is_fast_forward() {
            return Err(VcsError::Diverged { branch });
        }

        // INVARIANT: Update working tree before moving the branch, so checkout
        // compares against the old HEAD and refuses to clobber local edits.
        let target = repository.find_object(fetch_commit.id(), None)?;
        repository.checkout_tree(&target, Some(CheckoutBuilder::new().safe()))?;

        let refname = format!("refs/heads/{branch}");
        let mut reference = repository.find_reference(&refname)?;
        reference.set_target(fetch_commit.id(), &format!("fast-forward {branch}"))?;
        repository.set_head(&refname)?;

        Ok(Pull::FastForward)
    }

    fn current_branch(&self, path: &Path) -> Result<Option<String>> {
        let repository = Repository::open(path)?;
        if repository.head_detached()? {
            return Ok(None);
        }

        let head = repository.head()?;
        Ok(head.shorthand().map(ToString::to_string))
    }

    fn has_remote(&self, path: &Path) -> Result<bool> {
        let repository = Repository::open(path)?;
        Ok(!repository.remotes()?.is_empty())
    }

    fn dirty_files(&self, path: &Path) -> Result<DirtyFiles> {
        let repository = Repository::open(path)?;
        let mut opts = StatusOptions::new();
        opts.include_untracked(true)
            .recurse_untracked_dirs(true)
            .include_ignored(false);

        let mut dirty = DirtyFiles::default();
        for entry in repository.statuses(Some(&mut opts))?.iter() {
            let Some(file) = entry.path().map(PathBuf::from) else {
                continue;
            };

            let status = entry.status();
            if status.is_wt_new() {
                dirty.untracked.push(file);
            } else if !status.is_ignored() {
                dirty.modified.push(file);
            }
        }

        Ok(dirty)
    }

    #[instrument(skip(self), level = "debug")]
    fn commit_all(&self, path: &Path, message: &str) -> Result<Oid> {
        let repository = Repository::open(path)?;
        let mut index = repository.index()?;
        index.add_all(["*"].iter(), IndexAddOption::DEFAULT, None)?;
        index.update_all(["*"].iter(), None)?;
        index.write()?;

        let tree = repository.find_tree(index.write_tree()?)?;
        let signature = repository.signature()?;

        // INVARIANT: First commit of an unborn branch has no parents.
        let parents = repository
            .head()
            .ok()
            .and_then(|head| head.peel_to_commit().ok())
            .into_iter()
            .collect::<Vec<_>>();
        let parents = parents.iter().collect::<Vec<_>>();

        Ok(repository.commit(
            Some("HEAD"),
            &signature,
            &signature,
            message,
            &tree,
            &parents,
        )?)
    }

    #[instrument(skip(self), level = "debug")]
    fn push(&self, path: &Path) -> Result<()> {
        let repository = Repository::open(path)?;
        let branch = self
            .current_branch(path)?
            .ok_or(VcsError::DetachedHead)?;
        let mut remote = repository
            .find_remote("origin")
            .map_err(|_| VcsError::NoRemote)?;

        let rejected = RefCell::new(None);
        let authenticator = self.authenticator();
        let config = Config::open_default()?;
        let mut rc = self.auth_callbacks(&authenticator, &config);
        rc.push_update_reference(|refname, status| {
            if let Some(status) = status {
                *rejected.borrow_mut() = Some(format!("{refname}: {status}"));
            }
            Ok(())
        });

        let mut po = PushOptions::new();
        po.remote_callbacks(rc);
        let refspec = format!("refs/heads/{branch}:refs/heads/{branch}");
        remote.push(&[refspec.as_str()], Some(&mut po))?;
        drop(po);

        if let Some(reason) = rejected.into_inner() {
            return Err(VcsError::Rejected { reason });
        }

        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    fn add_submodule(&self, git_root: &Path, url: &str, submodule: &Path) -> Result<()> {
        let output = syscall_non_interactive(
            "git",
            [
                OsStr::new("-C"),
                git_root.as_os_str(),
                OsStr::new("submodule"),
                OsStr::new("add"),
                OsStr::new(url),
                submodule.as_os_str(),
            ],
        )?;
        debug!("{output}");
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    fn init_submodule(&self, git_root: &Path, submodule: &Path) -> Result<()> {
        let output = syscall_non_interactive(
            "git",
            [
                OsStr::new("-C"),
                git_root.as_os_str(),
                OsStr::new("submodule"),
                OsStr::new("update"),
                OsStr::new("--init"),
                OsStr::new("--"),
                submodule.as_os_str(),
            ],
        )?;
        debug!("{output}");
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    fn remove_submodule(&self, git_root: &Path, submodule: &Path) -> Result<()> {
        let root = git_root.as_os_str();
        let output = syscall_non_interactive(
            "git",
            [
                OsStr::new("-C"),
                root,
                OsStr::new("submodule"),
                OsStr::new("deinit"),
                OsStr::new("-f"),
                OsStr::new("--"),
                submodule.as_os_str(),
            ],
        )?;
        debug!("{output}");

        let output = syscall_non_interactive(
            "git",
            [
                OsStr::new("-C"),
                root,
                OsStr::new("rm"),
                OsStr::new("-f"),
                OsStr::new("--"),
                submodule.as_os_str(),
            ],
        )?;
        debug!("{output}");

        // INVARIANT: Drop cached submodule gitdir so a later install starts clean.
        let gitdir = Repository::open(git_root)?.path().join("modules").join(submodule);
        if gitdir.exists() {
            std::fs::remove_dir_all(&gitdir).map_err(VcsError::Syscall)?;
        }

        Ok(())
    }
}

/// Git2 authentication prompter for progress bar.
#[derive(Debug, Clone)]
pub struct IndicatifPrompter {
    pub(crate) bar: ProgressBar,
}

impl IndicatifPrompter {
    /// Construct new progress bar authenticator.
    pub fn new(bar: ProgressBar) -> Self {
        Self { bar }
    }
}

impl Prompter for IndicatifPrompter {
    #[instrument(skip(self, url, _config), level = "debug")]
    fn prompt_username_password(
        &mut self,
        url: &str,
        _config: &git2::Config,
    ) -> Option<(String, String)> {
        info!("authentication required at {url}");
        self.bar.suspend(|| -> Option<(String, String)> {
            let username = Text::new("username").prompt().ok()?;
            let password = Password::new("password")
                .without_confirmation()
                .prompt()
                .ok()?;
            Some((username, password))
        })
    }

    #[instrument(skip(self, username, url, _config), level = "debug")]
    fn prompt_password(
        &mut self,
        username: &str,
        url: &str,
        _config: &git2::Config,
    ) -> Option<String> {
        info!("authentication required at {url} for user {username}");
        self.bar.suspend(|| -> Option<String> {
            Password::new("password")
                .without_confirmation()
                .prompt()
                .ok()
        })
    }

    #[instrument(skip(self, ssh_key_path, _config), level = "debug")]
    fn prompt_ssh_key_passphrase(
        &mut self,
        ssh_key_path: &Path,
        _config: &git2::Config,
    ) -> Option<String> {
        info!(
            "authentication required with ssh key at {}",
            ssh_key_path.display()
        );
        self.bar.suspend(|| -> Option<String> {
            Password::new("passphrase")
                .without_confirmation()
                .prompt()
                .ok()
        })
    }
}

fn syscall_non_interactive(
    cmd: impl AsRef<OsStr>,
    args: impl IntoIterator<Item = impl AsRef<OsStr>>,
) -> Result<String> {
    let output = Command::new(cmd.as_ref()).args(args).output()?;
    let stdout = String::from_utf8_lossy(output.stdout.as_slice()).into_owned();
    let stderr = String::from_utf8_lossy(output.stderr.as_slice()).into_owned();
    let mut message = String::new();

    if !stdout.is_empty() {
        message.push_str(format!("stdout: {stdout}").as_str());
    }

    if !stderr.is_empty() {
        message.push_str(format!("stderr: {stderr}").as_str());
    }

    // INVARIANT: Chomp trailing newlines.
    let message = message
        .strip_suffix("\r\n")
        .or(message.strip_suffix('\n'))
        .map(ToString::to_string)
        .unwrap_or(message);

    if !output.status.success() {
        return Err(VcsError::Syscall(std::io::Error::other(format!(
            "command {:?} failed:\n{message}",
            cmd.as_ref()
        ))));
    }

    Ok(message)
}

/// Version control error types.
#[derive(Debug, thiserror::Error)]
pub enum VcsError {
    /// Path is not inside a Git working tree.
    #[error("{:?} is not inside a git working tree", path.display())]
    NotARepository { path: PathBuf },

    /// Repository cannot be cloned.
    #[error("failed to clone {url}: {source}")]
    Clone {
        #[source]
        source: git2::Error,
        url: String,
    },

    /// Branch exists neither locally nor on origin.
    #[error("branch {branch:?} does not exist")]
    BranchNotFound { branch: String },

    /// Operation needs a branch, but HEAD is detached.
    #[error("HEAD is detached, you are not currently on a branch")]
    DetachedHead,

    /// Repository has no origin remote.
    #[error("no remote repository configured")]
    NoRemote,

    /// Branch cannot be fetched from origin.
    #[error("failed to fetch {branch:?} from origin: {source}")]
    Fetch {
        #[source]
        source: git2::Error,
        branch: String,
    },

    /// Local branch cannot be fast-forwarded.
    #[error("local branch {branch:?} diverged from origin, merge it manually")]
    Diverged { branch: String },

    /// Remote refused pushed update.
    #[error("push rejected by remote ({reason})")]
    Rejected { reason: String },

    /// Progress bar template is broken.
    #[error(transparent)]
    IndicatifStyleTemplate(#[from] indicatif::style::TemplateError),

    /// Operations from libgit2 fail.
    #[error(transparent)]
    Git2(#[from] git2::Error),

    /// Git binary fails.
    #[error(transparent)]
    Syscall(#[from] std::io::Error),
}

/// Friendly result alias :3
pub type Result<T, E = VcsError> = std::result::Result<T, E>;
