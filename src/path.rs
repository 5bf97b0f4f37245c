// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Path resolution utilities.
//!
//! Determine where the driving configuration lives for a host project, and
//! which directories are derived from it.
//!
//! # Operating Modes
//!
//! Driving supports two layouts. In __standard mode__ the configuration lives
//! in a `.driving` directory at the project root, which is itself a Git
//! submodule of the host project. In __local mode__ the project root _is_ the
//! configuration root, which is detected by a `gitlist.json` manifest sitting
//! directly at the root.
//!
//! The mode is never cached. Every query consults the [`Probe`] again, so a
//! manifest created between two calls is observed by the second one.

use serde::Serialize;
use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    path::{Path, PathBuf},
};

/// Name of configuration directory in standard mode.
pub const DRIVING_DIR: &str = ".driving";

/// Name of manifest file.
pub const MANIFEST_FILE: &str = "gitlist.json";

/// Directory holding project-local manifest and documents.
pub const LOCAL_DOCS_DIR: &str = "ai-docs-local";

/// Directory holding shared manifest and documents.
pub const DOCS_DIR: &str = "ai-docs";

/// Directory that framework repositories get cloned into.
pub const SUBMODULES_DIR: &str = "submodules";

/// Directory holding IDE configuration bundles.
pub const INSTALL_DIR: &str = "install";

/// Directory holding skills, relative to [`DOCS_DIR`].
pub const SKILLS_DIR: &str = "skills";

/// Capability to check whether a path exists.
///
/// Root discovery only ever needs to know if something exists at a given
/// path. Keeping that behind a trait lets resolver logic run against an
/// in-memory layout.
pub trait Probe {
    /// Check if anything exists at target path.
    fn exists(&self, path: &Path) -> bool;
}

/// Probe the real file system.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsProbe;

impl Probe for FsProbe {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }
}

/// Find project root by walking upward from a starting directory.
///
/// Checks `start` and every ancestor up to and including the file system
/// root for either a [`DRIVING_DIR`] directory or a [`MANIFEST_FILE`]. The
/// first match wins. Falls back to `start` itself when nothing matches.
pub fn resolve_root(start: &Path, probe: &impl Probe) -> PathBuf {
    start
        .ancestors()
        .find(|dir| is_marked(dir, probe))
        .unwrap_or(start)
        .to_path_buf()
}

fn is_marked(dir: &Path, probe: &impl Probe) -> bool {
    probe.exists(&dir.join(DRIVING_DIR)) || probe.exists(&dir.join(MANIFEST_FILE))
}

/// Operating mode of a project.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Configuration lives in `.driving` submodule.
    #[default]
    Standard,

    /// Configuration lives at project root.
    Local,
}

impl Mode {
    /// Detect operating mode of project root.
    pub fn detect(root: &Path, probe: &impl Probe) -> Self {
        if probe.exists(&root.join(MANIFEST_FILE)) {
            Self::Local
        } else {
            Self::Standard
        }
    }

    /// Check if mode is local mode.
    pub fn is_local(&self) -> bool {
        matches!(self, Self::Local)
    }
}

impl Display for Mode {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Standard => fmt.write_str("standard"),
            Self::Local => fmt.write_str("local"),
        }
    }
}

/// Directory layout of a driving project.
///
/// Wraps the resolved project root together with the probe used to inspect
/// it. All derived paths are computed on demand.
#[derive(Debug, Clone)]
pub struct Layout<P = FsProbe>
where
    P: Probe,
{
    root: PathBuf,
    probe: P,
}

impl Layout<FsProbe> {
    /// Discover layout from a starting directory on the real file system.
    pub fn discover(start: impl AsRef<Path>) -> Self {
        Self::new(resolve_root(start.as_ref(), &FsProbe), FsProbe)
    }
}

impl<P> Layout<P>
where
    P: Probe,
{
    /// Construct layout from an already resolved project root.
    pub fn new(root: impl Into<PathBuf>, probe: P) -> Self {
        Self {
            root: root.into(),
            probe,
        }
    }

    /// Discover layout from a starting directory through a custom probe.
    pub fn discover_with(start: impl AsRef<Path>, probe: P) -> Self {
        let root = resolve_root(start.as_ref(), &probe);
        Self::new(root, probe)
    }

    /// Project root.
    pub fn root(&self) -> &Path {
        self.root.as_path()
    }

    /// Current operating mode.
    pub fn mode(&self) -> Mode {
        Mode::detect(&self.root, &self.probe)
    }

    /// Root directory of driving configuration.
    pub fn config_root(&self) -> PathBuf {
        match self.mode() {
            Mode::Local => self.root.clone(),
            Mode::Standard => self.root.join(DRIVING_DIR),
        }
    }

    /// Directory framework repositories are installed into.
    pub fn framework_base_dir(&self) -> PathBuf {
        self.config_root().join(SUBMODULES_DIR)
    }

    /// Directory holding IDE configuration bundles.
    pub fn install_dir(&self) -> PathBuf {
        self.config_root().join(INSTALL_DIR)
    }

    /// Directory holding skills.
    pub fn skills_dir(&self) -> PathBuf {
        self.config_root().join(DOCS_DIR).join(SKILLS_DIR)
    }

    /// All well-known manifest locations in precedence order.
    ///
    /// Highest precedence first: `ai-docs-local`, then `ai-docs`, then the
    /// legacy manifest at configuration root.
    pub fn manifest_candidates(&self) -> [PathBuf; 3] {
        let config_root = self.config_root();
        [
            config_root.join(LOCAL_DOCS_DIR).join(MANIFEST_FILE),
            config_root.join(DOCS_DIR).join(MANIFEST_FILE),
            config_root.join(MANIFEST_FILE),
        ]
    }

    /// Manifest locations that actually exist, in precedence order.
    pub fn manifest_locations(&self) -> Vec<PathBuf> {
        self.manifest_candidates()
            .into_iter()
            .filter(|path| self.probe.exists(path))
            .collect()
    }

    /// Check if anything exists at target path through layout probe.
    pub fn exists(&self, path: &Path) -> bool {
        self.probe.exists(path)
    }

    /// Check that project root is configured for driving.
    ///
    /// # Errors
    ///
    /// - Return [`NotConfigured`] if neither `.driving` nor `gitlist.json`
    ///   exists at project root.
    pub fn check_environment(&self) -> Result<()> {
        if is_marked(&self.root, &self.probe) {
            return Ok(());
        }

        Err(NotConfigured {
            root: self.root.clone(),
        })
    }
}

/// Project root has no driving configuration.
#[derive(Clone, Debug, thiserror::Error)]
#[error(
    "driving is not configured for project root {}\n\
     do one of the following:\n  \
       1. run 'driving install' to add the .driving submodule\n  \
       2. change into a project root containing .driving or gitlist.json",
    root.display()
)]
pub struct NotConfigured {
    pub root: PathBuf,
}

/// Friendly result alias :3
pub type Result<T, E = NotConfigured> = std::result::Result<T, E>;
