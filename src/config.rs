// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration layout.
//!
//! Driving is configured through environment variables, optionally backed by
//! a `.env` file at the project root. All of it is gathered once into
//! [`Settings`] when the process starts, and then handed down to whatever
//! needs it. Nothing below the binary entry point reads the environment.

use std::{
    collections::BTreeMap,
    fmt::{Display, Formatter, Result as FmtResult},
    fs::{read_to_string, write},
    path::{Path, PathBuf},
    str::FromStr,
};

/// Environment variable naming the driving repository URL.
pub const REPO_URL_VAR: &str = "DRIVING_REPO_URL";

/// Environment variable overriding the default commit message.
pub const COMMIT_MESSAGE_VAR: &str = "DRIVING_DEFAULT_COMMIT_MESSAGE";

/// Environment variable overriding sensitive keyword list.
pub const SENSITIVE_KEYWORDS_VAR: &str = "DRIVING_SENSITIVE_KEYWORDS";

/// Commit message used when none is given.
pub const DEFAULT_COMMIT_MESSAGE: &str = "update by driving";

/// Key fragments that mark a value as a secret.
pub const DEFAULT_SENSITIVE_KEYWORDS: &[&str] = &[
    "api_key",
    "apikey",
    "api-key",
    "token",
    "access_token",
    "auth_token",
    "secret",
    "password",
    "passwd",
    "credential",
    "auth",
    "authorization",
    "private_key",
    "privatekey",
];

/// Process-wide settings.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Settings {
    /// URL of driving repository to add as submodule.
    pub repo_url: Option<String>,

    /// Commit message to use when caller gives none.
    pub default_commit_message: String,

    /// Key fragments that mark a configuration value as a secret.
    pub sensitive_keywords: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            repo_url: None,
            default_commit_message: DEFAULT_COMMIT_MESSAGE.into(),
            sensitive_keywords: DEFAULT_SENSITIVE_KEYWORDS
                .iter()
                .map(ToString::to_string)
                .collect(),
        }
    }
}

impl Settings {
    /// Gather settings from the process environment and `.env` at project root.
    ///
    /// Process environment wins over the `.env` file. A missing `.env` file
    /// is fine.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::Read`] if `.env` exists but cannot be read.
    pub fn load(project_root: impl AsRef<Path>) -> Result<Self> {
        let dotenv = EnvFile::load_or_default(project_root.as_ref().join(".env"))?;
        Ok(Self::from_lookup(|key| {
            std::env::var(key).ok().or_else(|| dotenv.get(key).map(ToString::to_string))
        }))
    }

    /// Gather settings through a custom variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut settings = Self::default();

        settings.repo_url = lookup(REPO_URL_VAR).filter(|url| !url.is_empty());

        if let Some(message) = lookup(COMMIT_MESSAGE_VAR) {
            settings.default_commit_message = message;
        }

        // INVARIANT: Keep default keyword list unless override yields at least one keyword.
        if let Some(keywords) = lookup(SENSITIVE_KEYWORDS_VAR) {
            let keywords = keywords
                .split(',')
                .map(str::trim)
                .filter(|keyword| !keyword.is_empty())
                .map(ToString::to_string)
                .collect::<Vec<_>>();
            if !keywords.is_empty() {
                settings.sensitive_keywords = keywords;
            }
        }

        settings
    }

    /// Check if a configuration key names a secret.
    pub fn is_sensitive_key(&self, key: &str) -> bool {
        let key = key.to_lowercase();
        self.sensitive_keywords
            .iter()
            .any(|keyword| key.contains(keyword.as_str()))
    }
}

/// Simple `KEY=VALUE` file.
///
/// Comment lines and blank lines are dropped on parse. Rendering writes an
/// optional header of comment lines followed by every pair sorted by key.
#[derive(Debug, Default, PartialEq, Eq, Clone)]
pub struct EnvFile {
    header: Vec<String>,
    vars: BTreeMap<String, String>,
}

impl EnvFile {
    /// Construct new empty env file.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load env file at target path, or start empty if it does not exist.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::Read`] if file exists but cannot be read.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }

        let data = read_to_string(path).map_err(|err| ConfigError::Read {
            source: err,
            path: path.to_path_buf(),
        })?;

        Ok(data.parse().unwrap_or_default())
    }

    /// Write env file to target path.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::Write`] if file cannot be written.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        write(path, self.to_string()).map_err(|err| ConfigError::Write {
            source: err,
            path: path.to_path_buf(),
        })
    }

    /// Replace header comment lines.
    pub fn with_header(mut self, lines: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.header = lines.into_iter().map(Into::into).collect();
        self
    }

    /// Lookup value of target key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// Insert or replace a variable.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(key.into(), value.into());
    }

    /// Insert or replace a listing of variables.
    pub fn extend(&mut self, vars: impl IntoIterator<Item = (String, String)>) {
        self.vars.extend(vars);
    }

    /// Number of variables.
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    /// Check if there are no variables.
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

impl FromStr for EnvFile {
    type Err = std::convert::Infallible;

    fn from_str(data: &str) -> std::result::Result<Self, Self::Err> {
        let vars = data
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .filter_map(|line| line.split_once('='))
            .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
            .collect();

        Ok(Self {
            header: Vec::new(),
            vars,
        })
    }
}

impl Display for EnvFile {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        for line in &self.header {
            writeln!(fmt, "# {line}")?;
        }

        if !self.header.is_empty() {
            writeln!(fmt)?;
        }

        for (key, value) in &self.vars {
            writeln!(fmt, "{key}={value}")?;
        }

        Ok(())
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Env file cannot be read.
    #[error("failed to read {:?}", path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Env file cannot be written.
    #[error("failed to write {:?}", path.display())]
    Write {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
}

/// Friendly result alias :3
pub type Result<T, E = ConfigError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;
    use simple_test_case::test_case;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<HashMap<_, _>>();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn settings_default_without_variables() {
        let result = Settings::from_lookup(|_| None);
        assert_eq!(result, Settings::default());
        assert_eq!(result.default_commit_message, "update by driving");
        assert_eq!(result.sensitive_keywords.len(), 14);
    }

    #[test]
    fn settings_from_variables() {
        let result = Settings::from_lookup(lookup_from(&[
            (REPO_URL_VAR, "https://example.org/driving.git"),
            (COMMIT_MESSAGE_VAR, "chore: sync"),
            (SENSITIVE_KEYWORDS_VAR, " key , ,pin"),
        ]));
        let expect = Settings {
            repo_url: Some("https://example.org/driving.git".into()),
            default_commit_message: "chore: sync".into(),
            sensitive_keywords: vec!["key".into(), "pin".into()],
        };
        assert_eq!(result, expect);
    }

    #[test]
    fn settings_keep_default_keywords_on_blank_override() {
        let result = Settings::from_lookup(lookup_from(&[(SENSITIVE_KEYWORDS_VAR, " , ")]));
        assert_eq!(result.sensitive_keywords, Settings::default().sensitive_keywords);
    }

    #[test_case("API_KEY", true; "upper case api key")]
    #[test_case("githubToken", true; "camel case token")]
    #[test_case("Authorization", true; "header name")]
    #[test_case("command", false; "plain key")]
    #[test_case("args", false; "another plain key")]
    #[test]
    fn settings_detect_sensitive_keys(key: &str, expect: bool) {
        pretty_assertions::assert_eq!(Settings::default().is_sensitive_key(key), expect);
    }

    #[sealed_test(env = [("DRIVING_DEFAULT_COMMIT_MESSAGE", "from env")])]
    fn settings_load_prefers_environment_over_dotenv() -> anyhow::Result<()> {
        let root = std::env::current_dir()?;
        std::fs::write(
            root.join(".env"),
            indoc! {r#"
                DRIVING_DEFAULT_COMMIT_MESSAGE=from file
                DRIVING_REPO_URL=https://example.org/driving.git
            "#},
        )?;

        let result = Settings::load(&root)?;
        assert_eq!(result.default_commit_message, "from env");
        assert_eq!(
            result.repo_url.as_deref(),
            Some("https://example.org/driving.git")
        );

        Ok(())
    }

    #[test]
    fn env_file_parse_and_render() {
        let mut env: EnvFile = indoc! {r#"
            # comment
            ZED=last

            ALPHA = first
            not a pair
        "#}
        .parse()
        .unwrap();
        env.set("MIDDLE", "b=c");
        let result = env.with_header(["Driving CLI configuration"]).to_string();
        let expect = indoc! {r#"
            # Driving CLI configuration

            ALPHA=first
            MIDDLE=b=c
            ZED=last
        "#};
        assert_eq!(result, expect);
    }
}
