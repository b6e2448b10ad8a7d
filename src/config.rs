//! Build configuration.
//!
//! Two sources feed a build:
//! - [`Settings`]: an optional TOML file with tool tuning (compression,
//!   timeouts, runtime search directories, delta block size).
//! - [`BuildEnv`]: a snapshot of the process environment taken once at
//!   startup. Nothing else in the crate reads environment variables, so every
//!   stage stays a plain function of its inputs.
//!
//! Example settings file:
//!
//! ```toml
//! [squashfs]
//! compression = "xz"
//! timeout_secs = 600
//!
//! [runtime]
//! search_dirs = ["/opt/appimagekit/runtime"]
//!
//! [delta]
//! block_size = 4096
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct Settings {
    pub squashfs: SquashfsSettings,
    pub runtime: RuntimeSettings,
    pub delta: DeltaSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct SquashfsSettings {
    /// Compression algorithm passed to `mksquashfs -comp`.
    ///
    /// Default: "gzip" (the only one every deployed runtime can mount)
    pub compression: String,

    /// Kill `mksquashfs` after this many seconds. 0 waits forever.
    pub timeout_secs: u64,
}

impl Default for SquashfsSettings {
    fn default() -> Self {
        Self {
            compression: "gzip".to_string(),
            timeout_secs: 0,
        }
    }
}

impl SquashfsSettings {
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct RuntimeSettings {
    /// Directories searched for `runtime-<arch>` before the built-in ones.
    pub search_dirs: Vec<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct DeltaSettings {
    /// zsync block size in bytes. 0 picks one from the artifact size.
    pub block_size: u64,
}

impl Settings {
    /// Load settings from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading config '{}'", path.display()))?;
        Self::from_toml_str(&raw).with_context(|| format!("parsing config '{}'", path.display()))
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }
}

/// CI vendor detected from the environment.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CiContext {
    /// Not running on a recognized CI service.
    #[default]
    None,
    Travis {
        /// `owner/repo` from `TRAVIS_REPO_SLUG`.
        repo_slug: String,
        /// `TRAVIS_PULL_REQUEST` is anything but `false`.
        pull_request: bool,
        /// `GITHUB_TOKEN` is set. The token itself is never stored.
        has_github_token: bool,
    },
    GitLab {
        /// `CI_COMMIT_REF_NAME`: branch or tag being built.
        ref_name: String,
    },
}

/// Environment snapshot for one pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildEnv {
    /// `$ARCH`: trusted architecture override.
    pub arch: Option<String>,
    /// `$VERSION`: application version.
    pub version: Option<String>,
    pub ci: CiContext,
}

impl BuildEnv {
    /// Capture the current process environment.
    pub fn from_env() -> Self {
        Self::from_vars(std::env::vars())
    }

    /// Build from an explicit variable list. Empty values count as unset.
    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut arch = None;
        let mut version = None;
        let mut travis_slug = None;
        let mut travis_pr = None;
        let mut github_token = false;
        let mut gitlab_ref = None;

        for (key, value) in vars {
            let value: String = value.into();
            if value.is_empty() {
                continue;
            }
            match key.as_ref() {
                "ARCH" => arch = Some(value),
                "VERSION" => version = Some(value),
                "TRAVIS_REPO_SLUG" => travis_slug = Some(value),
                "TRAVIS_PULL_REQUEST" => travis_pr = Some(value),
                "GITHUB_TOKEN" => github_token = true,
                "CI_COMMIT_REF_NAME" => gitlab_ref = Some(value),
                _ => {}
            }
        }

        // Travis takes precedence; GitLab never yields update information
        let ci = match (travis_slug, gitlab_ref) {
            (Some(repo_slug), gitlab_ref) => {
                if let Some(ref_name) = gitlab_ref {
                    tracing::info!(
                        "Running on GitLab CI ({}), using the Travis CI context for update information",
                        ref_name
                    );
                }
                CiContext::Travis {
                    repo_slug,
                    pull_request: travis_pr.as_deref() != Some("false"),
                    has_github_token: github_token,
                }
            }
            (None, Some(ref_name)) => CiContext::GitLab { ref_name },
            (None, None) => CiContext::None,
        };

        Self { arch, version, ci }
    }
}
