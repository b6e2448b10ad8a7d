//! Update information composition.
//!
//! Update information tells AppImage update clients where newer releases and
//! their zsync files live. It is only produced for CI builds that publish to
//! GitHub releases:
//!
//! ```text
//! gh-releases-zsync|<owner>|<repo>|continuous|<name>-*-<arch>.AppImage.zsync
//! ```
//!
//! The version part is a wildcard so the same string matches every future
//! release of the artifact. Composition is a pure function of the CI context
//! captured at startup; nothing here touches the network.

use anyhow::Result;
use std::fmt;

use crate::arch::Architecture;
use crate::config::CiContext;
use crate::error::PackError;

/// Release channel update clients follow.
pub const CHANNEL: &str = "continuous";

/// Transports update clients understand.
pub const RECOGNIZED_PREFIXES: &[&str] = &["zsync|", "bintray-zsync|", "gh-releases-zsync|"];

/// Why no update information is embedded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    NotCi,
    PullRequest,
    MissingGithubToken,
    MalformedSlug(String),
    GitLabUnsupported,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotCi => f.write_str("not running on a recognized CI service"),
            Self::PullRequest => f.write_str(
                "Will not calculate update information for GitHub because this is a pull request",
            ),
            Self::MissingGithubToken => f.write_str(
                "Will not calculate update information for GitHub because $GITHUB_TOKEN is missing, \
                 please set it in the Travis CI Repository Settings for this project",
            ),
            Self::MalformedSlug(slug) => write!(
                f,
                "Will not calculate update information because TRAVIS_REPO_SLUG '{}' is not <owner>/<repo>",
                slug
            ),
            Self::GitLabUnsupported => f.write_str(
                "Will not calculate update information for GitLab because GitLab does not support HTTP range requests yet",
            ),
        }
    }
}

/// Result of composing update information.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateInfo {
    Present(String),
    Absent(SkipReason),
}

impl UpdateInfo {
    /// The string to embed; empty when absent.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Present(info) => info,
            Self::Absent(_) => "",
        }
    }

    pub fn is_empty(&self) -> bool {
        self.as_str().is_empty()
    }
}

/// Compose update information for artifact `name` built for `arch`.
pub fn compose(ci: &CiContext, name: &str, arch: &Architecture) -> UpdateInfo {
    match ci {
        CiContext::None => UpdateInfo::Absent(SkipReason::NotCi),
        CiContext::GitLab { .. } => UpdateInfo::Absent(SkipReason::GitLabUnsupported),
        CiContext::Travis {
            pull_request: true,
            ..
        } => UpdateInfo::Absent(SkipReason::PullRequest),
        CiContext::Travis {
            has_github_token: false,
            ..
        } => UpdateInfo::Absent(SkipReason::MissingGithubToken),
        CiContext::Travis { repo_slug, .. } => match split_slug(repo_slug) {
            Some((owner, repo)) => UpdateInfo::Present(format!(
                "gh-releases-zsync|{}|{}|{}|{}-*-{}.AppImage.zsync",
                owner, repo, CHANNEL, name, arch
            )),
            None => UpdateInfo::Absent(SkipReason::MalformedSlug(repo_slug.clone())),
        },
    }
}

fn split_slug(slug: &str) -> Option<(&str, &str)> {
    let (owner, repo) = slug.split_once('/')?;
    if owner.is_empty() || repo.is_empty() || repo.contains('/') {
        return None;
    }
    Some((owner, repo))
}

/// Non-empty update information must use a known transport.
pub fn check_format(info: &str) -> Result<()> {
    if info.is_empty() || RECOGNIZED_PREFIXES.iter().any(|p| info.starts_with(p)) {
        return Ok(());
    }
    Err(PackError::UnrecognizedUpdateInfo(info.to_string()).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn travis(slug: &str, pull_request: bool, has_github_token: bool) -> CiContext {
        CiContext::Travis {
            repo_slug: slug.to_string(),
            pull_request,
            has_github_token,
        }
    }

    #[test]
    fn test_valid_travis_context() {
        let info = compose(&travis("acme/foo", false, true), "My_App", &Architecture::X86_64);
        assert_eq!(
            info.as_str(),
            "gh-releases-zsync|acme|foo|continuous|My_App-*-x86_64.AppImage.zsync"
        );
        assert!(check_format(info.as_str()).is_ok());
    }

    #[test]
    fn test_pull_request_is_empty() {
        let info = compose(&travis("acme/foo", true, true), "My_App", &Architecture::X86_64);
        assert_eq!(info, UpdateInfo::Absent(SkipReason::PullRequest));
        assert!(info.is_empty());
    }

    #[test]
    fn test_missing_token_is_empty() {
        let info = compose(&travis("acme/foo", false, false), "My_App", &Architecture::X86_64);
        assert_eq!(info, UpdateInfo::Absent(SkipReason::MissingGithubToken));
    }

    #[test]
    fn test_no_ci_and_gitlab_are_empty() {
        assert_eq!(
            compose(&CiContext::None, "A", &Architecture::I686),
            UpdateInfo::Absent(SkipReason::NotCi)
        );
        let gitlab = CiContext::GitLab {
            ref_name: "main".to_string(),
        };
        assert_eq!(
            compose(&gitlab, "A", &Architecture::I686),
            UpdateInfo::Absent(SkipReason::GitLabUnsupported)
        );
    }

    #[test]
    fn test_malformed_slug() {
        for slug in ["acme", "/foo", "acme/", "a/b/c"] {
            let info = compose(&travis(slug, false, true), "A", &Architecture::X86_64);
            assert!(matches!(info, UpdateInfo::Absent(SkipReason::MalformedSlug(_))), "{}", slug);
        }
    }

    #[test]
    fn test_check_format() {
        assert!(check_format("").is_ok());
        assert!(check_format("zsync|https://example.com/Foo.AppImage.zsync").is_ok());
        assert!(check_format("bintray-zsync|a|b|c|d").is_ok());
        let err = check_format("http://example.com").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PackError>(),
            Some(PackError::UnrecognizedUpdateInfo(_))
        ));
    }
}
