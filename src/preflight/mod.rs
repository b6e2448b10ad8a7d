//! Preflight checks for packaging.
//!
//! Validates that the host system has the helper tools the pipeline shells
//! out to before any file is touched. This prevents cryptic errors halfway
//! through a build.
//!
//! # Example
//!
//! ```rust,ignore
//! use appimagetool::preflight::{check_host_tools, check_squashfs_version};
//!
//! check_host_tools()?;
//! check_squashfs_version("mksquashfs")?;
//! ```

use anyhow::{Context, Result};

use crate::error::PackError;
use crate::process::{self, Cmd};

/// Host tools the pipeline always needs.
///
/// Each tuple is (command_name, package_name).
pub const REQUIRED_TOOLS: &[(&str, &str)] = &[
    ("mksquashfs", "squashfs-tools"),
    ("desktop-file-validate", "desktop-file-utils"),
];

/// Oldest squashfs-tools release whose `mksquashfs` honours `-offset`.
pub const MIN_SQUASHFS_VERSION: (u32, u32) = (4, 3);

/// Check that specific tools are available.
///
/// Reports the first missing tool together with the package that provides it.
pub fn check_required_tools(tools: &[(&str, &str)]) -> Result<()> {
    for (tool, package) in tools {
        if !process::exists(tool) {
            return Err(PackError::MissingTool {
                tool: tool.to_string(),
                package: package.to_string(),
            }
            .into());
        }
    }

    Ok(())
}

/// Check that all tools in [`REQUIRED_TOOLS`] are available.
pub fn check_host_tools() -> Result<()> {
    check_required_tools(REQUIRED_TOOLS)
}

/// Check that `mksquashfs` is recent enough to reserve a header region.
pub fn check_squashfs_version(tool: &str) -> Result<()> {
    let result = Cmd::new(tool)
        .arg("-version")
        .allow_fail()
        .run()
        .with_context(|| format!("querying {} version", tool))?;

    let output = result.combined();
    let version = parse_squashfs_version(&output).with_context(|| {
        format!(
            "could not parse version from '{} -version' output:\n{}",
            tool,
            output.trim()
        )
    })?;

    tracing::debug!("{} version {}.{}", tool, version.0, version.1);
    ensure_version_sufficient(tool, version)
}

fn ensure_version_sufficient(tool: &str, version: (u32, u32)) -> Result<()> {
    if version < MIN_SQUASHFS_VERSION {
        return Err(PackError::ToolTooOld {
            tool: tool.to_string(),
            found: format!("{}.{}", version.0, version.1),
            required: format!("{}.{}", MIN_SQUASHFS_VERSION.0, MIN_SQUASHFS_VERSION.1),
        }
        .into());
    }
    Ok(())
}

/// Extract (major, minor) from `mksquashfs -version` output.
///
/// Parses lines like "mksquashfs version 4.3-git (2014/09/12)".
pub fn parse_squashfs_version(output: &str) -> Option<(u32, u32)> {
    let line = output
        .lines()
        .find(|l| l.trim_start().starts_with("mksquashfs version"))?;
    let raw = line.split_whitespace().nth(2)?;

    let mut parts = raw.split(|c: char| !c.is_ascii_digit());
    let major = parts.next()?.parse().ok()?;
    let minor = parts.next().and_then(|m| m.parse().ok()).unwrap_or(0);
    Some((major, minor))
}
