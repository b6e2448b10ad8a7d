//! External metadata validators.
//!
//! Desktop entry and AppStream validation are owned by upstream tools; the
//! pipeline only runs them and fails on a non-zero exit.

use anyhow::Result;
use std::path::Path;

use crate::error::PackError;
use crate::process::{self, Cmd};

/// Validates AppDir metadata files.
pub trait MetadataValidator {
    /// Validate a desktop entry file.
    fn validate_desktop_file(&self, desktop_file: &Path) -> Result<()>;

    /// Validate the AppStream metadata of an AppDir.
    fn validate_appstream(&self, appdir: &Path) -> Result<()>;
}

/// Runs `desktop-file-validate` and `appstreamcli`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ToolValidator;

impl MetadataValidator for ToolValidator {
    fn validate_desktop_file(&self, desktop_file: &Path) -> Result<()> {
        Cmd::new("desktop-file-validate")
            .arg_path(desktop_file)
            .error_msg(format!(
                "desktop-file-validate rejected {}",
                desktop_file.display()
            ))
            .run()?;
        Ok(())
    }

    fn validate_appstream(&self, appdir: &Path) -> Result<()> {
        if !process::exists("appstreamcli") {
            return Err(PackError::MissingTool {
                tool: "appstreamcli".to_string(),
                package: "appstream".to_string(),
            }
            .into());
        }

        tracing::info!("Trying to validate AppStream information with the appstreamcli tool");
        Cmd::new("appstreamcli")
            .arg("validate-tree")
            .arg_path(appdir)
            .error_msg(
                "appstreamcli validation failed. In case of questions regarding the validation, \
                 please refer to https://github.com/ximion/appstream",
            )
            .run()?;
        Ok(())
    }
}
