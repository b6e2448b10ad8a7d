//! AppDir → AppImage pipeline.
//!
//! Stages run strictly in order and each one is a hard gate:
//!
//! ```text
//! AppDir checks ─► architecture ─► assemble ─► update info ─► patch ─► zsync
//! ```
//!
//! Nothing is retried. A failed run may leave a partial artifact behind; it
//! must be treated as invalid.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::appdir::validate::MetadataValidator;
use crate::appdir::{self, AppDir};
use crate::arch::{self, Architecture};
use crate::artifact::{self, squashfs::ImageBuilder};
use crate::config::{BuildEnv, CiContext};
use crate::elf::UPDATE_INFO_SECTION;
use crate::error::PackError;
use crate::patch::{self, PatchReport};
use crate::runtime::{RuntimeBinary, RuntimeSearchPath};
use crate::update_info::{self, UpdateInfo};
use crate::zsync::{self, ZsyncOptions, ZsyncSummary};

/// Everything one packaging run needs besides the AppDir itself.
pub struct Packager<'a> {
    pub env: &'a BuildEnv,
    pub runtimes: &'a RuntimeSearchPath,
    pub image_builder: &'a dyn ImageBuilder,
    pub validator: &'a dyn MetadataValidator,
    pub zsync: ZsyncOptions,
}

/// Outcome of a successful run.
#[derive(Debug, Clone)]
pub struct BuildReport {
    pub artifact: PathBuf,
    pub arch: Architecture,
    pub version: String,
    pub runtime: RuntimeBinary,
    pub update_info: UpdateInfo,
    pub patch: PatchReport,
    pub zsync: Option<ZsyncSummary>,
}

impl Packager<'_> {
    /// Package `appdir` into `<output_dir>/<name>-<version>-<arch>.AppImage`.
    pub fn package(&self, appdir: &Path, output_dir: &Path) -> Result<BuildReport> {
        let appdir = AppDir::open(appdir)?;

        // No guessing from version control: the version must be given
        let version = self
            .env
            .version
            .clone()
            .ok_or(PackError::MissingVersion)?;

        let mut meta = appdir.inspect(self.validator)?;
        tracing::info!("Application name: {}", meta.name);

        let arch = arch::resolve(&appdir, self.env.arch.as_deref())?;
        let icon = appdir.find_icon(&meta.icon_name)?;

        appdir::write_version(&mut meta.desktop, &version)?;

        let target = output_dir.join(appdir::artifact_file_name(
            &meta.name,
            &version,
            arch.as_str(),
        ));
        tracing::info!("Target: {}", target.display());

        tracing::info!("Icon: {}", icon.display());
        appdir.install_dir_icon(&icon)?;
        appdir.check_appstream(meta.desktop.path(), self.validator)?;

        let runtime = self.runtimes.locate(&arch)?;
        artifact::assemble(self.image_builder, appdir.root(), &runtime, &target)
            .with_context(|| format!("assembling {}", target.display()))?;

        let update_info = self.compose_update_info(&meta.name, &arch);
        update_info::check_format(update_info.as_str())?;

        let patch = patch::patch_section(
            &target,
            UPDATE_INFO_SECTION,
            update_info.as_str().as_bytes(),
        )?;
        tracing::info!("Embedded {} section: {}", UPDATE_INFO_SECTION, patch.after_text());

        // TODO: a zsync failure still fails the run although the AppImage
        // itself is complete; decide whether it should downgrade to a warning.
        let zsync = if update_info.is_empty() {
            None
        } else {
            let output = zsync::zsync_path(&target);
            tracing::info!("Generating {}", output.display());
            let summary = zsync::make_zsync(&target, &output, &self.zsync)
                .with_context(|| format!("generating {}", output.display()))?;
            Some(summary)
        };

        tracing::info!("Success: {}", target.display());
        Ok(BuildReport {
            artifact: target,
            arch,
            version,
            runtime,
            update_info,
            patch,
            zsync,
        })
    }

    fn compose_update_info(&self, name: &str, arch: &Architecture) -> UpdateInfo {
        match &self.env.ci {
            CiContext::Travis { .. } => tracing::info!("Running on Travis CI"),
            CiContext::GitLab { ref_name } => {
                tracing::info!("Running on GitLab CI ({})", ref_name)
            }
            CiContext::None => {}
        }

        let info = update_info::compose(&self.env.ci, name, arch);
        match &info {
            UpdateInfo::Present(value) => {
                tracing::info!("Calculated update information: {}", value)
            }
            UpdateInfo::Absent(reason) => tracing::info!("{}", reason),
        }
        info
    }
}
