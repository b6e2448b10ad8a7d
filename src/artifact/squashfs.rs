//! Squashfs image builder.
//!
//! Wraps `mksquashfs` to pack an AppDir into a compressed filesystem image
//! that leaves the first `offset` bytes of the output free for the runtime.
//!
//! # Example
//!
//! ```rust,ignore
//! use appimagetool::artifact::squashfs::{ImageBuilder, Mksquashfs, SquashfsOptions};
//! use std::path::Path;
//!
//! let builder = Mksquashfs::new(SquashfsOptions {
//!     compression: "xz".to_string(),
//!     ..Default::default()
//! });
//! builder.build(Path::new("Foo.AppDir"), Path::new("Foo.AppImage"), 188392)?;
//! ```

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::config::SquashfsSettings;
use crate::error::PackError;
use crate::process::Cmd;

/// Builds the filesystem image part of an AppImage.
pub trait ImageBuilder {
    /// Pack `source_dir` into `output`, reserving `[0, offset)` of the file.
    ///
    /// `output` must not exist when this is called.
    fn build(&self, source_dir: &Path, output: &Path, offset: u64) -> Result<()>;
}

/// Options for building a squashfs image.
#[derive(Debug, Clone)]
pub struct SquashfsOptions {
    /// Compression algorithm (gzip, xz, zstd, lzo, lz4).
    ///
    /// Default: "gzip"
    pub compression: String,

    /// Kill `mksquashfs` after this long. `None` waits forever.
    pub timeout: Option<Duration>,
}

impl Default for SquashfsOptions {
    fn default() -> Self {
        Self {
            compression: "gzip".to_string(),
            timeout: None,
        }
    }
}

impl From<&SquashfsSettings> for SquashfsOptions {
    fn from(settings: &SquashfsSettings) -> Self {
        Self {
            compression: settings.compression.clone(),
            timeout: settings.timeout(),
        }
    }
}

/// [`ImageBuilder`] backed by `mksquashfs`.
#[derive(Debug, Clone, Default)]
pub struct Mksquashfs {
    options: SquashfsOptions,
}

impl Mksquashfs {
    pub fn new(options: SquashfsOptions) -> Self {
        Self { options }
    }

    /// The full command line for one build.
    pub fn command(&self, source_dir: &Path, output: &Path, offset: u64) -> Cmd {
        Cmd::new("mksquashfs")
            .arg_path(source_dir) // SOURCE FIRST
            .arg_path(output)
            .args(["-offset", &offset.to_string()])
            .args(["-comp", &self.options.compression])
            .arg("-root-owned") // Everything owned by root inside the image
            .arg("-noappend") // Never extend an existing image
            .timeout(self.options.timeout)
            .allow_fail()
    }
}

impl ImageBuilder for Mksquashfs {
    fn build(&self, source_dir: &Path, output: &Path, offset: u64) -> Result<()> {
        if !source_dir.is_dir() {
            bail!("Source path is not a directory: {}", source_dir.display());
        }

        let cmd = self.command(source_dir, output, offset);
        tracing::info!("{}", cmd.display());
        let tool = cmd.program().to_string();

        let result = cmd.run()?;
        if !result.success() {
            return Err(PackError::ImageBuild {
                tool,
                status: result.status.to_string(),
                output: result.combined(),
            }
            .into());
        }
        tracing::debug!("{}", result.combined().trim_end());

        let len = fs::metadata(output)
            .with_context(|| format!("{} did not produce {}", tool, output.display()))?
            .len();
        tracing::info!("Squashfs created: {} KiB", len / 1024);
        Ok(())
    }
}

/// Make sure nothing is left at `output` before an image is built into it.
pub fn remove_stale_output(output: &Path) -> Result<()> {
    if output.exists() || output.is_symlink() {
        tracing::info!("Removing existing {}", output.display());
        fs::remove_file(output)
            .with_context(|| format!("removing existing {}", output.display()))?;
    }
    Ok(())
}
