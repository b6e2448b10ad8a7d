//! AppImage assembly.
//!
//! - [`squashfs`] - Filesystem image with a reserved header region (mksquashfs)
//! - [`embed`] - In-place writes of the runtime and of section patches
//!
//! [`assemble`] runs both in order and leaves an executable AppImage whose
//! first `offset` bytes are the runtime.

pub mod embed;
pub mod squashfs;

use anyhow::Result;
use std::path::Path;

use crate::runtime::RuntimeBinary;
use squashfs::ImageBuilder;

/// Build `target` from `source_dir` with `runtime` embedded at offset 0.
///
/// Returns the runtime offset.
pub fn assemble(
    builder: &dyn ImageBuilder,
    source_dir: &Path,
    runtime: &RuntimeBinary,
    target: &Path,
) -> Result<u64> {
    squashfs::remove_stale_output(target)?;
    builder.build(source_dir, target, runtime.offset())?;

    tracing::info!("Embedding ELF...");
    let offset = embed::embed_file(&runtime.path, target)?;

    tracing::info!("Marking the AppImage as executable...");
    embed::make_executable(target)?;

    Ok(offset)
}
