//! Writes update information into the runtime's reserved section.
//!
//! Patching is split into locate and write: the section is looked up from
//! the ELF header of the finished image and read once before anything is
//! written, so a runtime with a different layout fails loudly instead of
//! receiving a blind write at the wrong place.

use anyhow::Result;
use std::path::Path;

use crate::artifact::embed::write_at_offset;
use crate::elf::{self, SectionLocation};
use crate::error::PackError;

/// Section contents around a patch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchReport {
    pub location: SectionLocation,
    pub before: Vec<u8>,
    pub after: Vec<u8>,
}

impl PatchReport {
    /// Section contents up to the first NUL, for logging.
    pub fn after_text(&self) -> String {
        let end = self
            .after
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(self.after.len());
        String::from_utf8_lossy(&self.after[..end]).into_owned()
    }
}

/// Overwrite the start of `section` in `image` with `data`.
///
/// Only `data.len()` bytes are written; the rest of the section keeps its
/// previous contents. Data longer than the section is rejected before the
/// file is opened for writing.
pub fn patch_section(image: &Path, section: &str, data: &[u8]) -> Result<PatchReport> {
    let location = elf::find_section(image, section)?;
    let before = elf::read_region(image, location)?;
    tracing::debug!("Embedded {} section before patching: {:?}", section, before);
    tracing::info!(
        "Embedded {} section offset: {}, length: {}",
        section,
        location.offset,
        location.length
    );

    if data.len() as u64 > location.length {
        return Err(PackError::UpdateInfoTooLarge {
            section: section.to_string(),
            len: data.len(),
            capacity: location.length,
        }
        .into());
    }

    tracing::info!("Writing {} bytes into {} section...", data.len(), section);
    write_at_offset(image, location.offset, data)?;

    let after = elf::read_section(image, section)?;
    Ok(PatchReport {
        location,
        before,
        after,
    })
}
