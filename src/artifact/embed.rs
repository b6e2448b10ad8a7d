//! In-place region writes into an existing file.
//!
//! Both the runtime embedding and the `.upd_info` patch overwrite a byte
//! range of an image that already holds the squashfs payload. The file is
//! opened without truncation, locked exclusively, written at an explicit
//! offset and synced. Bytes outside the written range are never touched.

use anyhow::{Context, Result};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use crate::error::PackError;

/// Overwrite `target[offset..offset + data.len()]` with `data`.
pub fn write_at_offset(target: &Path, offset: u64, data: &[u8]) -> Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .open(target)
        .with_context(|| format!("opening {} for writing", target.display()))?;
    file.lock_exclusive()
        .with_context(|| format!("locking {}", target.display()))?;

    let result = write_locked(&mut file, offset, data);
    let _ = FileExt::unlock(&file);

    result.with_context(|| {
        format!(
            "writing {} bytes at offset {} of {}",
            data.len(),
            offset,
            target.display()
        )
    })
}

fn write_locked(file: &mut File, offset: u64, data: &[u8]) -> io::Result<()> {
    file.seek(SeekFrom::Start(offset))?;
    file.write_all(data)?;
    file.sync_all()
}

/// Copy the whole of `source` over the start of `target`.
///
/// `target` must already be at least as long as `source`: the region was
/// reserved when the image was built, and writing past its end would mean
/// the payload is not where the runtime expects it.
pub fn embed_file(source: &Path, target: &Path) -> Result<u64> {
    let data =
        fs::read(source).with_context(|| format!("reading {}", source.display()))?;
    let offset = data.len() as u64;

    let target_len = fs::metadata(target)
        .with_context(|| format!("reading metadata of {}", target.display()))?
        .len();
    if target_len < offset {
        return Err(PackError::RuntimeNotEmbedded {
            len: target_len,
            offset,
        }
        .into());
    }

    write_at_offset(target, 0, &data)?;
    Ok(offset)
}

/// Make a file executable (chmod +x).
pub fn make_executable(path: &Path) -> Result<()> {
    let mut perms = fs::metadata(path)
        .with_context(|| format!("reading permissions of {}", path.display()))?
        .permissions();
    perms.set_mode(perms.mode() | 0o755);
    fs::set_permissions(path, perms)
        .with_context(|| format!("marking {} executable", path.display()))?;
    Ok(())
}
