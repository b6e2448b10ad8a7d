//! Section lookup inside the runtime embedded at the head of an AppImage.
//!
//! The runtime is an ELF executable and the squashfs image starts right after
//! it, so the ELF header at offset 0 of the AppImage still describes the
//! runtime. Only the prefix up to the end of the section header table is read;
//! the filesystem image behind it is never loaded.

use anyhow::{bail, Context, Result};
use goblin::elf::Elf;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use crate::error::PackError;

/// Section reserved for update information.
pub const UPDATE_INFO_SECTION: &str = ".upd_info";

const ELF_HEADER_LEN: u64 = 64;

/// Where a section's bytes live inside the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionLocation {
    pub offset: u64,
    pub length: u64,
}

impl SectionLocation {
    /// One past the last byte; `None` if the header values overflow.
    pub fn end(&self) -> Option<u64> {
        self.offset.checked_add(self.length)
    }
}

/// Find section `name` by its header entry.
pub fn find_section(path: &Path, name: &str) -> Result<SectionLocation> {
    let mut file =
        File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let file_len = file
        .metadata()
        .with_context(|| format!("reading metadata of {}", path.display()))?
        .len();

    let mut header = Vec::with_capacity(ELF_HEADER_LEN as usize);
    (&mut file)
        .take(ELF_HEADER_LEN)
        .read_to_end(&mut header)
        .with_context(|| format!("reading ELF header of {}", path.display()))?;
    let header = Elf::parse_header(&header)
        .with_context(|| format!("{} does not start with an ELF runtime", path.display()))?;

    if header.e_shnum == 0 {
        return Err(PackError::SectionNotFound {
            section: name.to_string(),
        }
        .into());
    }
    let Some(table_end) = u64::from(header.e_shnum)
        .checked_mul(u64::from(header.e_shentsize))
        .and_then(|len| header.e_shoff.checked_add(len))
    else {
        bail!(
            "section header table of {} has an impossible offset {}",
            path.display(),
            header.e_shoff
        );
    };
    if table_end > file_len {
        bail!(
            "section header table of {} ends at {} but the file is only {} bytes",
            path.display(),
            table_end,
            file_len
        );
    }

    let mut prefix = vec![0u8; table_end as usize];
    file.seek(SeekFrom::Start(0))?;
    file.read_exact(&mut prefix)
        .with_context(|| format!("reading runtime headers of {}", path.display()))?;

    let elf = Elf::parse(&prefix)
        .with_context(|| format!("parsing runtime ELF headers of {}", path.display()))?;

    let section = elf
        .section_headers
        .iter()
        .find(|sh| elf.shdr_strtab.get_at(sh.sh_name) == Some(name))
        .ok_or_else(|| PackError::SectionNotFound {
            section: name.to_string(),
        })?;

    let location = SectionLocation {
        offset: section.sh_offset,
        length: section.sh_size,
    };
    match location.end() {
        Some(end) if end <= file_len => {}
        _ => bail!(
            "section {} of {} (offset {}, {} bytes) lies beyond the end of the file",
            name,
            path.display(),
            location.offset,
            location.length
        ),
    }

    tracing::debug!(
        "Section {} at offset {} ({} bytes)",
        name,
        location.offset,
        location.length
    );
    Ok(location)
}

/// Read the bytes of a located region.
pub fn read_region(path: &Path, location: SectionLocation) -> Result<Vec<u8>> {
    let mut file =
        File::open(path).with_context(|| format!("opening {}", path.display()))?;
    file.seek(SeekFrom::Start(location.offset))?;
    let mut data = vec![0u8; location.length as usize];
    file.read_exact(&mut data).with_context(|| {
        format!(
            "reading {} bytes at offset {} of {}",
            location.length,
            location.offset,
            path.display()
        )
    })?;
    Ok(data)
}

/// Read the bytes of section `name`.
pub fn read_section(path: &Path, name: &str) -> Result<Vec<u8>> {
    let location = find_section(path, name)?;
    read_region(path, location)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{elf64, runtime_elf, RUNTIME_UPD_INFO_OFFSET};
    use goblin::elf::header::EM_X86_64;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_find_update_info_section() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("runtime");
        fs::write(&path, runtime_elf(512)).unwrap();

        let location = find_section(&path, UPDATE_INFO_SECTION).unwrap();
        assert_eq!(
            location,
            SectionLocation {
                offset: RUNTIME_UPD_INFO_OFFSET,
                length: 512
            }
        );
        assert_eq!(read_section(&path, UPDATE_INFO_SECTION).unwrap(), vec![0u8; 512]);
    }

    #[test]
    fn test_trailing_payload_is_ignored() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("Foo.AppImage");
        let mut image = runtime_elf(64);
        image.extend_from_slice(b"hsqs");
        image.extend_from_slice(&[0xaa; 4096]);
        fs::write(&path, image).unwrap();

        let location = find_section(&path, UPDATE_INFO_SECTION).unwrap();
        assert_eq!(location.length, 64);
    }

    #[test]
    fn test_missing_section() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("runtime");
        fs::write(&path, elf64(EM_X86_64, &[(".text", &[0u8; 8][..])])).unwrap();

        let err = find_section(&path, UPDATE_INFO_SECTION).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PackError>(),
            Some(PackError::SectionNotFound { section }) if section == ".upd_info"
        ));
    }

    #[test]
    fn test_not_an_elf() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("plain");
        fs::write(&path, vec![b'x'; 128]).unwrap();
        assert!(find_section(&path, UPDATE_INFO_SECTION).is_err());
    }

    #[test]
    fn test_truncated_section_table() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("runtime");
        let mut image = runtime_elf(16);
        image.truncate(image.len() - 10);
        fs::write(&path, image).unwrap();

        let err = find_section(&path, UPDATE_INFO_SECTION).unwrap_err();
        assert!(err.to_string().contains("section header table"));
    }

    fn shoff(image: &[u8]) -> usize {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&image[40..48]);
        u64::from_le_bytes(raw) as usize
    }

    #[test]
    fn test_corrupt_section_table_offset() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("runtime");
        let mut image = runtime_elf(16);
        image[40..48].copy_from_slice(&(u64::MAX - 8).to_le_bytes());
        fs::write(&path, image).unwrap();

        let err = find_section(&path, UPDATE_INFO_SECTION).unwrap_err();
        assert!(err.to_string().contains("impossible offset"));
    }

    #[test]
    fn test_corrupt_section_offset() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("runtime");
        let mut image = runtime_elf(16);
        // Entry 2 is .upd_info; sh_offset sits 24 bytes into the entry
        let entry = shoff(&image) + 2 * 64 + 24;
        image[entry..entry + 8].copy_from_slice(&(u64::MAX - 4).to_le_bytes());
        fs::write(&path, image).unwrap();

        assert!(find_section(&path, UPDATE_INFO_SECTION).is_err());
    }

    #[test]
    fn test_location_end() {
        let location = SectionLocation { offset: 96, length: 16 };
        assert_eq!(location.end(), Some(112));
        let location = SectionLocation { offset: u64::MAX, length: 1 };
        assert_eq!(location.end(), None);
    }
}
