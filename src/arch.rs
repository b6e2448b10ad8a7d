//! Target architecture resolution.
//!
//! Resolution order:
//! 1. `$ARCH` override (trusted, taken verbatim)
//! 2. ELF machine of the AppDir's `AppRun`
//! 3. Distinct ELF machines of every `*.so.*` file in the tree
//!
//! Step 3 must yield exactly one architecture. Zero or several is an error:
//! multi-architecture bundles are never merged and candidates are never
//! guessed between.

use anyhow::{bail, Context, Result};
use goblin::elf::header::{EM_386, EM_AARCH64, EM_ARM, EM_X86_64};
use goblin::elf::Elf;
use std::collections::BTreeSet;
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::thread;
use walkdir::WalkDir;

use crate::appdir::AppDir;
use crate::error::PackError;

/// Upper bound on concurrent shared-library probes.
const MAX_PROBE_WORKERS: usize = 8;

/// Bytes needed to parse any ELF header (ELF64 is the larger one).
const ELF_HEADER_LEN: u64 = 64;

/// CPU architecture of an AppImage, named the way runtime files are.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Architecture {
    I686,
    X86_64,
    Armhf,
    Aarch64,
    /// Name given through `$ARCH` that is not one of the above.
    Other(String),
}

impl Architecture {
    /// Map an ELF `e_machine` value.
    pub fn from_elf_machine(machine: u16) -> Option<Self> {
        match machine {
            EM_386 => Some(Self::I686),
            EM_X86_64 => Some(Self::X86_64),
            EM_ARM => Some(Self::Armhf),
            EM_AARCH64 => Some(Self::Aarch64),
            _ => None,
        }
    }

    /// Take an explicit override as-is.
    pub fn from_override(name: &str) -> Self {
        match name {
            "i686" => Self::I686,
            "x86_64" => Self::X86_64,
            "armhf" => Self::Armhf,
            "aarch64" => Self::Aarch64,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::I686 => "i686",
            Self::X86_64 => "x86_64",
            Self::Armhf => "armhf",
            Self::Aarch64 => "aarch64",
            Self::Other(name) => name,
        }
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read the ELF header of `path` and map its machine.
pub fn probe_elf(path: &Path) -> Result<Architecture> {
    let mut header = Vec::with_capacity(ELF_HEADER_LEN as usize);
    File::open(path)
        .with_context(|| format!("opening {}", path.display()))?
        .take(ELF_HEADER_LEN)
        .read_to_end(&mut header)
        .with_context(|| format!("reading {}", path.display()))?;

    let header = Elf::parse_header(&header)
        .with_context(|| format!("{} is not an ELF file", path.display()))?;

    match Architecture::from_elf_machine(header.e_machine) {
        Some(arch) => Ok(arch),
        None => bail!(
            "{} has unsupported ELF machine {}",
            path.display(),
            header.e_machine
        ),
    }
}

/// Resolve the architecture for `appdir`.
pub fn resolve(appdir: &AppDir, arch_override: Option<&str>) -> Result<Architecture> {
    if let Some(name) = arch_override {
        let arch = Architecture::from_override(name);
        tracing::info!("Architecture from $ARCH: {}", arch);
        return Ok(arch);
    }

    match probe_elf(&appdir.apprun()) {
        Ok(arch) => {
            tracing::info!("Architecture from AppRun: {}", arch);
            return Ok(arch);
        }
        Err(e) => tracing::debug!("AppRun does not tell the architecture: {:#}", e),
    }

    let mut found = scan_shared_libraries(appdir.root());
    if found.len() == 1 {
        if let Some(arch) = found.pop_first() {
            return Ok(arch);
        }
    }

    Err(PackError::AmbiguousArchitecture {
        candidates: found.iter().map(|a| a.to_string()).collect(),
    }
    .into())
}

/// Distinct architectures of all shared libraries below `root`.
///
/// Unreadable entries and files that fail to probe are logged and skipped.
pub fn scan_shared_libraries(root: &Path) -> BTreeSet<Architecture> {
    let candidates = shared_library_paths(root);
    let found = Mutex::new(BTreeSet::new());

    if candidates.is_empty() {
        return BTreeSet::new();
    }

    let workers = thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .clamp(1, MAX_PROBE_WORKERS);
    let chunk_len = candidates.len().div_ceil(workers);

    thread::scope(|scope| {
        for chunk in candidates.chunks(chunk_len) {
            let found = &found;
            scope.spawn(move || {
                for path in chunk {
                    match probe_elf(path) {
                        Ok(arch) => {
                            tracing::info!("Architecture of {}: {}", display_name(path), arch);
                            found
                                .lock()
                                .unwrap_or_else(PoisonError::into_inner)
                                .insert(arch);
                        }
                        Err(e) => tracing::warn!("Determine architecture: {:#}", e),
                    }
                }
            });
        }
    });

    found.into_inner().unwrap_or_else(PoisonError::into_inner)
}

fn shared_library_paths(root: &Path) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    for entry in WalkDir::new(root) {
        match entry {
            Ok(e) => {
                let is_shared_lib = e.file_name().to_string_lossy().contains(".so.");
                if !e.file_type().is_dir() && is_shared_lib {
                    paths.push(e.into_path());
                }
            }
            Err(e) => tracing::warn!("Determine architecture: {}", e),
        }
    }
    paths
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
