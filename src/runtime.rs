//! Runtime binary lookup.
//!
//! Runtimes ship as one file per architecture named `runtime-<arch>`.
//! Resolution order:
//! 1. `[runtime] search_dirs` from the settings file
//! 2. `<exe dir>/../share/AppImageKit/runtime` (installed layout)
//! 3. `<exe dir>` (unpacked release layout)
//! 4. `<user data dir>/AppImageKit/runtime`

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::arch::Architecture;
use crate::config::RuntimeSettings;
use crate::error::PackError;

/// A runtime picked for a build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeBinary {
    pub path: PathBuf,
    /// Byte length: the size of the region reserved at the head of the image.
    pub len: u64,
}

impl RuntimeBinary {
    pub fn offset(&self) -> u64 {
        self.len
    }
}

/// `runtime-<arch>`
pub fn runtime_file_name(arch: &Architecture) -> String {
    format!("runtime-{}", arch)
}

/// Ordered list of directories searched for runtimes.
#[derive(Debug, Clone, Default)]
pub struct RuntimeSearchPath {
    dirs: Vec<PathBuf>,
}

impl RuntimeSearchPath {
    pub fn new(dirs: Vec<PathBuf>) -> Self {
        Self { dirs }
    }

    /// Configured directories followed by the built-in ones.
    pub fn from_settings(settings: &RuntimeSettings) -> Self {
        let mut dirs = settings.search_dirs.clone();

        if let Some(here) = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
        {
            dirs.push(here.join("../share/AppImageKit/runtime"));
            dirs.push(here);
        }
        if let Some(data) = dirs::data_dir() {
            dirs.push(data.join("AppImageKit/runtime"));
        }

        Self { dirs }
    }

    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }

    /// First `runtime-<arch>` found on the search path.
    pub fn locate(&self, arch: &Architecture) -> Result<RuntimeBinary> {
        let file = runtime_file_name(arch);

        let Some(path) = self
            .dirs
            .iter()
            .map(|dir| dir.join(&file))
            .find(|candidate| candidate.is_file())
        else {
            return Err(PackError::RuntimeNotFound {
                file,
                searched: self.dirs.clone(),
            }
            .into());
        };

        let len = fs::metadata(&path)
            .with_context(|| format!("reading size of runtime {}", path.display()))?
            .len();
        if len == 0 {
            bail!("runtime {} is empty", path.display());
        }

        tracing::info!("Using runtime {} ({} bytes)", path.display(), len);
        Ok(RuntimeBinary { path, len })
    }
}
