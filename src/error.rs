//! Failure kinds surfaced by the packaging pipeline.
//!
//! Library functions return [`anyhow::Result`] and raise a [`PackError`] as the
//! root cause whenever the failure belongs to one of the kinds below. Plain I/O
//! failures travel as `std::io::Error` wrapped in context. Callers that need to
//! branch on the kind use `err.downcast_ref::<PackError>()`.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PackError {
    // Missing dependencies
    #[error("required helper tool '{tool}' missing (install: {package})")]
    MissingTool { tool: String, package: String },

    #[error("{tool} version {found} is too old, at least {required} is needed")]
    ToolTooOld {
        tool: String,
        found: String,
        required: String,
    },

    // AppDir structure
    #[error("supplied argument is not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("no top-level desktop file found in {0}")]
    NoDesktopFile(PathBuf),

    #[error("multiple top-level desktop files found in {dir}: {files:?}")]
    MultipleDesktopFiles { dir: PathBuf, files: Vec<String> },

    #[error(".desktop file is missing a '{0}=' key")]
    MissingDesktopKey(String),

    #[error("desktop file contains Icon= entry with a path: '{0}'")]
    IconHasPath(String),

    #[error("desktop file contains Icon= entry with '.': '{0}'")]
    IconHasDot(String),

    #[error("could not find icon file at {0}")]
    IconNotFound(PathBuf),

    #[error("could not determine version automatically, please supply the application version as $VERSION")]
    MissingVersion,

    // Architecture
    #[error(
        "could not determine architecture automatically (candidates: {candidates:?}), please supply it as $ARCH"
    )]
    AmbiguousArchitecture { candidates: Vec<String> },

    // Build
    #[error("cannot find runtime '{file}' (searched: {searched:?})")]
    RuntimeNotFound {
        file: String,
        searched: Vec<PathBuf>,
    },

    #[error("{tool} failed with {status}\n{output}")]
    ImageBuild {
        tool: String,
        status: String,
        output: String,
    },

    #[error("{tool} did not finish within {secs}s")]
    Timeout { tool: String, secs: u64 },

    // Binary layout
    #[error("image is {len} bytes, shorter than the {offset}-byte runtime region")]
    RuntimeNotEmbedded { len: u64, offset: u64 },

    #[error("could not find section {section} in runtime")]
    SectionNotFound { section: String },

    #[error("update information ({len} bytes) does not fit into {section} section ({capacity} bytes)")]
    UpdateInfoTooLarge {
        section: String,
        len: usize,
        capacity: u64,
    },

    #[error("update information is not in a recognized format: '{0}'")]
    UnrecognizedUpdateInfo(String),
}
