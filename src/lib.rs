//! Turns an AppDir into an AppImage.
//!
//! An AppImage is a single executable file: a small ELF runtime followed by
//! a squashfs image of the AppDir. When started, the runtime mounts the image
//! that follows it and executes `AppRun`.
//!
//! - **AppDir checks** - Desktop entry, icon and AppStream validation
//! - **Architecture** - `$ARCH`, then `AppRun`, then the bundled libraries
//! - **Assembly** - `mksquashfs -offset` plus the runtime written at byte 0
//! - **Update information** - Composed from CI context, patched into `.upd_info`
//! - **Delta metadata** - `.zsync` control file for incremental updates
//!
//! # Architecture
//!
//! ```text
//! appimagetool (binary)
//!     │
//!     ├── preflight: host tools present, mksquashfs >= 4.3
//!     ├── config:    Settings (TOML) + BuildEnv (environment snapshot)
//!     │
//!     └── pipeline::Packager
//!             ├── appdir     desktop entry, icon, .DirIcon, AppStream
//!             ├── arch       architecture resolution
//!             ├── runtime    runtime-<arch> lookup
//!             ├── artifact   squashfs image + embedded runtime
//!             ├── update_info / patch   .upd_info section
//!             └── zsync      <artifact>.zsync
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use appimagetool::appdir::validate::ToolValidator;
//! use appimagetool::artifact::squashfs::Mksquashfs;
//! use appimagetool::{BuildEnv, Packager, RuntimeSearchPath, Settings, ZsyncOptions};
//!
//! let settings = Settings::default();
//! let env = BuildEnv::from_env();
//! let runtimes = RuntimeSearchPath::from_settings(&settings.runtime);
//! let packager = Packager {
//!     env: &env,
//!     runtimes: &runtimes,
//!     image_builder: &Mksquashfs::default(),
//!     validator: &ToolValidator,
//!     zsync: ZsyncOptions::default(),
//! };
//! let report = packager.package("Foo.AppDir".as_ref(), ".".as_ref())?;
//! ```

pub mod appdir;
pub mod arch;
pub mod artifact;
pub mod config;
pub mod elf;
pub mod error;
pub mod patch;
pub mod pipeline;
pub mod preflight;
pub mod process;
pub mod runtime;
pub mod update_info;
pub mod zsync;

#[cfg(test)]
mod test_support;

pub use arch::Architecture;
pub use config::{BuildEnv, CiContext, Settings};
pub use error::PackError;
pub use pipeline::{BuildReport, Packager};
pub use runtime::RuntimeSearchPath;
pub use update_info::UpdateInfo;
pub use zsync::ZsyncOptions;
