//! AppDir inspection and the in-place edits packaging makes to it.
//!
//! An AppDir is the directory an AppImage is built from. Packaging requires:
//! - exactly one top-level `*.desktop` file with the keys in
//!   [`desktop::REQUIRED_KEYS`]
//! - an `Icon=` value that is a bare name (no path, no extension)
//! - a top-level `<Icon>.png`
//!
//! Packaging writes back two things: the version key into the desktop file
//! and a `.DirIcon` copy of the icon.

pub mod desktop;
pub mod validate;

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::PackError;
use desktop::{DesktopEntry, VERSION_KEY};
use validate::MetadataValidator;

/// Launcher every AppDir carries at its root.
pub const APPRUN: &str = "AppRun";

/// Icon file shown by file managers for the AppImage.
pub const DIR_ICON: &str = ".DirIcon";

/// Directory holding AppStream upstream metadata, relative to the AppDir.
pub const METAINFO_DIR: &str = "usr/share/metainfo";

/// A validated AppDir root.
#[derive(Debug, Clone)]
pub struct AppDir {
    root: PathBuf,
}

/// What packaging needs from the desktop entry.
#[derive(Debug, Clone)]
pub struct AppMetadata {
    pub desktop: DesktopEntry,
    /// `Name=` with spaces replaced by underscores.
    pub name: String,
    /// `Icon=` value, a bare name.
    pub icon_name: String,
}

impl AppDir {
    /// Open an AppDir, resolving symlinks in the path.
    pub fn open(path: &Path) -> Result<Self> {
        let root = fs::canonicalize(path)
            .map_err(|_| PackError::NotADirectory(path.to_path_buf()))?;
        if !root.is_dir() {
            return Err(PackError::NotADirectory(path.to_path_buf()).into());
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn apprun(&self) -> PathBuf {
        self.root.join(APPRUN)
    }

    pub fn icon_path(&self, icon_name: &str) -> PathBuf {
        self.root.join(format!("{}.png", icon_name))
    }

    pub fn dir_icon(&self) -> PathBuf {
        self.root.join(DIR_ICON)
    }

    /// Expected AppStream file for a desktop file.
    pub fn appstream_path(&self, desktop_file: &Path) -> PathBuf {
        let base = desktop_file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.root
            .join(METAINFO_DIR)
            .join(format!("{}.appdata.xml", base))
    }

    /// Top-level `*.desktop` files, sorted by name.
    pub fn desktop_files(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in fs::read_dir(&self.root)
            .with_context(|| format!("reading AppDir '{}'", self.root.display()))?
        {
            let entry = entry?;
            let path = entry.path();
            let is_desktop = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(".desktop"));
            if is_desktop && path.is_file() {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    /// The single top-level desktop file.
    pub fn desktop_file(&self) -> Result<PathBuf> {
        let mut files = self.desktop_files()?;
        match files.len() {
            0 => Err(PackError::NoDesktopFile(self.root.clone()).into()),
            1 => Ok(files.remove(0)),
            _ => Err(PackError::MultipleDesktopFiles {
                dir: self.root.clone(),
                files: files
                    .iter()
                    .filter_map(|f| f.file_name())
                    .map(|n| n.to_string_lossy().into_owned())
                    .collect(),
            }
            .into()),
        }
    }

    /// Find, validate and read the desktop entry.
    pub fn inspect(&self, validator: &dyn MetadataValidator) -> Result<AppMetadata> {
        let desktop_file = self.desktop_file()?;
        tracing::info!("Desktop file: {}", desktop_file.display());

        validator.validate_desktop_file(&desktop_file)?;

        let desktop = DesktopEntry::load(&desktop_file)?;
        if let Some(key) = desktop.missing_required_key() {
            return Err(PackError::MissingDesktopKey(key.to_string()).into());
        }

        // Both keys are present after the required-key check
        let icon_name = desktop.get("Icon").unwrap_or_default().to_string();
        check_icon_name(&icon_name)?;
        let name = sanitize_name(desktop.get("Name").unwrap_or_default());

        Ok(AppMetadata {
            desktop,
            name,
            icon_name,
        })
    }

    /// Path of the PNG matching `Icon=`; fails if it is not there.
    pub fn find_icon(&self, icon_name: &str) -> Result<PathBuf> {
        // PNG only: thumbnails must be PNG and converting at integration
        // time is expensive
        let icon = self.icon_path(icon_name);
        if !icon.is_file() {
            return Err(PackError::IconNotFound(icon).into());
        }
        Ok(icon)
    }

    /// Replace `.DirIcon` with a copy of `icon`.
    pub fn install_dir_icon(&self, icon: &Path) -> Result<PathBuf> {
        let dir_icon = self.dir_icon();
        if dir_icon.exists() || dir_icon.is_symlink() {
            tracing::info!("Deleting pre-existing {}", DIR_ICON);
            fs::remove_file(&dir_icon)
                .with_context(|| format!("removing {}", dir_icon.display()))?;
        }

        tracing::info!("Copying {} in place based on information from desktop file", DIR_ICON);
        fs::copy(icon, &dir_icon).with_context(|| {
            format!("copying {} to {}", icon.display(), dir_icon.display())
        })?;
        Ok(dir_icon)
    }

    /// Validate AppStream metadata if the AppDir ships any.
    ///
    /// Missing metadata is only a warning.
    pub fn check_appstream(
        &self,
        desktop_file: &Path,
        validator: &dyn MetadataValidator,
    ) -> Result<()> {
        let appstream = self.appstream_path(desktop_file);
        if !appstream.is_file() {
            tracing::warn!(
                "AppStream upstream metadata is missing, please consider creating it in {}",
                appstream.display()
            );
            tracing::warn!(
                "see https://www.freedesktop.org/software/appstream/docs/chap-Quickstart.html#sect-Quickstart-DesktopApps"
            );
            return Ok(());
        }
        validator.validate_appstream(&self.root)
    }
}

/// Record the packaged version in the desktop entry and save it.
pub fn write_version(desktop: &mut DesktopEntry, version: &str) -> Result<()> {
    desktop.set(VERSION_KEY, version);
    desktop.save()
}

/// `Icon=` must be a bare icon name.
pub fn check_icon_name(icon_name: &str) -> Result<()> {
    if icon_name.contains('/') {
        return Err(PackError::IconHasPath(icon_name.to_string()).into());
    }
    if icon_name.contains('.') {
        return Err(PackError::IconHasDot(icon_name.to_string()).into());
    }
    Ok(())
}

pub fn sanitize_name(name: &str) -> String {
    name.replace(' ', "_")
}

/// `<name>-<version>-<arch>.AppImage`
pub fn artifact_file_name(name: &str, version: &str, arch: &str) -> String {
    format!("{}-{}-{}.AppImage", name, version, arch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct AcceptAll;

    impl MetadataValidator for AcceptAll {
        fn validate_desktop_file(&self, _: &Path) -> Result<()> {
            Ok(())
        }
        fn validate_appstream(&self, _: &Path) -> Result<()> {
            Ok(())
        }
    }

    struct RejectAppStream;

    impl MetadataValidator for RejectAppStream {
        fn validate_desktop_file(&self, _: &Path) -> Result<()> {
            Ok(())
        }
        fn validate_appstream(&self, _: &Path) -> Result<()> {
            anyhow::bail!("invalid metainfo")
        }
    }

    fn write_desktop(dir: &Path, file: &str, icon: &str) {
        fs::write(
            dir.join(file),
            format!(
                "[Desktop Entry]\nType=Application\nName=My App\nExec=myapp\nIcon={}\nCategories=Utility;\n",
                icon
            ),
        )
        .unwrap();
    }

    fn pack_error(err: &anyhow::Error) -> &PackError {
        err.downcast_ref::<PackError>().expect("PackError root cause")
    }

    #[test]
    fn test_open_rejects_files() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("file");
        fs::write(&file, "").unwrap();

        let err = AppDir::open(&file).unwrap_err();
        assert!(matches!(pack_error(&err), PackError::NotADirectory(_)));
        let err = AppDir::open(&temp.path().join("missing")).unwrap_err();
        assert!(matches!(pack_error(&err), PackError::NotADirectory(_)));
    }

    #[test]
    fn test_no_desktop_file() {
        let temp = TempDir::new().unwrap();
        let appdir = AppDir::open(temp.path()).unwrap();
        let err = appdir.inspect(&AcceptAll).unwrap_err();
        assert!(matches!(pack_error(&err), PackError::NoDesktopFile(_)));
    }

    #[test]
    fn test_multiple_desktop_files() {
        let temp = TempDir::new().unwrap();
        write_desktop(temp.path(), "a.desktop", "icon");
        write_desktop(temp.path(), "b.desktop", "icon");
        let appdir = AppDir::open(temp.path()).unwrap();

        let err = appdir.inspect(&AcceptAll).unwrap_err();
        match pack_error(&err) {
            PackError::MultipleDesktopFiles { files, .. } => {
                assert_eq!(files, &["a.desktop", "b.desktop"]);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_nested_desktop_files_ignored() {
        let temp = TempDir::new().unwrap();
        write_desktop(temp.path(), "Foo.desktop", "myicon");
        fs::create_dir_all(temp.path().join("usr/share/applications")).unwrap();
        write_desktop(&temp.path().join("usr/share/applications"), "Foo.desktop", "myicon");

        let appdir = AppDir::open(temp.path()).unwrap();
        let meta = appdir.inspect(&AcceptAll).unwrap();
        assert_eq!(meta.name, "My_App");
        assert_eq!(meta.icon_name, "myicon");
    }

    #[test]
    fn test_missing_key() {
        let temp = TempDir::new().unwrap();
        fs::write(
            temp.path().join("Foo.desktop"),
            "[Desktop Entry]\nType=Application\nName=Foo\nIcon=foo\nCategories=Utility;\n",
        )
        .unwrap();
        let appdir = AppDir::open(temp.path()).unwrap();
        let err = appdir.inspect(&AcceptAll).unwrap_err();
        assert!(matches!(pack_error(&err), PackError::MissingDesktopKey(k) if k == "Exec"));
    }

    #[test]
    fn test_icon_rules() {
        assert!(check_icon_name("myicon").is_ok());

        let err = check_icon_name("usr/share/icons/myicon").unwrap_err();
        assert!(matches!(pack_error(&err), PackError::IconHasPath(_)));

        let err = check_icon_name("myicon.png").unwrap_err();
        assert!(matches!(pack_error(&err), PackError::IconHasDot(_)));
    }

    #[test]
    fn test_icon_with_dot_rejected_by_inspect() {
        let temp = TempDir::new().unwrap();
        write_desktop(temp.path(), "Foo.desktop", "org.acme.foo");
        let appdir = AppDir::open(temp.path()).unwrap();
        let err = appdir.inspect(&AcceptAll).unwrap_err();
        assert!(matches!(pack_error(&err), PackError::IconHasDot(_)));
    }

    #[test]
    fn test_find_icon_and_dir_icon() {
        let temp = TempDir::new().unwrap();
        let appdir = AppDir::open(temp.path()).unwrap();

        let err = appdir.find_icon("myicon").unwrap_err();
        assert!(matches!(pack_error(&err), PackError::IconNotFound(_)));

        fs::write(temp.path().join("myicon.png"), b"\x89PNG new").unwrap();
        std::os::unix::fs::symlink("stale.png", temp.path().join(DIR_ICON)).unwrap();

        let icon = appdir.find_icon("myicon").unwrap();
        let dir_icon = appdir.install_dir_icon(&icon).unwrap();

        assert!(!dir_icon.is_symlink());
        assert_eq!(fs::read(&dir_icon).unwrap(), b"\x89PNG new");
    }

    #[test]
    fn test_appstream_optional_but_validated() {
        let temp = TempDir::new().unwrap();
        write_desktop(temp.path(), "Foo.desktop", "myicon");
        let appdir = AppDir::open(temp.path()).unwrap();
        let desktop_file = appdir.desktop_file().unwrap();

        // Missing metadata only warns
        appdir.check_appstream(&desktop_file, &RejectAppStream).unwrap();

        let metainfo = appdir.appstream_path(&desktop_file);
        assert!(metainfo.ends_with("usr/share/metainfo/Foo.desktop.appdata.xml"));
        fs::create_dir_all(metainfo.parent().unwrap()).unwrap();
        fs::write(&metainfo, "<component/>").unwrap();

        assert!(appdir.check_appstream(&desktop_file, &RejectAppStream).is_err());
        assert!(appdir.check_appstream(&desktop_file, &AcceptAll).is_ok());
    }

    #[test]
    fn test_write_version() {
        let temp = TempDir::new().unwrap();
        write_desktop(temp.path(), "Foo.desktop", "myicon");
        let appdir = AppDir::open(temp.path()).unwrap();
        let mut meta = appdir.inspect(&AcceptAll).unwrap();

        write_version(&mut meta.desktop, "1.0").unwrap();
        let saved = fs::read_to_string(temp.path().join("Foo.desktop")).unwrap();
        assert!(saved.contains("X-AppImage-Version=1.0\n"));
        assert!(saved.contains("Name=My App\n"));
    }

    #[test]
    fn test_artifact_file_name() {
        assert_eq!(
            artifact_file_name(&sanitize_name("My App"), "1.0", "x86_64"),
            "My_App-1.0-x86_64.AppImage"
        );
    }
}
