//! Desktop entry files (`*.desktop`).
//!
//! Only what packaging needs: read keys of the `[Desktop Entry]` group and
//! set a key in place. Every other line (comments, other groups, localized
//! keys) is kept byte-for-byte when the file is written back, line endings
//! included. Added lines use the file's own line ending.

use anyhow::{Context, Result};
use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};

/// Group holding the keys the pipeline reads.
pub const DESKTOP_ENTRY_GROUP: &str = "Desktop Entry";

/// Keys that must be present in [`DESKTOP_ENTRY_GROUP`].
pub const REQUIRED_KEYS: &[&str] = &["Categories", "Name", "Exec", "Type", "Icon"];

/// Key recording the packaged version.
pub const VERSION_KEY: &str = "X-AppImage-Version";

#[derive(Debug, Clone)]
pub struct DesktopEntry {
    path: PathBuf,
    lines: Vec<Line>,
    newline: &'static str,
}

/// One line of the file and the terminator it was read with.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Line {
    text: String,
    eol: &'static str,
}

impl Line {
    fn parse(raw: &str) -> Self {
        if let Some(text) = raw.strip_suffix("\r\n") {
            Self { text: text.to_string(), eol: "\r\n" }
        } else if let Some(text) = raw.strip_suffix('\n') {
            Self { text: text.to_string(), eol: "\n" }
        } else {
            Self { text: raw.to_string(), eol: "" }
        }
    }
}

impl DesktopEntry {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading desktop file '{}'", path.display()))?;
        Ok(Self::parse(path.to_path_buf(), &text))
    }

    pub fn parse(path: PathBuf, text: &str) -> Self {
        let lines: Vec<Line> = text.split_inclusive('\n').map(Line::parse).collect();
        let newline = match lines.first() {
            Some(line) if line.eol == "\r\n" => "\r\n",
            _ => "\n",
        };
        Self {
            path,
            lines,
            newline,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Value of `key` in the `[Desktop Entry]` group.
    pub fn get(&self, key: &str) -> Option<&str> {
        let range = self.group_range()?;
        self.lines[range]
            .iter()
            .find_map(|line| match parse_key_value(&line.text) {
                Some((k, v)) if k == key => Some(v),
                _ => None,
            })
    }

    pub fn has_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// First required key that is absent, if any.
    pub fn missing_required_key(&self) -> Option<&'static str> {
        REQUIRED_KEYS.iter().copied().find(|k| !self.has_key(k))
    }

    /// Set `key` in the `[Desktop Entry]` group, replacing an existing value.
    pub fn set(&mut self, key: &str, value: &str) {
        let entry = format!("{}={}", key, value);

        let Some(range) = self.group_range() else {
            if self.lines.last().is_some_and(|l| !l.text.trim().is_empty()) {
                self.insert_line(self.lines.len(), String::new());
            }
            self.insert_line(self.lines.len(), format!("[{}]", DESKTOP_ENTRY_GROUP));
            self.insert_line(self.lines.len(), entry);
            return;
        };

        if let Some(idx) = range
            .clone()
            .find(|&i| matches!(parse_key_value(&self.lines[i].text), Some((k, _)) if k == key))
        {
            self.lines[idx].text = entry;
            return;
        }

        // Append after the group's last non-blank line so trailing blank
        // lines keep separating it from the next group.
        let insert_at = range
            .clone()
            .rev()
            .find(|&i| !self.lines[i].text.trim().is_empty())
            .map(|i| i + 1)
            .unwrap_or(range.start);
        self.insert_line(insert_at, entry);
    }

    /// Insert before `index`, terminating the previous line if it had no
    /// line ending.
    fn insert_line(&mut self, index: usize, text: String) {
        if let Some(prev) = index.checked_sub(1).and_then(|i| self.lines.get_mut(i)) {
            if prev.eol.is_empty() {
                prev.eol = self.newline;
            }
        }
        self.lines.insert(
            index,
            Line {
                text,
                eol: self.newline,
            },
        );
    }

    pub fn render(&self) -> String {
        self.lines
            .iter()
            .flat_map(|line| [line.text.as_str(), line.eol])
            .collect()
    }

    pub fn save(&self) -> Result<()> {
        fs::write(&self.path, self.render())
            .with_context(|| format!("writing desktop file '{}'", self.path.display()))
    }

    /// Lines belonging to the `[Desktop Entry]` group, header excluded.
    fn group_range(&self) -> Option<Range<usize>> {
        let header = format!("[{}]", DESKTOP_ENTRY_GROUP);
        let start = self.lines.iter().position(|l| l.text.trim() == header)? + 1;
        let end = self.lines[start..]
            .iter()
            .position(|l| l.text.trim_start().starts_with('['))
            .map(|offset| start + offset)
            .unwrap_or(self.lines.len());
        Some(start..end)
    }
}

fn parse_key_value(line: &str) -> Option<(&str, &str)> {
    let trimmed = line.trim_start();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return None;
    }
    let (key, value) = trimmed.split_once('=')?;
    Some((key.trim(), value.trim()))
}
