//! Plugin identity and on-disk introspection.
//!
//! [`PluginName`] is the value type the whole crate keys on: a plugin
//! filename with any `.ghost` suffix stripped, compared and hashed
//! case-insensitively. [`Plugin`] pairs a name with a game's settings
//! and answers questions about the file behind it.

use std::fmt;
use std::fs;
use std::hash::{Hash, Hasher};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use camino::Utf8PathBuf;

use crate::error::{Error, Result};
use crate::models::game::{GameId, GameSettings};
use crate::services::esp::RecordReader;

/// A plugin filename in canonical form.
///
/// Construction strips a trailing `\r` (files written with Windows
/// line endings) and a case-insensitive `.ghost` suffix, so
/// `"Mod.esp.ghost"` and `"MOD.ESP"` both compare equal to
/// `"Mod.esp"`. Equality, ordering and hashing all use a Unicode
/// lowercased key; the original spelling is preserved for display and
/// for writing back to disk.
#[derive(Debug, Clone)]
pub struct PluginName {
    name: String,
    folded: String,
}

impl PluginName {
    pub fn new(filename: &str) -> Self {
        let mut name = filename.strip_suffix('\r').unwrap_or(filename);
        if name.len() >= 6 && name.as_bytes()[name.len() - 6..].eq_ignore_ascii_case(b".ghost") {
            name = &name[..name.len() - 6];
        }
        PluginName {
            name: name.to_string(),
            folded: name.to_lowercase(),
        }
    }

    /// The canonical (de-ghosted) filename.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// True iff the extension is `.esp` or `.esm`, case-insensitively.
    pub fn is_valid(&self) -> bool {
        self.folded.ends_with(".esp") || self.folded.ends_with(".esm")
    }

    /// True iff the extension claims master status (`.esm`).
    pub(crate) fn has_master_extension(&self) -> bool {
        self.folded.ends_with(".esm")
    }
}

impl PartialEq for PluginName {
    fn eq(&self, other: &Self) -> bool {
        self.folded == other.folded
    }
}

impl Eq for PluginName {}

impl Hash for PluginName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.folded.hash(state);
    }
}

impl fmt::Display for PluginName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

impl From<&str> for PluginName {
    fn from(filename: &str) -> Self {
        PluginName::new(filename)
    }
}

/// A plugin name viewed against one game's data folder.
///
/// All file-level operations resolve ghosting first: a plugin stored
/// as `<name>.ghost` is read and stamped through that path, and only
/// [`Plugin::unghost`] ever renames it.
#[derive(Debug, Clone, Copy)]
pub struct Plugin<'a> {
    name: &'a PluginName,
    settings: &'a GameSettings,
}

impl<'a> Plugin<'a> {
    pub fn new(name: &'a PluginName, settings: &'a GameSettings) -> Self {
        Plugin { name, settings }
    }

    pub fn name(&self) -> &PluginName {
        self.name
    }

    fn plain_path(&self) -> Utf8PathBuf {
        self.settings.plugins_folder().join(self.name.name())
    }

    fn ghost_path(&self) -> Utf8PathBuf {
        self.settings
            .plugins_folder()
            .join(format!("{}.ghost", self.name.name()))
    }

    /// True iff the plain or ghosted file exists.
    pub fn exists(&self) -> bool {
        self.plain_path().exists() || self.ghost_path().exists()
    }

    pub fn is_ghosted(&self) -> bool {
        self.ghost_path().exists()
    }

    /// The path file-level operations act on: the ghosted path when the
    /// plugin is ghosted, the plain path otherwise.
    pub fn resolved_path(&self) -> Utf8PathBuf {
        if self.is_ghosted() {
            self.ghost_path()
        } else {
            self.plain_path()
        }
    }

    /// The file's modification time in whole seconds since the Unix
    /// epoch. Second granularity matches what `last_write_time` offers
    /// portably; sub-second changes within the same second can be
    /// missed by freshness checks.
    pub fn modification_time(&self) -> Result<i64> {
        let path = self.resolved_path();
        let metadata = fs::metadata(&path).map_err(|source| Error::TimestampRead {
            path: path.clone(),
            source,
        })?;
        let modified = metadata
            .modified()
            .map_err(|source| Error::TimestampRead { path, source })?;
        Ok(system_time_to_secs(modified))
    }

    /// Overwrites the file's modification time.
    pub fn set_modification_time(&self, secs: i64) -> Result<()> {
        let path = self.resolved_path();
        let file = fs::OpenOptions::new()
            .write(true)
            .open(&path)
            .map_err(|source| Error::TimestampWrite {
                path: path.clone(),
                source,
            })?;
        file.set_modified(secs_to_system_time(secs))
            .map_err(|source| Error::TimestampWrite { path, source })?;
        Ok(())
    }

    /// Renames `<name>.ghost` back to `<name>`. A no-op when the plugin
    /// is not ghosted.
    pub fn unghost(&self) -> Result<()> {
        if !self.is_ghosted() {
            return Ok(());
        }
        let from = self.ghost_path();
        fs::rename(&from, self.plain_path()).map_err(|source| Error::Rename { path: from, source })
    }

    /// Whether the master-flag bit is set in the plugin's header.
    ///
    /// For Morrowind the flag does not exist and the extension decides.
    pub fn is_master(&self, reader: &dyn RecordReader) -> Result<bool> {
        if self.settings.id() == GameId::Morrowind {
            return Ok(self.name.has_master_extension());
        }
        reader.is_master(&self.resolved_path())
    }

    /// The masters declared in the plugin's header, in declaration order.
    pub fn masters(&self, reader: &dyn RecordReader) -> Result<Vec<PluginName>> {
        let masters = reader.masters(&self.resolved_path())?;
        Ok(masters.iter().map(|m| PluginName::new(m)).collect())
    }

    /// True iff the master flag and the filename extension disagree.
    /// Diagnostic only; ordering is driven solely by the flag.
    pub fn is_false_flagged(&self, reader: &dyn RecordReader) -> Result<bool> {
        Ok(self.is_master(reader)? != self.name.has_master_extension())
    }
}

pub(crate) fn system_time_to_secs(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(elapsed) => elapsed.as_secs() as i64,
        Err(before_epoch) => -(before_epoch.duration().as_secs() as i64),
    }
}

fn secs_to_system_time(secs: i64) -> SystemTime {
    if secs >= 0 {
        UNIX_EPOCH + Duration::from_secs(secs as u64)
    } else {
        UNIX_EPOCH - Duration::from_secs(secs.unsigned_abs())
    }
}
