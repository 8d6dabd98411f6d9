//! The active-plugin set and its persistence.

use std::fs;

use indexmap::IndexSet;
use regex::Regex;

use crate::error::{Error, Result};
use crate::models::game::{GameId, GameSettings};
use crate::models::plugin::PluginName;
use crate::services::encoding::{self, Transcoder};
use crate::services::esp::RecordReader;
use crate::state::path_mtime_secs;

/// The engines stop reading the active list after 255 entries.
pub const MAX_ACTIVE_PLUGINS: usize = 255;

/// The set of plugins the engine will actually load, plus a
/// modification-time watermark over the active-plugins file.
///
/// Iteration follows insertion order, which is also the order the
/// entries are written back for games that don't order the file by
/// load order. Morrowind's set lives inside `Morrowind.ini` as
/// `GameFileN=` entries; everything before and including the
/// `[Game Files]` header is preserved verbatim across saves.
#[derive(Debug, Default)]
pub struct ActivePlugins {
    plugins: IndexSet<PluginName>,
    mtime: Option<i64>,
}

impl ActivePlugins {
    pub fn new() -> Self {
        ActivePlugins::default()
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    pub fn contains(&self, name: &PluginName) -> bool {
        self.plugins.contains(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PluginName> {
        self.plugins.iter()
    }

    pub fn insert(&mut self, name: PluginName) -> bool {
        self.plugins.insert(name)
    }

    pub fn remove(&mut self, name: &PluginName) -> bool {
        self.plugins.shift_remove(name)
    }

    pub fn replace(&mut self, plugins: IndexSet<PluginName>) {
        self.plugins = plugins;
    }

    /// Rebuilds the set from the active-plugins file. A missing file
    /// yields just the game's implicit plugins.
    pub fn load(&mut self, settings: &GameSettings) -> Result<()> {
        self.plugins.clear();

        let file = settings.active_plugins_file();
        if file.exists() {
            let text = encoding::read_windows_1252(file)?;
            if settings.id() == GameId::Morrowind {
                self.parse_morrowind_ini(&text);
            } else {
                self.parse_plugins_file(&text);
            }
            self.mtime = Some(path_mtime_secs(file)?);
        } else {
            self.mtime = None;
        }

        // The game master is always implied; other implicit plugins
        // only when they are installed.
        let master = settings.master_name();
        for implicit in settings.implicit_plugins() {
            if implicit == &master || settings.plugin(implicit).exists() {
                self.plugins.insert(implicit.clone());
            }
        }

        while self.plugins.len() > MAX_ACTIVE_PLUGINS {
            if let Some(dropped) = self.plugins.pop() {
                tracing::warn!(
                    plugin = %dropped,
                    "dropping an active plugin beyond the {MAX_ACTIVE_PLUGINS} cap"
                );
            }
        }

        tracing::debug!(
            game = ?settings.id(),
            active = self.plugins.len(),
            "active plugins reloaded"
        );
        Ok(())
    }

    /// Truncates and rewrites the active-plugins file.
    ///
    /// `order` must be the current load order for textfile games,
    /// whose file lists entries in load order and leaves the game
    /// master implied; timestamp games pass `None` and write in set
    /// order. A name that cannot be encoded in Windows-1252 is skipped
    /// and reported as the non-fatal [`Error::BadFilename`] once the
    /// rest of the file has been written.
    pub fn save(&mut self, settings: &GameSettings, order: Option<&[PluginName]>) -> Result<()> {
        let file = settings.active_plugins_file();

        let mut out: Vec<u8> = Vec::new();
        if settings.id() == GameId::Morrowind && file.exists() {
            let bytes = fs::read(file).map_err(|source| Error::FileRead {
                path: file.to_path_buf(),
                source,
            })?;
            if let Some(position) = find_subslice(&bytes, b"[Game Files]") {
                out.extend_from_slice(&bytes[..position + b"[Game Files]".len()]);
                out.push(b'\n');
            }
        }

        let mut bad_name: Option<String> = None;
        match order {
            Some(sequence) => {
                let master = settings.master_name();
                for name in sequence {
                    if !self.plugins.contains(name) || name == &master {
                        continue;
                    }
                    match Transcoder::encode(name.name()) {
                        Ok(encoded) => {
                            out.extend_from_slice(&encoded);
                            out.push(b'\n');
                        }
                        Err(_) => bad_name = Some(name.name().to_string()),
                    }
                }
            }
            None => {
                for (index, name) in self.plugins.iter().enumerate() {
                    match Transcoder::encode(name.name()) {
                        Ok(encoded) => {
                            if settings.id() == GameId::Morrowind {
                                out.extend_from_slice(format!("GameFile{index}=").as_bytes());
                            }
                            out.extend_from_slice(&encoded);
                            out.push(b'\n');
                        }
                        Err(_) => bad_name = Some(name.name().to_string()),
                    }
                }
            }
        }

        if let Some(parent) = file.parent() {
            fs::create_dir_all(parent).map_err(|source| Error::FileWrite {
                path: file.to_path_buf(),
                source,
            })?;
        }
        fs::write(file, out).map_err(|source| Error::FileWrite {
            path: file.to_path_buf(),
            source,
        })?;
        self.mtime = Some(path_mtime_secs(file)?);
        tracing::debug!(game = ?settings.id(), active = self.plugins.len(), "active plugins saved");

        if let Some(name) = bad_name {
            tracing::warn!(%name, "active plugins file written without an unencodable name");
            return Err(Error::BadFilename { name });
        }
        Ok(())
    }

    /// Checks the loaded-state rules: at most 255 entries, every entry
    /// installed, every entry's declared masters active, and the
    /// game's implicit plugins present.
    pub fn is_valid(&self, settings: &GameSettings, reader: &dyn RecordReader) -> bool {
        if self.plugins.len() > MAX_ACTIVE_PLUGINS {
            return false;
        }
        for name in &self.plugins {
            let plugin = settings.plugin(name);
            if !plugin.exists() {
                return false;
            }
            let masters = match plugin.masters(reader) {
                Ok(masters) => masters,
                Err(_) => return false,
            };
            if masters.iter().any(|master| !self.plugins.contains(master)) {
                return false;
            }
        }

        let master = settings.master_name();
        for implicit in settings.implicit_plugins() {
            let required = implicit == &master || settings.plugin(implicit).exists();
            if required && !self.plugins.contains(implicit) {
                return false;
            }
        }
        true
    }

    /// Whether the active-plugins file has moved past the cached
    /// watermark. An empty set counts as changed; a missing file does
    /// not.
    pub fn has_changed(&self, settings: &GameSettings) -> Result<bool> {
        if self.plugins.is_empty() {
            return Ok(true);
        }
        let file = settings.active_plugins_file();
        if !file.exists() {
            return Ok(false);
        }
        let Some(cached) = self.mtime else {
            return Ok(true);
        };
        Ok(path_mtime_secs(file)? > cached)
    }

    fn parse_morrowind_ini(&mut self, text: &str) {
        let game_file_line = Regex::new(r"(?i)^GameFile[0-9]{1,3}=.+\.es[mp]$")
            .expect("Invalid game file line regex");
        for line in text.lines() {
            if !game_file_line.is_match(line) {
                continue;
            }
            let Some(equals) = line.find('=') else {
                continue;
            };
            let name = PluginName::new(&line[equals + 1..]);
            if name.is_valid() {
                self.plugins.insert(name);
            }
        }
    }

    fn parse_plugins_file(&mut self, text: &str) {
        for line in text.lines() {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let name = PluginName::new(line);
            if name.is_valid() {
                self.plugins.insert(name);
            }
        }
    }
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|window| window == needle)
}
