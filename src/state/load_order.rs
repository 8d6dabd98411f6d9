//! The ordered plugin sequence and its persistence.

use std::collections::HashSet;
use std::fs;

use crate::error::{Error, Result};
use crate::models::game::{GameSettings, LoadOrderMethod};
use crate::models::plugin::PluginName;
use crate::services::encoding;
use crate::services::esp::RecordReader;
use crate::state::path_mtime_secs;

/// The load order of one game: an ordered sequence of plugin names
/// plus a modification-time watermark used to detect external edits.
///
/// Loaded state upholds five rules: the game master loads first, every
/// entry exists on disk (possibly ghosted), masters precede
/// non-masters, names are unique case-insensitively, and every
/// plugin's declared masters appear earlier in the sequence.
#[derive(Debug, Default)]
pub struct LoadOrder {
    plugins: Vec<PluginName>,
    mtime: Option<i64>,
}

impl LoadOrder {
    pub fn new() -> Self {
        LoadOrder::default()
    }

    pub fn as_slice(&self) -> &[PluginName] {
        &self.plugins
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Case-insensitive linear scan; returns `len()` when absent.
    pub fn find(&self, name: &PluginName) -> usize {
        self.plugins
            .iter()
            .position(|p| p == name)
            .unwrap_or(self.plugins.len())
    }

    /// Replaces the sequence wholesale. The caller is responsible for
    /// validity; [`LoadOrder::is_valid`] is callable afterwards.
    pub fn set(&mut self, plugins: Vec<PluginName>) {
        self.plugins = plugins;
    }

    pub fn clear(&mut self) {
        self.plugins.clear();
    }

    /// Moves `name` to `new_position`, inserting it when absent.
    ///
    /// Positions refer to the sequence *before* removal: moving a
    /// plugin towards the tail shifts the target index down by one to
    /// compensate for the hole it leaves behind. Out-of-range
    /// positions clamp to the tail.
    pub fn move_to(&mut self, name: &PluginName, new_position: usize) {
        let mut new_position = new_position;
        let position = self.find(name);
        if position < self.plugins.len() {
            if position < new_position {
                new_position -= 1;
            }
            self.plugins.remove(position);
        }
        let new_position = new_position.min(self.plugins.len());
        self.plugins.insert(new_position, name.clone());
    }

    /// The position of the last plugin in the leading run of masters.
    /// `None` when the sequence is empty or starts with a non-master.
    pub fn last_master_position(
        &self,
        settings: &GameSettings,
        reader: &dyn RecordReader,
    ) -> Option<usize> {
        self.leading_master_count(settings, reader).checked_sub(1)
    }

    /// Rebuilds the sequence from disk.
    ///
    /// Textfile games seed from `loadorder.txt` (strict UTF-8) or,
    /// failing that, from `plugins.txt`, then force the game master to
    /// the front and slot implicit masters in after the last master.
    /// All games then pick up any plugin files the seed missed from
    /// the data folder. Timestamp games finally sort masters-first by
    /// ascending modification time, ties keeping their prior position.
    pub fn load(&mut self, settings: &GameSettings, reader: &dyn RecordReader) -> Result<()> {
        self.plugins.clear();

        if settings.load_order_method() == LoadOrderMethod::Textfile {
            self.seed_from_files(settings)?;

            let master = settings.master_name();
            let position = self.find(&master);
            if position == self.plugins.len() {
                self.plugins.insert(0, master);
            } else if position != 0 {
                let entry = self.plugins.remove(position);
                self.plugins.insert(0, entry);
            }

            for implicit in settings.implicit_plugins() {
                if implicit == &settings.master_name()
                    || !settings.plugin(implicit).exists()
                    || self.find(implicit) < self.plugins.len()
                {
                    continue;
                }
                let at = self.leading_master_count(settings, reader);
                self.plugins.insert(at, implicit.clone());
            }
        }

        self.scan_plugins_folder(settings, reader)?;

        match settings.load_order_method() {
            // The timestamp sort is already masters-first; the seeded
            // textfile list still needs regrouping, since file entries
            // were taken in file order.
            LoadOrderMethod::Timestamp => self.sort_by_timestamps(settings, reader)?,
            LoadOrderMethod::Textfile => self.partition_masters(settings, reader),
        }

        // The engine loads the game master first regardless of what
        // the seed said; keep it at the front whenever it is installed.
        let master = settings.master_name();
        let position = self.find(&master);
        if position != 0 && position < self.plugins.len() {
            let entry = self.plugins.remove(position);
            self.plugins.insert(0, entry);
        }

        self.mtime = Some(watched_mtime(settings)?);
        tracing::debug!(
            game = ?settings.id(),
            plugins = self.plugins.len(),
            "load order reloaded"
        );
        Ok(())
    }

    /// Persists the sequence.
    ///
    /// Timestamp games rewrite as few modification times as possible:
    /// walking the sequence, any entry not strictly newer than its
    /// predecessor is stamped to the predecessor's time plus sixty
    /// seconds. Textfile games truncate and rewrite `loadorder.txt`,
    /// one name per line.
    pub fn save(&mut self, settings: &GameSettings) -> Result<()> {
        match settings.load_order_method() {
            LoadOrderMethod::Timestamp => self.save_timestamps(settings)?,
            LoadOrderMethod::Textfile => self.save_textfile(settings)?,
        }
        tracing::debug!(game = ?settings.id(), "load order saved");
        Ok(())
    }

    /// Checks the five loaded-state rules against the live filesystem
    /// and the record reader. Unreadable headers count as invalid.
    pub fn is_valid(&self, settings: &GameSettings, reader: &dyn RecordReader) -> bool {
        let Some(first) = self.plugins.first() else {
            return false;
        };
        if first != &settings.master_name() {
            return false;
        }

        let mut seen: HashSet<&PluginName> = HashSet::new();
        let mut past_masters = false;
        for name in &self.plugins {
            let plugin = settings.plugin(name);
            if !plugin.exists() {
                return false;
            }
            let is_master = match plugin.is_master(reader) {
                Ok(is_master) => is_master,
                Err(_) => return false,
            };
            if is_master && past_masters {
                return false;
            }
            if !is_master {
                past_masters = true;
            }
            if seen.contains(name) {
                return false;
            }
            let masters = match plugin.masters(reader) {
                Ok(masters) => masters,
                Err(_) => return false,
            };
            if masters.iter().any(|master| !seen.contains(master)) {
                return false;
            }
            seen.insert(name);
        }
        true
    }

    /// Whether the watched paths have moved past the cached watermark.
    /// An empty sequence always counts as changed.
    pub fn has_changed(&self, settings: &GameSettings) -> Result<bool> {
        if self.plugins.is_empty() {
            return Ok(true);
        }
        let Some(cached) = self.mtime else {
            return Ok(true);
        };
        Ok(watched_mtime(settings)? > cached)
    }

    /// The number of leading entries whose master flag is set.
    pub(crate) fn leading_master_count(
        &self,
        settings: &GameSettings,
        reader: &dyn RecordReader,
    ) -> usize {
        self.plugins
            .iter()
            .take_while(|name| is_master_lenient(settings, reader, name))
            .count()
    }

    fn seed_from_files(&mut self, settings: &GameSettings) -> Result<()> {
        let Some(order_file) = settings.load_order_file() else {
            return Ok(());
        };
        if order_file.exists() {
            let text = encoding::read_utf8(order_file)?;
            self.push_parsed_lines(settings, &text);
        } else if settings.active_plugins_file().exists() {
            let text = encoding::read_windows_1252(settings.active_plugins_file())?;
            self.push_parsed_lines(settings, &text);
        }
        Ok(())
    }

    fn push_parsed_lines(&mut self, settings: &GameSettings, text: &str) {
        for line in text.lines() {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let name = PluginName::new(line);
            if !name.is_valid() || !settings.plugin(&name).exists() {
                tracing::debug!(line, "skipping entry with no matching plugin file");
                continue;
            }
            // A name listed twice keeps its last position.
            let position = self.find(&name);
            if position < self.plugins.len() {
                self.plugins.remove(position);
            }
            self.plugins.push(name);
        }
    }

    fn scan_plugins_folder(
        &mut self,
        settings: &GameSettings,
        reader: &dyn RecordReader,
    ) -> Result<()> {
        let folder = settings.plugins_folder();
        if !folder.is_dir() {
            return Ok(());
        }

        let mut filenames = Vec::new();
        let entries = fs::read_dir(folder).map_err(|source| Error::FileRead {
            path: folder.to_path_buf(),
            source,
        })?;
        for entry in entries {
            let entry = entry.map_err(|source| Error::FileRead {
                path: folder.to_path_buf(),
                source,
            })?;
            let is_file = entry
                .file_type()
                .map(|file_type| file_type.is_file())
                .unwrap_or(false);
            if !is_file {
                continue;
            }
            match entry.file_name().into_string() {
                Ok(filename) => filenames.push(filename),
                Err(other) => {
                    tracing::warn!(?other, "ignoring a non-UTF-8 filename in the data folder");
                }
            }
        }
        // Directory iteration order is platform-dependent.
        filenames.sort();

        let mut leading = self.leading_master_count(settings, reader);
        for filename in filenames {
            let name = PluginName::new(&filename);
            if !name.is_valid() || self.find(&name) < self.plugins.len() {
                continue;
            }
            if is_master_lenient(settings, reader, &name) {
                self.plugins.insert(leading, name);
                leading += 1;
            } else {
                self.plugins.push(name);
            }
        }
        Ok(())
    }

    /// Stable partition: masters keep their relative order ahead of
    /// everything else.
    fn partition_masters(&mut self, settings: &GameSettings, reader: &dyn RecordReader) {
        let mut masters = Vec::new();
        let mut others = Vec::new();
        for name in self.plugins.drain(..) {
            if is_master_lenient(settings, reader, &name) {
                masters.push(name);
            } else {
                others.push(name);
            }
        }
        masters.extend(others);
        self.plugins = masters;
    }

    fn sort_by_timestamps(
        &mut self,
        settings: &GameSettings,
        reader: &dyn RecordReader,
    ) -> Result<()> {
        let mut keys = Vec::with_capacity(self.plugins.len());
        for name in &self.plugins {
            let non_master = !is_master_lenient(settings, reader, name);
            let mtime = settings.plugin(name).modification_time()?;
            keys.push((non_master, mtime));
        }
        let mut indices: Vec<usize> = (0..self.plugins.len()).collect();
        indices.sort_by_key(|&index| (keys[index], index));
        let sorted: Vec<PluginName> = indices
            .into_iter()
            .map(|index| self.plugins[index].clone())
            .collect();
        self.plugins = sorted;
        Ok(())
    }

    fn save_timestamps(&mut self, settings: &GameSettings) -> Result<()> {
        if let Some((first, rest)) = self.plugins.split_first() {
            let mut last = settings.plugin(first).modification_time()?;
            for name in rest {
                let plugin = settings.plugin(name);
                let current = plugin.modification_time()?;
                if current > last {
                    last = current;
                } else {
                    // Space rewritten timestamps a minute apart.
                    last += 60;
                    plugin.set_modification_time(last)?;
                }
            }
        }
        self.mtime = Some(watched_mtime(settings)?);
        Ok(())
    }

    fn save_textfile(&mut self, settings: &GameSettings) -> Result<()> {
        let Some(file) = settings.load_order_file() else {
            return Err(Error::invalid_args("This game has no load order file."));
        };
        if let Some(parent) = file.parent() {
            fs::create_dir_all(parent).map_err(|source| Error::FileWrite {
                path: file.to_path_buf(),
                source,
            })?;
        }

        let mut contents = String::new();
        for name in &self.plugins {
            contents.push_str(name.name());
            contents.push('\n');
        }
        fs::write(file, contents).map_err(|source| Error::FileWrite {
            path: file.to_path_buf(),
            source,
        })?;

        self.mtime = Some(watched_mtime(settings)?);
        Ok(())
    }
}

fn is_master_lenient(
    settings: &GameSettings,
    reader: &dyn RecordReader,
    name: &PluginName,
) -> bool {
    match settings.plugin(name).is_master(reader) {
        Ok(is_master) => is_master,
        Err(err) => {
            tracing::debug!(plugin = %name, error = %err, "could not read the master flag");
            false
        }
    }
}

/// The newest mtime among the watched paths: the plugins folder, plus
/// `loadorder.txt` for textfile games.
fn watched_mtime(settings: &GameSettings) -> Result<i64> {
    let mut newest = i64::MIN;
    let folder = settings.plugins_folder();
    if folder.exists() {
        newest = newest.max(path_mtime_secs(folder)?);
    }
    if let Some(file) = settings.load_order_file() {
        if file.exists() {
            newest = newest.max(path_mtime_secs(file)?);
        }
    }
    Ok(newest)
}
