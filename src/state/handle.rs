//! The public entry point: one handle per managed game.

use std::collections::HashSet;

use camino::Utf8Path;
use indexmap::IndexSet;

use crate::error::{Error, Result};
use crate::models::game::{GameId, GameSettings, LoadOrderMethod};
use crate::models::plugin::PluginName;
use crate::services::esp::{EspReader, RecordReader};
use crate::state::active_plugins::{ActivePlugins, MAX_ACTIVE_PLUGINS};
use crate::state::load_order::LoadOrder;

/// Aggregates one game's settings, load order, and active-plugin set.
///
/// The order files and the data folder are shared with other tools, so
/// every public operation starts by reconciling cached state against
/// the filesystem and ends by persisting and refreshing the cached
/// watermarks. A handle must not be used from concurrent executions;
/// multiple independent handles over the same game are allowed but
/// race like any other external writer.
pub struct GameHandle {
    settings: GameSettings,
    load_order: LoadOrder,
    active: ActivePlugins,
    reader: Box<dyn RecordReader>,
}

impl GameHandle {
    /// Creates a handle for `id` installed at `game_path`, with the
    /// order files located under the user's local application data
    /// directory.
    pub fn new(id: GameId, game_path: &Utf8Path) -> Result<Self> {
        Self::from_settings(GameSettings::new(id, game_path)?)
    }

    /// Like [`GameHandle::new`], with the local directory supplied by
    /// the caller.
    pub fn with_local_path(id: GameId, game_path: &Utf8Path, local_path: &Utf8Path) -> Result<Self> {
        Self::from_settings(GameSettings::with_local_path(id, game_path, local_path)?)
    }

    pub fn from_settings(settings: GameSettings) -> Result<Self> {
        let reader = Box::new(EspReader::new(settings.id()));
        Ok(GameHandle {
            settings,
            load_order: LoadOrder::new(),
            active: ActivePlugins::new(),
            reader,
        })
    }

    /// Substitutes the record reader, for embedders that already ship
    /// a full plugin parser.
    pub fn with_reader(mut self, reader: Box<dyn RecordReader>) -> Self {
        self.reader = reader;
        self
    }

    pub fn settings(&self) -> &GameSettings {
        &self.settings
    }

    /// The current load order, reloaded first if the filesystem has
    /// changed since it was last read or saved.
    pub fn load_order(&mut self) -> Result<&[PluginName]> {
        self.refresh_load_order()?;
        Ok(self.load_order.as_slice())
    }

    /// Replaces and persists the load order.
    ///
    /// The sequence must be non-empty, duplicate-free, made of
    /// installed plugins, partitioned masters-first, and ordered after
    /// each entry's declared masters. Textfile games additionally
    /// require the game master to be the first entry; timestamp games
    /// move it there when it is listed elsewhere.
    pub fn set_load_order(&mut self, names: &[&str]) -> Result<()> {
        if names.is_empty() {
            return Err(Error::invalid_args("An empty load order was supplied."));
        }
        let textfile = self.settings.load_order_method() == LoadOrderMethod::Textfile;
        let master = self.settings.master_name();

        let mut plugins = Vec::with_capacity(names.len());
        let mut seen: HashSet<PluginName> = HashSet::with_capacity(names.len());
        for raw in names {
            let name = PluginName::new(raw);
            if !name.is_valid() || !self.settings.plugin(&name).exists() {
                return Err(Error::invalid_args(format!(
                    "\"{name}\" is not a valid plugin file."
                )));
            }
            if !seen.insert(name.clone()) {
                return Err(Error::invalid_args(format!(
                    "\"{name}\" is a duplicate entry."
                )));
            }
            plugins.push(name);
        }

        if textfile {
            if plugins[0] != master {
                return Err(Error::invalid_args(format!(
                    "\"{}\" must load first.",
                    self.settings.master_file()
                )));
            }
        } else {
            match plugins.iter().position(|name| name == &master) {
                Some(0) => {}
                Some(position) => {
                    let entry = plugins.remove(position);
                    plugins.insert(0, entry);
                }
                None => {
                    return Err(Error::invalid_args(format!(
                        "\"{}\" must be in the load order.",
                        self.settings.master_file()
                    )));
                }
            }
        }

        self.check_order_rules(&plugins)?;

        self.load_order.set(plugins);
        self.load_order.save(&self.settings)?;
        if textfile {
            self.save_active_after_order_change()?;
        }
        Ok(())
    }

    /// The active set, reloaded first if the file has changed.
    pub fn active_plugins(&mut self) -> Result<Vec<PluginName>> {
        self.refresh_active()?;
        Ok(self.active.iter().cloned().collect())
    }

    /// Replaces and persists the active set.
    ///
    /// The set must hold at most 255 installed plugins, include the
    /// game's implicit plugins, and be closed over declared masters.
    pub fn set_active_plugins(&mut self, names: &[&str]) -> Result<()> {
        let mut set: IndexSet<PluginName> = IndexSet::with_capacity(names.len());
        for raw in names {
            let name = PluginName::new(raw);
            if !name.is_valid() || !self.settings.plugin(&name).exists() {
                return Err(Error::invalid_args(format!(
                    "\"{name}\" is not a valid plugin file."
                )));
            }
            if !set.insert(name) {
                return Err(Error::invalid_args(format!(
                    "\"{}\" is a duplicate entry.",
                    PluginName::new(raw)
                )));
            }
        }
        if set.len() > MAX_ACTIVE_PLUGINS {
            return Err(Error::invalid_args(format!(
                "Cannot activate more than {MAX_ACTIVE_PLUGINS} plugins."
            )));
        }

        let master = self.settings.master_name();
        for implicit in self.settings.implicit_plugins() {
            let required = implicit == &master || self.settings.plugin(implicit).exists();
            if required && !set.contains(implicit) {
                return Err(Error::invalid_args(format!("{implicit} must be active.")));
            }
        }

        for name in &set {
            for required in self.settings.plugin(name).masters(self.reader.as_ref())? {
                if !set.contains(&required) {
                    return Err(Error::invalid_args(format!(
                        "\"{name}\" requires \"{required}\" to be active."
                    )));
                }
            }
        }

        if self.settings.load_order_method() == LoadOrderMethod::Textfile {
            self.refresh_load_order()?;
        }
        self.active.replace(set);
        self.save_active()
    }

    /// Whether `name` is in the active set, reloading it first if the
    /// file has changed.
    pub fn is_active(&mut self, name: &str) -> Result<bool> {
        self.refresh_active()?;
        Ok(self.active.contains(&PluginName::new(name)))
    }

    /// Adds `name` to the active set and persists it.
    pub fn activate(&mut self, name: &str) -> Result<()> {
        let plugin_name = PluginName::new(name);
        if !plugin_name.is_valid() || !self.settings.plugin(&plugin_name).exists() {
            return Err(Error::invalid_args(format!(
                "\"{plugin_name}\" is not a valid plugin file."
            )));
        }

        self.refresh_active()?;
        if self.settings.load_order_method() == LoadOrderMethod::Textfile {
            self.refresh_load_order()?;
        }

        if !self.active.contains(&plugin_name) && self.active.len() >= MAX_ACTIVE_PLUGINS {
            return Err(Error::invalid_args(format!(
                "Cannot activate \"{plugin_name}\": more than {MAX_ACTIVE_PLUGINS} plugins would be active."
            )));
        }

        self.active.insert(plugin_name);
        self.save_active()
    }

    /// Removes `name` from the active set and persists it. The game
    /// master of a textfile game and installed implicit plugins cannot
    /// be deactivated.
    pub fn deactivate(&mut self, name: &str) -> Result<()> {
        let plugin_name = PluginName::new(name);
        let master = self.settings.master_name();
        if self.settings.load_order_method() == LoadOrderMethod::Textfile && plugin_name == master {
            return Err(Error::invalid_args(format!(
                "Cannot deactivate {}.",
                self.settings.master_file()
            )));
        }
        if plugin_name != master
            && self.settings.is_implicitly_active(&plugin_name)
            && self.settings.plugin(&plugin_name).exists()
        {
            return Err(Error::invalid_args(format!(
                "Cannot deactivate {plugin_name}."
            )));
        }

        self.refresh_active()?;
        if self.settings.load_order_method() == LoadOrderMethod::Textfile {
            self.refresh_load_order()?;
        }
        self.active.remove(&plugin_name);
        self.save_active()
    }

    /// The position of `name` in the load order, after reconciling.
    pub fn plugin_position(&mut self, name: &str) -> Result<Option<usize>> {
        self.refresh_load_order()?;
        let position = self.load_order.find(&PluginName::new(name));
        Ok((position < self.load_order.len()).then_some(position))
    }

    /// Moves `name` to `position` and persists the order. Masters
    /// cannot cross the master/non-master partition, and for textfile
    /// games the first slot belongs to the game master.
    pub fn set_plugin_position(&mut self, name: &str, position: usize) -> Result<()> {
        let plugin_name = PluginName::new(name);
        if !plugin_name.is_valid() {
            return Err(Error::invalid_args(format!(
                "\"{plugin_name}\" is not a valid plugin file."
            )));
        }

        self.refresh_load_order()?;

        let textfile = self.settings.load_order_method() == LoadOrderMethod::Textfile;
        let master = self.settings.master_name();
        if textfile {
            if position == 0 && plugin_name != master {
                return Err(Error::invalid_args(format!(
                    "Cannot set \"{plugin_name}\" to load first: \"{}\" must load first.",
                    self.settings.master_file()
                )));
            }
            if position != 0 && !self.load_order.is_empty() && plugin_name == master {
                return Err(Error::invalid_args(format!(
                    "\"{}\" must load first.",
                    self.settings.master_file()
                )));
            }
        }

        let current = self.load_order.find(&plugin_name);
        if current == self.load_order.len() && !self.settings.plugin(&plugin_name).exists() {
            return Err(Error::invalid_args(format!(
                "\"{plugin_name}\" is not a valid plugin file."
            )));
        }

        let partition = self
            .load_order
            .leading_master_count(&self.settings, self.reader.as_ref());
        let is_master = self
            .settings
            .plugin(&plugin_name)
            .is_master(self.reader.as_ref())?;
        let length = self.load_order.len();
        if !is_master && position < partition {
            return Err(Error::invalid_args(
                "Cannot move a non-master plugin before master files.",
            ));
        }
        if is_master
            && ((position > partition && partition != length)
                || (current < partition && position == partition))
        {
            return Err(Error::invalid_args(
                "Cannot move a master file after non-master plugins.",
            ));
        }

        self.load_order.move_to(&plugin_name, position);
        self.load_order.save(&self.settings)?;
        if textfile {
            self.save_active_after_order_change()?;
        }
        Ok(())
    }

    /// Whether the cached load order satisfies its loaded-state rules.
    pub fn is_load_order_valid(&self) -> bool {
        self.load_order.is_valid(&self.settings, self.reader.as_ref())
    }

    /// Whether the cached active set satisfies its loaded-state rules.
    pub fn is_active_plugins_valid(&self) -> bool {
        self.active.is_valid(&self.settings, self.reader.as_ref())
    }

    fn refresh_load_order(&mut self) -> Result<()> {
        if self.load_order.has_changed(&self.settings)? {
            tracing::debug!(game = ?self.settings.id(), "load order changed on disk, reloading");
            self.load_order.load(&self.settings, self.reader.as_ref())?;
        }
        Ok(())
    }

    fn refresh_active(&mut self) -> Result<()> {
        if self.active.has_changed(&self.settings)? {
            tracing::debug!(game = ?self.settings.id(), "active plugins changed on disk, reloading");
            self.active.load(&self.settings)?;
        }
        Ok(())
    }

    fn save_active(&mut self) -> Result<()> {
        let order = match self.settings.load_order_method() {
            LoadOrderMethod::Textfile => Some(self.load_order.as_slice()),
            LoadOrderMethod::Timestamp => None,
        };
        self.active.save(&self.settings, order)
    }

    /// After the order file is rewritten the active file must follow,
    /// since its entries are stored in load order. Reload it first if
    /// another tool has touched it.
    fn save_active_after_order_change(&mut self) -> Result<()> {
        if self.active.has_changed(&self.settings)? {
            self.active.load(&self.settings)?;
        }
        self.active
            .save(&self.settings, Some(self.load_order.as_slice()))
    }

    /// Master-partition and dependency-closure checks over a candidate
    /// sequence.
    fn check_order_rules(&self, plugins: &[PluginName]) -> Result<()> {
        let mut past_masters = false;
        let mut earlier: HashSet<PluginName> = HashSet::with_capacity(plugins.len());
        for name in plugins {
            let plugin = self.settings.plugin(name);
            let is_master = plugin.is_master(self.reader.as_ref())?;
            if is_master && past_masters {
                return Err(Error::invalid_args(
                    "Master plugins must load before all non-master plugins.",
                ));
            }
            if !is_master {
                past_masters = true;
            }
            for required in plugin.masters(self.reader.as_ref())? {
                if !earlier.contains(&required) {
                    return Err(Error::invalid_args(format!(
                        "\"{name}\" loads before its master \"{required}\"."
                    )));
                }
            }
            earlier.insert(name.clone());
        }
        Ok(())
    }
}
