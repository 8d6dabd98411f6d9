//! Game identities and per-game filesystem settings.
//!
//! [`GameSettings`] is the immutable configuration everything else
//! reads: which game this is, how it orders plugins, where its data
//! folder and order files live, and which plugins the engine loads
//! implicitly. It is pure data; all behavior lives in the state types.

use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::plugin::{Plugin, PluginName};

/// The games whose load order this crate can manage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GameId {
    Morrowind,
    Oblivion,
    Skyrim,
    Fallout3,
    FalloutNv,
}

/// How a game decides its load order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoadOrderMethod {
    /// Plugin file modification times, lowest first, masters before
    /// non-masters.
    Timestamp,
    /// A plain-text `loadorder.txt`, with the active set in a
    /// companion `plugins.txt`.
    Textfile,
}

impl GameId {
    /// The ordering mechanism the game's engine uses.
    pub fn load_order_method(self) -> LoadOrderMethod {
        match self {
            GameId::Skyrim => LoadOrderMethod::Textfile,
            _ => LoadOrderMethod::Timestamp,
        }
    }

    /// The game's required master file.
    pub fn master_file(self) -> &'static str {
        match self {
            GameId::Morrowind => "Morrowind.esm",
            GameId::Oblivion => "Oblivion.esm",
            GameId::Skyrim => "Skyrim.esm",
            GameId::Fallout3 => "Fallout3.esm",
            GameId::FalloutNv => "FalloutNV.esm",
        }
    }

    /// Plugins the engine loads whether or not they are listed as
    /// active. Beyond the game master, only those present on disk are
    /// enforced.
    pub fn implicit_plugins(self) -> &'static [&'static str] {
        match self {
            GameId::Skyrim => &["Skyrim.esm", "Update.esm"],
            _ => &[],
        }
    }

    fn plugins_folder_name(self) -> &'static str {
        match self {
            GameId::Morrowind => "Data Files",
            _ => "Data",
        }
    }

    fn active_plugins_file_name(self) -> &'static str {
        match self {
            GameId::Morrowind => "Morrowind.ini",
            _ => "plugins.txt",
        }
    }

    fn appdata_folder_name(self) -> &'static str {
        match self {
            GameId::Morrowind => "",
            GameId::Oblivion => "Oblivion",
            GameId::Skyrim => "Skyrim",
            GameId::Fallout3 => "Fallout3",
            GameId::FalloutNv => "FalloutNV",
        }
    }
}

/// Immutable per-game configuration: identity, ordering method, and
/// the paths of the data folder and order/active files.
#[derive(Debug, Clone)]
pub struct GameSettings {
    id: GameId,
    plugins_folder: Utf8PathBuf,
    active_plugins_file: Utf8PathBuf,
    load_order_file: Option<Utf8PathBuf>,
    implicit_plugins: Vec<PluginName>,
}

impl GameSettings {
    /// Builds settings for a game installed at `game_path`, locating
    /// the order files under the user's local application data
    /// directory (the `LOCALAPPDATA` environment variable).
    pub fn new(id: GameId, game_path: &Utf8Path) -> Result<Self> {
        if id == GameId::Morrowind {
            // Morrowind keeps everything beside the game; no local
            // path is needed.
            return Self::build(id, game_path, game_path);
        }
        let local_root = std::env::var("LOCALAPPDATA").map_err(|_| {
            Error::invalid_args("No local app data path set and LOCALAPPDATA is not defined.")
        })?;
        let local = Utf8PathBuf::from(local_root).join(id.appdata_folder_name());
        Self::build(id, game_path, &local)
    }

    /// Like [`GameSettings::new`], but with the local application data
    /// directory supplied by the caller. The order files are placed
    /// directly inside `local_path`.
    pub fn with_local_path(id: GameId, game_path: &Utf8Path, local_path: &Utf8Path) -> Result<Self> {
        Self::build(id, game_path, local_path)
    }

    fn build(id: GameId, game_path: &Utf8Path, local_path: &Utf8Path) -> Result<Self> {
        let plugins_folder = game_path.join(id.plugins_folder_name());

        let active_plugins_file = match id {
            GameId::Morrowind => game_path.join(id.active_plugins_file_name()),
            // Oblivion honours bUseMyGamesDirectory=0, which relocates
            // plugins.txt into the game directory.
            GameId::Oblivion if uses_game_directory(game_path) => {
                game_path.join(id.active_plugins_file_name())
            }
            _ => local_path.join(id.active_plugins_file_name()),
        };

        let load_order_file = match id.load_order_method() {
            LoadOrderMethod::Textfile => Some(local_path.join("loadorder.txt")),
            LoadOrderMethod::Timestamp => None,
        };

        let implicit_plugins = id
            .implicit_plugins()
            .iter()
            .map(|name| PluginName::new(name))
            .collect();

        Ok(GameSettings {
            id,
            plugins_folder,
            active_plugins_file,
            load_order_file,
            implicit_plugins,
        })
    }

    pub fn id(&self) -> GameId {
        self.id
    }

    pub fn load_order_method(&self) -> LoadOrderMethod {
        self.id.load_order_method()
    }

    pub fn master_file(&self) -> &'static str {
        self.id.master_file()
    }

    pub fn plugins_folder(&self) -> &Utf8Path {
        &self.plugins_folder
    }

    pub fn active_plugins_file(&self) -> &Utf8Path {
        &self.active_plugins_file
    }

    /// The full load-order file. `None` for timestamp-ordered games,
    /// which have no such file.
    pub fn load_order_file(&self) -> Option<&Utf8Path> {
        self.load_order_file.as_deref()
    }

    pub fn implicit_plugins(&self) -> &[PluginName] {
        &self.implicit_plugins
    }

    pub fn is_implicitly_active(&self, name: &PluginName) -> bool {
        self.implicit_plugins.contains(name)
    }

    /// An introspection view of `name` against this game's data folder.
    pub fn plugin<'a>(&'a self, name: &'a PluginName) -> Plugin<'a> {
        Plugin::new(name, self)
    }

    pub(crate) fn master_name(&self) -> PluginName {
        PluginName::new(self.master_file())
    }
}

/// Whether `Oblivion.ini` pins the order files to the game directory.
fn uses_game_directory(game_path: &Utf8Path) -> bool {
    let ini_path = game_path.join("Oblivion.ini");
    let Ok(bytes) = fs::read(&ini_path) else {
        return false;
    };
    // The setting is ASCII, so a lossy read is safe regardless of the
    // file's encoding.
    let contents = String::from_utf8_lossy(&bytes);
    contents
        .lines()
        .any(|line| line.trim() == "bUseMyGamesDirectory=0")
}
