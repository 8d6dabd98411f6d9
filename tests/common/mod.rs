//! Shared fixtures for the integration suites.
//!
//! Builds a throwaway game installation: a data folder, a local
//! directory for the order files, and synthetic plugin files whose
//! headers the built-in record reader can parse.

#![allow(dead_code)]

use std::fs;
use std::time::{Duration, UNIX_EPOCH};

use camino::{Utf8Path, Utf8PathBuf};
use loadorder::{GameHandle, GameId, GameSettings};
use tempfile::TempDir;

pub struct GameFixture {
    _temp: TempDir,
    pub id: GameId,
    pub game_path: Utf8PathBuf,
    pub local_path: Utf8PathBuf,
}

impl GameFixture {
    pub fn new(id: GameId) -> Self {
        let temp = TempDir::new().unwrap();
        let root = Utf8PathBuf::try_from(temp.path().to_path_buf()).unwrap();
        let game_path = root.join("game");
        let local_path = root.join("local");
        let folder = match id {
            GameId::Morrowind => "Data Files",
            _ => "Data",
        };
        fs::create_dir_all(game_path.join(folder)).unwrap();
        fs::create_dir_all(&local_path).unwrap();
        GameFixture {
            _temp: temp,
            id,
            game_path,
            local_path,
        }
    }

    pub fn settings(&self) -> GameSettings {
        GameSettings::with_local_path(self.id, &self.game_path, &self.local_path).unwrap()
    }

    pub fn handle(&self) -> GameHandle {
        GameHandle::with_local_path(self.id, &self.game_path, &self.local_path).unwrap()
    }

    pub fn plugins_folder(&self) -> Utf8PathBuf {
        self.settings().plugins_folder().to_path_buf()
    }

    pub fn plugin_path(&self, name: &str) -> Utf8PathBuf {
        self.plugins_folder().join(name)
    }

    pub fn load_order_file(&self) -> Utf8PathBuf {
        self.local_path.join("loadorder.txt")
    }

    pub fn active_plugins_file(&self) -> Utf8PathBuf {
        self.settings().active_plugins_file().to_path_buf()
    }

    /// Writes a plugin file with a minimal valid header. For Morrowind
    /// the `master` argument is ignored; the extension decides there.
    pub fn write_plugin(&self, name: &str, master: bool, masters: &[&str]) {
        fs::write(self.plugin_path(name), plugin_bytes(self.id, master, masters)).unwrap();
    }

    pub fn set_plugin_mtime(&self, name: &str, secs: u64) {
        set_file_mtime(&self.plugin_path(name), secs);
    }

    pub fn plugin_mtime(&self, name: &str) -> u64 {
        fs::metadata(self.plugin_path(name))
            .unwrap()
            .modified()
            .unwrap()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs()
    }
}

pub fn set_file_mtime(path: &Utf8Path, secs: u64) {
    let file = fs::OpenOptions::new().write(true).open(path).unwrap();
    file.set_modified(UNIX_EPOCH + Duration::from_secs(secs)).unwrap();
}

/// Pushes a path's mtime into the future so a change within the same
/// wall-clock second is still seen by the watermark comparison.
pub fn touch_into_future(path: &Utf8Path) {
    let future = std::time::SystemTime::now() + Duration::from_secs(3600);
    let file = if path.is_dir() {
        fs::File::open(path).unwrap()
    } else {
        fs::OpenOptions::new().write(true).open(path).unwrap()
    };
    file.set_modified(future).unwrap();
}

pub fn plugin_bytes(id: GameId, master: bool, masters: &[&str]) -> Vec<u8> {
    match id {
        GameId::Morrowind => tes3_bytes(masters),
        GameId::Oblivion => tes4_bytes(20, master, masters),
        _ => tes4_bytes(24, master, masters),
    }
}

fn tes4_bytes(record_header_len: usize, master: bool, masters: &[&str]) -> Vec<u8> {
    let mut data = Vec::new();
    data.extend_from_slice(b"HEDR");
    data.extend_from_slice(&12u16.to_le_bytes());
    data.extend_from_slice(&1.0f32.to_le_bytes());
    data.extend_from_slice(&0u32.to_le_bytes());
    data.extend_from_slice(&0u32.to_le_bytes());
    for name in masters {
        let encoded = format!("{name}\0");
        data.extend_from_slice(b"MAST");
        data.extend_from_slice(&(encoded.len() as u16).to_le_bytes());
        data.extend_from_slice(encoded.as_bytes());
        data.extend_from_slice(b"DATA");
        data.extend_from_slice(&8u16.to_le_bytes());
        data.extend_from_slice(&0u64.to_le_bytes());
    }

    let mut bytes = Vec::new();
    bytes.extend_from_slice(b"TES4");
    bytes.extend_from_slice(&(data.len() as u32).to_le_bytes());
    bytes.extend_from_slice(&if master { 1u32 } else { 0u32 }.to_le_bytes());
    while bytes.len() < record_header_len {
        bytes.push(0);
    }
    bytes.extend_from_slice(&data);
    bytes
}

fn tes3_bytes(masters: &[&str]) -> Vec<u8> {
    let mut data = Vec::new();
    for name in masters {
        let encoded = format!("{name}\0");
        data.extend_from_slice(b"MAST");
        data.extend_from_slice(&(encoded.len() as u32).to_le_bytes());
        data.extend_from_slice(encoded.as_bytes());
        data.extend_from_slice(b"DATA");
        data.extend_from_slice(&8u32.to_le_bytes());
        data.extend_from_slice(&0u64.to_le_bytes());
    }

    let mut bytes = Vec::new();
    bytes.extend_from_slice(b"TES3");
    bytes.extend_from_slice(&(data.len() as u32).to_le_bytes());
    bytes.extend_from_slice(&0u32.to_le_bytes());
    bytes.extend_from_slice(&0u32.to_le_bytes());
    bytes.extend_from_slice(&data);
    bytes
}
