//! Plugin record parsing, reduced to the two questions this crate
//! asks: is the master flag set, and which masters does the header
//! declare?
//!
//! [`RecordReader`] is the seam: the default [`EspReader`] parses just
//! the header record of a plugin file, and embedders that already ship
//! a full plugin parser can substitute their own implementation via
//! [`crate::GameHandle::with_reader`].

use std::fs;
use std::io;

use camino::Utf8Path;

use crate::error::{Error, Result};
use crate::models::game::GameId;
use crate::services::encoding::Transcoder;

/// Header flag marking a plugin as a master file.
const MASTER_FLAG: u32 = 0x1;

/// Queries against a plugin file's header.
pub trait RecordReader {
    /// Whether the plugin's master-flag bit is set.
    fn is_master(&self, path: &Utf8Path) -> Result<bool>;

    /// The master filenames the plugin's header declares, in
    /// declaration order.
    fn masters(&self, path: &Utf8Path) -> Result<Vec<String>>;
}

/// Minimal header parser for `.esp`/`.esm` files.
///
/// Reads only the leading `TES3`/`TES4` record: enough for the master
/// flag and the `MAST` subrecords, nothing more. The record layout
/// differs per game generation (Morrowind uses 32-bit subrecord sizes,
/// Oblivion a 20-byte record header, later games a 24-byte one), so
/// the reader is constructed for a specific game.
pub struct EspReader {
    game: GameId,
}

impl EspReader {
    pub fn new(game: GameId) -> Self {
        EspReader { game }
    }

    fn read_header(&self, path: &Utf8Path) -> Result<Header> {
        let bytes = fs::read(path).map_err(|source| Error::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        parse_header(self.game, &bytes).ok_or_else(|| Error::FileRead {
            path: path.to_path_buf(),
            source: io::Error::new(io::ErrorKind::InvalidData, "unrecognised plugin header"),
        })
    }
}

impl RecordReader for EspReader {
    fn is_master(&self, path: &Utf8Path) -> Result<bool> {
        if self.game == GameId::Morrowind {
            // Morrowind has no master flag; the extension decides.
            return Ok(has_master_extension(path));
        }
        Ok(self.read_header(path)?.flags & MASTER_FLAG != 0)
    }

    fn masters(&self, path: &Utf8Path) -> Result<Vec<String>> {
        Ok(self.read_header(path)?.masters)
    }
}

struct Header {
    flags: u32,
    masters: Vec<String>,
}

fn parse_header(game: GameId, bytes: &[u8]) -> Option<Header> {
    match game {
        GameId::Morrowind => parse_tes3_header(bytes),
        GameId::Oblivion => parse_tes4_header(bytes, 20),
        _ => parse_tes4_header(bytes, 24),
    }
}

fn parse_tes4_header(bytes: &[u8], record_header_len: usize) -> Option<Header> {
    if bytes.len() < record_header_len || &bytes[0..4] != b"TES4" {
        return None;
    }
    let data_size = le_u32(bytes, 4)? as usize;
    let flags = le_u32(bytes, 8)?;

    let end = record_header_len.checked_add(data_size)?.min(bytes.len());
    let mut masters = Vec::new();
    let mut pos = record_header_len;
    while pos + 6 <= end {
        let kind = &bytes[pos..pos + 4];
        let size = le_u16(bytes, pos + 4)? as usize;
        let data = bytes.get(pos + 6..pos + 6 + size)?;
        if kind == b"MAST" {
            masters.push(zstring(data));
        }
        pos += 6 + size;
    }

    Some(Header { flags, masters })
}

fn parse_tes3_header(bytes: &[u8]) -> Option<Header> {
    if bytes.len() < 16 || &bytes[0..4] != b"TES3" {
        return None;
    }
    let data_size = le_u32(bytes, 4)? as usize;
    let flags = le_u32(bytes, 12)?;

    let end = 16usize.checked_add(data_size)?.min(bytes.len());
    let mut masters = Vec::new();
    let mut pos = 16;
    while pos + 8 <= end {
        let kind = &bytes[pos..pos + 4];
        let size = le_u32(bytes, pos + 4)? as usize;
        let data = bytes.get(pos + 8..pos + 8 + size)?;
        if kind == b"MAST" {
            masters.push(zstring(data));
        }
        pos += 8 + size;
    }

    Some(Header { flags, masters })
}

fn le_u16(bytes: &[u8], offset: usize) -> Option<u16> {
    let slice = bytes.get(offset..offset + 2)?;
    Some(u16::from_le_bytes([slice[0], slice[1]]))
}

fn le_u32(bytes: &[u8], offset: usize) -> Option<u32> {
    let slice = bytes.get(offset..offset + 4)?;
    Some(u32::from_le_bytes([slice[0], slice[1], slice[2], slice[3]]))
}

/// Master names are stored as null-terminated Windows-1252 strings.
fn zstring(data: &[u8]) -> String {
    let trimmed = match data.iter().position(|&b| b == 0) {
        Some(end) => &data[..end],
        None => data,
    };
    Transcoder::decode(trimmed)
}

fn has_master_extension(path: &Utf8Path) -> bool {
    let name = path.file_name().unwrap_or_default().to_lowercase();
    let name = name.strip_suffix(".ghost").unwrap_or(&name);
    name.ends_with(".esm")
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use tempfile::TempDir;

    fn tes4_plugin(record_header_len: usize, master: bool, masters: &[&str]) -> Vec<u8> {
        let mut data = Vec::new();
        for name in masters {
            data.extend_from_slice(b"MAST");
            let encoded = format!("{name}\0");
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

    fn write_temp(temp: &TempDir, name: &str, bytes: &[u8]) -> Utf8PathBuf {
        let path = Utf8PathBuf::try_from(temp.path().join(name)).unwrap();
        fs::write(&path, bytes).unwrap();
        path
    }

    #[test]
    fn test_master_flag_is_read_from_the_header() {
        let temp = TempDir::new().unwrap();
        let reader = EspReader::new(GameId::Skyrim);

        let path = write_temp(&temp, "Master.esm", &tes4_plugin(24, true, &[]));
        assert!(reader.is_master(&path).unwrap());

        let path = write_temp(&temp, "Mod.esp", &tes4_plugin(24, false, &[]));
        assert!(!reader.is_master(&path).unwrap());
    }

    #[test]
    fn test_masters_are_collected_in_order() {
        let temp = TempDir::new().unwrap();
        let reader = EspReader::new(GameId::Skyrim);

        let path = write_temp(
            &temp,
            "Mod.esp",
            &tes4_plugin(24, false, &["Skyrim.esm", "Update.esm"]),
        );
        assert_eq!(
            reader.masters(&path).unwrap(),
            vec!["Skyrim.esm".to_string(), "Update.esm".to_string()]
        );
    }

    #[test]
    fn test_oblivion_uses_the_short_record_header() {
        let temp = TempDir::new().unwrap();
        let reader = EspReader::new(GameId::Oblivion);

        let path = write_temp(
            &temp,
            "Mod.esp",
            &tes4_plugin(20, false, &["Oblivion.esm"]),
        );
        assert_eq!(reader.masters(&path).unwrap(), vec!["Oblivion.esm"]);
    }

    #[test]
    fn test_morrowind_master_status_follows_the_extension() {
        let reader = EspReader::new(GameId::Morrowind);
        assert!(reader.is_master(Utf8Path::new("Data Files/Morrowind.esm")).unwrap());
        assert!(reader
            .is_master(Utf8Path::new("Data Files/Other.esm.ghost"))
            .unwrap());
        assert!(!reader.is_master(Utf8Path::new("Data Files/Mod.esp")).unwrap());
    }

    #[test]
    fn test_tes3_header_masters() {
        let mut data = Vec::new();
        data.extend_from_slice(b"MAST");
        data.extend_from_slice(&(b"Morrowind.esm\0".len() as u32).to_le_bytes());
        data.extend_from_slice(b"Morrowind.esm\0");
        data.extend_from_slice(b"DATA");
        data.extend_from_slice(&8u32.to_le_bytes());
        data.extend_from_slice(&0u64.to_le_bytes());

        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"TES3");
        bytes.extend_from_slice(&(data.len() as u32).to_le_bytes());
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes.extend_from_slice(&data);

        let temp = TempDir::new().unwrap();
        let path = write_temp(&temp, "Mod.esp", &bytes);
        let reader = EspReader::new(GameId::Morrowind);
        assert_eq!(reader.masters(&path).unwrap(), vec!["Morrowind.esm"]);
    }

    #[test]
    fn test_garbage_is_rejected() {
        let temp = TempDir::new().unwrap();
        let reader = EspReader::new(GameId::Skyrim);
        let path = write_temp(&temp, "Mod.esp", b"not a plugin");
        assert!(matches!(
            reader.masters(&path),
            Err(Error::FileRead { .. })
        ));
    }
}
