//! Text encoding at the file boundary.
//!
//! In memory everything is UTF-8. `loadorder.txt` is strictly UTF-8 on
//! disk, but `plugins.txt` and `Morrowind.ini` are Windows-1252 for
//! historical reasons, so their contents pass through [`Transcoder`]
//! on the way in and out.

use std::fs;

use camino::Utf8Path;

use crate::error::{Error, Result};

/// Converts between UTF-8 (in memory) and Windows-1252 (legacy files).
pub struct Transcoder;

impl Transcoder {
    /// Decodes Windows-1252 bytes. Every byte maps to something, so
    /// this cannot fail; undefined code points come through as their
    /// WHATWG fallbacks.
    pub fn decode(bytes: &[u8]) -> String {
        let (text, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
        text.into_owned()
    }

    /// Encodes UTF-8 text as Windows-1252. Names containing characters
    /// outside the code page cannot be written to the legacy files and
    /// yield [`Error::BadFilename`].
    pub fn encode(text: &str) -> Result<Vec<u8>> {
        let (bytes, _, had_errors) = encoding_rs::WINDOWS_1252.encode(text);
        if had_errors {
            return Err(Error::BadFilename {
                name: text.to_string(),
            });
        }
        Ok(bytes.into_owned())
    }
}

/// Reads a file that must be valid UTF-8.
pub fn read_utf8(path: &Utf8Path) -> Result<String> {
    let bytes = fs::read(path).map_err(|source| Error::FileRead {
        path: path.to_path_buf(),
        source,
    })?;
    String::from_utf8(bytes).map_err(|_| Error::NotUtf8 {
        path: path.to_path_buf(),
    })
}

/// Reads a Windows-1252 file, transcoding it to UTF-8.
pub fn read_windows_1252(path: &Utf8Path) -> Result<String> {
    let bytes = fs::read(path).map_err(|source| Error::FileRead {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(Transcoder::decode(&bytes))
}
