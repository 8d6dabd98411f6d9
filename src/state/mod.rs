//! Load-order and active-plugin state.
//!
//! This is the crate's core: the in-memory model of a game's load
//! order and active set, the rules that keep both valid, and the
//! reconciliation between memory and the filesystem. The data
//! directory and the order files are shared mutable state that other
//! tools edit concurrently, so each component carries a cached
//! modification-time watermark and reloads itself when the watched
//! paths move past it.
//!
//! - [`LoadOrder`]: the ordered plugin sequence, for both the
//!   timestamp and textfile ordering schemes.
//! - [`ActivePlugins`]: the unordered active set, capped at 255,
//!   including the Morrowind INI handling.
//! - [`GameHandle`]: the sole entry point callers hold; every public
//!   operation runs reconcile → mutate → persist → refresh.

pub mod active_plugins;
pub mod handle;
pub mod load_order;

pub use active_plugins::{ActivePlugins, MAX_ACTIVE_PLUGINS};
pub use handle::GameHandle;
pub use load_order::LoadOrder;

use std::fs;

use camino::Utf8Path;

use crate::error::{Error, Result};

/// A path's modification time in whole seconds since the Unix epoch.
///
/// Second granularity is what `last_write_time` offers portably; both
/// the cached watermarks and the live values go through this one
/// helper so they are always compared at the same resolution.
pub(crate) fn path_mtime_secs(path: &Utf8Path) -> Result<i64> {
    let metadata = fs::metadata(path).map_err(|source| Error::TimestampRead {
        path: path.to_path_buf(),
        source,
    })?;
    let modified = metadata
        .modified()
        .map_err(|source| Error::TimestampRead {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(crate::models::plugin::system_time_to_secs(modified))
}
