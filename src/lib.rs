// loadorder - load-order and active-plugin management for Bethesda games
//
// This is the library crate containing the load-order state machine and
// its filesystem persistence. There is no binary: embedders hold a
// GameHandle and drive everything through it.

pub mod error;
pub mod models;
pub mod services;
pub mod state;

// Re-export the types embedders actually hold
pub use error::{Error, Result};
pub use models::{GameId, GameSettings, LoadOrderMethod, Plugin, PluginName};
pub use services::{EspReader, RecordReader, Transcoder};
pub use state::{ActivePlugins, GameHandle, LoadOrder, MAX_ACTIVE_PLUGINS};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
