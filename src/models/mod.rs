//! Data models for load-order management.
//!
//! This module contains the value types the rest of the crate builds on:
//! - [`PluginName`]: canonical, case-insensitive plugin identity (`.ghost` transparent)
//! - [`Plugin`]: one plugin viewed against a game's data folder
//! - [`GameId`] / [`LoadOrderMethod`]: which game, and how it orders plugins
//! - [`GameSettings`]: immutable per-game paths and implicit-plugin rules
//!
//! # Architecture Note
//!
//! The models are deliberately passive: [`GameSettings`] is pure data
//! selected once at construction, and [`PluginName`] is a trivially
//! copied value object. All mutation and persistence lives in
//! [`crate::state`].

pub mod game;
pub mod plugin;

pub use game::{GameId, GameSettings, LoadOrderMethod};
pub use plugin::{Plugin, PluginName};
