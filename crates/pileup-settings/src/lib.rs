//! # pileup-settings
//!
//! Layered configuration for the Pileup client.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`PileupSettings::default()`]
//! 2. **User file**: `~/.pileup/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `PILEUP_*` overrides (highest priority)
//!
//! There is no global instance: the binary loads settings once and hands the
//! relevant sections to the engine it constructs.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;
