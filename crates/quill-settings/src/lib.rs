//! # quill-settings
//!
//! Configuration for the quill exercise server, loaded from three layers
//! (in priority order):
//! 1. **Compiled defaults** ([`QuillSettings::default()`])
//! 2. **Settings file** (`~/.quill/settings.json`, deep-merged over defaults)
//! 3. **Environment variables** (`QUILL_*` overrides, highest priority)

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;
