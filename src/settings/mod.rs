//! Site settings and the editable module configuration.

pub mod config;

pub use config::{
    load_module_config, HandoffSettings, KeySource, Locale, ModuleConfig, SettingsHandle,
    TokenTimezone,
};
