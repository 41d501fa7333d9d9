mod mutable_asset;
mod plugin_config;
mod plugin_options;
mod transformer_plugin;

pub use mutable_asset::*;
pub use plugin_config::*;
pub use plugin_options::*;
pub use transformer_plugin::*;
