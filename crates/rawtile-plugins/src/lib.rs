//! Stock processing plugins.
//!
//! These ship with the engine in two forms: statically, through
//! [`PluginRegistry::register_instance`](rawtile_plugin::PluginRegistry),
//! and as loadable libraries via the thin `cdylib` wrapper crates under
//! `plugins/`, which pair each type with an exported `create_plugin`
//! factory.

mod denoise;
mod gamma;
mod whitebalance;

pub use denoise::DenoisePlugin;
pub use gamma::GammaPlugin;
pub use whitebalance::WhiteBalancePlugin;
