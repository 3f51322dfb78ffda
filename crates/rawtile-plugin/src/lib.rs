//! Processing-stage plugin contract and the dynamic plugin registry.
//!
//! A plugin is a processing step bound to exactly one [`ProcessingStage`].
//! Plugins arrive two ways:
//!
//! - **Loadable**: a shared library exporting a `create_plugin` symbol,
//!   discovered by [`PluginRegistry::scan_directory`]
//! - **Built in**: any `Box<dyn ProcessingPlugin>` handed to
//!   [`PluginRegistry::register_instance`]
//!
//! Either way the registry mints monotonically increasing instance ids
//! (0 is reserved for "none") and hands out shared handles that the render
//! path read-locks while processing tiles.

mod contract;
mod ffi;
mod library;
mod registry;

pub use contract::{ProcessingPlugin, ProcessingStage};
pub use ffi::{CreatePluginFn, PluginBox, CREATE_PLUGIN_SYMBOL};
pub use library::SharedLibrary;
pub use registry::{
    InstanceId, PluginHandle, PluginPrototype, PluginRegistry, RegistryError, RegistryResult,
};
