//! C ABI surface between the registry and loadable plugin libraries.
//!
//! `Box<dyn ProcessingPlugin>` is a fat pointer and cannot cross `extern
//! "C"`, so the factory returns a thin pointer to a heap-allocated
//! [`PluginBox`] instead. Ownership transfers to the caller; the registry
//! reclaims it with `Box::from_raw`.
//!
//! Host and plugins must be built by the same compiler: the trait object
//! inside the box is not a stable ABI across toolchains.

use crate::ProcessingPlugin;

/// Name of the factory symbol every plugin library exports.
pub const CREATE_PLUGIN_SYMBOL: &[u8] = b"create_plugin";

/// Factory signature resolved from plugin libraries. Returns null on
/// failure.
pub type CreatePluginFn = unsafe extern "C" fn() -> *mut PluginBox;

/// Heap wrapper carrying a plugin trait object across the C boundary.
pub struct PluginBox {
    inner: Box<dyn ProcessingPlugin>,
}

impl PluginBox {
    pub fn new(inner: Box<dyn ProcessingPlugin>) -> Self {
        Self { inner }
    }

    /// Unwraps the boxed plugin.
    pub fn into_inner(self) -> Box<dyn ProcessingPlugin> {
        self.inner
    }
}

/// Emits the `create_plugin` factory for a plugin type.
///
/// The type must implement [`ProcessingPlugin`] and `Default`; each call
/// produces a fresh default-configured instance.
///
/// ```ignore
/// rawtile_plugin::export_plugin!(GammaPlugin);
/// ```
#[macro_export]
macro_rules! export_plugin {
    ($plugin:ty) => {
        #[no_mangle]
        pub extern "C" fn create_plugin() -> *mut $crate::PluginBox {
            let boxed: Box<dyn $crate::ProcessingPlugin> = Box::new(<$plugin>::default());
            Box::into_raw(Box::new($crate::PluginBox::new(boxed)))
        }
    };
}
