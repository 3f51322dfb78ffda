//! Thin wrapper over a loaded shared library.

use std::path::{Path, PathBuf};

use crate::{CreatePluginFn, CREATE_PLUGIN_SYMBOL};

/// The shared-library extension on the host platform.
#[cfg(target_os = "windows")]
pub const DYLIB_EXTENSION: &str = "dll";
#[cfg(target_os = "macos")]
pub const DYLIB_EXTENSION: &str = "dylib";
#[cfg(not(any(target_os = "windows", target_os = "macos")))]
pub const DYLIB_EXTENSION: &str = "so";

/// An open shared library. Move-only; the handle closes on drop.
///
/// Symbols resolved from a handle stay valid until that handle is dropped.
/// The registry leans on this to keep plugin instances alive: a library is
/// never dropped while an instance created from it exists.
pub struct SharedLibrary {
    lib: libloading::Library,
    path: PathBuf,
}

impl SharedLibrary {
    /// Opens the library at `path`.
    pub fn open(path: &Path) -> Result<Self, libloading::Error> {
        // Safety: plugin libraries only run initialization the loader
        // requires; they are built from this workspace's plugin contract.
        let lib = unsafe { libloading::Library::new(path)? };
        Ok(Self { lib, path: path.to_path_buf() })
    }

    /// Path the library was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Resolves an arbitrary named symbol, `None` if the library does not
    /// export it.
    ///
    /// # Safety
    ///
    /// `T` must match the symbol's actual type in the library.
    pub unsafe fn symbol<T>(&self, name: &[u8]) -> Option<libloading::Symbol<'_, T>> {
        self.lib.get(name).ok()
    }

    /// Resolves the plugin factory symbol, if the library exports one.
    pub fn create_fn(&self) -> Option<libloading::Symbol<'_, CreatePluginFn>> {
        // Safety: the symbol type is fixed by the plugin ABI contract.
        unsafe { self.symbol(CREATE_PLUGIN_SYMBOL) }
    }
}

impl std::fmt::Debug for SharedLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedLibrary").field("path", &self.path).finish()
    }
}
