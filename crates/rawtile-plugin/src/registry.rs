//! Plugin discovery and instance lifetime management.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use thiserror::Error;
use tracing::{debug, warn};

use rawtile_core::ParamDesc;

use crate::library::DYLIB_EXTENSION;
use crate::{ProcessingPlugin, ProcessingStage, SharedLibrary};

/// Registry instance id. 0 is reserved for "none/error"; real ids start at
/// 1 and are never recycled within a run.
pub type InstanceId = u64;

/// Shared handle to a live plugin instance.
///
/// The render path takes the read lock to call the processing entry points
/// (concurrently across tiles); parameter edits take the write lock.
pub type PluginHandle = Arc<RwLock<Box<dyn ProcessingPlugin>>>;

/// Result alias for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Errors surfaced by the registry. Per-library discovery failures are not
/// errors; they are logged and the scan continues.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("plugin directory {0:?} is not readable")]
    DirectoryUnreadable(PathBuf),

    #[error("no plugins registered from {0:?}")]
    NoPlugins(PathBuf),
}

/// Immutable description of a discovered plugin, captured once at scan.
#[derive(Debug, Clone)]
pub struct PluginPrototype {
    /// Display name reported by the prototype instance.
    pub name: String,
    /// Stage the plugin runs in.
    pub stage: ProcessingStage,
    /// Parameter descriptors reported by the prototype instance.
    pub params: Vec<ParamDesc>,
    /// Library the plugin came from; `None` for built-in registrations.
    pub library_path: Option<PathBuf>,
    /// Index into the loaded-library list; `None` for built-ins.
    lib_index: Option<usize>,
}

/// Owns plugin libraries and the instances minted from them.
///
/// Ownership tree: the registry owns both the library handles and every
/// instance. Instances must never outlive the library whose code they run,
/// so `instances` is declared before `libs` (Rust drops fields in
/// declaration order).
pub struct PluginRegistry {
    instances: BTreeMap<InstanceId, PluginHandle>,
    prototypes: Vec<PluginPrototype>,
    libs: Vec<SharedLibrary>,
    next_id: InstanceId,
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self {
            instances: BTreeMap::new(),
            prototypes: Vec::new(),
            libs: Vec::new(),
            next_id: 1,
        }
    }

    /// Scans `dir` for loadable plugins, replacing all current state:
    /// prototypes, libraries and live instances.
    ///
    /// Every regular file with the platform's shared-library extension is
    /// opened and asked for its `create_plugin` factory; the returned
    /// prototype instance supplies name, stage and parameter descriptors.
    /// Libraries that fail to open, lack the symbol, or return null are
    /// skipped with a warning.
    ///
    /// Returns the number of prototypes registered (at least one), or an
    /// error if the directory was unreadable or yielded nothing.
    pub fn scan_directory(&mut self, dir: &Path) -> RegistryResult<usize> {
        // Instances reference library code; they must go before the
        // libraries do.
        self.instances.clear();
        self.prototypes.clear();
        self.libs.clear();

        let entries = std::fs::read_dir(dir)
            .map_err(|_| RegistryError::DirectoryUnreadable(dir.to_path_buf()))?;

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file() && p.extension().is_some_and(|e| e == DYLIB_EXTENSION))
            .collect();
        // Directory iteration order is platform-dependent; sort so repeated
        // scans yield prototypes in identical order.
        paths.sort();

        for path in paths {
            let lib = match SharedLibrary::open(&path) {
                Ok(lib) => lib,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to open plugin library");
                    continue;
                }
            };
            let Some(create) = lib.create_fn() else {
                warn!(path = %path.display(), "create_plugin symbol not found");
                continue;
            };
            // Safety: the factory follows the plugin ABI; null means the
            // plugin declined to instantiate.
            let raw = unsafe { create() };
            if raw.is_null() {
                warn!(path = %path.display(), "plugin factory returned null");
                continue;
            }
            let proto = unsafe { Box::from_raw(raw) }.into_inner();

            debug!(name = proto.name(), path = %path.display(), "registered plugin");
            self.prototypes.push(PluginPrototype {
                name: proto.name().to_string(),
                stage: proto.stage(),
                params: proto.params(),
                library_path: Some(path),
                lib_index: Some(self.libs.len()),
            });
            self.libs.push(lib);
        }

        if self.prototypes.is_empty() {
            return Err(RegistryError::NoPlugins(dir.to_path_buf()));
        }
        Ok(self.prototypes.len())
    }

    /// Discovered prototypes, in scan order.
    pub fn prototypes(&self) -> &[PluginPrototype] {
        &self.prototypes
    }

    /// Mints a fresh instance from a prototype. Returns 0 on failure
    /// (bad index, or the factory failed on this call).
    pub fn create_instance(&mut self, proto_index: usize) -> InstanceId {
        let Some(proto) = self.prototypes.get(proto_index) else {
            return 0;
        };
        let Some(lib_index) = proto.lib_index else {
            // Built-in prototypes carry no factory; instances of built-ins
            // enter through register_instance.
            return 0;
        };
        let Some(create) = self.libs[lib_index].create_fn() else {
            return 0;
        };
        // Safety: same ABI contract as at scan time.
        let raw = unsafe { create() };
        if raw.is_null() {
            return 0;
        }
        let plugin = unsafe { Box::from_raw(raw) }.into_inner();
        self.insert(plugin)
    }

    /// Registers a statically linked plugin instance, entering the same id
    /// space as loaded ones. Also records a prototype for it so the
    /// catalogue reflects every known plugin.
    pub fn register_instance(&mut self, plugin: Box<dyn ProcessingPlugin>) -> InstanceId {
        self.prototypes.push(PluginPrototype {
            name: plugin.name().to_string(),
            stage: plugin.stage(),
            params: plugin.params(),
            library_path: None,
            lib_index: None,
        });
        self.insert(plugin)
    }

    fn insert(&mut self, plugin: Box<dyn ProcessingPlugin>) -> InstanceId {
        let id = self.next_id;
        self.next_id += 1;
        self.instances.insert(id, Arc::new(RwLock::new(plugin)));
        id
    }

    /// Shared handle to a live instance.
    pub fn get_instance(&self, id: InstanceId) -> Option<PluginHandle> {
        self.instances.get(&id).cloned()
    }

    /// Destroys one instance. The owning library stays loaded until the
    /// registry itself drops.
    pub fn destroy_instance(&mut self, id: InstanceId) -> bool {
        self.instances.remove(&id).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rawtile_core::{ParamValue, RgbImage};

    #[derive(Default)]
    struct Invert;

    impl ProcessingPlugin for Invert {
        fn name(&self) -> &str {
            "Invert"
        }
        fn stage(&self) -> ProcessingStage {
            ProcessingStage::Finalize
        }
        fn params(&self) -> Vec<ParamDesc> {
            Vec::new()
        }
        fn get_param(&self, _name: &str) -> Option<ParamValue> {
            None
        }
        fn set_param(&mut self, _name: &str, _value: &ParamValue) -> bool {
            false
        }
        fn state_fingerprint(&self) -> u64 {
            0x1234
        }
        fn process_rgb(&self, rgb: &mut RgbImage) {
            for v in &mut rgb.data {
                *v = 1.0 - *v;
            }
        }
    }

    #[test]
    fn test_register_and_lookup() {
        let mut reg = PluginRegistry::new();
        let id = reg.register_instance(Box::new(Invert));
        assert_eq!(id, 1);
        assert!(reg.get_instance(id).is_some());
        assert!(reg.get_instance(0).is_none());
        assert_eq!(reg.prototypes().len(), 1);
        assert_eq!(reg.prototypes()[0].name, "Invert");
    }

    #[test]
    fn test_ids_never_recycled() {
        let mut reg = PluginRegistry::new();
        let a = reg.register_instance(Box::new(Invert));
        assert!(reg.destroy_instance(a));
        assert!(!reg.destroy_instance(a));
        let b = reg.register_instance(Box::new(Invert));
        assert!(b > a);
    }

    #[test]
    fn test_create_instance_bad_index() {
        let mut reg = PluginRegistry::new();
        assert_eq!(reg.create_instance(42), 0);
    }

    #[test]
    fn test_scan_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mut reg = PluginRegistry::new();
        assert!(matches!(
            reg.scan_directory(dir.path()),
            Err(RegistryError::NoPlugins(_))
        ));
    }

    #[test]
    fn test_scan_skips_non_plugins() {
        let dir = tempfile::tempdir().unwrap();
        // A file with the right extension but no loadable content must be
        // skipped, not abort the scan.
        std::fs::write(dir.path().join(format!("fake.{DYLIB_EXTENSION}")), b"not a library")
            .unwrap();
        let mut reg = PluginRegistry::new();
        assert!(reg.scan_directory(dir.path()).is_err());
        assert!(reg.prototypes().is_empty());
    }

    #[test]
    fn test_scan_clears_instances() {
        let dir = tempfile::tempdir().unwrap();
        let mut reg = PluginRegistry::new();
        let id = reg.register_instance(Box::new(Invert));
        let _ = reg.scan_directory(dir.path());
        assert!(reg.get_instance(id).is_none(), "scan must clear instances");
    }
}
