//! The contract every processing plugin implements.

use rawtile_core::hash::{combine, hash_param};
use rawtile_core::{ParamDesc, ParamValue, RawImage, RgbImage};

/// Pipeline stages in scheduling order.
///
/// A plugin applies to exactly one stage; the pipeline runs stages in
/// declaration order within each tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ProcessingStage {
    /// Operates on the single-channel sensor buffer before demosaic.
    PreDemosaic,
    /// Reserved for demosaic implementations.
    Demosaic,
    /// Linear-light RGB operations (white balance and the like).
    PostDemosaicLinear,
    /// Last stage, typically nonlinear (gamma).
    Finalize,
}

/// A processing step instance.
///
/// Parameter edits go through `&mut self`; the processing entry points take
/// `&self` so one instance can serve many tiles concurrently. The registry
/// enforces that split with a read-write lock, and parameters are never
/// mutated mid-render.
pub trait ProcessingPlugin: Send + Sync {
    /// Display name, stable across instances of the same plugin.
    fn name(&self) -> &str;

    /// The single stage this plugin runs in.
    fn stage(&self) -> ProcessingStage;

    /// Parameter descriptors for UI generation.
    fn params(&self) -> Vec<ParamDesc>;

    /// Current value of a parameter, `None` for unknown names.
    fn get_param(&self, name: &str) -> Option<ParamValue>;

    /// Sets a parameter by name. Returns `false` for unknown names or kind
    /// mismatch; otherwise stores the value (clamped to the declared range
    /// where applicable) and returns `true`.
    fn set_param(&mut self, name: &str, value: &ParamValue) -> bool;

    /// Stencil radius in pixels this plugin reads around each output pixel.
    /// The planner uses the maximum over pre-demosaic plugins to size tile
    /// aprons.
    fn kernel_radius_px(&self) -> u32 {
        0
    }

    /// Deterministic digest of the current parameter state.
    ///
    /// Must change whenever a `set_param` call would change the output.
    /// The default folds every declared parameter's current value; plugins
    /// that ignore their parameters may override this with a constant.
    fn state_fingerprint(&self) -> u64 {
        let mut h = 0u64;
        for desc in self.params() {
            h = combine(h, rawtile_core::hash::fnv1a(desc.name.as_bytes()));
            let value = self.get_param(&desc.name).unwrap_or(desc.default);
            h = combine(h, hash_param(&value));
        }
        h
    }

    /// Processes a sensor tile in place. Pre-demosaic plugins implement
    /// this; they must not read outside the buffer they are given (clamp at
    /// its edges, apron pixels are already included).
    fn process_raw(&self, _raw: &mut RawImage) {}

    /// Processes an RGB tile in place. Post-demosaic and finalize plugins
    /// implement this.
    fn process_rgb(&self, _rgb: &mut RgbImage) {}
}
