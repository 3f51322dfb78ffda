//! Content-addressed render fingerprints.
//!
//! Three independent hashes (what we render from, what operations with
//! which settings, and the output geometry) combined per tile into the
//! cache key. Everything is value-hashed and stable across runs so caches
//! survive repeated renders with identical state.

use rawtile_core::hash::{combine, fnv1a, hash_f32};
use rawtile_core::{CameraMeta, ProcessingStep, TileCoord};
use rawtile_plugin::PluginRegistry;

use crate::pipeline::RenderMode;

/// The three-part render fingerprint computed once per `apply`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fingerprint {
    /// Source: base dimensions, normalization levels, WB gains.
    pub source: u64,
    /// Operations: history order, plugin identity and parameter state.
    pub params: u64,
    /// Geometry: tile size, LOD, render mode.
    pub geometry: u64,
}

impl Fingerprint {
    pub fn new(
        meta: &CameraMeta,
        base_width: u32,
        base_height: u32,
        history: &[ProcessingStep],
        registry: &PluginRegistry,
        tile_size: i32,
        lod: i32,
        mode: RenderMode,
    ) -> Self {
        Self {
            source: source_hash(meta, base_width, base_height),
            params: params_hash(history, registry),
            geometry: geometry_hash(tile_size, lod, mode),
        }
    }

    /// Cache key for one tile.
    pub fn tile_key(&self, tc: &TileCoord) -> u64 {
        combine(
            combine(self.source, self.params),
            combine(self.geometry, encode_tile(tc)),
        )
    }
}

/// Folds base dimensions, black/white levels and WB gains.
pub fn source_hash(meta: &CameraMeta, base_width: u32, base_height: u32) -> u64 {
    let mut h = combine(base_width as u64, base_height as u64);
    h = combine(h, hash_f32(meta.black_level));
    h = combine(h, hash_f32(meta.white_level));
    for gain in meta.wb {
        h = combine(h, hash_f32(gain));
    }
    h
}

/// Folds the history left to right: plugin name, stage and state
/// fingerprint per step. Steps whose instance is gone contribute nothing,
/// matching how the pipeline skips them.
pub fn params_hash(history: &[ProcessingStep], registry: &PluginRegistry) -> u64 {
    let mut h = 0u64;
    for step in history {
        let Some(handle) = registry.get_instance(step.instance_id) else {
            continue;
        };
        let Ok(plugin) = handle.read() else {
            continue;
        };
        h = combine(h, fnv1a(plugin.name().as_bytes()));
        h = combine(h, plugin.stage() as u64);
        h = combine(h, plugin.state_fingerprint());
    }
    h
}

/// Folds tile size, LOD and render mode.
pub fn geometry_hash(tile_size: i32, lod: i32, mode: RenderMode) -> u64 {
    combine(combine(tile_size as u64, lod as u64), mode as u64)
}

/// Packs a tile coordinate into one word for key mixing.
#[inline]
pub fn encode_tile(tc: &TileCoord) -> u64 {
    ((tc.lod as u64) << 28) ^ ((tc.y as u64) << 14) ^ (tc.x as u64)
}
