//! Tiled rendering engine for camera RAW previews.
//!
//! Given a [`UnifiedRaw`](rawtile_core::UnifiedRaw) frame, a plugin
//! registry and a render request, the [`Pipeline`] produces an RGB float
//! image by:
//!
//! 1. building (or reusing) a mip pyramid of the RAW at the requested LOD
//! 2. partitioning the output into tiles with stage-dependent apron
//! 3. running plugin stages per tile, in parallel on a worker pool
//! 4. caching tile outputs under content-addressed fingerprints
//! 5. optionally fusing the per-tile normalize + gamma math into a GPU
//!    compute dispatch
//!
//! The engine owns its executor, cache, pyramid and GPU context; callers
//! own the frame and the registry.

pub mod cache;
pub mod executor;
pub mod fingerprint;
pub mod mips;
pub mod pipeline;

pub use cache::{TileBuffer, TileCache};
pub use executor::{Executor, TaskHandle};
pub use fingerprint::Fingerprint;
pub use mips::MipPyramid;
pub use pipeline::{Pipeline, RenderMode};

use thiserror::Error;

/// Result alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors surfaced by the pipeline.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The render request failed validation (negative LOD or dimensions).
    #[error("invalid render request: {0}")]
    InvalidRequest(String),

    /// A tile task died; the output image is incomplete.
    #[error("one or more tile tasks failed")]
    TileFailed,
}
