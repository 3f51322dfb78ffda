//! Core types for the rawtile rendering engine.
//!
//! This crate holds everything the engine, the plugin contract and the
//! drivers need to agree on without depending on each other:
//!
//! - [`RawImage`] / [`RgbImage`]: the two pixel buffers that flow through
//!   the pipeline
//! - [`UnifiedRaw`]: a decoded frame (sensor data, camera metadata and the
//!   ordered edit history)
//! - [`TileCoord`] / [`RenderRequest`]: how callers address output tiles
//! - [`ParamValue`] / [`ParamDesc`]: the plugin parameter model
//! - [`hash`]: run-stable hashing used for cache keys and plugin state
//!   fingerprints

pub mod error;
pub mod hash;
pub mod image;
pub mod params;
pub mod raw;
pub mod tiling;

pub use error::{Error, Result};
pub use image::{RawImage, RgbImage};
pub use params::{ParamDesc, ParamKind, ParamValue};
pub use raw::{CameraMeta, ProcessingStep, UnifiedRaw};
pub use tiling::{full_frame_tiles, RenderRequest, TileCoord};
