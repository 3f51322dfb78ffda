//! The unified RAW model handed to the pipeline.

use crate::RawImage;

/// Camera metadata relevant to preview normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraMeta {
    /// White-balance gains for R, G, B.
    pub wb: [f32; 3],
    /// Sensor black level.
    pub black_level: f32,
    /// Sensor white level (saturation point).
    pub white_level: f32,
}

impl Default for CameraMeta {
    fn default() -> Self {
        Self {
            wb: [1.0, 1.0, 1.0],
            black_level: 0.0,
            white_level: 65535.0,
        }
    }
}

/// One entry in the edit history: a reference to a live plugin instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessingStep {
    /// Registry instance id; 0 is reserved for "none".
    pub instance_id: u64,
}

impl ProcessingStep {
    pub fn new(instance_id: u64) -> Self {
        Self { instance_id }
    }
}

/// A decoded frame: sensor data, camera metadata and the ordered history of
/// processing steps to apply. Owned by the caller; the pipeline borrows it
/// immutably for the duration of a render.
#[derive(Debug, Clone, Default)]
pub struct UnifiedRaw {
    /// Original sensor data.
    pub raw: RawImage,
    /// Camera metadata.
    pub meta: CameraMeta,
    /// Processing steps in application order. Ordering is authoritative.
    pub history: Vec<ProcessingStep>,
}

impl UnifiedRaw {
    /// Creates a frame with default metadata and empty history.
    pub fn new(raw: RawImage) -> Self {
        Self { raw, meta: CameraMeta::default(), history: Vec::new() }
    }

    /// Appends a processing step to the history.
    pub fn push_step(&mut self, instance_id: u64) {
        self.history.push(ProcessingStep::new(instance_id));
    }
}
