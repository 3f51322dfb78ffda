//! Per-channel gain in linear light, after demosaic.

use rawtile_core::{ParamDesc, ParamValue, RgbImage};
use rawtile_plugin::{ProcessingPlugin, ProcessingStage};

pub struct WhiteBalancePlugin {
    gains: [f32; 3],
}

impl Default for WhiteBalancePlugin {
    fn default() -> Self {
        Self { gains: [1.0, 1.0, 1.0] }
    }
}

const CHANNELS: [&str; 3] = ["R", "G", "B"];

impl ProcessingPlugin for WhiteBalancePlugin {
    fn name(&self) -> &str {
        "WhiteBalance"
    }

    fn stage(&self) -> ProcessingStage {
        ProcessingStage::PostDemosaicLinear
    }

    fn params(&self) -> Vec<ParamDesc> {
        CHANNELS
            .iter()
            .map(|name| ParamDesc::float(*name, 0.0, 8.0, 0.01, 1.0))
            .collect()
    }

    fn get_param(&self, name: &str) -> Option<ParamValue> {
        let i = CHANNELS.iter().position(|c| *c == name)?;
        Some(ParamValue::Float(self.gains[i]))
    }

    fn set_param(&mut self, name: &str, value: &ParamValue) -> bool {
        let Some(i) = CHANNELS.iter().position(|c| *c == name) else {
            return false;
        };
        match value.as_float() {
            Some(v) => {
                self.gains[i] = v.clamp(0.0, 8.0);
                true
            }
            None => false,
        }
    }

    fn process_rgb(&self, rgb: &mut RgbImage) {
        let [r, g, b] = self.gains;
        for px in rgb.data.chunks_exact_mut(3) {
            px[0] *= r;
            px[1] *= g;
            px[2] *= b;
        }
    }
}
