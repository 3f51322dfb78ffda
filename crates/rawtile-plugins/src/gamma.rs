//! Display gamma, applied as the final stage.

use rawtile_core::{ParamDesc, ParamValue, RgbImage};
use rawtile_plugin::{ProcessingPlugin, ProcessingStage};

pub struct GammaPlugin {
    gamma: f32,
}

impl Default for GammaPlugin {
    fn default() -> Self {
        Self { gamma: 2.2 }
    }
}

impl ProcessingPlugin for GammaPlugin {
    fn name(&self) -> &str {
        "Gamma"
    }

    fn stage(&self) -> ProcessingStage {
        ProcessingStage::Finalize
    }

    fn params(&self) -> Vec<ParamDesc> {
        vec![ParamDesc::float("Gamma", 0.1, 5.0, 0.01, 2.2)]
    }

    fn get_param(&self, name: &str) -> Option<ParamValue> {
        (name == "Gamma").then(|| ParamValue::Float(self.gamma))
    }

    fn set_param(&mut self, name: &str, value: &ParamValue) -> bool {
        if name != "Gamma" {
            return false;
        }
        match value.as_float() {
            Some(v) => {
                self.gamma = v.clamp(0.1, 5.0);
                true
            }
            None => false,
        }
    }

    fn process_rgb(&self, rgb: &mut RgbImage) {
        let inv = 1.0 / self.gamma;
        for v in &mut rgb.data {
            *v = v.max(0.0).powf(inv);
        }
    }
}
