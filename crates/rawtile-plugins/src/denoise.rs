//! Box-blur denoise, running on the sensor buffer before demosaic.

use rawtile_core::{ParamDesc, ParamValue, RawImage};
use rawtile_plugin::{ProcessingPlugin, ProcessingStage};

/// Strength parameter name (intentionally non-ASCII: "strength").
const STRENGTH: &str = "强度";

pub struct DenoisePlugin {
    strength: f32,
}

impl Default for DenoisePlugin {
    fn default() -> Self {
        Self { strength: 0.25 }
    }
}

impl DenoisePlugin {
    fn radius(&self) -> u32 {
        if self.strength <= 0.001 {
            0
        } else if self.strength < 0.5 {
            1
        } else {
            2
        }
    }
}

impl ProcessingPlugin for DenoisePlugin {
    fn name(&self) -> &str {
        "Denoise"
    }

    fn stage(&self) -> ProcessingStage {
        ProcessingStage::PreDemosaic
    }

    fn params(&self) -> Vec<ParamDesc> {
        vec![ParamDesc::float(STRENGTH, 0.0, 1.0, 0.01, 0.25)]
    }

    fn get_param(&self, name: &str) -> Option<ParamValue> {
        (name == STRENGTH).then(|| ParamValue::Float(self.strength))
    }

    fn set_param(&mut self, name: &str, value: &ParamValue) -> bool {
        if name != STRENGTH {
            return false;
        }
        match value.as_float() {
            Some(v) => {
                self.strength = v.clamp(0.0, 1.0);
                true
            }
            None => false,
        }
    }

    fn kernel_radius_px(&self) -> u32 {
        self.radius()
    }

    fn process_raw(&self, raw: &mut RawImage) {
        let radius = self.radius() as i32;
        if radius == 0 || raw.width < 3 || raw.height < 3 {
            return;
        }
        let w = raw.width as i32;
        let h = raw.height as i32;
        let mut out = vec![0u16; raw.data.len()];
        for y in 0..h {
            for x in 0..w {
                let mut sum = 0u32;
                let mut count = 0u32;
                for dy in -radius..=radius {
                    let yy = (y + dy).clamp(0, h - 1);
                    for dx in -radius..=radius {
                        let xx = (x + dx).clamp(0, w - 1);
                        sum += raw.data[(yy * w + xx) as usize] as u32;
                        count += 1;
                    }
                }
                out[(y * w + x) as usize] = (sum / count) as u16;
            }
        }
        raw.data = out;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_radius_follows_strength() {
        let mut p = DenoisePlugin::default();
        assert_eq!(p.kernel_radius_px(), 1);
        assert!(p.set_param(STRENGTH, &ParamValue::Float(0.0)));
        assert_eq!(p.kernel_radius_px(), 0);
        assert!(p.set_param(STRENGTH, &ParamValue::Float(0.8)));
        assert_eq!(p.kernel_radius_px(), 2);
    }

    #[test]
    fn test_blur_flattens_impulse() {
        let mut p = DenoisePlugin::default();
        assert!(p.set_param(STRENGTH, &ParamValue::Float(1.0)));
        let mut raw = RawImage::new(5, 5);
        raw.data[12] = 2500; // center impulse
        p.process_raw(&mut raw);
        // 5x5 box: every pixel sees the impulse once.
        assert_eq!(raw.data[12], 100);
        assert_eq!(raw.data[0], 100);
    }

    #[test]
    fn test_zero_strength_is_identity() {
        let mut p = DenoisePlugin::default();
        assert!(p.set_param(STRENGTH, &ParamValue::Float(0.0)));
        let mut raw = RawImage::filled(4, 4, 77);
        raw.data[5] = 900;
        let before = raw.clone();
        p.process_raw(&mut raw);
        assert_eq!(raw, before);
    }
}
