//! End-to-end pipeline scenarios.

use rawtile_plugins::{DenoisePlugin, GammaPlugin, WhiteBalancePlugin};

use rawtile_core::{
    ParamDesc, ParamValue, RawImage, RenderRequest, RgbImage, TileCoord, UnifiedRaw,
};
use rawtile_engine::{Pipeline, RenderMode};
use rawtile_plugin::{PluginRegistry, ProcessingPlugin, ProcessingStage};

/// Finalize plugin that doubles every channel, no clamp.
#[derive(Default)]
struct Doubling;

impl ProcessingPlugin for Doubling {
    fn name(&self) -> &str {
        "Doubling"
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
        0xD0B1
    }
    fn process_rgb(&self, rgb: &mut RgbImage) {
        for v in &mut rgb.data {
            *v *= 2.0;
        }
    }
}

fn constant_frame(width: u32, height: u32, value: u16) -> UnifiedRaw {
    let mut data = UnifiedRaw::new(RawImage::filled(width, height, value));
    data.meta.black_level = 0.0;
    data.meta.white_level = 65535.0;
    data
}

fn request(tile_size: i32) -> RenderRequest {
    RenderRequest { tile_size, ..Default::default() }
}

#[test]
fn constant_raw_renders_uniform_gray() {
    let registry = PluginRegistry::new();
    let data = constant_frame(640, 480, 512);
    let mut pipeline = Pipeline::new();

    let out = pipeline
        .apply(&registry, &data, &request(256), RenderMode::GrayscalePreview)
        .unwrap();

    assert_eq!((out.width, out.height), (640, 480));
    let expected = 512.0 / 65535.0;
    for &v in &out.data {
        assert!((v - expected).abs() < 1e-7, "got {v}, expected {expected}");
    }
}

#[test]
fn tile_size_does_not_change_pixels() {
    let registry = PluginRegistry::new();
    let data = constant_frame(640, 480, 512);

    let out_256 = Pipeline::new()
        .apply(&registry, &data, &request(256), RenderMode::GrayscalePreview)
        .unwrap();
    let out_128 = Pipeline::new()
        .apply(&registry, &data, &request(128), RenderMode::GrayscalePreview)
        .unwrap();

    assert_eq!(out_256.data, out_128.data);
}

#[test]
fn invalid_metadata_falls_back_to_frame_range() {
    let registry = PluginRegistry::new();
    let mut data = constant_frame(64, 64, 512);
    data.meta.black_level = 0.0;
    data.meta.white_level = 0.0; // invalid window

    let out = Pipeline::new()
        .apply(&registry, &data, &request(256), RenderMode::GrayscalePreview)
        .unwrap();

    // Frame min == max == 512, so the window collapses and every sample
    // normalizes to (512 - 512) * 1 = 0.
    assert!(out.data.iter().all(|&v| v == 0.0));
}

#[test]
fn gamma_finalize_applies_curve() {
    let mut registry = PluginRegistry::new();
    let id = registry.register_instance(Box::new(GammaPlugin::default()));

    let mut data = constant_frame(1, 1, 32768);
    data.push_step(id);

    let out = Pipeline::new()
        .apply(&registry, &data, &request(256), RenderMode::GrayscalePreview)
        .unwrap();

    let expected = (32768.0f32 / 65535.0).powf(1.0 / 2.2);
    for &v in &out.data {
        assert!((v - expected).abs() < 1e-4, "got {v}, expected {expected}");
    }
    assert!((out.data[0] - 0.729).abs() < 1e-3);
}

#[test]
fn finalize_runs_in_both_modes() {
    let mut registry = PluginRegistry::new();
    let id = registry.register_instance(Box::new(Doubling));

    let mut data = constant_frame(32, 32, 512);
    data.meta.white_level = 1024.0;
    data.push_step(id);

    for mode in [RenderMode::GrayscalePreview, RenderMode::FullColor] {
        let out = Pipeline::new()
            .apply(&registry, &data, &request(256), mode)
            .unwrap();
        // (512 - 0) / 1024 = 0.5, doubled by the finalize stage.
        assert!(out.data.iter().all(|&v| v == 1.0), "mode {mode:?}");
    }
}

#[test]
fn post_demosaic_runs_only_in_full_color() {
    let mut registry = PluginRegistry::new();
    let mut wb = WhiteBalancePlugin::default();
    assert!(wb.set_param("R", &ParamValue::Float(2.0)));
    let id = registry.register_instance(Box::new(wb));

    let mut data = constant_frame(16, 16, 512);
    data.meta.white_level = 2048.0;
    data.push_step(id);

    let gray = Pipeline::new()
        .apply(&registry, &data, &request(256), RenderMode::GrayscalePreview)
        .unwrap();
    let color = Pipeline::new()
        .apply(&registry, &data, &request(256), RenderMode::FullColor)
        .unwrap();

    let g = 512.0 / 2048.0;
    assert_eq!(gray.pixel(0, 0), [g, g, g]);
    assert_eq!(color.pixel(0, 0), [2.0 * g, g, g]);
}

#[test]
fn apron_makes_stencil_tiles_seamless() {
    // Radius-2 pre-demosaic blur; rendering one tile alone must produce
    // exactly the pixels the full-frame render has in that tile.
    let build = || {
        let mut registry = PluginRegistry::new();
        let mut dn = DenoisePlugin::default();
        assert!(dn.set_param("强度", &ParamValue::Float(1.0)));
        let id = registry.register_instance(Box::new(dn));

        let mut raw = RawImage::new(130, 130);
        for y in 0..130u32 {
            for x in 0..130u32 {
                raw.data[(y * 130 + x) as usize] = ((x * 31 + y * 17) % 1021) as u16;
            }
        }
        let mut data = UnifiedRaw::new(raw);
        data.meta.black_level = 0.0;
        data.meta.white_level = 1024.0;
        data.push_step(id);
        (registry, data)
    };

    let (registry_a, data_a) = build();
    let full = Pipeline::new()
        .apply(&registry_a, &data_a, &request(64), RenderMode::GrayscalePreview)
        .unwrap();

    let (registry_b, data_b) = build();
    let single = RenderRequest {
        tile_size: 64,
        tiles: vec![TileCoord::new(1, 1, 0)],
        out_width: 130,
        out_height: 130,
        ..Default::default()
    };
    let one = Pipeline::new()
        .apply(&registry_b, &data_b, &single, RenderMode::GrayscalePreview)
        .unwrap();

    for y in 64..128 {
        for x in 64..128 {
            assert_eq!(
                one.pixel(x, y),
                full.pixel(x, y),
                "mismatch at ({x}, {y})"
            );
        }
    }
}

#[test]
fn warm_cache_render_is_bit_identical() {
    let mut registry = PluginRegistry::new();
    let id = registry.register_instance(Box::new(GammaPlugin::default()));

    let mut raw = RawImage::new(300, 200);
    for (i, v) in raw.data.iter_mut().enumerate() {
        *v = (i % 4096) as u16;
    }
    let mut data = UnifiedRaw::new(raw);
    data.push_step(id);

    let mut pipeline = Pipeline::new();
    let cold = pipeline
        .apply(&registry, &data, &request(128), RenderMode::GrayscalePreview)
        .unwrap();
    let misses_after_cold = pipeline.cache().misses();

    let warm = pipeline
        .apply(&registry, &data, &request(128), RenderMode::GrayscalePreview)
        .unwrap();
    assert_eq!(cold.data, warm.data);
    assert!(pipeline.cache().hits() > 0, "second render must hit the cache");
    assert_eq!(pipeline.cache().misses(), misses_after_cold);

    // And a cleared cache reproduces the same bytes from scratch.
    pipeline.clear_cache();
    let fresh = pipeline
        .apply(&registry, &data, &request(128), RenderMode::GrayscalePreview)
        .unwrap();
    assert_eq!(cold.data, fresh.data);
}

#[test]
fn disjoint_tile_subsets_compose_to_full_frame() {
    let registry = PluginRegistry::new();
    let mut raw = RawImage::new(300, 300);
    for (i, v) in raw.data.iter_mut().enumerate() {
        *v = ((i * 7) % 60000) as u16;
    }
    let data = UnifiedRaw::new(raw);

    let full = Pipeline::new()
        .apply(&registry, &data, &request(128), RenderMode::GrayscalePreview)
        .unwrap();

    // Checkerboard split of the 3x3 tile grid.
    let all: Vec<TileCoord> = (0..3)
        .flat_map(|ty| (0..3).map(move |tx| TileCoord::new(tx, ty, 0)))
        .collect();
    let (a, b): (Vec<_>, Vec<_>) = all.iter().partition(|t| (t.x + t.y) % 2 == 0);

    let render_subset = |tiles: Vec<TileCoord>| {
        let req = RenderRequest {
            tile_size: 128,
            tiles,
            out_width: 300,
            out_height: 300,
            ..Default::default()
        };
        Pipeline::new()
            .apply(&registry, &data, &req, RenderMode::GrayscalePreview)
            .unwrap()
    };
    let out_a = render_subset(a.into_iter().cloned().collect());
    let out_b = render_subset(b.into_iter().cloned().collect());

    // Subsets render into zeroed buffers over disjoint rectangles, so the
    // composition is an elementwise sum.
    let combined: Vec<f32> = out_a
        .data
        .iter()
        .zip(&out_b.data)
        .map(|(x, y)| x + y)
        .collect();
    assert_eq!(combined, full.data);
}

#[test]
fn lod_renders_from_downsampled_level() {
    let registry = PluginRegistry::new();
    // Left half dark, right half bright; averages survive downsampling.
    let mut raw = RawImage::new(64, 64);
    for y in 0..64u32 {
        for x in 0..64u32 {
            raw.data[(y * 64 + x) as usize] = if x < 32 { 0 } else { 60000 };
        }
    }
    let mut data = UnifiedRaw::new(raw);
    // Bright half saturates the window, so it clamps to exactly 1.0.
    data.meta.white_level = 32768.0;

    let req = RenderRequest { lod: 2, ..request(256) };
    let out = Pipeline::new()
        .apply(&registry, &data, &req, RenderMode::GrayscalePreview)
        .unwrap();

    assert_eq!((out.width, out.height), (16, 16));
    assert_eq!(out.pixel(0, 0), [0.0, 0.0, 0.0]);
    assert_eq!(out.pixel(15, 0), [1.0, 1.0, 1.0]);
}

#[test]
fn negative_requests_are_rejected() {
    let registry = PluginRegistry::new();
    let data = constant_frame(8, 8, 100);
    let mut pipeline = Pipeline::new();

    let bad_lod = RenderRequest { lod: -1, ..Default::default() };
    assert!(pipeline
        .apply(&registry, &data, &bad_lod, RenderMode::GrayscalePreview)
        .is_err());

    let bad_dims = RenderRequest { out_width: -5, ..Default::default() };
    assert!(pipeline
        .apply(&registry, &data, &bad_dims, RenderMode::GrayscalePreview)
        .is_err());
}

#[test]
fn zero_tile_size_falls_back_to_default() {
    let registry = PluginRegistry::new();
    let data = constant_frame(64, 64, 512);
    let out = Pipeline::new()
        .apply(&registry, &data, &request(0), RenderMode::GrayscalePreview)
        .unwrap();
    assert_eq!((out.width, out.height), (64, 64));
    let expected = 512.0 / 65535.0;
    assert!((out.pixel(63, 63)[0] - expected).abs() < 1e-7);
}

#[test]
fn history_step_with_dead_instance_is_skipped() {
    let mut registry = PluginRegistry::new();
    let id = registry.register_instance(Box::new(Doubling));
    registry.destroy_instance(id);

    let mut data = constant_frame(16, 16, 512);
    data.push_step(id);

    let out = Pipeline::new()
        .apply(&registry, &data, &request(256), RenderMode::GrayscalePreview)
        .unwrap();
    let expected = 512.0 / 65535.0;
    assert!((out.pixel(0, 0)[0] - expected).abs() < 1e-7, "no doubling applied");
}

#[test]
fn gpu_real_mode_matches_cpu_within_rounding() {
    use rawtile_gpu::GpuContext;
    if !GpuContext::is_available() {
        eprintln!("skipping: no GPU adapter");
        return;
    }

    let build_registry = || {
        let mut registry = PluginRegistry::new();
        let id = registry.register_instance(Box::new(GammaPlugin::default()));
        (registry, id)
    };

    let (cpu_registry, cpu_id) = build_registry();
    let mut data = constant_frame(640, 480, 512);
    data.push_step(cpu_id);
    let cpu_out = Pipeline::new()
        .apply(&cpu_registry, &data, &request(256), RenderMode::GrayscalePreview)
        .unwrap();

    let (gpu_registry, gpu_id) = build_registry();
    let mut data = constant_frame(640, 480, 512);
    data.push_step(gpu_id);
    let mut gpu_pipeline = Pipeline::new();
    gpu_pipeline.set_gpu_enabled(true);
    let gpu_out = gpu_pipeline
        .apply(&gpu_registry, &data, &request(256), RenderMode::GrayscalePreview)
        .unwrap();

    for (c, g) in cpu_out.data.iter().zip(&gpu_out.data) {
        let ulp = f32::from_bits(c.to_bits() ^ 1) - c;
        assert!(
            (c - g).abs() <= ulp.abs().max(f32::EPSILON),
            "cpu {c} vs gpu {g}"
        );
    }
}
