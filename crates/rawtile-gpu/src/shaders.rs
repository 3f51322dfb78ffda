//! WGSL shader sources for the compute backend.

/// Grayscale normalize + gamma over the inner region of one tile.
///
/// The raw tile (apron included) arrives as 16-bit samples widened to u32;
/// the kernel writes `tile_w x tile_h` interleaved RGB floats. Modes 1 and
/// 2 are diagnostics: coordinate ramps and raw passthrough.
pub const GRAY_GAMMA: &str = r#"
struct Params {
    src_w: u32,
    src_h: u32,
    x_off: u32,
    y_off: u32,
    tile_w: u32,
    tile_h: u32,
    mode: u32,
    _pad0: u32,
    black: f32,
    inv_norm: f32,
    gamma: f32,
    _pad1: f32,
}

@group(0) @binding(0) var<storage, read> raw_samples: array<u32>;
@group(0) @binding(1) var<storage, read_write> out_rgb: array<f32>;
@group(0) @binding(2) var<uniform> params: Params;

@compute @workgroup_size(16, 16, 1)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    if gid.x >= params.tile_w || gid.y >= params.tile_h {
        return;
    }

    // Mode 1: visualize tile-local coordinates.
    if params.mode == 1u {
        let o = (gid.y * params.tile_w + gid.x) * 3u;
        out_rgb[o] = f32(gid.x) / max(1.0, f32(params.tile_w - 1u));
        out_rgb[o + 1u] = f32(gid.y) / max(1.0, f32(params.tile_h - 1u));
        out_rgb[o + 2u] = 0.0;
        return;
    }

    let sx = gid.x + params.x_off;
    let sy = gid.y + params.y_off;
    if sx >= params.src_w || sy >= params.src_h {
        return;
    }
    let sample = raw_samples[sy * params.src_w + sx] & 0xFFFFu;

    var g: f32;
    if params.mode == 2u {
        // Mode 2: raw passthrough, no normalization.
        g = f32(sample) / 65535.0;
    } else {
        g = clamp((f32(sample) - params.black) * params.inv_norm, 0.0, 1.0);
        g = pow(g, 1.0 / params.gamma);
    }

    let o = (gid.y * params.tile_w + gid.x) * 3u;
    out_rgb[o] = g;
    out_rgb[o + 1u] = g;
    out_rgb[o + 2u] = g;
}
"#;
