//! Render planning and per-tile execution.

use std::collections::HashSet;
use std::sync::Arc;

use rayon::prelude::*;
use tracing::{debug, warn};

use rawtile_core::{full_frame_tiles, RawImage, RenderRequest, RgbImage, TileCoord, UnifiedRaw};
use rawtile_gpu::{DebugMode, GpuContext, TileGeom};
use rawtile_plugin::{PluginHandle, PluginRegistry, ProcessingStage};

use crate::cache::{TileBuffer, TileCache};
use crate::executor::Executor;
use crate::fingerprint::Fingerprint;
use crate::mips::MipPyramid;
use crate::{EngineError, EngineResult};

/// How the demosaic stage fills the output.
///
/// Both modes currently produce the same grayscale normalization;
/// `FullColor` additionally runs the post-demosaic linear plugins. A real
/// demosaic for `FullColor` is intentionally absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderMode {
    #[default]
    GrayscalePreview = 0,
    FullColor = 1,
}

/// The tiled rendering pipeline.
///
/// Owns its worker pool, tile cache, mip pyramid and (lazily created) GPU
/// context. Callers own the frame and the plugin registry and pass both
/// into [`apply`](Self::apply), which blocks until every tile completes.
pub struct Pipeline {
    executor: Executor,
    cache: Arc<TileCache>,
    mips: MipPyramid,
    gpu: Option<Arc<GpuContext>>,
    gpu_enabled: bool,
    gpu_failed: bool,
    gpu_debug: DebugMode,
    gpu_synthetic: bool,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl Pipeline {
    /// Creates a pipeline with a default-sized worker pool and the default
    /// cache budget (`RAWTILE_CACHE_MB` overrides it).
    pub fn new() -> Self {
        let capacity = std::env::var("RAWTILE_CACHE_MB")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .map(|mb| mb * 1024 * 1024)
            .unwrap_or(TileCache::DEFAULT_CAPACITY);
        Self {
            executor: Executor::default(),
            cache: Arc::new(TileCache::with_capacity(capacity)),
            mips: MipPyramid::new(),
            gpu: None,
            gpu_enabled: false,
            gpu_failed: false,
            gpu_debug: DebugMode::Real,
            gpu_synthetic: false,
        }
    }

    /// Requests GPU execution. The context is created lazily on the next
    /// `apply`; if creation fails the pipeline stays on the CPU path.
    pub fn set_gpu_enabled(&mut self, on: bool) {
        self.gpu_enabled = on;
    }

    /// Selects the GPU diagnostic mode.
    pub fn set_gpu_debug(&mut self, mode: DebugMode) {
        self.gpu_debug = mode;
        if let Some(gpu) = &self.gpu {
            gpu.set_debug_mode(mode);
        }
    }

    /// Feeds the GPU a synthetic ramp instead of real tiles.
    pub fn set_gpu_synthetic_input(&mut self, on: bool) {
        self.gpu_synthetic = on;
        if let Some(gpu) = &self.gpu {
            gpu.set_synthetic_input(on);
        }
    }

    /// The tile cache, for statistics and budget control.
    pub fn cache(&self) -> &TileCache {
        &self.cache
    }

    /// Drops all cached tiles and the mip pyramid.
    pub fn clear_cache(&mut self) {
        self.cache.clear();
        self.mips.clear();
    }

    /// Renders `request` from `data`, resolving plugin references through
    /// `registry`. Blocks until every tile has been produced.
    pub fn apply(
        &mut self,
        registry: &PluginRegistry,
        data: &UnifiedRaw,
        request: &RenderRequest,
        mode: RenderMode,
    ) -> EngineResult<RgbImage> {
        if request.lod < 0 {
            return Err(EngineError::InvalidRequest(format!(
                "negative lod {}",
                request.lod
            )));
        }
        if request.out_width < 0 || request.out_height < 0 {
            return Err(EngineError::InvalidRequest(format!(
                "negative output dimensions {}x{}",
                request.out_width, request.out_height
            )));
        }

        if self.gpu_enabled && self.gpu.is_none() && !self.gpu_failed {
            match GpuContext::new() {
                Ok(ctx) => {
                    ctx.set_debug_mode(self.gpu_debug);
                    ctx.set_synthetic_input(self.gpu_synthetic);
                    self.gpu = Some(Arc::new(ctx));
                }
                Err(e) => {
                    warn!(error = %e, "GPU unavailable, rendering on CPU");
                    self.gpu_failed = true;
                }
            }
        }

        let lod = request.lod;
        self.mips.ensure(&data.raw, lod);
        let full_raw = match self.mips.level(lod) {
            Some(level) => level,
            None => Arc::new(data.raw.clone()),
        };

        let tile_size = if request.tile_size <= 0 { 256 } else { request.tile_size };
        let out_w = if request.out_width == 0 { full_raw.width as i32 } else { request.out_width };
        let out_h = if request.out_height == 0 { full_raw.height as i32 } else { request.out_height };

        let tiles = if request.tiles.is_empty() {
            full_frame_tiles(out_w, out_h, tile_size, lod)
        } else {
            dedup_tiles(&request.tiles)
        };

        // Resolve history once, in order, bucketed by stage.
        let mut pre: Vec<PluginHandle> = Vec::new();
        let mut post: Vec<PluginHandle> = Vec::new();
        let mut finalize: Vec<PluginHandle> = Vec::new();
        for step in &data.history {
            let Some(handle) = registry.get_instance(step.instance_id) else {
                continue;
            };
            let stage = match handle.read() {
                Ok(plugin) => plugin.stage(),
                Err(_) => continue,
            };
            match stage {
                ProcessingStage::PreDemosaic => pre.push(handle),
                ProcessingStage::PostDemosaicLinear => post.push(handle),
                ProcessingStage::Finalize => finalize.push(handle),
                // No demosaic plugins run in the current modes.
                ProcessingStage::Demosaic => {}
            }
        }

        let pre_radius = pre
            .iter()
            .filter_map(|h| h.read().ok().map(|p| p.kernel_radius_px()))
            .max()
            .unwrap_or(0);
        let apron = pre_radius.checked_shr(lod as u32).unwrap_or(0) as i32;

        // Grayscale normalization window: camera levels when they span a
        // meaningful range, else the frame's own min/max.
        let mut black = data.meta.black_level;
        let mut white = data.meta.white_level;
        if !(white > black + 1.0) {
            let (lo, hi) = min_max(&full_raw);
            black = lo as f32;
            white = hi as f32;
        }
        let denom = if white > black + 1.0 { white - black } else { 1.0 };
        let inv_norm = 1.0 / denom;

        let fp = Fingerprint::new(
            &data.meta,
            data.raw.width,
            data.raw.height,
            &data.history,
            registry,
            tile_size,
            lod,
            mode,
        );

        let gpu_plan = self.gpu_plan(mode, &post, &finalize);

        let mut output = RgbImage::new(out_w.max(0) as u32, out_h.max(0) as u32);
        let view = OutputView::new(&mut output);

        debug!(
            tiles = tiles.len(),
            tile_size,
            lod,
            apron,
            gpu = gpu_plan.is_some(),
            "render planned"
        );

        let handles: Vec<_> = tiles
            .into_iter()
            .map(|tc| {
                let task = TileTask {
                    tc,
                    tile_size,
                    out_w,
                    out_h,
                    apron,
                    black,
                    inv_norm,
                    mode,
                    fp,
                    full_raw: Arc::clone(&full_raw),
                    pre: pre.clone(),
                    post: post.clone(),
                    finalize: finalize.clone(),
                    cache: Arc::clone(&self.cache),
                    gpu: gpu_plan.clone(),
                    view,
                };
                self.executor.spawn(move || task.run())
            })
            .collect();

        // Drain every handle before touching the output: the raw-pointer
        // view stays live until the last worker is done with it.
        let mut all_ok = true;
        for handle in handles {
            if handle.join().is_none() {
                all_ok = false;
            }
        }
        if !all_ok {
            return Err(EngineError::TileFailed);
        }
        Ok(output)
    }

    /// Decides whether tiles may take the fused GPU dispatch, and with
    /// which gamma. The dispatch covers normalize + gamma only, so it is
    /// off the table when post-demosaic work would run or the finalize
    /// chain is anything but a single gamma-style plugin.
    fn gpu_plan(
        &self,
        mode: RenderMode,
        post: &[PluginHandle],
        finalize: &[PluginHandle],
    ) -> Option<(Arc<GpuContext>, f32)> {
        let gpu = self.gpu.as_ref()?;
        if !self.gpu_enabled {
            return None;
        }
        if mode == RenderMode::FullColor && !post.is_empty() {
            return None;
        }
        let gamma = match finalize {
            [] => 1.0,
            [only] => {
                let plugin = only.read().ok()?;
                plugin.get_param("Gamma")?.as_float()?
            }
            _ => return None,
        };
        Some((Arc::clone(gpu), gamma))
    }
}

/// Raw-pointer view of the output image handed to tile workers.
///
/// Tiles write disjoint inner rectangles, so concurrent writes through the
/// same view never alias. `apply` joins every worker before the image is
/// read or dropped.
#[derive(Clone, Copy)]
struct OutputView {
    ptr: *mut f32,
    width: u32,
    height: u32,
}

unsafe impl Send for OutputView {}
unsafe impl Sync for OutputView {}

impl OutputView {
    fn new(img: &mut RgbImage) -> Self {
        Self {
            ptr: img.data.as_mut_ptr(),
            width: img.width,
            height: img.height,
        }
    }

    /// Writes a `w x h` interleaved-RGB block at `(x, y)`.
    ///
    /// # Safety
    ///
    /// The rectangle must lie inside the image, no concurrent writer may
    /// overlap it, and the backing image must outlive the call.
    unsafe fn write_rect(&self, x: u32, y: u32, w: u32, h: u32, src: &[f32]) {
        debug_assert!(x + w <= self.width && y + h <= self.height);
        debug_assert_eq!(src.len(), w as usize * h as usize * 3);
        let stride = self.width as usize * 3;
        let row_len = w as usize * 3;
        for row in 0..h as usize {
            let dst = self.ptr.add((y as usize + row) * stride + x as usize * 3);
            std::ptr::copy_nonoverlapping(src[row * row_len..].as_ptr(), dst, row_len);
        }
    }
}

/// Everything one tile needs, cloned per task.
struct TileTask {
    tc: TileCoord,
    tile_size: i32,
    out_w: i32,
    out_h: i32,
    apron: i32,
    black: f32,
    inv_norm: f32,
    mode: RenderMode,
    fp: Fingerprint,
    full_raw: Arc<RawImage>,
    pre: Vec<PluginHandle>,
    post: Vec<PluginHandle>,
    finalize: Vec<PluginHandle>,
    cache: Arc<TileCache>,
    gpu: Option<(Arc<GpuContext>, f32)>,
    view: OutputView,
}

impl TileTask {
    fn run(self) {
        // Inner rectangle at the output; degenerate tiles are skipped.
        let ts = self.tile_size;
        let x0 = self.tc.x * ts;
        let y0 = self.tc.y * ts;
        if x0 < 0 || y0 < 0 || x0 >= self.out_w || y0 >= self.out_h {
            return;
        }
        let tw = ts.min(self.out_w - x0);
        let th = ts.min(self.out_h - y0);
        if tw <= 0 || th <= 0 {
            return;
        }
        let (xu, yu, twu, thu) = (x0 as u32, y0 as u32, tw as u32, th as u32);

        let key = self.fp.tile_key(&self.tc);
        if let Some(cached) = self.cache.lookup(key, twu, thu) {
            unsafe { self.view.write_rect(xu, yu, twu, thu, &cached.data) };
            return;
        }

        // Apron-padded source rectangle, clamped to the frame.
        let raw_w = self.full_raw.width as i32;
        let raw_h = self.full_raw.height as i32;
        let sx0 = (x0 - self.apron).max(0);
        let sy0 = (y0 - self.apron).max(0);
        let sx1 = (x0 + tw + self.apron).min(self.out_w).min(raw_w);
        let sy1 = (y0 + th + self.apron).min(self.out_h).min(raw_h);
        let (sw, sh) = (((sx1 - sx0).max(0)) as u32, ((sy1 - sy0).max(0)) as u32);

        let mut tile_rgb = RgbImage::new(twu, thu);

        if sw > 0 && sh > 0 {
            let mut tile_raw = self.full_raw.copy_rect(sx0 as u32, sy0 as u32, sw, sh);

            for p in &self.pre {
                if let Ok(plugin) = p.read() {
                    plugin.process_raw(&mut tile_raw);
                }
            }

            let mut gpu_done = false;
            if let Some((ctx, gamma)) = &self.gpu {
                let geom = TileGeom {
                    x0: xu,
                    y0: yu,
                    tw: twu,
                    th: thu,
                    sx0: sx0 as u32,
                    sy0: sy0 as u32,
                    sw,
                    sh,
                };
                gpu_done = ctx.process_gray_and_gamma(
                    &tile_raw,
                    &geom,
                    self.black,
                    self.inv_norm,
                    *gamma,
                    &mut tile_rgb,
                );
            }

            if !gpu_done {
                // Grayscale fill of the inner region; pixels past the
                // frame edge stay black, like the GPU kernel leaves them.
                let x_off = (x0 - sx0) as u32;
                let y_off = (y0 - sy0) as u32;
                for yy in 0..thu {
                    let sy = yy + y_off;
                    if sy >= sh {
                        break;
                    }
                    for xx in 0..twu {
                        let sx = xx + x_off;
                        if sx >= sw {
                            break;
                        }
                        let sample = tile_raw.data[(sy * sw + sx) as usize];
                        let g = ((sample as f32 - self.black) * self.inv_norm).clamp(0.0, 1.0);
                        tile_rgb.set_pixel(xx, yy, [g, g, g]);
                    }
                }

                if self.mode == RenderMode::FullColor {
                    for p in &self.post {
                        if let Ok(plugin) = p.read() {
                            plugin.process_rgb(&mut tile_rgb);
                        }
                    }
                }
                for p in &self.finalize {
                    if let Ok(plugin) = p.read() {
                        plugin.process_rgb(&mut tile_rgb);
                    }
                }
            }
        }

        unsafe { self.view.write_rect(xu, yu, twu, thu, &tile_rgb.data) };
        self.cache.insert(key, TileBuffer::from_rgb(tile_rgb));
    }
}

/// Drops repeated coordinates while preserving first-seen order; two tasks
/// must never share an inner rectangle.
fn dedup_tiles(tiles: &[TileCoord]) -> Vec<TileCoord> {
    let mut seen = HashSet::new();
    tiles.iter().copied().filter(|t| seen.insert(*t)).collect()
}

/// Full-frame sample range.
fn min_max(raw: &RawImage) -> (u16, u16) {
    raw.data
        .par_iter()
        .fold(|| (u16::MAX, 0u16), |acc, &v| (acc.0.min(v), acc.1.max(v)))
        .reduce(|| (u16::MAX, 0u16), |a, b| (a.0.min(b.0), a.1.max(b.1)))
}
