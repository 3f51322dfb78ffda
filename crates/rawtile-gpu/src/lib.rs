//! wgpu compute backend for the tiled pipeline.
//!
//! One entry point matters: [`GpuContext::process_gray_and_gamma`], which
//! fuses grayscale normalization and gamma for a tile's inner region into a
//! single dispatch. The call is synchronous: when it returns `true` the
//! caller-provided tile buffer holds the result; when it returns `false`
//! nothing useful was written and the caller renders that tile on the CPU.

mod shaders;

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;

use bytemuck::{Pod, Zeroable};
use thiserror::Error;
use tracing::{debug, warn};

use rawtile_core::{RawImage, RgbImage};

/// Result alias for context construction.
pub type GpuResult<T> = Result<T, GpuError>;

/// GPU context construction errors.
#[derive(Debug, Error)]
pub enum GpuError {
    #[error("no suitable GPU adapter found")]
    NoAdapter,

    #[error("failed to create device: {0}")]
    DeviceCreation(String),
}

/// Diagnostic output modes for the compute kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u32)]
pub enum DebugMode {
    /// Normal operation: normalize + gamma.
    #[default]
    Real = 0,
    /// Tile-local coordinate ramps, for verifying tile geometry.
    Coords = 1,
    /// Raw sample / 65535, bypassing normalization.
    Raw = 2,
}

/// Geometry of one tile dispatch.
///
/// `(x0, y0)` and `(tw, th)` describe the inner region in output pixels;
/// `(sx0, sy0)` and `(sw, sh)` describe the apron-padded source rectangle
/// the raw tile was cut from. The inner region is always inside the source
/// rectangle.
#[derive(Debug, Clone, Copy)]
pub struct TileGeom {
    pub x0: u32,
    pub y0: u32,
    pub tw: u32,
    pub th: u32,
    pub sx0: u32,
    pub sy0: u32,
    pub sw: u32,
    pub sh: u32,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct GrayGammaParams {
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

/// Device, queue and the gray+gamma compute pipeline.
///
/// Safe to share across tile workers: dispatch and readback are serialized
/// behind an internal lock, so callers never coordinate.
pub struct GpuContext {
    device: wgpu::Device,
    queue: wgpu::Queue,
    pipeline: wgpu::ComputePipeline,
    dispatch: Mutex<()>,
    debug_mode: AtomicU32,
    synthetic_input: AtomicBool,
    dispatch_count: AtomicU32,
}

impl GpuContext {
    /// Probes for a usable adapter without creating a device.
    pub fn is_available() -> bool {
        pollster::block_on(async {
            let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
                backends: wgpu::Backends::all(),
                ..Default::default()
            });
            instance
                .request_adapter(&wgpu::RequestAdapterOptions {
                    power_preference: wgpu::PowerPreference::HighPerformance,
                    compatible_surface: None,
                    force_fallback_adapter: false,
                })
                .await
                .is_some()
        })
    }

    /// Acquires a device and builds the compute pipeline.
    pub fn new() -> GpuResult<Self> {
        pollster::block_on(Self::new_async())
    }

    async fn new_async() -> GpuResult<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or(GpuError::NoAdapter)?;

        debug!(adapter = %adapter.get_info().name, "acquired GPU adapter");

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("rawtile_gpu_device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                    memory_hints: wgpu::MemoryHints::Performance,
                    ..Default::default()
                },
                None,
            )
            .await
            .map_err(|e| GpuError::DeviceCreation(e.to_string()))?;

        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("gray_gamma_shader"),
            source: wgpu::ShaderSource::Wgsl(shaders::GRAY_GAMMA.into()),
        });

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("gray_gamma_pipeline"),
            layout: None,
            module: &module,
            entry_point: Some("main"),
            compilation_options: Default::default(),
            cache: None,
        });

        Ok(Self {
            device,
            queue,
            pipeline,
            dispatch: Mutex::new(()),
            debug_mode: AtomicU32::new(DebugMode::Real as u32),
            synthetic_input: AtomicBool::new(false),
            dispatch_count: AtomicU32::new(0),
        })
    }

    /// Selects the diagnostic output mode.
    pub fn set_debug_mode(&self, mode: DebugMode) {
        self.debug_mode.store(mode as u32, Ordering::Relaxed);
    }

    /// Replaces uploaded tiles with a horizontal 0..65535 ramp.
    pub fn set_synthetic_input(&self, on: bool) {
        self.synthetic_input.store(on, Ordering::Relaxed);
    }

    /// Runs normalize + gamma for one tile's inner region.
    ///
    /// `tile_raw` is the apron-padded `sw x sh` source cut; `out` must be
    /// the `tw x th` inner tile. On `true` every pixel of `out` has been
    /// written; on `false` the caller should fall back to the CPU path.
    pub fn process_gray_and_gamma(
        &self,
        tile_raw: &RawImage,
        geom: &TileGeom,
        black: f32,
        inv_norm: f32,
        gamma: f32,
        out: &mut RgbImage,
    ) -> bool {
        let in_count = geom.sw as usize * geom.sh as usize;
        let out_count = geom.tw as usize * geom.th as usize * 3;
        if tile_raw.data.len() != in_count
            || out.width != geom.tw
            || out.height != geom.th
            || out_count == 0
        {
            warn!(?geom, "rejecting GPU dispatch with inconsistent geometry");
            return false;
        }

        // 16-bit samples widened to u32 for the storage buffer.
        let samples: Vec<u32> = if self.synthetic_input.load(Ordering::Relaxed) {
            let mut v = Vec::with_capacity(in_count);
            for _y in 0..geom.sh {
                for x in 0..geom.sw {
                    let ramp = x as f32 / (geom.sw.max(2) - 1) as f32;
                    v.push((ramp * 65535.0) as u32);
                }
            }
            v
        } else {
            // Trace the first few tiles so geometry bugs show up in logs.
            if self.dispatch_count.fetch_add(1, Ordering::Relaxed) < 4 {
                let (mut lo, mut hi) = (u16::MAX, 0u16);
                for &s in &tile_raw.data {
                    lo = lo.min(s);
                    hi = hi.max(s);
                }
                debug!(
                    sw = geom.sw,
                    sh = geom.sh,
                    min = lo,
                    max = hi,
                    x0 = geom.x0,
                    y0 = geom.y0,
                    tw = geom.tw,
                    th = geom.th,
                    "dispatching tile"
                );
            }
            tile_raw.data.iter().map(|&s| s as u32).collect()
        };

        let params = GrayGammaParams {
            src_w: geom.sw,
            src_h: geom.sh,
            x_off: geom.x0 - geom.sx0,
            y_off: geom.y0 - geom.sy0,
            tile_w: geom.tw,
            tile_h: geom.th,
            mode: self.debug_mode.load(Ordering::Relaxed),
            _pad0: 0,
            black,
            inv_norm,
            gamma,
            _pad1: 0.0,
        };

        use wgpu::util::DeviceExt;

        let in_buf = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("tile_raw_buffer"),
            contents: bytemuck::cast_slice(&samples),
            usage: wgpu::BufferUsages::STORAGE,
        });
        let out_bytes = (out_count * 4) as u64;
        let out_buf = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("tile_rgb_buffer"),
            size: out_bytes,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let params_buf = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("gray_gamma_params"),
            contents: bytemuck::bytes_of(&params),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("tile_rgb_staging"),
            size: out_bytes,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let layout = self.pipeline.get_bind_group_layout(0);
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("gray_gamma_bind_group"),
            layout: &layout,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: in_buf.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 1, resource: out_buf.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 2, resource: params_buf.as_entire_binding() },
            ],
        });

        // One dispatch at a time; the map/poll readback below assumes sole
        // use of the device poll loop.
        let _guard = match self.dispatch.lock() {
            Ok(g) => g,
            Err(_) => return false,
        };

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("gray_gamma_encoder") });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("gray_gamma_pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(geom.tw.div_ceil(16), geom.th.div_ceil(16), 1);
        }
        encoder.copy_buffer_to_buffer(&out_buf, 0, &staging, 0, out_bytes);
        self.queue.submit(std::iter::once(encoder.finish()));

        let slice = staging.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |r| {
            let _ = tx.send(r);
        });
        self.device.poll(wgpu::Maintain::Wait);

        match rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(error = %e, "GPU buffer map failed");
                return false;
            }
            Err(_) => {
                warn!("GPU map channel closed");
                return false;
            }
        }

        {
            let mapped = slice.get_mapped_range();
            out.data.copy_from_slice(bytemuck::cast_slice(&mapped));
        }
        staging.unmap();
        true
    }
}

impl std::fmt::Debug for GpuContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuContext")
            .field("debug_mode", &self.debug_mode.load(Ordering::Relaxed))
            .finish()
    }
}
