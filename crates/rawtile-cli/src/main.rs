//! Command-line driver: scan plugins, load (or synthesize) a frame,
//! render a preview, write it out as PPM.
//!
//! Exit codes: 0 success, 1 load/render failure, 2 argument errors
//! (clap's default), 3 empty or out-of-bounds viewport.

mod io;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use rawtile_plugins::{DenoisePlugin, GammaPlugin, WhiteBalancePlugin};

use rawtile_core::{ParamValue, RawImage, RenderRequest, TileCoord, UnifiedRaw};
use rawtile_engine::{Pipeline, RenderMode};
use rawtile_gpu::DebugMode;
use rawtile_plugin::{PluginRegistry, ProcessingStage};

#[derive(Parser)]
#[command(name = "rawtile", about = "Tiled RAW preview renderer")]
struct Cli {
    /// Input frame as 16-bit binary PGM; a synthetic frame is used if
    /// omitted
    input: Option<PathBuf>,

    /// Directory to scan for plugin libraries
    #[arg(long, default_value = "./plugins")]
    plugins: PathBuf,

    /// Restrict rendering to a viewport, in output pixels at the selected
    /// LOD
    #[arg(long, num_args = 4, value_names = ["X", "Y", "W", "H"], allow_negative_numbers = true)]
    viewport: Option<Vec<i32>>,

    /// Square tile size in pixels
    #[arg(long = "tile", default_value_t = 256, value_parser = clap::value_parser!(i32).range(1..))]
    tile: i32,

    /// Level of detail (0 = full resolution)
    #[arg(long, default_value_t = 0, value_parser = clap::value_parser!(i32).range(0..))]
    lod: i32,

    /// Render mode
    #[arg(long, value_enum, default_value_t = ModeArg::Gray)]
    mode: ModeArg,

    /// Run the normalize + gamma math on the GPU
    #[arg(long)]
    gpu: bool,

    /// GPU diagnostic output
    #[arg(long = "gpu-debug", value_enum)]
    gpu_debug: Option<GpuDebugArg>,

    /// Feed the GPU a synthetic ramp instead of real tiles
    #[arg(long = "gpu-synth")]
    gpu_synth: bool,

    /// Output preview path (binary PPM)
    #[arg(long, short, default_value = "preview.ppm")]
    out: PathBuf,
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Gray,
    Color,
}

#[derive(Clone, Copy, ValueEnum)]
enum GpuDebugArg {
    Real,
    Coords,
    Raw,
}

impl From<GpuDebugArg> for DebugMode {
    fn from(arg: GpuDebugArg) -> Self {
        match arg {
            GpuDebugArg::Real => DebugMode::Real,
            GpuDebugArg::Coords => DebugMode::Coords,
            GpuDebugArg::Raw => DebugMode::Raw,
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let mut registry = PluginRegistry::new();
    match registry.scan_directory(&cli.plugins) {
        Ok(count) => info!(count, dir = %cli.plugins.display(), "scanned plugins"),
        Err(e) => warn!(error = %e, "no loadable plugins, using built-ins"),
    }

    let mut data = match &cli.input {
        Some(path) => match io::read_pgm16(path) {
            Ok(raw) => UnifiedRaw::new(raw),
            Err(e) => {
                eprintln!("failed to load {}: {e:#}", path.display());
                return ExitCode::from(1);
            }
        },
        None => {
            info!("no input given, synthesizing a 640x480 frame");
            UnifiedRaw::new(RawImage::filled(640, 480, 512))
        }
    };

    build_history(&mut registry, &mut data);

    let request = match build_request(&cli, &data.raw) {
        Ok(req) => req,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::from(3);
        }
    };

    let mut pipeline = Pipeline::new();
    if cli.gpu {
        pipeline.set_gpu_enabled(true);
        if let Some(mode) = cli.gpu_debug {
            pipeline.set_gpu_debug(mode.into());
        }
        pipeline.set_gpu_synthetic_input(cli.gpu_synth);
    }

    let mode = match cli.mode {
        ModeArg::Gray => RenderMode::GrayscalePreview,
        ModeArg::Color => RenderMode::FullColor,
    };

    let rendered = match pipeline.apply(&registry, &data, &request, mode) {
        Ok(img) => img,
        Err(e) => {
            eprintln!("render failed: {e}");
            return ExitCode::from(1);
        }
    };

    if let Err(e) = io::write_ppm(&cli.out, &rendered) {
        eprintln!("{e:#}");
        return ExitCode::from(1);
    }
    info!(path = %cli.out.display(), width = rendered.width, height = rendered.height, "wrote preview");
    ExitCode::SUCCESS
}

/// Creates an instance of the first prototype matching `pred`, or 0.
fn create_matching(
    registry: &mut PluginRegistry,
    pred: impl Fn(&rawtile_plugin::PluginPrototype) -> bool,
) -> u64 {
    let index = registry.prototypes().iter().position(pred);
    match index {
        Some(i) => registry.create_instance(i),
        None => 0,
    }
}

/// Builds the default edit history: one pre-demosaic plugin if available,
/// white balance seeded from camera metadata, then gamma.
fn build_history(registry: &mut PluginRegistry, data: &mut UnifiedRaw) {
    let scanned = registry.prototypes().iter().any(|p| p.library_path.is_some());

    let pre_id = if scanned {
        create_matching(registry, |p| p.stage == ProcessingStage::PreDemosaic)
    } else {
        registry.register_instance(Box::new(DenoisePlugin::default()))
    };
    if pre_id != 0 {
        data.push_step(pre_id);
    }

    let wb_id = if scanned {
        create_matching(registry, |p| p.name == "WhiteBalance")
    } else {
        registry.register_instance(Box::new(WhiteBalancePlugin::default()))
    };
    if wb_id != 0 {
        if let Some(handle) = registry.get_instance(wb_id) {
            if let Ok(mut wb) = handle.write() {
                for (name, gain) in ["R", "G", "B"].iter().zip(data.meta.wb) {
                    wb.set_param(name, &ParamValue::Float(gain));
                }
            }
        }
        data.push_step(wb_id);
    }

    let gamma_id = if scanned {
        create_matching(registry, |p| p.name == "Gamma")
    } else {
        registry.register_instance(Box::new(GammaPlugin::default()))
    };
    if gamma_id != 0 {
        data.push_step(gamma_id);
    }
}

/// Turns the viewport flag into a tile list, validating bounds.
fn build_request(cli: &Cli, raw: &RawImage) -> Result<RenderRequest, String> {
    let out_w = ((raw.width >> cli.lod.min(31)).max(1)) as i32;
    let out_h = ((raw.height >> cli.lod.min(31)).max(1)) as i32;

    let tiles = match &cli.viewport {
        None => Vec::new(),
        Some(v) => {
            let [x, y, w, h] = [v[0], v[1], v[2], v[3]];
            if w <= 0 || h <= 0 {
                return Err(format!("empty viewport {w}x{h}"));
            }
            if x >= out_w || y >= out_h || x + w <= 0 || y + h <= 0 {
                return Err(format!(
                    "viewport ({x}, {y}, {w}x{h}) outside output {out_w}x{out_h}"
                ));
            }
            let tx0 = x.max(0) / cli.tile;
            let ty0 = y.max(0) / cli.tile;
            let tx1 = ((x + w).min(out_w) - 1) / cli.tile;
            let ty1 = ((y + h).min(out_h) - 1) / cli.tile;
            let mut tiles = Vec::new();
            for ty in ty0..=ty1 {
                for tx in tx0..=tx1 {
                    tiles.push(TileCoord::new(tx, ty, cli.lod));
                }
            }
            tiles
        }
    };

    Ok(RenderRequest {
        tile_size: cli.tile,
        lod: cli.lod,
        out_width: 0,
        out_height: 0,
        tiles,
    })
}
