//! Minimal frame I/O for the driver: 16-bit binary PGM in, binary PPM out.
//!
//! Real RAW container decoding is a separate concern; the driver only
//! needs a way to feed sensor-shaped data into the engine and to dump the
//! rendered preview somewhere viewable.

use std::fs;
use std::io::Write;
use std::path::Path;

use anyhow::{bail, Context, Result};

use rawtile_core::{RawImage, RgbImage};

/// Reads a binary (`P5`) PGM with maxval 65535 as a sensor frame.
pub fn read_pgm16(path: &Path) -> Result<RawImage> {
    let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;

    let mut header = Vec::new();
    let mut pos = 0usize;
    // Header: magic, width, height, maxval; '#' starts a comment line.
    while header.len() < 4 && pos < bytes.len() {
        match bytes[pos] {
            b'#' => {
                while pos < bytes.len() && bytes[pos] != b'\n' {
                    pos += 1;
                }
            }
            c if c.is_ascii_whitespace() => pos += 1,
            _ => {
                let start = pos;
                while pos < bytes.len() && !bytes[pos].is_ascii_whitespace() {
                    pos += 1;
                }
                header.push(std::str::from_utf8(&bytes[start..pos])?.to_string());
            }
        }
    }
    if header.len() < 4 || header[0] != "P5" {
        bail!("{} is not a binary PGM", path.display());
    }
    let width: u32 = header[1].parse().context("PGM width")?;
    let height: u32 = header[2].parse().context("PGM height")?;
    let maxval: u32 = header[3].parse().context("PGM maxval")?;
    if maxval < 256 || maxval > 65535 {
        bail!("{}: expected 16-bit PGM, maxval {maxval}", path.display());
    }
    pos += 1; // single whitespace after maxval

    let count = width as usize * height as usize;
    let payload = &bytes[pos..];
    if payload.len() < count * 2 {
        bail!("{}: truncated sample data", path.display());
    }
    let data = payload[..count * 2]
        .chunks_exact(2)
        .map(|b| u16::from_be_bytes([b[0], b[1]]))
        .collect();
    Ok(RawImage::from_vec(width, height, data)?)
}

/// Writes the rendered preview as a binary (`P6`) PPM, 8 bits per channel.
pub fn write_ppm(path: &Path, img: &RgbImage) -> Result<()> {
    let mut out = Vec::with_capacity(img.data.len() + 32);
    write!(out, "P6\n{} {}\n255\n", img.width, img.height)?;
    for &v in &img.data {
        out.push((v.clamp(0.0, 1.0) * 255.0 + 0.5) as u8);
    }
    fs::write(path, out).with_context(|| format!("writing {}", path.display()))
}
