//! # Raster Rendering
//!
//! Turns classified grids into PNG images and stitches frames into an
//! animated GIF. Cartographic decoration (coastlines, borders) is not drawn;
//! each grid cell becomes a square block of pixels.

use crate::error::{FlowError, Result};
use image::codecs::gif::{GifEncoder, Repeat};
use image::{Delay, Frame, Rgb, RgbImage};
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info};
use ndarray::ArrayView2;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

pub type Color = [u8; 3];

pub const WHITE: Color = [255, 255, 255];
pub const GRAY: Color = [160, 160, 160];
pub const BLACK: Color = [0, 0, 0];

/// Parses `#RRGGBB` or a small set of named colours.
pub fn parse_color(spec: &str) -> Result<Color> {
    match spec.to_lowercase().as_str() {
        "white" => return Ok(WHITE),
        "black" => return Ok(BLACK),
        "gray" | "grey" => return Ok(GRAY),
        "orange" => return Ok([255, 165, 0]),
        _ => {}
    }
    let hex = spec
        .strip_prefix('#')
        .filter(|h| h.len() == 6 && h.is_ascii())
        .ok_or_else(|| FlowError::invalid(format!("unknown colour '{}'", spec)))?;
    let channel = |i: usize| {
        u8::from_str_radix(&hex[i..i + 2], 16)
            .map_err(|_| FlowError::invalid(format!("unknown colour '{}'", spec)))
    };
    Ok([channel(0)?, channel(2)?, channel(4)?])
}

/// Looks up a colour map by its usual lowercase name.
pub fn gradient_by_name(name: &str) -> Result<colorous::Gradient> {
    let gradient = match name.to_lowercase().as_str() {
        "viridis" => colorous::VIRIDIS,
        "plasma" => colorous::PLASMA,
        "inferno" => colorous::INFERNO,
        "magma" => colorous::MAGMA,
        "cividis" => colorous::CIVIDIS,
        "turbo" => colorous::TURBO,
        "warm" => colorous::WARM,
        "cool" => colorous::COOL,
        "cubehelix" => colorous::CUBEHELIX,
        "blues" => colorous::BLUES,
        "greens" => colorous::GREENS,
        "greys" => colorous::GREYS,
        "oranges" => colorous::ORANGES,
        "purples" => colorous::PURPLES,
        "reds" => colorous::REDS,
        "spectral" => colorous::SPECTRAL,
        "rdylbu" => colorous::RED_YELLOW_BLUE,
        "rdylgn" => colorous::RED_YELLOW_GREEN,
        "rdbu" => colorous::RED_BLUE,
        "ylgnbu" => colorous::YELLOW_GREEN_BLUE,
        "ylorrd" => colorous::YELLOW_ORANGE_RED,
        "bugn" => colorous::BLUE_GREEN,
        "gnbu" => colorous::GREEN_BLUE,
        _ => {
            return Err(FlowError::invalid(format!("unknown colour map '{}'", name)));
        }
    };
    Ok(gradient)
}

pub fn gradient_color(gradient: &colorous::Gradient, t: f64) -> Color {
    let c = gradient.eval_continuous(t.clamp(0.0, 1.0));
    [c.r, c.g, c.b]
}

/// Paints one block per cell, looking the class colour up by index.
///
/// Rows are drawn north-up: pass `flip_rows` when the first row of `classes`
/// is the southernmost one. NaN cells and classes outside the palette are
/// painted `missing`.
pub fn render_classes(
    classes: ArrayView2<f64>,
    palette: &[Color],
    missing: Color,
    cell_size: u32,
    flip_rows: bool,
) -> RgbImage {
    let (rows, cols) = classes.dim();
    let cell = cell_size.max(1);
    let mut img = RgbImage::from_pixel(cols as u32 * cell, rows as u32 * cell, Rgb(missing));
    for ((r, c), value) in classes.indexed_iter() {
        let color = if value.is_nan() || *value < 0.0 {
            missing
        } else {
            palette.get(*value as usize).copied().unwrap_or(missing)
        };
        let row = if flip_rows { rows - 1 - r } else { r };
        for dy in 0..cell {
            for dx in 0..cell {
                img.put_pixel(c as u32 * cell + dx, row as u32 * cell + dy, Rgb(color));
            }
        }
    }
    img
}

/// Appends a horizontal legend strip with one swatch per palette entry.
pub fn with_legend(img: &RgbImage, palette: &[Color], strip_height: u32) -> RgbImage {
    let width = img.width().max(palette.len() as u32);
    let height = img.height() + strip_height;
    let mut out = RgbImage::from_pixel(width, height, Rgb(WHITE));
    for (x, y, p) in img.enumerate_pixels() {
        out.put_pixel(x, y, *p);
    }
    if palette.is_empty() {
        return out;
    }
    let swatch = width / palette.len() as u32;
    for (i, color) in palette.iter().enumerate() {
        let start = i as u32 * swatch;
        let end = if i + 1 == palette.len() { width } else { start + swatch };
        for x in start..end {
            for y in img.height()..height {
                out.put_pixel(x, y, Rgb(*color));
            }
        }
    }
    out
}

pub fn save_png<P: AsRef<Path>>(img: &RgbImage, path: P) -> Result<()> {
    img.save(path.as_ref())?;
    debug!("Wrote image {}", path.as_ref().display());
    Ok(())
}

/// Encodes the given image files into a looping GIF at `fps` frames per second.
pub fn write_gif<P: AsRef<Path>>(frames: &[PathBuf], output: P, fps: u32) -> Result<()> {
    if frames.is_empty() {
        return Err(FlowError::invalid("no frames to animate"));
    }
    let delay_ms = 1000 / fps.max(1);
    let writer = BufWriter::new(File::create(output.as_ref())?);
    let mut encoder = GifEncoder::new(writer);
    encoder.set_repeat(Repeat::Infinite)?;

    let progress = ProgressBar::new(frames.len() as u64);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("{msg} [{bar:40}] {pos}/{len}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    progress.set_message("Encoding animation");
    for path in frames {
        let rgba = image::open(path)?.to_rgba8();
        let frame = Frame::from_parts(rgba, 0, 0, Delay::from_numer_denom_ms(delay_ms, 1));
        encoder.encode_frame(frame)?;
        progress.inc(1);
    }
    progress.finish_and_clear();
    info!(
        "Wrote {} frame animation to {}",
        frames.len(),
        output.as_ref().display()
    );
    Ok(())
}
