//! # HAND Visualisation
//!
//! Discretises a height-above-nearest-drainage ("distance down") raster into
//! quantile bins and renders it as a PNG with a colour legend.

use crate::error::{FlowError, Result};
use crate::numeric::round_half_even;
use crate::render::{self, Color, WHITE};
use log::{debug, info};
use ndarray::Array2;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tiff::decoder::{Decoder, DecodingResult};
use tiff::tags::Tag;

/// GDAL stores the nodata value as ASCII text in this private tag.
const GDAL_NODATA_TAG: u16 = 42113;

#[derive(Debug, Clone)]
pub struct Raster {
    pub values: Array2<f64>,
    pub nodata: Option<f64>,
}

impl Raster {
    /// Cells that take part in the binning: not nodata, not zero, not NaN.
    pub fn valid_values(&self) -> Vec<f64> {
        self.values
            .iter()
            .copied()
            .filter(|v| self.is_valid(*v))
            .collect()
    }

    pub fn is_valid(&self, v: f64) -> bool {
        v != 0.0 && !self.is_nodata(v)
    }

    /// NaN or the declared nodata value. Zero cells are data (the drainage
    /// network) even though they stay out of the binning.
    pub fn is_nodata(&self, v: f64) -> bool {
        v.is_nan() || self.nodata.is_some_and(|nd| v == nd)
    }
}

fn to_f64(result: DecodingResult) -> Result<Vec<f64>> {
    let values = match result {
        DecodingResult::U8(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::U16(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::U32(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::U64(v) => v.into_iter().map(|x| x as f64).collect(),
        DecodingResult::I8(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::I16(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::I32(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::I64(v) => v.into_iter().map(|x| x as f64).collect(),
        DecodingResult::F32(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::F64(v) => v,
        #[allow(unreachable_patterns)]
        _ => return Err(FlowError::invalid("unsupported raster sample format")),
    };
    Ok(values)
}

/// Reads the first band of a single-band GeoTIFF.
pub fn read_raster<P: AsRef<Path>>(path: P) -> Result<Raster> {
    let mut decoder = Decoder::new(BufReader::new(File::open(path.as_ref())?))?;
    let (width, height) = decoder.dimensions()?;
    let nodata = decoder
        .get_tag_ascii_string(Tag::Unknown(GDAL_NODATA_TAG))
        .ok()
        .and_then(|s| s.trim_matches(char::from(0)).trim().parse::<f64>().ok());
    let values = to_f64(decoder.read_image()?)?;
    let cells = width as usize * height as usize;
    if values.len() < cells {
        return Err(FlowError::ShapeMismatch(format!(
            "raster declares {}x{} cells but holds {} values",
            width,
            height,
            values.len()
        )));
    }
    let values = Array2::from_shape_vec((height as usize, width as usize), values[..cells].to_vec())?;
    debug!("Read {}x{} raster, nodata {:?}", width, height, nodata);
    Ok(Raster { values, nodata })
}

/// Bin edges: the minimum, then the value at each `i/bins` quantile rank.
pub fn quantile_edges(sorted: &[f64], bins: usize) -> Result<Vec<f64>> {
    if bins == 0 {
        return Err(FlowError::invalid("number of bins must be positive"));
    }
    if sorted.is_empty() {
        return Err(FlowError::invalid("raster has no valid cells"));
    }
    let n = sorted.len() as f64;
    let mut edges = vec![sorted[0]];
    for i in 1..=bins {
        let rank = round_half_even(n / bins as f64 * i as f64) as usize;
        edges.push(sorted[rank.clamp(1, sorted.len()) - 1]);
    }
    Ok(edges)
}

/// Mean of each bin; the first bin includes its lower edge, later ones do not.
pub fn bin_means(sorted: &[f64], edges: &[f64]) -> Vec<f64> {
    (0..edges.len().saturating_sub(1))
        .map(|i| {
            let (lo, hi) = (edges[i], edges[i + 1]);
            let members: Vec<f64> = sorted
                .iter()
                .copied()
                .filter(|v| (*v > lo || (i == 0 && *v == lo)) && *v <= hi)
                .collect();
            if members.is_empty() {
                f64::NAN
            } else {
                members.iter().sum::<f64>() / members.len() as f64
            }
        })
        .collect()
}

/// Index `i` with `edges[i-1] < x <= edges[i]`.
pub fn digitize(x: f64, edges: &[f64]) -> usize {
    edges.partition_point(|e| *e < x)
}

/// Colour-map position of each bin: the end bins sit at 0 and 1, the inner
/// ones where their mean falls between the first and last bin means.
pub fn bin_positions(means: &[f64]) -> Vec<f64> {
    let bins = means.len();
    if bins <= 1 {
        return vec![0.0; bins];
    }
    let (first, last) = (means[0], means[bins - 1]);
    (0..bins)
        .map(|i| {
            if i == 0 {
                0.0
            } else if i == bins - 1 {
                1.0
            } else if last > first {
                ((means[i] - first) / (last - first)).clamp(0.0, 1.0)
            } else {
                i as f64 / (bins - 1) as f64
            }
        })
        .collect()
}

/// `hand-vis`
pub fn hand_vis<P: AsRef<Path>>(raster: P, cmap: &str, bins: usize, output: P) -> Result<()> {
    let gradient = render::gradient_by_name(cmap)?;
    let raster = read_raster(raster)?;
    let mut sorted = raster.valid_values();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let edges = quantile_edges(&sorted, bins)?;
    let means = bin_means(&sorted, &edges);
    let labels: Vec<String> = edges.iter().map(|e| format!("{:.2} m", e)).collect();
    info!("Bin edges: {}", labels.join(", "));
    debug!("Bin means: {:?}", means);

    let palette: Vec<Color> = bin_positions(&means)
        .iter()
        .map(|t| render::gradient_color(&gradient, *t))
        .collect();
    let classes = raster.values.mapv(|v| {
        if raster.is_nodata(v) {
            f64::NAN
        } else {
            digitize(v, &edges).saturating_sub(1).min(bins - 1) as f64
        }
    });

    let img = render::render_classes(classes.view(), &palette, WHITE, 1, false);
    let strip = (img.height() / 20).max(8);
    render::save_png(&render::with_legend(&img, &palette, strip), output.as_ref())?;
    info!("Wrote {}", output.as_ref().display());
    Ok(())
}
