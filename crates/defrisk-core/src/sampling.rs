//! Point sampling over a composed yearly image.
//!
//! Stratified draws use seed `seed + year`; unbiased forest draws use
//! `seed + 999`, so the two never share a random stream. Pixels with any
//! masked band are never sampled.

use rand::rngs::StdRng;
use rand::seq::index;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::composite::{forest_mask_for_year, sampling_image_for_year};
use crate::frontier::FrontierParams;
use crate::image::Image;
use crate::labels::{LabelPolicy, LABEL_BAND};
use crate::raster::Raster;
use crate::region::Region;
use crate::source::{ImagerySource, SourceError};
use crate::table::{SampleRecord, SampleTable, T_YEAR, UNBIASED};

/// Seed offset of the unbiased draw.
pub const UNBIASED_SEED_OFFSET: i64 = 999;

/// Shared sampling settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplingConfig {
    /// Sampling scale in metres; sets the lattice stride over the image grid.
    pub scale: f64,
    pub seed: i64,
    pub policy: LabelPolicy,
    pub frontier: FrontierParams,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            scale: 500.0,
            seed: 42,
            policy: LabelPolicy::Basic,
            frontier: FrontierParams::default(),
        }
    }
}

/// Lattice stride (pixels) for sampling `grid` at `scale` metres.
pub fn lattice_stride(grid: &Raster, scale: f64) -> usize {
    let stride = (scale / grid.cellsize_m()).round();
    if stride.is_finite() && stride >= 1.0 { stride as usize } else { 1 }
}

/// Lattice pixels where every band is defined and `keep` accepts the pixel.
fn candidates(img: &Image, stride: usize, keep: impl Fn(usize, usize) -> bool) -> Vec<(usize, usize)> {
    let Some(grid) = img.grid() else {
        return Vec::new();
    };
    let mut out = Vec::new();
    for r in (0..grid.height).step_by(stride) {
        for c in (0..grid.width).step_by(stride) {
            if img.is_pixel_valid(r, c) && keep(r, c) {
                out.push((r, c));
            }
        }
    }
    out
}

/// Uniformly choose up to `n` of `pool` without replacement, kept in raster order.
fn choose(pool: &[(usize, usize)], n: usize, rng: &mut StdRng) -> Vec<(usize, usize)> {
    let amount = n.min(pool.len());
    let mut picked: Vec<usize> = index::sample(rng, pool.len(), amount).into_vec();
    picked.sort_unstable();
    picked.into_iter().map(|i| pool[i]).collect()
}

fn record_at(img: &Image, row: usize, col: usize) -> SampleRecord {
    let grid = &img.bands[0].raster;
    let (lon, lat) = grid.pixel_center(row, col);
    let mut rec = SampleRecord::new(lon, lat);
    for band in &img.bands {
        rec.set(band.name.clone(), f64::from(band.raster.get(row, col)));
    }
    rec
}

/// Class-balanced draw: `class_points[i].1` pixels whose `class_band` equals
/// `class_points[i].0`, classes drawn in the order given from one stream.
pub fn stratified_sample(
    img: &Image,
    class_band: &str,
    class_points: &[(f32, usize)],
    stride: usize,
    seed: u64,
) -> SampleTable {
    let Some(classes) = img.band(class_band) else {
        return SampleTable::default();
    };
    let mut rng = StdRng::seed_from_u64(seed);
    let mut records = Vec::new();
    for &(class, n) in class_points {
        let pool = candidates(img, stride, |r, c| classes.get(r, c) == class);
        if pool.len() < n {
            warn!(class, requested = n, available = pool.len(), "class has fewer pixels than requested");
        }
        records.extend(choose(&pool, n, &mut rng).into_iter().map(|(r, c)| record_at(img, r, c)));
    }
    SampleTable::new(records)
}

/// Unbalanced draw of up to `n_pixels` valid pixels.
pub fn random_sample(img: &Image, n_pixels: usize, stride: usize, seed: u64) -> SampleTable {
    let mut rng = StdRng::seed_from_u64(seed);
    let pool = candidates(img, stride, |_, _| true);
    let records = choose(&pool, n_pixels, &mut rng)
        .into_iter()
        .map(|(r, c)| record_at(img, r, c))
        .collect();
    SampleTable::new(records)
}

/// `n_neg` negatives and `n_pos` positives for `t_year`, tagged with `tYear`.
pub fn stratified_samples_for_year<S: ImagerySource + ?Sized>(
    source: &S,
    t_year: i32,
    region: &Region,
    n_neg: usize,
    n_pos: usize,
    cfg: &SamplingConfig,
) -> Result<SampleTable, SourceError> {
    let img = sampling_image_for_year(source, t_year, region, cfg.policy, &cfg.frontier)?;
    let stride = img.grid().map_or(1, |g| lattice_stride(g, cfg.scale));
    let seed = cfg.seed.wrapping_add(i64::from(t_year)) as u64;

    let table = stratified_sample(&img, LABEL_BAND, &[(0.0, n_neg), (1.0, n_pos)], stride, seed)
        .with_property(T_YEAR, f64::from(t_year));
    info!(
        t_year,
        stride,
        negatives = table.count_where(LABEL_BAND, 0.0),
        positives = table.count_where(LABEL_BAND, 1.0),
        "stratified sample drawn"
    );
    Ok(table)
}

/// Up to `n_pixels` forest pixels for `t_year` regardless of label, tagged
/// with `tYear` and `unbiased = 1`.
pub fn unbiased_forest_samples<S: ImagerySource + ?Sized>(
    source: &S,
    t_year: i32,
    region: &Region,
    n_pixels: usize,
    cfg: &SamplingConfig,
) -> Result<SampleTable, SourceError> {
    let img = sampling_image_for_year(source, t_year, region, cfg.policy, &cfg.frontier)?;
    let Some(grid) = img.grid().cloned() else {
        return Err(SourceError::EmptyEmbedding(t_year));
    };
    let forest = forest_mask_for_year(source, t_year, region)?.resample_nearest(&grid);
    let img_forest = img.update_mask(&forest);

    let stride = lattice_stride(&grid, cfg.scale);
    let seed = cfg.seed.wrapping_add(UNBIASED_SEED_OFFSET) as u64;
    let table = random_sample(&img_forest, n_pixels, stride, seed)
        .with_property(T_YEAR, f64::from(t_year))
        .with_property(UNBIASED, 1.0);
    info!(t_year, stride, drawn = table.len(), "unbiased forest sample drawn");
    Ok(table)
}
