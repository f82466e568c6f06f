//! Frontier features: distance to the nearest non-forest pixel and distance
//! to the nearest road, both in metres.

#[cfg(feature = "threading")]
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::landcover::{is_forest_igbp, not};
use crate::raster::{Raster, METRES_PER_DEG};
use crate::region::Region;

pub const DIST_NONFOREST_BAND: &str = "dist_to_nonforest_m";
pub const DIST_ROAD_BAND: &str = "dist_to_road_m";

/// Frontier band names in table/weight order.
pub const FRONTIER_BANDS: [&str; 2] = [DIST_NONFOREST_BAND, DIST_ROAD_BAND];

/// Squared-distance stand-in for "no source pixel".
const FAR: f64 = 1e20;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrontierParams {
    /// Pixels farther than this from any road are masked.
    pub road_search_radius_m: f64,
    /// Optional cap on distance-to-nonforest, in km.
    pub nf_max_km: Option<f64>,
    /// Pixels whose nearest non-forest pixel is farther than this many
    /// pixels are masked.
    pub neighborhood_px: u32,
}

impl Default for FrontierParams {
    fn default() -> Self {
        Self {
            road_search_radius_m: 100_000.0,
            nf_max_km: None,
            neighborhood_px: 256,
        }
    }
}

/// A road centreline as `[lon, lat]` vertices.
pub type Polyline = Vec<[f64; 2]>;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoadNetwork {
    pub roads: Vec<Polyline>,
}

impl RoadNetwork {
    /// Roads whose bounding box touches `region`.
    pub fn filter_bounds(&self, region: &Region) -> RoadNetwork {
        let roads = self
            .roads
            .iter()
            .filter(|line| {
                let Some((min_lon, min_lat, max_lon, max_lat)) = bbox(line) else {
                    return false;
                };
                region.intersects(min_lon, min_lat, max_lon, max_lat)
            })
            .cloned()
            .collect();
        RoadNetwork { roads }
    }
}

fn bbox(line: &[[f64; 2]]) -> Option<(f64, f64, f64, f64)> {
    let first = line.first()?;
    let init = (first[0], first[1], first[0], first[1]);
    Some(line.iter().fold(init, |(a, b, c, d), p| {
        (a.min(p[0]), b.min(p[1]), c.max(p[0]), d.max(p[1]))
    }))
}

// ── Distance to non-forest ───────────────────────────────────────────────────

/// One-dimensional squared distance transform (Felzenszwalb & Huttenlocher).
/// `f` holds 0 at sources and `FAR` elsewhere; result written to `d`.
fn edt_1d(f: &[f64], d: &mut [f64]) {
    let n = f.len();
    if n == 0 {
        return;
    }
    let mut v = vec![0usize; n];
    let mut z = vec![0.0f64; n + 1];
    let mut k = 0usize;
    z[0] = f64::NEG_INFINITY;
    z[1] = f64::INFINITY;
    for q in 1..n {
        let qf = q as f64;
        let mut s;
        loop {
            let vk = v[k] as f64;
            s = ((f[q] + qf * qf) - (f[v[k]] + vk * vk)) / (2.0 * qf - 2.0 * vk);
            if s <= z[k] && k > 0 {
                k -= 1;
            } else {
                break;
            }
        }
        k += 1;
        v[k] = q;
        z[k] = s;
        z[k + 1] = f64::INFINITY;
    }
    k = 0;
    for (q, out) in d.iter_mut().enumerate() {
        let qf = q as f64;
        while z[k + 1] < qf {
            k += 1;
        }
        let dv = qf - v[k] as f64;
        *out = dv * dv + f[v[k]];
    }
}

/// Exact squared Euclidean distance (in pixels) from every pixel to the
/// nearest `true` pixel of `sources` (row-major, `width × height`).
pub fn squared_distance_transform(sources: &[bool], width: usize, height: usize) -> Vec<f64> {
    let mut grid: Vec<f64> = sources.iter().map(|&s| if s { 0.0 } else { FAR }).collect();

    let mut col = vec![0.0f64; height];
    let mut col_out = vec![0.0f64; height];
    for c in 0..width {
        for r in 0..height {
            col[r] = grid[r * width + c];
        }
        edt_1d(&col, &mut col_out);
        for r in 0..height {
            grid[r * width + c] = col_out[r];
        }
    }

    let mut row_out = vec![0.0f64; width];
    for r in 0..height {
        let row = &grid[r * width..(r + 1) * width];
        edt_1d(row, &mut row_out);
        grid[r * width..(r + 1) * width].copy_from_slice(&row_out);
    }
    grid
}

/// Distance in metres from each forest pixel to the nearest non-forest pixel.
///
/// Sources are valid non-forest pixels of `lc`. Output is masked outside
/// forest, where the classification is masked, and where the nearest source
/// is farther than `neighborhood_px`. Pixel size is the nominal scale of `lc`.
pub fn distance_to_nonforest(lc: &Raster, neighborhood_px: u32, nf_max_m: Option<f64>) -> Raster {
    let forest = is_forest_igbp(lc);
    let sources: Vec<bool> = not(&forest).data.iter().map(|&v| v == 1.0).collect();
    let sq = squared_distance_transform(&sources, lc.width, lc.height);

    let pix_m = lc.cellsize_m();
    let max_sq = f64::from(neighborhood_px).powi(2);
    let mut out = lc.filled_like(f32::NAN);
    for (i, v) in out.data.iter_mut().enumerate() {
        if forest.data[i] != 1.0 || sq[i] > max_sq {
            continue;
        }
        *v = (sq[i].sqrt() * pix_m) as f32;
    }

    match nf_max_m {
        Some(max_m) => out.clamp(0.0, max_m as f32),
        None => out,
    }
}

// ── Distance to roads ────────────────────────────────────────────────────────

/// Distance (m) from `(px, py)` to segment `a`–`b`, all in a local metric frame.
fn point_segment_distance(px: f64, py: f64, ax: f64, ay: f64, bx: f64, by: f64) -> f64 {
    let (dx, dy) = (bx - ax, by - ay);
    let len_sq = dx * dx + dy * dy;
    let t = if len_sq > 0.0 {
        (((px - ax) * dx + (py - ay) * dy) / len_sq).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let (cx, cy) = (ax + t * dx, ay + t * dy);
    ((px - cx).powi(2) + (py - cy).powi(2)).sqrt()
}

/// Distance in metres from `(lon, lat)` to the nearest road vertex chain,
/// or None when nothing lies within `search_radius_m`.
fn nearest_road_m(lon: f64, lat: f64, roads: &[Polyline], search_radius_m: f64) -> Option<f64> {
    let kx = METRES_PER_DEG * lat.to_radians().cos();
    let ky = METRES_PER_DEG;
    let project = |p: &[f64; 2]| ((p[0] - lon) * kx, (p[1] - lat) * ky);

    let mut best = f64::INFINITY;
    for line in roads {
        match line.as_slice() {
            [] => continue,
            [only] => {
                let (x, y) = project(only);
                best = best.min(x.hypot(y));
            }
            pts => {
                for pair in pts.windows(2) {
                    let (ax, ay) = project(&pair[0]);
                    let (bx, by) = project(&pair[1]);
                    best = best.min(point_segment_distance(0.0, 0.0, ax, ay, bx, by));
                }
            }
        }
    }
    (best <= search_radius_m).then_some(best)
}

/// Distance in metres from each pixel centre of `like` to the nearest road.
/// Pixels beyond `search_radius_m` are masked.
pub fn distance_to_roads(like: &Raster, roads: &RoadNetwork, search_radius_m: f64) -> Raster {
    let row_fn = |r: usize| -> Vec<f32> {
        (0..like.width)
            .map(|c| {
                let (lon, lat) = like.pixel_center(r, c);
                nearest_road_m(lon, lat, &roads.roads, search_radius_m)
                    .map_or(f32::NAN, |d| d as f32)
            })
            .collect()
    };

    #[cfg(feature = "threading")]
    let rows: Vec<Vec<f32>> = (0..like.height).into_par_iter().map(row_fn).collect();
    #[cfg(not(feature = "threading"))]
    let rows: Vec<Vec<f32>> = (0..like.height).map(row_fn).collect();

    let mut out = like.filled_like(f32::NAN);
    out.data = rows.into_iter().flatten().collect();
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// Raster of land-cover codes with ≈500 m pixels at the equator.
    fn lc_grid(width: usize, height: usize, fill: f32) -> Raster {
        let deg = 500.0 / METRES_PER_DEG;
        Raster::new(width, height, 0.0, width as f64 * deg, 0.0, height as f64 * deg, fill)
    }

    #[test]
    fn edt_matches_brute_force() {
        let (w, h) = (7usize, 5usize);
        let mut sources = vec![false; w * h];
        sources[0] = true;
        sources[2 * w + 5] = true;
        sources[4 * w + 1] = true;
        let sq = squared_distance_transform(&sources, w, h);
        for r in 0..h {
            for c in 0..w {
                let brute = sources
                    .iter()
                    .enumerate()
                    .filter(|(_, &s)| s)
                    .map(|(i, _)| {
                        let (sr, sc) = ((i / w) as f64, (i % w) as f64);
                        (sr - r as f64).powi(2) + (sc - c as f64).powi(2)
                    })
                    .fold(f64::INFINITY, f64::min);
                assert_relative_eq!(sq[r * w + c], brute, epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn nonforest_distance_masked_outside_forest() {
        // Column 0 is cropland (12), the rest evergreen broadleaf (2).
        let mut lc = lc_grid(5, 3, 2.0);
        for r in 0..3 {
            lc.set(r, 0, 12.0);
        }
        let d = distance_to_nonforest(&lc, 256, None);
        assert!(d.get(1, 0).is_nan());
        let pix = lc.cellsize_m() as f32;
        assert_relative_eq!(d.get(1, 1), pix, epsilon = 1e-2);
        assert_relative_eq!(d.get(1, 4), 4.0 * pix, epsilon = 1e-2);
    }

    #[test]
    fn nonforest_distance_capped_and_neighbourhood_limited() {
        let mut lc = lc_grid(6, 1, 1.0);
        lc.set(0, 0, 10.0);
        let capped = distance_to_nonforest(&lc, 256, Some(1000.0));
        assert!(capped.data.iter().filter(|v| !v.is_nan()).all(|&v| v <= 1000.0));
        let limited = distance_to_nonforest(&lc, 2, None);
        assert!(!limited.get(0, 2).is_nan());
        assert!(limited.get(0, 3).is_nan());
    }

    #[test]
    fn all_forest_has_no_defined_distance() {
        let lc = lc_grid(4, 4, 3.0);
        assert_eq!(distance_to_nonforest(&lc, 256, None).valid_count(), 0);
    }

    #[test]
    fn road_distance_to_vertical_line() {
        let like = lc_grid(5, 1, 0.0);
        let (lon, _) = like.pixel_center(0, 0);
        let roads = RoadNetwork {
            roads: vec![vec![[lon, -1.0], [lon, 1.0]]],
        };
        let d = distance_to_roads(&like, &roads, 100_000.0);
        assert_relative_eq!(d.get(0, 0), 0.0, epsilon = 1e-3);
        assert_relative_eq!(d.get(0, 2), 1000.0, epsilon = 1.0);
    }

    #[test]
    fn road_distance_masked_beyond_search_radius() {
        let like = lc_grid(5, 1, 0.0);
        let (lon, _) = like.pixel_center(0, 0);
        let roads = RoadNetwork {
            roads: vec![vec![[lon, 0.0], [lon, 0.001]]],
        };
        let d = distance_to_roads(&like, &roads, 800.0);
        assert!(!d.get(0, 1).is_nan());
        assert!(d.get(0, 2).is_nan());
    }

    #[test]
    fn filter_bounds_drops_distant_roads() {
        let region = Region::new(0.0, 0.0, 1.0, 1.0).unwrap();
        let net = RoadNetwork {
            roads: vec![
                vec![[0.5, 0.5], [2.0, 2.0]],
                vec![[5.0, 5.0], [6.0, 6.0]],
                vec![],
            ],
        };
        assert_eq!(net.filter_bounds(&region).roads.len(), 1);
    }
}
