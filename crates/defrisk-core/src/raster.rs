use serde::{Deserialize, Serialize};

use crate::region::Region;

/// Metres per degree of arc, used for nominal pixel sizes and local distances.
pub const METRES_PER_DEG: f64 = 111_320.0;

/// Tolerance for comparing grid bounds.
const BOUNDS_EPS: f64 = 1e-9;

fn null_as_nan_vec<'de, D: serde::Deserializer<'de>>(
    d: D,
) -> std::result::Result<Vec<f32>, D::Error> {
    let v: Vec<Option<f32>> = Vec::deserialize(d)?;
    Ok(v.into_iter().map(|x| x.unwrap_or(f32::NAN)).collect())
}

/// A single-band georeferenced raster stored as f32, row-major.
/// Row 0 is the southernmost row. Masked pixels are NaN (`null` in JSON).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Raster {
    #[serde(deserialize_with = "null_as_nan_vec")]
    pub data: Vec<f32>,
    pub width: usize,
    pub height: usize,
    pub min_lon: f64,
    pub max_lon: f64,
    pub min_lat: f64,
    pub max_lat: f64,
}

impl Raster {
    /// Create a new Raster filled with the given value.
    pub fn new(width: usize, height: usize, min_lon: f64, max_lon: f64, min_lat: f64, max_lat: f64, fill: f32) -> Self {
        Self {
            data: vec![fill; width * height],
            width,
            height,
            min_lon,
            max_lon,
            min_lat,
            max_lat,
        }
    }

    /// A raster on the same grid as `self`, filled with `fill`.
    pub fn filled_like(&self, fill: f32) -> Self {
        Self::new(self.width, self.height, self.min_lon, self.max_lon, self.min_lat, self.max_lat, fill)
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f32 {
        self.data[row * self.width + col]
    }

    #[inline]
    pub fn set(&mut self, row: usize, col: usize, val: f32) {
        self.data[row * self.width + col] = val;
    }

    #[inline]
    pub fn is_valid(&self, row: usize, col: usize) -> bool {
        !self.get(row, col).is_nan()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn valid_count(&self) -> usize {
        self.data.iter().filter(|v| !v.is_nan()).count()
    }

    /// True when both rasters share dimensions and bounds.
    pub fn same_grid(&self, other: &Raster) -> bool {
        self.width == other.width
            && self.height == other.height
            && (self.min_lon - other.min_lon).abs() < BOUNDS_EPS
            && (self.max_lon - other.max_lon).abs() < BOUNDS_EPS
            && (self.min_lat - other.min_lat).abs() < BOUNDS_EPS
            && (self.max_lat - other.max_lat).abs() < BOUNDS_EPS
    }

    /// Pixel size in degrees as `(d_lon, d_lat)`.
    pub fn pixel_deg(&self) -> (f64, f64) {
        let dx = if self.width > 0 { (self.max_lon - self.min_lon) / self.width as f64 } else { 0.0 };
        let dy = if self.height > 0 { (self.max_lat - self.min_lat) / self.height as f64 } else { 0.0 };
        (dx, dy)
    }

    /// Geographic (lon, lat) of the centre of pixel `(row, col)`.
    pub fn pixel_center(&self, row: usize, col: usize) -> (f64, f64) {
        let (dx, dy) = self.pixel_deg();
        (
            self.min_lon + (col as f64 + 0.5) * dx,
            self.min_lat + (row as f64 + 0.5) * dy,
        )
    }

    /// The pixel containing (lon, lat), or None outside the raster.
    /// The east and north edges belong to the last column and row.
    pub fn locate(&self, lon: f64, lat: f64) -> Option<(usize, usize)> {
        if self.width == 0 || self.height == 0 {
            return None;
        }
        if lon < self.min_lon || lon > self.max_lon || lat < self.min_lat || lat > self.max_lat {
            return None;
        }
        let (dx, dy) = self.pixel_deg();
        let col = (((lon - self.min_lon) / dx).floor() as usize).min(self.width - 1);
        let row = (((lat - self.min_lat) / dy).floor() as usize).min(self.height - 1);
        Some((row, col))
    }

    /// Nominal isotropic pixel size in metres derived from the bounds.
    /// Falls back to 500 m when bounds are degenerate.
    pub fn cellsize_m(&self) -> f64 {
        let (dx, dy) = self.pixel_deg();
        let mid_lat = (self.min_lat + self.max_lat) / 2.0;
        let cy = dy.abs() * METRES_PER_DEG;
        let cx = dx.abs() * METRES_PER_DEG * mid_lat.to_radians().cos();
        let avg = (cy + cx) / 2.0;
        if avg < 1e-3 { 500.0 } else { avg }
    }

    /// Apply `f` to every valid pixel; masked pixels stay masked.
    pub fn map_valid(&self, f: impl Fn(f32) -> f32) -> Raster {
        let mut out = self.clone();
        for v in out.data.iter_mut() {
            if !v.is_nan() {
                *v = f(*v);
            }
        }
        out
    }

    /// Mask every pixel where `mask` is masked or zero. Grids must match.
    pub fn update_mask(&self, mask: &Raster) -> Raster {
        debug_assert!(self.same_grid(mask));
        let mut out = self.clone();
        for (v, &m) in out.data.iter_mut().zip(mask.data.iter()) {
            if m.is_nan() || m == 0.0 {
                *v = f32::NAN;
            }
        }
        out
    }

    /// Clamp valid values into `[lo, hi]`.
    pub fn clamp(&self, lo: f32, hi: f32) -> Raster {
        self.map_valid(|v| v.clamp(lo, hi))
    }

    /// Mask every pixel whose centre lies outside `region`.
    pub fn clip(&self, region: &Region) -> Raster {
        let mut out = self.clone();
        for r in 0..self.height {
            for c in 0..self.width {
                let (lon, lat) = self.pixel_center(r, c);
                if !region.contains(lon, lat) {
                    out.set(r, c, f32::NAN);
                }
            }
        }
        out
    }

    /// Nearest-neighbour resample onto the grid of `like`.
    /// Target pixels falling outside `self` are masked.
    pub fn resample_nearest(&self, like: &Raster) -> Raster {
        if self.same_grid(like) {
            return self.clone();
        }
        let mut out = like.filled_like(f32::NAN);
        for r in 0..like.height {
            for c in 0..like.width {
                let (lon, lat) = like.pixel_center(r, c);
                if let Some((sr, sc)) = self.locate(lon, lat) {
                    out.set(r, c, self.get(sr, sc));
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(width: usize, height: usize) -> Raster {
        Raster::new(width, height, 0.0, width as f64, 0.0, height as f64, 0.0)
    }

    #[test]
    fn pixel_center_and_locate_agree() {
        let r = grid(4, 3);
        for row in 0..3 {
            for col in 0..4 {
                let (lon, lat) = r.pixel_center(row, col);
                assert_eq!(r.locate(lon, lat), Some((row, col)));
            }
        }
        assert_eq!(r.locate(4.0, 3.0), Some((2, 3)));
        assert!(r.locate(-0.1, 1.0).is_none());
    }

    #[test]
    fn update_mask_masks_zero_and_nan() {
        let mut value = grid(3, 1);
        value.data = vec![1.0, 2.0, 3.0];
        let mut mask = grid(3, 1);
        mask.data = vec![1.0, 0.0, f32::NAN];
        let out = value.update_mask(&mask);
        assert_eq!(out.get(0, 0), 1.0);
        assert!(out.get(0, 1).is_nan());
        assert!(out.get(0, 2).is_nan());
    }

    #[test]
    fn resample_nearest_upsamples_blocks() {
        let mut coarse = grid(2, 2);
        coarse.data = vec![1.0, 2.0, 3.0, 4.0];
        let fine = Raster::new(4, 4, 0.0, 2.0, 0.0, 2.0, 0.0);
        let out = coarse.resample_nearest(&fine);
        assert_eq!(out.get(0, 0), 1.0);
        assert_eq!(out.get(1, 1), 1.0);
        assert_eq!(out.get(0, 3), 2.0);
        assert_eq!(out.get(3, 0), 3.0);
        assert_eq!(out.get(3, 3), 4.0);
    }

    #[test]
    fn clip_masks_outside_region() {
        let r = grid(4, 1);
        let region = Region::new(0.0, 0.0, 2.0, 1.0).unwrap();
        let out = r.clip(&region);
        assert_eq!(out.valid_count(), 2);
        assert!(out.is_valid(0, 1));
        assert!(!out.is_valid(0, 2));
    }

    #[test]
    fn json_null_roundtrips_as_nan() {
        let mut r = grid(2, 1);
        r.data = vec![5.0, f32::NAN];
        let json = serde_json::to_string(&r).unwrap();
        assert!(json.contains("null"));
        let back: Raster = serde_json::from_str(&json).unwrap();
        assert_eq!(back.get(0, 0), 5.0);
        assert!(back.get(0, 1).is_nan());
    }

    #[test]
    fn cellsize_at_equator() {
        let pixel_deg = 500.0 / METRES_PER_DEG;
        let r = Raster::new(10, 10, 0.0, 10.0 * pixel_deg, -5.0 * pixel_deg, 5.0 * pixel_deg, 0.0);
        assert!((r.cellsize_m() - 500.0).abs() < 0.1, "cellsize={}", r.cellsize_m());
    }
}
