//! Synthetic advancing-frontier scene shared by unit tests.

use crate::frontier::RoadNetwork;
use crate::image::Image;
use crate::raster::{Raster, METRES_PER_DEG};
use crate::region::Region;
use crate::source::MemoryCatalog;

pub const SCENE_YEARS: [i32; 6] = [2018, 2019, 2020, 2021, 2022, 2023];

const ORIGIN_LON: f64 = -62.5;
const ORIGIN_LAT: f64 = -9.5;

/// Scene with three embedding bands.
pub fn frontier_scene(width: usize, height: usize) -> (MemoryCatalog, Region) {
    frontier_scene_with_bands(width, height, 3)
}

/// Cropland (IGBP 12) occupies columns `c < 2 + (year - 2018)`, evergreen
/// broadleaf forest (IGBP 2) the rest, so the frontier advances one column
/// east per year. Pixels are ≈500 m. A road runs along the east edge.
pub fn frontier_scene_with_bands(width: usize, height: usize, n_bands: usize) -> (MemoryCatalog, Region) {
    let deg = 500.0 / METRES_PER_DEG;
    let (max_lon, max_lat) = (ORIGIN_LON + width as f64 * deg, ORIGIN_LAT + height as f64 * deg);
    let blank = Raster::new(width, height, ORIGIN_LON, max_lon, ORIGIN_LAT, max_lat, 0.0);
    let region = Region::new(ORIGIN_LON, ORIGIN_LAT, max_lon, max_lat).expect("non-empty scene");

    let mut cat = MemoryCatalog::default();
    for &year in &SCENE_YEARS {
        let cleared = 2 + (year - SCENE_YEARS[0]) as usize;
        let mut lc = blank.clone();
        let mut img = Image::new();
        for r in 0..height {
            for c in 0..width {
                lc.set(r, c, if c < cleared { 12.0 } else { 2.0 });
            }
        }
        for k in 0..n_bands {
            let mut band = blank.clone();
            for r in 0..height {
                for c in 0..width {
                    band.set(r, c, c as f32 * 0.1 + r as f32 * 0.01 * k as f32 + k as f32);
                }
            }
            img = img.add_band(format!("A{k:02}"), band).expect("same grid");
        }
        cat.landcover.insert(year, lc);
        cat.embedding.insert(year, img);
    }
    cat.roads = RoadNetwork {
        roads: vec![vec![[max_lon, ORIGIN_LAT], [max_lon, max_lat]]],
    };
    (cat, region)
}
