//! MODIS IGBP land-cover helpers.

use crate::raster::Raster;

/// Strict IGBP forest: evergreen/deciduous needleleaf and broadleaf, mixed forest.
pub const FOREST_CLASSES: [u8; 5] = [1, 2, 3, 4, 5];

#[inline]
pub fn is_forest_class(code: f32) -> bool {
    FOREST_CLASSES.iter().any(|&c| code == f32::from(c))
}

/// 1 where the class is forest, 0 otherwise, masked where `lc` is masked.
pub fn is_forest_igbp(lc: &Raster) -> Raster {
    lc.map_valid(|v| if is_forest_class(v) { 1.0 } else { 0.0 })
}

/// Logical NOT of a 0/1 raster; masked pixels stay masked.
pub fn not(mask: &Raster) -> Raster {
    mask.map_valid(|v| if v == 0.0 { 1.0 } else { 0.0 })
}
