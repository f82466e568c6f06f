//! Multi-band image: named rasters sharing one grid.
//!
//! Band order is significant. It is the column order of sample tables and the
//! positional order of model weights.

use serde::{Deserialize, Serialize};

use crate::raster::Raster;
use crate::region::Region;

#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("band {name:?} is not on the image grid ({width}x{height})")]
    GridMismatch { name: String, width: usize, height: usize },
    #[error("duplicate band name {0:?}")]
    DuplicateBand(String),
    #[error("band {0:?} not found; available: {1:?}")]
    MissingBand(String, Vec<String>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Band {
    pub name: String,
    pub raster: Raster,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Image {
    pub bands: Vec<Band>,
}

impl Image {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_band(name: impl Into<String>, raster: Raster) -> Self {
        Self {
            bands: vec![Band { name: name.into(), raster }],
        }
    }

    pub fn band_names(&self) -> Vec<String> {
        self.bands.iter().map(|b| b.name.clone()).collect()
    }

    pub fn band(&self, name: &str) -> Option<&Raster> {
        self.bands.iter().find(|b| b.name == name).map(|b| &b.raster)
    }

    /// Reference raster for the image grid (the first band).
    pub fn grid(&self) -> Option<&Raster> {
        self.bands.first().map(|b| &b.raster)
    }

    /// Append a band. It must share the grid of the bands already present.
    pub fn add_band(mut self, name: impl Into<String>, raster: Raster) -> Result<Self, ImageError> {
        let name = name.into();
        if self.band(&name).is_some() {
            return Err(ImageError::DuplicateBand(name));
        }
        if let Some(grid) = self.grid() {
            if !grid.same_grid(&raster) {
                return Err(ImageError::GridMismatch {
                    name,
                    width: grid.width,
                    height: grid.height,
                });
            }
        }
        self.bands.push(Band { name, raster });
        Ok(self)
    }

    /// Append every band of `other`, in order.
    pub fn add_bands(self, other: Image) -> Result<Self, ImageError> {
        other
            .bands
            .into_iter()
            .try_fold(self, |img, band| img.add_band(band.name, band.raster))
    }

    /// New image with only `names`, in the given order.
    pub fn select<S: AsRef<str>>(&self, names: &[S]) -> Result<Image, ImageError> {
        let mut out = Image::new();
        for name in names {
            let name = name.as_ref();
            let raster = self
                .band(name)
                .ok_or_else(|| ImageError::MissingBand(name.to_string(), self.band_names()))?;
            out = out.add_band(name, raster.clone())?;
        }
        Ok(out)
    }

    /// Validate that every band shares the first band's grid and has a full buffer.
    pub fn check_grid(&self) -> Result<(), ImageError> {
        let Some(grid) = self.grid() else {
            return Ok(());
        };
        for band in &self.bands {
            if !grid.same_grid(&band.raster) || band.raster.len() != grid.width * grid.height {
                return Err(ImageError::GridMismatch {
                    name: band.name.clone(),
                    width: grid.width,
                    height: grid.height,
                });
            }
        }
        Ok(())
    }

    /// Mask every band where `mask` is masked or zero.
    pub fn update_mask(&self, mask: &Raster) -> Image {
        Image {
            bands: self
                .bands
                .iter()
                .map(|b| Band {
                    name: b.name.clone(),
                    raster: b.raster.update_mask(mask),
                })
                .collect(),
        }
    }

    /// Nearest-neighbour resample of every band onto the grid of `like`.
    pub fn resample_nearest(&self, like: &Raster) -> Image {
        Image {
            bands: self
                .bands
                .iter()
                .map(|b| Band {
                    name: b.name.clone(),
                    raster: b.raster.resample_nearest(like),
                })
                .collect(),
        }
    }

    pub fn clip(&self, region: &Region) -> Image {
        Image {
            bands: self
                .bands
                .iter()
                .map(|b| Band {
                    name: b.name.clone(),
                    raster: b.raster.clip(region),
                })
                .collect(),
        }
    }

    /// True when every band is defined at `(row, col)`.
    pub fn is_pixel_valid(&self, row: usize, col: usize) -> bool {
        self.bands.iter().all(|b| b.raster.is_valid(row, col))
    }

    /// Band values at `(row, col)`, in band order.
    pub fn pixel_values(&self, row: usize, col: usize) -> Vec<f32> {
        self.bands.iter().map(|b| b.raster.get(row, col)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raster(values: &[f32]) -> Raster {
        let mut r = Raster::new(values.len(), 1, 0.0, values.len() as f64, 0.0, 1.0, 0.0);
        r.data = values.to_vec();
        r
    }

    #[test]
    fn add_bands_keeps_order() {
        let a = Image::from_band("a", raster(&[1.0, 2.0]));
        let b = Image::from_band("b", raster(&[3.0, 4.0]))
            .add_band("c", raster(&[5.0, 6.0]))
            .unwrap();
        let img = a.add_bands(b).unwrap();
        assert_eq!(img.band_names(), vec!["a", "b", "c"]);
        assert_eq!(img.pixel_values(0, 1), vec![2.0, 4.0, 6.0]);
    }

    #[test]
    fn add_band_rejects_other_grid() {
        let img = Image::from_band("a", raster(&[1.0, 2.0]));
        let err = img.add_band("b", raster(&[1.0, 2.0, 3.0])).unwrap_err();
        assert!(matches!(err, ImageError::GridMismatch { .. }));
    }

    #[test]
    fn add_band_rejects_duplicates() {
        let img = Image::from_band("a", raster(&[1.0]));
        assert!(matches!(
            img.add_band("a", raster(&[2.0])),
            Err(ImageError::DuplicateBand(_))
        ));
    }

    #[test]
    fn select_reorders_and_reports_missing() {
        let img = Image::from_band("a", raster(&[1.0]))
            .add_band("b", raster(&[2.0]))
            .unwrap();
        let sel = img.select(&["b", "a"]).unwrap();
        assert_eq!(sel.band_names(), vec!["b", "a"]);
        assert!(matches!(img.select(&["z"]), Err(ImageError::MissingBand(..))));
    }

    #[test]
    fn pixel_validity_requires_all_bands() {
        let img = Image::from_band("a", raster(&[1.0, 1.0]))
            .add_band("b", raster(&[f32::NAN, 2.0]))
            .unwrap();
        assert!(!img.is_pixel_valid(0, 0));
        assert!(img.is_pixel_valid(0, 1));
    }
}
