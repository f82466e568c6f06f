//! Apply published raw-space weights to a feature image.

use tracing::info;

use crate::composite::{forest_mask_for_year, frontier_features_for_year};
use crate::frontier::FrontierParams;
use crate::image::{Image, ImageError};
use crate::raster::Raster;
use crate::region::Region;
use crate::source::{ImagerySource, SourceError};
use crate::train::{feature_cols, sigmoid};

pub const SCORE_BAND: &str = "score";
pub const PROB_BAND: &str = "prob";

#[derive(Debug, thiserror::Error)]
pub enum ScoreError {
    #[error("{found} weights for {expected} feature bands")]
    WeightCount { expected: usize, found: usize },
    #[error(transparent)]
    Image(#[from] ImageError),
    #[error(transparent)]
    Source(#[from] SourceError),
}

/// `score = w · x + b` and `prob = sigmoid(score)` over the model feature
/// bands of `img`, masked outside `forest`.
pub fn score_image(img: &Image, w: &[f64], b: f64, forest: &Raster) -> Result<Image, ScoreError> {
    let cols = feature_cols();
    if w.len() != cols.len() {
        return Err(ScoreError::WeightCount {
            expected: cols.len(),
            found: w.len(),
        });
    }
    let x = img.select(&cols)?;
    let Some(grid) = x.grid() else {
        return Ok(Image::new());
    };

    let mut score = grid.filled_like(f32::NAN);
    let mut prob = score.clone();
    for r in 0..grid.height {
        for c in 0..grid.width {
            if !x.is_pixel_valid(r, c) {
                continue;
            }
            let z = x
                .pixel_values(r, c)
                .into_iter()
                .zip(w)
                .map(|(v, wi)| wi * f64::from(v))
                .sum::<f64>()
                + b;
            score.set(r, c, z as f32);
            prob.set(r, c, sigmoid(z) as f32);
        }
    }

    let forest = forest.resample_nearest(grid);
    Ok(Image::from_band(SCORE_BAND, score.update_mask(&forest))
        .add_band(PROB_BAND, prob.update_mask(&forest))?)
}

/// Risk bands for `year`: embedding plus frontier features, scored and
/// restricted to that year's forest.
pub fn risk_image_for_year<S: ImagerySource + ?Sized>(
    source: &S,
    year: i32,
    region: &Region,
    params: &FrontierParams,
    w: &[f64],
    b: f64,
) -> Result<Image, ScoreError> {
    let x = source.embedding_for_year(year, region)?;
    let grid = x.grid().cloned().ok_or(SourceError::EmptyEmbedding(year))?;
    let frontier = frontier_features_for_year(source, year, region, params)?;
    let img = x.add_bands(frontier.resample_nearest(&grid))?;
    let forest = forest_mask_for_year(source, year, region)?;
    let out = score_image(&img, w, b, &forest)?;
    info!(year, scored = out.band(PROB_BAND).map_or(0, Raster::valid_count), "risk image scored");
    Ok(out)
}
