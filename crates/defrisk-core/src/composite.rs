//! Yearly sampling image: embedding bands, frontier features and label.
//!
//! Band order of the result:
//!   A00..A63, dist_to_nonforest_m, dist_to_road_m, label
//!
//! Land-cover derived rasters (frontier distances, label) are computed on the
//! land-cover grid and resampled nearest-neighbour onto the embedding grid.

use tracing::{debug, info};

use crate::frontier::{
    distance_to_nonforest, distance_to_roads, FrontierParams, DIST_NONFOREST_BAND, DIST_ROAD_BAND,
};
use crate::image::Image;
use crate::labels::{label_basic_loss, label_stable_loss, LabelPolicy, LABEL_BAND};
use crate::landcover::is_forest_igbp;
use crate::raster::Raster;
use crate::region::Region;
use crate::source::{ImagerySource, SourceError};

/// Forest (1) / non-forest (0) for `year`, masked where unclassified.
pub fn forest_mask_for_year<S: ImagerySource + ?Sized>(
    source: &S,
    year: i32,
    region: &Region,
) -> Result<Raster, SourceError> {
    let lc = source.landcover_for_year(year, region)?;
    Ok(is_forest_igbp(&lc))
}

/// Distance-to-nonforest and distance-to-road bands on the land-cover grid.
pub fn frontier_features_for_year<S: ImagerySource + ?Sized>(
    source: &S,
    year: i32,
    region: &Region,
    params: &FrontierParams,
) -> Result<Image, SourceError> {
    let lc = source.landcover_for_year(year, region)?;
    let nf_max_m = params.nf_max_km.map(|km| km * 1000.0);
    let dist_nf = distance_to_nonforest(&lc, params.neighborhood_px, nf_max_m);

    let roads = source.roads(region)?;
    debug!(year, roads = roads.roads.len(), "computing road distance");
    let dist_rd = distance_to_roads(&lc, &roads, params.road_search_radius_m).clip(region);

    Ok(Image::from_band(DIST_NONFOREST_BAND, dist_nf).add_band(DIST_ROAD_BAND, dist_rd)?)
}

/// Forest-loss label for `year` under `policy`, on the grid of land cover at `year`.
pub fn label_for_year<S: ImagerySource + ?Sized>(
    source: &S,
    year: i32,
    region: &Region,
    policy: LabelPolicy,
) -> Result<Raster, SourceError> {
    debug!(year, ?policy, years = ?policy.years(year), "building label");
    let lc_t = source.landcover_for_year(year, region)?;
    let lc_t1 = source.landcover_for_year(year + 1, region)?;
    let label = match policy {
        LabelPolicy::Basic => label_basic_loss(&lc_t, &lc_t1),
        LabelPolicy::Stable => {
            let lc_tm1 = source.landcover_for_year(year - 1, region)?;
            label_stable_loss(&lc_tm1, &lc_t, &lc_t1)
        }
    };
    Ok(label)
}

/// Compose the full sampling image for `year`.
pub fn sampling_image_for_year<S: ImagerySource + ?Sized>(
    source: &S,
    year: i32,
    region: &Region,
    policy: LabelPolicy,
    params: &FrontierParams,
) -> Result<Image, SourceError> {
    let x = source.embedding_for_year(year, region)?;
    let grid = x.grid().cloned().ok_or(SourceError::EmptyEmbedding(year))?;

    let frontier = frontier_features_for_year(source, year, region, params)?;
    let label = label_for_year(source, year, region, policy)?;

    let img = x
        .add_bands(frontier.resample_nearest(&grid))?
        .add_band(LABEL_BAND, label.resample_nearest(&grid))?;

    info!(
        year,
        ?policy,
        bands = img.bands.len(),
        width = grid.width,
        height = grid.height,
        "composed sampling image"
    );
    Ok(img)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{frontier_scene, SCENE_YEARS};

    #[test]
    fn band_order_is_embedding_frontier_label() {
        let (cat, region) = frontier_scene(8, 6);
        let img =
            sampling_image_for_year(&cat, 2019, &region, LabelPolicy::Basic, &FrontierParams::default())
                .unwrap();
        let names = img.band_names();
        let n = names.len();
        assert_eq!(&names[..3], &["A00", "A01", "A02"]);
        assert_eq!(&names[n - 3..], &[DIST_NONFOREST_BAND, DIST_ROAD_BAND, LABEL_BAND]);
    }

    #[test]
    fn basic_label_marks_frontier_column() {
        let (cat, region) = frontier_scene(8, 6);
        // In 2019 the frontier sits at column 3 and is cleared by 2020.
        let y = label_for_year(&cat, 2019, &region, LabelPolicy::Basic).unwrap();
        for r in 0..6 {
            assert_eq!(y.get(r, 3), 1.0);
            assert_eq!(y.get(r, 5), 0.0);
            assert_eq!(y.get(r, 0), 0.0);
        }
    }

    #[test]
    fn stable_label_excludes_old_clearings() {
        let (cat, region) = frontier_scene(8, 6);
        let y = label_for_year(&cat, 2019, &region, LabelPolicy::Stable).unwrap();
        assert_eq!(y.get(2, 3), 1.0);
        assert_eq!(y.get(2, 6), 0.0);
        assert!(y.get(2, 0).is_nan());
        assert!(y.get(2, 2).is_nan());
    }

    #[test]
    fn stable_label_needs_previous_year() {
        let (cat, region) = frontier_scene(8, 6);
        let first = SCENE_YEARS[0];
        let err = label_for_year(&cat, first, &region, LabelPolicy::Stable).unwrap_err();
        assert!(matches!(err, SourceError::MissingYear { .. }));
    }

    #[test]
    fn nonforest_distance_only_on_forest() {
        let (cat, region) = frontier_scene(8, 6);
        let f = frontier_features_for_year(&cat, 2019, &region, &FrontierParams::default()).unwrap();
        let d = f.band(DIST_NONFOREST_BAND).unwrap();
        assert!(d.get(0, 0).is_nan());
        assert!(d.get(0, 3).is_finite());
        assert!(d.get(0, 4) > d.get(0, 3));
    }

    #[test]
    fn forest_mask_matches_landcover() {
        let (cat, region) = frontier_scene(8, 6);
        let f = forest_mask_for_year(&cat, 2018, &region).unwrap();
        assert_eq!(f.get(0, 1), 0.0);
        assert_eq!(f.get(0, 2), 1.0);
    }
}
