//! End to end: local catalogue → samples → CSV export → training → weights → fragment.

use std::path::Path;

use defrisk_core::export::{export_table, feature_selectors, DriveFolder};
use defrisk_core::frontier::RoadNetwork;
use defrisk_core::image::Image;
use defrisk_core::metrics::eval_probs;
use defrisk_core::raster::{Raster, METRES_PER_DEG};
use defrisk_core::region::Region;
use defrisk_core::sampling::{stratified_samples_for_year, unbiased_forest_samples, SamplingConfig};
use defrisk_core::source::{embedding_band_names, ImagerySource, LocalCatalog};
use defrisk_core::table::SampleTable;
use defrisk_core::train::{feature_cols, train_from_csv, FeatureTable, TrainConfig, N_FEATURES};
use defrisk_core::weights::{gee_code_editor_url, parse_fragment, FragmentParams, WeightFile};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const SIZE: usize = 20;
const YEARS: [i32; 4] = [2018, 2019, 2020, 2021];

/// Cropland advances one column east per year; embeddings are random noise
/// with a weak signal in A00 along the next column to be cleared.
fn write_catalog(root: &Path) -> Region {
    let deg = 500.0 / METRES_PER_DEG;
    let (min_lon, min_lat) = (-62.5, -9.5);
    let (max_lon, max_lat) = (min_lon + SIZE as f64 * deg, min_lat + SIZE as f64 * deg);
    let blank = Raster::new(SIZE, SIZE, min_lon, max_lon, min_lat, max_lat, 0.0);
    let cat = LocalCatalog::new(root);
    let mut rng = StdRng::seed_from_u64(2024);

    for &year in &YEARS {
        let cleared = 2 + (year - YEARS[0]) as usize;
        let mut lc = blank.clone();
        for r in 0..SIZE {
            for c in 0..SIZE {
                lc.set(r, c, if c < cleared { 12.0 } else { 2.0 });
            }
        }
        cat.write_landcover(year, &lc).unwrap();

        let mut img = Image::new();
        for (k, name) in embedding_band_names().into_iter().enumerate() {
            let mut band = blank.clone();
            for r in 0..SIZE {
                for c in 0..SIZE {
                    let signal = if k == 0 && c == cleared { 1.5 } else { 0.0 };
                    band.set(r, c, rng.gen_range(-1.0f32..1.0) + signal);
                }
            }
            img = img.add_band(name, band).unwrap();
        }
        cat.write_embedding(year, &img).unwrap();
    }
    cat.write_roads(&RoadNetwork {
        roads: vec![vec![[max_lon, min_lat], [max_lon, max_lat]]],
    })
    .unwrap();
    Region::new(min_lon, min_lat, max_lon, max_lat).unwrap()
}

#[test]
fn catalog_to_fragment() {
    let catalog_dir = tempfile::tempdir().unwrap();
    let drive_dir = tempfile::tempdir().unwrap();
    let region = write_catalog(catalog_dir.path());
    let catalog = LocalCatalog::new(catalog_dir.path());
    let cfg = SamplingConfig::default();

    let bands = catalog.embedding_for_year(2018, &region).unwrap().band_names();
    let mut train = SampleTable::default();
    for year in [2018, 2019, 2020] {
        let t = stratified_samples_for_year(&catalog, year, &region, 40, 15, &cfg).unwrap();
        assert_eq!(t.len(), 55);
        train = train.merge(t);
    }

    let target = DriveFolder::new(drive_dir.path());
    let selectors = feature_selectors(&bands, false);
    let task = export_table(&target, train, "t_train_2018_2020", "t_train_balanced_2018_2020", &selectors, Some("exports"))
        .unwrap();
    let train_csv = task.wait().unwrap();

    let header = FeatureTable::read_csv(&train_csv).unwrap().columns;
    assert_eq!(header, selectors);
    assert_eq!(&header[..N_FEATURES], feature_cols().as_slice());

    let (res, info) = train_from_csv(&train_csv, &[2018, 2019], Some(2020), &TrainConfig::default()).unwrap();
    assert_eq!(res.w_raw.len(), N_FEATURES);
    assert!(res.b_raw.is_finite());
    assert_eq!(info.train_n, 110);
    assert!((0.0..=1.0).contains(&info.train_pos_rate));
    assert_eq!(info.test_n, Some(55));

    let unbiased = unbiased_forest_samples(&catalog, 2020, &region, 100, &cfg).unwrap();
    let task = export_table(
        &target,
        unbiased,
        "t_unbiased_2020",
        "t_unbiased_forest_eval_2020",
        &feature_selectors(&bands, true),
        Some("exports"),
    )
    .unwrap();
    let eval_table = FeatureTable::read_csv(&task.wait().unwrap()).unwrap();
    let (x, y) = eval_table.xy(&feature_cols(), None).unwrap();
    let m = eval_probs(&y, &res.model.predict_proba(&x), "unbiased");
    assert_eq!(m.n, 100);
    assert!(m.logloss.is_finite());

    let weights_path = drive_dir.path().join("models").join("logit_weights.json");
    WeightFile {
        w: res.w_raw.clone(),
        b: Some(res.b_raw),
        feature_cols: Some(feature_cols()),
    }
    .save(&weights_path)
    .unwrap();
    let loaded = WeightFile::load(&weights_path).unwrap();
    assert_eq!(loaded.feature_cols.as_deref(), Some(feature_cols().as_slice()));

    let url = gee_code_editor_url(&FragmentParams::default(), &loaded.w, loaded.b);
    assert!(url.ends_with(';'));
    let parsed = parse_fragment(&url).unwrap();
    assert_eq!(parsed.w.len(), N_FEATURES);
    assert_eq!(parsed.get("year"), Some("2022"));
    for (a, b) in parsed.w.iter().zip(&res.w_raw) {
        assert!((a - b).abs() <= 1e-9 * b.abs().max(1.0));
    }
}
