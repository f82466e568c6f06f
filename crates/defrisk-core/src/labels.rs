//! Forest-loss labels from year-over-year land-cover transitions.
//!
//! Two policies:
//! - `Basic`:  pos = forest(t) & nonforest(t+1); every other valid pixel is 0.
//! - `Stable`: pos = forest(t-1) & forest(t) & nonforest(t+1),
//!             neg = forest(t-1) & forest(t) & forest(t+1);
//!             pixels matching neither are masked.
//!
//! In both cases a pixel is masked unless every contributing year has a
//! valid classification.

use serde::{Deserialize, Serialize};

use crate::landcover::is_forest_class;
use crate::raster::Raster;

pub const LABEL_BAND: &str = "label";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelPolicy {
    Basic,
    Stable,
}

impl LabelPolicy {
    pub fn from_stable_flag(use_stable_label: bool) -> Self {
        if use_stable_label { Self::Stable } else { Self::Basic }
    }

    /// Land-cover years the label for `t_year` depends on, oldest first.
    pub fn years(self, t_year: i32) -> Vec<i32> {
        match self {
            Self::Basic => vec![t_year, t_year + 1],
            Self::Stable => vec![t_year - 1, t_year, t_year + 1],
        }
    }
}

/// Basic loss label on the grid of `lc_t`.
pub fn label_basic_loss(lc_t: &Raster, lc_t1: &Raster) -> Raster {
    let lc_t1 = lc_t1.resample_nearest(lc_t);
    let mut y = lc_t.filled_like(f32::NAN);
    for (i, out) in y.data.iter_mut().enumerate() {
        let (a, b) = (lc_t.data[i], lc_t1.data[i]);
        if a.is_nan() || b.is_nan() {
            continue;
        }
        *out = if is_forest_class(a) && !is_forest_class(b) { 1.0 } else { 0.0 };
    }
    y
}

/// Stable loss label on the grid of `lc_t`.
pub fn label_stable_loss(lc_tm1: &Raster, lc_t: &Raster, lc_tp1: &Raster) -> Raster {
    let lc_tm1 = lc_tm1.resample_nearest(lc_t);
    let lc_tp1 = lc_tp1.resample_nearest(lc_t);
    let mut y = lc_t.filled_like(f32::NAN);
    for (i, out) in y.data.iter_mut().enumerate() {
        let (p, c, n) = (lc_tm1.data[i], lc_t.data[i], lc_tp1.data[i]);
        if p.is_nan() || c.is_nan() || n.is_nan() {
            continue;
        }
        if !(is_forest_class(p) && is_forest_class(c)) {
            continue;
        }
        *out = if is_forest_class(n) { 0.0 } else { 1.0 };
    }
    y
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lc(values: &[f32]) -> Raster {
        let mut r = Raster::new(values.len(), 1, 0.0, values.len() as f64, 0.0, 1.0, 0.0);
        r.data = values.to_vec();
        r
    }

    const NAN: f32 = f32::NAN;

    #[test]
    fn basic_label_truth_table() {
        // forest->forest, forest->nonforest, nonforest->forest, nonforest->nonforest, masked
        let t = lc(&[2.0, 2.0, 12.0, 12.0, NAN, 2.0]);
        let t1 = lc(&[2.0, 12.0, 2.0, 12.0, 2.0, NAN]);
        let y = label_basic_loss(&t, &t1);
        assert_eq!(&y.data[..4], &[0.0, 1.0, 0.0, 0.0]);
        assert!(y.data[4].is_nan());
        assert!(y.data[5].is_nan());
    }

    #[test]
    fn stable_label_masks_non_matching_pixels() {
        let tm1 = lc(&[1.0, 1.0, 12.0, 1.0, 1.0, NAN]);
        let t = lc(&[1.0, 1.0, 1.0, 12.0, 1.0, 1.0]);
        let tp1 = lc(&[1.0, 13.0, 13.0, 13.0, NAN, 13.0]);
        let y = label_stable_loss(&tm1, &t, &tp1);
        assert_eq!(y.data[0], 0.0); // stable forest
        assert_eq!(y.data[1], 1.0); // loss after two forest years
        assert!(y.data[2].is_nan()); // nonforest at t-1: neither pos nor neg
        assert!(y.data[3].is_nan()); // nonforest at t
        assert!(y.data[4].is_nan()); // missing t+1
        assert!(y.data[5].is_nan()); // missing t-1
    }

    #[test]
    fn policies_differ_on_regrowth_pixels() {
        // Non-forest at t: basic labels it 0, stable excludes it.
        let prev = lc(&[12.0]);
        let cur = lc(&[12.0]);
        let next = lc(&[12.0]);
        assert_eq!(label_basic_loss(&cur, &next).data[0], 0.0);
        assert!(label_stable_loss(&prev, &cur, &next).data[0].is_nan());
    }

    #[test]
    fn policy_years() {
        assert_eq!(LabelPolicy::Basic.years(2020), vec![2020, 2021]);
        assert_eq!(LabelPolicy::Stable.years(2020), vec![2019, 2020, 2021]);
        assert_eq!(LabelPolicy::from_stable_flag(true), LabelPolicy::Stable);
    }
}
