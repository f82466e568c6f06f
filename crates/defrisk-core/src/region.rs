//! Rectangular region of interest in geographic coordinates.
//! All coordinate math uses f64.
use std::fmt;
use std::str::FromStr;

use serde::Serialize;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum RegionError {
    #[error("bbox must have 4 comma-separated numbers (xmin,ymin,xmax,ymax), got {0:?}")]
    Arity(String),
    #[error("bbox component {0:?} is not a finite number")]
    NotANumber(String),
    #[error("bbox is empty: xmin={xmin} xmax={xmax} ymin={ymin} ymax={ymax}")]
    Empty { xmin: f64, ymin: f64, xmax: f64, ymax: f64 },
}

/// Axis-aligned lon/lat rectangle. Immutable once constructed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Region {
    xmin: f64,
    ymin: f64,
    xmax: f64,
    ymax: f64,
}

impl Region {
    pub fn new(xmin: f64, ymin: f64, xmax: f64, ymax: f64) -> Result<Self, RegionError> {
        if !(xmin < xmax && ymin < ymax) {
            return Err(RegionError::Empty { xmin, ymin, xmax, ymax });
        }
        Ok(Self { xmin, ymin, xmax, ymax })
    }

    pub fn xmin(&self) -> f64 {
        self.xmin
    }

    pub fn ymin(&self) -> f64 {
        self.ymin
    }

    pub fn xmax(&self) -> f64 {
        self.xmax
    }

    pub fn ymax(&self) -> f64 {
        self.ymax
    }

    /// Centre as (lon, lat).
    pub fn center(&self) -> (f64, f64) {
        ((self.xmin + self.xmax) / 2.0, (self.ymin + self.ymax) / 2.0)
    }

    /// Closed-interval containment test.
    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        lon >= self.xmin && lon <= self.xmax && lat >= self.ymin && lat <= self.ymax
    }

    /// Does the box `[min_lon, max_lon] × [min_lat, max_lat]` touch this region?
    pub fn intersects(&self, min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> bool {
        min_lon <= self.xmax && max_lon >= self.xmin && min_lat <= self.ymax && max_lat >= self.ymin
    }
}

impl FromStr for Region {
    type Err = RegionError;

    /// Parse `"xmin,ymin,xmax,ymax"` (lon/lat degrees).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        if parts.len() != 4 {
            return Err(RegionError::Arity(s.to_string()));
        }
        let mut vals = [0.0f64; 4];
        for (slot, part) in vals.iter_mut().zip(&parts) {
            *slot = part
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| RegionError::NotANumber(part.to_string()))?;
        }
        Region::new(vals[0], vals[1], vals[2], vals[3])
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{},{}", self.xmin, self.ymin, self.xmax, self.ymax)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_bbox_with_spaces() {
        let r: Region = "-63.5, -10.5, -61.5,-8.5".parse().unwrap();
        assert_eq!(r.xmin(), -63.5);
        assert_eq!(r.ymax(), -8.5);
        assert_eq!(r.center(), (-62.5, -9.5));
    }

    #[test]
    fn parse_bbox_rejects_wrong_arity() {
        assert!(matches!("1,2,3".parse::<Region>(), Err(RegionError::Arity(_))));
    }

    #[test]
    fn parse_bbox_rejects_garbage() {
        assert!(matches!("1,2,x,4".parse::<Region>(), Err(RegionError::NotANumber(_))));
        assert!(matches!("1,2,nan,4".parse::<Region>(), Err(RegionError::NotANumber(_))));
    }

    #[test]
    fn parse_bbox_rejects_empty_extent() {
        assert!(matches!("3,0,1,1".parse::<Region>(), Err(RegionError::Empty { .. })));
    }

    #[test]
    fn contains_and_intersects() {
        let r = Region::new(0.0, 0.0, 1.0, 1.0).unwrap();
        assert!(r.contains(1.0, 0.5));
        assert!(!r.contains(1.1, 0.5));
        assert!(r.intersects(0.5, 0.5, 2.0, 2.0));
        assert!(!r.intersects(1.5, 1.5, 2.0, 2.0));
    }

    #[test]
    fn display_roundtrips() {
        let r = Region::new(-1.5, -2.0, 3.25, 4.0).unwrap();
        assert_eq!(r.to_string().parse::<Region>().unwrap(), r);
    }
}
