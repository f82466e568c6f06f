//! Point sample tables.

use std::collections::BTreeMap;
use std::num::ParseIntError;
use std::str::FromStr;

use serde::Serialize;

/// Year the sample's features and label refer to.
pub const T_YEAR: &str = "tYear";
/// Set to 1 on records drawn without class balancing.
pub const UNBIASED: &str = "unbiased";
/// Pseudo-column selecting the point geometry as GeoJSON.
pub const GEO: &str = ".geo";

/// One sampled pixel: its centre and every property value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SampleRecord {
    pub lon: f64,
    pub lat: f64,
    pub properties: BTreeMap<String, f64>,
}

impl SampleRecord {
    pub fn new(lon: f64, lat: f64) -> Self {
        Self {
            lon,
            lat,
            properties: BTreeMap::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.properties.get(key).copied()
    }

    pub fn set(&mut self, key: impl Into<String>, value: f64) {
        self.properties.insert(key.into(), value);
    }

    /// GeoJSON point for the record location.
    pub fn geometry_json(&self) -> String {
        serde_json::json!({ "type": "Point", "coordinates": [self.lon, self.lat] }).to_string()
    }
}

/// Ordered collection of sample records.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SampleTable {
    records: Vec<SampleRecord>,
}

impl SampleTable {
    pub fn new(records: Vec<SampleRecord>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[SampleRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Concatenate `other` after `self`.
    pub fn merge(mut self, other: SampleTable) -> SampleTable {
        self.records.extend(other.records);
        self
    }

    /// Set `key = value` on every record.
    pub fn with_property(mut self, key: &str, value: f64) -> SampleTable {
        for rec in &mut self.records {
            rec.set(key, value);
        }
        self
    }

    /// Number of records whose `key` equals `value`.
    pub fn count_where(&self, key: &str, value: f64) -> usize {
        self.records.iter().filter(|r| r.get(key) == Some(value)).count()
    }
}

/// Comma-separated list of years, e.g. `2018, 2019,2020,`. Blank entries
/// are skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct YearList(pub Vec<i32>);

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum YearListError {
    #[error("year {token:?} is not an integer: {source}")]
    NotAYear { token: String, source: ParseIntError },
    #[error("year list is empty")]
    Empty,
}

impl FromStr for YearList {
    type Err = YearListError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let years = s
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(|t| {
                t.parse().map_err(|source| YearListError::NotAYear {
                    token: t.to_string(),
                    source,
                })
            })
            .collect::<Result<Vec<i32>, _>>()?;
        if years.is_empty() {
            return Err(YearListError::Empty);
        }
        Ok(YearList(years))
    }
}
