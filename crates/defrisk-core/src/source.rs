//! Imagery catalogue access.
//!
//! `ImagerySource` is the seam to the remote catalogue: yearly embedding
//! mosaics, yearly MODIS land cover and road geometries. `LocalCatalog`
//! serves the same data from a directory of JSON files:
//!
//! ```text
//! <root>/embedding/<year>.json   serialized `Image` (bands A00..A63)
//! <root>/landcover/<year>.json   serialized `Raster` of LC_Type1 codes
//! <root>/roads.json              {"roads": [[[lon, lat], ...], ...]}
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::frontier::RoadNetwork;
use crate::image::{Image, ImageError};
use crate::raster::Raster;
use crate::region::Region;

/// Number of embedding dimensions per pixel.
pub const EMBEDDING_DIM: usize = 64;

/// Embedding band names `A00..A63`.
pub fn embedding_band_names() -> Vec<String> {
    (0..EMBEDDING_DIM).map(|i| format!("A{i:02}")).collect()
}

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("no {dataset} data for year {year}")]
    MissingYear { dataset: &'static str, year: i32 },
    #[error("no road file at {0}")]
    MissingRoads(PathBuf),
    #[error("embedding for year {0} has no bands")]
    EmptyEmbedding(i32),
    #[error("{path}: {message}")]
    Invalid { path: PathBuf, message: String },
    #[error(transparent)]
    Image(#[from] ImageError),
}

/// Read access to the yearly rasters the composite is built from.
/// Every returned raster is clipped to `region`.
pub trait ImagerySource {
    /// Annual embedding mosaic for `year`, one band per dimension.
    fn embedding_for_year(&self, year: i32, region: &Region) -> Result<Image, SourceError>;

    /// MODIS `LC_Type1` classification for `year`; masked where unclassified.
    fn landcover_for_year(&self, year: i32, region: &Region) -> Result<Raster, SourceError>;

    /// Roads intersecting `region`.
    fn roads(&self, region: &Region) -> Result<RoadNetwork, SourceError>;
}

/// Directory-backed catalogue.
#[derive(Debug, Clone)]
pub struct LocalCatalog {
    root: PathBuf,
}

impl LocalCatalog {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn embedding_path(&self, year: i32) -> PathBuf {
        self.root.join("embedding").join(format!("{year}.json"))
    }

    pub fn landcover_path(&self, year: i32) -> PathBuf {
        self.root.join("landcover").join(format!("{year}.json"))
    }

    pub fn roads_path(&self) -> PathBuf {
        self.root.join("roads.json")
    }

    /// Write an embedding image for `year`, creating directories as needed.
    pub fn write_embedding(&self, year: i32, image: &Image) -> Result<(), SourceError> {
        write_json(&self.embedding_path(year), image)
    }

    /// Write a land-cover raster for `year`, creating directories as needed.
    pub fn write_landcover(&self, year: i32, lc: &Raster) -> Result<(), SourceError> {
        write_json(&self.landcover_path(year), lc)
    }

    pub fn write_roads(&self, roads: &RoadNetwork) -> Result<(), SourceError> {
        write_json(&self.roads_path(), roads)
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, SourceError> {
    let text = fs::read_to_string(path).map_err(|source| SourceError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| SourceError::Json {
        path: path.to_path_buf(),
        source,
    })
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<(), SourceError> {
    let io_err = |source| SourceError::Write {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    let json = serde_json::to_string(value).map_err(|source| SourceError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    fs::write(path, json).map_err(io_err)
}

fn check_buffer(path: &Path, r: &Raster) -> Result<(), SourceError> {
    if r.data.len() != r.width * r.height {
        return Err(SourceError::Invalid {
            path: path.to_path_buf(),
            message: format!("{} values for a {}x{} grid", r.data.len(), r.width, r.height),
        });
    }
    Ok(())
}

impl ImagerySource for LocalCatalog {
    fn embedding_for_year(&self, year: i32, region: &Region) -> Result<Image, SourceError> {
        let path = self.embedding_path(year);
        if !path.exists() {
            return Err(SourceError::MissingYear { dataset: "embedding", year });
        }
        let image: Image = read_json(&path)?;
        for band in &image.bands {
            check_buffer(&path, &band.raster)?;
        }
        image.check_grid()?;
        debug!(year, bands = image.bands.len(), path = %path.display(), "loaded embedding");
        Ok(image.clip(region))
    }

    fn landcover_for_year(&self, year: i32, region: &Region) -> Result<Raster, SourceError> {
        let path = self.landcover_path(year);
        if !path.exists() {
            return Err(SourceError::MissingYear { dataset: "landcover", year });
        }
        let lc: Raster = read_json(&path)?;
        check_buffer(&path, &lc)?;
        debug!(year, width = lc.width, height = lc.height, "loaded landcover");
        Ok(lc.clip(region))
    }

    fn roads(&self, region: &Region) -> Result<RoadNetwork, SourceError> {
        let path = self.roads_path();
        if !path.exists() {
            return Err(SourceError::MissingRoads(path));
        }
        let net: RoadNetwork = read_json(&path)?;
        Ok(net.filter_bounds(region))
    }
}

/// In-memory catalogue, keyed by year.
#[derive(Debug, Clone, Default)]
pub struct MemoryCatalog {
    pub embedding: BTreeMap<i32, Image>,
    pub landcover: BTreeMap<i32, Raster>,
    pub roads: RoadNetwork,
}

impl ImagerySource for MemoryCatalog {
    fn embedding_for_year(&self, year: i32, region: &Region) -> Result<Image, SourceError> {
        self.embedding
            .get(&year)
            .map(|img| img.clip(region))
            .ok_or(SourceError::MissingYear { dataset: "embedding", year })
    }

    fn landcover_for_year(&self, year: i32, region: &Region) -> Result<Raster, SourceError> {
        self.landcover
            .get(&year)
            .map(|lc| lc.clip(region))
            .ok_or(SourceError::MissingYear { dataset: "landcover", year })
    }

    fn roads(&self, region: &Region) -> Result<RoadNetwork, SourceError> {
        Ok(self.roads.filter_bounds(region))
    }
}
