//! Deforestation-risk pipeline: yearly sampling images built from satellite
//! embeddings and land cover, point sampling and CSV export, a logistic risk
//! model, and weight publication for the Earth Engine viewer.

pub mod composite;
pub mod export;
pub mod frontier;
pub mod image;
pub mod labels;
pub mod landcover;
pub mod metrics;
pub mod raster;
pub mod region;
pub mod sampling;
pub mod scoring;
pub mod source;
pub mod table;
pub mod train;
pub mod weights;

#[cfg(test)]
mod fixtures;

pub use composite::sampling_image_for_year;
pub use export::{export_table, feature_selectors, DriveFolder, ExportError, ExportTarget, ExportTask};
pub use image::Image;
pub use labels::LabelPolicy;
pub use raster::Raster;
pub use region::Region;
pub use sampling::{stratified_samples_for_year, unbiased_forest_samples, SamplingConfig};
pub use source::{ImagerySource, LocalCatalog, MemoryCatalog};
pub use table::{SampleRecord, SampleTable};
pub use train::{train_from_csv, TrainConfig, TrainInfo, TrainResult};
pub use weights::{gee_code_editor_url, gee_fragment, FragmentParams, WeightFile};
