//! Table exports.
//!
//! An export persists only the selected columns of a sample table, in the
//! given order, as CSV. Submission returns an `ExportTask` straight away; the
//! job itself runs elsewhere (for `DriveFolder`, on its own thread) and is
//! never polled by the pipeline.

use std::fs;
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};

use tracing::{debug, info};
use uuid::Uuid;

use crate::frontier::FRONTIER_BANDS;
use crate::labels::LABEL_BAND;
use crate::table::{SampleRecord, SampleTable, GEO, T_YEAR, UNBIASED};

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("export {description:?} has no column selectors")]
    NoSelectors { description: String },
    #[error("cannot create export directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot start export job {description:?}: {source}")]
    Spawn {
        description: String,
        source: std::io::Error,
    },
    #[error("CSV write failed for {path}: {source}")]
    Csv { path: PathBuf, source: csv::Error },
    #[error("export job {0} panicked")]
    Panicked(String),
}

/// Everything one export needs.
#[derive(Debug, Clone)]
pub struct ExportJob {
    pub table: SampleTable,
    pub description: String,
    pub file_name_prefix: String,
    pub selectors: Vec<String>,
    pub folder: Option<String>,
}

/// Handle to a submitted export.
#[derive(Debug)]
pub struct ExportTask {
    id: String,
    description: String,
    handle: JoinHandle<Result<PathBuf, ExportError>>,
}

impl ExportTask {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Block until the job completes and return the written file.
    pub fn wait(self) -> Result<PathBuf, ExportError> {
        self.handle
            .join()
            .map_err(|_| ExportError::Panicked(self.id.clone()))?
    }
}

/// Destination accepting asynchronous table exports.
pub trait ExportTarget {
    fn submit(&self, job: ExportJob) -> Result<ExportTask, ExportError>;
}

/// Exports to `<root>/<folder?>/<file_name_prefix>.csv`.
#[derive(Debug, Clone)]
pub struct DriveFolder {
    root: PathBuf,
}

impl DriveFolder {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path_for(&self, folder: Option<&str>, file_name_prefix: &str) -> PathBuf {
        let dir = match folder {
            Some(f) => self.root.join(f),
            None => self.root.clone(),
        };
        dir.join(format!("{file_name_prefix}.csv"))
    }
}

impl ExportTarget for DriveFolder {
    fn submit(&self, job: ExportJob) -> Result<ExportTask, ExportError> {
        if job.selectors.is_empty() {
            return Err(ExportError::NoSelectors {
                description: job.description,
            });
        }
        let path = self.path_for(job.folder.as_deref(), &job.file_name_prefix);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(|source| ExportError::CreateDir {
                path: dir.to_path_buf(),
                source,
            })?;
        }

        let id = Uuid::new_v4().to_string();
        let description = job.description.clone();
        let handle = thread::Builder::new()
            .name(format!("export-{id}"))
            .spawn(move || {
                write_csv(&job.table, &job.selectors, &path)?;
                debug!(path = %path.display(), rows = job.table.len(), "export written");
                Ok(path)
            })
            .map_err(|source| ExportError::Spawn {
                description: description.clone(),
                source,
            })?;

        info!(%id, description = %description, "export task started");
        Ok(ExportTask {
            id,
            description,
            handle,
        })
    }
}

/// Submit `table` restricted to `selectors` (in order) to `target`.
pub fn export_table<T: ExportTarget + ?Sized>(
    target: &T,
    table: SampleTable,
    description: &str,
    file_name_prefix: &str,
    selectors: &[String],
    folder: Option<&str>,
) -> Result<ExportTask, ExportError> {
    target.submit(ExportJob {
        table,
        description: description.to_string(),
        file_name_prefix: file_name_prefix.to_string(),
        selectors: selectors.to_vec(),
        folder: folder.map(str::to_string),
    })
}

/// Canonical export column order: embedding bands, frontier bands, label,
/// tYear and, for unbiased tables, the unbiased flag. Matches the trainer's
/// feature order.
pub fn feature_selectors(embedding_bands: &[String], unbiased: bool) -> Vec<String> {
    let mut cols: Vec<String> = embedding_bands.to_vec();
    cols.extend(FRONTIER_BANDS.iter().map(|s| s.to_string()));
    cols.push(LABEL_BAND.to_string());
    cols.push(T_YEAR.to_string());
    if unbiased {
        cols.push(UNBIASED.to_string());
    }
    cols
}

/// Integral values print without a fractional part.
fn format_value(v: f64) -> String {
    if v.is_finite() && v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        format!("{v}")
    }
}

fn cell(rec: &SampleRecord, selector: &str) -> String {
    if selector == GEO {
        return rec.geometry_json();
    }
    rec.get(selector).map(format_value).unwrap_or_default()
}

/// Write `table` as CSV with exactly `selectors` as header and column order.
pub fn write_csv(table: &SampleTable, selectors: &[String], path: &Path) -> Result<(), ExportError> {
    let csv_err = |source| ExportError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut w = csv::Writer::from_path(path).map_err(csv_err)?;
    w.write_record(selectors).map_err(csv_err)?;
    for rec in table.records() {
        w.write_record(selectors.iter().map(|s| cell(rec, s))).map_err(csv_err)?;
    }
    w.flush().map_err(|e| csv_err(e.into()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> SampleTable {
        let mut a = SampleRecord::new(-62.0, -9.0);
        a.set("A00", 0.25);
        a.set("label", 1.0);
        a.set(T_YEAR, 2019.0);
        let mut b = SampleRecord::new(-62.5, -9.5);
        b.set("A00", -1.5);
        b.set("label", 0.0);
        b.set(T_YEAR, 2020.0);
        SampleTable::new(vec![a, b])
    }

    fn sel(cols: &[&str]) -> Vec<String> {
        cols.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn csv_has_only_selected_columns_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.csv");
        write_csv(&table(), &sel(&["label", "A00", "tYear"]), &path).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines, vec!["label,A00,tYear", "1,0.25,2019", "0,-1.5,2020"]);
    }

    #[test]
    fn missing_property_is_empty_cell() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.csv");
        write_csv(&table(), &sel(&["A00", UNBIASED]), &path).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().nth(1), Some("0.25,"));
    }

    #[test]
    fn geo_selector_writes_geojson() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.csv");
        write_csv(&table(), &sel(&[GEO]), &path).unwrap();
        let mut rdr = csv::Reader::from_path(&path).unwrap();
        let first = rdr.records().next().unwrap().unwrap();
        let g: serde_json::Value = serde_json::from_str(&first[0]).unwrap();
        assert_eq!(g["type"], "Point");
    }

    #[test]
    fn drive_folder_returns_task_and_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let target = DriveFolder::new(dir.path());
        let task = export_table(&target, table(), "demo", "demo_train", &sel(&["A00"]), Some("sub")).unwrap();
        assert!(!task.id().is_empty());
        assert_eq!(task.description(), "demo");
        while !task.is_finished() {
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
        let path = task.wait().unwrap();
        assert_eq!(path, dir.path().join("sub").join("demo_train.csv"));
        assert!(path.exists());
    }

    #[test]
    fn description_with_nul_still_exports() {
        let dir = tempfile::tempdir().unwrap();
        let target = DriveFolder::new(dir.path());
        let task = export_table(&target, table(), "bad\0name", "nul_desc", &sel(&["A00"]), None).unwrap();
        assert_eq!(task.description(), "bad\0name");
        assert!(task.wait().unwrap().exists());
    }

    #[test]
    fn empty_selectors_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let target = DriveFolder::new(dir.path());
        let err = export_table(&target, table(), "demo", "x", &[], None).unwrap_err();
        assert!(matches!(err, ExportError::NoSelectors { .. }));
    }

    #[test]
    fn feature_selector_order() {
        let bands = sel(&["A00", "A01"]);
        assert_eq!(
            feature_selectors(&bands, false),
            sel(&["A00", "A01", "dist_to_nonforest_m", "dist_to_road_m", "label", "tYear"])
        );
        assert_eq!(feature_selectors(&bands, true).last().map(String::as_str), Some("unbiased"));
    }

    #[test]
    fn integral_values_have_no_fraction() {
        assert_eq!(format_value(2019.0), "2019");
        assert_eq!(format_value(0.5), "0.5");
        assert_eq!(format_value(-0.0), "0");
    }
}
