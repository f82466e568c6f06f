//! L2-regularised logistic regression on exported sample tables.
//!
//! Features are standardised (population std, unit scale for constant
//! columns) and the model is fitted in scaled space with damped Newton
//! steps. Published weights are converted back to raw feature space so a
//! consumer can score `w · x + b` without knowing the scaler.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::frontier::FRONTIER_BANDS;
use crate::labels::LABEL_BAND;
use crate::source::embedding_band_names;
use crate::table::T_YEAR;

/// Number of model features: 64 embedding bands plus two frontier distances.
pub const N_FEATURES: usize = crate::source::EMBEDDING_DIM + FRONTIER_BANDS.len();

/// Model feature order, identical to the exported column order.
pub fn feature_cols() -> Vec<String> {
    let mut cols = embedding_band_names();
    cols.extend(FRONTIER_BANDS.iter().map(|s| s.to_string()));
    cols
}

#[derive(Debug, thiserror::Error)]
pub enum TrainError {
    #[error("cannot read table {path}: {source}")]
    Csv { path: PathBuf, source: csv::Error },
    #[error("missing feature columns in training table: {first:?} ... ({count} missing)")]
    MissingFeatures { first: Vec<String>, count: usize },
    #[error("training table must have columns: tYear, label")]
    MissingMetadata,
    #[error("no rows found for train_years={requested:?}. Available years: {available:?}")]
    NoRows { requested: Vec<i32>, available: Vec<i32> },
    #[error("row {row}, column {column}: missing or non-finite value")]
    NonFinite { row: usize, column: String },
    #[error("training rows contain a single class ({0}); need both 0 and 1")]
    SingleClass(f64),
    #[error("Newton system is not positive definite")]
    Singular,
}

// ── Table ────────────────────────────────────────────────────────────────────

/// Integral `tYear` cell value; fractional or non-finite cells match no year.
fn year_of(v: f64) -> Option<i32> {
    let in_range = v >= f64::from(i32::MIN) && v <= f64::from(i32::MAX);
    (v.fract() == 0.0 && in_range).then_some(v as i32)
}

/// Numeric CSV table. Empty cells read as NaN.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<f64>>,
}

impl FeatureTable {
    pub fn read_csv(path: &Path) -> Result<Self, TrainError> {
        let csv_err = |source| TrainError::Csv {
            path: path.to_path_buf(),
            source,
        };
        let mut rdr = csv::Reader::from_path(path).map_err(csv_err)?;
        let columns: Vec<String> = rdr.headers().map_err(csv_err)?.iter().map(str::to_string).collect();

        let mut rows = Vec::new();
        for rec in rdr.records() {
            let rec = rec.map_err(csv_err)?;
            // Non-numeric cells (e.g. `.geo`) read as NaN; `xy` rejects them where used.
            rows.push(rec.iter().map(|cell| cell.trim().parse::<f64>().unwrap_or(f64::NAN)).collect());
        }
        debug!(path = %path.display(), rows = rows.len(), cols = columns.len(), "table loaded");
        Ok(Self { columns, rows })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Sorted distinct values of the `tYear` column.
    pub fn years(&self) -> Vec<i32> {
        let Some(j) = self.column(T_YEAR) else {
            return Vec::new();
        };
        let set: BTreeSet<i32> = self
            .rows
            .iter()
            .filter_map(|r| r.get(j).copied().and_then(year_of))
            .collect();
        set.into_iter().collect()
    }

    fn check_features(&self, features: &[String]) -> Result<Vec<usize>, TrainError> {
        let missing: Vec<String> = features.iter().filter(|c| self.column(c).is_none()).cloned().collect();
        if !missing.is_empty() {
            return Err(TrainError::MissingFeatures {
                first: missing.iter().take(5).cloned().collect(),
                count: missing.len(),
            });
        }
        Ok(features.iter().filter_map(|c| self.column(c)).collect())
    }

    /// Feature matrix and labels of the rows whose `tYear` passes `keep`
    /// (all rows when the table has no `tYear` and `keep` is `None`).
    pub fn xy(
        &self,
        features: &[String],
        keep: Option<&dyn Fn(i32) -> bool>,
    ) -> Result<(Vec<Vec<f64>>, Vec<f64>), TrainError> {
        let idx = self.check_features(features)?;
        let label = self.column(LABEL_BAND).ok_or(TrainError::MissingMetadata)?;
        let year = self.column(T_YEAR);
        if keep.is_some() && year.is_none() {
            return Err(TrainError::MissingMetadata);
        }

        let mut x = Vec::new();
        let mut y = Vec::new();
        for (i, row) in self.rows.iter().enumerate() {
            if let (Some(keep), Some(j)) = (keep, year) {
                if !year_of(row[j]).is_some_and(keep) {
                    continue;
                }
            }
            let mut feats = Vec::with_capacity(idx.len());
            for (&j, name) in idx.iter().zip(features) {
                let v = row[j];
                if !v.is_finite() {
                    return Err(TrainError::NonFinite {
                        row: i,
                        column: name.clone(),
                    });
                }
                feats.push(v);
            }
            let l = row[label];
            if !l.is_finite() {
                return Err(TrainError::NonFinite {
                    row: i,
                    column: LABEL_BAND.to_string(),
                });
            }
            x.push(feats);
            y.push(l);
        }
        Ok((x, y))
    }
}

// ── Scaler ───────────────────────────────────────────────────────────────────

/// Per-column standardisation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

impl StandardScaler {
    pub fn fit(x: &[Vec<f64>]) -> Self {
        let d = x.first().map_or(0, Vec::len);
        let n = x.len().max(1) as f64;
        let mut mean = vec![0.0; d];
        for row in x {
            for (m, v) in mean.iter_mut().zip(row) {
                *m += v;
            }
        }
        mean.iter_mut().for_each(|m| *m /= n);

        let mut var = vec![0.0; d];
        for row in x {
            for ((s, v), m) in var.iter_mut().zip(row).zip(&mean) {
                *s += (v - m) * (v - m);
            }
        }
        let scale = var
            .into_iter()
            .map(|s| {
                let std = (s / n).sqrt();
                if std <= 10.0 * f64::EPSILON { 1.0 } else { std }
            })
            .collect();
        Self { mean, scale }
    }

    pub fn transform_row(&self, row: &[f64]) -> Vec<f64> {
        row.iter()
            .zip(&self.mean)
            .zip(&self.scale)
            .map(|((v, m), s)| (v - m) / s)
            .collect()
    }

    pub fn transform(&self, x: &[Vec<f64>]) -> Vec<Vec<f64>> {
        x.iter().map(|r| self.transform_row(r)).collect()
    }
}

// ── Solver ───────────────────────────────────────────────────────────────────

/// Solver settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainConfig {
    /// Inverse regularisation strength.
    pub c: f64,
    pub max_iter: usize,
    /// Convergence threshold on the max-norm of the gradient.
    pub tol: f64,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            c: 1.0,
            max_iter: 5000,
            tol: 1e-8,
        }
    }
}

pub fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

/// log(1 + e^z) without overflow.
fn softplus(z: f64) -> f64 {
    if z > 0.0 {
        z + (-z).exp().ln_1p()
    } else {
        z.exp().ln_1p()
    }
}

/// `theta` holds the coefficients followed by the intercept.
fn objective(x: &[Vec<f64>], y: &[f64], theta: &[f64], c: f64) -> f64 {
    let d = theta.len() - 1;
    let loss: f64 = x
        .iter()
        .zip(y)
        .map(|(row, &yi)| {
            let z = dot(row, &theta[..d]) + theta[d];
            softplus(z) - yi * z
        })
        .sum();
    c * loss + 0.5 * theta[..d].iter().map(|w| w * w).sum::<f64>()
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Gradient and row-major Hessian of the objective at `theta`.
fn gradient_hessian(x: &[Vec<f64>], y: &[f64], theta: &[f64], c: f64) -> (Vec<f64>, Vec<f64>) {
    let k = theta.len();
    let d = k - 1;
    let mut g = vec![0.0; k];
    let mut h = vec![0.0; k * k];
    let mut aug = vec![1.0; k];
    for (row, &yi) in x.iter().zip(y) {
        aug[..d].copy_from_slice(row);
        let p = sigmoid(dot(row, &theta[..d]) + theta[d]);
        let r = c * (p - yi);
        let s = c * p * (1.0 - p);
        for a in 0..k {
            g[a] += r * aug[a];
            let sa = s * aug[a];
            for b in 0..=a {
                h[a * k + b] += sa * aug[b];
            }
        }
    }
    for a in 0..k {
        for b in 0..a {
            h[b * k + a] = h[a * k + b];
        }
    }
    for a in 0..d {
        g[a] += theta[a];
        h[a * k + a] += 1.0;
    }
    (g, h)
}

/// Solve `A x = rhs` for symmetric positive definite `A` (row-major, k×k).
fn cholesky_solve(mut a: Vec<f64>, rhs: &[f64]) -> Option<Vec<f64>> {
    let k = rhs.len();
    for j in 0..k {
        let mut diag = a[j * k + j];
        for p in 0..j {
            diag -= a[j * k + p] * a[j * k + p];
        }
        if diag <= 0.0 || !diag.is_finite() {
            return None;
        }
        let l_jj = diag.sqrt();
        a[j * k + j] = l_jj;
        for i in (j + 1)..k {
            let mut s = a[i * k + j];
            for p in 0..j {
                s -= a[i * k + p] * a[j * k + p];
            }
            a[i * k + j] = s / l_jj;
        }
    }
    let mut z = rhs.to_vec();
    for i in 0..k {
        for p in 0..i {
            z[i] -= a[i * k + p] * z[p];
        }
        z[i] /= a[i * k + i];
    }
    for i in (0..k).rev() {
        for p in (i + 1)..k {
            z[i] -= a[p * k + i] * z[p];
        }
        z[i] /= a[i * k + i];
    }
    Some(z)
}

/// Fitted model in scaled feature space.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogitModel {
    pub scaler: StandardScaler,
    pub coef: Vec<f64>,
    pub intercept: f64,
    pub n_iter: usize,
}

impl LogitModel {
    /// Weights and bias such that `w · x_raw + b` equals the scaled-space score.
    pub fn raw_space_weights(&self) -> (Vec<f64>, f64) {
        let w_raw = self.coef.iter().zip(&self.scaler.scale).map(|(w, s)| w / s).collect();
        let shift: f64 = self
            .coef
            .iter()
            .zip(&self.scaler.mean)
            .zip(&self.scaler.scale)
            .map(|((w, m), s)| w * m / s)
            .sum();
        (w_raw, self.intercept - shift)
    }

    pub fn decision_function(&self, row: &[f64]) -> f64 {
        dot(&self.scaler.transform_row(row), &self.coef) + self.intercept
    }

    /// Probability of the positive class for each raw feature row.
    pub fn predict_proba(&self, x: &[Vec<f64>]) -> Vec<f64> {
        x.iter().map(|r| sigmoid(self.decision_function(r))).collect()
    }
}

/// Standardise `x` and fit the logistic model.
pub fn fit_logit(x: &[Vec<f64>], y: &[f64], cfg: &TrainConfig) -> Result<LogitModel, TrainError> {
    let first = y.first().copied().unwrap_or(0.0);
    if y.iter().all(|&v| v == first) {
        return Err(TrainError::SingleClass(first));
    }

    let scaler = StandardScaler::fit(x);
    let xs = scaler.transform(x);
    let k = scaler.mean.len() + 1;
    let mut theta = vec![0.0; k];
    let mut f = objective(&xs, y, &theta, cfg.c);
    let mut n_iter = 0;
    let mut converged = false;

    while n_iter < cfg.max_iter {
        let (g, mut h) = gradient_hessian(&xs, y, &theta, cfg.c);
        let gmax = g.iter().fold(0.0_f64, |m, v| m.max(v.abs()));
        if gmax <= cfg.tol {
            converged = true;
            break;
        }
        // Intercept row has no ridge term.
        h[k * k - 1] += 1e-10;
        let step = cholesky_solve(h, &g).ok_or(TrainError::Singular)?;
        let decrease = dot(&g, &step);

        let mut t = 1.0;
        let mut next = theta.clone();
        let mut f_next = f;
        for _ in 0..60 {
            for ((n, th), s) in next.iter_mut().zip(&theta).zip(&step) {
                *n = th - t * s;
            }
            f_next = objective(&xs, y, &next, cfg.c);
            if f_next <= f - 1e-4 * t * decrease {
                break;
            }
            t *= 0.5;
        }
        n_iter += 1;
        let moved = step.iter().fold(0.0_f64, |m, s| m.max((t * s).abs()));
        theta = next;
        if f - f_next <= f64::EPSILON * f.abs().max(1.0) && moved <= cfg.tol {
            f = f_next;
            converged = true;
            break;
        }
        f = f_next;
    }

    if converged {
        debug!(n_iter, objective = f, "logistic fit converged");
    } else {
        warn!(max_iter = cfg.max_iter, objective = f, "logistic fit did not converge");
    }
    let intercept = theta[k - 1];
    theta.truncate(k - 1);
    Ok(LogitModel {
        scaler,
        coef: theta,
        intercept,
        n_iter,
    })
}

// ── Training entry points ────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct TrainResult {
    pub model: LogitModel,
    pub w_raw: Vec<f64>,
    pub b_raw: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainInfo {
    pub train_n: usize,
    pub train_pos_rate: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_year: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_n: Option<usize>,
}

/// Fit on the rows of `train_years`; count the rows of `test_year` if given.
pub fn train_from_table(
    table: &FeatureTable,
    train_years: &[i32],
    test_year: Option<i32>,
    cfg: &TrainConfig,
) -> Result<(TrainResult, TrainInfo), TrainError> {
    let features = feature_cols();
    table.check_features(&features)?;
    let year_col = table.column(T_YEAR);
    if year_col.is_none() || table.column(LABEL_BAND).is_none() {
        return Err(TrainError::MissingMetadata);
    }

    let in_train: &dyn Fn(i32) -> bool = &|t| train_years.contains(&t);
    let (x, y) = table.xy(&features, Some(in_train))?;
    if x.is_empty() {
        return Err(TrainError::NoRows {
            requested: train_years.to_vec(),
            available: table.years(),
        });
    }

    let model = fit_logit(&x, &y, cfg)?;
    let (w_raw, b_raw) = model.raw_space_weights();

    let train_n = y.len();
    let train_pos_rate = y.iter().sum::<f64>() / train_n as f64;
    let test_n = match (test_year, year_col) {
        (Some(ty), Some(j)) => Some(table.rows.iter().filter(|r| year_of(r[j]) == Some(ty)).count()),
        _ => None,
    };
    info!(train_n, train_pos_rate, n_iter = model.n_iter, "logistic model trained");

    Ok((
        TrainResult { model, w_raw, b_raw },
        TrainInfo {
            train_n,
            train_pos_rate,
            test_year,
            test_n,
        },
    ))
}

pub fn train_from_csv(
    path: &Path,
    train_years: &[i32],
    test_year: Option<i32>,
    cfg: &TrainConfig,
) -> Result<(TrainResult, TrainInfo), TrainError> {
    let table = FeatureTable::read_csv(path)?;
    train_from_table(&table, train_years, test_year, cfg)
}
