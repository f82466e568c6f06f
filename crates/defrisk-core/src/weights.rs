//! Weight files and Code Editor URL fragments.
//!
//! A weight file is JSON `{"w": [...], "b": ...}` in raw feature space. The
//! fragment is a `;`-separated list of `key=value` pairs consumed by the
//! Earth Engine viewer script; the weight list is always last.

use std::fs;
use std::path::{Path, PathBuf};

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};

use crate::train::N_FEATURES;

pub const BASE_GEE_EDITOR_URL: &str = "https://code.earthengine.google.com/#";

/// Characters kept literal in fragment values besides ASCII alphanumerics.
const FRAGMENT_VALUE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b',');

#[derive(Debug, thiserror::Error)]
pub enum WeightsError {
    #[error("cannot read {path}: {source}")]
    Read { path: PathBuf, source: std::io::Error },
    #[error("cannot write {path}: {source}")]
    Write { path: PathBuf, source: std::io::Error },
    #[error("invalid weights JSON in {path}: {source}")]
    Json { path: PathBuf, source: serde_json::Error },
    #[error("missing key 'w' in weights file: {0}")]
    MissingW(PathBuf),
    #[error("fragment segment {0:?} is not key=value")]
    Segment(String),
    #[error("fragment value {key}={value:?} is not a number")]
    Number { key: String, value: String },
    #[error("fragment has no weights")]
    NoWeights,
    #[error("fragment carries {found} weights, expected {expected}")]
    WeightCount { expected: usize, found: usize },
}

/// On-disk weight file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightFile {
    pub w: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub b: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_cols: Option<Vec<String>>,
}

impl WeightFile {
    pub fn new(w: Vec<f64>, b: Option<f64>) -> Self {
        Self {
            w,
            b,
            feature_cols: None,
        }
    }

    /// Pretty JSON with a trailing newline; parent directories are created.
    pub fn save(&self, path: &Path) -> Result<(), WeightsError> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|source| WeightsError::Write {
                path: dir.to_path_buf(),
                source,
            })?;
        }
        let mut text = serde_json::to_string_pretty(self).map_err(|source| WeightsError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        text.push('\n');
        fs::write(path, text).map_err(|source| WeightsError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn load(path: &Path) -> Result<Self, WeightsError> {
        let text = fs::read_to_string(path).map_err(|source| WeightsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let json_err = |source| WeightsError::Json {
            path: path.to_path_buf(),
            source,
        };
        let value: serde_json::Value = serde_json::from_str(&text).map_err(json_err)?;
        if value.get("w").is_none() {
            return Err(WeightsError::MissingW(path.to_path_buf()));
        }
        serde_json::from_value(value).map_err(json_err)
    }
}

pub fn save_logit_weights(w: &[f64], b: Option<f64>, path: &Path) -> Result<(), WeightsError> {
    WeightFile::new(w.to_vec(), b).save(path)
}

pub fn load_logit_weights(path: &Path) -> Result<(Vec<f64>, Option<f64>), WeightsError> {
    let file = WeightFile::load(path)?;
    Ok((file.w, file.b))
}

// ── Number formatting ────────────────────────────────────────────────────────

/// `%.10g`: ten significant digits, trailing zeros dropped, scientific
/// notation below 1e-4 and from 1e10 up.
pub fn format_g10(v: f64) -> String {
    const PRECISION: i32 = 10;
    if v.is_nan() {
        return "nan".into();
    }
    if v.is_infinite() {
        return if v > 0.0 { "inf".into() } else { "-inf".into() };
    }
    if v == 0.0 {
        return if v.is_sign_negative() { "-0".into() } else { "0".into() };
    }

    let sci = format!("{:.*e}", (PRECISION - 1) as usize, v);
    let (mantissa, exp) = sci.split_once('e').unwrap_or((sci.as_str(), "0"));
    let exp: i32 = exp.parse().unwrap_or(0);

    if exp < -4 || exp >= PRECISION {
        let sign = if exp < 0 { '-' } else { '+' };
        format!("{}e{}{:02}", strip_zeros(mantissa), sign, exp.abs())
    } else {
        let decimals = (PRECISION - 1 - exp).max(0) as usize;
        strip_zeros(&format!("{v:.decimals$}")).to_string()
    }
}

fn strip_zeros(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}

/// Comma-joined weights for the `w=` parameter.
pub fn weights_csv(w: &[f64]) -> String {
    w.iter().map(|&x| format_g10(x)).collect::<Vec<_>>().join(",")
}

/// `b=…;w=…`, or `w=…` without a bias.
pub fn gee_params_string(w: &[f64], b: Option<f64>) -> String {
    match b {
        Some(b) => format!("b={};w={}", format_g10(b), weights_csv(w)),
        None => format!("w={}", weights_csv(w)),
    }
}

// ── Fragment ─────────────────────────────────────────────────────────────────

/// Viewer parameters placed before the weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FragmentParams {
    pub title: String,
    pub tag: String,
    pub year: i32,
    pub lat: f64,
    pub lon: f64,
    pub zoom: u32,
    /// Score range of the display palette.
    pub lo: f64,
    pub hi: f64,
    pub road_km: f64,
    pub nf_max_km: f64,
    pub s2m1: u32,
    pub s2m2: u32,
    pub s2cloud: f64,
    /// Comma list of Sentinel-2 composite years; the viewer picks its own when absent.
    pub s2_years: Option<String>,
}

impl Default for FragmentParams {
    fn default() -> Self {
        Self {
            title: "AEF + frontier menagerie (66D)".into(),
            tag: String::new(),
            year: 2022,
            lat: -9.5,
            lon: -62.5,
            zoom: 9,
            lo: -10.0,
            hi: 10.0,
            road_km: 100.0,
            nf_max_km: 30.0,
            s2m1: 7,
            s2m2: 9,
            s2cloud: 60.0,
            s2_years: None,
        }
    }
}

fn escape(value: &str) -> String {
    utf8_percent_encode(value, FRAGMENT_VALUE).to_string()
}

/// Full fragment with a trailing `;`. Weights come last.
pub fn gee_fragment(params: &FragmentParams, w: &[f64], b: Option<f64>) -> String {
    let mut parts: Vec<String> = Vec::new();
    let mut text = |key: &str, value: &str| {
        if !value.is_empty() {
            parts.push(format!("{key}={}", escape(value)));
        }
    };

    text("title", &params.title);
    text("tag", &params.tag);
    for (key, v) in [
        ("year", f64::from(params.year)),
        ("lat", params.lat),
        ("lon", params.lon),
        ("zoom", f64::from(params.zoom)),
        ("lo", params.lo),
        ("hi", params.hi),
        ("roadKm", params.road_km),
        ("nfMaxKm", params.nf_max_km),
        ("s2m1", f64::from(params.s2m1)),
        ("s2m2", f64::from(params.s2m2)),
        ("s2cloud", params.s2cloud),
    ] {
        text(key, &format_g10(v));
    }
    if let Some(years) = params.s2_years.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        text("s2Years", years);
    }

    parts.push(gee_params_string(w, b));
    parts.join(";") + ";"
}

pub fn gee_code_editor_url(params: &FragmentParams, w: &[f64], b: Option<f64>) -> String {
    format!("{BASE_GEE_EDITOR_URL}{}", gee_fragment(params, w, b))
}

/// A fragment read back into its parts.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedFragment {
    /// Non-weight parameters in fragment order, values unescaped.
    pub params: Vec<(String, String)>,
    pub b: Option<f64>,
    pub w: Vec<f64>,
}

impl ParsedFragment {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }
}

fn parse_number(key: &str, value: &str) -> Result<f64, WeightsError> {
    value.trim().parse().map_err(|_| WeightsError::Number {
        key: key.to_string(),
        value: value.to_string(),
    })
}

/// Parse a fragment (or full Code Editor URL). The weight list must hold
/// exactly one value per model feature.
pub fn parse_fragment(fragment: &str) -> Result<ParsedFragment, WeightsError> {
    let body = fragment.split_once('#').map_or(fragment, |(_, f)| f);
    let mut params = Vec::new();
    let mut b = None;
    let mut w = None;

    for segment in body.split(';').filter(|s| !s.trim().is_empty()) {
        let (key, raw) = segment
            .split_once('=')
            .ok_or_else(|| WeightsError::Segment(segment.to_string()))?;
        let value = percent_decode_str(raw).decode_utf8_lossy().into_owned();
        match key {
            "b" => b = Some(parse_number(key, &value)?),
            "w" => {
                let list = value
                    .split(',')
                    .filter(|s| !s.trim().is_empty())
                    .map(|s| parse_number(key, s))
                    .collect::<Result<Vec<_>, _>>()?;
                w = Some(list);
            }
            _ => params.push((key.to_string(), value)),
        }
    }

    let w = w.ok_or(WeightsError::NoWeights)?;
    if w.len() != N_FEATURES {
        return Err(WeightsError::WeightCount {
            expected: N_FEATURES,
            found: w.len(),
        });
    }
    Ok(ParsedFragment { params, b, w })
}
