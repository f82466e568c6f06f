/// Fragment tool: turns a weights JSON file into the Earth Engine Code Editor
/// fragment (and full URL) read by the risk viewer script.
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use defrisk_core::weights::{gee_fragment, load_logit_weights, FragmentParams, BASE_GEE_EDITOR_URL};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum PrintMode {
    Fragment,
    Url,
    Both,
}

#[derive(Parser, Debug)]
#[command(name = "gee_url", about = "Generate the Code Editor fragment / URL for a weights file")]
struct Args {
    /// Path to JSON weights file (e.g. models/logit_weights.json)
    #[arg(long)]
    weights: PathBuf,

    #[arg(long, default_value = "AEF + frontier menagerie (66D)")]
    title: String,

    #[arg(long, default_value = "")]
    tag: String,

    #[arg(long, default_value = "2022")]
    year: i32,

    #[arg(long, default_value = "-9.5", allow_hyphen_values = true)]
    lat: f64,

    #[arg(long, default_value = "-62.5", allow_hyphen_values = true)]
    lon: f64,

    #[arg(long, default_value = "9")]
    zoom: u32,

    /// Lower end of the score palette
    #[arg(long, default_value = "-10", allow_hyphen_values = true)]
    lo: f64,

    /// Upper end of the score palette
    #[arg(long, default_value = "10", allow_hyphen_values = true)]
    hi: f64,

    #[arg(long = "roadKm", default_value = "100")]
    road_km: f64,

    #[arg(long = "nfMaxKm", default_value = "30")]
    nf_max_km: f64,

    /// First Sentinel-2 composite month
    #[arg(long, default_value = "7")]
    s2m1: u32,

    /// Last Sentinel-2 composite month
    #[arg(long, default_value = "9")]
    s2m2: u32,

    /// Maximum cloud percentage for Sentinel-2 scenes
    #[arg(long, default_value = "60")]
    s2cloud: f64,

    /// Optional comma list, e.g. "2020,2021,2022,2023"
    #[arg(long = "s2Years")]
    s2_years: Option<String>,

    #[arg(long, value_enum, default_value = "both")]
    print: PrintMode,
}

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    init_logging();
    let args = Args::parse();

    let (w, b) = load_logit_weights(&args.weights)
        .with_context(|| format!("Cannot load weights from {}", args.weights.display()))?;
    debug!(n = w.len(), bias = ?b, "weights loaded");

    let params = FragmentParams {
        title: args.title,
        tag: args.tag,
        year: args.year,
        lat: args.lat,
        lon: args.lon,
        zoom: args.zoom,
        lo: args.lo,
        hi: args.hi,
        road_km: args.road_km,
        nf_max_km: args.nf_max_km,
        s2m1: args.s2m1,
        s2m2: args.s2m2,
        s2cloud: args.s2cloud,
        s2_years: args.s2_years,
    };
    let frag = gee_fragment(&params, &w, b);

    if matches!(args.print, PrintMode::Fragment | PrintMode::Both) {
        println!("\n=== GEE FRAGMENT ===");
        println!("{frag}");
    }
    if matches!(args.print, PrintMode::Url | PrintMode::Both) {
        println!("\n=== FULL CODE EDITOR URL ===");
        println!("{BASE_GEE_EDITOR_URL}{frag}");
    }
    Ok(())
}
