/// Sample export tool: draws class-balanced training points for a range of
/// years plus one unbiased forest-only evaluation set, and submits both as
/// CSV export jobs.
///
/// Imagery is read from a local catalogue directory:
///   <catalog>/embedding/<year>.json, <catalog>/landcover/<year>.json, <catalog>/roads.json
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use defrisk_core::export::{export_table, feature_selectors, DriveFolder, ExportTask};
use defrisk_core::frontier::FrontierParams;
use defrisk_core::labels::LabelPolicy;
use defrisk_core::region::Region;
use defrisk_core::sampling::{stratified_samples_for_year, unbiased_forest_samples, SamplingConfig};
use defrisk_core::source::{ImagerySource, LocalCatalog};
use defrisk_core::table::{SampleTable, YearList};
use tracing::info;
use tracing_subscriber::EnvFilter;

// ── CLI ──────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "export_samples",
    about = "Export balanced training and unbiased forest sample tables as CSV"
)]
struct Args {
    /// Region of interest: xmin,ymin,xmax,ymax (lon/lat)
    #[arg(long, allow_hyphen_values = true)]
    bbox: Region,

    /// Sampling scale in metres
    #[arg(long, default_value = "500")]
    scale: f64,

    #[arg(long, default_value = "42")]
    seed: i64,

    /// Comma list of training years
    #[arg(long = "train_years", default_value = "2018,2019,2020")]
    train_years: YearList,

    /// Positive (loss) samples per training year
    #[arg(long = "n_pos", default_value = "5000")]
    n_pos: usize,

    /// Negative (persisting forest) samples per training year
    #[arg(long = "n_neg", default_value = "5000")]
    n_neg: usize,

    #[arg(long = "unbiased_year", default_value = "2022")]
    unbiased_year: i32,

    /// Forest pixels in the unbiased evaluation sample
    #[arg(long = "n_unbiased", default_value = "30000")]
    n_unbiased: usize,

    /// Require forest in both t-1 and t for a pixel to be labelled
    #[arg(long = "use_stable_label")]
    use_stable_label: bool,

    /// Optional sub-folder of the export root
    #[arg(long = "drive_folder")]
    drive_folder: Option<String>,

    /// Filename prefix for exports
    #[arg(long, default_value = "defrisk_v1")]
    prefix: String,

    /// Local imagery catalogue
    #[arg(long, default_value = "data/catalog")]
    catalog: PathBuf,

    /// Export root directory
    #[arg(long = "drive_root", default_value = "data/exports")]
    drive_root: PathBuf,

    /// Neighbourhood (pixels) searched for the nearest non-forest pixel
    #[arg(long = "neighborhood_px", default_value = "256")]
    neighborhood_px: u32,

    /// Road search radius in metres
    #[arg(long = "road_radius_m", default_value = "100000")]
    road_radius_m: f64,
}

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();
}

fn report(task: &ExportTask) {
    println!("Started: {} | task id: {}", task.description(), task.id());
}

fn main() -> Result<()> {
    init_logging();
    let args = Args::parse();

    let years = &args.train_years.0;
    let (Some(&first), Some(&last)) = (years.first(), years.last()) else {
        bail!("--train_years must list at least one year");
    };

    let catalog = LocalCatalog::new(&args.catalog);
    let target = DriveFolder::new(&args.drive_root);
    let cfg = SamplingConfig {
        scale: args.scale,
        seed: args.seed,
        policy: LabelPolicy::from_stable_flag(args.use_stable_label),
        frontier: FrontierParams {
            road_search_radius_m: args.road_radius_m,
            neighborhood_px: args.neighborhood_px,
            ..FrontierParams::default()
        },
    };

    // Column order comes from the first year's embedding bands.
    let bands = catalog
        .embedding_for_year(first, &args.bbox)
        .with_context(|| format!("Cannot read embedding for {first} from {}", args.catalog.display()))?
        .band_names();
    let train_selectors = feature_selectors(&bands, false);
    let unbiased_selectors = feature_selectors(&bands, true);

    let mut train = SampleTable::default();
    for &year in years {
        let t = stratified_samples_for_year(&catalog, year, &args.bbox, args.n_neg, args.n_pos, &cfg)
            .with_context(|| format!("Sampling failed for {year}"))?;
        train = train.merge(t);
    }
    info!(rows = train.len(), years = ?years, "training table assembled");

    let folder = args.drive_folder.as_deref();
    let desc = format!("{}_train_{first}_{last}", args.prefix);
    let fname = format!("{}_train_balanced_{first}_{last}", args.prefix);
    let train_task = export_table(&target, train, &desc, &fname, &train_selectors, folder)
        .with_context(|| format!("Cannot start export {desc}"))?;
    report(&train_task);

    let unbiased = unbiased_forest_samples(&catalog, args.unbiased_year, &args.bbox, args.n_unbiased, &cfg)
        .with_context(|| format!("Unbiased sampling failed for {}", args.unbiased_year))?;
    let desc_u = format!("{}_unbiased_{}", args.prefix, args.unbiased_year);
    let fname_u = format!("{}_unbiased_forest_eval_{}", args.prefix, args.unbiased_year);
    let unbiased_task = export_table(&target, unbiased, &desc_u, &fname_u, &unbiased_selectors, folder)
        .with_context(|| format!("Cannot start export {desc_u}"))?;
    report(&unbiased_task);

    println!("\nAll export tasks started.");

    // Jobs run in this process; keep it alive until they have written their files.
    for task in [train_task, unbiased_task] {
        let id = task.id().to_string();
        let path = task.wait().with_context(|| format!("Export task {id} failed"))?;
        info!(%id, path = %path.display(), "export finished");
    }
    Ok(())
}
