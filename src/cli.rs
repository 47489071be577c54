use crate::config::{
    CONUS1_HEIGHT, ExtractionConfig, FlowParams, GaugeColumns, HydrographFormat,
    OutputVerbosity, SnapshotFailurePolicy, YConvention,
};
use chrono::NaiveDate;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, ValueEnum)]
enum YConventionArg {
    Raw,
    FlipWithConstant,
}

/// Extract simulated streamflow at gauge sites from ParFlow outputs
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Directory holding the ParFlow run outputs
    #[arg(short = 'i', long, value_parser = existing_dir)]
    pf_outputs: PathBuf,

    /// Directory to write outputs to
    #[arg(short, long, value_parser = existing_dir)]
    out_dir: PathBuf,

    /// Simulation start date (MM-DD-YYYY); timesteps are written as days from it
    #[arg(short, long, value_parser = parse_start_date)]
    start_date: Option<NaiveDate>,

    /// Also render a hydrograph per gauge
    #[arg(short = 'p', long = "plot", alias = "print-png")]
    plot: bool,

    /// Image format of the hydrographs
    #[arg(long, value_enum, default_value_t = HydrographFormat::Png)]
    hydrograph_format: HydrographFormat,

    /// TrueType font for hydrograph text (defaults to a system sans-serif font)
    #[arg(long)]
    chart_font: Option<PathBuf>,

    /// Gauge reference table (CSV with STAID, STANAME, Final_i, Final_j)
    #[arg(short, long, default_value = "CONUS1_to_USGS.csv")]
    gauges: PathBuf,

    /// How extents y-bounds relate to gauge rows
    #[arg(long, value_enum, default_value_t = YConventionArg::FlipWithConstant)]
    y_convention: YConventionArg,

    /// Full-domain height used by the flip-with-constant convention
    #[arg(long, default_value_t = CONUS1_HEIGHT)]
    domain_height: i64,

    /// Do not reverse grid rows after reading
    #[arg(long)]
    no_flip_rows: bool,

    /// Omit the pressure and slope columns
    #[arg(long)]
    standard_columns: bool,

    /// Skip unreadable pressure snapshots instead of aborting
    #[arg(long)]
    skip_bad_snapshots: bool,

    /// Worker threads for snapshot extraction
    #[arg(short, long, default_value_t = num_cpus::get())]
    jobs: usize,

    /// Grid cell width in metres
    #[arg(long, default_value_t = FlowParams::default().resolution)]
    resolution: f64,

    /// Manning's roughness coefficient
    #[arg(long, default_value_t = FlowParams::default().mannings_n)]
    mannings_n: f64,

    /// Conversion factor from cubic metres to cubic feet per second
    #[arg(long, default_value_t = FlowParams::default().cms_to_cfs)]
    cms_to_cfs: f64,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn existing_dir(arg: &str) -> Result<PathBuf, String> {
    let path = PathBuf::from(arg);
    if path.is_dir() {
        Ok(path)
    } else {
        Err(format!("the path {} does not exist", arg))
    }
}

fn parse_start_date(arg: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(arg, "%m-%d-%Y").map_err(|e| format!("{} (expected MM-DD-YYYY)", e))
}

#[derive(Debug)]
pub struct RunArgs {
    pub pf_outputs: PathBuf,
    pub out_dir: PathBuf,
    pub config: ExtractionConfig,
    pub hydrograph_format: HydrographFormat,
    pub chart_font: Option<PathBuf>,
    pub verbose: bool,
}

impl From<Args> for RunArgs {
    fn from(args: Args) -> Self {
        let y_convention = match args.y_convention {
            YConventionArg::Raw => YConvention::Raw,
            YConventionArg::FlipWithConstant => YConvention::FlipWithConstant {
                height: args.domain_height,
            },
        };
        let config = ExtractionConfig {
            flow: FlowParams {
                resolution: args.resolution,
                mannings_n: args.mannings_n,
                cms_to_cfs: args.cms_to_cfs,
            },
            gauge_table: args.gauges,
            gauge_columns: GaugeColumns::new(),
            y_convention,
            flip_grid_rows: !args.no_flip_rows,
            verbosity: if args.standard_columns {
                OutputVerbosity::Standard
            } else {
                OutputVerbosity::Verbose
            },
            snapshot_policy: if args.skip_bad_snapshots {
                SnapshotFailurePolicy::Skip
            } else {
                SnapshotFailurePolicy::Abort
            },
            start_date: args.start_date,
            render_hydrographs: args.plot,
            jobs: args.jobs,
        };

        RunArgs {
            pf_outputs: args.pf_outputs,
            out_dir: args.out_dir,
            config,
            hydrograph_format: args.hydrograph_format,
            chart_font: args.chart_font,
            verbose: args.verbose,
        }
    }
}

pub fn get_args() -> RunArgs {
    Args::parse().into()
}
