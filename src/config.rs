use chrono::NaiveDate;
use std::path::PathBuf;

// Column name mapping for the gauge reference table
#[derive(Debug, Clone)]
pub struct GaugeColumns {
    pub station_id: String,
    pub station_name: String,
    pub grid_i: String,
    pub grid_j: String,
}

impl GaugeColumns {
    pub fn new() -> Self {
        GaugeColumns {
            station_id: "STAID".to_string(),
            station_name: "STANAME".to_string(),
            grid_i: "Final_i".to_string(),
            grid_j: "Final_j".to_string(),
        }
    }
}

impl Default for GaugeColumns {
    fn default() -> Self {
        Self::new()
    }
}

/// How the y-bounds read from the extents file relate to gauge row indices.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum YConvention {
    /// Use the extents as written.
    Raw,
    /// Rewrite `y_lo, y_hi` as `height - y_hi, height - y_lo`.
    FlipWithConstant { height: i64 },
}

pub const CONUS1_HEIGHT: i64 = 1888;

impl Default for YConvention {
    fn default() -> Self {
        YConvention::FlipWithConstant {
            height: CONUS1_HEIGHT,
        }
    }
}

// Output column set
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutputVerbosity {
    Standard,
    /// Also writes the sampled pressure and slope.
    Verbose,
}

/// What to do when a single pressure snapshot cannot be read.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SnapshotFailurePolicy {
    Abort,
    Skip,
}

// Image format of the per-station hydrographs
#[derive(Debug, Clone, Copy, PartialEq, Default, clap::ValueEnum)]
pub enum HydrographFormat {
    #[default]
    Png,
    Svg,
}

// Physical parameters of the flow formula
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlowParams {
    /// Grid cell width in metres.
    pub resolution: f64,
    pub mannings_n: f64,
    pub cms_to_cfs: f64,
}

impl Default for FlowParams {
    fn default() -> Self {
        FlowParams {
            resolution: 1000.0,
            mannings_n: 5.52e-6,
            cms_to_cfs: 35.3147,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExtractionConfig {
    pub flow: FlowParams,
    pub gauge_table: PathBuf,
    pub gauge_columns: GaugeColumns,
    pub y_convention: YConvention,
    pub flip_grid_rows: bool,
    pub verbosity: OutputVerbosity,
    pub snapshot_policy: SnapshotFailurePolicy,
    pub start_date: Option<NaiveDate>,
    pub render_hydrographs: bool,
    pub jobs: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        ExtractionConfig {
            flow: FlowParams::default(),
            gauge_table: PathBuf::from("CONUS1_to_USGS.csv"),
            gauge_columns: GaugeColumns::new(),
            y_convention: YConvention::default(),
            flip_grid_rows: true,
            verbosity: OutputVerbosity::Verbose,
            snapshot_policy: SnapshotFailurePolicy::Abort,
            start_date: None,
            render_hydrographs: false,
            jobs: num_cpus::get(),
        }
    }
}
