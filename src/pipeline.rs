use crate::config::ExtractionConfig;
use crate::domain::DomainDescriptor;
use crate::error::ExtractResult;
use crate::extract::{TimeSeriesExtractor, discover_snapshots};
use crate::flow::FlowComputer;
use crate::gauges::build_active_gauges;
use crate::grid::{GridReader, load_grid};
use crate::io::csv::{load_gauge_table, write_csv};
use crate::io::hydrograph::{HydrographSink, write_hydrographs};
use crate::slope::attach_slope;
use indicatif::ProgressBar;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const SLOPE_X_KEY: &str = "TopoSlopesX.FileName";
pub const SLOPE_Y_KEY: &str = "TopoSlopesY.FileName";
pub const CSV_SUBDIR: &str = "csv";
pub const HYDROGRAPH_SUBDIR: &str = "hydrographs";

#[derive(Debug, Default)]
pub struct RunSummary {
    pub run_name: String,
    pub stations: usize,
    pub samples: usize,
    pub snapshots_used: usize,
    pub snapshots_skipped: usize,
    pub csv_files: Vec<PathBuf>,
    pub hydrographs: usize,
    pub chart_failures: usize,
}

/// Extracts flow at every active gauge of the run in `run_dir` and writes
/// one series per gauge under `out_dir`.
///
/// All samples are held in memory until written, so memory grows with
/// gauges x snapshots. A run with no active gauges writes nothing.
pub fn generate_flow_at_gauges<R: GridReader + ?Sized>(
    run_dir: &Path,
    out_dir: &Path,
    config: &ExtractionConfig,
    reader: &R,
    sink: &dyn HydrographSink,
    progress: &ProgressBar,
) -> ExtractResult<RunSummary> {
    let domain = DomainDescriptor::from_run_dir(run_dir, config.y_convention)?;
    debug!(config = ?domain.config_path(), "reading run configuration");
    let mut summary = RunSummary {
        run_name: domain.run_name().to_string(),
        ..RunSummary::default()
    };

    let mask = load_grid(reader, &domain.mask_path(), config.flip_grid_rows)?;
    let slope_x_path = domain.resolve(&domain.lookup_key(SLOPE_X_KEY)?);
    let slope_y_path = domain.resolve(&domain.lookup_key(SLOPE_Y_KEY)?);

    let reference = load_gauge_table(&config.gauge_table, &config.gauge_columns)?;
    let active = build_active_gauges(
        &reference,
        domain.lower_left(),
        domain.upper_right(),
        &mask,
    );
    drop(mask);

    if active.is_empty() {
        info!(run = %summary.run_name, "no active gauges in domain, nothing to write");
        return Ok(summary);
    }
    summary.stations = active.len();

    let gauges = {
        let slope_x = load_grid(reader, &slope_x_path, config.flip_grid_rows)?;
        let slope_y = load_grid(reader, &slope_y_path, config.flip_grid_rows)?;
        attach_slope(active, &slope_x, &slope_y)
    };

    let snapshots = discover_snapshots(domain.run_dir(), domain.run_name())?;
    progress.set_length(snapshots.len() as u64);
    let extractor = TimeSeriesExtractor::new(
        reader,
        config.flip_grid_rows,
        config.snapshot_policy,
        config.jobs,
    );
    let extraction = extractor.extract_samples(&gauges, &snapshots, progress)?;
    progress.finish_and_clear();
    summary.snapshots_used = extraction.snapshots_used;
    summary.snapshots_skipped = extraction.skipped.len();

    let flows = FlowComputer::new(config.flow).compute_all(extraction.samples);
    summary.samples = flows.len();

    summary.csv_files = write_csv(
        &flows,
        &out_dir.join(CSV_SUBDIR),
        config.verbosity,
        config.start_date,
    )?;

    if config.render_hydrographs {
        let report = write_hydrographs(&flows, &out_dir.join(HYDROGRAPH_SUBDIR), sink);
        summary.hydrographs = report.written.len();
        summary.chart_failures = report.failed;
    }

    Ok(summary)
}
