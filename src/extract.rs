use crate::config::SnapshotFailurePolicy;
use crate::error::{ExtractError, ExtractResult};
use crate::gauges::GaugeRecord;
use crate::grid::{GridReader, load_grid};
use indicatif::ProgressBar;
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const PRESSURE_INFIX: &str = ".out.press.";
pub const GRID_EXTENSION: &str = ".pfb";

// One pressure output file and the timestep embedded in its name
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub timestep: i64,
    pub path: PathBuf,
}

// Surface pressure at a gauge for one snapshot, before flow conversion
#[derive(Debug, Clone, PartialEq)]
pub struct PartialSample {
    pub station_id: String,
    pub station_name: String,
    pub mapped_i: i64,
    pub mapped_j: i64,
    pub slope: f64,
    pub timestep: i64,
    pub pressure: f64,
}

#[derive(Debug, Default)]
pub struct Extraction {
    pub samples: Vec<PartialSample>,
    pub snapshots_used: usize,
    pub skipped: Vec<PathBuf>,
}

/// `<run>.out.press.00042.pfb` -> `42`: the second-to-last `.` field.
pub fn timestep_from_name(path: &Path) -> Option<i64> {
    let name = path.file_name()?.to_str()?;
    let mut fields = name.rsplit('.');
    fields.next()?;
    fields.next()?.parse().ok()
}

/// Orders snapshot files by numeric timestep, rejecting unparsable names and
/// repeated timesteps.
pub fn order_snapshots(paths: Vec<PathBuf>) -> ExtractResult<Vec<Snapshot>> {
    let mut snapshots = paths
        .into_iter()
        .map(|path| match timestep_from_name(&path) {
            Some(timestep) => Ok(Snapshot { timestep, path }),
            None => Err(ExtractError::MalformedSnapshotName(path)),
        })
        .collect::<ExtractResult<Vec<_>>>()?;

    snapshots.sort_by(|a, b| a.timestep.cmp(&b.timestep).then_with(|| a.path.cmp(&b.path)));

    if let Some(pair) = snapshots.windows(2).find(|w| w[0].timestep == w[1].timestep) {
        return Err(ExtractError::DuplicateTimestep {
            timestep: pair[0].timestep,
            first: pair[0].path.clone(),
            second: pair[1].path.clone(),
        });
    }
    Ok(snapshots)
}

/// Finds `<run>.out.press.<timestep>.pfb` files in `run_dir`.
pub fn discover_snapshots(run_dir: &Path, run_name: &str) -> ExtractResult<Vec<Snapshot>> {
    let prefix = format!("{}{}", run_name, PRESSURE_INFIX);
    let mut paths = Vec::new();
    for entry in fs::read_dir(run_dir).map_err(|e| ExtractError::io(run_dir, e))? {
        let entry = entry.map_err(|e| ExtractError::io(run_dir, e))?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        let timestep_field = name
            .strip_prefix(&prefix)
            .and_then(|rest| rest.strip_suffix(GRID_EXTENSION));
        if timestep_field.is_some_and(|field| !field.is_empty()) {
            paths.push(entry.path());
        }
    }
    let snapshots = order_snapshots(paths)?;
    debug!(count = snapshots.len(), run = run_name, "discovered pressure snapshots");
    Ok(snapshots)
}

/// Samples the surface layer of each pressure snapshot at every gauge.
pub struct TimeSeriesExtractor<'a, R: GridReader + ?Sized> {
    reader: &'a R,
    flip_rows: bool,
    policy: SnapshotFailurePolicy,
    jobs: usize,
}

impl<'a, R: GridReader + ?Sized> TimeSeriesExtractor<'a, R> {
    pub fn new(reader: &'a R, flip_rows: bool, policy: SnapshotFailurePolicy, jobs: usize) -> Self {
        TimeSeriesExtractor {
            reader,
            flip_rows,
            policy,
            jobs: jobs.max(1),
        }
    }

    fn sample_snapshot(
        &self,
        gauges: &[GaugeRecord],
        snapshot: &Snapshot,
    ) -> ExtractResult<Vec<PartialSample>> {
        let grid = load_grid(self.reader, &snapshot.path, self.flip_rows)?;
        let surface = grid.surface_layer().ok_or_else(|| ExtractError::GridReadError {
            path: snapshot.path.clone(),
            reason: "grid has no layers".to_string(),
        })?;

        Ok(gauges
            .iter()
            .map(|gauge| {
                let pressure = grid
                    .sample(surface, gauge.mapped_j, gauge.mapped_i)
                    .unwrap_or_else(|| {
                        warn!(
                            station = %gauge.station_id,
                            path = ?snapshot.path,
                            "gauge cell outside pressure grid"
                        );
                        f64::NAN
                    });
                PartialSample {
                    station_id: gauge.station_id.clone(),
                    station_name: gauge.station_name.clone(),
                    mapped_i: gauge.mapped_i,
                    mapped_j: gauge.mapped_j,
                    // gauges without a slope produce no flow
                    slope: gauge.slope.unwrap_or(0.0),
                    timestep: snapshot.timestep,
                    pressure,
                }
            })
            .collect())
    }

    /// Snapshots are read in parallel; the merged samples are sorted by
    /// station then timestep regardless of completion order.
    pub fn extract_samples(
        &self,
        gauges: &[GaugeRecord],
        snapshots: &[Snapshot],
        progress: &ProgressBar,
    ) -> ExtractResult<Extraction> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.jobs)
            .build()?;

        let per_snapshot: Vec<(&Snapshot, ExtractResult<Vec<PartialSample>>)> = pool.install(|| {
            snapshots
                .par_iter()
                .map(|snapshot| {
                    let result = self.sample_snapshot(gauges, snapshot);
                    progress.inc(1);
                    (snapshot, result)
                })
                .collect()
        });

        let mut extraction = Extraction::default();
        for (snapshot, result) in per_snapshot {
            match result {
                Ok(samples) => {
                    extraction.samples.extend(samples);
                    extraction.snapshots_used += 1;
                }
                Err(
                    e @ (ExtractError::GridFileMissing(_) | ExtractError::GridReadError { .. }),
                ) if self.policy == SnapshotFailurePolicy::Skip => {
                    warn!(path = ?snapshot.path, error = %e, "skipping unreadable snapshot");
                    extraction.skipped.push(snapshot.path.clone());
                }
                Err(e) => return Err(e),
            }
        }

        extraction.samples.sort_by(|a, b| {
            (&a.station_id, &a.station_name, a.timestep).cmp(&(
                &b.station_id,
                &b.station_name,
                b.timestep,
            ))
        });
        Ok(extraction)
    }
}
