use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod cli;
mod config;
mod domain;
mod error;
mod extract;
mod flow;
mod gauges;
mod grid;
mod io;
mod pipeline;
mod slope;

use cli::get_args;
use io::hydrograph::sink_for;
use io::pfb::PfbReader;
use pipeline::generate_flow_at_gauges;

fn main() -> Result<()> {
    let args = get_args();

    let default_level = if args.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();

    info!(
        run_dir = ?args.pf_outputs,
        out_dir = ?args.out_dir,
        gauges = ?args.config.gauge_table,
        "extracting flow at gauges"
    );

    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} snapshots ({eta})")?
            .progress_chars("#>-"),
    );

    let sink = sink_for(args.hydrograph_format, args.chart_font.clone());
    let summary = generate_flow_at_gauges(
        &args.pf_outputs,
        &args.out_dir,
        &args.config,
        &PfbReader,
        sink.as_ref(),
        &pb,
    )
    .with_context(|| format!("Failed to extract flow from {:?}", args.pf_outputs))?;

    info!(
        run = %summary.run_name,
        stations = summary.stations,
        samples = summary.samples,
        snapshots = summary.snapshots_used,
        skipped = summary.snapshots_skipped,
        csv_files = summary.csv_files.len(),
        hydrographs = summary.hydrographs,
        chart_failures = summary.chart_failures,
        "done"
    );
    Ok(())
}
