use crate::gauges::GaugeRecord;
use crate::grid::Grid;
use tracing::debug;

pub fn slope_magnitude(slope_x: f64, slope_y: f64) -> f64 {
    (slope_x * slope_x + slope_y * slope_y).sqrt()
}

/// Attaches `sqrt(sx^2 + sy^2)` sampled at each gauge cell. Cells missing
/// from a slope grid contribute NaN, which later zero-fills the flow.
pub fn attach_slope(gauges: Vec<GaugeRecord>, slope_x: &Grid, slope_y: &Grid) -> Vec<GaugeRecord> {
    gauges
        .into_iter()
        .map(|gauge| {
            let sx = slope_x
                .sample(0, gauge.mapped_j, gauge.mapped_i)
                .unwrap_or(f64::NAN);
            let sy = slope_y
                .sample(0, gauge.mapped_j, gauge.mapped_i)
                .unwrap_or(f64::NAN);
            let slope = slope_magnitude(sx, sy);
            debug!(station = %gauge.station_id, sx, sy, slope, "gauge slope");
            gauge.with_slope(slope)
        })
        .collect()
}
