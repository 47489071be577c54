use crate::domain::CellIndex;
use crate::grid::Grid;
use tracing::{debug, info};

// Entry of the gauge reference table, full-domain one-based coordinates
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceGauge {
    pub station_id: String,
    pub station_name: String,
    pub geo_i: i64,
    pub geo_j: i64,
}

// Gauge inside the active domain, with local zero-based cell indices
#[derive(Debug, Clone, PartialEq)]
pub struct GaugeRecord {
    pub station_id: String,
    pub station_name: String,
    pub geo_i: i64,
    pub geo_j: i64,
    pub mapped_i: i64,
    pub mapped_j: i64,
    pub slope: Option<f64>,
}

impl GaugeRecord {
    pub fn with_slope(self, slope: f64) -> Self {
        GaugeRecord {
            slope: Some(slope),
            ..self
        }
    }
}

impl ReferenceGauge {
    /// Half-open box test: lower bound inclusive, upper bound exclusive.
    pub fn within(&self, lower_left: CellIndex, upper_right: CellIndex) -> bool {
        (lower_left.x..upper_right.x).contains(&self.geo_i)
            && (lower_left.y..upper_right.y).contains(&self.geo_j)
    }

    pub fn map_into(&self, lower_left: CellIndex) -> GaugeRecord {
        GaugeRecord {
            station_id: self.station_id.clone(),
            station_name: self.station_name.clone(),
            geo_i: self.geo_i,
            geo_j: self.geo_j,
            mapped_i: self.geo_i - 1 - lower_left.x,
            mapped_j: self.geo_j - 1 - lower_left.y,
            slope: None,
        }
    }
}

/// Gauges inside the domain box whose mask cell is active (`> 0`).
pub fn build_active_gauges(
    all_gauges: &[ReferenceGauge],
    lower_left: CellIndex,
    upper_right: CellIndex,
    mask: &Grid,
) -> Vec<GaugeRecord> {
    let in_extents: Vec<GaugeRecord> = all_gauges
        .iter()
        .filter(|g| g.within(lower_left, upper_right))
        .map(|g| g.map_into(lower_left))
        .collect();

    let in_mask: Vec<GaugeRecord> = in_extents
        .iter()
        .filter(|g| match mask.sample(0, g.mapped_j, g.mapped_i) {
            Some(value) => value > 0.0,
            None => {
                debug!(
                    station = %g.station_id,
                    mapped_i = g.mapped_i,
                    mapped_j = g.mapped_j,
                    "gauge cell falls outside the mask grid"
                );
                false
            }
        })
        .cloned()
        .collect();

    info!(
        catalog = all_gauges.len(),
        in_extents = in_extents.len(),
        in_mask = in_mask.len(),
        "selected active gauges"
    );
    in_mask
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn gauge(id: &str, i: i64, j: i64) -> ReferenceGauge {
        ReferenceGauge {
            station_id: id.to_string(),
            station_name: format!("Creek {}", id),
            geo_i: i,
            geo_j: j,
        }
    }

    #[test]
    fn gauge_in_small_domain_is_mapped_and_kept() {
        let mask = Grid::filled(1, 10, 10, 1.0);
        let active = build_active_gauges(
            &[gauge("A", 15, 15)],
            CellIndex::new(10, 10),
            CellIndex::new(20, 20),
            &mask,
        );
        assert_eq!(active.len(), 1);
        assert_eq!((active[0].mapped_i, active[0].mapped_j), (4, 4));
        assert_eq!(active[0].slope, None);
    }

    #[test]
    fn upper_bound_is_exclusive() {
        let mask = Grid::filled(1, 10, 10, 1.0);
        let gauges = [gauge("edge_x", 20, 15), gauge("edge_y", 15, 20), gauge("low", 11, 11)];
        let active =
            build_active_gauges(&gauges, CellIndex::new(10, 10), CellIndex::new(20, 20), &mask);
        let ids: Vec<_> = active.iter().map(|g| g.station_id.as_str()).collect();
        assert_eq!(ids, vec!["low"]);
    }

    #[test]
    fn inactive_mask_cells_are_discarded() {
        let mut mask = Grid::filled(1, 10, 10, 1.0);
        mask.set(0, 4, 4, 0.0);
        mask.set(0, 5, 5, -1.0);
        let gauges = [gauge("off", 15, 15), gauge("neg", 16, 16), gauge("on", 17, 17)];
        let active =
            build_active_gauges(&gauges, CellIndex::new(10, 10), CellIndex::new(20, 20), &mask);
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].station_id, "on");
    }

    #[test]
    fn lower_edge_gauge_maps_outside_grid_and_is_dropped() {
        let mask = Grid::filled(1, 10, 10, 1.0);
        let active = build_active_gauges(
            &[gauge("corner", 10, 10)],
            CellIndex::new(10, 10),
            CellIndex::new(20, 20),
            &mask,
        );
        assert!(active.is_empty());
    }

    #[test]
    fn empty_domain_keeps_nothing() {
        let mask = Grid::filled(1, 10, 10, 1.0);
        let corner = CellIndex::new(10, 10);
        let gauges = [gauge("A", 10, 10), gauge("B", 15, 15)];
        let active = build_active_gauges(&gauges, corner, corner, &mask);
        assert!(active.is_empty());
    }

    proptest! {
        #[test]
        fn retained_gauges_satisfy_bounds_and_mask(
            coords in prop::collection::vec((0i64..40, 0i64..40), 0..30),
            x_lo in 0i64..20,
            y_lo in 0i64..20,
            width in 0i64..20,
            height in 0i64..20,
        ) {
            let lower_left = CellIndex::new(x_lo, y_lo);
            let upper_right = CellIndex::new(x_lo + width, y_lo + height);
            let mut mask = Grid::filled(1, height as usize, width as usize, 0.0);
            for row in 0..height as usize {
                for col in 0..width as usize {
                    mask.set(0, row, col, ((row + col) % 2) as f64);
                }
            }
            let gauges: Vec<_> = coords
                .iter()
                .enumerate()
                .map(|(n, &(i, j))| gauge(&n.to_string(), i, j))
                .collect();

            for g in build_active_gauges(&gauges, lower_left, upper_right, &mask) {
                prop_assert!(lower_left.x - 1 <= g.geo_i - 1 && g.geo_i - 1 < upper_right.x);
                prop_assert!(lower_left.y - 1 <= g.geo_j - 1 && g.geo_j - 1 < upper_right.y);
                prop_assert!((0..width).contains(&g.mapped_i));
                prop_assert!((0..height).contains(&g.mapped_j));
                prop_assert!(mask.sample(0, g.mapped_j, g.mapped_i).unwrap() > 0.0);
            }
        }
    }
}
