use crate::config::FlowParams;
use crate::extract::PartialSample;
use tracing::debug;

// Sampled pressure converted to discharge
#[derive(Debug, Clone, PartialEq)]
pub struct FlowSample {
    pub station_id: String,
    pub station_name: String,
    pub mapped_i: i64,
    pub mapped_j: i64,
    pub slope: f64,
    pub timestep: i64,
    pub pressure: f64,
    pub flow_cms: f64,
    pub flow_cfs: f64,
}

/// Manning-type overland flow estimate from surface pressure head.
#[derive(Debug, Clone, Copy)]
pub struct FlowComputer {
    params: FlowParams,
}

impl FlowComputer {
    pub fn new(params: FlowParams) -> Self {
        FlowComputer { params }
    }

    /// `flow_cms = (resolution / n) * sqrt(slope) * pressure^(5/3) / 3600`.
    /// Negative pressure gives NaN here; see [`normalize_undefined`].
    pub fn compute_flow(&self, sample: PartialSample) -> FlowSample {
        let p = &self.params;
        let flow_cms =
            (p.resolution / p.mannings_n) * sample.slope.sqrt() * pow_5_3(sample.pressure) / 3600.0;
        let flow_cfs = flow_cms * p.cms_to_cfs;

        FlowSample {
            station_id: sample.station_id,
            station_name: sample.station_name,
            mapped_i: sample.mapped_i,
            mapped_j: sample.mapped_j,
            slope: sample.slope,
            timestep: sample.timestep,
            pressure: sample.pressure,
            flow_cms,
            flow_cfs,
        }
    }

    /// Computes every sample, then zero-fills undefined values in one pass.
    pub fn compute_all(&self, samples: Vec<PartialSample>) -> Vec<FlowSample> {
        let mut flows: Vec<FlowSample> =
            samples.into_iter().map(|s| self.compute_flow(s)).collect();
        let filled = normalize_undefined(&mut flows);
        debug!(samples = flows.len(), filled, "computed flows");
        flows
    }
}

#[inline(always)]
fn pow_5_3(x: f64) -> f64 {
    x.powf(5.0 / 3.0)
}

/// Replaces every non-finite numeric field with `0.0`. Returns how many
/// samples were touched.
pub fn normalize_undefined(samples: &mut [FlowSample]) -> usize {
    let mut touched = 0;
    for sample in samples.iter_mut() {
        let mut hit = false;
        for value in [
            &mut sample.slope,
            &mut sample.pressure,
            &mut sample.flow_cms,
            &mut sample.flow_cfs,
        ] {
            if !value.is_finite() {
                *value = 0.0;
                hit = true;
            }
        }
        if hit {
            touched += 1;
        }
    }
    touched
}
