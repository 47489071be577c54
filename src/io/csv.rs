use crate::config::{GaugeColumns, OutputVerbosity};
use crate::error::{ExtractError, ExtractResult};
use crate::flow::FlowSample;
use crate::gauges::ReferenceGauge;
use chrono::{Days, NaiveDate};
use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

// Positions of the required columns in the gauge table header
struct GaugeColumnIndex {
    station_id: usize,
    station_name: usize,
    grid_i: usize,
    grid_j: usize,
}

impl GaugeColumnIndex {
    fn locate(headers: &StringRecord, columns: &GaugeColumns, path: &Path) -> ExtractResult<Self> {
        let find = |name: &str| {
            headers
                .iter()
                .position(|h| h == name)
                .ok_or_else(|| ExtractError::MissingGaugeColumn {
                    path: path.to_path_buf(),
                    column: name.to_string(),
                })
        };
        Ok(GaugeColumnIndex {
            station_id: find(&columns.station_id)?,
            station_name: find(&columns.station_name)?,
            grid_i: find(&columns.grid_i)?,
            grid_j: find(&columns.grid_j)?,
        })
    }
}

/// Grid coordinates are sometimes exported as `"15.0"`.
fn parse_grid_coord(field: &str) -> Option<i64> {
    let field = field.trim();
    if let Ok(v) = field.parse::<i64>() {
        return Some(v);
    }
    let v = field.parse::<f64>().ok()?;
    (v.is_finite() && v.fract() == 0.0).then_some(v as i64)
}

impl ReferenceGauge {
    fn from_record(record: &StringRecord, idx: &GaugeColumnIndex) -> ExtractResult<Self> {
        let line = record.position().map(|p| p.line()).unwrap_or_default();
        let field = |i: usize| {
            record.get(i).ok_or_else(|| ExtractError::InvalidGaugeRecord {
                line,
                reason: format!("missing field {}", i),
            })
        };
        let coord = |i: usize| -> ExtractResult<i64> {
            let raw = field(i)?;
            parse_grid_coord(raw).ok_or_else(|| ExtractError::InvalidGaugeRecord {
                line,
                reason: format!("grid coordinate {:?} is not an integer", raw),
            })
        };

        Ok(ReferenceGauge {
            station_id: field(idx.station_id)?.trim().to_string(),
            station_name: field(idx.station_name)?.trim().to_string(),
            geo_i: coord(idx.grid_i)?,
            geo_j: coord(idx.grid_j)?,
        })
    }
}

/// Reads the comma-separated gauge reference table. A station id listed more
/// than once keeps its first row.
pub fn load_gauge_table(
    path: &Path,
    columns: &GaugeColumns,
) -> ExtractResult<Vec<ReferenceGauge>> {
    let file = File::open(path).map_err(|e| ExtractError::io(path, e))?;
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .delimiter(b',')
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(BufReader::new(file));

    let table_err = |source: csv::Error| ExtractError::GaugeTable {
        path: path.to_path_buf(),
        source,
    };

    let idx = GaugeColumnIndex::locate(rdr.headers().map_err(table_err)?, columns, path)?;
    let mut gauges = Vec::new();
    let mut seen = HashSet::new();
    for result in rdr.records() {
        let record = result.map_err(table_err)?;
        let gauge = ReferenceGauge::from_record(&record, &idx)?;
        if !seen.insert(gauge.station_id.clone()) {
            warn!(
                station = %gauge.station_id,
                name = %gauge.station_name,
                line = record.position().map(|p| p.line()).unwrap_or_default(),
                "duplicate station id in gauge table, keeping first row"
            );
            continue;
        }
        gauges.push(gauge);
    }

    info!(path = ?path, gauges = gauges.len(), "loaded gauge reference table");
    Ok(gauges)
}

// One output row; pressure and slope are only present in verbose output
#[derive(Debug, Serialize)]
struct GaugeRow<'a> {
    #[serde(rename = "STAID")]
    station_id: &'a str,
    #[serde(rename = "STANAME")]
    station_name: &'a str,
    timestep: String,
    flow_cms: f64,
    flow_cfs: f64,
    mapped_i: i64,
    mapped_j: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pressure: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    slope: Option<f64>,
}

/// Timestep label: the integer itself, or `start + timestep` days.
pub fn format_timestep(timestep: i64, start_date: Option<NaiveDate>) -> String {
    let Some(start) = start_date else {
        return timestep.to_string();
    };
    let shifted = if timestep >= 0 {
        start.checked_add_days(Days::new(timestep as u64))
    } else {
        start.checked_sub_days(Days::new(timestep.unsigned_abs()))
    };
    match shifted {
        Some(date) => date.format("%Y-%m-%d").to_string(),
        None => timestep.to_string(),
    }
}

/// Replaces whitespace and path separators so the result is a single file name.
pub fn file_safe(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_whitespace() || c == '/' || c == '\\' {
                '_'
            } else {
                c
            }
        })
        .collect()
}

pub fn station_title(station_id: &str, station_name: &str) -> String {
    format!("Gauge {} {}", station_id, station_name)
}

pub fn station_file_stem(station_id: &str, station_name: &str) -> String {
    file_safe(&station_title(station_id, station_name))
}

/// Samples per `(station_id, station_name)`, each group sorted by timestep.
pub fn group_by_station(samples: &[FlowSample]) -> BTreeMap<(&str, &str), Vec<&FlowSample>> {
    let mut groups: BTreeMap<(&str, &str), Vec<&FlowSample>> = BTreeMap::new();
    for sample in samples {
        groups
            .entry((sample.station_id.as_str(), sample.station_name.as_str()))
            .or_default()
            .push(sample);
    }
    for group in groups.values_mut() {
        group.sort_by_key(|s| s.timestep);
    }
    groups
}

/// Writes one tab-separated file per station into `out_dir`.
pub fn write_csv(
    samples: &[FlowSample],
    out_dir: &Path,
    verbosity: OutputVerbosity,
    start_date: Option<NaiveDate>,
) -> ExtractResult<Vec<PathBuf>> {
    let groups = group_by_station(samples);
    if groups.is_empty() {
        return Ok(Vec::new());
    }
    fs::create_dir_all(out_dir).map_err(|e| ExtractError::io(out_dir, e))?;

    let verbose = verbosity == OutputVerbosity::Verbose;
    let mut written = Vec::with_capacity(groups.len());
    for ((station_id, station_name), group) in groups {
        let path = out_dir.join(format!("{}.csv", station_file_stem(station_id, station_name)));
        let csv_err = |source: csv::Error| ExtractError::CsvOutput {
            path: path.clone(),
            source,
        };

        let mut wtr = WriterBuilder::new()
            .has_headers(true)
            .delimiter(b'\t')
            .terminator(csv::Terminator::Any(b'\n'))
            .from_path(&path)
            .map_err(csv_err)?;
        for sample in group {
            wtr.serialize(GaugeRow {
                station_id,
                station_name,
                timestep: format_timestep(sample.timestep, start_date),
                flow_cms: sample.flow_cms,
                flow_cfs: sample.flow_cfs,
                mapped_i: sample.mapped_i,
                mapped_j: sample.mapped_j,
                pressure: verbose.then_some(sample.pressure),
                slope: verbose.then_some(sample.slope),
            })
            .map_err(csv_err)?;
        }
        wtr.flush().map_err(|e| ExtractError::io(&path, e))?;

        debug!(path = ?path, "wrote station series");
        written.push(path);
    }

    info!(files = written.len(), dir = ?out_dir, "wrote gauge CSV files");
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(id: &str, name: &str, timestep: i64, flow_cms: f64) -> FlowSample {
        FlowSample {
            station_id: id.to_string(),
            station_name: name.to_string(),
            mapped_i: 4,
            mapped_j: 5,
            slope: 0.5,
            timestep,
            pressure: 0.25,
            flow_cms,
            flow_cfs: flow_cms * 2.0,
        }
    }

    #[test]
    fn loads_gauge_table_with_extra_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gauges.csv");
        fs::write(
            &path,
            "OBJECTID,STAID,STANAME,Final_i,Final_j,DRAIN_SQKM\n\
             1,01013500,FISH RIVER NEAR FORT KENT,15,16.0,2253.0\n\
             2,01021470, Bog Brook ,3,4,\n",
        )
        .unwrap();

        let gauges = load_gauge_table(&path, &GaugeColumns::new()).unwrap();
        assert_eq!(gauges.len(), 2);
        assert_eq!(gauges[0].station_id, "01013500");
        assert_eq!(gauges[0].station_name, "FISH RIVER NEAR FORT KENT");
        assert_eq!((gauges[0].geo_i, gauges[0].geo_j), (15, 16));
        assert_eq!(gauges[1].station_name, "Bog Brook");
    }

    #[test]
    fn custom_column_names() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gauges.csv");
        fs::write(&path, "id,name,x,y\nG1,Upper,7,8\n").unwrap();
        let columns = GaugeColumns {
            station_id: "id".to_string(),
            station_name: "name".to_string(),
            grid_i: "x".to_string(),
            grid_j: "y".to_string(),
        };
        let gauges = load_gauge_table(&path, &columns).unwrap();
        assert_eq!((gauges[0].geo_i, gauges[0].geo_j), (7, 8));
    }

    #[test]
    fn missing_column_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gauges.csv");
        fs::write(&path, "STAID,STANAME,Final_i\n1,A,2\n").unwrap();
        let err = load_gauge_table(&path, &GaugeColumns::new()).unwrap_err();
        assert!(
            matches!(err, ExtractError::MissingGaugeColumn { column, .. } if column == "Final_j")
        );
    }

    #[test]
    fn repeated_station_id_keeps_first_row() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gauges.csv");
        fs::write(
            &path,
            "STAID,STANAME,Final_i,Final_j
             G1,Up,13,22
             G2,Down,14,22
             G1,Up,13,22
             G1,Renamed,5,6
",
        )
        .unwrap();

        let gauges = load_gauge_table(&path, &GaugeColumns::new()).unwrap();
        let ids: Vec<_> = gauges.iter().map(|g| g.station_id.as_str()).collect();
        assert_eq!(ids, vec!["G1", "G2"]);
        assert_eq!(gauges[0].station_name, "Up");
        assert_eq!((gauges[0].geo_i, gauges[0].geo_j), (13, 22));
    }

    #[test]
    fn fractional_coordinate_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gauges.csv");
        fs::write(&path, "STAID,STANAME,Final_i,Final_j\n1,A,2.5,3\n").unwrap();
        let err = load_gauge_table(&path, &GaugeColumns::new()).unwrap_err();
        assert!(matches!(err, ExtractError::InvalidGaugeRecord { .. }));
    }

    #[test]
    fn timestep_labels() {
        let start = NaiveDate::from_ymd_opt(2003, 12, 30);
        assert_eq!(format_timestep(7, None), "7");
        assert_eq!(format_timestep(0, start), "2003-12-30");
        assert_eq!(format_timestep(3, start), "2004-01-02");
    }

    #[test]
    fn file_names_come_from_station_identity() {
        assert_eq!(
            station_file_stem("09380000", "Colorado River at Lees Ferry"),
            "Gauge_09380000_Colorado_River_at_Lees_Ferry"
        );
        assert_eq!(station_file_stem("1", "A/B"), "Gauge_1_A_B");
    }

    #[test]
    fn groups_never_mix_stations() {
        let samples = vec![
            sample("2", "B", 3, 1.0),
            sample("1", "A", 2, 1.0),
            sample("2", "B", 1, 1.0),
            sample("1", "A", 1, 1.0),
        ];
        let groups = group_by_station(&samples);
        assert_eq!(groups.len(), 2);
        for ((id, _), group) in &groups {
            assert!(group.iter().all(|s| s.station_id == *id));
            assert!(group.windows(2).all(|w| w[0].timestep < w[1].timestep));
        }
    }

    #[test]
    fn writes_sorted_verbose_file() {
        let dir = tempfile::tempdir().unwrap();
        let samples = vec![sample("01", "Big Creek", 10, 1.5), sample("01", "Big Creek", 2, 0.0)];
        let written = write_csv(&samples, dir.path(), OutputVerbosity::Verbose, None).unwrap();
        assert_eq!(written, vec![dir.path().join("Gauge_01_Big_Creek.csv")]);

        let text = fs::read_to_string(&written[0]).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines[0],
            "STAID\tSTANAME\ttimestep\tflow_cms\tflow_cfs\tmapped_i\tmapped_j\tpressure\tslope"
        );
        assert_eq!(lines[1], "01\tBig Creek\t2\t0.0\t0.0\t4\t5\t0.25\t0.5");
        assert_eq!(lines[2], "01\tBig Creek\t10\t1.5\t3.0\t4\t5\t0.25\t0.5");
    }

    #[test]
    fn standard_output_omits_trailing_columns() {
        let dir = tempfile::tempdir().unwrap();
        let samples = vec![sample("7", "X", 0, 1.0)];
        let start = NaiveDate::from_ymd_opt(2020, 1, 1);
        let written = write_csv(&samples, dir.path(), OutputVerbosity::Standard, start).unwrap();
        let text = fs::read_to_string(&written[0]).unwrap();
        assert_eq!(
            text,
            "STAID\tSTANAME\ttimestep\tflow_cms\tflow_cfs\tmapped_i\tmapped_j\n\
             7\tX\t2020-01-01\t1.0\t2.0\t4\t5\n"
        );
    }

    #[test]
    fn nothing_written_without_samples() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("csv");
        let written = write_csv(&[], &out, OutputVerbosity::Verbose, None).unwrap();
        assert!(written.is_empty());
        assert!(!out.exists());
    }
}
