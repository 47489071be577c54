use crate::config::HydrographFormat;
use crate::flow::FlowSample;
use crate::io::csv::{group_by_station, station_file_stem, station_title};
use plotters::coord::Shift;
use plotters::prelude::*;
use plotters::style::register_font;
use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, info, warn};

/// Renders a `(timestep, flow_cfs)` series to an image file.
pub trait HydrographSink {
    fn extension(&self) -> &str;

    fn render(
        &self,
        title: &str,
        series: &[(i64, f64)],
        path: &Path,
    ) -> Result<(), Box<dyn Error>>;
}

// Tried in order when no chart font is given
const FONT_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu-sans-fonts/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/usr/share/fonts/liberation-sans/LiberationSans-Regular.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "/Library/Fonts/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

static CHART_FONT: OnceLock<Option<PathBuf>> = OnceLock::new();

/// Registers the TrueType font used for chart text, `preferred` first, then
/// the usual system locations. Only the first call has an effect.
pub fn install_chart_font(preferred: Option<&Path>) -> Option<&'static Path> {
    CHART_FONT
        .get_or_init(|| {
            let candidates = preferred
                .map(Path::to_path_buf)
                .into_iter()
                .chain(FONT_CANDIDATES.iter().map(PathBuf::from));
            for path in candidates {
                match register_font_file(&path) {
                    Ok(()) => {
                        debug!(font = ?path, "registered chart font");
                        return Some(path);
                    }
                    Err(e) => debug!(font = ?path, error = %e, "chart font unusable"),
                }
            }
            warn!("no TrueType font found, hydrographs cannot be rendered");
            None
        })
        .as_deref()
}

fn register_font_file(path: &Path) -> Result<(), Box<dyn Error>> {
    let bytes = fs::read(path)?;
    // plotters keeps registered fonts for the life of the process
    let bytes: &'static [u8] = Box::leak(bytes.into_boxed_slice());
    register_font("sans-serif", FontStyle::Normal, bytes)
        .map_err(|_| format!("{:?} is not a TrueType font", path))?;
    Ok(())
}

fn draw_hydrograph<DB>(
    root: DrawingArea<DB, Shift>,
    title: &str,
    series: &[(i64, f64)],
) -> Result<(), Box<dyn Error>>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    let x_min = series.iter().map(|p| p.0).min().unwrap_or(0);
    let x_max = series.iter().map(|p| p.0).max().unwrap_or(0).max(x_min + 1);
    let y_max = series.iter().map(|p| p.1).fold(0.0f64, f64::max);
    let y_max = if y_max > 0.0 { y_max * 1.05 } else { 1.0 };

    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 28))
        .margin(20)
        .set_label_area_size(LabelAreaPosition::Left, 90)
        .set_label_area_size(LabelAreaPosition::Bottom, 50)
        .build_cartesian_2d(x_min..x_max, 0.0..y_max)?;

    chart
        .configure_mesh()
        .x_desc("timestep")
        .y_desc("CFS")
        .draw()?;

    chart
        .draw_series(LineSeries::new(series.iter().copied(), &BLUE))?
        .label("ParFlow Simulated Flow")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &BLUE));

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()?;

    root.present()?;
    Ok(())
}

/// Raster hydrograph.
#[derive(Debug, Clone)]
pub struct PngHydrograph {
    pub width: u32,
    pub height: u32,
    pub font: Option<PathBuf>,
}

impl Default for PngHydrograph {
    fn default() -> Self {
        PngHydrograph {
            width: 1600,
            height: 800,
            font: None,
        }
    }
}

impl HydrographSink for PngHydrograph {
    fn extension(&self) -> &str {
        "png"
    }

    fn render(
        &self,
        title: &str,
        series: &[(i64, f64)],
        path: &Path,
    ) -> Result<(), Box<dyn Error>> {
        install_chart_font(self.font.as_deref()).ok_or("no font available for chart text")?;
        let root = BitMapBackend::new(path, (self.width, self.height)).into_drawing_area();
        draw_hydrograph(root, title, series)
    }
}

#[derive(Debug, Clone)]
pub struct SvgHydrograph {
    pub width: u32,
    pub height: u32,
    pub font: Option<PathBuf>,
}

impl Default for SvgHydrograph {
    fn default() -> Self {
        SvgHydrograph {
            width: 1600,
            height: 800,
            font: None,
        }
    }
}

impl HydrographSink for SvgHydrograph {
    fn extension(&self) -> &str {
        "svg"
    }

    // Text layout still needs a registered font
    fn render(
        &self,
        title: &str,
        series: &[(i64, f64)],
        path: &Path,
    ) -> Result<(), Box<dyn Error>> {
        install_chart_font(self.font.as_deref()).ok_or("no font available for chart text")?;
        let root = SVGBackend::new(path, (self.width, self.height)).into_drawing_area();
        draw_hydrograph(root, title, series)
    }
}

pub fn sink_for(format: HydrographFormat, font: Option<PathBuf>) -> Box<dyn HydrographSink> {
    match format {
        HydrographFormat::Png => Box::new(PngHydrograph {
            font,
            ..PngHydrograph::default()
        }),
        HydrographFormat::Svg => Box::new(SvgHydrograph {
            font,
            ..SvgHydrograph::default()
        }),
    }
}

#[derive(Debug, Default)]
pub struct HydrographReport {
    pub written: Vec<PathBuf>,
    pub failed: usize,
}

/// Renders one hydrograph per station. Rendering failures are logged and
/// counted, never returned.
pub fn write_hydrographs<S: HydrographSink + ?Sized>(
    samples: &[FlowSample],
    out_dir: &Path,
    sink: &S,
) -> HydrographReport {
    let mut report = HydrographReport::default();
    let groups = group_by_station(samples);
    if groups.is_empty() {
        return report;
    }
    if let Err(e) = fs::create_dir_all(out_dir) {
        warn!(dir = ?out_dir, error = %e, "cannot create hydrograph directory");
        report.failed = groups.len();
        return report;
    }

    for ((station_id, station_name), group) in groups {
        let title = station_title(station_id, station_name);
        let path = out_dir.join(format!(
            "{}.{}",
            station_file_stem(station_id, station_name),
            sink.extension()
        ));
        let series: Vec<(i64, f64)> = group.iter().map(|s| (s.timestep, s.flow_cfs)).collect();

        match sink.render(&title, &series, &path) {
            Ok(()) => report.written.push(path),
            Err(e) => {
                warn!(station = station_id, error = %e, "hydrograph rendering failed");
                report.failed += 1;
            }
        }
    }

    info!(
        written = report.written.len(),
        failed = report.failed,
        "rendered hydrographs"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    fn sample(id: &str, timestep: i64, flow_cfs: f64) -> FlowSample {
        FlowSample {
            station_id: id.to_string(),
            station_name: "Lost River".to_string(),
            mapped_i: 0,
            mapped_j: 0,
            slope: 0.1,
            timestep,
            pressure: 0.1,
            flow_cms: flow_cfs / 35.3147,
            flow_cfs,
        }
    }

    struct RecordingSink {
        calls: RefCell<Vec<(String, Vec<(i64, f64)>)>>,
        fail_for: Option<&'static str>,
    }

    impl HydrographSink for RecordingSink {
        fn extension(&self) -> &str {
            "png"
        }

        fn render(
            &self,
            title: &str,
            series: &[(i64, f64)],
            _path: &Path,
        ) -> Result<(), Box<dyn Error>> {
            if self.fail_for.is_some_and(|id| title.contains(id)) {
                return Err("renderer unavailable".into());
            }
            self.calls.borrow_mut().push((title.to_string(), series.to_vec()));
            Ok(())
        }
    }

    #[test]
    fn passes_ordered_series_and_title() {
        let dir = tempfile::tempdir().unwrap();
        let sink = RecordingSink {
            calls: RefCell::new(Vec::new()),
            fail_for: None,
        };
        let samples = vec![sample("42", 3, 30.0), sample("42", 1, 10.0)];
        let report = write_hydrographs(&samples, dir.path(), &sink);

        assert_eq!(report.failed, 0);
        assert_eq!(report.written, vec![dir.path().join("Gauge_42_Lost_River.png")]);
        let calls = sink.calls.borrow();
        assert_eq!(calls[0].0, "Gauge 42 Lost River");
        assert_eq!(calls[0].1, vec![(1, 10.0), (3, 30.0)]);
    }

    #[test]
    fn failures_are_counted_not_raised() {
        let dir = tempfile::tempdir().unwrap();
        let sink = RecordingSink {
            calls: RefCell::new(Vec::new()),
            fail_for: Some("Gauge 1 "),
        };
        let samples = vec![sample("1", 1, 1.0), sample("2", 1, 2.0)];
        let report = write_hydrographs(&samples, dir.path(), &sink);
        assert_eq!(report.failed, 1);
        assert_eq!(report.written.len(), 1);
    }

    fn series_samples() -> Vec<FlowSample> {
        vec![sample("5", 0, 0.0), sample("5", 1, 12.5), sample("5", 2, 7.0)]
    }

    #[test]
    fn png_is_the_default_format() {
        let sink = sink_for(HydrographFormat::default(), None);
        assert_eq!(sink.extension(), "png");
        assert_eq!(sink_for(HydrographFormat::Svg, None).extension(), "svg");
    }

    #[test]
    fn png_file_is_produced() {
        let dir = tempfile::tempdir().unwrap();
        let report = write_hydrographs(&series_samples(), dir.path(), &PngHydrograph::default());
        if install_chart_font(None).is_none() {
            // without any font every chart is a counted failure
            assert_eq!(report.failed, 1);
            assert!(report.written.is_empty());
            return;
        }
        assert_eq!(report.failed, 0);
        assert_eq!(report.written, vec![dir.path().join("Gauge_5_Lost_River.png")]);
        let bytes = fs::read(&report.written[0]).unwrap();
        assert_eq!(&bytes[..8], b"\x89PNG\r\n\x1a\n");
    }

    #[test]
    fn svg_file_is_produced() {
        let dir = tempfile::tempdir().unwrap();
        let report = write_hydrographs(&series_samples(), dir.path(), &SvgHydrograph::default());
        if install_chart_font(None).is_none() {
            assert_eq!(report.failed, 1);
            return;
        }
        assert_eq!(report.failed, 0);
        let svg = fs::read_to_string(&report.written[0]).unwrap();
        assert!(svg.contains("<svg"));
        assert!(svg.contains("Gauge 5 Lost River"));
    }
}
