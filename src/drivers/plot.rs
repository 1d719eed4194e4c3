use std::io::Cursor;
use std::sync::mpsc::Sender;
use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb};
use plotters::prelude::LineSeries;
use plotters::prelude::*;
use crate::drivers::buffer::SampleRing;
use crate::drivers::decoder::display_values;
use crate::drivers::error::CaptureError;
#[derive(Clone, Debug, PartialEq)]
pub struct PlotSeries {
    pub label: String,
    pub xs: Vec<f64>,
    pub ys: Vec<f64>,
}
/// Everything a scrolling chart needs to redraw after one block.
#[derive(Clone, Debug, PartialEq)]
pub struct PlotUpdate {
    pub x_range: (f64, f64),
    pub y_range: (f64, f64),
    pub series: Vec<PlotSeries>,
}
/// Fixed y bounds that fit the stacking offsets of `display_values`.
pub fn y_bounds(channel_count: usize) -> (f64, f64) {
    (0.0, 2.0 * channel_count as f64 + 2.0)
}
/// Build the plot for the newest `visible_span_secs` of the ring. The x axis
/// always spans the full visible window ending at the newest row.
pub fn render_window(ring: &SampleRing, visible_span_secs: f64, labels: &[String]) -> PlotUpdate {
    let rows = ring.range_last_seconds(visible_span_secs);
    let channel_count = labels.len();
    let x_range = match rows.last() {
        Some(newest) => (newest.timestamp - visible_span_secs, newest.timestamp),
        None => (0.0, visible_span_secs),
    };
    let mut series: Vec<PlotSeries> = labels
        .iter()
        .map(|label| PlotSeries {
            label: label.clone(),
            xs: Vec::with_capacity(rows.len()),
            ys: Vec::with_capacity(rows.len()),
        })
        .collect();
    for row in &rows {
        for (trace, y) in series.iter_mut().zip(display_values(&row.values)) {
            trace.xs.push(row.timestamp);
            trace.ys.push(y);
        }
    }
    PlotUpdate {
        x_range,
        y_range: y_bounds(channel_count),
        series,
    }
}
/// Consumer of per-block plot updates (a UI thread, a snapshot writer, ...).
pub trait PlotSink: Send {
    fn update(&mut self, update: PlotUpdate) -> Result<(), CaptureError>;
}
impl PlotSink for Sender<PlotUpdate> {
    fn update(&mut self, update: PlotUpdate) -> Result<(), CaptureError> {
        self.send(update)
            .map_err(|_| CaptureError::sink("plot", "plot receiver hung up"))
    }
}
/// Keeps only the most recent update.
#[derive(Default)]
pub struct LatestPlot {
    latest: Option<PlotUpdate>,
    updates: usize,
}
impl LatestPlot {
    pub fn latest(&self) -> Option<&PlotUpdate> {
        self.latest.as_ref()
    }
    pub fn updates(&self) -> usize {
        self.updates
    }
}
impl PlotSink for LatestPlot {
    fn update(&mut self, update: PlotUpdate) -> Result<(), CaptureError> {
        self.latest = Some(update);
        self.updates += 1;
        Ok(())
    }
}
#[derive(Clone, Debug)]
pub struct PlotStyle {
    pub width: u32,
    pub height: u32,
    pub background: RGBColor,
    pub palette: Vec<RGBColor>,
}
impl Default for PlotStyle {
    fn default() -> Self {
        Self {
            width: 900,
            height: 400,
            background: RGBColor(10, 10, 10),
            palette: vec![BLUE, RED, GREEN, CYAN, MAGENTA, YELLOW, WHITE],
        }
    }
}
pub fn render_plot_png(update: &PlotUpdate, style: PlotStyle) -> Result<Vec<u8>, CaptureError> {
    if update.series.iter().all(|s| s.xs.is_empty()) {
        return Err(CaptureError::Plot("plot update has no samples".into()));
    }
    let mut buffer = vec![0u8; (style.width * style.height * 3) as usize];
    {
        let root = BitMapBackend::with_buffer(&mut buffer, (style.width, style.height))
            .into_drawing_area();
        root.fill(&style.background)?;
        let mut chart = ChartBuilder::on(&root)
            .margin(10)
            .caption("Acquisition", ("sans-serif", 20).into_font().color(&WHITE))
            .set_label_area_size(LabelAreaPosition::Left, 45)
            .set_label_area_size(LabelAreaPosition::Bottom, 40)
            .build_cartesian_2d(
                update.x_range.0..update.x_range.1,
                update.y_range.0..update.y_range.1,
            )?;
        chart
            .configure_mesh()
            .light_line_style(&WHITE.mix(0.1))
            .draw()?;
        for (idx, trace) in update.series.iter().enumerate() {
            let color = style.palette[idx % style.palette.len()];
            let points = trace.xs.iter().copied().zip(trace.ys.iter().copied());
            chart
                .draw_series(LineSeries::new(points, &color))?
                .label(trace.label.clone())
                .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &color));
        }
        chart
            .configure_series_labels()
            .border_style(&WHITE.mix(0.2))
            .background_style(&style.background)
            .draw()?;
        root.present()?;
    }
    encode_png(&buffer, style.width, style.height)
}
fn encode_png(buffer: &[u8], width: u32, height: u32) -> Result<Vec<u8>, CaptureError> {
    let image = ImageBuffer::<Rgb<u8>, _>::from_raw(width, height, buffer.to_vec())
        .ok_or_else(|| CaptureError::Plot("failed to allocate image buffer".into()))?;
    let mut output = Vec::new();
    let dynamic = DynamicImage::ImageRgb8(image);
    dynamic.write_to(&mut Cursor::new(&mut output), ImageFormat::Png)?;
    Ok(output)
}
#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::source::Sample;
    fn labels() -> Vec<String> {
        vec!["AI0".into(), "AI1".into(), "Encoder".into()]
    }
    fn ring() -> SampleRing {
        let mut ring = SampleRing::with_capacity(100.0, 500).unwrap();
        let rows: Vec<Sample> = (0..300)
            .map(|i| Sample::new(i as f64 / 100.0, vec![0.2, 0.8, 1.5]))
            .collect();
        ring.ingest(&rows);
        ring
    }
    #[test]
    fn window_covers_visible_span_with_display_values() {
        let update = render_window(&ring(), 1.0, &labels());
        assert_eq!(update.y_range, (0.0, 8.0));
        assert!((update.x_range.1 - 2.99).abs() < 1e-9);
        assert!((update.x_range.0 - 1.99).abs() < 1e-9);
        assert_eq!(update.series.len(), 3);
        for trace in &update.series {
            assert_eq!(trace.xs.len(), 100);
            assert_eq!(trace.ys.len(), 100);
        }
        assert_eq!(update.series[0].ys[0], 6.0);
        assert_eq!(update.series[1].ys[0], 5.0);
        assert_eq!(update.series[2].ys[0], 3.5);
    }
    #[test]
    fn empty_ring_yields_empty_series() {
        let ring = SampleRing::with_capacity(100.0, 10).unwrap();
        let update = render_window(&ring, 2.0, &labels());
        assert_eq!(update.x_range, (0.0, 2.0));
        assert!(update.series.iter().all(|s| s.xs.is_empty()));
        assert!(render_plot_png(&update, PlotStyle::default()).is_err());
    }
    #[test]
    fn latest_plot_keeps_last_update() {
        let mut sink = LatestPlot::default();
        sink.update(render_window(&ring(), 0.5, &labels())).unwrap();
        sink.update(render_window(&ring(), 1.0, &labels())).unwrap();
        assert_eq!(sink.updates(), 2);
        assert_eq!(sink.latest().unwrap().series[0].xs.len(), 100);
    }
}
