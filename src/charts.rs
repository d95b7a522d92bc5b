//! One time-series chart per plottable attribute, stored as
//! `<plots_dir>/<attribute>.png`.

use std::path::{Path, PathBuf};

use anyhow::Result;
use plotters::prelude::*;
use tracing::{info, warn};

use crate::model::{ChartFile, EntryKind};
use crate::stats::{StatsTable, numeric_value};
use crate::util::ensure_directory;

/// 10x6 inches at 300 dpi.
const CHART_SIZE: (u32, u32) = (3000, 1800);

const DOMAIN_COLOR: RGBColor = RGBColor(0xf8, 0x76, 0x6d);
const HOST_COLOR: RGBColor = RGBColor(0x1f, 0x77, 0xb4);

#[derive(Debug, Clone)]
pub struct ChartOptions {
    pub plots_dir: PathBuf,
    /// Keep an existing image instead of rendering again. Existing images are
    /// not compared against the data.
    pub reuse_existing: bool,
}

pub fn chart_file_name(attribute: &str) -> String {
    format!("{attribute}.png")
}

pub fn chart_path(plots_dir: &Path, attribute: &str) -> PathBuf {
    plots_dir.join(chart_file_name(attribute))
}

fn source_color(source: EntryKind) -> RGBColor {
    match source {
        EntryKind::Domain => DOMAIN_COLOR,
        EntryKind::Host => HOST_COLOR,
    }
}

/// Render or reuse a chart for every attribute. Rendering errors abort.
pub fn render_charts(
    stats: &StatsTable,
    attributes: &[String],
    options: &ChartOptions,
) -> Result<Vec<ChartFile>> {
    ensure_directory(&options.plots_dir)?;
    let releases = stats.releases();
    let mut charts = Vec::with_capacity(attributes.len());

    for attribute in attributes {
        let path = chart_path(&options.plots_dir, attribute);

        if options.reuse_existing && path.exists() {
            info!(path = %path.display(), "using existing chart");
            charts.push(ChartFile {
                attribute: attribute.clone(),
                file_name: chart_file_name(attribute),
                reused: true,
            });
            continue;
        }

        let series = build_series(stats, &releases, attribute);
        if series.iter().all(|series| series.points.is_empty()) {
            warn!(attribute = %attribute, "no numeric values, skipping chart");
            continue;
        }

        info!(path = %path.display(), "rendering chart");
        draw_chart(&path, attribute, &releases, &series)?;
        charts.push(ChartFile {
            attribute: attribute.clone(),
            file_name: chart_file_name(attribute),
            reused: false,
        });
    }

    Ok(charts)
}

#[derive(Debug, Clone, PartialEq)]
pub struct SourceSeries {
    pub source: EntryKind,
    /// `(release index, value)` sorted by release index.
    pub points: Vec<(i32, f64)>,
}

pub fn build_series(stats: &StatsTable, releases: &[String], attribute: &str) -> Vec<SourceSeries> {
    let Some(column) = stats.column_index(attribute) else {
        return Vec::new();
    };

    EntryKind::ALL
        .iter()
        .map(|&source| {
            let mut points: Vec<(i32, f64)> = stats
                .rows
                .iter()
                .filter(|row| row.source == source)
                .filter_map(|row| {
                    let x = releases.iter().position(|release| *release == row.release)?;
                    let y = row.values.get(column)?.as_deref().and_then(numeric_value)?;
                    Some((i32::try_from(x).ok()?, y))
                })
                .collect();
            points.sort_by_key(|(x, _)| *x);
            SourceSeries { source, points }
        })
        .collect()
}

fn value_range(series: &[SourceSeries]) -> (f64, f64) {
    let (min, max) = series
        .iter()
        .flat_map(|series| series.points.iter().map(|(_, y)| *y))
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(min, max), y| {
            (min.min(y), max.max(y))
        });

    if !min.is_finite() || !max.is_finite() {
        return (0.0, 1.0);
    }

    let span = max - min;
    let pad = if span > 0.0 {
        span * 0.05
    } else {
        min.abs().max(1.0) * 0.05
    };
    (min - pad, max + pad)
}

fn draw_chart(
    path: &Path,
    attribute: &str,
    releases: &[String],
    series: &[SourceSeries],
) -> Result<()> {
    let root = BitMapBackend::new(path, CHART_SIZE).into_drawing_area();
    root.fill(&WHITE)?;

    let release_count = i32::try_from(releases.len()).unwrap_or(i32::MAX);
    let (y_min, y_max) = value_range(series);

    let mut chart = ChartBuilder::on(&root)
        .caption(attribute, ("sans-serif", 64))
        .margin(40)
        .x_label_area_size(420)
        .y_label_area_size(220)
        .build_cartesian_2d((0..release_count).into_segmented(), y_min..y_max)?;

    let release_label = |value: &SegmentValue<i32>| match value {
        SegmentValue::CenterOf(index) | SegmentValue::Exact(index) => usize::try_from(*index)
            .ok()
            .and_then(|index| releases.get(index))
            .cloned()
            .unwrap_or_default(),
        SegmentValue::Last => String::new(),
    };
    let scientific = |value: &f64| format!("{value:.1e}");

    chart
        .configure_mesh()
        .disable_x_mesh()
        .light_line_style(WHITE)
        .bold_line_style(RGBColor(0xeb, 0xeb, 0xeb))
        .x_labels(releases.len())
        .x_label_formatter(&release_label)
        .x_label_style(
            ("sans-serif", 36)
                .into_font()
                .transform(FontTransform::Rotate90),
        )
        .y_label_formatter(&scientific)
        .y_label_style(("sans-serif", 36))
        .x_desc("Release")
        .y_desc(attribute)
        .axis_desc_style(("sans-serif", 44))
        .draw()?;

    for series in series {
        let color = source_color(series.source);
        let points: Vec<(SegmentValue<i32>, f64)> = series
            .points
            .iter()
            .map(|(x, y)| (SegmentValue::CenterOf(*x), *y))
            .collect();

        chart
            .draw_series(LineSeries::new(points.clone(), color.stroke_width(4)))?
            .label(series.source.as_str())
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 40, y)], color.stroke_width(4)));

        chart.draw_series(
            points
                .into_iter()
                .map(|point| Circle::new(point, 10, color.filled())),
        )?;
    }

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::UpperLeft)
        .label_font(("sans-serif", 36))
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()?;

    root.present()?;
    Ok(())
}
