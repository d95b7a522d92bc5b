use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::charts::{ChartOptions, chart_path, render_charts};
use crate::cli::Cli;
use crate::html::{ReportPage, load_stylesheet, render_markdown_section, render_report};
use crate::model::{AttributeDescriptions, EntryKind};
use crate::ranks::{HttpRankSource, RankCache, RankFetcher, RankSource, TopEntriesSet};
use crate::stats::{StatsTable, load_source_table};
use crate::util::{read_text, today_local_string, write_text};

pub const DEFAULT_DATA_HOST: &str = "https://data.commoncrawl.org";

/// Input and output locations, relative to the working directory by default.
#[derive(Debug, Clone)]
pub struct ReportLayout {
    pub cache_dir: PathBuf,
    pub descriptions_path: PathBuf,
    pub description_markdown_path: PathBuf,
    pub stylesheet_path: PathBuf,
    pub docs_dir: PathBuf,
    pub data_host: String,
}

impl Default for ReportLayout {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("cache/ranks"),
            descriptions_path: PathBuf::from("attribute_descriptions.json"),
            description_markdown_path: PathBuf::from("description.md"),
            stylesheet_path: PathBuf::from("style.css"),
            docs_dir: PathBuf::from("../docs"),
            data_host: DEFAULT_DATA_HOST.to_string(),
        }
    }
}

impl ReportLayout {
    pub fn stats_path(&self, kind: EntryKind) -> PathBuf {
        self.docs_dir.join(format!("{kind}.tsv"))
    }

    pub fn plots_dir(&self) -> PathBuf {
        self.docs_dir.join("plots")
    }

    pub fn output_path(&self) -> PathBuf {
        self.docs_dir.join("index.html")
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BuildOptions {
    pub reuse_existing_charts: bool,
}

#[derive(Debug, Clone)]
pub struct BuildSummary {
    pub output_path: PathBuf,
    pub release_count: usize,
    pub plottable_count: usize,
    pub charts_rendered: usize,
    pub charts_reused: usize,
    pub fetch_failures: Vec<(EntryKind, usize)>,
}

pub fn run(cli: Cli) -> Result<()> {
    let layout = ReportLayout::default();
    let options = BuildOptions {
        reuse_existing_charts: cli.no_plots,
    };
    let source = HttpRankSource::new()?;

    let summary = build_report(&layout, options, &source)?;

    info!(
        path = %summary.output_path.display(),
        releases = summary.release_count,
        plottable = summary.plottable_count,
        charts_rendered = summary.charts_rendered,
        charts_reused = summary.charts_reused,
        failures = ?summary.fetch_failures,
        "page generated"
    );

    Ok(())
}

pub fn build_report(
    layout: &ReportLayout,
    options: BuildOptions,
    source: &dyn RankSource,
) -> Result<BuildSummary> {
    let descriptions = load_descriptions(&layout.descriptions_path)?;
    let description_html =
        render_markdown_section(&read_text(&layout.description_markdown_path)?, "Description");

    let tables = EntryKind::ALL
        .iter()
        .map(|&kind| load_source_table(&layout.stats_path(kind), kind))
        .collect::<Result<Vec<_>>>()?;
    let stats = StatsTable::combine(tables);
    let releases = stats.releases();
    let plottable = stats.plottable_attributes();

    info!(
        releases = releases.len(),
        columns = stats.columns.len(),
        plottable = plottable.len(),
        "statistics combined"
    );

    let plots_dir = layout.plots_dir();
    let charts = render_charts(
        &stats,
        &plottable,
        &ChartOptions {
            plots_dir: plots_dir.clone(),
            reuse_existing: options.reuse_existing_charts,
        },
    )?;
    for chart in &charts {
        debug!(attribute = %chart.attribute, file = %chart.file_name, reused = chart.reused, "chart ready");
    }

    let cache = RankCache::open(&layout.cache_dir)?;
    let fetcher = RankFetcher::new(&cache, source, &layout.data_host);
    let top_entries: Vec<TopEntriesSet> = EntryKind::ALL
        .iter()
        .map(|&kind| fetcher.fetch_top_entries(&releases, kind))
        .collect();

    let stylesheet = load_stylesheet(&layout.stylesheet_path);
    let available_charts: HashSet<String> = descriptions
        .iter()
        .filter(|(name, _)| chart_path(&plots_dir, name).exists())
        .map(|(name, _)| name.to_string())
        .collect();
    let last_updated = today_local_string();

    let html = render_report(&ReportPage {
        stylesheet: stylesheet.as_deref(),
        description_html: &description_html,
        last_updated: &last_updated,
        latest_release: stats.latest_release(),
        data_host: &layout.data_host,
        releases: &releases,
        top_entries: &top_entries,
        descriptions: &descriptions,
        available_charts: &available_charts,
    });

    let output_path = layout.output_path();
    write_text(&output_path, &html)?;

    Ok(BuildSummary {
        output_path,
        release_count: releases.len(),
        plottable_count: plottable.len(),
        charts_rendered: charts.iter().filter(|chart| !chart.reused).count(),
        charts_reused: charts.iter().filter(|chart| chart.reused).count(),
        fetch_failures: top_entries.iter().map(|set| (set.kind, set.failed)).collect(),
    })
}

fn load_descriptions(path: &Path) -> Result<AttributeDescriptions> {
    AttributeDescriptions::from_json(&read_text(path)?)
        .with_context(|| format!("invalid attribute descriptions: {}", path.display()))
}
