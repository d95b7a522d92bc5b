//! HTML page generation
//!
//! Builds the single statistics page: embedded stylesheet and dropdown script,
//! markdown description, per-kind top ranks, table of contents, downloads and
//! one chart block per described attribute.

use std::collections::HashSet;
use std::path::Path;

use pulldown_cmark::{Options, Parser, html};
use tracing::error;

use crate::charts::chart_file_name;
use crate::model::{AttributeDescriptions, TopEntries};
use crate::ranks::TopEntriesSet;
use crate::util::{escape_html, read_text};

/// Everything the page is built from.
pub struct ReportPage<'a> {
    pub stylesheet: Option<&'a str>,
    pub description_html: &'a str,
    pub last_updated: &'a str,
    pub latest_release: Option<&'a str>,
    pub data_host: &'a str,
    /// First-appearance order.
    pub releases: &'a [String],
    pub top_entries: &'a [TopEntriesSet],
    pub descriptions: &'a AttributeDescriptions,
    /// Attributes that have an image under `plots/`.
    pub available_charts: &'a HashSet<String>,
}

/// Read the stylesheet to embed. A read failure is logged and leaves the
/// `<style>` element empty.
pub fn load_stylesheet(path: &Path) -> Option<String> {
    match read_text(path) {
        Ok(css) => Some(css),
        Err(err) => {
            error!(path = %path.display(), error = %format!("{err:#}"), "failed to read stylesheet");
            None
        }
    }
}

pub fn render_markdown_section(markdown: &str, heading: &str) -> String {
    let mut body = String::new();
    html::push_html(&mut body, Parser::new_ext(markdown, Options::empty()));

    format!(
        r#"
<div class="markdown-content">
    <h3>{heading}</h3>
    {body}
</div>
"#
    )
}

pub fn render_report(page: &ReportPage<'_>) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
{head}
<body>
<h1>Web Graph Statistics</h1>
{update_info}
<img class="full-width-image" src="img/masthead.webp" alt="decorative">
{description}
<h2>Top Ten Ranks</h2>
{ranks}
{rank_explanation}
<h2>Statistics Plots</h2>
{toc}
<p>The following plots are of Web Graph <a href="https://webgraph.di.unimi.it/docs/it/unimi/dsi/webgraph/Stats.html" target="_blank">statistics</a> for all previous releases.</p>
{downloads}
{charts}
{footer}
</body>
</html>
"#,
        head = render_head(page.stylesheet),
        update_info = render_update_info(page.last_updated, page.latest_release, page.data_host),
        description = page.description_html,
        ranks = page
            .top_entries
            .iter()
            .map(|set| render_rank_dropdown(set, page.releases))
            .collect::<String>(),
        rank_explanation = render_rank_explanation(),
        toc = render_toc(page.descriptions),
        downloads = render_downloads(),
        charts = render_chart_blocks(page.descriptions, page.available_charts),
        footer = render_footer(),
    )
}

fn render_head(stylesheet: Option<&str>) -> String {
    format!(
        r#"<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Web Graph Statistics</title>
    <link rel="stylesheet" href="https://data.commoncrawl.org/static/bucket.css">
    <link rel="stylesheet" href="https://cdnjs.cloudflare.com/ajax/libs/font-awesome/6.0.0/css/all.min.css">
    <link href="https://cdnjs.cloudflare.com/ajax/libs/highlight.js/11.8.0/styles/default.min.css" rel="stylesheet">
    <script src="https://cdnjs.cloudflare.com/ajax/libs/highlight.js/11.8.0/highlight.min.js"></script>
    <script>hljs.highlightAll();</script>

    <meta property="og:title"  content="Common Crawl Web Graph Statistics">
    <meta name="twitter:title" content="Common Crawl Web Graph Statistics">
    <meta property="og:description"  content="Visualisations and metrics from the Common Crawl Web Graph dataset">
    <meta name="twitter:description" content="Visualisations and metrics from the Common Crawl Web Graph dataset">
    <meta property="og:image"  content="https://commoncrawl.github.io/cc-webgraph-statistics/img/masthead.jpg">
    <meta name="twitter:image" content="https://commoncrawl.github.io/cc-webgraph-statistics/img/masthead.jpg">
    <meta name="twitter:card" content="summary_large_image">
    <meta property="og:url" content="https://commoncrawl.github.io/cc-webgraph-statistics/">
    <meta property="og:type" content="website">

    <style>
{css}
    </style>
    <script>{js}</script>
</head>"#,
        css = stylesheet.unwrap_or_default(),
        js = dropdown_javascript(),
    )
}

fn dropdown_javascript() -> &'static str {
    r#"
        function setupDropdownHandlers() {
            const dropdowns = document.querySelectorAll('select[id$="-release-dropdown"]');
            dropdowns.forEach(dropdown => {
                dropdown.addEventListener('change', function () {
                    const group = this.id.split('-')[0];
                    const contents = document.querySelectorAll(`.dropdown-content[id^="dropdown-${group}"]`);
                    contents.forEach(content => content.classList.remove("active"));
                    const selected = this.value;
                    if (selected) {
                        document.getElementById(selected).classList.add("active");
                    }
                });
            });
        }
        document.addEventListener("DOMContentLoaded", setupDropdownHandlers);
    "#
}

pub fn latest_release_url(data_host: &str, release: &str) -> String {
    format!(
        "{}/projects/hyperlinkgraph/{release}/index.html",
        data_host.trim_end_matches('/')
    )
}

fn render_update_info(last_updated: &str, latest_release: Option<&str>, data_host: &str) -> String {
    let latest = latest_release
        .map(|release| {
            format!(
                r#"
    <p><strong>Latest Release:</strong> <a href="{url}" target="_blank">{name}</a></p>"#,
                url = latest_release_url(data_host, release),
                name = escape_html(release),
            )
        })
        .unwrap_or_default();

    format!(
        r#"
<div class="update-info">
    <p><strong>Last Updated:</strong> {last_updated}</p>{latest}
</div>
"#
    )
}

/// Release selector for one entry kind plus one hidden content block per
/// release.
pub fn render_rank_dropdown(set: &TopEntriesSet, releases: &[String]) -> String {
    let kind = set.kind;
    let mut out = format!(
        r#"<span style="font-weight: bold">{title}</span><div class="dropdown"><select id="{kind}-release-dropdown">
<option value="">Choose a release...</option>"#,
        title = kind.title(),
    );

    for release in releases.iter().rev() {
        out.push_str(&format!(
            "<option value=\"dropdown-{kind}-{release}\">{release}</option>\n",
            release = escape_html(release),
        ));
    }
    out.push_str("</select></div>");

    let empty = TopEntries::default();
    for release in releases {
        out.push_str(&format!(
            "<div class=\"dropdown-content\" id=\"dropdown-{kind}-{release}\">",
            release = escape_html(release),
        ));
        out.push_str(&render_top_entries_table(set.get(release).unwrap_or(&empty)));
        out.push_str("</div>\n");
    }

    out
}

pub fn render_top_entries_table(entries: &TopEntries) -> String {
    if entries.is_empty() {
        return "<p>No data available.</p>\n".to_string();
    }

    let header = entries
        .header()
        .iter()
        .map(|column| format!("<th>{}</th>\n", escape_html(column)))
        .collect::<String>();
    let body = entries
        .data_rows()
        .iter()
        .map(|row| {
            let cells = row
                .iter()
                .map(|cell| format!("<td>{}</td>", escape_html(cell)))
                .collect::<String>();
            format!("<tr>{cells}</tr>\n")
        })
        .collect::<String>();

    format!("<table>\n<thead><tr>\n{header}</tr></thead>\n<tbody>\n{body}</tbody></table>\n")
}

fn render_rank_explanation() -> &'static str {
    r#"<p>These ranks can be found by running the following:</p>
<pre><code class="bash"># Define environment variables for release and graph level
export RELEASE="{release}"  # Desired release (e.g., cc-main-2017-18-nov-dec-jan)
export GRAPH_LEVEL="{graph_level}"  # Desired graph level (e.g., domain or host)

# Fetch the top 10 ranks for the specified release and graph level
curl -s https://data.commoncrawl.org/projects/hyperlinkgraph/$RELEASE/ \
        $GRAPH_LEVEL/$RELEASE-$GRAPH_LEVEL-ranks.txt.gz \
        | zcat \
        | head -n 11
</code></pre>
<p>Each of these ranks files is multiple GiB, so piping to <code>zcat</code> or <code>gunzip</code> allows you to use <code>head</code> or <code>tail</code> to avoid downloading the whole thing.</p>
<div><h4>What Are These Ranks?</h4>
<p><a href='https://en.wikipedia.org/wiki/Centrality' target='_blank'>Harmonic Centrality</a> (that's the equation below and on the <i>left</i>) considers how close a node is to others, directly or indirectly. The closer a node is to others, the higher its score. It's based on proximity, not the importance or behaviour of neighbours. We calculate this with <a href='https://webgraph.di.unimi.it/docs/it/unimi/dsi/webgraph/algo/HyperBall.html' target='_blank'>HyperBall</a>.</p>
<div class="latex">
  <img src="img/harmcen.svg" alt="Harmonic Centrality equation">
  <img src="img/pagerank.svg" alt="PageRank equation">
</div>
<p>With <a href ='https://en.wikipedia.org/wiki/PageRank' target='_blank'>PageRank</a> (that's the equation on the <i>right</i>), each node's score depends on how many important nodes link to it, and how those nodes distribute their importance.  We calculate this with <a href='https://law.di.unimi.it/software/law-docs/it/unimi/dsi/law/rank/PageRankParallelGaussSeidel.html' target='_blank'>PageRankParallelGaussSeidel</a>.</p>
<p>PageRank is susceptible to manipulation (e.g., link farming or creating many interconnected spam pages). These artificial links can inflate the importance of a spam node. Harmonic Centrality is better for reducing this spam, because it's harder to 'game', or exploit through artificial link patterns.</p></div>
"#
}

fn render_toc(descriptions: &AttributeDescriptions) -> String {
    let items = descriptions
        .iter()
        .map(|(name, _)| {
            let name = escape_html(name);
            format!("<li><a href=\"#{name}\">{name}</a></li>\n")
        })
        .collect::<String>();

    format!("<div class=\"toc\">\n<ul>\n{items}</ul>\n</div>\n")
}

fn render_downloads() -> &'static str {
    r#"<div class="download"><h2>Download Data</h2>
<a href="domain.tsv" download class="download-button"><i class="fas fa-download"></i>domain.tsv</a>
<a href="host.tsv" download class="download-button"><i class="fas fa-download"></i>host.tsv</a>
</div>
"#
}

fn render_chart_blocks(
    descriptions: &AttributeDescriptions,
    available_charts: &HashSet<String>,
) -> String {
    descriptions
        .iter()
        .map(|(raw_name, description)| {
            let name = escape_html(raw_name);
            let figure = if available_charts.contains(raw_name) {
                let file_name = escape_html(&chart_file_name(raw_name));
                format!(
                    r#"<a href="./plots/{file_name}" target="_blank">
        <img src="./plots/{file_name}" alt="{name} Plot">
    </a>"#
                )
            } else {
                "<p><i>No plot available for this attribute.</i></p>".to_string()
            };

            format!(
                r##"
<div class="chart-container">
    <h4 id="{name}">
        <a href="#{name}">{name}</a>
    </h4>
    {figure}
    <p>{description}</p>
</div>
"##
            )
        })
        .collect()
}

fn render_footer() -> &'static str {
    r##"
<div>
    <h3 id='related-reading'><a href="#related-reading">Related Reading</a></h3>
    <ul>
        <li>
            <a href='https://arxiv.org/pdf/2012.01946'>Can I Take Your Subdomain? Exploring Related-Domain Attacks in the Modern Web</a>
        </li>
        <li>
            <a href='https://arxiv.org/abs/1802.05435'>Analysis of the Web Graph Aggregated by Host and Pay-Level Domain</a>
        </li>
    </ul>
</div>
<div>
    <h3>Credits</h3>
    <ul>
        <li>
            <a href="http://webdatacommons.org/" target="_blank">Web Data Commons</a>, for their web graph data set and everything related.
        </li>
        <li>
            <a href="https://about.commonsearch.org/" target="_blank">Common Search</a>; we first used their web graph to expand the crawler frontier, and Common Search's <a href="https://github.com/commonsearch/cosr-back/" target="_blank">cosr-back</a> project was an important source of inspiration how to process our data using PySpark.
        </li>
        <li>
            The authors of the <a href="https://webgraph.di.unimi.it/" target="_blank">WebGraph framework</a>, whose software simplifies the computation of rankings.
        </li>
    </ul>
</div>
<a href="#">Back to Top...</a>
<footer>
    <hr>
    <p>
        <a href="https://commoncrawl.org/">Common Crawl</a> is a California 501(c)(3) registered non-profit organization.
        Hosting of <a href="https://commoncrawl.org/the-data/">Common Crawl data</a> is covered by
        <a href="https://aws.amazon.com/opendata/open-data-sponsorship-program/">Amazon Web Services' Open Data Sponsorship Program</a>.
    </p>
    <p>
        <a href="https://commoncrawl.org/terms-of-use" target="_blank">Terms of Use</a>
        <a href="https://commoncrawl.org/privacy-policy" target="_blank">Privacy</a>
    </p>
</footer>"##
}
