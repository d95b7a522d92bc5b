//! Top-ranked entries per release, read through an on-disk cache.
//!
//! Rank files on the data host are multi-GiB gzip streams. Only the first
//! [`TOP_ENTRY_LINES`] decompressed lines are ever read; that prefix is stored as
//! `{release}-{kind}-top-entries.txt` under the cache directory and is trusted
//! on every later run. Cache files are never refreshed or removed.

use std::collections::HashMap;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use flate2::read::MultiGzDecoder;
use reqwest::blocking::Client;
use tracing::{debug, error, info};

use crate::model::{EntryKind, TopEntries};
use crate::util::{ensure_directory, read_text, write_text};

/// Header line plus ten ranked rows.
pub const TOP_ENTRY_LINES: usize = 11;

const USER_AGENT: &str = concat!("webgraph-stats/", env!("CARGO_PKG_VERSION"));

pub fn rank_url(data_host: &str, release: &str, kind: EntryKind) -> String {
    format!(
        "{}/projects/hyperlinkgraph/{release}/{kind}/{release}-{kind}-ranks.txt.gz",
        data_host.trim_end_matches('/')
    )
}

pub trait RankSource {
    /// Return the first `max_lines` decompressed lines at `url`, each terminated
    /// by `\n`.
    fn fetch_head(&self, url: &str, max_lines: usize) -> Result<String>;
}

pub struct HttpRankSource {
    client: Client,
}

impl HttpRankSource {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .context("failed to build rank HTTP client")?;

        Ok(Self { client })
    }
}

impl RankSource for HttpRankSource {
    fn fetch_head(&self, url: &str, max_lines: usize) -> Result<String> {
        let response = self
            .client
            .get(url)
            .send()
            .with_context(|| format!("failed to request {url}"))?
            .error_for_status()
            .with_context(|| format!("rank file request rejected: {url}"))?;

        // Dropping the response after `max_lines` closes the connection, so the
        // remainder of the file is never transferred.
        read_head(response, max_lines).with_context(|| format!("failed to decompress {url}"))
    }
}

/// Decompress a (possibly multi-member) gzip stream and return its first
/// `max_lines` lines, each terminated by `\n`.
pub fn read_head(compressed: impl Read, max_lines: usize) -> Result<String> {
    let reader = BufReader::new(MultiGzDecoder::new(compressed));
    let mut head = String::new();
    for line in reader.lines().take(max_lines) {
        head.push_str(&line?);
        head.push('\n');
    }

    Ok(head)
}

/// Key to path store for fetched rank prefixes.
pub struct RankCache {
    dir: PathBuf,
}

impl RankCache {
    pub fn open(dir: &Path) -> Result<Self> {
        ensure_directory(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    pub fn path_for(&self, release: &str, kind: EntryKind) -> PathBuf {
        self.dir.join(format!("{release}-{kind}-top-entries.txt"))
    }

    pub fn load(&self, release: &str, kind: EntryKind) -> Result<Option<String>> {
        let path = self.path_for(release, kind);
        if !path.exists() {
            return Ok(None);
        }
        read_text(&path).map(Some)
    }

    pub fn store(&self, release: &str, kind: EntryKind, text: &str) -> Result<()> {
        write_text(&self.path_for(release, kind), text)
    }
}

/// Top entries for every release of one entry kind.
#[derive(Debug, Clone)]
pub struct TopEntriesSet {
    pub kind: EntryKind,
    pub by_release: HashMap<String, TopEntries>,
    pub failed: usize,
}

impl TopEntriesSet {
    pub fn get(&self, release: &str) -> Option<&TopEntries> {
        self.by_release.get(release)
    }
}

pub struct RankFetcher<'a> {
    cache: &'a RankCache,
    source: &'a dyn RankSource,
    data_host: &'a str,
}

impl<'a> RankFetcher<'a> {
    pub fn new(cache: &'a RankCache, source: &'a dyn RankSource, data_host: &'a str) -> Self {
        Self {
            cache,
            source,
            data_host,
        }
    }

    /// Fetch sequentially; a failing release is logged and recorded as an
    /// empty table without aborting the others.
    pub fn fetch_top_entries(&self, releases: &[String], kind: EntryKind) -> TopEntriesSet {
        let mut by_release = HashMap::with_capacity(releases.len());
        let mut failed = 0;

        for release in releases {
            let entries = match self.top_entries_for(release, kind) {
                Ok(entries) => entries,
                Err(err) => {
                    error!(
                        release = %release,
                        kind = %kind,
                        error = %format!("{err:#}"),
                        "failed to fetch top entries"
                    );
                    failed += 1;
                    TopEntries::default()
                }
            };
            by_release.insert(release.clone(), entries);
        }

        info!(
            kind = %kind,
            releases = releases.len(),
            failed,
            "collected top entries"
        );

        TopEntriesSet {
            kind,
            by_release,
            failed,
        }
    }

    fn top_entries_for(&self, release: &str, kind: EntryKind) -> Result<TopEntries> {
        if let Some(text) = self.cache.load(release, kind)? {
            debug!(release = %release, kind = %kind, "rank cache hit");
            return Ok(TopEntries::parse(&text));
        }

        let url = rank_url(self.data_host, release, kind);
        info!(release = %release, kind = %kind, url = %url, "rank cache miss, fetching");

        let text = self.source.fetch_head(&url, TOP_ENTRY_LINES)?;
        self.cache.store(release, kind, &text)?;

        Ok(TopEntries::parse(&text))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::cell::RefCell;
    use std::io::Write;

    use anyhow::{Result, bail};
    use flate2::Compression;
    use flate2::write::GzEncoder;

    use super::{RankCache, RankFetcher, RankSource, TOP_ENTRY_LINES, rank_url, read_head};
    use crate::model::EntryKind;

    pub(crate) const SAMPLE_RANKS: &str = "#harmonicc_pos #harmonicc_val #pr_pos #pr_val #host_rev\n\
        1 3.2E7 3 0.0021 com.facebook\n\
        2 3.1E7 1 0.0050 com.google\n";

    /// Serves `body` for every URL unless the URL contains one of `failing`.
    pub(crate) struct FakeRankSource {
        pub body: String,
        pub failing: Vec<String>,
        pub calls: RefCell<Vec<String>>,
    }

    impl FakeRankSource {
        pub fn serving(body: &str) -> Self {
            Self {
                body: body.to_string(),
                failing: Vec::new(),
                calls: RefCell::new(Vec::new()),
            }
        }

        pub fn failing_for(mut self, fragment: &str) -> Self {
            self.failing.push(fragment.to_string());
            self
        }

        pub fn call_count(&self) -> usize {
            self.calls.borrow().len()
        }
    }

    impl RankSource for FakeRankSource {
        fn fetch_head(&self, url: &str, max_lines: usize) -> Result<String> {
            assert_eq!(max_lines, TOP_ENTRY_LINES);
            self.calls.borrow_mut().push(url.to_string());
            if self.failing.iter().any(|fragment| url.contains(fragment.as_str())) {
                bail!("connection refused: {url}");
            }
            Ok(self.body.clone())
        }
    }

    fn releases(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    fn gzip(text: &str) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(text.as_bytes()).expect("compress");
        encoder.finish().expect("finish gzip member")
    }

    #[test]
    fn read_head_keeps_only_the_first_lines() {
        let text: String = (0..50).map(|rank| format!("{rank} 0.5 com.example{rank}\n")).collect();

        let head = read_head(gzip(&text).as_slice(), TOP_ENTRY_LINES).expect("head should decode");

        assert_eq!(head.lines().count(), TOP_ENTRY_LINES);
        assert!(head.starts_with("0 0.5 com.example0\n"));
        assert!(head.ends_with("10 0.5 com.example10\n"));
    }

    #[test]
    fn read_head_terminates_unterminated_last_line() {
        let head = read_head(gzip("#pos #host\n1 com.a").as_slice(), TOP_ENTRY_LINES)
            .expect("head should decode");

        assert_eq!(head, "#pos #host\n1 com.a\n");
    }

    #[test]
    fn read_head_continues_across_gzip_members() {
        let mut stream = gzip("#pos #host\n1 com.a\n");
        stream.extend(gzip("2 com.b\n3 com.c\n"));

        let head = read_head(stream.as_slice(), TOP_ENTRY_LINES).expect("head should decode");

        assert_eq!(head, "#pos #host\n1 com.a\n2 com.b\n3 com.c\n");
    }

    #[test]
    fn read_head_rejects_corrupt_input() {
        assert!(read_head(&b"definitely not gzip data"[..], TOP_ENTRY_LINES).is_err());

        let mut bad_body = gzip("1 com.example\n");
        for byte in &mut bad_body[10..14] {
            *byte = 0xff;
        }
        assert!(read_head(bad_body.as_slice(), TOP_ENTRY_LINES).is_err());
    }

    #[test]
    fn rank_url_follows_hyperlinkgraph_layout() {
        assert_eq!(
            rank_url("https://data.example.org/", "r1", EntryKind::Domain),
            "https://data.example.org/projects/hyperlinkgraph/r1/domain/r1-domain-ranks.txt.gz"
        );
    }

    #[test]
    fn second_fetch_is_served_from_cache() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = RankCache::open(&dir.path().join("ranks")).expect("cache should open");
        let source = FakeRankSource::serving(SAMPLE_RANKS);
        let fetcher = RankFetcher::new(&cache, &source, "https://data.example.org");

        let first = fetcher.fetch_top_entries(&releases(&["r1"]), EntryKind::Host);
        let second = fetcher.fetch_top_entries(&releases(&["r1"]), EntryKind::Host);

        assert_eq!(source.call_count(), 1);
        assert_eq!(first.get("r1"), second.get("r1"));
        assert_eq!(first.get("r1").expect("r1 present").rows.len(), 3);

        let cached = std::fs::read_to_string(cache.path_for("r1", EntryKind::Host))
            .expect("cache file should exist");
        assert_eq!(cached, SAMPLE_RANKS);
    }

    #[test]
    fn kinds_use_separate_cache_entries() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = RankCache::open(dir.path()).expect("cache should open");
        let source = FakeRankSource::serving(SAMPLE_RANKS);
        let fetcher = RankFetcher::new(&cache, &source, "https://data.example.org");

        fetcher.fetch_top_entries(&releases(&["r1"]), EntryKind::Domain);
        fetcher.fetch_top_entries(&releases(&["r1"]), EntryKind::Host);

        assert_eq!(source.call_count(), 2);
        assert!(cache.path_for("r1", EntryKind::Domain).exists());
        assert!(cache.path_for("r1", EntryKind::Host).exists());
    }

    #[test]
    fn failure_yields_empty_table_and_continues() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = RankCache::open(dir.path()).expect("cache should open");
        let source = FakeRankSource::serving(SAMPLE_RANKS).failing_for("/r1/");
        let fetcher = RankFetcher::new(&cache, &source, "https://data.example.org");

        let set = fetcher.fetch_top_entries(&releases(&["r1", "r2"]), EntryKind::Domain);

        assert_eq!(set.failed, 1);
        assert!(set.get("r1").expect("r1 recorded").rows.is_empty());
        assert!(!set.get("r2").expect("r2 recorded").is_empty());
        assert!(!cache.path_for("r1", EntryKind::Domain).exists());
    }

    #[test]
    fn empty_cache_file_parses_as_single_empty_row() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = RankCache::open(dir.path()).expect("cache should open");
        cache
            .store("r1", EntryKind::Domain, "")
            .expect("store should succeed");
        let source = FakeRankSource::serving(SAMPLE_RANKS);
        let fetcher = RankFetcher::new(&cache, &source, "https://data.example.org");

        let set = fetcher.fetch_top_entries(&releases(&["r1"]), EntryKind::Domain);

        assert_eq!(source.call_count(), 0);
        let entries = set.get("r1").expect("r1 recorded");
        assert_eq!(entries.rows, vec![Vec::<String>::new()]);
        assert!(entries.is_empty());
    }
}
