//! Per-release web graph statistics, combined across domain and host tables.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result, bail};
use csv::ReaderBuilder;
use tracing::info;

use crate::model::EntryKind;

pub const RELEASE_COLUMN: &str = "release";
pub const SOURCE_COLUMN: &str = "source";

const MISSING_MARKERS: [&str; 5] = ["NA", "N/A", "NaN", "nan", "null"];

#[derive(Debug, Clone)]
pub struct StatsRow {
    pub release: String,
    pub source: EntryKind,
    pub values: Vec<Option<String>>,
}

/// Attribute columns exclude `release` and `source`; every row carries a value
/// slot (possibly missing) for every column.
#[derive(Debug, Clone, Default)]
pub struct StatsTable {
    pub columns: Vec<String>,
    pub rows: Vec<StatsRow>,
}

pub fn load_source_table(path: &Path, source: EntryKind) -> Result<StatsTable> {
    let mut reader = ReaderBuilder::new()
        .delimiter(b'\t')
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("failed to open statistics table: {}", path.display()))?;

    let headers = reader
        .headers()
        .with_context(|| format!("failed to read header of {}", path.display()))?
        .clone();

    let release_index = headers
        .iter()
        .position(|header| header.trim() == RELEASE_COLUMN)
        .with_context(|| format!("missing `{RELEASE_COLUMN}` column in {}", path.display()))?;

    let attribute_indexes: Vec<(usize, String)> = headers
        .iter()
        .enumerate()
        .filter(|(index, header)| *index != release_index && header.trim() != SOURCE_COLUMN)
        .map(|(index, header)| (index, header.trim().to_string()))
        .collect();

    let mut rows = Vec::new();
    for (offset, record) in reader.records().enumerate() {
        let line = offset + 2;
        let record =
            record.with_context(|| format!("failed to read line {line} of {}", path.display()))?;

        let release = record.get(release_index).map(str::trim).unwrap_or_default();
        if release.is_empty() {
            bail!("line {line} of {} has no release", path.display());
        }

        let values = attribute_indexes
            .iter()
            .map(|(index, _)| record.get(*index).and_then(normalize_cell))
            .collect();

        rows.push(StatsRow {
            release: release.to_string(),
            source,
            values,
        });
    }

    info!(
        path = %path.display(),
        source = %source,
        rows = rows.len(),
        columns = attribute_indexes.len(),
        "loaded statistics table"
    );

    Ok(StatsTable {
        columns: attribute_indexes.into_iter().map(|(_, name)| name).collect(),
        rows,
    })
}

fn normalize_cell(raw: &str) -> Option<String> {
    let value = raw.trim();
    if value.is_empty() || MISSING_MARKERS.contains(&value) {
        None
    } else {
        Some(value.to_string())
    }
}

impl StatsTable {
    /// Concatenate tables row-wise over the union of their columns, first
    /// table's columns first.
    pub fn combine(tables: Vec<StatsTable>) -> Self {
        let mut columns: Vec<String> = Vec::new();
        for table in &tables {
            for column in &table.columns {
                if !columns.contains(column) {
                    columns.push(column.clone());
                }
            }
        }

        let mut rows = Vec::new();
        for table in tables {
            let positions: Vec<usize> = table
                .columns
                .iter()
                .map(|column| {
                    columns
                        .iter()
                        .position(|candidate| candidate == column)
                        .unwrap_or_default()
                })
                .collect();

            for row in table.rows {
                let mut values = vec![None; columns.len()];
                for (value, position) in row.values.into_iter().zip(&positions) {
                    values[*position] = value;
                }
                rows.push(StatsRow {
                    release: row.release,
                    source: row.source,
                    values,
                });
            }
        }

        Self { columns, rows }
    }

    /// Distinct releases in order of first appearance.
    pub fn releases(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.rows
            .iter()
            .filter(|row| seen.insert(row.release.as_str()))
            .map(|row| row.release.clone())
            .collect()
    }

    pub fn latest_release(&self) -> Option<&str> {
        self.rows.iter().map(|row| row.release.as_str()).max()
    }

    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|candidate| candidate == column)
    }

    pub fn column_values(&self, index: usize) -> impl Iterator<Item = Option<&str>> + '_ {
        self.rows
            .iter()
            .map(move |row| row.values.get(index).and_then(|value| value.as_deref()))
    }

    /// Columns worth charting, in table order.
    pub fn plottable_attributes(&self) -> Vec<String> {
        self.columns
            .iter()
            .enumerate()
            .filter(|(index, _)| {
                !has_comma_separated_values(self.column_values(*index))
                    && !has_zero_signal(self.column_values(*index))
            })
            .map(|(_, column)| column.clone())
            .collect()
    }
}

/// Commas mark list-valued cells.
fn has_comma_separated_values<'a>(mut values: impl Iterator<Item = Option<&'a str>>) -> bool {
    values.any(|value| value.is_some_and(|value| value.contains(',')))
}

fn has_zero_signal<'a>(values: impl Iterator<Item = Option<&'a str>>) -> bool {
    let distinct: HashSet<ValueKey<'a>> = values.flatten().map(ValueKey::of).collect();
    distinct.len() <= 1
}

#[derive(Debug, PartialEq, Eq, Hash)]
enum ValueKey<'a> {
    Number(u64),
    Text(&'a str),
}

impl<'a> ValueKey<'a> {
    fn of(value: &'a str) -> Self {
        match numeric_value(value) {
            Some(number) => Self::Number(number.to_bits()),
            None => Self::Text(value),
        }
    }
}

pub fn numeric_value(value: &str) -> Option<f64> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|number| number.is_finite())
}

#[cfg(test)]
pub(crate) mod tests {
    use std::fs;

    use super::{StatsRow, StatsTable, load_source_table, numeric_value};
    use crate::model::EntryKind;

    pub(crate) fn table(columns: &[&str], rows: &[(&str, EntryKind, &[&str])]) -> StatsTable {
        StatsTable {
            columns: columns.iter().map(|column| column.to_string()).collect(),
            rows: rows
                .iter()
                .map(|(release, source, values)| StatsRow {
                    release: release.to_string(),
                    source: *source,
                    values: values
                        .iter()
                        .map(|value| (!value.is_empty()).then(|| value.to_string()))
                        .collect(),
                })
                .collect(),
        }
    }

    #[test]
    fn filter_excludes_constant_and_list_columns() {
        let stats = table(
            &["constant", "listy", "pages"],
            &[
                ("r1", EntryKind::Domain, &["5", "a,b", "10"]),
                ("r2", EntryKind::Domain, &["5", "c", "20"]),
                ("r1", EntryKind::Host, &["5", "d", "15"]),
                ("r2", EntryKind::Host, &["5", "e", "25"]),
            ],
        );

        assert_eq!(stats.plottable_attributes(), vec!["pages".to_string()]);
    }

    #[test]
    fn filter_ignores_missing_values_and_compares_numerically() {
        let stats = table(
            &["sparse", "same_number", "two_values"],
            &[
                ("r1", EntryKind::Domain, &["7", "10", "1"]),
                ("r2", EntryKind::Domain, &["", "10.0", ""]),
                ("r1", EntryKind::Host, &["", "1e1", "2"]),
            ],
        );

        assert_eq!(stats.plottable_attributes(), vec!["two_values".to_string()]);
    }

    #[test]
    fn filter_preserves_column_order() {
        let stats = table(
            &["b", "a", "c"],
            &[
                ("r1", EntryKind::Domain, &["1", "1", "1"]),
                ("r2", EntryKind::Domain, &["2", "2", "2"]),
            ],
        );

        assert_eq!(stats.plottable_attributes(), vec!["b", "a", "c"]);
    }

    #[test]
    fn releases_keep_first_appearance_and_latest_is_max() {
        let stats = table(
            &["pages"],
            &[
                ("cc-main-2024-feb", EntryKind::Domain, &["1"]),
                ("cc-main-2023-dec", EntryKind::Domain, &["2"]),
                ("cc-main-2024-feb", EntryKind::Host, &["3"]),
                ("cc-main-2023-dec", EntryKind::Host, &["4"]),
            ],
        );

        assert_eq!(
            stats.releases(),
            vec!["cc-main-2024-feb".to_string(), "cc-main-2023-dec".to_string()]
        );
        assert_eq!(stats.latest_release(), Some("cc-main-2024-feb"));
        assert_eq!(StatsTable::default().latest_release(), None);
    }

    #[test]
    fn combine_unions_columns() {
        let domain = table(&["nodes", "arcs"], &[("r1", EntryKind::Domain, &["1", "2"])]);
        let host = table(&["arcs", "dangling"], &[("r1", EntryKind::Host, &["3", "4"])]);

        let combined = StatsTable::combine(vec![domain, host]);

        assert_eq!(combined.columns, vec!["nodes", "arcs", "dangling"]);
        assert_eq!(
            combined.rows[0].values,
            vec![Some("1".to_string()), Some("2".to_string()), None]
        );
        assert_eq!(
            combined.rows[1].values,
            vec![None, Some("3".to_string()), Some("4".to_string())]
        );
        assert_eq!(combined.rows[1].source, EntryKind::Host);
    }

    #[test]
    fn load_source_table_reads_tsv() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("domain.tsv");
        fs::write(
            &path,
            "release\tnodes\ttop_level\tsource\nr1\t10\tcom,org\tx\nr2\t\tnet\tx\n",
        )
        .expect("write tsv");

        let stats = load_source_table(&path, EntryKind::Domain).expect("table should load");

        assert_eq!(stats.columns, vec!["nodes", "top_level"]);
        assert_eq!(stats.rows.len(), 2);
        assert_eq!(stats.rows[0].release, "r1");
        assert_eq!(stats.rows[0].source, EntryKind::Domain);
        assert_eq!(stats.rows[1].values[0], None);
        assert_eq!(stats.rows[1].values[1].as_deref(), Some("net"));
    }

    #[test]
    fn load_source_table_requires_release_column() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("host.tsv");
        fs::write(&path, "crawl\tnodes\nr1\t10\n").expect("write tsv");

        let err = load_source_table(&path, EntryKind::Host).expect_err("should fail");
        assert!(err.to_string().contains("release"));
    }

    #[test]
    fn load_source_table_rejects_empty_release() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("host.tsv");
        fs::write(&path, "release\tnodes\nr1\t10\n\t11\n").expect("write tsv");

        assert!(load_source_table(&path, EntryKind::Host).is_err());
    }

    #[test]
    fn numeric_value_rejects_text_and_non_finite() {
        assert_eq!(numeric_value("1.5e3"), Some(1500.0));
        assert_eq!(numeric_value("inf"), None);
        assert_eq!(numeric_value("abc"), None);
    }
}
