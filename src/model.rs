use std::fmt;

use anyhow::{Context, Result, bail};
use serde_json::Value;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum EntryKind {
    Domain,
    Host,
}

impl EntryKind {
    pub const ALL: [EntryKind; 2] = [EntryKind::Domain, EntryKind::Host];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Domain => "domain",
            Self::Host => "host",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Self::Domain => "Domain",
            Self::Host => "Host",
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// First ranked rows of a rank file. Row 0 is the header.
///
/// Rows are split on whitespace and never validated, so field counts may differ
/// between rows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopEntries {
    pub rows: Vec<Vec<String>>,
}

impl TopEntries {
    pub fn parse(text: &str) -> Self {
        let rows = text
            .trim()
            .split('\n')
            .map(|line| line.split_whitespace().map(ToOwned::to_owned).collect())
            .collect();
        Self { rows }
    }

    /// True when there is nothing to show, including the single-empty-row
    /// table produced by an empty cache file.
    pub fn is_empty(&self) -> bool {
        self.rows.iter().all(|row| row.is_empty())
    }

    pub fn header(&self) -> &[String] {
        self.rows.first().map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn data_rows(&self) -> &[Vec<String>] {
        self.rows.get(1..).unwrap_or(&[])
    }
}

/// Attribute name to description, in the order of the source mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributeDescriptions {
    pub entries: Vec<(String, String)>,
}

impl AttributeDescriptions {
    pub fn from_json(raw: &str) -> Result<Self> {
        let value: Value =
            serde_json::from_str(raw).context("failed to parse attribute descriptions")?;
        let Value::Object(map) = value else {
            bail!("attribute descriptions must be a JSON object");
        };

        let entries = map
            .into_iter()
            .map(|(name, description)| {
                let text = match description {
                    Value::String(text) => text,
                    other => other.to_string(),
                };
                (name, text)
            })
            .collect();

        Ok(Self { entries })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(name, description)| (name.as_str(), description.as_str()))
    }
}

#[derive(Debug, Clone)]
pub struct ChartFile {
    pub attribute: String,
    pub file_name: String,
    pub reused: bool,
}
