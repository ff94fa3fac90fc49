use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::EtlError;

pub const DEFAULT_ID_START: u32 = 1;
pub const DEFAULT_ID_END: u32 = 1000;

static TABLE_ID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9_-]*(\.[A-Za-z_][A-Za-z0-9_]*){0,2}$").unwrap()
});

/// One fetched species, flattened to the columns of the destination table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeciesRecord {
    pub id: i64,
    pub name: String,
    pub base_happiness: Option<i64>,
    pub capture_rate: i64,
    pub forms_switchable: bool,
    pub gender_rate: i64,
    pub habitat_name: Option<String>,
    pub has_gender_differences: bool,
    pub hatch_counter: Option<i64>,
    pub is_baby: bool,
    pub is_legendary: bool,
    pub is_mythical: bool,
    pub shape_name: Option<String>,
    pub growth_rate: Option<String>,
}

/// Half-open range of species ids, `start..end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IdRange {
    pub start: u32,
    pub end: u32,
}

impl IdRange {
    pub fn new(start: u32, end: u32) -> Result<Self, EtlError> {
        if start == 0 {
            return Err(EtlError::InvalidIdRange(format!(
                "ids start at 1, got {start}"
            )));
        }
        if end <= start {
            return Err(EtlError::InvalidIdRange(format!("{start}..{end} is empty")));
        }
        Ok(Self { start, end })
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    pub fn iter(&self) -> std::ops::Range<u32> {
        self.start..self.end
    }
}

impl Default for IdRange {
    fn default() -> Self {
        Self {
            start: DEFAULT_ID_START,
            end: DEFAULT_ID_END,
        }
    }
}

impl fmt::Display for IdRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

impl FromStr for IdRange {
    type Err = EtlError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let parse = |part: &str| {
            part.trim()
                .parse::<u32>()
                .map_err(|_| EtlError::InvalidIdRange(value.to_string()))
        };
        match trimmed.split_once("..") {
            Some((start, end)) => Self::new(parse(start)?, parse(end)?),
            None => Self::new(DEFAULT_ID_START, parse(trimmed)?),
        }
    }
}

/// Destination table identifier, e.g. `project.dataset.table`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct TableId(String);

impl TableId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Double-quoted form for use in SQL statements.
    pub fn quoted(&self) -> String {
        format!("\"{}\"", self.0)
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TableId {
    type Err = EtlError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim();
        if !TABLE_ID_RE.is_match(normalized) {
            return Err(EtlError::InvalidTableId(value.to_string()));
        }
        Ok(Self(normalized.to_string()))
    }
}

/// Object key inside a bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct BlobKey(String);

impl BlobKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BlobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for BlobKey {
    type Err = EtlError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim();
        let is_valid = !normalized.is_empty()
            && !normalized.starts_with('/')
            && !normalized.contains('\\')
            && normalized
                .split('/')
                .all(|segment| !segment.is_empty() && segment != "." && segment != "..");
        if !is_valid {
            return Err(EtlError::InvalidBlobKey(value.to_string()));
        }
        Ok(Self(normalized.to_string()))
    }
}

/// A blob addressed by bucket and key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlobRef {
    pub bucket: String,
    pub key: BlobKey,
}

impl fmt::Display for BlobRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.bucket, self.key)
    }
}
