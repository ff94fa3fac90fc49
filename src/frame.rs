//! In-memory CSV table and missing-value imputation.
//!
//! A [`Frame`] keeps every cell as text; an empty or blank cell is missing. Column kinds are
//! inferred from the observed values, so the same code cleans any CSV the collector
//! writes without knowing its schema.

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;

use crate::error::EtlError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    Numeric,
    Text,
}

impl fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnKind::Numeric => write!(f, "numeric"),
            ColumnKind::Text => write!(f, "text"),
        }
    }
}

/// Outcome of filling one column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnFill {
    pub column: String,
    pub kind: ColumnKind,
    /// `None` when the column had no observed values.
    pub fill_value: Option<String>,
    pub filled: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    headers: Vec<String>,
    rows: Vec<Vec<Option<String>>>,
}

impl Frame {
    pub fn new(headers: Vec<String>, mut rows: Vec<Vec<Option<String>>>) -> Result<Self, EtlError> {
        for (index, row) in rows.iter_mut().enumerate() {
            if row.len() != headers.len() {
                return Err(EtlError::Csv(format!(
                    "row {} has {} cells, expected {}",
                    index + 1,
                    row.len(),
                    headers.len()
                )));
            }
            for cell in row.iter_mut() {
                if cell.as_deref().is_some_and(|value| value.trim().is_empty()) {
                    *cell = None;
                }
            }
        }
        Ok(Self { headers, rows })
    }

    pub fn from_csv(content: &[u8]) -> Result<Self, EtlError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(content);
        let headers = reader
            .headers()
            .map_err(|err| EtlError::Csv(err.to_string()))?
            .iter()
            .map(str::to_string)
            .collect::<Vec<_>>();

        let mut rows = Vec::new();
        for (index, record) in reader.records().enumerate() {
            let record =
                record.map_err(|err| EtlError::Csv(format!("record #{}: {err}", index + 1)))?;
            rows.push(
                record
                    .iter()
                    .map(|cell| Some(cell.to_string()))
                    .collect(),
            );
        }
        Self::new(headers, rows)
    }

    pub fn to_csv(&self) -> Result<Vec<u8>, EtlError> {
        let mut writer = csv::WriterBuilder::new().from_writer(Vec::new());
        writer
            .write_record(&self.headers)
            .map_err(|err| EtlError::Csv(err.to_string()))?;
        for row in &self.rows {
            writer
                .write_record(row.iter().map(|cell| cell.as_deref().unwrap_or("")))
                .map_err(|err| EtlError::Csv(err.to_string()))?;
        }
        writer
            .into_inner()
            .map_err(|err| EtlError::Csv(err.to_string()))
    }

    pub fn rows(&self) -> &[Vec<Option<String>>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column(&self, index: usize) -> impl Iterator<Item = Option<&str>> {
        self.rows.iter().map(move |row| row[index].as_deref())
    }

    pub fn missing_cells(&self) -> usize {
        self.rows.iter().flatten().filter(|cell| cell.is_none()).count()
    }

    pub fn column_kind(&self, index: usize) -> ColumnKind {
        let numeric = self
            .column(index)
            .flatten()
            .all(|cell| parse_number(cell).is_some());
        if numeric {
            ColumnKind::Numeric
        } else {
            ColumnKind::Text
        }
    }

    /// Fill missing cells column by column: median for numeric columns, mode for the
    /// rest. Columns with no observed value are left untouched.
    pub fn impute(&mut self) -> Vec<ColumnFill> {
        (0..self.headers.len())
            .map(|index| {
                let kind = self.column_kind(index);
                let fill_value = match kind {
                    ColumnKind::Numeric => median(self.column(index).flatten()),
                    ColumnKind::Text => mode(self.column(index).flatten()),
                };
                let mut filled = 0;
                if let Some(value) = &fill_value {
                    for row in &mut self.rows {
                        if row[index].is_none() {
                            row[index] = Some(value.clone());
                            filled += 1;
                        }
                    }
                }
                ColumnFill {
                    column: self.headers[index].clone(),
                    kind,
                    fill_value,
                    filled,
                }
            })
            .collect()
    }
}

fn parse_number(cell: &str) -> Option<f64> {
    cell.trim().parse::<f64>().ok().filter(|value| value.is_finite())
}

/// Median of the numeric cells, formatted without a trailing `.0` when integral.
pub fn median<'a>(cells: impl Iterator<Item = &'a str>) -> Option<String> {
    let mut values = cells.filter_map(parse_number).collect::<Vec<_>>();
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    let value = if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    };
    Some(format_number(value))
}

/// Most frequent cell; ties go to the value seen first.
pub fn mode<'a>(cells: impl Iterator<Item = &'a str>) -> Option<String> {
    let mut counts: HashMap<&str, (usize, usize)> = HashMap::new();
    for (position, cell) in cells.enumerate() {
        counts.entry(cell).or_insert((0, position)).0 += 1;
    }
    counts
        .into_iter()
        .max_by(|(_, (count_a, first_a)), (_, (count_b, first_b))| {
            count_a.cmp(count_b).then(first_b.cmp(first_a))
        })
        .map(|(value, _)| value.to_string())
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}
