//! Per-table sort specifications for dump files.
//!
//! The sort-order resource is tab-delimited, one table per row:
//!
//! ```text
//! Table_Name	Sort_Columns	Sort_Numeric
//! orders	3,1	1
//! order_lines	1,2	y,n
//! ```
//!
//! The header row is optional. The numeric flag is either a single value
//! for every column or a comma list parallel to the column numbers.
//! Malformed entries are collected as [`SortOrderError`]s and skipped; the
//! rest of the file still loads.

use std::{
    collections::HashMap,
    fmt,
    fs::File,
    io::{BufReader, Read},
    path::Path,
};

use anyhow::{Context, Result};
use csv::{ReaderBuilder, StringRecord, Trim};
use itertools::Itertools;
use serde::Serialize;
use thiserror::Error;

use crate::{
    column_map::{TableName, identifier_key},
    diagnostics::DiagnosticSink,
};

const HEADER_MARKER: &str = "Table_Name";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SortColumn {
    /// 1-based field position.
    pub index: usize,
    pub numeric: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SortSpec {
    pub columns: Vec<SortColumn>,
}

impl SortSpec {
    pub fn new(columns: Vec<SortColumn>) -> Self {
        Self { columns }
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SortColumn> {
        self.columns.iter()
    }
}

impl fmt::Display for SortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered = self
            .columns
            .iter()
            .map(|column| {
                if column.numeric {
                    format!("{} (numeric)", column.index)
                } else {
                    column.index.to_string()
                }
            })
            .join(", ");
        f.write_str(&rendered)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SortOrderError {
    #[error("line {line}: sort entry has no table name")]
    MissingTableName { line: u64 },
    #[error("line {line}: table '{table}' has invalid sort column number '{value}'")]
    InvalidColumnNumber {
        line: u64,
        table: String,
        value: String,
    },
    #[error("line {line}: table '{table}' has invalid numeric flag '{value}'")]
    InvalidNumericFlag {
        line: u64,
        table: String,
        value: String,
    },
}

/// Sort specs keyed by table name, ASCII case-insensitive.
#[derive(Debug, Clone, Default)]
pub struct SortOrders {
    entries: Vec<(String, SortSpec)>,
    by_table: HashMap<String, usize>,
}

/// Result of loading a sort-order resource: whatever parsed cleanly plus the
/// entries that were rejected.
#[derive(Debug, Default)]
pub struct SortOrderLoad {
    pub orders: SortOrders,
    pub errors: Vec<SortOrderError>,
}

impl SortOrderLoad {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

impl SortOrders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(path: &Path, sink: &mut dyn DiagnosticSink) -> Result<SortOrderLoad> {
        let file =
            File::open(path).with_context(|| format!("Opening sort-order file {path:?}"))?;
        Self::parse_reader(BufReader::new(file), sink)
            .with_context(|| format!("Reading sort-order file {path:?}"))
    }

    pub fn parse_reader<R: Read>(
        reader: R,
        sink: &mut dyn DiagnosticSink,
    ) -> Result<SortOrderLoad> {
        let mut csv_reader = ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(false)
            .flexible(true)
            .quoting(false)
            .trim(Trim::All)
            .from_reader(reader);
        let mut load = SortOrderLoad::default();
        for (position, record) in csv_reader.records().enumerate() {
            let record = record.context("Reading sort-order entry")?;
            if position == 0 && record.get(0) == Some(HEADER_MARKER) {
                continue;
            }
            if record.iter().all(str::is_empty) {
                continue;
            }
            let line = record
                .position()
                .map_or(position as u64 + 1, |pos| pos.line());
            match parse_entry(&record, line) {
                Ok((table, spec)) => {
                    if load.orders.insert(&table, spec) {
                        sink.warning(format!(
                            "Sort order for table '{table}' is listed more than once; line {line} wins"
                        ));
                    }
                }
                Err(err) => {
                    sink.warning(err.to_string());
                    load.errors.push(err);
                }
            }
        }
        Ok(load)
    }

    /// Adds or replaces the spec for `table`; returns true when replacing.
    pub fn insert(&mut self, table: &str, spec: SortSpec) -> bool {
        let key = identifier_key(table);
        match self.by_table.get(&key) {
            Some(&position) => {
                self.entries[position] = (table.to_string(), spec);
                true
            }
            None => {
                self.by_table.insert(key, self.entries.len());
                self.entries.push((table.to_string(), spec));
                false
            }
        }
    }

    /// Looks `table` up by its bare name, then by `schema.table`.
    pub fn resolve(&self, table: &TableName) -> Option<&SortSpec> {
        table
            .lookup_keys()
            .iter()
            .find_map(|key| self.by_table.get(&identifier_key(key)))
            .map(|&position| &self.entries[position].1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SortSpec)> {
        self.entries
            .iter()
            .map(|(table, spec)| (table.as_str(), spec))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn parse_entry(record: &StringRecord, line: u64) -> Result<(String, SortSpec), SortOrderError> {
    let table = record.get(0).unwrap_or_default();
    if table.is_empty() {
        return Err(SortOrderError::MissingTableName { line });
    }
    let invalid_column = |value: &str| SortOrderError::InvalidColumnNumber {
        line,
        table: table.to_string(),
        value: value.to_string(),
    };
    let indexes = split_list(record.get(1).unwrap_or_default())
        .map(|value| match value.parse::<usize>() {
            Ok(index) if index >= 1 => Ok(index),
            _ => Err(invalid_column(value)),
        })
        .collect::<Result<Vec<_>, _>>()?;

    let flags = split_list(record.get(2).unwrap_or_default())
        .map(|value| {
            parse_flag(value).ok_or_else(|| SortOrderError::InvalidNumericFlag {
                line,
                table: table.to_string(),
                value: value.to_string(),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let columns = indexes
        .into_iter()
        .enumerate()
        .map(|(position, index)| SortColumn {
            index,
            numeric: match flags.as_slice() {
                [single] => *single,
                many => many.get(position).copied().unwrap_or(false),
            },
        })
        .collect();
    Ok((table.to_string(), SortSpec::new(columns)))
}

fn split_list(value: &str) -> impl Iterator<Item = &str> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" => Some(true),
        "0" | "false" | "no" | "n" => Some(false),
        _ => None,
    }
}
