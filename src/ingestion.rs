use crate::classifier::AutoClassifier;
use crate::error::Result;
use crate::schema::{EtbRow, RowId};
use crate::utils::{coerce_number, coerce_string};
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::Read;

/// A trial balance as it comes out of a spreadsheet: one header row and
/// untyped data rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl RawTable {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self { headers, rows }
    }

    /// Splits a 2-D cell grid into header and data rows. An empty grid yields
    /// an empty table.
    pub fn from_grid(grid: Vec<Vec<Value>>) -> Self {
        let mut iter = grid.into_iter();
        let headers = iter
            .next()
            .map(|header| header.iter().map(coerce_string).collect())
            .unwrap_or_default();

        Self {
            headers,
            rows: iter.collect(),
        }
    }

    /// Reads a CSV export. The first record is the header row; ragged records
    /// are accepted.
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut grid = Vec::new();
        for record in csv_reader.records() {
            let record = record?;
            grid.push(
                record
                    .iter()
                    .map(|cell| Value::String(cell.to_string()))
                    .collect(),
            );
        }

        Ok(Self::from_grid(grid))
    }
}

/// Column positions located from the header row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ColumnMap {
    pub code: Option<usize>,
    pub account_name: Option<usize>,
    pub current_year: Option<usize>,
    pub prior_year: Option<usize>,
}

impl ColumnMap {
    /// Case-insensitive substring match on header names; the first matching
    /// header wins for each column.
    pub fn locate(headers: &[String]) -> Self {
        let find = |needle: &str| {
            headers
                .iter()
                .position(|h| h.to_lowercase().contains(needle))
        };

        Self {
            code: find("code"),
            account_name: find("account name"),
            current_year: find("current year"),
            prior_year: find("prior year"),
        }
    }
}

fn cell(row: &[Value], column: Option<usize>) -> Option<&Value> {
    column.and_then(|idx| row.get(idx))
}

fn is_blank(row: &[Value]) -> bool {
    row.iter().all(|v| coerce_string(v).trim().is_empty())
}

/// Converts the data rows of `table` into rows with empty ids.
///
/// Every row starts with zero adjustments and a keyword-derived
/// classification. Missing columns default to `0`/`""`, and rows whose cells
/// are all blank are skipped.
pub fn parse_raw_rows(table: &RawTable, classifier: &AutoClassifier) -> Vec<EtbRow> {
    let columns = ColumnMap::locate(&table.headers);
    debug!("Located trial balance columns: {:?}", columns);

    table
        .rows
        .iter()
        .filter(|row| !is_blank(row))
        .map(|row| {
            let account_name = cell(row, columns.account_name)
                .map(coerce_string)
                .unwrap_or_default();
            let classification = classifier.classify(&account_name);

            EtbRow::new(
                RowId::default(),
                cell(row, columns.code).map(coerce_string).unwrap_or_default(),
                account_name,
                cell(row, columns.current_year)
                    .map(coerce_number)
                    .unwrap_or(0.0),
                cell(row, columns.prior_year).map(coerce_number).unwrap_or(0.0),
                0.0,
                classification,
            )
        })
        .collect()
}
