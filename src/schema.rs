use crate::utils::{lenient_f64, lenient_string, parse_amount};
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::ops::{Add, AddAssign};

/// Client-local row identity, stable for the whole editing session.
#[derive(
    Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(transparent)]
pub struct RowId(String);

impl RowId {
    pub const PREFIX: &'static str = "row-";

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub(crate) fn from_sequence(sequence: u64) -> Self {
        Self(format!("{}{}", Self::PREFIX, sequence))
    }

    /// The numeric suffix of ids minted by this crate.
    pub(crate) fn sequence(&self) -> Option<u64> {
        self.0.strip_prefix(Self::PREFIX)?.parse().ok()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RowId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Pointer from a lead sheet row to supporting detail in the working papers.
///
/// A row carries at most one reference, so binding one kind replaces the other.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum RowReference {
    #[schemars(description = "A single row of another worksheet in the working papers workbook")]
    Row {
        #[serde(rename = "sheetName")]
        sheet_name: String,
        #[serde(rename = "rowIndex")]
        row_index: usize,
    },

    #[schemars(description = "A whole worksheet of the working papers workbook")]
    Sheet {
        #[serde(rename = "sheetName")]
        sheet_name: String,
    },
}

impl RowReference {
    pub fn sheet_name(&self) -> &str {
        match self {
            RowReference::Row { sheet_name, .. } | RowReference::Sheet { sheet_name } => sheet_name,
        }
    }
}

/// One account line of the extended trial balance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EtbRow {
    #[serde(default)]
    #[schemars(description = "Client-local row id. Empty ids are assigned on ingestion.")]
    pub id: RowId,

    #[serde(default, deserialize_with = "lenient_string")]
    #[schemars(with = "String", description = "Account code as written in the trial balance")]
    pub code: String,

    #[serde(default, deserialize_with = "lenient_string")]
    #[schemars(with = "String")]
    pub account_name: String,

    #[serde(default, deserialize_with = "lenient_f64")]
    #[schemars(with = "f64")]
    pub current_year: f64,

    #[serde(default, deserialize_with = "lenient_f64")]
    #[schemars(with = "f64")]
    pub prior_year: f64,

    #[serde(default, deserialize_with = "lenient_f64")]
    #[schemars(with = "f64")]
    pub adjustments: f64,

    #[serde(default, deserialize_with = "lenient_f64")]
    #[schemars(
        with = "f64",
        description = "Always currentYear + adjustments. Recomputed on ingestion, never trusted from input."
    )]
    final_balance: f64,

    #[serde(default, deserialize_with = "lenient_string")]
    #[schemars(
        with = "String",
        description = "Classification path 'Level1 > Level2 > Level3'. Empty means unclassified."
    )]
    pub classification: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<RowReference>,
}

impl EtbRow {
    pub fn new(
        id: RowId,
        code: impl Into<String>,
        account_name: impl Into<String>,
        current_year: f64,
        prior_year: f64,
        adjustments: f64,
        classification: impl Into<String>,
    ) -> Self {
        let mut row = Self {
            id,
            code: code.into(),
            account_name: account_name.into(),
            current_year,
            prior_year,
            adjustments,
            final_balance: 0.0,
            classification: classification.into(),
            reference: None,
        };
        row.recompute();
        row
    }

    pub fn blank(id: RowId) -> Self {
        Self::new(id, "", "", 0.0, 0.0, 0.0, "")
    }

    pub fn final_balance(&self) -> f64 {
        self.final_balance
    }

    /// Re-derives `final_balance` and scrubs non-finite amounts to zero.
    pub fn recompute(&mut self) {
        for value in [
            &mut self.current_year,
            &mut self.prior_year,
            &mut self.adjustments,
        ] {
            if !value.is_finite() {
                *value = 0.0;
            }
        }
        self.final_balance = self.current_year + self.adjustments;
    }

    pub fn is_classified(&self) -> bool {
        !self.classification.trim().is_empty()
    }

    pub fn has_adjustment(&self) -> bool {
        self.adjustments != 0.0
    }

    /// Applies one field edit. Returns true when `final_balance` was recomputed.
    pub(crate) fn apply(&mut self, field: EtbField, value: FieldValue) -> bool {
        match field {
            EtbField::Code => self.code = value.into_text(),
            EtbField::AccountName => self.account_name = value.into_text(),
            EtbField::Classification => self.classification = value.into_text(),
            EtbField::PriorYear => self.prior_year = value.into_number(),
            EtbField::CurrentYear => {
                self.current_year = value.into_number();
                self.recompute();
                return true;
            }
            EtbField::Adjustments => {
                self.adjustments = value.into_number();
                self.recompute();
                return true;
            }
        }
        false
    }

    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(EtbRow)
    }

    pub fn schema_as_json() -> Result<String, serde_json::Error> {
        let schema = Self::generate_json_schema();
        serde_json::to_string_pretty(&schema)
    }
}

/// The editable fields of a row. `final_balance` is derived and not listed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EtbField {
    Code,
    AccountName,
    CurrentYear,
    PriorYear,
    Adjustments,
    Classification,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Text(String),
}

impl FieldValue {
    fn into_text(self) -> String {
        match self {
            FieldValue::Text(s) => s,
            FieldValue::Number(n) => n.to_string(),
        }
    }

    fn into_number(self) -> f64 {
        match self {
            FieldValue::Number(n) if n.is_finite() => n,
            FieldValue::Number(_) => 0.0,
            FieldValue::Text(s) => parse_amount(&s),
        }
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Number(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TotalsVector {
    pub current_year: f64,
    pub prior_year: f64,
    pub adjustments: f64,
    pub final_balance: f64,
}

impl TotalsVector {
    pub fn of_row(row: &EtbRow) -> Self {
        Self {
            current_year: row.current_year,
            prior_year: row.prior_year,
            adjustments: row.adjustments,
            final_balance: row.final_balance(),
        }
    }

    pub fn approx_eq(&self, other: &Self, tolerance: f64) -> bool {
        (self.current_year - other.current_year).abs() <= tolerance
            && (self.prior_year - other.prior_year).abs() <= tolerance
            && (self.adjustments - other.adjustments).abs() <= tolerance
            && (self.final_balance - other.final_balance).abs() <= tolerance
    }
}

impl Add for TotalsVector {
    type Output = TotalsVector;

    fn add(self, rhs: Self) -> Self::Output {
        Self {
            current_year: self.current_year + rhs.current_year,
            prior_year: self.prior_year + rhs.prior_year,
            adjustments: self.adjustments + rhs.adjustments,
            final_balance: self.final_balance + rhs.final_balance,
        }
    }
}

impl AddAssign for TotalsVector {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl std::iter::Sum for TotalsVector {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

/// Distinct classifications in use, plus `"Adjustments"` when any row is adjusted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassificationSummary(BTreeSet<String>);

impl ClassificationSummary {
    pub fn contains(&self, classification: &str) -> bool {
        self.0.contains(classification)
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> BTreeSet<String> {
        self.0
    }
}

impl FromIterator<String> for ClassificationSummary {
    fn from_iter<T: IntoIterator<Item = String>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// An initialized working papers mirror.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkingPapersLink {
    pub url: String,
    pub spreadsheet_id: String,
    #[serde(default)]
    pub available_sheets: Vec<String>,
    /// Set once the lead sheet has been pushed. Read back from the status endpoint.
    #[serde(default)]
    pub last_pushed_at: Option<DateTime<Utc>>,
}

impl WorkingPapersLink {
    pub fn has_been_pushed(&self) -> bool {
        self.last_pushed_at.is_some()
    }
}

/// A row of a non-primary worksheet that a lead sheet row may point at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorksheetRow {
    #[serde(default, deserialize_with = "lenient_string")]
    pub sheet_name: String,
    #[serde(default)]
    pub row_index: usize,
    #[serde(default)]
    pub data: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ReferencePreview {
    Row {
        #[serde(rename = "sheetName")]
        sheet_name: String,
        #[serde(rename = "rowIndex")]
        row_index: usize,
        cells: Vec<serde_json::Value>,
    },
    Sheet {
        #[serde(rename = "sheetName")]
        sheet_name: String,
        grid: Vec<Vec<serde_json::Value>>,
    },
}

impl ReferencePreview {
    pub fn sheet_name(&self) -> &str {
        match self {
            ReferencePreview::Row { sheet_name, .. } | ReferencePreview::Sheet { sheet_name, .. } => {
                sheet_name
            }
        }
    }
}

/// A resolved reference shown next to the lead sheet row it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceComparison {
    pub lead_row: EtbRow,
    pub preview: ReferencePreview,
}
