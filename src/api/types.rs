//! Request and response bodies of the backend endpoints.
//!
//! Every response field defaults when absent so a partial body still decodes.

use crate::backend::{PulledSheet, WorkbookCreated, WorkingPapersStatus};
use crate::schema::{EtbRow, ReferencePreview, RowId, WorksheetRow};
use crate::utils::coerce_string;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RowsResponse {
    #[serde(default)]
    pub rows: Vec<EtbRow>,
}

#[derive(Debug, Serialize)]
pub struct RowsRequest<'a> {
    pub rows: &'a [EtbRow],
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeRequest<'a> {
    pub lead_sheet_data: &'a [EtbRow],
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResponse {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub spreadsheet_id: String,
    #[serde(default)]
    pub sheets: Vec<String>,
}

impl From<InitializeResponse> for WorkbookCreated {
    fn from(value: InitializeResponse) -> Self {
        Self {
            url: value.url,
            spreadsheet_id: value.spreadsheet_id,
            sheets: value.sheets,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    #[serde(default)]
    pub initialized: bool,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub spreadsheet_id: Option<String>,
    #[serde(default)]
    pub sheets: Vec<String>,
    #[serde(default)]
    pub pushed_at: Option<DateTime<Utc>>,
}

impl From<StatusResponse> for WorkingPapersStatus {
    fn from(value: StatusResponse) -> Self {
        Self {
            initialized: value.initialized,
            url: value.url.filter(|u| !u.is_empty()),
            spreadsheet_id: value.spreadsheet_id.filter(|id| !id.is_empty()),
            sheets: value.sheets,
            pushed_at: value.pushed_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PushRequest<'a> {
    pub data: &'a [EtbRow],
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PullResponse {
    #[serde(default)]
    pub rows: Vec<EtbRow>,
    #[serde(default)]
    pub sheets: Vec<String>,
}

impl From<PullResponse> for PulledSheet {
    fn from(value: PullResponse) -> Self {
        Self {
            rows: value.rows,
            sheets: value.sheets,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RowIdRequest<'a> {
    pub row_id: &'a RowId,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CandidatesResponse {
    #[serde(default)]
    pub rows: Vec<WorksheetRow>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TabsResponse {
    #[serde(default)]
    pub tabs: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectedRow<'a> {
    pub sheet_name: &'a str,
    pub row_index: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectRowRequest<'a> {
    pub row_id: &'a RowId,
    pub selected_row: SelectedRow<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectTabRequest<'a> {
    pub row_id: &'a RowId,
    pub sheet_name: &'a str,
}

/// The reference preview body. Row and whole-sheet previews share one
/// envelope and are told apart by shape.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewEnvelope {
    #[serde(default, alias = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub sheet_name: Value,
    #[serde(default)]
    pub row_index: Option<usize>,
    #[serde(default, alias = "cells", alias = "rowData")]
    pub data: Value,
    #[serde(default, alias = "sheetData")]
    pub grid: Option<Vec<Vec<Value>>>,
}

impl PreviewEnvelope {
    /// Normalizes the envelope into a tagged preview.
    ///
    /// A whole-sheet preview is recognised by an explicit `sheet` kind, a
    /// `grid`, or `data` holding an array of arrays. Anything else is a row.
    pub fn normalize(self) -> ReferencePreview {
        let sheet_name = coerce_string(&self.sheet_name);
        let data_is_grid = matches!(&self.data, Value::Array(items) if !items.is_empty() && items.iter().all(Value::is_array));
        let is_sheet = self.kind.as_deref() == Some("sheet") || self.grid.is_some() || data_is_grid;

        if is_sheet {
            let grid = self.grid.unwrap_or_else(|| match self.data {
                Value::Array(items) => items
                    .into_iter()
                    .map(|item| match item {
                        Value::Array(cells) => cells,
                        other => vec![other],
                    })
                    .collect(),
                _ => Vec::new(),
            });
            return ReferencePreview::Sheet { sheet_name, grid };
        }

        let cells = match self.data {
            Value::Array(cells) => cells,
            Value::Null => Vec::new(),
            other => vec![other],
        };
        ReferencePreview::Row {
            sheet_name,
            row_index: self.row_index.unwrap_or_default(),
            cells,
        }
    }
}
