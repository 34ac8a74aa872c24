//! Collaborator contracts for the backend services the engine talks to.
//!
//! `EtbStore` is the durable home of an engagement's rows and
//! `WorkingPapersService` fronts the external spreadsheet mirror. The `http`
//! feature provides `api::ApiClient`, which implements both.

use crate::engine::EtbEngine;
use crate::error::Result;
use crate::schema::{EtbRow, ReferencePreview, RowId, RowReference, WorksheetRow};
use crate::sections::{SectionSelector, SectionView};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::info;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One lead sheet of one engagement.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkingPapersScope {
    pub engagement_id: String,
    pub classification: String,
}

impl WorkingPapersScope {
    pub fn new(engagement_id: impl Into<String>, classification: impl Into<String>) -> Self {
        Self {
            engagement_id: engagement_id.into(),
            classification: classification.into(),
        }
    }

    pub fn selector(&self) -> SectionSelector {
        SectionSelector::parse(&self.classification)
    }
}

impl fmt::Display for WorkingPapersScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} / {}", self.engagement_id, self.classification)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkbookCreated {
    pub url: String,
    pub spreadsheet_id: String,
    pub sheets: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkingPapersStatus {
    pub initialized: bool,
    pub url: Option<String>,
    pub spreadsheet_id: Option<String>,
    pub sheets: Vec<String>,
    pub pushed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PulledSheet {
    pub rows: Vec<EtbRow>,
    pub sheets: Vec<String>,
}

#[async_trait]
pub trait EtbStore: Send + Sync {
    async fn fetch_rows(&self, engagement_id: &str) -> Result<Vec<EtbRow>>;

    async fn save_rows(&self, engagement_id: &str, rows: &[EtbRow]) -> Result<()>;

    async fn fetch_section_rows(
        &self,
        engagement_id: &str,
        classification: &str,
    ) -> Result<Vec<EtbRow>>;

    /// Rebuilds the section from the canonical ETB on the server side.
    async fn reload_section_rows(
        &self,
        engagement_id: &str,
        classification: &str,
    ) -> Result<Vec<EtbRow>>;
}

#[async_trait]
pub trait WorkingPapersService: Send + Sync {
    async fn create_workbook(
        &self,
        scope: &WorkingPapersScope,
        lead_sheet: &[EtbRow],
    ) -> Result<WorkbookCreated>;

    async fn status(&self, scope: &WorkingPapersScope) -> Result<WorkingPapersStatus>;

    async fn push_rows(&self, scope: &WorkingPapersScope, rows: &[EtbRow]) -> Result<()>;

    async fn pull_rows(&self, scope: &WorkingPapersScope) -> Result<PulledSheet>;

    async fn row_candidates(
        &self,
        scope: &WorkingPapersScope,
        row_id: &RowId,
    ) -> Result<Vec<WorksheetRow>>;

    async fn tab_names(&self, scope: &WorkingPapersScope, row_id: &RowId) -> Result<Vec<String>>;

    /// Records a reference server side and returns the updated lead sheet.
    async fn select_reference(
        &self,
        scope: &WorkingPapersScope,
        row_id: &RowId,
        reference: &RowReference,
    ) -> Result<Vec<EtbRow>>;

    async fn preview_reference(
        &self,
        scope: &WorkingPapersScope,
        row_id: &RowId,
    ) -> Result<ReferencePreview>;
}

/// Loads the persisted ETB of an engagement into a fresh engine.
pub async fn load_engagement<S: EtbStore + ?Sized>(
    store: &S,
    engagement_id: &str,
) -> Result<EtbEngine> {
    let rows = store.fetch_rows(engagement_id).await?;
    info!(
        "Loaded {} ETB rows for engagement {}",
        rows.len(),
        engagement_id
    );
    Ok(EtbEngine::from_rows(rows))
}

pub async fn save_engagement<S: EtbStore + ?Sized>(
    store: &S,
    engagement_id: &str,
    engine: &EtbEngine,
) -> Result<()> {
    store.save_rows(engagement_id, &engine.to_vec()).await?;
    info!(
        "Saved {} ETB rows for engagement {}",
        engine.len(),
        engagement_id
    );
    Ok(())
}

/// Fetches a lead sheet from the server and groups it.
///
/// With `reload`, the server rebuilds the section from the canonical ETB
/// first.
pub async fn fetch_section_view<S: EtbStore + ?Sized>(
    store: &S,
    scope: &WorkingPapersScope,
    reload: bool,
    collapse_to_top: bool,
) -> Result<SectionView> {
    let rows = if reload {
        store
            .reload_section_rows(&scope.engagement_id, &scope.classification)
            .await?
    } else {
        store
            .fetch_section_rows(&scope.engagement_id, &scope.classification)
            .await?
    };

    let engine = EtbEngine::from_rows(rows);
    Ok(SectionView::build(
        engine.rows(),
        scope.selector(),
        collapse_to_top,
    ))
}
