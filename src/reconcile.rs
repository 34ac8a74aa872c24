//! Keeps a lead sheet and its working papers spreadsheet mirror in step.
//!
//! Synchronisation is explicit and one-way per call: `push` overwrites the
//! mirror with local rows, `pull` replaces the local section with the
//! mirror's rows. There is no merge and no conflict detection; the last call
//! wins. A failed call leaves both the row set and the link untouched.

use crate::backend::{EtbStore, WorkingPapersScope, WorkingPapersService};
use crate::engine::EtbEngine;
use crate::error::{EtbError, Result};
use crate::schema::{
    EtbRow, ReferenceComparison, RowId, RowReference, WorkingPapersLink, WorksheetRow,
};
use chrono::Utc;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc::Sender;

/// Tab name assumed for the lead sheet when the workbook reports no sheets.
pub const LEAD_SHEET_TAB: &str = "Lead Sheet";

#[derive(Debug, Clone, Default, PartialEq)]
pub enum WorkingPapersState {
    #[default]
    Uninitialized,
    Initialized(WorkingPapersLink),
}

impl WorkingPapersState {
    pub fn link(&self) -> Option<&WorkingPapersLink> {
        match self {
            WorkingPapersState::Uninitialized => None,
            WorkingPapersState::Initialized(link) => Some(link),
        }
    }
}

impl WorkingPapersLink {
    /// The sheet holding the mirrored lead sheet: the first sheet of the workbook.
    pub fn primary_sheet(&self) -> &str {
        self.available_sheets
            .first()
            .map(String::as_str)
            .unwrap_or(LEAD_SHEET_TAB)
    }

    /// Sheets a lead sheet row may reference.
    pub fn reference_sheets(&self) -> impl Iterator<Item = &String> {
        let primary = self.primary_sheet();
        self.available_sheets.iter().filter(move |s| *s != primary)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReconcileOperation {
    Initialize,
    RefreshStatus,
    Push,
    Pull,
    RowCandidates,
    TabCandidates,
    BindReference,
    ResolveReference,
}

/// Progress notifications. Every failed operation emits exactly one `Failed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ReconcileEvent {
    Started { operation: ReconcileOperation },
    Succeeded { operation: ReconcileOperation },
    Failed {
        operation: ReconcileOperation,
        reason: String,
    },
}

/// Reconciliation for one engagement + classification pair.
///
/// Operations take `&mut self`, so only one can be in flight per reconciler.
/// The engine handed to `push`/`pull` is the engagement's full ETB; the
/// section is cut from it with the scope's selector.
pub struct Reconciler {
    scope: WorkingPapersScope,
    service: Arc<dyn WorkingPapersService>,
    store: Arc<dyn EtbStore>,
    state: WorkingPapersState,
    progress: Option<Sender<ReconcileEvent>>,
}

impl Reconciler {
    pub fn new(
        scope: WorkingPapersScope,
        service: Arc<dyn WorkingPapersService>,
        store: Arc<dyn EtbStore>,
    ) -> Self {
        Self {
            scope,
            service,
            store,
            state: WorkingPapersState::Uninitialized,
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: Sender<ReconcileEvent>) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn scope(&self) -> &WorkingPapersScope {
        &self.scope
    }

    pub fn state(&self) -> &WorkingPapersState {
        &self.state
    }

    pub fn link(&self) -> Option<&WorkingPapersLink> {
        self.state.link()
    }

    pub fn is_initialized(&self) -> bool {
        self.link().is_some()
    }

    /// Lead sheet rows of this scope, in engine order.
    pub fn lead_sheet(&self, engine: &EtbEngine) -> Vec<EtbRow> {
        self.scope
            .selector()
            .select(engine.rows())
            .into_iter()
            .cloned()
            .collect()
    }

    /// Reads the durable working papers state from the status endpoint.
    pub async fn refresh_status(&mut self) -> Result<&WorkingPapersState> {
        self.start(ReconcileOperation::RefreshStatus).await;
        let result = self.do_refresh_status().await;
        self.finish(ReconcileOperation::RefreshStatus, result).await?;
        Ok(&self.state)
    }

    /// Creates a new mirror workbook prefilled with the lead sheet.
    ///
    /// Calling this again replaces the existing link with a new workbook.
    pub async fn initialize(&mut self, engine: &EtbEngine) -> Result<WorkingPapersLink> {
        self.start(ReconcileOperation::Initialize).await;
        let result = self.do_initialize(engine).await;
        self.finish(ReconcileOperation::Initialize, result).await
    }

    /// Persists the full ETB, then overwrites the mirror with the lead sheet.
    pub async fn push(&mut self, engine: &EtbEngine) -> Result<()> {
        self.start(ReconcileOperation::Push).await;
        let result = self.do_push(engine).await;
        self.finish(ReconcileOperation::Push, result).await
    }

    /// Replaces the local section wholesale with the mirror's rows.
    pub async fn pull(&mut self, engine: &mut EtbEngine) -> Result<Vec<EtbRow>> {
        self.start(ReconcileOperation::Pull).await;
        let result = self.do_pull(engine).await;
        self.finish(ReconcileOperation::Pull, result).await
    }

    pub async fn fetch_row_reference_candidates(
        &mut self,
        engine: &EtbEngine,
        row_id: &RowId,
    ) -> Result<Vec<WorksheetRow>> {
        self.start(ReconcileOperation::RowCandidates).await;
        let result = self.do_row_candidates(engine, row_id).await;
        self.finish(ReconcileOperation::RowCandidates, result).await
    }

    pub async fn fetch_tab_candidates(
        &mut self,
        engine: &EtbEngine,
        row_id: &RowId,
    ) -> Result<Vec<String>> {
        self.start(ReconcileOperation::TabCandidates).await;
        let result = self.do_tab_candidates(engine, row_id).await;
        self.finish(ReconcileOperation::TabCandidates, result).await
    }

    /// Points a row at one row of another sheet, clearing any sheet reference.
    pub async fn bind_row_reference(
        &mut self,
        engine: &mut EtbEngine,
        row_id: &RowId,
        sheet_name: &str,
        row_index: usize,
    ) -> Result<()> {
        let reference = RowReference::Row {
            sheet_name: sheet_name.to_string(),
            row_index,
        };
        self.bind(engine, row_id, reference).await
    }

    /// Points a row at a whole sheet, clearing any row reference.
    pub async fn bind_sheet_reference(
        &mut self,
        engine: &mut EtbEngine,
        row_id: &RowId,
        sheet_name: &str,
    ) -> Result<()> {
        let reference = RowReference::Sheet {
            sheet_name: sheet_name.to_string(),
        };
        self.bind(engine, row_id, reference).await
    }

    /// Fetches what a row's reference points at, next to the row itself.
    pub async fn resolve_reference(
        &mut self,
        engine: &EtbEngine,
        row_id: &RowId,
    ) -> Result<ReferenceComparison> {
        self.start(ReconcileOperation::ResolveReference).await;
        let result = self.do_resolve(engine, row_id).await;
        self.finish(ReconcileOperation::ResolveReference, result).await
    }

    async fn bind(
        &mut self,
        engine: &mut EtbEngine,
        row_id: &RowId,
        reference: RowReference,
    ) -> Result<()> {
        self.start(ReconcileOperation::BindReference).await;
        let result = self.do_bind(engine, row_id, reference).await;
        self.finish(ReconcileOperation::BindReference, result).await
    }

    async fn do_refresh_status(&mut self) -> Result<()> {
        let status = self.service.status(&self.scope).await?;

        self.state = match (status.initialized, status.url, status.spreadsheet_id) {
            (true, Some(url), Some(spreadsheet_id)) => WorkingPapersState::Initialized(WorkingPapersLink {
                url,
                spreadsheet_id,
                available_sheets: status.sheets,
                last_pushed_at: status.pushed_at,
            }),
            (true, _, _) => {
                warn!(
                    "Working papers for {} report initialized without a url or spreadsheet id",
                    self.scope
                );
                WorkingPapersState::Uninitialized
            }
            _ => WorkingPapersState::Uninitialized,
        };
        Ok(())
    }

    async fn do_initialize(&mut self, engine: &EtbEngine) -> Result<WorkingPapersLink> {
        if self.is_initialized() {
            warn!(
                "Re-initializing working papers for {}; a new workbook replaces the current one",
                self.scope
            );
        }

        let lead_sheet = self.lead_sheet(engine);
        let created = self
            .service
            .create_workbook(&self.scope, &lead_sheet)
            .await?;

        let link = WorkingPapersLink {
            url: created.url,
            spreadsheet_id: created.spreadsheet_id,
            available_sheets: created.sheets,
            last_pushed_at: None,
        };
        info!(
            "Initialized working papers {} for {} with {} rows",
            link.spreadsheet_id,
            self.scope,
            lead_sheet.len()
        );
        self.state = WorkingPapersState::Initialized(link.clone());
        Ok(link)
    }

    async fn do_push(&mut self, engine: &EtbEngine) -> Result<()> {
        self.require_link()?;

        let all_rows = engine.to_vec();
        self.store
            .save_rows(&self.scope.engagement_id, &all_rows)
            .await?;
        debug!("Persisted {} rows before pushing {}", all_rows.len(), self.scope);

        let lead_sheet = self.lead_sheet(engine);
        self.service.push_rows(&self.scope, &lead_sheet).await?;

        if let WorkingPapersState::Initialized(link) = &mut self.state {
            link.last_pushed_at = Some(Utc::now());
        }
        info!("Pushed {} rows to working papers for {}", lead_sheet.len(), self.scope);
        Ok(())
    }

    async fn do_pull(&mut self, engine: &mut EtbEngine) -> Result<Vec<EtbRow>> {
        self.require_link()?;

        let pulled = self.service.pull_rows(&self.scope).await?;
        let pulled_count = pulled.rows.len();

        engine.replace_section(&self.scope.selector(), pulled.rows);
        if let WorkingPapersState::Initialized(link) = &mut self.state {
            if !pulled.sheets.is_empty() {
                link.available_sheets = pulled.sheets;
            }
        }

        info!("Pulled {} rows from working papers for {}", pulled_count, self.scope);
        Ok(self.lead_sheet(engine))
    }

    async fn do_row_candidates(
        &mut self,
        engine: &EtbEngine,
        row_id: &RowId,
    ) -> Result<Vec<WorksheetRow>> {
        let primary = self.require_link()?.primary_sheet().to_string();
        require_row(engine, row_id)?;

        let rows = self.service.row_candidates(&self.scope, row_id).await?;
        Ok(rows
            .into_iter()
            .filter(|r| r.sheet_name != primary)
            .collect())
    }

    async fn do_tab_candidates(&mut self, engine: &EtbEngine, row_id: &RowId) -> Result<Vec<String>> {
        let primary = self.require_link()?.primary_sheet().to_string();
        require_row(engine, row_id)?;

        let mut tabs = self.service.tab_names(&self.scope, row_id).await?;
        let mut seen = HashSet::new();
        tabs.retain(|tab| *tab != primary && seen.insert(tab.clone()));
        Ok(tabs)
    }

    async fn do_bind(
        &mut self,
        engine: &mut EtbEngine,
        row_id: &RowId,
        reference: RowReference,
    ) -> Result<()> {
        let link = self.require_link()?;
        let sheet = reference.sheet_name();
        if sheet == link.primary_sheet() {
            return Err(EtbError::InvalidSheet {
                sheet: sheet.to_string(),
                details: "the lead sheet cannot reference itself".to_string(),
            });
        }
        if !link.available_sheets.is_empty() && !link.available_sheets.iter().any(|s| s == sheet) {
            return Err(EtbError::InvalidSheet {
                sheet: sheet.to_string(),
                details: "not a sheet of the working papers workbook".to_string(),
            });
        }
        require_row(engine, row_id)?;

        let mut updated = self
            .service
            .select_reference(&self.scope, row_id, &reference)
            .await?;

        match updated.iter().position(|row| row.id == *row_id) {
            Some(idx) => {
                updated[idx].reference = Some(reference);
                engine.replace_section(&self.scope.selector(), updated);
            }
            None => {
                if !updated.is_empty() {
                    warn!(
                        "Updated lead sheet for {} did not contain row {}; keeping local rows",
                        self.scope, row_id
                    );
                }
                engine.set_reference(row_id, Some(reference))?;
            }
        }

        debug!("Bound reference for row {} in {}", row_id, self.scope);
        Ok(())
    }

    async fn do_resolve(&mut self, engine: &EtbEngine, row_id: &RowId) -> Result<ReferenceComparison> {
        self.require_link()?;
        let lead_row = require_row(engine, row_id)?.clone();
        if lead_row.reference.is_none() {
            return Err(EtbError::NoReference(row_id.clone()));
        }

        let preview = self.service.preview_reference(&self.scope, row_id).await?;
        Ok(ReferenceComparison { lead_row, preview })
    }

    fn require_link(&self) -> Result<&WorkingPapersLink> {
        self.link()
            .ok_or_else(|| EtbError::NotInitialized(self.scope.to_string()))
    }

    async fn start(&self, operation: ReconcileOperation) {
        self.send_event(ReconcileEvent::Started { operation }).await;
    }

    async fn finish<T>(&self, operation: ReconcileOperation, result: Result<T>) -> Result<T> {
        match &result {
            Ok(_) => {
                self.send_event(ReconcileEvent::Succeeded { operation }).await;
            }
            Err(e) => {
                warn!("{:?} failed for {}: {}", operation, self.scope, e);
                self.send_event(ReconcileEvent::Failed {
                    operation,
                    reason: e.to_string(),
                })
                .await;
            }
        }
        result
    }

    async fn send_event(&self, event: ReconcileEvent) {
        if let Some(tx) = &self.progress {
            let _ = tx.send(event).await;
        }
    }
}

fn require_row<'a>(engine: &'a EtbEngine, row_id: &RowId) -> Result<&'a EtbRow> {
    engine
        .get(row_id)
        .ok_or_else(|| EtbError::RowNotFound(row_id.clone()))
}
