use async_trait::async_trait;
use chrono::{DateTime, Utc};
use etb_engine::*;
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

const SHEETS: &[&str] = &["Lead Sheet", "Bank Rec", "Fixed Assets"];

#[derive(Default)]
struct BackendState {
    workbooks_created: usize,
    spreadsheet_id: Option<String>,
    mirror: Vec<EtbRow>,
    stored: Vec<EtbRow>,
    pushed_at: Option<DateTime<Utc>>,
    references: HashMap<RowId, RowReference>,
    calls: Vec<&'static str>,
    failing: Option<&'static str>,
}

/// In-memory stand-in for both the ETB store and the spreadsheet service.
#[derive(Default)]
struct FakeBackend {
    state: Mutex<BackendState>,
}

impl FakeBackend {
    fn fail_on(&self, call: &'static str) {
        self.state.lock().unwrap().failing = Some(call);
    }

    fn calls(&self) -> Vec<&'static str> {
        self.state.lock().unwrap().calls.clone()
    }

    fn stored(&self) -> Vec<EtbRow> {
        self.state.lock().unwrap().stored.clone()
    }

    fn edit_mirror(&self, edit: impl FnOnce(&mut Vec<EtbRow>)) {
        edit(&mut self.state.lock().unwrap().mirror);
    }

    fn record(&self, call: &'static str) -> Result<std::sync::MutexGuard<'_, BackendState>> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(call);
        if state.failing == Some(call) {
            return Err(EtbError::Remote {
                status: 502,
                message: format!("{} unavailable", call),
            });
        }
        Ok(state)
    }
}

#[async_trait]
impl EtbStore for FakeBackend {
    async fn fetch_rows(&self, _engagement_id: &str) -> Result<Vec<EtbRow>> {
        Ok(self.record("fetch_rows")?.stored.clone())
    }

    async fn save_rows(&self, _engagement_id: &str, rows: &[EtbRow]) -> Result<()> {
        self.record("save_rows")?.stored = rows.to_vec();
        Ok(())
    }

    async fn fetch_section_rows(
        &self,
        _engagement_id: &str,
        classification: &str,
    ) -> Result<Vec<EtbRow>> {
        let state = self.record("fetch_section_rows")?;
        let selector = SectionSelector::parse(classification);
        Ok(state
            .stored
            .iter()
            .filter(|r| selector.matches(r))
            .cloned()
            .collect())
    }

    async fn reload_section_rows(
        &self,
        engagement_id: &str,
        classification: &str,
    ) -> Result<Vec<EtbRow>> {
        self.record("reload_section_rows")?;
        self.fetch_section_rows(engagement_id, classification).await
    }
}

#[async_trait]
impl WorkingPapersService for FakeBackend {
    async fn create_workbook(
        &self,
        _scope: &WorkingPapersScope,
        lead_sheet: &[EtbRow],
    ) -> Result<WorkbookCreated> {
        let mut state = self.record("create_workbook")?;
        state.workbooks_created += 1;
        let spreadsheet_id = format!("sheet-{}", state.workbooks_created);
        state.spreadsheet_id = Some(spreadsheet_id.clone());
        state.mirror = lead_sheet.to_vec();
        state.pushed_at = None;

        Ok(WorkbookCreated {
            url: format!("https://sheets.example.com/{}", spreadsheet_id),
            spreadsheet_id,
            sheets: SHEETS.iter().map(|s| s.to_string()).collect(),
        })
    }

    async fn status(&self, _scope: &WorkingPapersScope) -> Result<WorkingPapersStatus> {
        let state = self.record("status")?;
        Ok(match &state.spreadsheet_id {
            Some(id) => WorkingPapersStatus {
                initialized: true,
                url: Some(format!("https://sheets.example.com/{}", id)),
                spreadsheet_id: Some(id.clone()),
                sheets: SHEETS.iter().map(|s| s.to_string()).collect(),
                pushed_at: state.pushed_at,
            },
            None => WorkingPapersStatus::default(),
        })
    }

    async fn push_rows(&self, _scope: &WorkingPapersScope, rows: &[EtbRow]) -> Result<()> {
        let mut state = self.record("push_rows")?;
        state.mirror = rows.to_vec();
        state.pushed_at = Some(Utc::now());
        Ok(())
    }

    async fn pull_rows(&self, _scope: &WorkingPapersScope) -> Result<PulledSheet> {
        let state = self.record("pull_rows")?;
        Ok(PulledSheet {
            rows: state.mirror.clone(),
            sheets: SHEETS.iter().map(|s| s.to_string()).collect(),
        })
    }

    async fn row_candidates(
        &self,
        _scope: &WorkingPapersScope,
        _row_id: &RowId,
    ) -> Result<Vec<WorksheetRow>> {
        self.record("row_candidates")?;
        Ok(vec![
            WorksheetRow {
                sheet_name: "Lead Sheet".to_string(),
                row_index: 2,
                data: vec![json!("1000"), json!("Bank account")],
            },
            WorksheetRow {
                sheet_name: "Bank Rec".to_string(),
                row_index: 4,
                data: vec![json!("Closing balance"), json!(800)],
            },
        ])
    }

    async fn tab_names(&self, _scope: &WorkingPapersScope, _row_id: &RowId) -> Result<Vec<String>> {
        self.record("tab_names")?;
        let mut tabs: Vec<String> = SHEETS.iter().map(|s| s.to_string()).collect();
        tabs.push("Bank Rec".to_string());
        Ok(tabs)
    }

    async fn select_reference(
        &self,
        _scope: &WorkingPapersScope,
        row_id: &RowId,
        reference: &RowReference,
    ) -> Result<Vec<EtbRow>> {
        let mut state = self.record("select_reference")?;
        state.references.insert(row_id.clone(), reference.clone());
        let references = state.references.clone();
        for row in state.mirror.iter_mut() {
            row.reference = references.get(&row.id).cloned();
        }
        Ok(state.mirror.clone())
    }

    async fn preview_reference(
        &self,
        _scope: &WorkingPapersScope,
        row_id: &RowId,
    ) -> Result<ReferencePreview> {
        let state = self.record("preview_reference")?;
        match state.references.get(row_id) {
            Some(RowReference::Row {
                sheet_name,
                row_index,
            }) => Ok(ReferencePreview::Row {
                sheet_name: sheet_name.clone(),
                row_index: *row_index,
                cells: vec![json!("Closing balance"), json!(800)],
            }),
            Some(RowReference::Sheet { sheet_name }) => Ok(ReferencePreview::Sheet {
                sheet_name: sheet_name.clone(),
                grid: vec![vec![json!("Asset"), json!("Cost")]],
            }),
            None => Err(EtbError::Remote {
                status: 404,
                message: "no reference".to_string(),
            }),
        }
    }
}

const CASH: &str = "Assets > Current > Cash & Cash Equivalents";
const RENT: &str = "Expenses > Administrative Expenses > Rent";

fn engagement() -> EtbEngine {
    EtbEngine::from_rows(vec![
        EtbRow::new(RowId::new("row-1"), "1000", "Bank account", 1000.0, 900.0, 0.0, CASH),
        EtbRow::new(RowId::new("row-2"), "6200", "Rent", 1200.0, 1100.0, 0.0, RENT),
        EtbRow::new(RowId::new("row-3"), "1010", "Petty cash", 50.0, 40.0, 5.0, CASH),
    ])
}

fn reconciler(backend: &Arc<FakeBackend>, classification: &str) -> Reconciler {
    Reconciler::new(
        WorkingPapersScope::new("eng-1", classification),
        backend.clone(),
        backend.clone(),
    )
}

fn drain(rx: &mut mpsc::Receiver<ReconcileEvent>) -> Vec<ReconcileEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

type RowContent = (String, String, i64, i64, i64, String);

/// Row content without ids, in a stable order.
fn content(rows: &[EtbRow]) -> Vec<RowContent> {
    let mut out: Vec<RowContent> = rows
        .iter()
        .map(|r| {
            (
                r.code.clone(),
                r.account_name.clone(),
                (r.current_year * 100.0).round() as i64,
                (r.prior_year * 100.0).round() as i64,
                (r.adjustments * 100.0).round() as i64,
                r.classification.clone(),
            )
        })
        .collect();
    out.sort();
    out
}

#[tokio::test]
async fn test_push_then_pull_round_trips_the_lead_sheet() {
    let backend = Arc::new(FakeBackend::default());
    let mut engine = engagement();
    let mut rec = reconciler(&backend, CASH);

    rec.initialize(&engine).await.unwrap();
    rec.push(&engine).await.unwrap();
    let before = rec.lead_sheet(&engine);

    let pulled = rec.pull(&mut engine).await.unwrap();

    assert_eq!(content(&pulled), content(&before));
    assert_eq!(engine.len(), 3);
    assert_eq!(engine.get(&RowId::new("row-2")).unwrap().account_name, "Rent");
}

#[tokio::test]
async fn test_pull_replaces_section_with_mirror_rows() {
    let backend = Arc::new(FakeBackend::default());
    let mut engine = engagement();
    let mut rec = reconciler(&backend, CASH);

    rec.initialize(&engine).await.unwrap();
    backend.edit_mirror(|rows| {
        rows.retain(|r| r.account_name != "Petty cash");
        rows[0].adjustments = -200.0;
        rows.push(EtbRow::new(
            RowId::default(),
            "1020",
            "Savings account",
            5000.0,
            0.0,
            0.0,
            CASH,
        ));
    });

    let pulled = rec.pull(&mut engine).await.unwrap();
    assert_eq!(pulled.len(), 2);

    let bank = engine.get(&RowId::new("row-1")).unwrap();
    assert_eq!(bank.final_balance(), 800.0);
    assert!(engine.get(&RowId::new("row-3")).is_none());
    assert!(engine.rows().any(|r| r.account_name == "Savings account" && !r.id.is_empty()));
    assert!(engine.get(&RowId::new("row-2")).is_some(), "rows outside the section stay");
    assert!(engine.summary().contains(ADJUSTMENTS));
}

#[tokio::test]
async fn test_pull_after_local_reclassification_keeps_one_copy() {
    let backend = Arc::new(FakeBackend::default());
    let mut engine = engagement();
    let mut rec = reconciler(&backend, CASH);
    let bank = RowId::new("row-1");

    rec.initialize(&engine).await.unwrap();
    rec.push(&engine).await.unwrap();
    engine
        .update_field(&bank, EtbField::Classification, RENT)
        .unwrap();

    rec.pull(&mut engine).await.unwrap();

    assert_eq!(engine.len(), 3);
    assert_eq!(engine.rows().filter(|r| r.id == bank).count(), 1);
    assert_eq!(engine.get(&bank).unwrap().classification, CASH);
    assert_eq!(engine.totals(), compute_totals(&backend.stored()));
    assert_eq!(engine.totals().current_year, 2250.0);
}

#[tokio::test]
async fn test_pull_restores_locally_cleared_adjustment() {
    let backend = Arc::new(FakeBackend::default());
    let mut engine = engagement();
    let mut rec = reconciler(&backend, ADJUSTMENTS);
    let petty_cash = RowId::new("row-3");

    rec.initialize(&engine).await.unwrap();
    rec.push(&engine).await.unwrap();
    engine
        .update_field(&petty_cash, EtbField::Adjustments, 0.0)
        .unwrap();
    assert_eq!(engine.totals().adjustments, 0.0);

    rec.pull(&mut engine).await.unwrap();

    assert_eq!(engine.len(), 3);
    assert_eq!(engine.get(&petty_cash).unwrap().adjustments, 5.0);
    assert_eq!(engine.totals().adjustments, 5.0);
    assert_eq!(engine.totals(), compute_totals(&backend.stored()));
}

#[tokio::test]
async fn test_push_persists_before_mirroring() {
    let backend = Arc::new(FakeBackend::default());
    let engine = engagement();
    let mut rec = reconciler(&backend, CASH);

    rec.initialize(&engine).await.unwrap();
    assert!(!rec.link().unwrap().has_been_pushed());

    rec.push(&engine).await.unwrap();

    assert_eq!(backend.calls(), vec!["create_workbook", "save_rows", "push_rows"]);
    assert_eq!(content(&backend.stored()), content(&engine.to_vec()));
    assert!(rec.link().unwrap().has_been_pushed());
}

#[tokio::test]
async fn test_failed_pull_leaves_state_untouched() {
    let backend = Arc::new(FakeBackend::default());
    let mut engine = engagement();
    let (tx, mut rx) = mpsc::channel(32);
    let mut rec = reconciler(&backend, CASH).with_progress(tx);

    let link = rec.initialize(&engine).await.unwrap();
    drain(&mut rx);

    backend.fail_on("pull_rows");
    let before = engine.to_vec();
    let result = rec.pull(&mut engine).await;

    assert!(matches!(result, Err(EtbError::Remote { status: 502, .. })));
    assert_eq!(engine.to_vec(), before);
    assert_eq!(rec.link(), Some(&link));

    let events = drain(&mut rx);
    assert_eq!(
        events[0],
        ReconcileEvent::Started {
            operation: ReconcileOperation::Pull
        }
    );
    let failures = events
        .iter()
        .filter(|e| matches!(e, ReconcileEvent::Failed { .. }))
        .count();
    assert_eq!(failures, 1);
    assert_eq!(events.len(), 2);
}

#[tokio::test]
async fn test_failed_save_does_not_push() {
    let backend = Arc::new(FakeBackend::default());
    let engine = engagement();
    let mut rec = reconciler(&backend, CASH);

    rec.initialize(&engine).await.unwrap();
    backend.fail_on("save_rows");

    assert!(rec.push(&engine).await.is_err());
    assert!(!backend.calls().contains(&"push_rows"));
    assert!(!rec.link().unwrap().has_been_pushed());
}

#[tokio::test]
async fn test_operations_require_initialization() {
    let backend = Arc::new(FakeBackend::default());
    let mut engine = engagement();
    let (tx, mut rx) = mpsc::channel(32);
    let mut rec = reconciler(&backend, CASH).with_progress(tx);

    assert!(matches!(rec.push(&engine).await, Err(EtbError::NotInitialized(_))));
    assert!(matches!(rec.pull(&mut engine).await, Err(EtbError::NotInitialized(_))));
    assert!(backend.calls().is_empty());

    let events = drain(&mut rx);
    assert_eq!(events.len(), 4);
    assert!(matches!(
        events[1],
        ReconcileEvent::Failed {
            operation: ReconcileOperation::Push,
            ..
        }
    ));
}

#[tokio::test]
async fn test_row_and_sheet_references_are_exclusive() {
    let backend = Arc::new(FakeBackend::default());
    let mut engine = engagement();
    let mut rec = reconciler(&backend, CASH);
    let bank = RowId::new("row-1");

    rec.initialize(&engine).await.unwrap();

    rec.bind_row_reference(&mut engine, &bank, "Bank Rec", 4)
        .await
        .unwrap();
    assert_eq!(
        engine.get(&bank).unwrap().reference,
        Some(RowReference::Row {
            sheet_name: "Bank Rec".to_string(),
            row_index: 4
        })
    );

    rec.bind_sheet_reference(&mut engine, &bank, "Fixed Assets")
        .await
        .unwrap();
    let expected = Some(RowReference::Sheet {
        sheet_name: "Fixed Assets".to_string(),
    });
    assert_eq!(engine.get(&bank).unwrap().reference, expected);

    rec.bind_sheet_reference(&mut engine, &bank, "Fixed Assets")
        .await
        .unwrap();
    assert_eq!(engine.get(&bank).unwrap().reference, expected);
    assert_eq!(engine.len(), 3);
}

#[tokio::test]
async fn test_row_reference_replaces_sheet_reference() {
    let backend = Arc::new(FakeBackend::default());
    let mut engine = engagement();
    let mut rec = reconciler(&backend, CASH);
    let bank = RowId::new("row-1");

    rec.initialize(&engine).await.unwrap();

    rec.bind_sheet_reference(&mut engine, &bank, "Fixed Assets")
        .await
        .unwrap();
    assert_eq!(
        engine.get(&bank).unwrap().reference,
        Some(RowReference::Sheet {
            sheet_name: "Fixed Assets".to_string()
        })
    );

    rec.bind_row_reference(&mut engine, &bank, "Bank Rec", 4)
        .await
        .unwrap();
    assert_eq!(
        engine.get(&bank).unwrap().reference,
        Some(RowReference::Row {
            sheet_name: "Bank Rec".to_string(),
            row_index: 4
        })
    );
    assert_eq!(engine.len(), 3);
}

#[tokio::test]
async fn test_binding_rejects_invalid_sheets() {
    let backend = Arc::new(FakeBackend::default());
    let mut engine = engagement();
    let mut rec = reconciler(&backend, CASH);
    let bank = RowId::new("row-1");

    rec.initialize(&engine).await.unwrap();

    let own = rec.bind_sheet_reference(&mut engine, &bank, "Lead Sheet").await;
    assert!(matches!(own, Err(EtbError::InvalidSheet { .. })));

    let unknown = rec.bind_row_reference(&mut engine, &bank, "Payroll", 1).await;
    assert!(matches!(unknown, Err(EtbError::InvalidSheet { .. })));

    let missing = rec
        .bind_sheet_reference(&mut engine, &RowId::new("row-99"), "Bank Rec")
        .await;
    assert!(matches!(missing, Err(EtbError::RowNotFound(_))));

    assert_eq!(engine.get(&bank).unwrap().reference, None);
    assert!(!backend.calls().contains(&"select_reference"));
}

#[tokio::test]
async fn test_candidates_exclude_the_lead_sheet() {
    let backend = Arc::new(FakeBackend::default());
    let engine = engagement();
    let mut rec = reconciler(&backend, CASH);
    let bank = RowId::new("row-1");

    rec.initialize(&engine).await.unwrap();

    let rows = rec
        .fetch_row_reference_candidates(&engine, &bank)
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].sheet_name, "Bank Rec");

    let tabs = rec.fetch_tab_candidates(&engine, &bank).await.unwrap();
    assert_eq!(tabs, vec!["Bank Rec".to_string(), "Fixed Assets".to_string()]);
}

#[tokio::test]
async fn test_resolve_reference() {
    let backend = Arc::new(FakeBackend::default());
    let mut engine = engagement();
    let mut rec = reconciler(&backend, CASH);
    let bank = RowId::new("row-1");

    rec.initialize(&engine).await.unwrap();

    let unbound = rec.resolve_reference(&engine, &bank).await;
    assert!(matches!(unbound, Err(EtbError::NoReference(_))));

    rec.bind_row_reference(&mut engine, &bank, "Bank Rec", 4)
        .await
        .unwrap();
    let comparison = rec.resolve_reference(&engine, &bank).await.unwrap();

    assert_eq!(comparison.lead_row.id, bank);
    assert_eq!(comparison.preview.sheet_name(), "Bank Rec");
    assert!(matches!(
        comparison.preview,
        ReferencePreview::Row { row_index: 4, .. }
    ));
}

#[tokio::test]
async fn test_reinitialize_replaces_link() {
    let backend = Arc::new(FakeBackend::default());
    let engine = engagement();
    let mut rec = reconciler(&backend, CASH);

    let first = rec.initialize(&engine).await.unwrap();
    rec.push(&engine).await.unwrap();
    let second = rec.initialize(&engine).await.unwrap();

    assert_ne!(first.spreadsheet_id, second.spreadsheet_id);
    assert_eq!(rec.link(), Some(&second));
    assert!(!second.has_been_pushed());
    assert_eq!(second.primary_sheet(), "Lead Sheet");
}

#[tokio::test]
async fn test_refresh_status_restores_link() {
    let backend = Arc::new(FakeBackend::default());
    let engine = engagement();

    let mut fresh = reconciler(&backend, CASH);
    fresh.refresh_status().await.unwrap();
    assert_eq!(fresh.state(), &WorkingPapersState::Uninitialized);

    let mut rec = reconciler(&backend, CASH);
    rec.initialize(&engine).await.unwrap();
    rec.push(&engine).await.unwrap();

    let mut reopened = reconciler(&backend, CASH);
    reopened.refresh_status().await.unwrap();
    let link = reopened.link().unwrap();
    assert_eq!(link.spreadsheet_id, "sheet-1");
    assert!(link.has_been_pushed());
    assert_eq!(
        link.reference_sheets().cloned().collect::<Vec<_>>(),
        vec!["Bank Rec".to_string(), "Fixed Assets".to_string()]
    );
}

#[tokio::test]
async fn test_load_and_view_engagement() -> anyhow::Result<()> {
    let backend = Arc::new(FakeBackend::default());
    save_engagement(backend.as_ref(), "eng-1", &engagement()).await?;

    let loaded = load_engagement(backend.as_ref(), "eng-1").await?;
    assert_eq!(loaded.len(), 3);
    assert_eq!(loaded.get(&RowId::new("row-3")).unwrap().final_balance(), 55.0);

    let scope = WorkingPapersScope::new("eng-1", "Assets");
    let view = fetch_section_view(backend.as_ref(), &scope, true, false).await?;
    assert_eq!(view.row_count(), 2);
    assert_eq!(view.grand_total.final_balance, 1055.0);
    assert!(backend.calls().contains(&"reload_section_rows"));
    Ok(())
}
