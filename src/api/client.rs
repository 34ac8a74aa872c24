use crate::api::config::ApiConfig;
use crate::api::types::*;
use crate::backend::{
    EtbStore, PulledSheet, WorkbookCreated, WorkingPapersScope, WorkingPapersService,
    WorkingPapersStatus,
};
use crate::error::{EtbError, Result};
use crate::schema::{EtbRow, ReferencePreview, RowId, RowReference, WorksheetRow};
use async_trait::async_trait;
use log::{debug, warn};
use reqwest::{Client, RequestBuilder, Url};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::time::Duration;

/// JSON client for the engagement backend.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    config: ApiConfig,
}

impl ApiClient {
    pub fn new(config: ApiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client, config })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(ApiConfig::from_env()?)
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    /// Appends percent-encoded path segments to the base url.
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(&self.config.base_url).map_err(|e| {
            EtbError::Config(format!("Invalid base url '{}': {}", self.config.base_url, e))
        })?;
        url.path_segments_mut()
            .map_err(|_| {
                EtbError::Config(format!(
                    "Base url '{}' cannot carry a path",
                    self.config.base_url
                ))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn engagement_endpoint(&self, engagement_id: &str, rest: &[&str]) -> Result<Url> {
        let mut segments = vec!["api", "engagements", engagement_id];
        segments.extend_from_slice(rest);
        self.endpoint(&segments)
    }

    fn working_papers_endpoint(&self, scope: &WorkingPapersScope, action: &str) -> Result<Url> {
        self.engagement_endpoint(
            &scope.engagement_id,
            &["sections", scope.classification.as_str(), "working-papers", action],
        )
    }

    async fn send<T: DeserializeOwned + Default>(&self, request: RequestBuilder) -> Result<T> {
        let request = match &self.config.bearer_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        };

        let response = request.send().await?;
        let status = response.status();
        let url = response.url().clone();
        let body = response.text().await?;

        if !status.is_success() {
            let message = remote_message(&body)
                .or_else(|| status.canonical_reason().map(str::to_string))
                .unwrap_or_default();
            warn!("{} returned {}: {}", url, status, message);
            return Err(EtbError::Remote {
                status: status.as_u16(),
                message,
            });
        }

        debug!("{} returned {} ({} bytes)", url, status, body.len());
        if body.trim().is_empty() {
            return Ok(T::default());
        }
        Ok(serde_json::from_str(&body)?)
    }

    async fn get<T: DeserializeOwned + Default>(&self, url: Url) -> Result<T> {
        self.send(self.client.get(url)).await
    }

    async fn post<T, B>(&self, url: Url, body: &B) -> Result<T>
    where
        T: DeserializeOwned + Default,
        B: serde::Serialize + ?Sized + Sync,
    {
        self.send(self.client.post(url).json(body)).await
    }
}

/// Pulls a readable message out of an error body.
fn remote_message(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }
    match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Object(map)) => ["error", "message", "detail"]
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_str))
            .map(str::to_string)
            .or_else(|| Some(trimmed.to_string())),
        _ => Some(trimmed.to_string()),
    }
}

#[async_trait]
impl EtbStore for ApiClient {
    async fn fetch_rows(&self, engagement_id: &str) -> Result<Vec<EtbRow>> {
        let url = self.engagement_endpoint(engagement_id, &["etb"])?;
        let response: RowsResponse = self.get(url).await?;
        Ok(response.rows)
    }

    async fn save_rows(&self, engagement_id: &str, rows: &[EtbRow]) -> Result<()> {
        let url = self.engagement_endpoint(engagement_id, &["etb"])?;
        let _: Value = self.post(url, &RowsRequest { rows }).await?;
        Ok(())
    }

    async fn fetch_section_rows(
        &self,
        engagement_id: &str,
        classification: &str,
    ) -> Result<Vec<EtbRow>> {
        let url = self.engagement_endpoint(engagement_id, &["sections", classification])?;
        let response: RowsResponse = self.get(url).await?;
        Ok(response.rows)
    }

    async fn reload_section_rows(
        &self,
        engagement_id: &str,
        classification: &str,
    ) -> Result<Vec<EtbRow>> {
        let url =
            self.engagement_endpoint(engagement_id, &["sections", classification, "reload"])?;
        let response: RowsResponse = self.post(url, &json!({})).await?;
        Ok(response.rows)
    }
}

#[async_trait]
impl WorkingPapersService for ApiClient {
    async fn create_workbook(
        &self,
        scope: &WorkingPapersScope,
        lead_sheet: &[EtbRow],
    ) -> Result<WorkbookCreated> {
        let url = self.working_papers_endpoint(scope, "init")?;
        let response: InitializeResponse = self
            .post(
                url,
                &InitializeRequest {
                    lead_sheet_data: lead_sheet,
                },
            )
            .await?;
        Ok(response.into())
    }

    async fn status(&self, scope: &WorkingPapersScope) -> Result<WorkingPapersStatus> {
        let url = self.working_papers_endpoint(scope, "status")?;
        let response: StatusResponse = self.get(url).await?;
        Ok(response.into())
    }

    async fn push_rows(&self, scope: &WorkingPapersScope, rows: &[EtbRow]) -> Result<()> {
        let url = self.working_papers_endpoint(scope, "push")?;
        let _: Value = self.post(url, &PushRequest { data: rows }).await?;
        Ok(())
    }

    async fn pull_rows(&self, scope: &WorkingPapersScope) -> Result<PulledSheet> {
        let url = self.working_papers_endpoint(scope, "pull")?;
        let response: PullResponse = self.post(url, &json!({})).await?;
        Ok(response.into())
    }

    async fn row_candidates(
        &self,
        scope: &WorkingPapersScope,
        row_id: &RowId,
    ) -> Result<Vec<WorksheetRow>> {
        let url = self.working_papers_endpoint(scope, "fetch-rows")?;
        let response: CandidatesResponse = self.post(url, &RowIdRequest { row_id }).await?;
        Ok(response.rows)
    }

    async fn tab_names(&self, scope: &WorkingPapersScope, row_id: &RowId) -> Result<Vec<String>> {
        let url = self.working_papers_endpoint(scope, "fetch-tabs")?;
        let response: TabsResponse = self.post(url, &RowIdRequest { row_id }).await?;
        Ok(response.tabs)
    }

    async fn select_reference(
        &self,
        scope: &WorkingPapersScope,
        row_id: &RowId,
        reference: &RowReference,
    ) -> Result<Vec<EtbRow>> {
        let response: RowsResponse = match reference {
            RowReference::Row {
                sheet_name,
                row_index,
            } => {
                let url = self.working_papers_endpoint(scope, "select-row")?;
                let body = SelectRowRequest {
                    row_id,
                    selected_row: SelectedRow {
                        sheet_name,
                        row_index: *row_index,
                    },
                };
                self.post(url, &body).await?
            }
            RowReference::Sheet { sheet_name } => {
                let url = self.working_papers_endpoint(scope, "select-tab")?;
                let body = SelectTabRequest { row_id, sheet_name };
                self.post(url, &body).await?
            }
        };
        Ok(response.rows)
    }

    async fn preview_reference(
        &self,
        scope: &WorkingPapersScope,
        row_id: &RowId,
    ) -> Result<ReferencePreview> {
        let url = self.working_papers_endpoint(scope, "view-reference")?;
        let envelope: PreviewEnvelope = self.post(url, &RowIdRequest { row_id }).await?;
        Ok(envelope.normalize())
    }
}
