use crate::classifier::AutoClassifier;
use crate::error::{EtbError, Result};
use crate::ingestion::{parse_raw_rows, RawTable};
use crate::schema::{
    ClassificationSummary, EtbField, EtbRow, FieldValue, RowId, RowReference, TotalsVector,
};
use crate::sections::SectionSelector;
use crate::taxonomy::ADJUSTMENTS;
use log::{debug, info};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Sums the four amount columns over `rows`. Empty input gives the zero vector.
pub fn compute_totals<'a>(rows: impl IntoIterator<Item = &'a EtbRow>) -> TotalsVector {
    rows.into_iter().map(TotalsVector::of_row).sum()
}

/// Distinct non-empty classifications, plus `"Adjustments"` when any row has
/// a non-zero adjustment.
pub fn refresh_classification_summary<'a>(
    rows: impl IntoIterator<Item = &'a EtbRow>,
) -> ClassificationSummary {
    let mut any_adjusted = false;
    let mut in_use: Vec<String> = Vec::new();

    for row in rows {
        any_adjusted |= row.has_adjustment();
        if row.is_classified() {
            in_use.push(row.classification.clone());
        }
    }

    if any_adjusted {
        in_use.push(ADJUSTMENTS.to_string());
    }

    in_use.into_iter().collect()
}

/// Owns the row set of one open engagement view.
///
/// Rows live in an arena keyed by insertion slot so iteration follows the
/// order rows were imported or added. Every mutation refreshes the
/// classification summary.
#[derive(Debug, Clone, Default)]
pub struct EtbEngine {
    slots: BTreeMap<u64, EtbRow>,
    index: HashMap<RowId, u64>,
    next_sequence: u64,
    summary: ClassificationSummary,
    classifier: AutoClassifier,
}

impl EtbEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_classifier(classifier: AutoClassifier) -> Self {
        Self {
            classifier,
            ..Self::default()
        }
    }

    /// Builds an engine around rows fetched from the backing store.
    pub fn from_rows(rows: Vec<EtbRow>) -> Self {
        let mut engine = Self::new();
        engine.replace_rows(rows);
        engine
    }

    pub fn classifier(&self) -> &AutoClassifier {
        &self.classifier
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn rows(&self) -> impl Iterator<Item = &EtbRow> {
        self.slots.values()
    }

    pub fn to_vec(&self) -> Vec<EtbRow> {
        self.rows().cloned().collect()
    }

    pub fn get(&self, id: &RowId) -> Option<&EtbRow> {
        self.index.get(id).and_then(|slot| self.slots.get(slot))
    }

    pub fn contains(&self, id: &RowId) -> bool {
        self.index.contains_key(id)
    }

    pub fn totals(&self) -> TotalsVector {
        compute_totals(self.rows())
    }

    pub fn summary(&self) -> &ClassificationSummary {
        &self.summary
    }

    /// Replaces the row set with a freshly imported trial balance.
    ///
    /// Each imported row gets a new id, zero adjustments and a keyword-derived
    /// classification.
    pub fn import_rows(&mut self, table: &RawTable) -> Vec<EtbRow> {
        let parsed = parse_raw_rows(table, &self.classifier);
        info!("Importing {} trial balance rows", parsed.len());

        self.slots.clear();
        self.index.clear();
        for row in parsed {
            self.insert_fresh(row);
        }
        self.refresh();

        self.to_vec()
    }

    pub fn add_row(&mut self) -> EtbRow {
        let row = self.insert_fresh(EtbRow::blank(RowId::default()));
        self.refresh();
        debug!("Added row {}", row.id);
        row
    }

    /// Removes a row. Deleting an unknown id is a no-op and returns `None`.
    pub fn delete_row(&mut self, id: &RowId) -> Option<EtbRow> {
        let slot = self.index.remove(id)?;
        let removed = self.slots.remove(&slot);
        self.refresh();
        removed
    }

    /// Edits one field. Only `current_year` and `adjustments` edits re-derive
    /// `final_balance`, and only for this row.
    pub fn update_field(
        &mut self,
        id: &RowId,
        field: EtbField,
        value: impl Into<FieldValue>,
    ) -> Result<()> {
        let row = self.row_mut(id)?;
        if row.apply(field, value.into()) {
            debug!("Row {} final balance is now {}", id, row.final_balance());
        }
        self.refresh();
        Ok(())
    }

    /// Sets or clears the working papers reference of a row.
    pub fn set_reference(&mut self, id: &RowId, reference: Option<RowReference>) -> Result<()> {
        self.row_mut(id)?.reference = reference;
        Ok(())
    }

    /// Replaces the whole row set, keeping incoming ids where they are usable.
    pub fn replace_rows(&mut self, rows: Vec<EtbRow>) {
        self.replace_section(&SectionSelector::All, rows);
    }

    /// Replaces every row matched by `selector` with `rows`.
    ///
    /// An incoming row whose id belongs to a row outside the section
    /// supersedes that row, so an account is never held twice. The block
    /// takes the position of the first matched or superseded row, or goes to
    /// the end when there is none. Other rows keep their ids and order.
    /// Incoming ids are kept unless empty or repeated within the block;
    /// `final_balance` is always re-derived.
    pub fn replace_section(&mut self, selector: &SectionSelector, rows: Vec<EtbRow>) {
        let previous = std::mem::take(&mut self.slots);
        self.index.clear();

        let incoming_ids: HashSet<RowId> = rows
            .iter()
            .filter(|row| !row.id.is_empty())
            .map(|row| row.id.clone())
            .collect();

        let mut incoming = Some(rows);
        let mut replaced = 0usize;
        let mut superseded = 0usize;
        for (_, row) in previous {
            let in_section = selector.matches(&row);
            if in_section || incoming_ids.contains(&row.id) {
                if in_section {
                    replaced += 1;
                } else {
                    superseded += 1;
                }
                if let Some(block) = incoming.take() {
                    self.insert_block(block);
                }
            } else {
                self.insert_kept(row);
            }
        }
        if let Some(block) = incoming.take() {
            self.insert_block(block);
        }

        self.refresh();
        if superseded > 0 {
            debug!(
                "{} rows outside section {} were superseded by incoming ids",
                superseded, selector
            );
        }
        info!(
            "Replaced {} rows of section {} ({} rows now loaded)",
            replaced,
            selector,
            self.len()
        );
    }

    fn row_mut(&mut self, id: &RowId) -> Result<&mut EtbRow> {
        let slot = *self
            .index
            .get(id)
            .ok_or_else(|| EtbError::RowNotFound(id.clone()))?;
        self.slots
            .get_mut(&slot)
            .ok_or_else(|| EtbError::RowNotFound(id.clone()))
    }

    fn insert_block(&mut self, block: Vec<EtbRow>) {
        for mut row in block {
            row.recompute();
            if !is_adoptable(&row.id) || self.index.contains_key(&row.id) {
                self.insert_fresh(row);
            } else {
                self.insert_kept(row);
            }
        }
    }

    /// Inserts under a newly minted id.
    fn insert_fresh(&mut self, mut row: EtbRow) -> EtbRow {
        row.id = RowId::from_sequence(self.next_sequence);
        self.insert_kept(row)
    }

    /// Inserts under the row's own id, advancing the sequence past it so the
    /// id is never minted again. Callers check the id with `is_adoptable`.
    fn insert_kept(&mut self, row: EtbRow) -> EtbRow {
        if let Some(seq) = row.id.sequence() {
            self.next_sequence = self.next_sequence.max(seq);
        }
        let slot = self.next_sequence;
        self.next_sequence = self.next_sequence.saturating_add(1);

        self.index.insert(row.id.clone(), slot);
        self.slots.insert(slot, row.clone());
        row
    }

    fn refresh(&mut self) {
        self.summary = refresh_classification_summary(self.slots.values());
    }
}

/// Highest minted-style sequence an incoming id may carry and still be kept.
/// Higher ones would leave the counter no room to mint distinct ids.
const MAX_ADOPTED_SEQUENCE: u64 = u64::MAX / 2;

fn is_adoptable(id: &RowId) -> bool {
    if id.is_empty() {
        return false;
    }
    id.sequence().map_or(true, |seq| seq <= MAX_ADOPTED_SEQUENCE)
}
