//! Section projections of the row set: filters, grouping and subtotals used by
//! lead sheets.
//!
//! Equity, Income and Expenses are flat categories in the reporting layout,
//! so a top-category view folds their subsections into one group. Assets and
//! Liabilities always keep their full drill-down path.

use crate::engine::compute_totals;
use crate::error::Result;
use crate::schema::{EtbRow, TotalsVector};
use crate::taxonomy::{format_for_display, levels_of, ADJUSTMENTS, ETB};
use crate::utils::format_amount;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Top levels that fold into a single group when collapsing.
pub const COLLAPSIBLE_TOP_LEVELS: &[&str] = &["Equity", "Income", "Expenses"];

pub const UNCLASSIFIED: &str = "Unclassified";

pub fn filter_by_classification<'a>(
    rows: impl IntoIterator<Item = &'a EtbRow>,
    path: &str,
) -> Vec<&'a EtbRow> {
    rows.into_iter()
        .filter(|row| row.classification == path)
        .collect()
}

pub fn filter_by_top_category<'a>(
    rows: impl IntoIterator<Item = &'a EtbRow>,
    top_level: &str,
) -> Vec<&'a EtbRow> {
    rows.into_iter()
        .filter(|row| levels_of(&row.classification).level1 == top_level)
        .collect()
}

pub fn filter_adjustments<'a>(rows: impl IntoIterator<Item = &'a EtbRow>) -> Vec<&'a EtbRow> {
    rows.into_iter().filter(|row| row.has_adjustment()).collect()
}

fn group_key(classification: &str, collapse_to_top: bool) -> String {
    if classification.trim().is_empty() {
        return UNCLASSIFIED.to_string();
    }

    if collapse_to_top {
        let levels = levels_of(classification);
        if !levels.level2.is_empty() && COLLAPSIBLE_TOP_LEVELS.contains(&levels.level1.as_str()) {
            return levels.level1;
        }
    }

    classification.to_string()
}

/// Groups rows by classification. With `collapse_to_top`, only Equity, Income
/// and Expenses fold to their top level.
pub fn group_by_classification<'a>(
    rows: impl IntoIterator<Item = &'a EtbRow>,
    collapse_to_top: bool,
) -> BTreeMap<String, Vec<&'a EtbRow>> {
    let mut groups: BTreeMap<String, Vec<&'a EtbRow>> = BTreeMap::new();
    for row in rows {
        groups
            .entry(group_key(&row.classification, collapse_to_top))
            .or_default()
            .push(row);
    }
    groups
}

pub fn subtotal(group: &[&EtbRow]) -> TotalsVector {
    compute_totals(group.iter().copied())
}

/// Which rows a lead sheet covers, parsed from the classification it is
/// addressed by.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum SectionSelector {
    /// The whole extended trial balance (`"ETB"`).
    All,
    /// Rows with a non-zero adjustment (`"Adjustments"`).
    Adjustments,
    /// Every row under a top level, e.g. `"Income"`.
    TopCategory(String),
    /// Exact match on a full classification path.
    Classification(String),
}

impl SectionSelector {
    pub fn parse(classification: &str) -> Self {
        match classification.trim() {
            "" | ETB => SectionSelector::All,
            ADJUSTMENTS => SectionSelector::Adjustments,
            other if !other.contains('>') => {
                SectionSelector::TopCategory(other.to_string())
            }
            other => SectionSelector::Classification(other.to_string()),
        }
    }

    pub fn matches(&self, row: &EtbRow) -> bool {
        match self {
            SectionSelector::All => true,
            SectionSelector::Adjustments => row.has_adjustment(),
            SectionSelector::TopCategory(top) => levels_of(&row.classification).level1 == *top,
            SectionSelector::Classification(path) => row.classification == *path,
        }
    }

    pub fn select<'a>(&self, rows: impl IntoIterator<Item = &'a EtbRow>) -> Vec<&'a EtbRow> {
        match self {
            SectionSelector::All => rows.into_iter().collect(),
            SectionSelector::Adjustments => filter_adjustments(rows),
            SectionSelector::TopCategory(top) => filter_by_top_category(rows, top),
            SectionSelector::Classification(path) => filter_by_classification(rows, path),
        }
    }

    pub fn display_name(&self) -> String {
        format_for_display(&self.to_string())
    }
}

impl fmt::Display for SectionSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SectionSelector::All => f.write_str(ETB),
            SectionSelector::Adjustments => f.write_str(ADJUSTMENTS),
            SectionSelector::TopCategory(value) | SectionSelector::Classification(value) => {
                f.write_str(value)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionGroup {
    pub key: String,
    pub display_name: String,
    pub rows: Vec<EtbRow>,
    pub subtotal: TotalsVector,
}

/// A lead sheet: the selected rows grouped with subtotals and a grand total.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionView {
    pub selector: SectionSelector,
    pub groups: Vec<SectionGroup>,
    pub grand_total: TotalsVector,
}

impl SectionView {
    pub fn build<'a>(
        rows: impl IntoIterator<Item = &'a EtbRow>,
        selector: SectionSelector,
        collapse_to_top: bool,
    ) -> Self {
        let selected = selector.select(rows);
        let grand_total = compute_totals(selected.iter().copied());

        let groups = group_by_classification(selected, collapse_to_top)
            .into_iter()
            .map(|(key, members)| SectionGroup {
                display_name: if key == UNCLASSIFIED {
                    UNCLASSIFIED.to_string()
                } else {
                    format_for_display(&key)
                },
                subtotal: subtotal(&members),
                rows: members.into_iter().cloned().collect(),
                key,
            })
            .collect();

        Self {
            selector,
            groups,
            grand_total,
        }
    }

    pub fn row_count(&self) -> usize {
        self.groups.iter().map(|g| g.rows.len()).sum()
    }

    pub fn to_csv(&self) -> Result<String> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record([
            "Group",
            "Code",
            "Account Name",
            "Current Year",
            "Prior Year",
            "Adjustments",
            "Final Balance",
        ])?;

        for group in &self.groups {
            for row in &group.rows {
                writer.write_record(&[
                    group.key.clone(),
                    row.code.clone(),
                    row.account_name.clone(),
                    format_amount(row.current_year),
                    format_amount(row.prior_year),
                    format_amount(row.adjustments),
                    format_amount(row.final_balance()),
                ])?;
            }
            write_totals_record(&mut writer, &group.key, "Subtotal", &group.subtotal)?;
        }
        write_totals_record(&mut writer, "", "Total", &self.grand_total)?;

        let bytes = writer
            .into_inner()
            .map_err(|e| std::io::Error::other(e.to_string()))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    pub fn to_markdown(&self) -> String {
        let mut output = String::new();

        output.push_str(&format!("# Lead Sheet - {}\n\n", self.selector.display_name()));

        for group in &self.groups {
            output.push_str(&format!("## {}\n\n", group.display_name));
            output.push_str("| Code | Account | Current Year | Prior Year | Adjustments | Final Balance |\n");
            output.push_str("|---|---|---:|---:|---:|---:|\n");
            for row in &group.rows {
                output.push_str(&format!(
                    "| {} | {} | {} | {} | {} | {} |\n",
                    row.code,
                    row.account_name,
                    format_amount(row.current_year),
                    format_amount(row.prior_year),
                    format_amount(row.adjustments),
                    format_amount(row.final_balance())
                ));
            }
            output.push_str(&format!(
                "| | **Subtotal** | {} | {} | {} | {} |\n\n",
                format_amount(group.subtotal.current_year),
                format_amount(group.subtotal.prior_year),
                format_amount(group.subtotal.adjustments),
                format_amount(group.subtotal.final_balance)
            ));
        }

        output.push_str(&format!(
            "**Total:** current year {}, prior year {}, adjustments {}, final balance {}\n",
            format_amount(self.grand_total.current_year),
            format_amount(self.grand_total.prior_year),
            format_amount(self.grand_total.adjustments),
            format_amount(self.grand_total.final_balance)
        ));

        output
    }
}

fn write_totals_record<W: std::io::Write>(
    writer: &mut csv::Writer<W>,
    group: &str,
    label: &str,
    totals: &TotalsVector,
) -> Result<()> {
    writer.write_record(&[
        group.to_string(),
        String::new(),
        label.to_string(),
        format_amount(totals.current_year),
        format_amount(totals.prior_year),
        format_amount(totals.adjustments),
        format_amount(totals.final_balance),
    ])?;
    Ok(())
}
