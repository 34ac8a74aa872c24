//! The three-level classification vocabulary used to group trial balance rows
//! into financial statement sections.
//!
//! Paths are written `Level1 > Level2 > Level3`, for example
//! `Assets > Current > Cash & Cash Equivalents`. Only full paths appear in the
//! taxonomy table, but partial paths are accepted while a classification is
//! being edited and unknown third levels typed in by hand are tolerated.

use serde::{Deserialize, Serialize};
use std::fmt;

pub const PATH_SEPARATOR: &str = " > ";

/// Literal lead sheet name for the synthetic adjustments section.
pub const ADJUSTMENTS: &str = "Adjustments";

/// Literal lead sheet name for the whole extended trial balance.
pub const ETB: &str = "ETB";

/// Display placeholder for a row without a classification.
pub const EMPTY_DISPLAY: &str = "—";

/// Every valid full classification path, in reporting order.
pub const CLASSIFICATION_TAXONOMY: &[(&str, &str, &str)] = &[
    ("Assets", "Current", "Cash & Cash Equivalents"),
    ("Assets", "Current", "Trade Receivables"),
    ("Assets", "Current", "Other Receivables"),
    ("Assets", "Current", "Prepayments"),
    ("Assets", "Current", "Inventory"),
    ("Assets", "Current", "Recoverable VAT/Tax"),
    ("Assets", "Non-current", "Property, Plant & Equipment"),
    ("Assets", "Non-current", "Intangible Assets"),
    ("Assets", "Non-current", "Investments"),
    ("Assets", "Non-current", "Deferred Tax Asset"),
    ("Assets", "Non-current", "Long-term Loans Receivable"),
    ("Liabilities", "Current", "Trade Payables"),
    ("Liabilities", "Current", "Accruals"),
    ("Liabilities", "Current", "Taxes Payable"),
    ("Liabilities", "Current", "Short-term Loans"),
    ("Liabilities", "Current", "Other Payables"),
    ("Liabilities", "Non-current", "Borrowings (Long-term)"),
    ("Liabilities", "Non-current", "Deferred Tax Liability"),
    ("Liabilities", "Non-current", "Provisions"),
    ("Equity", "Equity", "Share Capital"),
    ("Equity", "Equity", "Retained Earnings"),
    ("Equity", "Equity", "Other Reserves"),
    ("Income", "Operating", "Revenue (Goods)"),
    ("Income", "Operating", "Revenue (Services)"),
    ("Income", "Non-operating", "Other Income"),
    ("Income", "Non-operating", "FX Gains"),
    ("Expenses", "Cost of Sales", "Materials"),
    ("Expenses", "Cost of Sales", "Freight In"),
    ("Expenses", "Direct Costs", "Direct Labor"),
    ("Expenses", "Administrative Expenses", "Payroll"),
    ("Expenses", "Administrative Expenses", "Rent"),
    ("Expenses", "Administrative Expenses", "Utilities"),
    ("Expenses", "Administrative Expenses", "Office/Admin"),
    ("Expenses", "Administrative Expenses", "Marketing"),
    ("Expenses", "Administrative Expenses", "Repairs & Maintenance"),
    ("Expenses", "Administrative Expenses", "IT/Software"),
    ("Expenses", "Administrative Expenses", "Insurance"),
    ("Expenses", "Administrative Expenses", "Professional Fees"),
    ("Expenses", "Administrative Expenses", "Depreciation"),
    ("Expenses", "Administrative Expenses", "Amortization"),
    ("Expenses", "Finance Costs", "Interest Expense"),
    ("Expenses", "Finance Costs", "Bank Charges"),
    ("Expenses", "Income Tax", "Current Tax"),
    ("Expenses", "Income Tax", "Deferred Tax"),
];

/// The raw levels of a classification string. Missing levels are empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationLevels {
    pub level1: String,
    pub level2: String,
    pub level3: String,
}

/// Splits a classification string on `" > "`.
///
/// Never fails: missing segments come back empty and anything past the third
/// separator is kept inside `level3`.
pub fn levels_of(path: &str) -> ClassificationLevels {
    let mut parts = path.splitn(3, PATH_SEPARATOR).map(str::trim);

    ClassificationLevels {
        level1: parts.next().unwrap_or_default().to_string(),
        level2: parts.next().unwrap_or_default().to_string(),
        level3: parts.next().unwrap_or_default().to_string(),
    }
}

/// Joins the non-empty levels with `" > "`.
pub fn build_path(level1: &str, level2: &str, level3: &str) -> String {
    [level1, level2, level3]
        .iter()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(PATH_SEPARATOR)
}

pub fn options_at_level1() -> Vec<String> {
    distinct(CLASSIFICATION_TAXONOMY.iter().map(|(l1, _, _)| *l1))
}

pub fn options_at_level2(level1: &str) -> Vec<String> {
    distinct(
        CLASSIFICATION_TAXONOMY
            .iter()
            .filter(|(l1, _, _)| *l1 == level1)
            .map(|(_, l2, _)| *l2),
    )
}

pub fn options_at_level3(level1: &str, level2: &str) -> Vec<String> {
    distinct(
        CLASSIFICATION_TAXONOMY
            .iter()
            .filter(|(l1, l2, _)| *l1 == level1 && *l2 == level2)
            .map(|(_, _, l3)| *l3),
    )
}

fn distinct<'a>(values: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for value in values {
        if !out.iter().any(|v| v == value) {
            out.push(value.to_string());
        }
    }
    out
}

/// True when the path names a full entry of [`CLASSIFICATION_TAXONOMY`].
pub fn is_taxonomy_leaf(path: &str) -> bool {
    let levels = levels_of(path);
    CLASSIFICATION_TAXONOMY.iter().any(|(l1, l2, l3)| {
        *l1 == levels.level1 && *l2 == levels.level2 && *l3 == levels.level3
    })
}

/// Short label used on navigation badges.
///
/// Balance sheet paths show their deepest segment, every other top level
/// shows only the top level.
pub fn format_for_display(path: &str) -> String {
    match path.trim() {
        "" => return EMPTY_DISPLAY.to_string(),
        ADJUSTMENTS => return ADJUSTMENTS.to_string(),
        ETB => return "Extended Trial Balance".to_string(),
        _ => {}
    }

    let levels = levels_of(path);
    if matches!(levels.level1.as_str(), "Assets" | "Liabilities") {
        [levels.level3, levels.level2, levels.level1]
            .into_iter()
            .find(|l| !l.is_empty())
            .unwrap_or_default()
    } else {
        levels.level1
    }
}

/// A classification path with the no-gap invariant applied.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub struct ClassificationPath {
    level1: String,
    level2: Option<String>,
    level3: Option<String>,
}

impl ClassificationPath {
    /// Builds a path, dropping every level that follows an empty one.
    pub fn new(level1: &str, level2: &str, level3: &str) -> Self {
        let level1 = level1.trim().to_string();
        let level2 = Some(level2.trim())
            .filter(|l| !l.is_empty() && !level1.is_empty())
            .map(str::to_string);
        let level3 = Some(level3.trim())
            .filter(|l| !l.is_empty() && level2.is_some())
            .map(str::to_string);

        Self {
            level1,
            level2,
            level3,
        }
    }

    pub fn parse(path: &str) -> Self {
        let levels = levels_of(path);
        Self::new(&levels.level1, &levels.level2, &levels.level3)
    }

    pub fn is_empty(&self) -> bool {
        self.level1.is_empty()
    }

    pub fn top_level(&self) -> &str {
        &self.level1
    }

    pub fn level2(&self) -> Option<&str> {
        self.level2.as_deref()
    }

    pub fn level3(&self) -> Option<&str> {
        self.level3.as_deref()
    }

    pub fn depth(&self) -> usize {
        match (self.is_empty(), &self.level2, &self.level3) {
            (true, _, _) => 0,
            (false, None, _) => 1,
            (false, Some(_), None) => 2,
            (false, Some(_), Some(_)) => 3,
        }
    }

    /// All three levels are set. Free-text third levels outside the taxonomy
    /// still count as complete.
    pub fn is_complete(&self) -> bool {
        self.depth() == 3
    }
}

impl fmt::Display for ClassificationPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&build_path(
            &self.level1,
            self.level2.as_deref().unwrap_or_default(),
            self.level3.as_deref().unwrap_or_default(),
        ))
    }
}

impl From<String> for ClassificationPath {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<ClassificationPath> for String {
    fn from(value: ClassificationPath) -> Self {
        value.to_string()
    }
}
