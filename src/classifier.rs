//! Keyword based default classification for imported accounts.
//!
//! Rules are scanned in order and the first rule with any matching keyword
//! wins, so more specific phrases (`"bank charge"`) must come before the
//! broader ones they overlap with (`"bank"`).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationRule {
    /// Lower-case substrings matched against the account name.
    pub keywords: Vec<String>,
    pub classification: String,
}

impl ClassificationRule {
    pub fn new(keywords: &[&str], classification: &str) -> Self {
        Self {
            keywords: keywords.iter().map(|k| k.to_lowercase()).collect(),
            classification: classification.to_string(),
        }
    }

    pub fn matches(&self, lowered_name: &str) -> bool {
        self.keywords.iter().any(|k| lowered_name.contains(k.as_str()))
    }
}

pub const DEFAULT_RULES: &[(&[&str], &str)] = &[
    (
        &["bank charge", "bank fee"],
        "Expenses > Finance Costs > Bank Charges",
    ),
    (
        &["cash", "bank", "petty"],
        "Assets > Current > Cash & Cash Equivalents",
    ),
    (
        &["receivable", "debtor"],
        "Assets > Current > Trade Receivables",
    ),
    (&["prepaid", "prepayment"], "Assets > Current > Prepayments"),
    (&["inventory", "stock"], "Assets > Current > Inventory"),
    (
        &["vat recoverable", "input vat"],
        "Assets > Current > Recoverable VAT/Tax",
    ),
    (
        &["equipment", "property", "plant", "vehicle", "furniture", "building"],
        "Assets > Non-current > Property, Plant & Equipment",
    ),
    (
        &["intangible", "goodwill", "patent", "trademark"],
        "Assets > Non-current > Intangible Assets",
    ),
    (&["investment"], "Assets > Non-current > Investments"),
    (
        &["tax payable", "vat payable", "corporation tax"],
        "Liabilities > Current > Taxes Payable",
    ),
    (&["payable", "creditor"], "Liabilities > Current > Trade Payables"),
    (&["accrual", "accrued"], "Liabilities > Current > Accruals"),
    (
        &["loan", "borrowing", "mortgage"],
        "Liabilities > Non-current > Borrowings (Long-term)",
    ),
    (&["provision"], "Liabilities > Non-current > Provisions"),
    (&["share capital", "capital"], "Equity > Equity > Share Capital"),
    (&["retained"], "Equity > Equity > Retained Earnings"),
    (&["reserve"], "Equity > Equity > Other Reserves"),
    (
        &["cost of sales", "cost of goods", "purchases", "materials"],
        "Expenses > Cost of Sales > Materials",
    ),
    (
        &["interest income", "dividend income", "other income", "gain"],
        "Income > Non-operating > Other Income",
    ),
    (
        &["sales", "revenue", "turnover"],
        "Income > Operating > Revenue (Goods)",
    ),
    (
        &["service income", "consulting", "fees earned"],
        "Income > Operating > Revenue (Services)",
    ),
    (
        &["wage", "salar", "payroll"],
        "Expenses > Administrative Expenses > Payroll",
    ),
    (&["rent", "lease"], "Expenses > Administrative Expenses > Rent"),
    (
        &["electric", "utilit", "water"],
        "Expenses > Administrative Expenses > Utilities",
    ),
    (
        &["office", "stationery", "postage"],
        "Expenses > Administrative Expenses > Office/Admin",
    ),
    (
        &["marketing", "advertis"],
        "Expenses > Administrative Expenses > Marketing",
    ),
    (
        &["repair", "maintenance"],
        "Expenses > Administrative Expenses > Repairs & Maintenance",
    ),
    (
        &["software", "subscription"],
        "Expenses > Administrative Expenses > IT/Software",
    ),
    (&["insurance"], "Expenses > Administrative Expenses > Insurance"),
    (
        &["audit", "legal", "accountancy", "professional"],
        "Expenses > Administrative Expenses > Professional Fees",
    ),
    (
        &["depreciation"],
        "Expenses > Administrative Expenses > Depreciation",
    ),
    (
        &["amortisation", "amortization"],
        "Expenses > Administrative Expenses > Amortization",
    ),
    (&["interest"], "Expenses > Finance Costs > Interest Expense"),
    (
        &["income tax", "tax expense"],
        "Expenses > Income Tax > Current Tax",
    ),
];

#[derive(Debug, Clone)]
pub struct AutoClassifier {
    rules: Vec<ClassificationRule>,
}

impl Default for AutoClassifier {
    fn default() -> Self {
        Self::new(
            DEFAULT_RULES
                .iter()
                .map(|(keywords, classification)| ClassificationRule::new(keywords, classification))
                .collect(),
        )
    }
}

impl AutoClassifier {
    /// Uses `rules` exactly in the order given.
    pub fn new(rules: Vec<ClassificationRule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[ClassificationRule] {
        &self.rules
    }

    /// Classification of the first matching rule, or `""` when nothing matches.
    pub fn classify(&self, account_name: &str) -> String {
        let lowered = account_name.to_lowercase();
        self.rules
            .iter()
            .find(|rule| rule.matches(&lowered))
            .map(|rule| rule.classification.clone())
            .unwrap_or_default()
    }
}

/// Classifies with the default rule table.
pub fn auto_classify(account_name: &str) -> String {
    AutoClassifier::default().classify(account_name)
}
