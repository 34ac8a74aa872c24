//! # ETB Engine
//!
//! Extended trial balance (ETB) state for audit engagements: row editing with
//! derived balances, keyword auto-classification against a three-level
//! taxonomy, lead sheet projection, and explicit push/pull reconciliation
//! with an external working papers spreadsheet.
//!
//! ## Core Concepts
//!
//! - **ETB row**: one account line with current year, prior year and
//!   adjustment amounts. `final_balance` is always `current_year + adjustments`.
//! - **Classification**: a path `"Level1 > Level2 > Level3"` into a fixed taxonomy.
//! - **Lead sheet**: the rows of one classification (or the synthetic
//!   `"Adjustments"` bucket), grouped with subtotals.
//! - **Working papers**: a spreadsheet mirror of a lead sheet. `push` and
//!   `pull` each overwrite one side; the last call wins.
//!
//! ## Example
//!
//! ```rust,ignore
//! use etb_engine::*;
//! use serde_json::json;
//!
//! let mut engine = EtbEngine::new();
//! engine.import_rows(&RawTable::new(
//!     vec!["Code".into(), "Account Name".into(), "Current Year".into(), "Prior Year".into()],
//!     vec![vec![json!("1000"), json!("Bank account"), json!(1000), json!(900)]],
//! ));
//!
//! let id = engine.rows().next().unwrap().id.clone();
//! engine.update_field(&id, EtbField::Adjustments, -200.0)?;
//!
//! let view = SectionView::build(engine.rows(), SectionSelector::Adjustments, false);
//! println!("{}", view.to_markdown());
//! ```

pub mod backend;
pub mod classifier;
pub mod engine;
pub mod error;
pub mod ingestion;
pub mod reconcile;
pub mod schema;
pub mod sections;
pub mod taxonomy;
pub mod utils;

#[cfg(feature = "http")]
pub mod api;

pub use backend::{
    fetch_section_view, load_engagement, save_engagement, EtbStore, PulledSheet, WorkbookCreated,
    WorkingPapersScope, WorkingPapersService, WorkingPapersStatus,
};
pub use classifier::{auto_classify, AutoClassifier, ClassificationRule};
pub use engine::{compute_totals, refresh_classification_summary, EtbEngine};
pub use error::{EtbError, Result};
pub use ingestion::*;
pub use reconcile::*;
pub use schema::*;
pub use sections::*;
pub use taxonomy::*;
pub use utils::*;

#[cfg(feature = "http")]
pub use api::{ApiClient, ApiConfig};
