//! Fleet expense ledger
//!
//! SQLite-backed entity store for drivers, vehicles, tires and categorized
//! expenses, plus the filtered reporting layer on top of it: one filter,
//! compiled once, feeds the structured listing, the CSV export and the
//! month dashboard.

pub mod aggregate;
pub mod constants;
pub mod error;
pub mod filter;
pub mod models;
pub mod report;
pub mod store;

pub use aggregate::{BreakdownOrder, DriverTotal, MonthSummary, TopDriver, Totals};
pub use error::{LedgerError, Result};
pub use filter::{ExpenseFilter, FilterParams};
pub use report::{CsvExport, ExpenseReport, ReportMode, ReportOptions, ReportOutput, run_report};
pub use store::Store;
