//! Report projection: structured listing, delimited export and dashboard summary
//!
//! Every mode reads its rows with a single filtered query, so listing and
//! export over the same filter return the same rows in the same order
//! (date ascending, then id).

use chrono::NaiveDate;
use csv::{QuoteStyle, Terminator, WriterBuilder};
use serde::Serialize;
use std::io::Write;
use tracing::debug;

use crate::aggregate::{self, BreakdownOrder, DriverTotal, MonthSummary};
use crate::constants;
use crate::error::{LedgerError, Result};
use crate::filter::ExpenseFilter;
use crate::models::ExpenseRow;
use crate::store::Store;

/// Which output shape a report request asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportMode {
    Listing,
    Export,
    Dashboard,
}

/// Per-request report settings
#[derive(Debug, Clone)]
pub struct ReportOptions {
    pub order: BreakdownOrder,
    /// Reference day for the dashboard month (server local date)
    pub today: NaiveDate,
    pub export_file_name: String,
}

/// Rows with display fields, grand total and per-driver breakdown
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseReport {
    pub expenses: Vec<ExpenseRow>,
    pub total: f64,
    pub total_by_driver: Vec<DriverTotal>,
}

/// Delimited text plus the metadata needed to frame it as a download
#[derive(Debug, Clone, PartialEq)]
pub struct CsvExport {
    pub content_type: &'static str,
    pub file_name: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReportOutput {
    Listing(ExpenseReport),
    Export(CsvExport),
    Dashboard(MonthSummary),
}

/// Run one report over the store
pub async fn run_report(
    store: &Store,
    filter: &ExpenseFilter,
    mode: ReportMode,
    options: &ReportOptions,
) -> Result<ReportOutput> {
    match mode {
        ReportMode::Listing => {
            let rows = store.query_expenses(filter).await?;
            Ok(ReportOutput::Listing(build_listing(rows, options.order)))
        }
        ReportMode::Export => {
            let rows = store.query_expenses(filter).await?;
            Ok(ReportOutput::Export(CsvExport {
                content_type: constants::EXPORT_CONTENT_TYPE,
                file_name: options.export_file_name.clone(),
                body: render_csv(&rows)?,
            }))
        }
        ReportMode::Dashboard => {
            let (first, last) = aggregate::month_bounds(options.today);
            let rows = store.query_expenses(&filter.narrowed_to(first, last)).await?;
            Ok(ReportOutput::Dashboard(aggregate::summarize_month(options.today, &rows)))
        }
    }
}

/// Structured report from already-filtered rows
pub fn build_listing(rows: Vec<ExpenseRow>, order: BreakdownOrder) -> ExpenseReport {
    let totals = aggregate::aggregate(&rows, order);
    debug!(rows = rows.len(), total = totals.total, "built expense listing");

    ExpenseReport {
        expenses: rows,
        total: totals.total,
        total_by_driver: totals.by_driver,
    }
}

/// Render rows as `;`-separated text with a header line
pub fn render_csv(rows: &[ExpenseRow]) -> Result<String> {
    let mut buf = Vec::new();
    {
        let mut wtr = WriterBuilder::new()
            .delimiter(constants::EXPORT_DELIMITER)
            .terminator(Terminator::Any(b'\n'))
            .quote_style(QuoteStyle::Necessary)
            .double_quote(true)
            .from_writer(&mut buf);

        wtr.write_record(constants::EXPORT_HEADER)?;

        for row in rows {
            wtr.write_record([
                row.date.as_str(),
                &flatten_text(row.driver_name.as_deref()),
                &vehicle_label(row),
                &flatten_text(row.category_name.as_deref()),
                &format_value(row.value),
                &flatten_text(row.invoice_number.as_deref()),
                &flatten_text(row.supplier.as_deref()),
                &flatten_text(row.description.as_deref()),
            ])?;
        }

        wtr.flush()?;
    }

    String::from_utf8(buf).map_err(|e| LedgerError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))
}

/// Two decimals with a comma separator and no grouping, e.g. `1234,50`
pub fn format_value(value: f64) -> String {
    format!("{:.2}", aggregate::normalize_zero(value)).replace('.', ",")
}

/// Free text with line breaks collapsed to single spaces
fn flatten_text(text: Option<&str>) -> String {
    text.unwrap_or_default()
        .replace("\r\n", " ")
        .replace(['\n', '\r'], " ")
}

/// Truck plate, trailer plate, or both joined when the expense names a rig
pub fn vehicle_label(row: &ExpenseRow) -> String {
    match (row.truck_plate.as_deref(), row.trailer_plate.as_deref()) {
        (Some(truck), Some(trailer)) => format!("{} / {}", truck, trailer),
        (Some(truck), None) => truck.to_string(),
        (None, Some(trailer)) => trailer.to_string(),
        (None, None) => String::new(),
    }
}

/// Write an export body to a file (CLI download path)
pub fn write_export(export: &CsvExport, path: &std::path::Path) -> Result<()> {
    let mut file = std::fs::File::create(path)?;
    file.write_all(export.body.as_bytes())?;
    file.flush()?;
    Ok(())
}
