//! Totals over a filtered expense set: grand total, per-driver breakdown and
//! the month-scoped dashboard summary

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::constants;
use crate::error::LedgerError;
use crate::models::ExpenseRow;

/// How the per-driver breakdown is ordered
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BreakdownOrder {
    /// Driver name ascending (ties by driver id)
    #[default]
    #[serde(rename = "name")]
    DriverName,
    /// Subtotal descending (ties keep first-encountered order)
    #[serde(rename = "total")]
    TotalDesc,
}

impl std::str::FromStr for BreakdownOrder {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "name" => Ok(BreakdownOrder::DriverName),
            "total" => Ok(BreakdownOrder::TotalDesc),
            other => Err(LedgerError::validation(format!(
                "invalid breakdown order '{}'. Use: name, total",
                other
            ))),
        }
    }
}

/// Subtotal for one driver
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DriverTotal {
    pub driver_id: i64,
    pub driver_name: String,
    pub total: f64,
}

/// Grand total plus per-driver breakdown
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Totals {
    pub total: f64,
    pub by_driver: Vec<DriverTotal>,
}

/// Top spender of a month
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopDriver {
    pub name: String,
    pub total: f64,
}

/// Dashboard numbers for one calendar month
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthSummary {
    /// `YYYY-MM`
    pub month: String,
    pub total_month: f64,
    pub count_month: i64,
    pub top_driver: Option<TopDriver>,
}

/// Sum of all values
pub fn grand_total(rows: &[ExpenseRow]) -> f64 {
    normalize_zero(rows.iter().map(|r| r.value).sum())
}

/// Subtotals per driver in first-encountered order. Rows without a driver are left out.
fn group_by_driver(rows: &[ExpenseRow]) -> Vec<DriverTotal> {
    let mut index: HashMap<i64, usize> = HashMap::new();
    let mut totals: Vec<DriverTotal> = Vec::new();

    for row in rows {
        let Some(driver_id) = row.driver_id else {
            continue;
        };

        let slot = *index.entry(driver_id).or_insert_with(|| {
            totals.push(DriverTotal {
                driver_id,
                driver_name: row.driver_name.clone().unwrap_or_default(),
                total: 0.0,
            });
            totals.len() - 1
        });
        totals[slot].total += row.value;
    }

    totals
}

/// Subtotals per driver. Rows without a driver are left out.
pub fn driver_breakdown(rows: &[ExpenseRow], order: BreakdownOrder) -> Vec<DriverTotal> {
    let mut totals = group_by_driver(rows);

    // Both sorts are stable, so equal keys keep first-encountered order
    match order {
        BreakdownOrder::DriverName => totals.sort_by(|a, b| {
            a.driver_name
                .cmp(&b.driver_name)
                .then(a.driver_id.cmp(&b.driver_id))
        }),
        BreakdownOrder::TotalDesc => totals.sort_by(|a, b| b.total.total_cmp(&a.total)),
    }

    totals
}

/// Grand total and breakdown in one pass over the rows
pub fn aggregate(rows: &[ExpenseRow], order: BreakdownOrder) -> Totals {
    Totals {
        total: grand_total(rows),
        by_driver: driver_breakdown(rows, order),
    }
}

/// First and last day of the month containing `day`
pub fn month_bounds(day: NaiveDate) -> (NaiveDate, NaiveDate) {
    let first = day.with_day(1).unwrap_or(day);
    let last = first
        .checked_add_months(chrono::Months::new(1))
        .and_then(|next| next.pred_opt())
        .unwrap_or(day);
    (first, last)
}

/// Month summary from rows already restricted to that month.
///
/// When several drivers tie for the highest subtotal the first one
/// encountered wins; that order is only stable within one query.
pub fn summarize_month(today: NaiveDate, rows: &[ExpenseRow]) -> MonthSummary {
    let top_driver = group_by_driver(rows)
        .into_iter()
        .fold(None, |best: Option<DriverTotal>, driver| match best {
            Some(best) if driver.total <= best.total => Some(best),
            _ => Some(driver),
        })
        .map(|d| TopDriver {
            name: d.driver_name,
            total: d.total,
        });

    MonthSummary {
        month: today.format(constants::MONTH_FORMAT).to_string(),
        total_month: grand_total(rows),
        count_month: rows.len() as i64,
        top_driver,
    }
}

/// Normalize -0.0 to 0.0 for cleaner display
pub(crate) fn normalize_zero(val: f64) -> f64 {
    if val == 0.0 { 0.0 } else { val }
}
