//! Expense filters: optional dimensions compiled into one conjunctive predicate
//!
//! The same `ExpenseFilter` is pushed into the listing, totals and export
//! queries, so every report over a given filter sees the same rows.
//!
//! Raw request values that do not parse (non-numeric ids, blank strings,
//! dates not in `YYYY-MM-DD`) are treated as absent.

use chrono::NaiveDate;
use serde::Deserialize;
use sqlx::{QueryBuilder, Sqlite};
use tracing::debug;

use crate::constants;
use crate::models::parse_id;

/// Filter dimensions exactly as they arrive in a query string
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FilterParams {
    pub driver_id: Option<String>,
    pub truck_id: Option<String>,
    pub trailer_id: Option<String>,
    pub tire_id: Option<String>,
    pub category_id: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

/// Typed expense filter. Every dimension defaults to unconstrained.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExpenseFilter {
    pub driver_id: Option<i64>,
    pub truck_id: Option<i64>,
    pub trailer_id: Option<i64>,
    pub tire_id: Option<i64>,
    pub category_id: Option<i64>,
    /// Inclusive lower bound
    pub start_date: Option<NaiveDate>,
    /// Inclusive upper bound
    pub end_date: Option<NaiveDate>,
}

/// One predicate over an expense column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Clause {
    Driver(i64),
    Truck(i64),
    Trailer(i64),
    Tire(i64),
    Category(i64),
    OnOrAfter(NaiveDate),
    OnOrBefore(NaiveDate),
}

impl Clause {
    fn column(&self) -> &'static str {
        match self {
            Clause::Driver(_) => "e.driver_id",
            Clause::Truck(_) => "e.truck_id",
            Clause::Trailer(_) => "e.trailer_id",
            Clause::Tire(_) => "e.tire_id",
            Clause::Category(_) => "e.category_id",
            Clause::OnOrAfter(_) | Clause::OnOrBefore(_) => "e.date",
        }
    }

    fn operator(&self) -> &'static str {
        match self {
            Clause::OnOrAfter(_) => " >= ",
            Clause::OnOrBefore(_) => " <= ",
            _ => " = ",
        }
    }

    fn push_to(&self, qb: &mut QueryBuilder<'_, Sqlite>) {
        qb.push(" AND ").push(self.column()).push(self.operator());
        match *self {
            Clause::Driver(id)
            | Clause::Truck(id)
            | Clause::Trailer(id)
            | Clause::Tire(id)
            | Clause::Category(id) => {
                qb.push_bind(id);
            }
            Clause::OnOrAfter(date) | Clause::OnOrBefore(date) => {
                qb.push_bind(date.format(constants::DATE_FORMAT).to_string());
            }
        }
    }
}

impl ExpenseFilter {
    /// Build a filter from raw request values, dropping anything malformed
    pub fn from_params(params: &FilterParams) -> Self {
        Self {
            driver_id: lenient_id("driver_id", &params.driver_id),
            truck_id: lenient_id("truck_id", &params.truck_id),
            trailer_id: lenient_id("trailer_id", &params.trailer_id),
            tire_id: lenient_id("tire_id", &params.tire_id),
            category_id: lenient_id("category_id", &params.category_id),
            start_date: lenient_date("start_date", &params.start_date),
            end_date: lenient_date("end_date", &params.end_date),
        }
    }

    /// Restrict the date range to `[start, end]`, keeping any tighter bound already set
    pub fn narrowed_to(self, start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            start_date: Some(self.start_date.map_or(start, |s| s.max(start))),
            end_date: Some(self.end_date.map_or(end, |e| e.min(end))),
            ..self
        }
    }

    /// The conjunctive clauses of this filter, in a fixed order
    pub fn clauses(&self) -> Vec<Clause> {
        [
            self.driver_id.map(Clause::Driver),
            self.truck_id.map(Clause::Truck),
            self.trailer_id.map(Clause::Trailer),
            self.tire_id.map(Clause::Tire),
            self.category_id.map(Clause::Category),
            self.start_date.map(Clause::OnOrAfter),
            self.end_date.map(Clause::OnOrBefore),
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.clauses().is_empty()
    }

    /// Append `WHERE` plus every clause (values bound, never interpolated).
    /// Expects the expenses table aliased as `e`.
    pub fn push_where(&self, qb: &mut QueryBuilder<'_, Sqlite>) {
        qb.push(" WHERE 1=1");
        for clause in self.clauses() {
            clause.push_to(qb);
        }
    }
}

fn lenient_id(field: &str, raw: &Option<String>) -> Option<i64> {
    let raw = raw.as_deref().map(str::trim).filter(|s| !s.is_empty())?;
    let id = parse_id(raw);
    if id.is_none() {
        debug!(field, value = raw, "ignoring malformed filter id");
    }
    id
}

fn lenient_date(field: &str, raw: &Option<String>) -> Option<NaiveDate> {
    let raw = raw.as_deref().map(str::trim).filter(|s| !s.is_empty())?;
    let date = NaiveDate::parse_from_str(raw, constants::DATE_FORMAT).ok();
    if date.is_none() {
        debug!(field, value = raw, "ignoring malformed filter date");
    }
    date
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn params(pairs: &[(&str, &str)]) -> FilterParams {
        let mut p = FilterParams::default();
        for (key, value) in pairs {
            let value = Some(value.to_string());
            match *key {
                "driver_id" => p.driver_id = value,
                "truck_id" => p.truck_id = value,
                "trailer_id" => p.trailer_id = value,
                "tire_id" => p.tire_id = value,
                "category_id" => p.category_id = value,
                "start_date" => p.start_date = value,
                "end_date" => p.end_date = value,
                _ => panic!("unknown key {}", key),
            }
        }
        p
    }

    #[test]
    fn test_empty_params_build_open_filter() {
        let filter = ExpenseFilter::from_params(&FilterParams::default());
        assert!(filter.is_empty());
        assert_eq!(filter, ExpenseFilter::default());
    }

    #[test]
    fn test_all_dimensions_parse() {
        let filter = ExpenseFilter::from_params(&params(&[
            ("driver_id", "1"),
            ("truck_id", "2"),
            ("trailer_id", "3"),
            ("tire_id", "4"),
            ("category_id", "5"),
            ("start_date", "2024-03-01"),
            ("end_date", "2024-03-31"),
        ]));

        assert_eq!(
            filter.clauses(),
            vec![
                Clause::Driver(1),
                Clause::Truck(2),
                Clause::Trailer(3),
                Clause::Tire(4),
                Clause::Category(5),
                Clause::OnOrAfter(date(2024, 3, 1)),
                Clause::OnOrBefore(date(2024, 3, 31)),
            ]
        );
    }

    #[test]
    fn test_malformed_values_are_absent() {
        let filter = ExpenseFilter::from_params(&params(&[
            ("driver_id", "abc"),
            ("truck_id", ""),
            ("category_id", " 7 "),
            ("start_date", "03/01/2024"),
            ("end_date", "2024-02-30"),
        ]));

        assert_eq!(filter.clauses(), vec![Clause::Category(7)]);
    }

    #[test]
    fn test_push_where_binds_every_clause() {
        let filter = ExpenseFilter {
            driver_id: Some(1),
            start_date: Some(date(2024, 3, 1)),
            end_date: Some(date(2024, 3, 31)),
            ..Default::default()
        };

        let mut qb = QueryBuilder::<Sqlite>::new("SELECT * FROM expenses e");
        filter.push_where(&mut qb);

        assert_eq!(
            qb.sql(),
            "SELECT * FROM expenses e WHERE 1=1 AND e.driver_id = ? AND e.date >= ? AND e.date <= ?"
        );
    }

    #[test]
    fn test_push_where_without_clauses() {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM expenses e");
        ExpenseFilter::default().push_where(&mut qb);
        assert_eq!(qb.sql(), "SELECT COUNT(*) FROM expenses e WHERE 1=1");
    }

    #[test]
    fn test_narrowed_to_keeps_tighter_bounds() {
        let open = ExpenseFilter::default().narrowed_to(date(2024, 3, 1), date(2024, 3, 31));
        assert_eq!(open.start_date, Some(date(2024, 3, 1)));
        assert_eq!(open.end_date, Some(date(2024, 3, 31)));

        let tight = ExpenseFilter {
            driver_id: Some(9),
            start_date: Some(date(2024, 3, 10)),
            end_date: Some(date(2024, 6, 1)),
            ..Default::default()
        }
        .narrowed_to(date(2024, 3, 1), date(2024, 3, 31));

        assert_eq!(tight.driver_id, Some(9));
        assert_eq!(tight.start_date, Some(date(2024, 3, 10)));
        assert_eq!(tight.end_date, Some(date(2024, 3, 31)));
    }
}
