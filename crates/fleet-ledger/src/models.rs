//! Records persisted by the entity store and the inputs used to create them
//!
//! Reference entities (drivers, trucks, trailers, tires, categories) are
//! created with a status defaulted at insert time. Expenses are insert-only.

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use sqlx::FromRow;

use crate::constants;
use crate::error::{LedgerError, Result};

// =============================================================================
// Reference Entities
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct Driver {
    pub id: i64,
    pub name: String,
    pub phone: Option<String>,
    pub licence_number: Option<String>,
    pub status: String,
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewDriver {
    pub name: Option<String>,
    pub phone: Option<String>,
    #[serde(alias = "cnh")]
    pub licence_number: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct Truck {
    pub id: i64,
    pub plate: String,
    pub model: Option<String>,
    pub year: Option<i64>,
    pub odometer: Option<i64>,
    pub status: String,
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewTruck {
    pub plate: Option<String>,
    pub model: Option<String>,
    #[serde(default, deserialize_with = "lenient_int")]
    pub year: Option<i64>,
    #[serde(default, deserialize_with = "lenient_int")]
    pub odometer: Option<i64>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct Trailer {
    pub id: i64,
    pub plate: String,
    pub kind: Option<String>,
    pub year: Option<i64>,
    pub status: String,
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewTrailer {
    pub plate: Option<String>,
    #[serde(alias = "type")]
    pub kind: Option<String>,
    #[serde(default, deserialize_with = "lenient_int")]
    pub year: Option<i64>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct Tire {
    pub id: i64,
    pub code: String,
    pub brand: Option<String>,
    pub model: Option<String>,
    pub purchase_date: Option<String>,
    pub purchase_value: Option<f64>,
    pub state: String,
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewTire {
    pub code: Option<String>,
    pub brand: Option<String>,
    pub model: Option<String>,
    pub purchase_date: Option<String>,
    pub purchase_value: Option<f64>,
    pub state: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub kind: Option<String>,
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewCategory {
    pub name: Option<String>,
    pub kind: Option<String>,
}

// =============================================================================
// Tire Lifecycle
// =============================================================================

/// Which kind of vehicle a tire is mounted on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VehicleType {
    Truck,
    Trailer,
}

impl VehicleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            VehicleType::Truck => "truck",
            VehicleType::Trailer => "trailer",
        }
    }
}

impl std::fmt::Display for VehicleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for VehicleType {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "truck" => Ok(VehicleType::Truck),
            "trailer" => Ok(VehicleType::Trailer),
            other => Err(LedgerError::validation(format!(
                "invalid vehicle type '{}'. Use: truck, trailer",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct TireInstallation {
    pub id: i64,
    pub tire_id: i64,
    pub vehicle_type: String,
    pub vehicle_id: i64,
    pub position: Option<String>,
    pub installed_at: String,
    pub removed_at: Option<String>,
    pub installed_odometer: Option<i64>,
    pub removed_odometer: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewTireInstallation {
    #[serde(default, deserialize_with = "lenient_int")]
    pub tire_id: Option<i64>,
    pub vehicle_type: Option<VehicleType>,
    #[serde(default, deserialize_with = "lenient_int")]
    pub vehicle_id: Option<i64>,
    pub position: Option<String>,
    pub installed_at: Option<String>,
    pub removed_at: Option<String>,
    #[serde(default, deserialize_with = "lenient_int")]
    pub installed_odometer: Option<i64>,
    #[serde(default, deserialize_with = "lenient_int")]
    pub removed_odometer: Option<i64>,
}

/// Narrows the installation listing to one tire or one vehicle
#[derive(Debug, Clone, Copy, Default)]
pub struct InstallationFilter {
    pub tire_id: Option<i64>,
    /// Only applied when both type and id are present
    pub vehicle: Option<(VehicleType, i64)>,
}

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct TireRetread {
    pub id: i64,
    pub tire_id: i64,
    pub date: String,
    pub value: f64,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewTireRetread {
    #[serde(default, deserialize_with = "lenient_int")]
    pub tire_id: Option<i64>,
    pub date: Option<String>,
    pub value: Option<f64>,
    pub notes: Option<String>,
}

// =============================================================================
// Expenses
// =============================================================================

/// Expense as submitted by a caller, before validation
///
/// Reference ids and the odometer are accepted as numbers or numeric strings (HTML form values).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExpenseInput {
    #[serde(default, deserialize_with = "lenient_int")]
    pub driver_id: Option<i64>,
    #[serde(default, deserialize_with = "lenient_int")]
    pub truck_id: Option<i64>,
    #[serde(default, deserialize_with = "lenient_int")]
    pub trailer_id: Option<i64>,
    #[serde(default, deserialize_with = "lenient_int")]
    pub tire_id: Option<i64>,
    #[serde(default, deserialize_with = "lenient_int")]
    pub category_id: Option<i64>,
    pub date: Option<String>,
    pub value: Option<f64>,
    pub invoice_number: Option<String>,
    pub supplier: Option<String>,
    #[serde(default, deserialize_with = "lenient_int")]
    pub odometer: Option<i64>,
    pub attachment_url: Option<String>,
    pub description: Option<String>,
}

/// Validated expense ready to be written
#[derive(Debug, Clone, PartialEq)]
pub struct NewExpense {
    pub driver_id: Option<i64>,
    pub truck_id: Option<i64>,
    pub trailer_id: Option<i64>,
    pub tire_id: Option<i64>,
    pub category_id: i64,
    pub date: NaiveDate,
    pub value: f64,
    pub invoice_number: Option<String>,
    pub supplier: Option<String>,
    pub odometer: Option<i64>,
    pub attachment_url: Option<String>,
    pub description: Option<String>,
}

impl ExpenseInput {
    /// Check required fields (category, date, value) and normalize optional text
    pub fn validate(&self) -> Result<NewExpense> {
        let date = non_empty(&self.date);
        let (Some(category_id), Some(date), Some(value)) = (self.category_id, date, self.value) else {
            return Err(LedgerError::validation("category, date and value are required"));
        };

        if !value.is_finite() || value < 0.0 {
            return Err(LedgerError::validation(format!(
                "value must be a non-negative amount, got {}",
                value
            )));
        }

        Ok(NewExpense {
            driver_id: self.driver_id,
            truck_id: self.truck_id,
            trailer_id: self.trailer_id,
            tire_id: self.tire_id,
            category_id,
            date: parse_date(&date, "date")?,
            value,
            invoice_number: non_empty(&self.invoice_number),
            supplier: non_empty(&self.supplier),
            odometer: self.odometer,
            attachment_url: non_empty(&self.attachment_url),
            description: non_empty(&self.description),
        })
    }
}

/// Expense joined with the display fields of everything it references
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct ExpenseRow {
    pub id: i64,
    pub date: String,
    pub value: f64,
    pub driver_id: Option<i64>,
    pub truck_id: Option<i64>,
    pub trailer_id: Option<i64>,
    pub tire_id: Option<i64>,
    pub category_id: i64,
    pub invoice_number: Option<String>,
    pub supplier: Option<String>,
    pub odometer: Option<i64>,
    pub attachment_url: Option<String>,
    pub description: Option<String>,
    pub created_at: Option<String>,
    pub driver_name: Option<String>,
    pub truck_plate: Option<String>,
    pub trailer_plate: Option<String>,
    pub tire_code: Option<String>,
    pub category_name: Option<String>,
}

// =============================================================================
// Input Helpers
// =============================================================================

/// Trimmed text, or None when absent or blank
pub(crate) fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Trimmed text that must be present
pub(crate) fn required(value: &Option<String>, field: &str) -> Result<String> {
    non_empty(value).ok_or_else(|| LedgerError::validation(format!("{} is required", field)))
}

pub(crate) fn parse_date(value: &str, field: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), constants::DATE_FORMAT).map_err(|_| {
        LedgerError::validation(format!("{} must be a YYYY-MM-DD date, got '{}'", field, value))
    })
}

/// Optional date, normalized to `YYYY-MM-DD` when present
pub(crate) fn optional_date(value: &Option<String>, field: &str) -> Result<Option<String>> {
    non_empty(value)
        .map(|d| parse_date(&d, field).map(|date| date.format(constants::DATE_FORMAT).to_string()))
        .transpose()
}

/// Parse a reference id from text; blank or non-numeric text yields None
pub fn parse_id(value: &str) -> Option<i64> {
    value.trim().parse().ok()
}

#[derive(Deserialize)]
#[serde(untagged)]
enum IntValue {
    Number(i64),
    Text(String),
}

/// Integer field that also accepts numeric text; blank text and null are absent
fn lenient_int<'de, D>(deserializer: D) -> std::result::Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<IntValue>::deserialize(deserializer)? {
        None => Ok(None),
        Some(IntValue::Number(n)) => Ok(Some(n)),
        Some(IntValue::Text(text)) if text.trim().is_empty() => Ok(None),
        Some(IntValue::Text(text)) => parse_id(&text)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid number '{}'", text))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(category_id: Option<i64>, date: Option<&str>, value: Option<f64>) -> ExpenseInput {
        ExpenseInput {
            category_id,
            date: date.map(|d| d.to_string()),
            value,
            ..Default::default()
        }
    }

    #[test]
    fn test_validate_requires_category_date_and_value() {
        assert!(matches!(
            input(None, Some("2024-03-01"), Some(10.0)).validate(),
            Err(LedgerError::Validation(_))
        ));
        assert!(matches!(
            input(Some(1), None, Some(10.0)).validate(),
            Err(LedgerError::Validation(_))
        ));
        assert!(matches!(
            input(Some(1), Some("  "), Some(10.0)).validate(),
            Err(LedgerError::Validation(_))
        ));
        assert!(matches!(
            input(Some(1), Some("2024-03-01"), None).validate(),
            Err(LedgerError::Validation(_))
        ));
    }

    #[test]
    fn test_validate_accepts_zero_and_rejects_negative() {
        let expense = input(Some(1), Some("2024-03-01"), Some(0.0)).validate().unwrap();
        assert_eq!(expense.value, 0.0);
        assert_eq!(expense.date, NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());

        assert!(input(Some(1), Some("2024-03-01"), Some(-5.0)).validate().is_err());
        assert!(input(Some(1), Some("2024-03-01"), Some(f64::NAN)).validate().is_err());
    }

    #[test]
    fn test_validate_rejects_malformed_date() {
        let err = input(Some(1), Some("01/03/2024"), Some(5.0)).validate().unwrap_err();
        assert!(err.to_string().contains("YYYY-MM-DD"));
    }

    #[test]
    fn test_validate_blanks_become_none() {
        let mut raw = input(Some(1), Some("2024-03-01"), Some(5.0));
        raw.supplier = Some("  ".to_string());
        raw.description = Some(" tolls on BR-116 ".to_string());

        let expense = raw.validate().unwrap();
        assert_eq!(expense.supplier, None);
        assert_eq!(expense.description.as_deref(), Some("tolls on BR-116"));
    }

    #[test]
    fn test_expense_input_accepts_string_ids() {
        let raw: ExpenseInput = serde_json::from_str(
            r#"{"driver_id": "3", "truck_id": null, "trailer_id": "", "category_id": 2,
                "date": "2024-03-01", "value": 12.5}"#,
        )
        .unwrap();

        assert_eq!(raw.driver_id, Some(3));
        assert_eq!(raw.truck_id, None);
        assert_eq!(raw.trailer_id, None);
        assert_eq!(raw.tire_id, None);
        assert_eq!(raw.category_id, Some(2));
    }

    #[test]
    fn test_expense_input_rejects_non_numeric_id() {
        let raw = serde_json::from_str::<ExpenseInput>(r#"{"driver_id": "abc"}"#);
        assert!(raw.is_err());
    }

    #[test]
    fn test_form_values_as_text() {
        let truck: NewTruck =
            serde_json::from_str(r#"{"plate": "ABC1D23", "model": "", "year": "2020", "odometer": "", "status": "active"}"#)
                .unwrap();
        assert_eq!(truck.year, Some(2020));
        assert_eq!(truck.odometer, None);

        let trailer: NewTrailer = serde_json::from_str(r#"{"plate": "TRL0001", "type": "reefer", "year": ""}"#).unwrap();
        assert_eq!(trailer.kind.as_deref(), Some("reefer"));
        assert_eq!(trailer.year, None);

        let driver: NewDriver = serde_json::from_str(r#"{"name": "Ana", "phone": "", "cnh": "12345"}"#).unwrap();
        assert_eq!(driver.licence_number.as_deref(), Some("12345"));

        let expense: ExpenseInput = serde_json::from_str(r#"{"odometer": "152300"}"#).unwrap();
        assert_eq!(expense.odometer, Some(152_300));

        assert!(serde_json::from_str::<NewTruck>(r#"{"plate": "ABC1D23", "year": "twenty"}"#).is_err());
    }

    #[test]
    fn test_vehicle_type_parse() {
        assert_eq!("Truck".parse::<VehicleType>().unwrap(), VehicleType::Truck);
        assert_eq!("trailer".parse::<VehicleType>().unwrap(), VehicleType::Trailer);
        assert!("bus".parse::<VehicleType>().is_err());
    }
}
