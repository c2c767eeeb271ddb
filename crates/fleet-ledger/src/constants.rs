//! Centralized constants for the fleet expense ledger

// =============================================================================
// Dates
// =============================================================================

/// Calendar day format used for storage, filters and export
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Month key format used by the dashboard summary
pub const MONTH_FORMAT: &str = "%Y-%m";

// =============================================================================
// Entity Defaults
// =============================================================================

/// Status assigned to new drivers, trucks and trailers
pub const DEFAULT_VEHICLE_STATUS: &str = "active";

/// State assigned to new tires
pub const DEFAULT_TIRE_STATE: &str = "in stock";

/// Categories seeded when the store is initialized
pub const DEFAULT_CATEGORIES: &[&str] = &[
    "Fuel",
    "Truck maintenance",
    "Trailer maintenance",
    "Tires",
    "Tolls",
    "Meals",
    "Documentation / Licensing",
    "Insurance",
    "AdBlue / DEF",
    "Fines",
    "Other",
];

// =============================================================================
// Export
// =============================================================================

/// Column header of the delimited expense export
pub const EXPORT_HEADER: [&str; 8] = [
    "Date",
    "Driver",
    "Vehicle",
    "Category",
    "Value",
    "Invoice Number",
    "Supplier",
    "Description",
];

/// Field separator of the delimited export (comma is the decimal separator)
pub const EXPORT_DELIMITER: u8 = b';';

/// MIME type of the delimited export
pub const EXPORT_CONTENT_TYPE: &str = "text/csv; charset=utf-8";

/// Suggested download file name for the delimited export
pub const DEFAULT_EXPORT_FILE_NAME: &str = "expenses.csv";

// =============================================================================
// File Names
// =============================================================================

/// SQLite database file name (inside the data directory)
pub const DATABASE_FILENAME: &str = "fleet.sqlite";
