//! SQLite entity store for drivers, vehicles, tires, categories and expenses
//!
//! Reference entities are inserted with a defaulted status and listed in
//! natural-key order. Expenses are insert-only; reads go through
//! `query_expenses`, which every report mode shares.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

use crate::constants;
use crate::error::{LedgerError, Result};
use crate::filter::ExpenseFilter;
use crate::models::{
    Category, Driver, ExpenseInput, ExpenseRow, InstallationFilter, NewCategory, NewDriver, NewTire,
    NewTireInstallation, NewTireRetread, NewTrailer, NewTruck, Tire, TireInstallation, TireRetread, Trailer,
    Truck, non_empty, optional_date, parse_date, required,
};

/// Joined expense projection shared by every report query
const EXPENSE_SELECT: &str = "
    SELECT e.id, e.date, e.value, e.driver_id, e.truck_id, e.trailer_id, e.tire_id,
           e.category_id, e.invoice_number, e.supplier, e.odometer, e.attachment_url,
           e.description, e.created_at,
           d.name AS driver_name,
           t.plate AS truck_plate,
           tr.plate AS trailer_plate,
           ti.code AS tire_code,
           c.name AS category_name
    FROM expenses e
    LEFT JOIN drivers d ON e.driver_id = d.id
    LEFT JOIN trucks t ON e.truck_id = t.id
    LEFT JOIN trailers tr ON e.trailer_id = tr.id
    LEFT JOIN tires ti ON e.tire_id = ti.id
    LEFT JOIN expense_categories c ON e.category_id = c.id";

/// Store handle. Cheap to clone; clones share one connection pool.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open or create the database file and make sure the schema exists
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5))
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new().max_connections(8).connect_with(options).await?;

        let store = Self { pool };
        store.init_schema().await?;
        info!(path = %path.display(), "opened expense store");

        Ok(store)
    }

    /// Private in-memory database (one connection, so every query sees the same data)
    pub async fn open_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Create tables and indexes, then seed the default categories
    async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            "
            CREATE TABLE IF NOT EXISTS drivers (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                phone TEXT,
                licence_number TEXT,
                status TEXT NOT NULL DEFAULT 'active',
                created_at TEXT DEFAULT CURRENT_TIMESTAMP
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "
            CREATE TABLE IF NOT EXISTS trucks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                plate TEXT NOT NULL UNIQUE,
                model TEXT,
                year INTEGER,
                odometer INTEGER,
                status TEXT NOT NULL DEFAULT 'active',
                created_at TEXT DEFAULT CURRENT_TIMESTAMP
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "
            CREATE TABLE IF NOT EXISTS trailers (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                plate TEXT NOT NULL UNIQUE,
                kind TEXT,
                year INTEGER,
                status TEXT NOT NULL DEFAULT 'active',
                created_at TEXT DEFAULT CURRENT_TIMESTAMP
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "
            CREATE TABLE IF NOT EXISTS tires (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                code TEXT NOT NULL UNIQUE,
                brand TEXT,
                model TEXT,
                purchase_date TEXT,
                purchase_value REAL,
                state TEXT NOT NULL DEFAULT 'in stock',
                created_at TEXT DEFAULT CURRENT_TIMESTAMP
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "
            -- vehicle_id points at trucks or trailers depending on vehicle_type
            CREATE TABLE IF NOT EXISTS tire_installations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                tire_id INTEGER NOT NULL REFERENCES tires(id),
                vehicle_type TEXT NOT NULL,
                vehicle_id INTEGER NOT NULL,
                position TEXT,
                installed_at TEXT NOT NULL,
                removed_at TEXT,
                installed_odometer INTEGER,
                removed_odometer INTEGER
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "
            CREATE TABLE IF NOT EXISTS tire_retreads (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                tire_id INTEGER NOT NULL REFERENCES tires(id),
                date TEXT NOT NULL,
                value REAL NOT NULL,
                notes TEXT
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "
            CREATE TABLE IF NOT EXISTS expense_categories (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                kind TEXT,
                created_at TEXT DEFAULT CURRENT_TIMESTAMP
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "
            -- Expenses are insert-only
            CREATE TABLE IF NOT EXISTS expenses (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                driver_id INTEGER REFERENCES drivers(id),
                truck_id INTEGER REFERENCES trucks(id),
                trailer_id INTEGER REFERENCES trailers(id),
                tire_id INTEGER REFERENCES tires(id),
                category_id INTEGER NOT NULL REFERENCES expense_categories(id),
                date TEXT NOT NULL,
                value REAL NOT NULL,
                invoice_number TEXT,
                supplier TEXT,
                odometer INTEGER,
                attachment_url TEXT,
                description TEXT,
                created_at TEXT DEFAULT CURRENT_TIMESTAMP
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        for index in [
            "CREATE INDEX IF NOT EXISTS idx_expenses_date ON expenses(date)",
            "CREATE INDEX IF NOT EXISTS idx_expenses_category ON expenses(category_id)",
            "CREATE INDEX IF NOT EXISTS idx_expenses_truck ON expenses(truck_id)",
            "CREATE INDEX IF NOT EXISTS idx_expenses_trailer ON expenses(trailer_id)",
            "CREATE INDEX IF NOT EXISTS idx_expenses_driver ON expenses(driver_id)",
            "CREATE INDEX IF NOT EXISTS idx_expenses_tire ON expenses(tire_id)",
            "CREATE INDEX IF NOT EXISTS idx_tire_installations_tire ON tire_installations(tire_id)",
            "CREATE INDEX IF NOT EXISTS idx_tire_installations_vehicle ON tire_installations(vehicle_type, vehicle_id)",
        ] {
            sqlx::query(index).execute(&self.pool).await?;
        }

        // Seed default categories in one transaction
        let mut tx = self.pool.begin().await?;
        for name in constants::DEFAULT_CATEGORIES {
            sqlx::query("INSERT OR IGNORE INTO expense_categories (name) VALUES (?)")
                .bind(*name)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        Ok(())
    }

    // =========================================================================
    // Drivers
    // =========================================================================

    pub async fn list_drivers(&self) -> Result<Vec<Driver>> {
        let rows = sqlx::query_as(
            "SELECT id, name, phone, licence_number, status, created_at FROM drivers ORDER BY name, id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn insert_driver(&self, driver: &NewDriver) -> Result<Driver> {
        let name = required(&driver.name, "name")?;

        let created = sqlx::query_as(
            "INSERT INTO drivers (name, phone, licence_number, status) VALUES (?, ?, ?, ?)
             RETURNING id, name, phone, licence_number, status, created_at",
        )
        .bind(&name)
        .bind(non_empty(&driver.phone))
        .bind(non_empty(&driver.licence_number))
        .bind(status_or_default(&driver.status, constants::DEFAULT_VEHICLE_STATUS))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| classify(e, "driver", &name))?;

        Ok(created)
    }

    // =========================================================================
    // Trucks
    // =========================================================================

    pub async fn list_trucks(&self) -> Result<Vec<Truck>> {
        let rows = sqlx::query_as(
            "SELECT id, plate, model, year, odometer, status, created_at FROM trucks ORDER BY plate",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn insert_truck(&self, truck: &NewTruck) -> Result<Truck> {
        let plate = required(&truck.plate, "plate")?;

        let created = sqlx::query_as(
            "INSERT INTO trucks (plate, model, year, odometer, status) VALUES (?, ?, ?, ?, ?)
             RETURNING id, plate, model, year, odometer, status, created_at",
        )
        .bind(&plate)
        .bind(non_empty(&truck.model))
        .bind(truck.year)
        .bind(truck.odometer)
        .bind(status_or_default(&truck.status, constants::DEFAULT_VEHICLE_STATUS))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| classify(e, "truck", &plate))?;

        Ok(created)
    }

    // =========================================================================
    // Trailers
    // =========================================================================

    pub async fn list_trailers(&self) -> Result<Vec<Trailer>> {
        let rows = sqlx::query_as("SELECT id, plate, kind, year, status, created_at FROM trailers ORDER BY plate")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    pub async fn insert_trailer(&self, trailer: &NewTrailer) -> Result<Trailer> {
        let plate = required(&trailer.plate, "plate")?;

        let created = sqlx::query_as(
            "INSERT INTO trailers (plate, kind, year, status) VALUES (?, ?, ?, ?)
             RETURNING id, plate, kind, year, status, created_at",
        )
        .bind(&plate)
        .bind(non_empty(&trailer.kind))
        .bind(trailer.year)
        .bind(status_or_default(&trailer.status, constants::DEFAULT_VEHICLE_STATUS))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| classify(e, "trailer", &plate))?;

        Ok(created)
    }

    // =========================================================================
    // Tires
    // =========================================================================

    pub async fn list_tires(&self) -> Result<Vec<Tire>> {
        let rows = sqlx::query_as(
            "SELECT id, code, brand, model, purchase_date, purchase_value, state, created_at
             FROM tires ORDER BY code",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn insert_tire(&self, tire: &NewTire) -> Result<Tire> {
        let code = required(&tire.code, "code")?;
        let purchase_date = optional_date(&tire.purchase_date, "purchase_date")?;

        let created = sqlx::query_as(
            "INSERT INTO tires (code, brand, model, purchase_date, purchase_value, state)
             VALUES (?, ?, ?, ?, ?, ?)
             RETURNING id, code, brand, model, purchase_date, purchase_value, state, created_at",
        )
        .bind(&code)
        .bind(non_empty(&tire.brand))
        .bind(non_empty(&tire.model))
        .bind(purchase_date)
        .bind(tire.purchase_value)
        .bind(status_or_default(&tire.state, constants::DEFAULT_TIRE_STATE))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| classify(e, "tire", &code))?;

        Ok(created)
    }

    /// Installations, most recent first
    pub async fn list_tire_installations(&self, filter: &InstallationFilter) -> Result<Vec<TireInstallation>> {
        let mut qb = QueryBuilder::<Sqlite>::new(
            "SELECT id, tire_id, vehicle_type, vehicle_id, position, installed_at, removed_at,
                    installed_odometer, removed_odometer
             FROM tire_installations WHERE 1=1",
        );
        if let Some(tire_id) = filter.tire_id {
            qb.push(" AND tire_id = ").push_bind(tire_id);
        }
        if let Some((vehicle_type, vehicle_id)) = filter.vehicle {
            qb.push(" AND vehicle_type = ").push_bind(vehicle_type.as_str());
            qb.push(" AND vehicle_id = ").push_bind(vehicle_id);
        }
        qb.push(" ORDER BY installed_at DESC, id DESC");

        let rows = qb.build_query_as().fetch_all(&self.pool).await?;
        Ok(rows)
    }

    pub async fn insert_tire_installation(&self, install: &NewTireInstallation) -> Result<TireInstallation> {
        let (Some(tire_id), Some(vehicle_type), Some(vehicle_id)) =
            (install.tire_id, install.vehicle_type, install.vehicle_id)
        else {
            return Err(LedgerError::validation(
                "tire_id, vehicle_type, vehicle_id and installed_at are required",
            ));
        };
        let installed_at = optional_date(&install.installed_at, "installed_at")?.ok_or_else(|| {
            LedgerError::validation("tire_id, vehicle_type, vehicle_id and installed_at are required")
        })?;
        let removed_at = optional_date(&install.removed_at, "removed_at")?;

        let created = sqlx::query_as(
            "INSERT INTO tire_installations
               (tire_id, vehicle_type, vehicle_id, position, installed_at, removed_at,
                installed_odometer, removed_odometer)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             RETURNING id, tire_id, vehicle_type, vehicle_id, position, installed_at, removed_at,
                       installed_odometer, removed_odometer",
        )
        .bind(tire_id)
        .bind(vehicle_type.as_str())
        .bind(vehicle_id)
        .bind(non_empty(&install.position))
        .bind(installed_at)
        .bind(removed_at)
        .bind(install.installed_odometer)
        .bind(install.removed_odometer)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| classify(e, "tire installation", &tire_id.to_string()))?;

        debug!(tire_id, vehicle = %vehicle_type, vehicle_id, "installed tire");
        Ok(created)
    }

    /// Retreads, most recent first
    pub async fn list_tire_retreads(&self, tire_id: Option<i64>) -> Result<Vec<TireRetread>> {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT id, tire_id, date, value, notes FROM tire_retreads WHERE 1=1");
        if let Some(tire_id) = tire_id {
            qb.push(" AND tire_id = ").push_bind(tire_id);
        }
        qb.push(" ORDER BY date DESC, id DESC");

        let rows = qb.build_query_as().fetch_all(&self.pool).await?;
        Ok(rows)
    }

    pub async fn insert_tire_retread(&self, retread: &NewTireRetread) -> Result<TireRetread> {
        let date = non_empty(&retread.date);
        let (Some(tire_id), Some(date), Some(value)) = (retread.tire_id, date, retread.value) else {
            return Err(LedgerError::validation("tire_id, date and value are required"));
        };
        if !value.is_finite() || value < 0.0 {
            return Err(LedgerError::validation("value must be a non-negative amount"));
        }
        let date = parse_date(&date, "date")?;

        let created = sqlx::query_as(
            "INSERT INTO tire_retreads (tire_id, date, value, notes) VALUES (?, ?, ?, ?)
             RETURNING id, tire_id, date, value, notes",
        )
        .bind(tire_id)
        .bind(date.format(constants::DATE_FORMAT).to_string())
        .bind(value)
        .bind(non_empty(&retread.notes))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| classify(e, "tire retread", &tire_id.to_string()))?;

        Ok(created)
    }

    // =========================================================================
    // Categories
    // =========================================================================

    pub async fn list_categories(&self) -> Result<Vec<Category>> {
        let rows = sqlx::query_as("SELECT id, name, kind, created_at FROM expense_categories ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    pub async fn insert_category(&self, category: &NewCategory) -> Result<Category> {
        let name = required(&category.name, "name")?;

        let created = sqlx::query_as(
            "INSERT INTO expense_categories (name, kind) VALUES (?, ?)
             RETURNING id, name, kind, created_at",
        )
        .bind(&name)
        .bind(non_empty(&category.kind))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| classify(e, "category", &name))?;

        Ok(created)
    }

    // =========================================================================
    // Expenses
    // =========================================================================

    /// Validate and insert an expense, returns the ID
    pub async fn insert_expense(&self, input: &ExpenseInput) -> Result<i64> {
        let expense = input.validate()?;

        let result = sqlx::query(
            "INSERT INTO expenses
               (driver_id, truck_id, trailer_id, tire_id, category_id, date, value,
                invoice_number, supplier, odometer, attachment_url, description)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(expense.driver_id)
        .bind(expense.truck_id)
        .bind(expense.trailer_id)
        .bind(expense.tire_id)
        .bind(expense.category_id)
        .bind(expense.date.format(constants::DATE_FORMAT).to_string())
        .bind(expense.value)
        .bind(&expense.invoice_number)
        .bind(&expense.supplier)
        .bind(expense.odometer)
        .bind(&expense.attachment_url)
        .bind(&expense.description)
        .execute(&self.pool)
        .await
        .map_err(|e| classify(e, "expense", &expense.date.to_string()))?;

        let id = result.last_insert_rowid();
        debug!(id, value = expense.value, "inserted expense");
        Ok(id)
    }

    /// Expenses matching `filter`, joined with display fields, oldest first
    pub async fn query_expenses(&self, filter: &ExpenseFilter) -> Result<Vec<ExpenseRow>> {
        let mut qb = QueryBuilder::<Sqlite>::new(EXPENSE_SELECT);
        filter.push_where(&mut qb);
        qb.push(" ORDER BY e.date ASC, e.id ASC");

        let rows: Vec<ExpenseRow> = qb.build_query_as().fetch_all(&self.pool).await?;
        debug!(rows = rows.len(), unfiltered = filter.is_empty(), "queried expenses");
        Ok(rows)
    }
}

fn status_or_default(status: &Option<String>, default: &str) -> String {
    non_empty(status).unwrap_or_else(|| default.to_string())
}

/// Map constraint violations on insert to caller-facing errors
fn classify(err: sqlx::Error, entity: &'static str, key: &str) -> LedgerError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            return LedgerError::Duplicate {
                entity,
                key: key.to_string(),
            };
        }
        if db.is_foreign_key_violation() {
            return LedgerError::UnknownReference(entity);
        }
    }
    LedgerError::Store(err)
}
