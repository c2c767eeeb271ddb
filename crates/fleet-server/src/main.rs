//! Fleet expense tracking
//!
//! Records drivers, vehicles, tires and categorized expenses in SQLite and
//! serves filtered reports (listing, CSV export, monthly dashboard) over HTTP
//! or straight to the terminal.

mod api;
mod config;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fleet_ledger::models::{ExpenseInput, ExpenseRow, NewCategory, NewDriver};
use fleet_ledger::report::{format_value, vehicle_label, write_export};
use fleet_ledger::{
    BreakdownOrder, ExpenseFilter, FilterParams, ReportMode, ReportOptions, ReportOutput, Store, run_report,
};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use config::FileConfig;

#[derive(Parser, Debug)]
#[command(name = "fleet-expenses")]
#[command(about = "Expense tracking and reporting for a truck fleet")]
struct Args {
    /// Config file (defaults apply when it does not exist)
    #[arg(short, long, default_value = config::CONFIG_FILE, global = true)]
    config: PathBuf,

    /// SQLite database path (overrides [database] path)
    #[arg(short, long, env = "FLEET_DATABASE", global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API
    Serve {
        /// Listen address (overrides [server] bind)
        #[arg(long)]
        bind: Option<String>,
    },

    /// Record and report expenses
    Expense {
        #[command(subcommand)]
        action: ExpenseCommand,
    },

    /// Manage drivers
    Driver {
        #[command(subcommand)]
        action: DriverCommand,
    },

    /// Manage expense categories
    Category {
        #[command(subcommand)]
        action: CategoryCommand,
    },

    /// Current month summary
    Dashboard {
        #[command(flatten)]
        filter: FilterArgs,
    },
}

/// Filter dimensions shared by the report commands
#[derive(clap::Args, Debug, Default)]
struct FilterArgs {
    #[arg(long)]
    driver_id: Option<String>,

    #[arg(long)]
    truck_id: Option<String>,

    #[arg(long)]
    trailer_id: Option<String>,

    #[arg(long)]
    tire_id: Option<String>,

    #[arg(long)]
    category_id: Option<String>,

    /// First day included (YYYY-MM-DD)
    #[arg(long)]
    from: Option<String>,

    /// Last day included (YYYY-MM-DD)
    #[arg(long)]
    to: Option<String>,
}

impl FilterArgs {
    fn to_filter(&self) -> ExpenseFilter {
        ExpenseFilter::from_params(&FilterParams {
            driver_id: self.driver_id.clone(),
            truck_id: self.truck_id.clone(),
            trailer_id: self.trailer_id.clone(),
            tire_id: self.tire_id.clone(),
            category_id: self.category_id.clone(),
            start_date: self.from.clone(),
            end_date: self.to.clone(),
        })
    }
}

#[derive(Subcommand, Debug)]
enum ExpenseCommand {
    /// Add a new expense
    Add {
        /// Date (YYYY-MM-DD)
        #[arg(long)]
        date: String,

        /// Category name or ID
        #[arg(long)]
        category: String,

        /// Amount
        #[arg(long)]
        value: f64,

        #[arg(long)]
        driver_id: Option<i64>,

        #[arg(long)]
        truck_id: Option<i64>,

        #[arg(long)]
        trailer_id: Option<i64>,

        #[arg(long)]
        tire_id: Option<i64>,

        #[arg(long)]
        invoice_number: Option<String>,

        #[arg(long)]
        supplier: Option<String>,

        /// Odometer reading at the time of the expense
        #[arg(long)]
        odometer: Option<i64>,

        #[arg(long)]
        description: Option<String>,
    },

    /// List expenses with totals
    List {
        #[command(flatten)]
        filter: FilterArgs,

        /// Breakdown order: name, total (defaults to [report] breakdown_order)
        #[arg(long)]
        order: Option<String>,
    },

    /// Export expenses to a `;`-separated CSV file
    Export {
        /// Path to output CSV file (defaults to [report] export_file_name)
        file: Option<PathBuf>,

        #[command(flatten)]
        filter: FilterArgs,
    },
}

#[derive(Subcommand, Debug)]
enum DriverCommand {
    /// List all drivers
    List,

    /// Add a driver
    Add {
        #[arg(long)]
        name: String,

        #[arg(long)]
        phone: Option<String>,

        #[arg(long)]
        licence_number: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum CategoryCommand {
    /// List all categories
    List,

    /// Add a category
    Add {
        #[arg(long)]
        name: String,

        /// Free-form grouping, e.g. fixed or variable
        #[arg(long)]
        kind: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let file_config = FileConfig::load_or_default(&args.config)?;

    init_tracing(file_config.log_level.as_deref());

    let db_path = args.database.clone().unwrap_or_else(|| file_config.database.path.clone());
    let store = Store::open(&db_path)
        .await
        .with_context(|| format!("Failed to open database: {}", db_path.display()))?;

    match args.command {
        Command::Serve { bind } => serve(store, &file_config, bind).await,
        Command::Expense { action } => handle_expense_command(action, &store, &file_config).await,
        Command::Driver { action } => handle_driver_command(action, &store).await,
        Command::Category { action } => handle_category_command(action, &store).await,
        Command::Dashboard { filter } => handle_dashboard(&filter, &store, &file_config).await,
    }
}

/// Logs go to stderr so CLI tables stay clean on stdout
fn init_tracing(level: Option<&str>) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.unwrap_or("info")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn serve(store: Store, file_config: &FileConfig, bind: Option<String>) -> Result<()> {
    let bind = bind.unwrap_or_else(|| file_config.server.bind.clone());
    let state = api::AppState {
        store,
        report: file_config.report.clone(),
    };

    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("Failed to bind {}", bind))?;
    info!(%bind, "fleet expense API listening");

    axum::serve(listener, api::router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("HTTP server failed")?;

    info!("shut down");
    Ok(())
}

fn report_options(file_config: &FileConfig, order: Option<&str>) -> Result<ReportOptions> {
    let order = match order {
        Some(raw) => raw.parse::<BreakdownOrder>()?,
        None => file_config.report.breakdown_order,
    };

    Ok(ReportOptions {
        order,
        today: chrono::Local::now().date_naive(),
        export_file_name: file_config.report.export_file_name.clone(),
    })
}

/// Handle expense subcommands
async fn handle_expense_command(action: ExpenseCommand, store: &Store, file_config: &FileConfig) -> Result<()> {
    match action {
        ExpenseCommand::Add {
            date,
            category,
            value,
            driver_id,
            truck_id,
            trailer_id,
            tire_id,
            invoice_number,
            supplier,
            odometer,
            description,
        } => {
            let category_id = resolve_category(store, &category).await?;

            let input = ExpenseInput {
                driver_id,
                truck_id,
                trailer_id,
                tire_id,
                category_id: Some(category_id),
                date: Some(date),
                value: Some(value),
                invoice_number,
                supplier,
                odometer,
                attachment_url: None,
                description,
            };

            let id = store.insert_expense(&input).await?;
            println!("Added expense #{}: {} - {}", id, category, format_value(value));
            Ok(())
        }

        ExpenseCommand::List { filter, order } => {
            let options = report_options(file_config, order.as_deref())?;
            let output = run_report(store, &filter.to_filter(), ReportMode::Listing, &options).await?;
            let ReportOutput::Listing(report) = output else {
                anyhow::bail!("unexpected report output for listing");
            };

            if report.expenses.is_empty() {
                println!("No expenses match.");
                println!("\nUse 'fleet-expenses expense add' to record expenses");
                return Ok(());
            }

            println!(
                "{:<5} {:<12} {:<16} {:<18} {:<20} {:>12}  Description",
                "ID", "Date", "Driver", "Vehicle", "Category", "Value"
            );
            println!("{}", "-".repeat(100));

            for expense in &report.expenses {
                print_expense(expense);
            }

            println!("{}", "-".repeat(100));
            println!("{:>73} {:>12}", "Total:", format_value(report.total));

            if !report.total_by_driver.is_empty() {
                println!("\nBy driver:");
                for driver in &report.total_by_driver {
                    println!("  {:<30} {:>12}", truncate(&driver.driver_name, 30), format_value(driver.total));
                }
            }

            println!("\n{} expense(s)", report.expenses.len());
            Ok(())
        }

        ExpenseCommand::Export { file, filter } => {
            let options = report_options(file_config, None)?;
            let output = run_report(store, &filter.to_filter(), ReportMode::Export, &options).await?;
            let ReportOutput::Export(export) = output else {
                anyhow::bail!("unexpected report output for export");
            };

            let file = file.unwrap_or_else(|| PathBuf::from(&export.file_name));
            write_export(&export, &file).with_context(|| format!("Failed to write {}", file.display()))?;

            let rows = export.body.lines().count().saturating_sub(1);
            println!("Exported {} expenses to {}", rows, file.display());
            Ok(())
        }
    }
}

fn print_expense(expense: &ExpenseRow) {
    let vehicle = vehicle_label(expense);
    println!(
        "{:<5} {:<12} {:<16} {:<18} {:<20} {:>12}  {}",
        expense.id,
        expense.date,
        truncate(expense.driver_name.as_deref().unwrap_or("-"), 16),
        truncate(if vehicle.is_empty() { "-" } else { &vehicle }, 18),
        truncate(expense.category_name.as_deref().unwrap_or("-"), 20),
        format_value(expense.value),
        truncate(expense.description.as_deref().unwrap_or(""), 30),
    );
}

/// Handle driver subcommands
async fn handle_driver_command(action: DriverCommand, store: &Store) -> Result<()> {
    match action {
        DriverCommand::List => {
            let drivers = store.list_drivers().await?;
            if drivers.is_empty() {
                println!("No drivers recorded.");
                println!("\nUse 'fleet-expenses driver add --name <NAME>' to add one");
                return Ok(());
            }

            println!("{:<5} {:<30} {:<16} {:<16} {:<10}", "ID", "Name", "Phone", "Licence", "Status");
            println!("{}", "-".repeat(80));
            for driver in &drivers {
                println!(
                    "{:<5} {:<30} {:<16} {:<16} {:<10}",
                    driver.id,
                    truncate(&driver.name, 30),
                    driver.phone.as_deref().unwrap_or("-"),
                    driver.licence_number.as_deref().unwrap_or("-"),
                    driver.status,
                );
            }
            println!("\n{} driver(s)", drivers.len());
            Ok(())
        }

        DriverCommand::Add {
            name,
            phone,
            licence_number,
        } => {
            let driver = store
                .insert_driver(&NewDriver {
                    name: Some(name),
                    phone,
                    licence_number,
                    status: None,
                })
                .await?;
            println!("Added driver #{}: {}", driver.id, driver.name);
            Ok(())
        }
    }
}

/// Handle category subcommands
async fn handle_category_command(action: CategoryCommand, store: &Store) -> Result<()> {
    match action {
        CategoryCommand::List => {
            let categories = store.list_categories().await?;
            println!("{:<5} {:<30} {:<12}", "ID", "Name", "Kind");
            println!("{}", "-".repeat(50));
            for category in &categories {
                println!(
                    "{:<5} {:<30} {:<12}",
                    category.id,
                    category.name,
                    category.kind.as_deref().unwrap_or("-")
                );
            }
            Ok(())
        }

        CategoryCommand::Add { name, kind } => {
            let category = store
                .insert_category(&NewCategory {
                    name: Some(name),
                    kind,
                })
                .await?;
            println!("Added category #{}: {}", category.id, category.name);
            Ok(())
        }
    }
}

async fn handle_dashboard(filter: &FilterArgs, store: &Store, file_config: &FileConfig) -> Result<()> {
    let options = report_options(file_config, None)?;
    let output = run_report(store, &filter.to_filter(), ReportMode::Dashboard, &options).await?;
    let ReportOutput::Dashboard(summary) = output else {
        anyhow::bail!("unexpected report output for dashboard");
    };

    println!("Dashboard {}", summary.month);
    println!("=================\n");
    println!("  Total this month:  {:>12}", format_value(summary.total_month));
    println!("  Expenses:          {:>12}", summary.count_month);
    match summary.top_driver {
        Some(top) => println!("  Top driver:        {} ({})", top.name, format_value(top.total)),
        None => println!("  Top driver:        -"),
    }
    Ok(())
}

/// Category by ID or case-insensitive name
async fn resolve_category(store: &Store, s: &str) -> Result<i64> {
    let categories = store.list_categories().await?;

    let by_id = fleet_ledger::models::parse_id(s).and_then(|id| categories.iter().find(|c| c.id == id));
    let by_name = || categories.iter().find(|c| c.name.eq_ignore_ascii_case(s.trim()));

    if let Some(category) = by_id.or_else(by_name) {
        return Ok(category.id);
    }

    let names: Vec<_> = categories.iter().map(|c| c.name.as_str()).collect();
    anyhow::bail!("Invalid category '{}'. Use one of: {}", s, names.join(", "))
}

/// Truncate string for display
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_counts_chars() {
        assert_eq!(truncate("Ana", 16), "Ana");
        assert_eq!(truncate("João Gonçalves da Silva", 10), "João Go...");
    }

    #[test]
    fn test_filter_args_map_to_filter() {
        let args = FilterArgs {
            driver_id: Some("3".to_string()),
            from: Some("2024-03-01".to_string()),
            to: Some("bad".to_string()),
            ..Default::default()
        };

        let filter = args.to_filter();
        assert_eq!(filter.driver_id, Some(3));
        assert_eq!(filter.start_date, chrono::NaiveDate::from_ymd_opt(2024, 3, 1));
        assert_eq!(filter.end_date, None);
    }

    #[test]
    fn test_cli_parses_subcommands() {
        let args = Args::try_parse_from([
            "fleet-expenses",
            "expense",
            "list",
            "--from",
            "2024-03-01",
            "--order",
            "total",
        ])
        .unwrap();
        assert!(matches!(
            args.command,
            Command::Expense {
                action: ExpenseCommand::List { .. }
            }
        ));

        let args = Args::try_parse_from(["fleet-expenses", "serve", "--bind", "0.0.0.0:8080"]).unwrap();
        assert!(matches!(args.command, Command::Serve { bind: Some(_) }));
    }

    #[tokio::test]
    async fn test_resolve_category_by_name_or_id() {
        let store = Store::open_in_memory().await.unwrap();
        let fuel = resolve_category(&store, "fuel").await.unwrap();
        assert_eq!(resolve_category(&store, &fuel.to_string()).await.unwrap(), fuel);
        assert!(resolve_category(&store, "Snacks").await.is_err());
    }
}
