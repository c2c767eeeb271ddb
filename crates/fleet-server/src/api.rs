//! HTTP calling layer over the ledger
//!
//! Handlers only translate requests into store and report calls. Filter
//! query values that fail to parse are ignored, matching the ledger's filter
//! rules; malformed JSON bodies are rejected with 400.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use fleet_ledger::models::{
    Category, Driver, ExpenseInput, InstallationFilter, NewCategory, NewDriver, NewTire, NewTireInstallation,
    NewTireRetread, NewTrailer, NewTruck, Tire, TireInstallation, TireRetread, Trailer, Truck, VehicleType, parse_id,
};
use fleet_ledger::{
    BreakdownOrder, ExpenseFilter, FilterParams, LedgerError, ReportMode, ReportOptions, ReportOutput, Store,
    run_report,
};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, warn};

use crate::config::ReportConfig;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub report: ReportConfig,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/drivers", get(list_drivers).post(create_driver))
        .route("/api/trucks", get(list_trucks).post(create_truck))
        .route("/api/trailers", get(list_trailers).post(create_trailer))
        .route("/api/tires", get(list_tires).post(create_tire))
        .route(
            "/api/tires/installations",
            get(list_installations).post(create_installation),
        )
        .route("/api/tires/retreads", get(list_retreads).post(create_retread))
        .route("/api/categories", get(list_categories).post(create_category))
        .route("/api/expenses", get(list_expenses).post(create_expense))
        .route("/api/expenses/export", get(export_expenses))
        .route("/api/dashboard", get(dashboard))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// =============================================================================
// Errors
// =============================================================================

#[derive(Debug)]
pub enum ApiError {
    Ledger(LedgerError),
    BadRequest(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        ApiError::Ledger(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::Ledger(err @ LedgerError::Duplicate { .. }) => (StatusCode::CONFLICT, err.to_string()),
            ApiError::Ledger(err) if err.is_client_error() => (StatusCode::BAD_REQUEST, err.to_string()),
            ApiError::Ledger(err) => {
                error!(error = %err, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error".to_string())
            }
        };

        if status.is_client_error() {
            debug!(%status, %message, "rejected request");
        }

        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// Unwrap a JSON body, turning extractor rejections into 400s
fn body<T>(payload: Result<Json<T>, JsonRejection>) -> ApiResult<T> {
    Ok(payload?.0)
}

// =============================================================================
// Reference Entities
// =============================================================================

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn list_drivers(State(state): State<AppState>) -> ApiResult<Json<Vec<Driver>>> {
    Ok(Json(state.store.list_drivers().await?))
}

async fn create_driver(
    State(state): State<AppState>,
    payload: Result<Json<NewDriver>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Driver>)> {
    let driver = state.store.insert_driver(&body(payload)?).await?;
    Ok((StatusCode::CREATED, Json(driver)))
}

async fn list_trucks(State(state): State<AppState>) -> ApiResult<Json<Vec<Truck>>> {
    Ok(Json(state.store.list_trucks().await?))
}

async fn create_truck(
    State(state): State<AppState>,
    payload: Result<Json<NewTruck>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Truck>)> {
    let truck = state.store.insert_truck(&body(payload)?).await?;
    Ok((StatusCode::CREATED, Json(truck)))
}

async fn list_trailers(State(state): State<AppState>) -> ApiResult<Json<Vec<Trailer>>> {
    Ok(Json(state.store.list_trailers().await?))
}

async fn create_trailer(
    State(state): State<AppState>,
    payload: Result<Json<NewTrailer>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Trailer>)> {
    let trailer = state.store.insert_trailer(&body(payload)?).await?;
    Ok((StatusCode::CREATED, Json(trailer)))
}

async fn list_tires(State(state): State<AppState>) -> ApiResult<Json<Vec<Tire>>> {
    Ok(Json(state.store.list_tires().await?))
}

async fn create_tire(
    State(state): State<AppState>,
    payload: Result<Json<NewTire>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Tire>)> {
    let tire = state.store.insert_tire(&body(payload)?).await?;
    Ok((StatusCode::CREATED, Json(tire)))
}

async fn list_categories(State(state): State<AppState>) -> ApiResult<Json<Vec<Category>>> {
    Ok(Json(state.store.list_categories().await?))
}

async fn create_category(
    State(state): State<AppState>,
    payload: Result<Json<NewCategory>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Category>)> {
    let category = state.store.insert_category(&body(payload)?).await?;
    Ok((StatusCode::CREATED, Json(category)))
}

// =============================================================================
// Tire Lifecycle
// =============================================================================

#[derive(Debug, Default, Deserialize)]
struct InstallationParams {
    tire_id: Option<String>,
    vehicle_type: Option<String>,
    vehicle_id: Option<String>,
}

impl InstallationParams {
    fn to_filter(&self) -> InstallationFilter {
        let vehicle_type = self
            .vehicle_type
            .as_deref()
            .and_then(|raw| raw.parse::<VehicleType>().ok());
        let vehicle_id = self.vehicle_id.as_deref().and_then(parse_id);

        InstallationFilter {
            tire_id: self.tire_id.as_deref().and_then(parse_id),
            vehicle: vehicle_type.zip(vehicle_id),
        }
    }
}

async fn list_installations(
    State(state): State<AppState>,
    Query(params): Query<InstallationParams>,
) -> ApiResult<Json<Vec<TireInstallation>>> {
    Ok(Json(state.store.list_tire_installations(&params.to_filter()).await?))
}

async fn create_installation(
    State(state): State<AppState>,
    payload: Result<Json<NewTireInstallation>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<TireInstallation>)> {
    let install = state.store.insert_tire_installation(&body(payload)?).await?;
    Ok((StatusCode::CREATED, Json(install)))
}

#[derive(Debug, Default, Deserialize)]
struct RetreadParams {
    tire_id: Option<String>,
}

async fn list_retreads(
    State(state): State<AppState>,
    Query(params): Query<RetreadParams>,
) -> ApiResult<Json<Vec<TireRetread>>> {
    let tire_id = params.tire_id.as_deref().and_then(parse_id);
    Ok(Json(state.store.list_tire_retreads(tire_id).await?))
}

async fn create_retread(
    State(state): State<AppState>,
    payload: Result<Json<NewTireRetread>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<TireRetread>)> {
    let retread = state.store.insert_tire_retread(&body(payload)?).await?;
    Ok((StatusCode::CREATED, Json(retread)))
}

// =============================================================================
// Expenses and Reports
// =============================================================================

#[derive(Debug, Default, Deserialize)]
struct OrderParams {
    order: Option<String>,
}

/// Report output framed for HTTP: JSON for listings and the dashboard, a CSV attachment for exports
struct ReportResponse(ReportOutput);

impl IntoResponse for ReportResponse {
    fn into_response(self) -> Response {
        match self.0 {
            ReportOutput::Listing(report) => Json(report).into_response(),
            ReportOutput::Dashboard(summary) => Json(summary).into_response(),
            ReportOutput::Export(export) => (
                [
                    (header::CONTENT_TYPE, export.content_type.to_string()),
                    (
                        header::CONTENT_DISPOSITION,
                        format!("attachment; filename=\"{}\"", export.file_name),
                    ),
                ],
                export.body,
            )
                .into_response(),
        }
    }
}

impl AppState {
    fn report_options(&self, order: &OrderParams) -> ReportOptions {
        let order = match order.order.as_deref().map(str::parse::<BreakdownOrder>) {
            Some(Ok(order)) => order,
            Some(Err(err)) => {
                warn!(error = %err, "ignoring breakdown order");
                self.report.breakdown_order
            }
            None => self.report.breakdown_order,
        };

        ReportOptions {
            order,
            today: chrono::Local::now().date_naive(),
            export_file_name: self.report.export_file_name.clone(),
        }
    }

    async fn report(&self, params: &FilterParams, order: &OrderParams, mode: ReportMode) -> ApiResult<ReportResponse> {
        let filter = ExpenseFilter::from_params(params);
        let output = run_report(&self.store, &filter, mode, &self.report_options(order)).await?;
        Ok(ReportResponse(output))
    }
}

async fn create_expense(
    State(state): State<AppState>,
    payload: Result<Json<ExpenseInput>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    let id = state.store.insert_expense(&body(payload)?).await?;
    Ok((StatusCode::CREATED, Json(json!({ "id": id }))))
}

async fn list_expenses(
    State(state): State<AppState>,
    Query(params): Query<FilterParams>,
    Query(order): Query<OrderParams>,
) -> ApiResult<ReportResponse> {
    state.report(&params, &order, ReportMode::Listing).await
}

async fn export_expenses(
    State(state): State<AppState>,
    Query(params): Query<FilterParams>,
    Query(order): Query<OrderParams>,
) -> ApiResult<ReportResponse> {
    state.report(&params, &order, ReportMode::Export).await
}

async fn dashboard(
    State(state): State<AppState>,
    Query(params): Query<FilterParams>,
    Query(order): Query<OrderParams>,
) -> ApiResult<ReportResponse> {
    state.report(&params, &order, ReportMode::Dashboard).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::Value;
    use tower::ServiceExt;

    async fn app() -> Router {
        let store = Store::open_in_memory().await.unwrap();
        router(AppState {
            store,
            report: ReportConfig::default(),
        })
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, bytes.to_vec())
    }

    async fn get_json(app: &Router, uri: &str) -> (StatusCode, Value) {
        let (status, bytes) = send(app, Request::get(uri).body(Body::empty()).unwrap()).await;
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    async fn post_json(app: &Router, uri: &str, payload: Value) -> (StatusCode, Value) {
        let request = Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(payload.to_string()))
            .unwrap();
        let (status, bytes) = send(app, request).await;
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    async fn fuel_id(app: &Router) -> i64 {
        let (_, categories) = get_json(app, "/api/categories").await;
        categories
            .as_array()
            .unwrap()
            .iter()
            .find(|c| c["name"] == "Fuel")
            .and_then(|c| c["id"].as_i64())
            .unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let app = app().await;
        let (status, body) = get_json(&app, "/api/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_create_and_list_truck() {
        let app = app().await;

        let (status, truck) = post_json(&app, "/api/trucks", json!({ "plate": "ABC1D23", "year": 2020 })).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(truck["status"], "active");

        let (status, body) = post_json(&app, "/api/trucks", json!({ "plate": "ABC1D23" })).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body["error"].as_str().unwrap().contains("ABC1D23"));

        let (status, body) = post_json(&app, "/api/trucks", json!({ "model": "FH 540" })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "plate is required");

        let (_, trucks) = get_json(&app, "/api/trucks").await;
        assert_eq!(trucks.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_dashboard_form_payloads() {
        let app = app().await;

        let (status, truck) = post_json(
            &app,
            "/api/trucks",
            json!({ "plate": "ABC1D23", "model": "FH 540", "year": "2020", "odometer": "", "status": "active" }),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(truck["year"], 2020);
        assert!(truck["odometer"].is_null());

        let (status, trailer) = post_json(
            &app,
            "/api/trailers",
            json!({ "plate": "TRL0001", "type": "reefer", "year": "", "status": "active" }),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(trailer["kind"], "reefer");
        assert!(trailer["year"].is_null());

        let (status, driver) = post_json(
            &app,
            "/api/drivers",
            json!({ "name": "Ana", "phone": "", "cnh": "12345", "status": "active" }),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(driver["licence_number"], "12345");

        let (status, body) = post_json(&app, "/api/trucks", json!({ "plate": "XYZ9876", "year": "new" })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("invalid number"));
    }

    #[tokio::test]
    async fn test_expense_validation_and_unknown_reference() {
        let app = app().await;
        let fuel = fuel_id(&app).await;

        let (status, _) = post_json(&app, "/api/expenses", json!({ "date": "2024-03-01", "value": 10 })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = post_json(
            &app,
            "/api/expenses",
            json!({ "category_id": fuel, "date": "2024-03-01", "value": 10, "driver_id": 404 }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = post_json(
            &app,
            "/api/expenses",
            json!({ "category_id": fuel, "date": "2024-03-01", "value": 10, "driver_id": "abc" }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, report) = get_json(&app, "/api/expenses").await;
        assert!(report["expenses"].as_array().unwrap().is_empty());
        assert_eq!(report["total"], 0.0);
    }

    #[tokio::test]
    async fn test_listing_and_export() {
        let app = app().await;
        let fuel = fuel_id(&app).await;
        let (_, ana) = post_json(&app, "/api/drivers", json!({ "name": "Ana" })).await;
        let (_, bruno) = post_json(&app, "/api/drivers", json!({ "name": "Bruno" })).await;

        for (driver, date, value) in [
            (&ana, "2024-04-01", 30.0),
            (&bruno, "2024-03-15", 50.0),
            (&ana, "2024-03-01", 100.0),
        ] {
            let (status, _) = post_json(
                &app,
                "/api/expenses",
                json!({
                    "category_id": fuel.to_string(),
                    "driver_id": driver["id"].to_string(),
                    "date": date,
                    "value": value,
                }),
            )
            .await;
            assert_eq!(status, StatusCode::CREATED);
        }

        let range = "start_date=2024-03-01&end_date=2024-03-31";
        let (status, report) = get_json(&app, &format!("/api/expenses?{}", range)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(report["total"], 150.0);
        assert_eq!(report["expenses"].as_array().unwrap().len(), 2);
        assert_eq!(report["totalByDriver"][0]["driver_name"], "Ana");
        assert_eq!(report["totalByDriver"][1]["total"], 50.0);

        let (_, by_total) = get_json(&app, &format!("/api/expenses?{}&order=total", range)).await;
        assert_eq!(by_total["totalByDriver"][0]["total"], 100.0);

        let (_, ignored) = get_json(&app, "/api/expenses?driver_id=abc&start_date=").await;
        assert_eq!(ignored["total"], 180.0);

        let response = app
            .clone()
            .oneshot(
                Request::get(format!("/api/expenses/export?{}", range))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/csv; charset=utf-8");
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"expenses.csv\""
        );

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = String::from_utf8(bytes.to_vec()).unwrap();
        let lines: Vec<_> = body.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].starts_with("2024-03-01;Ana;"));
        assert!(lines[1].contains(";100,00;"));
        assert!(lines[2].starts_with("2024-03-15;Bruno;"));
    }

    #[tokio::test]
    async fn test_dashboard_current_month() {
        let app = app().await;
        let fuel = fuel_id(&app).await;
        let (_, ana) = post_json(&app, "/api/drivers", json!({ "name": "Ana" })).await;
        let today = chrono::Local::now().date_naive().format("%Y-%m-%d").to_string();

        post_json(
            &app,
            "/api/expenses",
            json!({ "category_id": fuel, "driver_id": ana["id"], "date": today, "value": 80 }),
        )
        .await;
        post_json(
            &app,
            "/api/expenses",
            json!({ "category_id": fuel, "date": "1999-01-01", "value": 999 }),
        )
        .await;

        let (status, summary) = get_json(&app, "/api/dashboard").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(summary["totalMonth"], 80.0);
        assert_eq!(summary["countMonth"], 1);
        assert_eq!(summary["topDriver"]["name"], "Ana");
    }

    #[tokio::test]
    async fn test_tire_lifecycle_routes() {
        let app = app().await;
        let (_, tire) = post_json(&app, "/api/tires", json!({ "code": "PN-001" })).await;
        let (_, trailer) = post_json(&app, "/api/trailers", json!({ "plate": "TRL0001" })).await;

        let (status, install) = post_json(
            &app,
            "/api/tires/installations",
            json!({
                "tire_id": tire["id"],
                "vehicle_type": "trailer",
                "vehicle_id": trailer["id"].to_string(),
                "installed_at": "2024-02-01",
            }),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(install["vehicle_type"], "trailer");

        let uri = format!("/api/tires/installations?vehicle_type=trailer&vehicle_id={}", trailer["id"]);
        let (_, installs) = get_json(&app, &uri).await;
        assert_eq!(installs.as_array().unwrap().len(), 1);

        let (status, _) = post_json(
            &app,
            "/api/tires/retreads",
            json!({ "tire_id": tire["id"], "date": "2024-06-01", "value": 450.0 }),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (_, retreads) = get_json(&app, &format!("/api/tires/retreads?tire_id={}", tire["id"])).await;
        assert_eq!(retreads[0]["value"], 450.0);
    }
}
