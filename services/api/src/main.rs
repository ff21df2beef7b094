//! API Service - Read-only sales analytics over the imported tables
//!
//! Endpoints:
//! - GET /health - Health check
//! - GET /health/database - Connectivity and table row counts
//! - GET /sales/summary - Revenue KPIs
//! - GET /sales/by-month - Monthly trend
//! - GET /sales/by-region - Revenue per country
//! - GET /sales/by-day-of-week - Revenue per weekday
//! - GET /sales/by-hour - Revenue per hour of day
//! - GET /sales/comparison - Month over month growth
//! - GET /sales/recent - Latest transactions
//! - GET /products/top, /products/count
//! - GET /customers/top, /customers/analytics, /customers/count
//!
//! Date filters: `start_date` / `end_date` (YYYY-MM-DD, both inclusive).

use anyhow::Context;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{Datelike, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::EnvFilter;

const DEFAULT_LIMIT: i64 = 10;
const MAX_LIMIT: i64 = 1000;

/// Optional bounds shared by every filtered query: $1 = start, $2 = end
const DATE_FILTER: &str = "($1::timestamp IS NULL OR s.invoice_date >= $1) \
                           AND ($2::timestamp IS NULL OR s.invoice_date <= $2)";

// ============================================================================
// State
// ============================================================================

#[derive(Clone)]
struct AppState {
    pool: PgPool,
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn not_found(message: &str) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.to_string(),
        }
    }

    fn bad_request(message: &str) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.to_string(),
        }
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(e: sqlx::Error) -> Self {
        tracing::error!(error = %e, "query failed");
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: e.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                error: self.message,
            }),
        )
            .into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

// ============================================================================
// Response types
// ============================================================================

#[derive(Serialize)]
struct HealthResponse {
    ok: bool,
    version: &'static str,
}

#[derive(Serialize)]
struct DatabaseHealthResponse {
    status: &'static str,
    database: &'static str,
    timestamp: chrono::DateTime<Utc>,
    records: RecordCounts,
}

#[derive(Serialize)]
struct RecordCounts {
    sales: i64,
    products: i64,
    customers: i64,
    regions: i64,
}

#[derive(Serialize, sqlx::FromRow)]
struct SalesSummary {
    #[serde(with = "rust_decimal::serde::float")]
    total_revenue: Decimal,
    total_transactions: i64,
    #[serde(with = "rust_decimal::serde::float")]
    average_order_value: Decimal,
    unique_customers: i64,
    unique_products: i64,
    start_date: Option<NaiveDateTime>,
    end_date: Option<NaiveDateTime>,
}

#[derive(sqlx::FromRow)]
struct MonthRow {
    year: i32,
    month: i32,
    revenue: Decimal,
    transaction_count: i64,
    average_order_value: Decimal,
}

#[derive(Serialize)]
struct MonthlySales {
    year: i32,
    month: String,
    #[serde(with = "rust_decimal::serde::float")]
    revenue: Decimal,
    transaction_count: i64,
    #[serde(with = "rust_decimal::serde::float")]
    average_order_value: Decimal,
}

#[derive(Serialize, sqlx::FromRow)]
struct RegionalSales {
    country: String,
    #[serde(with = "rust_decimal::serde::float")]
    revenue: Decimal,
    transaction_count: i64,
    #[sqlx(skip)]
    #[serde(with = "rust_decimal::serde::float")]
    percentage: Decimal,
}

#[derive(sqlx::FromRow)]
struct BucketRow {
    bucket: i32,
    revenue: Decimal,
    transaction_count: i64,
    average_order_value: Decimal,
}

#[derive(Serialize)]
struct DayOfWeekSales {
    day_of_week: &'static str,
    #[serde(with = "rust_decimal::serde::float")]
    revenue: Decimal,
    transaction_count: i64,
    #[serde(with = "rust_decimal::serde::float")]
    average_order_value: Decimal,
}

#[derive(Serialize)]
struct HourlySales {
    hour: i32,
    #[serde(with = "rust_decimal::serde::float")]
    revenue: Decimal,
    transaction_count: i64,
    #[serde(with = "rust_decimal::serde::float")]
    average_order_value: Decimal,
}

#[derive(Serialize)]
struct PeriodData {
    #[serde(with = "rust_decimal::serde::float")]
    revenue: Decimal,
    transaction_count: i64,
    #[serde(with = "rust_decimal::serde::float")]
    average_order_value: Decimal,
    unique_customers: i64,
    start_date: NaiveDate,
    end_date: NaiveDate,
}

#[derive(Serialize)]
struct GrowthMetrics {
    #[serde(with = "rust_decimal::serde::float")]
    revenue_growth: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    transaction_growth: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    average_order_growth: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    customer_growth: Decimal,
    trend: &'static str,
}

#[derive(Serialize)]
struct SalesComparison {
    current_period: PeriodData,
    previous_period: PeriodData,
    growth: GrowthMetrics,
}

#[derive(Serialize, sqlx::FromRow)]
struct RecentSale {
    invoice_no: String,
    invoice_date: NaiveDateTime,
    product_description: String,
    country: String,
    quantity: i32,
    #[serde(with = "rust_decimal::serde::float")]
    total_amount: Decimal,
}

#[derive(Serialize, sqlx::FromRow)]
struct TopProduct {
    stock_code: String,
    description: String,
    #[serde(with = "rust_decimal::serde::float")]
    revenue: Decimal,
    units_sold: i64,
    transaction_count: i64,
}

#[derive(Serialize, sqlx::FromRow)]
struct TopCustomer {
    customer_code: String,
    #[serde(with = "rust_decimal::serde::float")]
    total_revenue: Decimal,
    order_count: i64,
    #[serde(with = "rust_decimal::serde::float")]
    average_order_value: Decimal,
    first_purchase: NaiveDateTime,
    last_purchase: NaiveDateTime,
}

#[derive(Serialize)]
struct CustomerAnalytics {
    total_customers: i64,
    #[serde(with = "rust_decimal::serde::float")]
    average_customer_value: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    average_orders_per_customer: Decimal,
    top_customers: Vec<TopCustomer>,
}

// ============================================================================
// Query params
// ============================================================================

#[derive(Deserialize, Default)]
struct AnalyticsQuery {
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
    top: Option<i64>,
    limit: Option<i64>,
}

impl AnalyticsQuery {
    /// Inclusive timestamp bounds; `end_date` covers its whole day.
    fn bounds(&self) -> (Option<NaiveDateTime>, Option<NaiveDateTime>) {
        (
            self.start_date.and_then(|d| d.and_hms_opt(0, 0, 0)),
            self.end_date.and_then(end_of_day),
        )
    }
}

#[derive(Deserialize)]
struct ComparisonQuery {
    year: Option<i32>,
    month: Option<u32>,
}

// ============================================================================
// Calculations
// ============================================================================

fn clamp_limit(value: Option<i64>) -> i64 {
    value.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
}

fn end_of_day(date: NaiveDate) -> Option<NaiveDateTime> {
    date.and_hms_micro_opt(23, 59, 59, 999_999)
}

fn round2(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Share of `part` in `total`, in percent.
fn share_pct(part: Decimal, total: Decimal) -> Decimal {
    if total <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    round2(part / total * Decimal::ONE_HUNDRED)
}

/// Growth from `old` to `new` in percent; 0 when there is no baseline.
fn growth_pct(old: Decimal, new: Decimal) -> Decimal {
    if old.is_zero() {
        return Decimal::ZERO;
    }
    round2((new - old) / old * Decimal::ONE_HUNDRED)
}

fn trend(old: Decimal, new: Decimal) -> &'static str {
    match new.cmp(&old) {
        std::cmp::Ordering::Greater => "up",
        std::cmp::Ordering::Less => "down",
        std::cmp::Ordering::Equal => "neutral",
    }
}

/// First and last day of a calendar month.
fn month_bounds(year: i32, month: u32) -> Option<(NaiveDate, NaiveDate)> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    Some((first, next.pred_opt()?))
}

fn previous_month(year: i32, month: u32) -> (i32, u32) {
    if month == 1 {
        (year - 1, 12)
    } else {
        (year, month - 1)
    }
}

/// ISO day number (Monday = 1) to name.
fn day_name(iso_day: i32) -> &'static str {
    match iso_day {
        1 => "Monday",
        2 => "Tuesday",
        3 => "Wednesday",
        4 => "Thursday",
        5 => "Friday",
        6 => "Saturday",
        _ => "Sunday",
    }
}

// ============================================================================
// Shared queries
// ============================================================================

async fn bucketed(
    pool: &PgPool,
    bucket_expr: &str,
    params: &AnalyticsQuery,
) -> Result<Vec<BucketRow>, sqlx::Error> {
    let (start, end) = params.bounds();
    let sql = format!(
        r#"
        SELECT {bucket_expr}::int AS bucket,
               SUM(s.total_amount) AS revenue,
               COUNT(*) AS transaction_count,
               ROUND(AVG(s.total_amount), 2) AS average_order_value
        FROM sales s
        WHERE {DATE_FILTER}
        GROUP BY 1
        ORDER BY 1
        "#
    );
    sqlx::query_as(&sql).bind(start).bind(end).fetch_all(pool).await
}

async fn period_data(
    pool: &PgPool,
    start_date: NaiveDate,
    end_date: NaiveDate,
) -> Result<PeriodData, sqlx::Error> {
    let (revenue, transaction_count, average_order_value, unique_customers): (
        Decimal,
        i64,
        Decimal,
        i64,
    ) = sqlx::query_as(&format!(
        r#"
        SELECT COALESCE(SUM(s.total_amount), 0),
               COUNT(*),
               COALESCE(ROUND(AVG(s.total_amount), 2), 0),
               COUNT(DISTINCT s.customer_id)
        FROM sales s
        WHERE {DATE_FILTER}
        "#
    ))
    .bind(start_date.and_hms_opt(0, 0, 0))
    .bind(end_of_day(end_date))
    .fetch_one(pool)
    .await?;

    Ok(PeriodData {
        revenue,
        transaction_count,
        average_order_value,
        unique_customers,
        start_date,
        end_date,
    })
}

async fn top_customers(
    pool: &PgPool,
    params: &AnalyticsQuery,
    limit: i64,
) -> Result<Vec<TopCustomer>, sqlx::Error> {
    let (start, end) = params.bounds();
    sqlx::query_as(&format!(
        r#"
        SELECT c.customer_code,
               SUM(s.total_amount) AS total_revenue,
               COUNT(*) AS order_count,
               ROUND(AVG(s.total_amount), 2) AS average_order_value,
               MIN(s.invoice_date) AS first_purchase,
               MAX(s.invoice_date) AS last_purchase
        FROM sales s
        JOIN customers c ON c.customer_id = s.customer_id
        WHERE {DATE_FILTER}
        GROUP BY c.customer_code
        ORDER BY total_revenue DESC
        LIMIT $3
        "#
    ))
    .bind(start)
    .bind(end)
    .bind(limit)
    .fetch_all(pool)
    .await
}

async fn count_rows(pool: &PgPool, table: &str) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
        .fetch_one(pool)
        .await
}

// ============================================================================
// Handlers
// ============================================================================

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        ok: true,
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn database_health_handler(State(state): State<Arc<AppState>>) -> Response {
    if let Err(e) = sqlx::query("SELECT 1").execute(&state.pool).await {
        tracing::warn!(error = %e, "database health check failed");
        return ApiError {
            status: StatusCode::SERVICE_UNAVAILABLE,
            message: "Cannot connect to database".to_string(),
        }
        .into_response();
    }

    let counts = async {
        Ok::<_, sqlx::Error>(RecordCounts {
            sales: count_rows(&state.pool, "sales").await?,
            products: count_rows(&state.pool, "products").await?,
            customers: count_rows(&state.pool, "customers").await?,
            regions: count_rows(&state.pool, "regions").await?,
        })
    }
    .await;

    match counts {
        Ok(records) => Json(DatabaseHealthResponse {
            status: "healthy",
            database: "connected",
            timestamp: Utc::now(),
            records,
        })
        .into_response(),
        Err(e) => ApiError::from(e).into_response(),
    }
}

async fn summary_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AnalyticsQuery>,
) -> ApiResult<SalesSummary> {
    let (start, end) = params.bounds();
    let summary = sqlx::query_as(&format!(
        r#"
        SELECT COALESCE(SUM(s.total_amount), 0) AS total_revenue,
               COUNT(*) AS total_transactions,
               COALESCE(ROUND(AVG(s.total_amount), 2), 0) AS average_order_value,
               COUNT(DISTINCT s.customer_id) AS unique_customers,
               COUNT(DISTINCT s.product_id) AS unique_products,
               MIN(s.invoice_date) AS start_date,
               MAX(s.invoice_date) AS end_date
        FROM sales s
        WHERE {DATE_FILTER}
        "#
    ))
    .bind(start)
    .bind(end)
    .fetch_one(&state.pool)
    .await?;

    Ok(Json(summary))
}

async fn by_month_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AnalyticsQuery>,
) -> ApiResult<Vec<MonthlySales>> {
    let (start, end) = params.bounds();
    let rows: Vec<MonthRow> = sqlx::query_as(&format!(
        r#"
        SELECT EXTRACT(YEAR FROM s.invoice_date)::int AS year,
               EXTRACT(MONTH FROM s.invoice_date)::int AS month,
               SUM(s.total_amount) AS revenue,
               COUNT(*) AS transaction_count,
               ROUND(AVG(s.total_amount), 2) AS average_order_value
        FROM sales s
        WHERE {DATE_FILTER}
        GROUP BY 1, 2
        ORDER BY 1, 2
        "#
    ))
    .bind(start)
    .bind(end)
    .fetch_all(&state.pool)
    .await?;

    let months = rows
        .into_iter()
        .map(|r| MonthlySales {
            year: r.year,
            month: format!("{:02}", r.month),
            revenue: r.revenue,
            transaction_count: r.transaction_count,
            average_order_value: r.average_order_value,
        })
        .collect();

    Ok(Json(months))
}

async fn by_region_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AnalyticsQuery>,
) -> ApiResult<Vec<RegionalSales>> {
    let (start, end) = params.bounds();

    let total_revenue: Decimal = sqlx::query_scalar(&format!(
        "SELECT COALESCE(SUM(s.total_amount), 0) FROM sales s WHERE {DATE_FILTER}"
    ))
    .bind(start)
    .bind(end)
    .fetch_one(&state.pool)
    .await?;

    let mut regions: Vec<RegionalSales> = sqlx::query_as(&format!(
        r#"
        SELECT r.country,
               SUM(s.total_amount) AS revenue,
               COUNT(*) AS transaction_count
        FROM sales s
        JOIN regions r ON r.region_id = s.region_id
        WHERE {DATE_FILTER}
        GROUP BY r.country
        ORDER BY revenue DESC
        LIMIT $3
        "#
    ))
    .bind(start)
    .bind(end)
    .bind(clamp_limit(params.top))
    .fetch_all(&state.pool)
    .await?;

    for region in &mut regions {
        region.percentage = share_pct(region.revenue, total_revenue);
    }

    Ok(Json(regions))
}

async fn by_day_of_week_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AnalyticsQuery>,
) -> ApiResult<Vec<DayOfWeekSales>> {
    // ISODOW orders Monday first; days without sales are simply absent
    let rows = bucketed(&state.pool, "EXTRACT(ISODOW FROM s.invoice_date)", &params).await?;

    let days = rows
        .into_iter()
        .map(|r| DayOfWeekSales {
            day_of_week: day_name(r.bucket),
            revenue: r.revenue,
            transaction_count: r.transaction_count,
            average_order_value: r.average_order_value,
        })
        .collect();

    Ok(Json(days))
}

async fn by_hour_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AnalyticsQuery>,
) -> ApiResult<Vec<HourlySales>> {
    let rows = bucketed(&state.pool, "EXTRACT(HOUR FROM s.invoice_date)", &params).await?;

    let hours = rows
        .into_iter()
        .map(|r| HourlySales {
            hour: r.bucket,
            revenue: r.revenue,
            transaction_count: r.transaction_count,
            average_order_value: r.average_order_value,
        })
        .collect();

    Ok(Json(hours))
}

async fn comparison_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ComparisonQuery>,
) -> ApiResult<SalesComparison> {
    let (year, month) = match (params.year, params.month) {
        (Some(year), Some(month)) => (year, month),
        _ => {
            // Default to the latest month present in the data
            let latest: Option<NaiveDateTime> =
                sqlx::query_scalar("SELECT MAX(invoice_date) FROM sales")
                    .fetch_one(&state.pool)
                    .await?;
            let latest = latest.ok_or_else(|| ApiError::not_found("No data available"))?;
            (latest.year(), latest.month())
        }
    };

    let (current_start, current_end) =
        month_bounds(year, month).ok_or_else(|| ApiError::bad_request("Invalid year/month"))?;
    let (prev_year, prev_month) = previous_month(year, month);
    let (previous_start, previous_end) = month_bounds(prev_year, prev_month)
        .ok_or_else(|| ApiError::bad_request("Invalid year/month"))?;

    let current = period_data(&state.pool, current_start, current_end).await?;
    let previous = period_data(&state.pool, previous_start, previous_end).await?;

    let growth = GrowthMetrics {
        revenue_growth: growth_pct(previous.revenue, current.revenue),
        transaction_growth: growth_pct(
            Decimal::from(previous.transaction_count),
            Decimal::from(current.transaction_count),
        ),
        average_order_growth: growth_pct(previous.average_order_value, current.average_order_value),
        customer_growth: growth_pct(
            Decimal::from(previous.unique_customers),
            Decimal::from(current.unique_customers),
        ),
        trend: trend(previous.revenue, current.revenue),
    };

    Ok(Json(SalesComparison {
        current_period: current,
        previous_period: previous,
        growth,
    }))
}

async fn recent_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AnalyticsQuery>,
) -> ApiResult<Vec<RecentSale>> {
    let sales = sqlx::query_as(
        r#"
        SELECT s.invoice_no,
               s.invoice_date,
               COALESCE(p.description, 'Unknown') AS product_description,
               r.country,
               s.quantity,
               s.total_amount
        FROM sales s
        JOIN products p ON p.product_id = s.product_id
        JOIN regions r ON r.region_id = s.region_id
        ORDER BY s.invoice_date DESC
        LIMIT $1
        "#,
    )
    .bind(clamp_limit(params.limit))
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(sales))
}

async fn top_products_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AnalyticsQuery>,
) -> ApiResult<Vec<TopProduct>> {
    let (start, end) = params.bounds();
    let products = sqlx::query_as(&format!(
        r#"
        SELECT p.stock_code,
               COALESCE(p.description, 'Unknown') AS description,
               SUM(s.total_amount) AS revenue,
               SUM(s.quantity)::bigint AS units_sold,
               COUNT(*) AS transaction_count
        FROM sales s
        JOIN products p ON p.product_id = s.product_id
        WHERE {DATE_FILTER}
        GROUP BY p.stock_code, p.description
        ORDER BY revenue DESC
        LIMIT $3
        "#
    ))
    .bind(start)
    .bind(end)
    .bind(clamp_limit(params.top))
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(products))
}

async fn product_count_handler(
    State(state): State<Arc<AppState>>,
) -> ApiResult<serde_json::Value> {
    let count = count_rows(&state.pool, "products").await?;
    Ok(Json(serde_json::json!({ "total_products": count })))
}

async fn top_customers_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AnalyticsQuery>,
) -> ApiResult<Vec<TopCustomer>> {
    let customers = top_customers(&state.pool, &params, clamp_limit(params.top)).await?;
    Ok(Json(customers))
}

async fn customer_analytics_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AnalyticsQuery>,
) -> ApiResult<CustomerAnalytics> {
    let (start, end) = params.bounds();
    let (total_customers, total_revenue, total_orders): (i64, Decimal, i64) =
        sqlx::query_as(&format!(
            r#"
            SELECT COUNT(DISTINCT s.customer_id),
                   COALESCE(SUM(s.total_amount), 0),
                   COUNT(*)
            FROM sales s
            WHERE {DATE_FILTER}
            "#
        ))
        .bind(start)
        .bind(end)
        .fetch_one(&state.pool)
        .await?;

    let (average_customer_value, average_orders_per_customer) = if total_customers > 0 {
        let customers = Decimal::from(total_customers);
        (
            round2(total_revenue / customers),
            round2(Decimal::from(total_orders) / customers),
        )
    } else {
        (Decimal::ZERO, Decimal::ZERO)
    };

    let top_customers = top_customers(&state.pool, &params, DEFAULT_LIMIT).await?;

    Ok(Json(CustomerAnalytics {
        total_customers,
        average_customer_value,
        average_orders_per_customer,
        top_customers,
    }))
}

async fn customer_count_handler(
    State(state): State<Arc<AppState>>,
) -> ApiResult<serde_json::Value> {
    let count = count_rows(&state.pool, "customers").await?;
    Ok(Json(serde_json::json!({ "total_customers": count })))
}

// ============================================================================
// Main
// ============================================================================

fn router(state: Arc<AppState>) -> Router {
    // CORS for web frontend
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/health/database", get(database_health_handler))
        .route("/sales/summary", get(summary_handler))
        .route("/sales/by-month", get(by_month_handler))
        .route("/sales/by-region", get(by_region_handler))
        .route("/sales/by-day-of-week", get(by_day_of_week_handler))
        .route("/sales/by-hour", get(by_hour_handler))
        .route("/sales/comparison", get(comparison_handler))
        .route("/sales/recent", get(recent_handler))
        .route("/products/top", get(top_products_handler))
        .route("/products/count", get(product_count_handler))
        .route("/customers/top", get(top_customers_handler))
        .route("/customers/analytics", get(customer_analytics_handler))
        .route("/customers/count", get(customer_count_handler))
        .layer(cors)
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let db_url = std::env::var("DB_URL").context("DB_URL env var missing")?;
    let bind = std::env::var("API_BIND").unwrap_or_else(|_| "127.0.0.1:8080".to_string());

    println!("=== Sales Analytics API ===");
    println!("Connecting to database...");

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&db_url)
        .await
        .context("Failed to connect to database")?;

    println!("Database connected");

    let app = router(Arc::new(AppState { pool }));

    println!("API listening on http://{}", bind);
    println!("\nEndpoints:");
    println!("  GET /health");
    println!("  GET /health/database");
    println!("  GET /sales/summary?start_date=&end_date=");
    println!("  GET /sales/by-month?start_date=&end_date=");
    println!("  GET /sales/by-region?start_date=&end_date=&top=");
    println!("  GET /sales/by-day-of-week?start_date=&end_date=");
    println!("  GET /sales/by-hour?start_date=&end_date=");
    println!("  GET /sales/comparison?year=&month=");
    println!("  GET /sales/recent?limit=");
    println!("  GET /products/top?start_date=&end_date=&top=");
    println!("  GET /products/count");
    println!("  GET /customers/top?start_date=&end_date=&top=");
    println!("  GET /customers/analytics?start_date=&end_date=");
    println!("  GET /customers/count");

    let listener = tokio::net::TcpListener::bind(&bind).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;
    use rust_decimal_macros::dec;

    // -------------------------------------------------------------------------
    // PERCENTAGES
    // -------------------------------------------------------------------------

    #[test]
    fn test_share_pct_rounds_to_two_places() {
        assert_eq!(share_pct(dec!(1), dec!(3)), dec!(33.33));
        assert_eq!(share_pct(dec!(2), dec!(3)), dec!(66.67));
    }

    #[test]
    fn test_share_pct_zero_total() {
        assert_eq!(share_pct(dec!(10), Decimal::ZERO), Decimal::ZERO);
    }

    #[test]
    fn test_growth_pct() {
        assert_eq!(growth_pct(dec!(100), dec!(125)), dec!(25.00));
        assert_eq!(growth_pct(dec!(200), dec!(150)), dec!(-25.00));
    }

    #[test]
    fn test_growth_pct_without_baseline() {
        assert_eq!(growth_pct(Decimal::ZERO, dec!(500)), Decimal::ZERO);
    }

    #[test]
    fn test_trend() {
        assert_eq!(trend(dec!(1), dec!(2)), "up");
        assert_eq!(trend(dec!(2), dec!(1)), "down");
        assert_eq!(trend(dec!(2), dec!(2.00)), "neutral");
    }

    // -------------------------------------------------------------------------
    // DATES
    // -------------------------------------------------------------------------

    #[test]
    fn test_month_bounds() {
        let (first, last) = month_bounds(2011, 2).unwrap();
        assert_eq!(first, NaiveDate::from_ymd_opt(2011, 2, 1).unwrap());
        assert_eq!(last, NaiveDate::from_ymd_opt(2011, 2, 28).unwrap());
    }

    #[test]
    fn test_month_bounds_december() {
        let (_, last) = month_bounds(2010, 12).unwrap();
        assert_eq!(last, NaiveDate::from_ymd_opt(2010, 12, 31).unwrap());
    }

    #[test]
    fn test_month_bounds_invalid_month() {
        assert!(month_bounds(2011, 13).is_none());
    }

    #[test]
    fn test_previous_month_wraps_year() {
        assert_eq!(previous_month(2011, 1), (2010, 12));
        assert_eq!(previous_month(2011, 7), (2011, 6));
    }

    #[test]
    fn test_bounds_cover_whole_end_day() {
        let params = AnalyticsQuery {
            start_date: NaiveDate::from_ymd_opt(2011, 1, 1),
            end_date: NaiveDate::from_ymd_opt(2011, 1, 31),
            ..AnalyticsQuery::default()
        };
        let (start, end) = params.bounds();
        assert_eq!(start.unwrap().hour(), 0);
        let end = end.unwrap();
        assert_eq!((end.day(), end.hour(), end.minute()), (31, 23, 59));
    }

    #[test]
    fn test_bounds_absent() {
        assert_eq!(AnalyticsQuery::default().bounds(), (None, None));
    }

    // -------------------------------------------------------------------------
    // MISC
    // -------------------------------------------------------------------------

    #[test]
    fn test_clamp_limit() {
        assert_eq!(clamp_limit(None), 10);
        assert_eq!(clamp_limit(Some(5000)), 1000);
        assert_eq!(clamp_limit(Some(0)), 1);
        assert_eq!(clamp_limit(Some(25)), 25);
    }

    #[test]
    fn test_day_name_monday_first() {
        assert_eq!(day_name(1), "Monday");
        assert_eq!(day_name(7), "Sunday");
    }
}
