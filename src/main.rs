//! Boutique Core - order/payment lifecycle service
//!
//! Thin HTTP surface over the domain layer: every status change and money
//! mutation goes through the aggregates first, so a refused transition never
//! reaches the database.

use anyhow::Result;
use axum::{extract::{Path, Query, State}, http::StatusCode, routing::{get, patch, post, put}, Json, Router};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgPoolOptions;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;
use validator::Validate;

use boutique_core::domain::aggregates::cart::{CartAction, CartKey, LineQuote};
use boutique_core::domain::aggregates::payment::{PaymentError, PaymentUpdate};
use boutique_core::domain::aggregates::product::Variant;
use boutique_core::domain::events::{DomainEvent, OrderEvent};
use boutique_core::{
    Cart, Money, Order, OrderEdit, OrderPaymentStatus, OrderStatus, Payment, PaymentMethod,
    PaymentStatus, Product, Quantity, SellLine, Sku,
};

// =============================================================================
// Rows
// =============================================================================

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ProductRow {
    pub id: Uuid, pub sku: String, pub name: String, pub sale_price: Decimal,
    pub vat_percentage: Decimal, pub stock: i32, pub status: String,
    pub created_at: DateTime<Utc>, pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct VariantRow {
    pub id: Uuid, pub product_id: Uuid, pub color_id: Option<Uuid>, pub size_id: Option<Uuid>,
    pub sku: Option<String>, pub price: Decimal, pub stock: i32,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct OrderRow {
    pub id: Uuid, pub reference: String, pub customer_id: Uuid, pub currency: String,
    pub order_status: i16, pub payment_status: i16,
    pub subtotal: Decimal, pub vat_total: Decimal, pub shipping_cost: Decimal,
    pub total_discount: Decimal, pub total_payable: Decimal, pub total_paid: Decimal, pub total_due: Decimal,
    pub notes: Option<String>, pub created_at: DateTime<Utc>, pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct SellLineRow {
    pub id: Uuid, pub order_id: Uuid, pub product_id: Uuid,
    pub color_id: Option<Uuid>, pub size_id: Option<Uuid>,
    pub name: String, pub sku: Option<String>, pub quantity: i32,
    pub unit_price: Decimal, pub discount: Decimal, pub vat_percentage: Decimal,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct PaymentRow {
    pub id: Uuid, pub order_id: Uuid, pub method: String, pub amount: Decimal, pub currency: String,
    pub status: String, pub transaction_reference: Option<String>, pub payment_date: DateTime<Utc>,
    pub notes: Option<String>, pub created_at: DateTime<Utc>, pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CartItemRow {
    pub session_id: String, pub product_id: Uuid,
    pub color_id: Option<Uuid>, pub size_id: Option<Uuid>, pub quantity: i32,
}

#[derive(Clone)]
pub struct AppState { pub db: sqlx::PgPool, pub nats: Option<async_nats::Client>, pub currency: String }

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    let db = PgPoolOptions::new().max_connections(10).connect(&std::env::var("DATABASE_URL")?).await?;
    sqlx::migrate!("./migrations").run(&db).await?;
    let nats = match std::env::var("NATS_URL") {
        Ok(url) => async_nats::connect(&url).await.ok(),
        Err(_) => None,
    };
    let currency = std::env::var("DEFAULT_CURRENCY").unwrap_or_else(|_| "XOF".to_string());
    let state = AppState { db, nats, currency };

    let app = Router::new()
        .route("/health", get(|| async { Json(serde_json::json!({"status": "healthy", "service": "boutique-core"})) }))
        .route("/api/v1/products", get(list_products).post(create_product))
        .route("/api/v1/products/:id", get(get_product))
        .route("/api/v1/orders", get(list_orders))
        .route("/api/v1/orders/:id", get(get_order).put(update_order))
        .route("/api/v1/orders/:id/status", patch(update_order_status))
        .route("/api/v1/orders/:id/payments", get(list_order_payments))
        .route("/api/v1/payments", post(create_payment))
        .route("/api/v1/payments/:id", put(update_payment).delete(delete_payment))
        .route("/api/v1/payments/:id/validate", post(validate_payment))
        .route("/api/v1/payments/:id/reject", post(reject_payment))
        .route("/api/v1/payments/:id/refund", post(refund_payment))
        .route("/api/v1/cart/:session", get(get_cart).post(add_to_cart).delete(clear_cart))
        .route("/api/v1/cart/:session/quantity", put(update_cart_quantity))
        .route("/api/v1/checkout", post(checkout))
        .layer(TraceLayer::new_for_http()).layer(CorsLayer::permissive()).with_state(state);

    let port = std::env::var("PORT").unwrap_or_else(|_| "8083".to_string());
    tracing::info!("boutique-core listening on 0.0.0.0:{}", port);
    axum::serve(tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?, app).await?;
    Ok(())
}

type HandlerError = (StatusCode, String);

fn ise<E: std::fmt::Display>(e: E) -> HandlerError { (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()) }
fn conflict<E: std::fmt::Display>(e: E) -> HandlerError { (StatusCode::CONFLICT, e.to_string()) }
fn unprocessable<E: std::fmt::Display>(e: E) -> HandlerError { (StatusCode::UNPROCESSABLE_ENTITY, e.to_string()) }
fn not_found(what: &str) -> HandlerError { (StatusCode::NOT_FOUND, format!("{} not found", what)) }

fn short_ref(prefix: &str) -> String {
    let id = Uuid::now_v7().simple().to_string();
    format!("{}-{}", prefix, id[id.len() - 8..].to_uppercase())
}

async fn publish_events(state: &AppState, events: Vec<DomainEvent>) {
    let Some(nats) = &state.nats else { return };
    for event in events {
        match serde_json::to_vec(&event) {
            Ok(payload) => {
                if let Err(e) = nats.publish("boutique.events", payload.into()).await {
                    tracing::warn!("event publish failed: {}", e);
                }
            }
            Err(e) => tracing::warn!("event serialize failed: {}", e),
        }
    }
}

// =============================================================================
// Row -> domain
// =============================================================================

fn domain_product(row: &ProductRow, variants: &[VariantRow], currency: &str) -> Result<Product, HandlerError> {
    let sku = Sku::new(&row.sku).map_err(ise)?;
    let variants = variants
        .iter()
        .map(|v| Variant {
            color_id: v.color_id,
            size_id: v.size_id,
            sku: v.sku.as_deref().and_then(|s| Sku::new(s).ok()),
            price: Money::new(v.price, currency),
            stock: Quantity::new(v.stock.max(0) as u32),
        })
        .collect();
    Ok(Product::restore(
        row.id, sku, row.name.as_str(),
        Money::new(row.sale_price, currency),
        Quantity::new(row.stock.max(0) as u32),
        variants, row.created_at, row.updated_at,
    ))
}

fn domain_order(row: &OrderRow, lines: &[SellLineRow]) -> Result<Order, HandlerError> {
    let status = OrderStatus::from_code(row.order_status).map_err(ise)?;
    let payment_status = OrderPaymentStatus::from_code(row.payment_status).map_err(ise)?;
    let sell_lines = lines
        .iter()
        .map(|l| SellLine {
            product_id: l.product_id,
            color_id: l.color_id,
            size_id: l.size_id,
            name: l.name.clone(),
            sku: l.sku.as_deref().and_then(|s| Sku::new(s).ok()),
            quantity: l.quantity.max(0) as u32,
            unit_price: Money::new(l.unit_price, &row.currency),
            discount: Money::new(l.discount, &row.currency),
            vat_percentage: l.vat_percentage,
        })
        .collect();
    Order::restore(
        row.id, row.reference.clone(), row.customer_id, row.currency.clone(),
        status, payment_status, sell_lines,
        Money::new(row.shipping_cost, &row.currency),
        Money::new(row.total_discount, &row.currency),
        Money::new(row.total_paid, &row.currency),
        row.notes.clone(), row.created_at, row.updated_at,
    )
    .map_err(ise)
}

fn domain_payment(row: &PaymentRow) -> Result<Payment, HandlerError> {
    let method = PaymentMethod::parse(&row.method).map_err(ise)?;
    let status = PaymentStatus::parse(&row.status).map_err(ise)?;
    Ok(Payment::restore(
        row.id, row.order_id, method,
        Money::new(row.amount, &row.currency), status,
        row.transaction_reference.clone(), row.payment_date, row.notes.clone(),
        row.created_at, row.updated_at,
    ))
}

// =============================================================================
// Products
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct ListParams { pub page: Option<u32>, pub per_page: Option<u32>, pub status: Option<i16> }

#[derive(Debug, Serialize)]
pub struct PaginatedResponse<T> { pub data: Vec<T>, pub total: i64, pub page: u32 }

async fn list_products(State(s): State<AppState>, Query(p): Query<ListParams>) -> Result<Json<PaginatedResponse<ProductRow>>, HandlerError> {
    let page = p.page.unwrap_or(1).max(1);
    let per_page = p.per_page.unwrap_or(20).min(100);
    let products = sqlx::query_as::<_, ProductRow>("SELECT * FROM products WHERE status = 'active' ORDER BY created_at DESC LIMIT $1 OFFSET $2")
        .bind(per_page as i64).bind(((page - 1) * per_page) as i64).fetch_all(&s.db).await.map_err(ise)?;
    let total: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM products WHERE status = 'active'").fetch_one(&s.db).await.map_err(ise)?;
    Ok(Json(PaginatedResponse { data: products, total: total.0, page }))
}

#[derive(Debug, Serialize)]
pub struct ProductDetail { #[serde(flatten)] pub product: ProductRow, pub variants: Vec<VariantRow> }

async fn get_product(State(s): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<ProductDetail>, HandlerError> {
    let product = sqlx::query_as::<_, ProductRow>("SELECT * FROM products WHERE id = $1")
        .bind(id).fetch_optional(&s.db).await.map_err(ise)?.ok_or_else(|| not_found("product"))?;
    let variants = sqlx::query_as::<_, VariantRow>("SELECT * FROM product_variants WHERE product_id = $1")
        .bind(id).fetch_all(&s.db).await.map_err(ise)?;
    Ok(Json(ProductDetail { product, variants }))
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateProductRequest {
    #[validate(length(min = 1))]
    pub name: String,
    pub sku: Option<String>,
    pub sale_price: Decimal,
    pub vat_percentage: Option<Decimal>,
    pub stock: Option<i32>,
    pub variants: Option<Vec<VariantRequest>>,
}

#[derive(Debug, Deserialize)]
pub struct VariantRequest {
    pub color_id: Option<Uuid>, pub size_id: Option<Uuid>,
    pub sku: Option<String>, pub price: Decimal, pub stock: i32,
}

async fn create_product(State(s): State<AppState>, Json(r): Json<CreateProductRequest>) -> Result<(StatusCode, Json<ProductDetail>), HandlerError> {
    r.validate().map_err(unprocessable)?;
    let sku = r.sku.unwrap_or_else(|| short_ref("SKU"));
    let mut tx = s.db.begin().await.map_err(ise)?;
    let product = sqlx::query_as::<_, ProductRow>(
        "INSERT INTO products (id, sku, name, sale_price, vat_percentage, stock, status, created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, 'active', NOW(), NOW()) RETURNING *")
        .bind(Uuid::now_v7()).bind(&sku).bind(&r.name).bind(r.sale_price)
        .bind(r.vat_percentage.unwrap_or(Decimal::ZERO)).bind(r.stock.unwrap_or(0))
        .fetch_one(&mut *tx).await.map_err(ise)?;
    let mut variants = Vec::new();
    for v in r.variants.unwrap_or_default() {
        let row = sqlx::query_as::<_, VariantRow>(
            "INSERT INTO product_variants (id, product_id, color_id, size_id, sku, price, stock) VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING *")
            .bind(Uuid::now_v7()).bind(product.id).bind(v.color_id).bind(v.size_id).bind(&v.sku).bind(v.price).bind(v.stock)
            .fetch_one(&mut *tx).await.map_err(ise)?;
        variants.push(row);
    }
    tx.commit().await.map_err(ise)?;
    Ok((StatusCode::CREATED, Json(ProductDetail { product, variants })))
}

// =============================================================================
// Orders
// =============================================================================

async fn list_orders(State(s): State<AppState>, Query(p): Query<ListParams>) -> Result<Json<PaginatedResponse<OrderRow>>, HandlerError> {
    let page = p.page.unwrap_or(1).max(1);
    let per_page = p.per_page.unwrap_or(20).min(100);
    let limit = per_page as i64;
    let offset = ((page - 1) * per_page) as i64;
    let (orders, total) = if let Some(code) = p.status {
        // refuse unknown filter codes instead of silently returning nothing
        OrderStatus::from_code(code).map_err(unprocessable)?;
        let rows = sqlx::query_as::<_, OrderRow>("SELECT * FROM orders WHERE order_status = $1 ORDER BY created_at DESC LIMIT $2 OFFSET $3")
            .bind(code).bind(limit).bind(offset).fetch_all(&s.db).await.map_err(ise)?;
        let t: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM orders WHERE order_status = $1").bind(code).fetch_one(&s.db).await.map_err(ise)?;
        (rows, t.0)
    } else {
        let rows = sqlx::query_as::<_, OrderRow>("SELECT * FROM orders ORDER BY created_at DESC LIMIT $1 OFFSET $2")
            .bind(limit).bind(offset).fetch_all(&s.db).await.map_err(ise)?;
        let t: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM orders").fetch_one(&s.db).await.map_err(ise)?;
        (rows, t.0)
    };
    Ok(Json(PaginatedResponse { data: orders, total, page }))
}

#[derive(Debug, Serialize)]
pub struct OrderDetail { #[serde(flatten)] pub order: OrderRow, pub lines: Vec<SellLineRow> }

async fn fetch_order(s: &AppState, id: Uuid) -> Result<(OrderRow, Vec<SellLineRow>), HandlerError> {
    let order = sqlx::query_as::<_, OrderRow>("SELECT * FROM orders WHERE id = $1")
        .bind(id).fetch_optional(&s.db).await.map_err(ise)?.ok_or_else(|| not_found("order"))?;
    let lines = sqlx::query_as::<_, SellLineRow>("SELECT * FROM sell_details WHERE order_id = $1")
        .bind(id).fetch_all(&s.db).await.map_err(ise)?;
    Ok((order, lines))
}

async fn get_order(State(s): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<OrderDetail>, HandlerError> {
    let (order, lines) = fetch_order(&s, id).await?;
    Ok(Json(OrderDetail { order, lines }))
}

#[derive(Debug, Deserialize)]
pub struct OrderEditRequest {
    pub notes: Option<String>,
    pub shipping_cost: Option<Decimal>,
    pub total_discount: Option<Decimal>,
}

async fn update_order(State(s): State<AppState>, Path(id): Path<Uuid>, Json(r): Json<OrderEditRequest>) -> Result<Json<OrderDetail>, HandlerError> {
    let (row, lines) = fetch_order(&s, id).await?;
    let mut order = domain_order(&row, &lines)?;
    let edit = OrderEdit {
        notes: r.notes,
        shipping_cost: r.shipping_cost.map(|v| Money::new(v, &row.currency)),
        total_discount: r.total_discount.map(|v| Money::new(v, &row.currency)),
    };
    order.update_details(edit).map_err(conflict)?;
    let updated = sqlx::query_as::<_, OrderRow>(
        "UPDATE orders SET shipping_cost = $2, total_discount = $3, subtotal = $4, vat_total = $5, total_payable = $6, total_due = $7, notes = $8, updated_at = NOW() WHERE id = $1 RETURNING *")
        .bind(id)
        .bind(order.shipping_cost().amount()).bind(order.total_discount().amount())
        .bind(order.subtotal().amount()).bind(order.vat_total().amount())
        .bind(order.total_payable().amount()).bind(order.total_due().amount())
        .bind(order.notes())
        .fetch_one(&s.db).await.map_err(ise)?;
    Ok(Json(OrderDetail { order: updated, lines }))
}

/// A `{field_name, new_value}` partial patch against the order's status pair.
#[derive(Debug, Deserialize)]
pub struct StatusPatch { pub field_name: String, pub new_value: i16 }

async fn update_order_status(State(s): State<AppState>, Path(id): Path<Uuid>, Json(r): Json<StatusPatch>) -> Result<Json<OrderRow>, HandlerError> {
    match r.field_name.as_str() {
        "order_status" => {
            let next = OrderStatus::from_code(r.new_value).map_err(unprocessable)?;
            let row = sqlx::query_as::<_, OrderRow>("SELECT * FROM orders WHERE id = $1")
                .bind(id).fetch_optional(&s.db).await.map_err(ise)?.ok_or_else(|| not_found("order"))?;
            let current = OrderStatus::from_code(row.order_status).map_err(ise)?;
            // refused transitions never reach the UPDATE
            current.transition_to(next).map_err(conflict)?;
            let updated = sqlx::query_as::<_, OrderRow>("UPDATE orders SET order_status = $2, updated_at = NOW() WHERE id = $1 RETURNING *")
                .bind(id).bind(next.code()).fetch_one(&s.db).await.map_err(ise)?;
            tracing::info!("order {} moved from '{}' to '{}'", id, current, next);
            publish_events(&s, vec![DomainEvent::Order(OrderEvent::StatusChanged { order_id: id, from: current, to: next })]).await;
            Ok(Json(updated))
        }
        "payment_status" => Err((StatusCode::CONFLICT, "payment_status is derived from payment records; use the payment endpoints".to_string())),
        other => Err((StatusCode::UNPROCESSABLE_ENTITY, format!("unknown status field '{}'", other))),
    }
}

// =============================================================================
// Payments
// =============================================================================

async fn list_order_payments(State(s): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Vec<PaymentRow>>, HandlerError> {
    let payments = sqlx::query_as::<_, PaymentRow>("SELECT * FROM payments WHERE order_id = $1 ORDER BY created_at")
        .bind(id).fetch_all(&s.db).await.map_err(ise)?;
    Ok(Json(payments))
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreatePaymentRequest {
    pub order_id: Uuid,
    #[validate(length(min = 1))]
    pub method: String,
    pub amount: Decimal,
    pub transaction_reference: Option<String>,
    pub payment_date: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

async fn create_payment(State(s): State<AppState>, Json(r): Json<CreatePaymentRequest>) -> Result<(StatusCode, Json<PaymentRow>), HandlerError> {
    r.validate().map_err(unprocessable)?;
    let method = PaymentMethod::parse(&r.method).map_err(unprocessable)?;
    let order = sqlx::query_as::<_, OrderRow>("SELECT * FROM orders WHERE id = $1")
        .bind(r.order_id).fetch_optional(&s.db).await.map_err(ise)?.ok_or_else(|| not_found("order"))?;
    let mut payment = Payment::record(order.id, method, Money::new(r.amount, &order.currency)).map_err(unprocessable)?;
    payment.update(PaymentUpdate {
        transaction_reference: r.transaction_reference,
        payment_date: r.payment_date,
        notes: r.notes,
        ..Default::default()
    }).map_err(unprocessable)?;
    let row = sqlx::query_as::<_, PaymentRow>(
        "INSERT INTO payments (id, order_id, method, amount, currency, status, transaction_reference, payment_date, notes, created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NOW(), NOW()) RETURNING *")
        .bind(payment.id()).bind(payment.order_id()).bind(payment.method().as_str())
        .bind(payment.amount().amount()).bind(payment.amount().currency())
        .bind(payment.status().as_str()).bind(payment.transaction_reference())
        .bind(payment.payment_date()).bind(payment.notes())
        .fetch_one(&s.db).await.map_err(ise)?;
    publish_events(&s, payment.take_events()).await;
    Ok((StatusCode::CREATED, Json(row)))
}

#[derive(Debug, Deserialize)]
pub struct UpdatePaymentRequest {
    pub method: Option<String>,
    pub amount: Option<Decimal>,
    pub transaction_reference: Option<String>,
    pub payment_date: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

async fn update_payment(State(s): State<AppState>, Path(id): Path<Uuid>, Json(r): Json<UpdatePaymentRequest>) -> Result<Json<PaymentRow>, HandlerError> {
    let row = sqlx::query_as::<_, PaymentRow>("SELECT * FROM payments WHERE id = $1")
        .bind(id).fetch_optional(&s.db).await.map_err(ise)?.ok_or_else(|| not_found("payment"))?;
    let mut payment = domain_payment(&row)?;
    let method = match r.method.as_deref() {
        Some(m) => Some(PaymentMethod::parse(m).map_err(unprocessable)?),
        None => None,
    };
    let update = PaymentUpdate {
        method,
        amount: r.amount.map(|a| Money::new(a, &row.currency)),
        transaction_reference: r.transaction_reference,
        payment_date: r.payment_date,
        notes: r.notes,
    };
    payment.update(update).map_err(|e| match e {
        PaymentError::NotEditable(_) => (StatusCode::CONFLICT, e.to_string()),
        _ => (StatusCode::UNPROCESSABLE_ENTITY, e.to_string()),
    })?;
    let updated = sqlx::query_as::<_, PaymentRow>(
        "UPDATE payments SET method = $2, amount = $3, transaction_reference = $4, payment_date = $5, notes = $6, updated_at = NOW() WHERE id = $1 RETURNING *")
        .bind(id).bind(payment.method().as_str()).bind(payment.amount().amount())
        .bind(payment.transaction_reference()).bind(payment.payment_date()).bind(payment.notes())
        .fetch_one(&s.db).await.map_err(ise)?;
    Ok(Json(updated))
}

async fn delete_payment(State(s): State<AppState>, Path(id): Path<Uuid>) -> Result<StatusCode, HandlerError> {
    let row = sqlx::query_as::<_, PaymentRow>("SELECT * FROM payments WHERE id = $1")
        .bind(id).fetch_optional(&s.db).await.map_err(ise)?.ok_or_else(|| not_found("payment"))?;
    let payment = domain_payment(&row)?;
    if !payment.can_delete() {
        return Err((StatusCode::CONFLICT, format!("payment in state '{}' cannot be deleted", payment.status())));
    }
    sqlx::query("DELETE FROM payments WHERE id = $1").bind(id).execute(&s.db).await.map_err(ise)?;
    Ok(StatusCode::NO_CONTENT)
}

/// pending -> success: settles the payment and mirrors paid/due onto the
/// owning order, both writes in one transaction.
async fn validate_payment(State(s): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<PaymentRow>, HandlerError> {
    let mut tx = s.db.begin().await.map_err(ise)?;
    let prow = sqlx::query_as::<_, PaymentRow>("SELECT * FROM payments WHERE id = $1 FOR UPDATE")
        .bind(id).fetch_optional(&mut *tx).await.map_err(ise)?.ok_or_else(|| not_found("payment"))?;
    let orow = sqlx::query_as::<_, OrderRow>("SELECT * FROM orders WHERE id = $1 FOR UPDATE")
        .bind(prow.order_id).fetch_optional(&mut *tx).await.map_err(ise)?.ok_or_else(|| not_found("order"))?;
    let lines = sqlx::query_as::<_, SellLineRow>("SELECT * FROM sell_details WHERE order_id = $1")
        .bind(orow.id).fetch_all(&mut *tx).await.map_err(ise)?;

    let mut payment = domain_payment(&prow)?;
    let mut order = domain_order(&orow, &lines)?;
    payment.validate().map_err(conflict)?;
    let amount = payment.amount().clone();
    order.apply_payment(&amount).map_err(conflict)?;

    let updated = sqlx::query_as::<_, PaymentRow>("UPDATE payments SET status = $2, updated_at = NOW() WHERE id = $1 RETURNING *")
        .bind(id).bind(payment.status().as_str()).fetch_one(&mut *tx).await.map_err(ise)?;
    sqlx::query("UPDATE orders SET payment_status = $2, total_paid = $3, total_due = $4, updated_at = NOW() WHERE id = $1")
        .bind(order.id()).bind(order.payment_status().code())
        .bind(order.total_paid().amount()).bind(order.total_due().amount())
        .execute(&mut *tx).await.map_err(ise)?;
    tx.commit().await.map_err(ise)?;

    tracing::info!("payment {} validated against order {}", id, order.id());
    let mut events = payment.take_events();
    events.extend(order.take_events());
    publish_events(&s, events).await;
    Ok(Json(updated))
}

/// pending -> failed. Only the payment record moves.
async fn reject_payment(State(s): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<PaymentRow>, HandlerError> {
    let row = sqlx::query_as::<_, PaymentRow>("SELECT * FROM payments WHERE id = $1")
        .bind(id).fetch_optional(&s.db).await.map_err(ise)?.ok_or_else(|| not_found("payment"))?;
    let mut payment = domain_payment(&row)?;
    payment.reject().map_err(conflict)?;
    let updated = sqlx::query_as::<_, PaymentRow>("UPDATE payments SET status = $2, updated_at = NOW() WHERE id = $1 RETURNING *")
        .bind(id).bind(payment.status().as_str()).fetch_one(&s.db).await.map_err(ise)?;
    publish_events(&s, payment.take_events()).await;
    Ok(Json(updated))
}

/// success -> refunded: gives the amount back on the owning order.
async fn refund_payment(State(s): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<PaymentRow>, HandlerError> {
    let mut tx = s.db.begin().await.map_err(ise)?;
    let prow = sqlx::query_as::<_, PaymentRow>("SELECT * FROM payments WHERE id = $1 FOR UPDATE")
        .bind(id).fetch_optional(&mut *tx).await.map_err(ise)?.ok_or_else(|| not_found("payment"))?;
    let orow = sqlx::query_as::<_, OrderRow>("SELECT * FROM orders WHERE id = $1 FOR UPDATE")
        .bind(prow.order_id).fetch_optional(&mut *tx).await.map_err(ise)?.ok_or_else(|| not_found("order"))?;
    let lines = sqlx::query_as::<_, SellLineRow>("SELECT * FROM sell_details WHERE order_id = $1")
        .bind(orow.id).fetch_all(&mut *tx).await.map_err(ise)?;

    let mut payment = domain_payment(&prow)?;
    let mut order = domain_order(&orow, &lines)?;
    payment.refund().map_err(conflict)?;
    let amount = payment.amount().clone();
    order.apply_refund(&amount).map_err(conflict)?;

    let updated = sqlx::query_as::<_, PaymentRow>("UPDATE payments SET status = $2, updated_at = NOW() WHERE id = $1 RETURNING *")
        .bind(id).bind(payment.status().as_str()).fetch_one(&mut *tx).await.map_err(ise)?;
    sqlx::query("UPDATE orders SET payment_status = $2, total_paid = $3, total_due = $4, updated_at = NOW() WHERE id = $1")
        .bind(order.id()).bind(order.payment_status().code())
        .bind(order.total_paid().amount()).bind(order.total_due().amount())
        .execute(&mut *tx).await.map_err(ise)?;
    tx.commit().await.map_err(ise)?;

    tracing::info!("payment {} refunded against order {}", id, order.id());
    let mut events = payment.take_events();
    events.extend(order.take_events());
    publish_events(&s, events).await;
    Ok(Json(updated))
}

// =============================================================================
// Cart
// =============================================================================

#[derive(Debug, Serialize)]
pub struct CartLineView {
    pub product_id: Uuid, pub color_id: Option<Uuid>, pub size_id: Option<Uuid>,
    pub name: String, pub quantity: u32, pub unit_price: Decimal, pub available_stock: u32,
}

#[derive(Debug, Serialize)]
pub struct CartView { pub session_id: String, pub currency: String, pub lines: Vec<CartLineView>, pub subtotal: Decimal }

fn cart_view(cart: &Cart) -> CartView {
    CartView {
        session_id: cart.session_id().to_string(),
        currency: cart.currency().to_string(),
        lines: cart.lines().iter().map(|l| CartLineView {
            product_id: l.key.product_id,
            color_id: l.key.color_id,
            size_id: l.key.size_id,
            name: l.name.clone(),
            quantity: l.quantity,
            unit_price: l.unit_price.rounded(),
            available_stock: l.available_stock,
        }).collect(),
        subtotal: cart.subtotal().rounded(),
    }
}

async fn fetch_product(s: &AppState, id: Uuid) -> Result<(ProductRow, Vec<VariantRow>), HandlerError> {
    let product = sqlx::query_as::<_, ProductRow>("SELECT * FROM products WHERE id = $1")
        .bind(id).fetch_optional(&s.db).await.map_err(ise)?.ok_or_else(|| not_found("product"))?;
    let variants = sqlx::query_as::<_, VariantRow>("SELECT * FROM product_variants WHERE product_id = $1")
        .bind(id).fetch_all(&s.db).await.map_err(ise)?;
    Ok((product, variants))
}

/// Rebuilds the session's cart from its persisted rows and current prices.
async fn load_cart(s: &AppState, session: &str) -> Result<Cart, HandlerError> {
    let items = sqlx::query_as::<_, CartItemRow>("SELECT * FROM cart_items WHERE session_id = $1 ORDER BY created_at")
        .bind(session).fetch_all(&s.db).await.map_err(ise)?;
    let mut cart = Cart::new(session, &s.currency);
    for item in items {
        let (row, variants) = match fetch_product(s, item.product_id).await {
            Ok(found) => found,
            // product removed since the line was saved
            Err(e) if e.0 == StatusCode::NOT_FOUND => continue,
            Err(e) => return Err(e),
        };
        let product = domain_product(&row, &variants, &s.currency)?;
        let quote = LineQuote::resolve(&product, item.color_id, item.size_id, row.vat_percentage).map_err(ise)?;
        let key = quote.key;
        cart.apply(CartAction::Add(quote)).map_err(ise)?;
        if item.quantity > 1 {
            cart.apply(CartAction::SetQuantity { key, quantity: item.quantity.max(0) as u32 }).map_err(ise)?;
        }
    }
    Ok(cart)
}

async fn persist_cart(s: &AppState, cart: &Cart) -> Result<(), HandlerError> {
    let mut tx = s.db.begin().await.map_err(ise)?;
    sqlx::query("DELETE FROM cart_items WHERE session_id = $1").bind(cart.session_id()).execute(&mut *tx).await.map_err(ise)?;
    for line in cart.lines() {
        sqlx::query("INSERT INTO cart_items (id, session_id, product_id, color_id, size_id, quantity, created_at) VALUES ($1, $2, $3, $4, $5, $6, NOW())")
            .bind(Uuid::now_v7()).bind(cart.session_id())
            .bind(line.key.product_id).bind(line.key.color_id).bind(line.key.size_id)
            .bind(line.quantity as i32)
            .execute(&mut *tx).await.map_err(ise)?;
    }
    tx.commit().await.map_err(ise)?;
    Ok(())
}

async fn get_cart(State(s): State<AppState>, Path(session): Path<String>) -> Result<Json<CartView>, HandlerError> {
    let cart = load_cart(&s, &session).await?;
    Ok(Json(cart_view(&cart)))
}

#[derive(Debug, Deserialize)]
pub struct AddToCartRequest { pub product_id: Uuid, pub color_id: Option<Uuid>, pub size_id: Option<Uuid> }

async fn add_to_cart(State(s): State<AppState>, Path(session): Path<String>, Json(r): Json<AddToCartRequest>) -> Result<(StatusCode, Json<CartView>), HandlerError> {
    let (row, variants) = fetch_product(&s, r.product_id).await?;
    let product = domain_product(&row, &variants, &s.currency)?;
    let quote = LineQuote::resolve(&product, r.color_id, r.size_id, row.vat_percentage).map_err(unprocessable)?;
    let mut cart = load_cart(&s, &session).await?;
    cart.apply(CartAction::Add(quote)).map_err(unprocessable)?;
    persist_cart(&s, &cart).await?;
    Ok((StatusCode::CREATED, Json(cart_view(&cart))))
}

#[derive(Debug, Deserialize)]
pub struct CartQuantityRequest { pub product_id: Uuid, pub color_id: Option<Uuid>, pub size_id: Option<Uuid>, pub quantity: u32 }

async fn update_cart_quantity(State(s): State<AppState>, Path(session): Path<String>, Json(r): Json<CartQuantityRequest>) -> Result<Json<CartView>, HandlerError> {
    let mut cart = load_cart(&s, &session).await?;
    let key = CartKey { product_id: r.product_id, color_id: r.color_id, size_id: r.size_id };
    cart.apply(CartAction::SetQuantity { key, quantity: r.quantity })
        .map_err(|e| (StatusCode::NOT_FOUND, e.to_string()))?;
    persist_cart(&s, &cart).await?;
    Ok(Json(cart_view(&cart)))
}

async fn clear_cart(State(s): State<AppState>, Path(session): Path<String>) -> Result<StatusCode, HandlerError> {
    sqlx::query("DELETE FROM cart_items WHERE session_id = $1").bind(&session).execute(&s.db).await.map_err(ise)?;
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// Checkout
// =============================================================================

#[derive(Debug, Deserialize, Validate)]
pub struct CheckoutRequest {
    #[validate(length(min = 1))]
    pub session_id: String,
    pub customer_id: Uuid,
    pub shipping_cost: Option<Decimal>,
    pub total_discount: Option<Decimal>,
}

type CheckoutError = (StatusCode, Json<serde_json::Value>);

fn checkout_err(e: HandlerError) -> CheckoutError {
    (e.0, Json(serde_json::json!({ "error": e.1 })))
}

/// Reconciles the session cart into an order: stock check, totals, order +
/// line persistence, stock decrement and cart cleanup in one transaction.
async fn checkout(State(s): State<AppState>, Json(r): Json<CheckoutRequest>) -> Result<(StatusCode, Json<OrderDetail>), CheckoutError> {
    r.validate().map_err(|e| checkout_err(unprocessable(e)))?;
    let cart = load_cart(&s, &r.session_id).await.map_err(checkout_err)?;
    let shortages = cart.stock_shortages();
    if !shortages.is_empty() {
        let lines: Vec<serde_json::Value> = shortages.iter().map(|sh| serde_json::json!({
            "product_id": sh.key.product_id,
            "color_id": sh.key.color_id,
            "size_id": sh.key.size_id,
            "name": sh.name,
            "requested": sh.requested,
            "available": sh.available,
        })).collect();
        return Err((StatusCode::UNPROCESSABLE_ENTITY, Json(serde_json::json!({
            "error": "insufficient stock",
            "lines": lines,
        }))));
    }
    let sell_lines = cart.into_sell_lines().map_err(|e| checkout_err(unprocessable(e)))?;

    let shipping = Money::new(r.shipping_cost.unwrap_or(Decimal::ZERO), &s.currency);
    let discount = Money::new(r.total_discount.unwrap_or(Decimal::ZERO), &s.currency);
    let mut order = Order::place(short_ref("ORD"), r.customer_id, &s.currency, sell_lines, shipping, discount)
        .map_err(|e| checkout_err(unprocessable(e)))?;

    let mut tx = s.db.begin().await.map_err(|e| checkout_err(ise(e)))?;
    let order_row = sqlx::query_as::<_, OrderRow>(
        "INSERT INTO orders (id, reference, customer_id, currency, order_status, payment_status, subtotal, vat_total, shipping_cost, total_discount, total_payable, total_paid, total_due, notes, created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, NOW(), NOW()) RETURNING *")
        .bind(order.id()).bind(order.reference()).bind(order.customer_id()).bind(order.currency())
        .bind(order.status().code()).bind(order.payment_status().code())
        .bind(order.subtotal().amount()).bind(order.vat_total().amount())
        .bind(order.shipping_cost().amount()).bind(order.total_discount().amount())
        .bind(order.total_payable().amount()).bind(order.total_paid().amount()).bind(order.total_due().amount())
        .bind(order.notes())
        .fetch_one(&mut *tx).await.map_err(|e| checkout_err(ise(e)))?;

    let mut line_rows = Vec::new();
    for line in order.lines() {
        let row = sqlx::query_as::<_, SellLineRow>(
            "INSERT INTO sell_details (id, order_id, product_id, color_id, size_id, name, sku, quantity, unit_price, discount, vat_percentage) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) RETURNING *")
            .bind(Uuid::now_v7()).bind(order.id())
            .bind(line.product_id).bind(line.color_id).bind(line.size_id)
            .bind(&line.name).bind(line.sku.as_ref().map(|s| s.as_str().to_string()))
            .bind(line.quantity as i32).bind(line.unit_price.amount())
            .bind(line.discount.amount()).bind(line.vat_percentage)
            .fetch_one(&mut *tx).await.map_err(|e| checkout_err(ise(e)))?;
        line_rows.push(row);

        if line.color_id.is_some() || line.size_id.is_some() {
            sqlx::query("UPDATE product_variants SET stock = stock - $4 WHERE product_id = $1 AND color_id IS NOT DISTINCT FROM $2 AND size_id IS NOT DISTINCT FROM $3")
                .bind(line.product_id).bind(line.color_id).bind(line.size_id).bind(line.quantity as i32)
                .execute(&mut *tx).await.map_err(|e| checkout_err(ise(e)))?;
        } else {
            sqlx::query("UPDATE products SET stock = stock - $2, updated_at = NOW() WHERE id = $1")
                .bind(line.product_id).bind(line.quantity as i32)
                .execute(&mut *tx).await.map_err(|e| checkout_err(ise(e)))?;
        }
    }
    sqlx::query("DELETE FROM cart_items WHERE session_id = $1")
        .bind(&r.session_id).execute(&mut *tx).await.map_err(|e| checkout_err(ise(e)))?;
    tx.commit().await.map_err(|e| checkout_err(ise(e)))?;

    tracing::info!("order {} placed for session {}", order.reference(), r.session_id);
    publish_events(&s, order.take_events()).await;
    Ok((StatusCode::CREATED, Json(OrderDetail { order: order_row, lines: line_rows })))
}
