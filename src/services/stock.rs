//! Inventory decrement and restoration.
//!
//! Stock only moves through conditional updates (`stock >= qty`), never a
//! read followed by a write, so the last unit cannot be sold twice.

use std::collections::BTreeSet;

use chrono::Utc;
use metrics::counter;
use sea_orm::{
    sea_query::Expr, ActiveEnum, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter,
};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::{
    entities::{
        product::{self, ProductStatus},
        product_variant,
    },
    errors::ServiceError,
};

/// One stock movement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockLine {
    pub product_id: Uuid,
    /// `None` for products sold without variants
    pub variant_id: Option<Uuid>,
    pub quantity: i32,
    /// SKU or product name, for error messages
    pub label: String,
}

/// Status a product should carry for `total_stock`. Inactive products stay
/// inactive.
pub fn derived_status(current: ProductStatus, total_stock: i32) -> ProductStatus {
    match current {
        ProductStatus::Inactive => ProductStatus::Inactive,
        _ if total_stock <= 0 => ProductStatus::OutOfStock,
        _ => ProductStatus::Active,
    }
}

/// Decrements stock for every line, failing on the first line that cannot be
/// covered. The caller's transaction must be rolled back on error.
#[instrument(skip(conn, lines), fields(lines = lines.len()))]
pub async fn reduce_order_stock<C: ConnectionTrait>(
    conn: &C,
    lines: &[StockLine],
) -> Result<(), ServiceError> {
    let now = Utc::now();
    let mut touched = BTreeSet::new();

    for line in lines {
        let affected = match line.variant_id {
            Some(variant_id) => {
                product_variant::Entity::update_many()
                    .col_expr(
                        product_variant::Column::Stock,
                        Expr::col(product_variant::Column::Stock).sub(line.quantity),
                    )
                    .col_expr(product_variant::Column::UpdatedAt, Expr::value(now))
                    .filter(product_variant::Column::Id.eq(variant_id))
                    .filter(product_variant::Column::Stock.gte(line.quantity))
                    .exec(conn)
                    .await?
                    .rows_affected
            }
            None => {
                product::Entity::update_many()
                    .col_expr(
                        product::Column::TotalStock,
                        Expr::col(product::Column::TotalStock).sub(line.quantity),
                    )
                    .col_expr(product::Column::UpdatedAt, Expr::value(now))
                    .filter(product::Column::Id.eq(line.product_id))
                    .filter(product::Column::TotalStock.gte(line.quantity))
                    .exec(conn)
                    .await?
                    .rows_affected
            }
        };

        if affected == 0 {
            counter!("marketplace.stock.conflicts", 1);
            let left = remaining(conn, line).await?;
            warn!(label = %line.label, left, requested = line.quantity, "insufficient stock");
            return Err(ServiceError::InsufficientStock(format!(
                "{} has {} left, {} requested",
                line.label, left, line.quantity
            )));
        }
        touched.insert(line.product_id);
    }

    for product_id in touched {
        refresh_product_stock(conn, product_id).await?;
    }
    Ok(())
}

/// Puts stock back for lines that were previously decremented.
#[instrument(skip(conn, lines), fields(lines = lines.len()))]
pub async fn restore_order_stock<C: ConnectionTrait>(
    conn: &C,
    lines: &[StockLine],
) -> Result<(), ServiceError> {
    let now = Utc::now();
    let mut touched = BTreeSet::new();

    for line in lines {
        match line.variant_id {
            Some(variant_id) => {
                product_variant::Entity::update_many()
                    .col_expr(
                        product_variant::Column::Stock,
                        Expr::col(product_variant::Column::Stock).add(line.quantity),
                    )
                    .col_expr(product_variant::Column::UpdatedAt, Expr::value(now))
                    .filter(product_variant::Column::Id.eq(variant_id))
                    .exec(conn)
                    .await?;
            }
            None => {
                product::Entity::update_many()
                    .col_expr(
                        product::Column::TotalStock,
                        Expr::col(product::Column::TotalStock).add(line.quantity),
                    )
                    .filter(product::Column::Id.eq(line.product_id))
                    .exec(conn)
                    .await?;
            }
        }
        touched.insert(line.product_id);
    }

    for product_id in touched {
        refresh_product_stock(conn, product_id).await?;
    }
    Ok(())
}

async fn remaining<C: ConnectionTrait>(conn: &C, line: &StockLine) -> Result<i32, ServiceError> {
    Ok(match line.variant_id {
        Some(variant_id) => product_variant::Entity::find_by_id(variant_id)
            .one(conn)
            .await?
            .map(|v| v.stock)
            .unwrap_or(0),
        None => product::Entity::find_by_id(line.product_id)
            .one(conn)
            .await?
            .map(|p| p.total_stock)
            .unwrap_or(0),
    })
}

/// Re-derives `total_stock` from the variants (when there are any) and flips
/// the product between active and out of stock.
async fn refresh_product_stock<C: ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
) -> Result<(), ServiceError> {
    let Some(current) = product::Entity::find_by_id(product_id).one(conn).await? else {
        return Err(ServiceError::NotFound(format!("product {}", product_id)));
    };

    let variants = product_variant::Entity::find()
        .filter(product_variant::Column::ProductId.eq(product_id))
        .all(conn)
        .await?;
    let total_stock = if variants.is_empty() {
        current.total_stock
    } else {
        variants.iter().map(|v| v.stock).sum()
    };
    let status = derived_status(current.status, total_stock);

    if total_stock != current.total_stock || status != current.status {
        product::Entity::update_many()
            .col_expr(product::Column::TotalStock, Expr::value(total_stock))
            .col_expr(product::Column::Status, Expr::value(status.to_value()))
            .col_expr(product::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(product::Column::Id.eq(product_id))
            .exec(conn)
            .await?;
        debug!(%product_id, total_stock, ?status, "product stock refreshed");
    }
    Ok(())
}
