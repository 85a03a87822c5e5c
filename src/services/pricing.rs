//! Re-prices cart lines from the catalog. Client prices are only compared,
//! never charged.

use std::collections::HashMap;

use metrics::counter;
use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder};
use tracing::warn;
use uuid::Uuid;

use crate::{
    entities::{
        product::{self, ModerationStatus, ProductStatus},
        product_variant,
        seller::{self, SellerStatus},
    },
    errors::ServiceError,
    money::round_money,
    services::{
        seller_split::{resolve_seller, SplitLine},
        tax::{add_vat_to_base, TaxBreakdown, TaxRates, VatCollector},
    },
};

pub const MIN_LINE_QUANTITY: i32 = 1;
pub const MAX_LINE_QUANTITY: i32 = 999;

/// A cart line as submitted by the buyer.
#[derive(Debug, Clone)]
pub struct CartLine {
    pub product_id: Uuid,
    pub sku: Option<String>,
    pub quantity: i64,
    /// Price the client displayed, for fraud review only
    pub client_price: Option<Decimal>,
}

#[derive(Debug, Clone)]
pub struct PricedLine {
    pub product: product::Model,
    pub variant: Option<product_variant::Model>,
    pub seller_id: Uuid,
    pub quantity: i32,
    pub tax: TaxBreakdown,
    pub vat_collector: VatCollector,
    /// VAT-inclusive price of one unit
    pub unit_price: Decimal,
    pub line_total: Decimal,
    pub vat_total: Decimal,
}

impl PricedLine {
    pub fn split_line(&self) -> SplitLine {
        SplitLine {
            seller_id: self.seller_id,
            line_total: self.line_total,
            vat_total: self.vat_total,
            vat_collector: self.vat_collector,
        }
    }

    pub fn label(&self) -> String {
        self.variant
            .as_ref()
            .map(|v| v.sku.clone())
            .unwrap_or_else(|| self.product.name.clone())
    }
}

/// Lines priced from the catalog, plus the sellers they belong to.
#[derive(Debug, Clone, Default)]
pub struct PricedCart {
    pub lines: Vec<PricedLine>,
    pub sellers: HashMap<Uuid, seller::Model>,
}

impl PricedCart {
    pub fn subtotal(&self) -> Decimal {
        round_money(self.lines.iter().map(|l| l.line_total).sum())
    }

    pub fn tax_total(&self) -> Decimal {
        round_money(self.lines.iter().map(|l| l.vat_total).sum())
    }

    /// Seller-specific commission rates, where a seller has one.
    pub fn commission_overrides(&self) -> HashMap<Uuid, Decimal> {
        self.sellers
            .values()
            .filter_map(|s| s.commission_rate.map(|rate| (s.id, rate)))
            .collect()
    }
}

pub fn clamp_quantity(quantity: i64) -> i32 {
    quantity.clamp(MIN_LINE_QUANTITY as i64, MAX_LINE_QUANTITY as i64) as i32
}

/// Approved, live, not deleted, and sold by an active seller.
pub fn check_orderable(product: &product::Model, seller: &seller::Model) -> Result<(), ServiceError> {
    let reason = if product.is_deleted {
        Some("it has been removed")
    } else if product.moderation_status != ModerationStatus::Approved {
        Some("it is awaiting approval")
    } else if product.status == ProductStatus::Inactive {
        Some("it is not for sale")
    } else if seller.status != SellerStatus::Active {
        Some("its seller is not active")
    } else {
        None
    };
    match reason {
        Some(reason) => Err(ServiceError::ProductNotOrderable(format!(
            "{} cannot be ordered because {}",
            product.name, reason
        ))),
        None => Ok(()),
    }
}

async fn pick_variant<C: ConnectionTrait>(
    conn: &C,
    product: &product::Model,
    sku: Option<&str>,
) -> Result<Option<product_variant::Model>, ServiceError> {
    if let Some(sku) = sku.map(str::trim).filter(|s| !s.is_empty()) {
        return product_variant::Entity::find()
            .filter(product_variant::Column::ProductId.eq(product.id))
            .filter(product_variant::Column::Sku.eq(sku))
            .one(conn)
            .await?
            .map(Some)
            .ok_or_else(|| ServiceError::NotFound(format!("variant {} of {}", sku, product.name)));
    }

    let mut variants = product_variant::Entity::find()
        .filter(product_variant::Column::ProductId.eq(product.id))
        .order_by_asc(product_variant::Column::CreatedAt)
        .all(conn)
        .await?;
    match variants.len() {
        0 => Ok(None),
        1 => Ok(variants.pop()),
        _ => Err(ServiceError::ValidationError(format!(
            "sku is required for {}, which has several variants",
            product.name
        ))),
    }
}

/// Prices every line from the catalog.
pub async fn price_cart<C: ConnectionTrait>(
    conn: &C,
    lines: &[CartLine],
    rates: &TaxRates,
    platform_store_seller_id: Option<Uuid>,
    price_tolerance: Decimal,
) -> Result<PricedCart, ServiceError> {
    let mut cart = PricedCart::default();

    for line in lines {
        let product = product::Entity::find_by_id(line.product_id)
            .one(conn)
            .await?
            .filter(|p| !p.is_deleted)
            .ok_or_else(|| ServiceError::NotFound(format!("product {}", line.product_id)))?;

        let seller_id = resolve_seller(&product, platform_store_seller_id)?;
        if !cart.sellers.contains_key(&seller_id) {
            let seller = seller::Entity::find_by_id(seller_id)
                .one(conn)
                .await?
                .ok_or(ServiceError::SellerUnresolved(product.id))?;
            cart.sellers.insert(seller_id, seller);
        }
        let seller = &cart.sellers[&seller_id];
        check_orderable(&product, seller)?;

        let variant = pick_variant(conn, &product, line.sku.as_deref()).await?;
        let base_price = variant.as_ref().map(|v| v.price).unwrap_or(product.base_price);
        if base_price <= Decimal::ZERO {
            return Err(ServiceError::ProductNotOrderable(format!(
                "{} has no price",
                product.name
            )));
        }

        let quantity = clamp_quantity(line.quantity);
        let tax = add_vat_to_base(base_price, rates);
        let unit_price = tax.price_incl_vat;

        if let Some(client_price) = line.client_price {
            if (client_price - unit_price).abs() > price_tolerance {
                counter!("marketplace.orders.price_mismatch", 1);
                warn!(
                    product_id = %product.id,
                    %client_price,
                    server_price = %unit_price,
                    "client price differs from catalog price"
                );
            }
        }

        let qty = Decimal::from(quantity);
        cart.lines.push(PricedLine {
            vat_collector: VatCollector::for_seller(seller.vat_registered),
            seller_id,
            quantity,
            unit_price,
            line_total: round_money(unit_price * qty),
            vat_total: round_money(tax.vat_amount * qty),
            tax,
            variant,
            product,
        });
    }

    Ok(cart)
}
