//! Coupon validation and redemption.
//!
//! `validate_coupon` is read-only and prices the discount. `apply_coupon_to_order`
//! consumes the code with conditional updates and must run on the same
//! transaction that created the order.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::{Condition, Expr},
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter, Set,
    SqlErr,
};
use serde::Serialize;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    entities::{
        coupon,
        coupon_batch::{self, id_list, CouponFunding, DiscountType},
        coupon_usage,
    },
    errors::{CouponError, ServiceError},
    money::round_money,
};

/// One priced cart line as the coupon rules see it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CouponLine {
    pub product_id: Uuid,
    pub category_id: Option<Uuid>,
    pub seller_id: Uuid,
    /// VAT-inclusive line total
    pub amount: Decimal,
}

/// What the cart looks like to the coupon rules.
#[derive(Debug, Clone, Default)]
pub struct CouponCart {
    pub user_id: Uuid,
    /// VAT-inclusive order subtotal
    pub subtotal: Decimal,
    pub lines: Vec<CouponLine>,
}

/// A priced, not yet consumed, coupon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct CouponQuote {
    pub batch_id: Uuid,
    pub coupon_id: Uuid,
    pub code: String,
    pub discount: Decimal,
    /// Part of the subtotal the discount was computed on
    pub eligible_subtotal: Decimal,
    pub funded_by: CouponFunding,
    /// In-scope amount per seller, in cart order
    #[serde(skip)]
    pub eligible_by_seller: Vec<(Uuid, Decimal)>,
    #[serde(skip)]
    pub single_use: bool,
    #[serde(skip)]
    pub per_user_limit: Option<i32>,
}

impl CouponQuote {
    pub fn platform_funded(&self) -> bool {
        self.funded_by == CouponFunding::Platform
    }
}

pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

/// Percentage of the base capped at `max_discount_amount`, or a fixed
/// amount capped at the base.
pub fn compute_discount(batch: &coupon_batch::Model, base: Decimal) -> Decimal {
    if base <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    let raw = match batch.discount_type {
        DiscountType::Percentage => {
            let pct = base * batch.discount_value / Decimal::ONE_HUNDRED;
            match batch.max_discount_amount {
                Some(cap) if cap > Decimal::ZERO => pct.min(cap),
                _ => pct,
            }
        }
        DiscountType::Fixed => batch.discount_value,
    };
    round_money(raw.max(Decimal::ZERO).min(base))
}

/// Which lines a batch covers.
struct Scope {
    owner: Option<Uuid>,
    products: Vec<Uuid>,
    categories: Vec<Uuid>,
    sellers: Vec<Uuid>,
}

impl Scope {
    fn of(batch: &coupon_batch::Model) -> Self {
        Self {
            owner: batch.seller_id,
            products: id_list(&batch.applicable_products),
            categories: id_list(&batch.applicable_categories),
            sellers: id_list(&batch.applicable_sellers),
        }
    }

    /// A seller-owned batch only covers that seller's lines. Empty lists
    /// cover everything; otherwise a line matches on any listed dimension.
    fn covers(&self, line: &CouponLine) -> bool {
        if self.owner.is_some_and(|owner| owner != line.seller_id) {
            return false;
        }
        if self.products.is_empty() && self.categories.is_empty() && self.sellers.is_empty() {
            return true;
        }
        self.products.contains(&line.product_id)
            || line
                .category_id
                .is_some_and(|category| self.categories.contains(&category))
            || self.sellers.contains(&line.seller_id)
    }
}

pub fn in_scope(batch: &coupon_batch::Model, cart: &CouponCart) -> bool {
    let scope = Scope::of(batch);
    cart.lines.iter().any(|line| scope.covers(line))
}

/// Sums the covered lines per seller, keeping the order sellers first
/// appear in the cart. Sellers with nothing in scope are left out.
pub fn eligible_by_seller(batch: &coupon_batch::Model, cart: &CouponCart) -> Vec<(Uuid, Decimal)> {
    let scope = Scope::of(batch);
    let mut bases: Vec<(Uuid, Decimal)> = Vec::new();
    for line in cart.lines.iter().filter(|line| scope.covers(line)) {
        match bases.iter_mut().find(|(seller, _)| *seller == line.seller_id) {
            Some((_, base)) => *base += line.amount,
            None => bases.push((line.seller_id, line.amount)),
        }
    }
    bases
        .into_iter()
        .map(|(seller, base)| (seller, round_money(base)))
        .collect()
}

async fn used_by<C: ConnectionTrait>(
    conn: &C,
    batch_id: Uuid,
    user_id: Uuid,
) -> Result<u64, ServiceError> {
    Ok(coupon_usage::Entity::find()
        .filter(coupon_usage::Column::BatchId.eq(batch_id))
        .filter(coupon_usage::Column::UserId.eq(user_id))
        .count(conn)
        .await?)
}

/// Checks a code against the campaign rules and prices the discount.
///
/// Rules are checked in a fixed order so callers always see the same reason
/// for the same cart: not found, expired, already used, minimum not met,
/// out of scope, usage cap reached.
#[instrument(skip(conn, cart), fields(user_id = %cart.user_id))]
pub async fn validate_coupon<C: ConnectionTrait>(
    conn: &C,
    code: &str,
    cart: &CouponCart,
    now: DateTime<Utc>,
) -> Result<CouponQuote, ServiceError> {
    let code = normalize_code(code);
    if code.is_empty() {
        return Err(CouponError::NotFound.into());
    }

    let unit = coupon::Entity::find()
        .filter(coupon::Column::Code.eq(code.as_str()))
        .one(conn)
        .await?
        .ok_or(CouponError::NotFound)?;

    if unit.recipient_id.is_some_and(|recipient| recipient != cart.user_id) {
        return Err(CouponError::NotFound.into());
    }

    let batch = coupon_batch::Entity::find_by_id(unit.batch_id)
        .one(conn)
        .await?
        .filter(|b| b.is_active)
        .ok_or(CouponError::NotFound)?;

    if now < batch.valid_from || now > batch.expires_at {
        return Err(CouponError::Expired.into());
    }

    if batch.single_use_codes && unit.used {
        return Err(CouponError::AlreadyUsed.into());
    }
    if let Some(per_user) = batch.max_usage_per_user {
        if used_by(conn, batch.id, cart.user_id).await? >= per_user.max(0) as u64 {
            return Err(CouponError::AlreadyUsed.into());
        }
    }

    if let Some(minimum) = batch.min_order_amount {
        if cart.subtotal < minimum {
            return Err(CouponError::MinimumNotMet(round_money(minimum)).into());
        }
    }

    if !in_scope(&batch, cart) {
        return Err(CouponError::ScopeMismatch.into());
    }

    if let Some(cap) = batch.max_usage {
        if batch.usage_count >= cap {
            return Err(CouponError::UsageCapReached.into());
        }
    }

    let eligible = eligible_by_seller(&batch, cart);
    let eligible_subtotal = round_money(eligible.iter().map(|(_, base)| *base).sum());
    Ok(CouponQuote {
        batch_id: batch.id,
        coupon_id: unit.id,
        code,
        discount: compute_discount(&batch, eligible_subtotal),
        eligible_subtotal,
        funded_by: batch.funded_by,
        eligible_by_seller: eligible,
        single_use: batch.single_use_codes,
        per_user_limit: batch.max_usage_per_user,
    })
}

/// Consumes a validated coupon for `order_id`.
///
/// Each counter moves through one conditional `UPDATE`; a concurrent
/// redemption that got there first leaves zero affected rows and the call
/// fails, aborting the caller's transaction. Per-user limits are held by
/// the unique `(batch_id, user_id, user_slot)` index on the usage row.
#[instrument(skip(conn, quote), fields(coupon_id = %quote.coupon_id, order_id = %order_id))]
pub async fn apply_coupon_to_order<C: ConnectionTrait>(
    conn: &C,
    quote: &CouponQuote,
    user_id: Uuid,
    order_id: Uuid,
    discount: Decimal,
    now: DateTime<Utc>,
) -> Result<(), ServiceError> {
    let mut unit_update = coupon::Entity::update_many()
        .col_expr(
            coupon::Column::UsageCount,
            Expr::col(coupon::Column::UsageCount).add(1),
        )
        .col_expr(coupon::Column::UsedAt, Expr::value(Some(now)))
        .col_expr(coupon::Column::UsedBy, Expr::value(Some(user_id)))
        .col_expr(coupon::Column::OrderId, Expr::value(Some(order_id)))
        .filter(coupon::Column::Id.eq(quote.coupon_id));
    if quote.single_use {
        unit_update = unit_update
            .col_expr(coupon::Column::Used, Expr::value(true))
            .filter(coupon::Column::Used.eq(false));
    }
    let result = unit_update.exec(conn).await?;
    if result.rows_affected == 0 {
        warn!("coupon lost a concurrent redemption");
        return Err(CouponError::AlreadyUsed.into());
    }

    let result = coupon_batch::Entity::update_many()
        .col_expr(
            coupon_batch::Column::UsageCount,
            Expr::col(coupon_batch::Column::UsageCount).add(1),
        )
        .filter(coupon_batch::Column::Id.eq(quote.batch_id))
        .filter(
            Condition::any()
                .add(coupon_batch::Column::MaxUsage.is_null())
                .add(
                    Expr::col(coupon_batch::Column::UsageCount)
                        .lt(Expr::col(coupon_batch::Column::MaxUsage)),
                ),
        )
        .exec(conn)
        .await?;
    if result.rows_affected == 0 {
        return Err(CouponError::UsageCapReached.into());
    }

    let user_slot = match quote.per_user_limit {
        Some(limit) => {
            let slot = used_by(conn, quote.batch_id, user_id).await?;
            if slot >= limit.max(0) as u64 {
                return Err(CouponError::AlreadyUsed.into());
            }
            Some(slot as i32)
        }
        None => None,
    };

    let usage = coupon_usage::ActiveModel {
        id: Set(Uuid::new_v4()),
        batch_id: Set(quote.batch_id),
        coupon_id: Set(quote.coupon_id),
        user_id: Set(user_id),
        order_id: Set(order_id),
        user_slot: Set(user_slot),
        discount: Set(discount),
        created_at: Set(now),
    }
    .insert(conn)
    .await;
    match usage {
        Ok(_) => {}
        Err(err) if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
            warn!(%user_id, "per-user coupon slot taken by a concurrent redemption");
            return Err(CouponError::AlreadyUsed.into());
        }
        Err(err) => return Err(err.into()),
    }

    info!(code = %quote.code, %discount, "coupon redeemed");
    Ok(())
}
