//! Fans a priced cart out into one slice per seller and works out what each
//! seller is owed.

use std::collections::HashMap;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    entities::product,
    errors::ServiceError,
    money::{round_money, MONEY_DP},
    services::{shipping::ShippingQuote, tax::VatCollector},
};

/// Platform commission terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommissionPolicy {
    pub rate: Decimal,
    /// Commission carries VAT when the platform is VAT-registered
    pub platform_vat_registered: bool,
    pub vat_rate: Decimal,
}

impl CommissionPolicy {
    pub fn commission_vat(&self, commission: Decimal) -> Decimal {
        if self.platform_vat_registered {
            round_money(commission * self.vat_rate)
        } else {
            Decimal::ZERO
        }
    }
}

/// Seller that owns a product: the platform store for platform products,
/// otherwise the product's own seller.
pub fn resolve_seller(
    product: &product::Model,
    platform_store_seller_id: Option<Uuid>,
) -> Result<Uuid, ServiceError> {
    let resolved = if product.is_platform_product {
        platform_store_seller_id.or(product.seller_id)
    } else {
        product.seller_id
    };
    resolved.ok_or(ServiceError::SellerUnresolved(product.id))
}

/// A priced line as the splitter needs it.
#[derive(Debug, Clone)]
pub struct SplitLine {
    pub seller_id: Uuid,
    /// VAT-inclusive `unit_price × quantity`
    pub line_total: Decimal,
    /// `vat_amount × quantity`
    pub vat_total: Decimal,
    pub vat_collector: VatCollector,
}

/// How the order discount is funded and targeted.
#[derive(Debug, Clone, Default)]
pub struct DiscountTerms {
    pub amount: Decimal,
    /// In-scope amount per seller; `None` spreads over the whole cart
    pub eligible: Option<Vec<(Uuid, Decimal)>>,
    pub platform_funded: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct SellerOrderDraft {
    pub seller_id: Uuid,
    /// Positions of this seller's lines in the priced cart
    #[serde(skip)]
    pub line_indexes: Vec<usize>,
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub platform_funded_discount: Decimal,
    pub shipping_fee: Decimal,
    pub tax_total: Decimal,
    pub vat_collector: VatCollector,
    pub total: Decimal,
    pub commission_rate: Decimal,
    pub commission: Decimal,
    pub commission_vat: Decimal,
    pub payout_amount: Decimal,
}

/// Splits `discount` across sellers in proportion to `bases`, each
/// seller's in-scope amount.
///
/// Shares are truncated to the cent, then the leftover cents go to the
/// largest bases that still have room. Shares always sum to the amount
/// handed out, are never negative and never exceed their base, so a seller
/// with nothing in scope gets nothing.
pub fn allocate_discount(bases: &[(Uuid, Decimal)], discount: Decimal) -> Vec<Decimal> {
    let bases: Vec<Decimal> = bases.iter().map(|(_, b)| (*b).max(Decimal::ZERO)).collect();
    let mut shares = vec![Decimal::ZERO; bases.len()];
    let total: Decimal = bases.iter().copied().sum();
    if discount <= Decimal::ZERO || total <= Decimal::ZERO {
        return shares;
    }

    let discount = round_money(discount.min(total));
    for (share, base) in shares.iter_mut().zip(&bases) {
        *share = (discount * base / total).round_dp_with_strategy(MONEY_DP, RoundingStrategy::ToZero);
    }

    let mut leftover = discount - shares.iter().copied().sum::<Decimal>();
    let mut by_size: Vec<usize> = (0..bases.len()).collect();
    by_size.sort_by(|&a, &b| bases[b].cmp(&bases[a]));
    for idx in by_size {
        if leftover <= Decimal::ZERO {
            break;
        }
        let extra = leftover.min(bases[idx] - shares[idx]);
        shares[idx] += extra;
        leftover -= extra;
    }
    shares
}

/// Builds one draft per seller, in the order sellers first appear in the
/// cart.
pub fn split_seller_orders(
    lines: &[SplitLine],
    discount: &DiscountTerms,
    shipping: &ShippingQuote,
    policy: &CommissionPolicy,
    commission_overrides: &HashMap<Uuid, Decimal>,
) -> Vec<SellerOrderDraft> {
    let mut sellers: Vec<Uuid> = Vec::new();
    let mut groups: HashMap<Uuid, Vec<usize>> = HashMap::new();
    for (idx, line) in lines.iter().enumerate() {
        groups
            .entry(line.seller_id)
            .or_insert_with(|| {
                sellers.push(line.seller_id);
                Vec::new()
            })
            .push(idx);
    }

    let subtotals: Vec<(Uuid, Decimal)> = sellers
        .iter()
        .map(|seller_id| {
            let subtotal = groups[seller_id]
                .iter()
                .map(|&i| lines[i].line_total)
                .sum::<Decimal>();
            (*seller_id, round_money(subtotal))
        })
        .collect();
    let bases: Vec<(Uuid, Decimal)> = match &discount.eligible {
        None => subtotals.clone(),
        Some(eligible) => subtotals
            .iter()
            .map(|&(seller_id, subtotal)| {
                let base = eligible
                    .iter()
                    .find(|(id, _)| *id == seller_id)
                    .map(|(_, base)| (*base).min(subtotal))
                    .unwrap_or(Decimal::ZERO);
                (seller_id, base)
            })
            .collect(),
    };
    let shares = allocate_discount(&bases, discount.amount);

    subtotals
        .iter()
        .zip(shares)
        .map(|(&(seller_id, subtotal), share)| {
            let line_indexes = groups.remove(&seller_id).unwrap_or_default();
            let tax_total = round_money(line_indexes.iter().map(|&i| lines[i].vat_total).sum());
            let vat_collector = line_indexes
                .first()
                .map(|&i| lines[i].vat_collector)
                .unwrap_or(VatCollector::Platform);
            let shipping_fee = shipping.fee_for(seller_id);
            let total = round_money(subtotal - share + shipping_fee);

            let commission_rate = commission_overrides
                .get(&seller_id)
                .copied()
                .unwrap_or(policy.rate);
            let commission = round_money(total * commission_rate);
            let commission_vat = policy.commission_vat(commission);
            let platform_funded_discount = if discount.platform_funded {
                share
            } else {
                Decimal::ZERO
            };
            let platform_vat = match vat_collector {
                VatCollector::Platform => tax_total,
                VatCollector::Seller => Decimal::ZERO,
            };
            let payout_amount = round_money(
                total + platform_funded_discount - commission - commission_vat - platform_vat,
            );

            SellerOrderDraft {
                seller_id,
                line_indexes,
                subtotal,
                discount: share,
                platform_funded_discount,
                shipping_fee,
                tax_total,
                vat_collector,
                total,
                commission_rate,
                commission,
                commission_vat,
                payout_amount,
            }
        })
        .collect()
}
