//! VAT computation for seller-entered, tax-exclusive prices.
//!
//! The levies (NHIL and GETFund) are charged on the base price and VAT is
//! charged on base plus levies. Every component is rounded to minor units
//! before it is summed, so `price_incl_vat == base_price + vat_amount` holds
//! exactly for every breakdown this module returns.

use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use utoipa::ToSchema;

use crate::money::round_money;

/// Configured platform tax rates, as fractions (0.15 = 15%).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaxRates {
    pub vat: Decimal,
    pub nhil: Decimal,
    pub getfund: Decimal,
}

/// Per-unit tax breakdown stored on every order item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TaxBreakdown {
    pub base_price: Decimal,
    pub vat_amount: Decimal,
    /// Effective rate, `vat_amount / base_price`
    pub vat_rate: Decimal,
    pub price_incl_vat: Decimal,
}

/// Who remits VAT collected on a line.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    DeriveActiveEnum,
    ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum VatCollector {
    #[sea_orm(string_value = "seller")]
    Seller,
    #[sea_orm(string_value = "platform")]
    Platform,
}

impl VatCollector {
    /// VAT-registered sellers collect VAT into their own payout.
    pub fn for_seller(vat_registered: bool) -> Self {
        if vat_registered {
            VatCollector::Seller
        } else {
            VatCollector::Platform
        }
    }
}

impl TaxBreakdown {
    pub fn zero() -> Self {
        Self {
            base_price: Decimal::ZERO,
            vat_amount: Decimal::ZERO,
            vat_rate: Decimal::ZERO,
            price_incl_vat: Decimal::ZERO,
        }
    }
}

/// Adds VAT and levies to a tax-exclusive base price.
///
/// Non-positive prices produce an all-zero breakdown.
pub fn add_vat_to_base(base_price: Decimal, rates: &TaxRates) -> TaxBreakdown {
    if base_price <= Decimal::ZERO {
        return TaxBreakdown::zero();
    }

    let base = round_money(base_price);
    let levies = round_money(base * (rates.nhil + rates.getfund));
    let vat = round_money((base + levies) * rates.vat);
    let vat_amount = levies + vat;

    TaxBreakdown {
        base_price: base,
        vat_amount,
        vat_rate: (vat_amount / base).round_dp(4),
        price_incl_vat: base + vat_amount,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn ghana_rates() -> TaxRates {
        TaxRates {
            vat: dec!(0.15),
            nhil: dec!(0.025),
            getfund: dec!(0.025),
        }
    }

    #[test]
    fn levies_then_vat() {
        let breakdown = add_vat_to_base(dec!(100), &ghana_rates());
        // levies 5.00, vat (105 * 0.15) 15.75
        assert_eq!(breakdown.vat_amount, dec!(20.75));
        assert_eq!(breakdown.price_incl_vat, dec!(120.75));
        assert_eq!(breakdown.vat_rate, dec!(0.2075));
    }

    #[test]
    fn non_positive_base_is_all_zero() {
        assert_eq!(add_vat_to_base(Decimal::ZERO, &ghana_rates()), TaxBreakdown::zero());
        assert_eq!(add_vat_to_base(dec!(-3), &ghana_rates()), TaxBreakdown::zero());
    }

    #[test]
    fn zero_rates_leave_price_unchanged() {
        let rates = TaxRates {
            vat: Decimal::ZERO,
            nhil: Decimal::ZERO,
            getfund: Decimal::ZERO,
        };
        let breakdown = add_vat_to_base(dec!(42.5), &rates);
        assert_eq!(breakdown.price_incl_vat, dec!(42.5));
        assert_eq!(breakdown.vat_amount, Decimal::ZERO);
    }

    #[test]
    fn collector_follows_registration() {
        assert_eq!(VatCollector::for_seller(true), VatCollector::Seller);
        assert_eq!(VatCollector::for_seller(false), VatCollector::Platform);
        assert_eq!(VatCollector::Platform.to_string(), "platform");
    }
}
