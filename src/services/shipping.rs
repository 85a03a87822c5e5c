//! Shipping quotes.
//!
//! A buyer's city (and optionally their area) resolves to a neighborhood,
//! the neighborhood to a rate zone, and the zone's rates are applied to the
//! weight of each costed group of items:
//!
//! `fee = ceil((base_rate + per_kg_rate × weight) × tier × speed + fragile)`
//!
//! `dispatch` costs the whole cart once; `seller_delivery` and
//! `pickup_center` cost each seller's items independently and sum them.

use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset, NaiveTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter};
use serde::Serialize;
use tracing::{debug, instrument};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    entities::{
        neighborhood,
        order::{DeliveryMethod, DeliverySpeed},
        pickup_center, shipping_zone,
    },
    errors::ServiceError,
    money::ceil_whole,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeightTier {
    pub max_kg: Decimal,
    pub multiplier: Decimal,
}

#[derive(Debug, Clone)]
pub struct ShippingSettings {
    /// Upper-case city names; empty accepts every city
    pub supported_cities: Vec<String>,
    pub same_day_cutoff: NaiveTime,
    pub utc_offset: FixedOffset,
    pub default_item_weight_kg: Decimal,
    pub weight_tiers: Vec<WeightTier>,
}

impl ShippingSettings {
    pub fn is_supported(&self, city: &str) -> bool {
        self.supported_cities.is_empty() || self.supported_cities.iter().any(|c| c == city)
    }

    /// Multiplier of the first tier whose ceiling fits `weight_kg`; the
    /// heaviest tier applies past the last ceiling.
    pub fn tier_multiplier(&self, weight_kg: Decimal) -> Decimal {
        self.weight_tiers
            .iter()
            .find(|tier| weight_kg <= tier.max_kg)
            .or_else(|| self.weight_tiers.last())
            .map(|tier| tier.multiplier)
            .unwrap_or(Decimal::ONE)
    }

    /// True once the operating-timezone wall clock is at or past the cutoff.
    pub fn cutoff_passed(&self, now: DateTime<Utc>) -> bool {
        now.with_timezone(&self.utc_offset).time() >= self.same_day_cutoff
    }
}

/// One cart line as the shipping calculator sees it.
#[derive(Debug, Clone)]
pub struct ShippingItem {
    pub seller_id: Uuid,
    /// Per-unit weight; `None` falls back to the configured default
    pub weight_kg: Option<Decimal>,
    pub quantity: i32,
    pub is_fragile: bool,
}

#[derive(Debug, Clone)]
pub struct ShippingRequest<'a> {
    pub city: &'a str,
    pub area: Option<&'a str>,
    pub items: &'a [ShippingItem],
    pub delivery_method: DeliveryMethod,
    pub pickup_center_id: Option<Uuid>,
    pub speed: DeliverySpeed,
    pub now: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct SellerShippingFee {
    pub seller_id: Uuid,
    pub shipping_fee: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct ShippingQuote {
    pub total_shipping_fee: Decimal,
    /// Zero for every seller under `dispatch`
    pub per_seller: Vec<SellerShippingFee>,
    pub zone_code: String,
}

impl ShippingQuote {
    pub fn fee_for(&self, seller_id: Uuid) -> Decimal {
        self.per_seller
            .iter()
            .find(|s| s.seller_id == seller_id)
            .map(|s| s.shipping_fee)
            .unwrap_or(Decimal::ZERO)
    }
}

/// The rate card of a single zone.
#[derive(Debug, Clone, Copy)]
pub struct ZoneRates {
    pub base_rate: Decimal,
    pub per_kg_rate: Decimal,
    pub express_multiplier: Decimal,
    pub same_day_multiplier: Decimal,
    pub fragile_surcharge: Decimal,
}

impl From<&shipping_zone::Model> for ZoneRates {
    fn from(zone: &shipping_zone::Model) -> Self {
        Self {
            base_rate: zone.base_rate,
            per_kg_rate: zone.per_kg_rate,
            express_multiplier: zone.express_multiplier,
            same_day_multiplier: zone.same_day_multiplier,
            fragile_surcharge: zone.fragile_surcharge,
        }
    }
}

impl ZoneRates {
    fn speed_multiplier(&self, speed: DeliverySpeed) -> Decimal {
        match speed {
            DeliverySpeed::Standard => Decimal::ONE,
            DeliverySpeed::Express => self.express_multiplier,
            DeliverySpeed::SameDay => self.same_day_multiplier,
        }
    }
}

/// Fee for one parcel, rounded up to a whole currency unit.
pub fn parcel_fee(
    rates: &ZoneRates,
    weight_kg: Decimal,
    fragile: bool,
    speed: DeliverySpeed,
    settings: &ShippingSettings,
) -> Decimal {
    let weighted = rates.base_rate + rates.per_kg_rate * weight_kg;
    let mut fee = weighted * settings.tier_multiplier(weight_kg) * rates.speed_multiplier(speed);
    if fragile {
        fee += rates.fragile_surcharge;
    }
    ceil_whole(fee)
}

/// Picks the neighborhood for an area: exact name, then a partial name match,
/// then the city's representative neighborhood, then any neighborhood of the
/// city.
pub fn pick_neighborhood<'n>(
    candidates: &'n [neighborhood::Model],
    area: Option<&str>,
) -> Option<&'n neighborhood::Model> {
    let area = area.map(|a| a.trim().to_lowercase()).filter(|a| !a.is_empty());

    if let Some(area) = area.as_deref() {
        if let Some(exact) = candidates.iter().find(|n| n.name.to_lowercase() == area) {
            return Some(exact);
        }
        if let Some(near) = candidates.iter().find(|n| {
            let name = n.name.to_lowercase();
            name.contains(area) || area.contains(name.as_str())
        }) {
            return Some(near);
        }
    }

    candidates
        .iter()
        .find(|n| n.is_representative)
        .or_else(|| candidates.first())
}

async fn zone_by_code<C: ConnectionTrait>(
    conn: &C,
    code: &str,
) -> Result<shipping_zone::Model, ServiceError> {
    shipping_zone::Entity::find()
        .filter(shipping_zone::Column::Code.eq(code))
        .filter(shipping_zone::Column::IsActive.eq(true))
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::DependencyError(format!("shipping zone {} is not configured", code)))
}

async fn resolve_zone<C: ConnectionTrait>(
    conn: &C,
    request: &ShippingRequest<'_>,
    city: &str,
) -> Result<shipping_zone::Model, ServiceError> {
    if request.delivery_method == DeliveryMethod::PickupCenter {
        let center_id = request.pickup_center_id.ok_or_else(|| {
            ServiceError::ValidationError("pickupCenterId is required for pickup_center delivery".into())
        })?;
        let center = pickup_center::Entity::find_by_id(center_id)
            .one(conn)
            .await?
            .filter(|c| c.is_active)
            .ok_or_else(|| ServiceError::NotFound(format!("pickup center {}", center_id)))?;
        return zone_by_code(conn, &center.zone_code).await;
    }

    let neighborhoods = neighborhood::Entity::find()
        .filter(neighborhood::Column::City.eq(city))
        .all(conn)
        .await?;
    let picked = pick_neighborhood(&neighborhoods, request.area).ok_or_else(|| {
        ServiceError::DependencyError(format!("no shipping zone for city {}", city))
    })?;
    debug!(neighborhood = %picked.name, zone = %picked.zone_code, "resolved shipping neighborhood");
    zone_by_code(conn, &picked.zone_code).await
}

/// Quotes shipping for a cart.
#[instrument(skip(conn, settings, request), fields(city = %request.city, method = ?request.delivery_method))]
pub async fn calculate_shipping_quote<C: ConnectionTrait>(
    conn: &C,
    settings: &ShippingSettings,
    request: &ShippingRequest<'_>,
) -> Result<ShippingQuote, ServiceError> {
    let city = request.city.trim().to_uppercase();
    if city.is_empty() {
        return Err(ServiceError::ValidationError("delivery city is required".into()));
    }
    if !settings.is_supported(&city) {
        return Err(ServiceError::ValidationError(format!(
            "delivery is not available in {}",
            city
        )));
    }
    if request.speed != DeliverySpeed::Standard && settings.cutoff_passed(request.now) {
        return Err(ServiceError::CutoffPassed);
    }

    let zone = resolve_zone(conn, request, &city).await?;
    let rates = ZoneRates::from(&zone);

    // seller -> (weight, fragile)
    let mut groups: BTreeMap<Uuid, (Decimal, bool)> = BTreeMap::new();
    let mut order_of_sellers = Vec::new();
    for item in request.items {
        let unit_weight = item.weight_kg.unwrap_or(settings.default_item_weight_kg);
        let weight = unit_weight * Decimal::from(item.quantity.max(0));
        let entry = groups.entry(item.seller_id).or_insert_with(|| {
            order_of_sellers.push(item.seller_id);
            (Decimal::ZERO, false)
        });
        entry.0 += weight;
        entry.1 |= item.is_fragile;
    }

    let quote = match request.delivery_method {
        DeliveryMethod::Dispatch => {
            let (weight, fragile) = groups
                .values()
                .fold((Decimal::ZERO, false), |(w, f), (gw, gf)| (w + gw, f || *gf));
            let total = if groups.is_empty() {
                Decimal::ZERO
            } else {
                parcel_fee(&rates, weight, fragile, request.speed, settings)
            };
            ShippingQuote {
                total_shipping_fee: total,
                per_seller: order_of_sellers
                    .iter()
                    .map(|seller_id| SellerShippingFee {
                        seller_id: *seller_id,
                        shipping_fee: Decimal::ZERO,
                    })
                    .collect(),
                zone_code: zone.code.clone(),
            }
        }
        DeliveryMethod::SellerDelivery | DeliveryMethod::PickupCenter => {
            let per_seller: Vec<SellerShippingFee> = order_of_sellers
                .iter()
                .map(|seller_id| {
                    let (weight, fragile) = groups[seller_id];
                    SellerShippingFee {
                        seller_id: *seller_id,
                        shipping_fee: parcel_fee(&rates, weight, fragile, request.speed, settings),
                    }
                })
                .collect();
            ShippingQuote {
                total_shipping_fee: per_seller.iter().map(|s| s.shipping_fee).sum(),
                per_seller,
                zone_code: zone.code.clone(),
            }
        }
    };

    Ok(quote)
}
