use std::env;
use std::path::Path;
use std::time::Duration;

use chrono::{FixedOffset, NaiveTime};
use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use thiserror::Error;
use tracing::{error, info};
use uuid::Uuid;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::services::{
    orders::OrderSettings,
    seller_split::CommissionPolicy,
    shipping::{ShippingSettings, WeightTier},
    tax::TaxRates,
};

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// HS256 secret used to verify bearer tokens
    #[validate(length(min = 32), custom = "validate_jwt_secret")]
    pub jwt_secret: String,

    /// Server host address
    pub host: String,

    #[serde(default = "default_port")]
    #[validate(range(min = 1))]
    pub port: u16,

    /// Application environment
    pub environment: String,

    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Whether to run database migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,

    /// CORS: comma-separated list of allowed origins
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,

    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    #[serde(default = "default_db_connect_timeout_secs")]
    pub db_connect_timeout_secs: u64,

    #[serde(default = "default_db_acquire_timeout_secs")]
    pub db_acquire_timeout_secs: u64,

    /// Upper bound on a single HTTP request
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_event_channel_capacity")]
    #[validate(range(min = 1))]
    pub event_channel_capacity: usize,

    /// Marketplace business settings
    #[serde(default)]
    #[validate]
    pub marketplace: MarketplaceConfig,
}

/// Pricing, tax, commission and shipping settings read by the order pipeline.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(default)]
pub struct MarketplaceConfig {
    pub currency: String,

    #[validate(custom = "validate_rate")]
    pub vat_rate: Decimal,
    #[validate(custom = "validate_rate")]
    pub nhil_rate: Decimal,
    #[validate(custom = "validate_rate")]
    pub getfund_rate: Decimal,

    /// Platform charges VAT on its commission when registered
    pub platform_vat_registered: bool,

    #[validate(custom = "validate_rate")]
    pub commission_rate: Decimal,

    /// Seller id of the platform's own store; products flagged as platform
    /// products are attributed to it
    pub platform_store_seller_id: Option<Uuid>,

    /// Client/server price difference that is tolerated without a fraud log
    pub price_tolerance: Decimal,

    #[validate(range(min = 1))]
    pub order_timeout_secs: u64,

    #[validate]
    pub shipping: ShippingConfig,
}

#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(default)]
pub struct ShippingConfig {
    /// Cities we deliver to (upper-case). Empty means no restriction.
    pub supported_cities: Vec<String>,
    /// Daily cutoff for same-day and express requests, `HH:MM` local time
    #[validate(custom = "validate_cutoff")]
    pub same_day_cutoff: String,
    /// Operating timezone as minutes east of UTC
    #[validate(range(min = -720, max = 840))]
    pub utc_offset_minutes: i32,
    /// Used when a product has no weight recorded
    pub default_item_weight_kg: Decimal,
    /// Ascending weight bands; the first band whose `max_kg` fits applies
    pub weight_tiers: Vec<WeightTierConfig>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct WeightTierConfig {
    pub max_kg: Decimal,
    pub multiplier: Decimal,
}

impl Default for MarketplaceConfig {
    fn default() -> Self {
        Self {
            currency: "GHS".to_string(),
            vat_rate: dec!(0.15),
            nhil_rate: dec!(0.025),
            getfund_rate: dec!(0.025),
            platform_vat_registered: true,
            commission_rate: dec!(0.10),
            platform_store_seller_id: None,
            price_tolerance: dec!(0.01),
            order_timeout_secs: 15,
            shipping: ShippingConfig::default(),
        }
    }
}

impl Default for ShippingConfig {
    fn default() -> Self {
        Self {
            supported_cities: vec!["ACCRA".to_string(), "KUMASI".to_string(), "TEMA".to_string()],
            same_day_cutoff: "14:00".to_string(),
            utc_offset_minutes: 0,
            default_item_weight_kg: dec!(0.5),
            weight_tiers: vec![
                WeightTierConfig {
                    max_kg: dec!(5),
                    multiplier: dec!(1.0),
                },
                WeightTierConfig {
                    max_kg: dec!(20),
                    multiplier: dec!(1.2),
                },
                WeightTierConfig {
                    max_kg: dec!(1000000),
                    multiplier: dec!(1.5),
                },
            ],
        }
    }
}

impl MarketplaceConfig {
    /// Builds the settings injected into `OrderService`.
    pub fn order_settings(&self) -> Result<OrderSettings, AppConfigError> {
        let cutoff = parse_cutoff(&self.shipping.same_day_cutoff).ok_or_else(|| {
            AppConfigError::Invalid(format!(
                "same_day_cutoff '{}' is not HH:MM",
                self.shipping.same_day_cutoff
            ))
        })?;
        let utc_offset = FixedOffset::east_opt(self.shipping.utc_offset_minutes * 60)
            .ok_or_else(|| {
                AppConfigError::Invalid(format!(
                    "utc_offset_minutes {} is out of range",
                    self.shipping.utc_offset_minutes
                ))
            })?;

        let tax = TaxRates {
            vat: self.vat_rate,
            nhil: self.nhil_rate,
            getfund: self.getfund_rate,
        };

        Ok(OrderSettings {
            currency: self.currency.clone(),
            tax,
            commission: CommissionPolicy {
                rate: self.commission_rate,
                platform_vat_registered: self.platform_vat_registered,
                vat_rate: self.vat_rate,
            },
            shipping: ShippingSettings {
                supported_cities: self
                    .shipping
                    .supported_cities
                    .iter()
                    .map(|c| c.trim().to_uppercase())
                    .collect(),
                same_day_cutoff: cutoff,
                utc_offset,
                default_item_weight_kg: self.shipping.default_item_weight_kg,
                weight_tiers: self
                    .shipping
                    .weight_tiers
                    .iter()
                    .map(|t| WeightTier {
                        max_kg: t.max_kg,
                        multiplier: t.multiplier,
                    })
                    .collect(),
            },
            platform_store_seller_id: self.platform_store_seller_id,
            price_tolerance: self.price_tolerance,
            transaction_timeout: Duration::from_secs(self.order_timeout_secs),
        })
    }
}

impl AppConfig {
    /// Minimal configuration with built-in defaults; used by tests and tools.
    pub fn new(database_url: String, jwt_secret: String, environment: String) -> Self {
        Self {
            database_url,
            jwt_secret,
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            environment,
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: false,
            cors_allowed_origins: None,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
            db_acquire_timeout_secs: default_db_acquire_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            event_channel_capacity: default_event_channel_capacity(),
            marketplace: MarketplaceConfig::default(),
        }
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Configuration error types
#[derive(Error, Debug)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] ValidationErrors),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_db_max_connections() -> u32 {
    10
}
fn default_db_min_connections() -> u32 {
    1
}
fn default_db_connect_timeout_secs() -> u64 {
    30
}
fn default_db_acquire_timeout_secs() -> u64 {
    8
}
fn default_request_timeout_secs() -> u64 {
    30
}
fn default_event_channel_capacity() -> usize {
    1024
}

fn parse_cutoff(raw: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(raw.trim(), "%H:%M").ok()
}

/// Validates log level values
fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if valid_levels.contains(&level.to_lowercase().as_str()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("log_level");
        err.message = Some("Must be one of: trace, debug, info, warn, error".into());
        Err(err)
    }
}

fn validate_jwt_secret(secret: &str) -> Result<(), ValidationError> {
    let trimmed = secret.trim();
    if let Some(first) = trimmed.chars().next() {
        if trimmed.chars().all(|c| c == first) {
            let mut err = ValidationError::new("jwt_secret");
            err.message = Some("JWT secret cannot be a repeated character sequence".into());
            return Err(err);
        }
    }
    Ok(())
}

fn validate_rate(rate: &Decimal) -> Result<(), ValidationError> {
    if rate.is_sign_negative() || *rate > Decimal::ONE {
        let mut err = ValidationError::new("rate");
        err.message = Some("rates must be between 0 and 1".into());
        return Err(err);
    }
    Ok(())
}

fn validate_cutoff(raw: &str) -> Result<(), ValidationError> {
    if parse_cutoff(raw).is_some() {
        Ok(())
    } else {
        let mut err = ValidationError::new("same_day_cutoff");
        err.message = Some("Must be HH:MM".into());
        Err(err)
    }
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("marketplace_api={},tower_http=debug", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    let filter = EnvFilter::new(filter_directive);
    if json {
        let _ = fmt().with_env_filter(filter).json().try_init();
    } else {
        let _ = fmt().with_env_filter(filter).try_init();
    }
}

/// Loads application configuration
///
/// Layers configuration sources in this order:
/// 1. Built-in defaults
/// 2. Default config (config/default.toml)
/// 3. Environment-specific config (config/{env}.toml)
/// 4. Environment variables (APP__*, nested with `__`)
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV").unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !Path::new(CONFIG_DIR).exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            CONFIG_DIR
        );
    }

    let config = Config::builder()
        .set_default("database_url", "sqlite://marketplace.db?mode=rwc")?
        .set_default("host", "0.0.0.0")?
        .set_default("port", DEFAULT_PORT as i64)?
        .set_default("environment", run_env.clone())?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    if config.get_string("jwt_secret").is_err() {
        error!("JWT secret is not configured. Set APP__JWT_SECRET.");
        return Err(AppConfigError::Load(ConfigError::NotFound(
            "jwt_secret is required but not configured. Set APP__JWT_SECRET environment variable."
                .into(),
        )));
    }

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    // Fail at startup rather than on the first order.
    app_config.marketplace.order_settings()?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}
