use std::env;
use std::time::Duration;

use crate::engine::registry::RegistryDefaults;
use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub event_buffer_size: usize,
    pub default_base_fee: f64,
    pub default_per_km_fee: f64,
    pub default_average_delivery_hours: f64,
    pub request_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: 3000,
            log_level: "info".to_string(),
            event_buffer_size: 1024,
            default_base_fee: 30.0,
            default_per_km_fee: 2.0,
            default_average_delivery_hours: 24.0,
            request_timeout_ms: 2000,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();
        let defaults = Self::default();

        Ok(Self {
            http_port: parse_or_default("HTTP_PORT", defaults.http_port)?,
            log_level: env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", defaults.event_buffer_size)?,
            default_base_fee: parse_or_default("DEFAULT_BASE_FEE", defaults.default_base_fee)?,
            default_per_km_fee: parse_or_default("DEFAULT_PER_KM_FEE", defaults.default_per_km_fee)?,
            default_average_delivery_hours: parse_or_default(
                "DEFAULT_AVERAGE_DELIVERY_HOURS",
                defaults.default_average_delivery_hours,
            )?,
            request_timeout_ms: parse_or_default("REQUEST_TIMEOUT_MS", defaults.request_timeout_ms)?,
        })
    }

    pub fn registry_defaults(&self) -> RegistryDefaults {
        RegistryDefaults {
            base_fee: self.default_base_fee,
            per_km_fee: self.default_per_km_fee,
            average_delivery_hours: self.default_average_delivery_hours,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}
