use std::env;
use std::str::FromStr;

use chrono::NaiveTime;
use tracing::warn;

/// Slots longer than a day cannot repeat within business hours.
pub const MAX_SLOT_INTERVAL_MINUTES: i64 = 24 * 60;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_jwt_secret: String,
    pub port: u16,
    pub clinic_opening_time: NaiveTime,
    pub clinic_closing_time: NaiveTime,
    pub slot_interval_minutes: i64,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_URL not set, using empty value");
                    String::new()
                }),
            supabase_anon_key: env::var("SUPABASE_ANON_PUBLIC_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_ANON_PUBLIC_KEY not set, using empty value");
                    String::new()
                }),
            supabase_jwt_secret: env::var("SUPABASE_JWT_SECRET")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_JWT_SECRET not set, using empty value");
                    String::new()
                }),
            port: parse_var("PORT", 3000),
            clinic_opening_time: time_var("CLINIC_OPENING_TIME", default_opening_time()),
            clinic_closing_time: time_var("CLINIC_CLOSING_TIME", default_closing_time()),
            slot_interval_minutes: parse_var("SLOT_INTERVAL_MINUTES", 30),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty()
            && !self.supabase_anon_key.is_empty()
            && !self.supabase_jwt_secret.is_empty()
    }

    pub fn has_valid_business_hours(&self) -> bool {
        self.clinic_opening_time < self.clinic_closing_time
            && (1..=MAX_SLOT_INTERVAL_MINUTES).contains(&self.slot_interval_minutes)
    }
}

pub fn default_opening_time() -> NaiveTime {
    NaiveTime::from_hms_opt(7, 0, 0).unwrap_or(NaiveTime::MIN)
}

pub fn default_closing_time() -> NaiveTime {
    NaiveTime::from_hms_opt(19, 0, 0).unwrap_or(NaiveTime::MIN)
}

fn parse_var<T: FromStr + std::fmt::Display>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("{} has invalid value '{}', using default {}", name, raw, default);
            default
        }),
        Err(_) => {
            warn!("{} not set, using default {}", name, default);
            default
        }
    }
}

fn time_var(name: &str, default: NaiveTime) -> NaiveTime {
    match env::var(name) {
        Ok(raw) => NaiveTime::parse_from_str(raw.trim(), "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(raw.trim(), "%H:%M:%S"))
            .unwrap_or_else(|_| {
                warn!("{} has invalid value '{}', using default {}", name, raw, default.format("%H:%M"));
                default
            }),
        Err(_) => {
            warn!("{} not set, using default {}", name, default.format("%H:%M"));
            default
        }
    }
}
