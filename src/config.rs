use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::game::{CombatRules, SHOT_DAMAGE, SHOT_RANGE_M};

pub const DEFAULT_PORT: u16 = 3001;
pub const DEFAULT_GEOLOCATION_URL: &str = "http://ip-api.com/json";

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub port: u16,
    pub allowed_origin: String,
    pub static_dir: String,
    pub geolocation_url: Option<String>,
    pub geolocation_timeout: Duration,
    pub snap_url: Option<String>,
    pub snap_timeout: Duration,
    pub rules: CombatRules,
    pub spawn_seed: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            allowed_origin: "*".to_string(),
            static_dir: "public".to_string(),
            geolocation_url: Some(DEFAULT_GEOLOCATION_URL.to_string()),
            geolocation_timeout: Duration::from_millis(5_000),
            snap_url: None,
            snap_timeout: Duration::from_millis(2_000),
            rules: CombatRules::default(),
            spawn_seed: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from any key lookup. Unset keys keep their default,
    /// unparseable ones are reported and ignored.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Config::default();
        let text = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let parsed = |key: &str, default| parse_or(key, text(key), default);

        let geolocation_url = match lookup("GEOLOCATION_URL") {
            Some(value) if value.trim().is_empty() => None,
            Some(value) => Some(value.trim().to_string()),
            None => defaults.geolocation_url,
        };

        let range_m: f64 = parse_or("SHOT_RANGE_M", text("SHOT_RANGE_M"), SHOT_RANGE_M);
        let range_m = if range_m.is_finite() && range_m >= 0.0 {
            range_m
        } else {
            warn!("SHOT_RANGE_M must be a non-negative number, using {}", SHOT_RANGE_M);
            SHOT_RANGE_M
        };

        Self {
            port: parse_or("PORT", text("PORT"), defaults.port),
            allowed_origin: text("ALLOWED_ORIGIN").unwrap_or(defaults.allowed_origin),
            static_dir: text("STATIC_DIR").unwrap_or(defaults.static_dir),
            geolocation_url,
            geolocation_timeout: Duration::from_millis(parsed("GEOLOCATION_TIMEOUT_MS", 5_000)),
            snap_url: text("SNAP_URL"),
            snap_timeout: Duration::from_millis(parsed("SNAP_TIMEOUT_MS", 2_000)),
            rules: CombatRules {
                damage: parse_or("SHOT_DAMAGE", text("SHOT_DAMAGE"), SHOT_DAMAGE),
                range_m,
            },
            spawn_seed: text("SPAWN_SEED").and_then(|value| match value.parse() {
                Ok(seed) => Some(seed),
                Err(_) => {
                    warn!("ignoring SPAWN_SEED={:?}", value);
                    None
                }
            }),
        }
    }
}

fn parse_or<T: FromStr + Copy + std::fmt::Debug>(key: &str, value: Option<String>, default: T) -> T {
    match value {
        None => default,
        Some(value) => value.parse().unwrap_or_else(|_| {
            warn!("ignoring {}={:?}, using {:?}", key, value, default);
            default
        }),
    }
}
