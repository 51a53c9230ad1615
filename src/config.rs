use crate::types::StartingBalances;
use rust_decimal::Decimal;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Deployment environment. Development enables demo sessions, sandbox
/// starting balances and unsigned identity proofs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    pub fn is_development(&self) -> bool {
        matches!(self, Environment::Development)
    }

    fn parse(value: &str) -> Self {
        match value.to_lowercase().as_str() {
            "production" | "prod" => Environment::Production,
            _ => Environment::Development,
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Production => write!(f, "production"),
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host address.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Development or production.
    pub environment: Environment,
    /// SQLite database file.
    pub database_path: String,
    /// Redis URL for session persistence.
    pub redis_url: Option<String>,
    /// Fraction of gross trade value charged as commission.
    pub commission_rate: Decimal,
    /// Balances granted to new accounts.
    pub starting_balances: StartingBalances,
    /// Initial WLD to USD rate.
    pub wld_usd_rate: Decimal,
    /// Refresh the WLD rate during price ingestion.
    pub refresh_wld_rate: bool,
    /// Divisor from index points to token USD price.
    pub price_scale_factor: Decimal,
    /// Seconds between price refreshes (0 disables the background task).
    pub price_refresh_secs: u64,
    /// Bound on every external call and on per-user lock waits.
    pub external_timeout_ms: u64,
    /// Session lifetime in hours.
    pub session_ttl_hours: i64,
    /// HMAC key for login signatures.
    pub auth_secret: Option<String>,
    /// HMAC key for identity proof attestations.
    pub verification_secret: Option<String>,
    /// Wallet payment API base URL.
    pub payment_api_url: Option<String>,
    /// Wallet payment API key.
    pub payment_api_key: Option<String>,
    /// Key required by operator endpoints (disabled when unset).
    pub admin_api_key: Option<String>,
    /// List the default instrument catalog at startup.
    pub seed_instruments: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from any key lookup, applying defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let parse_or = |key: &str, default: &str| -> Decimal {
            get(key)
                .and_then(|v| Decimal::from_str(v.trim()).ok())
                .unwrap_or_else(|| Decimal::from_str(default).unwrap_or_default())
        };
        let flag = |key: &str, default: bool| -> bool {
            get(key)
                .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
                .unwrap_or(default)
        };

        let environment = get("APP_ENV")
            .map(|v| Environment::parse(&v))
            .unwrap_or(Environment::Development);

        // Sandbox accounts start funded; production accounts start empty
        let (default_usdc, default_wld) = if environment.is_development() {
            ("1000", "100")
        } else {
            ("0", "0")
        };

        Self {
            host: get("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: get("PORT").and_then(|p| p.parse().ok()).unwrap_or(3001),
            environment,
            database_path: get("DATABASE_PATH").unwrap_or_else(|| "trustsave.db".to_string()),
            redis_url: get("REDIS_URL"),
            commission_rate: parse_or("COMMISSION_RATE", "0.0075"),
            starting_balances: StartingBalances {
                usdc: parse_or("STARTING_BALANCE_USDC", default_usdc),
                wld: parse_or("STARTING_BALANCE_WLD", default_wld),
            },
            wld_usd_rate: parse_or("WLD_USD_RATE", "2.45"),
            refresh_wld_rate: flag("REFRESH_WLD_RATE", false),
            price_scale_factor: parse_or("PRICE_SCALE_FACTOR", "100"),
            price_refresh_secs: get("PRICE_REFRESH_SECS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(300),
            external_timeout_ms: get("EXTERNAL_TIMEOUT_MS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(5000),
            session_ttl_hours: get("SESSION_TTL_HOURS")
                .and_then(|v| v.parse().ok())
                .filter(|h: &i64| *h > 0)
                .unwrap_or(24),
            auth_secret: get("AUTH_SECRET"),
            verification_secret: get("VERIFICATION_SECRET"),
            payment_api_url: get("PAYMENT_API_URL"),
            payment_api_key: get("PAYMENT_API_KEY"),
            admin_api_key: get("ADMIN_API_KEY"),
            seed_instruments: flag("SEED_INSTRUMENTS", true),
        }
    }

    /// Timeout applied to external calls and lock waits.
    pub fn external_timeout(&self) -> Duration {
        Duration::from_millis(self.external_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    fn from_pairs(pairs: &[(&str, &str)]) -> Config {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();

        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3001);
        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.commission_rate, dec!(0.0075));
        assert_eq!(config.wld_usd_rate, dec!(2.45));
        assert_eq!(config.price_scale_factor, dec!(100));
        assert_eq!(config.starting_balances.usdc, dec!(1000));
        assert_eq!(config.starting_balances.wld, dec!(100));
        assert_eq!(config.external_timeout(), Duration::from_secs(5));
        assert!(config.seed_instruments);
        assert!(!config.refresh_wld_rate);
        assert!(config.admin_api_key.is_none());
    }

    #[test]
    fn test_production_starts_empty() {
        let config = from_pairs(&[("APP_ENV", "production")]);
        assert_eq!(config.environment, Environment::Production);
        assert_eq!(config.starting_balances, StartingBalances::default());
    }

    #[test]
    fn test_overrides() {
        let config = from_pairs(&[
            ("PORT", "8080"),
            ("COMMISSION_RATE", "0.01"),
            ("STARTING_BALANCE_USDC", "50"),
            ("REFRESH_WLD_RATE", "true"),
            ("SEED_INSTRUMENTS", "false"),
            ("ADMIN_API_KEY", "secret"),
            ("SESSION_TTL_HOURS", "0"),
        ]);

        assert_eq!(config.port, 8080);
        assert_eq!(config.commission_rate, dec!(0.01));
        assert_eq!(config.starting_balances.usdc, dec!(50));
        assert!(config.refresh_wld_rate);
        assert!(!config.seed_instruments);
        assert_eq!(config.admin_api_key.as_deref(), Some("secret"));
        assert_eq!(config.session_ttl_hours, 24);
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = from_pairs(&[("PORT", "abc"), ("COMMISSION_RATE", "lots"), ("ADMIN_API_KEY", " ")]);
        assert_eq!(config.port, 3001);
        assert_eq!(config.commission_rate, dec!(0.0075));
        assert!(config.admin_api_key.is_none());
    }
}
